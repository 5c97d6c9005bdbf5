//! Tool-augmented conversation loop.
//!
//! Per user turn the loop moves through
//! `AwaitingUserInput -> ModelRequested -> (ToolsRequested -> ToolsExecuting
//! -> ModelRequested)* -> FinalAnswerReady -> AwaitingUserInput`, with the
//! number of tool rounds capped by [`ConversationConfig::max_tool_rounds`].
//! Everything runs sequentially: one model call or one tool call at a time.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::context::{ContextStore, Draft};
use crate::error::{Error, Result};
use crate::model::{
    Backend, InvocationRequest, InvocationResult, ModelError, ModelRequest, ModelResponse,
    ToolSpec, Turn,
};
use crate::tools::ToolHost;

/// Answer used when the model finishes with no text.
pub const EMPTY_ANSWER: &str = "Hmm, I'm not sure how to answer that.";

/// Answer used when the model keeps asking for tools past the round cap.
pub const TOOL_LOOP_ANSWER: &str =
    "I couldn't finish gathering the information for that request. Please try rephrasing it.";

/// Loop behaviour.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Tool batches executed per user turn before the loop fails closed.
    pub max_tool_rounds: usize,
    /// Send no tool schemas once the cap is reached, steering the model to
    /// answer in prose.
    pub withhold_tools_after_cap: bool,
    /// Bound on each Model Gateway call.
    pub model_timeout: Duration,
    /// Bound on each tool invocation.
    pub tool_timeout: Duration,
    /// Bound on all model calls of one user turn together.
    pub turn_timeout: Option<Duration>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 1,
            withhold_tools_after_cap: true,
            model_timeout: Duration::from_secs(60),
            tool_timeout: mcp::DEFAULT_CALL_TIMEOUT,
            turn_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Where the loop is in the current user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    ModelRequested,
    ToolsRequested,
    ToolsExecuting,
    FinalAnswerReady,
}

/// Why a reply is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    /// The model requested tools again after `rounds` batches.
    ToolLoopExceeded { rounds: usize },
}

/// The final answer for one user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Tool batches executed for this turn.
    pub rounds: usize,
    pub degraded: Option<Degradation>,
}

/// One conversation: a context store, a model backend and a tool host, all
/// owned exclusively.
pub struct Conversation<B, H> {
    backend: B,
    host: H,
    context: ContextStore,
    config: ConversationConfig,
    state: LoopState,
}

impl<B: Backend, H: ToolHost> Conversation<B, H> {
    pub fn new(backend: B, host: H, config: ConversationConfig) -> Self {
        Self {
            backend,
            host,
            context: ContextStore::new(),
            config,
            state: LoopState::AwaitingUserInput,
        }
    }

    /// Seed the log with a system turn.
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.context.append_system(prompt);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run one user turn to its final answer.
    ///
    /// Model Gateway failures leave the log as it was before this call, so
    /// the same text can be sent again. A session-fatal tool failure is
    /// returned as an error after every pending invocation has been answered
    /// in the log.
    pub async fn send(&mut self, user_input: &str) -> Result<Reply> {
        let deadline = self.config.turn_timeout.map(|t| Instant::now() + t);
        let Self {
            backend,
            host,
            context,
            config,
            state,
        } = self;

        let mut turn = TurnGuard { state };
        let result = run_turn(
            backend,
            host,
            context,
            config,
            turn.state(),
            user_input,
            deadline,
        )
        .await;
        result
    }

    /// Swap in a freshly connected tool host, keeping the conversation log.
    ///
    /// The old host is closed and handed back.
    pub async fn replace_host(&mut self, host: H) -> H {
        let mut old = std::mem::replace(&mut self.host, host);
        old.close().await;
        info!("tool host replaced");
        old
    }

    /// Release the tool host. Safe to call more than once.
    pub async fn close(&mut self) {
        self.host.close().await;
    }
}

/// Puts the loop back in `AwaitingUserInput` when a turn ends, including
/// when the `send` future is dropped mid-turn.
struct TurnGuard<'a> {
    state: &'a mut LoopState,
}

impl TurnGuard<'_> {
    fn state(&mut self) -> &mut LoopState {
        self.state
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        transition(self.state, LoopState::AwaitingUserInput);
    }
}

async fn run_turn<B: Backend, H: ToolHost>(
    backend: &B,
    host: &mut H,
    context: &mut ContextStore,
    config: &ConversationConfig,
    state: &mut LoopState,
    user_input: &str,
    deadline: Option<Instant>,
) -> Result<Reply> {
    let mut draft = context.begin();
    draft.append_user(user_input)?;
    let mut rounds = 0;

    loop {
        let capped = rounds >= config.max_tool_rounds;
        let tools: &[ToolSpec] = if capped && config.withhold_tools_after_cap {
            &[]
        } else {
            host.specs()
        };

        transition(state, LoopState::ModelRequested);
        let response = call_model(backend, draft.snapshot(), tools, config, deadline).await?;

        if !response.requests_tools() {
            transition(state, LoopState::FinalAnswerReady);
            let text = response
                .content
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| EMPTY_ANSWER.to_string());
            draft.append_assistant(Some(text.clone()), Vec::new())?;
            draft.commit();
            return Ok(Reply {
                text,
                rounds,
                degraded: None,
            });
        }

        if capped {
            warn!(
                rounds,
                requested = response.invocations.len(),
                "tool round cap reached"
            );
            transition(state, LoopState::FinalAnswerReady);
            draft.append_assistant(Some(TOOL_LOOP_ANSWER.to_string()), Vec::new())?;
            draft.commit();
            return Ok(Reply {
                text: TOOL_LOOP_ANSWER.to_string(),
                rounds,
                degraded: Some(Degradation::ToolLoopExceeded { rounds }),
            });
        }

        transition(state, LoopState::ToolsRequested);
        let ModelResponse {
            content,
            invocations,
            ..
        } = response;
        draft.append_assistant(content, invocations.clone())?;

        transition(state, LoopState::ToolsExecuting);
        rounds += 1;
        if let Err(e) = execute_batch(host, &mut draft, &invocations, config.tool_timeout).await {
            if let Error::Session(_) = e {
                draft.commit();
            }
            return Err(e);
        }
    }
}

async fn call_model<B: Backend>(
    backend: &B,
    turns: &[Turn],
    tools: &[ToolSpec],
    config: &ConversationConfig,
    deadline: Option<Instant>,
) -> Result<ModelResponse> {
    let budget = match deadline {
        Some(deadline) => config
            .model_timeout
            .min(deadline.saturating_duration_since(Instant::now())),
        None => config.model_timeout,
    };

    let request = ModelRequest { turns, tools };
    match tokio::time::timeout(budget, backend.call(request)).await {
        Ok(Ok(response)) => {
            debug!(
                invocations = response.invocations.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "model responded"
            );
            Ok(response)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ModelError::Timeout(budget).into()),
    }
}

/// Execute one batch in the order the model requested it, appending a tool
/// turn per invocation.
///
/// On a session-fatal error every remaining invocation (including the one
/// that failed) still gets a tool turn describing the failure.
async fn execute_batch<H: ToolHost>(
    host: &mut H,
    draft: &mut Draft<'_>,
    requests: &[InvocationRequest],
    timeout: Duration,
) -> Result<()> {
    for (index, request) in requests.iter().enumerate() {
        let result = if !host.contains(&request.name) {
            warn!(tool = %request.name, request_id = %request.id, "model requested unknown tool");
            InvocationResult::unknown_tool(request)
        } else {
            match host.invoke(request, timeout).await {
                Ok(result) => {
                    info!(
                        tool = %request.name,
                        request_id = %request.id,
                        failed = result.is_error,
                        "tool invoked"
                    );
                    result
                }
                Err(e) if e.is_session_fatal() => {
                    warn!(tool = %request.name, error = %e, "aborting tool batch");
                    let failed = InvocationResult::failure(
                        request,
                        format!("tool call failed, tool provider lost: {e}"),
                    );
                    draft.append_tool_result(&failed)?;
                    for pending in &requests[index + 1..] {
                        let skipped = InvocationResult::failure(
                            pending,
                            "not executed, tool provider unavailable",
                        );
                        draft.append_tool_result(&skipped)?;
                    }
                    return Err(e.into());
                }
                Err(e) => InvocationResult::failure(request, format!("tool call failed: {e}")),
            }
        };
        draft.append_tool_result(&result)?;
    }
    Ok(())
}

fn transition(state: &mut LoopState, next: LoopState) {
    debug!(from = ?*state, to = ?next, "loop transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use mcp::RequestId;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays scripted responses and records each request.
    #[derive(Default)]
    struct ScriptedBackend {
        responses: Mutex<VecDeque<std::result::Result<ModelResponse, ModelError>>>,
        seen: Mutex<Vec<(Vec<Turn>, Vec<String>)>>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn new(
            responses: impl IntoIterator<Item = std::result::Result<ModelResponse, ModelError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn request(&self, n: usize) -> (Vec<Turn>, Vec<String>) {
            self.seen.lock().unwrap()[n].clone()
        }
    }

    impl Backend for ScriptedBackend {
        async fn call(
            &self,
            request: ModelRequest<'_>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            let tools = request.tools.iter().map(|t| t.name.clone()).collect();
            self.seen
                .lock()
                .unwrap()
                .push((request.turns.to_vec(), tools));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::InvalidResponse("script exhausted".into())))
        }
    }

    enum Behaviour {
        Answer(&'static str),
        ToolFailure(&'static str),
        Fatal,
    }

    /// Host with a fixed catalog that records invocation order.
    struct RecordingHost {
        specs: Vec<ToolSpec>,
        behaviour: fn(&InvocationRequest) -> Behaviour,
        invoked: Vec<String>,
        closed: usize,
    }

    impl RecordingHost {
        fn new(behaviour: fn(&InvocationRequest) -> Behaviour) -> Self {
            Self {
                specs: vec![ToolSpec {
                    name: "lookup".into(),
                    description: "Look things up".into(),
                    schema: json!({"type": "object"}),
                }],
                behaviour,
                invoked: Vec::new(),
                closed: 0,
            }
        }
    }

    impl ToolHost for RecordingHost {
        fn specs(&self) -> &[ToolSpec] {
            &self.specs
        }

        async fn invoke(
            &mut self,
            request: &InvocationRequest,
            _timeout: Duration,
        ) -> std::result::Result<InvocationResult, mcp::Error> {
            self.invoked.push(request.id.clone());
            match (self.behaviour)(request) {
                Behaviour::Answer(text) => Ok(InvocationResult::success(request, text)),
                Behaviour::ToolFailure(text) => Ok(InvocationResult::failure(request, text)),
                Behaviour::Fatal => Err(mcp::Error::InvokeTimeout {
                    id: RequestId::Number(1),
                    timeout: Duration::from_secs(1),
                }),
            }
        }

        async fn close(&mut self) {
            self.closed += 1;
        }
    }

    fn answer_with_query(request: &InvocationRequest) -> Behaviour {
        match request.arguments["q"].as_str() {
            Some("a") => Behaviour::Answer("result a"),
            Some("b") => Behaviour::Answer("result b"),
            _ => Behaviour::Answer("nothing"),
        }
    }

    fn invocation(id: &str, tool: &str, q: &str) -> InvocationRequest {
        InvocationRequest {
            id: id.into(),
            name: tool.into(),
            arguments: json!({ "q": q }),
        }
    }

    fn two_lookups() -> ModelResponse {
        ModelResponse::invoking(vec![
            invocation("1", "lookup", "a"),
            invocation("2", "lookup", "b"),
        ])
    }

    fn conversation(
        responses: impl IntoIterator<Item = std::result::Result<ModelResponse, ModelError>>,
        behaviour: fn(&InvocationRequest) -> Behaviour,
    ) -> Conversation<ScriptedBackend, RecordingHost> {
        Conversation::new(
            ScriptedBackend::new(responses),
            RecordingHost::new(behaviour),
            ConversationConfig::default(),
        )
    }

    /// Every tool turn answers a request made by an earlier assistant turn.
    fn assert_linked(turns: &[Turn]) {
        for (i, turn) in turns.iter().enumerate() {
            if turn.role != Role::Tool {
                continue;
            }
            let id = turn.answers.as_deref().expect("tool turn without reference");
            let requested = turns[..i]
                .iter()
                .filter(|t| t.role == Role::Assistant)
                .any(|t| t.invocations.iter().any(|r| r.id == id));
            assert!(requested, "tool turn {i} answers unknown request {id}");
        }
    }

    #[tokio::test]
    async fn plain_answer_needs_no_tools() {
        let mut convo = conversation([Ok(ModelResponse::text("Hello!"))], answer_with_query)
            .with_system("be brief");

        let reply = convo.send("hi").await.unwrap();
        assert_eq!(reply.text, "Hello!");
        assert_eq!(reply.rounds, 0);
        assert!(reply.degraded.is_none());
        assert_eq!(convo.state(), LoopState::AwaitingUserInput);

        let roles: Vec<Role> = convo.context().snapshot().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        assert_eq!(convo.backend.request(0).1, ["lookup"]);
    }

    #[tokio::test]
    async fn invocations_run_in_requested_order() {
        let mut convo = conversation(
            [Ok(two_lookups()), Ok(ModelResponse::text("a and b"))],
            answer_with_query,
        );

        let reply = convo.send("look up a and b").await.unwrap();
        assert_eq!(reply.text, "a and b");
        assert_eq!(reply.rounds, 1);
        assert_eq!(convo.host().invoked, ["1", "2"]);

        let turns = convo.context().snapshot();
        let tool_turns: Vec<(&str, &str)> = turns
            .iter()
            .filter(|t| t.role == Role::Tool)
            .map(|t| (t.answers.as_deref().unwrap(), t.text_content()))
            .collect();
        assert_eq!(tool_turns, [("1", "result a"), ("2", "result b")]);
        assert_linked(turns);

        // The follow-up call sees both results and, at the cap, no tools.
        let (follow_up, tools) = convo.backend.request(1);
        assert_eq!(follow_up.len(), 4);
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_never_reaches_host() {
        let mut convo = conversation(
            [
                Ok(ModelResponse::invoking(vec![invocation("1", "missing", "a")])),
                Ok(ModelResponse::text("I can't do that")),
            ],
            answer_with_query,
        );

        let reply = convo.send("use the missing tool").await.unwrap();
        assert_eq!(reply.text, "I can't do that");
        assert!(convo.host().invoked.is_empty());
        assert_eq!(convo.backend.calls(), 2);

        let turns = convo.context().snapshot();
        let tool_turn = turns.iter().find(|t| t.role == Role::Tool).unwrap();
        assert!(tool_turn.is_error);
        assert!(tool_turn.text_content().contains("unknown tool: missing"));
        assert_linked(turns);
    }

    #[tokio::test]
    async fn tool_failure_is_folded_into_conversation() {
        let mut convo = conversation(
            [
                Ok(ModelResponse::invoking(vec![invocation("1", "lookup", "a")])),
                Ok(ModelResponse::text("The lookup failed, sorry")),
            ],
            |_| Behaviour::ToolFailure("city not found"),
        );

        let reply = convo.send("weather in Atlantis").await.unwrap();
        assert_eq!(reply.text, "The lookup failed, sorry");

        let turns = convo.context().snapshot();
        let tool_turn = turns.iter().find(|t| t.role == Role::Tool).unwrap();
        assert_eq!(tool_turn.text_content(), "error: city not found");
    }

    #[tokio::test]
    async fn fatal_session_error_documents_every_pending_invocation() {
        let mut convo = conversation([Ok(two_lookups())], |_| Behaviour::Fatal);

        let err = convo.send("look up a and b").await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        assert_eq!(convo.state(), LoopState::AwaitingUserInput);
        assert_eq!(convo.host().invoked, ["1"]);
        assert_eq!(convo.backend.calls(), 1);

        let turns = convo.context().snapshot();
        let tool_turns: Vec<&Turn> = turns.iter().filter(|t| t.role == Role::Tool).collect();
        assert_eq!(tool_turns.len(), 2);
        assert!(tool_turns.iter().all(|t| t.is_error));
        assert_eq!(tool_turns[1].answers.as_deref(), Some("2"));
        assert!(tool_turns[0].text_content().contains("tool call failed"));
        assert!(tool_turns[1].text_content().contains("not executed"));
        assert!(convo.context().unanswered().is_empty());
        assert_linked(turns);
    }

    #[tokio::test]
    async fn new_host_picks_up_after_fatal_error() {
        let mut convo = conversation(
            [
                Ok(two_lookups()),
                Ok(ModelResponse::invoking(vec![invocation("3", "lookup", "a")])),
                Ok(ModelResponse::text("found a")),
            ],
            |_| Behaviour::Fatal,
        );
        assert!(convo.send("look up a and b").await.is_err());
        let before = convo.context().snapshot().to_vec();

        let old = convo
            .replace_host(RecordingHost::new(answer_with_query))
            .await;
        assert_eq!(old.closed, 1);

        let reply = convo.send("try a again").await.unwrap();
        assert_eq!(reply.text, "found a");
        assert_eq!(convo.host().invoked, ["3"]);

        let turns = convo.context().snapshot();
        assert_eq!(&turns[..before.len()], before.as_slice());
        assert_linked(turns);
    }

    #[tokio::test]
    async fn model_failure_leaves_log_unchanged() {
        let mut convo = conversation(
            [
                Ok(ModelResponse::text("first answer")),
                Err(ModelError::Network("connection reset".into())),
                Ok(ModelResponse::text("second answer")),
            ],
            answer_with_query,
        );
        convo.send("first").await.unwrap();
        let before = convo.context().snapshot().to_vec();

        let err = convo.send("second").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Network(_))));
        assert_eq!(convo.context().snapshot(), before.as_slice());

        // Retrying the same text does not duplicate the user turn.
        convo.send("second").await.unwrap();
        let users = convo
            .context()
            .snapshot()
            .iter()
            .filter(|t| t.role == Role::User && t.text_content() == "second")
            .count();
        assert_eq!(users, 1);
    }

    #[tokio::test]
    async fn follow_up_failure_discards_the_whole_turn() {
        let mut convo = conversation(
            [
                Ok(two_lookups()),
                Err(ModelError::Api {
                    status: 500,
                    message: "overloaded".into(),
                }),
            ],
            answer_with_query,
        );

        assert!(convo.send("look up a and b").await.is_err());
        assert!(convo.context().is_empty());
        assert!(convo.context().unanswered().is_empty());
    }

    #[tokio::test]
    async fn repeated_tool_requests_fail_closed() {
        let mut convo = conversation(
            [Ok(two_lookups()), Ok(two_lookups()), Ok(two_lookups())],
            answer_with_query,
        );

        let reply = convo.send("keep looking").await.unwrap();
        assert_eq!(reply.text, TOOL_LOOP_ANSWER);
        assert_eq!(
            reply.degraded,
            Some(Degradation::ToolLoopExceeded { rounds: 1 })
        );
        assert_eq!(convo.host().invoked.len(), 2);
        assert_eq!(convo.backend.calls(), 2);

        let turns = convo.context().snapshot();
        assert_eq!(turns.last().unwrap().text_content(), TOOL_LOOP_ANSWER);
        assert!(convo.context().unanswered().is_empty());
        assert_linked(turns);
    }

    #[tokio::test]
    async fn higher_cap_allows_more_rounds() {
        let mut convo = Conversation::new(
            ScriptedBackend::new([
                Ok(ModelResponse::invoking(vec![invocation("1", "lookup", "a")])),
                Ok(ModelResponse::invoking(vec![invocation("2", "lookup", "b")])),
                Ok(ModelResponse::text("done")),
            ]),
            RecordingHost::new(answer_with_query),
            ConversationConfig {
                max_tool_rounds: 2,
                ..Default::default()
            },
        );

        let reply = convo.send("two steps").await.unwrap();
        assert_eq!(reply.rounds, 2);
        assert_eq!(convo.host().invoked, ["1", "2"]);
        assert_eq!(convo.backend.request(1).1, ["lookup"]);
        assert!(convo.backend.request(2).1.is_empty());
        assert_linked(convo.context().snapshot());
    }

    #[tokio::test]
    async fn empty_answer_gets_fallback() {
        let mut convo = conversation([Ok(ModelResponse::text("  "))], answer_with_query);
        let reply = convo.send("hi").await.unwrap();
        assert_eq!(reply.text, EMPTY_ANSWER);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedBackend::new([Ok(ModelResponse::text("too late"))])
        };
        let mut convo = Conversation::new(
            backend,
            RecordingHost::new(answer_with_query),
            ConversationConfig {
                model_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let err = convo.send("hi").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Timeout(_))));
        assert!(convo.context().is_empty());
        assert_eq!(convo.state(), LoopState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn turn_deadline_bounds_all_model_calls() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_millis(300)),
            ..ScriptedBackend::new([Ok(two_lookups()), Ok(ModelResponse::text("a and b"))])
        };
        let mut convo = Conversation::new(
            backend,
            RecordingHost::new(answer_with_query),
            ConversationConfig {
                model_timeout: Duration::from_secs(5),
                turn_timeout: Some(Duration::from_millis(450)),
                ..Default::default()
            },
        );

        let err = convo.send("look up a and b").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Timeout(_))));
        assert_eq!(convo.backend.calls(), 2);
        assert_eq!(convo.host().invoked, ["1", "2"]);
        assert!(convo.context().is_empty());
    }

    #[tokio::test]
    async fn dropped_send_resets_state() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedBackend::new([Ok(ModelResponse::text("too late"))])
        };
        let mut convo = Conversation::new(
            backend,
            RecordingHost::new(answer_with_query),
            ConversationConfig::default(),
        );

        let cancelled = tokio::time::timeout(Duration::from_millis(50), convo.send("hi")).await;
        assert!(cancelled.is_err());
        assert_eq!(convo.state(), LoopState::AwaitingUserInput);
        assert!(convo.context().is_empty());
    }

    #[tokio::test]
    async fn close_reaches_the_host() {
        let mut convo = conversation([], answer_with_query);
        convo.close().await;
        convo.close().await;
        assert_eq!(convo.host().closed, 2);
    }
}
