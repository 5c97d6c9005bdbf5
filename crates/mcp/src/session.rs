//! Tool provider session (spawn, handshake, invoke, teardown).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::launch::LaunchSpec;
use crate::protocol::{
    CallToolParams, CallToolResult, Inbound, InitializeParams, InitializeResult, JsonRpcFrame,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsParams, ListToolsResult,
    RequestId, ServerInfo, Tool,
};
use crate::registry::{Registration, SessionEntry, SessionId, SessionRegistry};

/// Default bound on launch plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close` waits for the provider to exit on its own before killing it.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Maximum frame size (1MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Handshaking,
    Ready,
    Closed,
}

/// Discovered tools, keyed by name.
pub type Catalog = BTreeMap<String, Tool>;

/// Outcome of one tool call as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub is_error: bool,
    pub content: String,
}

impl CallOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: content.into(),
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: content.into(),
        }
    }
}

/// Why the transport stopped being usable.
#[derive(Debug, Clone)]
enum Failure {
    Transport(String),
    Protocol(String),
}

impl Failure {
    fn to_error(&self) -> Error {
        match self {
            Failure::Transport(msg) => Error::Transport(msg.clone()),
            Failure::Protocol(msg) => Error::Protocol(msg.clone()),
        }
    }
}

type Reply = oneshot::Sender<Result<JsonRpcResponse>>;

/// Requests awaiting a response, shared with the stdout reader task.
#[derive(Default)]
struct Inbox {
    pending: HashMap<RequestId, Reply>,
    /// Requests whose caller gave up; a late response for these is dropped.
    abandoned: HashSet<RequestId>,
    failure: Option<Failure>,
}

type SharedInbox = Arc<Mutex<Inbox>>;

fn lock(inbox: &SharedInbox) -> std::sync::MutexGuard<'_, Inbox> {
    inbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves its request to `abandoned` if dropped before the response arrived.
struct PendingGuard {
    id: RequestId,
    inbox: SharedInbox,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut inbox = lock(&self.inbox);
        if inbox.pending.remove(&self.id).is_some() {
            inbox.abandoned.insert(self.id.clone());
        }
    }
}

/// A live connection to one tool provider process.
///
/// The session exclusively owns the child process. It is created by
/// [`Session::connect`], used for sequential [`Session::invoke`] calls and
/// released by [`Session::close`] (or, as a last resort, on drop).
pub struct Session {
    id: SessionId,
    executable: PathBuf,
    state: SessionState,
    child: Option<Child>,
    /// Process group led by the provider (unix).
    group: Option<u32>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<()>>,
    inbox: SharedInbox,
    next_id: i64,
    write_in_progress: bool,
    server_info: Option<ServerInfo>,
    catalog: Catalog,
    registration: Option<Registration>,
}

impl Session {
    /// Launch the provider and complete the handshake within `timeout`.
    ///
    /// On timeout or handshake failure the provider and everything it started
    /// are killed at once, without the [`CLOSE_GRACE`] wait.
    pub async fn connect(spec: &LaunchSpec, timeout: Duration) -> Result<Self> {
        let mut session = Self::spawn(spec)?;
        session.state = SessionState::Handshaking;

        let handshake = tokio::time::timeout(timeout, session.handshake()).await;
        match handshake {
            Ok(Ok(())) => {
                session.state = SessionState::Ready;
                info!(
                    session = %session.id,
                    provider = %session.executable.display(),
                    tools = session.catalog.len(),
                    "tool provider ready"
                );
                Ok(session)
            }
            Ok(Err(e)) => {
                warn!(session = %session.id, error = %e, "handshake failed");
                session.shutdown(None).await;
                Err(e)
            }
            Err(_) => {
                warn!(session = %session.id, ?timeout, "handshake timed out");
                session.shutdown(None).await;
                Err(Error::ConnectTimeout(timeout))
            }
        }
    }

    fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut process = spec
            .command()?
            .spawn()
            .map_err(|e| Error::Launch(format!("{}: {e}", spec.executable.display())))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Launch("failed to capture stdin".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Launch("failed to capture stdout".into()))?;
        let stderr = process
            .stderr
            .take()
            .ok_or_else(|| Error::Launch("failed to capture stderr".into()))?;

        let id = SessionId::new();
        let inbox = SharedInbox::default();
        let provider = spec.executable.display().to_string();
        debug!(session = %id, %provider, pid = ?process.id(), "spawned tool provider");

        Ok(Self {
            id,
            executable: spec.executable.clone(),
            state: SessionState::Uninitialized,
            group: process.id(),
            child: Some(process),
            stdin: Some(stdin),
            reader: Some(tokio::spawn(read_frames(stdout, Arc::clone(&inbox)))),
            stderr: Some(tokio::spawn(drain_stderr(stderr, provider))),
            inbox,
            next_id: 1,
            write_in_progress: false,
            server_info: None,
            catalog: Catalog::new(),
            registration: None,
        })
    }

    async fn handshake(&mut self) -> Result<()> {
        let init: InitializeResult = self
            .request("initialize", InitializeParams::default())
            .await?;
        debug!(
            server = %init.server_info.name,
            protocol = %init.protocol_version,
            "initialize accepted"
        );
        self.server_info = Some(init.server_info);
        self.notify("notifications/initialized").await?;

        let mut params = ListToolsParams::default();
        loop {
            let page: ListToolsResult = self.request("tools/list", &params).await?;
            for tool in page.tools {
                self.catalog.insert(tool.name.clone(), tool);
            }
            match page.next_cursor {
                Some(cursor) => params.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Server info reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// The discovered tool catalog. No I/O.
    pub fn list_tools(&self) -> &Catalog {
        &self.catalog
    }

    /// Record this session in a shared inventory until it closes.
    pub fn register(&mut self, registry: &SessionRegistry) {
        if self.state == SessionState::Closed {
            return;
        }
        self.registration = Some(registry.insert(SessionEntry {
            id: self.id,
            executable: self.executable.clone(),
            pid: self.child.as_ref().and_then(Child::id),
            started_at: SystemTime::now(),
        }));
    }

    /// Call one tool and wait up to `timeout` for its response.
    ///
    /// Tool-side failures (a JSON-RPC error for the call, or `isError` in the
    /// result) come back as a failed [`CallOutcome`]. Transport failures and
    /// timeouts are returned as errors and leave the session `Closed`.
    pub async fn invoke(
        &mut self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<CallOutcome> {
        self.ensure_ready().await?;

        if !self.catalog.contains_key(name) {
            return Ok(CallOutcome::failure(format!("unknown tool: {name}")));
        }

        let id = self.next_request_id();
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        debug!(session = %self.id, request_id = %id, tool = %name, "calling tool");

        let exchanged =
            tokio::time::timeout(timeout, self.exchange(id.clone(), "tools/call", params)).await;
        let response = match exchanged {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.fail(e).await),
            Err(_) => return Err(self.fail(Error::InvokeTimeout { id, timeout }).await),
        };

        let value = match response.into_result() {
            Ok(value) => value,
            Err(rpc) => return Ok(CallOutcome::failure(format!("provider error {rpc}"))),
        };

        match serde_json::from_value::<CallToolResult>(value) {
            Ok(result) if result.is_error => Ok(CallOutcome::failure(result.text())),
            Ok(result) => Ok(CallOutcome::success(result.text())),
            Err(e) => {
                let err = Error::Protocol(format!("malformed tools/call result: {e}"));
                Err(self.fail(err).await)
            }
        }
    }

    /// Terminate the provider and release the transport.
    ///
    /// Safe from any state and idempotent. Closing stdin asks the provider to
    /// exit; if it is still running after [`CLOSE_GRACE`] it is killed. Any
    /// process it started is killed either way.
    pub async fn close(&mut self) {
        self.shutdown(Some(CLOSE_GRACE)).await;
    }

    /// Tear down the transport, waiting up to `grace` for a clean exit
    /// (`None` kills immediately).
    async fn shutdown(&mut self, grace: Option<Duration>) {
        if self.state == SessionState::Closed && self.child.is_none() {
            return;
        }
        self.state = SessionState::Closed;
        self.stdin = None;

        if let Some(mut child) = self.child.take() {
            let exited = match grace {
                Some(grace) => match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        debug!(session = %self.id, %status, "tool provider exited");
                        true
                    }
                    _ => false,
                },
                None => false,
            };
            if !exited {
                kill_group(self.group);
                if let Err(e) = child.kill().await {
                    warn!(session = %self.id, error = %e, "failed to kill tool provider");
                }
            }
        }
        // Stragglers the provider left behind after exiting on its own.
        kill_group(self.group.take());

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
        {
            let mut inbox = lock(&self.inbox);
            inbox.pending.clear();
            inbox.abandoned.clear();
        }
        self.registration = None;
        info!(session = %self.id, "session closed");
    }

    // --- Internal methods ---

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        id
    }

    async fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Closed => return Err(Error::Closed),
            state => return Err(Error::NotReady { state }),
        }

        let failure = lock(&self.inbox).failure.clone();
        if let Some(failure) = failure {
            return Err(self.fail(failure.to_error()).await);
        }
        if self.write_in_progress {
            let err = Error::Transport("previous write was interrupted".into());
            return Err(self.fail(err).await);
        }
        Ok(())
    }

    async fn fail(&mut self, error: Error) -> Error {
        if error.is_session_fatal() {
            warn!(session = %self.id, %error, "session-fatal error");
            self.close().await;
        }
        error
    }

    async fn request<P, R>(&mut self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let response = self
            .exchange(id, method, serde_json::to_value(params)?)
            .await?;
        let value = response
            .into_result()
            .map_err(|rpc| Error::Protocol(format!("{method} rejected: {rpc}")))?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed {method} result: {e}")))
    }

    /// Send one request and wait for the response with the same id.
    async fn exchange(
        &mut self,
        id: RequestId,
        method: &str,
        params: Value,
    ) -> Result<JsonRpcResponse> {
        let request = JsonRpcRequest::new(id.clone(), method).with_params(params)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut inbox = lock(&self.inbox);
            if let Some(failure) = &inbox.failure {
                return Err(failure.to_error());
            }
            inbox.pending.insert(id.clone(), tx);
        }
        let _guard = PendingGuard {
            id,
            inbox: Arc::clone(&self.inbox),
        };

        self.write_frame(&request).await?;

        match rx.await {
            Ok(reply) => reply,
            Err(_) => Err(Error::Transport("response reader stopped".into())),
        }
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        self.write_frame(&JsonRpcNotification::new(method)).await
    }

    async fn write_frame(&mut self, frame: &impl Serialize) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');

        let stdin = self.stdin.as_mut().ok_or(Error::Closed)?;
        self.write_in_progress = true;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        self.write_in_progress = false;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The child itself is killed by `kill_on_drop`; the tasks would
        // otherwise linger until their pipes close.
        kill_group(self.group.take());
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }
    }
}

/// Read newline-delimited frames from the provider and route responses to
/// their waiting requests.
async fn read_frames(stdout: ChildStdout, inbox: SharedInbox) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    let failure = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break Failure::Transport("provider closed its stdout".into()),
            Ok(size) if size > MAX_FRAME_SIZE => {
                break Failure::Protocol(
                    Error::OutputTooLarge {
                        size,
                        max: MAX_FRAME_SIZE,
                    }
                    .to_string(),
                );
            }
            Ok(_) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                if let Err(failure) = dispatch(frame, &inbox) {
                    break failure;
                }
            }
            Err(e) => break Failure::Transport(format!("read failed: {e}")),
        }
    };

    debug!(?failure, "response reader stopped");
    let mut inbox = lock(&inbox);
    for (_, reply) in inbox.pending.drain() {
        let _ = reply.send(Err(failure.to_error()));
    }
    inbox.failure = Some(failure);
}

fn dispatch(frame: &str, inbox: &SharedInbox) -> std::result::Result<(), Failure> {
    let frame: JsonRpcFrame = serde_json::from_str(frame)
        .map_err(|e| Failure::Protocol(format!("malformed frame: {e}")))?;

    match frame.classify().map_err(Failure::Protocol)? {
        Inbound::Message { method } => {
            debug!(%method, "ignoring provider message");
            Ok(())
        }
        Inbound::Response(response) => {
            let mut inbox = lock(inbox);
            if let Some(reply) = inbox.pending.remove(&response.id) {
                let _ = reply.send(Ok(response));
                Ok(())
            } else if inbox.abandoned.remove(&response.id) {
                debug!(request_id = %response.id, "discarding late response");
                Ok(())
            } else {
                Err(Failure::Protocol(format!(
                    "response id {} matches no outstanding request",
                    response.id
                )))
            }
        }
    }
}

/// SIGKILL every process in the provider's group.
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal and touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!(pgid, "killed provider process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

async fn drain_stderr(stderr: ChildStderr, provider: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "mcp::provider_stderr", %provider, "{line}");
    }
}
