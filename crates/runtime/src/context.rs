//! Conversation context store.
//!
//! An append-only log of [`Turn`]s. Every append is checked against the
//! linkage rule: a `tool` turn must answer an invocation that an earlier
//! assistant turn requested and that has not been answered yet.
//!
//! A user turn is built inside a [`Draft`]. Turns appended through the draft
//! join the log when it is committed; dropping an uncommitted draft leaves
//! the log exactly as it was before [`ContextStore::begin`].

use crate::error::ContextError;
use crate::model::{InvocationRequest, InvocationResult, Turn};

/// Ordered, append-only conversation log.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    turns: Vec<Turn>,
    /// Ids of requested invocations without a tool turn, in request order.
    unanswered: Vec<String>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_system(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::system(text));
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), ContextError> {
        if !self.unanswered.is_empty() {
            return Err(ContextError::UnansweredInvocations(self.unanswered.len()));
        }
        self.turns.push(Turn::user(text));
        Ok(())
    }

    pub fn append_assistant(
        &mut self,
        text: Option<String>,
        invocations: Vec<InvocationRequest>,
    ) -> Result<(), ContextError> {
        for (i, request) in invocations.iter().enumerate() {
            let repeated = invocations[..i].iter().any(|r| r.id == request.id);
            if repeated || self.unanswered.contains(&request.id) {
                return Err(ContextError::DuplicateInvocation(request.id.clone()));
            }
        }
        self.unanswered
            .extend(invocations.iter().map(|r| r.id.clone()));
        self.turns.push(Turn::assistant(text, invocations));
        Ok(())
    }

    pub fn append_tool_result(&mut self, result: &InvocationResult) -> Result<(), ContextError> {
        let position = self
            .unanswered
            .iter()
            .position(|id| *id == result.request_id)
            .ok_or_else(|| ContextError::DanglingReference(result.request_id.clone()))?;
        self.unanswered.remove(position);
        self.turns.push(Turn::tool(result));
        Ok(())
    }

    /// The full log in append order.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Invocation ids still waiting for a tool turn.
    pub fn unanswered(&self) -> &[String] {
        &self.unanswered
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Start staging the turns of one user exchange.
    pub fn begin(&mut self) -> Draft<'_> {
        Draft {
            base_len: self.turns.len(),
            base_unanswered: self.unanswered.clone(),
            store: self,
            committed: false,
        }
    }
}

/// Turns staged for one user exchange.
///
/// Appends are checked exactly like appends on the store. The staged turns
/// are visible through [`Draft::snapshot`] so they can be sent to the model,
/// but they only become part of the log on [`Draft::commit`].
#[derive(Debug)]
pub struct Draft<'a> {
    store: &'a mut ContextStore,
    base_len: usize,
    base_unanswered: Vec<String>,
    committed: bool,
}

impl Draft<'_> {
    pub fn append_user(&mut self, text: impl Into<String>) -> Result<(), ContextError> {
        self.store.append_user(text)
    }

    pub fn append_assistant(
        &mut self,
        text: Option<String>,
        invocations: Vec<InvocationRequest>,
    ) -> Result<(), ContextError> {
        self.store.append_assistant(text, invocations)
    }

    pub fn append_tool_result(&mut self, result: &InvocationResult) -> Result<(), ContextError> {
        self.store.append_tool_result(result)
    }

    /// Committed log followed by the staged turns.
    pub fn snapshot(&self) -> &[Turn] {
        self.store.snapshot()
    }

    /// Number of turns staged so far.
    pub fn staged(&self) -> usize {
        self.store.len() - self.base_len
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Draft<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.turns.truncate(self.base_len);
            self.store.unanswered = std::mem::take(&mut self.base_unanswered);
        }
    }
}
