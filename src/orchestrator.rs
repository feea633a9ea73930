//! Task orchestration: one active conversation wired to the engine.
//!
//! The orchestrator owns exactly one active [`SavedTask`] at a time and is
//! the only component that mutates its message log — always synchronously,
//! through the engine's step controller and the approval lifecycle. It
//! drives the automatic step loop (auto-executing `pending-response` tool
//! calls, halting on `pending-approval`), persists after every resolved
//! step, and exposes new/switch/abort/save operations over an injected
//! storage provider.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::approval;
use crate::engine::{Engine, StepOptions, SummarizeOptions};
use crate::message::{AgentMessage, ToolState};
use crate::store::{SavedTask, TaskStore, TaskSummary};

/// How an automatic step run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The turn finished (plain text, event, or resolved tool chain).
    Idle,
    /// A tool call is waiting for an approval decision.
    AwaitingApproval,
}

pub struct Orchestrator {
    engine: Arc<Engine>,
    store: Arc<dyn TaskStore>,
    step_options: StepOptions,
    summarize_options: SummarizeOptions,
    active: SavedTask,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<Engine>,
        store: Arc<dyn TaskStore>,
        step_options: StepOptions,
        summarize_options: SummarizeOptions,
    ) -> Self {
        Self {
            engine,
            store,
            step_options,
            summarize_options,
            active: SavedTask::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn active(&self) -> &SavedTask {
        &self.active
    }

    /// Token that aborts the current (or next) step run.
    ///
    /// Renews a token that was already consumed by a previous abort, so a
    /// stale cancellation never kills a fresh run.
    pub fn cancel_token(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.cancel.clone()
    }

    /// Signal cancellation of the in-flight step, if any.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Append a user message and drive the automatic step loop.
    pub async fn submit_user_input(&mut self, content: impl Into<String>) -> Result<RunOutcome> {
        self.active.task.messages.push(AgentMessage::user(content));
        // Fresh user input starts a fresh interaction.
        self.active.task.consecutive_steps = 0;
        self.run_until_blocked().await
    }

    /// Approve the pending tool call and resume stepping.
    pub async fn approve_pending(&mut self, feedback: Option<String>) -> Result<RunOutcome> {
        let engine = self.engine.clone();
        {
            let message = self.pending_tool_mut()?;
            approval::approve(message, engine.registry(), feedback).await?;
        }
        self.run_until_blocked().await
    }

    /// Reject the pending tool call and resume stepping, letting the model
    /// react to the rejection.
    pub async fn reject_pending(&mut self, feedback: Option<String>) -> Result<RunOutcome> {
        {
            let message = self.pending_tool_mut()?;
            approval::reject(message, feedback)?;
        }
        self.run_until_blocked().await
    }

    /// Save the current task (if non-empty), then start an empty one.
    pub async fn new_task(&mut self) -> Result<()> {
        self.save_active().await?;
        self.active = SavedTask::default();
        Ok(())
    }

    /// Replace the active task with a stored one. Unsaved state in the
    /// current task is lost unless the caller saved it first.
    pub async fn switch_task(&mut self, id: &str) -> Result<()> {
        let task = self
            .store
            .get(id)
            .await
            .context("failed to load task")?
            .unwrap_or_default();
        self.active = task;
        Ok(())
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>> {
        Ok(self.store.list().await?)
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        Ok(self.store.delete(id).await?)
    }

    pub async fn clear_tasks(&self) -> Result<()> {
        Ok(self.store.clear().await?)
    }

    /// Persist the active task, deriving a title first if it has none.
    pub async fn save_active(&mut self) -> Result<()> {
        if self.active.task.is_empty() {
            return Ok(());
        }
        if self.active.title.is_empty() {
            match self
                .engine
                .summarize(&self.active.task, self.summarize_options.clone())
                .await
            {
                Ok(title) => self.active.title = title,
                Err(error) => {
                    tracing::warn!(error = %error, "failed to summarize task; saving untitled");
                }
            }
        }
        self.store
            .save(&mut self.active)
            .await
            .context("failed to save task")?;
        Ok(())
    }

    /// Step repeatedly until a terminal condition or an approval gate.
    async fn run_until_blocked(&mut self) -> Result<RunOutcome> {
        let cancel = self.cancel_token();
        let outcome = loop {
            let mut options = self.step_options.clone();
            options.cancel = Some(cancel.clone());
            self.engine
                .next_step(&mut self.active.task, options)
                .await?;

            match self.active.task.messages.last().and_then(AgentMessage::as_tool) {
                Some(message) if message.state == ToolState::PendingApproval => {
                    break RunOutcome::AwaitingApproval;
                }
                Some(message) if message.state == ToolState::PendingResponse => {
                    let engine = self.engine.clone();
                    let message = self.pending_tool_mut()?;
                    approval::execute_pending(message, engine.registry()).await?;
                    // The resolved result feeds the next automatic step.
                    continue;
                }
                _ => break RunOutcome::Idle,
            }
        };
        self.save_active().await?;
        Ok(outcome)
    }

    fn pending_tool_mut(&mut self) -> Result<&mut crate::message::ToolMessage> {
        self.active
            .task
            .messages
            .last_mut()
            .and_then(AgentMessage::as_tool_mut)
            .context("no pending tool message to resolve")
    }
}
