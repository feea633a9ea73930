//! The append-only message log and its wire-format conversion.
//!
//! A [`Task`] owns an ordered log of typed messages: user/assistant text,
//! tool invocations with their lifecycle state, and sentinel events marking
//! why an automatic step sequence stopped. The log is the single source of
//! truth for a conversation; the only sanctioned mutations are streaming
//! updates to the newest partial assistant message and removal of a partial
//! message whose stream failed before producing content.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::models::{WireMessage, WireRole};
use crate::parser::ToolUse;

/// Tool name used for the synthetic "no tool was used" message.
pub const NO_TOOL_SENTINEL: &str = "_no_tool";

/// Formatted result attached to the no-tool sentinel message.
pub const NO_TOOL_RESULT: &str = "No tool use block found. You must use exactly one tool";

/// Corrective instruction sent back to the model when it failed to call a
/// tool even though one was required.
pub const NO_TOOL_USED_RESPONSE: &str = "\
[ERROR] You did not use a tool in your previous response.

Every reply must invoke exactly one tool, using the XML-style tag format
described in the system prompt, for example:

<tool_name>
<parameter_name>value</parameter_name>
</tool_name>

Pick the most appropriate tool and try again.";

// === Message Types ===

/// Role of a text message in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextRole {
    User,
    Assistant,
}

/// A user or assistant text turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub role: TextRole,
    pub content: String,
    /// Reasoning content streamed alongside the answer, when the model
    /// emits any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    /// Still being streamed.
    #[serde(default)]
    pub partial: bool,
    /// The stream was cancelled by the user before completing.
    #[serde(default)]
    pub aborted: bool,
}

impl TextMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TextRole::User,
            content: content.into(),
            thought: None,
            partial: false,
            aborted: false,
        }
    }

    /// An empty assistant message about to receive streamed deltas.
    pub fn partial_assistant() -> Self {
        Self {
            role: TextRole::Assistant,
            content: String::new(),
            thought: None,
            partial: true,
            aborted: false,
        }
    }
}

/// Lifecycle state of a tool invocation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    BadInput,
    PendingApproval,
    PendingResponse,
    Completed,
    Rejected,
    Failed,
}

impl ToolState {
    /// Terminal for the message; the step loop never revisits it.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ToolState::PendingApproval | ToolState::PendingResponse)
    }
}

/// A tool invocation and everything that happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    /// The invocation as the model emitted it (name + raw parameters).
    pub invocation: ToolUse,
    /// Validator-typed parameters. `Null` for bad-input messages.
    #[serde(default)]
    pub params: Value,
    pub state: ToolState,
    /// Raw handler result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Result rendered for the next model turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_result: Option<String>,
    /// Free-text feedback the user attached when resolving the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Opaque per-message scratch space for embedding UIs; never read by
    /// the engine.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ui_state: Value,
}

impl ToolMessage {
    /// A validated invocation waiting for approval or execution.
    pub fn pending(invocation: ToolUse, params: Value, state: ToolState) -> Self {
        Self {
            invocation,
            params,
            state,
            result: None,
            formatted_result: None,
            feedback: None,
            ui_state: Value::Null,
        }
    }

    /// An invocation whose raw parameters failed validation.
    pub fn bad_input(invocation: ToolUse, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            invocation,
            params: Value::Null,
            state: ToolState::BadInput,
            result: None,
            formatted_result: Some(error),
            feedback: None,
            ui_state: Value::Null,
        }
    }

    /// The synthetic message appended when a required tool call is missing.
    pub fn no_tool_sentinel() -> Self {
        Self {
            invocation: ToolUse {
                name: NO_TOOL_SENTINEL.to_string(),
                params: Vec::new(),
                partial: false,
            },
            params: Value::Null,
            state: ToolState::BadInput,
            result: None,
            formatted_result: Some(NO_TOOL_RESULT.to_string()),
            feedback: None,
            ui_state: Value::Null,
        }
    }
}

/// Why an automatic step sequence stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MaxStepsReached,
    MaxRetriesReached,
    ApiError,
    Abort,
}

/// One entry in a task's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentMessage {
    Text(TextMessage),
    Tool(ToolMessage),
    Event { event: EventKind },
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        AgentMessage::Text(TextMessage::user(content))
    }

    pub fn event(event: EventKind) -> Self {
        AgentMessage::Event { event }
    }

    pub fn as_tool(&self) -> Option<&ToolMessage> {
        match self {
            AgentMessage::Tool(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_tool_mut(&mut self) -> Option<&mut ToolMessage> {
        match self {
            AgentMessage::Tool(message) => Some(message),
            _ => None,
        }
    }
}

// === Task ===

/// One ongoing conversation: the message log plus the automatic step counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub consecutive_steps: u32,
}

impl Task {
    pub fn push_event(&mut self, event: EventKind) {
        self.messages.push(AgentMessage::event(event));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// === Wire Conversion ===

/// How unresolved tool messages are treated during conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Unresolved tool states are a caller contract violation.
    Normal,
    /// Unresolved tool states render as "waiting for user response"
    /// (summarization runs while a call may still be pending).
    Summary,
}

/// Map the internal log to the linear role sequence the endpoint expects.
///
/// Tool messages are folded in two halves: the invocation is appended to the
/// preceding assistant turn as the tag run the model originally emitted, and
/// the outcome becomes a user turn rendered from a state-specific template.
/// Event messages never cross the wire.
pub fn to_wire_messages(
    messages: &[AgentMessage],
    mode: ConversionMode,
) -> Result<Vec<WireMessage>, EngineError> {
    let mut out: Vec<WireMessage> = Vec::new();

    for message in messages {
        match message {
            AgentMessage::Text(text) => {
                let wire = match text.role {
                    TextRole::User => WireMessage::user(text.content.clone()),
                    TextRole::Assistant => WireMessage::assistant(text.content.clone()),
                };
                out.push(wire);
            }
            AgentMessage::Tool(tool) => {
                if tool.invocation.name == NO_TOOL_SENTINEL {
                    out.push(WireMessage::user(NO_TOOL_USED_RESPONSE));
                    continue;
                }
                if let Some(last) = out.last_mut()
                    && last.role == WireRole::Assistant
                {
                    last.content.push_str(&render_invocation(&tool.invocation));
                }
                out.push(WireMessage::user(render_outcome(tool, mode)?));
            }
            AgentMessage::Event { .. } => {}
        }
    }

    Ok(out)
}

/// Reconstruct the tag run exactly as the model would have emitted it.
fn render_invocation(invocation: &ToolUse) -> String {
    let mut text = format!("\n<{}>\n", invocation.name);
    for (name, value) in &invocation.params {
        text.push_str(&format!("<{name}>{value}</{name}>\n"));
    }
    text.push_str(&format!("</{}>", invocation.name));
    text
}

fn render_outcome(tool: &ToolMessage, mode: ConversionMode) -> Result<String, EngineError> {
    let mut content = format!("[Result for tool {}]\n", tool.invocation.name);
    let formatted = tool.formatted_result.as_deref().unwrap_or_default();

    match tool.state {
        ToolState::Completed => {
            content.push_str(formatted);
            push_feedback(&mut content, tool.feedback.as_deref());
        }
        ToolState::Failed => {
            content.push_str("[Tool failed with following error]\n");
            content.push_str(formatted);
            push_feedback(&mut content, tool.feedback.as_deref());
        }
        ToolState::Rejected => {
            content.push_str("[Tool was rejected by user]\n");
            push_feedback(&mut content, tool.feedback.as_deref());
        }
        ToolState::BadInput => {
            content.push_str("[Your input is invalid with following errors]\n");
            content.push_str(formatted);
        }
        ToolState::PendingApproval | ToolState::PendingResponse => match mode {
            ConversionMode::Summary => {
                content.push_str("[Tool is waiting for user response]\n");
            }
            ConversionMode::Normal => {
                return Err(EngineError::UnresolvedTool { state: tool.state });
            }
        },
    }

    Ok(content)
}

fn push_feedback(content: &mut String, feedback: Option<&str>) {
    if let Some(feedback) = feedback {
        content.push_str("\n\n[User also provided following feedback]\n");
        content.push_str(feedback);
    }
}
