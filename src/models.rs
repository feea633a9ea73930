//! Request/response models for OpenAI-compatible chat completion endpoints.

use serde::{Deserialize, Serialize};

// === Core Message Types ===

/// Role of a wire-format chat message.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

/// A single role-tagged message as the completion endpoint expects it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request payload for a chat completion call.
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_completion_tokens: None,
            stream: None,
        }
    }
}

// === Streaming Structures ===

/// One incremental update from a streamed completion.
///
/// Either field may be absent in any given SSE chunk; reasoning models
/// interleave `reasoning` fragments before (and sometimes between) content
/// fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
}

impl StreamDelta {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.reasoning.is_none()
    }
}

// === Non-Streaming Response ===

/// Token usage metadata for a response.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Usage {
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u32,
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u32,
}

/// Final aggregated message of a non-streaming completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: Usage,
}
