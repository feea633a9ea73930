//! Agent engine for streaming, tool-using chat completions.
//!
//! The engine streams completions from an OpenAI-compatible endpoint,
//! parses tag-embedded tool invocations out of the assistant text, drives a
//! bounded step/retry loop over an append-only message log, and hands
//! sensitive tool calls to an approval lifecycle. Frontends register tools
//! and instructions dynamically and plug in their own task storage.

pub mod approval;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod message;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod store;
pub mod tools;

pub use client::ChatClient;
pub use config::{Config, RetryPolicy};
pub use engine::{Engine, EngineDefaults, StepOptions, SummarizeOptions};
pub use error::{EngineError, StoreError, ToolError};
pub use message::{
    AgentMessage, ConversionMode, EventKind, Task, TextMessage, TextRole, ToolMessage, ToolState,
    to_wire_messages,
};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use parser::{ContentBlock, ToolUse, parse_assistant_message};
pub use registry::{
    AgentTool, EntryMetadata, Instruction, RawParams, Registry, RegistrySnapshot, ToolParam,
};
pub use store::{FileTaskStore, MemoryTaskStore, SavedTask, TaskStore, TaskSummary};
