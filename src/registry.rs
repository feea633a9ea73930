//! Tool and instruction registry.
//!
//! Tools and instructions are registered under unique names with
//! last-write-wins semantics. Each registration snapshots whatever entry it
//! displaced, and unregistering restores that snapshot — so independent
//! callers can mount and unmount their entries in any order without
//! clobbering each other. Consumers never read the live maps directly; they
//! take a [`RegistrySnapshot`] so one step always sees a coherent view.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Raw string parameters as they appear in a parsed tool invocation,
/// in source order.
pub type RawParams = Vec<(String, String)>;

/// Look up a raw parameter value by name.
pub fn raw_param<'a>(params: &'a RawParams, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Declared parameter of a tool, rendered into the system prompt.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: &'static str,
    pub description: String,
    pub example: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(
        name: &'static str,
        description: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            example: example.into(),
            required: true,
        }
    }

    pub fn optional(
        name: &'static str,
        description: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            example: example.into(),
            required: false,
        }
    }
}

/// Non-behavioral tool/instruction annotations.
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    /// Which caller registered the entry (a frontend, a plugin, ...).
    pub provider: Option<String>,
    /// Registered by the engine itself.
    pub builtin: bool,
    /// Hidden from prompt assembly without being unregistered.
    pub disabled: bool,
}

/// A named operation the model may invoke.
///
/// `validate` owns the trust boundary: an `Ok` return is taken as
/// well-typed parameters and handed to `execute` without further checks;
/// an `Err` carries a human-readable summary that is fed back to the model
/// as a bad-input result. Validators must not panic on ordinary bad input.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    fn params(&self) -> Vec<ToolParam>;

    fn validate(&self, raw: &RawParams) -> Result<Value, String>;

    async fn execute(&self, params: Value) -> Result<Value, ToolError>;

    /// Render a handler result for the next model turn.
    fn format(&self, result: &Value) -> String;

    /// Require human approval before `execute` may run.
    fn needs_approval(&self) -> bool {
        false
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata::default()
    }
}

/// Named free-text guidance injected into the system prompt.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub name: String,
    pub text: String,
    pub metadata: EntryMetadata,
}

impl Instruction {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            metadata: EntryMetadata::default(),
        }
    }
}

// === Registry ===

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    instructions: HashMap<String, Instruction>,
}

/// Shared, mutable registry of tools and instructions.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its name, displacing any existing entry.
    ///
    /// The returned guard restores the displaced entry (or removes the name
    /// entirely if there was none) when unregistered.
    pub fn register_tool(&self, tool: Arc<dyn AgentTool>) -> ToolRegistration {
        let name = tool.name().to_string();
        let previous = {
            let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.tools.insert(name.clone(), tool)
        };
        ToolRegistration {
            registry: self.clone(),
            name,
            previous,
        }
    }

    /// Register an instruction under its name, displacing any existing entry.
    pub fn register_instruction(&self, instruction: Instruction) -> InstructionRegistration {
        let name = instruction.name.clone();
        let previous = {
            let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
            inner.instructions.insert(name.clone(), instruction)
        };
        InstructionRegistration {
            registry: self.clone(),
            name,
            previous,
        }
    }

    /// Remove a tool without restoring anything.
    pub fn unregister_tool(&self, name: &str) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.tools.remove(name);
    }

    /// Remove an instruction without restoring anything.
    pub fn unregister_instruction(&self, name: &str) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.instructions.remove(name);
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.tools.get(name).cloned()
    }

    pub fn instruction(&self, name: &str) -> Option<Instruction> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.instructions.get(name).cloned()
    }

    /// Take a coherent point-in-time view of the registry.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        RegistrySnapshot {
            tools: inner.tools.clone(),
            instructions: inner.instructions.clone(),
        }
    }
}

/// Guard restoring the tool entry displaced by a registration.
pub struct ToolRegistration {
    registry: Registry,
    name: String,
    previous: Option<Arc<dyn AgentTool>>,
}

impl ToolRegistration {
    /// Remove the current entry under this name and restore the one this
    /// registration displaced.
    pub fn unregister(self) {
        let mut inner = self
            .registry
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.tools.remove(&self.name);
        if let Some(previous) = self.previous {
            inner.tools.insert(self.name, previous);
        }
    }
}

/// Guard restoring the instruction entry displaced by a registration.
pub struct InstructionRegistration {
    registry: Registry,
    name: String,
    previous: Option<Instruction>,
}

impl InstructionRegistration {
    pub fn unregister(self) {
        let mut inner = self
            .registry
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.instructions.remove(&self.name);
        if let Some(previous) = self.previous {
            inner.instructions.insert(self.name, previous);
        }
    }
}

// === Snapshot ===

/// Immutable view of the registry, taken once per step.
///
/// Prompt assembly, response parsing, and tool lookup within a single step
/// all read from the same snapshot, so concurrent registrations never hand
/// a step a half-updated tool set.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    instructions: HashMap<String, Instruction>,
}

impl RegistrySnapshot {
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    pub fn tools(&self) -> impl Iterator<Item = &Arc<dyn AgentTool>> {
        self.tools.values()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    /// All registered tool names, for tag matching.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// All parameter names declared by any registered tool, for tag matching.
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .flat_map(|tool| tool.params())
            .map(|param| param.name.to_string())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

}
