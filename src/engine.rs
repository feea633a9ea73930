//! Core agent engine.
//!
//! [`Engine`] drives one "step" at a time against a chat completion
//! endpoint: it assembles the system prompt from a registry snapshot,
//! converts the message log to wire format, streams a completion into a
//! partial assistant message, parses the result into content blocks, and
//! either records a pending tool invocation or loops on its internal retry
//! budget. All recoverable outcomes (abort, API failure, exhausted limits,
//! validation errors) are recorded as message-log entries; only caller
//! contract violations surface as `Err`.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::ChatClient;
use crate::error::EngineError;
use crate::message::{
    AgentMessage, ConversionMode, EventKind, Task, TextMessage, ToolMessage, ToolState,
    to_wire_messages,
};
use crate::models::{ChatRequest, WireMessage};
use crate::parser::parse_assistant_message;
use crate::prompt::{DEFAULT_SYSTEM_TEMPLATE, render_system_prompt};
use crate::registry::{AgentTool, Instruction, Registry, RegistrySnapshot};
use crate::tools::{AskFollowupTool, AttemptCompletionTool, SuggestNextStepTool};

/// Caller-supplied tool visibility predicate.
pub type ToolPredicate = Arc<dyn Fn(&dyn AgentTool) -> bool + Send + Sync>;
/// Caller-supplied instruction visibility predicate.
pub type InstructionPredicate = Arc<dyn Fn(&Instruction) -> bool + Send + Sync>;

pub const DEFAULT_MAX_STEPS: u32 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_SUMMARY_TOKENS: u32 = 12;

// === Options ===

/// Per-call options for [`Engine::next_step`].
///
/// Unset fields fall back to the engine defaults, then to built-ins.
#[derive(Clone, Default)]
pub struct StepOptions {
    pub model: Option<String>,
    pub require_tool: Option<bool>,
    pub max_retries: Option<u32>,
    pub max_steps: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt_template: Option<String>,
    pub tool_filter: Option<ToolPredicate>,
    pub instruction_filter: Option<InstructionPredicate>,
    pub cancel: Option<CancellationToken>,
}

impl StepOptions {
    /// Layer these options over `defaults`, set fields winning.
    fn layered_over(self, defaults: &StepOptions) -> StepOptions {
        StepOptions {
            model: self.model.or_else(|| defaults.model.clone()),
            require_tool: self.require_tool.or(defaults.require_tool),
            max_retries: self.max_retries.or(defaults.max_retries),
            max_steps: self.max_steps.or(defaults.max_steps),
            temperature: self.temperature.or(defaults.temperature),
            system_prompt_template: self
                .system_prompt_template
                .or_else(|| defaults.system_prompt_template.clone()),
            tool_filter: self.tool_filter.or_else(|| defaults.tool_filter.clone()),
            instruction_filter: self
                .instruction_filter
                .or_else(|| defaults.instruction_filter.clone()),
            cancel: self.cancel.or_else(|| defaults.cancel.clone()),
        }
    }

    fn resolve(self, defaults: &StepOptions) -> Result<StepConfig, EngineError> {
        let layered = self.layered_over(defaults);
        let model = layered.model.ok_or(EngineError::MissingModel)?;
        Ok(StepConfig {
            model,
            require_tool: layered.require_tool.unwrap_or(false),
            max_retries: layered.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_steps: layered.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
            temperature: layered.temperature.unwrap_or(0.0),
            system_prompt_template: layered
                .system_prompt_template
                .unwrap_or_else(|| DEFAULT_SYSTEM_TEMPLATE.to_string()),
            tool_filter: layered.tool_filter,
            instruction_filter: layered.instruction_filter,
            cancel: layered.cancel.unwrap_or_default(),
        })
    }
}

/// Fully resolved step configuration.
struct StepConfig {
    model: String,
    require_tool: bool,
    max_retries: u32,
    max_steps: u32,
    temperature: f32,
    system_prompt_template: String,
    tool_filter: Option<ToolPredicate>,
    instruction_filter: Option<InstructionPredicate>,
    cancel: CancellationToken,
}

/// Per-call options for [`Engine::summarize`].
#[derive(Clone, Default)]
pub struct SummarizeOptions {
    pub model: Option<String>,
    pub max_completion_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl SummarizeOptions {
    fn resolve(self, defaults: &SummarizeOptions) -> Result<(String, u32, f32), EngineError> {
        let model = self
            .model
            .or_else(|| defaults.model.clone())
            .ok_or(EngineError::MissingModel)?;
        let max_tokens = self
            .max_completion_tokens
            .or(defaults.max_completion_tokens)
            .unwrap_or(DEFAULT_SUMMARY_TOKENS);
        let temperature = self
            .temperature
            .or(defaults.temperature)
            .unwrap_or(0.0);
        Ok((model, max_tokens, temperature))
    }
}

/// Environment-level defaults applied beneath call-site options.
#[derive(Clone, Default)]
pub struct EngineDefaults {
    pub step: StepOptions,
    pub summarize: SummarizeOptions,
}

// === Engine ===

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
You are a helpful assistant that summarizes the conversation between the user and the assistant.
Your task is to summarize the conversation in a concise and clear manner, highlighting the key points and any important information.

RULES:
- The summary should be in a single phrase with only a few (3-10) words.
- The summary should be concise and should not include any unnecessary details.
- The summary will be used as the title of the conversation, so it should be a short, catchy phrase that captures the essence of the conversation.";

enum StreamOutcome {
    Completed(String),
    Aborted,
    Failed(anyhow::Error),
}

/// The agent execution engine: a chat client, a tool/instruction registry,
/// and layered defaults.
pub struct Engine {
    client: ChatClient,
    registry: Registry,
    defaults: EngineDefaults,
}

impl Engine {
    /// Create an engine and register the built-in tools.
    pub fn new(client: ChatClient, defaults: EngineDefaults) -> Self {
        let registry = Registry::new();
        // Registration guards are dropped deliberately: built-ins stay for
        // the engine's lifetime.
        registry.register_tool(Arc::new(AskFollowupTool));
        registry.register_tool(Arc::new(AttemptCompletionTool));
        registry.register_tool(Arc::new(SuggestNextStepTool));
        Self {
            client,
            registry,
            defaults,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one step: at most one completion round-trip per retry, ending in
    /// plain text, a pending tool call, or a sentinel event.
    pub async fn next_step(
        &self,
        task: &mut Task,
        options: StepOptions,
    ) -> Result<(), EngineError> {
        let config = options.resolve(&self.defaults.step)?;

        if task.consecutive_steps >= config.max_steps {
            task.push_event(EventKind::MaxStepsReached);
            return Ok(());
        }
        task.consecutive_steps += 1;

        for retry in 0..config.max_retries {
            let snapshot = self.registry.snapshot();
            let system = self.build_system_prompt(&snapshot, &config);
            let mut wire = Vec::with_capacity(task.messages.len() + 1);
            wire.push(WireMessage::system(system));
            wire.extend(to_wire_messages(&task.messages, ConversionMode::Normal)?);

            tracing::debug!(
                step = task.consecutive_steps,
                retry,
                max_retries = config.max_retries,
                model = %config.model,
                "running step"
            );

            task.messages
                .push(AgentMessage::Text(TextMessage::partial_assistant()));

            let mut request = ChatRequest::new(config.model.clone(), wire);
            request.temperature = Some(config.temperature);

            let full_text = match self.stream_into_task(task, &request, &config.cancel).await {
                StreamOutcome::Completed(text) => text,
                StreamOutcome::Aborted => {
                    if let Some(AgentMessage::Text(message)) = task.messages.last_mut() {
                        message.partial = false;
                        message.aborted = true;
                    }
                    task.push_event(EventKind::Abort);
                    return Ok(());
                }
                StreamOutcome::Failed(error) => {
                    tracing::warn!(error = %error, "completion stream failed");
                    task.messages.pop();
                    task.push_event(EventKind::ApiError);
                    return Ok(());
                }
            };

            let blocks = parse_assistant_message(&full_text, &snapshot);
            let text_content = blocks
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            if let Some(AgentMessage::Text(message)) = task.messages.last_mut() {
                message.content = text_content;
                message.partial = false;
            }

            let tool_use = blocks
                .into_iter()
                .find_map(|block| match block {
                    crate::parser::ContentBlock::ToolUse(tool_use) => Some(tool_use),
                    crate::parser::ContentBlock::Text { .. } => None,
                });
            let Some(tool_use) = tool_use else {
                if config.require_tool {
                    task.messages
                        .push(AgentMessage::Tool(ToolMessage::no_tool_sentinel()));
                    continue;
                }
                return Ok(());
            };

            // The parser only emits names present in this snapshot, but stay
            // defensive: an unknown name costs a retry like any bad input.
            let Some(tool) = snapshot.tool(&tool_use.name).cloned() else {
                let error = format!("Unknown tool: {}", tool_use.name);
                task.messages
                    .push(AgentMessage::Tool(ToolMessage::bad_input(tool_use, error)));
                continue;
            };

            match tool.validate(&tool_use.params) {
                Err(error) => {
                    task.messages
                        .push(AgentMessage::Tool(ToolMessage::bad_input(tool_use, error)));
                    continue;
                }
                Ok(params) => {
                    let state = if tool.needs_approval() {
                        ToolState::PendingApproval
                    } else {
                        ToolState::PendingResponse
                    };
                    task.messages
                        .push(AgentMessage::Tool(ToolMessage::pending(
                            tool_use, params, state,
                        )));
                    return Ok(());
                }
            }
        }

        task.push_event(EventKind::MaxRetriesReached);
        Ok(())
    }

    /// Derive a short task title from the conversation so far.
    ///
    /// One non-streaming call; failures propagate to the caller.
    pub async fn summarize(
        &self,
        task: &Task,
        options: SummarizeOptions,
    ) -> Result<String, EngineError> {
        let (model, max_tokens, temperature) = options.resolve(&self.defaults.summarize)?;

        let conversation = to_wire_messages(&task.messages, ConversionMode::Summary)?;
        let serialized = conversation
            .iter()
            .map(|message| serde_json::to_string(message).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            WireMessage::system(SUMMARIZE_SYSTEM_PROMPT),
            WireMessage::user(format!("Here are the conversation:\n{serialized}")),
        ];

        let mut request = ChatRequest::new(model, messages);
        request.temperature = Some(temperature);
        request.max_completion_tokens = Some(max_tokens);

        let response = self
            .client
            .complete(&request)
            .await
            .map_err(EngineError::Summarize)?;
        Ok(response.content.trim().to_string())
    }

    fn build_system_prompt(&self, snapshot: &RegistrySnapshot, config: &StepConfig) -> String {
        let mut tools: Vec<Arc<dyn AgentTool>> = snapshot
            .tools()
            .filter(|tool| !tool.metadata().disabled)
            .filter(|tool| match &config.tool_filter {
                Some(predicate) => predicate(tool.as_ref()),
                None => true,
            })
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));

        let mut instructions: Vec<Instruction> = snapshot
            .instructions()
            .filter(|instruction| !instruction.metadata.disabled)
            .filter(|instruction| match &config.instruction_filter {
                Some(predicate) => predicate(instruction),
                None => true,
            })
            .cloned()
            .collect();
        instructions.sort_by(|a, b| a.name.cmp(&b.name));

        render_system_prompt(
            &config.system_prompt_template,
            &tools,
            &instructions,
            config.require_tool,
        )
    }

    /// Stream one completion, mutating the trailing partial assistant
    /// message delta-by-delta. The cancellation token is checked between
    /// chunks; cancellation is an outcome, not an error.
    async fn stream_into_task(
        &self,
        task: &mut Task,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Aborted,
            result = self.client.stream(request) => match result {
                Ok(stream) => stream,
                Err(error) => return StreamOutcome::Failed(error),
            },
        };

        let mut content = String::new();
        let mut thought: Option<String> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StreamOutcome::Aborted,
                next = stream.next() => next,
            };
            let Some(delta) = next else { break };
            match delta {
                Ok(delta) => {
                    if let Some(fragment) = delta.content {
                        content.push_str(&fragment);
                    }
                    if let Some(fragment) = delta.reasoning {
                        thought.get_or_insert_default().push_str(&fragment);
                    }
                    if let Some(AgentMessage::Text(message)) = task.messages.last_mut() {
                        message.content.clone_from(&content);
                        message.thought.clone_from(&thought);
                    }
                }
                Err(error) => return StreamOutcome::Failed(error),
            }
        }

        StreamOutcome::Completed(content)
    }
}
