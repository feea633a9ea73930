//! Tool message approval and execution lifecycle.
//!
//! A pending tool message is resolved by exactly one of the operations
//! below. `completed` and `failed` are reachable only through a pending
//! state, and `rejected` only through `pending-approval`; anything else is
//! a caller contract violation. Handler failures are not errors here — the
//! message transitions to `failed` and the conversation continues.

use crate::error::EngineError;
use crate::message::{ToolMessage, ToolState};
use crate::registry::Registry;

/// Approve a `pending-approval` tool call and run its handler.
pub async fn approve(
    message: &mut ToolMessage,
    registry: &Registry,
    feedback: Option<String>,
) -> Result<(), EngineError> {
    if message.state != ToolState::PendingApproval {
        return Err(EngineError::InvalidToolState {
            from: message.state,
            attempted: "approve",
        });
    }
    message.feedback = feedback;
    run_handler(message, registry).await;
    Ok(())
}

/// Reject a `pending-approval` tool call, optionally with feedback.
pub fn reject(message: &mut ToolMessage, feedback: Option<String>) -> Result<(), EngineError> {
    if message.state != ToolState::PendingApproval {
        return Err(EngineError::InvalidToolState {
            from: message.state,
            attempted: "reject",
        });
    }
    message.state = ToolState::Rejected;
    message.feedback = feedback;
    Ok(())
}

/// Run the handler of a `pending-response` tool call (no approval gate).
pub async fn execute_pending(
    message: &mut ToolMessage,
    registry: &Registry,
) -> Result<(), EngineError> {
    if message.state != ToolState::PendingResponse {
        return Err(EngineError::InvalidToolState {
            from: message.state,
            attempted: "execute",
        });
    }
    run_handler(message, registry).await;
    Ok(())
}

/// Invoke the named tool's handler and record the terminal outcome.
async fn run_handler(message: &mut ToolMessage, registry: &Registry) {
    let Some(tool) = registry.tool(&message.invocation.name) else {
        // The tool was unregistered between dispatch and resolution.
        message.state = ToolState::Failed;
        message.formatted_result = Some(format!(
            "Tool {} is no longer registered",
            message.invocation.name
        ));
        return;
    };

    match tool.execute(message.params.clone()).await {
        Ok(result) => {
            message.formatted_result = Some(tool.format(&result));
            message.result = Some(result);
            message.state = ToolState::Completed;
        }
        Err(error) => {
            message.formatted_result = Some(error.to_string());
            message.state = ToolState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::error::ToolError;
    use crate::parser::ToolUse;
    use crate::registry::{AgentTool, RawParams, ToolParam};

    struct EchoTool {
        fail: bool,
    }

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> String {
            "Echo the input back.".to_string()
        }
        fn params(&self) -> Vec<ToolParam> {
            vec![ToolParam::required("text", "Text to echo", "hello")]
        }
        fn validate(&self, raw: &RawParams) -> Result<Value, String> {
            match crate::registry::raw_param(raw, "text") {
                Some(text) => Ok(json!({ "text": text })),
                None => Err("text is required".to_string()),
            }
        }
        async fn execute(&self, params: Value) -> Result<Value, ToolError> {
            if self.fail {
                return Err(ToolError::execution_failed("echo broke"));
            }
            Ok(params["text"].clone())
        }
        fn format(&self, result: &Value) -> String {
            result.as_str().unwrap_or_default().to_string()
        }
    }

    fn pending(state: ToolState) -> ToolMessage {
        ToolMessage::pending(
            ToolUse {
                name: "echo".to_string(),
                params: vec![("text".to_string(), "hi".to_string())],
                partial: false,
            },
            json!({ "text": "hi" }),
            state,
        )
    }

    fn registry_with_echo(fail: bool) -> Registry {
        let registry = Registry::new();
        let _guard = registry.register_tool(Arc::new(EchoTool { fail }));
        registry
    }

    #[tokio::test]
    async fn approve_runs_handler_to_completed() {
        let registry = registry_with_echo(false);
        let mut message = pending(ToolState::PendingApproval);

        approve(&mut message, &registry, None).await.unwrap();

        assert_eq!(message.state, ToolState::Completed);
        assert_eq!(message.formatted_result.as_deref(), Some("hi"));
        assert_eq!(message.result, Some(json!("hi")));
    }

    #[tokio::test]
    async fn handler_failure_transitions_to_failed() {
        let registry = registry_with_echo(true);
        let mut message = pending(ToolState::PendingResponse);

        execute_pending(&mut message, &registry).await.unwrap();

        assert_eq!(message.state, ToolState::Failed);
        assert!(
            message
                .formatted_result
                .as_deref()
                .unwrap()
                .contains("echo broke")
        );
    }

    #[tokio::test]
    async fn reject_requires_pending_approval() {
        let mut message = pending(ToolState::PendingResponse);
        let result = reject(&mut message, Some("no".to_string()));
        assert!(matches!(
            result,
            Err(EngineError::InvalidToolState { .. })
        ));

        let mut message = pending(ToolState::PendingApproval);
        reject(&mut message, Some("no".to_string())).unwrap();
        assert_eq!(message.state, ToolState::Rejected);
        assert_eq!(message.feedback.as_deref(), Some("no"));
    }

    #[tokio::test]
    async fn completed_message_cannot_be_approved_again() {
        let registry = registry_with_echo(false);
        let mut message = pending(ToolState::PendingApproval);
        approve(&mut message, &registry, None).await.unwrap();

        let result = approve(&mut message, &registry, None).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidToolState {
                from: ToolState::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn execute_requires_pending_response() {
        let registry = registry_with_echo(false);
        let mut message = pending(ToolState::PendingApproval);
        let result = execute_pending(&mut message, &registry).await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidToolState { .. })
        ));
    }

    #[tokio::test]
    async fn unregistered_tool_fails_the_message() {
        let registry = Registry::new();
        let mut message = pending(ToolState::PendingResponse);

        execute_pending(&mut message, &registry).await.unwrap();

        assert_eq!(message.state, ToolState::Failed);
        assert!(
            message
                .formatted_result
                .as_deref()
                .unwrap()
                .contains("no longer registered")
        );
    }
}
