//! Built-in tool for presenting the final result of a task.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::required_raw;
use crate::error::ToolError;
use crate::registry::{AgentTool, EntryMetadata, RawParams, ToolParam};

pub struct AttemptCompletionTool;

#[async_trait]
impl AgentTool for AttemptCompletionTool {
    fn name(&self) -> &str {
        "attempt_completion"
    }

    fn description(&self) -> String {
        "After each tool use, the user will respond with the result of that tool use, i.e. if it \
         succeeded or failed, along with any reasons for failure. Once you've received the \
         results of tool uses and can confirm that the task is complete, use this tool to present \
         the result of your work to the user. The user may respond with feedback if they are not \
         satisfied with the result, which you can use to make improvements and try again.\n\
         IMPORTANT NOTE: This tool CANNOT be used until you've confirmed from the user that any \
         previous tool uses were successful. Failure to do so will result in code corruption and \
         system failure. Before using this tool, you must ask yourself if you've confirmed from \
         the user that any previous tool uses were successful. If not, then DO NOT use this tool."
            .to_string()
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(
            "result",
            "The result of the task. Formulate this result in a way that is final and does not \
             require further input from the user. Don't end your result with questions or offers \
             for further assistance",
            "Your final result description here",
        )]
    }

    fn validate(&self, raw: &RawParams) -> Result<Value, String> {
        let result = required_raw(raw, "result")?;
        Ok(json!({ "result": result }))
    }

    async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
        Err(ToolError::not_available(
            "attempt_completion must be handled by the embedding frontend",
        ))
    }

    fn format(&self, _result: &Value) -> String {
        String::new()
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            builtin: true,
            ..EntryMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_result_param() {
        let tool = AttemptCompletionTool;
        assert!(tool.validate(&Vec::new()).is_err());

        let params = vec![("result".to_string(), "All done.".to_string())];
        let value = tool.validate(&params).unwrap();
        assert_eq!(value["result"], "All done.");
    }
}
