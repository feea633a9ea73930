//! Built-in tool for asking the user a clarifying question.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{parse_string_array, required_raw};
use crate::error::ToolError;
use crate::registry::{AgentTool, EntryMetadata, RawParams, ToolParam};

pub struct AskFollowupTool;

#[async_trait]
impl AgentTool for AskFollowupTool {
    fn name(&self) -> &str {
        "ask_followup_question"
    }

    fn description(&self) -> String {
        "Ask the user a question to gather additional information needed to complete the task. \
         This tool should be used when you encounter ambiguities, need clarification, or require \
         more details to proceed effectively. It allows for interactive problem-solving by \
         enabling direct communication with the user. Use this tool judiciously to maintain a \
         balance between gathering necessary information and avoiding excessive back-and-forth"
            .to_string()
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required(
                "question",
                "The question to ask the user. This should be a clear, specific question that \
                 addresses the information you need",
                "Your question here",
            ),
            ToolParam::optional(
                "options",
                "An array of 2-5 options for the user to choose from. Each option should be a \
                 string describing a possible answer. You may not always need to provide options, \
                 but it may be helpful in many cases where it can save the user from having to \
                 type out a response manually",
                r#"Array of options here (optional), e.g. ["Option 1", "Option 2", "Option 3"]"#,
            ),
        ]
    }

    fn validate(&self, raw: &RawParams) -> Result<Value, String> {
        let question = required_raw(raw, "question")?;
        let options = match crate::registry::raw_param(raw, "options") {
            Some(raw_options) => Some(parse_string_array(raw_options)?),
            None => None,
        };
        Ok(json!({ "question": question, "options": options }))
    }

    async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
        Err(ToolError::not_available(
            "ask_followup_question must be answered by the embedding frontend",
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
