//! Built-in tool suggesting next steps to the user. Ships disabled; a
//! frontend that renders suggestions can enable it with its own
//! registration.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{parse_string_array, required_raw};
use crate::error::ToolError;
use crate::registry::{AgentTool, EntryMetadata, RawParams, ToolParam};

pub struct SuggestNextStepTool;

#[async_trait]
impl AgentTool for SuggestNextStepTool {
    fn name(&self) -> &str {
        "suggest_next_step"
    }

    fn description(&self) -> String {
        "Suggest the next step for user to take based on the current task context. This tool is \
         useful when the conversation can both be ended or furthered. The options should be \
         short and actionable, helping the user to decide what to do next."
            .to_string()
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::optional(
            "options",
            "An array of suggested next steps for the user to consider",
            r#"["Get more information", "Go to related page", "Summarize your findings"]"#,
        )]
    }

    fn validate(&self, raw: &RawParams) -> Result<Value, String> {
        let options = parse_string_array(required_raw(raw, "options")?)?;
        Ok(json!({ "options": options }))
    }

    async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
        Err(ToolError::not_available(
            "suggest_next_step must be rendered by the embedding frontend",
        ))
    }

    fn format(&self, _result: &Value) -> String {
        String::new()
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            builtin: true,
            disabled: true,
            ..EntryMetadata::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_a_json_array_of_options() {
        let tool = SuggestNextStepTool;
        assert!(tool.validate(&Vec::new()).is_err());

        let params = vec![("options".to_string(), r#"["Continue", "Stop"]"#.to_string())];
        let value = tool.validate(&params).unwrap();
        assert_eq!(value["options"][0], "Continue");
    }
}
