//! System prompt assembly.
//!
//! The system prompt is a template with three placeholders: the catalogue of
//! visible tools, the catalogue of visible instructions, and an additional
//! rules block that only appears when the configuration mandates a tool call
//! on every turn. The default template is compiled in.

use std::sync::Arc;

use crate::registry::{AgentTool, Instruction};

/// Default system prompt template.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = include_str!("prompts/system.txt");

/// Replace every `{{key}}` occurrence in the template.
pub fn substitute(template: &str, params: &[(&str, &str)]) -> String {
    params.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Render the full system prompt from visible tools and instructions.
pub fn render_system_prompt(
    template: &str,
    tools: &[Arc<dyn AgentTool>],
    instructions: &[Instruction],
    require_tool: bool,
) -> String {
    let tools_block = render_tool_catalogue(tools);
    let instructions_block = render_instruction_catalogue(instructions);
    let additional_rules = if require_tool {
        "- For EACH of your message, you MUST select one best tool to be used."
    } else {
        ""
    };

    substitute(
        template,
        &[
            ("tools", &tools_block),
            ("instructions", &instructions_block),
            ("additional_rules", additional_rules),
        ],
    )
}

/// One section per tool: description, parameter table, and a worked usage
/// example built from each parameter's example value.
fn render_tool_catalogue(tools: &[Arc<dyn AgentTool>]) -> String {
    let mut out = String::new();
    for tool in tools {
        let params = tool.params();
        out.push_str(&format!(
            "\n## {}\n\nDescription: {}",
            tool.name(),
            tool.description()
        ));
        if !params.is_empty() {
            out.push_str("\n\nParameters:\n");
            for param in &params {
                let requirement = if param.required { "required" } else { "optional" };
                out.push_str(&format!(
                    "- {}: ({}) {}\n",
                    param.name, requirement, param.description
                ));
            }
        }
        out.push_str("\nUsage Example:\n");
        out.push_str(&format!("<{}>\n", tool.name()));
        for param in &params {
            out.push_str(&format!("<{}>{}</{}>\n", param.name, param.example, param.name));
        }
        out.push_str(&format!("</{}>\n\n", tool.name()));
    }
    out
}

fn render_instruction_catalogue(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instruction in instructions {
        out.push_str(&format!("\n## {}\n{}", instruction.name, instruction.text.trim()));
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::ToolError;
    use crate::registry::{RawParams, ToolParam};

    struct LookupTool;

    #[async_trait]
    impl AgentTool for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> String {
            "Search the index.".to_string()
        }
        fn params(&self) -> Vec<ToolParam> {
            vec![
                ToolParam::required("query", "The search query", "rust agents"),
                ToolParam::optional("limit", "Max results", "5"),
            ]
        }
        fn validate(&self, _raw: &RawParams) -> Result<Value, String> {
            Ok(Value::Null)
        }
        async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
        fn format(&self, _result: &Value) -> String {
            String::new()
        }
    }

    #[test]
    fn substitute_replaces_all_occurrences() {
        let out = substitute("{{a}} and {{a}} then {{b}}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x then y");
    }

    #[test]
    fn tool_catalogue_lists_params_and_example() {
        let out = render_tool_catalogue(&[Arc::new(LookupTool) as Arc<dyn AgentTool>]);
        assert!(out.contains("## lookup"));
        assert!(out.contains("Description: Search the index."));
        assert!(out.contains("- query: (required) The search query"));
        assert!(out.contains("- limit: (optional) Max results"));
        assert!(out.contains("<lookup>\n<query>rust agents</query>\n<limit>5</limit>\n</lookup>"));
    }

    #[test]
    fn require_tool_adds_additional_rule() {
        let with_rule = render_system_prompt(DEFAULT_SYSTEM_TEMPLATE, &[], &[], true);
        let without_rule = render_system_prompt(DEFAULT_SYSTEM_TEMPLATE, &[], &[], false);
        assert!(with_rule.contains("you MUST select one best tool"));
        assert!(!without_rule.contains("you MUST select one best tool"));
    }

    #[test]
    fn instructions_render_with_headers() {
        let out = render_instruction_catalogue(&[Instruction::new("tone", "Be concise.\n")]);
        assert_eq!(out, "\n## tone\nBe concise.\n\n");
    }
}
