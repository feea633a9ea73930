//! Built-in and bundled tools.
//!
//! The engine registers the three built-ins itself; `read_file` and
//! `run_command` are bundled for frontends that want working examples of an
//! auto-executing and an approval-gated tool.

pub mod completion;
pub mod followup;
pub mod read_file;
pub mod run_command;
pub mod suggest;

pub use completion::AttemptCompletionTool;
pub use followup::AskFollowupTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use suggest::SuggestNextStepTool;

use crate::registry::RawParams;

/// Parse an optional raw parameter holding a JSON array of strings.
///
/// Shared by the built-ins whose `options` parameter arrives as e.g.
/// `["Option 1", "Option 2"]`.
pub(crate) fn parse_string_array(raw: &str) -> Result<Vec<String>, String> {
    serde_json::from_str::<Vec<String>>(raw)
        .map_err(|_| format!("expected a JSON array of strings, got: {raw}"))
}

pub(crate) fn required_raw<'a>(params: &'a RawParams, name: &str) -> Result<&'a str, String> {
    match crate::registry::raw_param(params, name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("missing required parameter: {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_string_array_accepts_json_lists() {
        assert_eq!(
            parse_string_array(r#"["a", "b"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(parse_string_array("not json").is_err());
        assert!(parse_string_array(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn required_raw_rejects_missing_and_empty() {
        let params = vec![("question".to_string(), "why?".to_string())];
        assert_eq!(required_raw(&params, "question").unwrap(), "why?");
        assert!(required_raw(&params, "other").is_err());

        let empty = vec![("question".to_string(), String::new())];
        assert!(required_raw(&empty, "question").is_err());
    }
}
