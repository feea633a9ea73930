//! Approval-gated shell command tool.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;

use super::required_raw;
use crate::error::ToolError;
use crate::registry::{AgentTool, RawParams, ToolParam};

/// Longest combined output returned to the model, in characters.
const MAX_OUTPUT_CHARS: usize = 10_000;
/// Wall-clock limit for a single command.
const COMMAND_TIMEOUT_SECS: u64 = 60;

pub struct RunCommandTool {
    workspace: PathBuf,
}

impl RunCommandTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

#[async_trait]
impl AgentTool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> String {
        "Run a shell command in the workspace and return its output and exit code. Every \
         invocation requires explicit user approval before it executes."
            .to_string()
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(
            "command",
            "The shell command to run",
            "ls -la",
        )]
    }

    fn validate(&self, raw: &RawParams) -> Result<Value, String> {
        let command = required_raw(raw, "command")?;
        Ok(json!({ "command": command }))
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let command = params["command"]
            .as_str()
            .ok_or_else(|| ToolError::missing_field("command"))?;

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(COMMAND_TIMEOUT_SECS),
            child,
        )
        .await
        .map_err(|_| {
            ToolError::execution_failed(format!(
                "command timed out after {COMMAND_TIMEOUT_SECS}s"
            ))
        })?
        .map_err(|error| ToolError::execution_failed(error.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        if combined.chars().count() > MAX_OUTPUT_CHARS {
            combined = combined.chars().take(MAX_OUTPUT_CHARS).collect();
            combined.push_str("\n[output truncated]");
        }

        Ok(json!({
            "exit_code": output.status.code(),
            "output": combined,
        }))
    }

    fn format(&self, result: &Value) -> String {
        let output = result["output"].as_str().unwrap_or_default();
        match result["exit_code"].as_i64() {
            Some(0) => output.to_string(),
            Some(code) => format!("[exit code {code}]\n{output}"),
            None => format!("[terminated by signal]\n{output}"),
        }
    }

    fn needs_approval(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunCommandTool::new(dir.path());

        let result = tool
            .execute(json!({ "command": "echo hello" }))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], 0);
        assert!(result["output"].as_str().unwrap().contains("hello"));
        assert_eq!(tool.format(&result).trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported_in_formatting() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunCommandTool::new(dir.path());

        let result = tool.execute(json!({ "command": "exit 3" })).await.unwrap();
        assert_eq!(result["exit_code"], 3);
        assert!(tool.format(&result).starts_with("[exit code 3]"));
    }

    #[test]
    fn always_requires_approval() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunCommandTool::new(dir.path()).needs_approval());
    }
}
