//! Workspace-rooted file reading tool.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::required_raw;
use crate::error::ToolError;
use crate::registry::{AgentTool, RawParams, ToolParam};

/// Longest file content returned to the model, in characters.
const MAX_CONTENT_CHARS: usize = 30_000;

pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Resolve a relative path inside the workspace, refusing traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let relative = Path::new(path);
        if relative.is_absolute() {
            return Err(ToolError::path_escape(path));
        }
        for component in relative.components() {
            if matches!(component, Component::ParentDir) {
                return Err(ToolError::path_escape(path));
            }
        }
        Ok(self.workspace.join(relative))
    }
}

#[async_trait]
impl AgentTool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> String {
        "Read a text file from the workspace and return its contents. Use this to inspect files \
         the user refers to. Paths are relative to the workspace root."
            .to_string()
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required(
            "path",
            "Workspace-relative path of the file to read",
            "src/main.rs",
        )]
    }

    fn validate(&self, raw: &RawParams) -> Result<Value, String> {
        let path = required_raw(raw, "path")?;
        Ok(json!({ "path": path }))
    }

    async fn execute(&self, params: Value) -> Result<Value, ToolError> {
        let path = params["path"]
            .as_str()
            .ok_or_else(|| ToolError::missing_field("path"))?;
        let resolved = self.resolve(path)?;
        let mut content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|error| ToolError::execution_failed(format!("{path}: {error}")))?;
        let truncated = content.chars().count() > MAX_CONTENT_CHARS;
        if truncated {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
        }
        Ok(json!({ "path": path, "content": content, "truncated": truncated }))
    }

    fn format(&self, result: &Value) -> String {
        let content = result["content"].as_str().unwrap_or_default();
        if result["truncated"].as_bool() == Some(true) {
            format!("{content}\n[content truncated]")
        } else {
            content.to_string()
        }
    }
}
