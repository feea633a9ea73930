//! Task persistence.
//!
//! The engine never persists anything itself; the orchestration layer talks
//! to a [`TaskStore`]. Two implementations ship with the crate: an in-memory
//! store (the default) and a file-backed store keeping one JSON document per
//! task.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::message::Task;

/// A task with its persistence identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub task: Task,
}

/// Listing entry: identity without the message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&SavedTask> for TaskSummary {
    fn from(task: &SavedTask) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            updated_at: task.updated_at,
        }
    }
}

/// Storage provider contract consumed by the orchestration layer.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Summaries of all stored tasks, most recently updated first.
    async fn list(&self) -> Result<Vec<TaskSummary>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<SavedTask>, StoreError>;

    /// Create or update; assigns an id to new tasks and refreshes
    /// `updated_at`. Returns the assigned id.
    async fn save(&self, task: &mut SavedTask) -> Result<String, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

fn assign_identity(task: &mut SavedTask) {
    if task.id.is_empty() {
        task.id = Uuid::new_v4().to_string();
    }
    task.updated_at = Utc::now();
}

// === In-Memory Store ===

/// Volatile store; the default when no provider is injected.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<SavedTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self) -> Result<Vec<TaskSummary>, StoreError> {
        let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut summaries: Vec<TaskSummary> = tasks.iter().map(TaskSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get(&self, id: &str) -> Result<Option<SavedTask>, StoreError> {
        let tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tasks.iter().find(|task| task.id == id).cloned())
    }

    async fn save(&self, task: &mut SavedTask) -> Result<String, StoreError> {
        assign_identity(task);
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        Ok(task.id.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.retain(|task| task.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tasks.clear();
        Ok(())
    }
}

// === File Store ===

/// One pretty-printed JSON file per task under a data directory.
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data directory, e.g. `~/.local/share/tiller/tasks`.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        dirs::data_dir()
            .map(|dir| dir.join("tiller").join("tasks"))
            .ok_or(StoreError::NoStorageDir)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_all(&self) -> Result<Vec<SavedTask>, StoreError> {
        let mut tasks = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
            Err(error) => return Err(error.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<SavedTask>(&contents) {
                Ok(task) => tasks.push(task),
                Err(error) => {
                    tracing::warn!(path = %path.display(), error = %error, "skipping unreadable task file");
                }
            }
        }
        Ok(tasks)
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn list(&self) -> Result<Vec<TaskSummary>, StoreError> {
        let tasks = self.read_all().await?;
        let mut summaries: Vec<TaskSummary> = tasks.iter().map(TaskSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get(&self, id: &str) -> Result<Option<SavedTask>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(id)).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, task: &mut SavedTask) -> Result<String, StoreError> {
        assign_identity(task);
        tokio::fs::create_dir_all(&self.dir).await?;
        let contents = serde_json::to_string_pretty(task)?;
        tokio::fs::write(self.path_for(&task.id), contents).await?;
        Ok(task.id.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for task in self.read_all().await? {
            self.delete(&task.id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::AgentMessage;

    fn task_titled(title: &str) -> SavedTask {
        let mut saved = SavedTask::default();
        saved.title = title.to_string();
        saved.task.messages.push(AgentMessage::user("hello"));
        saved
    }

    #[tokio::test]
    async fn memory_store_assigns_ids_and_updates() {
        let store = MemoryTaskStore::new();
        let mut task = task_titled("first");

        let id = store.save(&mut task).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(task.id, id);

        task.title = "renamed".to_string();
        let second_id = store.save(&mut task).await.unwrap();
        assert_eq!(id, second_id);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "renamed");
    }

    #[tokio::test]
    async fn memory_store_lists_most_recent_first() {
        let store = MemoryTaskStore::new();
        let mut first = task_titled("older");
        store.save(&mut first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut second = task_titled("newer");
        store.save(&mut second).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].title, "newer");
        assert_eq!(listed[1].title, "older");
    }

    #[tokio::test]
    async fn memory_store_delete_and_clear() {
        let store = MemoryTaskStore::new();
        let mut task = task_titled("target");
        let id = store.save(&mut task).await.unwrap();

        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        store.save(&mut task_titled("a")).await.unwrap();
        store.save(&mut task_titled("b")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_round_trips_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());

        let mut task = task_titled("persisted");
        let id = store.save(&mut task).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "persisted");
        assert_eq!(loaded.task.messages, task.task.messages);

        assert_eq!(store.list().await.unwrap().len(), 1);
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_missing_task_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());
        assert!(store.get("nope").await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }
}
