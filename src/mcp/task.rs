//! MCP task store (spec §3 Task, §4.6 `tasks/*`, §6 `.mcp_tasks.json`).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use uuid::Uuid;

use crate::error::{AthenaeumError, Result};
use crate::types::{McpTask, TaskStatus};

/// Tasks expire 1h after their last update once in a terminal state
/// (SPEC_FULL §11 janitor).
const EXPIRE_AFTER_TERMINAL: chrono::Duration = chrono::Duration::hours(1);

pub struct TaskStore {
    path: PathBuf,
    tasks: parking_lot::RwLock<HashMap<String, McpTask>>,
}

impl TaskStore {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let tasks = read_json_locked(&path).unwrap_or_default();
        Self {
            path,
            tasks: parking_lot::RwLock::new(tasks),
        }
    }

    pub fn create(&self, task_type: impl Into<String>) -> McpTask {
        let task = McpTask::new(Uuid::new_v4().to_string(), task_type);
        self.tasks.write().insert(task.id.clone(), task.clone());
        self.persist();
        task
    }

    pub fn get(&self, id: &str) -> Option<McpTask> {
        self.tasks.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<McpTask> {
        self.tasks.read().values().cloned().collect()
    }

    pub fn set_status(&self, id: &str, status: TaskStatus, result: Option<serde_json::Value>) {
        let mut guard = self.tasks.write();
        if let Some(task) = guard.get_mut(id) {
            task.status = status;
            task.result = result;
            task.updated_at = chrono::Utc::now();
        }
        drop(guard);
        self.persist();
    }

    /// `notifications/cancelled`: a terminal task cannot be cancelled.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let mut guard = self.tasks.write();
        let task = guard
            .get_mut(id)
            .ok_or_else(|| AthenaeumError::Task(format!("unknown task: {id}")))?;
        if task.status.is_terminal() {
            return Err(AthenaeumError::InvalidInput(format!(
                "task {id} is already in a terminal state"
            )));
        }
        task.status = TaskStatus::Cancelled;
        task.updated_at = chrono::Utc::now();
        drop(guard);
        self.persist();
        Ok(())
    }

    /// Drop tasks that finished over an hour ago.
    pub fn purge_expired(&self) {
        let now = chrono::Utc::now();
        let mut guard = self.tasks.write();
        guard.retain(|_, t| !(t.status.is_terminal() && now - t.updated_at > EXPIRE_AFTER_TERMINAL));
        drop(guard);
        self.persist();
    }

    fn persist(&self) {
        let snapshot = self.tasks.read().clone();
        if let Err(e) = write_json_locked(&self.path, &snapshot) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to persist task store");
        }
    }
}

fn read_json_locked(path: &Path) -> Result<HashMap<String, McpTask>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Ok(HashMap::new()),
    };
    file.lock_shared()?;
    let mut contents = String::new();
    let mut file = file;
    file.read_to_string(&mut contents)?;
    FileExt::unlock(&file)?;
    Ok(serde_json::from_str(&contents).unwrap_or_default())
}

fn write_json_locked(path: &Path, data: &HashMap<String, McpTask>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let lock_path = path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file.lock_exclusive()?;

    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;

    FileExt::unlock(&lock_file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_terminal_task_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::load(dir.path().join("tasks.json"));
        let task = store.create("index_book");
        store.set_status(&task.id, TaskStatus::Completed, Some(serde_json::json!({"ok": true})));

        let err = store.cancel(&task.id).unwrap_err();
        assert!(matches!(err, AthenaeumError::InvalidInput(_)));
    }

    #[test]
    fn cancel_running_task_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::load(dir.path().join("tasks.json"));
        let task = store.create("index_book");
        store.set_status(&task.id, TaskStatus::Running, None);
        store.cancel(&task.id).unwrap();
        assert_eq!(store.get(&task.id).unwrap().status, TaskStatus::Cancelled);
    }
}
