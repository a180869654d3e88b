//! MCP session store (spec §4.6 session lifecycle, §3 Session, §6 `.mcp_sessions.json`).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rand::RngCore;

use crate::error::Result;
use crate::types::McpSession;

const STALE_AFTER: chrono::Duration = chrono::Duration::hours(24);

/// File-backed, advisory-locked session map. Tolerant of a missing or
/// corrupt file: both are treated as an empty store (spec "recreates an
/// empty session with that id").
pub struct SessionStore {
    path: PathBuf,
    sessions: parking_lot::RwLock<HashMap<String, McpSession>>,
}

impl SessionStore {
    /// Load from `path`, purging sessions stale by more than 24h.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut sessions = read_json_locked(&path).unwrap_or_default();

        let now = chrono::Utc::now();
        sessions.retain(|_, s: &mut McpSession| !s.is_stale(now, STALE_AFTER));

        Self {
            path,
            sessions: parking_lot::RwLock::new(sessions),
        }
    }

    /// Allocate a new session id: 128 random bits, lowercase hex.
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn get(&self, id: &str) -> Option<McpSession> {
        self.sessions.read().get(id).cloned()
    }

    /// Fetch, recreating an empty session for an unknown id (tolerant to
    /// server data-file loss per spec §4.6).
    pub fn get_or_create(&self, id: &str) -> McpSession {
        if let Some(existing) = self.get(id) {
            return existing;
        }
        let session = McpSession::new(id.to_string());
        self.put(session.clone());
        session
    }

    pub fn put(&self, mut session: McpSession) {
        session.touch();
        self.sessions.write().insert(session.id.clone(), session);
        self.persist();
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// Drop sessions untouched for more than 24h, matching the staleness
    /// cutoff `load` applies on startup.
    pub fn purge_expired(&self) {
        let now = chrono::Utc::now();
        let mut guard = self.sessions.write();
        guard.retain(|_, s| !s.is_stale(now, STALE_AFTER));
        drop(guard);
        self.persist();
    }

    pub fn with_mut<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut McpSession),
    {
        let mut guard = self.sessions.write();
        let session = guard
            .entry(id.to_string())
            .or_insert_with(|| McpSession::new(id.to_string()));
        f(session);
        session.touch();
        drop(guard);
        self.persist();
    }

    fn persist(&self) {
        let snapshot = self.sessions.read().clone();
        if let Err(e) = write_json_locked(&self.path, &snapshot) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to persist session store");
        }
    }
}

fn read_json_locked(path: &Path) -> Result<HashMap<String, McpSession>> {
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

/// Write-then-rename under an advisory exclusive lock on a sibling lock file,
/// so a reader never observes a partially written snapshot.
fn write_json_locked(path: &Path, data: &HashMap<String, McpSession>) -> Result<()> {
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
    fn get_or_create_recreates_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::load(dir.path().join("sessions.json"));
        let session = store.get_or_create("unknown-id");
        assert_eq!(session.id, "unknown-id");
        assert!(store.get("unknown-id").is_some());
    }

    #[test]
    fn persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        {
            let store = SessionStore::load(&path);
            let mut session = McpSession::new(SessionStore::generate_id());
            session.selected_book = Some("moby-dick".to_string());
            store.put(session);
        }
        let reloaded = SessionStore::load(&path);
        let all: Vec<_> = reloaded.sessions.read().values().cloned().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].selected_book.as_deref(), Some("moby-dick"));
    }

    #[test]
    fn generated_ids_are_32_lowercase_hex_chars() {
        let id = SessionStore::generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
