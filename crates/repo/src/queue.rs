use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::QueueItem;
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Owns `queues/{sessionId}.json`: the ordered task queue for one session,
/// persisted as a single file per session so a queue mutation is one
/// atomic write (§4.1, §4.6).
pub struct QueueRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, Vec<QueueItem>>>,
}

impl QueueRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("queues");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<(String, Vec<QueueItem>)> = load_queues(&dir);
        let index = loaded.into_iter().collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    pub fn find_by_session(&self, session_id: &str) -> Vec<QueueItem> {
        self.index.read().get(session_id).cloned().unwrap_or_default()
    }

    /// Replace a session's queue wholesale; callers hold the service-layer
    /// lock that keeps ordering/at-most-one-processing invariants intact.
    pub fn save(&self, session_id: &str, items: Vec<QueueItem>) -> Result<()> {
        if items.is_empty() {
            fs_store::remove_if_exists(&self.path_for(session_id))?;
            self.index.write().remove(session_id);
            return Ok(());
        }
        fs_store::write_atomic(&self.path_for(session_id), &items)?;
        self.index.write().insert(session_id.to_string(), items);
        Ok(())
    }

    pub fn delete_by_session(&self, session_id: &str) -> Result<()> {
        fs_store::remove_if_exists(&self.path_for(session_id))?;
        self.index.write().remove(session_id);
        Ok(())
    }
}

fn load_queues(dir: &std::path::Path) -> Vec<(String, Vec<QueueItem>)> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path).ok().and_then(|raw| serde_json::from_str(&raw).ok()) {
            Some(items) => out.push((stem.to_string(), items)),
            None => {
                tracing::warn!(path = %path.display(), "quarantining corrupt queue file");
                let _ = std::fs::rename(&path, path.with_extension("json.corrupt"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::entities::QueueItemStatus;

    fn item(task_id: &str, position: u64) -> QueueItem {
        QueueItem {
            session_id: "sess_1".into(),
            task_id: task_id.into(),
            position,
            status: QueueItemStatus::Queued,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn save_then_reload_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = QueueRepo::new(dir.path()).unwrap();
            repo.save("sess_1", vec![item("task_a", 0), item("task_b", 1)])
                .unwrap();
        }
        let repo = QueueRepo::new(dir.path()).unwrap();
        let items = repo.find_by_session("sess_1");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].task_id, "task_a");
    }

    #[test]
    fn saving_empty_queue_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = QueueRepo::new(dir.path()).unwrap();
        repo.save("sess_1", vec![item("task_a", 0)]).unwrap();
        repo.save("sess_1", vec![]).unwrap();
        assert!(repo.find_by_session("sess_1").is_empty());
        assert!(!dir.path().join("queues/sess_1.json").exists());
    }
}
