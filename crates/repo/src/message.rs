use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::Message;
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Owns `messages/by-receiver/{to}/{msgId}.json` (§4.1). Indexing by
/// receiver keeps inbox reads (the hot path) a single directory scan.
pub struct MessageRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, Message>>,
}

impl MessageRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("messages").join("by-receiver");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<Message> = fs_store::load_dir_recursive(&dir);
        let index = loaded.into_iter().map(|m| (m.id.clone(), m)).collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn path_for(&self, to: &str, id: &str) -> PathBuf {
        self.dir.join(to).join(format!("{id}.json"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<Message> {
        self.index.read().get(id).cloned()
    }

    /// Inbox for a receiving session, oldest first.
    pub fn find_by_receiver(&self, to: &str) -> Vec<Message> {
        let mut out: Vec<Message> = self
            .index
            .read()
            .values()
            .filter(|m| m.to == to)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        out
    }

    pub fn create(&self, message: Message) -> Result<Message> {
        fs_store::write_atomic(&self.path_for(&message.to, &message.id), &message)?;
        self.index.write().insert(message.id.clone(), message.clone());
        Ok(message)
    }

    pub fn update(&self, message: Message) -> Result<Message> {
        fs_store::write_atomic(&self.path_for(&message.to, &message.id), &message)?;
        self.index.write().insert(message.id.clone(), message.clone());
        Ok(message)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(message) = self.index.write().remove(id) {
            fs_store::remove_if_exists(&self.path_for(&message.to, &message.id))?;
        }
        Ok(())
    }

    pub fn list_all(&self) -> Vec<Message> {
        self.index.read().values().cloned().collect()
    }

    /// Remove every message sent to or from any of the given sessions
    /// (cascade on project delete).
    pub fn delete_by_sessions(&self, session_ids: &[String]) -> Result<()> {
        let removed: Vec<Message> = {
            let mut index = self.index.write();
            let ids: Vec<String> = index
                .values()
                .filter(|m| session_ids.contains(&m.from) || session_ids.contains(&m.to))
                .map(|m| m.id.clone())
                .collect();
            ids.into_iter().filter_map(|id| index.remove(&id)).collect()
        };
        for message in removed {
            fs_store::remove_if_exists(&self.path_for(&message.to, &message.id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maestro_domain::entities::{MessageMetadata, MessageStatus};

    fn sample(id: &str, to: &str) -> Message {
        Message {
            id: id.into(),
            from: "sess_a".into(),
            to: to.into(),
            body: "hi".into(),
            status: MessageStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
            expires_at: None,
            metadata: MessageMetadata::default(),
        }
    }

    #[test]
    fn inbox_is_sorted_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MessageRepo::new(dir.path()).unwrap();
        repo.create(sample("msg_1", "sess_b")).unwrap();
        repo.create(sample("msg_2", "sess_b")).unwrap();
        repo.create(sample("msg_3", "sess_other")).unwrap();

        let inbox = repo.find_by_receiver("sess_b");
        assert_eq!(inbox.len(), 2);
        assert!(inbox[0].created_at <= inbox[1].created_at);
    }

    #[test]
    fn reload_from_disk_preserves_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = MessageRepo::new(dir.path()).unwrap();
            repo.create(sample("msg_1", "sess_b")).unwrap();
        }
        let repo = MessageRepo::new(dir.path()).unwrap();
        assert!(repo.find_by_id("msg_1").is_some());
    }

    #[test]
    fn delete_by_sessions_removes_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let repo = MessageRepo::new(dir.path()).unwrap();
        repo.create(sample("msg_1", "sess_b")).unwrap();
        repo.create(sample("msg_2", "sess_other")).unwrap();

        repo.delete_by_sessions(&["sess_b".to_string()]).unwrap();

        assert!(repo.find_by_id("msg_1").is_none());
        assert!(repo.find_by_id("msg_2").is_some());
    }
}
