use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::Session;
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Owns `sessions/{projectId}/{sessionId}.json` (§4.1). The manifest file
/// alongside each session (`sessions/{sessionId}/manifest.json`) is written
/// by the spawn coordinator in `maestro-core`, not this repository.
pub struct SessionRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, Session>>,
}

impl SessionRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("sessions");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<Session> = fs_store::load_dir_recursive(&dir);
        let index = loaded.into_iter().map(|s| (s.id.clone(), s)).collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn path_for(&self, project_id: &str, id: &str) -> PathBuf {
        self.dir.join(project_id).join(format!("{id}.json"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<Session> {
        self.index.read().get(id).cloned()
    }

    pub fn find_by_project(&self, project_id: &str) -> Vec<Session> {
        self.index
            .read()
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> Vec<Session> {
        self.index.read().values().cloned().collect()
    }

    pub fn create(&self, session: Session) -> Result<Session> {
        fs_store::write_atomic(&self.path_for(&session.project_id, &session.id), &session)?;
        self.index.write().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn update(&self, session: Session) -> Result<Session> {
        fs_store::write_atomic(&self.path_for(&session.project_id, &session.id), &session)?;
        self.index.write().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(session) = self.index.write().remove(id) {
            fs_store::remove_if_exists(&self.path_for(&session.project_id, &session.id))?;
        }
        Ok(())
    }

    pub fn delete_by_project(&self, project_id: &str) -> Result<Vec<Session>> {
        let removed: Vec<Session> = {
            let mut index = self.index.write();
            let ids: Vec<String> = index
                .values()
                .filter(|s| s.project_id == project_id)
                .map(|s| s.id.clone())
                .collect();
            ids.into_iter().filter_map(|id| index.remove(&id)).collect()
        };
        let project_dir = self.dir.join(project_id);
        let _ = std::fs::remove_dir_all(&project_dir);
        Ok(removed)
    }

    /// Location of the spawn-artifact manifest for a session, written by
    /// the spawn coordinator in `maestro-core`.
    pub fn manifest_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(session_id).join("manifest.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use maestro_domain::entities::{SessionMetadata, SessionMode, SessionStatus};

    fn sample(id: &str, project_id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.into(),
            project_id: project_id.into(),
            task_ids: vec![],
            name: "s".into(),
            status: SessionStatus::Spawning,
            mode: SessionMode::Worker,
            started_at: now,
            last_activity: now,
            completed_at: None,
            env: HashMap::new(),
            events: vec![],
            team_member_id: None,
            team_member_snapshot: None,
            needs_input: None,
            metadata: SessionMetadata::default(),
        }
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = SessionRepo::new(dir.path()).unwrap();
            repo.create(sample("sess_1_a", "proj_1")).unwrap();
        }
        let repo = SessionRepo::new(dir.path()).unwrap();
        let s = repo.find_by_id("sess_1_a").unwrap();
        assert_eq!(s.project_id, "proj_1");
    }
}
