use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::{DefaultKind, TeamMember, TeamMemberOverride};
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Deterministic ID for a project's code-default team member (§3, Invariant 3).
pub fn default_id(project_id: &str, kind: DefaultKind) -> String {
    match kind {
        DefaultKind::Worker => format!("tm_{project_id}_worker"),
        DefaultKind::Coordinator => format!("tm_{project_id}_coordinator"),
    }
}

/// Owns `team-members/{projectId}/{tmId}.json` (custom members) and
/// `team-members/tm_{projectId}_{worker|coordinator}.override.json`
/// (partial overrides of code defaults) (§4.1, §9).
pub struct TeamMemberRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, TeamMember>>,
}

impl TeamMemberRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("team-members");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<TeamMember> = fs_store::load_dir_recursive(&dir);
        let index = loaded.into_iter().map(|m| (m.id.clone(), m)).collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn member_path(&self, project_id: &str, id: &str) -> PathBuf {
        self.dir.join(project_id).join(format!("{id}.json"))
    }

    fn override_path(&self, project_id: &str, kind: DefaultKind) -> PathBuf {
        let suffix = match kind {
            DefaultKind::Worker => "worker",
            DefaultKind::Coordinator => "coordinator",
        };
        self.dir
            .join(format!("tm_{project_id}_{suffix}.override.json"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<TeamMember> {
        self.index.read().get(id).cloned()
    }

    pub fn find_by_project(&self, project_id: &str) -> Vec<TeamMember> {
        self.index
            .read()
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Custom (non-default) members only.
    pub fn create(&self, member: TeamMember) -> Result<TeamMember> {
        fs_store::write_atomic(&self.member_path(&member.project_id, &member.id), &member)?;
        self.index.write().insert(member.id.clone(), member.clone());
        Ok(member)
    }

    pub fn update(&self, member: TeamMember) -> Result<TeamMember> {
        fs_store::write_atomic(&self.member_path(&member.project_id, &member.id), &member)?;
        self.index.write().insert(member.id.clone(), member.clone());
        Ok(member)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(member) = self.index.write().remove(id) {
            fs_store::remove_if_exists(&self.member_path(&member.project_id, &member.id))?;
        }
        Ok(())
    }

    pub fn delete_by_project(&self, project_id: &str) -> Result<()> {
        let mut index = self.index.write();
        index.retain(|_, m| m.project_id != project_id);
        let project_dir = self.dir.join(project_id);
        let _ = std::fs::remove_dir_all(&project_dir);
        drop(index);
        fs_store::remove_if_exists(&self.override_path(project_id, DefaultKind::Worker))?;
        fs_store::remove_if_exists(&self.override_path(project_id, DefaultKind::Coordinator))?;
        Ok(())
    }

    /// Load the on-disk override patch for a default, if one exists.
    pub fn load_override(
        &self,
        project_id: &str,
        kind: DefaultKind,
    ) -> Result<Option<TeamMemberOverride>> {
        let path = self.override_path(project_id, kind);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Persist a partial override patch for a code default.
    pub fn save_override(
        &self,
        project_id: &str,
        kind: DefaultKind,
        patch: &TeamMemberOverride,
    ) -> Result<()> {
        fs_store::write_atomic(&self.override_path(project_id, kind), patch)
    }

    /// "reset = deleteOverrideFile" (§9).
    pub fn reset_override(&self, project_id: &str, kind: DefaultKind) -> Result<()> {
        fs_store::remove_if_exists(&self.override_path(project_id, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_roundtrips_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TeamMemberRepo::new(dir.path()).unwrap();

        assert!(repo
            .load_override("proj_1", DefaultKind::Worker)
            .unwrap()
            .is_none());

        let patch = TeamMemberOverride {
            identity: Some("X".into()),
            ..Default::default()
        };
        repo.save_override("proj_1", DefaultKind::Worker, &patch)
            .unwrap();
        let loaded = repo
            .load_override("proj_1", DefaultKind::Worker)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.identity.as_deref(), Some("X"));

        repo.reset_override("proj_1", DefaultKind::Worker).unwrap();
        assert!(repo
            .load_override("proj_1", DefaultKind::Worker)
            .unwrap()
            .is_none());
    }

    #[test]
    fn default_ids_are_deterministic() {
        assert_eq!(default_id("proj_1", DefaultKind::Worker), "tm_proj_1_worker");
        assert_eq!(
            default_id("proj_1", DefaultKind::Coordinator),
            "tm_proj_1_coordinator"
        );
    }
}
