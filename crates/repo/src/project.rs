use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::Project;
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Owns `projects/{projectId}.json`. Only writer of that subtree (§4.1).
pub struct ProjectRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, Project>>,
}

impl ProjectRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("projects");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<Project> = fs_store::load_dir(&dir);
        let index = loaded.into_iter().map(|p| (p.id.clone(), p)).collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<Project> {
        self.index.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Project> {
        self.index.read().values().cloned().collect()
    }

    pub fn create(&self, project: Project) -> Result<Project> {
        fs_store::write_atomic(&self.path_for(&project.id), &project)?;
        self.index.write().insert(project.id.clone(), project.clone());
        Ok(project)
    }

    pub fn update(&self, project: Project) -> Result<Project> {
        fs_store::write_atomic(&self.path_for(&project.id), &project)?;
        self.index.write().insert(project.id.clone(), project.clone());
        Ok(project)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        fs_store::remove_if_exists(&self.path_for(id))?;
        self.index.write().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(id: &str) -> Project {
        let now = Utc::now();
        Project {
            id: id.into(),
            name: "demo".into(),
            working_dir: "/tmp/demo".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn create_then_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = ProjectRepo::new(dir.path()).unwrap();
            repo.create(sample("proj_1_a")).unwrap();
        }
        let repo = ProjectRepo::new(dir.path()).unwrap();
        assert!(repo.find_by_id("proj_1_a").is_some());
    }

    #[test]
    fn delete_removes_file_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ProjectRepo::new(dir.path()).unwrap();
        repo.create(sample("proj_1_a")).unwrap();
        repo.delete("proj_1_a").unwrap();
        assert!(repo.find_by_id("proj_1_a").is_none());
        assert!(!dir.path().join("projects/proj_1_a.json").exists());
    }
}
