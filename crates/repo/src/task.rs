use std::collections::HashMap;
use std::path::PathBuf;

use maestro_domain::entities::Task;
use maestro_domain::error::Result;
use parking_lot::RwLock;

use crate::fs_store;

/// Owns `tasks/{projectId}/{taskId}.json` (§4.1).
pub struct TaskRepo {
    dir: PathBuf,
    index: RwLock<HashMap<String, Task>>,
}

impl TaskRepo {
    pub fn new(data_dir: &std::path::Path) -> Result<Self> {
        let dir = data_dir.join("tasks");
        std::fs::create_dir_all(&dir)?;
        let loaded: Vec<Task> = fs_store::load_dir_recursive(&dir);
        let index = loaded.into_iter().map(|t| (t.id.clone(), t)).collect();
        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    fn path_for(&self, project_id: &str, id: &str) -> PathBuf {
        self.dir.join(project_id).join(format!("{id}.json"))
    }

    pub fn find_by_id(&self, id: &str) -> Option<Task> {
        self.index.read().get(id).cloned()
    }

    pub fn find_by_project(&self, project_id: &str) -> Vec<Task> {
        self.index
            .read()
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn find_by_parent(&self, parent_id: &str) -> Vec<Task> {
        self.index
            .read()
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> Vec<Task> {
        self.index.read().values().cloned().collect()
    }

    pub fn create(&self, task: Task) -> Result<Task> {
        fs_store::write_atomic(&self.path_for(&task.project_id, &task.id), &task)?;
        self.index.write().insert(task.id.clone(), task.clone());
        Ok(task)
    }

    pub fn update(&self, task: Task) -> Result<Task> {
        fs_store::write_atomic(&self.path_for(&task.project_id, &task.id), &task)?;
        self.index.write().insert(task.id.clone(), task.clone());
        Ok(task)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(task) = self.index.write().remove(id) {
            fs_store::remove_if_exists(&self.path_for(&task.project_id, &task.id))?;
        }
        Ok(())
    }

    /// Remove every task belonging to a project (cascade on project delete).
    pub fn delete_by_project(&self, project_id: &str) -> Result<Vec<Task>> {
        let removed: Vec<Task> = {
            let mut index = self.index.write();
            let ids: Vec<String> = index
                .values()
                .filter(|t| t.project_id == project_id)
                .map(|t| t.id.clone())
                .collect();
            ids.into_iter().filter_map(|id| index.remove(&id)).collect()
        };
        let project_dir = self.dir.join(project_id);
        let _ = std::fs::remove_dir_all(&project_dir);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_parent_returns_children() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TaskRepo::new(dir.path()).unwrap();
        let parent = Task::new("task_1_p".into(), "proj_1".into(), None, "parent".into());
        let child = Task::new(
            "task_1_c".into(),
            "proj_1".into(),
            Some("task_1_p".into()),
            "child".into(),
        );
        repo.create(parent).unwrap();
        repo.create(child).unwrap();

        let children = repo.find_by_parent("task_1_p");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "task_1_c");
    }

    #[test]
    fn delete_by_project_removes_all() {
        let dir = tempfile::tempdir().unwrap();
        let repo = TaskRepo::new(dir.path()).unwrap();
        repo.create(Task::new("task_1_a".into(), "proj_1".into(), None, "a".into()))
            .unwrap();
        repo.create(Task::new("task_1_b".into(), "proj_1".into(), None, "b".into()))
            .unwrap();

        let removed = repo.delete_by_project("proj_1").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(repo.find_by_project("proj_1").is_empty());
    }
}
