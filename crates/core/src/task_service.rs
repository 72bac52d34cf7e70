//! TaskService — update-source enforcement, timeline recording, cascade on
//! delete (§4.2).

use std::sync::Arc;

use chrono::Utc;
use maestro_domain::entities::{
    Task, TaskPriority, TaskSessionStatus, TaskStatus, TimelineEntry, UpdateSource,
};
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_domain::ids;
use maestro_repo::{SessionRepo, TaskRepo};

use crate::event_bus::EventBus;
use crate::locks::KeyedLocks;

#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub dependencies: Option<Vec<String>>,
    /// Only honored when `update_source == Session`.
    pub session_status: Option<TaskSessionStatus>,
}

pub struct TaskService {
    tasks: Arc<TaskRepo>,
    sessions: Arc<SessionRepo>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<TaskRepo>,
        sessions: Arc<SessionRepo>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            tasks,
            sessions,
            events,
            locks,
        }
    }

    pub fn create_task(
        &self,
        project_id: String,
        parent_id: Option<String>,
        title: String,
    ) -> Result<Task> {
        if let Some(parent_id) = &parent_id {
            let parent = self
                .tasks
                .find_by_id(parent_id)
                .ok_or_else(|| Error::Conflict("parent task does not exist".into()))?;
            if parent.project_id != project_id {
                return Err(Error::Conflict(
                    "parent task belongs to a different project".into(),
                ));
            }
        }
        let id = ids::TASK_IDS.generate();
        let task = Task::new(id, project_id, parent_id, title);
        let task = self.tasks.create(task)?;
        self.events.publish(Event::TaskCreated {
            task: serde_json::to_value(&task).unwrap_or_default(),
        });
        Ok(task)
    }

    pub fn update_task(
        &self,
        id: &str,
        patch: TaskPatch,
        update_source: UpdateSource,
        session_id: Option<String>,
    ) -> Result<Task> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        let mut task = self
            .tasks
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("task {id} not found")))?;

        let previous_status = task.status;

        match update_source {
            UpdateSource::Session => {
                let sid = session_id
                    .clone()
                    .ok_or_else(|| Error::Validation("sessionId is required".into()))?;
                if !task.session_ids.contains(&sid) {
                    return Err(Error::Forbidden(
                        "session is not linked to this task".into(),
                    ));
                }
                if let Some(status) = patch.session_status {
                    task.task_session_statuses.insert(sid, status);
                }
                // every other field in `patch` is silently dropped (§4.2).
            }
            UpdateSource::User => {
                if let Some(title) = patch.title {
                    task.title = title;
                }
                if let Some(description) = patch.description {
                    task.description = description;
                }
                if let Some(priority) = patch.priority {
                    task.priority = priority;
                }
                if let Some(dependencies) = patch.dependencies {
                    task.dependencies = dependencies;
                }
                if let Some(status) = patch.status {
                    task.status = status;
                }
                // `taskSessionStatuses` is not a user-patchable field; `patch.session_status`
                // is ignored on this path.
            }
        }

        let now = Utc::now();
        task.updated_at = now;
        if task.status != previous_status {
            if task.status == TaskStatus::InProgress && task.started_at.is_none() {
                task.started_at = Some(now);
            }
            if task.status == TaskStatus::Completed {
                task.completed_at = Some(now);
            }
            task.timeline.push(TimelineEntry {
                timestamp: now,
                update_source,
                session_id: session_id.clone(),
                message: format!("status changed to {:?}", task.status),
            });
        }

        let task = self.tasks.update(task)?;
        self.events.publish(Event::TaskUpdated {
            task: serde_json::to_value(&task).unwrap_or_default(),
        });
        Ok(task)
    }

    /// Removes the task, unlinks it from every session it was attached to,
    /// and emits `task:deleted` plus one `session:updated` per affected
    /// session (§4.2).
    pub fn delete_task(&self, id: &str) -> Result<Task> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        let task = self
            .tasks
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("task {id} not found")))?;
        self.tasks.delete(id)?;

        for session_id in &task.session_ids {
            let session_lock = self.locks.get(session_id);
            let _session_guard = session_lock.lock();
            if let Some(mut session) = self.sessions.find_by_id(session_id) {
                session.task_ids.retain(|t| t != id);
                let session = self.sessions.update(session)?;
                self.events.publish(Event::SessionUpdated {
                    session: serde_json::to_value(&session).unwrap_or_default(),
                });
            }
        }

        self.events.publish(Event::TaskDeleted {
            task_id: id.to_string(),
        });
        Ok(task)
    }

    /// Appends a timeline entry without otherwise touching the task (§6
    /// `POST /tasks/{id}/timeline`).
    pub fn append_timeline(
        &self,
        id: &str,
        message: String,
        update_source: UpdateSource,
        session_id: Option<String>,
    ) -> Result<Task> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        let mut task = self
            .tasks
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("task {id} not found")))?;
        task.timeline.push(TimelineEntry {
            timestamp: Utc::now(),
            update_source,
            session_id,
            message,
        });
        task.updated_at = Utc::now();
        let task = self.tasks.update(task)?;
        self.events.publish(Event::TaskUpdated {
            task: serde_json::to_value(&task).unwrap_or_default(),
        });
        Ok(task)
    }

    pub fn get_children(&self, id: &str) -> Vec<Task> {
        self.tasks.find_by_parent(id)
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.find_by_id(id)
    }

    pub fn list_by_project(&self, project_id: &str) -> Vec<Task> {
        self.tasks.find_by_project(project_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_repo::{SessionRepo, TaskRepo};

    fn service() -> (TaskService, Arc<TaskRepo>, Arc<SessionRepo>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tasks = Arc::new(TaskRepo::new(dir.path()).unwrap());
        let sessions = Arc::new(SessionRepo::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());
        let service = TaskService::new(tasks.clone(), sessions.clone(), events, locks);
        (service, tasks, sessions, dir)
    }

    #[test]
    fn create_task_rejects_cross_project_parent() {
        let (service, tasks, _sessions, _dir) = service();
        let parent = Task::new("task_1".into(), "proj_a".into(), None, "parent".into());
        tasks.create(parent).unwrap();

        let err = service
            .create_task("proj_b".into(), Some("task_1".into()), "child".into())
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn session_sourced_update_is_narrowed() {
        let (service, tasks, _sessions, _dir) = service();
        let mut t1 = Task::new("t1".into(), "proj_a".into(), None, "ship auth".into());
        t1.session_ids.push("s1".into());
        tasks.create(t1).unwrap();

        let patch = TaskPatch {
            status: Some(TaskStatus::Completed),
            session_status: Some(TaskSessionStatus::Completed),
            ..Default::default()
        };
        let updated = service
            .update_task("t1", patch, UpdateSource::Session, Some("s1".into()))
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Todo);
        assert_eq!(
            updated.task_session_statuses.get("s1"),
            Some(&TaskSessionStatus::Completed)
        );
    }

    #[test]
    fn delete_task_unlinks_sessions() {
        let (service, tasks, sessions, _dir) = service();
        let mut t1 = Task::new("t1".into(), "proj_a".into(), None, "x".into());
        t1.session_ids.push("s1".into());
        tasks.create(t1).unwrap();

        let now = Utc::now();
        sessions
            .create(maestro_domain::entities::Session {
                id: "s1".into(),
                project_id: "proj_a".into(),
                task_ids: vec!["t1".into()],
                name: "s".into(),
                status: maestro_domain::entities::SessionStatus::Working,
                mode: maestro_domain::entities::SessionMode::Worker,
                started_at: now,
                last_activity: now,
                completed_at: None,
                env: Default::default(),
                events: vec![],
                team_member_id: None,
                team_member_snapshot: None,
                needs_input: None,
                metadata: Default::default(),
            })
            .unwrap();

        service.delete_task("t1").unwrap();
        let s1 = sessions.find_by_id("s1").unwrap();
        assert!(s1.task_ids.is_empty());
    }
}
