//! ProjectService — project CRUD plus the cascade-on-delete that tears
//! down every task, session, team member, and message belonging to a
//! deleted project (§4.1, §8).

use std::sync::Arc;

use chrono::Utc;
use maestro_domain::entities::Project;
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_domain::ids;
use maestro_repo::{MessageRepo, ProjectRepo, QueueRepo, SessionRepo, TaskRepo, TeamMemberRepo};

use crate::event_bus::EventBus;
use crate::locks::KeyedLocks;

#[derive(Debug, Default, Clone)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub working_dir: Option<String>,
}

pub struct ProjectService {
    projects: Arc<ProjectRepo>,
    tasks: Arc<TaskRepo>,
    sessions: Arc<SessionRepo>,
    team_members: Arc<TeamMemberRepo>,
    messages: Arc<MessageRepo>,
    queues: Arc<QueueRepo>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
}

impl ProjectService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        projects: Arc<ProjectRepo>,
        tasks: Arc<TaskRepo>,
        sessions: Arc<SessionRepo>,
        team_members: Arc<TeamMemberRepo>,
        messages: Arc<MessageRepo>,
        queues: Arc<QueueRepo>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            projects,
            tasks,
            sessions,
            team_members,
            messages,
            queues,
            events,
            locks,
        }
    }

    pub fn get(&self, id: &str) -> Option<Project> {
        self.projects.find_by_id(id)
    }

    pub fn list(&self) -> Vec<Project> {
        self.projects.list()
    }

    pub fn create(&self, name: String, working_dir: String) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(Error::Validation("project name must not be empty".into()));
        }
        let now = Utc::now();
        let project = Project {
            id: ids::PROJECT_IDS.generate(),
            name,
            working_dir,
            created_at: now,
            updated_at: now,
        };
        let project = self.projects.create(project)?;
        self.events.publish(Event::ProjectCreated {
            project: serde_json::to_value(&project).unwrap_or_default(),
        });
        Ok(project)
    }

    pub fn update(&self, id: &str, patch: ProjectPatch) -> Result<Project> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        let mut project = self
            .projects
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("project {id} not found")))?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(Error::Validation("project name must not be empty".into()));
            }
            project.name = name;
        }
        if let Some(working_dir) = patch.working_dir {
            project.working_dir = working_dir;
        }
        project.updated_at = Utc::now();
        let project = self.projects.update(project)?;
        self.events.publish(Event::ProjectUpdated {
            project: serde_json::to_value(&project).unwrap_or_default(),
        });
        Ok(project)
    }

    /// Deletes the project and cascades to every task, session, team
    /// member, queue, and message that belongs to it. Emits exactly one
    /// `project:deleted`, one `task:deleted` per task, and one
    /// `session:deleted` per session (§8, scenario S6).
    pub fn delete(&self, id: &str) -> Result<()> {
        let lock = self.locks.get(id);
        let _guard = lock.lock();

        self.projects
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("project {id} not found")))?;

        let removed_tasks = self.tasks.delete_by_project(id)?;
        let removed_sessions = self.sessions.delete_by_project(id)?;

        for session in &removed_sessions {
            self.queues.delete_by_session(&session.id)?;
        }
        let session_ids: Vec<String> = removed_sessions.iter().map(|s| s.id.clone()).collect();
        self.messages.delete_by_sessions(&session_ids)?;

        self.team_members.delete_by_project(id)?;
        self.projects.delete(id)?;

        self.events.publish(Event::ProjectDeleted {
            project_id: id.to_string(),
        });
        for task in &removed_tasks {
            self.events.publish(Event::TaskDeleted {
                task_id: task.id.clone(),
            });
        }
        for session in &removed_sessions {
            self.events.publish(Event::SessionDeleted {
                session_id: session.id.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::entities::{Session, SessionMetadata, SessionMode, SessionStatus, Task};

    fn harness() -> (ProjectService, Arc<TaskRepo>, Arc<SessionRepo>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let projects = Arc::new(ProjectRepo::new(dir.path()).unwrap());
        let tasks = Arc::new(TaskRepo::new(dir.path()).unwrap());
        let sessions = Arc::new(SessionRepo::new(dir.path()).unwrap());
        let team_members = Arc::new(TeamMemberRepo::new(dir.path()).unwrap());
        let messages = Arc::new(MessageRepo::new(dir.path()).unwrap());
        let queues = Arc::new(QueueRepo::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());

        let service = ProjectService::new(
            projects,
            tasks.clone(),
            sessions.clone(),
            team_members,
            messages,
            queues,
            events,
            locks,
        );
        (service, tasks, sessions, dir)
    }

    #[test]
    fn create_then_update_then_get() {
        let (service, _tasks, _sessions, _dir) = harness();
        let project = service.create("demo".into(), "/tmp/demo".into()).unwrap();
        let updated = service
            .update(
                &project.id,
                ProjectPatch {
                    name: Some("renamed".into()),
                    working_dir: None,
                },
            )
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.working_dir, "/tmp/demo");
    }

    #[test]
    fn delete_cascades_to_tasks_and_sessions() {
        let (service, tasks, sessions, _dir) = harness();
        let project = service.create("demo".into(), "/tmp/demo".into()).unwrap();

        tasks
            .create(Task::new(
                "task_1_a".into(),
                project.id.clone(),
                None,
                "t".into(),
            ))
            .unwrap();

        let now = Utc::now();
        sessions
            .create(Session {
                id: "sess_1_a".into(),
                project_id: project.id.clone(),
                task_ids: vec!["task_1_a".into()],
                name: "s".into(),
                status: SessionStatus::Working,
                mode: SessionMode::Worker,
                started_at: now,
                last_activity: now,
                completed_at: None,
                env: Default::default(),
                events: vec![],
                team_member_id: None,
                team_member_snapshot: None,
                needs_input: None,
                metadata: SessionMetadata::default(),
            })
            .unwrap();

        service.delete(&project.id).unwrap();

        assert!(service.get(&project.id).is_none());
        assert!(tasks.find_by_project(&project.id).is_empty());
        assert!(sessions.find_by_project(&project.id).is_empty());
    }

    #[test]
    fn deleting_unknown_project_is_not_found() {
        let (service, _tasks, _sessions, _dir) = harness();
        let err = service.delete("proj_missing").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }
}
