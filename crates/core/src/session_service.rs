//! SessionService & SpawnCoordinator — the spawn protocol, the session
//! state machine, and needs-input gating (§4.3).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use maestro_domain::config::Config;
use maestro_domain::entities::{
    DefaultKind, Session, SessionMetadata, SessionMode, SessionStatus, TaskSessionStatus,
    TeamMemberSnapshot,
};
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_domain::ids;
use maestro_repo::{ProjectRepo, SessionRepo, TaskRepo};

use crate::event_bus::EventBus;
use crate::locks::KeyedLocks;
use crate::manifest::{Manifest, ManifestComposer};
use crate::queue_service::QueueService;
use crate::team_member_service::TeamMemberService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnSource {
    #[default]
    Api,
    Ui,
    Session,
}

#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub project_id: String,
    pub task_ids: Vec<String>,
    pub mode: SessionMode,
    pub team_member_id: Option<String>,
    pub model: Option<String>,
    pub agent_tool: Option<String>,
    pub allowed_commands: Option<Vec<String>>,
    pub spawn_source: Option<SpawnSource>,
}

pub struct SpawnResponse {
    pub session_id: String,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub env_vars: HashMap<String, String>,
    pub initial_command: String,
}

#[derive(Debug, Default, Clone)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub needs_input_active: Option<bool>,
}

pub struct SessionService {
    sessions: Arc<SessionRepo>,
    tasks: Arc<TaskRepo>,
    projects: Arc<ProjectRepo>,
    team_members: Arc<TeamMemberService>,
    queues: Arc<QueueService>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
    config: Arc<Config>,
    /// Serializes spawn calls (§5's "one global lock for cross-entity
    /// operations"); `tokio::sync::Mutex` because spawn suspends on I/O.
    spawn_lock: tokio::sync::Mutex<()>,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionRepo>,
        tasks: Arc<TaskRepo>,
        projects: Arc<ProjectRepo>,
        team_members: Arc<TeamMemberService>,
        queues: Arc<QueueService>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            sessions,
            tasks,
            projects,
            team_members,
            queues,
            events,
            locks,
            config,
            spawn_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.find_by_id(id)
    }

    pub fn list_by_project(&self, project_id: &str) -> Vec<Session> {
        self.sessions.find_by_project(project_id)
    }

    /// The full spawn protocol (§4.3, steps 1-9).
    pub async fn spawn_session(&self, request: SpawnRequest) -> Result<SpawnResponse> {
        let _global = self.spawn_lock.lock().await;

        self.projects
            .find_by_id(&request.project_id)
            .ok_or_else(|| Error::NotFound(format!("project {} not found", request.project_id)))?;

        let mut tasks = Vec::with_capacity(request.task_ids.len());
        for task_id in &request.task_ids {
            let task = self
                .tasks
                .find_by_id(task_id)
                .ok_or_else(|| Error::Validation(format!("task {task_id} not found")))?;
            if task.project_id != request.project_id {
                return Err(Error::Validation(format!(
                    "task {task_id} does not belong to project {}",
                    request.project_id
                )));
            }
            tasks.push(task);
        }

        let resolved_member = match &request.team_member_id {
            Some(id) => self
                .team_members
                .find(id)?
                .ok_or_else(|| Error::NotFound(format!("team member {id} not found")))?,
            None => {
                let kind = match request.mode {
                    SessionMode::Worker => DefaultKind::Worker,
                    SessionMode::Coordinator => DefaultKind::Coordinator,
                };
                self.team_members
                    .effective_default(&request.project_id, kind)?
            }
        };

        let snapshot = TeamMemberSnapshot {
            team_member_id: resolved_member.id.clone(),
            name: resolved_member.name.clone(),
            role: resolved_member.role.clone(),
            identity: resolved_member.identity.clone(),
            avatar: resolved_member.avatar.clone(),
            model: resolved_member.model.clone(),
            agent_tool: resolved_member.agent_tool.clone(),
        };

        // explicit request > team-member > hardcoded fallback (§4.3 step 4;
        // Task/Project carry no per-entity model override in this data model).
        let effective_model = request
            .model
            .clone()
            .or_else(|| snapshot.model.clone())
            .unwrap_or_else(|| self.config.sessions.fallback_model.clone());
        let effective_agent_tool = request
            .agent_tool
            .clone()
            .or_else(|| snapshot.agent_tool.clone())
            .unwrap_or_else(|| self.config.sessions.fallback_agent_tool.clone());

        let session_id = ids::SESSION_IDS.generate();
        let now = Utc::now();
        let session = Session {
            id: session_id.clone(),
            project_id: request.project_id.clone(),
            task_ids: request.task_ids.clone(),
            name: format!("{} — {}", snapshot.name, session_id),
            status: SessionStatus::Spawning,
            mode: request.mode,
            started_at: now,
            last_activity: now,
            completed_at: None,
            env: HashMap::new(),
            events: Vec::new(),
            team_member_id: Some(resolved_member.id.clone()),
            team_member_snapshot: Some(snapshot.clone()),
            needs_input: None,
            metadata: SessionMetadata::default(),
        };

        let ceiling = Duration::from_secs(self.config.sessions.spawn_ceiling_sec.max(1));
        let compose_result = tokio::time::timeout(
            ceiling,
            self.compose_and_link(&session, &tasks, &snapshot, &resolved_member, &request),
        )
        .await;

        let (manifest, manifest_path) = match compose_result {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let mut failed = session;
                failed.status = SessionStatus::Failed;
                failed.completed_at = Some(Utc::now());
                self.sessions.create(failed)?;
                return Err(Error::Timeout(format!(
                    "spawn exceeded {}s ceiling",
                    self.config.sessions.spawn_ceiling_sec
                )));
            }
        };

        let session = self.sessions.create(session)?;
        self.events.publish(Event::SessionCreated {
            session: serde_json::to_value(&session).unwrap_or_default(),
        });

        let single_worker_task = request.mode == SessionMode::Worker && tasks.len() == 1;
        for task in &tasks {
            let lock = self.locks.get(&task.id);
            let _guard = lock.lock();
            if let Some(mut t) = self.tasks.find_by_id(&task.id) {
                if !t.session_ids.contains(&session_id) {
                    t.session_ids.push(session_id.clone());
                }
                let status = if single_worker_task {
                    TaskSessionStatus::Working
                } else {
                    TaskSessionStatus::Queued
                };
                t.task_session_statuses.insert(session_id.clone(), status);
                t.updated_at = Utc::now();
                let t = self.tasks.update(t)?;
                self.events.publish(Event::TaskUpdated {
                    task: serde_json::to_value(&t).unwrap_or_default(),
                });
            }
            if !single_worker_task {
                self.queues.push(&session_id, &task.id)?;
            }
        }

        let mut env_vars = HashMap::new();
        env_vars.insert("MAESTRO_SESSION_ID".to_string(), session_id.clone());
        env_vars.insert("MAESTRO_PROJECT_ID".to_string(), request.project_id.clone());
        env_vars.insert(
            "MAESTRO_MANIFEST_PATH".to_string(),
            manifest_path.display().to_string(),
        );
        env_vars.insert(
            "MAESTRO_TASK_IDS".to_string(),
            request.task_ids.join(","),
        );
        env_vars.insert("MAESTRO_MODEL".to_string(), effective_model);
        env_vars.insert("MAESTRO_AGENT_TOOL".to_string(), effective_agent_tool.clone());
        let initial_command = format!("{effective_agent_tool} --session {session_id}");

        let spawn_source = request.spawn_source.unwrap_or(SpawnSource::Api);
        if matches!(spawn_source, SpawnSource::Ui | SpawnSource::Session) {
            self.events.publish(Event::SessionSpawn {
                session_id: session_id.clone(),
                env_vars: env_vars.clone(),
                initial_command: initial_command.clone(),
            });
        }

        Ok(SpawnResponse {
            session_id,
            manifest_path,
            manifest,
            env_vars,
            initial_command,
        })
    }

    async fn compose_and_link(
        &self,
        session: &Session,
        tasks: &[maestro_domain::entities::Task],
        snapshot: &TeamMemberSnapshot,
        resolved_member: &maestro_domain::entities::TeamMember,
        request: &SpawnRequest,
    ) -> Result<(Manifest, PathBuf)> {
        let manifest_snapshot = resolved_member.is_default.is_none().then_some(snapshot);
        let manifest = ManifestComposer::compose(
            &self.config,
            &session.id,
            request.mode,
            tasks,
            manifest_snapshot,
            request.allowed_commands.as_deref(),
        );
        let manifest_path = self.sessions.manifest_path(&session.id);
        maestro_repo::fs_store::write_atomic(&manifest_path, &manifest)?;
        Ok((manifest, manifest_path))
    }

    /// Idempotent "I've started" hook (§4.3).
    pub fn register_session(&self, session_id: &str, project_id: Option<String>) -> Result<Session> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        match self.sessions.find_by_id(session_id) {
            Some(mut session) => {
                if !session.status.is_terminal() {
                    session.status = SessionStatus::Working;
                    session.last_activity = Utc::now();
                }
                let session = self.sessions.update(session)?;
                self.events.publish(Event::SessionUpdated {
                    session: serde_json::to_value(&session).unwrap_or_default(),
                });
                Ok(session)
            }
            None => {
                let project_id = project_id.ok_or_else(|| {
                    Error::Validation("projectId is required to register an unknown session".into())
                })?;
                let now = Utc::now();
                let session = Session {
                    id: session_id.to_string(),
                    project_id,
                    task_ids: Vec::new(),
                    name: session_id.to_string(),
                    status: SessionStatus::Working,
                    mode: SessionMode::Worker,
                    started_at: now,
                    last_activity: now,
                    completed_at: None,
                    env: HashMap::new(),
                    events: Vec::new(),
                    team_member_id: None,
                    team_member_snapshot: None,
                    needs_input: None,
                    metadata: SessionMetadata::default(),
                };
                let session = self.sessions.create(session)?;
                self.events.publish(Event::SessionCreated {
                    session: serde_json::to_value(&session).unwrap_or_default(),
                });
                Ok(session)
            }
        }
    }

    pub fn complete_session(&self, session_id: &str) -> Result<Session> {
        self.transition(session_id, SessionStatus::Completed)
    }

    pub fn fail_session(&self, session_id: &str) -> Result<Session> {
        self.transition(session_id, SessionStatus::Failed)
    }

    pub fn stop_session(&self, session_id: &str) -> Result<Session> {
        self.transition(session_id, SessionStatus::Stopped)
    }

    /// Applies a status/needs-input patch. Terminal sessions silently
    /// reject further status changes — `forbidden`, no event emitted
    /// (resolution of the terminal-self-transition open question, §9).
    pub fn patch_session(&self, session_id: &str, patch: SessionPatch) -> Result<Session> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        let mut session = self
            .sessions
            .find_by_id(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;

        if let Some(status) = patch.status {
            if session.status.is_terminal() {
                return Err(Error::Forbidden(
                    "terminal session status cannot change".into(),
                ));
            }
            session.status = status;
            if status.is_terminal() {
                session.completed_at = Some(Utc::now());
            }
        }
        if let Some(active) = patch.needs_input_active {
            session.needs_input = active.then(|| maestro_domain::entities::NeedsInput {
                active: true,
                question: session
                    .needs_input
                    .as_ref()
                    .map(|n| n.question.clone())
                    .unwrap_or_default(),
                since: Utc::now(),
            });
        }
        session.last_activity = Utc::now();

        let session = self.sessions.update(session)?;
        self.events.publish(Event::SessionUpdated {
            session: serde_json::to_value(&session).unwrap_or_default(),
        });
        Ok(session)
    }

    /// A session reports it needs human input (§4.3).
    pub fn report_needs_input(&self, session_id: &str, question: String) -> Result<Session> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        let mut session = self
            .sessions
            .find_by_id(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
        session.needs_input = Some(maestro_domain::entities::NeedsInput {
            active: true,
            question,
            since: Utc::now(),
        });
        session.last_activity = Utc::now();
        let session = self.sessions.update(session)?;
        self.events.publish(Event::SessionUpdated {
            session: serde_json::to_value(&session).unwrap_or_default(),
        });
        Ok(session)
    }

    /// Clears needs-input because a viewer opened the session or the agent
    /// emitted a new event (§4.3).
    pub fn clear_needs_input(&self, session_id: &str) -> Result<Session> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        let mut session = self
            .sessions
            .find_by_id(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
        if session.needs_input.take().is_some() {
            session.last_activity = Utc::now();
            let session = self.sessions.update(session)?;
            self.events.publish(Event::SessionUpdated {
                session: serde_json::to_value(&session).unwrap_or_default(),
            });
            Ok(session)
        } else {
            Ok(session)
        }
    }

    /// Records agent-emitted telemetry and clears needs-input (§4.3, §6).
    pub fn record_event(
        &self,
        session_id: &str,
        kind: String,
        payload: serde_json::Value,
    ) -> Result<Session> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        let mut session = self
            .sessions
            .find_by_id(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
        session.events.push(maestro_domain::entities::SessionEvent {
            timestamp: Utc::now(),
            kind,
            payload,
        });
        session.needs_input = None;
        session.last_activity = Utc::now();
        let session = self.sessions.update(session)?;
        self.events.publish(Event::SessionUpdated {
            session: serde_json::to_value(&session).unwrap_or_default(),
        });
        Ok(session)
    }

    /// Hard-removes a session record (administrative cleanup; distinct from
    /// the graceful `stop`/`complete`/`fail` transitions).
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let lock = self.locks.get(session_id);
        let _guard = lock.lock();

        self.sessions
            .find_by_id(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;
        self.sessions.delete(session_id)?;
        self.events.publish(Event::SessionDeleted {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    fn transition(&self, session_id: &str, target: SessionStatus) -> Result<Session> {
        self.patch_session(
            session_id,
            SessionPatch {
                status: Some(target),
                needs_input_active: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team_member_service::TeamMemberService;
    use maestro_domain::entities::{Project, QueueItemStatus, Task};
    use maestro_repo::TeamMemberRepo;

    fn harness() -> (SessionService, Arc<TaskRepo>, Arc<ProjectRepo>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionRepo::new(dir.path()).unwrap());
        let tasks = Arc::new(TaskRepo::new(dir.path()).unwrap());
        let projects = Arc::new(ProjectRepo::new(dir.path()).unwrap());
        let team_member_repo = Arc::new(TeamMemberRepo::new(dir.path()).unwrap());
        let queue_repo = Arc::new(maestro_repo::QueueRepo::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());
        let config = Arc::new(Config::default());
        let team_members = Arc::new(TeamMemberService::new(team_member_repo, events.clone()));
        let queues = Arc::new(QueueService::new(
            queue_repo,
            tasks.clone(),
            events.clone(),
            locks.clone(),
        ));

        let now = Utc::now();
        projects
            .create(Project {
                id: "p1".into(),
                name: "demo".into(),
                working_dir: "/tmp/p1".into(),
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        tasks
            .create(Task::new("t1".into(), "p1".into(), None, "Ship auth".into()))
            .unwrap();
        tasks
            .create(Task::new("t2".into(), "p1".into(), None, "Write tests".into()))
            .unwrap();

        let service = SessionService::new(
            sessions,
            tasks.clone(),
            projects.clone(),
            team_members,
            queues,
            events,
            locks,
            config,
        );
        (service, tasks, projects, dir)
    }

    #[tokio::test]
    async fn spawn_worker_links_task_and_emits_spawn_event() {
        let (service, tasks, _projects, _dir) = harness();
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let _sub = service.events.subscribe(tx);

        let response = service
            .spawn_session(SpawnRequest {
                project_id: "p1".into(),
                task_ids: vec!["t1".into()],
                mode: SessionMode::Worker,
                spawn_source: Some(SpawnSource::Ui),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(response.session_id.starts_with("sess_"));
        assert!(response.manifest_path.ends_with("manifest.json"));
        assert_eq!(response.manifest.tasks[0].task_id, "t1");

        let t1 = tasks.find_by_id("t1").unwrap();
        assert_eq!(t1.session_ids, vec![response.session_id.clone()]);
        assert_eq!(
            t1.task_session_statuses.get(&response.session_id),
            Some(&TaskSessionStatus::Working)
        );

        let mut saw_spawn = false;
        while let Ok(env) = rx.try_recv() {
            if env.event == "session:spawn" {
                saw_spawn = true;
            }
        }
        assert!(saw_spawn);
    }

    #[tokio::test]
    async fn terminal_session_rejects_further_status_changes() {
        let (service, _tasks, _projects, _dir) = harness();
        let response = service
            .spawn_session(SpawnRequest {
                project_id: "p1".into(),
                task_ids: vec!["t1".into()],
                mode: SessionMode::Worker,
                ..Default::default()
            })
            .await
            .unwrap();

        service.complete_session(&response.session_id).unwrap();
        let err = service
            .patch_session(
                &response.session_id,
                SessionPatch {
                    status: Some(SessionStatus::Working),
                    needs_input_active: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let session = service.get(&response.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn multi_task_spawn_enqueues_each_task() {
        let (service, _tasks, _projects, _dir) = harness();
        let response = service
            .spawn_session(SpawnRequest {
                project_id: "p1".into(),
                task_ids: vec!["t1".into(), "t2".into()],
                mode: SessionMode::Coordinator,
                ..Default::default()
            })
            .await
            .unwrap();

        let queued = service.queues.list(&response.session_id);
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|q| q.status == QueueItemStatus::Queued));
    }

    #[tokio::test]
    async fn register_session_is_idempotent() {
        let (service, _tasks, _projects, _dir) = harness();
        let first = service.register_session("sess_x", Some("p1".into())).unwrap();
        assert_eq!(first.status, SessionStatus::Working);
        let second = service.register_session("sess_x", None).unwrap();
        assert_eq!(second.status, SessionStatus::Working);
        assert_eq!(first.id, second.id);
    }
}
