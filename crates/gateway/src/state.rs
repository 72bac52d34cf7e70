//! Shared application state passed to every API handler (teacher's
//! `sa_gateway::state::AppState` pattern, scaled down to this server's
//! service set).

use std::sync::Arc;

use maestro_core::{
    EventBus, KeyedLocks, MessageService, ProjectService, QueueService, SessionService,
    TaskService, TeamMemberService,
};
use maestro_domain::config::Config;
use maestro_domain::error::Result;
use maestro_repo::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub events: Arc<EventBus>,
    pub projects: Arc<ProjectService>,
    pub tasks: Arc<TaskService>,
    pub sessions: Arc<SessionService>,
    pub team_members: Arc<TeamMemberService>,
    pub messages: Arc<MessageService>,
    pub queues: Arc<QueueService>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let repos = Repositories::open(&config.workspace.data_path)?;
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());

        let team_members = Arc::new(TeamMemberService::new(
            repos.team_members.clone(),
            events.clone(),
        ));
        let queues = Arc::new(QueueService::new(
            repos.queues.clone(),
            repos.tasks.clone(),
            events.clone(),
            locks.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            repos.sessions.clone(),
            repos.tasks.clone(),
            repos.projects.clone(),
            team_members.clone(),
            queues.clone(),
            events.clone(),
            locks.clone(),
            config.clone(),
        ));
        let tasks = Arc::new(TaskService::new(
            repos.tasks.clone(),
            repos.sessions.clone(),
            events.clone(),
            locks.clone(),
        ));
        let projects = Arc::new(ProjectService::new(
            repos.projects.clone(),
            repos.tasks.clone(),
            repos.sessions.clone(),
            repos.team_members.clone(),
            repos.messages.clone(),
            repos.queues.clone(),
            events.clone(),
            locks.clone(),
        ));
        let messages = Arc::new(MessageService::new(
            repos.messages.clone(),
            repos.sessions.clone(),
            repos.tasks.clone(),
            events.clone(),
            locks.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            events,
            projects,
            tasks,
            sessions,
            team_members,
            messages,
            queues,
        })
    }
}
