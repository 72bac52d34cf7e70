pub mod fs_store;
pub mod message;
pub mod migration;
pub mod project;
pub mod queue;
pub mod session;
pub mod task;
pub mod team_member;

pub use message::MessageRepo;
pub use project::ProjectRepo;
pub use queue::QueueRepo;
pub use session::SessionRepo;
pub use task::TaskRepo;
pub use team_member::TeamMemberRepo;

use maestro_domain::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Bundles every repository over one workspace data directory (§4.1).
pub struct Repositories {
    pub projects: Arc<ProjectRepo>,
    pub tasks: Arc<TaskRepo>,
    pub sessions: Arc<SessionRepo>,
    pub team_members: Arc<TeamMemberRepo>,
    pub messages: Arc<MessageRepo>,
    pub queues: Arc<QueueRepo>,
}

impl Repositories {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        migration::run(data_dir)?;
        Ok(Self {
            projects: Arc::new(ProjectRepo::new(data_dir)?),
            tasks: Arc::new(TaskRepo::new(data_dir)?),
            sessions: Arc::new(SessionRepo::new(data_dir)?),
            team_members: Arc::new(TeamMemberRepo::new(data_dir)?),
            messages: Arc::new(MessageRepo::new(data_dir)?),
            queues: Arc::new(QueueRepo::new(data_dir)?),
        })
    }
}
