pub mod event_bus;
pub mod locks;
pub mod manifest;
pub mod message_service;
pub mod project_service;
pub mod queue_service;
pub mod session_service;
pub mod task_service;
pub mod team_member_service;

pub use event_bus::EventBus;
pub use locks::KeyedLocks;
pub use manifest::ManifestComposer;
pub use message_service::{MessageService, SendMetadata};
pub use project_service::{ProjectPatch, ProjectService};
pub use queue_service::QueueService;
pub use session_service::{SessionPatch, SessionService, SpawnRequest, SpawnResponse, SpawnSource};
pub use task_service::{TaskPatch, TaskService};
pub use team_member_service::{TeamMemberPatch, TeamMemberService};
