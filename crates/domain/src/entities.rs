//! Data model — plain records with stable string IDs (§3).
//!
//! Relationships are stored as ID arrays on both sides; the server is
//! responsible for keeping them consistent (see invariants in §3 and the
//! service layer in `maestro-core`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Cancelled,
    Blocked,
}

/// Session-controlled per-session progress on a task. Distinct from
/// `TaskStatus`, which is user-controlled (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSessionStatus {
    Queued,
    Working,
    Blocked,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

/// Who caused a mutation — governs which fields a patch may touch (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    User,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub update_source: UpdateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_ids: Vec<String>,
    #[serde(default)]
    pub task_session_statuses: HashMap<String, TaskSessionStatus>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

fn default_priority() -> TaskPriority {
    TaskPriority::Medium
}

impl Task {
    pub fn new(id: String, project_id: String, parent_id: Option<String>, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            parent_id,
            title,
            description: String::new(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            session_ids: Vec::new(),
            task_session_statuses: HashMap::new(),
            timeline: Vec::new(),
            dependencies: Vec::new(),
            acceptance_criteria: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Spawning,
    Idle,
    Working,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Stopped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Worker,
    Coordinator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsInput {
    pub active: bool,
    pub question: String,
    pub since: DateTime<Utc>,
}

/// A frozen copy of the team member's identity/config at spawn time (§3).
/// Immutable once set on a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMemberSnapshot {
    pub team_member_id: String,
    pub name: String,
    pub role: String,
    pub identity: String,
    pub avatar: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_tool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionMetadata {
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
    pub name: String,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub team_member_id: Option<String>,
    #[serde(default)]
    pub team_member_snapshot: Option<TeamMemberSnapshot>,
    #[serde(default)]
    pub needs_input: Option<NeedsInput>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TeamMember
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMemberStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultKind {
    Worker,
    Coordinator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub role: String,
    pub identity: String,
    pub avatar: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_tool: Option<String>,
    #[serde(default)]
    pub skill_ids: Vec<String>,
    #[serde(default)]
    pub is_default: Option<DefaultKind>,
    pub status: TeamMemberStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A partial user override of a code default, persisted as
/// `tm_{projectId}_{worker|coordinator}.override.json` (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMemberOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_tool: Option<String>,
    #[serde(default)]
    pub skill_ids: Option<Vec<String>>,
}

impl TeamMemberOverride {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role.is_none()
            && self.identity.is_none()
            && self.avatar.is_none()
            && self.model.is_none()
            && self.agent_tool.is_none()
            && self.skill_ids.is_none()
    }

    /// `effective = merge(codeDefault, diskOverride ?? {})` (§9).
    pub fn apply(&self, base: &mut TeamMember) {
        if let Some(v) = &self.name {
            base.name = v.clone();
        }
        if let Some(v) = &self.role {
            base.role = v.clone();
        }
        if let Some(v) = &self.identity {
            base.identity = v.clone();
        }
        if let Some(v) = &self.avatar {
            base.avatar = v.clone();
        }
        if let Some(v) = &self.model {
            base.model = Some(v.clone());
        }
        if let Some(v) = &self.agent_tool {
            base.agent_tool = Some(v.clone());
        }
        if let Some(v) = &self.skill_ids {
            base.skill_ids = v.clone();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Expired,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QueueItem
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub session_id: String,
    pub task_id: String,
    pub position: u64,
    pub status: QueueItemStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
