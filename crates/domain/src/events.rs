//! The closed event vocabulary (§4.5, §6). One tagged variant per event
//! name; the WebSocket bridge serializes `{type, event, data, timestamp}`
//! from these. Modeled on the teacher's `TraceEvent` tagged-enum pattern.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "task:created")]
    TaskCreated { task: serde_json::Value },
    #[serde(rename = "task:updated")]
    TaskUpdated { task: serde_json::Value },
    #[serde(rename = "task:deleted")]
    TaskDeleted { task_id: String },

    #[serde(rename = "session:created")]
    SessionCreated { session: serde_json::Value },
    #[serde(rename = "session:updated")]
    SessionUpdated { session: serde_json::Value },
    #[serde(rename = "session:deleted")]
    SessionDeleted { session_id: String },
    #[serde(rename = "session:spawn")]
    SessionSpawn {
        session_id: String,
        env_vars: std::collections::HashMap<String, String>,
        initial_command: String,
    },
    #[serde(rename = "session:task_added")]
    SessionTaskAdded { session_id: String, task_id: String },
    #[serde(rename = "session:task_removed")]
    SessionTaskRemoved { session_id: String, task_id: String },
    #[serde(rename = "session:modal_opened")]
    SessionModalOpened { session_id: String, modal: String },
    #[serde(rename = "session:modal_closed")]
    SessionModalClosed { session_id: String, modal: String },
    #[serde(rename = "session:modal_action")]
    SessionModalAction {
        session_id: String,
        modal: String,
        action: String,
    },
    #[serde(rename = "session:message_received")]
    SessionMessageReceived {
        session_id: String,
        message: serde_json::Value,
    },

    #[serde(rename = "team_member:created")]
    TeamMemberCreated { team_member: serde_json::Value },
    #[serde(rename = "team_member:updated")]
    TeamMemberUpdated { team_member: serde_json::Value },
    #[serde(rename = "team_member:deleted")]
    TeamMemberDeleted { team_member_id: String },
    #[serde(rename = "team_member:archived")]
    TeamMemberArchived { team_member_id: String },

    #[serde(rename = "message:created")]
    MessageCreated { message: serde_json::Value },
    #[serde(rename = "message:delivered")]
    MessageDelivered { message_id: String },
    #[serde(rename = "message:read")]
    MessageRead { message_id: String },

    #[serde(rename = "queue:item_started")]
    QueueItemStarted { session_id: String, task_id: String },
    #[serde(rename = "queue:item_completed")]
    QueueItemCompleted { session_id: String, task_id: String },
    #[serde(rename = "queue:item_failed")]
    QueueItemFailed { session_id: String, task_id: String },

    #[serde(rename = "project:created")]
    ProjectCreated { project: serde_json::Value },
    #[serde(rename = "project:updated")]
    ProjectUpdated { project: serde_json::Value },
    #[serde(rename = "project:deleted")]
    ProjectDeleted { project_id: String },
}

/// The wire envelope the WebSocket bridge sends: `{type, event, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub r#type: &'static str,
    pub event: &'static str,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// The event name, e.g. `"task:updated"`. Matches the `#[serde(rename)]`
    /// tag so wire output and Rust-side routing never disagree.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task:created",
            Event::TaskUpdated { .. } => "task:updated",
            Event::TaskDeleted { .. } => "task:deleted",
            Event::SessionCreated { .. } => "session:created",
            Event::SessionUpdated { .. } => "session:updated",
            Event::SessionDeleted { .. } => "session:deleted",
            Event::SessionSpawn { .. } => "session:spawn",
            Event::SessionTaskAdded { .. } => "session:task_added",
            Event::SessionTaskRemoved { .. } => "session:task_removed",
            Event::SessionModalOpened { .. } => "session:modal_opened",
            Event::SessionModalClosed { .. } => "session:modal_closed",
            Event::SessionModalAction { .. } => "session:modal_action",
            Event::SessionMessageReceived { .. } => "session:message_received",
            Event::TeamMemberCreated { .. } => "team_member:created",
            Event::TeamMemberUpdated { .. } => "team_member:updated",
            Event::TeamMemberDeleted { .. } => "team_member:deleted",
            Event::TeamMemberArchived { .. } => "team_member:archived",
            Event::MessageCreated { .. } => "message:created",
            Event::MessageDelivered { .. } => "message:delivered",
            Event::MessageRead { .. } => "message:read",
            Event::QueueItemStarted { .. } => "queue:item_started",
            Event::QueueItemCompleted { .. } => "queue:item_completed",
            Event::QueueItemFailed { .. } => "queue:item_failed",
            Event::ProjectCreated { .. } => "project:created",
            Event::ProjectUpdated { .. } => "project:updated",
            Event::ProjectDeleted { .. } => "project:deleted",
        }
    }

    /// Build the wire envelope for this event.
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            r#type: self.name(),
            event: self.name(),
            data: serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_tag_matches_name() {
        let ev = Event::TaskDeleted {
            task_id: "task_1_a".into(),
        };
        let env = ev.envelope();
        assert_eq!(env.event, "task:deleted");
        assert_eq!(env.data["event"], "task:deleted");
    }
}
