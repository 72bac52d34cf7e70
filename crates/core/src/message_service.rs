//! MessageService — inter-session mail with rate limiting, TTL expiry, and
//! sanitization (§4.7).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use maestro_domain::config::Config;
use maestro_domain::entities::{Message, MessageMetadata, MessageStatus, TimelineEntry, UpdateSource};
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_domain::ids;
use maestro_repo::{MessageRepo, SessionRepo, TaskRepo};
use parking_lot::Mutex;

use crate::event_bus::EventBus;
use crate::locks::KeyedLocks;

#[derive(Debug, Default, Clone)]
pub struct SendMetadata {
    pub task_id: Option<String>,
    pub r#type: Option<String>,
    pub priority: Option<String>,
}

pub struct MessageService {
    messages: Arc<MessageRepo>,
    sessions: Arc<SessionRepo>,
    tasks: Arc<TaskRepo>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
    config: Arc<Config>,
    /// Sliding-window send timestamps per sender (§5: best-effort, not
    /// strictly serializable across races).
    rate_windows: Mutex<HashMap<String, Vec<chrono::DateTime<Utc>>>>,
}

impl MessageService {
    pub fn new(
        messages: Arc<MessageRepo>,
        sessions: Arc<SessionRepo>,
        tasks: Arc<TaskRepo>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            messages,
            sessions,
            tasks,
            events,
            locks,
            config,
            rate_windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn send(
        &self,
        from_session_id: &str,
        to_session_id: &str,
        body: &str,
        metadata: SendMetadata,
    ) -> Result<Message> {
        let from = self
            .sessions
            .find_by_id(from_session_id)
            .ok_or_else(|| Error::NotFound(format!("session {from_session_id} not found")))?;
        if from.status.is_terminal() {
            return Err(Error::Forbidden(
                "a terminal-state session cannot send messages".into(),
            ));
        }
        let to = self
            .sessions
            .find_by_id(to_session_id)
            .ok_or_else(|| Error::NotFound(format!("session {to_session_id} not found")))?;

        if from.project_id != to.project_id {
            return Err(Error::Forbidden(
                "cross-project messages are not allowed".into(),
            ));
        }

        self.check_rate_limit(from_session_id)?;

        let body = sanitize(body, self.config.messages.max_body_len);

        let now = Utc::now();
        let expires_at = Some(now + ChronoDuration::seconds(self.config.messages.default_ttl_seconds));
        let mut message = Message {
            id: ids::MESSAGE_IDS.generate(),
            from: from_session_id.to_string(),
            to: to_session_id.to_string(),
            body,
            status: MessageStatus::Pending,
            created_at: now,
            delivered_at: None,
            read_at: None,
            expires_at,
            metadata: MessageMetadata {
                task_id: metadata.task_id,
                r#type: metadata.r#type,
                priority: metadata.priority,
            },
        };

        // Offline-and-terminal receivers never get delivery — expire now (§4.7, §8).
        if to.status.is_terminal() {
            message.status = MessageStatus::Expired;
            let message = self.messages.create(message)?;
            self.events.publish(Event::MessageCreated {
                message: serde_json::to_value(&message).unwrap_or_default(),
            });
            maestro_domain::error::emit_best_effort(
                self.notify_sender_of_expiry(&from.id, &message),
                "notify_sender_of_expiry",
            );
            return Ok(message);
        }

        let message = self.messages.create(message)?;
        self.events.publish(Event::MessageCreated {
            message: serde_json::to_value(&message).unwrap_or_default(),
        });
        self.events.publish(Event::SessionMessageReceived {
            session_id: to_session_id.to_string(),
            message: serde_json::to_value(&message).unwrap_or_default(),
        });
        Ok(message)
    }

    /// `to = sessionId`, oldest first; transitions `pending -> delivered`
    /// on first fetch (§4.7).
    pub fn inbox(&self, session_id: &str, mark_read: bool) -> Result<Vec<Message>> {
        let lock = self.locks.get(&format!("inbox:{session_id}"));
        let _guard = lock.lock();

        let mut out = Vec::new();
        for mut message in self.messages.find_by_receiver(session_id) {
            match message.status {
                MessageStatus::Pending => {
                    message.status = if mark_read {
                        MessageStatus::Read
                    } else {
                        MessageStatus::Delivered
                    };
                    message.delivered_at = Some(Utc::now());
                    if mark_read {
                        message.read_at = Some(Utc::now());
                    }
                    let message = self.messages.update(message)?;
                    self.events.publish(Event::MessageDelivered {
                        message_id: message.id.clone(),
                    });
                    if mark_read {
                        self.events.publish(Event::MessageRead {
                            message_id: message.id.clone(),
                        });
                    }
                    out.push(message);
                }
                MessageStatus::Delivered if mark_read => {
                    message.status = MessageStatus::Read;
                    message.read_at = Some(Utc::now());
                    let message = self.messages.update(message)?;
                    self.events.publish(Event::MessageRead {
                        message_id: message.id.clone(),
                    });
                    out.push(message);
                }
                _ => out.push(message),
            }
        }
        Ok(out)
    }

    pub fn delete(&self, message_id: &str) -> Result<()> {
        self.messages.delete(message_id)
    }

    fn notify_sender_of_expiry(&self, sender_session_id: &str, message: &Message) -> Result<()> {
        let lock = self.locks.get(sender_session_id);
        let _guard = lock.lock();
        if let Some(mut session) = self.sessions.find_by_id(sender_session_id) {
            session.events.push(maestro_domain::entities::SessionEvent {
                timestamp: Utc::now(),
                kind: "message_expired".to_string(),
                payload: serde_json::json!({"messageId": message.id, "to": message.to}),
            });
            let session = self.sessions.update(session)?;
            self.events.publish(Event::SessionUpdated {
                session: serde_json::to_value(&session).unwrap_or_default(),
            });
        }
        if let Some(task_id) = &message.metadata.task_id {
            let lock = self.locks.get(task_id);
            let _guard = lock.lock();
            if let Some(mut task) = self.tasks.find_by_id(task_id) {
                task.timeline.push(TimelineEntry {
                    timestamp: Utc::now(),
                    update_source: UpdateSource::Session,
                    session_id: Some(sender_session_id.to_string()),
                    message: format!("message to {} expired: receiver is in a terminal state", message.to),
                });
                self.tasks.update(task)?;
            }
        }
        Ok(())
    }

    fn check_rate_limit(&self, sender_session_id: &str) -> Result<()> {
        let now = Utc::now();
        let window = ChronoDuration::seconds(self.config.messages.rate_limit_window_sec);
        let mut windows = self.rate_windows.lock();
        let entry = windows.entry(sender_session_id.to_string()).or_default();
        entry.retain(|t| now - *t < window);
        if entry.len() as u32 >= self.config.messages.rate_limit_max {
            return Err(Error::RateLimited(format!(
                "sender {sender_session_id} exceeded the message rate limit"
            )));
        }
        entry.push(now);
        Ok(())
    }
}

/// Strips control characters and caps length (§4.7).
fn sanitize(body: &str, max_len: usize) -> String {
    let cleaned: String = body.chars().filter(|c| !c.is_control() || *c == '\n').collect();
    if cleaned.chars().count() > max_len {
        cleaned.chars().take(max_len).collect()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::entities::{Session, SessionMetadata, SessionMode, SessionStatus};

    fn harness() -> (MessageService, Arc<SessionRepo>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let messages = Arc::new(MessageRepo::new(dir.path()).unwrap());
        let sessions = Arc::new(SessionRepo::new(dir.path()).unwrap());
        let tasks = Arc::new(TaskRepo::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());
        let mut config = Config::default();
        config.messages.rate_limit_max = 2;
        let config = Arc::new(config);

        let now = Utc::now();
        let mk = |id: &str, status: SessionStatus| Session {
            id: id.into(),
            project_id: "p1".into(),
            task_ids: vec![],
            name: id.into(),
            status,
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
        };
        sessions.create(mk("s1", SessionStatus::Working)).unwrap();
        sessions.create(mk("s2", SessionStatus::Working)).unwrap();
        sessions.create(mk("s3", SessionStatus::Completed)).unwrap();
        let mut other_project = mk("s4", SessionStatus::Working);
        other_project.project_id = "p2".into();
        sessions.create(other_project).unwrap();

        let service = MessageService::new(messages, sessions.clone(), tasks, events, locks, config);
        (service, sessions, dir)
    }

    #[test]
    fn send_then_inbox_delivers_once() {
        let (service, _sessions, _dir) = harness();
        service
            .send("s1", "s2", "please review", SendMetadata::default())
            .unwrap();

        let inbox = service.inbox("s2", false).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].status, MessageStatus::Delivered);
    }

    #[test]
    fn sending_to_terminal_session_expires_immediately() {
        let (service, _sessions, _dir) = harness();
        let message = service
            .send("s1", "s3", "hello", SendMetadata::default())
            .unwrap();
        assert_eq!(message.status, MessageStatus::Expired);
    }

    #[test]
    fn cross_project_send_is_forbidden() {
        let (service, _sessions, _dir) = harness();
        let err = service
            .send("s1", "s4", "hello", SendMetadata::default())
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn rate_limit_rejects_after_window_exceeded() {
        let (service, _sessions, _dir) = harness();
        service.send("s1", "s2", "a", SendMetadata::default()).unwrap();
        service.send("s1", "s2", "b", SendMetadata::default()).unwrap();
        let err = service
            .send("s1", "s2", "c", SendMetadata::default())
            .unwrap_err();
        assert_eq!(err.code(), "rate_limited");
    }
}
