//! QueueService — per-session ordered task queue (§4.6).

use std::sync::Arc;

use chrono::Utc;
use maestro_domain::entities::{QueueItem, QueueItemStatus, TaskSessionStatus};
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_repo::{QueueRepo, TaskRepo};

use crate::event_bus::EventBus;
use crate::locks::KeyedLocks;

pub struct QueueService {
    queues: Arc<QueueRepo>,
    tasks: Arc<TaskRepo>,
    events: Arc<EventBus>,
    locks: Arc<KeyedLocks>,
}

impl QueueService {
    pub fn new(
        queues: Arc<QueueRepo>,
        tasks: Arc<TaskRepo>,
        events: Arc<EventBus>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            queues,
            tasks,
            events,
            locks,
        }
    }

    pub fn list(&self, session_id: &str) -> Vec<QueueItem> {
        self.queues.find_by_session(session_id)
    }

    pub fn push(&self, session_id: &str, task_id: &str) -> Result<QueueItem> {
        let lock = self.queue_lock(session_id);
        let _guard = lock.lock();

        let mut items = self.queues.find_by_session(session_id);
        let position = items.len() as u64;
        let item = QueueItem {
            session_id: session_id.to_string(),
            task_id: task_id.to_string(),
            position,
            status: QueueItemStatus::Queued,
            started_at: None,
            completed_at: None,
        };
        items.push(item.clone());
        self.queues.save(session_id, items)?;
        Ok(item)
    }

    pub fn top(&self, session_id: &str) -> Option<QueueItem> {
        self.queues
            .find_by_session(session_id)
            .into_iter()
            .find(|i| i.status == QueueItemStatus::Queued)
    }

    /// At most one item per session is `processing` (§4.6, §8).
    pub fn start(&self, session_id: &str) -> Result<QueueItem> {
        let lock = self.queue_lock(session_id);
        let _guard = lock.lock();

        let mut items = self.queues.find_by_session(session_id);
        if items.iter().any(|i| i.status == QueueItemStatus::Processing) {
            return Err(Error::Conflict(
                "a queue item is already processing for this session".into(),
            ));
        }
        let idx = items
            .iter()
            .position(|i| i.status == QueueItemStatus::Queued)
            .ok_or_else(|| Error::NotFound("no queued item for this session".into()))?;
        items[idx].status = QueueItemStatus::Processing;
        items[idx].started_at = Some(Utc::now());
        let started = items[idx].clone();
        self.queues.save(session_id, items)?;

        self.set_task_session_status(&started.task_id, session_id, TaskSessionStatus::Working)?;
        self.events.publish(Event::QueueItemStarted {
            session_id: session_id.to_string(),
            task_id: started.task_id.clone(),
        });
        Ok(started)
    }

    pub fn complete(&self, session_id: &str, task_id: &str) -> Result<QueueItem> {
        self.finish(
            session_id,
            task_id,
            QueueItemStatus::Completed,
            TaskSessionStatus::Completed,
        )
    }

    pub fn fail(&self, session_id: &str, task_id: &str) -> Result<QueueItem> {
        self.finish(
            session_id,
            task_id,
            QueueItemStatus::Failed,
            TaskSessionStatus::Failed,
        )
    }

    pub fn skip(&self, session_id: &str, task_id: &str) -> Result<QueueItem> {
        self.finish(
            session_id,
            task_id,
            QueueItemStatus::Skipped,
            TaskSessionStatus::Skipped,
        )
    }

    fn finish(
        &self,
        session_id: &str,
        task_id: &str,
        queue_status: QueueItemStatus,
        task_status: TaskSessionStatus,
    ) -> Result<QueueItem> {
        let lock = self.queue_lock(session_id);
        let _guard = lock.lock();

        let mut items = self.queues.find_by_session(session_id);
        let idx = items
            .iter()
            .position(|i| i.task_id == task_id)
            .ok_or_else(|| Error::NotFound(format!("queue item for task {task_id} not found")))?;
        items[idx].status = queue_status;
        items[idx].completed_at = Some(Utc::now());
        let finished = items[idx].clone();
        self.queues.save(session_id, items)?;

        self.set_task_session_status(task_id, session_id, task_status)?;
        let event = match queue_status {
            QueueItemStatus::Completed => Event::QueueItemCompleted {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
            },
            QueueItemStatus::Failed => Event::QueueItemFailed {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
            },
            _ => Event::QueueItemCompleted {
                session_id: session_id.to_string(),
                task_id: task_id.to_string(),
            },
        };
        self.events.publish(event);
        Ok(finished)
    }

    fn set_task_session_status(
        &self,
        task_id: &str,
        session_id: &str,
        status: TaskSessionStatus,
    ) -> Result<()> {
        let lock = self.locks.get(task_id);
        let _guard = lock.lock();
        if let Some(mut task) = self.tasks.find_by_id(task_id) {
            task.task_session_statuses
                .insert(session_id.to_string(), status);
            task.updated_at = Utc::now();
            let task = self.tasks.update(task)?;
            self.events.publish(Event::TaskUpdated {
                task: serde_json::to_value(&task).unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn queue_lock(&self, session_id: &str) -> Arc<parking_lot::Mutex<()>> {
        self.locks.get(&format!("queue:{session_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::entities::Task;

    fn service() -> (QueueService, Arc<TaskRepo>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let queues = Arc::new(QueueRepo::new(dir.path()).unwrap());
        let tasks = Arc::new(TaskRepo::new(dir.path()).unwrap());
        tasks
            .create(Task::new("t1".into(), "p1".into(), None, "a".into()))
            .unwrap();
        tasks
            .create(Task::new("t2".into(), "p1".into(), None, "b".into()))
            .unwrap();
        let events = Arc::new(EventBus::new());
        let locks = Arc::new(KeyedLocks::new());
        let service = QueueService::new(queues, tasks.clone(), events, locks);
        (service, tasks, dir)
    }

    #[test]
    fn at_most_one_item_processing() {
        let (service, _tasks, _dir) = service();
        service.push("s1", "t1").unwrap();
        service.push("s1", "t2").unwrap();

        service.start("s1").unwrap();
        let err = service.start("s1").unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn complete_advances_task_session_status() {
        let (service, tasks, _dir) = service();
        service.push("s1", "t1").unwrap();
        service.push("s1", "t2").unwrap();
        service.start("s1").unwrap();
        service.complete("s1", "t1").unwrap();

        let t1 = tasks.find_by_id("t1").unwrap();
        assert_eq!(
            t1.task_session_statuses.get("s1"),
            Some(&TaskSessionStatus::Completed)
        );

        let next = service.start("s1").unwrap();
        assert_eq!(next.task_id, "t2");
    }
}
