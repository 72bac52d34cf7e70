//! Per-entity mutation locks (§5): one lock per task id, one per session id,
//! plus a global lock for cross-entity operations like spawn and project
//! delete. Entries are created lazily and never evicted — the id space is
//! small enough in practice that this is not a leak worth guarding against.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

#[derive(Default)]
pub struct KeyedLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().get(key) {
            return lock.clone();
        }
        self.locks
            .write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_lock() {
        let locks = KeyedLocks::new();
        let a = locks.get("task_1");
        let b = locks.get("task_1");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
