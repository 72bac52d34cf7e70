//! One-shot legacy-migration pass, run once at `Repositories::open` before
//! any repo loads its index from disk (§4.1, §5).
//!
//! Rewrites raw task JSON still in pre-map shape: a deprecated
//! `"type": "team-member"` task is deleted outright, and a deprecated
//! scalar `sessionStatus` (paired with a singular `sessionId`) is collapsed
//! into the current `task_session_statuses` map form. Idempotent — a task
//! file that already has `task_session_statuses` is left untouched.

use std::path::Path;

use maestro_domain::error::Result;
use serde_json::Value;

use crate::fs_store;

pub fn run(data_dir: &Path) -> Result<()> {
    let tasks_dir = data_dir.join("tasks");
    if !tasks_dir.exists() {
        return Ok(());
    }
    migrate_dir(&tasks_dir)
}

fn migrate_dir(dir: &Path) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            migrate_dir(&path)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            migrate_file(&path)?;
        }
    }
    Ok(())
}

fn migrate_file(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let Ok(mut value) = serde_json::from_str::<Value>(&raw) else {
        return Ok(());
    };

    if value.get("type").and_then(Value::as_str) == Some("team-member") {
        tracing::info!(path = %path.display(), "deleting deprecated team-member task");
        fs_store::remove_if_exists(path)?;
        return Ok(());
    }

    if collapse_legacy_session_status(&mut value) {
        tracing::info!(path = %path.display(), "collapsing legacy sessionStatus into task_session_statuses");
        fs_store::write_atomic(path, &value)?;
    }

    Ok(())
}

/// Collapses a deprecated scalar `sessionStatus` + singular `sessionId`
/// into the current `task_session_statuses` map form. Returns `true` if the
/// value was modified.
fn collapse_legacy_session_status(value: &mut Value) -> bool {
    let Some(obj) = value.as_object_mut() else {
        return false;
    };
    if obj.contains_key("task_session_statuses") {
        return false;
    }
    let Some(session_id) = obj.get("sessionId").and_then(Value::as_str).map(str::to_owned) else {
        return false;
    };
    let Some(status) = obj.remove("sessionStatus") else {
        return false;
    };

    let mut statuses = serde_json::Map::new();
    statuses.insert(session_id.clone(), status);
    obj.insert("task_session_statuses".to_string(), Value::Object(statuses));

    let session_ids = obj
        .entry("session_ids")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(arr) = session_ids.as_array_mut() {
        if !arr.iter().any(|v| v.as_str() == Some(session_id.as_str())) {
            arr.push(Value::String(session_id));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletes_deprecated_team_member_task() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_dir = dir.path().join("tasks").join("p1");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        let path = tasks_dir.join("t1.json");
        std::fs::write(&path, r#"{"id":"t1","type":"team-member"}"#).unwrap();

        run(dir.path()).unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn collapses_legacy_scalar_session_status() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_dir = dir.path().join("tasks").join("p1");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        let path = tasks_dir.join("t1.json");
        std::fs::write(
            &path,
            r#"{"id":"t1","sessionId":"sess_1","sessionStatus":"working"}"#,
        )
        .unwrap();

        run(dir.path()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["task_session_statuses"]["sess_1"], "working");
        assert_eq!(value["session_ids"][0], "sess_1");
        assert!(value.get("sessionStatus").is_none());
    }

    #[test]
    fn modern_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_dir = dir.path().join("tasks").join("p1");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        let path = tasks_dir.join("t1.json");
        let original = r#"{"id":"t1","task_session_statuses":{"sess_1":"working"}}"#;
        std::fs::write(&path, original).unwrap();

        run(dir.path()).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, original);
    }
}
