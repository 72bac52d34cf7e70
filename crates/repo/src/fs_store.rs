//! Shared file-persistence helpers: atomic write-then-rename, directory
//! scan at startup with corrupt-file quarantine (§4.1, §5).

use std::path::{Path, PathBuf};

use maestro_domain::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Write `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// then rename over the destination. Readers never observe a partial write.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load every `*.json` file directly under `dir` (non-recursive), parsing
/// each as `T`. Files that fail to parse are quarantined (renamed with a
/// `.corrupt` suffix) and logged rather than aborting startup (§5).
pub fn load_dir<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_one(&path) {
            Ok(value) => out.push(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt file");
                quarantine(&path);
            }
        }
    }
    out
}

/// Load every `*.json` file recursively under `dir` (for repos that nest
/// files one level deeper, e.g. `tasks/{projectId}/{taskId}.json`).
pub fn load_dir_recursive<T: DeserializeOwned>(dir: &Path) -> Vec<T> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(load_dir_recursive(&path));
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            match load_one(&path) {
                Ok(value) => out.push(value),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt file");
                    quarantine(&path);
                }
            }
        }
    }
    out
}

fn load_one<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(Error::Json)
}

fn quarantine(path: &Path) {
    let quarantined: PathBuf = path.with_extension("json.corrupt");
    let _ = std::fs::rename(path, quarantined);
}

pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        a: u32,
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        write_atomic(&path, &Dummy { a: 7 }).unwrap();
        let loaded: Vec<Dummy> = load_dir(dir.path());
        assert_eq!(loaded, vec![Dummy { a: 7 }]);
    }

    #[test]
    fn corrupt_file_is_quarantined_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        write_atomic(&dir.path().join("good.json"), &Dummy { a: 1 }).unwrap();

        let loaded: Vec<Dummy> = load_dir(dir.path());
        assert_eq!(loaded, vec![Dummy { a: 1 }]);
        assert!(dir.path().join("bad.json.corrupt").exists());
        assert!(!dir.path().join("bad.json").exists());
    }
}
