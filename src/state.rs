use crate::error::{AppError, Result};
use crate::reconcile::CounterState;
use std::collections::BTreeMap;
use std::path::Path;

// The state file is the only copy of the lifetime counter totals, so it is
// written atomically and a corrupt file is a hard error rather than a silent
// reset.

/// Load persisted counter state. A missing file is a clean first start.
pub fn load(path: &Path) -> Result<Option<BTreeMap<String, CounterState>>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let states = serde_json::from_str(&raw).map_err(|e| {
                AppError::State(format!("corrupt state file {}: {}", path.display(), e))
            })?;
            Ok(Some(states))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::State(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Write the state file via a temp file + rename so a crash mid-write never
/// truncates the previous copy.
pub fn save(path: &Path, states: &BTreeMap<String, CounterState>) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::State(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
    }

    let raw = serde_json::to_string_pretty(states)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, raw)
        .map_err(|e| AppError::State(format!("cannot write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| AppError::State(format!("cannot rename into {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_states() -> BTreeMap<String, CounterState> {
        let mut states = BTreeMap::new();
        states.insert(
            "heating_energy".to_string(),
            CounterState {
                last_daily: 7.5,
                total: 1234.5,
                day: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            },
        );
        states
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");

        let states = sample_states();
        save(&path, &states).unwrap();
        let loaded = load(&path).unwrap().unwrap();

        assert_eq!(loaded, states);
    }

    #[test]
    fn test_missing_file_is_clean_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load(&path), Err(AppError::State(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/counters.json");

        save(&path, &sample_states()).unwrap();
        assert!(load(&path).unwrap().is_some());
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");

        save(&path, &sample_states()).unwrap();

        let mut updated = sample_states();
        updated.get_mut("heating_energy").unwrap().total = 2000.0;
        save(&path, &updated).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded["heating_energy"].total, 2000.0);
        // no leftover temp file
        assert!(!path.with_extension("tmp").exists());
    }
}
