use crate::canvas::Region;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const SELECTION_FILE: &str = "selection.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SelectionRecord {
    saved_at: String,
    region: Region,
}

/// Persists the current selection rectangle for the session so it survives
/// a reload. Scoped to a session directory, not shared across processes.
#[derive(Debug)]
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(session_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = session_dir.as_ref();
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Failed to create session dir {dir:?}"))?;
        Ok(Self {
            path: dir.join(SELECTION_FILE),
        })
    }

    pub fn save(&self, region: Region) -> Result<()> {
        let record = SelectionRecord {
            saved_at: Utc::now().to_rfc3339(),
            region,
        };
        let raw = serde_json::to_string_pretty(&record)
            .wrap_err("Failed to serialize selection")?;
        fs::write(&self.path, raw)
            .wrap_err_with(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }

    /// The restored selection, if one was saved and still parses. A missing
    /// or corrupt file is not an error: there is simply nothing to restore.
    pub fn load(&self) -> Option<Region> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let record: SelectionRecord = serde_json::from_str(&raw).ok()?;
        let r = record.region;
        Some(Region::normalized(r.x0, r.y0, r.x1, r.y1))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .wrap_err_with(|| format!("Failed to remove {:?}", self.path))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn load__round_trips_a_saved_selection() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path()).unwrap();
        let region = Region {
            x0: 3,
            y0: 4,
            x1: 10,
            y1: 12,
        };

        // when
        store.save(region).unwrap();

        // then
        assert_eq!(store.load(), Some(region));
    }

    #[test]
    fn load__returns_none_when_nothing_was_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path()).unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn load__normalizes_a_tampered_rectangle() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path()).unwrap();
        let raw = r#"{"saved_at":"2026-01-01T00:00:00Z","region":{"x0":9,"y0":9,"x1":2,"y1":3}}"#;
        fs::write(dir.path().join(SELECTION_FILE), raw).unwrap();

        // when
        let region = store.load().unwrap();

        // then
        assert!(region.x0 <= region.x1 && region.y0 <= region.y1);
    }

    #[test]
    fn clear__removes_the_saved_selection() {
        // given
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path()).unwrap();
        store
            .save(Region {
                x0: 0,
                y0: 0,
                x1: 1,
                y1: 1,
            })
            .unwrap();

        // when
        store.clear().unwrap();

        // then
        assert_eq!(store.load(), None);
    }
}
