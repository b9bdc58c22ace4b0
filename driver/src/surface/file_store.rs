use limnocore::surface::SessionStore;
use limnocore::{VizError, VizResult};
use log::warn;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Session store persisted as one JSON object, so a later invocation picks
/// up where the previous one stopped.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileSessionStore {
    /// Opens `path`; a missing file starts an empty session and an
    /// unreadable one is discarded with a warning.
    pub fn open(path: impl Into<PathBuf>) -> VizResult<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("discarding corrupt session file {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(VizError::Storage(format!(
                    "reading session file {}: {err}",
                    path.display()
                )))
            }
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Writes through a temporary file in the same directory and renames it
    /// over the session file.
    fn flush(&self) -> VizResult<()> {
        let storage = |err: std::io::Error| {
            VizError::Storage(format!("writing session file {}: {err}", self.path.display()))
        };
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(storage)?;
        let contents = serde_json::to_vec_pretty(&self.values)
            .map_err(|e| VizError::Storage(e.to_string()))?;
        let mut temp = NamedTempFile::new_in(&parent).map_err(storage)?;
        temp.write_all(&contents).map_err(storage)?;
        temp.persist(&self.path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> VizResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> VizResult<()> {
        let previous = self.values.insert(key.to_owned(), value.to_owned());
        self.flush().map_err(|err| {
            match previous {
                Some(previous) => self.values.insert(key.to_owned(), previous),
                None => self.values.remove(key),
            };
            err
        })
    }

    fn clear(&mut self, key: &str) -> VizResult<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limnocore::surface::session_keys;
    use tempfile::tempdir;

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        let mut store = FileSessionStore::open(&path).unwrap();
        store.set(session_keys::UPLOADED_FILENAME, "lake.csv").unwrap();
        store.set(session_keys::BOUNDARY_PATH, "/static/b.geojson").unwrap();
        store.clear(session_keys::BOUNDARY_PATH).unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(session_keys::UPLOADED_FILENAME).unwrap().as_deref(),
            Some("lake.csv")
        );
        assert!(reopened.get(session_keys::BOUNDARY_PATH).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.keys().count(), 0);
    }
}
