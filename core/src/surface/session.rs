use crate::prelude::VizResult;
use std::collections::HashMap;

/// Keys the controller persists in the session store.
pub mod session_keys {
    pub const UPLOADED_FILENAME: &str = "uploadedFilename";
    pub const UPLOADED_DATA: &str = "uploadedData";
    pub const BOUNDARY_PATH: &str = "boundaryPath";
}

/// Session-scoped key/value capability handed to the controller.
pub trait SessionStore {
    fn get(&self, key: &str) -> VizResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> VizResult<()>;
    fn clear(&mut self, key: &str) -> VizResult<()>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    values: HashMap<String, String>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> VizResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> VizResult<()> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> VizResult<()> {
        self.values.remove(key);
        Ok(())
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn get(&self, key: &str) -> VizResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> VizResult<()> {
        (**self).set(key, value)
    }

    fn clear(&mut self, key: &str) -> VizResult<()> {
        (**self).clear(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear_round() {
        let mut store = InMemorySessionStore::new();
        store.set(session_keys::BOUNDARY_PATH, "/static/b.geojson").unwrap();
        assert_eq!(
            store.get(session_keys::BOUNDARY_PATH).unwrap().as_deref(),
            Some("/static/b.geojson")
        );
        store.clear(session_keys::BOUNDARY_PATH).unwrap();
        assert!(store.get(session_keys::BOUNDARY_PATH).unwrap().is_none());
        assert!(store.is_empty());
    }
}
