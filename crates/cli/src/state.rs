use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use votematch_matcher::{KeyValueStore, MemoryStore};

/// Key/value entries kept in a JSON file, rewritten on every change.
pub struct FileStore {
    path: PathBuf,
    entries: MemoryStore,
}

impl FileStore {
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Cannot read state {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid state file {}", path.display()))?
        } else {
            MemoryStore::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Cannot write state {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.entries.read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.write(key, value)?;
        self.persist()
    }

    fn read_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        self.entries.read_list(key)
    }

    fn write_list(&mut self, key: &str, values: &[String]) -> Result<()> {
        self.entries.write_list(key, values)?;
        self.persist()
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        if self.entries.read(key)?.is_none() {
            return Ok(());
        }
        self.entries.delete(key)?;
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_survive_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.read("q1").unwrap(), None);
        store.write("q1", "4").unwrap();
        store
            .write_list("Favourites", &["alice".to_string()])
            .unwrap();

        let mut reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.read("q1").unwrap().as_deref(), Some("4"));
        assert_eq!(
            reopened.read_list("Favourites").unwrap(),
            Some(vec!["alice".to_string()])
        );

        reopened.delete("q1").unwrap();
        assert_eq!(FileStore::open(&path).unwrap().read("q1").unwrap(), None);
    }

    #[test]
    fn deleting_from_an_empty_store_creates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = FileStore::open(&path).unwrap();
        store.delete("Municipality").unwrap();
        assert!(!path.exists());
    }
}
