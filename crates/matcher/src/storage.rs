use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the selected municipality id.
pub const KEY_MUNICIPALITY: &str = "Municipality";
/// Key of the favourite candidate id list.
pub const KEY_FAVOURITES: &str = "Favourites";
/// Key set to `"1"` once session statistics were sent.
pub const KEY_STATISTICS_SAVED: &str = "StatisticsSaved";

/// Persistence for voter answers and preferences. Voter answers are stored
/// under their question id.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()>;

    fn read_list(&self, key: &str) -> anyhow::Result<Option<Vec<String>>>;

    fn write_list(&mut self, key: &str, values: &[String]) -> anyhow::Result<()>;

    fn delete(&mut self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Scalar(String),
    List(Vec<String>),
}

/// Store kept in memory. Serialisable so front ends can persist it whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    entries: BTreeMap<String, StoredValue>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, StoredValue> {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(match self.entries.get(key) {
            Some(StoredValue::Scalar(value)) => Some(value.clone()),
            Some(StoredValue::List(values)) => Some(values.join(",")),
            None => None,
        })
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::Scalar(value.to_string()));
        Ok(())
    }

    fn read_list(&self, key: &str) -> anyhow::Result<Option<Vec<String>>> {
        Ok(match self.entries.get(key) {
            Some(StoredValue::List(values)) => Some(values.clone()),
            Some(StoredValue::Scalar(value)) => Some(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            None => None,
        })
    }

    fn write_list(&mut self, key: &str, values: &[String]) -> anyhow::Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::List(values.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_and_lists() {
        let mut store = MemoryStore::new();
        store.write(KEY_MUNICIPALITY, "m1").unwrap();
        store
            .write_list(KEY_FAVOURITES, &["a".to_string(), "b".to_string()])
            .unwrap();

        assert_eq!(store.read(KEY_MUNICIPALITY).unwrap().as_deref(), Some("m1"));
        assert_eq!(
            store.read_list(KEY_FAVOURITES).unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(store.read("missing").unwrap(), None);

        store.delete(KEY_FAVOURITES).unwrap();
        assert_eq!(store.read_list(KEY_FAVOURITES).unwrap(), None);
    }

    #[test]
    fn serialises_as_a_flat_object() {
        let mut store = MemoryStore::new();
        store.write("q1", "4").unwrap();
        store.write_list(KEY_FAVOURITES, &["c1".to_string()]).unwrap();
        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(json, r#"{"Favourites":["c1"],"q1":"4"}"#);
        let back: MemoryStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
