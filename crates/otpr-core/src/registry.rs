use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{Destination, DestinationId},
    errors::Error,
    store, Result,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    destinations: BTreeMap<DestinationId, String>,
}

/// Durable mapping of destination id to display label.
///
/// Every mutation is written to disk before the in-memory map changes, so a
/// failed write leaves the registry exactly as it was.
pub struct DestinationRegistry {
    path: Option<PathBuf>,
    fallback_label: String,
    entries: Mutex<BTreeMap<DestinationId, String>>,
}

impl DestinationRegistry {
    pub fn open(path: impl Into<PathBuf>, fallback_label: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let entries = store::load_json::<RegistryFile>(&path)?
            .unwrap_or_default()
            .destinations;
        Ok(Self {
            path: Some(path),
            fallback_label: fallback_label.into(),
            entries: Mutex::new(entries),
        })
    }

    /// Non-durable registry (tests, dry runs).
    pub fn in_memory(fallback_label: impl Into<String>) -> Self {
        Self {
            path: None,
            fallback_label: fallback_label.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns `true` when the destination was newly inserted.
    pub async fn add(&self, id: DestinationId) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&id) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.insert(id, self.fallback_label.clone());
        self.commit(&mut entries, next)?;
        Ok(true)
    }

    /// Returns `true` when the destination existed.
    pub async fn remove(&self, id: &DestinationId) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(id) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(id);
        self.commit(&mut entries, next)?;
        Ok(true)
    }

    pub async fn set_label(&self, id: &DestinationId, label: impl Into<String>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(id) {
            return Err(Error::NotFound(id.clone()));
        }
        let mut next = entries.clone();
        next.insert(id.clone(), label.into());
        self.commit(&mut entries, next)
    }

    /// Snapshot of all destinations (sorted by id).
    pub async fn list(&self) -> Vec<Destination> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(id, label)| Destination {
                id: id.clone(),
                label: label.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Stored label, or the fallback when the id is unknown.
    pub async fn label_of(&self, id: &DestinationId) -> String {
        self.entries
            .lock()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.fallback_label.clone())
    }

    fn commit(
        &self,
        current: &mut BTreeMap<DestinationId, String>,
        next: BTreeMap<DestinationId, String>,
    ) -> Result<()> {
        let file = RegistryFile { destinations: next };
        if let Some(path) = &self.path {
            persist(path, &file)?;
        }
        *current = file.destinations;
        Ok(())
    }
}

fn persist(path: &Path, file: &RegistryFile) -> Result<()> {
    store::save_json(path, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tmp_dir;

    fn id(s: &str) -> DestinationId {
        DestinationId::from(s)
    }

    #[tokio::test]
    async fn add_is_idempotent_and_assigns_fallback_label() {
        let reg = DestinationRegistry::in_memory("TEAM ELITE X");
        assert!(reg.add(id("-100")).await.unwrap());
        assert!(!reg.add(id("-100")).await.unwrap());
        assert_eq!(reg.len().await, 1);
        assert_eq!(reg.label_of(&id("-100")).await, "TEAM ELITE X");
    }

    #[tokio::test]
    async fn remove_absent_is_a_noop() {
        let reg = DestinationRegistry::in_memory("fb");
        assert!(!reg.remove(&id("nope")).await.unwrap());
        reg.add(id("a")).await.unwrap();
        assert!(reg.remove(&id("a")).await.unwrap());
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn set_label_on_unknown_id_is_not_found() {
        let reg = DestinationRegistry::in_memory("fb");
        let err = reg.set_label(&id("ghost"), "Alpha").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(d) if d == id("ghost")));
        // No implicit insert.
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn label_of_unknown_falls_back() {
        let reg = DestinationRegistry::in_memory("fb");
        assert_eq!(reg.label_of(&id("x")).await, "fb");
    }

    #[tokio::test]
    async fn readd_after_remove_resets_label_to_fallback() {
        let reg = DestinationRegistry::in_memory("fb");
        reg.add(id("d1")).await.unwrap();
        reg.set_label(&id("d1"), "Alpha").await.unwrap();
        assert_eq!(reg.label_of(&id("d1")).await, "Alpha");

        reg.remove(&id("d1")).await.unwrap();
        reg.add(id("d1")).await.unwrap();
        assert_eq!(reg.label_of(&id("d1")).await, "fb");
    }

    #[tokio::test]
    async fn mutations_survive_reopen() {
        let dir = tmp_dir("otpr-registry");
        let path = dir.join("registry.json");
        {
            let reg = DestinationRegistry::open(&path, "fb").unwrap();
            reg.add(id("d1")).await.unwrap();
            reg.add(id("d2")).await.unwrap();
            reg.set_label(&id("d1"), "Alpha Team").await.unwrap();
            reg.remove(&id("d2")).await.unwrap();
        }

        let reg = DestinationRegistry::open(&path, "fb").unwrap();
        let all = reg.list().await;
        assert_eq!(
            all,
            vec![Destination {
                id: id("d1"),
                label: "Alpha Team".to_string()
            }]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let dir = tmp_dir("otpr-registry-fail");
        // The registry path is a directory, so the rename can never succeed.
        let path = dir.join("registry.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let reg = DestinationRegistry {
            path: Some(path),
            fallback_label: "fb".to_string(),
            entries: Mutex::new(BTreeMap::new()),
        };
        let err = reg.add(id("d1")).await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(reg.is_empty().await);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
