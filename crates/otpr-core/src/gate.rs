use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::{store, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RelayStateFile {
    #[serde(default)]
    enabled: bool,
}

/// Durable on/off switch read by the poller before each cycle.
///
/// Toggling never interrupts a cycle in flight; it only decides whether the
/// next one fetches.
pub struct RelayGate {
    path: Option<PathBuf>,
    enabled: AtomicBool,
    // Serializes writers so disk and memory agree on the last toggle.
    write_lock: Mutex<()>,
}

impl RelayGate {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let enabled = store::load_json::<RelayStateFile>(&path)?
            .unwrap_or_default()
            .enabled;
        Ok(Self {
            path: Some(path),
            enabled: AtomicBool::new(enabled),
            write_lock: Mutex::new(()),
        })
    }

    pub fn in_memory(enabled: bool) -> Self {
        Self {
            path: None,
            enabled: AtomicBool::new(enabled),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn enable(&self) -> Result<()> {
        self.set_enabled(true).await
    }

    pub async fn disable(&self) -> Result<()> {
        self.set_enabled(false).await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(path) = &self.path {
            store::save_json(path, &RelayStateFile { enabled })?;
        }
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "relay gate toggled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tmp_dir;

    #[tokio::test]
    async fn starts_disabled_without_state_file() {
        let dir = tmp_dir("otpr-gate");
        let gate = RelayGate::open(dir.join("relay.json")).unwrap();
        assert!(!gate.is_enabled());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn toggles_persist_across_reopen() {
        let dir = tmp_dir("otpr-gate-persist");
        let path = dir.join("relay.json");

        let gate = RelayGate::open(&path).unwrap();
        gate.enable().await.unwrap();
        assert!(gate.is_enabled());
        assert!(RelayGate::open(&path).unwrap().is_enabled());

        gate.disable().await.unwrap();
        assert!(!RelayGate::open(&path).unwrap().is_enabled());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_value() {
        let dir = tmp_dir("otpr-gate-fail");
        let path = dir.join("relay.json");
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let gate = RelayGate {
            path: Some(path),
            enabled: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        };
        assert!(gate.enable().await.is_err());
        assert!(!gate.is_enabled());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
