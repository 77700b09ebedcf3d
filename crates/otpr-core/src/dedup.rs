//! Durable set of fingerprints of codes that were already relayed.
//!
//! `is_new_and_record` is the single synchronization point against double
//! delivery: check and insert happen under one lock, and the insert is on
//! disk before `true` is returned.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{domain::Fingerprint, errors::Error, store, Result};

#[derive(Debug, Serialize, Deserialize)]
struct SeenLine {
    fp: Fingerprint,
    seen_at: DateTime<Utc>,
}

pub struct DedupCache {
    path: Option<PathBuf>,
    retention: Option<chrono::Duration>,
    seen: Mutex<HashMap<Fingerprint, DateTime<Utc>>>,
}

impl DedupCache {
    /// Load the cache from its append-only log.
    ///
    /// With a retention, expired fingerprints are dropped and the log is
    /// compacted. A torn final line (crash mid-append) is discarded; any other
    /// unreadable line is `Error::Corrupt`.
    pub fn open(path: impl Into<PathBuf>, retention: Option<Duration>) -> Result<Self> {
        let path = path.into();
        let retention = retention.map(to_chrono);
        let (mut seen, mut needs_rewrite) = load_log(&path)?;

        if let Some(r) = retention {
            let now = Utc::now();
            let before = seen.len();
            seen.retain(|_, at| now.signed_duration_since(*at) <= r);
            let pruned = before - seen.len();
            if pruned > 0 {
                info!(pruned, kept = seen.len(), "pruned expired fingerprints");
                needs_rewrite = true;
            }
        }

        if needs_rewrite {
            rewrite_log(&path, &seen)?;
        }

        Ok(Self {
            path: Some(path),
            retention,
            seen: Mutex::new(seen),
        })
    }

    pub fn in_memory(retention: Option<Duration>) -> Self {
        Self {
            path: None,
            retention: retention.map(to_chrono),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// `true` exactly once per fingerprint for the lifetime of the cache.
    pub async fn is_new_and_record(&self, fp: &Fingerprint) -> Result<bool> {
        self.is_new_and_record_at(fp, Utc::now()).await
    }

    pub async fn is_new_and_record_at(&self, fp: &Fingerprint, now: DateTime<Utc>) -> Result<bool> {
        let mut seen = self.seen.lock().await;
        if let Some(at) = seen.get(fp) {
            let expired = self
                .retention
                .map(|r| now.signed_duration_since(*at) > r)
                .unwrap_or(false);
            if !expired {
                return Ok(false);
            }
        }

        if let Some(path) = &self.path {
            let line = serde_json::to_string(&SeenLine {
                fp: fp.clone(),
                seen_at: now,
            })?;
            store::append_line(path, &line)?;
        }
        seen.insert(fp.clone(), now);
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

type SeenMap = HashMap<Fingerprint, DateTime<Utc>>;

/// Returns the loaded map and whether the file needs compaction.
fn load_log(path: &Path) -> Result<(SeenMap, bool)> {
    let mut seen = HashMap::new();
    if !path.exists() {
        return Ok((seen, false));
    }

    let txt = fs::read_to_string(path).map_err(|e| Error::corrupt(path, e))?;
    let terminated = txt.ends_with('\n');
    let lines: Vec<&str> = txt.lines().collect();
    let mut needs_rewrite = false;

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<SeenLine>(line) {
            Ok(entry) => {
                // Re-inserts after expiry append a newer line; keep the latest.
                let slot = seen.entry(entry.fp).or_insert(entry.seen_at);
                if entry.seen_at > *slot {
                    *slot = entry.seen_at;
                }
            }
            Err(e) if idx + 1 == lines.len() && !terminated => {
                warn!(path = %path.display(), "discarding torn final dedup entry: {e}");
                needs_rewrite = true;
            }
            Err(e) => {
                return Err(Error::corrupt(path, format!("line {}: {e}", idx + 1)));
            }
        }
    }

    Ok((seen, needs_rewrite))
}

fn rewrite_log(path: &Path, seen: &SeenMap) -> Result<()> {
    let mut entries: Vec<_> = seen.iter().collect();
    entries.sort_by_key(|(_, at)| **at);

    let mut out = String::new();
    for (fp, at) in entries {
        out.push_str(&serde_json::to_string(&SeenLine {
            fp: fp.clone(),
            seen_at: *at,
        })?);
        out.push('\n');
    }
    store::write_atomic(path, out.as_bytes())
}
