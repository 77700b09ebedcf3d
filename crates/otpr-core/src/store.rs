//! File helpers shared by the durable stores.
//!
//! Whole documents are replaced atomically (temp file + fsync + rename);
//! the dedup log is append-only with an fsync per line.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::{errors::Error, Result};

/// Read a JSON document. `Ok(None)` when the file is missing or blank.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = fs::read_to_string(path).map_err(|e| Error::corrupt(path, e))?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&txt)
        .map(Some)
        .map_err(|e| Error::corrupt(path, e))
}

/// Durably replace `path` with the JSON encoding of `value`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let txt = serde_json::to_string_pretty(value)?;
    write_atomic(path, txt.as_bytes())
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = tmp_path(path);

    let res = (|| -> std::io::Result<()> {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)?;
        sync_parent(path);
        Ok(())
    })();

    res.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::persistence(path, e)
    })
}

/// Append one line and fsync before returning.
///
/// The file always ends on a line boundary afterwards: a failed write is
/// truncated back to the previous length, and an unterminated tail left by
/// an earlier failure is cut off before appending.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    ensure_parent(path)?;
    let res = (|| -> std::io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let prev = line_boundary(&mut f)?;
        if prev < f.metadata()?.len() {
            warn!(path = %path.display(), "dropping unterminated tail before append");
            f.set_len(prev)?;
        }

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        if let Err(e) = f.write_all(buf.as_bytes()).and_then(|_| f.sync_data()) {
            let _ = f.set_len(prev);
            return Err(e);
        }
        Ok(())
    })();
    res.map_err(|e| Error::persistence(path, e))
}

/// Length of the file up to and including its last newline.
fn line_boundary(f: &mut File) -> std::io::Result<u64> {
    let len = f.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }
    let mut last = [0u8; 1];
    f.seek(SeekFrom::End(-1))?;
    f.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut bytes = Vec::with_capacity(len as usize);
    f.seek(SeekFrom::Start(0))?;
    f.read_to_end(&mut bytes)?;
    Ok(bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i as u64 + 1)
        .unwrap_or(0))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::persistence(path, e))?;
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.tmp-{}", std::process::id()))
}

fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
