//! Code extraction and fingerprinting.
//!
//! Recognized shapes: 4–8 contiguous digits, or two hyphen-joined groups of
//! 2–4 digits (`123-456`, `12-34`, `1234-5678`) with the hyphen removed.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::domain::{CanonicalCode, Fingerprint, RawRecord};

const MIN_DIGITS: usize = 4;
const MAX_DIGITS: usize = 8;

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Maximal digit runs, optionally chained by single hyphens.
    RE.get_or_init(|| Regex::new(r"[0-9]+(?:-[0-9]+)*").expect("static regex"))
}

/// First recognizable code in `text`, if any.
pub fn extract_code(text: &str) -> Option<CanonicalCode> {
    for m in digit_runs().find_iter(text) {
        let run = m.as_str();
        let groups: Vec<&str> = run.split('-').collect();

        if groups.len() == 2 && groups.iter().all(|g| (2..=4).contains(&g.len())) {
            return Some(CanonicalCode(groups.concat()));
        }

        // Not a valid grouping; any single group may still be a plain code.
        if let Some(g) = groups
            .iter()
            .find(|g| (MIN_DIGITS..=MAX_DIGITS).contains(&g.len()))
        {
            return Some(CanonicalCode(g.to_string()));
        }
    }
    None
}

/// Deterministic digest over (timestamp, subject, platform, code).
///
/// Fields are length-prefixed so no choice of field contents can collide with
/// a different split of the same bytes.
pub fn fingerprint(record: &RawRecord, code: &CanonicalCode) -> Fingerprint {
    let mut h = Sha256::new();
    for field in [
        record.timestamp.as_str(),
        record.subject.as_str(),
        record.platform.as_str(),
        code.as_str(),
    ] {
        h.update((field.len() as u64).to_le_bytes());
        h.update(field.as_bytes());
    }
    Fingerprint(hex(&h.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
