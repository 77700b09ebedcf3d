use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, messaging::types::LinkButton, source::SourceFields, Result};

pub const DEFAULT_FALLBACK_LABEL: &str = "TEAM ELITE X";

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,
    pub owner_id: UserId,

    // Source
    pub source_url: String,
    pub source_fields: SourceFields,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,

    // Delivery
    pub delivery_timeout: Duration,
    pub fallback_label: String,
    pub buttons: Vec<LinkButton>,

    // Durable state
    pub state_dir: PathBuf,
    pub dedup_retention: Option<Duration>,

    // Logging
    pub log_json: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let telegram_bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| Error::Config("BOT_TOKEN environment variable is required".to_string()))?;

        let owner_raw = get("OWNER_ID")
            .ok_or_else(|| Error::Config("OWNER_ID environment variable is required".to_string()))?;
        let owner_id = owner_raw
            .trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| Error::Config(format!("OWNER_ID is not a valid user id: {owner_raw}")))?;

        // Legacy deployments list several URLs in API_URLS; the relay polls one.
        let source_url = get("SOURCE_URL")
            .or_else(|| {
                get("API_URLS").and_then(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .find(|s| !s.is_empty())
                })
            })
            .ok_or_else(|| Error::Config("SOURCE_URL environment variable is required".to_string()))?;
        reqwest::Url::parse(&source_url)
            .map_err(|e| Error::Config(format!("SOURCE_URL is not a valid URL: {e}")))?;

        let defaults = SourceFields::default();
        let source_fields = SourceFields {
            timestamp: parse_csv(get("SOURCE_FIELDS_TIME")).unwrap_or(defaults.timestamp),
            subject: parse_csv(get("SOURCE_FIELDS_SUBJECT")).unwrap_or(defaults.subject),
            platform: parse_csv(get("SOURCE_FIELDS_PLATFORM")).unwrap_or(defaults.platform),
            code: parse_csv(get("SOURCE_FIELDS_CODE")).unwrap_or(defaults.code),
        };

        // Timing
        let poll_secs = parse_u64(&get, "POLL_INTERVAL_SECS")?.unwrap_or(10);
        if poll_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL_SECS must be > 0".to_string()));
        }
        let poll_interval = Duration::from_secs(poll_secs);
        let fetch_timeout =
            Duration::from_millis(parse_u64(&get, "FETCH_TIMEOUT_MS")?.unwrap_or(10_000).max(1));
        let delivery_timeout =
            Duration::from_millis(parse_u64(&get, "DELIVERY_TIMEOUT_MS")?.unwrap_or(10_000).max(1));

        let fallback_label =
            get("FALLBACK_LABEL").unwrap_or_else(|| DEFAULT_FALLBACK_LABEL.to_string());
        let buttons = parse_buttons(get("RELAY_BUTTONS"))?;

        let state_dir = PathBuf::from(get("STATE_DIR").unwrap_or("/tmp/otp-relay".to_string()));
        let dedup_retention = parse_u64(&get, "DEDUP_RETENTION_HOURS")?
            .filter(|h| *h > 0)
            .map(|h| {
                h.checked_mul(3600).map(Duration::from_secs).ok_or_else(|| {
                    Error::Config(format!("DEDUP_RETENTION_HOURS is too large: {h}"))
                })
            })
            .transpose()?;

        let log_json = get("LOG_JSON").map(|v| parse_bool(&v)).unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            owner_id,
            source_url,
            source_fields,
            poll_interval,
            fetch_timeout,
            delivery_timeout,
            fallback_label,
            buttons,
            state_dir,
            dedup_retention,
            log_json,
        })
    }

    pub fn registry_path(&self) -> PathBuf {
        self.state_dir.join("registry.json")
    }

    pub fn relay_state_path(&self) -> PathBuf {
        self.state_dir.join("relay.json")
    }

    pub fn dedup_path(&self) -> PathBuf {
        self.state_dir.join("seen.jsonl")
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_csv(v: Option<String>) -> Option<Vec<String>> {
    let out = v?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// `RELAY_BUTTONS=Channel|https://t.me/x,Support|https://t.me/y`
fn parse_buttons(v: Option<String>) -> Result<Vec<LinkButton>> {
    let Some(entries) = parse_csv(v) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some((label, url)) = entry.split_once('|') else {
            return Err(Error::Config(format!(
                "RELAY_BUTTONS entry must be label|url, got {entry}"
            )));
        };
        let (label, url) = (label.trim(), url.trim());
        if label.is_empty() {
            return Err(Error::Config(format!("RELAY_BUTTONS entry has empty label: {entry}")));
        }
        reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("RELAY_BUTTONS url {url} is invalid: {e}")))?;
        out.push(LinkButton {
            label: label.to_string(),
            url: url.to_string(),
        });
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
