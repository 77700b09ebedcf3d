//! Upstream source port and the HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::{domain::RawRecord, errors::Error, Result};

/// Source of raw OTP records, polled on a fixed interval.
#[async_trait]
pub trait OtpSource: Send + Sync {
    /// One batch, in source order. Any failure maps to `SourceUnavailable`.
    async fn fetch_batch(&self) -> Result<Vec<RawRecord>>;
}

/// Candidate JSON keys per record field; the first key present wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFields {
    pub timestamp: Vec<String>,
    pub subject: Vec<String>,
    pub platform: Vec<String>,
    pub code: Vec<String>,
}

impl Default for SourceFields {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            timestamp: v(&["time", "timestamp"]),
            subject: v(&["number", "phone", "subject"]),
            platform: v(&["service", "platform"]),
            code: v(&["otp", "code"]),
        }
    }
}

pub struct HttpSource {
    http: reqwest::Client,
    url: String,
    fields: SourceFields,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, fields: SourceFields, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(concat!("otpr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;

        Ok(Self {
            http,
            url: url.into(),
            fields,
        })
    }
}

#[async_trait]
impl OtpSource for HttpSource {
    async fn fetch_batch(&self) -> Result<Vec<RawRecord>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::SourceUnavailable(format!("unexpected status {status}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("invalid json body: {e}")))?;

        normalize_batch(&body, &self.fields)
    }
}

/// Turn a source payload into records. A non-array payload is an error;
/// non-object elements are skipped.
pub fn normalize_batch(body: &Value, fields: &SourceFields) -> Result<Vec<RawRecord>> {
    let Some(items) = body.as_array() else {
        return Err(Error::SourceUnavailable(
            "payload is not a JSON array".to_string(),
        ));
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            debug!("skipping non-object source element");
            continue;
        };
        let pick = |keys: &[String]| {
            keys.iter()
                .find_map(|k| obj.get(k).filter(|v| !v.is_null()))
                .map(value_text)
                .unwrap_or_default()
        };
        let fixed = |key: &str| obj.get(key).map(value_text).unwrap_or_default();

        out.push(RawRecord {
            timestamp: pick(&fields.timestamp),
            subject: pick(&fields.subject),
            platform: pick(&fields.platform),
            raw_code: pick(&fields.code),
            date: fixed("date"),
            country: fixed("country"),
            flag: fixed("flag"),
            message: fixed("message"),
        });
    }
    Ok(out)
}

fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serve exactly one canned HTTP response on a loopback port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 1024];
            while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        });
        format!("http://{addr}/otps")
    }

    fn source(url: String) -> HttpSource {
        HttpSource::new(url, SourceFields::default(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetch_parses_array_response() {
        let url = serve_once("200 OK", r#"[{"time":"t1","number":"+1","service":"X","otp":"1234"}]"#).await;
        let recs = source(url).fetch_batch().await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].raw_code, "1234");
        assert_eq!(recs[0].subject, "+1");
    }

    #[tokio::test]
    async fn error_status_is_source_unavailable() {
        let url = serve_once("503 Service Unavailable", r#"{"error":"down"}"#).await;
        let err = source(url).fetch_batch().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn non_json_body_is_source_unavailable() {
        let url = serve_once("200 OK", "<html>maintenance</html>").await;
        let err = source(url).fetch_batch().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(ref m) if m.contains("invalid json")));
    }

    #[tokio::test]
    async fn refused_connection_is_source_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = source(format!("http://{addr}/otps")).fetch_batch().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(ref m) if m.contains("request failed")));
    }

    #[test]
    fn normalizes_default_field_names() {
        let body = json!([
            {"time": "10:01", "number": "+8801", "service": "WhatsApp", "otp": "123-456",
             "date": "2026-10-14", "country": "BD", "flag": "🇧🇩", "message": "code 123-456"}
        ]);
        let recs = normalize_batch(&body, &SourceFields::default()).unwrap();
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.timestamp, "10:01");
        assert_eq!(r.subject, "+8801");
        assert_eq!(r.platform, "WhatsApp");
        assert_eq!(r.raw_code, "123-456");
        assert_eq!(r.country, "BD");
        assert_eq!(r.message, "code 123-456");
    }

    #[test]
    fn falls_back_across_candidate_keys_and_renders_numbers() {
        let body = json!([{ "timestamp": 1700000000, "phone": 8801, "platform": "X", "code": 4321 }]);
        let recs = normalize_batch(&body, &SourceFields::default()).unwrap();
        assert_eq!(recs[0].timestamp, "1700000000");
        assert_eq!(recs[0].subject, "8801");
        assert_eq!(recs[0].platform, "X");
        assert_eq!(recs[0].raw_code, "4321");
        assert_eq!(recs[0].date, "");
    }

    #[test]
    fn null_value_defers_to_next_candidate() {
        let body = json!([{ "otp": null, "code": "9999" }]);
        let recs = normalize_batch(&body, &SourceFields::default()).unwrap();
        assert_eq!(recs[0].raw_code, "9999");
    }

    #[test]
    fn custom_field_names_are_honored() {
        let fields = SourceFields {
            timestamp: vec!["ts".to_string()],
            subject: vec!["msisdn".to_string()],
            platform: vec!["app".to_string()],
            code: vec!["sms".to_string()],
        };
        let body = json!([{ "ts": "t", "msisdn": "+1", "app": "Y", "sms": " 5678 " }]);
        let recs = normalize_batch(&body, &fields).unwrap();
        assert_eq!(recs[0].raw_code, "5678");
        assert_eq!(recs[0].platform, "Y");
    }

    #[test]
    fn non_array_payload_is_source_unavailable() {
        let err = normalize_batch(&json!({"error": "down"}), &SourceFields::default()).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[test]
    fn non_object_elements_are_skipped_in_order() {
        let body = json!([1, {"otp": "1111"}, "x", {"otp": "2222"}]);
        let recs = normalize_batch(&body, &SourceFields::default()).unwrap();
        let codes: Vec<_> = recs.iter().map(|r| r.raw_code.as_str()).collect();
        assert_eq!(codes, vec!["1111", "2222"]);
    }
}
