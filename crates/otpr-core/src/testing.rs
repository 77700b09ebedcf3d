//! Test fakes for the relay ports.

use std::{
    collections::{HashSet, VecDeque},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{DestinationId, RawRecord},
    errors::Error,
    messaging::{port::DeliveryPort, types::LinkButton},
    source::OtpSource,
    Result,
};

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh, empty directory under /tmp unique to this test invocation.
pub fn tmp_dir(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let n = TMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = PathBuf::from(format!("/tmp/{prefix}-{}-{ts}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn record(time: &str, number: &str, platform: &str, otp: &str) -> RawRecord {
    RawRecord {
        timestamp: time.to_string(),
        subject: number.to_string(),
        platform: platform.to_string(),
        raw_code: otp.to_string(),
        ..RawRecord::default()
    }
}

/// Source returning scripted batches; an exhausted script yields empty batches.
#[derive(Default)]
pub struct FakeSource {
    batches: Mutex<VecDeque<Result<Vec<RawRecord>>>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeSource {
    pub fn new(batches: Vec<Result<Vec<RawRecord>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OtpSource for FakeSource {
    async fn fetch_batch(&self) -> Result<Vec<RawRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Clone, Debug)]
pub struct Delivery {
    pub destination: DestinationId,
    pub html: String,
    pub buttons: usize,
}

/// Messenger that records every delivery and fails for chosen destinations.
#[derive(Default)]
pub struct FakeMessenger {
    delivered: Mutex<Vec<Delivery>>,
    attempts: AtomicUsize,
    failing: Mutex<HashSet<DestinationId>>,
    hang: Mutex<HashSet<DestinationId>>,
}

impl FakeMessenger {
    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(DestinationId::from(id));
    }

    pub fn hang_for(&self, id: &str) {
        self.hang.lock().unwrap().insert(DestinationId::from(id));
    }

    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryPort for FakeMessenger {
    async fn deliver(
        &self,
        destination: &DestinationId,
        html: &str,
        buttons: &[LinkButton],
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let hang = self.hang.lock().unwrap().contains(destination);
        if hang {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(destination) {
            return Err(Error::DeliveryFailed {
                destination: destination.clone(),
                reason: "chat not found".to_string(),
            });
        }
        self.delivered.lock().unwrap().push(Delivery {
            destination: destination.clone(),
            html: html.to_string(),
            buttons: buttons.len(),
        });
        Ok(())
    }
}
