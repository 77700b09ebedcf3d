//! Fixed-cadence source poller.
//!
//! Cycles are single-flight: the loop awaits each cycle before taking the
//! next tick, and missed ticks are delayed rather than bursted.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    dedup::DedupCache,
    dispatcher::BroadcastDispatcher,
    extract::{extract_code, fingerprint},
    gate::RelayGate,
    source::OtpSource,
};

/// Outcome of one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub gate_closed: bool,
    pub source_failed: bool,
    pub fetched: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub unrecorded: usize,
    pub dispatched: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl CycleReport {
    fn is_quiet(&self) -> bool {
        self.fetched == 0 && !self.source_failed
    }
}

pub struct SourcePoller {
    gate: Arc<RelayGate>,
    source: Arc<dyn OtpSource>,
    dedup: Arc<DedupCache>,
    dispatcher: Arc<BroadcastDispatcher>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl SourcePoller {
    pub fn new(
        gate: Arc<RelayGate>,
        source: Arc<dyn OtpSource>,
        dedup: Arc<DedupCache>,
        dispatcher: Arc<BroadcastDispatcher>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            source,
            dedup,
            dispatcher,
            interval,
            fetch_timeout,
        }
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "poller started");
        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let report = self.poll_once(&cancel).await;
                    log_report(&report);
                }
            }
        }
        info!("poller stopped");
    }

    /// Run one cycle. Never fails: every problem is confined to the record or
    /// destination it concerns and shows up in the report.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        if !self.gate.is_enabled() {
            report.gate_closed = true;
            return report;
        }

        let batch = match timeout(self.fetch_timeout, self.source.fetch_batch()).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                warn!("fetch failed: {e}");
                report.source_failed = true;
                return report;
            }
            Err(_) => {
                warn!(timeout = ?self.fetch_timeout, "fetch timed out");
                report.source_failed = true;
                return report;
            }
        };
        report.fetched = batch.len();

        for record in batch {
            if cancel.is_cancelled() {
                debug!("shutdown requested; abandoning rest of batch");
                break;
            }

            let Some(code) = extract_code(&record.raw_code) else {
                report.malformed += 1;
                continue;
            };
            let fp = fingerprint(&record, &code);

            match self.dedup.is_new_and_record(&fp).await {
                Ok(true) => {}
                Ok(false) => {
                    report.duplicates += 1;
                    continue;
                }
                Err(e) => {
                    // Not recorded, so the next cycle will see it again.
                    error!(fingerprint = fp.short(), "failed to record fingerprint: {e}");
                    report.unrecorded += 1;
                    continue;
                }
            }

            let sent = self.dispatcher.dispatch(&record, &code).await;
            report.dispatched += 1;
            report.delivered += sent.delivered;
            report.failed += sent.failed.len();
        }

        report
    }
}

fn log_report(r: &CycleReport) {
    if r.gate_closed {
        debug!("relay off; cycle skipped");
        return;
    }
    if r.is_quiet() {
        debug!("empty batch");
        return;
    }
    info!(
        fetched = r.fetched,
        malformed = r.malformed,
        duplicates = r.duplicates,
        unrecorded = r.unrecorded,
        dispatched = r.dispatched,
        delivered = r.delivered,
        failed = r.failed,
        source_failed = r.source_failed,
        "poll cycle finished"
    );
}
