use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    domain::{CanonicalCode, DestinationId, RawRecord},
    formatting::{render_code_body, with_label},
    messaging::{port::DeliveryPort, types::LinkButton},
    registry::DestinationRegistry,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: Vec<(DestinationId, String)>,
}

/// Fans one record out to every registered destination.
///
/// Deliveries are independent: a failure or timeout for one destination is
/// logged and never retried, and never stops the remaining destinations.
pub struct BroadcastDispatcher {
    registry: Arc<DestinationRegistry>,
    messenger: Arc<dyn DeliveryPort>,
    buttons: Vec<LinkButton>,
    delivery_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        registry: Arc<DestinationRegistry>,
        messenger: Arc<dyn DeliveryPort>,
        buttons: Vec<LinkButton>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            messenger,
            buttons,
            delivery_timeout,
        }
    }

    pub async fn dispatch(&self, record: &RawRecord, code: &CanonicalCode) -> DispatchReport {
        let body = render_code_body(record, code);
        let destinations = self.registry.list().await;
        let mut report = DispatchReport::default();

        for dest in destinations {
            report.attempted += 1;
            // Re-read so a relabel committed mid-cycle is picked up.
            let label = self.registry.label_of(&dest.id).await;
            let html = with_label(&body, &label);

            let res = timeout(
                self.delivery_timeout,
                self.messenger.deliver(&dest.id, &html, &self.buttons),
            )
            .await;

            let reason = match res {
                Ok(Ok(())) => {
                    debug!(destination = %dest.id, "delivered");
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.delivery_timeout),
            };

            warn!(destination = %dest.id, "delivery failed: {reason}");
            report.failed.push((dest.id, reason));
        }

        report
    }
}
