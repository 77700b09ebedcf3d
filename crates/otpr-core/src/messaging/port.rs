use async_trait::async_trait;

use crate::{domain::DestinationId, messaging::types::LinkButton, Result};

/// Send-message capability used by the broadcast dispatcher.
///
/// Implementations return `Error::DeliveryFailed` (or any error) on failure;
/// the dispatcher logs it and moves on to the next destination.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn deliver(
        &self,
        destination: &DestinationId,
        html: &str,
        buttons: &[LinkButton],
    ) -> Result<()>;
}
