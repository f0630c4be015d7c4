//! Message publisher used when no broker is configured.

use async_trait::async_trait;
use saga::{MessagePublisher, OutgoingIntegrationEvent};

/// Writes every outgoing integration event to the log instead of a broker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl MessagePublisher for TracingPublisher {
    async fn publish(&self, message: &OutgoingIntegrationEvent) -> saga::Result<()> {
        let body = serde_json::to_string(message)?;
        tracing::info!(
            exchange = %message.exchange,
            routing_key = %message.routing_key,
            event_id = %message.event_id,
            correlation_id = message.correlation_id.as_deref(),
            %body,
            "integration event published"
        );
        Ok(())
    }
}
