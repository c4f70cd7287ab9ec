//! Domain event fan-out to NATS

use bytes::Bytes;
use crate::domain::events::DomainEvent;

/// Publishes domain events when a NATS connection is configured; otherwise
/// events are only logged.
#[derive(Clone, Default)]
pub struct EventPublisher { nats: Option<async_nats::Client> }

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = event.subject();
            tracing::debug!(subject, ?event, "domain event");
            let Some(nats) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => Bytes::from(p),
                Err(e) => { tracing::warn!(subject, error = %e, "could not encode event"); continue; }
            };
            if let Err(e) = nats.publish(subject.to_string(), payload).await {
                tracing::warn!(subject, error = %e, "event publish failed");
            }
        }
    }
}
