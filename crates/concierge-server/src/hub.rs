use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use concierge_core::events::GatewayEvent;

use crate::subscriber::SubscriberRegistry;

/// Fan-out point between event producers and subscriber connections.
///
/// Each publish serializes the event once and hands the frame to every
/// currently-connected subscriber. Producers are serialized by an internal
/// lock, so all subscribers see event N before any subscriber sees event
/// N+1. Delivery is at-most-once and fire-and-forget: a subscriber that
/// can't take the frame is skipped, and nothing is reported back to the
/// producer.
pub struct EventHub {
    registry: Arc<SubscriberRegistry>,
    fan_out: Mutex<()>,
}

impl EventHub {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            registry,
            fan_out: Mutex::new(()),
        }
    }

    /// Broadcast a gateway-constructed event to all subscribers.
    pub async fn publish(&self, event: &GatewayEvent) {
        match serde_json::to_string(event) {
            Ok(frame) => self.fan_out_frame(event.event_type(), &frame).await,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
            }
        }
    }

    /// Broadcast an already-parsed JSON value, as relayed from a subscriber.
    /// No validation of its `type` field.
    pub async fn publish_raw(&self, event: &Value) {
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        match serde_json::to_string(event) {
            Ok(frame) => self.fan_out_frame(&event_type, &frame).await,
            Err(e) => {
                warn!(event_type, error = %e, "failed to serialize relayed event");
            }
        }
    }

    async fn fan_out_frame(&self, event_type: &str, frame: &str) {
        let _guard = self.fan_out.lock().await;
        let delivered = self.registry.broadcast(frame);
        debug!(event_type, delivered, "broadcast event");
    }
}
