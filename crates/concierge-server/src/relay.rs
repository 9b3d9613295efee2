use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use concierge_core::ids::SubscriberId;

use crate::hub::EventHub;

/// Drain inbound subscriber text frames and republish each one to the full
/// membership — including the sender.
///
/// Frames are trusted as-is: any parseable JSON is rebroadcast without a
/// type whitelist. Unparseable frames are logged and dropped; the sending
/// connection stays open.
pub async fn process_subscriber_messages(
    mut rx: mpsc::Receiver<(SubscriberId, String)>,
    hub: Arc<EventHub>,
) {
    while let Some((subscriber_id, raw)) = rx.recv().await {
        match serde_json::from_str::<Value>(&raw) {
            Ok(event) => {
                debug!(subscriber_id = %subscriber_id, "relaying subscriber event");
                hub.publish_raw(&event).await;
            }
            Err(e) => {
                warn!(
                    subscriber_id = %subscriber_id,
                    error = %e,
                    "dropping malformed subscriber message"
                );
            }
        }
    }
    debug!("relay channel closed");
}
