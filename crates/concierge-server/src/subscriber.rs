use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use concierge_core::ids::SubscriberId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const PEER_TIMEOUT: Duration = Duration::from_secs(90);

/// A connected subscriber: the outbound queue plus liveness state.
///
/// Immutable after registration apart from its atomics, so the registry can
/// hand out shared references without locking.
pub struct Subscriber {
    pub id: SubscriberId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
    dropped_frames: AtomicU64,
}

impl Subscriber {
    fn new(id: SubscriberId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < PEER_TIMEOUT.as_secs()
    }

    /// Lifetime count of frames dropped because this subscriber's queue was
    /// full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Membership set of live subscriber connections.
///
/// A subscriber is a member exactly while its socket is open from the hub's
/// perspective: registered on upgrade, unregistered by its own lifecycle
/// task on close or error (or by the dead-peer sweep). Membership mutations
/// and broadcast iteration may run concurrently.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Arc<Subscriber>>,
    max_send_queue: usize,
}

impl SubscriberRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new subscriber and return its id plus the receiving end of
    /// its outbound queue.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.subscribers
            .insert(id.clone(), Arc::new(Subscriber::new(id.clone(), tx)));
        (id, rx)
    }

    /// Remove a subscriber. Removing an id that is already gone is a no-op.
    pub fn unregister(&self, id: &SubscriberId) {
        if let Some((_, subscriber)) = self.subscribers.remove(id) {
            subscriber.mark_disconnected();
        }
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver one frame to every connected member, best-effort.
    ///
    /// Sends are non-blocking: a subscriber whose queue is full or closed is
    /// skipped, never awaited, and never removed here — its own lifecycle
    /// path handles removal. Returns the number of successful deliveries.
    pub(crate) fn broadcast(&self, message: &str) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.is_connected() {
                continue;
            }
            match subscriber.tx.try_send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let drops = subscriber.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber_id = %subscriber.id,
                        total_drops = drops,
                        "send queue full, dropping frame"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Peer already went away; its lifecycle task unregisters it.
                }
            }
        }
        delivered
    }

    pub(crate) fn get(&self, id: &SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn record_pong(&self, id: &SubscriberId) {
        if let Some(subscriber) = self.subscribers.get(id) {
            subscriber.record_pong();
        }
    }

    /// Remove subscribers that haven't answered a ping within the timeout.
    pub fn cleanup_dead(&self) -> usize {
        let dead: Vec<SubscriberId> = self
            .subscribers
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.value().id.clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.unregister(&id);
            tracing::info!(subscriber_id = %id, "removed unresponsive subscriber");
        }
        removed
    }
}

/// Run one WebSocket connection to completion: writer forwards queued frames
/// and pings, reader feeds inbound text to the relay and tracks pongs. The
/// subscriber is unregistered when either side finishes.
pub async fn handle_ws_connection(
    socket: WebSocket,
    subscriber_id: SubscriberId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<SubscriberRegistry>,
    on_message: mpsc::Sender<(SubscriberId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = subscriber_id.clone();
    let writer_registry = Arc::clone(&registry);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(subscriber_id = %writer_id, "sent ping");
                }
            }
        }

        if let Some(subscriber) = writer_registry.get(&writer_id) {
            subscriber.mark_disconnected();
        }
    });

    let reader_id = subscriber_id.clone();
    let reader_registry = Arc::clone(&registry);
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_id.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    reader_registry.record_pong(&reader_id);
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pings automatically
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&subscriber_id);
}

/// Background sweep that unregisters peers past the pong timeout.
pub fn start_cleanup_task(
    registry: Arc<SubscriberRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead();
            if removed > 0 {
                tracing::info!(removed = removed, "dead subscriber cleanup");
            }
        }
    })
}
