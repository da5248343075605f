//! Update publish endpoint.
//!
//! Managers hand updates to a cloneable `UpdatePublisher`; a single task
//! serializes each update once and fans it out to connected subscribers.
//! Subscribers send multipart frames whose parts are topic prefixes; an
//! update is delivered to a subscriber when its topic starts with any
//! subscribed prefix. Each subscriber has a bounded outgoing buffer and a
//! slow subscriber loses updates instead of stalling the publisher.

use crate::protocol::framing::{Multipart, MultipartCodec};
use crate::protocol::message::UpdateMessage;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Outgoing buffer depth per subscriber.
const SUBSCRIBER_BUFFER: usize = 64;

/// Cloneable handle managers publish updates through.
#[derive(Clone)]
pub struct UpdatePublisher {
    tx: mpsc::UnboundedSender<(String, UpdateMessage)>,
}

impl UpdatePublisher {
    /// Publish an update on its topic.
    ///
    /// Never blocks; if the publish task is gone the update is dropped.
    pub fn publish(&self, update: UpdateMessage) {
        let topic = update.topic();
        let _ = self.tx.send((topic, update));
    }
}

/// Receiving side of the update channel, consumed by `run_publisher`.
pub struct UpdateReceiver {
    rx: mpsc::UnboundedReceiver<(String, UpdateMessage)>,
}

impl UpdateReceiver {
    /// Receive the next published update. Test helper and publisher input.
    pub async fn recv(&mut self) -> Option<(String, UpdateMessage)> {
        self.rx.recv().await
    }
}

/// Create a linked publisher handle and receiver.
pub fn update_channel() -> (UpdatePublisher, UpdateReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdatePublisher { tx }, UpdateReceiver { rx })
}

struct Subscriber {
    prefixes: Arc<Mutex<Vec<String>>>,
    tx: mpsc::Sender<Multipart>,
}

impl Subscriber {
    fn matches(&self, topic: &str) -> bool {
        self.prefixes
            .lock()
            .map(|prefixes| prefixes.iter().any(|p| topic.starts_with(p.as_str())))
            .unwrap_or(false)
    }
}

/// Run the publish endpoint until shutdown.
///
/// Accepts subscriber connections, tracks their topic prefixes, and fans
/// published updates out to matching subscribers.
pub async fn run_publisher(
    listener: TcpListener,
    mut updates: UpdateReceiver,
    shutdown: CancellationToken,
) {
    let mut subscribers: Vec<Subscriber> = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "subscriber connected");
                        subscribers.push(spawn_subscriber(stream, shutdown.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept subscriber");
                    }
                }
            }

            update = updates.recv() => {
                let Some((topic, update)) = update else { break };
                let payload = match serde_json::to_vec(&update) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, topic, "failed to serialize update");
                        continue;
                    }
                };
                let frame: Multipart = vec![
                    Bytes::from(topic.clone().into_bytes()),
                    Bytes::from(payload),
                ];

                subscribers.retain(|subscriber| {
                    if !subscriber.matches(&topic) {
                        return !subscriber.tx.is_closed();
                    }
                    match subscriber.tx.try_send(frame.clone()) {
                        Ok(()) => true,
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::debug!(topic, "dropping update for slow subscriber");
                            true
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => false,
                    }
                });
            }
        }
    }
}

/// Spawn the per-connection task and return its registry entry.
fn spawn_subscriber(stream: tokio::net::TcpStream, shutdown: CancellationToken) -> Subscriber {
    let prefixes: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = mpsc::channel::<Multipart>(SUBSCRIBER_BUFFER);

    let task_prefixes = prefixes.clone();
    tokio::spawn(async move {
        let framed = Framed::new(stream, MultipartCodec::default());
        let (mut sink, mut incoming) = framed.split();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                outgoing = rx.recv() => {
                    match outgoing {
                        Some(frame) => {
                            if sink.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                frame = incoming.next() => {
                    match frame {
                        Some(Ok(parts)) => {
                            // Each part of a subscription frame is one prefix
                            if let Ok(mut prefixes) = task_prefixes.lock() {
                                for part in parts {
                                    if let Ok(prefix) = std::str::from_utf8(&part) {
                                        prefixes.push(prefix.to_string());
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "subscriber framing error");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    });

    Subscriber { prefixes, tx }
}
