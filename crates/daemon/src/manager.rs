//! Shared plumbing for the daemon's managers.
//!
//! Both managers follow the same shape: a FIFO request queue drained by a
//! single processing loop, a shutdown token, and a wake handle that breaks
//! the loop out of its periodic sleep. Snapshot reads bypass the queue and
//! go straight through shared locks on the manager's state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half of a manager's request queue.
///
/// Cloneable so every component that needs to hand work to a manager can
/// hold its own sender. Once the queue is closed, `submit` returns `false`
/// and the request is dropped.
pub struct RequestQueue<R> {
    tx: mpsc::UnboundedSender<R>,
    open: Arc<AtomicBool>,
}

impl<R> Clone for RequestQueue<R> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            open: self.open.clone(),
        }
    }
}

impl<R> RequestQueue<R> {
    /// Enqueue a request. Returns `false` if the queue has been closed.
    pub fn submit(&self, request: R) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(request).is_ok()
    }

    /// Close the queue. Requests submitted after this point are rejected.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Whether the queue still accepts requests.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Receiving half of a manager's request queue, owned by the manager loop.
pub struct RequestStream<R> {
    rx: mpsc::UnboundedReceiver<R>,
    open: Arc<AtomicBool>,
}

impl<R> RequestStream<R> {
    /// Receive the next request in FIFO order.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    /// Close the queue from the receiving side.
    pub fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        self.rx.close();
    }
}

/// Create a linked request queue and stream.
pub fn request_queue<R>() -> (RequestQueue<R>, RequestStream<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));
    (
        RequestQueue {
            tx,
            open: open.clone(),
        },
        RequestStream { rx, open },
    )
}
