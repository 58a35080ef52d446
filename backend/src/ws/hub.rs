// Viewer registry and video chunk fan-out.
// Invariants: broadcast never awaits a viewer; a full or closed viewer slot drops the chunk.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::trace;

use crate::utils::next_sequence;

/// Receiving end handed to a viewer connection on registration.
#[derive(Debug)]
pub struct Viewer {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
}

impl Viewer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Marks this viewer closed without leaving the hub; later chunks skip it.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[derive(Debug)]
pub struct BroadcastHub {
    viewers: RwLock<HashMap<u64, mpsc::Sender<Bytes>>>,
    sequence: AtomicU64,
    slot_capacity: usize,
}

impl BroadcastHub {
    pub fn new(slot_capacity: usize) -> Self {
        Self {
            viewers: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            slot_capacity: slot_capacity.max(1),
        }
    }

    pub async fn register(&self) -> Viewer {
        let id = next_sequence(&self.sequence);
        let (tx, rx) = mpsc::channel(self.slot_capacity);
        self.viewers.write().await.insert(id, tx);
        Viewer { id, rx }
    }

    /// Idempotent; returns whether the viewer was still registered.
    pub async fn deregister(&self, id: u64) -> bool {
        self.viewers.write().await.remove(&id).is_some()
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Hands `chunk` to every open viewer and returns how many accepted it.
    pub async fn broadcast(&self, chunk: Bytes) -> usize {
        let viewers = self.viewers.read().await;
        let mut delivered = 0;
        for (id, tx) in viewers.iter() {
            if tx.is_closed() {
                continue;
            }
            match tx.try_send(chunk.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => trace!(viewer = id, "viewer lagging, chunk dropped"),
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(crate::constants::VIEWER_BUFFER_CHUNKS)
    }
}
