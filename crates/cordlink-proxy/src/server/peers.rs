use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

pub type PeerId = u64;

/// Outbound queues of every attached peer.
#[derive(Clone, Default)]
pub struct PeerSet {
    inner: Arc<RwLock<HashMap<PeerId, mpsc::Sender<String>>>>,
    next_id: Arc<AtomicU64>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx`, first queueing the frame `first` builds.
    ///
    /// `first` runs under the write lock, so no broadcast can land between
    /// the state it snapshots and the peer joining the set.
    pub async fn register_with(
        &self,
        tx: mpsc::Sender<String>,
        first: impl FnOnce() -> Option<String>,
    ) -> PeerId {
        let mut peers = self.inner.write().await;
        if let Some(frame) = first() {
            let _ = tx.try_send(frame);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        peers.insert(id, tx);
        id
    }

    pub async fn unregister(&self, id: PeerId) {
        self.inner.write().await.remove(&id);
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Queue `text` for every peer. A peer whose queue is full or closed is
    /// skipped; it never holds up the others. Returns how many accepted it.
    pub async fn broadcast(&self, text: &str) -> usize {
        let peers = self.inner.read().await;
        let mut delivered = 0;
        for (id, tx) in peers.iter() {
            match tx.try_send(text.to_owned()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(peer_id = id, "Peer queue full, dropping broadcast");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_unregister() {
        let peers = PeerSet::new();
        let (tx, _rx) = mpsc::channel(1);
        let a = peers.register_with(tx.clone(), || None).await;
        let b = peers.register_with(tx, || None).await;
        assert_ne!(a, b);
        assert_eq!(peers.count().await, 2);

        peers.unregister(a).await;
        assert_eq!(peers.count().await, 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_peer() {
        let peers = PeerSet::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        peers.register_with(tx1, || None).await;
        peers.register_with(tx2, || None).await;

        assert_eq!(peers.broadcast("hello").await, 2);
        assert_eq!(rx1.recv().await.unwrap(), "hello");
        assert_eq!(rx2.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn first_frame_precedes_concurrent_broadcast() {
        let peers = PeerSet::new();
        let (tx, mut rx) = mpsc::channel(4);

        // A broadcast racing the registration must queue behind the
        // snapshot or miss the peer entirely, never slip in front of it.
        let (_, delivered) = tokio::join!(
            peers.register_with(tx, || Some("state".to_owned())),
            peers.broadcast("event"),
        );
        assert_eq!(rx.recv().await.unwrap(), "state");
        if delivered == 1 {
            assert_eq!(rx.recv().await.unwrap(), "event");
        }
        assert!(rx.try_recv().is_err());

        peers.broadcast("later").await;
        assert_eq!(rx.recv().await.unwrap(), "later");
    }

    #[tokio::test]
    async fn full_or_closed_peer_is_skipped() {
        let peers = PeerSet::new();
        let (slow, _slow_rx) = mpsc::channel(1);
        let (gone, gone_rx) = mpsc::channel(4);
        let (ok, mut ok_rx) = mpsc::channel(4);
        drop(gone_rx);
        peers.register_with(slow, || None).await;
        peers.register_with(gone, || None).await;
        peers.register_with(ok, || None).await;

        assert_eq!(peers.broadcast("one").await, 2);
        assert_eq!(peers.broadcast("two").await, 1);
        assert_eq!(ok_rx.recv().await.unwrap(), "one");
        assert_eq!(ok_rx.recv().await.unwrap(), "two");
    }
}
