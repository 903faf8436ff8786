//! One-shot reorganization notifications.

use tokio::sync::oneshot;

use chainkeep_core::error::StoreError;
use chainkeep_core::types::Block;

/// A change of the canonical chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
    /// Depth of the last block shared by the old and new chains.
    pub fork_depth: u64,
    /// Blocks taken off the chain, tip first.
    pub removed: Vec<Block>,
    /// Blocks put on the chain, lowest depth first.
    pub added: Vec<Block>,
}

type Delivery = Result<ReorgEvent, StoreError>;

/// Pending listener returned by `subscribe_reorganize`.
///
/// Fires once. Resubscribe to hear about the next change.
#[derive(Debug)]
pub struct ReorgSubscription {
    rx: oneshot::Receiver<Delivery>,
}

impl ReorgSubscription {
    /// Wait for the next chain change. Resolves to `ServiceStopped` when the
    /// store shuts down first.
    pub async fn recv(self) -> Result<ReorgEvent, StoreError> {
        self.rx.await.unwrap_or(Err(StoreError::ServiceStopped))
    }
}

/// Holds outstanding subscriptions until the next event.
#[derive(Debug, Default)]
pub struct ReorgPublisher {
    listeners: Vec<oneshot::Sender<Delivery>>,
}

impl ReorgPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn subscribe(&mut self) -> ReorgSubscription {
        let (tx, rx) = oneshot::channel();
        self.register(tx);
        ReorgSubscription { rx }
    }

    /// Pair of a sender to register later and the subscription it feeds.
    pub(crate) fn pending() -> (oneshot::Sender<Delivery>, ReorgSubscription) {
        let (tx, rx) = oneshot::channel();
        (tx, ReorgSubscription { rx })
    }

    pub(crate) fn register(&mut self, tx: oneshot::Sender<Delivery>) {
        self.listeners.retain(|l| !l.is_closed());
        self.listeners.push(tx);
        tracing::debug!(listeners = self.len(), "reorganize listener registered");
    }

    /// Deliver `event` to every listener and disarm them. Returns how many
    /// were still waiting.
    pub fn publish(&mut self, event: &ReorgEvent) -> usize {
        self.drain(|| Ok(event.clone()))
    }

    /// Tell every listener the store has stopped.
    pub fn relay_stopped(&mut self) -> usize {
        self.drain(|| Err(StoreError::ServiceStopped))
    }

    fn drain(&mut self, make: impl Fn() -> Delivery) -> usize {
        self.listeners
            .drain(..)
            .filter(|tx| !tx.is_closed())
            .filter_map(|tx| tx.send(make()).ok())
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
