use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::model::{ChangeEvent, ProductId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-product change notifications.
pub struct NotifyHub {
    channels: DashMap<ProductId, broadcast::Sender<ChangeEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a product. Creates the channel if needed.
    pub fn subscribe(self: &Arc<Self>, product_id: ProductId) -> Subscription {
        let receiver = self
            .channels
            .entry(product_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        Subscription {
            product_id,
            receiver: Some(receiver),
            hub: Arc::downgrade(self),
        }
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, event: &ChangeEvent) {
        if let Some(sender) = self.channels.get(&event.product_id()) {
            let _ = sender.send(event.clone());
        }
    }

    /// Products with at least one open channel.
    pub fn products(&self) -> Vec<ProductId> {
        self.channels.iter().map(|e| *e.key()).collect()
    }

    pub fn subscriber_count(&self, product_id: &ProductId) -> usize {
        self.channels
            .get(product_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Drop the channel once its last subscriber is gone.
    fn release(&self, product_id: &ProductId) {
        self.channels
            .remove_if(product_id, |_, sender| sender.receiver_count() == 0);
    }
}

/// What a subscription delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Changed(ChangeEvent),
    /// The receiver fell behind and `n` events were dropped. State must be re-read.
    Lagged(u64),
}

/// Cancellable registration on a product's change feed.
///
/// The receiver is a single-consumer queue: events published while the holder
/// is busy wait here until drained. Dropping the handle unsubscribes.
pub struct Subscription {
    product_id: ProductId,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
    hub: Weak<NotifyHub>,
}

impl Subscription {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Wait for the next notification. `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        let receiver = self.receiver.as_mut()?;
        match receiver.recv().await {
            Ok(event) => Some(Notification::Changed(event)),
            Err(RecvError::Lagged(n)) => Some(Notification::Lagged(n)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Discard everything already queued and return how many notifications that was.
    pub fn drain(&mut self) -> usize {
        let Some(receiver) = self.receiver.as_mut() else {
            return 0;
        };
        let mut drained = 0;
        loop {
            match receiver.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => drained += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        drained
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the hub counts remaining subscribers.
        drop(self.receiver.take());
        if let Some(hub) = self.hub.upgrade() {
            hub.release(&self.product_id);
        }
    }
}
