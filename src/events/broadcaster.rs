//! Per-session publish/subscribe fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::trace;

use super::SessionEvent;
use crate::session::SessionName;

/// Identifies one subscriber within a session channel.
pub type SubscriberId = u64;

/// Channel sender for delivering events to one subscriber.
pub type SubscriberSender = mpsc::UnboundedSender<SessionEvent>;

/// A joined subscriber. Dropping the receiver is equivalent to leaving.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

/// Fans events out to the subscribers of each session.
///
/// Every subscriber has its own queue, so a session's events arrive in
/// publish order. Events published while nobody listens are dropped.
pub struct EventBroadcaster {
    channels: RwLock<HashMap<SessionName, HashMap<SubscriberId, SubscriberSender>>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe to a session's events.
    ///
    /// The session does not need to exist yet.
    pub fn join(&self, name: &SessionName) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels.entry(name.clone()).or_default().insert(id, tx);
        trace!(session = %name, subscriber = id, "subscriber joined");

        Subscription { id, receiver: rx }
    }

    /// Unsubscribe. Leaving twice, or leaving an unknown session, is a no-op.
    pub fn leave(&self, name: &SessionName, id: SubscriberId) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = channels.get_mut(name) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(name);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `name`.
    ///
    /// Returns the number of subscribers reached. Subscribers whose
    /// receiver has been dropped are pruned.
    pub fn publish(&self, name: &SessionName, event: SessionEvent) -> usize {
        let mut closed = Vec::new();
        let delivered = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            let Some(subscribers) = channels.get(name) else {
                trace!(session = %name, event = event.kind(), "no subscribers");
                return 0;
            };

            let mut delivered = 0;
            for (id, tx) in subscribers {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
            delivered
        };

        for id in closed {
            self.leave(name, id);
        }
        delivered
    }

    /// Number of live subscribers for a session.
    pub fn subscriber_count(&self, name: &SessionName) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, HashMap::len)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
