//! Session event fan-out.

mod broadcaster;
mod event;

pub use broadcaster::{EventBroadcaster, SubscriberId, SubscriberSender, Subscription};
pub use event::{SessionEvent, REASON_ATTEMPT_LIMIT, REASON_AUTH_FAILURE, REASON_DESTROYED};
