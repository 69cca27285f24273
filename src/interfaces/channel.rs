use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::error::BridgeError;

pub type ChannelSubscription = mpsc::UnboundedReceiver<Value>;

/// Page-wide message bus shared by the page and the extension's content
/// script. Every subscriber sees every posted message, including its own.
pub trait ExtensionChannel: Send + Sync {
    fn post(&self, message: Value) -> Result<(), BridgeError>;

    fn subscribe(&self) -> ChannelSubscription;
}

/// Fans every message out to one unbounded queue per subscriber, so a burst
/// of posts is never dropped however slowly a subscriber drains it.
/// Subscribers that went away are pruned on the next post.
#[derive(Debug, Default)]
pub struct WindowChannel {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
}

impl WindowChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<Value>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExtensionChannel for WindowChannel {
    fn post(&self, message: Value) -> Result<(), BridgeError> {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| sender.send(message.clone()).is_ok());
        if subscribers.is_empty() {
            return Err(BridgeError::ChannelClosed(
                "window channel has no listeners".to_owned(),
            ));
        }
        debug!("window message posted receivers={}", subscribers.len());
        Ok(())
    }

    fn subscribe(&self) -> ChannelSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().push(sender);
        receiver
    }
}
