//! Change notification for rate-table and selection consumers.

use journalfx_common::constants::EVENT_CHANNEL_CAPACITY;
use journalfx_common::CurrencyCode;
use tokio::sync::broadcast;

use crate::selection::Selection;

/// Something observable changed inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A new rate table was committed.
    RatesApplied {
        /// Table version after the swap.
        version: u64,
        /// Number of entries whose rate or change value moved.
        updated: usize,
    },
    /// A custom currency was registered.
    CurrencyAdded { code: CurrencyCode },
    /// Primary, secondary or dual-display flag changed.
    SelectionChanged(Selection),
    /// A refresh finished without applying rates.
    RefreshFailed { reason: String },
}

/// Fan-out of [`EngineEvent`]s to any number of subscribers.
///
/// Clone-able; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event and return the receiver count.
    /// Returns 0 when nobody is listening.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(
            bus.publish(EngineEvent::RefreshFailed { reason: "offline".into() }),
            0
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();

        let delivered = bus.publish(EngineEvent::RatesApplied { version: 2, updated: 3 });
        assert_eq!(delivered, 2);

        let expected = EngineEvent::RatesApplied { version: 2, updated: 3 };
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }
}
