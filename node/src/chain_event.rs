//! Events emitted by the block processing state machine for subscribers.

use crate::state_machine::Dispatch;
use serde::Serialize;

/// Chain-level events that observers can subscribe to via the [`EventBus`].
///
/// Every token the state machine dispatches is published as one of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A block was applied, persisted and became the tip.
    BlockAccepted { height: u64, id: String },
    /// A block failed verification or application. Nothing was persisted.
    BlockRejected { height: u64, id: String, reason: String },
    /// The tip was reverted; `height` is the new tip height.
    BlockReverted { height: u64, id: String },
    /// Ledger state no longer matches the chain.
    ChainCorrupted { reason: String },
    /// A batch of blocks arrived from a peer.
    BlocksDownloaded { count: usize },
    /// A download returned nothing new.
    NoBlock,
    /// The database rollback restored integrity at `height`.
    RollbackSucceeded { height: u64, removed: u64 },
    /// The database rollback gave up.
    RollbackFailed { height: u64, removed: u64 },
}

impl ChainEvent {
    /// The dispatch token this event reports.
    pub fn token(&self) -> Dispatch {
        match self {
            Self::BlockAccepted { .. } => Dispatch::Accepted,
            Self::BlockRejected { .. } => Dispatch::Failure,
            Self::BlockReverted { .. } => Dispatch::Reverted,
            Self::ChainCorrupted { .. } => Dispatch::Corrupted,
            Self::BlocksDownloaded { .. } => Dispatch::Downloaded,
            Self::NoBlock => Dispatch::NoBlock,
            Self::RollbackSucceeded { .. } => Dispatch::Success,
            Self::RollbackFailed { .. } => Dispatch::Failure,
        }
    }

    /// JSON rendering for log shippers and websocket bridges.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Synchronous fan-out event bus for chain events.
///
/// Listeners are invoked inline on the emitting thread; keep handlers fast to
/// avoid stalling block processing.
pub struct EventBus {
    listeners: Vec<Box<dyn Fn(&ChainEvent) + Send + Sync>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn Fn(&ChainEvent) + Send + Sync>) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, event: &ChainEvent) {
        for listener in &self.listeners {
            listener(event);
        }
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
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&ChainEvent::NoBlock);

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(&ChainEvent::ChainCorrupted { reason: "test".into() });
    }

    #[test]
    fn events_map_to_dispatch_tokens() {
        assert_eq!(ChainEvent::NoBlock.token().as_str(), "NOBLOCK");
        assert_eq!(
            ChainEvent::RollbackFailed { height: 3, removed: 0 }.token().as_str(),
            "FAILURE"
        );
        assert_eq!(
            ChainEvent::BlockAccepted { height: 2, id: String::new() }.token().as_str(),
            "ACCEPTED"
        );
    }

    #[test]
    fn json_is_tagged() {
        let json = ChainEvent::BlockReverted { height: 7, id: "ab".into() }.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "block_reverted");
        assert_eq!(value["height"], 7);
    }
}
