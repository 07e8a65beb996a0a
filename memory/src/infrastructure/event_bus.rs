// Copyright (c) 2026 Mnemograph contributors
// SPDX-License-Identifier: AGPL-3.0

//! Event bus implementations
//!
//! In-memory pub/sub over tokio broadcast channels. Events are lost on
//! restart; subscribers that fall behind see a lag error, not a stall.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::application::EventBus;
use crate::domain::{MemoryEvent, Result};

/// Broadcast-backed event bus. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: Arc<broadcast::Sender<MemoryEvent>>,
}

impl BroadcastEventBus {
    /// Capacity bounds the buffer per subscriber; old events are dropped
    /// once a slow subscriber falls that far behind.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: MemoryEvent) -> Result<()> {
        debug!(event_type = event.event_type(), "publishing memory event");
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("no subscribers listening to memory events");
        }
        Ok(())
    }
}

/// Receiver half of [`BroadcastEventBus`].
pub struct EventReceiver {
    receiver: broadcast::Receiver<MemoryEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> std::result::Result<MemoryEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!(lagged = n, "event receiver lagged; events were dropped");
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> std::result::Result<MemoryEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!(lagged = n, "event receiver lagged; events were dropped");
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,

    #[error("no events available")]
    Empty,

    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Event bus that drops every event. For hosts that don't consume events.
#[derive(Default, Clone)]
pub struct NoopEventBus;

#[async_trait]
impl EventBus for NoopEventBus {
    async fn publish(&self, _event: MemoryEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PatternId;
    use chrono::Utc;

    fn sample_event() -> MemoryEvent {
        MemoryEvent::PatternOverridden {
            pattern_id: PatternId::new(),
            workspace_id: "w-1".into(),
            overridden_by: "alice".into(),
            reason: "superseded".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = BroadcastEventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(sample_event()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "pattern_overridden");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = BroadcastEventBus::new(10);
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(sample_event()).await.unwrap();

        r1.recv().await.unwrap();
        r2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = BroadcastEventBus::new(10);
        assert!(bus.publish(sample_event()).await.is_ok());
    }
}
