// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Broadcast event bus breaking the cyclic reference between Registry,
//! Supervisor, and Tool Cache (spec §9). The Supervisor publishes
//! `DomainEvent`s; the Tool Cache and Metrics Store subscribe; nobody
//! holds a direct back-reference.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::{DomainEvent, RouterEvent, ServiceEvent};
use crate::domain::service::ServiceName;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender: Arc::new(sender) }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    fn publish(&self, event: DomainEvent) {
        // A publish with no subscribers is not an error: the bus has no
        // durability guarantee and callers never block on it.
        if self.sender.send(event).is_err() {
            warn!("event bus has no active subscribers");
        }
    }

    pub fn publish_service_event(&self, event: ServiceEvent) {
        self.publish(DomainEvent::Service(event));
    }

    pub fn publish_router_event(&self, event: RouterEvent) {
        self.publish(DomainEvent::Router(event));
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { inner: self.sender.subscribe() }
    }

    /// A receiver filtered to `ServiceEvent`s for one service — the shape
    /// the Tool Cache uses to know when to refresh.
    pub fn subscribe_service(&self, service: ServiceName) -> ServiceEventReceiver {
        ServiceEventReceiver { inner: self.sender.subscribe(), service }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event bus closed")]
    Closed,
    #[error("receiver lagged, skipped {0} events")]
    Lagged(u64),
}

pub struct EventReceiver {
    inner: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::Closed),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus receiver lagged");
                    return Err(EventBusError::Lagged(skipped));
                }
            }
        }
    }
}

pub struct ServiceEventReceiver {
    inner: broadcast::Receiver<DomainEvent>,
    service: ServiceName,
}

impl ServiceEventReceiver {
    pub async fn recv(&mut self) -> Result<ServiceEvent, EventBusError> {
        loop {
            match self.inner.recv().await {
                Ok(DomainEvent::Service(event)) if event.service() == &self.service => {
                    return Ok(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(EventBusError::Closed),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, service = %self.service, "event bus receiver lagged");
                    return Err(EventBusError::Lagged(skipped));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_subscribe_round_trips() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish_service_event(ServiceEvent::Started { service: ServiceName::new("fs"), at: Utc::now() });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DomainEvent::Service(ServiceEvent::Started { .. })));
    }

    #[tokio::test]
    async fn service_receiver_filters_by_name() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_service(ServiceName::new("fs"));
        bus.publish_service_event(ServiceEvent::Started { service: ServiceName::new("git"), at: Utc::now() });
        bus.publish_service_event(ServiceEvent::Started { service: ServiceName::new("fs"), at: Utc::now() });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.service().as_str(), "fs");
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish_service_event(ServiceEvent::Stopped { service: ServiceName::new("fs"), at: Utc::now() });
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }
}
