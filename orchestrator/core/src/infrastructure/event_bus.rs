// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. The bus is
// injected into every service that publishes; nothing subscribes globally.
// Delivery is best-effort: publishers never depend on it for correctness.

use crate::domain::events::{AlertEvent, MissionRunEvent, RobotEvent};
use crate::domain::mission::MissionRunId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    MissionRun(MissionRunEvent),
    Robot(RobotEvent),
    Alert(AlertEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_mission_run_event(&self, event: MissionRunEvent) {
        self.publish(DomainEvent::MissionRun(event));
    }

    pub fn publish_robot_event(&self, event: RobotEvent) {
        self.publish(DomainEvent::Robot(event));
    }

    pub fn publish_alert(&self, event: AlertEvent) {
        self.publish(DomainEvent::Alert(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is listening
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events of a single mission run
    pub fn subscribe_mission_run(&self, mission_run_id: MissionRunId) -> MissionRunEventReceiver {
        MissionRunEventReceiver {
            receiver: self.sender.subscribe(),
            mission_run_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for the events of one mission run (filtered)
pub struct MissionRunEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    mission_run_id: MissionRunId,
}

impl MissionRunEventReceiver {
    /// Receive the next event for the subscribed mission run.
    /// Lagging is reported so the caller can re-read state from storage.
    pub async fn recv(&mut self) -> Result<MissionRunEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::MissionRun(run_event) = event {
                if run_event_id(&run_event) == self.mission_run_id {
                    return Ok(run_event);
                }
            }
        }
    }
}

fn run_event_id(event: &MissionRunEvent) -> MissionRunId {
    match event {
        MissionRunEvent::MissionRunCreated { mission_run_id, .. }
        | MissionRunEvent::MissionRunStatusChanged { mission_run_id, .. }
        | MissionRunEvent::MissionRunStarted { mission_run_id, .. }
        | MissionRunEvent::MissionRunAborted { mission_run_id, .. } => *mission_run_id,
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mission::{MissionRunType, MissionStatus};
    use crate::domain::robot::RobotId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let robot_id = RobotId::new();

        event_bus.publish_robot_event(RobotEvent::RobotAvailable { robot_id, at: Utc::now() });

        match receiver.recv().await.unwrap() {
            DomainEvent::Robot(RobotEvent::RobotAvailable { robot_id: id, .. }) => assert_eq!(id, robot_id),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mission_run_event_filtering() {
        let event_bus = EventBus::new(10);
        let run_id = MissionRunId::new();
        let other_run_id = MissionRunId::new();
        let robot_id = RobotId::new();
        let mut receiver = event_bus.subscribe_mission_run(run_id);

        event_bus.publish_mission_run_event(MissionRunEvent::MissionRunStatusChanged {
            mission_run_id: other_run_id,
            robot_id,
            status: MissionStatus::Successful,
            changed_at: Utc::now(),
        });
        event_bus.publish_mission_run_event(MissionRunEvent::MissionRunCreated {
            mission_run_id: run_id,
            robot_id,
            run_type: MissionRunType::Normal,
            notify: true,
            created_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            MissionRunEvent::MissionRunCreated { mission_run_id, .. } => assert_eq!(mission_run_id, run_id),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_try_recv_on_empty_bus() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 1);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
