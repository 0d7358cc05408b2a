// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dispatch Listener Application Service
//!
//! Subscribes to the event bus and triggers a dispatch attempt when a
//! mission run is created with notification or when a robot becomes
//! available. Runs created without notification (recovery continuations,
//! localization runs, return-home runs) wait for the next trigger.
//!
//! Each dispatch runs in its own task so one slow robot never delays the
//! others; the engine's per-robot lock absorbs duplicate triggers.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatch::DispatchEngine;
use crate::domain::events::{MissionRunEvent, RobotEvent};
use crate::domain::robot::RobotId;
use crate::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};

// ============================================================================
// Service
// ============================================================================

pub struct DispatchListener {
    engine: Arc<DispatchEngine>,
    event_bus: EventBus,
}

impl DispatchListener {
    pub fn new(engine: Arc<DispatchEngine>, event_bus: EventBus) -> Self {
        Self { engine, event_bus }
    }

    /// Start the background listener task.
    ///
    /// The subscription is taken before this returns, so events published
    /// afterwards are never missed. The task ends when `shutdown` is
    /// cancelled or the bus closes.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!("Starting dispatch listener");
        let mut receiver = self.event_bus.subscribe();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    received = receiver.recv() => received,
                    _ = shutdown.cancelled() => break,
                };

                match received {
                    Ok(event) => {
                        if let Some(robot_id) = dispatch_trigger(&event) {
                            self.spawn_dispatch(robot_id);
                        }
                    }
                    Err(EventBusError::Lagged(n)) => {
                        warn!("Dispatch listener lagged by {} events", n);
                    }
                    Err(EventBusError::Closed) => {
                        info!("Event bus closed, shutting down dispatch listener");
                        break;
                    }
                    Err(EventBusError::Empty) => continue,
                }
            }
            info!("Dispatch listener stopped");
        })
    }

    fn spawn_dispatch(&self, robot_id: RobotId) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            match engine.dispatch(robot_id).await {
                Ok(outcome) => debug!(robot_id = %robot_id, ?outcome, "Dispatch finished"),
                Err(err) => warn!(robot_id = %robot_id, error = %err, "Dispatch failed"),
            }
        });
    }
}

/// Robot to dispatch for, if `event` should trigger a dispatch
fn dispatch_trigger(event: &DomainEvent) -> Option<RobotId> {
    match event {
        DomainEvent::MissionRun(MissionRunEvent::MissionRunCreated {
            robot_id, notify: true, ..
        }) => Some(*robot_id),
        DomainEvent::Robot(RobotEvent::RobotAvailable { robot_id, .. }) => Some(*robot_id),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
