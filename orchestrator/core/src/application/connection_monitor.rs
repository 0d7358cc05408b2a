// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Robot heartbeat monitoring.
//!
//! Each heartbeat re-arms a per-robot deadline on the background job
//! scheduler. When a deadline passes without a heartbeat the robot goes
//! through the dispatch engine's lost-connection path.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::application::dispatch::DispatchEngine;
use crate::domain::errors::DispatchError;
use crate::domain::events::RobotEvent;
use crate::domain::jobs::{JobHandle, JobScheduler};
use crate::domain::repository::RobotRepository;
use crate::domain::robot::{RobotId, RobotStatus, RobotUpdate};
use crate::infrastructure::event_bus::EventBus;

pub struct ConnectionMonitor {
    robots: Arc<dyn RobotRepository>,
    engine: Arc<DispatchEngine>,
    jobs: Arc<dyn JobScheduler>,
    event_bus: EventBus,
    heartbeat_timeout: Duration,
    deadlines: Arc<DashMap<RobotId, (u64, JobHandle)>>,
    generation: AtomicU64,
}

impl ConnectionMonitor {
    pub fn new(
        robots: Arc<dyn RobotRepository>,
        engine: Arc<DispatchEngine>,
        jobs: Arc<dyn JobScheduler>,
        event_bus: EventBus,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            robots,
            engine,
            jobs,
            event_bus,
            heartbeat_timeout,
            deadlines: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Record a heartbeat from `robot_id`.
    ///
    /// A robot that was marked disconnected is re-enabled as Available.
    pub async fn heartbeat(&self, robot_id: RobotId) -> Result<(), DispatchError> {
        let robot = self
            .robots
            .find_by_id(robot_id)
            .await?
            .ok_or(DispatchError::RobotNotFound(robot_id))?;

        if !robot.connected {
            self.robots.update(robot_id, RobotUpdate::Connected(true)).await?;
            self.robots
                .update(robot_id, RobotUpdate::Status(RobotStatus::Available))
                .await?;
            info!(robot_id = %robot_id, "Robot reconnected");
            self.event_bus.publish_robot_event(RobotEvent::RobotReconnected {
                robot_id,
                at: Utc::now(),
            });
            self.event_bus.publish_robot_event(RobotEvent::RobotAvailable {
                robot_id,
                at: Utc::now(),
            });
        }

        self.arm_deadline(robot_id);
        Ok(())
    }

    /// Stop watching a robot
    pub fn forget(&self, robot_id: RobotId) {
        if let Some((_, (_, handle))) = self.deadlines.remove(&robot_id) {
            self.jobs.cancel(&handle);
        }
    }

    pub fn is_watching(&self, robot_id: RobotId) -> bool {
        self.deadlines.contains_key(&robot_id)
    }

    fn arm_deadline(&self, robot_id: RobotId) {
        if let Some((_, (_, previous))) = self.deadlines.remove(&robot_id) {
            self.jobs.cancel(&previous);
        }

        let engine = self.engine.clone();
        let deadlines = self.deadlines.clone();
        let timeout = self.heartbeat_timeout;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handle = self.jobs.schedule(
            timeout,
            Box::pin(async move {
                // A newer heartbeat may already have re-armed the deadline
                if deadlines.remove_if(&robot_id, |_, (armed, _)| *armed == generation).is_none() {
                    debug!(robot_id = %robot_id, generation, "Ignoring superseded heartbeat deadline");
                    return;
                }
                error!(robot_id = %robot_id, ?timeout, "No heartbeat from robot");
                if let Err(err) = engine.handle_lost_connection(robot_id).await {
                    error!(robot_id = %robot_id, error = %err, "Failed to handle lost connection");
                }
            }),
        );
        self.deadlines.insert(robot_id, (generation, handle));
    }
}
