// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Commits a mission run to a robot.
//!
//! Shared by the dispatch engine and the localization coordinator: send the
//! start command with a bounded wait, then record the external handle, move
//! the run to Ongoing and mark the robot Busy with the run as its current one.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::application::mission_queue::MissionQueueStore;
use crate::domain::errors::DispatchError;
use crate::domain::events::MissionRunEvent;
use crate::domain::mission::{MissionRun, MissionStatus};
use crate::domain::repository::RobotRepository;
use crate::domain::robot::{Robot, RobotStatus, RobotUpdate};
use crate::domain::robot_control::{RobotControl, RobotControlError};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::telemetry::MISSIONS_STARTED_TOTAL;

pub struct MissionStarter {
    robots: Arc<dyn RobotRepository>,
    queue: Arc<MissionQueueStore>,
    robot_control: Arc<dyn RobotControl>,
    event_bus: EventBus,
    request_timeout: Duration,
}

impl MissionStarter {
    pub fn new(
        robots: Arc<dyn RobotRepository>,
        queue: Arc<MissionQueueStore>,
        robot_control: Arc<dyn RobotControl>,
        event_bus: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            robots,
            queue,
            robot_control,
            event_bus,
            request_timeout,
        }
    }

    pub fn robot_control(&self) -> &Arc<dyn RobotControl> {
        &self.robot_control
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Run a robot-control call under the configured timeout.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T, RobotControlError>
    where
        F: std::future::Future<Output = Result<T, RobotControlError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RobotControlError::Timeout(format!(
                "no response within {:?}",
                self.request_timeout
            ))),
        }
    }

    /// Start `run` on `robot`.
    ///
    /// On a control failure the run is marked Failed with the error detail
    /// and the mapped error is returned. `DispatchError::Communication`
    /// means the robot is unreachable.
    pub async fn start(&self, robot: &Robot, run: &MissionRun) -> Result<MissionRun, DispatchError> {
        let handle = match self.bounded(self.robot_control.start(robot, run)).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(
                    robot_id = %robot.id,
                    mission_run_id = %run.id,
                    error = %err,
                    "Failed to start mission run on robot"
                );
                self.queue
                    .mark_failed(run.id, "Failed to start mission on robot", &err.to_string())
                    .await?;
                return Err(err.into());
            }
        };

        self.queue.attach_external_handle(run.id, &handle).await?;
        let started = self.queue.set_status(run.id, MissionStatus::Ongoing, None).await?;
        self.robots.update(robot.id, RobotUpdate::Status(RobotStatus::Busy)).await?;
        self.robots
            .update(robot.id, RobotUpdate::CurrentMissionRun(Some(run.id)))
            .await?;

        metrics::counter!(MISSIONS_STARTED_TOTAL, "run_type" => run.run_type.as_str()).increment(1);
        info!(
            robot_id = %robot.id,
            mission_run_id = %run.id,
            external_mission_id = %handle.external_mission_id,
            "Mission run started"
        );
        self.event_bus.publish_mission_run_event(MissionRunEvent::MissionRunStarted {
            mission_run_id: run.id,
            robot_id: robot.id,
            external_mission_id: handle.external_mission_id,
            started_at: Utc::now(),
        });
        Ok(started)
    }
}
