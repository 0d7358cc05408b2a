// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mission Status Updates
//!
//! Applies status reports coming back from robots to the stored mission
//! runs and robots. Reports are correlated by the external mission id, task
//! id and step id handed out when the run was started.
//!
//! Reports that would move a run backwards (for example out of a terminal
//! status) are logged and dropped; robots may resend stale updates after a
//! reconnect.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::dispatch::{DispatchEngine, LOCALIZATION_FAILED_REASON};
use crate::application::mission_queue::MissionQueueStore;
use crate::domain::errors::DispatchError;
use crate::domain::events::{AlertEvent, RobotEvent};
use crate::domain::mission::{InspectionStatus, MissionRun, MissionRunError, MissionStatus, TaskStatus};
use crate::domain::repository::RobotRepository;
use crate::domain::robot::{Robot, RobotId, RobotStatus, RobotUpdate};
use crate::infrastructure::event_bus::EventBus;

pub struct MissionStatusHandler {
    robots: Arc<dyn RobotRepository>,
    queue: Arc<MissionQueueStore>,
    engine: Arc<DispatchEngine>,
    event_bus: EventBus,
}

impl MissionStatusHandler {
    pub fn new(
        robots: Arc<dyn RobotRepository>,
        queue: Arc<MissionQueueStore>,
        engine: Arc<DispatchEngine>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            robots,
            queue,
            engine,
            event_bus,
        }
    }

    /// Apply a mission status report. Returns `None` for unknown missions.
    pub async fn on_mission_status(
        &self,
        external_mission_id: &str,
        status: MissionStatus,
    ) -> Result<Option<MissionRun>, DispatchError> {
        let Some(run) = self.queue.find_by_external_id(external_mission_id).await? else {
            warn!(external_mission_id, "Status update for unknown mission");
            return Ok(None);
        };
        if run.status == status {
            return Ok(Some(run));
        }

        let updated = match self.queue.set_status(run.id, status, None).await {
            Ok(updated) => updated,
            Err(DispatchError::MissionRun(MissionRunError::InvalidTransition { from, to })) => {
                warn!(mission_run_id = %run.id, ?from, ?to, "Ignoring invalid mission status transition");
                return Ok(Some(run));
            }
            Err(err) => return Err(err),
        };
        debug!(mission_run_id = %updated.id, status = ?updated.status, "Mission status updated");

        if status.is_terminal() {
            self.detach_finished_run(&updated).await?;
        }
        Ok(Some(updated))
    }

    pub async fn on_task_status(
        &self,
        external_mission_id: &str,
        external_task_id: &str,
        status: TaskStatus,
    ) -> Result<Option<MissionRun>, DispatchError> {
        let Some(run) = self.queue.find_by_external_id(external_mission_id).await? else {
            warn!(external_mission_id, external_task_id, "Task update for unknown mission");
            return Ok(None);
        };
        Ok(Some(self.queue.update_task_status(run.id, external_task_id, status).await?))
    }

    pub async fn on_inspection_status(
        &self,
        external_mission_id: &str,
        external_task_id: &str,
        external_step_id: &str,
        status: InspectionStatus,
    ) -> Result<Option<MissionRun>, DispatchError> {
        let Some(run) = self.queue.find_by_external_id(external_mission_id).await? else {
            warn!(external_mission_id, external_step_id, "Inspection update for unknown mission");
            return Ok(None);
        };
        Ok(Some(
            self.queue
                .update_inspection_status(run.id, external_task_id, external_step_id, status)
                .await?,
        ))
    }

    /// A robot reporting Available publishes `RobotAvailable`, which the
    /// dispatch listener turns into a dispatch attempt.
    pub async fn on_robot_status(&self, robot_id: RobotId, status: RobotStatus) -> Result<Robot, DispatchError> {
        let robot = self.robots.update(robot_id, RobotUpdate::Status(status)).await?;
        if status == RobotStatus::Available {
            self.event_bus.publish_robot_event(RobotEvent::RobotAvailable {
                robot_id,
                at: Utc::now(),
            });
        }
        Ok(robot)
    }

    pub async fn on_battery(&self, robot_id: RobotId, level: f32) -> Result<Robot, DispatchError> {
        Ok(self.robots.update(robot_id, RobotUpdate::BatteryLevel(level)).await?)
    }

    pub async fn on_pressure(&self, robot_id: RobotId, level: Option<f32>) -> Result<Robot, DispatchError> {
        Ok(self.robots.update(robot_id, RobotUpdate::PressureLevel(level)).await?)
    }

    async fn detach_finished_run(&self, run: &MissionRun) -> Result<(), DispatchError> {
        let Some(robot) = self.robots.find_by_id(run.robot_id).await? else {
            return Ok(());
        };
        if robot.current_mission_run_id == Some(run.id) {
            self.robots.update(robot.id, RobotUpdate::CurrentMissionRun(None)).await?;
        }
        if !run.is_localization() {
            return Ok(());
        }

        if run.status == MissionStatus::Successful {
            self.robots
                .update(robot.id, RobotUpdate::CurrentInspectionArea(run.inspection_area_id))
                .await?;
            info!(robot_id = %robot.id, mission_run_id = %run.id, "Robot localized");
            self.event_bus.publish_robot_event(RobotEvent::RobotAreaChanged {
                robot_id: robot.id,
                inspection_area_id: run.inspection_area_id,
                at: Utc::now(),
            });
            return Ok(());
        }

        self.robots
            .update(robot.id, RobotUpdate::CurrentInspectionArea(None))
            .await?;
        warn!(robot_id = %robot.id, mission_run_id = %run.id, status = ?run.status, "Localization run did not succeed");
        self.event_bus.publish_alert(AlertEvent::LocalizationFailed {
            robot_id: robot.id,
            mission_run_id: run.id,
            inspection_area_id: run.inspection_area_id,
            at: Utc::now(),
        });
        self.engine
            .abort_all_scheduled_normal_missions(robot.id, LOCALIZATION_FAILED_REASON)
            .await?;
        Ok(())
    }
}
