// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Localization Coordinator
//!
//! A robot's `current_inspection_area_id` is the proxy for "this robot knows
//! where it is". The coordinator establishes it by injecting a localization
//! run at the target area's default localization pose, and reconciles it when
//! such a run is still executing.
//!
//! Waiting for an ongoing localization run is event driven: the coordinator
//! subscribes to the run's status events and re-reads the store on every
//! wake-up, falling back to the configured poll interval, under a hard
//! deadline (`localization.timeout`, 5 s by default).

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::application::mission_queue::MissionQueueStore;
use crate::application::mission_starter::MissionStarter;
use crate::domain::area::InspectionAreaId;
use crate::domain::dispatch_config::LocalizationConfig;
use crate::domain::errors::DispatchError;
use crate::domain::events::{AlertEvent, RobotEvent};
use crate::domain::mission::{MissionRun, MissionRunId, MissionRunType, MissionStatus, MissionTask, Pose};
use crate::domain::repository::{AreaRepository, RobotRepository};
use crate::domain::robot::{Robot, RobotId, RobotStatus, RobotUpdate};
use crate::infrastructure::event_bus::{EventBus, EventBusError};

pub struct LocalizationCoordinator {
    robots: Arc<dyn RobotRepository>,
    areas: Arc<dyn AreaRepository>,
    queue: Arc<MissionQueueStore>,
    starter: Arc<MissionStarter>,
    event_bus: EventBus,
    config: LocalizationConfig,
}

impl LocalizationCoordinator {
    pub fn new(
        robots: Arc<dyn RobotRepository>,
        areas: Arc<dyn AreaRepository>,
        queue: Arc<MissionQueueStore>,
        starter: Arc<MissionStarter>,
        event_bus: EventBus,
        config: LocalizationConfig,
    ) -> Self {
        Self {
            robots,
            areas,
            queue,
            starter,
            event_bus,
            config,
        }
    }

    /// Make sure `robot` is localized for `target`.
    ///
    /// Returns the id of an injected localization run when one had to be
    /// started; `target` must then stay queued until that run succeeds.
    pub async fn ensure_localized(&self, robot: &Robot, target: &MissionRun) -> Result<Option<MissionRunId>, DispatchError> {
        let area_id = target
            .inspection_area_id
            .ok_or_else(|| DispatchError::AreaNotFound(format!("mission run {} has no inspection area", target.id)))?;

        let mut injected = None;
        if robot.current_inspection_area_id.is_none() {
            if robot.status != RobotStatus::Available {
                return Err(DispatchError::RobotNotAvailable(robot.id));
            }
            let pose = self.default_localization_pose(area_id).await?;
            let run = self.inject_localization_run(robot, target, area_id, pose).await?;
            injected = Some(run.id);

            // Optimistic: confirmed or cleared when the localization run ends
            self.robots
                .update(robot.id, RobotUpdate::CurrentInspectionArea(Some(area_id)))
                .await?;
            self.event_bus.publish_robot_event(RobotEvent::RobotAreaChanged {
                robot_id: robot.id,
                inspection_area_id: Some(area_id),
                at: Utc::now(),
            });
        }

        if !self.robot_on_same_deck_as_mission(robot.id, area_id).await? {
            return Err(DispatchError::RobotLocalization(format!(
                "robot {} is not on the same deck as inspection area {}",
                robot.id, area_id
            )));
        }
        Ok(injected)
    }

    /// Compare the deck of the robot's current area with the deck of `area_id`.
    pub async fn robot_on_same_deck_as_mission(&self, robot_id: RobotId, area_id: InspectionAreaId) -> Result<bool, DispatchError> {
        let robot = self
            .robots
            .find_by_id(robot_id)
            .await?
            .ok_or(DispatchError::RobotNotFound(robot_id))?;
        let robot_area_id = robot.current_inspection_area_id.ok_or_else(|| {
            DispatchError::RobotLocalization(format!("robot {} is not associated with an inspection area", robot_id))
        })?;
        if robot_area_id == area_id {
            return Ok(true);
        }

        let robot_area = self
            .areas
            .find_inspection_area(robot_area_id)
            .await?
            .ok_or_else(|| DispatchError::AreaNotFound(robot_area_id.to_string()))?;
        let mission_area = self
            .areas
            .find_inspection_area(area_id)
            .await?
            .ok_or_else(|| DispatchError::AreaNotFound(area_id.to_string()))?;

        let robot_deck = robot_area
            .deck_id
            .ok_or_else(|| DispatchError::DeckNotFound(format!("inspection area {} has no deck", robot_area.id)))?;
        let mission_deck = mission_area
            .deck_id
            .ok_or_else(|| DispatchError::DeckNotFound(format!("inspection area {} has no deck", mission_area.id)))?;
        Ok(robot_deck == mission_deck)
    }

    /// Wait for the robot's current localization run to end.
    ///
    /// On Successful the run's area becomes the robot's area. Any other
    /// terminal status clears the area and fails with `LocalizationFailed`.
    /// If the run is not terminal before the deadline this fails with
    /// `LocalizationTimeout`. Nothing is retried.
    pub async fn reconcile_after_ongoing_localization(&self, robot: &Robot) -> Result<(), DispatchError> {
        let Some(run_id) = robot.current_mission_run_id else {
            return Ok(());
        };
        // Subscribe before the first read so no status change is missed
        let mut events = self.event_bus.subscribe_mission_run(run_id);
        let deadline = Instant::now() + self.config.timeout;

        loop {
            let run = self.queue.get(run_id).await?;
            if !run.is_localization() {
                return Ok(());
            }
            if run.status.is_terminal() {
                return self.conclude_localization(robot.id, &run).await;
            }

            tokio::select! {
                received = events.recv() => {
                    if let Err(EventBusError::Closed) = received {
                        // No more wake-ups; keep polling until the deadline
                        tokio::time::sleep(self.config.poll_interval.min(deadline.saturating_duration_since(Instant::now()))).await;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = tokio::time::sleep_until(deadline) => {
                    // One last read in case the run ended at the deadline
                    let run = self.queue.get(run_id).await?;
                    if run.status.is_terminal() {
                        return self.conclude_localization(robot.id, &run).await;
                    }
                    warn!(
                        robot_id = %robot.id,
                        mission_run_id = %run_id,
                        timeout = ?self.config.timeout,
                        "Localization run did not finish in time"
                    );
                    return Err(DispatchError::LocalizationTimeout {
                        robot_id: robot.id,
                        mission_run_id: run_id,
                        timeout: self.config.timeout,
                    });
                }
            }
        }
    }

    /// Settle the robot's area from a localization run that has ended.
    ///
    /// Only Successful confirms the run's area. Anything else clears it,
    /// raises a `LocalizationFailed` alert and returns `LocalizationFailed`.
    pub async fn conclude_localization(&self, robot_id: RobotId, run: &MissionRun) -> Result<(), DispatchError> {
        let robot = self
            .robots
            .find_by_id(robot_id)
            .await?
            .ok_or(DispatchError::RobotNotFound(robot_id))?;
        if robot.current_mission_run_id == Some(run.id) {
            self.robots.update(robot_id, RobotUpdate::CurrentMissionRun(None)).await?;
        }

        if run.status == MissionStatus::Successful {
            self.robots
                .update(robot_id, RobotUpdate::CurrentInspectionArea(run.inspection_area_id))
                .await?;
            info!(robot_id = %robot_id, mission_run_id = %run.id, "Robot localized");
            return Ok(());
        }

        self.robots
            .update(robot_id, RobotUpdate::CurrentInspectionArea(None))
            .await?;
        self.event_bus.publish_alert(AlertEvent::LocalizationFailed {
            robot_id,
            mission_run_id: run.id,
            inspection_area_id: run.inspection_area_id,
            at: Utc::now(),
        });
        warn!(robot_id = %robot_id, mission_run_id = %run.id, status = ?run.status, "Localization run did not succeed");
        Err(DispatchError::LocalizationFailed {
            robot_id,
            mission_run_id: run.id,
            status: run.status,
        })
    }

    async fn default_localization_pose(&self, area_id: InspectionAreaId) -> Result<Pose, DispatchError> {
        let area = self
            .areas
            .find_inspection_area(area_id)
            .await?
            .ok_or_else(|| DispatchError::AreaNotFound(area_id.to_string()))?;
        if let Some(pose) = area.default_localization_pose {
            return Ok(pose);
        }

        let deck_id = area
            .deck_id
            .ok_or_else(|| DispatchError::DeckNotFound(format!("inspection area {} has no deck", area.id)))?;
        let deck = self
            .areas
            .find_deck(deck_id)
            .await?
            .ok_or_else(|| DispatchError::DeckNotFound(deck_id.to_string()))?;
        deck.default_localization_pose.ok_or_else(|| {
            DispatchError::PoseNotFound(format!("no default localization pose for inspection area {} or deck {}", area.id, deck.id))
        })
    }

    async fn inject_localization_run(
        &self,
        robot: &Robot,
        target: &MissionRun,
        area_id: InspectionAreaId,
        pose: Pose,
    ) -> Result<MissionRun, DispatchError> {
        let run = MissionRun::new(
            "Localization",
            robot.id,
            target.installation_code.clone(),
            Some(area_id),
            MissionRunType::Emergency,
            vec![MissionTask::localization(pose)],
        );
        let run = self.queue.create(run, false).await?;
        info!(
            robot_id = %robot.id,
            mission_run_id = %run.id,
            target_mission_run_id = %target.id,
            "Injecting localization run"
        );
        self.starter.start(robot, &run).await
    }
}
