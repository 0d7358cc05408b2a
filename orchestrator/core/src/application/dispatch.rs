// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatch Engine
//!
//! Decides, per robot, which queued mission run starts next and commits it
//! to the robot through the robot-control interface.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-robot dispatch state machine (Idle → Dispatching → Running)
//!
//! # Concurrency
//!
//! Dispatch for one robot is a critical section guarded by a per-robot async
//! mutex. A second concurrent call for the same robot does not wait; it
//! returns [`DispatchOutcome::AlreadyInFlight`]. Robots never share the lock.
//! Every robot-control call is bounded by `robot_control.request_timeout`,
//! and robot and run state are re-read immediately before a start is
//! committed.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::application::localization::LocalizationCoordinator;
use crate::application::mission_queue::MissionQueueStore;
use crate::application::mission_starter::MissionStarter;
use crate::application::recovery::RecoveryManager;
use crate::application::return_home::ReturnHomeService;
use crate::domain::area::InspectionArea;
use crate::domain::errors::DispatchError;
use crate::domain::events::{AlertEvent, MissionRunEvent, RobotEvent};
use crate::domain::geofence;
use crate::domain::mission::{MissionRun, MissionRunId, MissionRunType, MissionStatus};
use crate::domain::precondition::{Decision, DenialReason, PreconditionChecker};
use crate::domain::repository::{AreaRepository, RobotRepository};
use crate::domain::robot::{Robot, RobotId, RobotStatus, RobotUpdate};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::telemetry::{DISPATCH_DEFERRED_TOTAL, LOST_CONNECTIONS_TOTAL, MISSIONS_ABORTED_TOTAL};

pub const AREA_MISMATCH_REASON: &str = "Aborted: robot/mission area mismatch";
pub const LOST_CONNECTION_REASON: &str = "Lost connection to robot during mission";
pub const LOCALIZATION_FAILED_REASON: &str = "Aborted: robot failed to localize";

/// Result of one dispatch attempt for a robot
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing queued for the robot
    Idle,
    /// Another dispatch for this robot is in progress
    AlreadyInFlight,
    /// A precondition did not hold; the run stays queued
    Deferred(DenialReason),
    /// The selected run was left queued without a start attempt
    LeftQueued(MissionRunId),
    /// Runs were aborted instead of dispatching
    Aborted { count: usize, reason: String },
    /// The selected run was committed to the robot
    Started(MissionRunId),
    /// A localization run was injected ahead of the selected run
    LocalizationStarted(MissionRunId),
}

pub struct DispatchEngine {
    robots: Arc<dyn RobotRepository>,
    areas: Arc<dyn AreaRepository>,
    queue: Arc<MissionQueueStore>,
    starter: Arc<MissionStarter>,
    localization: Arc<LocalizationCoordinator>,
    recovery: Arc<RecoveryManager>,
    return_home: Arc<ReturnHomeService>,
    event_bus: EventBus,
    locks: DashMap<RobotId, Arc<Mutex<()>>>,
}

impl DispatchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        robots: Arc<dyn RobotRepository>,
        areas: Arc<dyn AreaRepository>,
        queue: Arc<MissionQueueStore>,
        starter: Arc<MissionStarter>,
        localization: Arc<LocalizationCoordinator>,
        recovery: Arc<RecoveryManager>,
        return_home: Arc<ReturnHomeService>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            robots,
            areas,
            queue,
            starter,
            localization,
            recovery,
            return_home,
            event_bus,
            locks: DashMap::new(),
        }
    }

    /// Try to start the next queued run for `robot_id`.
    ///
    /// Denied preconditions are not errors; they come back as
    /// [`DispatchOutcome::Deferred`] with the run still queued.
    pub async fn dispatch(&self, robot_id: RobotId) -> Result<DispatchOutcome, DispatchError> {
        let lock = self.locks.entry(robot_id).or_default().clone();
        let Ok(_guard) = lock.try_lock_owned() else {
            debug!(robot_id = %robot_id, "Dispatch already in flight");
            return Ok(DispatchOutcome::AlreadyInFlight);
        };
        self.dispatch_locked(robot_id).await
    }

    async fn dispatch_locked(&self, robot_id: RobotId) -> Result<DispatchOutcome, DispatchError> {
        let mut robot = self.get_robot(robot_id).await?;

        if self.current_run_is_localization(&robot).await? {
            if let Err(err) = self.localization.reconcile_after_ongoing_localization(&robot).await {
                if matches!(err, DispatchError::LocalizationFailed { .. }) {
                    self.abort_all_scheduled_normal_missions(robot_id, LOCALIZATION_FAILED_REASON)
                        .await?;
                }
                return Err(err);
            }
            robot = self.get_robot(robot_id).await?;
        }

        let Some(run) = self.select_next(&robot).await? else {
            return Ok(DispatchOutcome::Idle);
        };

        if robot.mission_queue_frozen && run.run_type == MissionRunType::Normal {
            return Ok(DispatchOutcome::LeftQueued(run.id));
        }

        if let Decision::Denied(reason) = PreconditionChecker::can_dispatch(&robot, &run) {
            return self.handle_denial(&robot, &run, reason).await;
        }

        let Some(area_id) = run.inspection_area_id else {
            warn!(robot_id = %robot_id, mission_run_id = %run.id, "Mission run has no inspection area, leaving it queued");
            return Ok(DispatchOutcome::LeftQueued(run.id));
        };
        let Some(run_area) = self.areas.find_inspection_area(area_id).await? else {
            let err = DispatchError::AreaNotFound(area_id.to_string());
            return self.abort_single(&run, &err.to_string()).await;
        };
        if let Some(inspection_type) = run.inspection_types().find(|t| !robot.supports_inspection(*t)) {
            let err = DispatchError::UnsupportedCapability {
                robot_id,
                inspection_type,
            };
            return self.abort_single(&run, &err.to_string()).await;
        }

        // A robot that only now adopts the run's area has nothing to compare against
        let mut adopted_area = false;
        if robot.model.requires_localization {
            match self.localization.ensure_localized(&robot, &run).await {
                Ok(Some(localization_run_id)) => return Ok(DispatchOutcome::LocalizationStarted(localization_run_id)),
                Ok(None) => {}
                Err(DispatchError::Communication(detail)) => {
                    self.handle_lost_connection(robot_id).await?;
                    return Err(DispatchError::Communication(detail));
                }
                Err(
                    err @ (DispatchError::AreaNotFound(_)
                    | DispatchError::DeckNotFound(_)
                    | DispatchError::PoseNotFound(_)),
                ) => return self.abort_single(&run, &err.to_string()).await,
                Err(err) => return Err(err),
            }
        } else if robot.current_inspection_area_id.is_none() {
            robot = self.adopt_area(robot_id, &run).await?;
            adopted_area = true;
        }

        if !adopted_area
            && run.run_type == MissionRunType::Normal
            && !self.tasks_inside_areas(&robot, &run, &run_area).await?
        {
            let mismatch = DispatchError::AreaMismatch {
                mission_run_id: run.id,
                inspection_area_id: run_area.id,
            };
            warn!(robot_id = %robot_id, error = %mismatch, "Geofence check failed");
            let count = self
                .abort_all_scheduled_normal_missions(robot_id, AREA_MISMATCH_REASON)
                .await?;
            return Ok(DispatchOutcome::Aborted {
                count,
                reason: AREA_MISMATCH_REASON.to_string(),
            });
        }

        // State may have moved while we were deciding
        let robot = self.get_robot(robot_id).await?;
        let run = self.queue.get(run.id).await?;
        if run.status != MissionStatus::Pending {
            debug!(robot_id = %robot_id, mission_run_id = %run.id, status = ?run.status, "Mission run no longer pending");
            return Ok(DispatchOutcome::Idle);
        }
        if let Decision::Denied(reason) = PreconditionChecker::can_dispatch(&robot, &run) {
            return self.handle_denial(&robot, &run, reason).await;
        }

        let started = match self.starter.start(&robot, &run).await {
            Ok(started) => started,
            Err(DispatchError::Communication(detail)) => {
                self.handle_lost_connection(robot_id).await?;
                return Err(DispatchError::Communication(detail));
            }
            Err(err) => return Err(err),
        };

        if started.run_type != MissionRunType::ReturnHome {
            self.schedule_return_home(robot_id).await;
        }
        Ok(DispatchOutcome::Started(started.id))
    }

    /// Stop whatever the robot is executing and re-queue unfinished work.
    ///
    /// Returns the continuation runs that were created.
    pub async fn stop_current_mission_run(&self, robot_id: RobotId) -> Result<Vec<MissionRun>, DispatchError> {
        let robot = self.get_robot(robot_id).await?;
        let ongoing = self.queue.ongoing(robot_id).await?;
        if ongoing.is_empty() {
            return Ok(Vec::new());
        }

        self.control_call(robot_id, self.starter.robot_control().stop(&robot))
            .await?;

        let mut continuations = Vec::new();
        for run in ongoing {
            let stopped = self.queue.set_status(run.id, MissionStatus::Cancelled, None).await?;
            if stopped.is_localization() {
                // The robot's position was never confirmed
                match self.localization.conclude_localization(robot_id, &stopped).await {
                    Ok(()) | Err(DispatchError::LocalizationFailed { .. }) => {}
                    Err(err) => return Err(err),
                }
                continue;
            }
            if let Some(continuation) = self.recovery.recover(&stopped).await? {
                continuations.push(continuation);
            }
        }
        self.robots.update(robot_id, RobotUpdate::CurrentMissionRun(None)).await?;
        info!(robot_id = %robot_id, requeued = continuations.len(), "Stopped current mission run");
        Ok(continuations)
    }

    pub async fn pause_current_mission_run(&self, robot_id: RobotId) -> Result<Option<MissionRun>, DispatchError> {
        let robot = self.get_robot(robot_id).await?;
        let Some(run_id) = robot.current_mission_run_id else {
            return Ok(None);
        };
        self.control_call(robot_id, self.starter.robot_control().pause(&robot))
            .await?;
        Ok(Some(self.queue.set_status(run_id, MissionStatus::Paused, None).await?))
    }

    pub async fn resume_current_mission_run(&self, robot_id: RobotId) -> Result<Option<MissionRun>, DispatchError> {
        let robot = self.get_robot(robot_id).await?;
        let Some(run_id) = robot.current_mission_run_id else {
            return Ok(None);
        };
        self.control_call(robot_id, self.starter.robot_control().resume(&robot))
            .await?;
        Ok(Some(self.queue.set_status(run_id, MissionStatus::Ongoing, None).await?))
    }

    /// Abort every Pending Normal run for the robot. Emergency and
    /// return-home runs are left alone.
    pub async fn abort_all_scheduled_normal_missions(&self, robot_id: RobotId, reason: &str) -> Result<usize, DispatchError> {
        let pending = self.queue.pending_of_type(robot_id, MissionRunType::Normal).await?;
        for run in &pending {
            self.queue
                .set_status(run.id, MissionStatus::Aborted, Some(reason.to_string()))
                .await?;
            self.event_bus.publish_mission_run_event(MissionRunEvent::MissionRunAborted {
                mission_run_id: run.id,
                robot_id,
                reason: reason.to_string(),
                aborted_at: Utc::now(),
            });
        }

        let count = pending.len();
        if count > 0 {
            metrics::counter!(MISSIONS_ABORTED_TOTAL, "scope" => "all_normal").increment(count as u64);
            warn!(robot_id = %robot_id, count, reason, "Aborted all scheduled normal missions");
            self.event_bus.publish_alert(AlertEvent::NormalMissionsAborted {
                robot_id,
                reason: reason.to_string(),
                aborted_count: count,
                at: Utc::now(),
            });
        }
        Ok(count)
    }

    /// The robot can no longer be reached.
    ///
    /// Unfinished work of the current run is re-queued, the run itself is
    /// failed, and the robot goes Offline with mission and area detached.
    pub async fn handle_lost_connection(&self, robot_id: RobotId) -> Result<(), DispatchError> {
        let robot = self.get_robot(robot_id).await?;
        if let Some(run_id) = robot.current_mission_run_id {
            if let Some(run) = self.queue.find(run_id).await? {
                if !run.status.is_terminal() {
                    self.recovery.recover(&run).await?;
                    self.queue.fail_with_unfinished(run_id, LOST_CONNECTION_REASON).await?;
                }
            }
        }

        for update in [
            RobotUpdate::Status(RobotStatus::Offline),
            RobotUpdate::Connected(false),
            RobotUpdate::CurrentMissionRun(None),
            RobotUpdate::CurrentInspectionArea(None),
        ] {
            self.robots.update(robot_id, update).await?;
        }

        metrics::counter!(LOST_CONNECTIONS_TOTAL).increment(1);
        error!(robot_id = %robot_id, robot_name = %robot.name, "Lost connection to robot");
        self.event_bus.publish_robot_event(RobotEvent::RobotConnectionLost {
            robot_id,
            lost_at: Utc::now(),
        });
        Ok(())
    }

    /// Freeze or unfreeze the robot's Normal queue. Unfreezing dispatches.
    pub async fn set_mission_queue_frozen(&self, robot_id: RobotId, frozen: bool) -> Result<Robot, DispatchError> {
        let robot = self
            .robots
            .update(robot_id, RobotUpdate::MissionQueueFrozen(frozen))
            .await?;
        info!(robot_id = %robot_id, frozen, "Mission queue freeze changed");
        self.event_bus.publish_robot_event(RobotEvent::MissionQueueFrozenChanged {
            robot_id,
            frozen,
            at: Utc::now(),
        });

        if !frozen {
            if let Err(err) = self.dispatch(robot_id).await {
                warn!(robot_id = %robot_id, error = %err, "Dispatch after unfreeze failed");
            }
        }
        Ok(robot)
    }

    async fn select_next(&self, robot: &Robot) -> Result<Option<MissionRun>, DispatchError> {
        if let Some(run) = self.queue.next_queued(robot.id, MissionRunType::Emergency).await? {
            return Ok(Some(run));
        }
        if !robot.mission_queue_frozen {
            if let Some(run) = self.queue.next_queued(robot.id, MissionRunType::Normal).await? {
                return Ok(Some(run));
            }
        }
        self.queue.next_queued(robot.id, MissionRunType::ReturnHome).await
    }

    async fn handle_denial(
        &self,
        robot: &Robot,
        run: &MissionRun,
        reason: DenialReason,
    ) -> Result<DispatchOutcome, DispatchError> {
        if reason.is_safety_violation() {
            let message = format!("Aborted: {}", reason);
            let count = self.abort_all_scheduled_normal_missions(robot.id, &message).await?;
            return Ok(DispatchOutcome::Aborted { count, reason: message });
        }

        metrics::counter!(DISPATCH_DEFERRED_TOTAL, "reason" => reason.kind()).increment(1);
        let denial = DispatchError::PreconditionDenied(reason.clone());
        info!(
            robot_id = %robot.id,
            mission_run_id = %run.id,
            denial = %denial,
            "Mission run left queued"
        );
        Ok(DispatchOutcome::Deferred(reason))
    }

    async fn abort_single(&self, run: &MissionRun, reason: &str) -> Result<DispatchOutcome, DispatchError> {
        self.queue
            .set_status(run.id, MissionStatus::Aborted, Some(reason.to_string()))
            .await?;
        metrics::counter!(MISSIONS_ABORTED_TOTAL, "scope" => "single").increment(1);
        warn!(robot_id = %run.robot_id, mission_run_id = %run.id, reason, "Aborted mission run");
        self.event_bus.publish_mission_run_event(MissionRunEvent::MissionRunAborted {
            mission_run_id: run.id,
            robot_id: run.robot_id,
            reason: reason.to_string(),
            aborted_at: Utc::now(),
        });
        Ok(DispatchOutcome::Aborted {
            count: 1,
            reason: reason.to_string(),
        })
    }

    async fn adopt_area(&self, robot_id: RobotId, run: &MissionRun) -> Result<Robot, DispatchError> {
        let robot = self
            .robots
            .update(robot_id, RobotUpdate::CurrentInspectionArea(run.inspection_area_id))
            .await?;
        self.event_bus.publish_robot_event(RobotEvent::RobotAreaChanged {
            robot_id,
            inspection_area_id: run.inspection_area_id,
            at: Utc::now(),
        });
        Ok(robot)
    }

    /// Tasks must lie inside the run's area and, if the robot sits in a
    /// different area, inside the robot's area too.
    async fn tasks_inside_areas(&self, robot: &Robot, run: &MissionRun, run_area: &InspectionArea) -> Result<bool, DispatchError> {
        if !geofence::all_tasks_contained(run.tasks(), run_area.polygon.as_ref()) {
            return Ok(false);
        }
        let Some(robot_area_id) = robot.current_inspection_area_id else {
            return Ok(true);
        };
        if robot_area_id == run_area.id {
            return Ok(true);
        }
        let robot_area = self
            .areas
            .find_inspection_area(robot_area_id)
            .await?
            .ok_or_else(|| DispatchError::AreaNotFound(robot_area_id.to_string()))?;
        Ok(geofence::all_tasks_contained(run.tasks(), robot_area.polygon.as_ref()))
    }

    async fn current_run_is_localization(&self, robot: &Robot) -> Result<bool, DispatchError> {
        let Some(run_id) = robot.current_mission_run_id else {
            return Ok(false);
        };
        Ok(self
            .queue
            .find(run_id)
            .await?
            .is_some_and(|run| run.is_localization()))
    }

    async fn schedule_return_home(&self, robot_id: RobotId) {
        let robot = match self.get_robot(robot_id).await {
            Ok(robot) => robot,
            Err(err) => {
                warn!(robot_id = %robot_id, error = %err, "Could not schedule return home");
                return;
            }
        };
        if let Err(err) = self.return_home.schedule_return_home_if_not_already_scheduled(&robot).await {
            warn!(robot_id = %robot_id, error = %err, "Could not schedule return home");
        }
    }

    /// Bounded robot-control call; an unreachable robot goes through the
    /// lost-connection path before the error is returned.
    async fn control_call<F>(&self, robot_id: RobotId, call: F) -> Result<(), DispatchError>
    where
        F: std::future::Future<Output = Result<(), crate::domain::robot_control::RobotControlError>>,
    {
        match self.starter.bounded(call).await {
            Ok(()) => Ok(()),
            Err(err) if err.indicates_unreachable() => {
                self.handle_lost_connection(robot_id).await?;
                Err(DispatchError::Communication(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_robot(&self, robot_id: RobotId) -> Result<Robot, DispatchError> {
        self.robots
            .find_by_id(robot_id)
            .await?
            .ok_or(DispatchError::RobotNotFound(robot_id))
    }
}
