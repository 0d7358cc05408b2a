// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatch error taxonomy.
//!
//! `PreconditionDenied` is expected backpressure and is normally logged, not
//! returned. Communication failures are surfaced after the lost-connection
//! path has run.

use std::time::Duration;
use thiserror::Error;

use crate::domain::area::InspectionAreaId;
use crate::domain::auto_schedule::{AutoScheduleError, MissionDefinitionId};
use crate::domain::mission::{InspectionType, MissionRunError, MissionRunId, MissionStatus};
use crate::domain::mission_source::MissionSourceError;
use crate::domain::precondition::DenialReason;
use crate::domain::repository::RepositoryError;
use crate::domain::robot::RobotId;
use crate::domain::robot_control::RobotControlError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("robot {0} not found")]
    RobotNotFound(RobotId),

    #[error("mission run {0} not found")]
    MissionRunNotFound(MissionRunId),

    #[error("inspection area not found: {0}")]
    AreaNotFound(String),

    #[error("deck not found: {0}")]
    DeckNotFound(String),

    #[error("pose not found: {0}")]
    PoseNotFound(String),

    #[error("mission definition {0} not found")]
    MissionDefinitionNotFound(MissionDefinitionId),

    #[error("dispatch denied: {0}")]
    PreconditionDenied(DenialReason),

    #[error("mission run {mission_run_id} has tasks outside inspection area {inspection_area_id}")]
    AreaMismatch {
        mission_run_id: MissionRunId,
        inspection_area_id: InspectionAreaId,
    },

    #[error("robot localization error: {0}")]
    RobotLocalization(String),

    #[error("localization run {mission_run_id} for robot {robot_id} ended with status {status:?}")]
    LocalizationFailed {
        robot_id: RobotId,
        mission_run_id: MissionRunId,
        status: MissionStatus,
    },

    #[error("localization run {mission_run_id} for robot {robot_id} did not finish within {timeout:?}")]
    LocalizationTimeout {
        robot_id: RobotId,
        mission_run_id: MissionRunId,
        timeout: Duration,
    },

    #[error("no robot is located in inspection area {0}")]
    NoRobotInArea(InspectionAreaId),

    #[error("robot {0} is not available")]
    RobotNotAvailable(RobotId),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("robot {robot_id} does not support inspection type {inspection_type:?}")]
    UnsupportedCapability {
        robot_id: RobotId,
        inspection_type: InspectionType,
    },

    #[error("failed to schedule return home: {0}")]
    ReturnHomeFailedToSchedule(String),

    #[error("invalid mission run update: {0}")]
    MissionRun(#[from] MissionRunError),

    #[error("mission source error: {0}")]
    MissionSource(#[from] MissionSourceError),

    #[error("auto-schedule error: {0}")]
    AutoSchedule(#[from] AutoScheduleError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<RobotControlError> for DispatchError {
    fn from(err: RobotControlError) -> Self {
        match err {
            RobotControlError::Communication(msg) | RobotControlError::Timeout(msg) => DispatchError::Communication(msg),
            RobotControlError::Protocol(msg) | RobotControlError::Conflict(msg) => DispatchError::Protocol(msg),
        }
    }
}
