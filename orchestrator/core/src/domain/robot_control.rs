// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Robot control port.
//!
//! Start/stop/pause/resume commands sent to a robot's mission executor. The
//! HTTP adapter lives in `crate::infrastructure::isar_client`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::mission::{ExternalHandle, MissionRun};
use crate::domain::robot::Robot;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RobotControlError {
    /// The robot could not be reached
    #[error("communication with robot failed: {0}")]
    Communication(String),

    /// The robot answered but rejected the command
    #[error("robot rejected the command: {0}")]
    Protocol(String),

    #[error("robot is in a conflicting state: {0}")]
    Conflict(String),

    #[error("robot did not answer in time: {0}")]
    Timeout(String),
}

impl RobotControlError {
    /// Failures meaning the robot is unreachable and the lost-connection
    /// path must run.
    pub fn indicates_unreachable(&self) -> bool {
        matches!(self, RobotControlError::Communication(_) | RobotControlError::Timeout(_))
    }
}

#[async_trait]
pub trait RobotControl: Send + Sync {
    async fn start(&self, robot: &Robot, mission_run: &MissionRun) -> Result<ExternalHandle, RobotControlError>;

    async fn stop(&self, robot: &Robot) -> Result<(), RobotControlError>;

    async fn pause(&self, robot: &Robot) -> Result<(), RobotControlError>;

    async fn resume(&self, robot: &Robot) -> Result<(), RobotControlError>;
}
