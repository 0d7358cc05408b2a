// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dispatch preconditions.
//!
//! [`PreconditionChecker::can_dispatch`] is a pure predicate: it reads the
//! robot and the candidate run and never touches storage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::mission::{MissionRun, MissionRunType};
use crate::domain::robot::{Robot, RobotStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotAvailable(RobotStatus),
    NotConnected,
    AlreadyRunning,
    QueueFrozen,
    BatteryTooLow { level: f32, threshold: f32 },
    PressureOutOfRange { level: f32, low: Option<f32>, high: Option<f32> },
}

impl DenialReason {
    /// Battery and pressure denials reflect the robot's own safety state,
    /// not just this run.
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self,
            DenialReason::BatteryTooLow { .. } | DenialReason::PressureOutOfRange { .. }
        )
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DenialReason::NotAvailable(_) => "not_available",
            DenialReason::NotConnected => "not_connected",
            DenialReason::AlreadyRunning => "already_running",
            DenialReason::QueueFrozen => "queue_frozen",
            DenialReason::BatteryTooLow { .. } => "battery_too_low",
            DenialReason::PressureOutOfRange { .. } => "pressure_out_of_range",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NotAvailable(status) => write!(f, "robot is not available (status {:?})", status),
            DenialReason::NotConnected => write!(f, "robot is not connected"),
            DenialReason::AlreadyRunning => write!(f, "robot already has a current mission run"),
            DenialReason::QueueFrozen => write!(f, "robot mission queue is frozen"),
            DenialReason::BatteryTooLow { level, threshold } => {
                write!(f, "battery level {level:.1}% is below the threshold of {threshold:.1}%")
            }
            DenialReason::PressureOutOfRange { level, low, high } => write!(
                f,
                "pressure level {level:.2} is outside the allowed range [{}, {}]",
                low.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                high.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

pub struct PreconditionChecker;

impl PreconditionChecker {
    pub fn can_dispatch(robot: &Robot, run: &MissionRun) -> Decision {
        if robot.status != RobotStatus::Available {
            return Decision::Denied(DenialReason::NotAvailable(robot.status));
        }
        if !robot.connected {
            return Decision::Denied(DenialReason::NotConnected);
        }
        if robot.current_mission_run_id.is_some() {
            return Decision::Denied(DenialReason::AlreadyRunning);
        }
        if run.run_type != MissionRunType::Normal {
            return Decision::Allowed;
        }
        if robot.mission_queue_frozen {
            return Decision::Denied(DenialReason::QueueFrozen);
        }
        if robot.is_battery_too_low() {
            return Decision::Denied(DenialReason::BatteryTooLow {
                level: robot.battery_level,
                threshold: robot.model.thresholds.battery_low,
            });
        }
        if let (true, Some(level)) = (robot.is_pressure_out_of_range(), robot.pressure_level) {
            return Decision::Denied(DenialReason::PressureOutOfRange {
                level,
                low: robot.model.thresholds.pressure_low,
                high: robot.model.thresholds.pressure_high,
            });
        }
        Decision::Allowed
    }
}
