// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Robot Aggregate
//!
//! A robot is the unit of dispatch: one mission run at a time, one queue per
//! robot. The dispatch core mutates only the fields listed on [`RobotUpdate`];
//! everything else (model, installation, connection endpoint) is owned by
//! administrative CRUD outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::area::InspectionAreaId;
use crate::domain::mission::{InspectionType, MissionRunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotId(pub Uuid);

impl RobotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RobotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Available,
    Busy,
    Offline,
}

/// Safety envelope taken from the robot's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotThresholds {
    /// Minimum battery percentage for normal missions
    pub battery_low: f32,
    /// Lower bound of the accepted pressure window (bar)
    pub pressure_low: Option<f32>,
    /// Upper bound of the accepted pressure window (bar)
    pub pressure_high: Option<f32>,
}

impl Default for RobotThresholds {
    fn default() -> Self {
        Self {
            battery_low: 20.0,
            pressure_low: None,
            pressure_high: None,
        }
    }
}

/// Robot model information relevant to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotModel {
    pub name: String,
    pub thresholds: RobotThresholds,
    /// Inspection types the model can carry out
    #[serde(default)]
    pub inspection_capabilities: Vec<InspectionType>,
    /// Whether the model must run an explicit localization mission
    /// before it can be trusted inside a new inspection area
    #[serde(default)]
    pub requires_localization: bool,
}

impl Default for RobotModel {
    fn default() -> Self {
        Self {
            name: "Robot".to_string(),
            thresholds: RobotThresholds::default(),
            inspection_capabilities: Vec::new(),
            requires_localization: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub id: RobotId,
    pub name: String,
    pub status: RobotStatus,
    pub connected: bool,
    pub current_installation_code: String,
    pub current_inspection_area_id: Option<InspectionAreaId>,
    pub current_mission_run_id: Option<MissionRunId>,
    pub mission_queue_frozen: bool,
    /// Battery level in percent (0–100)
    pub battery_level: f32,
    /// Pressure in bar, if the robot reports it
    pub pressure_level: Option<f32>,
    pub model: RobotModel,
    /// Base URL of the robot's mission executor
    pub isar_uri: String,
}

impl Robot {
    pub fn new(
        name: impl Into<String>,
        installation_code: impl Into<String>,
        model: RobotModel,
        isar_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: RobotId::new(),
            name: name.into(),
            status: RobotStatus::Available,
            connected: true,
            current_installation_code: installation_code.into(),
            current_inspection_area_id: None,
            current_mission_run_id: None,
            mission_queue_frozen: false,
            battery_level: 100.0,
            pressure_level: None,
            model,
            isar_uri: isar_uri.into(),
        }
    }

    pub fn is_battery_too_low(&self) -> bool {
        self.battery_level < self.model.thresholds.battery_low
    }

    pub fn is_pressure_out_of_range(&self) -> bool {
        let Some(pressure) = self.pressure_level else {
            return false;
        };
        let thresholds = &self.model.thresholds;
        thresholds.pressure_low.is_some_and(|low| pressure < low)
            || thresholds.pressure_high.is_some_and(|high| pressure > high)
    }

    pub fn supports_inspection(&self, inspection_type: InspectionType) -> bool {
        self.model.inspection_capabilities.contains(&inspection_type)
    }

    /// Apply a typed update to this robot.
    pub fn apply(&mut self, update: &RobotUpdate) {
        match update {
            RobotUpdate::Status(status) => self.status = *status,
            RobotUpdate::Connected(connected) => self.connected = *connected,
            RobotUpdate::CurrentMissionRun(run_id) => self.current_mission_run_id = *run_id,
            RobotUpdate::CurrentInspectionArea(area_id) => self.current_inspection_area_id = *area_id,
            RobotUpdate::MissionQueueFrozen(frozen) => self.mission_queue_frozen = *frozen,
            RobotUpdate::BatteryLevel(level) => self.battery_level = level.clamp(0.0, 100.0),
            RobotUpdate::PressureLevel(level) => self.pressure_level = *level,
        }
    }
}

/// Closed set of field updates the dispatch core is allowed to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RobotUpdate {
    Status(RobotStatus),
    Connected(bool),
    CurrentMissionRun(Option<MissionRunId>),
    CurrentInspectionArea(Option<InspectionAreaId>),
    MissionQueueFrozen(bool),
    BatteryLevel(f32),
    PressureLevel(Option<f32>),
}
