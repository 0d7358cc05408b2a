// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Run Aggregate
//!
//! A [`MissionRun`] is one scheduled execution attempt of an ordered list of
//! [`MissionTask`]s on one robot. Runs are created `Pending`, become `Ongoing`
//! only through the dispatch engine, and end in one of the terminal statuses.
//!
//! ## Invariants
//!
//! - Task order is fixed at construction: tasks are sorted by `order` once and
//!   the list is never reordered afterwards.
//! - A terminal run never changes status again (see
//!   [`MissionStatus::can_transition_to`]).
//! - Tasks and inspections are addressed by the external identifiers that the
//!   robot reports back, never by position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::area::InspectionAreaId;
use crate::domain::auto_schedule::MissionDefinitionId;
use crate::domain::robot::RobotId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionRunId(pub Uuid);

impl MissionRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionTaskId(pub Uuid);

impl MissionTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionTaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Priority class of a run. Queue selection order is
/// `Emergency` > `Normal` > `ReturnHome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionRunType {
    Normal,
    Emergency,
    ReturnHome,
}

impl MissionRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionRunType::Normal => "normal",
            MissionRunType::Emergency => "emergency",
            MissionRunType::ReturnHome => "return_home",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(MissionRunType::Normal),
            "emergency" => Some(MissionRunType::Emergency),
            "return_home" => Some(MissionRunType::ReturnHome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Pending,
    Ongoing,
    Paused,
    Successful,
    PartiallySuccessful,
    Failed,
    Aborted,
    Cancelled,
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Successful
                | MissionStatus::PartiallySuccessful
                | MissionStatus::Failed
                | MissionStatus::Aborted
                | MissionStatus::Cancelled
        )
    }

    /// Whether a run in this status may move to `next`.
    pub fn can_transition_to(&self, next: MissionStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            MissionStatus::Pending => matches!(
                next,
                MissionStatus::Ongoing
                    | MissionStatus::Aborted
                    | MissionStatus::Cancelled
                    | MissionStatus::Failed
            ),
            MissionStatus::Ongoing => next != MissionStatus::Pending,
            MissionStatus::Paused => next != MissionStatus::Pending,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Pending => "pending",
            MissionStatus::Ongoing => "ongoing",
            MissionStatus::Paused => "paused",
            MissionStatus::Successful => "successful",
            MissionStatus::PartiallySuccessful => "partially_successful",
            MissionStatus::Failed => "failed",
            MissionStatus::Aborted => "aborted",
            MissionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MissionStatus::Pending),
            "ongoing" => Some(MissionStatus::Ongoing),
            "paused" => Some(MissionStatus::Paused),
            "successful" => Some(MissionStatus::Successful),
            "partially_successful" => Some(MissionStatus::PartiallySuccessful),
            "failed" => Some(MissionStatus::Failed),
            "aborted" => Some(MissionStatus::Aborted),
            "cancelled" => Some(MissionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Successful,
    PartiallySuccessful,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Finished tasks are never re-queued by recovery.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Successful | TaskStatus::PartiallySuccessful | TaskStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    NotStarted,
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

impl InspectionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            InspectionStatus::Successful | InspectionStatus::Failed | InspectionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionType {
    Image,
    ThermalImage,
    Video,
    ThermalVideo,
    Audio,
    GasMeasurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionTaskType {
    Inspection,
    Localization,
    ReturnHome,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Quaternion orientation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

impl Pose {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Position::new(x, y, z),
            orientation: Orientation::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: Uuid,
    pub inspection_type: InspectionType,
    pub status: InspectionStatus,
    /// Step identifier reported back by the robot
    pub external_step_id: String,
}

impl Inspection {
    pub fn new(inspection_type: InspectionType) -> Self {
        Self {
            id: Uuid::new_v4(),
            inspection_type,
            status: InspectionStatus::NotStarted,
            external_step_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionTask {
    pub id: MissionTaskId,
    pub order: u32,
    pub task_type: MissionTaskType,
    pub status: TaskStatus,
    pub robot_pose: Pose,
    pub tag_id: Option<String>,
    pub description: Option<String>,
    pub inspections: Vec<Inspection>,
    /// Task identifier reported back by the robot
    pub external_task_id: String,
}

impl MissionTask {
    pub fn inspection(order: u32, robot_pose: Pose, tag_id: Option<String>, inspections: Vec<Inspection>) -> Self {
        Self::with_type(order, MissionTaskType::Inspection, robot_pose, tag_id, inspections)
    }

    pub fn localization(pose: Pose) -> Self {
        Self::with_type(0, MissionTaskType::Localization, pose, None, Vec::new())
    }

    pub fn return_home(pose: Pose) -> Self {
        Self::with_type(0, MissionTaskType::ReturnHome, pose, None, Vec::new())
    }

    fn with_type(
        order: u32,
        task_type: MissionTaskType,
        robot_pose: Pose,
        tag_id: Option<String>,
        inspections: Vec<Inspection>,
    ) -> Self {
        Self {
            id: MissionTaskId::new(),
            order,
            task_type,
            status: TaskStatus::NotStarted,
            robot_pose,
            tag_id,
            description: None,
            inspections,
            external_task_id: Uuid::new_v4().to_string(),
        }
    }

    /// Copy of this task for a continuation run: same order, pose and
    /// inspections, fresh identifiers, progress reset.
    pub fn continuation(&self) -> Self {
        Self {
            id: MissionTaskId::new(),
            order: self.order,
            task_type: self.task_type,
            status: TaskStatus::NotStarted,
            robot_pose: self.robot_pose,
            tag_id: self.tag_id.clone(),
            description: self.description.clone(),
            inspections: self
                .inspections
                .iter()
                .map(|i| Inspection::new(i.inspection_type))
                .collect(),
            external_task_id: Uuid::new_v4().to_string(),
        }
    }

    fn fail_unfinished(&mut self) {
        if !self.status.is_finished() {
            self.status = TaskStatus::Failed;
        }
        for inspection in self.inspections.iter_mut().filter(|i| !i.status.is_completed()) {
            inspection.status = InspectionStatus::Failed;
        }
    }
}

/// Handle returned by the robot when a run is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalHandle {
    pub external_mission_id: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum MissionRunError {
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: MissionStatus, to: MissionStatus },
    #[error("task with external id {0} not found")]
    TaskNotFound(String),
    #[error("inspection with external step id {0} not found")]
    InspectionNotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionRun {
    pub id: MissionRunId,
    pub name: String,
    pub robot_id: RobotId,
    pub installation_code: String,
    pub inspection_area_id: Option<InspectionAreaId>,
    pub mission_definition_id: Option<MissionDefinitionId>,
    pub run_type: MissionRunType,
    pub status: MissionStatus,
    pub desired_start_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    tasks: Vec<MissionTask>,
    pub external_mission_id: Option<String>,
    pub error_reason: Option<String>,
    pub error_description: Option<String>,
}

impl MissionRun {
    pub fn new(
        name: impl Into<String>,
        robot_id: RobotId,
        installation_code: impl Into<String>,
        inspection_area_id: Option<InspectionAreaId>,
        run_type: MissionRunType,
        mut tasks: Vec<MissionTask>,
    ) -> Self {
        tasks.sort_by_key(|t| t.order);
        Self {
            id: MissionRunId::new(),
            name: name.into(),
            robot_id,
            installation_code: installation_code.into(),
            inspection_area_id,
            mission_definition_id: None,
            run_type,
            status: MissionStatus::Pending,
            desired_start_time: Utc::now(),
            start_time: None,
            end_time: None,
            tasks,
            external_mission_id: None,
            error_reason: None,
            error_description: None,
        }
    }

    /// Rebuild a run from storage. Tasks are re-sorted by order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: MissionRunId,
        name: String,
        robot_id: RobotId,
        installation_code: String,
        inspection_area_id: Option<InspectionAreaId>,
        mission_definition_id: Option<MissionDefinitionId>,
        run_type: MissionRunType,
        status: MissionStatus,
        desired_start_time: DateTime<Utc>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        mut tasks: Vec<MissionTask>,
        external_mission_id: Option<String>,
        error_reason: Option<String>,
        error_description: Option<String>,
    ) -> Self {
        tasks.sort_by_key(|t| t.order);
        Self {
            id,
            name,
            robot_id,
            installation_code,
            inspection_area_id,
            mission_definition_id,
            run_type,
            status,
            desired_start_time,
            start_time,
            end_time,
            tasks,
            external_mission_id,
            error_reason,
            error_description,
        }
    }

    pub fn with_desired_start_time(mut self, desired_start_time: DateTime<Utc>) -> Self {
        self.desired_start_time = desired_start_time;
        self
    }

    pub fn with_mission_definition(mut self, id: MissionDefinitionId) -> Self {
        self.mission_definition_id = Some(id);
        self
    }

    pub fn tasks(&self) -> &[MissionTask] {
        &self.tasks
    }

    /// A localization run consists of exactly one localization task.
    pub fn is_localization(&self) -> bool {
        self.tasks.len() == 1 && self.tasks[0].task_type == MissionTaskType::Localization
    }

    /// Tasks that have not reached Successful or Failed, in execution order.
    pub fn unfinished_tasks(&self) -> Vec<&MissionTask> {
        self.tasks.iter().filter(|t| !t.status.is_finished()).collect()
    }

    pub fn set_status(&mut self, status: MissionStatus, reason: Option<String>) -> Result<(), MissionRunError> {
        if !self.status.can_transition_to(status) {
            return Err(MissionRunError::InvalidTransition { from: self.status, to: status });
        }
        self.status = status;
        if status == MissionStatus::Ongoing && self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        if status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        if reason.is_some() {
            self.error_reason = reason;
        }
        Ok(())
    }

    pub fn set_error_description(&mut self, description: impl Into<String>) {
        self.error_description = Some(description.into());
    }

    pub fn attach_external_handle(&mut self, handle: &ExternalHandle) {
        self.external_mission_id = Some(handle.external_mission_id.clone());
    }

    /// Mark the run failed and fail every unfinished task and inspection.
    pub fn fail_with_unfinished(&mut self, reason: impl Into<String>) -> Result<(), MissionRunError> {
        self.set_status(MissionStatus::Failed, Some(reason.into()))?;
        for task in self.tasks.iter_mut() {
            task.fail_unfinished();
        }
        Ok(())
    }

    pub fn update_task_status(&mut self, external_task_id: &str, status: TaskStatus) -> Result<(), MissionRunError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.external_task_id == external_task_id)
            .ok_or_else(|| MissionRunError::TaskNotFound(external_task_id.to_string()))?;
        task.status = status;
        Ok(())
    }

    pub fn update_inspection_status(
        &mut self,
        external_task_id: &str,
        external_step_id: &str,
        status: InspectionStatus,
    ) -> Result<(), MissionRunError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.external_task_id == external_task_id)
            .ok_or_else(|| MissionRunError::TaskNotFound(external_task_id.to_string()))?;
        let inspection = task
            .inspections
            .iter_mut()
            .find(|i| i.external_step_id == external_step_id)
            .ok_or_else(|| MissionRunError::InspectionNotFound(external_step_id.to_string()))?;
        inspection.status = status;
        Ok(())
    }

    pub fn inspection_types(&self) -> impl Iterator<Item = InspectionType> + '_ {
        self.tasks
            .iter()
            .flat_map(|t| t.inspections.iter().map(|i| i.inspection_type))
    }
}
