// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::area::InspectionAreaId;
use crate::domain::auto_schedule::MissionDefinitionId;
use crate::domain::mission::{MissionRunId, MissionRunType, MissionStatus};
use crate::domain::robot::RobotId;

/// Mission run lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MissionRunEvent {
    /// `notify` is false for internal continuations (recovery, localization)
    /// which must not re-trigger dispatch.
    MissionRunCreated {
        mission_run_id: MissionRunId,
        robot_id: RobotId,
        run_type: MissionRunType,
        notify: bool,
        created_at: DateTime<Utc>,
    },
    MissionRunStatusChanged {
        mission_run_id: MissionRunId,
        robot_id: RobotId,
        status: MissionStatus,
        changed_at: DateTime<Utc>,
    },
    MissionRunStarted {
        mission_run_id: MissionRunId,
        robot_id: RobotId,
        external_mission_id: String,
        started_at: DateTime<Utc>,
    },
    MissionRunAborted {
        mission_run_id: MissionRunId,
        robot_id: RobotId,
        reason: String,
        aborted_at: DateTime<Utc>,
    },
}

/// Robot state events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RobotEvent {
    RobotAvailable {
        robot_id: RobotId,
        at: DateTime<Utc>,
    },
    RobotConnectionLost {
        robot_id: RobotId,
        lost_at: DateTime<Utc>,
    },
    RobotReconnected {
        robot_id: RobotId,
        at: DateTime<Utc>,
    },
    RobotAreaChanged {
        robot_id: RobotId,
        inspection_area_id: Option<InspectionAreaId>,
        at: DateTime<Utc>,
    },
    MissionQueueFrozenChanged {
        robot_id: RobotId,
        frozen: bool,
        at: DateTime<Utc>,
    },
}

/// Outward alerts for operators. Delivery is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertEvent {
    NormalMissionsAborted {
        robot_id: RobotId,
        reason: String,
        aborted_count: usize,
        at: DateTime<Utc>,
    },
    LocalizationFailed {
        robot_id: RobotId,
        mission_run_id: MissionRunId,
        inspection_area_id: Option<InspectionAreaId>,
        at: DateTime<Utc>,
    },
    AutoScheduleFailed {
        mission_definition_id: MissionDefinitionId,
        time_of_day: NaiveTime,
        reason: String,
        at: DateTime<Utc>,
    },
    AutoScheduleSkipped {
        mission_definition_id: MissionDefinitionId,
        time_of_day: Option<NaiveTime>,
        at: DateTime<Utc>,
    },
}
