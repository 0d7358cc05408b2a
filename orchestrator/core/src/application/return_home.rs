// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use tracing::info;

use crate::application::mission_queue::MissionQueueStore;
use crate::domain::errors::DispatchError;
use crate::domain::mission::{MissionRun, MissionRunType, MissionStatus, MissionTask, Pose};
use crate::domain::repository::{AreaRepository, MissionRunQuery};
use crate::domain::robot::Robot;

/// Queues the low-priority run that drives a robot back to its area's
/// default localization pose.
pub struct ReturnHomeService {
    areas: Arc<dyn AreaRepository>,
    queue: Arc<MissionQueueStore>,
}

impl ReturnHomeService {
    pub fn new(areas: Arc<dyn AreaRepository>, queue: Arc<MissionQueueStore>) -> Self {
        Self { areas, queue }
    }

    /// Returns `None` when a return-home run is already Pending, Ongoing or
    /// Paused for the robot.
    pub async fn schedule_return_home_if_not_already_scheduled(
        &self,
        robot: &Robot,
    ) -> Result<Option<MissionRun>, DispatchError> {
        let query = MissionRunQuery {
            statuses: vec![MissionStatus::Pending, MissionStatus::Ongoing, MissionStatus::Paused],
            run_type: Some(MissionRunType::ReturnHome),
        };
        if !self.queue.find_by_robot(robot.id, &query).await?.is_empty() {
            return Ok(None);
        }

        let area_id = robot.current_inspection_area_id.ok_or_else(|| {
            DispatchError::ReturnHomeFailedToSchedule(format!("robot {} has no inspection area", robot.id))
        })?;
        let pose = self
            .areas
            .find_inspection_area(area_id)
            .await?
            .and_then(|area| area.default_localization_pose)
            .unwrap_or_else(Pose::default);

        let run = MissionRun::new(
            "Return home",
            robot.id,
            robot.current_installation_code.clone(),
            Some(area_id),
            MissionRunType::ReturnHome,
            vec![MissionTask::return_home(pose)],
        );
        let run = self.queue.create(run, false).await?;
        info!(robot_id = %robot.id, mission_run_id = %run.id, "Scheduled return home");
        Ok(Some(run))
    }
}
