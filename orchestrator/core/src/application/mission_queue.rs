// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mission Queue Store
//!
//! Query and mutation surface over mission runs grouped by robot and priority
//! class. Every mutation is a single-aggregate read-modify-write followed by
//! a best-effort notification on the event bus.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Queue access for the dispatch engine and the schedulers

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::DispatchError;
use crate::domain::events::MissionRunEvent;
use crate::domain::mission::{
    ExternalHandle, InspectionStatus, MissionRun, MissionRunId, MissionRunType, MissionStatus, TaskStatus,
};
use crate::domain::repository::{MissionRunQuery, MissionRunRepository};
use crate::domain::robot::RobotId;
use crate::infrastructure::event_bus::EventBus;

pub struct MissionQueueStore {
    repository: Arc<dyn MissionRunRepository>,
    event_bus: EventBus,
}

impl MissionQueueStore {
    pub fn new(repository: Arc<dyn MissionRunRepository>, event_bus: EventBus) -> Self {
        Self { repository, event_bus }
    }

    /// Earliest-desired-start Pending run of `run_type` for the robot
    pub async fn next_queued(&self, robot_id: RobotId, run_type: MissionRunType) -> Result<Option<MissionRun>, DispatchError> {
        Ok(self.pending_of_type(robot_id, run_type).await?.into_iter().next())
    }

    /// Runs currently executing on the robot. Paused runs count as executing.
    pub async fn ongoing(&self, robot_id: RobotId) -> Result<Vec<MissionRun>, DispatchError> {
        let query = MissionRunQuery {
            statuses: vec![MissionStatus::Ongoing, MissionStatus::Paused],
            run_type: None,
        };
        Ok(self.repository.find_by_robot(robot_id, &query).await?)
    }

    pub async fn pending_of_type(&self, robot_id: RobotId, run_type: MissionRunType) -> Result<Vec<MissionRun>, DispatchError> {
        let query = MissionRunQuery::with_status(MissionStatus::Pending).of_type(run_type);
        Ok(self.repository.find_by_robot(robot_id, &query).await?)
    }

    pub async fn find_by_robot(&self, robot_id: RobotId, query: &MissionRunQuery) -> Result<Vec<MissionRun>, DispatchError> {
        Ok(self.repository.find_by_robot(robot_id, query).await?)
    }

    pub async fn find(&self, id: MissionRunId) -> Result<Option<MissionRun>, DispatchError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn get(&self, id: MissionRunId) -> Result<MissionRun, DispatchError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::MissionRunNotFound(id))
    }

    pub async fn find_by_external_id(&self, external_mission_id: &str) -> Result<Option<MissionRun>, DispatchError> {
        Ok(self.repository.find_by_external_mission_id(external_mission_id).await?)
    }

    /// Persist a new run. `notify = false` is used for internal
    /// continuations that must not trigger a dispatch on their own.
    pub async fn create(&self, run: MissionRun, notify: bool) -> Result<MissionRun, DispatchError> {
        self.repository.save(&run).await?;
        debug!(mission_run_id = %run.id, robot_id = %run.robot_id, notify, "Mission run created");
        self.event_bus.publish_mission_run_event(MissionRunEvent::MissionRunCreated {
            mission_run_id: run.id,
            robot_id: run.robot_id,
            run_type: run.run_type,
            notify,
            created_at: Utc::now(),
        });
        Ok(run)
    }

    pub async fn set_status(
        &self,
        id: MissionRunId,
        status: MissionStatus,
        reason: Option<String>,
    ) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.set_status(status, reason)?;
        self.save_with_status_event(&run).await?;
        Ok(run)
    }

    pub async fn attach_external_handle(&self, id: MissionRunId, handle: &ExternalHandle) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.attach_external_handle(handle);
        self.repository.save(&run).await?;
        Ok(run)
    }

    pub async fn mark_failed(&self, id: MissionRunId, reason: &str, description: &str) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.set_status(MissionStatus::Failed, Some(reason.to_string()))?;
        run.set_error_description(description);
        self.save_with_status_event(&run).await?;
        Ok(run)
    }

    /// Mark the run Failed with `reason` and fail its unfinished work.
    pub async fn fail_with_unfinished(&self, id: MissionRunId, reason: &str) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.fail_with_unfinished(reason)?;
        self.save_with_status_event(&run).await?;
        Ok(run)
    }

    pub async fn update_task_status(
        &self,
        id: MissionRunId,
        external_task_id: &str,
        status: TaskStatus,
    ) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.update_task_status(external_task_id, status)?;
        self.repository.save(&run).await?;
        Ok(run)
    }

    pub async fn update_inspection_status(
        &self,
        id: MissionRunId,
        external_task_id: &str,
        external_step_id: &str,
        status: InspectionStatus,
    ) -> Result<MissionRun, DispatchError> {
        let mut run = self.get(id).await?;
        run.update_inspection_status(external_task_id, external_step_id, status)?;
        self.repository.save(&run).await?;
        Ok(run)
    }

    async fn save_with_status_event(&self, run: &MissionRun) -> Result<(), DispatchError> {
        self.repository.save(run).await?;
        self.event_bus.publish_mission_run_event(MissionRunEvent::MissionRunStatusChanged {
            mission_run_id: run.id,
            robot_id: run.robot_id,
            status: run.status,
            changed_at: Utc::now(),
        });
        Ok(())
    }
}
