// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recovery of interrupted mission runs.
//!
//! When a run is stopped with work left, its unfinished tasks are re-queued
//! as a new Pending run for the same robot, in their original order.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::application::mission_queue::MissionQueueStore;
use crate::domain::errors::DispatchError;
use crate::domain::mission::{MissionRun, MissionRunType, MissionTask};

pub struct RecoveryManager {
    queue: Arc<MissionQueueStore>,
}

impl RecoveryManager {
    pub fn new(queue: Arc<MissionQueueStore>) -> Self {
        Self { queue }
    }

    /// Re-queue the unfinished tasks of `stopped_run`.
    ///
    /// Return-home and localization runs are never re-queued. The
    /// continuation is created without the created notification.
    pub async fn recover(&self, stopped_run: &MissionRun) -> Result<Option<MissionRun>, DispatchError> {
        if stopped_run.run_type == MissionRunType::ReturnHome || stopped_run.is_localization() {
            return Ok(None);
        }

        let unfinished: Vec<MissionTask> = stopped_run
            .unfinished_tasks()
            .into_iter()
            .map(MissionTask::continuation)
            .collect();
        if unfinished.is_empty() {
            return Ok(None);
        }

        let mut continuation = MissionRun::new(
            stopped_run.name.clone(),
            stopped_run.robot_id,
            stopped_run.installation_code.clone(),
            stopped_run.inspection_area_id,
            stopped_run.run_type,
            unfinished,
        )
        .with_desired_start_time(Utc::now());
        continuation.mission_definition_id = stopped_run.mission_definition_id;

        info!(
            mission_run_id = %stopped_run.id,
            new_mission_run_id = %continuation.id,
            robot_id = %stopped_run.robot_id,
            task_count = continuation.tasks().len(),
            "Re-queued unfinished tasks of interrupted mission run"
        );
        Ok(Some(self.queue.create(continuation, false).await?))
    }
}
