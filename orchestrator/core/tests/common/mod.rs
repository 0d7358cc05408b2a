// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet_dispatch_core::application::repository_factory::Repositories;
use fleet_dispatch_core::application::services::DispatchServices;
use fleet_dispatch_core::domain::area::{AreaPolygon, Deck, DeckId, InspectionArea, InspectionAreaId};
use fleet_dispatch_core::domain::dispatch_config::DispatchConfig;
use fleet_dispatch_core::domain::jobs::{JobHandle, JobScheduler};
use fleet_dispatch_core::domain::mission::{ExternalHandle, MissionRun, MissionRunId, MissionRunType, MissionTask, Pose};
use fleet_dispatch_core::domain::mission_source::{MissionSourceError, MissionSourceLoader};
use fleet_dispatch_core::domain::repository::{AreaRepository, RobotRepository};
use fleet_dispatch_core::domain::robot::{Robot, RobotModel};
use fleet_dispatch_core::domain::robot_control::{RobotControl, RobotControlError};
use fleet_dispatch_core::infrastructure::job_scheduler::TokioJobScheduler;

pub const INSTALLATION: &str = "HUA";

/// Robot control that records commands and fails on request
#[derive(Default)]
pub struct FakeRobotControl {
    started: Mutex<Vec<MissionRunId>>,
    stops: Mutex<usize>,
    start_error: Mutex<Option<RobotControlError>>,
    stop_error: Mutex<Option<RobotControlError>>,
}

impl FakeRobotControl {
    pub fn fail_start_with(&self, err: RobotControlError) {
        *self.start_error.lock().unwrap() = Some(err);
    }

    pub fn fail_stop_with(&self, err: RobotControlError) {
        *self.stop_error.lock().unwrap() = Some(err);
    }

    pub fn started(&self) -> Vec<MissionRunId> {
        self.started.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

pub fn external_id(run_id: MissionRunId) -> String {
    format!("isar-{}", run_id)
}

#[async_trait]
impl RobotControl for FakeRobotControl {
    async fn start(&self, _robot: &Robot, mission_run: &MissionRun) -> Result<ExternalHandle, RobotControlError> {
        if let Some(err) = self.start_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.started.lock().unwrap().push(mission_run.id);
        Ok(ExternalHandle {
            external_mission_id: external_id(mission_run.id),
        })
    }

    async fn stop(&self, _robot: &Robot) -> Result<(), RobotControlError> {
        if let Some(err) = self.stop_error.lock().unwrap().clone() {
            return Err(err);
        }
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }

    async fn pause(&self, _robot: &Robot) -> Result<(), RobotControlError> {
        Ok(())
    }

    async fn resume(&self, _robot: &Robot) -> Result<(), RobotControlError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMissionSource {
    missions: Mutex<HashMap<String, Vec<MissionTask>>>,
}

impl FakeMissionSource {
    pub fn insert(&self, source_id: &str, tasks: Vec<MissionTask>) {
        self.missions.lock().unwrap().insert(source_id.to_string(), tasks);
    }
}

#[async_trait]
impl MissionSourceLoader for FakeMissionSource {
    async fn load_tasks(&self, source_id: &str) -> Result<Vec<MissionTask>, MissionSourceError> {
        self.missions
            .lock()
            .unwrap()
            .get(source_id)
            .cloned()
            .ok_or_else(|| MissionSourceError::NotFound(source_id.to_string()))
    }
}

/// Job scheduler driven by hand: jobs fire only when a test runs them, and
/// cancellation can be made to fail the way a remote scheduler's might.
#[derive(Default)]
pub struct ManualJobScheduler {
    scheduled: Mutex<Vec<JobHandle>>,
    jobs: Mutex<HashMap<JobHandle, BoxFuture<'static, ()>>>,
    uncancellable: Mutex<HashSet<JobHandle>>,
    refuse_all_cancels: Mutex<bool>,
}

impl ManualJobScheduler {
    /// Handles in the order they were scheduled
    pub fn scheduled(&self) -> Vec<JobHandle> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn refuse_cancel(&self, handle: &JobHandle) {
        self.uncancellable.lock().unwrap().insert(handle.clone());
    }

    pub fn refuse_all_cancels(&self) {
        *self.refuse_all_cancels.lock().unwrap() = true;
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Run a job now, whether or not it was cancelled
    pub async fn fire(&self, handle: &JobHandle) {
        let job = self.jobs.lock().unwrap().remove(handle);
        if let Some(job) = job {
            job.await;
        }
    }
}

impl JobScheduler for ManualJobScheduler {
    fn schedule(&self, _delay: Duration, job: BoxFuture<'static, ()>) -> JobHandle {
        let mut scheduled = self.scheduled.lock().unwrap();
        let handle = JobHandle(format!("job-{}", scheduled.len()));
        scheduled.push(handle.clone());
        self.jobs.lock().unwrap().insert(handle.clone(), job);
        handle
    }

    fn cancel(&self, handle: &JobHandle) -> bool {
        if *self.refuse_all_cancels.lock().unwrap() || self.uncancellable.lock().unwrap().contains(handle) {
            return false;
        }
        self.jobs.lock().unwrap().remove(handle).is_some()
    }
}

pub struct Fixture<J: JobScheduler + 'static = TokioJobScheduler> {
    pub services: DispatchServices,
    pub robot_control: Arc<FakeRobotControl>,
    pub mission_source: Arc<FakeMissionSource>,
    pub jobs: Arc<J>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Fixture::build(config, Arc::new(TokioJobScheduler::new()))
    }
}

impl Fixture<ManualJobScheduler> {
    pub fn with_manual_jobs() -> Self {
        Fixture::build(DispatchConfig::default(), Arc::new(ManualJobScheduler::default()))
    }
}

impl<J: JobScheduler + 'static> Fixture<J> {
    fn build(config: DispatchConfig, jobs: Arc<J>) -> Self {
        let robot_control = Arc::new(FakeRobotControl::default());
        let mission_source = Arc::new(FakeMissionSource::default());
        let services = DispatchServices::build(
            config,
            Repositories::in_memory(),
            robot_control.clone(),
            mission_source.clone(),
            jobs.clone(),
        );
        Self {
            services,
            robot_control,
            mission_source,
            jobs,
        }
    }

    /// Inspection area on its own deck, bounded by the 10x10 square
    pub async fn area(&self) -> InspectionArea {
        let deck = Deck {
            id: DeckId::new(),
            name: "Main deck".to_string(),
            installation_code: INSTALLATION.to_string(),
            default_localization_pose: Some(Pose::at(1.0, 1.0, 0.0)),
        };
        self.services.repositories.areas.save_deck(&deck).await.unwrap();
        let area = InspectionArea::new("Weather deck", INSTALLATION)
            .with_deck(deck.id)
            .with_polygon(square());
        self.services.repositories.areas.save_inspection_area(&area).await.unwrap();
        area
    }

    pub async fn robot_with(&self, model: RobotModel, area: Option<InspectionAreaId>) -> Robot {
        let mut robot = Robot::new("Anymal", INSTALLATION, model, "http://isar.local:3000");
        robot.current_inspection_area_id = area;
        self.services.repositories.robots.save(&robot).await.unwrap();
        robot
    }

    pub async fn robot(&self, area: Option<InspectionAreaId>) -> Robot {
        self.robot_with(RobotModel::default(), area).await
    }

    pub async fn reload(&self, robot: &Robot) -> Robot {
        self.services.repositories.robots.find_by_id(robot.id).await.unwrap().unwrap()
    }

    pub async fn run(&self, id: MissionRunId) -> MissionRun {
        self.services.queue.get(id).await.unwrap()
    }

    /// Queue a Pending run without triggering the dispatch listener
    pub async fn queue_run(
        &self,
        robot: &Robot,
        area: Option<InspectionAreaId>,
        run_type: MissionRunType,
        tasks: Vec<MissionTask>,
        desired_start_time: DateTime<Utc>,
    ) -> MissionRun {
        let run = MissionRun::new("Inspection round", robot.id, INSTALLATION, area, run_type, tasks)
            .with_desired_start_time(desired_start_time);
        self.services.queue.create(run, false).await.unwrap()
    }
}

pub fn square() -> AreaPolygon {
    AreaPolygon::from_points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)], 0.0, 5.0)
}

pub fn task_at(order: u32, x: f64, y: f64, z: f64) -> MissionTask {
    MissionTask::inspection(order, Pose::at(x, y, z), Some(format!("TAG-{order}")), vec![])
}

pub fn tasks_inside(count: u32) -> Vec<MissionTask> {
    (0..count).map(|i| task_at(i, 1.0 + i as f64, 5.0, 1.0)).collect()
}
