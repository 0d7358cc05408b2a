// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Composition root for the dispatch core.
//!
//! Wires repositories, the event bus and the outbound ports into the
//! application services. Surrounding request handlers hold a
//! [`DispatchServices`] and call into its services directly.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::auto_schedule::AutoScheduler;
use crate::application::connection_monitor::ConnectionMonitor;
use crate::application::dispatch::DispatchEngine;
use crate::application::dispatch_listener::DispatchListener;
use crate::application::localization::LocalizationCoordinator;
use crate::application::mission_queue::MissionQueueStore;
use crate::application::mission_starter::MissionStarter;
use crate::application::recovery::RecoveryManager;
use crate::application::repository_factory::{create_repositories, Repositories};
use crate::application::return_home::ReturnHomeService;
use crate::application::status_updates::MissionStatusHandler;
use crate::domain::dispatch_config::DispatchConfig;
use crate::domain::jobs::JobScheduler;
use crate::domain::mission_source::MissionSourceLoader;
use crate::domain::robot_control::RobotControl;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::isar_client::IsarRobotControl;
use crate::infrastructure::job_scheduler::TokioJobScheduler;
use crate::infrastructure::telemetry;

pub struct DispatchServices {
    pub config: DispatchConfig,
    pub repositories: Repositories,
    pub event_bus: EventBus,
    pub queue: Arc<MissionQueueStore>,
    pub recovery: Arc<RecoveryManager>,
    pub localization: Arc<LocalizationCoordinator>,
    pub return_home: Arc<ReturnHomeService>,
    pub engine: Arc<DispatchEngine>,
    pub status_handler: Arc<MissionStatusHandler>,
    pub connection_monitor: Arc<ConnectionMonitor>,
    pub auto_scheduler: Arc<AutoScheduler>,
    pub listener: Arc<DispatchListener>,
}

impl DispatchServices {
    pub fn build(
        config: DispatchConfig,
        repositories: Repositories,
        robot_control: Arc<dyn RobotControl>,
        mission_source: Arc<dyn MissionSourceLoader>,
        jobs: Arc<dyn JobScheduler>,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus.capacity);
        let queue = Arc::new(MissionQueueStore::new(repositories.mission_runs.clone(), event_bus.clone()));
        let starter = Arc::new(MissionStarter::new(
            repositories.robots.clone(),
            queue.clone(),
            robot_control,
            event_bus.clone(),
            config.robot_control.request_timeout,
        ));
        let recovery = Arc::new(RecoveryManager::new(queue.clone()));
        let localization = Arc::new(LocalizationCoordinator::new(
            repositories.robots.clone(),
            repositories.areas.clone(),
            queue.clone(),
            starter.clone(),
            event_bus.clone(),
            config.localization.clone(),
        ));
        let return_home = Arc::new(ReturnHomeService::new(repositories.areas.clone(), queue.clone()));
        let engine = Arc::new(DispatchEngine::new(
            repositories.robots.clone(),
            repositories.areas.clone(),
            queue.clone(),
            starter,
            localization.clone(),
            recovery.clone(),
            return_home.clone(),
            event_bus.clone(),
        ));
        let status_handler = Arc::new(MissionStatusHandler::new(
            repositories.robots.clone(),
            queue.clone(),
            engine.clone(),
            event_bus.clone(),
        ));
        let connection_monitor = Arc::new(ConnectionMonitor::new(
            repositories.robots.clone(),
            engine.clone(),
            jobs.clone(),
            event_bus.clone(),
            config.connection.heartbeat_timeout,
        ));
        let auto_scheduler = AutoScheduler::new(
            repositories.mission_definitions.clone(),
            repositories.robots.clone(),
            repositories.areas.clone(),
            mission_source,
            queue.clone(),
            jobs,
            event_bus.clone(),
            config.auto_schedule.utc_offset_minutes,
        );
        let listener = Arc::new(DispatchListener::new(engine.clone(), event_bus.clone()));

        Self {
            config,
            repositories,
            event_bus,
            queue,
            recovery,
            localization,
            return_home,
            engine,
            status_handler,
            connection_monitor,
            auto_scheduler,
            listener,
        }
    }

    /// Build from configuration with the production adapters: configured
    /// storage, the HTTP robot-control client and the tokio job scheduler.
    pub async fn from_config(config: DispatchConfig, mission_source: Arc<dyn MissionSourceLoader>) -> Result<Self> {
        config.validate()?;
        let repositories = create_repositories(&config.storage_backend())
            .await
            .context("Failed to create repositories")?;
        let robot_control = IsarRobotControl::new(config.robot_control.request_timeout)
            .context("Failed to create robot control client")?;
        Ok(Self::build(
            config,
            repositories,
            Arc::new(robot_control),
            mission_source,
            Arc::new(TokioJobScheduler::new()),
        ))
    }

    /// Spawn the background tasks: the dispatch listener and, when enabled,
    /// the auto scheduler's daily refresh loop.
    pub fn start(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        telemetry::describe_metrics();
        let mut handles = vec![self.listener.clone().start(shutdown.clone())];
        if self.config.auto_schedule.enabled {
            handles.push(tokio::spawn(self.auto_scheduler.clone().run(shutdown)));
        } else {
            info!("Auto scheduling disabled");
        }
        handles
    }
}
