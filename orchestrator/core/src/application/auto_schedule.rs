// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Auto Scheduler
//!
//! Turns the recurring frequencies attached to mission definitions into
//! Normal mission runs.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Registers one background job per time of day still ahead
//!   today and refreshes the registrations every installation-local midnight
//!
//! Fired jobs capture only the definition id and the time of day. Everything
//! else (the definition, its area, the robot in that area, the tasks) is
//! re-read when the job runs, since any of it may have changed or
//! disappeared in the meantime.
//!
//! All mutations of a definition's `scheduled_jobs` are serialized through
//! one async mutex, so a time of day never holds two live job handles.

use chrono::{FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::mission_queue::MissionQueueStore;
use crate::domain::auto_schedule::{AutoScheduleError, AutoScheduleFrequency, MissionDefinition, MissionDefinitionId};
use crate::domain::errors::DispatchError;
use crate::domain::events::AlertEvent;
use crate::domain::geofence;
use crate::domain::jobs::JobScheduler;
use crate::domain::mission::{MissionRun, MissionRunType};
use crate::domain::mission_source::{MissionSourceError, MissionSourceLoader};
use crate::domain::repository::{AreaRepository, MissionDefinitionRepository, RobotRepository};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::telemetry::AUTO_SCHEDULED_RUNS_TOTAL;

pub struct AutoScheduler {
    definitions: Arc<dyn MissionDefinitionRepository>,
    robots: Arc<dyn RobotRepository>,
    areas: Arc<dyn AreaRepository>,
    mission_source: Arc<dyn MissionSourceLoader>,
    queue: Arc<MissionQueueStore>,
    jobs: Arc<dyn JobScheduler>,
    event_bus: EventBus,
    offset: FixedOffset,
    mutations: Mutex<()>,
}

impl AutoScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        definitions: Arc<dyn MissionDefinitionRepository>,
        robots: Arc<dyn RobotRepository>,
        areas: Arc<dyn AreaRepository>,
        mission_source: Arc<dyn MissionSourceLoader>,
        queue: Arc<MissionQueueStore>,
        jobs: Arc<dyn JobScheduler>,
        event_bus: EventBus,
        utc_offset_minutes: i32,
    ) -> Arc<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Arc::new(Self {
            definitions,
            robots,
            areas,
            mission_source,
            queue,
            jobs,
            event_bus,
            offset,
            mutations: Mutex::new(()),
        })
    }

    /// Installation-local wall clock
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    /// Register jobs for every time of day still ahead today.
    ///
    /// Idempotent: a time of day that already has a job is left alone.
    /// Returns how many jobs were registered.
    pub async fn start_jobs(self: &Arc<Self>, definition_id: MissionDefinitionId) -> Result<usize, DispatchError> {
        self.start_jobs_at(definition_id, self.local_now()).await
    }

    pub async fn start_jobs_at(
        self: &Arc<Self>,
        definition_id: MissionDefinitionId,
        now: NaiveDateTime,
    ) -> Result<usize, DispatchError> {
        let _guard = self.mutations.lock().await;
        let mut definition = self.load(definition_id).await?;
        let frequency = definition
            .auto_schedule_frequency
            .as_mut()
            .ok_or(AutoScheduleError::NoFrequency(definition_id))?;
        frequency.validate()?;

        let mut registered = 0;
        for (delay, time) in frequency.scheduling_times_until_midnight(now) {
            if frequency.has_job(&time) {
                continue;
            }
            let handle = self.jobs.schedule(delay, self.fire_job(definition_id, time));
            debug!(mission_definition_id = %definition_id, %time, ?delay, job = %handle, "Registered auto-schedule job");
            frequency.scheduled_jobs.insert(time, handle);
            registered += 1;
        }

        if registered > 0 {
            self.definitions.save(&definition).await?;
        }
        Ok(registered)
    }

    /// Skip the run planned for `time_of_day`. Returns `false` when no job
    /// was registered for it.
    pub async fn skip_one(&self, definition_id: MissionDefinitionId, time_of_day: NaiveTime) -> Result<bool, DispatchError> {
        let _guard = self.mutations.lock().await;
        let mut definition = self.load(definition_id).await?;
        let frequency = definition
            .auto_schedule_frequency
            .as_mut()
            .ok_or(AutoScheduleError::NoFrequency(definition_id))?;

        let Some(handle) = frequency.scheduled_jobs.remove(&time_of_day) else {
            return Ok(false);
        };
        if !self.jobs.cancel(&handle) {
            debug!(mission_definition_id = %definition_id, time = %time_of_day, "Job had already fired");
        }
        self.definitions.save(&definition).await?;

        info!(mission_definition_id = %definition_id, time = %time_of_day, "Skipped auto-scheduled run");
        self.event_bus.publish_alert(AlertEvent::AutoScheduleSkipped {
            mission_definition_id: definition_id,
            time_of_day: Some(time_of_day),
            at: Utc::now(),
        });
        Ok(true)
    }

    /// Skip every run planned for the rest of today.
    ///
    /// Entries whose cancellation fails are kept. Returns how many jobs were
    /// cancelled.
    pub async fn skip_all(&self, definition_id: MissionDefinitionId) -> Result<usize, DispatchError> {
        let _guard = self.mutations.lock().await;
        let mut definition = self.load(definition_id).await?;
        let frequency = definition
            .auto_schedule_frequency
            .as_mut()
            .ok_or(AutoScheduleError::NoFrequency(definition_id))?;

        let times: Vec<NaiveTime> = frequency.scheduled_jobs.keys().copied().collect();
        let mut cancelled = 0;
        for time in times {
            let Some(handle) = frequency.scheduled_jobs.get(&time).cloned() else {
                continue;
            };
            if self.jobs.cancel(&handle) {
                frequency.scheduled_jobs.remove(&time);
                cancelled += 1;
            } else {
                warn!(mission_definition_id = %definition_id, %time, job = %handle, "Failed to cancel auto-schedule job");
            }
        }
        self.definitions.save(&definition).await?;

        info!(mission_definition_id = %definition_id, cancelled, "Skipped all auto-scheduled runs");
        self.event_bus.publish_alert(AlertEvent::AutoScheduleSkipped {
            mission_definition_id: definition_id,
            time_of_day: None,
            at: Utc::now(),
        });
        Ok(cancelled)
    }

    /// Replace the definition's frequency.
    ///
    /// Nothing happens when the fire points are unchanged. Otherwise every
    /// existing job is cancelled before the new frequency is scheduled.
    /// `None` turns auto-scheduling off for the definition.
    pub async fn update_frequency(
        self: &Arc<Self>,
        definition_id: MissionDefinitionId,
        frequency: Option<AutoScheduleFrequency>,
    ) -> Result<(), DispatchError> {
        {
            let _guard = self.mutations.lock().await;
            let mut definition = self.load(definition_id).await?;
            if let (Some(current), Some(new)) = (&definition.auto_schedule_frequency, &frequency) {
                if current.same_schedule_as(new) {
                    return Ok(());
                }
            }
            if let Some(new) = &frequency {
                new.validate()?;
            }

            self.cancel_all(&mut definition);
            definition.auto_schedule_frequency = frequency.map(|mut new| {
                new.scheduled_jobs.clear();
                new
            });
            self.definitions.save(&definition).await?;
            if definition.auto_schedule_frequency.is_none() {
                return Ok(());
            }
        }
        self.start_jobs(definition_id).await?;
        Ok(())
    }

    /// Drop stale handles and register today's jobs for every definition
    /// with a frequency.
    pub async fn refresh_all(self: &Arc<Self>, now: NaiveDateTime) -> Result<(), DispatchError> {
        for definition in self.definitions.find_auto_scheduled().await? {
            {
                let _guard = self.mutations.lock().await;
                let mut fresh = self.load(definition.id).await?;
                self.cancel_all(&mut fresh);
                self.definitions.save(&fresh).await?;
            }
            if let Err(err) = self.start_jobs_at(definition.id, now).await {
                warn!(mission_definition_id = %definition.id, error = %err, "Failed to start auto-schedule jobs");
            }
        }
        Ok(())
    }

    /// Refresh at startup and again at every installation-local midnight
    /// until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(offset = %self.offset, "Auto scheduler started");
        loop {
            if let Err(err) = self.refresh_all(self.local_now()).await {
                error!(error = %err, "Failed to refresh auto-schedule jobs");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.until_next_midnight()) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Auto scheduler stopped");
    }

    fn until_next_midnight(&self) -> Duration {
        let now = self.local_now();
        now.date()
            .succ_opt()
            .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
            .and_then(|midnight| (midnight - now).to_std().ok())
            .unwrap_or(Duration::from_secs(60))
    }

    fn cancel_all(&self, definition: &mut MissionDefinition) {
        let Some(frequency) = definition.auto_schedule_frequency.as_mut() else {
            return;
        };
        for handle in frequency.scheduled_jobs.values() {
            self.jobs.cancel(handle);
        }
        frequency.scheduled_jobs.clear();
    }

    fn fire_job(self: &Arc<Self>, definition_id: MissionDefinitionId, time: NaiveTime) -> BoxFuture<'static, ()> {
        let scheduler: Weak<Self> = Arc::downgrade(self);
        Box::pin(async move {
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.fire(definition_id, time).await;
            }
        })
    }

    async fn fire(&self, definition_id: MissionDefinitionId, time: NaiveTime) {
        match self.create_scheduled_run(definition_id, time).await {
            Ok(Some(run)) => {
                metrics::counter!(AUTO_SCHEDULED_RUNS_TOTAL).increment(1);
                info!(
                    mission_definition_id = %definition_id,
                    mission_run_id = %run.id,
                    robot_id = %run.robot_id,
                    %time,
                    "Auto-scheduled mission run created"
                );
            }
            Ok(None) => {}
            Err(err) => {
                error!(mission_definition_id = %definition_id, %time, error = %err, "Auto-scheduled mission run failed");
                self.event_bus.publish_alert(AlertEvent::AutoScheduleFailed {
                    mission_definition_id: definition_id,
                    time_of_day: time,
                    reason: err.to_string(),
                    at: Utc::now(),
                });
            }
        }
    }

    async fn create_scheduled_run(
        &self,
        definition_id: MissionDefinitionId,
        time: NaiveTime,
    ) -> Result<Option<MissionRun>, DispatchError> {
        let definition = {
            let _guard = self.mutations.lock().await;
            let Some(mut definition) = self.definitions.find_by_id(definition_id).await? else {
                warn!(mission_definition_id = %definition_id, "Auto-scheduled mission definition no longer exists");
                return Ok(None);
            };
            if let Some(frequency) = definition.auto_schedule_frequency.as_mut() {
                frequency.scheduled_jobs.remove(&time);
                self.definitions.save(&definition).await?;
            }
            definition
        };
        if definition.is_deprecated {
            return Ok(None);
        }

        let area_id = definition.inspection_area_id.ok_or_else(|| {
            DispatchError::AreaNotFound(format!("mission definition {} has no inspection area", definition.id))
        })?;

        let robots = self.robots.find_in_inspection_area(area_id).await?;
        let robot = robots.first().ok_or(DispatchError::NoRobotInArea(area_id))?;
        if robots.len() > 1 {
            warn!(
                mission_definition_id = %definition.id,
                inspection_area_id = %area_id,
                robot_count = robots.len(),
                robot_id = %robot.id,
                "Several robots in inspection area, using the first"
            );
        }

        let tasks = self.mission_source.load_tasks(&definition.source_id).await?;
        let exclusion_areas = self.areas.find_exclusion_areas(&definition.installation_code).await?;
        let tasks = geofence::filter_out_excluded(tasks, &exclusion_areas);
        if tasks.is_empty() {
            return Err(MissionSourceError::Invalid(format!(
                "mission source {} has no tasks outside exclusion areas",
                definition.source_id
            ))
            .into());
        }

        let run = MissionRun::new(
            definition.name.clone(),
            robot.id,
            definition.installation_code.clone(),
            Some(area_id),
            MissionRunType::Normal,
            tasks,
        )
        .with_mission_definition(definition.id);
        Ok(Some(self.queue.create(run, true).await?))
    }

    async fn load(&self, definition_id: MissionDefinitionId) -> Result<MissionDefinition, DispatchError> {
        self.definitions
            .find_by_id(definition_id)
            .await?
            .ok_or(DispatchError::MissionDefinitionNotFound(definition_id))
    }
}
