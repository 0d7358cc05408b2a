// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mission Definitions and Auto-Schedule Frequencies
//!
//! A [`MissionDefinition`] is a reusable mission template whose tasks come
//! from an external mission source. An optional [`AutoScheduleFrequency`]
//! lists the weekdays and installation-local times of day at which a new run
//! is created automatically.
//!
//! ## Invariants
//!
//! - A time of day present in `times_of_day` has at most one live job handle
//!   in `scheduled_jobs` (the map is keyed by time of day).

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::area::InspectionAreaId;
use crate::domain::jobs::JobHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionDefinitionId(pub Uuid);

impl MissionDefinitionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionDefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AutoScheduleError {
    #[error("auto-schedule frequency has no times of day")]
    NoTimesOfDay,
    #[error("auto-schedule frequency has no days of week")]
    NoDaysOfWeek,
    #[error("mission definition {0} has no auto-schedule frequency")]
    NoFrequency(MissionDefinitionId),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoScheduleFrequency {
    pub days_of_week: Vec<Weekday>,
    pub times_of_day: BTreeSet<NaiveTime>,
    #[serde(default)]
    pub scheduled_jobs: BTreeMap<NaiveTime, JobHandle>,
}

impl AutoScheduleFrequency {
    pub fn new(days_of_week: impl IntoIterator<Item = Weekday>, times_of_day: impl IntoIterator<Item = NaiveTime>) -> Self {
        let mut days: Vec<Weekday> = Vec::new();
        for day in days_of_week {
            if !days.contains(&day) {
                days.push(day);
            }
        }
        Self {
            days_of_week: days,
            times_of_day: times_of_day.into_iter().collect(),
            scheduled_jobs: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AutoScheduleError> {
        if self.times_of_day.is_empty() {
            return Err(AutoScheduleError::NoTimesOfDay);
        }
        if self.days_of_week.is_empty() {
            return Err(AutoScheduleError::NoDaysOfWeek);
        }
        Ok(())
    }

    /// Same fire points, ignoring live job handles.
    pub fn same_schedule_as(&self, other: &AutoScheduleFrequency) -> bool {
        self.times_of_day == other.times_of_day
            && self.days_of_week.len() == other.days_of_week.len()
            && self.days_of_week.iter().all(|d| other.days_of_week.contains(d))
    }

    /// Delay and time of day for every configured time that has not yet
    /// elapsed today, given the installation-local wall clock `now`.
    /// Empty when today is not a scheduled weekday.
    pub fn scheduling_times_until_midnight(&self, now: NaiveDateTime) -> Vec<(Duration, NaiveTime)> {
        if !self.days_of_week.contains(&now.weekday()) {
            return Vec::new();
        }
        let current = now.time();
        self.times_of_day
            .iter()
            .filter(|time| **time > current)
            .filter_map(|time| {
                (*time - current)
                    .to_std()
                    .ok()
                    .map(|delay| (delay, *time))
            })
            .collect()
    }

    pub fn has_job(&self, time: &NaiveTime) -> bool {
        self.scheduled_jobs.contains_key(time)
    }
}

/// Reusable mission template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub id: MissionDefinitionId,
    pub name: String,
    pub installation_code: String,
    pub inspection_area_id: Option<InspectionAreaId>,
    /// Identifier in the external mission source
    pub source_id: String,
    pub auto_schedule_frequency: Option<AutoScheduleFrequency>,
    #[serde(default)]
    pub is_deprecated: bool,
}

impl MissionDefinition {
    pub fn new(
        name: impl Into<String>,
        installation_code: impl Into<String>,
        inspection_area_id: Option<InspectionAreaId>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: MissionDefinitionId::new(),
            name: name.into(),
            installation_code: installation_code.into(),
            inspection_area_id,
            source_id: source_id.into(),
            auto_schedule_frequency: None,
            is_deprecated: false,
        }
    }

    pub fn with_frequency(mut self, frequency: AutoScheduleFrequency) -> Self {
        self.auto_schedule_frequency = Some(frequency);
        self
    }
}
