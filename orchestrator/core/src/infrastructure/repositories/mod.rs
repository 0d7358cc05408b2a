// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresMissionRunRepository** - Mission run state, tasks as JSONB
//!
//! ## In-Memory Repositories
//!
//! Lightweight implementations for testing and development:
//! - **InMemoryRobotRepository**
//! - **InMemoryMissionRunRepository**
//! - **InMemoryAreaRepository**
//! - **InMemoryMissionDefinitionRepository**

pub mod postgres_mission_run;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::area::{Deck, DeckId, ExclusionArea, InspectionArea, InspectionAreaId};
use crate::domain::auto_schedule::{MissionDefinition, MissionDefinitionId};
use crate::domain::mission::{MissionRun, MissionRunId};
use crate::domain::repository::{
    AreaRepository, MissionDefinitionRepository, MissionRunQuery, MissionRunRepository, RepositoryError,
    RobotRepository,
};
use crate::domain::robot::{Robot, RobotId, RobotUpdate};

#[derive(Clone, Default)]
pub struct InMemoryRobotRepository {
    robots: Arc<RwLock<HashMap<RobotId, Robot>>>,
}

impl InMemoryRobotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RobotRepository for InMemoryRobotRepository {
    async fn save(&self, robot: &Robot) -> Result<(), RepositoryError> {
        self.robots.write().insert(robot.id, robot.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RobotId) -> Result<Option<Robot>, RepositoryError> {
        Ok(self.robots.read().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Robot>, RepositoryError> {
        let mut robots: Vec<Robot> = self.robots.read().values().cloned().collect();
        robots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(robots)
    }

    async fn update(&self, id: RobotId, update: RobotUpdate) -> Result<Robot, RepositoryError> {
        let mut robots = self.robots.write();
        let robot = robots
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("robot {}", id)))?;
        robot.apply(&update);
        Ok(robot.clone())
    }

    async fn find_in_inspection_area(&self, area_id: InspectionAreaId) -> Result<Vec<Robot>, RepositoryError> {
        let mut robots: Vec<Robot> = self
            .robots
            .read()
            .values()
            .filter(|r| r.current_inspection_area_id == Some(area_id))
            .cloned()
            .collect();
        robots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(robots)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMissionRunRepository {
    runs: Arc<RwLock<HashMap<MissionRunId, MissionRun>>>,
}

impl InMemoryMissionRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionRunRepository for InMemoryMissionRunRepository {
    async fn save(&self, run: &MissionRun) -> Result<(), RepositoryError> {
        self.runs.write().insert(run.id, run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MissionRunId) -> Result<Option<MissionRun>, RepositoryError> {
        Ok(self.runs.read().get(&id).cloned())
    }

    async fn find_by_external_mission_id(&self, external_id: &str) -> Result<Option<MissionRun>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .values()
            .find(|r| r.external_mission_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_by_robot(&self, robot_id: RobotId, query: &MissionRunQuery) -> Result<Vec<MissionRun>, RepositoryError> {
        let mut runs: Vec<MissionRun> = self
            .runs
            .read()
            .values()
            .filter(|r| r.robot_id == robot_id && query.matches(r))
            .cloned()
            .collect();
        runs.sort_by_key(|r| (r.desired_start_time, r.id));
        Ok(runs)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAreaRepository {
    inspection_areas: Arc<RwLock<HashMap<InspectionAreaId, InspectionArea>>>,
    decks: Arc<RwLock<HashMap<DeckId, Deck>>>,
    exclusion_areas: Arc<RwLock<Vec<ExclusionArea>>>,
}

impl InMemoryAreaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AreaRepository for InMemoryAreaRepository {
    async fn save_inspection_area(&self, area: &InspectionArea) -> Result<(), RepositoryError> {
        self.inspection_areas.write().insert(area.id, area.clone());
        Ok(())
    }

    async fn save_deck(&self, deck: &Deck) -> Result<(), RepositoryError> {
        self.decks.write().insert(deck.id, deck.clone());
        Ok(())
    }

    async fn save_exclusion_area(&self, area: &ExclusionArea) -> Result<(), RepositoryError> {
        let mut areas = self.exclusion_areas.write();
        areas.retain(|a| a.id != area.id);
        areas.push(area.clone());
        Ok(())
    }

    async fn find_inspection_area(&self, id: InspectionAreaId) -> Result<Option<InspectionArea>, RepositoryError> {
        Ok(self.inspection_areas.read().get(&id).cloned())
    }

    async fn find_deck(&self, id: DeckId) -> Result<Option<Deck>, RepositoryError> {
        Ok(self.decks.read().get(&id).cloned())
    }

    async fn find_exclusion_areas(&self, installation_code: &str) -> Result<Vec<ExclusionArea>, RepositoryError> {
        Ok(self
            .exclusion_areas
            .read()
            .iter()
            .filter(|a| a.installation_code.eq_ignore_ascii_case(installation_code))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMissionDefinitionRepository {
    definitions: Arc<RwLock<HashMap<MissionDefinitionId, MissionDefinition>>>,
}

impl InMemoryMissionDefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MissionDefinitionRepository for InMemoryMissionDefinitionRepository {
    async fn save(&self, definition: &MissionDefinition) -> Result<(), RepositoryError> {
        self.definitions.write().insert(definition.id, definition.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: MissionDefinitionId) -> Result<Option<MissionDefinition>, RepositoryError> {
        Ok(self.definitions.read().get(&id).cloned())
    }

    async fn find_auto_scheduled(&self) -> Result<Vec<MissionDefinition>, RepositoryError> {
        let mut definitions: Vec<MissionDefinition> = self
            .definitions
            .read()
            .values()
            .filter(|d| !d.is_deprecated && d.auto_schedule_frequency.is_some())
            .cloned()
            .collect();
        definitions.sort_by_key(|d| d.id);
        Ok(definitions)
    }
}
