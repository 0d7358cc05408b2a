// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate root: one repository per
//! aggregate, interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `RobotRepository` | `Robot` | `InMemoryRobotRepository` |
//! | `MissionRunRepository` | `MissionRun` | `InMemoryMissionRunRepository`, `PostgresMissionRunRepository` |
//! | `AreaRepository` | `InspectionArea`, `Deck`, `ExclusionArea` | `InMemoryAreaRepository` |
//! | `MissionDefinitionRepository` | `MissionDefinition` | `InMemoryMissionDefinitionRepository` |
//!
//! No repository offers cross-aggregate transactions. Every mutation is a
//! single-aggregate save.

use async_trait::async_trait;

use crate::domain::area::{Deck, DeckId, ExclusionArea, InspectionArea, InspectionAreaId};
use crate::domain::auto_schedule::{MissionDefinition, MissionDefinitionId};
use crate::domain::mission::{MissionRun, MissionRunId, MissionRunType, MissionStatus};
use crate::domain::robot::{Robot, RobotId, RobotUpdate};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Filter for mission runs of one robot
#[derive(Debug, Clone, Default)]
pub struct MissionRunQuery {
    /// Empty means any status
    pub statuses: Vec<MissionStatus>,
    pub run_type: Option<MissionRunType>,
}

impl MissionRunQuery {
    pub fn with_status(status: MissionStatus) -> Self {
        Self {
            statuses: vec![status],
            run_type: None,
        }
    }

    pub fn of_type(mut self, run_type: MissionRunType) -> Self {
        self.run_type = Some(run_type);
        self
    }

    pub fn matches(&self, run: &MissionRun) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&run.status))
            && self.run_type.is_none_or(|t| t == run.run_type)
    }
}

#[async_trait]
pub trait RobotRepository: Send + Sync {
    /// Save robot (create or update)
    async fn save(&self, robot: &Robot) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: RobotId) -> Result<Option<Robot>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Robot>, RepositoryError>;

    /// Apply one typed field update and return the updated robot
    async fn update(&self, id: RobotId, update: RobotUpdate) -> Result<Robot, RepositoryError>;

    /// Robots whose current inspection area is `area_id`
    async fn find_in_inspection_area(&self, area_id: InspectionAreaId) -> Result<Vec<Robot>, RepositoryError>;
}

#[async_trait]
pub trait MissionRunRepository: Send + Sync {
    /// Save mission run (create or update)
    async fn save(&self, run: &MissionRun) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MissionRunId) -> Result<Option<MissionRun>, RepositoryError>;

    /// Find the run started under the given executor-side mission id
    async fn find_by_external_mission_id(&self, external_id: &str) -> Result<Option<MissionRun>, RepositoryError>;

    /// Runs of one robot matching `query`, ordered by desired start time (earliest first)
    async fn find_by_robot(&self, robot_id: RobotId, query: &MissionRunQuery) -> Result<Vec<MissionRun>, RepositoryError>;
}

#[async_trait]
pub trait AreaRepository: Send + Sync {
    async fn save_inspection_area(&self, area: &InspectionArea) -> Result<(), RepositoryError>;

    async fn save_deck(&self, deck: &Deck) -> Result<(), RepositoryError>;

    async fn save_exclusion_area(&self, area: &ExclusionArea) -> Result<(), RepositoryError>;

    async fn find_inspection_area(&self, id: InspectionAreaId) -> Result<Option<InspectionArea>, RepositoryError>;

    async fn find_deck(&self, id: DeckId) -> Result<Option<Deck>, RepositoryError>;

    async fn find_exclusion_areas(&self, installation_code: &str) -> Result<Vec<ExclusionArea>, RepositoryError>;
}

#[async_trait]
pub trait MissionDefinitionRepository: Send + Sync {
    async fn save(&self, definition: &MissionDefinition) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: MissionDefinitionId) -> Result<Option<MissionDefinition>, RepositoryError>;

    /// Non-deprecated definitions that carry an auto-schedule frequency
    async fn find_auto_scheduled(&self) -> Result<Vec<MissionDefinition>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
