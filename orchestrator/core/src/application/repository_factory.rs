// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure types.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Selects in-memory or PostgreSQL repositories at startup

use std::sync::Arc;

use crate::domain::repository::{
    AreaRepository, MissionDefinitionRepository, MissionRunRepository, RepositoryError, RobotRepository,
    StorageBackend,
};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::postgres_mission_run::PostgresMissionRunRepository;
use crate::infrastructure::repositories::{
    InMemoryAreaRepository, InMemoryMissionDefinitionRepository, InMemoryMissionRunRepository,
    InMemoryRobotRepository,
};

/// The repositories the dispatch core runs against
#[derive(Clone)]
pub struct Repositories {
    pub robots: Arc<dyn RobotRepository>,
    pub mission_runs: Arc<dyn MissionRunRepository>,
    pub areas: Arc<dyn AreaRepository>,
    pub mission_definitions: Arc<dyn MissionDefinitionRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            robots: Arc::new(InMemoryRobotRepository::new()),
            mission_runs: Arc::new(InMemoryMissionRunRepository::new()),
            areas: Arc::new(InMemoryAreaRepository::new()),
            mission_definitions: Arc::new(InMemoryMissionDefinitionRepository::new()),
        }
    }
}

/// Build every repository for `backend`.
///
/// With PostgreSQL the pool is opened and the mission-run schema migrated.
/// Robots, areas and mission definitions are owned by surrounding
/// administrative services and stay in memory here.
pub async fn create_repositories(backend: &StorageBackend) -> Result<Repositories, RepositoryError> {
    let mut repositories = Repositories::in_memory();
    if let StorageBackend::PostgreSQL(config) = backend {
        let database = Database::new(&config.connection_string)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        let repository = PostgresMissionRunRepository::new(database.get_pool().clone());
        repository.migrate().await?;
        repositories.mission_runs = Arc::new(repository);
    }
    Ok(repositories)
}
