// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::mission::MissionTask;

#[derive(Debug, Error)]
pub enum MissionSourceError {
    #[error("mission source {0} not found")]
    NotFound(String),

    #[error("mission source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid mission source content: {0}")]
    Invalid(String),
}

/// Loads the task list of a mission definition from its external source.
#[async_trait]
pub trait MissionSourceLoader: Send + Sync {
    async fn load_tasks(&self, source_id: &str) -> Result<Vec<MissionTask>, MissionSourceError>;
}
