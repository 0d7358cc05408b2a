// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Mission Run
//!
//! PostgreSQL persistence for mission runs. Tasks and their inspections are
//! stored as one JSONB document per run so that task order survives a
//! round-trip unchanged.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `MissionRunRepository` over PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::area::InspectionAreaId;
use crate::domain::auto_schedule::MissionDefinitionId;
use crate::domain::mission::{MissionRun, MissionRunId, MissionRunType, MissionStatus, MissionTask};
use crate::domain::repository::{MissionRunQuery, MissionRunRepository, RepositoryError};
use crate::domain::robot::RobotId;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, name, robot_id, installation_code, inspection_area_id,
        mission_definition_id, run_type, status, desired_start_time,
        start_time, end_time, tasks, external_mission_id,
        error_reason, error_description
    FROM mission_runs
"#;

pub struct PostgresMissionRunRepository {
    pool: PgPool,
}

impl PostgresMissionRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mission_runs (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                robot_id UUID NOT NULL,
                installation_code TEXT NOT NULL,
                inspection_area_id UUID,
                mission_definition_id UUID,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL,
                desired_start_time TIMESTAMPTZ NOT NULL,
                start_time TIMESTAMPTZ,
                end_time TIMESTAMPTZ,
                tasks JSONB NOT NULL,
                external_mission_id TEXT,
                error_reason TEXT,
                error_description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS mission_runs_robot_status_idx ON mission_runs (robot_id, status, desired_start_time)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS mission_runs_external_id_idx ON mission_runs (external_mission_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MissionRunRepository for PostgresMissionRunRepository {
    async fn save(&self, run: &MissionRun) -> Result<(), RepositoryError> {
        let tasks_json = serde_json::to_value(run.tasks())?;

        sqlx::query(
            r#"
            INSERT INTO mission_runs (
                id, name, robot_id, installation_code, inspection_area_id,
                mission_definition_id, run_type, status, desired_start_time,
                start_time, end_time, tasks, external_mission_id,
                error_reason, error_description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                start_time = EXCLUDED.start_time,
                end_time = EXCLUDED.end_time,
                tasks = EXCLUDED.tasks,
                external_mission_id = EXCLUDED.external_mission_id,
                error_reason = EXCLUDED.error_reason,
                error_description = EXCLUDED.error_description
            "#,
        )
        .bind(run.id.0)
        .bind(&run.name)
        .bind(run.robot_id.0)
        .bind(&run.installation_code)
        .bind(run.inspection_area_id.map(|a| a.0))
        .bind(run.mission_definition_id.map(|d| d.0))
        .bind(run.run_type.as_str())
        .bind(run.status.as_str())
        .bind(run.desired_start_time)
        .bind(run.start_time)
        .bind(run.end_time)
        .bind(tasks_json)
        .bind(run.external_mission_id.as_deref())
        .bind(run.error_reason.as_deref())
        .bind(run.error_description.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save mission run: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: MissionRunId) -> Result<Option<MissionRun>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(parse_mission_run_row).transpose()
    }

    async fn find_by_external_mission_id(&self, external_id: &str) -> Result<Option<MissionRun>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE external_mission_id = $1 LIMIT 1"))
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(parse_mission_run_row).transpose()
    }

    async fn find_by_robot(&self, robot_id: RobotId, query: &MissionRunQuery) -> Result<Vec<MissionRun>, RepositoryError> {
        let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(&format!(
            r#"{SELECT_COLUMNS}
            WHERE robot_id = $1
              AND (cardinality($2::text[]) = 0 OR status = ANY($2))
              AND ($3::text IS NULL OR run_type = $3)
            ORDER BY desired_start_time ASC, id ASC"#
        ))
        .bind(robot_id.0)
        .bind(&statuses)
        .bind(query.run_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_mission_run_row).collect()
    }
}

fn parse_mission_run_row(row: PgRow) -> Result<MissionRun, RepositoryError> {
    let run_type: String = row.try_get("run_type")?;
    let run_type = MissionRunType::parse(&run_type)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown run type '{}'", run_type)))?;
    let status: String = row.try_get("status")?;
    let status = MissionStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown mission status '{}'", status)))?;
    let tasks: serde_json::Value = row.try_get("tasks")?;
    let tasks: Vec<MissionTask> = serde_json::from_value(tasks)?;

    let inspection_area_id: Option<Uuid> = row.try_get("inspection_area_id")?;
    let mission_definition_id: Option<Uuid> = row.try_get("mission_definition_id")?;
    let desired_start_time: DateTime<Utc> = row.try_get("desired_start_time")?;

    Ok(MissionRun::from_parts(
        MissionRunId(row.try_get("id")?),
        row.try_get("name")?,
        RobotId(row.try_get("robot_id")?),
        row.try_get("installation_code")?,
        inspection_area_id.map(InspectionAreaId),
        mission_definition_id.map(MissionDefinitionId),
        run_type,
        status,
        desired_start_time,
        row.try_get("start_time")?,
        row.try_get("end_time")?,
        tasks,
        row.try_get("external_mission_id")?,
        row.try_get("error_reason")?,
        row.try_get("error_description")?,
    ))
}
