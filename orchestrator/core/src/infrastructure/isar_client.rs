// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! ISAR Robot Control Client
//!
//! HTTP implementation of [`RobotControl`] for robots running an ISAR-style
//! mission executor.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Translate start/stop/pause/resume into REST calls
//! - **Integration:** Dispatch core → `POST {isar_uri}/schedule/*` → robot
//!
//! # Status Mapping
//!
//! | Outcome | Error |
//! |---------|-------|
//! | transport failure | `Communication` |
//! | client timeout or HTTP 408 | `Timeout` |
//! | HTTP 409 | `Conflict` |
//! | any other non-success status | `Protocol` |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info};

use crate::domain::mission::{ExternalHandle, MissionRun, MissionTask, MissionTaskType, Pose};
use crate::domain::robot::Robot;
use crate::domain::robot_control::{RobotControl, RobotControlError};

const FRAME_NAME: &str = "robot";

// ============================================================================
// Wire Models
// ============================================================================

#[derive(Debug, Serialize)]
struct StartMissionRequest<'a> {
    mission_definition: IsarMissionDefinition<'a>,
}

#[derive(Debug, Serialize)]
struct IsarMissionDefinition<'a> {
    id: String,
    name: &'a str,
    tasks: Vec<IsarTaskDefinition<'a>>,
}

#[derive(Debug, Serialize)]
struct IsarTaskDefinition<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    task_type: &'static str,
    pose: IsarPose,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    inspections: Vec<IsarInspectionDefinition<'a>>,
}

#[derive(Debug, Serialize)]
struct IsarInspectionDefinition<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    inspection_type: String,
    metadata: HashMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct IsarPose {
    position: IsarVector,
    orientation: IsarQuaternion,
    frame_name: &'static str,
}

#[derive(Debug, Serialize)]
struct IsarVector {
    x: f64,
    y: f64,
    z: f64,
    frame_name: &'static str,
}

#[derive(Debug, Serialize)]
struct IsarQuaternion {
    x: f64,
    y: f64,
    z: f64,
    w: f64,
    frame_name: &'static str,
}

#[derive(Debug, Deserialize)]
struct StartMissionResponse {
    id: String,
}

impl From<&Pose> for IsarPose {
    fn from(pose: &Pose) -> Self {
        Self {
            position: IsarVector {
                x: pose.position.x,
                y: pose.position.y,
                z: pose.position.z,
                frame_name: FRAME_NAME,
            },
            orientation: IsarQuaternion {
                x: pose.orientation.x,
                y: pose.orientation.y,
                z: pose.orientation.z,
                w: pose.orientation.w,
                frame_name: FRAME_NAME,
            },
            frame_name: FRAME_NAME,
        }
    }
}

fn task_type_name(task_type: MissionTaskType) -> &'static str {
    match task_type {
        MissionTaskType::Inspection => "inspection",
        MissionTaskType::Localization => "localization",
        MissionTaskType::ReturnHome => "return_to_home",
    }
}

fn task_definition<'a>(task: &'a MissionTask, run: &'a MissionRun) -> IsarTaskDefinition<'a> {
    IsarTaskDefinition {
        id: &task.external_task_id,
        task_type: task_type_name(task.task_type),
        pose: IsarPose::from(&task.robot_pose),
        tag: task.tag_id.as_deref(),
        inspections: task
            .inspections
            .iter()
            .map(|inspection| IsarInspectionDefinition {
                id: &inspection.external_step_id,
                inspection_type: format!("{:?}", inspection.inspection_type),
                metadata: HashMap::from([
                    ("mission_name", run.name.as_str()),
                    ("asset_code", run.installation_code.as_str()),
                ]),
            })
            .collect(),
    }
}

// ============================================================================
// Client Implementation
// ============================================================================

pub struct IsarRobotControl {
    client: Client,
    request_timeout: Duration,
}

impl IsarRobotControl {
    pub fn new(request_timeout: Duration) -> Result<Self, RobotControlError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RobotControlError::Communication(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, request_timeout })
    }

    fn url(robot: &Robot, path: &str) -> String {
        format!("{}/schedule/{}", robot.isar_uri.trim_end_matches('/'), path)
    }

    async fn post_command(&self, robot: &Robot, path: &str) -> Result<(), RobotControlError> {
        let url = Self::url(robot, path);
        info!(robot_id = %robot.id, url = %url, "Sending {} to robot", path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(response).await.map(|_| ())
    }

    fn transport_error(&self, err: reqwest::Error) -> RobotControlError {
        if err.is_timeout() {
            RobotControlError::Timeout(format!("no response within {:?}", self.request_timeout))
        } else {
            RobotControlError::Communication(err.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RobotControlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), body = %body, "Robot rejected request");
    Err(match status {
        StatusCode::REQUEST_TIMEOUT => {
            RobotControlError::Timeout("a timeout occurred when communicating with the robot state machine".into())
        }
        StatusCode::CONFLICT => RobotControlError::Conflict(format!(
            "the robot state machine does not allow this action in its current state: {}",
            body
        )),
        StatusCode::INTERNAL_SERVER_ERROR => RobotControlError::Protocol(format!("internal server error: {}", body)),
        other => RobotControlError::Protocol(format!("unexpected status code {}: {}", other.as_u16(), body)),
    })
}

#[async_trait]
impl RobotControl for IsarRobotControl {
    async fn start(&self, robot: &Robot, mission_run: &MissionRun) -> Result<ExternalHandle, RobotControlError> {
        let url = Self::url(robot, "start-mission");
        let request = StartMissionRequest {
            mission_definition: IsarMissionDefinition {
                id: mission_run.id.to_string(),
                name: &mission_run.name,
                tasks: mission_run
                    .tasks()
                    .iter()
                    .map(|task| task_definition(task, mission_run))
                    .collect(),
            },
        };

        info!(robot_id = %robot.id, mission_run_id = %mission_run.id, url = %url, "Starting mission on robot");
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = check_status(response).await?;
        let body: StartMissionResponse = response
            .json()
            .await
            .map_err(|e| RobotControlError::Protocol(format!("invalid start-mission response: {}", e)))?;

        info!(robot_id = %robot.id, external_mission_id = %body.id, "Mission started on robot");
        Ok(ExternalHandle {
            external_mission_id: body.id,
        })
    }

    async fn stop(&self, robot: &Robot) -> Result<(), RobotControlError> {
        self.post_command(robot, "stop-mission").await
    }

    async fn pause(&self, robot: &Robot) -> Result<(), RobotControlError> {
        self.post_command(robot, "pause-mission").await
    }

    async fn resume(&self, robot: &Robot) -> Result<(), RobotControlError> {
        self.post_command(robot, "resume-mission").await
    }
}
