// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod area;
pub mod auto_schedule;
pub mod dispatch_config;
pub mod errors;
pub mod events;
pub mod geofence;
pub mod jobs;
pub mod mission;
pub mod mission_source;
pub mod precondition;
pub mod repository;
pub mod robot;
pub mod robot_control;
