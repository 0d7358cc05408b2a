// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod event_bus;
pub mod isar_client;
pub mod job_scheduler;
pub mod repositories;
pub mod telemetry;

pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver, MissionRunEventReceiver};
