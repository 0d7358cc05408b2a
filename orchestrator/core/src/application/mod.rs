// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod auto_schedule;
pub mod connection_monitor;
pub mod dispatch;
pub mod dispatch_listener;
pub mod localization;
pub mod mission_queue;
pub mod mission_starter;
pub mod recovery;
pub mod repository_factory;
pub mod return_home;
pub mod services;
pub mod status_updates;

// Re-export services for convenience
pub use auto_schedule::AutoScheduler;
pub use connection_monitor::ConnectionMonitor;
pub use dispatch::{DispatchEngine, DispatchOutcome};
pub use dispatch_listener::DispatchListener;
pub use localization::LocalizationCoordinator;
pub use mission_queue::MissionQueueStore;
pub use recovery::RecoveryManager;
pub use return_home::ReturnHomeService;
pub use services::DispatchServices;
pub use status_updates::MissionStatusHandler;
