// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Logging and metric names.
//!
//! Counters go through the `metrics` facade; installing an exporter is up to
//! the embedding service. Without one the calls are no-ops.

use anyhow::{Context, Result};

use crate::domain::dispatch_config::LoggingConfig;

pub const MISSIONS_STARTED_TOTAL: &str = "fleet_dispatch_missions_started_total";
pub const DISPATCH_DEFERRED_TOTAL: &str = "fleet_dispatch_dispatch_deferred_total";
pub const MISSIONS_ABORTED_TOTAL: &str = "fleet_dispatch_missions_aborted_total";
pub const LOST_CONNECTIONS_TOTAL: &str = "fleet_dispatch_lost_connections_total";
pub const AUTO_SCHEDULED_RUNS_TOTAL: &str = "fleet_dispatch_auto_scheduled_runs_total";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Register descriptions for every counter the dispatch core emits.
pub fn describe_metrics() {
    metrics::describe_counter!(MISSIONS_STARTED_TOTAL, "Mission runs started on a robot");
    metrics::describe_counter!(DISPATCH_DEFERRED_TOTAL, "Dispatch attempts deferred by a precondition");
    metrics::describe_counter!(MISSIONS_ABORTED_TOTAL, "Mission runs aborted by the dispatcher");
    metrics::describe_counter!(LOST_CONNECTIONS_TOTAL, "Robots marked offline after losing connection");
    metrics::describe_counter!(AUTO_SCHEDULED_RUNS_TOTAL, "Mission runs created by the auto scheduler");
}
