// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background job scheduling port.
//!
//! The auto scheduler registers deferred callbacks through this trait and
//! keeps only the returned [`JobHandle`]. Whether the implementation is an
//! in-process timer or a durable external scheduler is invisible to callers.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identifier of a scheduled background job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait JobScheduler: Send + Sync {
    /// Run `job` once after `delay`.
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>) -> JobHandle;

    /// Cancel a job that has not fired yet. Returns `false` if the handle is
    /// unknown or the job already ran.
    fn cancel(&self, handle: &JobHandle) -> bool;
}
