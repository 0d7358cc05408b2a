// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process [`JobScheduler`] backed by tokio timers.
//!
//! Each job is a spawned task that sleeps for its delay and then runs. A job
//! fires or is cancelled exactly once: whichever side removes the entry from
//! the job table first wins. Jobs are not persisted across restarts; the auto
//! scheduler re-registers them on startup.
//!
//! Must be used from within a tokio runtime.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::domain::jobs::{JobHandle, JobScheduler};

#[derive(Clone, Default)]
pub struct TokioJobScheduler {
    jobs: Arc<DashMap<String, CancellationToken>>,
    shutdown: CancellationToken,
}

impl TokioJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs that have neither fired nor been cancelled
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel every pending job
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs.clear();
    }
}

impl JobScheduler for TokioJobScheduler {
    fn schedule(&self, delay: Duration, job: BoxFuture<'static, ()>) -> JobHandle {
        let id = Uuid::new_v4().to_string();
        let token = self.shutdown.child_token();
        self.jobs.insert(id.clone(), token.clone());

        let jobs = self.jobs.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if jobs.remove(&job_id).is_some() {
                        debug!(job_id = %job_id, "Running scheduled job");
                        job.await;
                    }
                }
                _ = token.cancelled() => {
                    debug!(job_id = %job_id, "Scheduled job cancelled");
                }
            }
        });

        JobHandle(id)
    }

    fn cancel(&self, handle: &JobHandle) -> bool {
        match self.jobs.remove(&handle.0) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
