// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fleet Dispatch Core
//!
//! Decides which mission run each inspection robot executes next, keeps
//! robots inside their inspection areas, and recovers interrupted work.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, dispatch services and their adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
