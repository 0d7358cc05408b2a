// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Geofence Engine
//!
//! Point-in-prism containment for inspection and exclusion areas, using the
//! crossing-number (ray casting) test over the polygon edges.
//!
//! Points lying exactly on an edge are not special-cased. The half-open
//! comparison makes the answer deterministic, but which side a boundary point
//! falls on depends on vertex ordering.

use tracing::warn;

use crate::domain::area::{AreaPolygon, ExclusionArea};
use crate::domain::mission::{MissionTask, Position};

/// Whether `point` lies inside `polygon` and within `[z_min, z_max]`.
///
/// A missing or empty polygon is unbounded and contains every point.
pub fn contains(polygon: Option<&AreaPolygon>, point: &Position) -> bool {
    let Some(polygon) = polygon else {
        return true;
    };
    let vertices = &polygon.positions;
    if vertices.is_empty() {
        return true;
    }
    if point.z < polygon.z_min || point.z > polygon.z_max {
        return false;
    }

    let (x, y) = (point.x, point.y);
    let n = vertices.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (vertices[i].x, vertices[i].y);
        let (xj, yj) = (vertices[j].x, vertices[j].y);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether every task pose lies inside `polygon`. Stops at the first task
/// outside and logs it.
pub fn all_tasks_contained(tasks: &[MissionTask], polygon: Option<&AreaPolygon>) -> bool {
    for task in tasks {
        if !contains(polygon, &task.robot_pose.position) {
            let p = task.robot_pose.position;
            warn!(
                task_id = %task.id.0,
                tag_id = task.tag_id.as_deref().unwrap_or("-"),
                x = p.x,
                y = p.y,
                z = p.z,
                "Task pose is outside the inspection area"
            );
            return false;
        }
    }
    true
}

/// Drop every task whose pose lies in any of `exclusion_areas`.
pub fn filter_out_excluded(tasks: Vec<MissionTask>, exclusion_areas: &[ExclusionArea]) -> Vec<MissionTask> {
    tasks
        .into_iter()
        .filter(|task| {
            !exclusion_areas
                .iter()
                .any(|area| contains(Some(&area.polygon), &task.robot_pose.position))
        })
        .collect()
}
