// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inspection areas, exclusion areas and decks.
//!
//! These entities are owned by administrative CRUD and are read-only from the
//! dispatch core's point of view.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::mission::Pose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InspectionAreaId(pub Uuid);

impl InspectionAreaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InspectionAreaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InspectionAreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeckId(pub Uuid);

impl DeckId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeckId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExclusionAreaId(pub Uuid);

impl ExclusionAreaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExclusionAreaId {
    fn default() -> Self {
        Self::new()
    }
}

/// Planar vertex of an area polygon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyPosition {
    pub x: f64,
    pub y: f64,
}

impl XyPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Prism bounded by a closed polygon in the plane and a height interval.
///
/// The polygon is closed implicitly: the last vertex connects to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPolygon {
    pub positions: Vec<XyPosition>,
    pub z_min: f64,
    pub z_max: f64,
}

impl AreaPolygon {
    pub fn new(positions: Vec<XyPosition>, z_min: f64, z_max: f64) -> Self {
        Self { positions, z_min, z_max }
    }

    pub fn from_points(points: &[(f64, f64)], z_min: f64, z_max: f64) -> Self {
        Self::new(points.iter().map(|&(x, y)| XyPosition::new(x, y)).collect(), z_min, z_max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    pub installation_code: String,
    pub default_localization_pose: Option<Pose>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionArea {
    pub id: InspectionAreaId,
    pub name: String,
    pub installation_code: String,
    pub plant_code: Option<String>,
    pub deck_id: Option<DeckId>,
    /// `None` means the area is unbounded
    pub polygon: Option<AreaPolygon>,
    pub default_localization_pose: Option<Pose>,
}

impl InspectionArea {
    pub fn new(name: impl Into<String>, installation_code: impl Into<String>) -> Self {
        Self {
            id: InspectionAreaId::new(),
            name: name.into(),
            installation_code: installation_code.into(),
            plant_code: None,
            deck_id: None,
            polygon: None,
            default_localization_pose: None,
        }
    }

    pub fn with_deck(mut self, deck_id: DeckId) -> Self {
        self.deck_id = Some(deck_id);
        self
    }

    pub fn with_polygon(mut self, polygon: AreaPolygon) -> Self {
        self.polygon = Some(polygon);
        self
    }

    pub fn with_default_localization_pose(mut self, pose: Pose) -> Self {
        self.default_localization_pose = Some(pose);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionArea {
    pub id: ExclusionAreaId,
    pub installation_code: String,
    pub plant_code: Option<String>,
    pub polygon: AreaPolygon,
}

impl ExclusionArea {
    pub fn new(installation_code: impl Into<String>, polygon: AreaPolygon) -> Self {
        Self {
            id: ExclusionAreaId::new(),
            installation_code: installation_code.into(),
            plant_code: None,
            polygon,
        }
    }
}
