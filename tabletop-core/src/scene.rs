//! Scene-level records: the scene itself, its walls and its grid.
//!
//! A scene is the unit the authority switches clients between. Wall and
//! grid records are part of the scene payload delivered by `get-scene`;
//! later edits arrive as individual push events.

use serde::{Deserialize, Serialize};

use crate::lighting::LightingSettings;
use crate::{Color, Vec2};

/// Wall classification — determines how vision and movement interact
/// with the segment chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallType {
    Wall,
    Door,
    Invisible,
    HiddenDoor,
}

/// A wall: an open polyline of scene-space points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallData {
    /// Server-assigned identifier, stable for the wall's lifetime.
    pub id: String,
    pub kind: WallType,
    /// Doors only: whether the door currently stands open.
    pub open: bool,
    pub points: Vec<Vec2>,
}

impl WallData {
    pub fn new(id: impl Into<String>, kind: WallType, points: Vec<Vec2>) -> Self {
        Self {
            id: id.into(),
            kind,
            open: false,
            points,
        }
    }
}

/// Grid overlay configuration for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridData {
    pub columns: u32,
    pub rows: u32,
    pub cell_size: f32,
    /// Offset of the grid origin from the scene origin.
    pub position: Vec2,
    pub color: Color,
}

impl Default for GridData {
    fn default() -> Self {
        Self {
            columns: 0,
            rows: 0,
            cell_size: 1.0,
            position: Vec2::default(),
            color: Color::default(),
        }
    }
}

/// Full scene payload as delivered by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub id: String,
    pub name: String,
    /// Reference to the background image asset.
    pub image: String,
    pub darkness: LightingSettings,
    pub walls: Vec<WallData>,
    pub grid: GridData,
}

impl SceneData {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
            darkness: LightingSettings::default(),
            walls: Vec::new(),
            grid: GridData::default(),
        }
    }
}
