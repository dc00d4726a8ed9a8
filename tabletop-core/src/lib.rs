//! # tabletop-core — shared data model for the Tabletop client
//!
//! Plain serde-derived records describing everything the scene
//! synchronization layer moves over the wire: scenes, walls, lights,
//! light presets, tokens and the blueprint folder tree.
//!
//! The types here carry no behavior beyond small constructors and the
//! path arithmetic in [`path`]. All mutation policy (who may change
//! what, and when) lives in `tabletop-sync`.

use serde::{Deserialize, Serialize};

pub mod lighting;
pub mod path;
pub mod scene;
pub mod token;

pub use lighting::{EffectKind, LightData, LightEffect, LightingSettings, PresetData};
pub use path::{FolderPath, PathIndex};
pub use scene::{GridData, SceneData, WallData, WallType};
pub use token::{MovementData, Permission, PermissionRole, TokenData, TokenType};

/// 2D point in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// RGBA color, components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
