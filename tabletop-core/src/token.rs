//! Tokens: the movable pieces on the board.
//!
//! A token on the scene and a blueprint in the side panel share the same
//! record; blueprints additionally live in the folder tree (see [`crate::path`]).

use serde::{Deserialize, Serialize};

use crate::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Character,
    Mount,
    Item,
}

/// Per-user access level on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionRole {
    None,
    Observer,
    Controller,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub user: String,
    pub role: PermissionRole,
}

/// A token record, as cached by the client and exchanged with the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenData {
    /// Server-assigned identifier.
    pub id: String,
    pub name: String,
    /// Reference to the token's image asset.
    pub image: String,
    pub position: Vec2,
    /// Width and height in grid cells.
    pub dimensions: Vec2,
    pub kind: TokenType,
    pub permissions: Vec<Permission>,
    /// Preset id of the light this token carries; empty for none.
    pub light: String,
    /// Orientation of the carried light, independent of the token's own.
    pub light_rotation: f32,
    pub elevation: i32,
    pub health: i32,
    /// Bitfield of active status conditions.
    pub conditions: u32,
    pub rotation: f32,
    pub enabled: bool,
    pub locked: bool,
}

impl TokenData {
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: String::new(),
            position,
            dimensions: Vec2::new(1.0, 1.0),
            kind: TokenType::Character,
            permissions: Vec::new(),
            light: String::new(),
            light_rotation: 0.0,
            elevation: 0,
            health: 0,
            conditions: 0,
            rotation: 0.0,
            enabled: true,
            locked: false,
        }
    }
}

/// A confirmed movement: the waypoints the token travels through.
/// The final waypoint is the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementData {
    pub waypoints: Vec<Vec2>,
}

impl MovementData {
    pub fn new(waypoints: Vec<Vec2>) -> Self {
        Self { waypoints }
    }

    /// Where the movement ends, if it has any waypoints.
    pub fn destination(&self) -> Option<Vec2> {
        self.waypoints.last().copied()
    }
}
