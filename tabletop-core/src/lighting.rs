//! Light sources and reusable light presets.
//!
//! A scene light is a positioned emitter; a preset is a named bundle of
//! radius/color/effect settings that tokens and lights reference by id.

use serde::{Deserialize, Serialize};

use crate::{Color, Vec2};

/// Scene-wide darkness settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingSettings {
    pub enabled: bool,
    /// When set, the whole scene is lit and individual sources only add flair.
    pub global_lighting: bool,
    pub color: Color,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            global_lighting: true,
            color: Color::default(),
        }
    }
}

/// Animated effect applied to a light source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    NoEffect,
    Flicker,
    Pulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightEffect {
    pub kind: EffectKind,
    pub strength: f32,
    pub frequency: f32,
}

impl Default for LightEffect {
    fn default() -> Self {
        Self {
            kind: EffectKind::NoEffect,
            strength: 0.0,
            frequency: 0.0,
        }
    }
}

/// A positioned light source within a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightData {
    /// Server-assigned identifier.
    pub id: String,
    pub position: Vec2,
    pub rotation: f32,
    pub radius: f32,
    pub intensity: f32,
    pub color: Color,
    pub effect: LightEffect,
    pub flicker_frequency: f32,
    pub flicker_amount: f32,
    pub pulse_interval: f32,
    pub pulse_amount: f32,
    pub enabled: bool,
}

impl LightData {
    /// A fresh, disabled light at `position` with the stock parameters
    /// used when the user drops a new source into the scene.
    pub fn at(position: Vec2) -> Self {
        Self {
            id: String::new(),
            position,
            rotation: 0.0,
            radius: 20.0,
            intensity: 1.0,
            color: Color::default(),
            effect: LightEffect::default(),
            flicker_frequency: 15.0,
            flicker_amount: 0.1,
            pulse_interval: 2.0,
            pulse_amount: 0.6,
            enabled: false,
        }
    }
}

/// Named, reusable light configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetData {
    pub id: String,
    pub name: String,
    pub radius: f32,
    /// Cone angle in degrees; 360 for omnidirectional.
    pub angle: i32,
    pub color: Color,
    pub effect: LightEffect,
}

impl PresetData {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            radius: 20.0,
            angle: 360,
            color: Color::default(),
            effect: LightEffect::default(),
        }
    }
}
