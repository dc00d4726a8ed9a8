//! Per-entity-kind reconciliation managers.
//!
//! Each manager owns the authoritative local cache for one entity kind
//! and is the only code that mutates it. Every public mutation follows
//! one pattern: issue the request, commit to the cache only on ack
//! success, publish the domain event, and surface exactly one user
//! message on rejection. The manager never stores speculative state —
//! optimistic rendering belongs to the presentation layer, which rolls
//! itself back when the domain event never arrives.
//!
//! Remote pushes land in the same `apply_*` functions used by the local
//! commit path, so confirmed-local and confirmed-remote changes converge
//! through identical cache-update logic.

mod blueprints;
mod lights;
mod tokens;
mod walls;

pub use blueprints::{
    BlueprintCreated, BlueprintManager, BlueprintModified, BlueprintRemoved, FolderCreated,
    FolderMoved, FolderRemoved, FolderRenamed,
};
pub use lights::{
    LightCreated, LightManager, LightModified, LightMoved, LightRemoved, LightToggled,
    PresetCreated, PresetModified, PresetRemoved,
};
pub use tokens::{
    TokenConditionsChanged, TokenCreated, TokenElevationChanged, TokenHealthChanged,
    TokenLightRotated, TokenLocked, TokenManager, TokenModified, TokenMoved, TokenRemoved,
    TokenRotated, TokenVisibilityChanged,
};
pub use walls::{WallCreated, WallManager, WallModified, WallRemoved};

use crate::bus::EventBus;
use crate::messages::UiMessage;
use crate::protocol::Ack;

/// Publish the single user-visible message for a rejected acknowledgment.
pub(crate) fn surface_rejection(bus: &EventBus, ack: &Ack) {
    let text = ack.error_message().unwrap_or("Request rejected").to_owned();
    bus.publish(&UiMessage { text });
}
