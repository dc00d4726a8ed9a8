//! Session state machine.
//!
//! `SessionRunner` is the sole writer of [`SessionState`]. State never
//! changes optimistically: a `set-state` push from the authority turns
//! into a `set-scene` request, and only a successful acknowledgment
//! commits the transition and publishes [`StateChanged`]. Consumers use
//! `(old, new)` to decide between unload-then-reload, unload-only and
//! no-op — the rules live in [`should_unload`] / [`should_load`] so that
//! every manager clears on exactly the same conditions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tabletop_core::{GridData, SceneData};

use crate::bus::EventBus;
use crate::client::Authority;
use crate::messages::UiMessage;
use crate::protocol::{AckBody, RequestBody};

/// The active scene id (if any) and whether non-masters follow it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub scene: Option<String>,
    pub synced: bool,
}

impl SessionState {
    pub fn new(scene: Option<String>, synced: bool) -> Self {
        Self { scene, synced }
    }

    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }
}

/// Who this client is within the session.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Client-generated identity, sent as the actor on echoing
    /// operations so the originator can recognize its own pushes.
    pub user_id: Uuid,
    pub username: String,
    /// Masters hold scene-edit authority and ignore the synced flag.
    pub is_master: bool,
}

impl ClientInfo {
    pub fn master(username: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: username.into(),
            is_master: true,
        }
    }

    pub fn player(username: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: username.into(),
            is_master: false,
        }
    }
}

// ── Bus events ──────────────────────────────────────────────────────

/// A confirmed session transition. Never published for spurious
/// (no-change) transitions.
#[derive(Debug, Clone)]
pub struct StateChanged {
    pub old: SessionState,
    pub new: SessionState,
}

/// Scene payload arrived; managers repopulate from it.
#[derive(Debug, Clone)]
pub struct SceneLoaded {
    pub scene: SceneData,
}

#[derive(Debug, Clone)]
pub struct GridChanged {
    pub grid: GridData,
}

#[derive(Debug, Clone)]
pub struct LandingPageChanged {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct UserConnected {
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct UserDisconnected {
    pub username: String,
}

/// Whether a transition requires dropping cached scene entities.
///
/// Masters track only the scene id. Non-masters additionally unload the
/// moment syncing is switched off, so stale content is never left
/// visible.
pub fn should_unload(old: &SessionState, new: &SessionState, is_master: bool) -> bool {
    if !is_master && old.synced && !new.synced {
        return true;
    }
    old.scene != new.scene
}

/// Whether a committed transition should be followed by a scene load.
///
/// Non-masters reload whenever they are synced onto a scene (sync being
/// re-enabled re-delivers the same scene); masters only on an actual
/// scene change.
pub fn should_load(old: &SessionState, new: &SessionState, is_master: bool) -> bool {
    match &new.scene {
        None => false,
        Some(scene) => {
            if is_master {
                old.scene.as_deref() != Some(scene.as_str())
            } else {
                new.synced
            }
        }
    }
}

/// Owns the session state and the scene settings cache.
pub struct SessionRunner<A: Authority> {
    authority: Arc<A>,
    bus: EventBus,
    info: ClientInfo,
    state: Mutex<SessionState>,
    settings: Mutex<Option<SceneData>>,
    /// Transition generation; stale request continuations bail out.
    generation: AtomicU64,
}

impl<A: Authority> SessionRunner<A> {
    pub fn new(authority: Arc<A>, bus: EventBus, info: ClientInfo) -> Arc<Self> {
        Arc::new(Self {
            authority,
            bus,
            info,
            state: Mutex::new(SessionState::default()),
            settings: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    pub fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Settings of the currently loaded scene, if one is loaded.
    pub fn scene_settings(&self) -> Option<SceneData> {
        self.settings.lock().unwrap().clone()
    }

    /// Authority announced a session transition. Confirm it with
    /// `set-scene`; commit and publish only on success.
    pub async fn handle_set_state(&self, scene: Option<String>, synced: bool) {
        let new = SessionState::new(scene, synced);
        let old = self.state();
        if old == new {
            log::debug!("suppressing spurious session transition");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ack = match self
            .authority
            .request(RequestBody::SetScene {
                scene: new.scene.clone(),
            })
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                log::debug!("set-scene dropped: {err}");
                return;
            }
        };
        if !ack.success {
            self.surface_rejection(ack.error_message());
            return;
        }
        // A newer set-state may have raced this acknowledgment.
        if self.generation.load(Ordering::SeqCst) != generation {
            log::debug!("discarding stale set-scene acknowledgment");
            return;
        }

        *self.state.lock().unwrap() = new.clone();
        if should_unload(&old, &new, self.info.is_master) {
            self.settings.lock().unwrap().take();
        }
        self.bus.publish(&StateChanged {
            old: old.clone(),
            new: new.clone(),
        });

        if should_load(&old, &new, self.info.is_master) {
            if let Some(scene_id) = new.scene {
                self.load_scene(scene_id).await;
            }
        }
    }

    /// Fetch the scene payload and publish [`SceneLoaded`]. A resume
    /// after the active scene moved on is discarded as stale.
    pub async fn load_scene(&self, scene_id: String) {
        self.bus.publish(&UiMessage::new("Loading scene"));
        let ack = match self
            .authority
            .request(RequestBody::GetScene {
                scene: scene_id.clone(),
            })
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                log::debug!("get-scene dropped: {err}");
                return;
            }
        };
        if !ack.success {
            self.surface_rejection(ack.error_message());
            return;
        }
        if self.state.lock().unwrap().scene.as_deref() != Some(scene_id.as_str()) {
            log::debug!("discarding scene payload for inactive scene {scene_id}");
            return;
        }
        let AckBody::Scene(mut scene) = ack.body else {
            log::warn!("get-scene acknowledged without a scene payload");
            return;
        };
        scene.id = scene_id;
        *self.settings.lock().unwrap() = Some(scene.clone());
        self.bus.publish(&SceneLoaded { scene });
    }

    /// Grid settings changed remotely.
    pub fn handle_grid(&self, grid: GridData) {
        if let Some(settings) = self.settings.lock().unwrap().as_mut() {
            settings.grid = grid.clone();
        }
        self.bus.publish(&GridChanged { grid });
    }

    pub fn handle_landing_page(&self, id: String) {
        self.bus.publish(&LandingPageChanged { id });
    }

    pub fn handle_user_connected(&self, username: String) {
        self.bus
            .publish(&UiMessage::new(format!("{username} connected")));
        self.bus.publish(&UserConnected { username });
    }

    pub fn handle_user_disconnected(&self, username: String) {
        self.bus
            .publish(&UiMessage::new(format!("{username} disconnected")));
        self.bus.publish(&UserDisconnected { username });
    }

    fn surface_rejection(&self, reason: Option<&str>) {
        let text = reason.unwrap_or("Request rejected").to_owned();
        self.bus.publish(&UiMessage { text });
    }
}
