//! Token cache and reconciliation.
//!
//! Tokens carry the richest operation surface: besides the usual
//! create/modify/remove they have targeted micro-operations (movement,
//! rotation, lock, visibility, health, elevation, conditions) that
//! mutate a single field and publish a narrow event, so the presentation
//! layer can animate exactly what changed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tabletop_core::{MovementData, TokenData};

use crate::bus::{EventBus, Subscription};
use crate::client::Authority;
use crate::managers::surface_rejection;
use crate::protocol::{AckBody, RequestBody, ServerPush};
use crate::session::{should_unload, ClientInfo, StateChanged};

// ── Domain events ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TokenCreated {
    pub token: TokenData,
}

#[derive(Debug, Clone)]
pub struct TokenModified {
    pub token: TokenData,
}

#[derive(Debug, Clone)]
pub struct TokenMoved {
    pub id: String,
    pub movement: MovementData,
}

#[derive(Debug, Clone)]
pub struct TokenRotated {
    pub id: String,
    pub angle: f32,
    /// User who rotated; lets the originator skip its own echo.
    pub actor: String,
}

#[derive(Debug, Clone)]
pub struct TokenLightRotated {
    pub id: String,
    pub angle: f32,
    pub actor: String,
}

#[derive(Debug, Clone)]
pub struct TokenLocked {
    pub id: String,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct TokenVisibilityChanged {
    pub id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct TokenHealthChanged {
    pub id: String,
    pub health: i32,
}

#[derive(Debug, Clone)]
pub struct TokenElevationChanged {
    pub id: String,
    pub elevation: i32,
}

#[derive(Debug, Clone)]
pub struct TokenConditionsChanged {
    pub id: String,
    pub conditions: u32,
}

#[derive(Debug, Clone)]
pub struct TokenRemoved {
    pub id: String,
}

pub struct TokenManager<A: Authority> {
    authority: Arc<A>,
    bus: EventBus,
    info: ClientInfo,
    tokens: Mutex<HashMap<String, TokenData>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl<A: Authority> TokenManager<A> {
    pub fn new(authority: Arc<A>, bus: EventBus, info: ClientInfo) -> Arc<Self> {
        Arc::new(Self {
            authority,
            bus,
            info,
            tokens: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn activate(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let on_state = self.bus.subscribe(move |event: &StateChanged| {
            if let Some(manager) = weak.upgrade() {
                if should_unload(&event.old, &event.new, manager.info.is_master) {
                    manager.unload();
                }
            }
        });
        self.subscriptions.lock().unwrap().push(on_state);
    }

    pub fn deactivate(&self) {
        self.subscriptions.lock().unwrap().clear();
    }

    pub fn get(&self, id: &str) -> Option<TokenData> {
        self.tokens.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().unwrap().is_empty()
    }

    fn contains(&self, id: &str) -> bool {
        self.tokens.lock().unwrap().contains_key(id)
    }

    // ── Local operations ────────────────────────────────────────────

    pub async fn create(&self, data: TokenData) -> Option<String> {
        match self
            .authority
            .request(RequestBody::CreateToken { data: data.clone() })
            .await
        {
            Ok(ack) if ack.success => {
                let mut token = data;
                if let AckBody::Id(id) = ack.body {
                    token.id = id;
                }
                let id = token.id.clone();
                self.apply_create(token);
                Some(id)
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-token dropped: {err}");
                None
            }
        }
    }

    pub async fn modify(&self, id: &str, data: TokenData) {
        if !self.contains(id) {
            log::debug!("modify for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ModifyToken {
                id: id.to_owned(),
                data: data.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_modify(id, data),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("modify-token dropped: {err}"),
        }
    }

    pub async fn remove(&self, id: &str) {
        if !self.contains(id) {
            log::debug!("remove for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RemoveToken { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove(id),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-token dropped: {err}"),
        }
    }

    /// Move along waypoints; the final waypoint becomes the position.
    pub async fn move_token(&self, id: &str, movement: MovementData) {
        if !self.contains(id) {
            log::debug!("move for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::MoveToken {
                id: id.to_owned(),
                movement: movement.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_move(id, movement),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("move-token dropped: {err}"),
        }
    }

    pub async fn rotate(&self, id: &str, angle: f32) {
        if !self.contains(id) {
            log::debug!("rotate for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RotateToken {
                id: id.to_owned(),
                angle,
            })
            .await
        {
            Ok(ack) if ack.success => {
                self.apply_rotate(id, angle, &self.info.user_id.to_string())
            }
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("rotate-token dropped: {err}"),
        }
    }

    /// Rotate the light the token carries, not the token itself.
    pub async fn rotate_light(&self, id: &str, angle: f32) {
        if !self.contains(id) {
            log::debug!("rotate-light for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RotateTokenLight {
                id: id.to_owned(),
                angle,
                actor: self.info.user_id.to_string(),
            })
            .await
        {
            Ok(ack) if ack.success => {
                self.apply_rotate_light(id, angle, &self.info.user_id.to_string())
            }
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("rotate-token-light dropped: {err}"),
        }
    }

    pub async fn set_locked(&self, id: &str, locked: bool) {
        if !self.contains(id) {
            log::debug!("lock for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::LockToken {
                id: id.to_owned(),
                locked,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_lock(id, locked),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("lock-token dropped: {err}"),
        }
    }

    pub async fn set_visibility(&self, id: &str, enabled: bool) {
        if !self.contains(id) {
            log::debug!("visibility for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::UpdateVisibility {
                id: id.to_owned(),
                enabled,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_visibility(id, enabled),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("update-visibility dropped: {err}"),
        }
    }

    pub async fn set_health(&self, id: &str, health: i32) {
        if !self.contains(id) {
            log::debug!("health for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::UpdateHealth {
                id: id.to_owned(),
                health,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_health(id, health),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("update-health dropped: {err}"),
        }
    }

    pub async fn set_elevation(&self, id: &str, elevation: i32) {
        if !self.contains(id) {
            log::debug!("elevation for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::UpdateElevation {
                id: id.to_owned(),
                elevation,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_elevation(id, elevation),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("update-elevation dropped: {err}"),
        }
    }

    pub async fn set_conditions(&self, id: &str, conditions: u32) {
        if !self.contains(id) {
            log::debug!("conditions for unknown token {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::UpdateConditions {
                id: id.to_owned(),
                conditions,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_conditions(id, conditions),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("update-conditions dropped: {err}"),
        }
    }

    // ── Reconciliation ──────────────────────────────────────────────

    pub fn apply_create(&self, token: TokenData) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.id.clone(), token.clone());
        self.bus.publish(&TokenCreated { token });
    }

    pub fn apply_modify(&self, id: &str, mut token: TokenData) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            if !tokens.contains_key(id) {
                log::debug!("modify for unknown token {id}");
                return;
            }
            token.id = id.to_owned();
            tokens.insert(id.to_owned(), token.clone());
        }
        self.bus.publish(&TokenModified { token });
    }

    pub fn apply_move(&self, id: &str, movement: MovementData) {
        let Some(destination) = movement.destination() else {
            log::debug!("move for token {id} without waypoints");
            return;
        };
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.position = destination,
                None => {
                    log::debug!("move for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenMoved {
            id: id.to_owned(),
            movement,
        });
    }

    pub fn apply_rotate(&self, id: &str, angle: f32, actor: &str) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.rotation = angle,
                None => {
                    log::debug!("rotate for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenRotated {
            id: id.to_owned(),
            angle,
            actor: actor.to_owned(),
        });
    }

    pub fn apply_rotate_light(&self, id: &str, angle: f32, actor: &str) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.light_rotation = angle,
                None => {
                    log::debug!("rotate-light for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenLightRotated {
            id: id.to_owned(),
            angle,
            actor: actor.to_owned(),
        });
    }

    pub fn apply_lock(&self, id: &str, locked: bool) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.locked = locked,
                None => {
                    log::debug!("lock for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenLocked {
            id: id.to_owned(),
            locked,
        });
    }

    pub fn apply_visibility(&self, id: &str, enabled: bool) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.enabled = enabled,
                None => {
                    log::debug!("visibility for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenVisibilityChanged {
            id: id.to_owned(),
            enabled,
        });
    }

    pub fn apply_health(&self, id: &str, health: i32) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.health = health,
                None => {
                    log::debug!("health for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenHealthChanged {
            id: id.to_owned(),
            health,
        });
    }

    pub fn apply_elevation(&self, id: &str, elevation: i32) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.elevation = elevation,
                None => {
                    log::debug!("elevation for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenElevationChanged {
            id: id.to_owned(),
            elevation,
        });
    }

    pub fn apply_conditions(&self, id: &str, conditions: u32) {
        {
            let mut tokens = self.tokens.lock().unwrap();
            match tokens.get_mut(id) {
                Some(token) => token.conditions = conditions,
                None => {
                    log::debug!("conditions for unknown token {id}");
                    return;
                }
            }
        }
        self.bus.publish(&TokenConditionsChanged {
            id: id.to_owned(),
            conditions,
        });
    }

    pub fn apply_remove(&self, id: &str) {
        if self.tokens.lock().unwrap().remove(id).is_none() {
            log::debug!("remove for unknown token {id}");
            return;
        }
        self.bus.publish(&TokenRemoved { id: id.to_owned() });
    }

    pub fn handle_push(&self, push: &ServerPush) {
        match push {
            ServerPush::CreateToken { data } => self.apply_create(data.clone()),
            ServerPush::ModifyToken { id, data } => self.apply_modify(id, data.clone()),
            ServerPush::MoveToken { id, movement } => self.apply_move(id, movement.clone()),
            ServerPush::RotateToken { id, angle, actor } => self.apply_rotate(id, *angle, actor),
            ServerPush::RotateTokenLight { id, angle, actor } => {
                self.apply_rotate_light(id, *angle, actor)
            }
            ServerPush::LockToken { id, locked } => self.apply_lock(id, *locked),
            ServerPush::UpdateVisibility { id, enabled } => self.apply_visibility(id, *enabled),
            ServerPush::UpdateHealth { id, health } => self.apply_health(id, *health),
            ServerPush::UpdateElevation { id, elevation } => self.apply_elevation(id, *elevation),
            ServerPush::UpdateConditions { id, conditions } => {
                self.apply_conditions(id, *conditions)
            }
            ServerPush::RemoveToken { id } => self.apply_remove(id),
            _ => {}
        }
    }

    fn unload(&self) {
        self.tokens.lock().unwrap().clear();
    }
}
