//! Light and light-preset caches.
//!
//! Scene lights and the shared preset library are reconciled by the same
//! manager: presets are referenced by id from tokens and lights, so they
//! clear and reload together with the scene content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tabletop_core::{LightData, PresetData, Vec2};

use crate::bus::{EventBus, Subscription};
use crate::client::Authority;
use crate::managers::surface_rejection;
use crate::protocol::{AckBody, RequestBody, ServerPush};
use crate::session::{should_unload, ClientInfo, StateChanged};

// ── Domain events ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LightCreated {
    pub light: LightData,
}

#[derive(Debug, Clone)]
pub struct LightModified {
    pub light: LightData,
}

#[derive(Debug, Clone)]
pub struct LightMoved {
    pub id: String,
    pub position: Vec2,
}

#[derive(Debug, Clone)]
pub struct LightToggled {
    pub id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct LightRemoved {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct PresetCreated {
    pub preset: PresetData,
}

#[derive(Debug, Clone)]
pub struct PresetModified {
    pub preset: PresetData,
}

#[derive(Debug, Clone)]
pub struct PresetRemoved {
    pub id: String,
}

pub struct LightManager<A: Authority> {
    authority: Arc<A>,
    bus: EventBus,
    info: ClientInfo,
    lights: Mutex<HashMap<String, LightData>>,
    presets: Mutex<HashMap<String, PresetData>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl<A: Authority> LightManager<A> {
    pub fn new(authority: Arc<A>, bus: EventBus, info: ClientInfo) -> Arc<Self> {
        Arc::new(Self {
            authority,
            bus,
            info,
            lights: Mutex::new(HashMap::new()),
            presets: Mutex::new(HashMap::new()),
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

    pub fn get(&self, id: &str) -> Option<LightData> {
        self.lights.lock().unwrap().get(id).cloned()
    }

    pub fn get_preset(&self, id: &str) -> Option<PresetData> {
        self.presets.lock().unwrap().get(id).cloned()
    }

    pub fn light_count(&self) -> usize {
        self.lights.lock().unwrap().len()
    }

    pub fn preset_count(&self) -> usize {
        self.presets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.lock().unwrap().is_empty() && self.presets.lock().unwrap().is_empty()
    }

    // ── Local operations ────────────────────────────────────────────

    pub async fn create(&self, data: LightData) -> Option<String> {
        match self
            .authority
            .request(RequestBody::CreateLight { data: data.clone() })
            .await
        {
            Ok(ack) if ack.success => {
                let mut light = data;
                if let AckBody::Id(id) = ack.body {
                    light.id = id;
                }
                let id = light.id.clone();
                self.apply_create(light);
                Some(id)
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-light dropped: {err}");
                None
            }
        }
    }

    pub async fn modify(&self, id: &str, data: LightData) {
        if !self.lights.lock().unwrap().contains_key(id) {
            log::debug!("modify for unknown light {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ModifyLight {
                id: id.to_owned(),
                data: data.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_modify(id, data),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("modify-light dropped: {err}"),
        }
    }

    pub async fn toggle(&self, id: &str, enabled: bool) {
        if !self.lights.lock().unwrap().contains_key(id) {
            log::debug!("toggle for unknown light {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ToggleLight {
                id: id.to_owned(),
                enabled,
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_toggle(id, enabled),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("toggle-light dropped: {err}"),
        }
    }

    pub async fn remove(&self, id: &str) {
        if !self.lights.lock().unwrap().contains_key(id) {
            log::debug!("remove for unknown light {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RemoveLight { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove(id),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-light dropped: {err}"),
        }
    }

    pub async fn create_preset(&self, data: PresetData) -> Option<String> {
        match self
            .authority
            .request(RequestBody::CreatePreset { data: data.clone() })
            .await
        {
            Ok(ack) if ack.success => {
                let mut preset = data;
                if let AckBody::Id(id) = ack.body {
                    preset.id = id;
                }
                let id = preset.id.clone();
                self.apply_create_preset(preset);
                Some(id)
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-preset dropped: {err}");
                None
            }
        }
    }

    pub async fn modify_preset(&self, id: &str, data: PresetData) {
        if !self.presets.lock().unwrap().contains_key(id) {
            log::debug!("modify for unknown preset {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ModifyPreset {
                id: id.to_owned(),
                data: data.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_modify_preset(id, data),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("modify-preset dropped: {err}"),
        }
    }

    pub async fn remove_preset(&self, id: &str) {
        if !self.presets.lock().unwrap().contains_key(id) {
            log::debug!("remove for unknown preset {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RemovePreset { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove_preset(id),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-preset dropped: {err}"),
        }
    }

    /// Fetch a preset that is not yet cached (tokens reference presets
    /// the client may never have seen). Caches it on success.
    pub async fn fetch_preset(&self, id: &str) -> Option<PresetData> {
        if let Some(preset) = self.get_preset(id) {
            return Some(preset);
        }
        match self
            .authority
            .request(RequestBody::GetLight { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => match ack.body {
                AckBody::Preset(preset) => {
                    self.apply_create_preset(preset.clone());
                    Some(preset)
                }
                _ => {
                    log::warn!("get-light acknowledged without a preset payload");
                    None
                }
            },
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("get-light dropped: {err}");
                None
            }
        }
    }

    // ── Reconciliation ──────────────────────────────────────────────

    pub fn apply_create(&self, light: LightData) {
        self.lights
            .lock()
            .unwrap()
            .insert(light.id.clone(), light.clone());
        self.bus.publish(&LightCreated { light });
    }

    pub fn apply_modify(&self, id: &str, mut light: LightData) {
        {
            let mut lights = self.lights.lock().unwrap();
            if !lights.contains_key(id) {
                log::debug!("modify for unknown light {id}");
                return;
            }
            light.id = id.to_owned();
            lights.insert(id.to_owned(), light.clone());
        }
        self.bus.publish(&LightModified { light });
    }

    pub fn apply_move(&self, id: &str, position: Vec2) {
        {
            let mut lights = self.lights.lock().unwrap();
            match lights.get_mut(id) {
                Some(light) => light.position = position,
                None => {
                    log::debug!("move for unknown light {id}");
                    return;
                }
            }
        }
        self.bus.publish(&LightMoved {
            id: id.to_owned(),
            position,
        });
    }

    pub fn apply_toggle(&self, id: &str, enabled: bool) {
        {
            let mut lights = self.lights.lock().unwrap();
            match lights.get_mut(id) {
                Some(light) => light.enabled = enabled,
                None => {
                    log::debug!("toggle for unknown light {id}");
                    return;
                }
            }
        }
        self.bus.publish(&LightToggled {
            id: id.to_owned(),
            enabled,
        });
    }

    pub fn apply_remove(&self, id: &str) {
        if self.lights.lock().unwrap().remove(id).is_none() {
            log::debug!("remove for unknown light {id}");
            return;
        }
        self.bus.publish(&LightRemoved { id: id.to_owned() });
    }

    pub fn apply_create_preset(&self, preset: PresetData) {
        self.presets
            .lock()
            .unwrap()
            .insert(preset.id.clone(), preset.clone());
        self.bus.publish(&PresetCreated { preset });
    }

    pub fn apply_modify_preset(&self, id: &str, mut preset: PresetData) {
        {
            let mut presets = self.presets.lock().unwrap();
            if !presets.contains_key(id) {
                log::debug!("modify for unknown preset {id}");
                return;
            }
            preset.id = id.to_owned();
            presets.insert(id.to_owned(), preset.clone());
        }
        self.bus.publish(&PresetModified { preset });
    }

    pub fn apply_remove_preset(&self, id: &str) {
        if self.presets.lock().unwrap().remove(id).is_none() {
            log::debug!("remove for unknown preset {id}");
            return;
        }
        self.bus.publish(&PresetRemoved { id: id.to_owned() });
    }

    pub fn handle_push(&self, push: &ServerPush) {
        match push {
            ServerPush::CreateLight { data } => self.apply_create(data.clone()),
            ServerPush::ModifyLight { id, data } => self.apply_modify(id, data.clone()),
            ServerPush::MoveLight { id, position } => self.apply_move(id, *position),
            ServerPush::ToggleLight { id, enabled } => self.apply_toggle(id, *enabled),
            ServerPush::RemoveLight { id } => self.apply_remove(id),
            ServerPush::CreatePreset { data } => self.apply_create_preset(data.clone()),
            ServerPush::ModifyPreset { id, data } => self.apply_modify_preset(id, data.clone()),
            ServerPush::RemovePreset { id } => self.apply_remove_preset(id),
            _ => {}
        }
    }

    fn unload(&self) {
        self.lights.lock().unwrap().clear();
        self.presets.lock().unwrap().clear();
    }
}
