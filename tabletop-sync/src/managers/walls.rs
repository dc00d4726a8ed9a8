//! Wall cache and reconciliation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tabletop_core::{SceneData, WallData};

use crate::bus::{EventBus, Subscription};
use crate::client::Authority;
use crate::managers::surface_rejection;
use crate::protocol::{AckBody, RequestBody, ServerPush};
use crate::session::{should_unload, ClientInfo, SceneLoaded, StateChanged};

// ── Domain events ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WallCreated {
    pub wall: WallData,
}

#[derive(Debug, Clone)]
pub struct WallModified {
    pub wall: WallData,
}

#[derive(Debug, Clone)]
pub struct WallRemoved {
    pub id: String,
}

/// Owns the wall cache for the active scene.
pub struct WallManager<A: Authority> {
    authority: Arc<A>,
    bus: EventBus,
    info: ClientInfo,
    walls: Mutex<HashMap<String, WallData>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl<A: Authority> WallManager<A> {
    pub fn new(authority: Arc<A>, bus: EventBus, info: ClientInfo) -> Arc<Self> {
        Arc::new(Self {
            authority,
            bus,
            info,
            walls: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Install the scene lifecycle subscriptions. They are released by
    /// [`WallManager::deactivate`] or when the manager is dropped.
    pub fn activate(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let on_state = self.bus.subscribe(move |event: &StateChanged| {
            if let Some(manager) = weak.upgrade() {
                if should_unload(&event.old, &event.new, manager.info.is_master) {
                    manager.unload();
                }
            }
        });
        let weak = Arc::downgrade(self);
        let on_scene = self.bus.subscribe(move |event: &SceneLoaded| {
            if let Some(manager) = weak.upgrade() {
                manager.populate(&event.scene);
            }
        });
        self.subscriptions
            .lock()
            .unwrap()
            .extend([on_state, on_scene]);
    }

    pub fn deactivate(&self) {
        self.subscriptions.lock().unwrap().clear();
    }

    pub fn get(&self, id: &str) -> Option<WallData> {
        self.walls.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.walls.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.lock().unwrap().is_empty()
    }

    /// Request a new wall. Commits under the server-assigned id on
    /// success and returns it.
    pub async fn create(&self, data: WallData) -> Option<String> {
        match self
            .authority
            .request(RequestBody::CreateWall { data: data.clone() })
            .await
        {
            Ok(ack) if ack.success => {
                let mut wall = data;
                if let AckBody::Id(id) = ack.body {
                    wall.id = id;
                }
                let id = wall.id.clone();
                self.apply_create(wall);
                Some(id)
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-wall dropped: {err}");
                None
            }
        }
    }

    pub async fn modify(&self, id: &str, data: WallData) {
        if !self.walls.lock().unwrap().contains_key(id) {
            log::debug!("modify for unknown wall {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ModifyWall {
                id: id.to_owned(),
                data: data.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_modify(id, data),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("modify-wall dropped: {err}"),
        }
    }

    pub async fn remove(&self, id: &str) {
        if !self.walls.lock().unwrap().contains_key(id) {
            log::debug!("remove for unknown wall {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RemoveWall { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove(id),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-wall dropped: {err}"),
        }
    }

    // ── Reconciliation: the single cache-update path ────────────────

    /// Insert a confirmed wall. A colliding id is an idempotent
    /// overwrite — the server is the sole id authority.
    pub fn apply_create(&self, wall: WallData) {
        self.walls
            .lock()
            .unwrap()
            .insert(wall.id.clone(), wall.clone());
        self.bus.publish(&WallCreated { wall });
    }

    pub fn apply_modify(&self, id: &str, mut wall: WallData) {
        {
            let mut walls = self.walls.lock().unwrap();
            if !walls.contains_key(id) {
                log::debug!("modify for unknown wall {id}");
                return;
            }
            wall.id = id.to_owned();
            walls.insert(id.to_owned(), wall.clone());
        }
        self.bus.publish(&WallModified { wall });
    }

    pub fn apply_remove(&self, id: &str) {
        if self.walls.lock().unwrap().remove(id).is_none() {
            log::debug!("remove for unknown wall {id}");
            return;
        }
        self.bus.publish(&WallRemoved { id: id.to_owned() });
    }

    /// Route a wall push into the reconciliation path.
    pub fn handle_push(&self, push: &ServerPush) {
        match push {
            ServerPush::CreateWall { data } => self.apply_create(data.clone()),
            ServerPush::ModifyWall { id, data } => self.apply_modify(id, data.clone()),
            ServerPush::RemoveWall { id } => self.apply_remove(id),
            _ => {}
        }
    }

    fn populate(&self, scene: &SceneData) {
        let mut walls = self.walls.lock().unwrap();
        walls.clear();
        for wall in &scene.walls {
            walls.insert(wall.id.clone(), wall.clone());
        }
    }

    fn unload(&self) {
        self.walls.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RequestError;
    use crate::messages::UiMessage;
    use crate::protocol::Ack;
    use crate::session::SessionState;
    use crate::testing::ScriptedAuthority;
    use tabletop_core::{Vec2, WallType};

    fn wall(id: &str) -> WallData {
        WallData::new(id, WallType::Wall, vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)])
    }

    fn manager() -> (Arc<ScriptedAuthority>, EventBus, Arc<WallManager<ScriptedAuthority>>) {
        let authority = ScriptedAuthority::new();
        let bus = EventBus::new();
        let manager = WallManager::new(authority.clone(), bus.clone(), ClientInfo::master("gm"));
        (authority, bus, manager)
    }

    #[tokio::test]
    async fn test_create_commits_under_server_id() {
        let (authority, bus, manager) = manager();
        authority.respond("create-wall", Ok(Ack::ok(AckBody::Id("w-7".into()))));

        let created = std::sync::Arc::new(Mutex::new(Vec::new()));
        let created_in = created.clone();
        let _sub = bus.subscribe(move |event: &WallCreated| {
            created_in.lock().unwrap().push(event.wall.clone());
        });

        let id = manager.create(wall("")).await;
        assert_eq!(id.as_deref(), Some("w-7"));
        assert!(manager.get("w-7").is_some());
        assert_eq!(created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_create_rolls_back() {
        let (authority, bus, manager) = manager();
        authority.respond("create-wall", Ok(Ack::rejected("Scene is locked")));

        let errors = std::sync::Arc::new(Mutex::new(Vec::new()));
        let errors_in = errors.clone();
        let _sub = bus.subscribe(move |event: &UiMessage| {
            errors_in.lock().unwrap().push(event.text.clone());
        });

        assert!(manager.create(wall("")).await.is_none());
        // Cache exactly as before, exactly one user-visible error.
        assert!(manager.is_empty());
        assert_eq!(errors.lock().unwrap().as_slice(), ["Scene is locked"]);
    }

    #[tokio::test]
    async fn test_dropped_request_is_silent() {
        let (authority, bus, manager) = manager();
        authority.respond("create-wall", Err(RequestError::NotConnected));

        let errors = std::sync::Arc::new(Mutex::new(0usize));
        let errors_in = errors.clone();
        let _sub = bus.subscribe(move |_: &UiMessage| {
            *errors_in.lock().unwrap() += 1;
        });

        assert!(manager.create(wall("")).await.is_none());
        assert!(manager.is_empty());
        assert_eq!(*errors.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_modify_unknown_id_sends_nothing() {
        let (authority, _bus, manager) = manager();
        manager.modify("ghost", wall("ghost")).await;
        assert!(authority.sent().is_empty());
    }

    #[test]
    fn test_push_create_then_remove_leaves_cache_empty() {
        let (_authority, _bus, manager) = manager();
        manager.handle_push(&ServerPush::CreateWall { data: wall("w1") });
        assert_eq!(manager.len(), 1);
        manager.handle_push(&ServerPush::RemoveWall { id: "w1".into() });
        assert!(manager.is_empty());
    }

    #[test]
    fn test_push_modify_last_write_wins() {
        let (_authority, _bus, manager) = manager();
        manager.apply_create(wall("w1"));

        let mut first = wall("w1");
        first.open = true;
        let mut second = wall("w1");
        second.kind = WallType::Door;

        manager.apply_modify("w1", first);
        manager.apply_modify("w1", second.clone());
        assert_eq!(manager.get("w1").unwrap(), second);
    }

    #[test]
    fn test_idempotent_create_overwrite() {
        let (_authority, _bus, manager) = manager();
        manager.apply_create(wall("w1"));
        manager.apply_create(wall("w1"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_push_modify_unknown_id_is_noop() {
        let (_authority, _bus, manager) = manager();
        manager.handle_push(&ServerPush::ModifyWall {
            id: "ghost".into(),
            data: wall("ghost"),
        });
        assert!(manager.is_empty());
    }

    #[test]
    fn test_scene_change_unloads() {
        let (_authority, bus, manager) = manager();
        manager.activate();
        manager.apply_create(wall("w1"));

        bus.publish(&StateChanged {
            old: SessionState::new(Some("s1".into()), true),
            new: SessionState::new(Some("s2".into()), true),
        });
        assert!(manager.is_empty());
    }

    #[test]
    fn test_sync_disable_unloads_for_player() {
        let authority = ScriptedAuthority::new();
        let bus = EventBus::new();
        let manager = WallManager::new(authority, bus.clone(), ClientInfo::player("alice"));
        manager.activate();
        manager.apply_create(wall("w1"));

        bus.publish(&StateChanged {
            old: SessionState::new(Some("s1".into()), true),
            new: SessionState::new(Some("s1".into()), false),
        });
        assert!(manager.is_empty());
    }

    #[test]
    fn test_scene_loaded_populates() {
        let (_authority, bus, manager) = manager();
        manager.activate();

        let mut scene = SceneData::new("s1", "Crypt");
        scene.walls = vec![wall("w1"), wall("w2")];
        bus.publish(&SceneLoaded { scene });

        assert_eq!(manager.len(), 2);
        assert!(manager.get("w2").is_some());
    }

    #[test]
    fn test_deactivate_releases_subscriptions() {
        let (_authority, bus, manager) = manager();
        manager.activate();
        manager.deactivate();
        manager.apply_create(wall("w1"));

        bus.publish(&StateChanged {
            old: SessionState::new(Some("s1".into()), true),
            new: SessionState::default(),
        });
        assert_eq!(manager.len(), 1);
    }
}
