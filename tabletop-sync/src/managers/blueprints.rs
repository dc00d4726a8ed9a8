//! Blueprint library and its folder tree.
//!
//! Blueprints are token templates filed under a hierarchy of folders.
//! The folder tree is path-addressed (see [`tabletop_core::path`]);
//! every folder operation is remote-confirmed before the local tree is
//! rewritten, and the move rewrite cascades to descendants by prefix
//! replacement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tabletop_core::{FolderPath, PathIndex, TokenData};

use crate::bus::{EventBus, Subscription};
use crate::client::Authority;
use crate::managers::surface_rejection;
use crate::protocol::{AckBody, RequestBody, ServerPush};
use crate::session::{should_unload, ClientInfo, StateChanged};

// ── Domain events ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BlueprintCreated {
    pub blueprint: TokenData,
    pub path: FolderPath,
}

#[derive(Debug, Clone)]
pub struct BlueprintModified {
    pub blueprint: TokenData,
}

#[derive(Debug, Clone)]
pub struct BlueprintRemoved {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct FolderCreated {
    pub id: String,
    pub name: String,
    pub path: FolderPath,
}

#[derive(Debug, Clone)]
pub struct FolderRenamed {
    pub path: FolderPath,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct FolderMoved {
    pub old_path: FolderPath,
    pub new_path: FolderPath,
}

#[derive(Debug, Clone)]
pub struct FolderRemoved {
    pub path: FolderPath,
    /// Blueprints that vanished with the folder.
    pub removed_blueprints: Vec<String>,
}

pub struct BlueprintManager<A: Authority> {
    authority: Arc<A>,
    bus: EventBus,
    info: ClientInfo,
    blueprints: Mutex<HashMap<String, TokenData>>,
    index: Mutex<PathIndex>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl<A: Authority> BlueprintManager<A> {
    pub fn new(authority: Arc<A>, bus: EventBus, info: ClientInfo) -> Arc<Self> {
        Arc::new(Self {
            authority,
            bus,
            info,
            blueprints: Mutex::new(HashMap::new()),
            index: Mutex::new(PathIndex::new()),
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
        self.blueprints.lock().unwrap().get(id).cloned()
    }

    /// Path of the folder containing this blueprint.
    pub fn path_of(&self, id: &str) -> Option<FolderPath> {
        self.index.lock().unwrap().entry_path(id).cloned()
    }

    pub fn folder_path(&self, id: &str) -> Option<FolderPath> {
        self.index.lock().unwrap().folder(id).map(|f| f.path.clone())
    }

    pub fn folder_name(&self, id: &str) -> Option<String> {
        self.index.lock().unwrap().folder(id).map(|f| f.name.clone())
    }

    pub fn len(&self) -> usize {
        self.blueprints.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.lock().unwrap().is_empty()
    }

    // ── Local operations ────────────────────────────────────────────

    pub async fn create(&self, data: TokenData, path: FolderPath) -> Option<String> {
        match self
            .authority
            .request(RequestBody::CreateBlueprint {
                data: data.clone(),
                path: path.to_string(),
            })
            .await
        {
            Ok(ack) if ack.success => {
                let mut blueprint = data;
                if let AckBody::Id(id) = ack.body {
                    blueprint.id = id;
                }
                let id = blueprint.id.clone();
                self.apply_create(blueprint, path);
                Some(id)
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-blueprint dropped: {err}");
                None
            }
        }
    }

    pub async fn modify(&self, id: &str, data: TokenData) {
        if !self.blueprints.lock().unwrap().contains_key(id) {
            log::debug!("modify for unknown blueprint {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::ModifyBlueprint {
                id: id.to_owned(),
                data: data.clone(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_modify(id, data),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("modify-blueprint dropped: {err}"),
        }
    }

    pub async fn remove(&self, id: &str) {
        if !self.blueprints.lock().unwrap().contains_key(id) {
            log::debug!("remove for unknown blueprint {id}");
            return;
        }
        match self
            .authority
            .request(RequestBody::RemoveBlueprint { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove(id),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-blueprint dropped: {err}"),
        }
    }

    /// Fetch a blueprint that is not yet cached; caches it at the top
    /// level on success.
    pub async fn fetch(&self, id: &str) -> Option<TokenData> {
        if let Some(blueprint) = self.get(id) {
            return Some(blueprint);
        }
        match self
            .authority
            .request(RequestBody::GetBlueprint { id: id.to_owned() })
            .await
        {
            Ok(ack) if ack.success => match ack.body {
                AckBody::Token(blueprint) => {
                    self.apply_create(blueprint.clone(), FolderPath::root());
                    Some(blueprint)
                }
                _ => {
                    log::warn!("get-blueprint acknowledged without a token payload");
                    None
                }
            },
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("get-blueprint dropped: {err}");
                None
            }
        }
    }

    pub async fn create_folder(&self, name: &str, parent: FolderPath) -> Option<FolderPath> {
        // An empty label falls back the way the rename field does.
        let name = if name.is_empty() { "New folder" } else { name };
        match self
            .authority
            .request(RequestBody::CreateBlueprintFolder {
                path: parent.to_string(),
                name: name.to_owned(),
            })
            .await
        {
            Ok(ack) if ack.success => {
                let AckBody::Id(id) = ack.body else {
                    log::warn!("create-blueprint-folder acknowledged without an id");
                    return None;
                };
                Some(self.apply_create_folder(id, parent, name.to_owned()))
            }
            Ok(ack) => {
                surface_rejection(&self.bus, &ack);
                None
            }
            Err(err) => {
                log::debug!("create-blueprint-folder dropped: {err}");
                None
            }
        }
    }

    pub async fn rename_folder(&self, path: FolderPath, new_name: &str) {
        let new_name = if new_name.is_empty() { "New folder" } else { new_name };
        match self
            .authority
            .request(RequestBody::RenameBlueprintFolder {
                path: path.to_string(),
                name: new_name.to_owned(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_rename_folder(&path, new_name.to_owned()),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("rename-blueprint-folder dropped: {err}"),
        }
    }

    /// Reparent the folder at `old_path` under `new_parent` (root for
    /// the top level). The local rewrite happens only after the
    /// authority confirms.
    pub async fn move_folder(&self, old_path: FolderPath, new_parent: FolderPath) {
        match self
            .authority
            .request(RequestBody::MoveBlueprintFolder {
                old_path: old_path.to_string(),
                new_path: new_parent.to_string(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_move_folder(&old_path, &new_parent),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("move-blueprint-folder dropped: {err}"),
        }
    }

    pub async fn remove_folder(&self, path: FolderPath) {
        match self
            .authority
            .request(RequestBody::RemoveBlueprintFolder {
                path: path.to_string(),
            })
            .await
        {
            Ok(ack) if ack.success => self.apply_remove_folder(&path),
            Ok(ack) => surface_rejection(&self.bus, &ack),
            Err(err) => log::debug!("remove-blueprint-folder dropped: {err}"),
        }
    }

    // ── Reconciliation ──────────────────────────────────────────────

    pub fn apply_create(&self, blueprint: TokenData, path: FolderPath) {
        let id = blueprint.id.clone();
        {
            let mut index = self.index.lock().unwrap();
            // Re-creation of a known id re-files it instead of
            // duplicating the entry.
            index.remove_entry(&id);
            index.insert_entry(id.clone(), path.clone());
        }
        self.blueprints
            .lock()
            .unwrap()
            .insert(id, blueprint.clone());
        self.bus.publish(&BlueprintCreated { blueprint, path });
    }

    pub fn apply_modify(&self, id: &str, mut blueprint: TokenData) {
        {
            let mut blueprints = self.blueprints.lock().unwrap();
            if !blueprints.contains_key(id) {
                log::debug!("modify for unknown blueprint {id}");
                return;
            }
            blueprint.id = id.to_owned();
            blueprints.insert(id.to_owned(), blueprint.clone());
        }
        self.bus.publish(&BlueprintModified { blueprint });
    }

    pub fn apply_remove(&self, id: &str) {
        if self.blueprints.lock().unwrap().remove(id).is_none() {
            log::debug!("remove for unknown blueprint {id}");
            return;
        }
        self.index.lock().unwrap().remove_entry(id);
        self.bus.publish(&BlueprintRemoved { id: id.to_owned() });
    }

    pub fn apply_create_folder(&self, id: String, parent: FolderPath, name: String) -> FolderPath {
        let path = self
            .index
            .lock()
            .unwrap()
            .insert_folder(id.clone(), name.clone(), &parent);
        self.bus.publish(&FolderCreated {
            id,
            name,
            path: path.clone(),
        });
        path
    }

    pub fn apply_rename_folder(&self, path: &FolderPath, name: String) {
        if !self.index.lock().unwrap().rename_folder(path, name.clone()) {
            return;
        }
        self.bus.publish(&FolderRenamed {
            path: path.clone(),
            name,
        });
    }

    pub fn apply_move_folder(&self, old_path: &FolderPath, new_parent: &FolderPath) {
        let new_path = {
            let mut index = self.index.lock().unwrap();
            index.move_folder(old_path, new_parent)
        };
        // A stale move (the folder went away or moved independently) is
        // absorbed without an event.
        if let Some(new_path) = new_path {
            self.bus.publish(&FolderMoved {
                old_path: old_path.clone(),
                new_path,
            });
        }
    }

    pub fn apply_remove_folder(&self, path: &FolderPath) {
        let removed = self.index.lock().unwrap().remove_folder(path);
        {
            let mut blueprints = self.blueprints.lock().unwrap();
            for id in &removed {
                blueprints.remove(id);
            }
        }
        self.bus.publish(&FolderRemoved {
            path: path.clone(),
            removed_blueprints: removed,
        });
    }

    pub fn handle_push(&self, push: &ServerPush) {
        match push {
            ServerPush::CreateBlueprint { data, path } => {
                self.apply_create(data.clone(), FolderPath::parse(path))
            }
            ServerPush::ModifyBlueprint { id, data } => self.apply_modify(id, data.clone()),
            ServerPush::RemoveBlueprint { id } => self.apply_remove(id),
            ServerPush::CreateBlueprintFolder { id, path, name } => {
                self.apply_create_folder(id.clone(), FolderPath::parse(path), name.clone());
            }
            ServerPush::RenameBlueprintFolder { path, name } => {
                self.apply_rename_folder(&FolderPath::parse(path), name.clone())
            }
            ServerPush::MoveBlueprintFolder { old_path, new_path } => {
                self.apply_move_folder(&FolderPath::parse(old_path), &FolderPath::parse(new_path))
            }
            ServerPush::RemoveBlueprintFolder { path } => {
                self.apply_remove_folder(&FolderPath::parse(path))
            }
            _ => {}
        }
    }

    fn unload(&self) {
        self.blueprints.lock().unwrap().clear();
        self.index.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::UiMessage;
    use crate::protocol::Ack;
    use crate::testing::ScriptedAuthority;
    use tabletop_core::Vec2;

    fn blueprint(id: &str, name: &str) -> TokenData {
        TokenData::new(id, name, Vec2::new(0.0, 0.0))
    }

    fn manager() -> (
        Arc<ScriptedAuthority>,
        EventBus,
        Arc<BlueprintManager<ScriptedAuthority>>,
    ) {
        let authority = ScriptedAuthority::new();
        let bus = EventBus::new();
        let manager =
            BlueprintManager::new(authority.clone(), bus.clone(), ClientInfo::master("gm"));
        (authority, bus, manager)
    }

    /// root ── fA ── fB ── bp1, plus root-level bp0.
    fn seeded() -> (
        Arc<ScriptedAuthority>,
        EventBus,
        Arc<BlueprintManager<ScriptedAuthority>>,
    ) {
        let (authority, bus, manager) = manager();
        let a = manager.apply_create_folder("fA".into(), FolderPath::root(), "Adventures".into());
        let b = manager.apply_create_folder("fB".into(), a, "Bosses".into());
        manager.apply_create(blueprint("bp1", "Dragon"), b);
        manager.apply_create(blueprint("bp0", "Goblin"), FolderPath::root());
        (authority, bus, manager)
    }

    #[tokio::test]
    async fn test_create_files_under_path() {
        let (authority, _bus, manager) = manager();
        authority.respond("create-blueprint", Ok(Ack::ok(AckBody::Id("bp-1".into()))));
        let folder = manager.apply_create_folder("f1".into(), FolderPath::root(), "Lair".into());

        let id = manager
            .create(blueprint("", "Dragon"), folder.clone())
            .await
            .unwrap();
        assert_eq!(id, "bp-1");
        assert_eq!(manager.path_of("bp-1").unwrap(), folder);
    }

    #[tokio::test]
    async fn test_confirmed_move_rewrites_descendants() {
        let (authority, bus, manager) = seeded();
        authority.respond("move-blueprint-folder", Ok(Ack::ok_empty()));

        let moves = std::sync::Arc::new(Mutex::new(Vec::new()));
        let moves_in = moves.clone();
        let _sub = bus.subscribe(move |event: &FolderMoved| {
            moves_in
                .lock()
                .unwrap()
                .push(event.new_path.to_string());
        });

        // fB to the top level: its blueprint follows.
        manager
            .move_folder(FolderPath::parse("fA/fB"), FolderPath::root())
            .await;

        assert_eq!(manager.folder_path("fB").unwrap().to_string(), "fB");
        assert_eq!(manager.path_of("bp1").unwrap().to_string(), "fB");
        assert_eq!(moves.lock().unwrap().as_slice(), ["fB"]);

        let sent = authority.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            RequestBody::MoveBlueprintFolder { old_path, new_path } => {
                assert_eq!(old_path, "fA/fB");
                assert_eq!(new_path, "");
            }
            other => panic!("Expected move-blueprint-folder, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_move_keeps_tree() {
        let (authority, bus, manager) = seeded();
        authority.respond("move-blueprint-folder", Ok(Ack::rejected("Folder is gone")));

        let errors = std::sync::Arc::new(Mutex::new(Vec::new()));
        let errors_in = errors.clone();
        let _sub = bus.subscribe(move |event: &UiMessage| {
            errors_in.lock().unwrap().push(event.text.clone());
        });

        manager
            .move_folder(FolderPath::parse("fA/fB"), FolderPath::root())
            .await;

        assert_eq!(manager.folder_path("fB").unwrap().to_string(), "fA/fB");
        assert_eq!(errors.lock().unwrap().as_slice(), ["Folder is gone"]);
    }

    #[tokio::test]
    async fn test_rename_changes_label_only() {
        let (authority, _bus, manager) = seeded();
        authority.respond("rename-blueprint-folder", Ok(Ack::ok_empty()));

        manager
            .rename_folder(FolderPath::parse("fA"), "Campaigns")
            .await;

        assert_eq!(manager.folder_name("fA").unwrap(), "Campaigns");
        assert_eq!(manager.folder_path("fA").unwrap().to_string(), "fA");
    }

    #[tokio::test]
    async fn test_empty_rename_falls_back() {
        let (authority, _bus, manager) = seeded();
        authority.respond("rename-blueprint-folder", Ok(Ack::ok_empty()));

        manager.rename_folder(FolderPath::parse("fA"), "").await;
        assert_eq!(manager.folder_name("fA").unwrap(), "New folder");
    }

    #[tokio::test]
    async fn test_remove_folder_drops_contained_blueprints() {
        let (authority, _bus, manager) = seeded();
        authority.respond("remove-blueprint-folder", Ok(Ack::ok_empty()));

        manager.remove_folder(FolderPath::parse("fA")).await;

        assert!(manager.get("bp1").is_none(), "bp1 lived under fA/fB");
        assert!(manager.get("bp0").is_some(), "top-level blueprint survives");
        assert!(manager.folder_path("fB").is_none());
    }

    #[test]
    fn test_stale_move_push_absorbed() {
        let (_authority, bus, manager) = seeded();

        let moves = std::sync::Arc::new(Mutex::new(0usize));
        let moves_in = moves.clone();
        let _sub = bus.subscribe(move |_: &FolderMoved| {
            *moves_in.lock().unwrap() += 1;
        });

        // Another client already moved fB; this push's old path no
        // longer matches and must be skipped without an event.
        manager.handle_push(&ServerPush::MoveBlueprintFolder {
            old_path: "fA/ghost".into(),
            new_path: String::new(),
        });
        assert_eq!(*moves.lock().unwrap(), 0);
    }

    #[test]
    fn test_recreate_refiles_entry() {
        let (_authority, _bus, manager) = seeded();
        // Same id arrives again at the top level: one entry, new home.
        manager.apply_create(blueprint("bp1", "Dragon"), FolderPath::root());
        assert_eq!(manager.path_of("bp1").unwrap(), FolderPath::root());
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_uncached_blueprint() {
        let (authority, _bus, manager) = manager();
        authority.respond(
            "get-blueprint",
            Ok(Ack::ok(AckBody::Token(blueprint("bp-9", "Mimic")))),
        );

        let fetched = manager.fetch("bp-9").await.unwrap();
        assert_eq!(fetched.name, "Mimic");
        assert!(manager.get("bp-9").is_some());
    }
}
