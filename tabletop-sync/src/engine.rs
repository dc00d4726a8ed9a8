//! Engine wiring root.
//!
//! `SyncEngine` constructs the bus, the transport and every manager as
//! explicit services (no ambient singletons), then pumps transport
//! events on one task: lifecycle notifications are republished on the
//! bus, pushes are routed into the owning manager. Because this pump is
//! the only place pushes are applied, all cache mutation stays on one
//! logical thread.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::bus::{EventBus, Subscription};
use crate::client::{ClientConfig, ClientEvent, SocketClient};
use crate::managers::{BlueprintManager, LightManager, TokenManager, WallManager};
use crate::messages::{MessageQueue, UiMessage};
use crate::protocol::ServerPush;
use crate::session::{ClientInfo, SessionRunner};

/// Bus notification: the transport (re-)established its connection.
#[derive(Debug, Clone)]
pub struct ConnectionOpened;

/// Bus notification: the transport lost or gave up its connection.
#[derive(Debug, Clone)]
pub struct ConnectionClosed;

/// Owns the full client-side synchronization pipeline.
pub struct SyncEngine {
    bus: EventBus,
    client: Arc<SocketClient>,
    messages: Arc<MessageQueue>,
    session: Arc<SessionRunner<SocketClient>>,
    walls: Arc<WallManager<SocketClient>>,
    lights: Arc<LightManager<SocketClient>>,
    tokens: Arc<TokenManager<SocketClient>>,
    blueprints: Arc<BlueprintManager<SocketClient>>,
    event_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    _message_sub: Subscription,
}

impl SyncEngine {
    pub fn new(config: ClientConfig, info: ClientInfo) -> Self {
        let bus = EventBus::new();
        let mut client = SocketClient::new(config);
        let event_rx = client.take_event_rx();
        let client = Arc::new(client);

        let messages = MessageQueue::with_defaults();
        let message_sub = messages.attach(&bus);

        let session = SessionRunner::new(client.clone(), bus.clone(), info.clone());
        let walls = WallManager::new(client.clone(), bus.clone(), info.clone());
        let lights = LightManager::new(client.clone(), bus.clone(), info.clone());
        let tokens = TokenManager::new(client.clone(), bus.clone(), info.clone());
        let blueprints = BlueprintManager::new(client.clone(), bus.clone(), info);
        walls.activate();
        lights.activate();
        tokens.activate();
        blueprints.activate();

        Self {
            bus,
            client,
            messages,
            session,
            walls,
            lights,
            tokens,
            blueprints,
            event_rx: Mutex::new(event_rx),
            _message_sub: message_sub,
        }
    }

    pub fn with_defaults(info: ClientInfo) -> Self {
        Self::new(ClientConfig::default(), info)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn client(&self) -> &Arc<SocketClient> {
        &self.client
    }

    pub fn messages(&self) -> &Arc<MessageQueue> {
        &self.messages
    }

    pub fn session(&self) -> &Arc<SessionRunner<SocketClient>> {
        &self.session
    }

    pub fn walls(&self) -> &Arc<WallManager<SocketClient>> {
        &self.walls
    }

    pub fn lights(&self) -> &Arc<LightManager<SocketClient>> {
        &self.lights
    }

    pub fn tokens(&self) -> &Arc<TokenManager<SocketClient>> {
        &self.tokens
    }

    pub fn blueprints(&self) -> &Arc<BlueprintManager<SocketClient>> {
        &self.blueprints
    }

    /// Open the connection; progress arrives through [`SyncEngine::run`].
    pub fn connect(&self, address: impl Into<String>) {
        self.client.connect(address);
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }

    /// Drain transport events until the transport shuts down. This is
    /// the single logical thread every push is applied on.
    pub async fn run(&self) {
        let Some(mut event_rx) = self.event_rx.lock().unwrap().take() else {
            log::warn!("engine already running");
            return;
        };
        while let Some(event) = event_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Apply one transport event. Exposed for embedders that drive the
    /// pump themselves.
    pub async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                self.bus
                    .publish(&UiMessage::new("Connection established to the server"));
                self.bus.publish(&ConnectionOpened);
            }
            ClientEvent::Disconnected => {
                self.bus
                    .publish(&UiMessage::new("Disconnected from the server"));
                self.bus.publish(&ConnectionClosed);
            }
            ClientEvent::ReconnectFailed => {
                self.bus.publish(&UiMessage::new(
                    "Failed to establish connection to the server",
                ));
                self.bus.publish(&ConnectionClosed);
            }
            ClientEvent::Push(push) => self.route_push(push).await,
        }
    }

    async fn route_push(&self, push: ServerPush) {
        match push {
            ServerPush::SetState { scene, synced } => {
                self.session.handle_set_state(scene, synced).await;
            }
            ServerPush::ModifyGrid { data } => self.session.handle_grid(data),
            ServerPush::ChangeLandingPage { id } => self.session.handle_landing_page(id),
            ServerPush::UserConnected { username } => {
                self.session.handle_user_connected(username);
            }
            ServerPush::UserDisconnected { username } => {
                self.session.handle_user_disconnected(username);
            }

            push @ (ServerPush::CreateWall { .. }
            | ServerPush::ModifyWall { .. }
            | ServerPush::RemoveWall { .. }) => self.walls.handle_push(&push),

            push @ (ServerPush::CreateLight { .. }
            | ServerPush::ModifyLight { .. }
            | ServerPush::MoveLight { .. }
            | ServerPush::ToggleLight { .. }
            | ServerPush::RemoveLight { .. }
            | ServerPush::CreatePreset { .. }
            | ServerPush::ModifyPreset { .. }
            | ServerPush::RemovePreset { .. }) => self.lights.handle_push(&push),

            push @ (ServerPush::CreateToken { .. }
            | ServerPush::ModifyToken { .. }
            | ServerPush::MoveToken { .. }
            | ServerPush::RotateToken { .. }
            | ServerPush::RotateTokenLight { .. }
            | ServerPush::LockToken { .. }
            | ServerPush::UpdateVisibility { .. }
            | ServerPush::UpdateHealth { .. }
            | ServerPush::UpdateElevation { .. }
            | ServerPush::UpdateConditions { .. }
            | ServerPush::RemoveToken { .. }) => self.tokens.handle_push(&push),

            push @ (ServerPush::CreateBlueprint { .. }
            | ServerPush::ModifyBlueprint { .. }
            | ServerPush::RemoveBlueprint { .. }
            | ServerPush::CreateBlueprintFolder { .. }
            | ServerPush::RenameBlueprintFolder { .. }
            | ServerPush::MoveBlueprintFolder { .. }
            | ServerPush::RemoveBlueprintFolder { .. }) => self.blueprints.handle_push(&push),
        }
    }
}
