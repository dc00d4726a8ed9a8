//! Integration tests for the end-to-end synchronization pipeline.
//!
//! These tests bind an in-process scripted authority endpoint and drive
//! real WebSocket connections through the full engine: request/ack
//! correlation, push routing, session transitions and cache
//! reconciliation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use tabletop_core::{SceneData, TokenData, Vec2, WallData, WallType};
use tabletop_sync::{
    Ack, AckBody, ClientConfig, ClientEvent, ClientInfo, ConnectionState, Frame, RequestBody,
    ServerPush, SocketClient, SyncEngine,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Bind a scripted authority on a free port. Requests are acknowledged
/// from the `acks` table by wire name (success-empty when unscripted);
/// pushes are injected through the returned sender.
async fn spawn_authority(
    acks: HashMap<&'static str, Ack>,
) -> (String, mpsc::Sender<ServerPush>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("ws://{}", listener.local_addr().unwrap());
    let (push_tx, mut push_rx) = mpsc::channel::<ServerPush>(32);

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut writer, mut reader) = ws.split();
        loop {
            tokio::select! {
                Some(push) = push_rx.recv() => {
                    let bytes = Frame::Push { event: push }.encode().unwrap();
                    if writer.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                inbound = reader.next() => match inbound {
                    Some(Ok(Message::Binary(data))) => {
                        let bytes: Vec<u8> = data.into();
                        if let Ok(Frame::Request { id, body }) = Frame::decode(&bytes) {
                            let ack = acks
                                .get(body.name())
                                .cloned()
                                .unwrap_or_else(Ack::ok_empty);
                            let bytes = Frame::Ack { id, ack }.encode().unwrap();
                            if writer.send(Message::Binary(bytes.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                },
            }
        }
    });

    (addr, push_tx)
}

/// Fast transport settings for tests.
fn test_config() -> ClientConfig {
    ClientConfig {
        reconnect_attempts: 2,
        reconnect_delay: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_client_connects_and_reports_state() {
    init_logs();
    let (addr, _push) = spawn_authority(HashMap::new()).await;

    let mut client = SocketClient::new(test_config());
    let mut events = client.take_event_rx().unwrap();
    client.connect(&addr);

    let event = timeout(Duration::from_secs(2), events.recv()).await;
    match event {
        Ok(Some(ClientEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_request_ack_roundtrip() {
    init_logs();
    let mut acks = HashMap::new();
    acks.insert("create-wall", Ack::ok(AckBody::Id("w-1".into())));
    let (addr, _push) = spawn_authority(acks).await;

    let mut client = SocketClient::new(test_config());
    let mut events = client.take_event_rx().unwrap();
    client.connect(&addr);
    let _ = timeout(Duration::from_secs(2), events.recv()).await;

    let wall = WallData::new("", WallType::Wall, vec![Vec2::new(0.0, 0.0)]);
    let ack = client
        .request(RequestBody::CreateWall { data: wall })
        .await
        .unwrap();
    assert!(ack.success);
    assert_eq!(ack.body, AckBody::Id("w-1".into()));
}

#[tokio::test]
async fn test_reconnect_exhaustion_reports_failure() {
    init_logs();
    // Nobody is listening on this address.
    let mut client = SocketClient::new(test_config());
    let mut events = client.take_event_rx().unwrap();
    client.connect("ws://127.0.0.1:9");

    let event = timeout(Duration::from_secs(5), events.recv()).await;
    match event {
        Ok(Some(ClientEvent::ReconnectFailed)) => {}
        other => panic!("Expected ReconnectFailed, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_goblin_end_to_end() {
    init_logs();
    // Create a token locally, receive a remote health push, observe
    // both merged in the cache.
    let mut acks = HashMap::new();
    acks.insert("create-token", Ack::ok(AckBody::Id("tok-1".into())));
    acks.insert("get-scene", Ack::ok(AckBody::Scene(SceneData::new("", "Crypt"))));
    let (addr, push) = spawn_authority(acks).await;

    let engine = Arc::new(SyncEngine::new(test_config(), ClientInfo::master("gm")));
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });

    engine.connect(&addr);
    {
        let engine = engine.clone();
        wait_for("connection", move || engine.client().is_connected()).await;
    }

    // Authority puts us on scene s1.
    push.send(ServerPush::SetState {
        scene: Some("s1".into()),
        synced: true,
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("session transition", move || {
            engine.session().state().scene.as_deref() == Some("s1")
        })
        .await;
    }

    let goblin = TokenData::new("", "Goblin", Vec2::new(3.0, 4.0));
    let id = engine.tokens().create(goblin).await.unwrap();
    assert_eq!(id, "tok-1");
    assert_eq!(engine.tokens().get("tok-1").unwrap().name, "Goblin");

    // Another client raises its health.
    push.send(ServerPush::UpdateHealth {
        id: "tok-1".into(),
        health: 5,
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("health push", move || {
            engine
                .tokens()
                .get("tok-1")
                .is_some_and(|token| token.health == 5)
        })
        .await;
    }
    let token = engine.tokens().get("tok-1").unwrap();
    assert_eq!(token.name, "Goblin");
    assert_eq!(token.position, Vec2::new(3.0, 4.0));
}

#[tokio::test]
async fn test_scene_clear_empties_all_caches() {
    init_logs();
    let mut acks = HashMap::new();
    acks.insert("get-scene", Ack::ok(AckBody::Scene(SceneData::new("", "Crypt"))));
    let (addr, push) = spawn_authority(acks).await;

    let engine = Arc::new(SyncEngine::new(test_config(), ClientInfo::master("gm")));
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });

    engine.connect(&addr);
    {
        let engine = engine.clone();
        wait_for("connection", move || engine.client().is_connected()).await;
    }

    push.send(ServerPush::SetState {
        scene: Some("s1".into()),
        synced: true,
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("scene s1", move || {
            engine.session().state().scene.as_deref() == Some("s1")
        })
        .await;
    }

    // Populate through remote pushes.
    push.send(ServerPush::CreateWall {
        data: WallData::new("w1", WallType::Door, vec![Vec2::new(0.0, 0.0)]),
    })
    .await
    .unwrap();
    push.send(ServerPush::CreateToken {
        data: TokenData::new("tok-1", "Goblin", Vec2::new(1.0, 1.0)),
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("pushes applied", move || {
            engine.walls().len() == 1 && engine.tokens().len() == 1
        })
        .await;
    }

    // Authority clears the scene: every cache must empty.
    push.send(ServerPush::SetState {
        scene: None,
        synced: true,
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("caches cleared", move || {
            engine.session().state().scene.is_none()
                && engine.walls().is_empty()
                && engine.tokens().is_empty()
                && engine.lights().is_empty()
        })
        .await;
    }
}

#[tokio::test]
async fn test_rejected_create_surfaces_reason() {
    init_logs();
    let mut acks = HashMap::new();
    acks.insert("create-token", Ack::rejected("Scene is locked"));
    let (addr, _push) = spawn_authority(acks).await;

    let engine = Arc::new(SyncEngine::new(test_config(), ClientInfo::master("gm")));
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });

    engine.connect(&addr);
    {
        let engine = engine.clone();
        wait_for("connection", move || engine.client().is_connected()).await;
    }

    let result = engine
        .tokens()
        .create(TokenData::new("", "Goblin", Vec2::new(0.0, 0.0)))
        .await;
    assert!(result.is_none());
    assert!(engine.tokens().is_empty());
    assert!(engine
        .messages()
        .active()
        .contains(&"Scene is locked".to_owned()));
}

#[tokio::test]
async fn test_request_without_connection_is_noop() {
    init_logs();
    let engine = SyncEngine::new(test_config(), ClientInfo::master("gm"));
    let result = engine
        .tokens()
        .create(TokenData::new("", "Goblin", Vec2::new(0.0, 0.0)))
        .await;
    assert!(result.is_none());
    assert!(engine.tokens().is_empty());
    assert!(engine.messages().is_empty());
}

#[tokio::test]
async fn test_folder_move_end_to_end() {
    init_logs();
    let (addr, push) = spawn_authority(HashMap::new()).await;

    let engine = Arc::new(SyncEngine::new(test_config(), ClientInfo::master("gm")));
    let runner = engine.clone();
    tokio::spawn(async move { runner.run().await });

    engine.connect(&addr);
    {
        let engine = engine.clone();
        wait_for("connection", move || engine.client().is_connected()).await;
    }

    // Remote clients build a small tree, then reparent it.
    push.send(ServerPush::CreateBlueprintFolder {
        id: "fA".into(),
        path: String::new(),
        name: "Adventures".into(),
    })
    .await
    .unwrap();
    push.send(ServerPush::CreateBlueprintFolder {
        id: "fB".into(),
        path: "fA".into(),
        name: "Bosses".into(),
    })
    .await
    .unwrap();
    push.send(ServerPush::CreateBlueprint {
        data: TokenData::new("bp1", "Dragon", Vec2::new(0.0, 0.0)),
        path: "fA/fB".into(),
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("tree built", move || engine.blueprints().get("bp1").is_some()).await;
    }

    push.send(ServerPush::MoveBlueprintFolder {
        old_path: "fA/fB".into(),
        new_path: String::new(),
    })
    .await
    .unwrap();
    {
        let engine = engine.clone();
        wait_for("folder moved", move || {
            engine
                .blueprints()
                .path_of("bp1")
                .is_some_and(|path| path.to_string() == "fB")
        })
        .await;
    }
}
