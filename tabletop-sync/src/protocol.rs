//! Wire protocol between the client and the authority.
//!
//! Everything crosses the socket as one bincode-encoded [`Frame`]:
//!
//! ```text
//! client ──► Frame::Request { id, body }          named request, positional payload
//! client ◄── Frame::Ack     { id, success, body } exactly one per request id
//! client ◄── Frame::Push    { event }             unsolicited, already confirmed
//! ```
//!
//! Request ids are a client-local counter; the authority echoes the id in
//! the single acknowledgment. Folder paths travel as `/`-joined strings;
//! the structured form never crosses the wire.

use serde::{Deserialize, Serialize};

use tabletop_core::{
    GridData, LightData, MovementData, PresetData, SceneData, TokenData, Vec2, WallData,
};

/// Outbound request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    SetScene { scene: Option<String> },
    GetScene { scene: String },
    GetBlueprint { id: String },
    GetLight { id: String },

    CreateWall { data: WallData },
    ModifyWall { id: String, data: WallData },
    RemoveWall { id: String },

    CreateLight { data: LightData },
    ModifyLight { id: String, data: LightData },
    ToggleLight { id: String, enabled: bool },
    RemoveLight { id: String },

    CreatePreset { data: PresetData },
    ModifyPreset { id: String, data: PresetData },
    RemovePreset { id: String },

    CreateToken { data: TokenData },
    ModifyToken { id: String, data: TokenData },
    MoveToken { id: String, movement: MovementData },
    RotateToken { id: String, angle: f32 },
    RotateTokenLight { id: String, angle: f32, actor: String },
    LockToken { id: String, locked: bool },
    UpdateVisibility { id: String, enabled: bool },
    UpdateHealth { id: String, health: i32 },
    UpdateElevation { id: String, elevation: i32 },
    UpdateConditions { id: String, conditions: u32 },
    RemoveToken { id: String },

    CreateBlueprint { data: TokenData, path: String },
    ModifyBlueprint { id: String, data: TokenData },
    RemoveBlueprint { id: String },
    CreateBlueprintFolder { path: String, name: String },
    RenameBlueprintFolder { path: String, name: String },
    MoveBlueprintFolder { old_path: String, new_path: String },
    RemoveBlueprintFolder { path: String },
}

impl RequestBody {
    /// Wire name of the request, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetScene { .. } => "set-scene",
            Self::GetScene { .. } => "get-scene",
            Self::GetBlueprint { .. } => "get-blueprint",
            Self::GetLight { .. } => "get-light",
            Self::CreateWall { .. } => "create-wall",
            Self::ModifyWall { .. } => "modify-wall",
            Self::RemoveWall { .. } => "remove-wall",
            Self::CreateLight { .. } => "create-light",
            Self::ModifyLight { .. } => "modify-light",
            Self::ToggleLight { .. } => "toggle-light",
            Self::RemoveLight { .. } => "remove-light",
            Self::CreatePreset { .. } => "create-preset",
            Self::ModifyPreset { .. } => "modify-preset",
            Self::RemovePreset { .. } => "remove-preset",
            Self::CreateToken { .. } => "create-token",
            Self::ModifyToken { .. } => "modify-token",
            Self::MoveToken { .. } => "move-token",
            Self::RotateToken { .. } => "rotate-token",
            Self::RotateTokenLight { .. } => "rotate-token-light",
            Self::LockToken { .. } => "lock-token",
            Self::UpdateVisibility { .. } => "update-visibility",
            Self::UpdateHealth { .. } => "update-health",
            Self::UpdateElevation { .. } => "update-elevation",
            Self::UpdateConditions { .. } => "update-conditions",
            Self::RemoveToken { .. } => "remove-token",
            Self::CreateBlueprint { .. } => "create-blueprint",
            Self::ModifyBlueprint { .. } => "modify-blueprint",
            Self::RemoveBlueprint { .. } => "remove-blueprint",
            Self::CreateBlueprintFolder { .. } => "create-blueprint-folder",
            Self::RenameBlueprintFolder { .. } => "rename-blueprint-folder",
            Self::MoveBlueprintFolder { .. } => "move-blueprint-folder",
            Self::RemoveBlueprintFolder { .. } => "remove-blueprint-folder",
        }
    }
}

/// Acknowledgment payload. `Error` only rides on rejected acks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AckBody {
    None,
    Id(String),
    Scene(SceneData),
    Token(TokenData),
    Preset(PresetData),
    Error(String),
}

/// The single response correlated to one outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub body: AckBody,
}

impl Ack {
    pub fn ok(body: AckBody) -> Self {
        Self {
            success: true,
            body,
        }
    }

    pub fn ok_empty() -> Self {
        Self::ok(AckBody::None)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            body: AckBody::Error(reason.into()),
        }
    }

    /// The human-readable rejection reason carried by a failed ack.
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            AckBody::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Server-originated, unsolicited event — another client's confirmed
/// change, or a session-level notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPush {
    SetState { scene: Option<String>, synced: bool },
    UserConnected { username: String },
    UserDisconnected { username: String },
    ChangeLandingPage { id: String },

    CreateWall { data: WallData },
    ModifyWall { id: String, data: WallData },
    RemoveWall { id: String },
    ModifyGrid { data: GridData },

    CreateLight { data: LightData },
    ModifyLight { id: String, data: LightData },
    MoveLight { id: String, position: Vec2 },
    ToggleLight { id: String, enabled: bool },
    RemoveLight { id: String },

    CreatePreset { data: PresetData },
    ModifyPreset { id: String, data: PresetData },
    RemovePreset { id: String },

    CreateToken { data: TokenData },
    ModifyToken { id: String, data: TokenData },
    MoveToken { id: String, movement: MovementData },
    RotateToken { id: String, angle: f32, actor: String },
    RotateTokenLight { id: String, angle: f32, actor: String },
    LockToken { id: String, locked: bool },
    UpdateVisibility { id: String, enabled: bool },
    UpdateHealth { id: String, health: i32 },
    UpdateElevation { id: String, elevation: i32 },
    UpdateConditions { id: String, conditions: u32 },
    RemoveToken { id: String },

    CreateBlueprint { data: TokenData, path: String },
    ModifyBlueprint { id: String, data: TokenData },
    RemoveBlueprint { id: String },
    CreateBlueprintFolder { id: String, path: String, name: String },
    RenameBlueprintFolder { path: String, name: String },
    MoveBlueprintFolder { old_path: String, new_path: String },
    RemoveBlueprintFolder { path: String },
}

impl ServerPush {
    /// Wire name of the push, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetState { .. } => "set-state",
            Self::UserConnected { .. } => "user-connected",
            Self::UserDisconnected { .. } => "user-disconnected",
            Self::ChangeLandingPage { .. } => "change-landing-page",
            Self::CreateWall { .. } => "create-wall",
            Self::ModifyWall { .. } => "modify-wall",
            Self::RemoveWall { .. } => "remove-wall",
            Self::ModifyGrid { .. } => "modify-grid",
            Self::CreateLight { .. } => "create-light",
            Self::ModifyLight { .. } => "modify-light",
            Self::MoveLight { .. } => "move-light",
            Self::ToggleLight { .. } => "toggle-light",
            Self::RemoveLight { .. } => "remove-light",
            Self::CreatePreset { .. } => "create-preset",
            Self::ModifyPreset { .. } => "modify-preset",
            Self::RemovePreset { .. } => "remove-preset",
            Self::CreateToken { .. } => "create-token",
            Self::ModifyToken { .. } => "modify-token",
            Self::MoveToken { .. } => "move-token",
            Self::RotateToken { .. } => "rotate-token",
            Self::RotateTokenLight { .. } => "rotate-token-light",
            Self::LockToken { .. } => "lock-token",
            Self::UpdateVisibility { .. } => "update-visibility",
            Self::UpdateHealth { .. } => "update-health",
            Self::UpdateElevation { .. } => "update-elevation",
            Self::UpdateConditions { .. } => "update-conditions",
            Self::RemoveToken { .. } => "remove-token",
            Self::CreateBlueprint { .. } => "create-blueprint",
            Self::ModifyBlueprint { .. } => "modify-blueprint",
            Self::RemoveBlueprint { .. } => "remove-blueprint",
            Self::CreateBlueprintFolder { .. } => "create-blueprint-folder",
            Self::RenameBlueprintFolder { .. } => "rename-blueprint-folder",
            Self::MoveBlueprintFolder { .. } => "move-blueprint-folder",
            Self::RemoveBlueprintFolder { .. } => "remove-blueprint-folder",
        }
    }
}

/// Top-level wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Request { id: u64, body: RequestBody },
    Ack { id: u64, ack: Ack },
    Push { event: ServerPush },
}

impl Frame {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(frame)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::{Vec2, WallType};

    #[test]
    fn test_request_roundtrip() {
        let wall = WallData::new("w1", WallType::Wall, vec![Vec2::new(0.0, 0.0)]);
        let frame = Frame::Request {
            id: 7,
            body: RequestBody::CreateWall { data: wall.clone() },
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        match decoded {
            Frame::Request {
                id,
                body: RequestBody::CreateWall { data },
            } => {
                assert_eq!(id, 7);
                assert_eq!(data, wall);
            }
            other => panic!("Expected CreateWall request, got {other:?}"),
        }
    }

    #[test]
    fn test_ack_roundtrip() {
        let frame = Frame::Ack {
            id: 3,
            ack: Ack::ok(AckBody::Id("tok-1".into())),
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        match decoded {
            Frame::Ack { id, ack } => {
                assert_eq!(id, 3);
                assert!(ack.success);
                assert_eq!(ack.body, AckBody::Id("tok-1".into()));
            }
            other => panic!("Expected ack, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_ack_carries_reason() {
        let ack = Ack::rejected("Scene is locked");
        assert!(!ack.success);
        assert_eq!(ack.error_message(), Some("Scene is locked"));
        assert_eq!(Ack::ok_empty().error_message(), None);
    }

    #[test]
    fn test_push_roundtrip() {
        let frame = Frame::Push {
            event: ServerPush::UpdateHealth {
                id: "tok-1".into(),
                health: 5,
            },
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        match decoded {
            Frame::Push {
                event: ServerPush::UpdateHealth { id, health },
            } => {
                assert_eq!(id, "tok-1");
                assert_eq!(health, 5);
            }
            other => panic!("Expected update-health push, got {other:?}"),
        }
    }

    #[test]
    fn test_set_state_roundtrip() {
        let frame = Frame::Push {
            event: ServerPush::SetState {
                scene: Some("s1".into()),
                synced: true,
            },
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Frame::decode(&[0xFF, 0xFE, 0xFD]).is_err());
    }

    #[test]
    fn test_wire_names() {
        let body = RequestBody::MoveBlueprintFolder {
            old_path: "a/b".into(),
            new_path: "c".into(),
        };
        assert_eq!(body.name(), "move-blueprint-folder");
        let push = ServerPush::SetState {
            scene: None,
            synced: false,
        };
        assert_eq!(push.name(), "set-state");
    }

    #[test]
    fn test_small_request_is_compact() {
        let frame = Frame::Request {
            id: 1,
            body: RequestBody::RemoveToken { id: "tok-1".into() },
        };
        let encoded = frame.encode().unwrap();
        assert!(
            encoded.len() < 32,
            "remove-token frame took {} bytes",
            encoded.len()
        );
    }
}
