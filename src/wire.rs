//! JSON message shapes exchanged with clients.

use serde::{Deserialize, Serialize};

use crate::engine::{DisplayGrid, EngineState, GridEngine, LossReason, Status};

/// A participant's function in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    P1,
    P2,
    Spectator,
}

impl Role {
    /// The other player; spectators have none.
    pub fn opponent(self) -> Option<Role> {
        match self {
            Role::P1 => Some(Role::P2),
            Role::P2 => Some(Role::P1),
            Role::Spectator => None,
        }
    }
}

fn default_player() -> String {
    "single".to_string()
}

/// `{direction, player}`; `player` selects the board and defaults to `single`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub direction: String,
    #[serde(default = "default_player")]
    pub player: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResponse {
    pub grid: DisplayGrid,
    pub score: u64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LossReason>,
}

impl MoveResponse {
    pub fn from_state(engine: &GridEngine, state: &EngineState) -> Self {
        MoveResponse {
            grid: engine.display(&state.grid),
            score: state.score,
            status: state.status,
            reason: state.reason,
        }
    }
}

/// Sent to a room member once, right after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMessage {
    pub role: Role,
    pub p1_name: String,
    pub p2_name: String,
    pub board1: Option<DisplayGrid>,
    pub board2: Option<DisplayGrid>,
    pub score1: u64,
    pub score2: u64,
    pub winner: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerNames {
    pub p1_name: String,
    pub p2_name: String,
}

/// Broadcast after every accepted room move, tagged with the mover's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub role: Role,
    pub board: DisplayGrid,
    pub score: u64,
    pub winner: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    Init(JoinMessage),
    PlayerJoined(PlayerNames),
    Update(UpdateMessage),
}
