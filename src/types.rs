use serde::{Deserialize, Serialize};

/// A secret venue with the role labels available to non-spy players.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub roles: Vec<String>,
}

/// A player record inside a room.
///
/// `id` is the stable handle that survives reconnects; `conn_id` is the
/// transport identity of the current websocket and is rebound on reconnect.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub conn_id: String,
    pub name: String,
    pub is_host: bool,
    pub connected: bool,
    pub role: Option<String>,
}

impl Player {
    pub fn new(conn_id: String, name: String, is_host: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conn_id,
            name,
            is_host,
            connected: true,
            role: None,
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            is_host: self.is_host,
            connected: self.connected,
        }
    }
}

/// The roster entry sent to clients. Never carries roles or the spy flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub connected: bool,
}

/// Host-configurable room settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoomSettings {
    pub game_length_minutes: u64,
    pub is_public: bool,
}

/// Room phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Voting,
    Guessing,
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Voting => write!(f, "VOTING"),
            Self::Guessing => write!(f, "GUESSING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

/// Which side won a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Spy,
    Citizens,
}

/// A public-room directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRoomInfo {
    pub room_code: String,
    pub host_name: String,
    pub player_count: usize,
}

/// The in-game state returned to a reconnecting player so the client can
/// render the current phase immediately instead of replaying from the start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub status: RoomStatus,
    pub role: Option<String>,
    pub is_spy: bool,
    pub location: String,
    pub candidate_locations: Vec<String>,
    pub remaining_seconds: u64,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMsg {
    RoomJoined {
        room_code: String,
        roster: Vec<PlayerInfo>,
        is_host: bool,
        settings: RoomSettings,
        snapshot: Option<GameSnapshot>,
    },
    RosterUpdate {
        roster: Vec<PlayerInfo>,
    },
    SettingsUpdated {
        game_length_minutes: u64,
        is_public: bool,
    },
    /// Per-recipient: the spy sees an obscured location and never learns
    /// which catalog entry is the real one.
    GameStarted {
        role: String,
        is_spy: bool,
        location: String,
        candidate_locations: Vec<String>,
        remaining_seconds: u64,
        start_time: u64,
    },
    VotingStarted,
    GuessingStarted,
    GameOver {
        winner: Winner,
        reason: String,
        true_location: String,
    },
    RoomReset,
    PublicRooms {
        rooms: Vec<PublicRoomInfo>,
    },
    ErrorMessage {
        message: String,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    CreateRoom {
        name: String,
    },
    JoinRoom {
        room_code: String,
        name: String,
    },
    UpdateSettings {
        room_code: String,
        #[serde(default)]
        game_length_minutes: Option<u64>,
        #[serde(default)]
        is_public: Option<bool>,
    },
    StartGame {
        room_code: String,
    },
    Vote {
        room_code: String,
        suspect_id: String,
    },
    SpyGuessLocation {
        room_code: String,
        location_name: String,
    },
    ResetGame {
        room_code: String,
    },
    GetPublicRooms,
}
