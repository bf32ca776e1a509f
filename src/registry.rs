use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};

use crate::config::GameConfig;
use crate::room::{self, RoomCommand, RoomEvent, RoomState};
use crate::types::{Location, Player, PlayerInfo, PublicRoomInfo, RoomSettings};

const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A cheap handle to a live room: its command channel in, its event
/// channel out.
#[derive(Clone)]
pub struct RoomHandle {
    pub code: String,
    pub cmd_tx: mpsc::Sender<RoomCommand>,
    pub event_tx: broadcast::Sender<RoomEvent>,
}

/// What `create_room` hands back so the gateway can reply to the host
/// without a round-trip through the room task.
pub struct NewRoom {
    pub handle: RoomHandle,
    pub host: PlayerInfo,
    pub settings: RoomSettings,
}

/// Process-wide collection of live rooms. The only shared mutable state in
/// the server; everything inside a room belongs to that room's task.
pub struct Registry {
    /// room code -> handle
    pub rooms: DashMap<String, RoomHandle>,
    /// conn_id -> room code, for routing disconnects.
    pub conn_rooms: DashMap<String, String>,
    /// Read-only projection: public rooms still waiting for players.
    /// Maintained by each room task after its own mutations.
    pub public_rooms: DashMap<String, PublicRoomInfo>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            conn_rooms: DashMap::new(),
            public_rooms: DashMap::new(),
        })
    }

    /// Samples short codes until one is free. Collisions just retry; with a
    /// 36^6 code space the loop terminates fast at any plausible room count.
    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| {
                    char::from(ROOM_CODE_CHARSET[rng.random_range(0..ROOM_CODE_CHARSET.len())])
                })
                .collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    /// Creates a room in the waiting phase with a single connected host
    /// player and spawns its task.
    pub fn create_room(
        self: &Arc<Self>,
        host_conn: String,
        host_name: String,
        catalog: Arc<Vec<Location>>,
        cfg: &GameConfig,
    ) -> NewRoom {
        let code = self.generate_code();
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let host = Player::new(host_conn.clone(), host_name, true);
        let host_info = host.info();

        let handle = RoomHandle {
            code: code.clone(),
            cmd_tx: cmd_tx.clone(),
            event_tx: event_tx.clone(),
        };

        // Inserting before the task starts reserves the code against
        // concurrent create_room calls.
        self.rooms.insert(code.clone(), handle.clone());
        self.conn_rooms.insert(host_conn, code.clone());

        let state = RoomState::new(code.clone(), host, catalog, cfg, cmd_tx);
        let settings = state.settings();
        tokio::spawn(room::room_task(state, cmd_rx, event_tx, self.clone()));

        tracing::info!("room {} created", code);

        NewRoom {
            handle,
            host: host_info,
            settings,
        }
    }

    pub fn find_room(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|entry| entry.value().clone())
    }

    /// The public-room directory: rooms flagged public and still waiting.
    pub fn list_public(&self) -> Vec<PublicRoomInfo> {
        self.public_rooms
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Called by a room task when its roster empties (and on task end).
    pub fn remove_room(&self, code: &str) {
        self.rooms.remove(code);
        self.public_rooms.remove(code);
        self.conn_rooms.retain(|_, c| c != code);
    }
}
