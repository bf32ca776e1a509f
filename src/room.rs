use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::config::GameConfig;
use crate::error::GameError;
use crate::registry::Registry;
use crate::roles;
use crate::types::*;
use crate::vote;

/// How long a disconnected player's seat and assignment are preserved.
const DISCONNECT_GRACE_SECS: u64 = 120;

/// The spy may voluntarily guess during the final minute of the round.
const SPY_GUESS_WINDOW_SECS: u64 = 60;

/// Commands the WebSocket gateway (and the room's own timers) send to a
/// room task. Timer callbacks re-enter the room through this channel, so
/// every mutation of room state happens on the single task that owns it.
#[derive(Debug, Clone)]
pub enum RoomCommand {
    Join {
        conn_id: String,
        name: String,
    },
    UpdateSettings {
        conn_id: String,
        game_length_minutes: Option<u64>,
        is_public: Option<bool>,
    },
    StartGame {
        conn_id: String,
    },
    Vote {
        conn_id: String,
        suspect_id: String,
    },
    GuessLocation {
        conn_id: String,
        location_name: String,
    },
    ResetGame {
        conn_id: String,
    },
    Disconnect {
        conn_id: String,
    },
    /// The game countdown ran out. Carries the generation it was armed
    /// with so a stale timer from a previous game is ignored.
    CountdownElapsed {
        generation: u64,
    },
    /// A disconnected player's grace period ran out without a rejoin.
    GraceExpired {
        player_id: String,
    },
}

impl RoomCommand {
    /// The connection a validation error should be reported to, if any.
    fn origin(&self) -> Option<&str> {
        match self {
            Self::Join { conn_id, .. }
            | Self::UpdateSettings { conn_id, .. }
            | Self::StartGame { conn_id }
            | Self::Vote { conn_id, .. }
            | Self::GuessLocation { conn_id, .. }
            | Self::ResetGame { conn_id }
            | Self::Disconnect { conn_id } => Some(conn_id),
            Self::CountdownElapsed { .. } | Self::GraceExpired { .. } => None,
        }
    }
}

/// Events fanned out from a room to WebSocket connections.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Send a message to a specific connection.
    SendTo { conn_id: String, msg: ServerMsg },
    /// Broadcast a message to every connection in the room.
    Broadcast { msg: ServerMsg },
}

/// The authoritative state of one room, owned by its task.
pub struct RoomState {
    code: String,
    status: RoomStatus,
    players: Vec<Player>,
    game_length_secs: u64,
    is_public: bool,
    min_players: usize,
    location: Option<Location>,
    spy_id: Option<String>,
    started_at: Option<Instant>,
    /// (voter player id, suspect player id), in arrival order.
    votes: Vec<(String, String)>,
    countdown: Option<JoinHandle<()>>,
    countdown_gen: u64,
    grace_timers: HashMap<String, JoinHandle<()>>,
    catalog: Arc<Vec<Location>>,
    cmd_tx: mpsc::Sender<RoomCommand>,
}

impl RoomState {
    pub(crate) fn new(
        code: String,
        host: Player,
        catalog: Arc<Vec<Location>>,
        cfg: &GameConfig,
        cmd_tx: mpsc::Sender<RoomCommand>,
    ) -> Self {
        Self {
            code,
            status: RoomStatus::Waiting,
            players: vec![host],
            game_length_secs: cfg.default_game_length_minutes * 60,
            is_public: false,
            min_players: cfg.min_players.max(1),
            location: None,
            spy_id: None,
            started_at: None,
            votes: Vec::new(),
            countdown: None,
            countdown_gen: 0,
            grace_timers: HashMap::new(),
            catalog,
            cmd_tx,
        }
    }

    pub(crate) fn settings(&self) -> RoomSettings {
        RoomSettings {
            game_length_minutes: self.game_length_secs / 60,
            is_public: self.is_public,
        }
    }

    fn roster(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(Player::info).collect()
    }

    fn player_by_conn(&self, conn_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.conn_id == conn_id && p.connected)
    }

    fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    fn candidate_locations(&self) -> Vec<String> {
        self.catalog.iter().map(|l| l.name.clone()).collect()
    }

    fn true_location(&self) -> String {
        self.location.as_ref().map(|l| l.name.clone()).unwrap_or_default()
    }

    /// Server-computed countdown, derived from the start instant and the
    /// configured duration. Client clocks never factor in.
    fn remaining_secs(&self) -> u64 {
        match self.started_at {
            Some(started) => self
                .game_length_secs
                .saturating_sub(started.elapsed().as_secs()),
            None => 0,
        }
    }

    fn broadcast(&self, tx: &broadcast::Sender<RoomEvent>, msg: ServerMsg) {
        let _ = tx.send(RoomEvent::Broadcast { msg });
    }

    fn send_to(&self, tx: &broadcast::Sender<RoomEvent>, conn_id: &str, msg: ServerMsg) {
        let _ = tx.send(RoomEvent::SendTo {
            conn_id: conn_id.to_string(),
            msg,
        });
    }

    fn broadcast_roster(&self, tx: &broadcast::Sender<RoomEvent>) {
        self.broadcast(tx, ServerMsg::RosterUpdate { roster: self.roster() });
    }

    /// Keeps the public-room directory in step with this room. Called after
    /// every roster, settings, or phase mutation.
    fn sync_public(&self, registry: &Registry) {
        if self.is_public && self.status == RoomStatus::Waiting && !self.players.is_empty() {
            let host_name = self
                .players
                .iter()
                .find(|p| p.is_host)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            registry.public_rooms.insert(
                self.code.clone(),
                PublicRoomInfo {
                    room_code: self.code.clone(),
                    host_name,
                    player_count: self.connected_count(),
                },
            );
        } else {
            registry.public_rooms.remove(&self.code);
        }
    }

    /// Arms the game countdown. Any previously armed countdown is dead from
    /// here on: its handle is aborted and its generation no longer matches.
    fn arm_countdown(&mut self) {
        self.cancel_countdown();
        self.countdown_gen += 1;
        let generation = self.countdown_gen;
        let secs = self.game_length_secs;
        let cmd_tx = self.cmd_tx.clone();
        self.countdown = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = cmd_tx.send(RoomCommand::CountdownElapsed { generation }).await;
        }));
    }

    fn cancel_countdown(&mut self) {
        self.countdown_gen += 1;
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }

    fn schedule_grace(&mut self, player_id: String) {
        let cmd_tx = self.cmd_tx.clone();
        let id = player_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(DISCONNECT_GRACE_SECS)).await;
            let _ = cmd_tx.send(RoomCommand::GraceExpired { player_id: id }).await;
        });
        self.grace_timers.insert(player_id, handle);
    }

    fn cancel_grace(&mut self, player_id: &str) {
        if let Some(handle) = self.grace_timers.remove(player_id) {
            handle.abort();
        }
    }

    /// The state snapshot a reconnecting player needs to resume mid-game.
    fn snapshot_for(&self, idx: usize) -> GameSnapshot {
        let player = &self.players[idx];
        let is_spy = self.spy_id.as_deref() == Some(player.id.as_str());
        GameSnapshot {
            status: self.status,
            role: player.role.clone(),
            is_spy,
            location: if is_spy {
                roles::HIDDEN_LOCATION.to_string()
            } else {
                self.true_location()
            },
            candidate_locations: self.candidate_locations(),
            remaining_seconds: self.remaining_secs(),
        }
    }
}

/// Runs one room to completion. All mutation of the room's state happens
/// here, commands and timer callbacks alike, so no locking is needed.
pub(crate) async fn room_task(
    mut state: RoomState,
    mut cmd_rx: mpsc::Receiver<RoomCommand>,
    event_tx: broadcast::Sender<RoomEvent>,
    registry: Arc<Registry>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let origin = cmd.origin().map(str::to_string);

        let result = match cmd {
            RoomCommand::Join { conn_id, name } => {
                handle_join(&mut state, &event_tx, &registry, conn_id, name)
            }
            RoomCommand::UpdateSettings {
                conn_id,
                game_length_minutes,
                is_public,
            } => handle_update_settings(
                &mut state,
                &event_tx,
                &registry,
                conn_id,
                game_length_minutes,
                is_public,
            ),
            RoomCommand::StartGame { conn_id } => {
                handle_start_game(&mut state, &event_tx, &registry, conn_id)
            }
            RoomCommand::Vote { conn_id, suspect_id } => {
                handle_vote(&mut state, &event_tx, conn_id, suspect_id)
            }
            RoomCommand::GuessLocation { conn_id, location_name } => {
                handle_guess(&mut state, &event_tx, conn_id, location_name)
            }
            RoomCommand::ResetGame { conn_id } => {
                handle_reset(&mut state, &event_tx, &registry, conn_id)
            }
            RoomCommand::Disconnect { conn_id } => {
                handle_disconnect(&mut state, &event_tx, &registry, conn_id);
                Ok(())
            }
            RoomCommand::CountdownElapsed { generation } => {
                handle_countdown_elapsed(&mut state, &event_tx, generation);
                Ok(())
            }
            RoomCommand::GraceExpired { player_id } => {
                handle_grace_expired(&mut state, &event_tx, &registry, player_id);
                Ok(())
            }
        };

        if let Err(err) = result {
            if let Some(conn_id) = origin {
                state.send_to(&event_tx, &conn_id, ServerMsg::ErrorMessage {
                    message: err.to_string(),
                });
            }
        }

        // A room lives exactly as long as its roster. Disconnected players
        // stay on the roster until their grace period runs out, so an empty
        // roster also means no grace timer is pending.
        if state.players.is_empty() {
            break;
        }
    }

    state.cancel_countdown();
    for (_, handle) in state.grace_timers.drain() {
        handle.abort();
    }
    registry.remove_room(&state.code);
    tracing::info!("room {} closed", state.code);
}

fn handle_join(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    conn_id: String,
    name: String,
) -> Result<(), GameError> {
    if let Some(idx) = state.players.iter().position(|p| p.name == name) {
        if state.players[idx].connected {
            return Err(GameError::NameAlreadyConnected(name));
        }
        return handle_rejoin(state, tx, registry, idx, conn_id);
    }

    // Fresh names only join a room that has not started yet.
    if state.status != RoomStatus::Waiting {
        return Err(GameError::GameAlreadyInProgress);
    }

    let player = Player::new(conn_id.clone(), name.clone(), false);
    state.players.push(player);
    registry.conn_rooms.insert(conn_id.clone(), state.code.clone());

    state.send_to(tx, &conn_id, ServerMsg::RoomJoined {
        room_code: state.code.clone(),
        roster: state.roster(),
        is_host: false,
        settings: state.settings(),
        snapshot: None,
    });
    state.broadcast_roster(tx);
    state.sync_public(registry);

    tracing::info!("{} joined room {}", name, state.code);
    Ok(())
}

/// Rebinds a disconnected player's seat to a new connection and replies with
/// everything the client needs to resume, including the current phase and the
/// authoritative remaining time.
fn handle_rejoin(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    idx: usize,
    conn_id: String,
) -> Result<(), GameError> {
    let (old_conn, player_id, is_host) = {
        let player = &mut state.players[idx];
        let old_conn = std::mem::replace(&mut player.conn_id, conn_id.clone());
        player.connected = true;
        (old_conn, player.id.clone(), player.is_host)
    };

    state.cancel_grace(&player_id);
    registry.conn_rooms.remove(&old_conn);
    registry.conn_rooms.insert(conn_id.clone(), state.code.clone());

    let snapshot = (state.status != RoomStatus::Waiting).then(|| state.snapshot_for(idx));
    state.send_to(tx, &conn_id, ServerMsg::RoomJoined {
        room_code: state.code.clone(),
        roster: state.roster(),
        is_host,
        settings: state.settings(),
        snapshot,
    });
    state.broadcast_roster(tx);
    state.sync_public(registry);

    tracing::info!("player reconnected to room {}", state.code);
    Ok(())
}

fn handle_update_settings(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    conn_id: String,
    game_length_minutes: Option<u64>,
    is_public: Option<bool>,
) -> Result<(), GameError> {
    let sender = state.player_by_conn(&conn_id).ok_or(GameError::NotHost)?;
    if !sender.is_host {
        return Err(GameError::NotHost);
    }
    if state.status != RoomStatus::Waiting {
        return Err(GameError::WrongPhase);
    }

    if let Some(minutes) = game_length_minutes {
        state.game_length_secs = minutes.max(1) * 60;
    }
    if let Some(public) = is_public {
        state.is_public = public;
    }

    let settings = state.settings();
    state.broadcast(tx, ServerMsg::SettingsUpdated {
        game_length_minutes: settings.game_length_minutes,
        is_public: settings.is_public,
    });
    state.sync_public(registry);
    Ok(())
}

fn handle_start_game(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    conn_id: String,
) -> Result<(), GameError> {
    let sender = state.player_by_conn(&conn_id).ok_or(GameError::NotHost)?;
    if !sender.is_host {
        return Err(GameError::NotHost);
    }
    if state.status != RoomStatus::Waiting {
        return Err(GameError::GameAlreadyInProgress);
    }
    if state.players.len() < state.min_players {
        return Err(GameError::NotEnoughPlayers(state.min_players));
    }

    let mut rng = rand::rng();
    let deal = roles::assign(&mut rng, &state.players, &state.catalog);

    for assignment in &deal.assignments {
        if let Some(player) = state.players.iter_mut().find(|p| p.id == assignment.player_id) {
            player.role = Some(assignment.role.clone());
        }
    }
    state.location = Some(deal.location);
    state.spy_id = Some(deal.spy_id);
    state.votes.clear();
    state.status = RoomStatus::Playing;
    state.started_at = Some(Instant::now());
    let start_epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    // Each player gets an individualized payload; the spy's copy carries the
    // obscured location and a catalog list with the true entry unmarked.
    let candidates = state.candidate_locations();
    for assignment in &deal.assignments {
        let Some(player) = state.players.iter().find(|p| p.id == assignment.player_id) else {
            continue;
        };
        if !player.connected {
            continue;
        }
        state.send_to(tx, &player.conn_id, ServerMsg::GameStarted {
            role: assignment.role.clone(),
            is_spy: assignment.is_spy,
            location: assignment.location.clone(),
            candidate_locations: candidates.clone(),
            remaining_seconds: state.game_length_secs,
            start_time: start_epoch_ms,
        });
    }

    state.arm_countdown();
    state.sync_public(registry);

    tracing::info!("game started in room {}", state.code);
    Ok(())
}

fn handle_vote(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    conn_id: String,
    suspect_id: String,
) -> Result<(), GameError> {
    // Commands are validated against the status at processing time; a vote
    // that raced a phase change is judged by the phase it landed in.
    if state.status != RoomStatus::Voting {
        return Err(GameError::WrongPhase);
    }
    let Some(voter) = state.player_by_conn(&conn_id) else {
        return Ok(());
    };
    let voter_id = voter.id.clone();

    // One vote per round; re-votes are ignored, not surfaced.
    if state.votes.iter().any(|(v, _)| *v == voter_id) {
        return Ok(());
    }
    if !state.players.iter().any(|p| p.id == suspect_id) {
        return Err(GameError::UnknownSuspect);
    }

    state.votes.push((voter_id, suspect_id));
    maybe_conclude_vote(state, tx);
    Ok(())
}

/// Concludes the voting round once every connected player has voted.
fn maybe_conclude_vote(state: &mut RoomState, tx: &broadcast::Sender<RoomEvent>) {
    if state.status != RoomStatus::Voting {
        return;
    }

    // Votes cast by players who have since disconnected do not count.
    let connected: Vec<String> = state
        .players
        .iter()
        .filter(|p| p.connected)
        .map(|p| p.id.clone())
        .collect();
    state.votes.retain(|(voter, _)| connected.contains(voter));

    if !vote::concluded(state.votes.len(), connected.len()) {
        return;
    }

    let roster_order: Vec<String> = state.players.iter().map(|p| p.id.clone()).collect();
    let Some(accused) = vote::plurality(&state.votes, &roster_order) else {
        return;
    };

    if state.spy_id.as_deref() == Some(accused.as_str()) {
        // The spy was caught but gets a last chance to guess the location.
        state.status = RoomStatus::Guessing;
        state.broadcast(tx, ServerMsg::GuessingStarted);
        tracing::info!("spy accused in room {}", state.code);
    } else {
        finish_game(
            state,
            tx,
            Winner::Spy,
            "citizens accused the wrong person".to_string(),
        );
    }
}

fn handle_guess(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    conn_id: String,
    location_name: String,
) -> Result<(), GameError> {
    let sender = state.player_by_conn(&conn_id).ok_or(GameError::NotTheSpy)?;
    if state.spy_id.as_deref() != Some(sender.id.as_str()) {
        return Err(GameError::NotTheSpy);
    }

    match state.status {
        // Voluntary mid-game guess, only inside the final minute.
        RoomStatus::Playing => {
            if state.remaining_secs() > SPY_GUESS_WINDOW_SECS {
                return Err(GameError::GuessTooEarly);
            }
        }
        RoomStatus::Guessing => {}
        _ => return Err(GameError::WrongPhase),
    }

    let true_location = state.true_location();
    if location_name == true_location {
        finish_game(state, tx, Winner::Spy, "correct guess".to_string());
    } else {
        finish_game(
            state,
            tx,
            Winner::Citizens,
            format!("wrong guess, the location was {}", true_location),
        );
    }
    Ok(())
}

fn finish_game(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    winner: Winner,
    reason: String,
) {
    state.cancel_countdown();
    state.status = RoomStatus::Finished;
    let true_location = state.true_location();
    state.broadcast(tx, ServerMsg::GameOver {
        winner,
        reason,
        true_location,
    });
    tracing::info!("game over in room {}: {:?} win", state.code, winner);
}

fn handle_reset(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    conn_id: String,
) -> Result<(), GameError> {
    let sender = state.player_by_conn(&conn_id).ok_or(GameError::NotHost)?;
    if !sender.is_host {
        return Err(GameError::NotHost);
    }
    if state.status != RoomStatus::Finished {
        return Err(GameError::WrongPhase);
    }

    state.cancel_countdown();
    state.location = None;
    state.spy_id = None;
    state.votes.clear();
    state.started_at = None;
    for player in &mut state.players {
        player.role = None;
    }
    state.status = RoomStatus::Waiting;

    state.broadcast(tx, ServerMsg::RoomReset);
    state.broadcast_roster(tx);
    state.sync_public(registry);

    tracing::info!("room {} reset", state.code);
    Ok(())
}

fn handle_disconnect(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    conn_id: String,
) {
    registry.conn_rooms.remove(&conn_id);

    let Some(player) = state
        .players
        .iter_mut()
        .find(|p| p.conn_id == conn_id && p.connected)
    else {
        return;
    };

    // The seat stays on the roster, flagged, until the grace period runs out.
    player.connected = false;
    let player_id = player.id.clone();
    state.schedule_grace(player_id);

    state.broadcast_roster(tx);
    state.sync_public(registry);

    // A pending round must not wait on someone who just left.
    maybe_conclude_vote(state, tx);
}

fn handle_countdown_elapsed(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    generation: u64,
) {
    // Stale timers (canceled, reset, or superseded) are dropped here.
    if generation != state.countdown_gen || state.status != RoomStatus::Playing {
        return;
    }
    state.countdown = None;
    state.status = RoomStatus::Voting;
    state.broadcast(tx, ServerMsg::VotingStarted);
    tracing::info!("voting started in room {}", state.code);
}

fn handle_grace_expired(
    state: &mut RoomState,
    tx: &broadcast::Sender<RoomEvent>,
    registry: &Arc<Registry>,
    player_id: String,
) {
    state.grace_timers.remove(&player_id);

    let Some(idx) = state
        .players
        .iter()
        .position(|p| p.id == player_id && !p.connected)
    else {
        return;
    };

    let removed = state.players.remove(idx);
    state.votes.retain(|(voter, _)| *voter != player_id);
    tracing::info!("{} timed out of room {}", removed.name, state.code);

    if state.players.is_empty() {
        // The task loop tears the room down.
        return;
    }

    state.broadcast_roster(tx);
    state.sync_public(registry);

    // A round cannot go on without its spy; Guessing in particular would
    // wedge, since only the spy can act there.
    let spy_gone = state.spy_id.as_deref() == Some(player_id.as_str());
    let in_game = matches!(
        state.status,
        RoomStatus::Playing | RoomStatus::Voting | RoomStatus::Guessing
    );
    if spy_gone && in_game {
        finish_game(state, tx, Winner::Citizens, "the spy left the game".to_string());
        return;
    }

    maybe_conclude_vote(state, tx);
}
