//! Two-player rooms with spectators.
//!
//! Each room lives behind its own mutex; every read-modify-write (join, move)
//! happens with that lock held, and broadcasts are queued to member channels
//! before it is released so each member sees events in commit order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::engine::{Direction, Grid, GridEngine, ParseDirectionError, Status, CLASSIC_TARGET};
use crate::user::{User, UserId};
use crate::wire::{JoinMessage, PlayerNames, Role, RoomEvent, UpdateMessage};

pub const ROOM_CODE_LEN: usize = 8;
const WAITING: &str = "Waiting...";

pub type MemberId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Empty,
    AwaitingP2,
    Active,
    Over,
}

/// Persisted room state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub code: String,
    pub player1: Option<User>,
    pub player2: Option<User>,
    pub board1: Option<Grid>,
    pub board2: Option<Grid>,
    pub score1: u64,
    pub score2: u64,
    pub winner: Option<Role>,
    pub is_over: bool,
}

impl Room {
    pub fn new(code: impl Into<String>) -> Self {
        Room {
            code: code.into(),
            player1: None,
            player2: None,
            board1: None,
            board2: None,
            score1: 0,
            score2: 0,
            winner: None,
            is_over: false,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        match (&self.player1, &self.player2) {
            _ if self.is_over => RoomPhase::Over,
            (None, _) => RoomPhase::Empty,
            (Some(_), None) => RoomPhase::AwaitingP2,
            (Some(_), Some(_)) => RoomPhase::Active,
        }
    }

    pub fn role_of(&self, user: UserId) -> Role {
        if self.player1.as_ref().is_some_and(|p| p.id == user) {
            Role::P1
        } else if self.player2.as_ref().is_some_and(|p| p.id == user) {
            Role::P2
        } else {
            Role::Spectator
        }
    }

    fn names(&self) -> PlayerNames {
        let name = |p: &Option<User>| p.as_ref().map_or_else(|| WAITING.to_string(), |u| u.name.clone());
        PlayerNames { p1_name: name(&self.player1), p2_name: name(&self.player2) }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0:?} not found")]
    RoomNotFound(String),
    #[error("spectators cannot move")]
    SpectatorMoveRejected,
    #[error("room is already over")]
    RoomAlreadyOver,
    #[error("waiting for a second player")]
    AwaitingOpponent,
    #[error(transparent)]
    InvalidDirection(#[from] ParseDirectionError),
}

impl RoomError {
    /// Errors that transports drop without replying.
    pub fn is_silent(&self) -> bool {
        matches!(self, RoomError::SpectatorMoveRejected | RoomError::RoomAlreadyOver | RoomError::AwaitingOpponent)
    }
}

struct Member {
    id: MemberId,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

struct RoomSlot {
    room: Room,
    members: Vec<Member>,
}

impl RoomSlot {
    /// Queue `event` for every member, dropping members whose receiver is gone.
    fn broadcast(&mut self, event: &RoomEvent) {
        self.members.retain(|m| m.tx.send(event.clone()).is_ok());
    }
}

/// A live membership handed back from [`RoomCoordinator::connect`].
pub struct Connection {
    pub member: MemberId,
    pub role: Role,
    pub init: JoinMessage,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
}

pub struct RoomCoordinator {
    engine: GridEngine,
    rooms: DashMap<String, Arc<Mutex<RoomSlot>>>,
    next_member: AtomicU64,
}

impl Default for RoomCoordinator {
    fn default() -> Self {
        Self::new(GridEngine::classic())
    }
}

impl RoomCoordinator {
    pub fn new(engine: GridEngine) -> Self {
        RoomCoordinator { engine, rooms: DashMap::new(), next_member: AtomicU64::new(1) }
    }

    /// Register a new empty room under a fresh code.
    pub fn create_room<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        loop {
            let code = format!("{:0width$x}", rng.gen::<u32>(), width = ROOM_CODE_LEN);
            if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                slot.insert(Arc::new(Mutex::new(RoomSlot { room: Room::new(code.clone()), members: Vec::new() })));
                tracing::debug!(room = %code, "room created");
                return code;
            }
        }
    }

    fn slot(&self, code: &str) -> Result<Arc<Mutex<RoomSlot>>, RoomError> {
        self.rooms
            .get(code)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))
    }

    /// Join `code` as `user`.
    ///
    /// Returning players keep their seat; the first two distinct users take
    /// player1 and player2, everyone after that spectates.
    pub fn connect<R: Rng + ?Sized>(&self, code: &str, user: &User, rng: &mut R) -> Result<Connection, RoomError> {
        let slot = self.slot(code)?;
        let mut slot = slot.lock();
        let room = &mut slot.room;
        let role = match room.role_of(user.id) {
            Role::Spectator if room.player1.is_none() => {
                room.player1 = Some(user.clone());
                room.board1 = Some(self.engine.new_game(rng).grid);
                room.score1 = 0;
                Role::P1
            }
            Role::Spectator if room.player2.is_none() => {
                room.player2 = Some(user.clone());
                room.board2 = Some(self.engine.new_game(rng).grid);
                room.score2 = 0;
                Role::P2
            }
            role => role,
        };
        let init = self.join_message(room, role);
        let names = room.names();

        let (tx, events) = mpsc::unbounded_channel();
        let member = self.next_member.fetch_add(1, Ordering::Relaxed);
        slot.members.push(Member { id: member, tx });
        slot.broadcast(&RoomEvent::PlayerJoined(names));
        tracing::info!(room = %code, user = user.id, ?role, members = slot.members.len(), "joined room");

        Ok(Connection { member, role, init, events })
    }

    /// Drop a member's channel. Unknown rooms and members are ignored. A
    /// finished room is evicted once its last member has left; unfinished
    /// rooms stay joinable.
    pub fn disconnect(&self, code: &str, member: MemberId) {
        let Ok(slot) = self.slot(code) else {
            return;
        };
        let evict = {
            let mut slot = slot.lock();
            slot.members.retain(|m| m.id != member);
            tracing::debug!(room = %code, member, "left room");
            slot.room.is_over && slot.members.is_empty()
        };
        if evict {
            let removed = self.rooms.remove_if(code, |_, slot| {
                let slot = slot.lock();
                slot.room.is_over && slot.members.is_empty()
            });
            if removed.is_some() {
                tracing::info!(room = %code, "room evicted");
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Apply `user`'s move and broadcast the mover's new board.
    pub fn process_move<R: Rng + ?Sized>(
        &self,
        code: &str,
        user: UserId,
        direction: &str,
        rng: &mut R,
    ) -> Result<UpdateMessage, RoomError> {
        let slot = self.slot(code)?;
        let mut slot = slot.lock();
        let room = &mut slot.room;
        if room.player1.is_none() || room.player2.is_none() {
            return Err(RoomError::AwaitingOpponent);
        }
        if room.is_over {
            return Err(RoomError::RoomAlreadyOver);
        }
        let role = room.role_of(user);
        let (board, score) = match role {
            Role::P1 => (&mut room.board1, &mut room.score1),
            Role::P2 => (&mut room.board2, &mut room.score2),
            Role::Spectator => return Err(RoomError::SpectatorMoveRejected),
        };
        // Only a seated player's direction is parsed; dropped moves stay silent.
        let dir: Direction = direction.parse()?;

        let grid = board.take().unwrap_or_else(|| self.engine.new_game(rng).grid);
        let state = self.engine.apply_move(self.engine.resume(grid, *score), dir, rng);
        *score = state.score;
        *board = Some(state.grid.clone());

        if state.grid.contains_value(CLASSIC_TARGET) {
            room.winner = Some(role);
            room.is_over = true;
        } else if state.status == Status::Lost {
            room.winner = role.opponent();
            room.is_over = true;
        }
        if room.is_over {
            tracing::info!(room = %code, winner = ?room.winner, "room over");
        }

        let update = UpdateMessage { role, board: self.engine.display(&state.grid), score: state.score, winner: room.winner };
        slot.broadcast(&RoomEvent::Update(update.clone()));
        Ok(update)
    }

    pub fn snapshot(&self, code: &str) -> Result<Room, RoomError> {
        Ok(self.slot(code)?.lock().room.clone())
    }

    pub fn member_count(&self, code: &str) -> Result<usize, RoomError> {
        Ok(self.slot(code)?.lock().members.len())
    }

    fn join_message(&self, room: &Room, role: Role) -> JoinMessage {
        let names = room.names();
        JoinMessage {
            role,
            p1_name: names.p1_name,
            p2_name: names.p2_name,
            board1: room.board1.as_ref().map(|g| self.engine.display(g)),
            board2: room.board2.as_ref().map(|g| self.engine.display(g)),
            score1: room.score1,
            score2: room.score2,
            winner: room.winner,
        }
    }
}
