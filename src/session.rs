//! Single-client game sessions: binds a move intent to the right board,
//! applies mode-specific win detection and keeps the record sink current.
//!
//! A [`Session`] is plain data owned by the caller (one per client). The
//! [`SessionCoordinator`] is shared and stateless apart from its sink, so any
//! number of sessions can be driven from one coordinator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentConfig};
use crate::clock::Clock;
use crate::engine::{Direction, EngineState, Grid, GridEngine, ParseDirectionError, Status, Variant, CLASSIC_TARGET};
use crate::records::{GameMode, RecordError, RecordId, RecordSink, RecordUpdate};
use crate::user::UserId;
use crate::wire::MoveResponse;

/// A board slot inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Single,
    #[serde(rename = "single_6x6")]
    Hard,
    P1,
    P2,
    UserAi,
    /// The computer's board in versus-AI mode; only driven by the agent.
    AgentAi,
}

impl Seat {
    /// Map a client `player` token to a seat. Unknown tokens play the
    /// single-player board.
    pub fn from_token(token: &str) -> Seat {
        match token {
            "single_6x6" => Seat::Hard,
            "p1" => Seat::P1,
            "p2" => Seat::P2,
            "user_ai" => Seat::UserAi,
            _ => Seat::Single,
        }
    }

    pub fn mode(self) -> GameMode {
        match self {
            Seat::Single => GameMode::Easy,
            Seat::Hard => GameMode::Hard6x6,
            Seat::P1 | Seat::P2 => GameMode::TwoPlayer,
            Seat::UserAi | Seat::AgentAi => GameMode::VersusAi,
        }
    }

    pub fn variant(self) -> Variant {
        match self {
            Seat::Hard => Variant::Bomb,
            _ => Variant::Classic,
        }
    }

    /// The other side of a two-party mode.
    pub fn opponent(self) -> Option<Seat> {
        match self {
            Seat::P1 => Some(Seat::P2),
            Seat::P2 => Some(Seat::P1),
            Seat::UserAi => Some(Seat::AgentAi),
            Seat::AgentAi => Some(Seat::UserAi),
            Seat::Single | Seat::Hard => None,
        }
    }

    pub fn seats_for(mode: GameMode) -> &'static [Seat] {
        match mode {
            GameMode::Easy => &[Seat::Single],
            GameMode::Hard6x6 => &[Seat::Hard],
            GameMode::TwoPlayer => &[Seat::P1, Seat::P2],
            GameMode::VersusAi => &[Seat::UserAi, Seat::AgentAi],
        }
    }
}

/// Persisted form of one board: absolute grid plus score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBoard {
    pub grid: Grid,
    pub score: u64,
}

/// Per-client state. Serializable so a transport can park it anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user: UserId,
    boards: HashMap<Seat, StoredBoard>,
    records: HashMap<GameMode, RecordId>,
    finished: HashSet<GameMode>,
}

impl Session {
    pub fn new(user: UserId) -> Self {
        Session { user, boards: HashMap::new(), records: HashMap::new(), finished: HashSet::new() }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn board(&self, seat: Seat) -> Option<&StoredBoard> {
        self.boards.get(&seat)
    }

    /// Install a board directly, e.g. when restoring from storage.
    pub fn set_board(&mut self, seat: Seat, grid: Grid, score: u64) {
        self.boards.insert(seat, StoredBoard { grid, score });
    }

    pub fn record_id(&self, mode: GameMode) -> Option<RecordId> {
        self.records.get(&mode).copied()
    }

    /// Whether the current game of `mode` has ended. Callers gate moves on
    /// this; the coordinator itself does not.
    pub fn is_finished(&self, mode: GameMode) -> bool {
        self.finished.contains(&mode)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no game started for {0:?}")]
    UninitializedSession(Seat),
    #[error(transparent)]
    InvalidDirection(#[from] ParseDirectionError),
    #[error("record sink failed: {0}")]
    Record(#[from] RecordError),
}

pub struct SessionCoordinator<S> {
    classic: GridEngine,
    bomb: GridEngine,
    agent: AgentConfig,
    sink: S,
}

impl<S: RecordSink> SessionCoordinator<S> {
    pub fn new(sink: S, clock: Arc<dyn Clock>) -> Self {
        SessionCoordinator {
            classic: GridEngine::new(Variant::Classic, clock.clone()),
            bomb: GridEngine::new(Variant::Bomb, clock),
            agent: AgentConfig::default(),
            sink,
        }
    }

    pub fn with_agent_config(mut self, cfg: AgentConfig) -> Self {
        self.agent = cfg;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn engine(&self, seat: Seat) -> &GridEngine {
        match seat.variant() {
            Variant::Classic => &self.classic,
            Variant::Bomb => &self.bomb,
        }
    }

    /// Deal fresh boards for every seat of `mode` and forget its record.
    pub fn start<R: Rng + ?Sized>(&self, session: &mut Session, mode: GameMode, rng: &mut R) -> Vec<(Seat, MoveResponse)> {
        session.records.remove(&mode);
        session.finished.remove(&mode);
        Seat::seats_for(mode)
            .iter()
            .map(|&seat| {
                let engine = self.engine(seat);
                let state = engine.new_game(rng);
                let resp = MoveResponse::from_state(engine, &state);
                session.set_board(seat, state.grid, state.score);
                (seat, resp)
            })
            .collect()
    }

    /// Apply a client move to the board selected by `player`.
    ///
    /// The session is only written once the record sink has accepted the
    /// update, so a sink failure leaves the board as it was.
    pub fn apply_move<R: Rng + ?Sized>(
        &self,
        session: &mut Session,
        player: &str,
        direction: &str,
        rng: &mut R,
    ) -> Result<MoveResponse, SessionError> {
        let seat = Seat::from_token(player);
        let board = session.board(seat).ok_or(SessionError::UninitializedSession(seat))?;
        let dir: Direction = direction.parse()?;
        let engine = self.engine(seat);
        let state = self.play(engine, board, dir, rng);

        let mode = seat.mode();
        let id = match session.record_id(mode) {
            Some(id) => id,
            None => {
                let id = self.sink.create_session(session.user, mode, engine.now_ms())?;
                session.records.insert(mode, id);
                id
            }
        };
        if let Some(update) = self.record_update(session, seat, &state, engine.now_ms()) {
            self.sink.update_session(id, update)?;
            if update.finished {
                session.finished.insert(mode);
                tracing::info!(user = session.user, %mode, score = update.score, "game finished");
            }
        }

        let resp = MoveResponse::from_state(engine, &state);
        session.set_board(seat, state.grid, state.score);
        Ok(resp)
    }

    /// Let the agent play one move on the versus-AI computer board.
    pub fn agent_move<R: Rng + ?Sized>(&self, session: &mut Session, rng: &mut R) -> Result<MoveResponse, SessionError> {
        let seat = Seat::AgentAi;
        let board = session.board(seat).ok_or(SessionError::UninitializedSession(seat))?;
        let engine = self.engine(seat);
        let mut agent = Agent::with_config(engine.clone(), self.agent.clone());
        let dir = agent.best_move(&board.grid, rng);
        let state = self.play(engine, board, dir, rng);

        if let Some(id) = session.record_id(seat.mode()) {
            if let Some(update) = self.record_update(session, seat, &state, engine.now_ms()) {
                self.sink.update_session(id, update)?;
                session.finished.insert(seat.mode());
                tracing::info!(user = session.user, score = update.score, "versus-ai game finished");
            }
        }

        let resp = MoveResponse::from_state(engine, &state);
        session.set_board(seat, state.grid, state.score);
        Ok(resp)
    }

    pub fn best_score(&self, user: UserId, mode: GameMode) -> Result<u64, SessionError> {
        Ok(self.sink.best_score(user, mode)?)
    }

    fn play<R: Rng + ?Sized>(&self, engine: &GridEngine, board: &StoredBoard, dir: Direction, rng: &mut R) -> EngineState {
        let state = engine.resume(board.grid.clone(), board.score);
        let mut state = engine.apply_move(state, dir, rng);
        if engine.variant() == Variant::Classic && state.grid.contains_value(CLASSIC_TARGET) {
            state.status = Status::Won;
        }
        state
    }

    /// What the sink should record after `seat` reached `state`, if anything.
    fn record_update(&self, session: &Session, seat: Seat, state: &EngineState, now_ms: u64) -> Option<RecordUpdate> {
        let finish = |score| Some(RecordUpdate { score, finished: true, end_ms: Some(now_ms) });
        match (seat, state.status) {
            (_, Status::Won) => finish(state.score),
            (Seat::Single | Seat::Hard, Status::Lost) => finish(state.score),
            (_, Status::Lost) => {
                let other = seat.opponent().and_then(|s| session.board(s)).map_or(0, |b| b.score);
                finish(other)
            }
            (Seat::Single | Seat::Hard | Seat::UserAi, Status::Continue) => {
                Some(RecordUpdate { score: state.score, finished: false, end_ms: None })
            }
            (Seat::P1 | Seat::P2 | Seat::AgentAi, Status::Continue) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{DisplayCell, LossReason};
    use crate::records::MemoryRecords;
    use rand::{rngs::StdRng, SeedableRng};

    fn coordinator() -> (SessionCoordinator<MemoryRecords>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (SessionCoordinator::new(MemoryRecords::new(), clock.clone()), clock)
    }

    fn rows(rows: &[[u32; 4]]) -> Grid {
        Grid::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn it_maps_player_tokens() {
        assert_eq!(Seat::from_token("single_6x6"), Seat::Hard);
        assert_eq!(Seat::from_token("user_ai"), Seat::UserAi);
        assert_eq!(Seat::from_token("garbage"), Seat::Single);
        assert_eq!(Seat::Hard.variant(), Variant::Bomb);
        assert_eq!(Seat::P2.mode(), GameMode::TwoPlayer);
    }

    #[test]
    fn it_requires_a_started_game() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(0);
        let err = coord.apply_move(&mut session, "p1", "left", &mut rng).unwrap_err();
        assert!(matches!(err, SessionError::UninitializedSession(Seat::P1)));
        let err = coord.agent_move(&mut session, &mut rng).unwrap_err();
        assert!(matches!(err, SessionError::UninitializedSession(Seat::AgentAi)));
    }

    #[test]
    fn it_rejects_bad_directions_without_touching_the_board() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(1);
        coord.start(&mut session, GameMode::Easy, &mut rng);
        let before = session.board(Seat::Single).cloned();
        let err = coord.apply_move(&mut session, "single", "sideways", &mut rng).unwrap_err();
        assert!(matches!(err, SessionError::InvalidDirection(_)));
        assert_eq!(session.board(Seat::Single).cloned(), before);
        assert!(coord.sink().all().is_empty());
    }

    #[test]
    fn it_starts_every_seat_of_a_mode() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(2);
        let dealt = coord.start(&mut session, GameMode::VersusAi, &mut rng);
        assert_eq!(dealt.iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![Seat::UserAi, Seat::AgentAi]);
        for (seat, resp) in dealt {
            assert_eq!(resp.status, Status::Continue);
            assert_eq!(session.board(seat).unwrap().grid.count_empty(), 14);
        }
        let hard = coord.start(&mut session, GameMode::Hard6x6, &mut rng);
        assert_eq!(hard[0].1.grid.len(), 6);
    }

    #[test]
    fn it_records_single_player_progress() {
        let (coord, _) = coordinator();
        let mut session = Session::new(9);
        let mut rng = StdRng::seed_from_u64(3);
        coord.start(&mut session, GameMode::Easy, &mut rng);
        session.set_board(Seat::Single, rows(&[[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]), 10);

        let resp = coord.apply_move(&mut session, "single", "left", &mut rng).unwrap();
        assert_eq!(resp.score, 14);
        let id = session.record_id(GameMode::Easy).unwrap();
        let rec = coord.sink().get(id).unwrap();
        assert_eq!((rec.user, rec.mode, rec.score, rec.finished), (9, GameMode::Easy, 14, false));
        assert_eq!(coord.best_score(9, GameMode::Easy).unwrap(), 14);
        assert_eq!(coord.best_score(9, GameMode::Hard6x6).unwrap(), 0);
    }

    #[test]
    fn it_forces_a_win_on_the_classic_target() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(4);
        coord.start(&mut session, GameMode::TwoPlayer, &mut rng);
        session.set_board(Seat::P1, rows(&[[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]]), 500);

        let resp = coord.apply_move(&mut session, "p1", "left", &mut rng).unwrap();
        assert_eq!(resp.status, Status::Won);
        let rec = coord.sink().get(session.record_id(GameMode::TwoPlayer).unwrap()).unwrap();
        assert_eq!(rec.score, 2548);
        assert!(rec.finished && rec.end_ms.is_some());
        assert!(session.is_finished(GameMode::TwoPlayer));
    }

    #[test]
    fn it_credits_the_opponent_when_a_side_loses() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(5);
        coord.start(&mut session, GameMode::TwoPlayer, &mut rng);
        let stuck = rows(&[[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]);
        session.set_board(Seat::P1, stuck.clone(), 40);
        session.set_board(Seat::P2, rows(&[[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]), 77);

        let resp = coord.apply_move(&mut session, "p1", "left", &mut rng).unwrap();
        assert_eq!(resp.status, Status::Lost);
        assert_eq!(session.board(Seat::P1).unwrap().grid, stuck);
        let rec = coord.sink().get(session.record_id(GameMode::TwoPlayer).unwrap()).unwrap();
        assert_eq!(rec.score, 77);
        assert!(rec.finished);
    }

    #[test]
    fn it_skips_record_updates_for_running_local_versus() {
        let (coord, _) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(6);
        coord.start(&mut session, GameMode::TwoPlayer, &mut rng);
        session.set_board(Seat::P2, rows(&[[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]), 0);
        coord.apply_move(&mut session, "p2", "left", &mut rng).unwrap();
        let rec = coord.sink().get(session.record_id(GameMode::TwoPlayer).unwrap()).unwrap();
        assert_eq!(rec.score, 0);
        assert!(!rec.finished);
    }

    #[test]
    fn it_lets_the_agent_finish_a_versus_game() {
        let (coord, _) = coordinator();
        let mut session = Session::new(3);
        let mut rng = StdRng::seed_from_u64(7);
        coord.start(&mut session, GameMode::VersusAi, &mut rng);

        // No record yet: the agent plays but nothing is written.
        coord.agent_move(&mut session, &mut rng).unwrap();
        assert!(coord.sink().all().is_empty());

        session.set_board(Seat::UserAi, rows(&[[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]), 0);
        coord.apply_move(&mut session, "user_ai", "right", &mut rng).unwrap();
        session.set_board(Seat::UserAi, rows(&[[2, 0, 0, 0], [0; 4], [0; 4], [0; 4]]), 321);

        let stuck = rows(&[[2, 4, 2, 4], [4, 2, 4, 2], [2, 4, 2, 4], [4, 2, 4, 2]]);
        session.set_board(Seat::AgentAi, stuck, 64);
        let resp = coord.agent_move(&mut session, &mut rng).unwrap();
        assert_eq!(resp.status, Status::Lost);
        let rec = coord.sink().get(session.record_id(GameMode::VersusAi).unwrap()).unwrap();
        assert_eq!(rec.score, 321);
        assert!(rec.finished);
        assert!(session.is_finished(GameMode::VersusAi));
    }

    #[test]
    fn it_keeps_absolute_deadlines_in_hard_mode() {
        let (coord, clock) = coordinator();
        let mut session = Session::new(1);
        let mut rng = StdRng::seed_from_u64(8);
        coord.start(&mut session, GameMode::Hard6x6, &mut rng);
        let mut grid = Grid::empty(6);
        grid.set(0, 0, Some(crate::engine::Tile::bomb(16, crate::engine::Fuse::for_value(16, clock.now_ms()))));
        grid.set(5, 5, Some(crate::engine::Tile::new(2)));
        session.set_board(Seat::Hard, grid, 0);

        clock.advance(10_000);
        let resp = coord.apply_move(&mut session, "single_6x6", "down", &mut rng).unwrap();
        assert_eq!(resp.status, Status::Continue);
        let stored = &session.board(Seat::Hard).unwrap().grid;
        let bomb = stored.tiles().find(|t| t.fuse().is_some()).unwrap();
        assert_eq!(bomb.fuse().unwrap().deadline_ms, 1_000_000 + 30_000);
        assert!(resp.grid.iter().flatten().any(|c| matches!(c, DisplayCell::Tile { remaining_ms: 20_000, .. })));

        clock.advance(20_000);
        let resp = coord.apply_move(&mut session, "single_6x6", "up", &mut rng).unwrap();
        assert_eq!((resp.status, resp.reason), (Status::Lost, Some(LossReason::BombExploded)));
        assert!(session.is_finished(GameMode::Hard6x6));
    }
}
