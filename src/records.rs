//! Game record sink: the narrow persistence interface the coordinators write
//! scores through.
//!
//! Two implementations are provided: [`MemoryRecords`] for tests and embedded
//! use, and [`JsonlRecords`], an append-only JSON Lines log where every create
//! or update appends the full record and the last line per id wins on reload.

use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::user::UserId;

pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMode {
    #[serde(rename = "EASY")]
    Easy,
    #[serde(rename = "HARD_6X6")]
    Hard6x6,
    #[serde(rename = "2PLAYER")]
    TwoPlayer,
    #[serde(rename = "VERSUS_AI")]
    VersusAi,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Easy => "EASY",
            GameMode::Hard6x6 => "HARD_6X6",
            GameMode::TwoPlayer => "2PLAYER",
            GameMode::VersusAi => "VERSUS_AI",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown game mode {0:?}")]
pub struct ParseModeError(pub String);

impl FromStr for GameMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EASY" => Ok(GameMode::Easy),
            "HARD_6X6" => Ok(GameMode::Hard6x6),
            "2PLAYER" => Ok(GameMode::TwoPlayer),
            "VERSUS_AI" => Ok(GameMode::VersusAi),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: RecordId,
    pub user: UserId,
    pub mode: GameMode,
    pub score: u64,
    pub start_ms: u64,
    pub end_ms: Option<u64>,
    pub finished: bool,
}

impl GameRecord {
    /// Elapsed time, up to `now_ms` while the game is still running.
    pub fn duration_ms(&self, now_ms: u64) -> u64 {
        self.end_ms.unwrap_or(now_ms).saturating_sub(self.start_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordUpdate {
    pub score: u64,
    pub finished: bool,
    pub end_ms: Option<u64>,
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown record {0}")]
    UnknownRecord(RecordId),
}

pub trait RecordSink: Send + Sync {
    fn create_session(&self, user: UserId, mode: GameMode, start_ms: u64) -> Result<RecordId, RecordError>;

    fn update_session(&self, id: RecordId, update: RecordUpdate) -> Result<(), RecordError>;

    /// Highest recorded score for `user` in `mode`, `0` when none.
    fn best_score(&self, user: UserId, mode: GameMode) -> Result<u64, RecordError>;
}

fn apply_update(record: &mut GameRecord, update: RecordUpdate) {
    record.score = update.score;
    record.finished = update.finished;
    if update.end_ms.is_some() {
        record.end_ms = update.end_ms;
    }
}

fn best_of<'a>(records: impl Iterator<Item = &'a GameRecord>, user: UserId, mode: GameMode) -> u64 {
    records
        .filter(|r| r.user == user && r.mode == mode)
        .map(|r| r.score)
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Default)]
pub struct MemoryRecords {
    records: Mutex<Vec<GameRecord>>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<GameRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn all(&self) -> Vec<GameRecord> {
        self.records.lock().clone()
    }
}

impl RecordSink for MemoryRecords {
    fn create_session(&self, user: UserId, mode: GameMode, start_ms: u64) -> Result<RecordId, RecordError> {
        let mut records = self.records.lock();
        let id = records.len() as RecordId + 1;
        records.push(GameRecord { id, user, mode, score: 0, start_ms, end_ms: None, finished: false });
        Ok(id)
    }

    fn update_session(&self, id: RecordId, update: RecordUpdate) -> Result<(), RecordError> {
        let mut records = self.records.lock();
        let record = records.iter_mut().find(|r| r.id == id).ok_or(RecordError::UnknownRecord(id))?;
        apply_update(record, update);
        Ok(())
    }

    fn best_score(&self, user: UserId, mode: GameMode) -> Result<u64, RecordError> {
        Ok(best_of(self.records.lock().iter(), user, mode))
    }
}

struct JsonlState {
    latest: HashMap<RecordId, GameRecord>,
    next_id: RecordId,
    file: File,
    /// Bytes of complete lines in `file`.
    len: u64,
}

/// Append-only JSON Lines record log.
pub struct JsonlRecords {
    path: PathBuf,
    state: Mutex<JsonlState>,
}

impl JsonlRecords {
    /// Open (or create) the log at `path`, replaying existing lines.
    ///
    /// A last line that does not parse is a write torn by a crash; it is cut
    /// off the file. Unparsable lines before it are an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let mut latest = HashMap::new();
        let mut len = 0u64;
        let mut unterminated = false;
        if path.exists() {
            let mut reader = BufReader::new(File::open(&path)?);
            let mut line = Vec::with_capacity(128);
            loop {
                line.clear();
                let n = reader.read_until(b'\n', &mut line)?;
                if n == 0 {
                    break;
                }
                let complete = line.ends_with(b"\n");
                let last = !complete || reader.fill_buf()?.is_empty();
                if line.iter().all(u8::is_ascii_whitespace) {
                    len += n as u64;
                    unterminated = !complete;
                    continue;
                }
                match serde_json::from_slice::<GameRecord>(&line) {
                    Ok(rec) => {
                        latest.insert(rec.id, rec);
                        len += n as u64;
                        unterminated = !complete;
                    }
                    Err(err) if last => {
                        tracing::warn!(path = %path.display(), offset = len, "dropping torn record line: {err}");
                        break;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        let next_id = latest.keys().max().map_or(1, |id| id + 1);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() != len {
            file.set_len(len)?;
        }
        if unterminated {
            file.write_all(b"\n")?;
            len += 1;
        }
        tracing::debug!(path = %path.display(), records = latest.len(), "opened record log");
        Ok(Self { path, state: Mutex::new(JsonlState { latest, next_id, file, len }) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: RecordId) -> Option<GameRecord> {
        self.state.lock().latest.get(&id).cloned()
    }
}

fn append_line(state: &mut JsonlState, rec: &GameRecord) -> Result<(), RecordError> {
    let mut buf = Vec::with_capacity(128);
    serde_json::to_writer(&mut buf, rec)?;
    buf.push(b'\n');
    if let Err(err) = state.file.write_all(&buf).and_then(|()| state.file.flush()) {
        // Cut any partial line so later appends start on a line boundary.
        if let Err(cut) = state.file.set_len(state.len) {
            tracing::warn!(len = state.len, "failed to truncate record log: {cut}");
        }
        return Err(err.into());
    }
    state.len += buf.len() as u64;
    Ok(())
}

impl RecordSink for JsonlRecords {
    fn create_session(&self, user: UserId, mode: GameMode, start_ms: u64) -> Result<RecordId, RecordError> {
        let mut state = self.state.lock();
        let id = state.next_id;
        let rec = GameRecord { id, user, mode, score: 0, start_ms, end_ms: None, finished: false };
        append_line(&mut state, &rec)?;
        state.next_id += 1;
        state.latest.insert(id, rec);
        Ok(id)
    }

    fn update_session(&self, id: RecordId, update: RecordUpdate) -> Result<(), RecordError> {
        let mut state = self.state.lock();
        let mut rec = state.latest.get(&id).cloned().ok_or(RecordError::UnknownRecord(id))?;
        apply_update(&mut rec, update);
        append_line(&mut state, &rec)?;
        state.latest.insert(id, rec);
        Ok(())
    }

    fn best_score(&self, user: UserId, mode: GameMode) -> Result<u64, RecordError> {
        Ok(best_of(self.state.lock().latest.values(), user, mode))
    }
}
