//! Newline-delimited JSON over TCP.
//!
//! Every request line gets at most one reply line. Once a client joins a room,
//! room events (`init`, `player_joined`, `update`) are interleaved as extra
//! lines. Each connection owns its own [`Session`] and RNG.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::AgentConfig;
use crate::clock::Clock;
use crate::engine::GridEngine;
use crate::records::{GameMode, RecordSink};
use crate::room::{MemberId, RoomCoordinator};
use crate::session::{Seat, Session, SessionCoordinator};
use crate::user::User;
use crate::wire::{MoveRequest, MoveResponse, RoomEvent};

/// Shared state behind every connection.
pub struct Services<S> {
    pub sessions: SessionCoordinator<S>,
    pub rooms: RoomCoordinator,
}

impl<S: RecordSink> Services<S> {
    pub fn new(sink: S, clock: Arc<dyn Clock>, agent: AgentConfig) -> Self {
        Services {
            sessions: SessionCoordinator::new(sink, clock.clone()).with_agent_config(agent),
            rooms: RoomCoordinator::new(GridEngine::new(crate::engine::Variant::Classic, clock)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { user: User },
    Start { mode: GameMode },
    Move(MoveRequest),
    AiMove,
    BestScore { mode: GameMode },
    CreateRoom,
    JoinRoom { room: String },
    RoomMove { direction: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatBoard {
    pub seat: Seat,
    pub board: MoveResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Welcome { user: User },
    Started { mode: GameMode, boards: Vec<SeatBoard> },
    State(MoveResponse),
    BestScore { mode: GameMode, score: u64 },
    RoomCreated { room: String },
    Error { error: String },
}

impl Reply {
    fn error(err: impl std::fmt::Display) -> Self {
        Reply::Error { error: err.to_string() }
    }
}

/// Accept clients forever. Failed accepts are logged and retried.
pub async fn serve<S: RecordSink + 'static>(listener: TcpListener, services: Arc<Services<S>>) -> anyhow::Result<()> {
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                let delay = accept_backoff(&err);
                tracing::warn!(?delay, "accept failed: {err}");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        tracing::info!(%addr, "client connected");
        let services = Arc::clone(&services);
        tokio::spawn(async move {
            if let Err(err) = handle_client(socket, addr, services).await {
                tracing::warn!(%addr, "client failed: {err:#}");
            }
            tracing::info!(%addr, "client disconnected");
        });
    }
}

/// Pause before the next accept. Errors tied to one pending connection retry
/// immediately; anything else (fd exhaustion, out of memory) backs off.
fn accept_backoff(err: &io::Error) -> Duration {
    match err.kind() {
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted => Duration::ZERO,
        _ => Duration::from_millis(100),
    }
}

async fn handle_client<S: RecordSink + 'static>(
    socket: TcpStream,
    addr: SocketAddr,
    services: Arc<Services<S>>,
) -> anyhow::Result<()> {
    let (read, mut write) = socket.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(mut line) = out_rx.recv().await {
            line.push('\n');
            write.write_all(line.as_bytes()).await?;
        }
        anyhow::Ok(())
    });

    let mut client = Client::new(out_tx);
    let read_result = read_requests(&mut client, BufReader::new(read).lines(), addr, &services).await;
    // Runs on read errors too, so a dropped socket never stays a room member.
    client.leave_room(&services);
    drop(client);
    let write_result = writer.await?;
    read_result.and(write_result)
}

async fn read_requests<S: RecordSink + 'static>(
    client: &mut Client,
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    addr: SocketAddr,
    services: &Services<S>,
) -> anyhow::Result<()> {
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Request>(trimmed) {
            Ok(req) => client.handle(services, req),
            Err(err) => {
                tracing::debug!(%addr, "bad request line: {err}");
                Some(Reply::error(format_args!("bad request: {err}")))
            }
        };
        if let Some(reply) = reply {
            client.send(&reply);
        }
    }
    Ok(())
}

struct JoinedRoom {
    code: String,
    member: MemberId,
    forward: JoinHandle<()>,
}

/// Per-connection state.
struct Client {
    user: Option<User>,
    session: Option<Session>,
    room: Option<JoinedRoom>,
    rng: StdRng,
    out: mpsc::UnboundedSender<String>,
}

impl Client {
    fn new(out: mpsc::UnboundedSender<String>) -> Self {
        Client { user: None, session: None, room: None, rng: StdRng::from_entropy(), out }
    }

    fn send<T: Serialize>(&self, msg: &T) {
        match serde_json::to_string(msg) {
            Ok(line) => {
                let _ = self.out.send(line);
            }
            Err(err) => tracing::warn!("failed to encode reply: {err}"),
        }
    }

    fn handle<S: RecordSink + 'static>(&mut self, services: &Services<S>, req: Request) -> Option<Reply> {
        let req = match req {
            Request::Hello { user } => {
                self.session = Some(Session::new(user.id));
                self.user = Some(user.clone());
                return Some(Reply::Welcome { user });
            }
            Request::JoinRoom { room } => {
                let Some(user) = self.user.clone() else {
                    return Some(Reply::error("say hello first"));
                };
                return self.join_room(services, &user, room);
            }
            other => other,
        };
        let Some(user) = self.user.clone() else {
            return Some(Reply::error("say hello first"));
        };
        let sessions = &services.sessions;
        let rng = &mut self.rng;
        let session = self.session.get_or_insert_with(|| Session::new(user.id));

        match req {
            Request::Hello { .. } | Request::JoinRoom { .. } => None,
            Request::Start { mode } => {
                let boards = sessions
                    .start(session, mode, rng)
                    .into_iter()
                    .map(|(seat, board)| SeatBoard { seat, board })
                    .collect();
                Some(Reply::Started { mode, boards })
            }
            Request::Move(MoveRequest { direction, player }) => {
                Some(sessions.apply_move(session, &player, &direction, rng).map_or_else(Reply::error, Reply::State))
            }
            Request::AiMove => Some(sessions.agent_move(session, rng).map_or_else(Reply::error, Reply::State)),
            Request::BestScore { mode } => Some(
                sessions
                    .best_score(user.id, mode)
                    .map_or_else(Reply::error, |score| Reply::BestScore { mode, score }),
            ),
            Request::CreateRoom => Some(Reply::RoomCreated { room: services.rooms.create_room(rng) }),
            Request::RoomMove { direction } => match &self.room {
                None => Some(Reply::error("not in a room")),
                Some(joined) => match services.rooms.process_move(&joined.code, user.id, &direction, rng) {
                    Ok(_) => None,
                    Err(err) if err.is_silent() => {
                        tracing::debug!(room = %joined.code, user = user.id, "ignored room move: {err}");
                        None
                    }
                    Err(err) => Some(Reply::error(err)),
                },
            },
        }
    }

    fn join_room<S: RecordSink + 'static>(&mut self, services: &Services<S>, user: &User, code: String) -> Option<Reply> {
        self.leave_room(services);
        let conn = match services.rooms.connect(&code, user, &mut self.rng) {
            Ok(conn) => conn,
            Err(err) => return Some(Reply::error(err)),
        };
        self.send(&RoomEvent::Init(conn.init));

        let out = self.out.clone();
        let mut events = conn.events;
        let forward = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        if out.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!("failed to encode room event: {err}"),
                }
            }
        });
        self.room = Some(JoinedRoom { code, member: conn.member, forward });
        None
    }

    fn leave_room<S: RecordSink + 'static>(&mut self, services: &Services<S>) {
        if let Some(joined) = self.room.take() {
            services.rooms.disconnect(&joined.code, joined.member);
            joined.forward.abort();
        }
    }
}
