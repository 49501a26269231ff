use std::sync::Arc;
use std::time::Duration;

use duel_2048::agent::AgentConfig;
use duel_2048::clock::SystemClock;
use duel_2048::records::MemoryRecords;
use duel_2048::server::{serve, Reply, Services};
use duel_2048::wire::{Role, RoomEvent};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr, id: u64, name: &str) -> Self {
        let (read, write) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut client = TestClient { lines: BufReader::new(read).lines(), write };
        client.send(&format!(r#"{{"op":"hello","user":{{"id":{id},"name":"{name}"}}}}"#)).await;
        assert!(matches!(client.reply().await, Reply::Welcome { .. }));
        client
    }

    async fn send(&mut self, line: &str) {
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn line(&mut self) -> Value {
        let line = timeout(Duration::from_secs(5), self.lines.next_line()).await.unwrap().unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    async fn reply(&mut self) -> Reply {
        serde_json::from_value(self.line().await).unwrap()
    }

    async fn event(&mut self) -> RoomEvent {
        serde_json::from_value(self.line().await).unwrap()
    }
}

async fn start_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let services = Arc::new(Services::new(MemoryRecords::new(), Arc::new(SystemClock), AgentConfig::default()));
    tokio::spawn(serve(listener, services));
    addr
}

#[tokio::test]
async fn two_players_and_a_spectator_share_a_room() {
    let addr = start_server().await;
    let mut ann = TestClient::connect(addr, 1, "ann").await;
    let mut bob = TestClient::connect(addr, 2, "bob").await;
    let mut cat = TestClient::connect(addr, 3, "cat").await;

    ann.send(r#"{"op":"create_room"}"#).await;
    let code = match ann.reply().await {
        Reply::RoomCreated { room } => room,
        other => panic!("unexpected reply {other:?}"),
    };
    assert_eq!(code.len(), 8);

    ann.send(&format!(r#"{{"op":"join_room","room":"{code}"}}"#)).await;
    match ann.event().await {
        RoomEvent::Init(init) => {
            assert_eq!(init.role, Role::P1);
            assert_eq!(init.p2_name, "Waiting...");
            assert!(init.board2.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(ann.event().await, RoomEvent::PlayerJoined(_)));

    // Moves before the opponent arrives are dropped without a reply.
    ann.send(r#"{"op":"room_move","direction":"left"}"#).await;
    ann.send(r#"{"op":"best_score","mode":"2PLAYER"}"#).await;
    assert!(matches!(ann.reply().await, Reply::BestScore { score: 0, .. }));

    bob.send(&format!(r#"{{"op":"join_room","room":"{code}"}}"#)).await;
    match bob.event().await {
        RoomEvent::Init(init) => {
            assert_eq!(init.role, Role::P2);
            assert_eq!(init.p1_name, "ann");
            assert!(init.board1.is_some() && init.board2.is_some());
        }
        other => panic!("unexpected event {other:?}"),
    }
    match ann.event().await {
        RoomEvent::PlayerJoined(names) => assert_eq!((names.p1_name.as_str(), names.p2_name.as_str()), ("ann", "bob")),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(bob.event().await, RoomEvent::PlayerJoined(_)));

    cat.send(&format!(r#"{{"op":"join_room","room":"{code}"}}"#)).await;
    match cat.event().await {
        RoomEvent::Init(init) => assert_eq!(init.role, Role::Spectator),
        other => panic!("unexpected event {other:?}"),
    }
    for client in [&mut ann, &mut bob, &mut cat] {
        assert!(matches!(client.event().await, RoomEvent::PlayerJoined(_)));
    }

    // The spectator is ignored; the next line anyone sees is bob's update.
    cat.send(r#"{"op":"room_move","direction":"up"}"#).await;
    for dir in ["left", "right", "up", "down"] {
        bob.send(&format!(r#"{{"op":"room_move","direction":"{dir}"}}"#)).await;
    }
    let mut seen = 0;
    for client in [&mut ann, &mut bob, &mut cat] {
        match client.event().await {
            RoomEvent::Update(update) => {
                assert_eq!(update.role, Role::P2);
                assert_eq!(update.winner, None);
                seen += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(seen, 3);

    // A spectator's unparsable move is dropped too; a player's gets an error.
    cat.send(r#"{"op":"room_move","direction":"sideways"}"#).await;
    cat.send(r#"{"op":"best_score","mode":"2PLAYER"}"#).await;
    loop {
        match cat.line().await {
            v if v["type"] == "best_score" => break,
            v => assert_eq!(v["type"], "update"),
        }
    }
    bob.send(r#"{"op":"room_move","direction":"sideways"}"#).await;
    loop {
        match bob.line().await {
            v if v["type"] == "error" => break,
            v => assert_eq!(v["type"], "update"),
        }
    }
}

#[tokio::test]
async fn joining_an_unknown_room_is_an_error() {
    let addr = start_server().await;
    let mut ann = TestClient::connect(addr, 1, "ann").await;
    ann.send(r#"{"op":"join_room","room":"00000000"}"#).await;
    match ann.reply().await {
        Reply::Error { error } => assert!(error.contains("not found"), "{error}"),
        other => panic!("unexpected reply {other:?}"),
    }
    ann.send(r#"{"op":"room_move","direction":"left"}"#).await;
    assert_eq!(ann.reply().await, Reply::Error { error: "not in a room".into() });
}
