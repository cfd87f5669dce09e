// SPDX-License-Identifier: LGPL-3.0-or-later

//! End-to-end exercise of spec.md §8 scenario S3: importing a player list,
//! feeding a status line, ticking `GameState` against the `RulesEngine`, and
//! confirming `Overwatch` issues exactly one `say_party` warning over RCON.

use bd_core::config::RconCredentials;
use bd_core::model::SteamId;
use bd_core::overwatch::Overwatch;
use bd_core::rcon::RconConnection;
use bd_core::rules::RulesEngine;
use bd_core::rules::schema::{FileInfo, PlayerList, PlayerListEntry, PlayerListSteamId};
use bd_core::state::{GameState, GameStateHandle};
use bd_core::store::sqlite::SqliteStore;
use bd_core::store::PlayerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

const CHEATER_STEAM_ID: u64 = 76561197960265851;

async fn fake_rcon_server(listener: TcpListener, expect_cmd_prefix: &'static str) {
    let (mut stream, _) = listener.accept().await.unwrap();
    rcon_test_support::serve_one_exchange(&mut stream, expect_cmd_prefix).await;
}

mod rcon_test_support {
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct Packet {
        id: i32,
        kind: i32,
        body: String,
    }

    async fn write_packet(stream: &mut TcpStream, id: i32, kind: i32, body: &str) {
        let mut payload = Vec::with_capacity(body.len() + 10);
        payload.extend_from_slice(&id.to_le_bytes());
        payload.extend_from_slice(&kind.to_le_bytes());
        payload.extend_from_slice(body.as_bytes());
        payload.push(0);
        payload.push(0);
        let size = payload.len() as i32;
        stream.write_all(&size.to_le_bytes()).await.unwrap();
        stream.write_all(&payload).await.unwrap();
        stream.flush().await.unwrap();
    }

    async fn read_packet(stream: &mut TcpStream) -> Packet {
        let mut size_buf = [0u8; 4];
        stream.read_exact(&mut size_buf).await.unwrap();
        let size = i32::from_le_bytes(size_buf) as usize;
        let mut body_buf = vec![0u8; size];
        stream.read_exact(&mut body_buf).await.unwrap();
        let mut cursor = Cursor::new(&body_buf);
        let mut i32_buf = [0u8; 4];
        cursor.read_exact(&mut i32_buf).unwrap();
        let id = i32::from_le_bytes(i32_buf);
        cursor.read_exact(&mut i32_buf).unwrap();
        let kind = i32::from_le_bytes(i32_buf);
        let body = String::from_utf8_lossy(&body_buf[8..size - 2]).into_owned();
        Packet { id, kind, body }
    }

    pub async fn serve_one_exchange(stream: &mut TcpStream, expect_cmd_prefix: &str) {
        let auth = read_packet(stream).await;
        write_packet(stream, -1, 0, "").await;
        write_packet(stream, auth.id, 2, "").await;

        let cmd = read_packet(stream).await;
        assert!(
            cmd.body.starts_with(expect_cmd_prefix),
            "unexpected rcon command: {}",
            cmd.body
        );
        let sentinel = read_packet(stream).await;
        write_packet(stream, cmd.id, 0, "").await;
        write_packet(stream, sentinel.id, 0, "").await;
    }
}

#[tokio::test]
async fn matched_player_triggers_exactly_one_chat_warning_s3() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(fake_rcon_server(listener, "say_party \"Player is a bot:"));

    let rcon = Arc::new(RconConnection::new(RconCredentials {
        host: addr.ip().to_string(),
        port: addr.port(),
        password: "secret".to_string(),
    }));

    let rules = Arc::new(RwLock::new(RulesEngine::new()));
    rules.write().await.import_players(
        "remote",
        &PlayerList {
            file_info: FileInfo::default(),
            players: vec![PlayerListEntry {
                steamid: PlayerListSteamId::Numeric(CHEATER_STEAM_ID),
                attributes: vec!["cheater".to_string()],
                last_seen: None,
            }],
        },
    );

    let store: Arc<dyn PlayerStore> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let (profile_tx, _profile_rx) = mpsc::channel(16);
    let mut game_state = GameState::new(store, profile_tx, None, Duration::from_secs(60));
    game_state
        .apply(bd_core::ingest::LogEvent::StatusId {
            timestamp: chrono::Utc::now(),
            user_id: 7,
            name: "Knyfe".to_string(),
            steam_id: SteamId(CHEATER_STEAM_ID),
            connected: Duration::from_secs(1),
            ping: 20,
        })
        .await;

    let matches = game_state.tick(&rules).await;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].origin, "remote");

    let state = GameStateHandle::new(game_state);
    let mut overwatch = Overwatch::new(state, rcon.clone(), None, true, false);
    overwatch.review(matches).await;

    server.await.unwrap();
}
