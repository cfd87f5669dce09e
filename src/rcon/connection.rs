// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::config::RconCredentials;
use crate::error::RconError;
use std::io::{self, Cursor};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PACKET_SIZE: usize = 4096 + 12;

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

async fn write_packet(stream: &mut TcpStream, id: i32, kind: i32, body: &str) -> io::Result<()> {
    let mut payload = Vec::with_capacity(body.len() + 10);
    payload.extend_from_slice(&id.to_le_bytes());
    payload.extend_from_slice(&kind.to_le_bytes());
    payload.extend_from_slice(body.as_bytes());
    payload.push(0);
    payload.push(0);
    let size = payload.len() as i32;
    stream.write_all(&size.to_le_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.flush().await
}

async fn read_packet(stream: &mut TcpStream) -> io::Result<Packet> {
    let mut size_buf = [0u8; 4];
    stream.read_exact(&mut size_buf).await?;
    let size = i32::from_le_bytes(size_buf) as usize;
    if size < 10 || size > MAX_PACKET_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "rcon packet size out of bounds"));
    }
    let mut body_buf = vec![0u8; size];
    stream.read_exact(&mut body_buf).await?;
    let mut cursor = Cursor::new(&body_buf);
    let mut i32_buf = [0u8; 4];
    cursor.read_exact(&mut i32_buf)?;
    let id = i32::from_le_bytes(i32_buf);
    cursor.read_exact(&mut i32_buf)?;
    let kind = i32::from_le_bytes(i32_buf);
    let body_bytes = &body_buf[8..size.saturating_sub(2)];
    let body = String::from_utf8_lossy(body_bytes).into_owned();
    Ok(Packet { id, kind, body })
}

struct Dialed {
    stream: TcpStream,
    next_id: i32,
}

impl Dialed {
    fn next_request_id(&mut self) -> i32 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }
}

/// Single TCP connection to the game's RCON endpoint (spec.md §4.8). All
/// callers serialize through `inner`'s lock; at most one `exec` is ever
/// in flight against the wire.
pub struct RconConnection {
    credentials: RconCredentials,
    inner: Mutex<Option<Dialed>>,
}

impl RconConnection {
    pub fn new(credentials: RconCredentials) -> Self {
        Self {
            credentials,
            inner: Mutex::new(None),
        }
    }

    /// Runs `cmd`, (re)dialing first if there's no live connection. A
    /// transport error invalidates the connection so the *next* call re-dials;
    /// it never retries within this call.
    pub async fn exec(&self, cmd: &str) -> Result<String, RconError> {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            *guard = Some(self.dial().await?);
        }

        let result = Self::exec_on(guard.as_mut().expect("populated above"), cmd).await;
        if result.is_err() {
            *guard = None;
        }
        result
    }

    /// Idempotent: a second call on an already-closed connection is a no-op.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        *guard = None;
    }

    async fn dial(&self) -> Result<Dialed, RconError> {
        let addr = self.credentials.addr();
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| RconError::ConnectTimeout)??;
        let mut dialed = Dialed { stream, next_id: 0 };
        self.authenticate(&mut dialed).await?;
        Ok(dialed)
    }

    async fn authenticate(&self, dialed: &mut Dialed) -> Result<(), RconError> {
        let auth_id = dialed.next_request_id();
        write_packet(&mut dialed.stream, auth_id, SERVERDATA_AUTH, &self.credentials.password).await?;

        // The reference server implementation emits an empty
        // SERVERDATA_RESPONSE_VALUE immediately before SERVERDATA_AUTH_RESPONSE.
        let first = read_packet(&mut dialed.stream).await?;
        let response = if first.kind == SERVERDATA_RESPONSE_VALUE {
            read_packet(&mut dialed.stream).await?
        } else {
            first
        };

        if response.kind != SERVERDATA_AUTH_RESPONSE || response.id == -1 {
            return Err(RconError::AuthFailed);
        }
        Ok(())
    }

    /// Immediately follows `cmd` with an empty sentinel `SERVERDATA_EXECCOMMAND`.
    /// The Source engine echoes the sentinel's id back once the real response
    /// has been fully flushed, so reading until that id arrives reassembles
    /// multi-packet replies without depending on packet boundaries matching
    /// command boundaries (spec.md §4.8).
    async fn exec_on(dialed: &mut Dialed, cmd: &str) -> Result<String, RconError> {
        let cmd_id = dialed.next_request_id();
        write_packet(&mut dialed.stream, cmd_id, SERVERDATA_EXECCOMMAND, cmd).await?;
        let sentinel_id = dialed.next_request_id();
        write_packet(&mut dialed.stream, sentinel_id, SERVERDATA_EXECCOMMAND, "").await?;

        let mut body = String::new();
        loop {
            let packet = read_packet(&mut dialed.stream).await?;
            if packet.id == sentinel_id {
                break;
            }
            if packet.id == cmd_id {
                body.push_str(&packet.body);
            } else {
                return Err(RconError::Desync);
            }
        }
        Ok(body)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr.to_string())
    }

    #[tokio::test]
    async fn authenticates_then_reassembles_multi_packet_response_s5() {
        let (listener, addr) = fake_server().await;
        let parts: Vec<&str> = addr.splitn(2, ':').collect();
        let creds = RconCredentials {
            host: parts[0].to_string(),
            port: parts[1].parse().unwrap(),
            password: "secret".to_string(),
        };

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let auth = read_packet(&mut stream).await.unwrap();
            assert_eq!(auth.kind, SERVERDATA_AUTH);
            write_packet(&mut stream, -1, SERVERDATA_RESPONSE_VALUE, "").await.unwrap();
            write_packet(&mut stream, auth.id, SERVERDATA_AUTH_RESPONSE, "").await.unwrap();

            let cmd1 = read_packet(&mut stream).await.unwrap();
            assert_eq!(cmd1.body, "status;tf_lobby_debug");
            let sentinel1 = read_packet(&mut stream).await.unwrap();
            write_packet(&mut stream, cmd1.id, SERVERDATA_RESPONSE_VALUE, "hostname: test\n").await.unwrap();
            write_packet(&mut stream, cmd1.id, SERVERDATA_RESPONSE_VALUE, "map: ctf_2fort\n").await.unwrap();
            write_packet(&mut stream, sentinel1.id, SERVERDATA_RESPONSE_VALUE, "").await.unwrap();

            stream
        });

        let conn = RconConnection::new(creds);
        let response = conn.exec("status;tf_lobby_debug").await.unwrap();
        assert_eq!(response, "hostname: test\nmap: ctf_2fort\n");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_transport_error() {
        let (listener, addr) = fake_server().await;
        let parts: Vec<&str> = addr.splitn(2, ':').collect();
        let creds = RconCredentials {
            host: parts[0].to_string(),
            port: parts[1].parse().unwrap(),
            password: "secret".to_string(),
        };
        let conn = RconConnection::new(creds);

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let auth = read_packet(&mut stream).await.unwrap();
            write_packet(&mut stream, -1, SERVERDATA_RESPONSE_VALUE, "").await.unwrap();
            write_packet(&mut stream, auth.id, SERVERDATA_AUTH_RESPONSE, "").await.unwrap();
            // Drop the connection instead of answering the next command.
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            let auth = read_packet(&mut stream).await.unwrap();
            write_packet(&mut stream, -1, SERVERDATA_RESPONSE_VALUE, "").await.unwrap();
            write_packet(&mut stream, auth.id, SERVERDATA_AUTH_RESPONSE, "").await.unwrap();
            let cmd = read_packet(&mut stream).await.unwrap();
            let sentinel = read_packet(&mut stream).await.unwrap();
            write_packet(&mut stream, cmd.id, SERVERDATA_RESPONSE_VALUE, "ok\n").await.unwrap();
            write_packet(&mut stream, sentinel.id, SERVERDATA_RESPONSE_VALUE, "").await.unwrap();
        });

        assert!(conn.exec("status").await.is_err());
        let response = conn.exec("status").await.unwrap();
        assert_eq!(response, "ok\n");
        server.await.unwrap();
    }
}
