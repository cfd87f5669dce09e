// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::error::SourceError;
use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, Lines};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Delivers raw console lines in arrival order. Two backends share this
/// contract (spec.md §4.1): tailing an append-only file, or listening on a
/// UDP socket the game's `logaddress_add` points at. Neither guarantees
/// delivery across a process crash, but both are at-least-once while running.
#[async_trait::async_trait]
pub trait LogSource: Send {
    /// Runs until `cancel` resolves, sending lines to `tx`. The underlying
    /// handle (file or socket) is released on every exit path.
    async fn run(self: Box<Self>, tx: mpsc::Sender<String>, cancel: tokio::sync::oneshot::Receiver<()>);
}

/// Tails an append-only console log, seeking to EOF on open (never replays
/// historical content) and reopening across truncation/rotation.
pub struct FileTail {
    path: PathBuf,
}

impl FileTail {
    pub async fn open(path: PathBuf) -> Result<Self, SourceError> {
        File::open(&path)
            .await
            .map_err(|e| SourceError::FileUnavailable(path.clone(), e))?;
        Ok(Self { path })
    }

    async fn open_at_end(&self) -> std::io::Result<(Lines<BufReader<File>>, u64)> {
        let mut file = File::open(&self.path).await?;
        let len = file.seek(SeekFrom::End(0)).await?;
        Ok((BufReader::new(file).lines(), len))
    }
}

#[async_trait::async_trait]
impl LogSource for FileTail {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<String>,
        mut cancel: tokio::sync::oneshot::Receiver<()>,
    ) {
        let (mut lines, mut pos) = match self.open_at_end().await {
            Ok(v) => v,
            Err(e) => {
                log::error!("failed to open console log {:?}: {e}", self.path);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    log::info!("log tail cancelled");
                    return;
                }
                result = lines.next_line() => {
                    match result {
                        Ok(Some(line)) => {
                            pos += line.len() as u64 + 1;
                            if tx.send(line).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {
                            // At EOF. Detect truncation/rotation before waiting for more data.
                            if let Ok(meta) = tokio::fs::metadata(&self.path).await {
                                if meta.len() < pos {
                                    log::warn!("console log truncated/rotated, reopening");
                                    match self.open_at_end().await {
                                        Ok((l, p)) => {
                                            lines = l;
                                            pos = p;
                                            continue;
                                        }
                                        Err(e) => {
                                            log::error!("failed to reopen console log: {e}");
                                        }
                                    }
                                }
                            }
                            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                        }
                        Err(e) => {
                            log::error!("error reading console log: {e}");
                            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                        }
                    }
                }
            }
        }
    }
}

/// Receives each UDP datagram as one line, per the game's `logaddress_add` sink.
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    pub async fn bind(addr: SocketAddr) -> Result<Self, SourceError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SourceError::UdpUnavailable(addr, e))?;
        Ok(Self { socket })
    }
}

#[async_trait::async_trait]
impl LogSource for UdpSource {
    async fn run(
        self: Box<Self>,
        tx: mpsc::Sender<String>,
        mut cancel: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut buf = vec![0u8; 8192];
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    log::info!("udp log source cancelled");
                    return;
                }
                result = self.socket.recv(&mut buf) => {
                    match result {
                        Ok(n) => {
                            let line = String::from_utf8_lossy(&buf[..n]).trim_end().to_string();
                            if tx.send(line).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            log::warn!("udp log source recv error: {e}");
                        }
                    }
                }
            }
        }
    }
}
