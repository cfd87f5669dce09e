// SPDX-License-Identifier: LGPL-3.0-or-later

use super::cache::FsCache;
use crate::error::CacheError;
use crate::model::{player::Visibility, SteamId};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;

const BATCH_LIMIT: usize = 100;
const AVATAR_TIMEOUT: Duration = Duration::from_secs(10);
const AVATAR_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Deserialize)]
struct SummariesResponse {
    response: SummariesInner,
}

#[derive(Debug, Clone, Deserialize)]
struct SummariesInner {
    players: Vec<RawSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSummary {
    steamid: String,
    #[serde(rename = "communityvisibilitystate")]
    community_visibility_state: i64,
    #[serde(default, rename = "avatarhash")]
    avatar_hash: String,
    #[serde(default, rename = "timecreated")]
    time_created: Option<i64>,
    #[serde(default, rename = "realname")]
    real_name: String,
}

#[derive(Debug, Clone)]
pub struct PlayerSummary {
    pub steam_id: SteamId,
    pub visibility: Visibility,
    pub avatar_hash: String,
    pub account_created_on: Option<DateTime<Utc>>,
    pub real_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BansResponse {
    players: Vec<RawBans>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBans {
    #[serde(rename = "SteamId")]
    steam_id: String,
    #[serde(rename = "NumberOfVACBans")]
    number_of_vac_bans: i64,
    #[serde(rename = "NumberOfGameBans")]
    number_of_game_bans: i64,
    #[serde(rename = "CommunityBanned")]
    community_banned: bool,
    #[serde(rename = "DaysSinceLastBan")]
    days_since_last_ban: i64,
    #[serde(rename = "EconomyBan")]
    economy_ban: String,
}

#[derive(Debug, Clone)]
pub struct PlayerBans {
    pub steam_id: SteamId,
    pub number_of_vac_bans: i64,
    pub number_of_game_bans: i64,
    pub community_banned: bool,
    pub days_since_last_ban: i64,
    pub economy_ban: bool,
}

/// What [`PlayerDataLoader`] needs to write enrichment results back into
/// the live roster. Implemented by `GameStateHandle`; kept as a trait here
/// so this module has no dependency on `state`.
#[async_trait::async_trait]
pub trait RosterSink: Send + Sync {
    async fn apply_summary(&self, summary: PlayerSummary);
    async fn apply_bans(&self, bans: PlayerBans);
    async fn attach_avatar(&self, steam_id: SteamId, bytes: Vec<u8>);
    /// Every steamID currently in the roster with a non-empty avatar hash.
    async fn avatar_hashes(&self) -> Vec<(SteamId, String)>;
}

fn avatar_url(hash: &str) -> String {
    format!("https://avatars.steamstatic.com/{hash}_full.jpg")
}

/// Batches steamID enrichment requests and drives the Steam Web API plus
/// the avatar cache/download path (spec.md §4.7). A no-op (besides draining
/// its queue) when no API key is configured.
pub struct PlayerDataLoader {
    http: reqwest::Client,
    api_key: String,
    cache: FsCache,
}

impl PlayerDataLoader {
    pub fn new(http: reqwest::Client, api_key: String, cache: FsCache) -> Self {
        Self { http, api_key, cache }
    }

    /// Runs until the queue sender is dropped. Every `interval`, drains any
    /// queued steamIDs (capped to the most recent [`BATCH_LIMIT`]), fetches
    /// profiles and bans, then refreshes avatars for the whole roster.
    pub async fn run(
        &self,
        mut queue: mpsc::Receiver<SteamId>,
        sink: &dyn RosterSink,
        interval: Duration,
    ) {
        let mut pending: Vec<SteamId> = Vec::new();
        let mut seen: HashSet<SteamId> = HashSet::new();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                received = queue.recv() => {
                    match received {
                        Some(sid) => {
                            if seen.insert(sid) {
                                pending.push(sid);
                            }
                        }
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    if pending.is_empty() || self.api_key.is_empty() {
                        continue;
                    }
                    if pending.len() > BATCH_LIMIT {
                        let drop = pending.len() - BATCH_LIMIT;
                        log::warn!("profile queue overflow, dropping {drop} oldest entries");
                        pending.drain(0..drop);
                    }
                    self.run_batch(&pending, sink).await;
                    pending.clear();
                    seen.clear();
                }
            }
        }
    }

    async fn run_batch(&self, batch: &[SteamId], sink: &dyn RosterSink) {
        log::info!("updating {} profiles", batch.len());
        let ids: Vec<String> = batch.iter().map(|s| s.0.to_string()).collect();

        let (summaries, bans) = tokio::join!(self.fetch_summaries(&ids), self.fetch_bans(&ids));

        match summaries {
            Ok(summaries) => {
                for summary in summaries {
                    sink.apply_summary(summary).await;
                }
            }
            Err(e) => log::warn!("failed to fetch summaries: {e}"),
        }
        match bans {
            Ok(bans) => {
                for ban in bans {
                    sink.apply_bans(ban).await;
                }
            }
            Err(e) => log::warn!("failed to fetch bans: {e}"),
        }

        self.refresh_avatars(sink).await;
    }

    async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<PlayerSummary>, reqwest::Error> {
        let response: SummariesResponse = self
            .http
            .get("https://api.steampowered.com/ISteamUser/GetPlayerSummaries/v2/")
            .query(&[("key", self.api_key.as_str()), ("steamids", &ids.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .response
            .players
            .into_iter()
            .filter_map(|raw| {
                let steam_id = SteamId(raw.steamid.parse().ok()?);
                Some(PlayerSummary {
                    steam_id,
                    visibility: Visibility::from_steam_api(raw.community_visibility_state),
                    avatar_hash: raw.avatar_hash,
                    account_created_on: raw.time_created.and_then(|t| Utc.timestamp_opt(t, 0).single()),
                    real_name: raw.real_name,
                })
            })
            .collect())
    }

    async fn fetch_bans(&self, ids: &[String]) -> Result<Vec<PlayerBans>, reqwest::Error> {
        let response: BansResponse = self
            .http
            .get("https://api.steampowered.com/ISteamUser/GetPlayerBans/v1/")
            .query(&[("key", self.api_key.as_str()), ("steamids", &ids.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .players
            .into_iter()
            .filter_map(|raw| {
                let steam_id = SteamId(raw.steam_id.parse().ok()?);
                Some(PlayerBans {
                    steam_id,
                    number_of_vac_bans: raw.number_of_vac_bans,
                    number_of_game_bans: raw.number_of_game_bans,
                    community_banned: raw.community_banned,
                    days_since_last_ban: raw.days_since_last_ban,
                    economy_ban: raw.economy_ban != "none",
                })
            })
            .collect())
    }

    async fn refresh_avatars(&self, sink: &dyn RosterSink) {
        let targets = sink.avatar_hashes().await;
        let mut failures = 0usize;
        let results = futures::stream::iter(targets.into_iter().map(|(steam_id, hash)| async move {
            match self.cache.get("avatar", &hash).await {
                Ok(bytes) => Some((steam_id, bytes)),
                Err(CacheError::Miss) | Err(CacheError::Expired) => self.download_avatar(&hash).await.map(|b| (steam_id, b)),
            }
        }))
        .buffer_unordered(AVATAR_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

        for result in results {
            match result {
                Some((steam_id, bytes)) => sink.attach_avatar(steam_id, bytes).await,
                None => failures += 1,
            }
        }
        if failures > 0 {
            log::warn!("{failures} avatar downloads failed this tick");
        }
    }

    async fn download_avatar(&self, hash: &str) -> Option<Vec<u8>> {
        let response = tokio::time::timeout(AVATAR_TIMEOUT, self.http.get(avatar_url(hash)).send())
            .await
            .ok()?
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let bytes = response.bytes().await.ok()?.to_vec();
        let _ = self.cache.set("avatar", hash, &bytes).await;
        Some(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;

    struct FakeSink {
        summaries: Mutex<Vec<PlayerSummary>>,
    }

    #[async_trait::async_trait]
    impl RosterSink for FakeSink {
        async fn apply_summary(&self, summary: PlayerSummary) {
            self.summaries.lock().unwrap().push(summary);
        }
        async fn apply_bans(&self, _bans: PlayerBans) {}
        async fn attach_avatar(&self, _steam_id: SteamId, _bytes: Vec<u8>) {}
        async fn avatar_hashes(&self) -> Vec<(SteamId, String)> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn empty_api_key_drains_queue_without_requests() {
        let cache = FsCache::new(std::env::temp_dir().join("bd-core-loader-test"), Duration::from_secs(3600));
        let loader = PlayerDataLoader::new(reqwest::Client::new(), String::new(), cache);
        let (tx, rx) = mpsc::channel(8);
        tx.send(SteamId(1)).await.unwrap();
        drop(tx);
        let sink = FakeSink { summaries: Mutex::new(Vec::new()) };
        loader.run(rx, &sink, Duration::from_millis(10)).await;
        assert!(sink.summaries.lock().unwrap().is_empty());
    }
}
