// SPDX-License-Identifier: LGPL-3.0-or-later

//! Discord rich presence, confined to this module so the rest of the crate
//! never touches the IPC client directly (spec.md's supplemented feature
//! list; grounded on `discordUpdateActivity`).

use crate::model::{Player, Server};
use crate::state::GameStateHandle;
use anyhow::{anyhow, Context, Result};
use discord_rich_presence::activity::{Activity, Assets, Button, Party, Timestamps};
use discord_rich_presence::{DiscordIpc, DiscordIpcClient};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DISCORD_APP_ID: &str = "1076716221162082364";
const UPDATE_INTERVAL: Duration = Duration::from_secs(10);
/// A player counts toward the party size if seen within this long — the
/// expiry tick hasn't necessarily run yet, so "still in roster" isn't itself
/// a recency signal (original's `TODO remove this once we track disconnected
/// players better`, carried forward unresolved).
const RECENT_WINDOW: Duration = Duration::from_secs(30);
const MAX_PARTY_SIZE: i32 = 24;

pub struct DiscordPresence {
    client: DiscordIpcClient,
    start_timestamp: i64,
}

impl DiscordPresence {
    /// Connects to the local Discord IPC socket. Fails (and presence is
    /// simply not started for the run) when no desktop Discord client is
    /// listening — this is an optional feature, not a startup dependency.
    pub fn connect(start_timestamp: i64) -> Result<Self> {
        let mut client = DiscordIpcClient::new(DISCORD_APP_ID).map_err(|e| anyhow!(e.to_string()))?;
        client.connect().map_err(|e| anyhow!(e.to_string())).context("discord ipc connect failed")?;
        Ok(Self { client, start_timestamp })
    }

    /// Publishes activity every [`UPDATE_INTERVAL`] until `cancel` fires,
    /// then closes the IPC connection (spec.md §5: Discord RPC is closed on
    /// cancellation).
    pub async fn run(mut self, state: GameStateHandle, cancel: CancellationToken) {
        self.publish(&state).await;
        let mut ticker = tokio::time::interval(UPDATE_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.publish(&state).await,
            }
        }
        if let Err(e) = self.client.close() {
            log::warn!("failed to close discord rpc connection: {e}");
        }
    }

    async fn publish(&mut self, state: &GameStateHandle) {
        let server = state.server().await;
        let players = state.players().await;
        self.update_activity(&server, &players);
    }

    fn update_activity(&mut self, server: &Server, players: &[Player]) {
        if server.current_map.is_empty() {
            return;
        }
        let recent_count = players.iter().filter(|p| p.updated_on.elapsed() < RECENT_WINDOW).count() as i32;
        let map_asset = map_asset_name(&server.current_map);
        let large_image = format!("map_{map_asset}");
        let connect_url = server
            .address
            .filter(|addr| !addr.is_link_local() && !addr.is_private())
            .map(|addr| format!("steam://connect/{addr}:{}", server.port));

        let mut buttons = vec![Button::new("GitHub", "https://github.com/leighmacdonald/bd")];
        if let Some(url) = connect_url.as_deref() {
            buttons.push(Button::new("Connect", url));
        }

        let assets = Assets::new()
            .large_image(&large_image)
            .large_text(&map_asset)
            .small_image("map_cp_cloak")
            .small_text(&server.current_map);
        let party = Party::new().id("-1").size([recent_count, MAX_PARTY_SIZE]);
        let timestamps = Timestamps::new().start(self.start_timestamp);

        let activity = Activity::new()
            .state("In-Game")
            .details(&server.name)
            .assets(assets)
            .party(party)
            .timestamps(timestamps)
            .buttons(buttons);

        if let Err(e) = self.client.set_activity(activity) {
            log::warn!("failed to set discord activity: {e}");
        }
    }
}

/// Best-effort sanitization of a map name into a Discord asset key (lowercase,
/// non-alphanumerics collapsed to `_`). The original's `discordAssetNameMap`
/// curated an exact asset table; this crate has no image assets to curate
/// against, so it derives a plausible key instead.
fn map_asset_name(map: &str) -> String {
    map.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sanitizes_map_names_into_asset_keys() {
        assert_eq!(map_asset_name("cp_badlands"), "cp_badlands");
        assert_eq!(map_asset_name("KotH_Product_Final"), "koth_product_final");
        assert_eq!(map_asset_name("pl_upward rc2"), "pl_upward_rc2");
    }
}
