// SPDX-License-Identifier: LGPL-3.0-or-later

use super::PlayerStore;
use crate::model::player::Visibility;
use crate::model::{Player, SteamId, UserMessage, UserNameHistory};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Instant;

/// sqlx-backed implementation of [`PlayerStore`]. One pool per process;
/// sqlx serializes writes against a single sqlite file at the connection level.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new().max_connections(4).connect(&url).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl PlayerStore for SqliteStore {
    async fn load_or_create_player(
        &self,
        steam_id: SteamId,
        name: &str,
    ) -> Result<Player, sqlx::Error> {
        const QUERY: &str = r#"
            SELECT p.visibility, p.real_name, p.account_created_on, p.avatar_hash,
                   p.community_banned, p.economy_ban, p.number_of_vac_bans,
                   p.number_of_game_bans, p.days_since_last_ban, p.kills_on,
                   p.deaths_by, p.rage_quits, p.created_on,
                   (SELECT pn.name FROM player_names pn WHERE pn.steam_id = p.steam_id
                    ORDER BY pn.created_on DESC LIMIT 1) AS previous_name
            FROM player p WHERE p.steam_id = ?"#;

        let row = sqlx::query(QUERY)
            .bind(steam_id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            let mut player = Player::new(steam_id, name.to_string());
            self.save_player(&mut player).await?;
            return Ok(player);
        };

        let mut player = Player::new(steam_id, name.to_string());
        player.dangling = false;
        player.visibility = Visibility::from_steam_api(row.try_get::<i64, _>("visibility")?);
        player.real_name = row.try_get("real_name")?;
        player.account_created_on = row.try_get::<Option<DateTime<Utc>>, _>("account_created_on")?;
        player.avatar_hash = row.try_get("avatar_hash")?;
        player.community_banned = row.try_get("community_banned")?;
        player.economy_ban = row.try_get("economy_ban")?;
        player.number_of_vac_bans = row.try_get("number_of_vac_bans")?;
        player.number_of_game_bans = row.try_get("number_of_game_bans")?;
        player.days_since_last_ban = row.try_get("days_since_last_ban")?;
        player.kills_on_local = row.try_get::<i64, _>("kills_on")? as u64;
        player.deaths_by_local = row.try_get::<i64, _>("deaths_by")? as u64;
        player.rage_quits = row.try_get::<i64, _>("rage_quits")? as u64;
        player.created_on = row.try_get("created_on")?;
        player.previous_name = row.try_get::<Option<String>, _>("previous_name")?.unwrap_or_default();
        Ok(player)
    }

    async fn save_player(&self, player: &mut Player) -> Result<(), sqlx::Error> {
        if !player.steam_id.is_valid() {
            return Err(sqlx::Error::Protocol("invalid steam id".into()));
        }
        let now = Utc::now();
        if player.dangling {
            const INSERT: &str = r#"
                INSERT INTO player (
                    steam_id, visibility, real_name, account_created_on, avatar_hash,
                    community_banned, economy_ban, number_of_vac_bans, number_of_game_bans,
                    days_since_last_ban, kills_on, deaths_by, rage_quits, created_on, updated_on
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;
            sqlx::query(INSERT)
                .bind(player.steam_id.0 as i64)
                .bind(player.visibility as i64)
                .bind(&player.real_name)
                .bind(player.account_created_on)
                .bind(&player.avatar_hash)
                .bind(player.community_banned)
                .bind(player.economy_ban)
                .bind(player.number_of_vac_bans)
                .bind(player.number_of_game_bans)
                .bind(player.days_since_last_ban)
                .bind(player.kills_on_local as i64)
                .bind(player.deaths_by_local as i64)
                .bind(player.rage_quits as i64)
                .bind(player.created_on)
                .bind(now)
                .execute(&self.pool)
                .await?;
            player.dangling = false;
        } else {
            const UPDATE: &str = r#"
                UPDATE player SET visibility = ?, real_name = ?, account_created_on = ?,
                    avatar_hash = ?, community_banned = ?, economy_ban = ?,
                    number_of_vac_bans = ?, number_of_game_bans = ?, days_since_last_ban = ?,
                    kills_on = ?, deaths_by = ?, rage_quits = ?, updated_on = ?
                WHERE steam_id = ?"#;
            sqlx::query(UPDATE)
                .bind(player.visibility as i64)
                .bind(&player.real_name)
                .bind(player.account_created_on)
                .bind(&player.avatar_hash)
                .bind(player.community_banned)
                .bind(player.economy_ban)
                .bind(player.number_of_vac_bans)
                .bind(player.number_of_game_bans)
                .bind(player.days_since_last_ban)
                .bind(player.kills_on_local as i64)
                .bind(player.deaths_by_local as i64)
                .bind(player.rage_quits as i64)
                .bind(now)
                .bind(player.steam_id.0 as i64)
                .execute(&self.pool)
                .await?;
        }
        player.updated_on = Instant::now();
        Ok(())
    }

    async fn save_name(&self, steam_id: SteamId, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO player_names (steam_id, name) VALUES (?, ?)")
            .bind(steam_id.0 as i64)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_message(&self, steam_id: SteamId, message: &str) -> Result<(), sqlx::Error> {
        if message.is_empty() {
            return Ok(());
        }
        sqlx::query("INSERT INTO player_messages (steam_id, message) VALUES (?, ?)")
            .bind(steam_id.0 as i64)
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_names(&self, steam_id: SteamId) -> Result<Vec<UserNameHistory>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT name_id, name, created_on FROM player_names WHERE steam_id = ? ORDER BY created_on",
        )
        .bind(steam_id.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(UserNameHistory {
                    name_id: row.try_get("name_id")?,
                    steam_id,
                    name: row.try_get("name")?,
                    first_seen: row.try_get("created_on")?,
                })
            })
            .collect()
    }

    async fn fetch_messages(&self, steam_id: SteamId) -> Result<Vec<UserMessage>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT message_id, message, created_on FROM player_messages WHERE steam_id = ? ORDER BY created_on",
        )
        .bind(steam_id.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(UserMessage {
                    message_id: row.try_get("message_id")?,
                    steam_id,
                    user_id: 0,
                    name: String::new(),
                    team: false,
                    dead: false,
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_on")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn creates_dangling_player_on_first_load() {
        let store = SqliteStore::in_memory().await.unwrap();
        let player = store
            .load_or_create_player(SteamId(76561197960265851), "Knyfe")
            .await
            .unwrap();
        assert!(!player.dangling);
        assert_eq!(player.name, "Knyfe");
    }

    #[tokio::test]
    async fn reloading_existing_player_preserves_previous_name() {
        let store = SqliteStore::in_memory().await.unwrap();
        let sid = SteamId(76561197960265851);
        store.load_or_create_player(sid, "Knyfe").await.unwrap();
        store.save_name(sid, "Knyfe").await.unwrap();
        store.save_name(sid, "Knyfe_New").await.unwrap();

        let reloaded = store.load_or_create_player(sid, "Knyfe_New").await.unwrap();
        assert_eq!(reloaded.previous_name, "Knyfe_New");
    }

    #[tokio::test]
    async fn save_message_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        let sid = SteamId(76561197960265851);
        store.load_or_create_player(sid, "Knyfe").await.unwrap();
        store.save_message(sid, "gg").await.unwrap();
        let messages = store.fetch_messages(sid).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, "gg");
    }
}
