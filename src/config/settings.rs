// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::error::ConfigError;
use crate::model::SteamId;
use crate::rules::ListConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "bd";
const SETTINGS_FILE_NAME: &str = "bd.yaml";

const RCON_DEFAULT_HOST: &str = "0.0.0.0";
const RCON_DEFAULT_PORT: u16 = 21212;
const RCON_DEFAULT_PASSWORD: &str = "pazer_sux_lol";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RconMode {
    Static,
    Random,
}

impl Default for RconMode {
    fn default() -> Self {
        RconMode::Random
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteamIdFormat {
    Steam64,
    Steam3,
    Steam32,
    Steam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub enabled: bool,
    pub name: String,
    /// `printf`-style template; the single placeholder is filled per `id_format`.
    pub url: String,
    pub id_format: SteamIdFormat,
}

/// Host/port/password the game's RCON client actually dials. Never
/// serialized — derived from `rcon_mode` fresh on every load (spec.md §6,
/// SPEC_FULL.md §C.2).
#[derive(Debug, Clone)]
pub struct RconCredentials {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl RconCredentials {
    fn for_mode(mode: RconMode) -> Self {
        match mode {
            RconMode::Static => Self {
                host: RCON_DEFAULT_HOST.to_string(),
                port: RCON_DEFAULT_PORT,
                password: RCON_DEFAULT_PASSWORD.to_string(),
            },
            RconMode::Random => Self {
                host: RCON_DEFAULT_HOST.to_string(),
                port: rand::thread_rng().gen_range(21000..22000),
                password: random_password(10),
            },
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn random_password(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

/// Parses the `disconnected_timeout`-style duration strings used throughout
/// the settings file (`"60s"`, `"2m"`, `"500ms"`). Unrecognized or empty
/// input falls back to `default`, logged at `warn` rather than failing
/// startup over a cosmetic typo.
pub fn parse_duration(s: &str, default: Duration) -> Duration {
    let s = s.trim();
    let split_at = s.find(|c: char| !c.is_ascii_digit());
    let Some(split_at) = split_at else {
        return default;
    };
    let (number, suffix) = s.split_at(split_at);
    let Ok(value) = number.parse::<u64>() else {
        log::warn!("invalid duration {s:?}, using default");
        return default;
    };
    match suffix {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        _ => {
            log::warn!("invalid duration suffix {suffix:?} in {s:?}, using default");
            default
        }
    }
}

/// Persisted process configuration, read from/written to YAML at the OS's
/// per-user config location (spec.md §6). Feature toggles default to the
/// conservative choices the original made for a fresh install: kicking and
/// chat warnings off, party warnings and Discord presence on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub steam_root: PathBuf,
    #[serde(default)]
    pub tf2_root: PathBuf,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub steam_id: String,
    #[serde(default = "default_disconnected_timeout")]
    pub disconnected_timeout: String,
    #[serde(default = "default_true")]
    pub discord_presence_enabled: bool,
    #[serde(default)]
    pub kicker_enabled: bool,
    #[serde(default)]
    pub chat_warnings_enabled: bool,
    #[serde(default = "default_true")]
    pub party_warnings_enabled: bool,
    #[serde(default)]
    pub auto_close_on_game_exit: bool,
    #[serde(default = "default_true")]
    pub systray_enabled: bool,
    #[serde(default)]
    pub udp_listener_enabled: bool,
    #[serde(default = "default_udp_listener_addr")]
    pub udp_listener_addr: SocketAddr,
    #[serde(default = "default_http_listen_addr")]
    pub http_listen_addr: SocketAddr,
    #[serde(default)]
    pub rcon_mode: RconMode,
    #[serde(default)]
    pub lists: Vec<ListConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(skip)]
    config_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_disconnected_timeout() -> String {
    "60s".to_string()
}

fn default_udp_listener_addr() -> SocketAddr {
    "127.0.0.1:29191".parse().unwrap()
}

fn default_http_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steam_root: default_steam_root(),
            tf2_root: default_tf2_root(),
            api_key: String::new(),
            steam_id: String::new(),
            disconnected_timeout: default_disconnected_timeout(),
            discord_presence_enabled: true,
            kicker_enabled: false,
            chat_warnings_enabled: false,
            party_warnings_enabled: true,
            auto_close_on_game_exit: false,
            systray_enabled: true,
            udp_listener_enabled: false,
            udp_listener_addr: default_udp_listener_addr(),
            http_listen_addr: default_http_listen_addr(),
            rcon_mode: RconMode::Random,
            lists: default_lists(),
            links: default_links(),
            config_path: PathBuf::new(),
        }
    }
}

#[cfg(target_os = "windows")]
fn default_steam_root() -> PathBuf {
    PathBuf::from(r"C:\Program Files (x86)\Steam")
}

#[cfg(not(target_os = "windows"))]
fn default_steam_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".steam/steam"))
        .unwrap_or_default()
}

fn default_tf2_root() -> PathBuf {
    default_steam_root().join("steamapps/common/Team Fortress 2/tf")
}

fn default_lists() -> Vec<ListConfig> {
    use crate::rules::ListKind;
    vec![
        ListConfig {
            kind: ListKind::Tf2bdPlayerlist,
            enabled: true,
            url: "https://trusted.roto.lol/v1/steamids".to_string(),
        },
        ListConfig {
            kind: ListKind::Tf2bdPlayerlist,
            enabled: true,
            url: "https://raw.githubusercontent.com/PazerOP/tf2_bot_detector/master/staging/cfg/playerlist.official.json".to_string(),
        },
        ListConfig {
            kind: ListKind::Tf2bdRules,
            enabled: true,
            url: "https://raw.githubusercontent.com/PazerOP/tf2_bot_detector/master/staging/cfg/rules.official.json".to_string(),
        },
    ]
}

fn default_links() -> Vec<LinkConfig> {
    vec![
        LinkConfig {
            enabled: true,
            name: "Steam".to_string(),
            url: "https://steamcommunity.com/profiles/%d".to_string(),
            id_format: SteamIdFormat::Steam64,
        },
        LinkConfig {
            enabled: true,
            name: "RGL".to_string(),
            url: "https://rgl.gg/Public/PlayerProfile.aspx?p=%d".to_string(),
            id_format: SteamIdFormat::Steam64,
        },
        LinkConfig {
            enabled: true,
            name: "logs.tf".to_string(),
            url: "https://logs.tf/profile/%d".to_string(),
            id_format: SteamIdFormat::Steam64,
        },
    ]
}

impl Settings {
    /// Locates the per-user config directory (`.../bd/`), loading
    /// `bd.yaml` if present or writing out built-in defaults on first run
    /// (SPEC_FULL.md §C.1).
    pub async fn read_or_create() -> Result<Self, ConfigError> {
        let root = config_root()?;
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| ConfigError::Write {
                path: root.clone(),
                source,
            })?;
        let path = root.join(SETTINGS_FILE_NAME);
        let mut settings = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_yaml::from_str::<Settings>(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Settings::default();
                settings.config_path_set(path.clone()).save().await?;
                settings
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };
        settings.config_path = path;
        Ok(settings)
    }

    fn config_path_set(mut self, path: PathBuf) -> Self {
        self.config_path = path;
        self
    }

    pub async fn save(&self) -> Result<(), ConfigError> {
        let body = serde_yaml::to_string(self).map_err(|source| ConfigError::Parse {
            path: self.config_path.clone(),
            source,
        })?;
        tokio::fs::write(&self.config_path, body)
            .await
            .map_err(|source| ConfigError::Write {
                path: self.config_path.clone(),
                source,
            })
    }

    pub fn config_root(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_root().unwrap_or_default())
    }

    pub fn db_path(&self) -> PathBuf {
        self.config_root().join("bd.sqlite")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.config_root().join("cache")
    }

    pub fn local_player_list_path(&self) -> PathBuf {
        self.config_root().join("playerlist.local.json")
    }

    pub fn local_rules_list_path(&self) -> PathBuf {
        self.config_root().join("rules.local.json")
    }

    pub fn local_steam_id(&self) -> Option<SteamId> {
        self.steam_id.parse().ok().map(SteamId).or_else(|| SteamId::from_steam3(&self.steam_id))
    }

    pub fn disconnected_timeout_duration(&self) -> Duration {
        parse_duration(&self.disconnected_timeout, Duration::from_secs(60))
    }

    pub fn rcon_credentials(&self) -> RconCredentials {
        RconCredentials::for_mode(self.rcon_mode)
    }
}

fn config_root() -> Result<PathBuf, ConfigError> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME)).ok_or(ConfigError::NoConfigDir)
}
