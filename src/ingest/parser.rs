// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::model::{SteamId, Team};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::net::Ipv4Addr;
use std::time::Duration;

const TEAM_PREFIX: &str = "(TEAM) ";
const DEAD_PREFIX: &str = "*DEAD* ";
const DEAD_TEAM_PREFIX: &str = "*DEAD*(TEAM) ";
const CHAT_SEPARATOR: &str = " :  ";

/// A classified console line. Carries a UTC timestamp for every variant
/// except [`LogEvent::Lobby`], which shares the clock of the surrounding
/// status block (see spec.md §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Kill {
        timestamp: DateTime<Utc>,
        killer: String,
        victim: String,
    },
    Chat {
        timestamp: DateTime<Utc>,
        name: String,
        team_only: bool,
        dead: bool,
        message: String,
    },
    Connect {
        timestamp: DateTime<Utc>,
        name: String,
    },
    Disconnect {
        timestamp: DateTime<Utc>,
        reason: String,
    },
    /// "Connecting to ..." / "Differing lobby received." banner. Carries no
    /// further information; GameState has no handler for it (see spec.md
    /// §4.4's event-to-effect table, which omits it).
    LobbyChangeBanner { timestamp: DateTime<Utc> },
    StatusId {
        timestamp: DateTime<Utc>,
        user_id: i32,
        name: String,
        steam_id: SteamId,
        connected: Duration,
        ping: u32,
    },
    Hostname {
        timestamp: DateTime<Utc>,
        name: String,
    },
    Map {
        timestamp: DateTime<Utc>,
        name: String,
    },
    Tags {
        timestamp: DateTime<Utc>,
        tags: Vec<String>,
    },
    Address {
        timestamp: DateTime<Utc>,
        ip: Ipv4Addr,
        port: u16,
    },
    Lobby { steam_id: SteamId, team: Team },
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%m/%d/%Y - %H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Parses the `H:MM:SS` / `MM:SS` / `SS` connected-duration form used by `status`.
fn parse_connected(s: &str) -> Duration {
    let parts: Vec<&str> = s.split(':').collect();
    let seconds: u64 = match parts.as_slice() {
        [h, m, s] => {
            h.parse::<u64>().unwrap_or(0) * 3600
                + m.parse::<u64>().unwrap_or(0) * 60
                + s.parse::<u64>().unwrap_or(0)
        }
        [m, s] => m.parse::<u64>().unwrap_or(0) * 60 + s.parse::<u64>().unwrap_or(0),
        [s] => s.parse::<u64>().unwrap_or(0),
        _ => 0,
    };
    Duration::from_secs(seconds)
}

/// Ordered regex table. The first pattern to match a line wins; order
/// disambiguates lines that are shaped like more than one event (see
/// spec.md §8 scenario S4).
pub struct LogParser {
    patterns: Vec<Regex>,
}

const DT: &str = r"(?P<dt>[01]\d/[0123]\d/20\d{2}\s-\s\d{2}:\d{2}:\d{2})";

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        let patterns = vec![
            // kill
            Regex::new(&format!(
                r"^{DT}:\s(.+?)\skilled\s(.+?)\swith\s(.+?)(?:\.|\. \(crit\))$"
            ))
            .unwrap(),
            // chat — name may contain arbitrary characters, so we match up to
            // the first literal occurrence of the exact separator " :  ".
            Regex::new(&format!(r"^{DT}:\s(.+?){}(.+)$", regex::escape(CHAT_SEPARATOR))).unwrap(),
            // connect
            Regex::new(&format!(r"^{DT}:\s(.+?)\sconnected$")).unwrap(),
            // lobby-change-banner
            Regex::new(&format!(
                r"^{DT}:\s(?:Connecting to|Differing lobby received\.).*$"
            ))
            .unwrap(),
            // statusID
            Regex::new(&format!(
                r#"^{DT}:\s#\s{{1,6}}(\d{{1,6}})\s"(.+?)"\s+(\[U:\d:\d{{1,10}}])\s{{1,8}}(\d{{1,3}}:\d{{2}}(?::\d{{2}})?)\s+(\d{{1,4}})\s{{1,8}}\d{{1,3}}\s(?:spawning|active)$"#
            ))
            .unwrap(),
            // hostname
            Regex::new(&format!(r"^{DT}:\shostname:\s(.+)$")).unwrap(),
            // map
            Regex::new(&format!(r"^{DT}:\smap\s{{5}}:\s(.+?)\sat.*$")).unwrap(),
            // tags
            Regex::new(&format!(r"^{DT}:\stags\s{{4}}:\s(.+)$")).unwrap(),
            // address (udp/ip)
            Regex::new(&format!(
                r"^{DT}:\sudp/ip\s{{2}}:\s(\d{{1,3}}\.\d{{1,3}}\.\d{{1,3}}\.\d{{1,3}}):(\d{{1,5}})$"
            ))
            .unwrap(),
            // lobby-member
            Regex::new(r"^\s{2}(?:Member|Pending)\[\d+\]\s+(\[.+?\]).+?TF_GC_TEAM_(DEFENDERS|INVADERS)\s{2}type\s=\sMATCH_PLAYER$").unwrap(),
        ];
        Self { patterns }
    }

    /// Classifies one console line. Returns `None` for lines that match no
    /// pattern (expected — most lines are irrelevant and are dropped silently).
    pub fn parse(&self, line: &str) -> Option<LogEvent> {
        let line = line.trim_end_matches('\r');
        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            return match index {
                0 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    Some(LogEvent::Kill {
                        timestamp,
                        killer: caps[2].to_string(),
                        victim: caps[3].to_string(),
                    })
                }
                1 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    let mut name = caps[2].to_string();
                    let message = caps[3].to_string();
                    let mut team_only = false;
                    let mut dead = false;
                    if let Some(rest) = name.strip_prefix(DEAD_TEAM_PREFIX) {
                        name = rest.to_string();
                        team_only = true;
                        dead = true;
                    } else if let Some(rest) = name.strip_prefix(DEAD_PREFIX) {
                        name = rest.to_string();
                        dead = true;
                    } else if let Some(rest) = name.strip_prefix(TEAM_PREFIX) {
                        name = rest.to_string();
                        team_only = true;
                    }
                    Some(LogEvent::Chat {
                        timestamp,
                        name,
                        team_only,
                        dead,
                        message,
                    })
                }
                2 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    Some(LogEvent::Connect {
                        timestamp,
                        name: caps[2].to_string(),
                    })
                }
                3 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    Some(LogEvent::LobbyChangeBanner { timestamp })
                }
                4 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    let user_id: i32 = caps[2].parse().ok()?;
                    let steam_id = SteamId::from_steam3(&caps[4])?;
                    let ping: u32 = caps[6].parse().ok()?;
                    Some(LogEvent::StatusId {
                        timestamp,
                        user_id,
                        name: caps[3].to_string(),
                        steam_id,
                        connected: parse_connected(&caps[5]),
                        ping,
                    })
                }
                5 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    Some(LogEvent::Hostname {
                        timestamp,
                        name: caps[2].to_string(),
                    })
                }
                6 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    Some(LogEvent::Map {
                        timestamp,
                        name: caps[2].to_string(),
                    })
                }
                7 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    let tags = caps[2].split(',').map(|s| s.trim().to_string()).collect();
                    Some(LogEvent::Tags { timestamp, tags })
                }
                8 => {
                    let timestamp = parse_timestamp(&caps[1])?;
                    let ip: Ipv4Addr = caps[2].parse().ok()?;
                    let port: u16 = caps[3].parse().ok()?;
                    Some(LogEvent::Address { timestamp, ip, port })
                }
                9 => {
                    let steam_id = SteamId::from_steam3(&caps[1])?;
                    let team = if &caps[2] == "INVADERS" {
                        Team::Blue
                    } else {
                        Team::Red
                    };
                    Some(LogEvent::Lobby { steam_id, team })
                }
                _ => unreachable!(),
            };
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parser() -> LogParser {
        LogParser::new()
    }

    #[test]
    fn parses_chat_with_team_and_dead_prefix() {
        let line = "10/14/2024 - 21:03:11: (TEAM) *DEAD* Knyfe :  gg";
        match parser().parse(line).unwrap() {
            LogEvent::Chat {
                name,
                team_only,
                dead,
                message,
                ..
            } => {
                assert_eq!(name, "Knyfe");
                assert!(team_only);
                assert!(dead);
                assert_eq!(message, "gg");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn chat_shaped_like_hostname_still_parses_as_chat_s4() {
        // S4: chat-shaped-but-hostname-shaped line must classify as chat because
        // the chat pattern is declared earlier in the table.
        let line = "10/14/2024 - 21:03:11: hostname :  hostname: foo";
        match parser().parse(line).unwrap() {
            LogEvent::Chat { name, message, .. } => {
                assert_eq!(name, "hostname");
                assert_eq!(message, "hostname: foo");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_status_line() {
        let line = r#"10/14/2024 - 21:03:10: #      7 "Knyfe"            [U:1:123]      1:02:03    58    0 active"#;
        match parser().parse(line).unwrap() {
            LogEvent::StatusId {
                user_id,
                steam_id,
                connected,
                ping,
                name,
                ..
            } => {
                assert_eq!(user_id, 7);
                assert_eq!(name, "Knyfe");
                assert_eq!(steam_id, SteamId(76561197960265851));
                assert_eq!(connected, Duration::from_secs(3723));
                assert_eq!(ping, 58);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parses_lobby_member_line() {
        let line = "  Member[0] [U:1:123]  team = TF_GC_TEAM_INVADERS  type = MATCH_PLAYER";
        match parser().parse(line).unwrap() {
            LogEvent::Lobby { steam_id, team } => {
                assert_eq!(steam_id, SteamId(76561197960265851));
                assert_eq!(team, Team::Blue);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unmatched_line_is_dropped() {
        assert!(parser().parse("this is not a recognized line").is_none());
    }

    #[test]
    fn parser_is_deterministic() {
        let line = "10/14/2024 - 21:03:11: foo connected";
        let p = parser();
        assert_eq!(p.parse(line), p.parse(line));
    }
}
