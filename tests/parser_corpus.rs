// SPDX-License-Identifier: LGPL-3.0-or-later

//! Regression corpus for [`bd_core::ingest::LogParser`] (spec.md §8 property 2:
//! every line classifies into exactly one event kind or is dropped; no two
//! patterns claim the same line).

use bd_core::ingest::{LogEvent, LogParser};

const CORPUS: &[(&str, &str)] = &[
    (
        r#"10/14/2024 - 21:03:10: #      7 "Knyfe"            [U:1:123]      1:02:03    58    0 active"#,
        "status",
    ),
    (
        "10/14/2024 - 21:03:11: (TEAM) *DEAD* Knyfe :  gg",
        "chat",
    ),
    (
        "10/14/2024 - 21:03:12: Knyfe connected",
        "connect",
    ),
    (
        "10/14/2024 - 21:03:13: Knyfe killed Scout with scattergun.",
        "kill",
    ),
    (
        "10/14/2024 - 21:03:13: Knyfe killed Scout with scattergun. (crit)",
        "kill",
    ),
    (
        "10/14/2024 - 21:03:14: hostname: my server",
        "hostname",
    ),
    (
        "10/14/2024 - 21:03:15: map     : ctf_2fort at: 0 x, 0 y, 0 z",
        "map",
    ),
    (
        "10/14/2024 - 21:03:16: tags    : hidden,increased_maxplayers",
        "tags",
    ),
    (
        "10/14/2024 - 21:03:17: udp/ip  : 192.168.1.1:27015",
        "address",
    ),
    (
        "  Member[0] [U:1:123]  team = TF_GC_TEAM_INVADERS  type = MATCH_PLAYER",
        "lobby",
    ),
    (
        "10/14/2024 - 21:03:18: Connecting to 192.168.1.1:27015",
        "lobby-change-banner",
    ),
    (
        "this line matches nothing in the table",
        "dropped",
    ),
    (
        "10/14/2024 - 21:03:19: hostname :  hostname: foo",
        "chat",
    ),
];

fn classify(event: &LogEvent) -> &'static str {
    match event {
        LogEvent::Kill { .. } => "kill",
        LogEvent::Chat { .. } => "chat",
        LogEvent::Connect { .. } => "connect",
        LogEvent::Disconnect { .. } => "disconnect",
        LogEvent::LobbyChangeBanner { .. } => "lobby-change-banner",
        LogEvent::StatusId { .. } => "status",
        LogEvent::Hostname { .. } => "hostname",
        LogEvent::Map { .. } => "map",
        LogEvent::Tags { .. } => "tags",
        LogEvent::Address { .. } => "address",
        LogEvent::Lobby { .. } => "lobby",
    }
}

#[test]
fn every_corpus_line_classifies_as_expected() {
    let parser = LogParser::new();
    for (line, expected) in CORPUS {
        let actual = parser.parse(line).as_ref().map(classify).unwrap_or("dropped");
        assert_eq!(actual, *expected, "line: {line:?}");
    }
}

#[test]
fn parsing_is_pure_and_deterministic() {
    let parser = LogParser::new();
    for (line, _) in CORPUS {
        let first = parser.parse(line);
        let second = parser.parse(line);
        assert_eq!(first, second, "line: {line:?}");
    }
}
