// SPDX-License-Identifier: LGPL-3.0-or-later

use std::net::Ipv4Addr;
use std::time::Instant;

/// The currently-joined TF2 server. One instance per process.
#[derive(Debug, Clone)]
pub struct Server {
    pub name: String,
    pub current_map: String,
    pub tags: Vec<String>,
    pub address: Option<Ipv4Addr>,
    pub port: u16,
    pub last_updated_on: Instant,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            name: String::new(),
            current_map: String::new(),
            tags: Vec::new(),
            address: None,
            port: 0,
            last_updated_on: Instant::now(),
        }
    }
}

impl Server {
    pub fn touch(&mut self) {
        self.last_updated_on = Instant::now();
    }
}
