// SPDX-License-Identifier: LGPL-3.0-or-later

use super::engine::RulesEngine;
use super::schema::{PlayerList, RulesList};
use crate::enrichment::cache::FsCache;
use crate::error::RemoteFetchError;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Cached revalidation headers for one list URL, stored alongside its last
/// good body so a restart can still send `If-None-Match`/`If-Modified-Since`
/// (spec.md §4.6).
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheValidators {
    etag: Option<String>,
    last_modified: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Tf2bdPlayerlist,
    Tf2bdRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(rename = "type")]
    pub kind: ListKind,
    pub enabled: bool,
    pub url: String,
}

/// Periodically refetches every configured remote list and folds successful
/// parses into the shared [`RulesEngine`] (spec.md §4.6). One list's failure
/// never touches another's; fetches are revalidated against the cached
/// `ETag`/`Last-Modified` from the previous run, so an unchanged remote list
/// costs a `304` rather than a full re-download and re-parse.
pub struct ListManager {
    client: reqwest::Client,
    cache: FsCache,
}

impl ListManager {
    pub fn new(client: reqwest::Client, cache: FsCache) -> Self {
        Self { client, cache }
    }

    /// Refreshes every enabled list, importing successes into `engine`.
    /// Returns the number of lists that refreshed successfully.
    pub async fn refresh(&self, lists: &[ListConfig], engine: &RwLock<RulesEngine>) -> usize {
        let mut ok = 0;
        for (index, list) in lists.iter().filter(|l| l.enabled).enumerate() {
            let origin = format!("remote-{index}");
            match self.fetch(list).await {
                Ok(body) => {
                    if self.import(&origin, list.kind, &body, engine).await.is_ok() {
                        ok += 1;
                    }
                }
                Err(e) => {
                    log::warn!("list refresh failed for {}: {e}", list.url);
                }
            }
        }
        ok
    }

    /// Fetches `list`, revalidating against the cached `ETag`/`Last-Modified`
    /// from the previous successful fetch (spec.md §4.6). A `304 Not
    /// Modified` response returns the cached body unchanged; any other
    /// successful response refreshes both the body and its validators.
    async fn fetch(&self, list: &ListConfig) -> Result<Vec<u8>, RemoteFetchError> {
        let cache_key = &list.url;
        let validators: CacheValidators = self
            .cache
            .get_stale("list-meta", cache_key)
            .await
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        let mut request = self.client.get(&list.url);
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
        }

        let response = request.send().await.map_err(|source| RemoteFetchError::Http {
            url: list.url.clone(),
            source,
        })?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            if let Some(cached) = self.cache.get_stale("list-body", cache_key).await {
                return Ok(cached);
            }
            // No cached body survived alongside the validators (e.g. the
            // cache directory was cleared). Re-request unconditionally
            // rather than surface an error for a 304 with nothing to serve.
            let response = self.client.get(&list.url).send().await.map_err(|source| RemoteFetchError::Http {
                url: list.url.clone(),
                source,
            })?;
            return self.store_response(cache_key, list, response).await;
        }

        self.store_response(cache_key, list, response).await
    }

    /// Reads `response`'s body and validator headers, writes both to the
    /// cache under `cache_key`, and returns the body.
    async fn store_response(
        &self,
        cache_key: &str,
        list: &ListConfig,
        response: reqwest::Response,
    ) -> Result<Vec<u8>, RemoteFetchError> {
        let etag = response.headers().get(ETAG).and_then(|v| v.to_str().ok()).map(str::to_string);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|source| RemoteFetchError::Http {
            url: list.url.clone(),
            source,
        })?;

        let new_validators = CacheValidators { etag, last_modified };
        if let Ok(meta) = serde_json::to_vec(&new_validators) {
            let _ = self.cache.set("list-meta", cache_key, &meta).await;
        }
        let _ = self.cache.set("list-body", cache_key, &bytes).await;
        Ok(bytes.to_vec())
    }

    async fn import(
        &self,
        origin: &str,
        kind: ListKind,
        body: &[u8],
        engine: &RwLock<RulesEngine>,
    ) -> Result<(), RemoteFetchError> {
        match kind {
            ListKind::Tf2bdPlayerlist => {
                let parsed: PlayerList = serde_json::from_slice(body).map_err(|source| RemoteFetchError::Parse {
                    url: origin.to_string(),
                    source,
                })?;
                engine.write().await.import_players(origin, &parsed);
            }
            ListKind::Tf2bdRules => {
                let parsed: RulesList = serde_json::from_slice(body).map_err(|source| RemoteFetchError::Parse {
                    url: origin.to_string(),
                    source,
                })?;
                if let Err(e) = engine.write().await.import_rules(origin, &parsed) {
                    log::warn!("rules list {origin} failed to compile: {e}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rules::schema::FileInfo;
    use std::time::Duration;

    #[tokio::test]
    async fn import_rejects_mismatched_kind_without_poisoning_engine() {
        let cache = FsCache::new(std::env::temp_dir().join("bd-core-listmgr-test"), Duration::from_secs(3600));
        let manager = ListManager::new(reqwest::Client::new(), cache);
        let engine = RwLock::new(RulesEngine::new());
        let body = serde_json::to_vec(&PlayerList {
            file_info: FileInfo::default(),
            players: vec![],
        })
        .unwrap();
        let result = manager
            .import("remote-0", ListKind::Tf2bdRules, &body, &engine)
            .await;
        assert!(result.is_err());
    }

    /// Serves a tiny HTTP/1.1 response over an accepted connection, reporting
    /// whether the request carried `If-None-Match`.
    async fn serve_one_http_response(stream: &mut tokio::net::TcpStream, body: &str, etag: &str) -> bool {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]);
        let revalidated = request.to_ascii_lowercase().contains("if-none-match");

        let response = if revalidated {
            format!("HTTP/1.1 304 Not Modified\r\nETag: {etag}\r\nContent-Length: 0\r\n\r\n")
        } else {
            format!(
                "HTTP/1.1 200 OK\r\nETag: {etag}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        };
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        revalidated
    }

    #[tokio::test]
    async fn second_fetch_revalidates_and_reuses_cached_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = serde_json::to_string(&PlayerList {
            file_info: FileInfo::default(),
            players: vec![],
        })
        .unwrap();

        let server = tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            let first_revalidated = serve_one_http_response(&mut first, &body, "\"v1\"").await;
            let (mut second, _) = listener.accept().await.unwrap();
            let second_revalidated = serve_one_http_response(&mut second, &body, "\"v1\"").await;
            (first_revalidated, second_revalidated)
        });

        let cache = FsCache::new(
            std::env::temp_dir().join(format!("bd-core-listmgr-revalidate-{}", std::process::id())),
            Duration::from_secs(3600),
        );
        let manager = ListManager::new(reqwest::Client::new(), cache.clone());
        let list = ListConfig {
            kind: ListKind::Tf2bdPlayerlist,
            enabled: true,
            url: format!("http://{addr}/list.json"),
        };

        let first_fetch = manager.fetch(&list).await.unwrap();
        let second_fetch = manager.fetch(&list).await.unwrap();
        assert_eq!(first_fetch, second_fetch);

        let (first_revalidated, second_revalidated) = server.await.unwrap();
        assert!(!first_revalidated, "first fetch has no cached validators to send");
        assert!(second_revalidated, "second fetch must send If-None-Match");

        let _ = std::fs::remove_dir_all(cache.root());
    }
}
