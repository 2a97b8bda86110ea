//! Key/value cache capability used by the orchestrator.
//!
//! Values are serialized `CalendarResult` JSON strings. Every backend honors an
//! absolute TTL (no sliding refresh). Write failures are reported as
//! `CacheError` and swallowed by the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    fn backend_name(&self) -> &'static str;
}

// ------------------------------------------------------------
// In-memory
// ------------------------------------------------------------

/// Process-local store. Used by tests and single-instance deployments.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<HashMap<String, (Instant, String)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn resident(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or_default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache mutex poisoned".into()))?;
        let expired = match map.get(key) {
            Some((expires_at, v)) if Instant::now() < *expires_at => return Ok(Some(v.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CacheError::Unavailable("memory cache mutex poisoned".into()))?;
        let now = Instant::now();
        map.retain(|_, (expires_at, _)| *expires_at > now);
        map.insert(key.to_string(), (now + ttl, value.to_string()));
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ------------------------------------------------------------
// File
// ------------------------------------------------------------

/// Writes between two sweeps of expired files.
const FILE_SWEEP_EVERY: usize = 64;

/// One JSON file per key under `dir`, written via tmp + rename.
/// Expired files are swept every `FILE_SWEEP_EVERY` writes.
#[derive(Debug)]
pub struct FileCache {
    dir: PathBuf,
    writes: AtomicUsize,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    expires_at_unix: u64,
    value: String,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let _ = std::fs::create_dir_all(&dir); // best-effort
        Self {
            dir,
            writes: AtomicUsize::new(0),
        }
    }

    /// Remove expired or unreadable entries. Returns how many files were deleted.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = now_unix();
        let mut removed = 0usize;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => serde_json::from_str::<FileEntry>(&raw)
                    .map(|e| now >= e.expires_at_unix)
                    .unwrap_or(true),
                Err(_) => continue,
            };
            if stale && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key_digest(key)))
    }
}

fn key_digest(key: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

async fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content.as_bytes()).await?;
    tokio::fs::rename(tmp, path).await
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let raw = match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // A corrupt entry is a miss; the next write replaces it.
        let entry: FileEntry = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };
        if now_unix() >= entry.expires_at_unix {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = FileEntry {
            expires_at_unix: now_unix().saturating_add(ttl.as_secs().max(1)),
            value: value.to_string(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| CacheError::Unavailable(format!("serialize entry: {e}")))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        write_atomic(&self.path_for(key), &json).await?;

        if self.writes.fetch_add(1, Ordering::Relaxed) % FILE_SWEEP_EVERY == FILE_SWEEP_EVERY - 1 {
            match self.purge_expired().await {
                Ok(removed) if removed > 0 => {
                    tracing::debug!(target: "calendar", removed, "swept expired cache files")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(target: "calendar", error = %e, "cache sweep failed"),
            }
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

// ------------------------------------------------------------
// KV over REST (Upstash / Vercel KV compatible)
// ------------------------------------------------------------

/// Redis-like KV reached over its REST API:
/// `GET {base}/get/{key}` and `POST {base}/set/{key}?EX={ttl}` with the value as body.
pub struct KvRestCache {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct KvGetResponse {
    result: Option<String>,
}

impl KvRestCache {
    pub fn new(base_url: &str, token: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn key_url(&self, op: &str, key: &str) -> Result<reqwest::Url, CacheError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CacheError::Unavailable(format!("bad KV url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| CacheError::Unavailable("KV url cannot be a base".into()))?
            .pop_if_empty()
            .push(op)
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl CacheStore for KvRestCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let resp = self
            .client
            .get(self.key_url("get", key)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CacheError::Unavailable(format!(
                "KV get returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        let body: KvGetResponse = resp.json().await?;
        Ok(body.result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let resp = self
            .client
            .post(self.key_url("set", key)?)
            .bearer_auth(&self.token)
            .query(&[("EX", ttl.as_secs().max(1).to_string())])
            .body(value.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CacheError::Unavailable(format!(
                "KV set returned HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "kv"
    }
}
