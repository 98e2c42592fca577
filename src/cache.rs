//! Converted artifact cache.
//!
//! Entries are opaque bytes under a string key, each with its own expiry.
//! [`SavedArtifact`] is the framing the conversion service stores.

use quick_cache::sync::Cache as QuickCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Default cache capacity (number of entries).
const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Key-value store for converted artifacts.
pub trait Cache: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn save(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub capacity: usize,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl_secs: 86400,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    expires_at: Instant,
}

/// Bounded in-process cache.
pub struct MemoryCache {
    entries: QuickCache<String, Entry>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: QuickCache::new(capacity.max(1)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl Cache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.bytes.to_vec())),
            Some(_) => {
                log::debug!("Cache entry {} expired", key);
                self.entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> Result<()> {
        let entry = Entry {
            bytes: bytes.into(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}

/// A converted artifact together with its upstream validators.
///
/// Layout:
/// ```text
/// [u64 last_updated_secs][u16 etag_len][etag][content...]
/// ```
/// All integers are little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub content: Vec<u8>,
    pub etag: Option<String>,
    pub last_updated: SystemTime,
}

const ARTIFACT_HEADER_SIZE: usize = 10;

impl SavedArtifact {
    pub fn to_bytes(&self) -> Vec<u8> {
        let secs = self
            .last_updated
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // an ETag too long for the length field is not stored at all
        let etag = self
            .etag
            .as_deref()
            .map(str::as_bytes)
            .filter(|etag| etag.len() <= u16::MAX as usize)
            .unwrap_or_default();

        let mut out = Vec::with_capacity(ARTIFACT_HEADER_SIZE + etag.len() + self.content.len());
        out.extend_from_slice(&secs.to_le_bytes());
        out.extend_from_slice(&(etag.len() as u16).to_le_bytes());
        out.extend_from_slice(etag);
        out.extend_from_slice(&self.content);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < ARTIFACT_HEADER_SIZE {
            return Err(Error::Codec("cached artifact too small".to_string()));
        }
        let mut secs = [0u8; 8];
        secs.copy_from_slice(&data[0..8]);
        let etag_len = u16::from_le_bytes([data[8], data[9]]) as usize;

        let rest = &data[ARTIFACT_HEADER_SIZE..];
        if rest.len() < etag_len {
            return Err(Error::Codec("cached artifact truncated".to_string()));
        }
        let (etag, content) = rest.split_at(etag_len);
        let etag = std::str::from_utf8(etag)
            .map_err(|_| Error::Codec("cached artifact has invalid ETag".to_string()))?;

        Ok(Self {
            content: content.to_vec(),
            etag: (!etag.is_empty()).then(|| etag.to_string()),
            last_updated: UNIX_EPOCH + Duration::from_secs(u64::from_le_bytes(secs)),
        })
    }
}
