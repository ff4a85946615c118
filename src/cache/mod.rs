//! Content-addressed result cache
//!
//! Classification results are cached on disk so repeated queries skip the
//! analyzers entirely. Queries are normalized (lower-cased, punctuation
//! stripped, whitespace collapsed) and hashed with SHA-256 to a fixed-length
//! key.
//!
//! # Layout
//!
//! ```text
//! <root>/index.json          key → access metadata, persisted hit total
//! <root>/entries/<key>.json  one CacheEntry per file
//! ```
//!
//! Queries mentioning time-sensitive words ("latest", "today", a current
//! year, ...) bypass the cache in both directions. I/O failures never fail
//! the caller: they are logged and the operation behaves like a miss.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{AppError, Result};
use crate::utils::fs::{read_json, write_json_atomic};

/// Share of entries evicted when the cache is full
const EVICTION_FRACTION: f64 = 0.1;

// ============================================================================
// Cache Types
// ============================================================================

/// Configuration for the result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the cache is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cache directory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Entry lifetime in seconds (default: 7 days)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Entry count that triggers eviction
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Queries containing any of these words are never cached
    #[serde(default = "default_bypass_keywords")]
    pub bypass_keywords: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from(".waveplan/cache")
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_entries() -> usize {
    1000
}

fn default_bypass_keywords() -> Vec<String> {
    ["latest", "today", "current", "recent", "breaking", "2025", "2026"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            root: default_root(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            bypass_keywords: default_bypass_keywords(),
        }
    }
}

/// One cached result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub query: String,
    pub normalized_query: String,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    normalized_query: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    hit_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CacheIndex {
    #[serde(default)]
    entries: BTreeMap<String, IndexEntry>,
    /// Hits across the cache's whole lifetime, evicted entries included
    #[serde(default)]
    total_hits: u64,
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub root: PathBuf,
    /// Number of entries in the index
    pub entry_count: usize,
    /// Entries past their expiry, not yet pruned
    pub expired_count: usize,
    /// Persisted hit total
    pub total_hits: u64,
    /// Hits in this process
    pub hits: u64,
    /// Misses in this process
    pub misses: u64,
    /// Bypassed lookups and stores in this process
    pub bypasses: u64,
    /// Evictions in this process
    pub evictions: u64,
}

impl CacheStats {
    /// Session hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Lower-case, strip punctuation, collapse whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case alphanumeric runs
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// SHA-256 hex digest of the normalized query
pub fn cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_query(query).as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Result Cache
// ============================================================================

/// File-backed result cache with TTL expiry and LRU eviction
#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    /// Serializes index read-modify-write cycles within the process
    lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypasses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache rooted at `root` with default settings
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self::new(CacheConfig {
            root: root.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether the raw query contains a time-sensitive keyword as whole words
    pub fn is_bypassed(&self, query: &str) -> bool {
        let query_words = words(query);
        self.config.bypass_keywords.iter().any(|keyword| {
            let phrase = words(keyword);
            !phrase.is_empty()
                && query_words
                    .windows(phrase.len())
                    .any(|window| window == phrase.as_slice())
        })
    }

    /// Look up a cached result. Misses, bypasses and I/O failures all yield `None`.
    pub fn get<T: DeserializeOwned>(&self, query: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        if self.is_bypassed(query) {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache bypassed for time-sensitive query");
            return None;
        }

        match self.lookup(query) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(result) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(result)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cached result has an unexpected shape; ignoring");
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed; continuing uncached");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result. Returns whether it was written.
    pub fn set<T: Serialize>(&self, query: &str, result: &T) -> bool {
        if !self.config.enabled {
            return false;
        }
        if self.is_bypassed(query) {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Result is not serializable; not cached");
                return false;
            }
        };
        match self.store(query, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Cache write failed; continuing uncached");
                false
            }
        }
    }

    /// Delete every expired entry; returns how many were removed
    pub fn prune_expired(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut index = self.load_index()?;
        let now = Utc::now();
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| now > e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            index.entries.remove(key);
            self.remove_entry_file(key)?;
        }
        self.save_index(&index)?;
        tracing::info!(removed = expired.len(), "Pruned expired cache entries");
        Ok(expired.len())
    }

    /// Delete every entry; returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let index = self.load_index()?;
        let count = index.entries.len();
        let entries = self.entries_dir();
        if entries.exists() {
            std::fs::remove_dir_all(&entries).map_err(cache_io)?;
        }
        self.save_index(&CacheIndex {
            entries: BTreeMap::new(),
            total_hits: index.total_hits,
        })?;
        tracing::info!(removed = count, "Cache cleared");
        Ok(count)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let _guard = self.lock.lock();
        let index = self.load_index()?;
        let now = Utc::now();
        Ok(CacheStats {
            enabled: self.config.enabled,
            root: self.config.root.clone(),
            entry_count: index.entries.len(),
            expired_count: index.entries.values().filter(|e| now > e.expires_at).count(),
            total_hits: index.total_hits,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    /// Persisted hit count of one entry, if present
    pub fn hit_count(&self, query: &str) -> Option<u64> {
        let _guard = self.lock.lock();
        self.read_entry(&cache_key(query)).ok().flatten().map(|e| e.hit_count)
    }

    // ========================================================================
    // Storage
    // ========================================================================

    fn lookup(&self, query: &str) -> Result<Option<serde_json::Value>> {
        let _guard = self.lock.lock();
        let key = cache_key(query);
        let Some(mut entry) = self.read_entry(&key)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut index = self.load_index()?;
        if entry.is_expired(now) {
            tracing::debug!(key = %key, "Cache entry expired");
            index.entries.remove(&key);
            self.remove_entry_file(&key)?;
            self.save_index(&index)?;
            return Ok(None);
        }

        entry.hit_count += 1;
        entry.last_accessed = now;
        self.write_entry(&entry)?;

        index.total_hits += 1;
        index
            .entries
            .entry(key.clone())
            .and_modify(|e| {
                e.hit_count = entry.hit_count;
                e.last_accessed = now;
            })
            .or_insert_with(|| index_entry(&entry));
        self.save_index(&index)?;

        tracing::debug!(key = %key, hits = entry.hit_count, "Cache hit");
        Ok(Some(entry.result))
    }

    fn store(&self, query: &str, result: serde_json::Value) -> Result<()> {
        let _guard = self.lock.lock();
        let key = cache_key(query);
        let mut index = self.load_index()?;

        if !index.entries.contains_key(&key) && index.entries.len() >= self.config.max_entries {
            self.evict(&mut index)?;
        }

        let now = Utc::now();
        let ttl = Duration::seconds(self.config.ttl_secs.min(u64::from(u32::MAX)) as i64);
        let entry = CacheEntry {
            key: key.clone(),
            query: query.to_string(),
            normalized_query: normalize_query(query),
            result,
            created_at: now,
            expires_at: now + ttl,
            last_accessed: now,
            hit_count: 0,
        };
        self.write_entry(&entry)?;
        index.entries.insert(key.clone(), index_entry(&entry));
        self.save_index(&index)?;
        tracing::debug!(key = %key, "Cached result");
        Ok(())
    }

    /// Drop the least recently accessed 10% (at least one entry)
    fn evict(&self, index: &mut CacheIndex) -> Result<()> {
        let count = ((index.entries.len() as f64 * EVICTION_FRACTION).ceil() as usize).max(1);
        let mut by_access: Vec<(String, DateTime<Utc>)> = index
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed))
            .collect();
        by_access.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        for (key, _) in by_access.into_iter().take(count) {
            index.entries.remove(&key);
            self.remove_entry_file(&key)?;
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        tracing::info!(evicted = count, "Cache full; evicted least recently used entries");
        Ok(())
    }

    fn index_path(&self) -> PathBuf {
        self.config.root.join("index.json")
    }

    fn entries_dir(&self) -> PathBuf {
        self.config.root.join("entries")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.entries_dir().join(format!("{}.json", key))
    }

    fn load_index(&self) -> Result<CacheIndex> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(CacheIndex::default());
        }
        read_json(&path).map_err(cache_err)
    }

    fn save_index(&self, index: &CacheIndex) -> Result<()> {
        write_json_atomic(&self.index_path(), index).map_err(cache_err)
    }

    fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some).map_err(cache_err)
    }

    fn write_entry(&self, entry: &CacheEntry) -> Result<()> {
        write_json_atomic(&self.entry_path(&entry.key), entry).map_err(cache_err)
    }

    fn remove_entry_file(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.entry_path(key))
    }
}

fn index_entry(entry: &CacheEntry) -> IndexEntry {
    IndexEntry {
        normalized_query: entry.normalized_query.clone(),
        created_at: entry.created_at,
        expires_at: entry.expires_at,
        last_accessed: entry.last_accessed,
        hit_count: entry.hit_count,
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(cache_io(e)),
    }
}

fn cache_io(e: std::io::Error) -> AppError {
    AppError::CacheIo(e.to_string())
}

fn cache_err(e: AppError) -> AppError {
    match e {
        AppError::CacheIo(_) => e,
        other => AppError::CacheIo(other.to_string()),
    }
}
