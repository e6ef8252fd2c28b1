//! Content-addressed lookaside store for finished analyses.
//!
//! Entries are keyed by `(sha256(content), label)`. Two backends:
//!
//! - [`JsonlSummaryCache`]: an append-only JSON-lines file, one
//!   [`CacheEntry`] per line. Survives restarts.
//! - [`MemorySummaryCache`]: a process-local map, mostly for tests and
//!   short-lived runs.
//!
//! Storage problems never reach the caller. A failed read is a miss and a
//! failed write is dropped, both with a warning.

use crate::models::CacheEntry;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// Hex SHA-256 of the exact content string.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Best-effort summary storage.
pub trait SummaryStore {
    /// Most recent summary stored for `(content, label)`, if any.
    async fn get(&self, content: &str, label: &str) -> Option<String>;

    /// Record `summary` for `(content, label)`. Never fails outward.
    async fn put(&self, content: &str, label: &str, summary: &str);
}

fn entry(content: &str, label: &str, summary: &str) -> CacheEntry {
    CacheEntry {
        content_hash: content_hash(content),
        source_label: label.to_string(),
        summary: summary.to_string(),
        created_at: Utc::now(),
    }
}

type Key = (String, String);

/// Append-only JSON-lines file of [`CacheEntry`] records.
///
/// The file is read once, on the first lookup, into an index of the latest
/// entry per key; later lookups are served from memory and each `put` both
/// appends a line and updates the index. Lines appended by another process
/// after that first read are not seen until the cache is reopened. The file
/// itself is never compacted.
#[derive(Debug)]
pub struct JsonlSummaryCache {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    index: tokio::sync::Mutex<Option<HashMap<Key, CacheEntry>>>,
}

impl JsonlSummaryCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
            index: tokio::sync::Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &CacheEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Parse the whole file into latest-entry-per-key form.
    async fn load(&self) -> std::io::Result<HashMap<Key, CacheEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };

        let mut index = HashMap::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CacheEntry>(line) {
                Ok(record) => keep_latest(&mut index, record),
                Err(e) => debug!(line = lineno + 1, error = %e, "Skipping corrupt cache line"),
            }
        }
        debug!(path = %self.path.display(), entries = index.len(), "Loaded summary cache");
        Ok(index)
    }
}

fn keep_latest(index: &mut HashMap<Key, CacheEntry>, record: CacheEntry) {
    let key = (record.content_hash.clone(), record.source_label.clone());
    match index.get(&key) {
        Some(existing) if existing.created_at > record.created_at => {}
        _ => {
            index.insert(key, record);
        }
    }
}

impl SummaryStore for JsonlSummaryCache {
    #[instrument(level = "debug", skip_all, fields(%label))]
    async fn get(&self, content: &str, label: &str) -> Option<String> {
        let mut index = self.index.lock().await;
        if index.is_none() {
            match self.load().await {
                Ok(loaded) => *index = Some(loaded),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Summary cache unreadable; treating as miss");
                    return None;
                }
            }
        }

        let key = (content_hash(content), label.to_string());
        let hit = index.as_ref().and_then(|i| i.get(&key)).map(|r| r.summary.clone());
        debug!(hit = hit.is_some(), "Summary cache lookup");
        hit
    }

    #[instrument(level = "debug", skip_all, fields(%label))]
    async fn put(&self, content: &str, label: &str, summary: &str) {
        let record = entry(content, label, summary);
        if let Err(e) = self.append(&record).await {
            warn!(path = %self.path.display(), error = %e, "Could not write summary cache entry");
            return;
        }
        if let Some(index) = self.index.lock().await.as_mut() {
            keep_latest(index, record);
        }
    }
}

/// Process-local summary store.
#[derive(Debug, Default)]
pub struct MemorySummaryCache {
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl MemorySummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SummaryStore for MemorySummaryCache {
    async fn get(&self, content: &str, label: &str) -> Option<String> {
        let key = (content_hash(content), label.to_string());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .map(|e| e.summary.clone())
    }

    async fn put(&self, content: &str, label: &str, summary: &str) {
        let record = entry(content, label, summary);
        let key = (record.content_hash.clone(), record.source_label.clone());
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(content_hash("a"), content_hash("a "));
    }

    #[tokio::test]
    async fn test_jsonl_round_trip_and_label_independence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonlSummaryCache::new(dir.path().join("cache.jsonl"));

        assert_eq!(cache.get("content", "SourceA").await, None);
        cache.put("content", "SourceB", "summary b").await;
        assert_eq!(cache.get("content", "SourceA").await, None);
        assert_eq!(cache.get("content", "SourceB").await.as_deref(), Some("summary b"));
        assert_eq!(cache.get("other content", "SourceB").await, None);
    }

    #[tokio::test]
    async fn test_jsonl_latest_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.jsonl");
        let cache = JsonlSummaryCache::new(&path);

        cache.put("content", "Acme", "first").await;
        cache.put("content", "Acme", "second").await;
        assert_eq!(cache.get("content", "Acme").await.as_deref(), Some("second"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        JsonlSummaryCache::new(&path).put("c", "l", "kept").await;
        let reopened = JsonlSummaryCache::new(&path);
        assert_eq!(reopened.get("c", "l").await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_jsonl_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        std::fs::write(&path, "not json\n{\"half\":\n").unwrap();
        let cache = JsonlSummaryCache::new(&path);

        assert_eq!(cache.get("c", "l").await, None);
        cache.put("c", "l", "fresh").await;
        assert_eq!(cache.get("c", "l").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_jsonl_storage_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be: reads and writes both fail.
        let cache = JsonlSummaryCache::new(dir.path());
        cache.put("c", "l", "lost").await;
        assert_eq!(cache.get("c", "l").await, None);
    }

    #[tokio::test]
    async fn test_jsonl_reads_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.jsonl");
        let cache = JsonlSummaryCache::new(&path);

        cache.put("c", "l", "indexed").await;
        assert_eq!(cache.get("c", "l").await.as_deref(), Some("indexed"));

        // Served from the index, not the file.
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cache.get("c", "l").await.as_deref(), Some("indexed"));

        // Writes after the first read land in both.
        cache.put("c", "l", "newer").await;
        assert_eq!(cache.get("c", "l").await.as_deref(), Some("newer"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemorySummaryCache::new();
        assert!(cache.is_empty());
        cache.put("c", "A", "one").await;
        cache.put("c", "A", "two").await;
        cache.put("c", "B", "other").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c", "A").await.as_deref(), Some("two"));
        assert_eq!(cache.get("c", "B").await.as_deref(), Some("other"));
        assert_eq!(cache.get("c", "C").await, None);
    }
}
