//! Content-addressed audio artifact cache.
//!
//! Maintains a hash-indexed cache of rendered WAV files with LRU eviction.
//! The index is a single JSON document rewritten wholesale on every mutation;
//! concurrent writers race last-writer-wins, which at worst leaves a dangling
//! entry that the next lookup removes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;

const INDEX_FILE: &str = "_index.json";

/// Short, filesystem-safe digest of the exact rendered text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Cache identity of a spoken project name.
pub fn project_key(name: &str) -> String {
    format!("project:{name}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: PathBuf,
    /// Source text, kept for inspection only.
    pub text: String,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheIndex {
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
}

pub struct AudioCache {
    dir: PathBuf,
    index_path: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let index_path = dir.join(INDEX_FILE);
        Self { dir, index_path }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artifact for `hash` is written when rendered.
    pub fn artifact_path(&self, hash: &str, project: bool) -> PathBuf {
        if project {
            self.dir.join(format!("proj_{hash}.wav"))
        } else {
            self.dir.join(format!("{hash}.wav"))
        }
    }

    /// Look up a cached artifact, refreshing its access time.
    ///
    /// An entry whose file has disappeared is dropped from the index and
    /// reported as a miss.
    pub fn lookup(&self, hash: &str) -> Option<PathBuf> {
        self.lookup_at(hash, Utc::now())
    }

    pub(crate) fn lookup_at(&self, hash: &str, now: DateTime<Utc>) -> Option<PathBuf> {
        let mut index = self.load_index();
        let entry = index.entries.get_mut(hash)?;

        if !entry.path.exists() {
            debug!("Stale cache entry {hash} -> {}, removing", entry.path.display());
            index.entries.remove(hash);
            self.persist(&index);
            return None;
        }

        entry.last_access = entry.last_access.max(now);
        let path = entry.path.clone();
        self.persist(&index);
        Some(path)
    }

    /// Insert or overwrite an entry, evicting down to `max_entries`.
    pub fn store(&self, hash: &str, text: &str, path: &Path, max_entries: usize) {
        self.store_at(hash, text, path, max_entries, Utc::now());
    }

    pub(crate) fn store_at(
        &self,
        hash: &str,
        text: &str,
        path: &Path,
        max_entries: usize,
        now: DateTime<Utc>,
    ) {
        let mut index = self.load_index();
        index.entries.insert(
            hash.to_string(),
            CacheEntry {
                path: path.to_path_buf(),
                text: text.to_string(),
                created: now,
                last_access: now,
            },
        );
        evict_index(&mut index, max_entries);
        self.persist(&index);
    }

    /// Remove least-recently-accessed entries until at most `max_entries` remain.
    pub fn evict(&self, max_entries: usize) {
        let mut index = self.load_index();
        if evict_index(&mut index, max_entries) > 0 {
            self.persist(&index);
        }
    }

    /// Any entry whose file still exists; a last-resort fallback sound.
    pub fn any_valid_entry(&self) -> Option<PathBuf> {
        self.load_index()
            .entries
            .into_values()
            .map(|e| e.path)
            .find(|p| p.exists())
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.load_index();
        CacheStats {
            total: index.entries.len(),
            valid: index.entries.values().filter(|e| e.path.exists()).count(),
        }
    }

    /// Load the index; unreadable or corrupt documents read as empty.
    fn load_index(&self) -> CacheIndex {
        match self.read_index() {
            Ok(index) => index,
            Err(e) => {
                warn!("Cache index {} unusable ({e}), treating as empty", self.index_path.display());
                CacheIndex::default()
            }
        }
    }

    fn read_index(&self) -> Result<CacheIndex> {
        match fs::read_to_string(&self.index_path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, index: &CacheIndex) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(index)?;
        // Rename keeps readers from seeing a half-written document.
        let tmp = self.dir.join(format!("{INDEX_FILE}.{}.tmp", std::process::id()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }

    fn persist(&self, index: &CacheIndex) {
        if let Err(e) = self.write_index(index) {
            warn!("Failed to save cache index: {e}");
        }
    }
}

/// Evict in place, best-effort deleting evicted files. Returns the count removed.
fn evict_index(index: &mut CacheIndex, max_entries: usize) -> usize {
    let excess = index.entries.len().saturating_sub(max_entries);
    if excess == 0 {
        return 0;
    }

    let mut by_age: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = index
        .entries
        .iter()
        .map(|(hash, e)| (hash.clone(), e.last_access, e.created))
        .collect();
    by_age.sort_by_key(|(_, last_access, created)| (*last_access, *created));

    for (hash, _, _) in by_age.into_iter().take(excess) {
        if let Some(entry) = index.entries.remove(&hash) {
            info!("Evicting cache entry {hash} ({:?})", entry.text);
            if let Err(e) = fs::remove_file(&entry.path) {
                debug!("Could not delete {}: {e}", entry.path.display());
            }
        }
    }
    excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn artifact(cache: &AudioCache, text: &str) -> (String, PathBuf) {
        let hash = content_hash(text);
        let path = cache.artifact_path(&hash, false);
        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(&path, b"RIFF").unwrap();
        (hash, path)
    }

    #[test]
    fn content_hash_is_stable_and_short() {
        assert_eq!(content_hash("Task complete."), content_hash("Task complete."));
        assert_ne!(content_hash("Task complete."), content_hash("Task complete"));
        assert_eq!(content_hash("x").len(), 16);
        assert!(content_hash("x").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn store_then_lookup_hits_and_refreshes_access() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path().join("cache"));
        let (hash, path) = artifact(&cache, "Done. Standing by.");

        let stored_at = Utc::now();
        cache.store(&hash, "Done. Standing by.", &path, 10);
        assert_eq!(cache.lookup(&hash), Some(path));

        let index = cache.load_index();
        assert!(index.entries[&hash].last_access >= stored_at);
    }

    #[test]
    fn access_time_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let (hash, path) = artifact(&cache, "a");
        let t0 = Utc::now();
        cache.store_at(&hash, "a", &path, 10, t0);
        cache.lookup_at(&hash, t0 - Duration::seconds(60));
        assert_eq!(cache.load_index().entries[&hash].last_access, t0);
    }

    #[test]
    fn overflow_evicts_least_recently_accessed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let t0 = Utc::now();
        let entries: Vec<_> = ["zero", "one", "two", "three"]
            .iter()
            .map(|t| (t.to_string(), artifact(&cache, t)))
            .collect();

        for (i, (text, (hash, path))) in entries.iter().take(3).enumerate() {
            cache.store_at(hash, text, path, 3, t0 + Duration::seconds(i as i64));
        }
        // Touch "zero" so "one" becomes the oldest.
        cache.lookup_at(&entries[0].1 .0, t0 + Duration::seconds(10));

        let (text, (hash, path)) = &entries[3];
        cache.store_at(hash, text, path, 3, t0 + Duration::seconds(20));

        let index = cache.load_index();
        assert_eq!(index.entries.len(), 3);
        assert!(!index.entries.contains_key(&entries[1].1 .0));
        assert!(!entries[1].1 .1.exists(), "evicted artifact should be deleted");
        assert!(index.entries.contains_key(&entries[0].1 .0));
    }

    #[test]
    fn eviction_tolerates_already_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let (h1, p1) = artifact(&cache, "first");
        let (h2, p2) = artifact(&cache, "second");
        let t0 = Utc::now();
        cache.store_at(&h1, "first", &p1, 10, t0);
        cache.store_at(&h2, "second", &p2, 10, t0 + Duration::seconds(1));
        fs::remove_file(&p1).unwrap();

        cache.evict(1);
        assert_eq!(cache.stats(), CacheStats { total: 1, valid: 1 });
    }

    #[test]
    fn missing_backing_file_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let (hash, path) = artifact(&cache, "gone soon");
        cache.store(&hash, "gone soon", &path, 10);
        fs::remove_file(&path).unwrap();

        assert_eq!(cache.lookup(&hash), None);
        assert!(cache.load_index().entries.is_empty());
        // Second lookup is a plain miss.
        assert_eq!(cache.lookup(&hash), None);
    }

    #[test]
    fn corrupt_index_reads_as_empty_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        fs::write(dir.path().join(INDEX_FILE), "{ definitely not json").unwrap();
        assert_eq!(cache.lookup("abc"), None);
        assert_eq!(cache.any_valid_entry(), None);

        let (hash, path) = artifact(&cache, "fresh");
        cache.store(&hash, "fresh", &path, 10);
        assert_eq!(cache.lookup(&hash), Some(path));
    }

    #[test]
    fn any_valid_entry_skips_dangling() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path());
        let (h1, p1) = artifact(&cache, "dangling");
        let (h2, p2) = artifact(&cache, "present");
        cache.store(&h1, "dangling", &p1, 10);
        cache.store(&h2, "present", &p2, 10);
        fs::remove_file(&p1).unwrap();

        assert_eq!(cache.any_valid_entry(), Some(p2));
        assert_eq!(cache.stats(), CacheStats { total: 2, valid: 1 });
    }
}
