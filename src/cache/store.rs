//! Cache adapter contract and the in-memory implementation.
//!
//! The engine talks to any key-value cache through [`CacheStore`]. Keys and
//! patterns are plain strings; pattern semantics follow Redis glob rules.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store::MemoryCache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Uniform interface over a key-value cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key matching a glob pattern; returns the number removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process cache with per-entry expiration and LRU eviction.
pub struct MemoryCache {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of stored entries, including any that expired but were not yet
    /// observed.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Live keys in most-recently-used order.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_matching");
        let matched: Vec<(String, bool)> = entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, entry)| (key.clone(), entry.is_live(now)))
            .collect();

        let mut removed = 0;
        for (key, live) in matched {
            entries.pop(&key);
            if live {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Redis-compatible glob matching: `*`, `?`, `[...]` (with `^` negation and
/// ranges) and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        let step = if pi < pattern.len() {
            match pattern[pi] {
                '*' => {
                    backtrack = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => Some(pi + 1),
                '[' => match match_class(&pattern, pi, text[ti]) {
                    Some((true, next)) => Some(next),
                    Some((false, _)) => None,
                    None => (text[ti] == '[').then_some(pi + 1),
                },
                '\\' if pi + 1 < pattern.len() => (pattern[pi + 1] == text[ti]).then_some(pi + 2),
                literal => (literal == text[ti]).then_some(pi + 1),
            }
        } else {
            None
        };

        if let Some(next) = step {
            pi = next;
            ti += 1;
            continue;
        }
        if let Some((star, resume)) = backtrack {
            pi = star + 1;
            ti = resume + 1;
            backtrack = Some((star, resume + 1));
            continue;
        }
        return false;
    }

    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

/// Returns `(matched, index after the closing bracket)`, or `None` when the
/// class is unterminated.
fn match_class(pattern: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        let current = *pattern.get(i)?;
        match current {
            ']' => break,
            '\\' => {
                let escaped = *pattern.get(i + 1)?;
                matched |= escaped == ch;
                i += 2;
            }
            low if pattern.get(i + 1) == Some(&'-')
                && pattern.get(i + 2).is_some_and(|high| *high != ']') =>
            {
                let high = pattern[i + 2];
                let (low, high) = if low <= high { (low, high) } else { (high, low) };
                matched |= (low..=high).contains(&ch);
                i += 3;
            }
            other => {
                matched |= other == ch;
                i += 1;
            }
        }
    }
    Some((matched != negate, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_wildcards() {
        assert!(glob_match("user:*", "user:list:10:1"));
        assert!(glob_match("user:*", "user:"));
        assert!(!glob_match("user:*", "users"));
        assert!(glob_match("user:?", "user:1"));
        assert!(!glob_match("user:?", "user:12"));
        assert!(glob_match("*:list:*", "user:list:5:1"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn glob_classes_and_escapes() {
        assert!(glob_match("v[0-9]", "v7"));
        assert!(!glob_match("v[^0-9]", "v7"));
        assert!(glob_match("v[abc]", "vb"));
        assert!(glob_match(r"a\*b", "a*b"));
        assert!(!glob_match(r"a\*b", "axb"));
        assert!(glob_match(r"k[\]]", "k]"));
        assert!(glob_match("[", "["));
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let cache = MemoryCache::default();
        assert!(cache.get("k").await.expect("get").is_none());

        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .expect("set");
        assert_eq!(
            cache.get("k").await.expect("get"),
            Some(Bytes::from_static(b"v"))
        );

        cache.delete("k").await.expect("delete");
        cache.delete("k").await.expect("deleting an absent key is a no-op");
        assert!(cache.get("k").await.expect("get").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::default();
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(5))
            .await
            .expect("set");

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get("k").await.expect("get").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.expect("get").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_matching_removes_only_matching_keys() {
        let cache = MemoryCache::default();
        for key in ["user:list:10:1", "user:list:10:2", "user:email:a"] {
            cache
                .set(key, Bytes::from_static(b"[]"), Duration::from_secs(60))
                .await
                .expect("set");
        }

        let removed = cache.delete_matching("user:list:*").await.expect("scan");
        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec!["user:email:a".to_string()]);
    }

    #[tokio::test]
    async fn lru_capacity_evicts_oldest() {
        let cache = MemoryCache::new(&CacheConfig {
            memory_capacity: 2,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            cache
                .set(key, Bytes::from_static(b"1"), Duration::from_secs(60))
                .await
                .expect("set");
        }
        assert!(cache.get("a").await.expect("get").is_none());
        assert_eq!(cache.len(), 2);
    }
}
