//! Per-user word memory
//!
//! Append-only JSONL log of message token counts, replayed at startup and
//! held in memory for scoring. Events older than the retention window are
//! dropped; when expired or unreadable lines are found the file is
//! compacted in place.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoryKey {
    guild_id: String,
    channel_id: String,
    user_id: String,
}

impl MemoryKey {
    fn new(guild_id: &str, channel_id: &str, user_id: &str) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// One recorded message, as persisted to the JSONL log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryEvent {
    timestamp_millis: i64,
    guild_id: String,
    channel_id: String,
    user_id: String,
    content: String,
    token_counts: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
struct MemoryMessage {
    timestamp_millis: i64,
    content: String,
}

#[derive(Default)]
struct Inner {
    events: VecDeque<MemoryEvent>,
    counts: HashMap<MemoryKey, HashMap<String, u32>>,
    recent: HashMap<MemoryKey, VecDeque<MemoryMessage>>,
}

pub struct WordMemoryStore {
    path: PathBuf,
    retention: Duration,
    inner: Mutex<Inner>,
}

impl WordMemoryStore {
    pub fn new(path: impl Into<PathBuf>, retention_days: i64) -> Self {
        Self {
            path: path.into(),
            retention: Duration::days(retention_days.max(1)),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Replays the JSONL log, skipping expired or malformed lines and
    /// compacting the file when any were found.
    pub fn load(&self) {
        if !self.path.exists() {
            return;
        }
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to read word memory: {}", e);
                return;
            }
        };
        let now = Utc::now();
        let mut compact_needed = false;
        let mut inner = self.lock();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read word memory line: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryEvent>(&line) {
                Ok(event) if self.is_expired(&event, now) => compact_needed = true,
                Ok(event) => add_event(&mut inner, event),
                Err(_) => {
                    compact_needed = true;
                    warn!("Invalid word memory entry skipped");
                }
            }
        }
        if compact_needed {
            self.rewrite_file(&inner);
        }
    }

    pub fn record_message(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) {
        if content.trim().is_empty() {
            return;
        }
        let tokens = tokenize_content(content);
        if tokens.is_empty() {
            return;
        }
        let event = MemoryEvent {
            timestamp_millis: timestamp.timestamp_millis(),
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            token_counts: build_token_counts(&tokens),
        };
        let mut inner = self.lock();
        let compact_needed = self.prune(&mut inner, Utc::now());
        add_event(&mut inner, event.clone());
        if compact_needed {
            self.rewrite_file(&inner);
        } else {
            self.append_event(&event);
        }
    }

    /// Most recent messages first, at most `limit` entries.
    pub fn recent_messages(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        limit: usize,
    ) -> Vec<String> {
        if limit == 0 {
            return Vec::new();
        }
        let cutoff = (Utc::now() - self.retention).timestamp_millis();
        let mut inner = self.lock();
        let key = MemoryKey::new(guild_id, channel_id, user_id);
        let Some(messages) = inner.recent.get_mut(&key) else {
            return Vec::new();
        };
        while matches!(messages.front(), Some(m) if m.timestamp_millis < cutoff) {
            messages.pop_front();
        }
        messages
            .iter()
            .rev()
            .filter(|m| !m.content.trim().is_empty())
            .take(limit)
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn token_count(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        token: &str,
    ) -> u32 {
        let normalized = token.trim().to_lowercase();
        if normalized.is_empty() {
            return 0;
        }
        let inner = self.lock();
        inner
            .counts
            .get(&MemoryKey::new(guild_id, channel_id, user_id))
            .and_then(|counts| counts.get(&normalized))
            .copied()
            .unwrap_or(0)
    }

    pub fn token_counts(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> HashMap<String, u32> {
        let inner = self.lock();
        inner
            .counts
            .get(&MemoryKey::new(guild_id, channel_id, user_id))
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_expired(&self, event: &MemoryEvent, now: DateTime<Utc>) -> bool {
        event.timestamp_millis < (now - self.retention).timestamp_millis()
    }

    /// Drops expired events and unwinds their token counts.
    fn prune(&self, inner: &mut Inner, now: DateTime<Utc>) -> bool {
        let cutoff = (now - self.retention).timestamp_millis();
        let mut removed = false;
        while matches!(inner.events.front(), Some(e) if e.timestamp_millis < cutoff) {
            let expired = match inner.events.pop_front() {
                Some(event) => event,
                None => break,
            };
            let key = MemoryKey::new(&expired.guild_id, &expired.channel_id, &expired.user_id);
            if let Some(counts) = inner.counts.get_mut(&key) {
                for (token, count) in &expired.token_counts {
                    if let Some(total) = counts.get_mut(token) {
                        *total = total.saturating_sub(*count);
                        if *total == 0 {
                            counts.remove(token);
                        }
                    }
                }
                if counts.is_empty() {
                    inner.counts.remove(&key);
                }
            }
            if let Some(messages) = inner.recent.get_mut(&key) {
                while matches!(messages.front(), Some(m) if m.timestamp_millis < cutoff) {
                    messages.pop_front();
                }
                if messages.is_empty() {
                    inner.recent.remove(&key);
                }
            }
            removed = true;
        }
        removed
    }

    fn append_event(&self, event: &MemoryEvent) {
        if let Err(e) = self.try_append(event) {
            warn!("Failed to append word memory event: {}", e);
        }
    }

    fn try_append(&self, event: &MemoryEvent) -> std::io::Result<()> {
        self.ensure_parent_directory()?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{}", line)
    }

    fn rewrite_file(&self, inner: &Inner) {
        if let Err(e) = self.try_rewrite(inner) {
            warn!("Failed to compact word memory: {}", e);
        }
    }

    fn try_rewrite(&self, inner: &Inner) -> std::io::Result<()> {
        self.ensure_parent_directory()?;
        let mut file = fs::File::create(&self.path)?;
        for event in &inner.events {
            let line = serde_json::to_string(event)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    fn ensure_parent_directory(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

fn add_event(inner: &mut Inner, event: MemoryEvent) {
    let key = MemoryKey::new(&event.guild_id, &event.channel_id, &event.user_id);
    let counts = inner.counts.entry(key.clone()).or_default();
    for (token, count) in &event.token_counts {
        *counts.entry(token.clone()).or_insert(0) += count;
    }
    if !event.content.trim().is_empty() {
        inner.recent.entry(key).or_default().push_back(MemoryMessage {
            timestamp_millis: event.timestamp_millis,
            content: event.content.clone(),
        });
    }
    inner.events.push_back(event);
}

/// Lowercased unigrams plus adjacent bigrams.
fn tokenize_content(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let mut tokens: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    for pair in words.windows(2) {
        tokens.push(format!("{} {}", pair[0], pair[1]));
    }
    tokens
}

fn build_token_counts(tokens: &[String]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokens {
        let normalized = token.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        *counts.entry(normalized).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(retention_days: i64) -> (tempfile::TempDir, WordMemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WordMemoryStore::new(dir.path().join("memory.jsonl"), retention_days);
        (dir, store)
    }

    #[test]
    fn records_unigram_and_bigram_counts() {
        let (_dir, store) = temp_store(30);
        store.record_message("g", "c", "u", "free nitro free", Utc::now());
        assert_eq!(store.token_count("g", "c", "u", "free"), 2);
        assert_eq!(store.token_count("g", "c", "u", "free nitro"), 1);
        assert_eq!(store.token_count("g", "c", "u", "nitro free"), 1);
        assert_eq!(store.token_count("g", "c", "u", "absent"), 0);
    }

    #[test]
    fn counts_are_scoped_per_guild_channel_user() {
        let (_dir, store) = temp_store(30);
        store.record_message("g1", "c1", "u1", "hello", Utc::now());
        assert_eq!(store.token_count("g1", "c1", "u1", "hello"), 1);
        assert_eq!(store.token_count("g1", "c2", "u1", "hello"), 0);
        assert_eq!(store.token_count("g2", "c1", "u1", "hello"), 0);
    }

    #[test]
    fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        {
            let store = WordMemoryStore::new(&path, 30);
            store.record_message("g", "c", "u", "hello world", Utc::now());
        }
        let reloaded = WordMemoryStore::new(&path, 30);
        reloaded.load();
        assert_eq!(reloaded.token_count("g", "c", "u", "hello world"), 1);
    }

    #[test]
    fn expired_events_are_pruned_and_compacted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        {
            let store = WordMemoryStore::new(&path, 30);
            store.record_message("g", "c", "u", "old message", Utc::now() - Duration::days(40));
        }
        let reloaded = WordMemoryStore::new(&path, 30);
        reloaded.load();
        assert_eq!(reloaded.token_count("g", "c", "u", "old"), 0);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.trim().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.jsonl");
        {
            let store = WordMemoryStore::new(&path, 30);
            store.record_message("g", "c", "u", "valid entry", Utc::now());
        }
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);
        let reloaded = WordMemoryStore::new(&path, 30);
        reloaded.load();
        assert_eq!(reloaded.token_count("g", "c", "u", "valid"), 1);
        // compaction rewrote the file without the bad line
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn recent_messages_returns_newest_first() {
        let (_dir, store) = temp_store(30);
        let now = Utc::now();
        store.record_message("g", "c", "u", "first", now - Duration::minutes(2));
        store.record_message("g", "c", "u", "second", now - Duration::minutes(1));
        store.record_message("g", "c", "u", "third", now);
        assert_eq!(
            store.recent_messages("g", "c", "u", 2),
            vec!["third".to_string(), "second".to_string()]
        );
    }
}
