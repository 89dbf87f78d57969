//! Bounded cache of thread-starter messages.
//!
//! Channels that reply in threads look up the message that opened a thread
//! to give the agent context. Entries expire after a TTL; when full, the
//! oldest entry is evicted.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use {
    serde::{Deserialize, Serialize},
    tokio::time::Instant,
};

pub const DEFAULT_CAPACITY: usize = 500;
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// The message that opened a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStarter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

struct Entry {
    starter: ThreadStarter,
    inserted_at: Instant,
}

pub struct ThreadStarterCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for ThreadStarterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl ThreadStarterCache {
    /// `capacity` is at least 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, thread_key: &str) -> Option<ThreadStarter> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match entries.get(thread_key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.starter.clone())
            },
            Some(_) => {
                entries.remove(thread_key);
                None
            },
            None => None,
        }
    }

    pub fn insert(&self, thread_key: impl Into<String>, starter: ThreadStarter) {
        let thread_key = thread_key.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);

        if !entries.contains_key(&thread_key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(thread_key, Entry {
            starter,
            inserted_at: now,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
