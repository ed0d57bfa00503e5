use std::{collections::HashMap, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::entity::User;

/// Bounds applied to the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Entries older than this are treated as absent. `None` keeps them forever.
    pub ttl: Option<Duration>,
    /// Maximum number of live entries. `None` means no limit.
    pub capacity: Option<usize>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(24 * 60 * 60)),
            capacity: Some(10_000),
        }
    }
}

struct Entry {
    user: User,
    written_at: Instant,
}

/// Last known profile per session user id.
///
/// Each operation takes the lock once and releases it before returning.
#[derive(Default)]
pub struct Sessions {
    policy: SessionPolicy,
    map: Mutex<HashMap<String, Entry>>,
}

impl Sessions {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Store without expiry or capacity limit.
    pub fn unbounded() -> Self {
        Self::new(SessionPolicy {
            ttl: None,
            capacity: None,
        })
    }

    /// Inserts or replaces the profile stored under `id`.
    pub async fn set(&self, id: impl Into<String>, user: User) {
        let id = id.into();
        let now = Instant::now();
        let mut map = self.map.lock().await;

        if let Some(ttl) = self.policy.ttl {
            map.retain(|_, entry| now.duration_since(entry.written_at) < ttl);
        }

        if let Some(capacity) = self.policy.capacity {
            while !map.contains_key(&id) && map.len() >= capacity.max(1) {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, entry)| entry.written_at)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => {
                        log::debug!("session store full, evicting {}", key);
                        map.remove(&key);
                    }
                    None => break,
                }
            }
        }

        map.insert(
            id,
            Entry {
                user,
                written_at: now,
            },
        );
    }

    /// Returns the profile stored under `id`, if present and not expired.
    pub async fn get(&self, id: &str) -> Option<User> {
        let mut map = self.map.lock().await;
        let expired = match (map.get(id), self.policy.ttl) {
            (None, _) => return None,
            (Some(entry), Some(ttl)) => entry.written_at.elapsed() >= ttl,
            (Some(_), None) => false,
        };
        if expired {
            map.remove(id);
            return None;
        }
        map.get(id).map(|entry| entry.user.clone())
    }

    /// Number of entries currently held, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
