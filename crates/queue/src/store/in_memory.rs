use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::r#trait::{QueueStore, StoreError};

#[derive(Debug)]
enum Value {
    Text(String),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct State {
    entries: HashMap<String, Entry>,
    clock_offset: Duration,
    available: bool,
}

impl State {
    fn now(&self) -> Instant {
        Instant::now() + self.clock_offset
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        }
    }

    fn purge_expired(&mut self) {
        let now = self.now();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|at| at > now));
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = self.now();
        if self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= now)
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn pop_front(&mut self, list: &str) -> Result<Option<String>, StoreError> {
        let Some(entry) = self.live(list) else {
            return Ok(None);
        };
        let Value::List(items) = &mut entry.value else {
            return Err(wrong_type(list));
        };
        let head = items.pop_front();
        if items.is_empty() {
            self.entries.remove(list);
        }
        Ok(head)
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!("WRONGTYPE operation against key {key}"))
}

/// In-memory queue store for tests/dev.
///
/// Mirrors the broker semantics the client relies on: per-key expiry, FIFO
/// lists with blocking pop, sets and counters. Expiry is evaluated lazily
/// against a clock that tests can move forward.
#[derive(Debug)]
pub struct InMemoryQueueStore {
    state: Mutex<State>,
    pushed: Condvar,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                clock_offset: Duration::ZERO,
                available: true,
            }),
            pushed: Condvar::new(),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Simulate a broker outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
        self.pushed.notify_all();
    }

    /// Move the store's expiry clock forward.
    pub fn fast_forward(&self, by: Duration) {
        self.state().clock_offset += by;
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.check_available()?;

        let current = match state.live(key) {
            None => 0,
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => text
                .parse::<u64>()
                .map_err(|_| StoreError::Command(format!("value at {key} is not an integer")))?,
            Some(_) => return Err(wrong_type(key)),
        };

        let next = current + 1;
        let expires_at = state.entries.get(key).and_then(|e| e.expires_at);
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_available()?;
        let expires_at = Some(state.now() + ttl);
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        match state.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        let existed = state.live(key).is_some();
        state.entries.remove(key);
        Ok(existed)
    }

    fn push(&self, list: &str, value: &str) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.check_available()?;

        let len = match state.live(list) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                items.push_back(value.to_string());
                items.len()
            }
            Some(_) => return Err(wrong_type(list)),
            None => {
                state.entries.insert(
                    list.to_string(),
                    Entry {
                        value: Value::List(VecDeque::from([value.to_string()])),
                        expires_at: None,
                    },
                );
                1
            }
        };

        drop(state);
        self.pushed.notify_all();
        Ok(len as u64)
    }

    fn pop_blocking(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();

        loop {
            state.check_available()?;
            if let Some(head) = state.pop_front(list)? {
                return Ok(Some(head));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            state = self
                .pushed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn list_len(&self, list: &str) -> Result<u64, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        match state.live(list) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.len() as u64),
            Some(_) => Err(wrong_type(list)),
        }
    }

    fn set_add(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_available()?;

        match state.live(set) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.insert(member.to_string());
            }
            Some(_) => return Err(wrong_type(set)),
            None => {
                state.entries.insert(
                    set.to_string(),
                    Entry {
                        value: Value::Set(BTreeSet::from([member.to_string()])),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        match state.live(set) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(set)),
        }
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_available()?;
        let at = state.now() + ttl;
        if let Some(entry) = state.live(key) {
            entry.expires_at = Some(at);
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        state.check_available()?;
        state.purge_expired();
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.state().check_available()
    }
}
