use std::collections::{BTreeMap, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::domain::{EmployeeId, GroupKey, YearMonth};

/// Resource a transaction can hold.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockKey {
    Employee { employee_id: EmployeeId },
    Group { key: GroupKey },
    Reward { employee_id: EmployeeId, month: YearMonth },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Set of locks a transaction acquires up front, all at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRequest {
    entries: BTreeMap<LockKey, LockMode>,
}

impl LockRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutation of one or more groups: employee shared, each group exclusive.
    pub fn groups<'a>(groups: impl IntoIterator<Item = &'a GroupKey>) -> Self {
        let mut request = Self::new();
        for key in groups {
            request = request
                .shared(LockKey::Employee {
                    employee_id: key.employee_id.clone(),
                })
                .exclusive(LockKey::Group { key: key.clone() });
        }
        request
    }

    pub fn shared(mut self, key: LockKey) -> Self {
        self.entries.entry(key).or_insert(LockMode::Shared);
        self
    }

    pub fn exclusive(mut self, key: LockKey) -> Self {
        self.entries.insert(key, LockMode::Exclusive);
        self
    }

    pub fn keys(&self) -> Vec<LockKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Holders {
    Shared(usize),
    Exclusive,
}

/// The wait for a lock set ran past its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    pub waited: Duration,
}

/// In-process lock manager keyed by [`LockKey`].
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashMap<LockKey, Holders>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every entry of `request` can be granted together, or `wait` elapses.
    pub fn acquire(&self, request: &LockRequest, wait: Duration) -> Result<LockGuard<'_>, LockTimeout> {
        let started = Instant::now();
        let deadline = started + wait;
        let mut held = self.state();

        loop {
            if Self::grantable(&held, request) {
                Self::grant(&mut held, request);
                return Ok(LockGuard {
                    table: self,
                    request: request.clone(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockTimeout {
                    waited: now - started,
                });
            }

            held = self
                .released
                .wait_timeout(held, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Number of keys currently held; used by diagnostics and tests.
    pub fn held_count(&self) -> usize {
        self.state().len()
    }

    fn state(&self) -> MutexGuard<'_, HashMap<LockKey, Holders>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn grantable(held: &HashMap<LockKey, Holders>, request: &LockRequest) -> bool {
        request
            .entries
            .iter()
            .all(|(key, mode)| match (held.get(key), mode) {
                (None, _) => true,
                (Some(Holders::Shared(_)), LockMode::Shared) => true,
                _ => false,
            })
    }

    fn grant(held: &mut HashMap<LockKey, Holders>, request: &LockRequest) {
        for (key, mode) in &request.entries {
            match mode {
                LockMode::Exclusive => {
                    held.insert(key.clone(), Holders::Exclusive);
                }
                LockMode::Shared => {
                    let entry = held.entry(key.clone()).or_insert(Holders::Shared(0));
                    if let Holders::Shared(count) = entry {
                        *count += 1;
                    }
                }
            }
        }
    }

    fn release(&self, request: &LockRequest) {
        let mut held = self.state();
        for (key, mode) in &request.entries {
            match (mode, held.get_mut(key)) {
                (LockMode::Shared, Some(Holders::Shared(count))) if *count > 1 => *count -= 1,
                _ => {
                    held.remove(key);
                }
            }
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Releases its lock set on drop, whether the transaction committed or not.
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    request: LockRequest,
}

impl LockGuard<'_> {
    pub fn keys(&self) -> Vec<LockKey> {
        self.request.keys()
    }

    /// Whether rows of `key` may be written: the group itself or its whole employee is held
    /// exclusively.
    pub fn covers_group(&self, key: &GroupKey) -> bool {
        self.holds_exclusive(&LockKey::Group { key: key.clone() })
            || self.covers_employee(&key.employee_id)
    }

    pub fn covers_employee(&self, employee_id: &EmployeeId) -> bool {
        self.holds_exclusive(&LockKey::Employee {
            employee_id: employee_id.clone(),
        })
    }

    fn holds_exclusive(&self, key: &LockKey) -> bool {
        self.request.entries.get(key) == Some(&LockMode::Exclusive)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.request);
    }
}
