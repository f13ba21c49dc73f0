use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::domain::{
    CumulativeCounter, EmployeeId, EmployeeRecord, EventId, GroupKey, MonthlyRewardRecord,
    ScoredEvent, YearMonth,
};
use super::error::{NotFoundError, ScoringError};
use super::locks::{LockGuard, LockRequest, LockTable};
use super::repository::{ChangeSet, EmployeeSnapshot, LedgerRepository};

/// Bounded wait applied to every lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub wait: Duration,
    pub retries: u8,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(2000),
            retries: 1,
        }
    }
}

/// Repository plus the lock table guarding it; the entry point for every transaction.
pub struct Ledger<R> {
    repository: Arc<R>,
    locks: LockTable,
    policy: LockPolicy,
}

impl<R> Ledger<R>
where
    R: LedgerRepository,
{
    pub fn new(repository: Arc<R>, policy: LockPolicy) -> Self {
        Self {
            repository,
            locks: LockTable::new(),
            policy,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Opens a transaction holding every lock in `request`. A timed-out wait is retried
    /// `policy.retries` times before surfacing as [`ScoringError::Concurrency`].
    pub fn begin(&self, request: LockRequest) -> Result<LedgerTransaction<'_, R>, ScoringError> {
        let mut attempts: u8 = 0;
        loop {
            attempts += 1;
            match self.locks.acquire(&request, self.policy.wait) {
                Ok(guard) => {
                    return Ok(LedgerTransaction {
                        repository: self.repository.as_ref(),
                        guard,
                        changes: ChangeSet::default(),
                        audited: BTreeSet::new(),
                    })
                }
                Err(timeout) if attempts <= self.policy.retries => {
                    warn!(
                        keys = ?request.keys(),
                        waited_ms = timeout.waited.as_millis() as u64,
                        attempt = attempts,
                        "lock wait timed out, retrying"
                    );
                }
                Err(timeout) => {
                    return Err(ScoringError::Concurrency {
                        keys: request.keys(),
                        waited: timeout.waited,
                        attempts,
                    })
                }
            }
        }
    }
}

/// Unit of work over the ledger. Reads see committed state overlaid with this transaction's
/// staged writes. Nothing reaches the repository until [`LedgerTransaction::commit`]; dropping the
/// transaction discards the staged writes and releases the locks.
pub struct LedgerTransaction<'a, R> {
    repository: &'a R,
    guard: LockGuard<'a>,
    changes: ChangeSet,
    audited: BTreeSet<AuditScope>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AuditScope {
    Employee(EmployeeId),
    Group(GroupKey),
}

impl<'a, R> LedgerTransaction<'a, R>
where
    R: LedgerRepository,
{
    pub fn guard(&self) -> &LockGuard<'a> {
        &self.guard
    }

    pub fn find_employee(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, ScoringError> {
        if let Some(record) = self.changes.employees.get(id) {
            return Ok(Some(record.clone()));
        }
        Ok(self.repository.employee(id)?)
    }

    pub fn employee(&self, id: &EmployeeId) -> Result<EmployeeRecord, ScoringError> {
        self.find_employee(id)?
            .ok_or_else(|| NotFoundError::Employee(id.clone()).into())
    }

    pub fn event(&self, id: EventId) -> Result<ScoredEvent, ScoringError> {
        if let Some(event) = self.changes.events.get(&id) {
            return Ok(event.clone());
        }
        self.repository
            .event(id)?
            .ok_or_else(|| NotFoundError::Event(id).into())
    }

    /// Active events of the group in chronological order, ties broken by insertion order.
    pub fn active_group_events(&self, key: &GroupKey) -> Result<Vec<ScoredEvent>, ScoringError> {
        let mut events: Vec<ScoredEvent> = self
            .repository
            .group_events(key)?
            .into_iter()
            .filter(|event| !self.changes.events.contains_key(&event.id))
            .chain(
                self.changes
                    .events
                    .values()
                    .filter(|event| &event.group_key() == key)
                    .cloned(),
            )
            .filter(ScoredEvent::is_active)
            .collect();
        events.sort_by_key(ScoredEvent::chronological_key);
        Ok(events)
    }

    pub fn employee_events(&self, id: &EmployeeId) -> Result<Vec<ScoredEvent>, ScoringError> {
        let mut events: Vec<ScoredEvent> = self
            .repository
            .employee_events(id)?
            .into_iter()
            .filter(|event| !self.changes.events.contains_key(&event.id))
            .chain(
                self.changes
                    .events
                    .values()
                    .filter(|event| &event.employee_id == id)
                    .cloned(),
            )
            .collect();
        events.sort_by_key(ScoredEvent::chronological_key);
        Ok(events)
    }

    pub fn counter(&self, key: &GroupKey) -> Result<CumulativeCounter, ScoringError> {
        if let Some(counter) = self.changes.counters.get(key) {
            return Ok(counter.clone());
        }
        Ok(self
            .repository
            .counter(key)?
            .unwrap_or_else(|| CumulativeCounter::empty(key.clone())))
    }

    pub fn employee_counters(&self, id: &EmployeeId) -> Result<Vec<CumulativeCounter>, ScoringError> {
        let mut counters: Vec<CumulativeCounter> = self
            .repository
            .employee_counters(id)?
            .into_iter()
            .filter(|counter| !self.changes.counters.contains_key(&counter.key))
            .chain(
                self.changes
                    .counters
                    .values()
                    .filter(|counter| &counter.key.employee_id == id)
                    .cloned(),
            )
            .collect();
        counters.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(counters)
    }

    pub fn monthly_reward(
        &self,
        id: &EmployeeId,
        month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, ScoringError> {
        if let Some(record) = self.changes.rewards.get(&(id.clone(), month)) {
            return Ok(Some(record.clone()));
        }
        Ok(self.repository.monthly_reward(id, month)?)
    }

    /// Committed view of the group, ignoring this transaction's staged writes.
    pub fn committed_group(
        &self,
        key: &GroupKey,
    ) -> Result<(Option<CumulativeCounter>, Vec<ScoredEvent>), ScoringError> {
        let counter = self.repository.counter(key)?;
        let events = self.repository.group_events(key)?;
        Ok((counter, events))
    }

    pub fn committed_employee(&self, id: &EmployeeId) -> Result<EmployeeSnapshot, ScoringError> {
        self.repository
            .employee_snapshot(id)?
            .ok_or_else(|| NotFoundError::Employee(id.clone()).into())
    }

    pub fn allocate_event_id(&self) -> Result<EventId, ScoringError> {
        Ok(self.repository.allocate_event_id()?)
    }

    pub fn put_event(&mut self, event: ScoredEvent) {
        debug_assert!(
            self.guard.covers_group(&event.group_key()),
            "event {} written outside its group lock",
            event.id
        );
        self.changes.events.insert(event.id, event);
    }

    pub fn put_counter(&mut self, counter: CumulativeCounter) {
        debug_assert!(
            self.guard.covers_group(&counter.key),
            "counter {} written outside its group lock",
            counter.key
        );
        self.changes.counters.insert(counter.key.clone(), counter);
    }

    pub fn put_employee(&mut self, record: EmployeeRecord) {
        debug_assert!(
            self.guard.covers_employee(&record.id),
            "employee {} written without the employee lock",
            record.id
        );
        self.changes.employees.insert(record.id.clone(), record);
    }

    pub fn put_reward(&mut self, record: MonthlyRewardRecord) {
        self.changes
            .rewards
            .insert((record.employee_id.clone(), record.month), record);
    }

    /// Marks the employee's aggregate score for re-derivation at commit.
    pub fn rescore(&mut self, id: &EmployeeId) {
        self.changes.rescore.insert(id.clone());
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Returns `true` the first time a scope is presented, so audits run once per transaction.
    pub(crate) fn first_audit(&mut self, scope: AuditScope) -> bool {
        self.audited.insert(scope)
    }

    pub fn commit(self) -> Result<(), ScoringError> {
        let LedgerTransaction {
            repository,
            guard,
            changes,
            ..
        } = self;

        if !changes.is_empty() {
            repository.commit(changes)?;
        }
        drop(guard);
        Ok(())
    }
}
