use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChangeSet, EmployeeSnapshot, LedgerRepository, RepositoryError};
use crate::workflows::assessment::aggregate::EmployeeScoreAggregator;
use crate::workflows::assessment::domain::{
    CumulativeCounter, EmployeeId, EmployeeRecord, EventId, GroupKey, MonthlyRewardRecord,
    ScoredEvent, YearMonth,
};

#[derive(Debug, Default)]
struct LedgerState {
    employees: BTreeMap<EmployeeId, EmployeeRecord>,
    events: BTreeMap<EventId, ScoredEvent>,
    counters: BTreeMap<GroupKey, CumulativeCounter>,
    rewards: BTreeMap<(EmployeeId, YearMonth), MonthlyRewardRecord>,
    next_event_id: u64,
}

impl LedgerState {
    fn events_of<'a>(&'a self, id: &'a EmployeeId) -> impl Iterator<Item = &'a ScoredEvent> + 'a {
        self.events
            .values()
            .filter(move |event| &event.employee_id == id)
    }
}

/// In-process ledger. The state latch is held only for the duration of a single read or commit;
/// group-level exclusion is the job of the transaction layer.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, LedgerState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ledger state poisoned".to_string()))
    }
}

impl LedgerRepository for MemoryLedger {
    fn employee(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError> {
        Ok(self.state()?.employees.get(id).cloned())
    }

    fn employees(&self) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        Ok(self.state()?.employees.values().cloned().collect())
    }

    fn employee_snapshot(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeSnapshot>, RepositoryError> {
        let state = self.state()?;
        Ok(state.employees.get(id).map(|record| EmployeeSnapshot {
            record: record.clone(),
            events: state.events_of(id).cloned().collect(),
        }))
    }

    fn event(&self, id: EventId) -> Result<Option<ScoredEvent>, RepositoryError> {
        Ok(self.state()?.events.get(&id).cloned())
    }

    fn group_events(&self, key: &GroupKey) -> Result<Vec<ScoredEvent>, RepositoryError> {
        let state = self.state()?;
        Ok(state
            .events_of(&key.employee_id)
            .filter(|event| &event.group_key() == key)
            .cloned()
            .collect())
    }

    fn employee_events(&self, id: &EmployeeId) -> Result<Vec<ScoredEvent>, RepositoryError> {
        Ok(self.state()?.events_of(id).cloned().collect())
    }

    fn counter(&self, key: &GroupKey) -> Result<Option<CumulativeCounter>, RepositoryError> {
        Ok(self.state()?.counters.get(key).cloned())
    }

    fn employee_counters(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<CumulativeCounter>, RepositoryError> {
        Ok(self
            .state()?
            .counters
            .values()
            .filter(|counter| &counter.key.employee_id == id)
            .cloned()
            .collect())
    }

    fn monthly_reward(
        &self,
        id: &EmployeeId,
        month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, RepositoryError> {
        Ok(self.state()?.rewards.get(&(id.clone(), month)).cloned())
    }

    fn monthly_rewards(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<MonthlyRewardRecord>, RepositoryError> {
        Ok(self
            .state()?
            .rewards
            .values()
            .filter(|record| &record.employee_id == id)
            .cloned()
            .collect())
    }

    fn allocate_event_id(&self) -> Result<EventId, RepositoryError> {
        let mut state = self.state()?;
        state.next_event_id += 1;
        Ok(EventId(state.next_event_id))
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        let mut state = self.state()?;

        // Validate everything before the first write so a rejected commit leaves no trace.
        for id in &changes.rescore {
            if !state.employees.contains_key(id) && !changes.employees.contains_key(id) {
                return Err(RepositoryError::NotFound);
            }
        }
        for event in changes.events.values() {
            let known = state.employees.contains_key(&event.employee_id)
                || changes.employees.contains_key(&event.employee_id);
            if !known {
                return Err(RepositoryError::NotFound);
            }
        }

        let ChangeSet {
            employees,
            events,
            counters,
            rewards,
            rescore,
        } = changes;

        state.employees.extend(employees);
        state.events.extend(events);
        state.counters.extend(counters);
        state.rewards.extend(rewards);

        for id in rescore {
            let Some(record) = state.employees.get(&id) else {
                continue;
            };
            let score = EmployeeScoreAggregator::total(
                record.baseline,
                record.scoring_year,
                state.events_of(&id),
            );
            if let Some(record) = state.employees.get_mut(&id) {
                record.score = score;
            }
        }

        Ok(())
    }
}
