mod memory;

use std::collections::{BTreeMap, BTreeSet};

pub use memory::MemoryLedger;

use super::domain::{
    CumulativeCounter, EmployeeId, EmployeeRecord, EventId, GroupKey, MonthlyRewardRecord,
    ScoredEvent, YearMonth,
};

/// Employee row together with every event it owns, read in one consistent view.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeSnapshot {
    pub record: EmployeeRecord,
    pub events: Vec<ScoredEvent>,
}

/// Writes staged by one transaction. Applied all-or-nothing by [`LedgerRepository::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub employees: BTreeMap<EmployeeId, EmployeeRecord>,
    pub events: BTreeMap<EventId, ScoredEvent>,
    pub counters: BTreeMap<GroupKey, CumulativeCounter>,
    pub rewards: BTreeMap<(EmployeeId, YearMonth), MonthlyRewardRecord>,
    /// Employees whose aggregate score is re-derived as part of the commit.
    pub rescore: BTreeSet<EmployeeId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
            && self.events.is_empty()
            && self.counters.is_empty()
            && self.rewards.is_empty()
            && self.rescore.is_empty()
    }
}

/// Storage abstraction for the scoring ledger. Reads return committed state only; writes go
/// through `commit`, which must apply a whole change set atomically and refresh the aggregate
/// score of every employee listed in `ChangeSet::rescore` in the same step.
pub trait LedgerRepository: Send + Sync {
    fn employee(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError>;
    fn employees(&self) -> Result<Vec<EmployeeRecord>, RepositoryError>;
    fn employee_snapshot(&self, id: &EmployeeId)
        -> Result<Option<EmployeeSnapshot>, RepositoryError>;
    fn event(&self, id: EventId) -> Result<Option<ScoredEvent>, RepositoryError>;
    /// Every event of the group, whatever its lifecycle.
    fn group_events(&self, key: &GroupKey) -> Result<Vec<ScoredEvent>, RepositoryError>;
    fn employee_events(&self, id: &EmployeeId) -> Result<Vec<ScoredEvent>, RepositoryError>;
    fn counter(&self, key: &GroupKey) -> Result<Option<CumulativeCounter>, RepositoryError>;
    fn employee_counters(&self, id: &EmployeeId)
        -> Result<Vec<CumulativeCounter>, RepositoryError>;
    fn monthly_reward(
        &self,
        id: &EmployeeId,
        month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, RepositoryError>;
    fn monthly_rewards(&self, id: &EmployeeId)
        -> Result<Vec<MonthlyRewardRecord>, RepositoryError>;
    /// Next surrogate id. Ids burnt by rolled-back transactions are not reused.
    fn allocate_event_id(&self) -> Result<EventId, RepositoryError>;
    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
