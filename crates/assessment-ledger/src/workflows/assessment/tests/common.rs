use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::workflows::assessment::domain::{
    CumulativeCounter, EmployeeId, EmployeeRecord, EventId, GroupKey, MonthlyRewardRecord,
    ScoredEvent, StandardCode, YearMonth,
};
use crate::workflows::assessment::repository::{
    ChangeSet, EmployeeSnapshot, LedgerRepository, MemoryLedger, RepositoryError,
};
use crate::workflows::assessment::{
    AssessmentService, AssessmentSettings, EmployeeRegistration, EmployeeScoreAggregator,
    EventDraft, LockPolicy, ResponsibilityChecklist, StandardsCatalog, StaticStandardsCatalog,
};

pub(super) type MemoryService = AssessmentService<MemoryLedger, StaticStandardsCatalog>;

pub(super) const SCORING_YEAR: i32 = 2026;

pub(super) fn settings() -> AssessmentSettings {
    AssessmentSettings {
        default_baseline: Decimal::ONE_HUNDRED,
        lock: LockPolicy {
            wait: Duration::from_millis(500),
            retries: 1,
        },
    }
}

pub(super) fn service() -> Arc<MemoryService> {
    service_with(Arc::new(MemoryLedger::new()))
}

pub(super) fn service_with<R>(
    repository: Arc<R>,
) -> Arc<AssessmentService<R, StaticStandardsCatalog>>
where
    R: LedgerRepository + 'static,
{
    Arc::new(AssessmentService::new(
        repository,
        Arc::new(StaticStandardsCatalog::standard()),
        settings(),
    ))
}

pub(super) fn register<R, C>(service: &AssessmentService<R, C>, id: &str) -> EmployeeId
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    service
        .register_employee(EmployeeRegistration {
            employee_id: EmployeeId(id.to_string()),
            name: format!("Driver {id}"),
            baseline: None,
            scoring_year: Some(SCORING_YEAR),
        })
        .expect("employee registers")
        .id
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn month(year: i32, month: u32) -> YearMonth {
    YearMonth::new(year, month).expect("valid month")
}

pub(super) fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal")
}

pub(super) fn draft(employee: &EmployeeId, code: &str, on: NaiveDate) -> EventDraft {
    EventDraft {
        employee_id: employee.clone(),
        standard_code: StandardCode::new(code),
        event_date: on,
        description: format!("{code} on {on}"),
        checklist: None,
    }
}

pub(super) fn assessed_draft(
    employee: &EmployeeId,
    code: &str,
    on: NaiveDate,
    faults: usize,
) -> EventDraft {
    EventDraft {
        checklist: Some(ResponsibilityChecklist::with_faults(faults)),
        ..draft(employee, code, on)
    }
}

pub(super) fn record<R, C>(
    service: &AssessmentService<R, C>,
    employee: &EmployeeId,
    code: &str,
    on: NaiveDate,
) -> EventId
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    service
        .create_event(draft(employee, code, on))
        .expect("event records")
        .event
        .id
}

pub(super) fn event<R, C>(service: &AssessmentService<R, C>, id: EventId) -> ScoredEvent
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    service
        .ledger()
        .repository()
        .event(id)
        .expect("repository reachable")
        .expect("event stored")
}

pub(super) fn score<R, C>(service: &AssessmentService<R, C>, employee: &EmployeeId) -> Decimal
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    service
        .ledger()
        .repository()
        .employee(employee)
        .expect("repository reachable")
        .expect("employee stored")
        .score
}

pub(super) fn counter<R, C>(service: &AssessmentService<R, C>, key: &GroupKey) -> CumulativeCounter
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    service
        .ledger()
        .repository()
        .counter(key)
        .expect("repository reachable")
        .unwrap_or_else(|| CumulativeCounter::empty(key.clone()))
}

/// Checks every stored invariant for one employee: score, counters and ranks.
pub(super) fn assert_consistent<R, C>(service: &AssessmentService<R, C>, employee: &EmployeeId)
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let repository = service.ledger().repository();
    let snapshot = repository
        .employee_snapshot(employee)
        .expect("repository reachable")
        .expect("employee stored");
    EmployeeScoreAggregator::audit(&snapshot).expect("score matches its events");

    for counter in repository
        .employee_counters(employee)
        .expect("repository reachable")
    {
        let mut active: Vec<&ScoredEvent> = snapshot
            .events
            .iter()
            .filter(|event| event.is_active() && event.group_key() == counter.key)
            .collect();
        if counter.archived {
            assert_eq!(counter.count, 0, "archived counter {}", counter.key);
        } else {
            assert_eq!(counter.count as usize, active.len(), "counter {}", counter.key);
        }

        active.sort_by_key(|event| event.chronological_key());
        for (index, event) in active.iter().enumerate() {
            let rank = if event.accumulates { index as u32 + 1 } else { 1 };
            assert_eq!(event.cumulative_count, rank, "rank of {}", event.id);
            assert_eq!(
                event.final_points,
                event.actual_points * event.cumulative_multiplier,
                "final points of {}",
                event.id
            );
        }
    }
}

/// Memory ledger whose commits can be made to fail.
#[derive(Default)]
pub(super) struct FlakyLedger {
    pub(super) inner: MemoryLedger,
    pub(super) fail_commits: AtomicBool,
}

impl FlakyLedger {
    pub(super) fn fail_next_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl LedgerRepository for FlakyLedger {
    fn employee(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError> {
        self.inner.employee(id)
    }

    fn employees(&self) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        self.inner.employees()
    }

    fn employee_snapshot(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeSnapshot>, RepositoryError> {
        self.inner.employee_snapshot(id)
    }

    fn event(&self, id: EventId) -> Result<Option<ScoredEvent>, RepositoryError> {
        self.inner.event(id)
    }

    fn group_events(&self, key: &GroupKey) -> Result<Vec<ScoredEvent>, RepositoryError> {
        self.inner.group_events(key)
    }

    fn employee_events(&self, id: &EmployeeId) -> Result<Vec<ScoredEvent>, RepositoryError> {
        self.inner.employee_events(id)
    }

    fn counter(&self, key: &GroupKey) -> Result<Option<CumulativeCounter>, RepositoryError> {
        self.inner.counter(key)
    }

    fn employee_counters(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<CumulativeCounter>, RepositoryError> {
        self.inner.employee_counters(id)
    }

    fn monthly_reward(
        &self,
        id: &EmployeeId,
        month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, RepositoryError> {
        self.inner.monthly_reward(id, month)
    }

    fn monthly_rewards(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<MonthlyRewardRecord>, RepositoryError> {
        self.inner.monthly_rewards(id)
    }

    fn allocate_event_id(&self) -> Result<EventId, RepositoryError> {
        self.inner.allocate_event_id()
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("commit rejected".to_string()));
        }
        self.inner.commit(changes)
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;
type EventRewrite = Box<dyn Fn(ScoredEvent) -> ScoredEvent + Send + Sync>;

/// Memory ledger that runs caller hooks on selected reads, to interleave other work with an
/// operation that is already holding its locks.
#[derive(Default)]
pub(super) struct HookedLedger {
    pub(super) inner: MemoryLedger,
    /// Runs before every `employee_events` read.
    pub(super) on_employee_events: Option<Hook>,
    /// Rewrites every event returned by `event`.
    pub(super) rewrite_event: Option<EventRewrite>,
}

impl LedgerRepository for HookedLedger {
    fn employee(&self, id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError> {
        self.inner.employee(id)
    }

    fn employees(&self) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        self.inner.employees()
    }

    fn employee_snapshot(
        &self,
        id: &EmployeeId,
    ) -> Result<Option<EmployeeSnapshot>, RepositoryError> {
        self.inner.employee_snapshot(id)
    }

    fn event(&self, id: EventId) -> Result<Option<ScoredEvent>, RepositoryError> {
        let event = self.inner.event(id)?;
        Ok(match &self.rewrite_event {
            Some(rewrite) => event.map(|event| rewrite(event)),
            None => event,
        })
    }

    fn group_events(&self, key: &GroupKey) -> Result<Vec<ScoredEvent>, RepositoryError> {
        self.inner.group_events(key)
    }

    fn employee_events(&self, id: &EmployeeId) -> Result<Vec<ScoredEvent>, RepositoryError> {
        if let Some(hook) = &self.on_employee_events {
            hook();
        }
        self.inner.employee_events(id)
    }

    fn counter(&self, key: &GroupKey) -> Result<Option<CumulativeCounter>, RepositoryError> {
        self.inner.counter(key)
    }

    fn employee_counters(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<CumulativeCounter>, RepositoryError> {
        self.inner.employee_counters(id)
    }

    fn monthly_reward(
        &self,
        id: &EmployeeId,
        month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, RepositoryError> {
        self.inner.monthly_reward(id, month)
    }

    fn monthly_rewards(
        &self,
        id: &EmployeeId,
    ) -> Result<Vec<MonthlyRewardRecord>, RepositoryError> {
        self.inner.monthly_rewards(id)
    }

    fn allocate_event_id(&self) -> Result<EventId, RepositoryError> {
        self.inner.allocate_event_id()
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        self.inner.commit(changes)
    }
}

/// Backend that is down for every call.
pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn down<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }
}

impl LedgerRepository for UnavailableRepository {
    fn employee(&self, _id: &EmployeeId) -> Result<Option<EmployeeRecord>, RepositoryError> {
        Self::down()
    }

    fn employees(&self) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        Self::down()
    }

    fn employee_snapshot(
        &self,
        _id: &EmployeeId,
    ) -> Result<Option<EmployeeSnapshot>, RepositoryError> {
        Self::down()
    }

    fn event(&self, _id: EventId) -> Result<Option<ScoredEvent>, RepositoryError> {
        Self::down()
    }

    fn group_events(&self, _key: &GroupKey) -> Result<Vec<ScoredEvent>, RepositoryError> {
        Self::down()
    }

    fn employee_events(&self, _id: &EmployeeId) -> Result<Vec<ScoredEvent>, RepositoryError> {
        Self::down()
    }

    fn counter(&self, _key: &GroupKey) -> Result<Option<CumulativeCounter>, RepositoryError> {
        Self::down()
    }

    fn employee_counters(
        &self,
        _id: &EmployeeId,
    ) -> Result<Vec<CumulativeCounter>, RepositoryError> {
        Self::down()
    }

    fn monthly_reward(
        &self,
        _id: &EmployeeId,
        _month: YearMonth,
    ) -> Result<Option<MonthlyRewardRecord>, RepositoryError> {
        Self::down()
    }

    fn monthly_rewards(
        &self,
        _id: &EmployeeId,
    ) -> Result<Vec<MonthlyRewardRecord>, RepositoryError> {
        Self::down()
    }

    fn allocate_event_id(&self) -> Result<EventId, RepositoryError> {
        Self::down()
    }

    fn commit(&self, _changes: ChangeSet) -> Result<(), RepositoryError> {
        Self::down()
    }
}

pub(super) async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
