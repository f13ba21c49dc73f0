use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::aggregate::{EmployeeScoreAggregator, PoolTotal};
use super::catalog::{StandardDefinition, StandardsCatalog};
use super::domain::{
    CumulativeCounter, EmployeeId, EmployeeRecord, EventId, GroupKey, MonthlyRewardRecord,
    ScoredEvent, YearMonth,
};
use super::error::{NotFoundError, ScoringError, ValidationError};
use super::ledger::{Ledger, LockPolicy};
use super::locks::{LockKey, LockRequest};
use super::merger::CategoryMerger;
use super::recalculation::{RecalculationEngine, RecalculationOutcome};
use super::recorder::{EventDraft, EventOutcome, ScoreRecorder};
use super::repository::LedgerRepository;
use super::reset::{AnnualResetRun, AnnualResetService};
use super::responsibility::ResponsibilityChecklist;
use super::rewards::{MonthlyRewardEvaluator, MonthlyRewardRun, RewardEvaluation};

/// Tunables the service is built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssessmentSettings {
    pub default_baseline: Decimal,
    pub lock: LockPolicy,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            default_baseline: Decimal::ONE_HUNDRED,
            lock: LockPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRegistration {
    pub employee_id: EmployeeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub baseline: Option<Decimal>,
    /// Defaults to the current calendar year.
    #[serde(default)]
    pub scoring_year: Option<i32>,
}

/// Everything recorded for one employee in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeYearLedger {
    pub employee_id: EmployeeId,
    pub name: String,
    pub year: i32,
    pub scoring_year: i32,
    pub baseline: Decimal,
    pub score: Decimal,
    pub counters: Vec<CumulativeCounter>,
    /// Active and deleted events dated in `year`, in chronological order.
    pub events: Vec<ScoredEvent>,
    pub pool_totals: Vec<PoolTotal>,
}

/// Entry point collaborators use; wires the recorder, the recalculation engine and the batch
/// jobs over one shared ledger.
pub struct AssessmentService<R, C> {
    ledger: Arc<Ledger<R>>,
    catalog: Arc<C>,
    recorder: Arc<ScoreRecorder<R, C>>,
    engine: RecalculationEngine<R>,
    rewards: MonthlyRewardEvaluator<R, C>,
    resets: AnnualResetService<R>,
    settings: AssessmentSettings,
}

impl<R, C> AssessmentService<R, C>
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    pub fn new(repository: Arc<R>, catalog: Arc<C>, settings: AssessmentSettings) -> Self {
        let ledger = Arc::new(Ledger::new(repository, settings.lock));
        let recorder = Arc::new(ScoreRecorder::new(Arc::clone(&ledger), Arc::clone(&catalog)));

        Self {
            engine: RecalculationEngine::new(Arc::clone(&ledger)),
            rewards: MonthlyRewardEvaluator::new(Arc::clone(&ledger), Arc::clone(&recorder)),
            resets: AnnualResetService::new(Arc::clone(&ledger)),
            ledger,
            catalog,
            recorder,
            settings,
        }
    }

    pub fn ledger(&self) -> &Ledger<R> {
        &self.ledger
    }

    pub fn settings(&self) -> AssessmentSettings {
        self.settings
    }

    pub fn register_employee(
        &self,
        registration: EmployeeRegistration,
    ) -> Result<EmployeeRecord, ScoringError> {
        let id = EmployeeId(registration.employee_id.0.trim().to_string());
        if id.0.is_empty() {
            return Err(ValidationError::BlankEmployeeId.into());
        }

        let mut tx = self.ledger.begin(LockRequest::new().exclusive(LockKey::Employee {
            employee_id: id.clone(),
        }))?;
        if tx.find_employee(&id)?.is_some() {
            return Err(ValidationError::DuplicateEmployee(id).into());
        }

        let baseline = registration
            .baseline
            .unwrap_or(self.settings.default_baseline)
            .normalize();
        let record = EmployeeRecord {
            id: id.clone(),
            name: registration.name,
            baseline,
            score: baseline,
            scoring_year: registration
                .scoring_year
                .unwrap_or_else(|| Local::now().year()),
        };
        tx.put_employee(record.clone());
        tx.rescore(&id);
        tx.commit()?;

        info!(employee = %id, baseline = %baseline, scoring_year = record.scoring_year, "employee registered");
        Ok(record)
    }

    pub fn create_event(&self, draft: EventDraft) -> Result<EventOutcome, ScoringError> {
        self.recorder.create_event(draft)
    }

    pub fn soft_delete(&self, id: EventId) -> Result<EventOutcome, ScoringError> {
        self.recorder.soft_delete(id)
    }

    pub fn restore(&self, id: EventId) -> Result<EventOutcome, ScoringError> {
        self.recorder.restore(id)
    }

    pub fn change_event_date(
        &self,
        id: EventId,
        new_date: NaiveDate,
    ) -> Result<EventOutcome, ScoringError> {
        self.recorder.change_event_date(id, new_date)
    }

    pub fn reassess(
        &self,
        id: EventId,
        checklist: ResponsibilityChecklist,
    ) -> Result<EventOutcome, ScoringError> {
        self.recorder.reassess(id, checklist)
    }

    pub fn recalculate(&self, key: &GroupKey) -> Result<RecalculationOutcome, ScoringError> {
        self.require_employee(&key.employee_id)?;
        self.require_pool(key)?;
        self.engine.recalculate(key)
    }

    pub fn ledger_for_year(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> Result<EmployeeYearLedger, ScoringError> {
        let repository = self.ledger.repository();
        let snapshot = repository
            .employee_snapshot(employee_id)?
            .ok_or_else(|| NotFoundError::Employee(employee_id.clone()))?;

        let mut events: Vec<ScoredEvent> = snapshot
            .events
            .into_iter()
            .filter(|event| event.event_date.year() == year)
            .collect();
        events.sort_by_key(ScoredEvent::chronological_key);

        let mut counters: Vec<CumulativeCounter> = repository
            .employee_counters(employee_id)?
            .into_iter()
            .filter(|counter| counter.key.year == year)
            .collect();
        counters.sort_by(|left, right| left.key.cmp(&right.key));

        let record = snapshot.record;
        Ok(EmployeeYearLedger {
            pool_totals: EmployeeScoreAggregator::pool_totals(year, &events),
            employee_id: record.id,
            name: record.name,
            year,
            scoring_year: record.scoring_year,
            baseline: record.baseline,
            score: record.score,
            counters,
            events,
        })
    }

    pub fn evaluate_monthly_reward(
        &self,
        employee_id: &EmployeeId,
        month: YearMonth,
    ) -> Result<RewardEvaluation, ScoringError> {
        self.rewards.evaluate(employee_id, month)
    }

    pub fn evaluate_monthly_rewards(&self, month: YearMonth) -> Result<MonthlyRewardRun, ScoringError> {
        self.rewards.evaluate_month(month)
    }

    pub fn reward_history(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<MonthlyRewardRecord>, ScoringError> {
        self.require_employee(employee_id)?;
        self.rewards.history(employee_id)
    }

    pub fn annual_reset(&self, new_year: i32) -> Result<AnnualResetRun, ScoringError> {
        self.resets.reset_year(new_year)
    }

    pub fn standards(&self) -> Vec<StandardDefinition> {
        self.catalog.standards()
    }

    /// A pool is known when a catalog standard counts into it or a counter already exists for it.
    fn require_pool(&self, key: &GroupKey) -> Result<(), ScoringError> {
        let mapped = self.catalog.standards().iter().any(|standard| {
            CategoryMerger::merge(&standard.code, standard.category) == key.merged_category
        });
        if mapped || self.ledger.repository().counter(key)?.is_some() {
            return Ok(());
        }
        Err(ValidationError::UnknownPool(key.merged_category.clone()).into())
    }

    fn require_employee(&self, employee_id: &EmployeeId) -> Result<EmployeeRecord, ScoringError> {
        self.ledger
            .repository()
            .employee(employee_id)?
            .ok_or_else(|| NotFoundError::Employee(employee_id.clone()).into())
    }
}
