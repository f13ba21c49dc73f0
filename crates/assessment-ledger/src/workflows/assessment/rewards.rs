use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::StandardsCatalog;
use super::domain::{
    Category, EmployeeId, EventId, EventLifecycle, MonthlyRewardRecord, StandardCode, YearMonth,
};
use super::error::ScoringError;
use super::ledger::{Ledger, LedgerTransaction};
use super::locks::{LockKey, LockRequest};
use super::recorder::{EventDraft, PreparedEvent, ScoreRecorder};
use super::repository::LedgerRepository;

/// Standard awarded for a month without responsibility or safety deductions.
pub const DRIVING_ZERO_STANDARD: &str = "B01";
/// Standard awarded for a month without any deduction.
pub const ALL_ZERO_STANDARD: &str = "B02";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    DrivingZero,
    AllZero,
}

impl BonusKind {
    pub fn standard_code(self) -> StandardCode {
        match self {
            Self::DrivingZero => StandardCode::new(DRIVING_ZERO_STANDARD),
            Self::AllZero => StandardCode::new(ALL_ZERO_STANDARD),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DrivingZero => "driving zero-violation",
            Self::AllZero => "all zero-violation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardEvaluation {
    pub record: MonthlyRewardRecord,
    /// `false` when the stored record already reflected the month and nothing was written.
    pub changed: bool,
}

/// Per-employee failure inside a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub employee_id: EmployeeId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRewardRun {
    pub month: YearMonth,
    pub evaluated: usize,
    pub changed: usize,
    pub records: Vec<MonthlyRewardRecord>,
    pub failures: Vec<BatchFailure>,
}

/// Grants the zero-violation bonuses for an employee-month.
pub struct MonthlyRewardEvaluator<R, C> {
    ledger: Arc<Ledger<R>>,
    recorder: Arc<ScoreRecorder<R, C>>,
}

impl<R, C> MonthlyRewardEvaluator<R, C>
where
    R: LedgerRepository,
    C: StandardsCatalog,
{
    pub fn new(ledger: Arc<Ledger<R>>, recorder: Arc<ScoreRecorder<R, C>>) -> Self {
        Self { ledger, recorder }
    }

    pub fn evaluate(
        &self,
        employee_id: &EmployeeId,
        month: YearMonth,
    ) -> Result<RewardEvaluation, ScoringError> {
        let driving = self.bonus_draft(BonusKind::DrivingZero, employee_id, month)?;
        let all = self.bonus_draft(BonusKind::AllZero, employee_id, month)?;

        // The decision reads every deduction group of the month and a stored bonus may have been
        // re-dated into another year, so the whole employee is held.
        let request = LockRequest::new()
            .exclusive(LockKey::Employee {
                employee_id: employee_id.clone(),
            })
            .exclusive(LockKey::Reward {
                employee_id: employee_id.clone(),
                month,
            });
        let mut tx = self.ledger.begin(request)?;
        tx.employee(employee_id)?;

        let deductions: Vec<_> = tx
            .employee_events(employee_id)?
            .into_iter()
            .filter(|event| event.is_active() && event.is_deduction() && month.contains(event.event_date))
            .collect();
        let categories: BTreeSet<Category> =
            deductions.iter().map(|event| event.category).collect();
        let driving_zero = !categories.iter().any(|category| category.is_driving());
        let all_zero = categories.is_empty();

        let existing = tx.monthly_reward(employee_id, month)?;
        let mut record = existing.clone().unwrap_or_else(|| MonthlyRewardRecord {
            employee_id: employee_id.clone(),
            month,
            driving_zero: false,
            all_zero: false,
            driving_zero_event: None,
            all_zero_event: None,
            deductions: 0,
            total_awarded: Decimal::ZERO,
        });

        record.driving_zero_event =
            Self::settle_bonus(&mut tx, record.driving_zero_event, driving_zero, driving)?;
        record.all_zero_event = Self::settle_bonus(&mut tx, record.all_zero_event, all_zero, all)?;
        record.driving_zero = driving_zero;
        record.all_zero = all_zero;
        record.deductions = deductions.len() as u32;
        record.total_awarded = Self::awarded(&tx, &record)?;

        if existing.as_ref() == Some(&record) && !tx.has_changes() {
            debug!(employee = %employee_id, %month, "monthly reward unchanged");
            return Ok(RewardEvaluation {
                record,
                changed: false,
            });
        }

        tx.put_reward(record.clone());
        tx.commit()?;

        info!(
            employee = %employee_id,
            %month,
            driving_zero,
            all_zero,
            total_awarded = %record.total_awarded,
            "monthly reward evaluated"
        );
        Ok(RewardEvaluation {
            record,
            changed: true,
        })
    }

    /// Evaluates every registered employee; one employee's failure does not stop the run.
    pub fn evaluate_month(&self, month: YearMonth) -> Result<MonthlyRewardRun, ScoringError> {
        let employees = self.ledger.repository().employees()?;
        let mut run = MonthlyRewardRun {
            month,
            evaluated: 0,
            changed: 0,
            records: Vec::with_capacity(employees.len()),
            failures: Vec::new(),
        };

        for employee in employees {
            match self.evaluate(&employee.id, month) {
                Ok(evaluation) => {
                    run.evaluated += 1;
                    if evaluation.changed {
                        run.changed += 1;
                    }
                    run.records.push(evaluation.record);
                }
                Err(error) => {
                    warn!(employee = %employee.id, %month, %error, "monthly reward evaluation failed");
                    run.failures.push(BatchFailure {
                        employee_id: employee.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            %month,
            evaluated = run.evaluated,
            changed = run.changed,
            failed = run.failures.len(),
            "monthly reward run finished"
        );
        Ok(run)
    }

    pub fn history(&self, employee_id: &EmployeeId) -> Result<Vec<MonthlyRewardRecord>, ScoringError> {
        let mut records = self.ledger.repository().monthly_rewards(employee_id)?;
        records.sort_by_key(|record| record.month);
        Ok(records)
    }

    fn bonus_draft(
        &self,
        kind: BonusKind,
        employee_id: &EmployeeId,
        month: YearMonth,
    ) -> Result<PreparedEvent, ScoringError> {
        self.recorder.prepare(EventDraft {
            employee_id: employee_id.clone(),
            standard_code: kind.standard_code(),
            event_date: month.last_day(),
            description: format!("{} bonus for {month}", kind.label()),
            checklist: None,
        })
    }

    /// Brings the bonus event in line with whether the bonus is earned: created or restored when
    /// granted, soft-deleted when a back-filled deduction revokes it.
    fn settle_bonus(
        tx: &mut LedgerTransaction<'_, R>,
        current: Option<EventId>,
        granted: bool,
        draft: PreparedEvent,
    ) -> Result<Option<EventId>, ScoringError> {
        match (current, granted) {
            (Some(id), true) => {
                ScoreRecorder::<R, C>::set_lifecycle_in(tx, id, EventLifecycle::Active)?;
                Ok(Some(id))
            }
            (Some(id), false) => {
                ScoreRecorder::<R, C>::set_lifecycle_in(tx, id, EventLifecycle::Deleted)?;
                Ok(Some(id))
            }
            (None, true) => {
                let id = ScoreRecorder::<R, C>::insert_in(tx, draft)?;
                Ok(Some(id))
            }
            (None, false) => Ok(None),
        }
    }

    fn awarded(
        tx: &LedgerTransaction<'_, R>,
        record: &MonthlyRewardRecord,
    ) -> Result<Decimal, ScoringError> {
        let mut total = Decimal::ZERO;
        for id in [record.driving_zero_event, record.all_zero_event]
            .into_iter()
            .flatten()
        {
            let event = tx.event(id)?;
            if event.is_active() {
                total += event.final_points;
            }
        }
        Ok(total.normalize())
    }
}
