use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::aggregate::EmployeeScoreAggregator;
use super::domain::{CumulativeCounter, EmployeeId, GroupKey};
use super::error::ScoringError;
use super::ledger::{AuditScope, Ledger};
use super::locks::{LockKey, LockRequest};
use super::recalculation::RecalculationEngine;
use super::repository::LedgerRepository;
use super::rewards::BatchFailure;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeReset {
    pub employee_id: EmployeeId,
    pub previous_year: i32,
    pub scoring_year: i32,
    pub archived_counters: usize,
    pub score: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualResetRun {
    pub year: i32,
    pub reset: Vec<EmployeeReset>,
    /// Employees already scoring in `year` or later.
    pub skipped: Vec<EmployeeId>,
    pub failures: Vec<BatchFailure>,
}

/// Opens a new scoring year: the score falls back to the baseline plus whatever the new year
/// already holds, and every counter of an earlier year is closed at zero. Events are never
/// touched.
pub struct AnnualResetService<R> {
    ledger: Arc<Ledger<R>>,
}

impl<R> AnnualResetService<R>
where
    R: LedgerRepository,
{
    pub fn new(ledger: Arc<Ledger<R>>) -> Self {
        Self { ledger }
    }

    pub fn reset_year(&self, new_year: i32) -> Result<AnnualResetRun, ScoringError> {
        let employees = self.ledger.repository().employees()?;
        let mut run = AnnualResetRun {
            year: new_year,
            reset: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };

        for employee in employees {
            match self.reset_employee(&employee.id, new_year) {
                Ok(Some(reset)) => run.reset.push(reset),
                Ok(None) => run.skipped.push(employee.id),
                Err(error) => {
                    warn!(employee = %employee.id, year = new_year, %error, "annual reset failed");
                    run.failures.push(BatchFailure {
                        employee_id: employee.id,
                        error: error.to_string(),
                    });
                }
            }
        }

        info!(
            year = new_year,
            reset = run.reset.len(),
            skipped = run.skipped.len(),
            failed = run.failures.len(),
            "annual reset finished"
        );
        Ok(run)
    }

    /// Resets one employee under its exclusive lock. Returns `None` when the employee already
    /// scores in `new_year` or later.
    pub fn reset_employee(
        &self,
        employee_id: &EmployeeId,
        new_year: i32,
    ) -> Result<Option<EmployeeReset>, ScoringError> {
        let request = LockRequest::new().exclusive(LockKey::Employee {
            employee_id: employee_id.clone(),
        });
        let mut tx = self.ledger.begin(request)?;
        let mut record = tx.employee(employee_id)?;
        if record.scoring_year >= new_year {
            debug!(employee = %employee_id, scoring_year = record.scoring_year, "already reset");
            return Ok(None);
        }

        if tx.first_audit(AuditScope::Employee(employee_id.clone())) {
            EmployeeScoreAggregator::audit(&tx.committed_employee(employee_id)?)?;
        }

        let mut groups: BTreeSet<GroupKey> = tx
            .employee_counters(employee_id)?
            .into_iter()
            .map(|counter| counter.key)
            .collect();
        groups.extend(
            tx.employee_events(employee_id)?
                .iter()
                .map(|event| event.group_key()),
        );

        let mut archived_counters = 0;
        for key in groups.into_iter().filter(|key| key.year < new_year) {
            RecalculationEngine::audit_in(&mut tx, &key)?;
            let closed = CumulativeCounter {
                key: key.clone(),
                count: 0,
                archived: true,
            };
            if tx.counter(&key)? != closed {
                tx.put_counter(closed);
                archived_counters += 1;
            }
        }

        let previous_year = record.scoring_year;
        record.scoring_year = new_year;
        tx.put_employee(record);
        tx.rescore(employee_id);
        tx.commit()?;

        let score = self
            .ledger
            .repository()
            .employee(employee_id)?
            .map(|record| record.score)
            .unwrap_or_default();

        info!(
            employee = %employee_id,
            from = previous_year,
            to = new_year,
            archived_counters,
            score = %score,
            "scoring year opened"
        );
        Ok(Some(EmployeeReset {
            employee_id: employee_id.clone(),
            previous_year,
            scoring_year: new_year,
            archived_counters,
            score,
        }))
    }
}
