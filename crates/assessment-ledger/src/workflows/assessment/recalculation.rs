use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error};

use super::aggregate::EmployeeScoreAggregator;
use super::domain::{CumulativeCounter, GroupKey, ScoredEvent};
use super::error::{ConsistencyViolation, ScoringError};
use super::ledger::{AuditScope, Ledger, LedgerTransaction};
use super::locks::LockRequest;
use super::repository::LedgerRepository;

/// Result of re-deriving one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecalculation {
    pub key: GroupKey,
    pub count: u32,
    pub archived: bool,
    /// Active events in rank order after the pass.
    pub events: Vec<ScoredEvent>,
    /// Rows whose rank, multiplier or final points moved.
    pub changed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecalculationOutcome {
    pub group: GroupRecalculation,
    pub employee_score: Decimal,
}

/// Re-derives cumulative ranks, multipliers and final points for one
/// (employee, year, merged category) group.
pub struct RecalculationEngine<R> {
    ledger: Arc<Ledger<R>>,
}

impl<R> RecalculationEngine<R>
where
    R: LedgerRepository,
{
    pub fn new(ledger: Arc<Ledger<R>>) -> Self {
        Self { ledger }
    }

    /// Standalone pass in its own transaction. Idempotent.
    pub fn recalculate(&self, key: &GroupKey) -> Result<RecalculationOutcome, ScoringError> {
        let mut tx = self.ledger.begin(LockRequest::groups([key]))?;
        let group = Self::recalculate_in(&mut tx, key)?;
        tx.commit()?;

        let employee_score = self
            .ledger
            .repository()
            .employee(&key.employee_id)?
            .map(|record| record.score)
            .unwrap_or_default();

        Ok(RecalculationOutcome {
            group,
            employee_score,
        })
    }

    /// Pass inside a caller's transaction, which must hold the group lock. Staged writes of the
    /// caller (a lifecycle flip, a new date, a new event) are part of the input.
    pub(crate) fn recalculate_in(
        tx: &mut LedgerTransaction<'_, R>,
        key: &GroupKey,
    ) -> Result<GroupRecalculation, ScoringError> {
        let employee = tx.employee(&key.employee_id)?;
        Self::audit_in(tx, key)?;

        let mut events = tx.active_group_events(key)?;
        let mut changed = 0;
        for (index, event) in events.iter_mut().enumerate() {
            let before = event.clone();
            event.apply_rank(index as u32 + 1);
            if *event != before {
                changed += 1;
                tx.put_event(event.clone());
            }
        }

        let archived = key.year < employee.scoring_year;
        let count = if archived { 0 } else { events.len() as u32 };
        let counter = CumulativeCounter {
            key: key.clone(),
            count,
            archived,
        };
        if tx.counter(key)? != counter {
            tx.put_counter(counter);
        }
        tx.rescore(&key.employee_id);

        debug!(group = %key, count, changed, "group recalculated");

        Ok(GroupRecalculation {
            key: key.clone(),
            count,
            archived,
            events,
            changed,
        })
    }

    /// Verifies the committed state of the group and its employee before anything is built on
    /// top of it. A violation aborts the transaction and leaves the stored rows untouched.
    pub(crate) fn audit_in(
        tx: &mut LedgerTransaction<'_, R>,
        key: &GroupKey,
    ) -> Result<(), ScoringError> {
        if tx.first_audit(AuditScope::Employee(key.employee_id.clone())) {
            let snapshot = tx.committed_employee(&key.employee_id)?;
            EmployeeScoreAggregator::audit(&snapshot)?;
        }

        if !tx.first_audit(AuditScope::Group(key.clone())) {
            return Ok(());
        }

        let (counter, events) = tx.committed_group(key)?;
        let active: Vec<&ScoredEvent> = events.iter().filter(|event| event.is_active()).collect();

        for event in &active {
            let found = event.group_key();
            if &found != key {
                return Err(Self::violation(ConsistencyViolation::MisfiledEvent {
                    event_id: event.id,
                    key: key.clone(),
                    found,
                }));
            }

            let expected = (event.base_points * event.responsibility_coefficient).normalize();
            if expected != event.actual_points {
                return Err(Self::violation(ConsistencyViolation::ActualPointsDrift {
                    event_id: event.id,
                    stored: event.actual_points.to_string(),
                    expected: expected.to_string(),
                }));
            }
        }

        let (stored, archived) = counter
            .map(|counter| (counter.count, counter.archived))
            .unwrap_or((0, false));
        let expected = if archived { 0 } else { active.len() as u32 };
        if stored != expected {
            return Err(Self::violation(ConsistencyViolation::CounterDrift {
                key: key.clone(),
                stored,
                expected,
            }));
        }

        Ok(())
    }

    fn violation(violation: ConsistencyViolation) -> ScoringError {
        error!(%violation, "consistency check failed, transaction aborted");
        ScoringError::Consistency(violation)
    }
}
