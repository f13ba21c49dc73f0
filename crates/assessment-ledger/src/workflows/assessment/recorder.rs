use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::catalog::{StandardDefinition, StandardsCatalog};
use super::domain::{
    CumulativeCounter, EmployeeId, EventId, EventLifecycle, GroupKey, ScoredEvent, StandardCode,
};
use super::error::{NotFoundError, ScoringError, ValidationError};
use super::ledger::{Ledger, LedgerTransaction};
use super::locks::LockRequest;
use super::merger::CategoryMerger;
use super::recalculation::RecalculationEngine;
use super::repository::LedgerRepository;
use super::responsibility::{ResponsibilityAssessor, ResponsibilityChecklist, ResponsibilityDetail};

/// Caller input for a new scored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub employee_id: EmployeeId,
    pub standard_code: StandardCode,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<ResponsibilityChecklist>,
}

/// Event as recomputed by the operation, with the employee's score after commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOutcome {
    pub event: ScoredEvent,
    pub employee_score: Decimal,
}

/// Draft resolved against the catalog, ready to be inserted under its group lock.
#[derive(Debug, Clone)]
pub(crate) struct PreparedEvent {
    pub(crate) draft: EventDraft,
    pub(crate) definition: StandardDefinition,
    pub(crate) responsibility: Option<ResponsibilityDetail>,
    pub(crate) key: GroupKey,
}

/// Creates, re-dates, re-assesses, soft-deletes and restores scored events.
pub struct ScoreRecorder<R, C> {
    ledger: Arc<Ledger<R>>,
    catalog: Arc<C>,
}

impl<R, C> ScoreRecorder<R, C>
where
    R: LedgerRepository,
    C: StandardsCatalog,
{
    pub fn new(ledger: Arc<Ledger<R>>, catalog: Arc<C>) -> Self {
        Self { ledger, catalog }
    }

    pub fn create_event(&self, draft: EventDraft) -> Result<EventOutcome, ScoringError> {
        let prepared = self.prepare(draft)?;
        let mut tx = self.ledger.begin(LockRequest::groups([&prepared.key]))?;
        let id = Self::insert_in(&mut tx, prepared)?;
        tx.commit()?;
        self.outcome(id)
    }

    pub fn soft_delete(&self, id: EventId) -> Result<EventOutcome, ScoringError> {
        self.transition(id, EventLifecycle::Deleted)
    }

    pub fn restore(&self, id: EventId) -> Result<EventOutcome, ScoringError> {
        self.transition(id, EventLifecycle::Active)
    }

    /// Moves an event to another date. When the year changes both the origin and destination
    /// groups are recalculated, inside one transaction holding both group locks.
    pub fn change_event_date(
        &self,
        id: EventId,
        new_date: NaiveDate,
    ) -> Result<EventOutcome, ScoringError> {
        let policy = self.ledger.policy();
        let started = Instant::now();
        let mut attempts: u8 = 0;

        loop {
            attempts += 1;
            let current = self.committed_event(id)?;
            if current.event_date == new_date {
                return self.outcome(id);
            }

            let origin = current.group_key();
            let destination = GroupKey::new(
                current.employee_id.clone(),
                new_date.year(),
                current.merged_category.clone(),
            );
            let request = LockRequest::groups([&origin, &destination]);
            let mut tx = self.ledger.begin(request.clone())?;

            let mut event = tx.event(id)?;
            if event.group_key() != origin {
                // Re-dated by someone else between the read and the lock; the lock set is stale.
                drop(tx);
                if attempts > policy.retries {
                    return Err(ScoringError::Concurrency {
                        keys: request.keys(),
                        waited: started.elapsed(),
                        attempts,
                    });
                }
                continue;
            }

            event.event_date = new_date;
            tx.put_event(event);
            RecalculationEngine::recalculate_in(&mut tx, &origin)?;
            if destination != origin {
                RecalculationEngine::recalculate_in(&mut tx, &destination)?;
            }
            tx.commit()?;

            debug!(event = %id, from = %current.event_date, to = %new_date, "event re-dated");
            return self.outcome(id);
        }
    }

    /// Replaces the responsibility assessment of an event and recalculates its group.
    pub fn reassess(
        &self,
        id: EventId,
        checklist: ResponsibilityChecklist,
    ) -> Result<EventOutcome, ScoringError> {
        let (mut tx, mut event) = self.begin_for_event(id)?;
        let applicable = self
            .catalog
            .lookup(&event.standard_code)
            .map(|definition| definition.requires_responsibility)
            .unwrap_or(event.responsibility.is_some());
        if !applicable {
            return Err(ValidationError::AssessmentNotApplicable(event.standard_code).into());
        }

        let key = event.group_key();
        let detail = ResponsibilityAssessor::assess(checklist);
        event.responsibility_coefficient = detail.coefficient;
        event.actual_points = (event.base_points * detail.coefficient).normalize();
        event.responsibility = Some(detail);
        tx.put_event(event);
        RecalculationEngine::recalculate_in(&mut tx, &key)?;
        tx.commit()?;

        self.outcome(id)
    }

    pub(crate) fn prepare(&self, draft: EventDraft) -> Result<PreparedEvent, ScoringError> {
        let definition = self
            .catalog
            .require(&StandardCode::new(draft.standard_code.as_str()))?;
        let responsibility = match (definition.requires_responsibility, draft.checklist) {
            (true, Some(checklist)) => Some(ResponsibilityAssessor::assess(checklist)),
            (false, Some(_)) => {
                debug!(standard = %definition.code, "checklist ignored for standard without assessment");
                None
            }
            (_, None) => None,
        };
        let merged = CategoryMerger::merge(&definition.code, definition.category);
        let key = GroupKey::new(draft.employee_id.clone(), draft.event_date.year(), merged);

        Ok(PreparedEvent {
            draft,
            definition,
            responsibility,
            key,
        })
    }

    /// Inserts a prepared event inside a transaction that holds its group lock. Appends take the
    /// counter fast path; a back-dated event re-ranks the whole group instead.
    pub(crate) fn insert_in(
        tx: &mut LedgerTransaction<'_, R>,
        prepared: PreparedEvent,
    ) -> Result<EventId, ScoringError> {
        let PreparedEvent {
            draft,
            definition,
            responsibility,
            key,
        } = prepared;

        let employee = tx.employee(&draft.employee_id)?;
        RecalculationEngine::audit_in(tx, &key)?;

        let id = tx.allocate_event_id()?;
        let coefficient = responsibility
            .as_ref()
            .map(|detail| detail.coefficient)
            .unwrap_or(Decimal::ONE);
        let mut event = ScoredEvent {
            id,
            employee_id: draft.employee_id,
            standard_code: definition.code,
            category: definition.category,
            merged_category: key.merged_category.clone(),
            accumulates: definition.accumulates,
            event_date: draft.event_date,
            description: draft.description,
            base_points: definition.base_points,
            responsibility,
            responsibility_coefficient: coefficient,
            actual_points: (definition.base_points * coefficient).normalize(),
            cumulative_count: 0,
            cumulative_multiplier: Decimal::ONE,
            final_points: Decimal::ZERO,
            lifecycle: EventLifecycle::Active,
        };

        let existing = tx.active_group_events(&key)?;
        let appends = existing
            .iter()
            .all(|other| other.chronological_key() < event.chronological_key());

        if appends {
            let counter = tx.counter(&key)?;
            let archived = key.year < employee.scoring_year;
            let current = if counter.archived || archived {
                existing.len() as u32
            } else {
                counter.count
            };
            event.apply_rank(current + 1);
            tx.put_event(event);
            tx.put_counter(CumulativeCounter {
                key: key.clone(),
                count: if archived { 0 } else { current + 1 },
                archived,
            });
            tx.rescore(&key.employee_id);
        } else {
            tx.put_event(event);
            RecalculationEngine::recalculate_in(tx, &key)?;
        }

        debug!(event = %id, group = %key, appended = appends, "event recorded");
        Ok(id)
    }

    /// Flips the lifecycle inside a transaction holding the event's group lock.
    pub(crate) fn set_lifecycle_in(
        tx: &mut LedgerTransaction<'_, R>,
        id: EventId,
        lifecycle: EventLifecycle,
    ) -> Result<bool, ScoringError> {
        let mut event = tx.event(id)?;
        if event.lifecycle == lifecycle {
            return Ok(false);
        }

        let key = event.group_key();
        event.lifecycle = lifecycle;
        tx.put_event(event);
        RecalculationEngine::recalculate_in(tx, &key)?;
        debug!(event = %id, lifecycle = lifecycle.label(), "event lifecycle changed");
        Ok(true)
    }

    fn transition(&self, id: EventId, lifecycle: EventLifecycle) -> Result<EventOutcome, ScoringError> {
        let (mut tx, event) = self.begin_for_event(id)?;
        if event.lifecycle != lifecycle {
            Self::set_lifecycle_in(&mut tx, id, lifecycle)?;
            tx.commit()?;
        } else {
            drop(tx);
        }
        self.outcome(id)
    }

    /// Opens a transaction on the group the event currently lives in, re-checking after the lock
    /// is granted that a concurrent re-date did not move it elsewhere.
    fn begin_for_event(
        &self,
        id: EventId,
    ) -> Result<(LedgerTransaction<'_, R>, ScoredEvent), ScoringError> {
        let policy = self.ledger.policy();
        let started = Instant::now();
        let mut attempts: u8 = 0;

        loop {
            attempts += 1;
            let key = self.committed_event(id)?.group_key();
            let request = LockRequest::groups([&key]);
            let tx = self.ledger.begin(request.clone())?;
            let event = tx.event(id)?;
            if event.group_key() == key {
                return Ok((tx, event));
            }

            drop(tx);
            if attempts > policy.retries {
                return Err(ScoringError::Concurrency {
                    keys: request.keys(),
                    waited: started.elapsed(),
                    attempts,
                });
            }
        }
    }

    fn committed_event(&self, id: EventId) -> Result<ScoredEvent, ScoringError> {
        self.ledger
            .repository()
            .event(id)?
            .ok_or_else(|| NotFoundError::Event(id).into())
    }

    fn outcome(&self, id: EventId) -> Result<EventOutcome, ScoringError> {
        let event = self.committed_event(id)?;
        let employee_score = self
            .ledger
            .repository()
            .employee(&event.employee_id)?
            .ok_or_else(|| NotFoundError::Employee(event.employee_id.clone()))?
            .score;
        Ok(EventOutcome {
            event,
            employee_score,
        })
    }
}
