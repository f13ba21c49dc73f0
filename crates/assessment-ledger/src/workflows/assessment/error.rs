use std::time::Duration;

use super::domain::{EmployeeId, EventId, GroupKey, MergedCategory, StandardCode};
use super::locks::LockKey;
use super::repository::RepositoryError;

/// Error raised by every scoring operation.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error("lock wait exhausted after {attempts} attempt(s) of {waited:?} on {keys:?}")]
    Concurrency {
        keys: Vec<LockKey>,
        waited: Duration,
        attempts: u8,
    },
    #[error(transparent)]
    Consistency(#[from] ConsistencyViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ScoringError {
    /// Transient failures the caller may retry as a whole.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScoringError::Concurrency { .. }
                | ScoringError::Repository(RepositoryError::Unavailable(_))
        )
    }
}

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown standard {0}")]
    UnknownStandard(StandardCode),
    #[error("standard {0} is no longer active")]
    InactiveStandard(StandardCode),
    #[error("responsibility checklist must have 9 answers, received {received}")]
    MalformedChecklist { received: usize },
    #[error("standard {0} does not take a responsibility assessment")]
    AssessmentNotApplicable(StandardCode),
    #[error("employee {0} is already registered")]
    DuplicateEmployee(EmployeeId),
    #[error("employee id must not be blank")]
    BlankEmployeeId,
    #[error("no standard counts into pool {0}")]
    UnknownPool(MergedCategory),
    #[error("invalid catalog row for {code}: {reason}")]
    InvalidCatalogRow { code: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("event {0} not found")]
    Event(EventId),
    #[error("employee {0} not found")]
    Employee(EmployeeId),
}

/// Last-known-good state disagrees with the invariants; nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyViolation {
    #[error("counter for {key} holds {stored} but the group has {expected} active event(s)")]
    CounterDrift {
        key: GroupKey,
        stored: u32,
        expected: u32,
    },
    #[error("employee {employee_id} score is {stored} but its events add up to {expected}")]
    ScoreDrift {
        employee_id: EmployeeId,
        stored: String,
        expected: String,
    },
    #[error("event {event_id} carries actual points {stored} but base × coefficient is {expected}")]
    ActualPointsDrift {
        event_id: EventId,
        stored: String,
        expected: String,
    },
    #[error("event {event_id} is filed under {found} but was read from group {key}")]
    MisfiledEvent {
        event_id: EventId,
        key: GroupKey,
        found: GroupKey,
    },
}
