//! Driver assessment ledger: scored events, cumulative counting pools, responsibility
//! coefficients and the batch jobs that grant monthly bonuses and open a new scoring year.
//!
//! Every mutation runs inside a [`ledger::LedgerTransaction`] holding the locks of the
//! (employee, year, merged category) groups it touches; the employee score is re-derived by the
//! repository in the same atomic commit.

pub mod aggregate;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod merger;
pub mod recalculation;
pub mod recorder;
pub mod repository;
pub mod reset;
pub mod responsibility;
pub mod rewards;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use aggregate::{EmployeeScoreAggregator, PoolTotal};
pub use catalog::{
    CatalogImportError, ScoringCycle, StandardDefinition, StandardsCatalog, StaticStandardsCatalog,
};
pub use domain::{
    Category, CumulativeCounter, EmployeeId, EmployeeRecord, EventId, EventLifecycle, GroupKey,
    MergedCategory, MonthlyRewardRecord, ScoredEvent, StandardCode, YearMonth,
};
pub use error::{ConsistencyViolation, NotFoundError, ScoringError, ValidationError};
pub use ledger::{Ledger, LedgerTransaction, LockPolicy};
pub use locks::{LockKey, LockMode, LockRequest, LockTable};
pub use merger::{CategoryMerger, RESPONSIBILITY_POOL};
pub use recalculation::{GroupRecalculation, RecalculationEngine, RecalculationOutcome};
pub use recorder::{EventDraft, EventOutcome, ScoreRecorder};
pub use repository::{ChangeSet, EmployeeSnapshot, LedgerRepository, MemoryLedger, RepositoryError};
pub use reset::{AnnualResetRun, AnnualResetService, EmployeeReset};
pub use responsibility::{
    ResponsibilityAssessor, ResponsibilityChecklist, ResponsibilityDetail, ResponsibilityLevel,
};
pub use rewards::{BatchFailure, BonusKind, MonthlyRewardEvaluator, MonthlyRewardRun, RewardEvaluation};
pub use router::assessment_router;
pub use service::{AssessmentService, AssessmentSettings, EmployeeRegistration, EmployeeYearLedger};
