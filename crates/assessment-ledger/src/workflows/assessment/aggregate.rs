use std::collections::BTreeMap;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;

use super::domain::{MergedCategory, ScoredEvent};
use super::error::ConsistencyViolation;
use super::repository::EmployeeSnapshot;

/// Net points contributed by one counting pool in a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolTotal {
    pub merged_category: MergedCategory,
    pub active_events: u32,
    pub points: Decimal,
}

/// Derives the employee's running score. The score is never patched on its own: the repository
/// re-derives it with [`EmployeeScoreAggregator::total`] inside the commit that changed the events.
pub struct EmployeeScoreAggregator;

impl EmployeeScoreAggregator {
    /// `baseline + Σ final_points` over Active events dated in `scoring_year`.
    ///
    /// The year scoping is deliberate: events back-filled into a closed year stay in that year's
    /// ledger and counters but no longer move the running score, which restarts from the
    /// baseline at every annual reset.
    pub fn total<'a>(
        baseline: Decimal,
        scoring_year: i32,
        events: impl IntoIterator<Item = &'a ScoredEvent>,
    ) -> Decimal {
        let delta: Decimal = events
            .into_iter()
            .filter(|event| event.is_active() && event.event_date.year() == scoring_year)
            .map(|event| event.final_points)
            .sum();
        (baseline + delta).normalize()
    }

    /// Checks the committed score against its events before a transaction builds on it.
    pub fn audit(snapshot: &EmployeeSnapshot) -> Result<(), ConsistencyViolation> {
        let record = &snapshot.record;
        let expected = Self::total(record.baseline, record.scoring_year, &snapshot.events);
        if expected == record.score {
            return Ok(());
        }

        error!(
            employee = %record.id,
            stored = %record.score,
            expected = %expected,
            baseline = %record.baseline,
            scoring_year = record.scoring_year,
            events = snapshot.events.len(),
            "employee score disagrees with its event log"
        );
        Err(ConsistencyViolation::ScoreDrift {
            employee_id: record.id.clone(),
            stored: record.score.to_string(),
            expected: expected.to_string(),
        })
    }

    /// Active-event totals per counting pool for one year.
    pub fn pool_totals<'a>(
        year: i32,
        events: impl IntoIterator<Item = &'a ScoredEvent>,
    ) -> Vec<PoolTotal> {
        let mut totals: BTreeMap<MergedCategory, PoolTotal> = BTreeMap::new();
        for event in events
            .into_iter()
            .filter(|event| event.is_active() && event.event_date.year() == year)
        {
            let entry = totals
                .entry(event.merged_category.clone())
                .or_insert_with(|| PoolTotal {
                    merged_category: event.merged_category.clone(),
                    active_events: 0,
                    points: Decimal::ZERO,
                });
            entry.active_events += 1;
            entry.points = (entry.points + event.final_points).normalize();
        }
        totals.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::assessment::domain::{
        Category, EmployeeId, EmployeeRecord, EventId, EventLifecycle, StandardCode,
    };
    use chrono::NaiveDate;

    fn event(id: u64, date: (i32, u32, u32), final_points: Decimal, active: bool) -> ScoredEvent {
        ScoredEvent {
            id: EventId(id),
            employee_id: EmployeeId("e1".to_string()),
            standard_code: StandardCode::new("S01"),
            category: Category::Safety,
            merged_category: MergedCategory("safety".to_string()),
            accumulates: true,
            event_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).expect("valid"),
            description: String::new(),
            base_points: Decimal::NEGATIVE_ONE,
            responsibility: None,
            responsibility_coefficient: Decimal::ONE,
            actual_points: Decimal::NEGATIVE_ONE,
            cumulative_count: 1,
            cumulative_multiplier: Decimal::ONE,
            final_points,
            lifecycle: if active {
                EventLifecycle::Active
            } else {
                EventLifecycle::Deleted
            },
        }
    }

    #[test]
    fn total_counts_only_active_events_of_the_scoring_year() {
        let events = vec![
            event(1, (2026, 1, 15), Decimal::new(-1, 0), true),
            event(2, (2026, 2, 20), Decimal::new(-15, 1), true),
            event(3, (2026, 3, 1), Decimal::new(-4, 0), false),
            event(4, (2025, 12, 30), Decimal::new(-2, 0), true),
        ];

        let total = EmployeeScoreAggregator::total(Decimal::new(100, 0), 2026, &events);
        assert_eq!(total, Decimal::new(975, 1));
    }

    #[test]
    fn audit_reports_drift_without_fixing_it() {
        let snapshot = EmployeeSnapshot {
            record: EmployeeRecord {
                id: EmployeeId("e1".to_string()),
                name: "Casey".to_string(),
                baseline: Decimal::new(100, 0),
                score: Decimal::new(100, 0),
                scoring_year: 2026,
            },
            events: vec![event(1, (2026, 1, 15), Decimal::new(-1, 0), true)],
        };

        match EmployeeScoreAggregator::audit(&snapshot) {
            Err(ConsistencyViolation::ScoreDrift {
                stored, expected, ..
            }) => {
                assert_eq!(stored, "100");
                assert_eq!(expected, "99");
            }
            other => panic!("expected score drift, got {other:?}"),
        }
        assert_eq!(snapshot.record.score, Decimal::new(100, 0));
    }

    #[test]
    fn pool_totals_group_by_merged_category() {
        let events = vec![
            event(1, (2026, 1, 15), Decimal::new(-1, 0), true),
            event(2, (2026, 2, 20), Decimal::new(-15, 1), true),
            event(3, (2026, 3, 1), Decimal::new(-4, 0), false),
        ];

        let totals = EmployeeScoreAggregator::pool_totals(2026, &events);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].active_events, 2);
        assert_eq!(totals[0].points, Decimal::new(-25, 1));
    }
}
