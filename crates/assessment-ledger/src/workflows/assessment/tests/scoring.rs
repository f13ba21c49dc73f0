use super::common::*;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::workflows::assessment::domain::{
    EmployeeId, EventId, EventLifecycle, GroupKey, MergedCategory, StandardCode,
};
use crate::workflows::assessment::repository::{ChangeSet, LedgerRepository};
use crate::workflows::assessment::{
    ConsistencyViolation, CumulativeCounter, EmployeeRegistration, NotFoundError,
    ResponsibilityChecklist, ResponsibilityLevel, ScoringError, ValidationError,
};

fn safety(employee: &EmployeeId, year: i32) -> GroupKey {
    GroupKey::new(employee.clone(), year, MergedCategory("safety".to_string()))
}

fn pooled(employee: &EmployeeId, year: i32) -> GroupKey {
    GroupKey::new(employee.clone(), year, MergedCategory("R".to_string()))
}

#[test]
fn second_event_in_group_takes_one_and_a_half_multiplier() {
    let service = service();
    let employee = register(&service, "e-100");

    let first = service
        .create_event(draft(&employee, "S01", date(2026, 1, 15)))
        .expect("first event");
    let second = service
        .create_event(draft(&employee, "S01", date(2026, 2, 20)))
        .expect("second event");

    assert_eq!(first.event.cumulative_count, 1);
    assert_eq!(first.event.cumulative_multiplier, Decimal::ONE);
    assert_eq!(first.event.final_points, dec("-1"));
    assert_eq!(second.event.cumulative_count, 2);
    assert_eq!(second.event.cumulative_multiplier, dec("1.5"));
    assert_eq!(second.event.final_points, dec("-1.5"));
    assert_eq!(second.employee_score, dec("97.5"));
    assert_eq!(counter(&service, &safety(&employee, 2026)).count, 2);
    assert_consistent(&service, &employee);
}

#[test]
fn responsibility_checklist_scales_the_base_points() {
    let service = service();
    let employee = register(&service, "e-101");

    service
        .create_event(assessed_draft(&employee, "R03", date(2026, 1, 5), 7))
        .expect("first pooled event");
    service
        .create_event(assessed_draft(&employee, "R04", date(2026, 2, 5), 2))
        .expect("second pooled event");
    let third = service
        .create_event(assessed_draft(&employee, "R02", date(2026, 3, 5), 5))
        .expect("third pooled event");

    let detail = third.event.responsibility.clone().expect("assessment stored");
    assert_eq!(detail.fault_count, 5);
    assert_eq!(detail.level, ResponsibilityLevel::Major);
    assert_eq!(third.event.responsibility_coefficient, dec("0.7"));
    assert_eq!(third.event.actual_points, dec("-1.4"));
    assert_eq!(third.event.cumulative_count, 3);
    assert_eq!(third.event.cumulative_multiplier, dec("2"));
    assert_eq!(third.event.final_points, dec("-2.8"));
    assert_eq!(counter(&service, &pooled(&employee, 2026)).count, 3);
    assert_consistent(&service, &employee);
}

#[test]
fn pooled_codes_merge_in_any_order_and_r06_counts_alone() {
    let service = service();
    let employee = register(&service, "e-102");

    for (code, month) in [("R05", 1), ("R02", 2), ("R04", 3), ("R03", 4)] {
        service
            .create_event(assessed_draft(&employee, code, date(2026, month, 1), 9))
            .expect("pooled event");
    }
    let lone = service
        .create_event(draft(&employee, "R06", date(2026, 5, 1)))
        .expect("unpooled responsibility event");

    assert_eq!(counter(&service, &pooled(&employee, 2026)).count, 4);
    assert_eq!(lone.event.merged_category.as_str(), "responsibility");
    assert_eq!(lone.event.cumulative_count, 1);
    assert_consistent(&service, &employee);
}

#[test]
fn missing_checklist_keeps_full_coefficient() {
    let service = service();
    let employee = register(&service, "e-103");

    let outcome = service
        .create_event(draft(&employee, "R03", date(2026, 4, 1)))
        .expect("event without assessment");

    assert!(outcome.event.responsibility.is_none());
    assert_eq!(outcome.event.responsibility_coefficient, Decimal::ONE);
    assert_eq!(outcome.event.actual_points, dec("-3"));
}

#[test]
fn checklist_on_plain_standard_is_ignored() {
    let service = service();
    let employee = register(&service, "e-104");

    let outcome = service
        .create_event(assessed_draft(&employee, "S02", date(2026, 4, 1), 9))
        .expect("event records");

    assert!(outcome.event.responsibility.is_none());
    assert_eq!(outcome.event.final_points, dec("-1"));
}

#[test]
fn back_dated_event_re_ranks_the_group() {
    let service = service();
    let employee = register(&service, "e-105");

    let march = record(&service, &employee, "S01", date(2026, 3, 1));
    let january = service
        .create_event(draft(&employee, "S01", date(2026, 1, 1)))
        .expect("back-dated event");

    assert_eq!(january.event.cumulative_count, 1);
    assert_eq!(january.event.final_points, dec("-1"));
    let march = event(&service, march);
    assert_eq!(march.cumulative_count, 2);
    assert_eq!(march.final_points, dec("-1.5"));
    assert_eq!(january.employee_score, dec("97.5"));
    assert_consistent(&service, &employee);
}

#[test]
fn same_day_events_rank_in_insertion_order() {
    let service = service();
    let employee = register(&service, "e-106");

    let first = record(&service, &employee, "V01", date(2026, 6, 1));
    let second = record(&service, &employee, "V01", date(2026, 6, 1));

    assert_eq!(event(&service, first).cumulative_count, 1);
    assert_eq!(event(&service, second).cumulative_count, 2);
}

#[test]
fn re_dating_before_the_earlier_event_swaps_ranks() {
    let service = service();
    let employee = register(&service, "e-107");

    let january = record(&service, &employee, "S01", date(2026, 1, 15));
    let february = record(&service, &employee, "S01", date(2026, 2, 20));
    let before = score(&service, &employee);

    let moved = service
        .change_event_date(february, date(2026, 1, 10))
        .expect("event re-dated");

    assert_eq!(moved.event.cumulative_count, 1);
    assert_eq!(moved.event.final_points, dec("-1"));
    let january = event(&service, january);
    assert_eq!(january.cumulative_count, 2);
    assert_eq!(january.final_points, dec("-1.5"));
    assert_eq!(moved.employee_score, before);
    assert_consistent(&service, &employee);
}

#[test]
fn moving_an_event_across_years_leaves_no_residual_count() {
    let service = service();
    let employee = register(&service, "e-108");

    record(&service, &employee, "S01", date(2026, 11, 1));
    let moving = record(&service, &employee, "S01", date(2026, 12, 20));
    assert_eq!(score(&service, &employee), dec("97.5"));

    let outcome = service
        .change_event_date(moving, date(2027, 1, 3))
        .expect("moved into next year");

    assert_eq!(counter(&service, &safety(&employee, 2026)).count, 1);
    assert_eq!(counter(&service, &safety(&employee, 2027)).count, 1);
    assert_eq!(outcome.event.cumulative_count, 1);
    assert_eq!(outcome.event.final_points, dec("-1"));
    assert_eq!(outcome.employee_score, dec("99"));
    assert_consistent(&service, &employee);
}

#[test]
fn re_dating_to_the_same_date_is_a_no_op() {
    let service = service();
    let employee = register(&service, "e-109");
    let id = record(&service, &employee, "S01", date(2026, 5, 5));
    let before = event(&service, id);

    let outcome = service
        .change_event_date(id, date(2026, 5, 5))
        .expect("no-op re-date");

    assert_eq!(outcome.event, before);
}

#[test]
fn reassessment_replaces_the_coefficient_and_recalculates() {
    let service = service();
    let employee = register(&service, "e-110");
    let id = service
        .create_event(assessed_draft(&employee, "R02", date(2026, 2, 2), 1))
        .expect("assessed event")
        .event
        .id;
    assert_eq!(event(&service, id).final_points, dec("-0.6"));

    let outcome = service
        .reassess(id, ResponsibilityChecklist::with_faults(8))
        .expect("reassessed");

    assert_eq!(outcome.event.responsibility_coefficient, Decimal::ONE);
    assert_eq!(outcome.event.final_points, dec("-2"));
    assert_eq!(outcome.employee_score, dec("98"));
    assert_consistent(&service, &employee);
}

#[test]
fn reassessing_a_plain_standard_is_rejected() {
    let service = service();
    let employee = register(&service, "e-111");
    let id = record(&service, &employee, "A02", date(2026, 2, 2));

    let error = service
        .reassess(id, ResponsibilityChecklist::with_faults(3))
        .expect_err("attendance takes no assessment");

    assert!(matches!(
        error,
        ScoringError::Validation(ValidationError::AssessmentNotApplicable(code)) if code.as_str() == "A02"
    ));
}

#[test]
fn unknown_and_inactive_standards_are_validation_errors() {
    let service = service();
    let employee = register(&service, "e-112");

    let unknown = service
        .create_event(draft(&employee, "Z99", date(2026, 1, 1)))
        .expect_err("unknown code");
    assert!(matches!(
        unknown,
        ScoringError::Validation(ValidationError::UnknownStandard(_))
    ));

    let inactive = service
        .create_event(draft(&employee, "r01", date(2026, 1, 1)))
        .expect_err("retired code");
    assert!(matches!(
        inactive,
        ScoringError::Validation(ValidationError::InactiveStandard(code)) if code == StandardCode::new("R01")
    ));
}

#[test]
fn malformed_checklist_is_rejected_before_anything_runs() {
    let error = ResponsibilityChecklist::try_from(vec![true; 8]).expect_err("eight answers");
    assert_eq!(error, ValidationError::MalformedChecklist { received: 8 });
}

#[test]
fn missing_rows_surface_as_not_found() {
    let service = service();
    let ghost = EmployeeId("ghost".to_string());

    let error = service
        .create_event(draft(&ghost, "S01", date(2026, 1, 1)))
        .expect_err("unregistered employee");
    assert!(matches!(
        error,
        ScoringError::NotFound(NotFoundError::Employee(_))
    ));

    let error = service.soft_delete(EventId(404)).expect_err("unknown event");
    assert!(matches!(
        error,
        ScoringError::NotFound(NotFoundError::Event(EventId(404)))
    ));
}

#[test]
fn registration_rejects_blank_and_duplicate_ids() {
    let service = service();
    register(&service, "e-113");

    let duplicate = service
        .register_employee(EmployeeRegistration {
            employee_id: EmployeeId(" e-113 ".to_string()),
            name: "Again".to_string(),
            baseline: None,
            scoring_year: None,
        })
        .expect_err("duplicate");
    assert!(matches!(
        duplicate,
        ScoringError::Validation(ValidationError::DuplicateEmployee(_))
    ));

    let blank = service
        .register_employee(EmployeeRegistration {
            employee_id: EmployeeId("  ".to_string()),
            name: String::new(),
            baseline: Some(dec("50")),
            scoring_year: None,
        })
        .expect_err("blank");
    assert!(matches!(
        blank,
        ScoringError::Validation(ValidationError::BlankEmployeeId)
    ));
}

#[test]
fn failed_commit_leaves_no_partial_writes() {
    let repository = Arc::new(FlakyLedger::default());
    let service = service_with(Arc::clone(&repository));
    let employee = register(&service, "e-114");
    record(&service, &employee, "S01", date(2026, 1, 1));

    repository.fail_next_commits(true);
    let error = service
        .create_event(draft(&employee, "S01", date(2026, 2, 1)))
        .expect_err("commit fails");
    assert!(error.is_transient());
    repository.fail_next_commits(false);

    let snapshot = repository
        .employee_snapshot(&employee)
        .expect("reachable")
        .expect("employee");
    assert_eq!(snapshot.events.len(), 1);
    assert_eq!(snapshot.record.score, dec("99"));
    assert_eq!(counter(&service, &safety(&employee, 2026)).count, 1);
    assert_eq!(service.ledger().locks().held_count(), 0);
    assert_consistent(&service, &employee);
}

#[test]
fn drifted_counter_aborts_without_repair() {
    let service = service();
    let employee = register(&service, "e-115");
    record(&service, &employee, "S01", date(2026, 1, 1));

    let key = safety(&employee, 2026);
    let mut corruption = ChangeSet::default();
    corruption.counters.insert(
        key.clone(),
        CumulativeCounter {
            key: key.clone(),
            count: 5,
            archived: false,
        },
    );
    service
        .ledger()
        .repository()
        .commit(corruption)
        .expect("corruption applied");

    let error = service
        .create_event(draft(&employee, "S01", date(2026, 2, 1)))
        .expect_err("audit fails");

    assert!(matches!(
        error,
        ScoringError::Consistency(ConsistencyViolation::CounterDrift {
            stored: 5,
            expected: 1,
            ..
        })
    ));
    assert_eq!(counter(&service, &key).count, 5);
    assert_eq!(
        service
            .ledger()
            .repository()
            .employee_events(&employee)
            .expect("reachable")
            .len(),
        1
    );
}

#[test]
fn drifted_score_aborts_without_repair() {
    let service = service();
    let employee = register(&service, "e-116");

    let mut record = service
        .ledger()
        .repository()
        .employee(&employee)
        .expect("reachable")
        .expect("employee");
    record.score = dec("42");
    let mut corruption = ChangeSet::default();
    corruption.employees.insert(employee.clone(), record);
    service
        .ledger()
        .repository()
        .commit(corruption)
        .expect("corruption applied");

    let error = service
        .create_event(draft(&employee, "D01", date(2026, 3, 3)))
        .expect_err("audit fails");

    assert!(matches!(
        error,
        ScoringError::Consistency(ConsistencyViolation::ScoreDrift { .. })
    ));
    assert_eq!(score(&service, &employee), dec("42"));
}

#[test]
fn deleted_events_are_kept_in_the_ledger() {
    let service = service();
    let employee = register(&service, "e-117");
    let id = record(&service, &employee, "S01", date(2026, 1, 1));

    let outcome = service.soft_delete(id).expect("deleted");
    let again = service.soft_delete(id).expect("repeat delete is a no-op");

    assert_eq!(outcome.event.lifecycle, EventLifecycle::Deleted);
    assert_eq!(again.event, outcome.event);
    assert_eq!(outcome.employee_score, dec("100"));
    let ledger = service.ledger_for_year(&employee, 2026).expect("ledger");
    assert_eq!(ledger.events.len(), 1);
    assert!(ledger.pool_totals.is_empty());
}
