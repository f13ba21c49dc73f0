use crate::infra::{load_catalog, parse_month, MemoryAssessmentService};
use assessment_ledger::error::AppError;
use assessment_ledger::workflows::assessment::{
    AssessmentService, AssessmentSettings, EmployeeId, EmployeeRegistration, EmployeeYearLedger,
    EventDraft, EventId, LockPolicy, MemoryLedger, ResponsibilityChecklist, ScoredEvent,
    StandardCode, YearMonth,
};
use chrono::{Datelike, Local, NaiveDate};
use clap::Args;
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEMO_DRIVER: &str = "drv-0001";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Scoring year to populate. Defaults to the current year.
    #[arg(long, value_parser = clap::value_parser!(i32).range(2000..=2099))]
    pub(crate) year: Option<i32>,
    /// Month to evaluate the zero-violation bonuses for (YYYY-MM). Defaults to March of the year.
    #[arg(long, value_parser = parse_month)]
    pub(crate) reward_month: Option<YearMonth>,
    /// Baseline score the sample driver starts from.
    #[arg(long)]
    pub(crate) baseline: Option<Decimal>,
    /// Optional catalog export replacing the built-in standards.
    #[arg(long)]
    pub(crate) standards_csv: Option<PathBuf>,
    /// Stop before opening the following scoring year.
    #[arg(long)]
    pub(crate) skip_reset: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogArgs {
    /// Catalog export to validate instead of the built-in standards.
    #[arg(long)]
    pub(crate) standards_csv: Option<PathBuf>,
}

/// Figures the demo prints along the way.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DemoSummary {
    pub(crate) promoted_points: Decimal,
    pub(crate) awarded: Decimal,
    pub(crate) year_end_score: Decimal,
    pub(crate) reset_score: Option<Decimal>,
}

pub(crate) fn run_catalog_listing(args: CatalogArgs) -> Result<(), AppError> {
    let catalog = load_catalog(args.standards_csv.as_deref())?;
    let service = AssessmentService::new(
        Arc::new(MemoryLedger::new()),
        Arc::new(catalog),
        AssessmentSettings::default(),
    );

    println!("Assessment standards");
    for standard in service.standards() {
        println!(
            "- {} {:<40} {:>6} | {} | {:?}{}{}{}",
            standard.code,
            standard.name,
            standard.base_points,
            standard.category.label(),
            standard.cycle,
            if standard.accumulates { " | cumulative" } else { "" },
            if standard.requires_responsibility {
                " | responsibility checklist"
            } else {
                ""
            },
            if standard.active { "" } else { " | inactive" },
        );
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let year = args.year.unwrap_or_else(|| Local::now().year());
    let reward_month = match args.reward_month {
        Some(month) => month,
        None => YearMonth::new(year, 3).ok_or_else(|| invalid_input(format!("year {year}")))?,
    };

    let catalog = load_catalog(args.standards_csv.as_deref())?;
    let settings = AssessmentSettings {
        default_baseline: args.baseline.unwrap_or(Decimal::ONE_HUNDRED),
        lock: LockPolicy {
            wait: Duration::from_millis(250),
            retries: 1,
        },
    };
    let service = AssessmentService::new(Arc::new(MemoryLedger::new()), Arc::new(catalog), settings);

    println!("Driver assessment demo ({year})");
    let summary = score_sample_year(&service, year, reward_month, args.skip_reset)?;
    println!(
        "\nSummary: promoted event {} | bonuses +{} | {} closed at {}{}",
        summary.promoted_points,
        summary.awarded,
        year,
        summary.year_end_score,
        summary
            .reset_score
            .map(|score| format!(" | {} opens at {score}", year + 1))
            .unwrap_or_default()
    );
    Ok(())
}

pub(crate) fn score_sample_year(
    service: &MemoryAssessmentService,
    year: i32,
    reward_month: YearMonth,
    skip_reset: bool,
) -> Result<DemoSummary, AppError> {
    let driver = EmployeeId(DEMO_DRIVER.to_string());
    let record = service.register_employee(EmployeeRegistration {
        employee_id: driver.clone(),
        name: "Sample Driver".to_string(),
        baseline: None,
        scoring_year: Some(year),
    })?;
    println!(
        "- Registered {} with baseline {} for {}",
        record.id, record.baseline, record.scoring_year
    );

    println!("\nRecording events");
    let first_speeding = service.create_event(draft(&driver, "S01", date(year, 1, 10)?, None))?;
    print_outcome("speeding", &first_speeding.event, first_speeding.employee_score);
    let second_speeding = service.create_event(draft(&driver, "S01", date(year, 2, 3)?, None))?;
    print_outcome("speeding again", &second_speeding.event, second_speeding.employee_score);
    let collision = service.create_event(draft(
        &driver,
        "R02",
        date(year, 2, 20)?,
        Some(ResponsibilityChecklist::with_faults(3)),
    ))?;
    print_outcome("minor collision", &collision.event, collision.employee_score);
    if let Some(detail) = &collision.event.responsibility {
        println!(
            "    responsibility: {} fault(s) -> {} (coefficient {})",
            detail.fault_count,
            detail.level.label(),
            detail.coefficient
        );
    }

    println!("\nCorrecting the record");
    let deleted = service.soft_delete(first_speeding.event.id)?;
    println!(
        "- Soft-deleted {} -> score {}",
        deleted.event.id, deleted.employee_score
    );
    let promoted_points = event_points(service, &driver, year, second_speeding.event.id)?;
    println!(
        "  {} now counts first in its pool: {} points",
        second_speeding.event.id, promoted_points
    );
    let restored = service.restore(first_speeding.event.id)?;
    println!(
        "- Restored {} -> score {}",
        restored.event.id, restored.employee_score
    );

    println!("\nMonthly zero-violation bonuses for {reward_month}");
    let run = service.evaluate_monthly_rewards(reward_month)?;
    let mut awarded = Decimal::ZERO;
    for reward in &run.records {
        println!(
            "- {}: driving zero {} | all zero {} | {} deduction(s) | +{}",
            reward.employee_id,
            yes_no(reward.driving_zero),
            yes_no(reward.all_zero),
            reward.deductions,
            reward.total_awarded
        );
        if reward.employee_id == driver {
            awarded = reward.total_awarded;
        }
    }
    for failure in &run.failures {
        println!("- {}: evaluation failed ({})", failure.employee_id, failure.error);
    }

    let ledger = service.ledger_for_year(&driver, year)?;
    print_ledger(&ledger);

    let mut summary = DemoSummary {
        promoted_points,
        awarded,
        year_end_score: ledger.score,
        reset_score: None,
    };
    if skip_reset {
        return Ok(summary);
    }

    println!("\nOpening scoring year {}", year + 1);
    let reset = service.annual_reset(year + 1)?;
    for employee in &reset.reset {
        println!(
            "- {}: {} -> {} | {} counter(s) archived | score {}",
            employee.employee_id,
            employee.previous_year,
            employee.scoring_year,
            employee.archived_counters,
            employee.score
        );
        if employee.employee_id == driver {
            summary.reset_score = Some(employee.score);
        }
    }
    for failure in &reset.failures {
        println!("- {}: reset failed ({})", failure.employee_id, failure.error);
    }

    Ok(summary)
}

fn draft(
    employee_id: &EmployeeId,
    code: &str,
    event_date: NaiveDate,
    checklist: Option<ResponsibilityChecklist>,
) -> EventDraft {
    EventDraft {
        employee_id: employee_id.clone(),
        standard_code: StandardCode::new(code),
        event_date,
        description: format!("demo {code}"),
        checklist,
    }
}

fn event_points(
    service: &MemoryAssessmentService,
    employee_id: &EmployeeId,
    year: i32,
    event_id: EventId,
) -> Result<Decimal, AppError> {
    let ledger = service.ledger_for_year(employee_id, year)?;
    ledger
        .events
        .iter()
        .find(|event| event.id == event_id)
        .map(|event| event.final_points)
        .ok_or_else(|| invalid_input(format!("event {event_id} missing from the {year} ledger")))
}

fn print_outcome(
    label: &str,
    event: &ScoredEvent,
    score: Decimal,
) {
    println!(
        "- {} {} on {}: #{} in pool x{} -> {} points | score {}",
        event.id,
        label,
        event.event_date,
        event.cumulative_count,
        event.cumulative_multiplier,
        event.final_points,
        score
    );
}

fn print_ledger(ledger: &EmployeeYearLedger) {
    println!(
        "\nLedger {} ({}) for {}: baseline {} | score {}",
        ledger.employee_id, ledger.name, ledger.year, ledger.baseline, ledger.score
    );
    println!("Pools:");
    for pool in &ledger.pool_totals {
        println!(
            "  - {}: {} active event(s), {} points",
            pool.merged_category, pool.active_events, pool.points
        );
    }
    println!("Events:");
    for event in &ledger.events {
        println!(
            "  - {} {} {} {:>7} ({})",
            event.id,
            event.event_date,
            event.standard_code,
            event.final_points,
            event.lifecycle.label()
        );
    }
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| invalid_input(format!("{year}-{month:02}-{day:02} is not a calendar date")))
}

fn invalid_input(message: String) -> AppError {
    AppError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
