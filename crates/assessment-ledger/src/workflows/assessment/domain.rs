use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::responsibility::ResponsibilityDetail;

/// Identifier wrapper for employees.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Surrogate key of a scored event. Allocated monotonically, so it doubles as insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{:06}", self.0)
    }
}

/// Code of an assessment standard, e.g. `R03` or `S01`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StandardCode(pub String);

impl StandardCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StandardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw category a standard is filed under in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Responsibility,
    Safety,
    Discipline,
    Attendance,
    Service,
    Bonus,
}

impl Category {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Responsibility,
            Self::Safety,
            Self::Discipline,
            Self::Attendance,
            Self::Service,
            Self::Bonus,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Responsibility => "responsibility",
            Self::Safety => "safety",
            Self::Discipline => "discipline",
            Self::Attendance => "attendance",
            Self::Service => "service",
            Self::Bonus => "bonus",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Responsibility => "Accident Responsibility",
            Self::Safety => "Driving Safety",
            Self::Discipline => "Work Discipline",
            Self::Attendance => "Attendance",
            Self::Service => "Passenger Service",
            Self::Bonus => "Monthly Bonus",
        }
    }

    /// Categories whose deductions disqualify the driving zero-violation bonus.
    pub const fn is_driving(self) -> bool {
        matches!(self, Self::Responsibility | Self::Safety)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|category| category.code() == normalized)
    }
}

/// Counting-pool key used by the cumulative counters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MergedCategory(pub String);

impl MergedCategory {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MergedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of counting and of mutual exclusion: one employee, one year, one merged category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub employee_id: EmployeeId,
    pub year: i32,
    pub merged_category: MergedCategory,
}

impl GroupKey {
    pub fn new(employee_id: EmployeeId, year: i32, merged_category: MergedCategory) -> Self {
        Self {
            employee_id,
            year,
            merged_category,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.employee_id, self.year, self.merged_category
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLifecycle {
    Active,
    Deleted,
}

impl EventLifecycle {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

/// One row of the scored-event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    pub id: EventId,
    pub employee_id: EmployeeId,
    pub standard_code: StandardCode,
    pub category: Category,
    pub merged_category: MergedCategory,
    pub accumulates: bool,
    pub event_date: NaiveDate,
    pub description: String,
    pub base_points: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsibility: Option<ResponsibilityDetail>,
    pub responsibility_coefficient: Decimal,
    pub actual_points: Decimal,
    pub cumulative_count: u32,
    pub cumulative_multiplier: Decimal,
    pub final_points: Decimal,
    pub lifecycle: EventLifecycle,
}

impl ScoredEvent {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(
            self.employee_id.clone(),
            self.event_date.year(),
            self.merged_category.clone(),
        )
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == EventLifecycle::Active
    }

    pub fn is_deduction(&self) -> bool {
        self.base_points.is_sign_negative() && !self.base_points.is_zero()
    }

    /// Chronological order inside a group; same-date events fall back to insertion order.
    pub fn chronological_key(&self) -> (NaiveDate, EventId) {
        (self.event_date, self.id)
    }

    /// Re-derives multiplier and final points from a rank inside the group.
    pub fn apply_rank(&mut self, rank: u32) {
        self.cumulative_count = if self.accumulates { rank } else { 1 };
        self.cumulative_multiplier = cumulative_multiplier(self.cumulative_count);
        self.final_points = (self.actual_points * self.cumulative_multiplier).normalize();
    }
}

/// `1 + 0.5 × (count − 1)`.
pub fn cumulative_multiplier(count: u32) -> Decimal {
    let steps = Decimal::from(count.saturating_sub(1));
    (Decimal::ONE + Decimal::new(5, 1) * steps).normalize()
}

/// Persisted count of Active events in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeCounter {
    pub key: GroupKey,
    pub count: u32,
    /// Counters of years before the employee's scoring year are closed at zero.
    pub archived: bool,
}

impl CumulativeCounter {
    pub fn empty(key: GroupKey) -> Self {
        Self {
            key,
            count: 0,
            archived: false,
        }
    }
}

/// Employee row carrying the materialized aggregate score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub name: String,
    pub baseline: Decimal,
    pub score: Decimal,
    pub scoring_year: i32,
}

/// Calendar month used to key monthly reward evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (year, month) = trimmed
            .split_once('-')
            .ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM"))?;
        let year = year
            .parse::<i32>()
            .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM ({err})"))?;
        let month = month
            .parse::<u32>()
            .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM ({err})"))?;
        Self::new(year, month).ok_or_else(|| format!("'{raw}' is not a calendar month"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of a zero-violation evaluation for one employee-month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRewardRecord {
    pub employee_id: EmployeeId,
    pub month: YearMonth,
    pub driving_zero: bool,
    pub all_zero: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driving_zero_event: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_zero_event: Option<EventId>,
    pub deductions: u32,
    pub total_awarded: Decimal,
}
