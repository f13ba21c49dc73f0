use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{Category, StandardCode};
use super::error::ValidationError;

/// Window over which a standard is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringCycle {
    Annual,
    Monthly,
}

impl ScoringCycle {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" | "yearly" => Some(Self::Annual),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// Catalog entry describing how one standard is scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardDefinition {
    pub code: StandardCode,
    pub name: String,
    pub category: Category,
    pub base_points: Decimal,
    pub accumulates: bool,
    pub cycle: ScoringCycle,
    pub requires_responsibility: bool,
    pub active: bool,
}

/// Read-only lookup of assessment standards.
pub trait StandardsCatalog: Send + Sync {
    fn lookup(&self, code: &StandardCode) -> Option<StandardDefinition>;
    fn standards(&self) -> Vec<StandardDefinition>;

    /// Active definition for `code`, or the validation error explaining why there is none.
    fn require(&self, code: &StandardCode) -> Result<StandardDefinition, ValidationError> {
        match self.lookup(code) {
            Some(definition) if definition.active => Ok(definition),
            Some(_) => Err(ValidationError::InactiveStandard(code.clone())),
            None => Err(ValidationError::UnknownStandard(code.clone())),
        }
    }
}

/// In-process catalog, either the built-in table or a CSV export.
#[derive(Debug, Clone, Default)]
pub struct StaticStandardsCatalog {
    standards: BTreeMap<StandardCode, StandardDefinition>,
}

impl StaticStandardsCatalog {
    pub fn new(definitions: impl IntoIterator<Item = StandardDefinition>) -> Self {
        let standards = definitions
            .into_iter()
            .map(|definition| (definition.code.clone(), definition))
            .collect();
        Self { standards }
    }

    /// The standards the fleet currently assesses against.
    pub fn standard() -> Self {
        use Category::*;
        use ScoringCycle::*;

        let rows: [(&str, &str, Category, i64, u32, bool, ScoringCycle, bool, bool); 14] = [
            ("R01", "Collision, responsibility undetermined", Responsibility, -1, 0, true, Annual, false, false),
            ("R02", "Minor collision, at fault", Responsibility, -2, 0, true, Annual, true, true),
            ("R03", "Collision with property damage", Responsibility, -3, 0, true, Annual, true, true),
            ("R04", "Collision with injury", Responsibility, -5, 0, true, Annual, true, true),
            ("R05", "Collision with serious injury", Responsibility, -8, 0, true, Annual, true, true),
            ("R06", "Unreported vehicle damage", Responsibility, -1, 0, true, Annual, false, true),
            ("S01", "Speeding violation", Safety, -1, 0, true, Annual, false, true),
            ("S02", "Seatbelt or phone violation", Safety, -1, 0, true, Annual, false, true),
            ("D01", "Uniform or conduct violation", Discipline, -5, 1, true, Annual, false, true),
            ("A01", "Unexcused late arrival", Attendance, -5, 1, true, Annual, false, true),
            ("A02", "Unexcused absence", Attendance, -2, 0, true, Annual, false, true),
            ("V01", "Substantiated passenger complaint", Service, -1, 0, true, Annual, false, true),
            ("B01", "Driving zero-violation month", Bonus, 1, 0, false, Monthly, false, true),
            ("B02", "All zero-violation month", Bonus, 2, 0, false, Monthly, false, true),
        ];

        Self::new(rows.into_iter().map(
            |(code, name, category, points, scale, accumulates, cycle, requires, active)| {
                StandardDefinition {
                    code: StandardCode::new(code),
                    name: name.to_string(),
                    category,
                    base_points: Decimal::new(points, scale),
                    accumulates,
                    cycle,
                    requires_responsibility: requires,
                    active,
                }
            },
        ))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parses a catalog export with the columns
    /// `code,name,category,base_points,accumulates,cycle,requires_responsibility,active`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut definitions = Vec::new();

        for row in csv_reader.deserialize::<CatalogRow>() {
            definitions.push(row?.into_definition()?);
        }

        Ok(Self::new(definitions))
    }
}

impl StandardsCatalog for StaticStandardsCatalog {
    fn lookup(&self, code: &StandardCode) -> Option<StandardDefinition> {
        self.standards.get(code).cloned()
    }

    fn standards(&self) -> Vec<StandardDefinition> {
        self.standards.values().cloned().collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogImportError {
    #[error("failed to read standards catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid standards CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Row(#[from] ValidationError),
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    code: String,
    name: String,
    category: String,
    base_points: String,
    #[serde(default)]
    accumulates: Option<String>,
    #[serde(default)]
    cycle: Option<String>,
    #[serde(default)]
    requires_responsibility: Option<String>,
    #[serde(default)]
    active: Option<String>,
}

impl CatalogRow {
    fn into_definition(self) -> Result<StandardDefinition, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidCatalogRow {
            code: self.code.clone(),
            reason,
        };

        let category = Category::parse(&self.category)
            .ok_or_else(|| invalid(format!("unknown category '{}'", self.category)))?;
        let base_points = Decimal::from_str(self.base_points.trim())
            .map_err(|err| invalid(format!("base_points '{}': {err}", self.base_points)))?;
        let cycle = match self.cycle.as_deref().filter(|value| !value.trim().is_empty()) {
            Some(value) => ScoringCycle::parse(value)
                .ok_or_else(|| invalid(format!("unknown cycle '{value}'")))?,
            None => ScoringCycle::Annual,
        };
        let accumulates = parse_flag(self.accumulates.as_deref(), true).map_err(&invalid)?;
        let requires_responsibility =
            parse_flag(self.requires_responsibility.as_deref(), false).map_err(&invalid)?;
        let active = parse_flag(self.active.as_deref(), true).map_err(&invalid)?;

        Ok(StandardDefinition {
            code: StandardCode::new(&self.code),
            name: self.name.trim().to_string(),
            category,
            base_points: base_points.normalize(),
            accumulates,
            cycle,
            requires_responsibility,
            active,
        })
    }
}

fn parse_flag(value: Option<&str>, default: bool) -> Result<bool, String> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        other => Err(format!("'{other}' is not a yes/no flag")),
    }
}
