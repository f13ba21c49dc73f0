use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Number of questions on the accident-responsibility checklist.
pub const CHECKLIST_LEN: usize = 9;

/// Checklist questions in the order the flags are stored.
pub const CHECKLIST_ITEMS: [&str; CHECKLIST_LEN] = [
    "traffic_signal_violation",
    "excessive_speed",
    "unsafe_following_distance",
    "improper_lane_change",
    "failure_to_yield",
    "distracted_driving",
    "hours_of_service_exceeded",
    "pre_trip_inspection_skipped",
    "incident_reported_late",
];

/// Answers to the nine responsibility questions; `true` marks a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<bool>", into = "Vec<bool>")]
pub struct ResponsibilityChecklist([bool; CHECKLIST_LEN]);

impl ResponsibilityChecklist {
    pub const fn new(flags: [bool; CHECKLIST_LEN]) -> Self {
        Self(flags)
    }

    /// Checklist with the first `faults` questions marked.
    pub fn with_faults(faults: usize) -> Self {
        let mut flags = [false; CHECKLIST_LEN];
        for flag in flags.iter_mut().take(faults) {
            *flag = true;
        }
        Self(flags)
    }

    pub fn flags(&self) -> [bool; CHECKLIST_LEN] {
        self.0
    }

    pub fn fault_count(&self) -> u8 {
        self.0.iter().filter(|flag| **flag).count() as u8
    }

    /// Names of the questions answered with a fault.
    pub fn faults(&self) -> Vec<&'static str> {
        CHECKLIST_ITEMS
            .iter()
            .zip(self.0.iter())
            .filter(|(_, flag)| **flag)
            .map(|(name, _)| *name)
            .collect()
    }
}

impl TryFrom<Vec<bool>> for ResponsibilityChecklist {
    type Error = ValidationError;

    fn try_from(value: Vec<bool>) -> Result<Self, Self::Error> {
        let received = value.len();
        let flags: [bool; CHECKLIST_LEN] = value
            .try_into()
            .map_err(|_| ValidationError::MalformedChecklist { received })?;
        Ok(Self(flags))
    }
}

impl From<ResponsibilityChecklist> for Vec<bool> {
    fn from(value: ResponsibilityChecklist) -> Self {
        value.0.to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsibilityLevel {
    None,
    Minor,
    Major,
    Full,
}

impl ResponsibilityLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Full => "full",
        }
    }

    pub fn coefficient(self) -> Decimal {
        match self {
            Self::Full => Decimal::ONE,
            Self::Major => Decimal::new(7, 1),
            Self::Minor => Decimal::new(3, 1),
            Self::None => Decimal::ZERO,
        }
    }
}

/// Assessment attached 1:1 to an event whose standard requires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityDetail {
    pub checklist: ResponsibilityChecklist,
    pub fault_count: u8,
    pub level: ResponsibilityLevel,
    pub coefficient: Decimal,
}

/// Maps a checklist to a responsibility level and coefficient.
pub struct ResponsibilityAssessor;

impl ResponsibilityAssessor {
    pub fn assess(checklist: ResponsibilityChecklist) -> ResponsibilityDetail {
        let fault_count = checklist.fault_count();
        let level = match fault_count {
            7..=u8::MAX => ResponsibilityLevel::Full,
            4..=6 => ResponsibilityLevel::Major,
            1..=3 => ResponsibilityLevel::Minor,
            0 => ResponsibilityLevel::None,
        };

        ResponsibilityDetail {
            checklist,
            fault_count,
            level,
            coefficient: level.coefficient(),
        }
    }
}
