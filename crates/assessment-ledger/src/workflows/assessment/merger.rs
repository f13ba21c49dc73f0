use super::domain::{Category, MergedCategory, StandardCode};

/// Merged key shared by the accident-responsibility codes.
pub const RESPONSIBILITY_POOL: &str = "R";

/// Codes that count in the shared responsibility pool. New codes are never merged implicitly;
/// they have to be listed here.
pub const RESPONSIBILITY_POOL_CODES: [&str; 4] = ["R02", "R03", "R04", "R05"];

/// Maps a standard to the counting pool its occurrences accumulate in.
pub struct CategoryMerger;

impl CategoryMerger {
    pub fn merge(code: &StandardCode, category: Category) -> MergedCategory {
        if Self::is_pooled(code) {
            MergedCategory(RESPONSIBILITY_POOL.to_string())
        } else {
            MergedCategory(category.code().to_string())
        }
    }

    pub fn is_pooled(code: &StandardCode) -> bool {
        RESPONSIBILITY_POOL_CODES.contains(&code.as_str())
    }
}
