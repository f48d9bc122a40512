//! Validation outcome type and the combinator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Error subcategory → ordered messages.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

/// Which validator produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCategory {
    Schema,
    Completeness,
    Plausibility,
    Consistency,
    Generic,
}

impl fmt::Display for ValidationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationCategory::Schema => "SCHEMA",
            ValidationCategory::Completeness => "COMPLETENESS",
            ValidationCategory::Plausibility => "PLAUSIBILITY",
            ValidationCategory::Consistency => "CONSISTENCY",
            ValidationCategory::Generic => "GENERIC",
        };
        write!(f, "{s}")
    }
}

/// How serious a failed validation is for publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    /// Structural failures (schema, completeness) are critical; value-level
    /// failures are warnings.
    pub fn for_category(category: ValidationCategory) -> Self {
        match category {
            ValidationCategory::Schema | ValidationCategory::Completeness => Severity::Critical,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Pass/fail plus categorised messages from one validator (or a combination).
///
/// Immutable once built: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    is_valid: bool,
    category: ValidationCategory,
    errors: ErrorMap,
}

impl ValidationResult {
    pub fn valid(category: ValidationCategory) -> Self {
        Self {
            is_valid: true,
            category,
            errors: ErrorMap::new(),
        }
    }

    /// Result from an error map; valid iff no subcategory has messages.
    pub fn from_errors(category: ValidationCategory, errors: ErrorMap) -> Self {
        let errors: ErrorMap = errors.into_iter().filter(|(_, m)| !m.is_empty()).collect();
        Self {
            is_valid: errors.is_empty(),
            category,
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn category(&self) -> ValidationCategory {
        self.category
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// Messages under one subcategory (empty if none).
    pub fn messages(&self, key: &str) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of messages across subcategories.
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Publication severity of a failed result.
    pub fn severity(&self) -> Option<Severity> {
        (!self.is_valid).then(|| Severity::for_category(self.category))
    }
}

/// Accumulates messages while a validator runs.
#[derive(Debug, Default)]
pub(crate) struct ErrorCollector {
    errors: ErrorMap,
}

impl ErrorCollector {
    pub(crate) fn push(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(key.into()).or_default().push(message.into());
    }

    pub(crate) fn finish(self, category: ValidationCategory) -> ValidationResult {
        ValidationResult::from_errors(category, self.errors)
    }
}

/// Combine several results into one.
///
/// Valid iff every input is valid. Error maps of all invalid inputs are
/// merged by appending, so no message is lost or overwritten. The combined
/// category is the invalid inputs' shared category, or `Generic` when they
/// differ. No inputs yields a valid `Generic` result.
pub fn combine(results: &[ValidationResult]) -> ValidationResult {
    let invalid: Vec<&ValidationResult> = results.iter().filter(|r| !r.is_valid).collect();
    if invalid.is_empty() {
        return ValidationResult::valid(ValidationCategory::Generic);
    }

    let first = invalid[0].category;
    let category = if invalid.iter().all(|r| r.category == first) {
        first
    } else {
        ValidationCategory::Generic
    };

    let mut merged = ErrorMap::new();
    for result in invalid {
        for (key, messages) in &result.errors {
            merged
                .entry(key.clone())
                .or_default()
                .extend(messages.iter().cloned());
        }
    }

    ValidationResult {
        is_valid: false,
        category,
        errors: merged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(category: ValidationCategory, key: &str, msg: &str) -> ValidationResult {
        let mut errors = ErrorMap::new();
        errors.insert(key.to_string(), vec![msg.to_string()]);
        ValidationResult::from_errors(category, errors)
    }

    #[test]
    fn empty_input_is_valid_generic() {
        let r = combine(&[]);
        assert!(r.is_valid());
        assert_eq!(r.category(), ValidationCategory::Generic);
        assert!(r.errors().is_empty());
    }

    #[test]
    fn all_valid_is_valid() {
        let r = combine(&[
            ValidationResult::valid(ValidationCategory::Schema),
            ValidationResult::valid(ValidationCategory::Plausibility),
        ]);
        assert!(r.is_valid());
    }

    #[test]
    fn one_invalid_makes_combined_invalid_with_exactly_its_keys() {
        let bad = invalid(ValidationCategory::Completeness, "missing_products", "fcr");
        let r = combine(&[ValidationResult::valid(ValidationCategory::Schema), bad.clone()]);
        assert!(!r.is_valid());
        assert_eq!(r.category(), ValidationCategory::Completeness);
        assert_eq!(r.errors(), bad.errors());
    }

    #[test]
    fn shared_keys_are_appended_not_overwritten() {
        let a = invalid(ValidationCategory::Plausibility, "out_of_range", "a");
        let b = invalid(ValidationCategory::Consistency, "out_of_range", "b");
        let r = combine(&[a, b]);
        assert_eq!(r.messages("out_of_range"), ["a".to_string(), "b".to_string()]);
        assert_eq!(r.category(), ValidationCategory::Generic);
    }

    #[test]
    fn empty_message_lists_do_not_invalidate() {
        let mut errors = ErrorMap::new();
        errors.insert("hour".into(), vec![]);
        let r = ValidationResult::from_errors(ValidationCategory::Schema, errors);
        assert!(r.is_valid());
        assert_eq!(r.severity(), None);
    }

    #[test]
    fn severity_follows_category() {
        let r = invalid(ValidationCategory::Schema, "hour", "x");
        assert_eq!(r.severity(), Some(Severity::Critical));
        let r = invalid(ValidationCategory::Consistency, "smoothness", "x");
        assert_eq!(r.severity(), Some(Severity::Warning));
    }
}
