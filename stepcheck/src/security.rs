//! Input checks for names and patterns supplied by plan authors.
//!
//! Column references are compiled to typed expressions and never spliced
//! into SQL text, so they only need basic sanity checks. Table names are
//! resolved through DataFusion's catalog and follow the stricter identifier
//! grammar. Regex patterns are compiled once at build time so a bad pattern
//! is a configuration error instead of a per-row failure.

use crate::error::{Result, StepcheckError};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_IDENTIFIER_LEN: usize = 128;
const MAX_PATTERN_LEN: usize = 1000;

static TABLE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Hard-coded pattern, compiled once.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
        .expect("Hard-coded regex pattern should be valid")
});

/// Validation helpers for user-provided identifiers and patterns.
pub struct InputSecurity;

impl InputSecurity {
    /// Validates a table name used to resolve a registered DataFusion table.
    ///
    /// # Examples
    /// ```rust
    /// use stepcheck::security::InputSecurity;
    ///
    /// assert!(InputSecurity::validate_table_name("orders").is_ok());
    /// assert!(InputSecurity::validate_table_name("warehouse.orders").is_ok());
    /// assert!(InputSecurity::validate_table_name("orders; DROP TABLE x--").is_err());
    /// ```
    pub fn validate_table_name(name: &str) -> Result<()> {
        Self::validate_column_name(name)?;

        if !TABLE_NAME_REGEX.is_match(name) {
            return Err(StepcheckError::SecurityError(format!(
                "Invalid table name format: '{name}'. Names must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }

        Ok(())
    }

    /// Validates a column reference.
    ///
    /// Arrow allows any UTF-8 field name, so only emptiness, length and
    /// embedded null bytes are rejected.
    pub fn validate_column_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(StepcheckError::SecurityError(
                "Identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(StepcheckError::SecurityError(format!(
                "Identifier too long (max {MAX_IDENTIFIER_LEN} characters)"
            )));
        }

        Self::validate_no_null_bytes(name, "Identifier")
    }

    /// Validates a regex pattern and returns the compiled expression.
    pub fn validate_regex_pattern(pattern: &str) -> Result<Regex> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(StepcheckError::SecurityError(format!(
                "Regex pattern too long (max {MAX_PATTERN_LEN} characters)"
            )));
        }

        Self::validate_no_null_bytes(pattern, "Regex pattern")?;

        Regex::new(pattern)
            .map_err(|e| StepcheckError::SecurityError(format!("Invalid regex pattern: {e}")))
    }

    /// Validates a fractional or absolute threshold limit.
    pub fn validate_threshold(value: f64, level: &str) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(StepcheckError::configuration(format!(
                "Threshold '{level}' must be a finite, non-negative number, got {value}"
            )));
        }
        if value >= 1.0 && value.fract() != 0.0 {
            return Err(StepcheckError::configuration(format!(
                "Threshold '{level}' of {value} is neither a fraction below 1 nor a whole count"
            )));
        }
        Ok(())
    }

    fn validate_no_null_bytes(input: &str, what: &str) -> Result<()> {
        if input.contains('\0') {
            return Err(StepcheckError::SecurityError(format!(
                "{what} cannot contain null bytes"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_table_names() {
        assert!(InputSecurity::validate_table_name("data").is_ok());
        assert!(InputSecurity::validate_table_name("_staging").is_ok());
        assert!(InputSecurity::validate_table_name("catalog.schema.table").is_ok());
    }

    #[test]
    fn test_invalid_table_names() {
        assert!(InputSecurity::validate_table_name("").is_err());
        assert!(InputSecurity::validate_table_name("   ").is_err());
        assert!(InputSecurity::validate_table_name("1table").is_err());
        assert!(InputSecurity::validate_table_name("t; DROP TABLE t").is_err());
        assert!(InputSecurity::validate_table_name(&"t".repeat(200)).is_err());
        assert!(InputSecurity::validate_table_name("t\0").is_err());
    }

    #[test]
    fn test_column_names_allow_arbitrary_text() {
        assert!(InputSecurity::validate_column_name("updated_at").is_ok());
        assert!(InputSecurity::validate_column_name("Order Total (€)").is_ok());
        assert!(InputSecurity::validate_column_name("").is_err());
        assert!(InputSecurity::validate_column_name("a\0b").is_err());
    }

    #[test]
    fn test_regex_patterns() {
        let re = InputSecurity::validate_regex_pattern(r"^[A-Z]{3}-\d+$").unwrap();
        assert!(re.is_match("ABC-12"));
        assert!(InputSecurity::validate_regex_pattern("[unclosed").is_err());
        // nested quantifiers are safe: matching is linear in the input
        assert!(InputSecurity::validate_regex_pattern("(a+)+$").is_ok());
        assert!(InputSecurity::validate_regex_pattern(&"a".repeat(1001)).is_err());
    }

    #[test]
    fn test_thresholds() {
        assert!(InputSecurity::validate_threshold(0.1, "warn").is_ok());
        assert!(InputSecurity::validate_threshold(0.0, "warn").is_ok());
        assert!(InputSecurity::validate_threshold(5.0, "stop").is_ok());
        assert!(InputSecurity::validate_threshold(-1.0, "stop").is_err());
        assert!(InputSecurity::validate_threshold(f64::NAN, "stop").is_err());
        assert!(InputSecurity::validate_threshold(2.5, "notify").is_err());
    }
}
