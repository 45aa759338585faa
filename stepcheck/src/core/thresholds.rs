//! Failure thresholds and their classification.
//!
//! A threshold level is either a fraction of the evaluated units (values
//! below 1) or an absolute count of failing units (whole values of 1 or
//! more). A level is reached when the failing units meet or exceed it; a
//! step with no failing units never reaches any level.

use crate::error::Result;
use crate::security::InputSecurity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One threshold limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "value")]
pub enum ThresholdValue {
    /// Fraction of evaluated units, in `[0, 1)`.
    Fraction(f64),
    /// Absolute number of failing units.
    Count(u64),
}

impl ThresholdValue {
    /// Interprets a number the way plan authors write it: below 1 is a
    /// fraction, anything else an absolute count.
    pub fn parse(value: f64, level: &str) -> Result<Self> {
        InputSecurity::validate_threshold(value, level)?;
        if value < 1.0 {
            Ok(Self::Fraction(value))
        } else {
            Ok(Self::Count(value as u64))
        }
    }

    /// Returns true when `n_fail` failing units out of `n` reach this limit.
    pub fn is_reached(&self, n_fail: u64, n: u64) -> bool {
        if n == 0 || n_fail == 0 {
            return false;
        }
        match *self {
            Self::Fraction(limit) => (n_fail as f64 / n as f64) >= limit,
            Self::Count(limit) => n_fail >= limit,
        }
    }
}

impl fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fraction(v) => write!(f, "{v}"),
            Self::Count(v) => write!(f, "{v}"),
        }
    }
}

/// Warn, stop and notify limits for a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warn: Option<ThresholdValue>,
    pub stop: Option<ThresholdValue>,
    pub notify: Option<ThresholdValue>,
}

impl Thresholds {
    /// Builds thresholds from plain numbers (fraction below 1, count otherwise).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stepcheck::core::{Thresholds, ThresholdValue};
    ///
    /// let t = Thresholds::new(Some(0.1), Some(25.0), None).unwrap();
    /// assert_eq!(t.warn, Some(ThresholdValue::Fraction(0.1)));
    /// assert_eq!(t.stop, Some(ThresholdValue::Count(25)));
    /// ```
    pub fn new(warn: Option<f64>, stop: Option<f64>, notify: Option<f64>) -> Result<Self> {
        Ok(Self {
            warn: warn.map(|v| ThresholdValue::parse(v, "warn")).transpose()?,
            stop: stop.map(|v| ThresholdValue::parse(v, "stop")).transpose()?,
            notify: notify.map(|v| ThresholdValue::parse(v, "notify")).transpose()?,
        })
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.warn.is_none() && self.stop.is_none() && self.notify.is_none()
    }

    /// Classifies a step outcome against every configured level.
    pub fn evaluate(&self, n_fail: u64, n: u64) -> ThresholdOutcome {
        let reached = |level: &Option<ThresholdValue>| {
            level.as_ref().map(|v| v.is_reached(n_fail, n))
        };
        ThresholdOutcome {
            warn: reached(&self.warn),
            stop: reached(&self.stop),
            notify: reached(&self.notify),
        }
    }
}

/// The strictest threshold level a step reached.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    #[default]
    Ok,
    NotifyOnly,
    Warn,
    Stop,
}

impl ThresholdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotifyOnly => "notify",
            Self::Warn => "warn",
            Self::Stop => "stop",
        }
    }

    pub fn is_at_least(&self, other: ThresholdStatus) -> bool {
        *self >= other
    }
}

impl fmt::Display for ThresholdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-level results; `None` where the level is not configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOutcome {
    pub warn: Option<bool>,
    pub stop: Option<bool>,
    pub notify: Option<bool>,
}

impl ThresholdOutcome {
    pub fn status(&self) -> ThresholdStatus {
        if self.stop == Some(true) {
            ThresholdStatus::Stop
        } else if self.warn == Some(true) {
            ThresholdStatus::Warn
        } else if self.notify == Some(true) {
            ThresholdStatus::NotifyOnly
        } else {
            ThresholdStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraction_and_count() {
        assert_eq!(
            ThresholdValue::parse(0.25, "warn").unwrap(),
            ThresholdValue::Fraction(0.25)
        );
        assert_eq!(
            ThresholdValue::parse(1.0, "warn").unwrap(),
            ThresholdValue::Count(1)
        );
        assert!(ThresholdValue::parse(1.5, "warn").is_err());
    }

    #[test]
    fn test_fraction_is_inclusive() {
        let t = ThresholdValue::Fraction(0.5);
        assert!(t.is_reached(5, 10));
        assert!(!t.is_reached(4, 10));
    }

    #[test]
    fn test_count_is_inclusive() {
        let t = ThresholdValue::Count(3);
        assert!(t.is_reached(3, 1000));
        assert!(!t.is_reached(2, 3));
    }

    #[test]
    fn test_no_failures_never_reach() {
        assert!(!ThresholdValue::Fraction(0.0).is_reached(0, 10));
        assert!(!ThresholdValue::Count(1).is_reached(0, 0));
        assert!(!ThresholdValue::Fraction(0.0).is_reached(0, 0));
    }

    #[test]
    fn test_strictest_level_wins() {
        let t = Thresholds::new(Some(0.1), Some(0.5), Some(1.0)).unwrap();

        let outcome = t.evaluate(6, 10);
        assert_eq!(outcome.status(), ThresholdStatus::Stop);
        assert_eq!(outcome.warn, Some(true));

        assert_eq!(t.evaluate(2, 10).status(), ThresholdStatus::Warn);

        let notify_only = Thresholds::new(None, None, Some(1.0)).unwrap();
        assert_eq!(notify_only.evaluate(1, 10).status(), ThresholdStatus::NotifyOnly);

        assert_eq!(t.evaluate(0, 10).status(), ThresholdStatus::Ok);
    }

    #[test]
    fn test_unset_levels_are_none() {
        let outcome = Thresholds::none().evaluate(10, 10);
        assert_eq!(outcome, ThresholdOutcome::default());
        assert_eq!(outcome.status(), ThresholdStatus::Ok);
    }

    #[test]
    fn test_status_ordering() {
        assert!(ThresholdStatus::Stop.is_at_least(ThresholdStatus::Warn));
        assert!(ThresholdStatus::Warn > ThresholdStatus::NotifyOnly);
        assert!(!ThresholdStatus::Ok.is_at_least(ThresholdStatus::NotifyOnly));
    }
}
