//! Age thresholds shared by the time-based rules.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DetoxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgeUnit {
    Hours,
    Days,
    Years,
}

impl AgeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            AgeUnit::Hours => "h",
            AgeUnit::Days => "d",
            AgeUnit::Years => "y",
        }
    }
}

impl fmt::Display for AgeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for AgeUnit {
    type Err = DetoxError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "h" => Ok(AgeUnit::Hours),
            "d" => Ok(AgeUnit::Days),
            "y" => Ok(AgeUnit::Years),
            other => Err(DetoxError::InvalidUnit(other.to_string())),
        }
    }
}

impl TryFrom<String> for AgeUnit {
    type Error = DetoxError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgeUnit> for String {
    fn from(unit: AgeUnit) -> Self {
        unit.suffix().to_string()
    }
}

/// Convert an amount of `unit` to seconds (a year is 365 days).
pub fn threshold_seconds(amount: f64, unit: AgeUnit) -> f64 {
    let mut seconds = amount;
    if unit == AgeUnit::Years {
        seconds *= 365.0;
    }
    if matches!(unit, AgeUnit::Years | AgeUnit::Days) {
        seconds *= 24.0;
    }
    seconds * 3600.0
}

/// Instant `amount` units before `now`.
///
/// Fails for negative or non-finite amounts and for thresholds reaching
/// outside the representable date range.
pub fn cutoff_time(amount: f64, unit: AgeUnit, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(DetoxError::InvalidConfig(format!(
            "Age threshold must be a non-negative number, got {}{}",
            amount, unit
        )));
    }

    let millis = (threshold_seconds(amount, unit) * 1000.0).round();
    let out_of_range =
        || DetoxError::InvalidConfig(format!("Age threshold {}{} is out of range", amount, unit));
    if millis >= i64::MAX as f64 {
        return Err(out_of_range());
    }

    Duration::try_milliseconds(millis as i64)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or_else(out_of_range)
}

/// Calendar date (UTC) `amount` units before `now`.
pub fn cutoff_date(amount: f64, unit: AgeUnit, now: DateTime<Utc>) -> Result<NaiveDate> {
    Ok(cutoff_time(amount, unit, now)?.date_naive())
}

/// A precomputed cutoff date with its human-readable threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeCutoff {
    pub cutoff: NaiveDate,
    /// Threshold as written in reasons, e.g. `90.0d`
    pub text: String,
}

impl AgeCutoff {
    pub fn new(amount: f64, unit: AgeUnit, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            cutoff: cutoff_date(amount, unit, now)?,
            text: format!("{:.1}{}", amount, unit),
        })
    }
}
