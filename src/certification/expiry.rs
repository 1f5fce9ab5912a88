//! Certificate expiry policies.
//!
//! A policy is attached to a course or a certification level and turned into
//! a concrete expiry instant when a certificate is issued or a level is
//! unlocked. Month and year periods use calendar arithmetic, so adding one
//! month to Jan 31 lands on the last day of February instead of overflowing
//! into March.

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

pub const MODE_NEVER: &str = "never";
pub const MODE_FIXED_DATE: &str = "fixed_date";
pub const MODE_PERIOD_DAYS: &str = "period_days";
pub const MODE_PERIOD_MONTHS: &str = "period_months";
pub const MODE_PERIOD_YEARS: &str = "period_years";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExpiryPolicy {
    Never,
    FixedDate { at: DateTime<Utc> },
    PeriodDays { days: i32 },
    PeriodMonths { months: i32 },
    PeriodYears { years: i32 },
}

impl ExpiryPolicy {
    /// Decode the three policy columns stored on courses and levels.
    ///
    /// Unknown modes and a fixed-date mode without a date degrade to `Never`;
    /// a period mode without a stored value keeps a zero period, which
    /// `compute_expiry` already treats as "no expiry".
    pub fn from_columns(
        mode: &str,
        value: Option<i32>,
        fixed_at: Option<DateTime<Utc>>,
    ) -> ExpiryPolicy {
        match mode {
            MODE_FIXED_DATE => match fixed_at {
                Some(at) => ExpiryPolicy::FixedDate { at },
                None => ExpiryPolicy::Never,
            },
            MODE_PERIOD_DAYS => ExpiryPolicy::PeriodDays {
                days: value.unwrap_or(0),
            },
            MODE_PERIOD_MONTHS => ExpiryPolicy::PeriodMonths {
                months: value.unwrap_or(0),
            },
            MODE_PERIOD_YEARS => ExpiryPolicy::PeriodYears {
                years: value.unwrap_or(0),
            },
            _ => ExpiryPolicy::Never,
        }
    }

    /// Encode back into the (mode, value, fixed_at) column triple.
    pub fn as_columns(&self) -> (&'static str, Option<i32>, Option<DateTime<Utc>>) {
        match *self {
            ExpiryPolicy::Never => (MODE_NEVER, None, None),
            ExpiryPolicy::FixedDate { at } => (MODE_FIXED_DATE, None, Some(at)),
            ExpiryPolicy::PeriodDays { days } => (MODE_PERIOD_DAYS, Some(days), None),
            ExpiryPolicy::PeriodMonths { months } => (MODE_PERIOD_MONTHS, Some(months), None),
            ExpiryPolicy::PeriodYears { years } => (MODE_PERIOD_YEARS, Some(years), None),
        }
    }
}

/// Compute the expiry instant for `policy` relative to `reference`.
///
/// `None` means the certificate never expires. A fixed date is returned as-is
/// even when it already lies in the past; a period with a non-positive value
/// is treated as "no expiry" rather than an error.
pub fn compute_expiry(policy: &ExpiryPolicy, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match *policy {
        ExpiryPolicy::Never => None,
        ExpiryPolicy::FixedDate { at } => Some(at),
        ExpiryPolicy::PeriodDays { days } if days > 0 => {
            reference.checked_add_days(Days::new(days as u64))
        }
        ExpiryPolicy::PeriodMonths { months } if months > 0 => {
            reference.checked_add_months(Months::new(months as u32))
        }
        ExpiryPolicy::PeriodYears { years } if years > 0 => {
            reference.checked_add_months(Months::new(years as u32 * 12))
        }
        _ => None,
    }
}
