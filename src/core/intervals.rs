use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::types::{TimeInterval, ValidationError};

/// Time series granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ValidationError::InvalidParameter(format!(
                "frequency must be 'weekly' or 'monthly', got '{}'",
                other
            ))),
        }
    }
}

/// Partition `[start, end]` into ordered, non-overlapping windows.
///
/// Weekly windows are always 7 days long, so the last one may run past `end`.
/// Monthly windows stop at the end of each calendar month and are clamped to
/// `end`. An inverted range yields no windows.
pub fn generate_intervals(start: NaiveDate, end: NaiveDate, frequency: Frequency) -> Vec<TimeInterval> {
    let mut intervals = Vec::new();
    let mut cursor = start;

    while cursor <= end {
        match frequency {
            Frequency::Weekly => {
                let window_end = cursor
                    .checked_add_signed(Duration::days(6))
                    .unwrap_or(NaiveDate::MAX);
                intervals.push(TimeInterval::new(cursor, window_end));
                cursor = match cursor.checked_add_signed(Duration::days(7)) {
                    Some(next) => next,
                    None => break,
                };
            }
            Frequency::Monthly => {
                let window_end = last_day_of_month(cursor).min(end);
                intervals.push(TimeInterval::new(cursor, window_end));
                cursor = match window_end.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
            }
        }
    }

    intervals
}

/// Last calendar day of the month containing `date`
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}
