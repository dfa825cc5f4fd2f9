//! Billing-date generation for recurring subscriptions.
//!
//! Generation is pure and restartable: occurrence `i` is always computed from
//! the start date directly, never from occurrence `i - 1`, so a month-end start
//! (e.g. the 31st) is clamped only in the short months and restored afterwards.

use crate::EngineError;
use chrono::{DateTime, Days, Duration, LocalResult, Months, NaiveDateTime, Offset, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a subscription bills.
///
/// Values read from storage that are not one of the known periods
/// deserialize to [`BillingPeriod::Unknown`] instead of failing the whole
/// record; such subscriptions generate no occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BillingPeriod {
    Weekly,
    Monthly,
    Yearly,
    Unknown,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Weekly => "weekly",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
            BillingPeriod::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, BillingPeriod::Unknown)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = EngineError;

    /// Strict parse, used for user input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(BillingPeriod::Weekly),
            "monthly" => Ok(BillingPeriod::Monthly),
            "yearly" => Ok(BillingPeriod::Yearly),
            _ => Err(EngineError::InvalidPeriod(s.to_string())),
        }
    }
}

impl From<String> for BillingPeriod {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(BillingPeriod::Unknown)
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.as_str().to_string()
    }
}

/// Number of occurrences pre-materialized per period when a subscription is
/// scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadWindow {
    pub weekly: usize,
    pub monthly: usize,
    pub yearly: usize,
}

impl LookaheadWindow {
    pub fn count_for(&self, period: BillingPeriod) -> usize {
        match period {
            BillingPeriod::Weekly => self.weekly,
            BillingPeriod::Monthly => self.monthly,
            BillingPeriod::Yearly => self.yearly,
            BillingPeriod::Unknown => 0,
        }
    }
}

impl Default for LookaheadWindow {
    /// Roughly one quarter of weekly and monthly charges, one yearly charge.
    fn default() -> Self {
        Self {
            weekly: 13,
            monthly: 3,
            yearly: 1,
        }
    }
}

/// Generate up to `max_count` billing dates starting at (and including) `start`.
///
/// - weekly: `start + 7·i` days
/// - monthly: `start` advanced by `i` calendar months, keeping the day of month
///   (clamped to the last day of shorter months)
/// - yearly: `start` advanced by `i` calendar years
///
/// Steps are taken on the wall clock of `Tz`, so the time of day is kept
/// across DST changes. A wall time repeated by a backward change resolves to
/// its first instant; one skipped by a forward change is read with the offset
/// in force before the gap (02:30 in a 02:00-03:00 gap becomes 03:30).
///
/// An unknown period yields an empty sequence.
///
/// # Examples
///
/// ```rust
/// use budgetbot_engine::{generate_billing_dates, BillingPeriod};
/// use chrono::{TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2023, 1, 15, 9, 0, 0).unwrap();
/// let dates = generate_billing_dates(BillingPeriod::Monthly, start, 2);
/// assert_eq!(dates[1], Utc.with_ymd_and_hms(2023, 2, 15, 9, 0, 0).unwrap());
/// ```
pub fn generate_billing_dates<Tz: TimeZone>(
    period: BillingPeriod,
    start: DateTime<Tz>,
    max_count: usize,
) -> Vec<DateTime<Tz>> {
    if !period.is_known() {
        return Vec::new();
    }

    let tz = start.timezone();
    let wall = start.naive_local();
    let count = u32::try_from(max_count).unwrap_or(u32::MAX);
    (0..count)
        .map_while(|i| {
            if i == 0 {
                return Some(start.clone());
            }
            let next = match period {
                BillingPeriod::Weekly => wall.checked_add_days(Days::new(7 * u64::from(i))),
                BillingPeriod::Monthly => wall.checked_add_months(Months::new(i)),
                BillingPeriod::Yearly => i
                    .checked_mul(12)
                    .and_then(|months| wall.checked_add_months(Months::new(months))),
                BillingPeriod::Unknown => None,
            }?;
            resolve_wall_time(&tz, next)
        })
        .collect()
}

/// Map a wall-clock time onto an instant in `tz`.
fn resolve_wall_time<Tz: TimeZone>(tz: &Tz, wall: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            // Gaps are at most a few hours; a day earlier is safely outside it.
            let before = wall.checked_sub_days(Days::new(1))?;
            let offset = tz.from_local_datetime(&before).earliest()?.offset().fix();
            let utc = wall.checked_sub_signed(Duration::seconds(i64::from(
                offset.local_minus_utc(),
            )))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}
