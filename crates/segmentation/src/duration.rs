//! ISO-8601 durations (`[+-]P…Y…M…W…DT…H…M…S`) and their calendar-aware
//! application to epoch instants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SegmentationError, SegmentationResult};

static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    let n = r"([0-9]+(?:[.,][0-9]*)?)";
    Regex::new(&format!(
        r"^([+-])?P(?:{n}Y)?(?:{n}M)?(?:{n}W)?(?:{n}D)?(?:T(?:{n}H)?(?:{n}M)?(?:{n}S)?)?$"
    ))
    .unwrap()
});

const MS_PER_SECOND: f64 = 1_000.0;
const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

/// A parsed ISO-8601 duration. Components are kept as written, fractional
/// parts included; equality is component-wise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iso8601Duration {
    pub positive: bool,
    pub years: f64,
    pub months: f64,
    pub weeks: f64,
    pub days: f64,
    pub hours: f64,
    pub minutes: f64,
    pub seconds: f64,
}

impl Iso8601Duration {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        positive: bool,
        years: f64,
        months: f64,
        weeks: f64,
        days: f64,
        hours: f64,
        minutes: f64,
        seconds: f64,
    ) -> Self {
        Self {
            positive,
            years,
            months,
            weeks,
            days,
            hours,
            minutes,
            seconds,
        }
    }

    pub fn parse(input: &str) -> SegmentationResult<Self> {
        let captures = DURATION_REGEX.captures(input).ok_or_else(|| {
            SegmentationError::bad_input(format!("invalid ISO 8601 duration \"{input}\""))
        })?;
        let part = |index: usize| -> f64 {
            captures
                .get(index)
                .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        Ok(Self {
            positive: captures.get(1).map_or(true, |sign| sign.as_str() != "-"),
            years: part(2),
            months: part(3),
            weeks: part(4),
            days: part(5),
            hours: part(6),
            minutes: part(7),
            seconds: part(8),
        })
    }

    /// The same duration pointing the other way in time.
    pub fn negated(&self) -> Self {
        Self {
            positive: !self.positive,
            ..*self
        }
    }

    /// Shifts `epoch_millis` by this duration in the UTC calendar.
    ///
    /// Whole years and months are calendar additions (the day of month is
    /// clamped to the target month's length). Fractions cascade into the next
    /// smaller unit: a fraction of a year becomes months, a fraction of a
    /// month becomes days of the month reached so far. Everything from days
    /// down is added as a fixed number of milliseconds.
    pub fn apply_to(&self, epoch_millis: i64) -> i64 {
        let Some(start) = Utc.timestamp_millis_opt(epoch_millis).single() else {
            return epoch_millis;
        };
        let sign: i64 = if self.positive { 1 } else { -1 };

        let years_int = self.years.trunc();
        let mut date = shift_months(start, sign.saturating_mul((years_int as i64).saturating_mul(12)));
        let mut remainder = (self.years - years_int) * 12.0;

        let months_total = self.months + remainder;
        let months_int = months_total.trunc();
        date = shift_months(date, sign.saturating_mul(months_int as i64));
        remainder = (months_total - months_int) * f64::from(days_in_month(&date));

        let days_total = self.days + self.weeks * 7.0 + remainder;
        let days_int = days_total.trunc();
        remainder = (days_total - days_int) * 24.0;

        let hours_total = self.hours + remainder;
        let hours_int = hours_total.trunc();
        remainder = (hours_total - hours_int) * 60.0;

        let minutes_total = self.minutes + remainder;
        let minutes_int = minutes_total.trunc();
        remainder = (minutes_total - minutes_int) * 60.0;

        let seconds_total = self.seconds + remainder;
        let seconds_int = seconds_total.trunc();
        let millis = ((seconds_total - seconds_int) * MS_PER_SECOND).round();

        let offset = days_int * MS_PER_DAY
            + hours_int * MS_PER_HOUR
            + minutes_int * MS_PER_MINUTE
            + seconds_int * MS_PER_SECOND
            + millis;
        date.timestamp_millis()
            .saturating_add(sign.saturating_mul(offset as i64))
    }
}

fn shift_months(date: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let shifted = u32::try_from(months.unsigned_abs())
        .ok()
        .and_then(|count| {
            if months >= 0 {
                date.checked_add_months(Months::new(count))
            } else {
                date.checked_sub_months(Months::new(count))
            }
        });
    shifted.unwrap_or(if months >= 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

fn days_in_month(date: &DateTime<Utc>) -> u32 {
    let (year, month) = (date.year(), date.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}

impl FromStr for Iso8601Duration {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Iso8601Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}P{}Y{}M{}W{}DT{}H{}M{}S",
            if self.positive { '+' } else { '-' },
            self.years,
            self.months,
            self.weeks,
            self.days,
            self.hours,
            self.minutes,
            self.seconds
        )
    }
}
