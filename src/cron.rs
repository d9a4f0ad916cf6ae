//! 6-field cron-like expressions, matched at minute granularity.
//!
//! Field order is `sec min hour day-of-month month day-of-week`, with
//! day-of-week numbered 0-6 from Sunday. Each field accepts a literal
//! number, `*`, a comma list, a numeric range `a-b`, or a step `*/n`.
//! Matching answers "does this wall-clock instant match", not "when is
//! the next occurrence" — the dispatch poller asks once a minute, so
//! evaluation is deliberately coarse.

use crate::error::{ChimeError, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// One field of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldPattern {
    /// `*` — matches any value.
    Any,
    /// A single number.
    Literal(u32),
    /// An inclusive range `a-b`.
    Range(u32, u32),
    /// `*/n` — matches values divisible by `n`.
    Step(u32),
    /// A comma list of literals and ranges.
    List(Vec<FieldPattern>),
}

impl FieldPattern {
    /// Parse one field, validating numbers against `[lo, hi]`.
    fn parse(text: &str, lo: u32, hi: u32) -> Result<Self> {
        if text == "*" {
            return Ok(Self::Any);
        }
        if let Some(step) = text.strip_prefix("*/") {
            let n: u32 = step
                .parse()
                .map_err(|_| bad_field(text, "step must be a number"))?;
            if n == 0 {
                return Err(bad_field(text, "step must be greater than 0"));
            }
            return Ok(Self::Step(n));
        }
        if text.contains(',') {
            let items = text
                .split(',')
                .map(|part| Self::parse_single(part, lo, hi))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::List(items));
        }
        Self::parse_single(text, lo, hi)
    }

    /// Parse a literal or range (the forms allowed inside a comma list).
    fn parse_single(text: &str, lo: u32, hi: u32) -> Result<Self> {
        if let Some((start, end)) = text.split_once('-') {
            let a = parse_bounded(start, lo, hi)?;
            let b = parse_bounded(end, lo, hi)?;
            if a > b {
                return Err(bad_field(text, "range start must be <= end"));
            }
            return Ok(Self::Range(a, b));
        }
        Ok(Self::Literal(parse_bounded(text, lo, hi)?))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(n) => *n == value,
            Self::Range(a, b) => (*a..=*b).contains(&value),
            Self::Step(n) => value % n == 0,
            Self::List(items) => items.iter().any(|item| item.matches(value)),
        }
    }
}

impl std::fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Literal(n) => write!(f, "{n}"),
            Self::Range(a, b) => write!(f, "{a}-{b}"),
            Self::Step(n) => write!(f, "*/{n}"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

fn parse_bounded(text: &str, lo: u32, hi: u32) -> Result<u32> {
    let n: u32 = text
        .trim()
        .parse()
        .map_err(|_| bad_field(text, "expected a number"))?;
    if n < lo || n > hi {
        return Err(bad_field(
            text,
            &format!("value out of range {lo}-{hi}"),
        ));
    }
    Ok(n)
}

fn bad_field(text: &str, reason: &str) -> ChimeError {
    ChimeError::InvalidSchedule(format!("cron field {text:?}: {reason}"))
}

/// A parsed `sec min hour day-of-month month day-of-week` expression.
///
/// Serializes as its canonical string form (fields joined by single
/// spaces), the same shape stored in persisted task records.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CronExpr {
    sec: FieldPattern,
    min: FieldPattern,
    hour: FieldPattern,
    day_of_month: FieldPattern,
    month: FieldPattern,
    day_of_week: FieldPattern,
}

impl CronExpr {
    /// Expression firing once a day at `hour:minute` (`0 m h * * *`).
    pub(crate) fn daily(hour: u32, minute: u32) -> Self {
        Self {
            sec: FieldPattern::Literal(0),
            min: FieldPattern::Literal(minute),
            hour: FieldPattern::Literal(hour),
            day_of_month: FieldPattern::Any,
            month: FieldPattern::Any,
            day_of_week: FieldPattern::Any,
        }
    }

    /// Expression firing once a week on `weekday` (0 = Sunday) at
    /// `hour:minute` (`0 m h * * d`).
    pub(crate) fn weekly(weekday: u32, hour: u32, minute: u32) -> Self {
        Self {
            sec: FieldPattern::Literal(0),
            min: FieldPattern::Literal(minute),
            hour: FieldPattern::Literal(hour),
            day_of_month: FieldPattern::Any,
            month: FieldPattern::Any,
            day_of_week: FieldPattern::Literal(weekday),
        }
    }

    /// Expression firing once a month on `day` at `hour:minute`
    /// (`0 m h D * *`).
    pub(crate) fn monthly(day: u32, hour: u32, minute: u32) -> Self {
        Self {
            sec: FieldPattern::Literal(0),
            min: FieldPattern::Literal(minute),
            hour: FieldPattern::Literal(hour),
            day_of_month: FieldPattern::Literal(day),
            month: FieldPattern::Any,
            day_of_week: FieldPattern::Any,
        }
    }

    /// Returns `true` if `now` matches this expression at minute
    /// granularity.
    ///
    /// The seconds field is validated at parse time but sits below the
    /// one-minute poll resolution, so it is not consulted here: every
    /// 60-second window contains each seconds value exactly once.
    #[must_use]
    pub fn matches(&self, now: &DateTime<Utc>) -> bool {
        self.min.matches(now.minute())
            && self.hour.matches(now.hour())
            && self.day_of_month.matches(now.day())
            && self.month.matches(now.month())
            && self.day_of_week.matches(now.weekday().num_days_from_sunday())
    }
}

impl std::str::FromStr for CronExpr {
    type Err = ChimeError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(ChimeError::InvalidSchedule(format!(
                "cron expression must have 6 fields (sec min hour dom month dow), got {}: {s:?}",
                parts.len()
            )));
        }
        Ok(Self {
            sec: FieldPattern::parse(parts[0], 0, 59)?,
            min: FieldPattern::parse(parts[1], 0, 59)?,
            hour: FieldPattern::parse(parts[2], 0, 23)?,
            day_of_month: FieldPattern::parse(parts[3], 1, 31)?,
            month: FieldPattern::parse(parts[4], 1, 12)?,
            day_of_week: FieldPattern::parse(parts[5], 0, 6)?,
        })
    }
}

impl std::fmt::Display for CronExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.sec, self.min, self.hour, self.day_of_month, self.month, self.day_of_week
        )
    }
}

impl TryFrom<String> for CronExpr {
    type Error = ChimeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CronExpr> for String {
    fn from(expr: CronExpr) -> Self {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        let expr: CronExpr = "0 30 9 * * *".parse().unwrap();
        assert_eq!(expr.to_string(), "0 30 9 * * *");
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        let err = "30 9 * * *".parse::<CronExpr>().unwrap_err();
        assert!(err.to_string().contains("6 fields"));
    }

    #[test]
    fn parse_rejects_out_of_range_literal() {
        let err = "0 61 9 * * *".parse::<CronExpr>().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn parse_rejects_zero_step() {
        let err = "0 */0 * * * *".parse::<CronExpr>().unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn parse_rejects_reversed_range() {
        let err = "0 30-10 * * * *".parse::<CronExpr>().unwrap_err();
        assert!(err.to_string().contains("range start"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("0 banana * * * *".parse::<CronExpr>().is_err());
    }

    #[test]
    fn daily_expression_matches_only_its_minute() {
        let expr = CronExpr::daily(9, 30);
        assert_eq!(expr.to_string(), "0 30 9 * * *");
        // 2025-06-15 is a Sunday.
        assert!(expr.matches(&at(2025, 6, 15, 9, 30, 0)));
        assert!(expr.matches(&at(2025, 6, 15, 9, 30, 59)));
        assert!(!expr.matches(&at(2025, 6, 15, 9, 31, 0)));
        assert!(!expr.matches(&at(2025, 6, 15, 10, 30, 0)));
    }

    #[test]
    fn weekly_expression_checks_day_of_week() {
        let expr = CronExpr::weekly(0, 17, 0);
        assert_eq!(expr.to_string(), "0 0 17 * * 0");
        assert!(expr.matches(&at(2025, 6, 15, 17, 0, 0))); // Sunday
        assert!(!expr.matches(&at(2025, 6, 16, 17, 0, 0))); // Monday
    }

    #[test]
    fn monthly_expression_checks_day_of_month() {
        let expr = CronExpr::monthly(15, 8, 0);
        assert_eq!(expr.to_string(), "0 0 8 15 * *");
        assert!(expr.matches(&at(2025, 6, 15, 8, 0, 0)));
        assert!(!expr.matches(&at(2025, 6, 16, 8, 0, 0)));
    }

    #[test]
    fn range_field_matches_inclusive_bounds() {
        let expr: CronExpr = "0 0 9-17 * * *".parse().unwrap();
        assert!(expr.matches(&at(2025, 6, 15, 9, 0, 0)));
        assert!(expr.matches(&at(2025, 6, 15, 17, 0, 0)));
        assert!(!expr.matches(&at(2025, 6, 15, 18, 0, 0)));
    }

    #[test]
    fn list_field_matches_any_element() {
        let expr: CronExpr = "0 0,30 * * * *".parse().unwrap();
        assert!(expr.matches(&at(2025, 6, 15, 12, 0, 0)));
        assert!(expr.matches(&at(2025, 6, 15, 12, 30, 0)));
        assert!(!expr.matches(&at(2025, 6, 15, 12, 15, 0)));
    }

    #[test]
    fn list_may_mix_literals_and_ranges() {
        let expr: CronExpr = "0 0 8,12-14 * * *".parse().unwrap();
        assert!(expr.matches(&at(2025, 6, 15, 8, 0, 0)));
        assert!(expr.matches(&at(2025, 6, 15, 13, 0, 0)));
        assert!(!expr.matches(&at(2025, 6, 15, 10, 0, 0)));
        assert_eq!(expr.to_string(), "0 0 8,12-14 * * *");
    }

    #[test]
    fn step_field_matches_divisible_values() {
        let expr: CronExpr = "0 */15 * * * *".parse().unwrap();
        assert!(expr.matches(&at(2025, 6, 15, 12, 0, 0)));
        assert!(expr.matches(&at(2025, 6, 15, 12, 45, 0)));
        assert!(!expr.matches(&at(2025, 6, 15, 12, 20, 0)));
    }

    #[test]
    fn seconds_field_sits_below_poll_granularity() {
        // A nonzero seconds field parses but cannot constrain matching.
        let expr: CronExpr = "30 30 9 * * *".parse().unwrap();
        assert!(expr.matches(&at(2025, 6, 15, 9, 30, 0)));
    }

    #[test]
    fn serde_round_trips_as_string() {
        let expr: CronExpr = "0 30 9 * * 1-5".parse().unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, "\"0 30 9 * * 1-5\"");
        let restored: CronExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, expr);
    }

    #[test]
    fn serde_rejects_malformed_string() {
        assert!(serde_json::from_str::<CronExpr>("\"not a cron\"").is_err());
    }
}
