//! Natural-language schedule phrases and the timing descriptors they
//! produce.
//!
//! Five phrase templates are recognised, tried in a fixed order with
//! the first match winning. Matching is case-insensitive on trimmed
//! input. Anything else is an [`ChimeError::InvalidSchedule`] whose
//! message lists the accepted templates.

use crate::cron::CronExpr;
use crate::error::{ChimeError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// The accepted phrase templates, in the order they are tried.
pub const SCHEDULE_FORMATS: &str = "at <YYYY-MM-DD HH:MM>, every <N> <minutes|hours|days>, \
daily at <H:MM>, weekly on <weekday> at <H:MM>, monthly on <day-of-month> at <H:MM>";

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// When a task fires, with the payload its type needs.
///
/// Serialized flattened into the task record: the `type` tag plus the
/// one payload field that applies (`datetime`, `interval`, or `cron`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Timing {
    /// Fires at most once, at a specific instant.
    OneTime {
        /// Target instant (UTC).
        datetime: DateTime<Utc>,
    },
    /// Fires repeatedly at a fixed interval while enabled.
    Heartbeat {
        /// Interval between fires, in milliseconds.
        interval: u64,
    },
    /// Fires when the wall clock matches a cron-like expression,
    /// checked at one-minute granularity.
    Recurring {
        /// 6-field expression, `sec min hour dom month dow`.
        cron: CronExpr,
    },
}

impl Timing {
    /// The wire-format type tag (`one-time`, `heartbeat`, `recurring`).
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::OneTime { .. } => "one-time",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Recurring { .. } => "recurring",
        }
    }
}

impl std::fmt::Display for Timing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneTime { datetime } => {
                write!(f, "once at {} UTC", datetime.format("%Y-%m-%d %H:%M"))
            }
            Self::Heartbeat { interval } => {
                let mins = interval / MINUTE_MS;
                if mins >= 1440 && mins % 1440 == 0 {
                    write!(f, "every {} days", mins / 1440)
                } else if mins >= 60 && mins % 60 == 0 {
                    write!(f, "every {} hours", mins / 60)
                } else {
                    write!(f, "every {mins} minutes")
                }
            }
            Self::Recurring { cron } => write!(f, "cron {cron}"),
        }
    }
}

/// Parse a schedule phrase into a [`Timing`] descriptor.
///
/// # Errors
///
/// Returns [`ChimeError::InvalidSchedule`] when the phrase matches no
/// accepted template; the message lists all five templates so front
/// ends can surface them directly.
pub fn parse_schedule(phrase: &str) -> Result<Timing> {
    let text = phrase.trim();
    let lower = text.to_lowercase();

    let parsed = if let Some(rest) = lower.strip_prefix("at ") {
        parse_one_time(rest.trim())
    } else if let Some(rest) = lower.strip_prefix("every ") {
        parse_heartbeat(rest.trim())
    } else if let Some(rest) = lower.strip_prefix("daily at ") {
        parse_clock(rest.trim()).map(|(hour, min)| Timing::Recurring {
            cron: CronExpr::daily(hour, min),
        })
    } else if let Some(rest) = lower.strip_prefix("weekly on ") {
        parse_weekly(rest.trim())
    } else if let Some(rest) = lower.strip_prefix("monthly on ") {
        parse_monthly(rest.trim())
    } else {
        None
    };

    parsed.ok_or_else(|| {
        ChimeError::InvalidSchedule(format!("{text:?} (accepted: {SCHEDULE_FORMATS})"))
    })
}

/// `<YYYY-MM-DD HH:MM>`, interpreted as UTC.
fn parse_one_time(rest: &str) -> Option<Timing> {
    let naive = NaiveDateTime::parse_from_str(rest, "%Y-%m-%d %H:%M").ok()?;
    Some(Timing::OneTime {
        datetime: naive.and_utc(),
    })
}

/// `<N> <minutes|hours|days>` with N >= 1.
fn parse_heartbeat(rest: &str) -> Option<Timing> {
    let mut words = rest.split_whitespace();
    let count: u64 = words.next()?.parse().ok()?;
    let unit = words.next()?;
    if words.next().is_some() || count == 0 {
        return None;
    }
    let unit_ms = match unit {
        "minute" | "minutes" => MINUTE_MS,
        "hour" | "hours" => HOUR_MS,
        "day" | "days" => DAY_MS,
        _ => return None,
    };
    let interval = count.checked_mul(unit_ms)?;
    Some(Timing::Heartbeat { interval })
}

/// `<weekday> at <H:MM>` with full or three-letter weekday names.
fn parse_weekly(rest: &str) -> Option<Timing> {
    let (day, clock) = rest.split_once(" at ")?;
    let weekday = weekday_number(day.trim())?;
    let (hour, min) = parse_clock(clock.trim())?;
    Some(Timing::Recurring {
        cron: CronExpr::weekly(weekday, hour, min),
    })
}

/// `<day-of-month> at <H:MM>` with the day in 1-31.
fn parse_monthly(rest: &str) -> Option<Timing> {
    let (day, clock) = rest.split_once(" at ")?;
    let day: u32 = day.trim().parse().ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }
    let (hour, min) = parse_clock(clock.trim())?;
    Some(Timing::Recurring {
        cron: CronExpr::monthly(day, hour, min),
    })
}

/// `H:MM` 24-hour clock.
fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let (hour, min) = text.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let min: u32 = min.trim().parse().ok()?;
    if hour > 23 || min > 59 {
        return None;
    }
    Some((hour, min))
}

/// Cron day-of-week number, 0 = Sunday. Input is already lowercased.
fn weekday_number(name: &str) -> Option<u32> {
    match name {
        "sunday" | "sun" => Some(0),
        "monday" | "mon" => Some(1),
        "tuesday" | "tue" => Some(2),
        "wednesday" | "wed" => Some(3),
        "thursday" | "thu" => Some(4),
        "friday" | "fri" => Some(5),
        "saturday" | "sat" => Some(6),
        _ => None,
    }
}
