//! Cron schedule evaluator.
//! Supports the classic 5-field form: "MIN HOUR DOM MON DOW".
//! Field grammar: `*`, `*/N`, `N`, `N-M`, `N-M/S`, and comma lists of those.
//!
//! Evaluation is minute-resolution and best-effort: an expression fires when
//! every field matches the current minute and that minute was not already
//! fired. If the poll cadence skips a minute, that minute is simply missed —
//! there is no catch-up.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerraclawError};

/// Minutes since the Unix epoch — the de-duplication token for firing.
pub fn epoch_minute(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

/// Bounds for each of the five cron fields, in order.
const FIELD_BOUNDS: [(u32, u32, &str); 5] = [
    (0, 59, "minute"),
    (0, 23, "hour"),
    (1, 31, "day-of-month"),
    (1, 12, "month"),
    (0, 6, "day-of-week"),
];

/// A parsed 5-field cron expression.
///
/// Each field is kept as the sorted set of matching values; `*` expands to
/// the full range. Day-of-week uses 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronExpr {
    /// The original expression text, for display and persistence.
    pub text: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
}

impl CronExpr {
    /// Parse and range-check a cron expression.
    /// Malformed input is rejected here, before it can ever be scheduled.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(TerraclawError::Validation(format!(
                "invalid cron expression '{expression}': need 5 fields (MIN HOUR DOM MON DOW), got {}",
                parts.len()
            )));
        }

        let mut fields: Vec<Vec<u32>> = Vec::with_capacity(5);
        for (part, (min, max, label)) in parts.iter().copied().zip(FIELD_BOUNDS) {
            let values = parse_field(part, min, max).map_err(|cause| {
                TerraclawError::Validation(format!(
                    "invalid cron expression '{expression}': {label} field '{part}': {cause}"
                ))
            })?;
            fields.push(values);
        }

        let mut it = fields.into_iter();
        Ok(Self {
            text: expression.to_string(),
            minutes: it.next().unwrap_or_default(),
            hours: it.next().unwrap_or_default(),
            days_of_month: it.next().unwrap_or_default(),
            months: it.next().unwrap_or_default(),
            days_of_week: it.next().unwrap_or_default(),
        })
    }

    /// True when every field matches `at` truncated to the minute.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minutes.contains(&at.minute())
            && self.hours.contains(&at.hour())
            && self.days_of_month.contains(&at.day())
            && self.months.contains(&at.month())
            && self.days_of_week.contains(&at.weekday().num_days_from_sunday())
    }
}

/// Parse a single cron field into the sorted, deduplicated set of values.
fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<Vec<u32>, String> {
    if field.is_empty() {
        return Err("empty field".into());
    }

    let mut values = Vec::new();
    for part in field.split(',') {
        expand_part(part.trim(), min, max, &mut values)?;
    }
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

/// Expand one comma-separated element: `*`, `*/N`, `N`, `N-M`, or `N-M/S`.
fn expand_part(
    part: &str,
    min: u32,
    max: u32,
    out: &mut Vec<u32>,
) -> std::result::Result<(), String> {
    let (base, step) = match part.split_once('/') {
        Some((b, s)) => {
            let step: u32 = s.parse().map_err(|_| format!("bad step '{s}'"))?;
            if step == 0 {
                return Err("step must be non-zero".into());
            }
            (b, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if base == "*" {
        (min, max)
    } else if let Some((a, b)) = base.split_once('-') {
        let lo: u32 = a.parse().map_err(|_| format!("bad range start '{a}'"))?;
        let hi: u32 = b.parse().map_err(|_| format!("bad range end '{b}'"))?;
        if lo > hi {
            return Err(format!("range {lo}-{hi} is inverted"));
        }
        (lo, hi)
    } else {
        let n: u32 = base.parse().map_err(|_| format!("bad value '{base}'"))?;
        (n, n)
    };

    if lo < min || hi > max {
        return Err(format!("value out of range (allowed {min}-{max})"));
    }

    out.extend((lo..=hi).step_by(step as usize));
    Ok(())
}

/// An ordered, possibly empty set of cron expressions with OR semantics:
/// any member expression firing causes the set to fire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSet {
    exprs: Vec<CronExpr>,
}

impl ScheduleSet {
    /// Parse a list of expression strings. Any malformed entry rejects the
    /// whole set — the caller disables this workspace's schedule, not the daemon.
    pub fn parse(expressions: &[String]) -> Result<Self> {
        let exprs = expressions
            .iter()
            .map(|e| CronExpr::parse(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { exprs })
    }

    /// Number of expressions in the set.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// True when the set has no expressions (it can never fire).
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Expression texts, in definition order.
    pub fn texts(&self) -> Vec<&str> {
        self.exprs.iter().map(|e| e.text.as_str()).collect()
    }

    /// Decide whether this set fires at `now`.
    ///
    /// Returns the matched epoch-minute when any expression matches and that
    /// minute differs from `last_fired_minute`. Successive polls inside one
    /// matched minute therefore fire at most once, and two expressions
    /// matching the same minute produce a single fire.
    pub fn should_fire(&self, now: DateTime<Utc>, last_fired_minute: Option<i64>) -> Option<i64> {
        let minute = epoch_minute(now);
        if last_fired_minute == Some(minute) {
            return None;
        }
        if self.exprs.iter().any(|e| e.matches(now)) {
            Some(minute)
        } else {
            None
        }
    }
}
