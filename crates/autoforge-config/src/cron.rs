//! Cron expressions.
//!
//! Five space-separated fields: `minute hour day-of-month month day-of-week`.
//! Each field accepts `*`, numbers, `a-b` ranges, `*/n` or `a-b/n` steps and
//! comma-separated lists. Months accept `jan`..`dec`, weekdays `sun`..`sat`
//! (0 and 7 are both Sunday). When both day fields are restricted a day
//! matches if either does.

use chrono::{
    DateTime, Datelike, LocalResult, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone,
    Timelike,
};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches before giving up.
const SEARCH_HORIZON_DAYS: i64 = 366 * 5;

/// Bit set of allowed values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1 << value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the given local wall-clock minute matches.
    pub fn matches(&self, at: &NaiveDateTime) -> bool {
        self.minutes.contains(at.minute())
            && self.hours.contains(at.hour())
            && self.months.contains(at.month())
            && self.day_matches(at.date())
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }

    /// First matching minute strictly after `after`, evaluated in `after`'s timezone.
    ///
    /// Local times that do not exist (DST gaps) are skipped; for ambiguous
    /// local times the earlier instant is used.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.naive_local().with_second(0)?.with_nanosecond(0)?;
        let limit = start + TimeDelta::days(SEARCH_HORIZON_DAYS);
        let mut local = start + TimeDelta::minutes(1);

        while local <= limit {
            if !self.months.contains(local.month()) {
                let first = local.date().with_day(1)?.checked_add_months(Months::new(1))?;
                local = first.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(local.date()) {
                local = local.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(local.hour()) {
                local = local.date().and_hms_opt(local.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(local.minute()) {
                local += TimeDelta::minutes(1);
                continue;
            }

            let candidate = match tz.from_local_datetime(&local) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            };
            if let Some(dt) = candidate.filter(|dt| dt > after) {
                return Some(dt);
            }
            local += TimeDelta::minutes(1);
        }

        None
    }
}

impl FromStr for CronExpr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                s,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }

        let minutes = parse_field(s, fields[0], 0, 59, &[])?;
        let hours = parse_field(s, fields[1], 0, 23, &[])?;
        let days_of_month = parse_field(s, fields[2], 1, 31, &[])?;
        let months = parse_field(s, fields[3], 1, 12, &MONTH_NAMES)?;
        let mut days_of_week = parse_field(s, fields[4], 0, 7, &WEEKDAY_NAMES)?;

        // 7 is an alias for Sunday
        if days_of_week.contains(7) {
            days_of_week.insert(0);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(expr: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidCron {
        expr: expr.to_string(),
        message: message.into(),
    }
}

fn parse_field(expr: &str, field: &str, min: u32, max: u32, names: &[&str]) -> Result<FieldSet, ConfigError> {
    let mut set = FieldSet(0);

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(expr, format!("invalid step '{}'", step)))?;
                if step == 0 {
                    return Err(invalid(expr, "step must be positive"));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                parse_value(expr, a, min, names)?,
                parse_value(expr, b, min, names)?,
            )
        } else {
            let value = parse_value(expr, range, min, names)?;
            // `5/15` means "from 5 to the end, every 15"
            if step.is_some() { (value, max) } else { (value, value) }
        };

        if start < min || end > max || start > end {
            return Err(invalid(
                expr,
                format!("'{}' is outside {}-{}", part, min, max),
            ));
        }

        let step = step.unwrap_or(1) as usize;
        for value in (start..=end).step_by(step) {
            set.insert(value);
        }
    }

    Ok(set)
}

fn parse_value(expr: &str, token: &str, min: u32, names: &[&str]) -> Result<u32, ConfigError> {
    if let Ok(value) = token.parse::<u32>() {
        return Ok(value);
    }

    let lower = token.to_ascii_lowercase();
    names
        .iter()
        .position(|name| *name == lower)
        .map(|idx| idx as u32 + min)
        .ok_or_else(|| invalid(expr, format!("invalid value '{}'", token)))
}
