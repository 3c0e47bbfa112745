//! Schedule grammar and next-firing computation.
//!
//! Accepted forms:
//! - aliases: `hourly`, `daily`, `midnight`, `weekly`, `monthly`, `yearly`,
//!   `annually` (a leading `@` is optional)
//! - fixed interval: `every 5m` or `@every 30s`
//! - one-shot: `at 2026-01-12T18:00:00Z`
//! - cron: 5 fields (`min hour dom month dow`, crontab weekdays 0-7 from
//!   Sunday), 6 fields (with seconds) or 7 fields (with year)
//!
//! Aliases and cron expressions may carry a ` tz=<IANA zone>` suffix.

use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    Error, Result,
    parse::{parse_duration, parse_timestamp},
};

const TZ_PREFIX: &str = "tz=";

#[derive(Debug, Clone)]
enum Recurrence {
    At(DateTime<Utc>),
    Every(Duration),
    Cron {
        schedule: Box<cron::Schedule>,
        tz: Option<chrono_tz::Tz>,
    },
}

/// A parsed recurrence specification.
#[derive(Debug, Clone)]
pub struct Schedule {
    source: String,
    recurrence: Recurrence,
}

impl Schedule {
    /// Parse a schedule string, failing with [`Error::InvalidSchedule`].
    pub fn parse(input: &str) -> Result<Self> {
        let source = input.trim();
        if source.is_empty() {
            return Err(Error::invalid_schedule(input, "empty schedule"));
        }
        let recurrence = parse_recurrence(source)
            .map_err(|reason| Error::invalid_schedule(source, reason))?;
        Ok(Self {
            source: source.to_string(),
            recurrence,
        })
    }

    /// The schedule exactly as it was written (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the schedule fires at most once.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        matches!(self.recurrence, Recurrence::At(_))
    }

    /// The first firing strictly after `after`, or `None` once exhausted.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.recurrence {
            Recurrence::At(at) => (*at > after).then_some(*at),
            Recurrence::Every(every) => {
                let every = chrono::Duration::from_std(*every).ok()?;
                after.checked_add_signed(every)
            },
            Recurrence::Cron { schedule, tz } => match tz {
                Some(tz) => schedule
                    .after(&after.with_timezone(tz))
                    .next()
                    .map(|dt| dt.with_timezone(&Utc)),
                None => schedule.after(&after).next(),
            },
        }
    }

    /// Up to `count` consecutive firings after `after`.
    #[must_use]
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = after;
        while out.len() < count {
            match self.next_after(cursor) {
                Some(next) => {
                    out.push(next);
                    cursor = next;
                },
                None => break,
            }
        }
        out
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_recurrence(source: &str) -> std::result::Result<Recurrence, String> {
    let lower = source.to_ascii_lowercase();

    if let Some(rest) = lower
        .strip_prefix("@every ")
        .or_else(|| lower.strip_prefix("every "))
    {
        let every = parse_duration(rest).map_err(|e| e.to_string())?;
        return Ok(Recurrence::Every(every));
    }

    if let Some(rest) = lower.strip_prefix("at ") {
        // Timestamps are case-sensitive ("T", "Z"), so slice the original.
        let raw = &source[source.len() - rest.len()..];
        let at = parse_timestamp(raw).map_err(|e| e.to_string())?;
        return Ok(Recurrence::At(at));
    }

    let (body, tz) = split_timezone(source)?;
    let expr = match alias_expression(body) {
        Some(expr) => expr.to_string(),
        None => normalize_cron_fields(body)?,
    };
    let schedule: cron::Schedule = expr
        .parse()
        .map_err(|e| format!("invalid cron expression: {e}"))?;

    Ok(Recurrence::Cron {
        schedule: Box::new(schedule),
        tz,
    })
}

fn split_timezone(source: &str) -> std::result::Result<(&str, Option<chrono_tz::Tz>), String> {
    match source.rsplit_once(char::is_whitespace) {
        Some((body, last)) if last.starts_with(TZ_PREFIX) => {
            let name = &last[TZ_PREFIX.len()..];
            let tz = name
                .parse::<chrono_tz::Tz>()
                .map_err(|_| format!("unknown timezone: {name}"))?;
            Ok((body.trim_end(), Some(tz)))
        },
        _ => Ok((source, None)),
    }
}

/// Seven-field expansions of the named schedules.
fn alias_expression(body: &str) -> Option<&'static str> {
    let name = body.strip_prefix('@').unwrap_or(body);
    let expr = match name.to_ascii_lowercase().as_str() {
        "hourly" => "0 0 * * * * *",
        "daily" | "midnight" => "0 0 0 * * * *",
        "weekly" => "0 0 0 * * Sun *",
        "monthly" => "0 0 0 1 * * *",
        "yearly" | "annually" => "0 0 0 1 1 * *",
        _ => return None,
    };
    Some(expr)
}

/// The `cron` crate wants `sec min hour dom month dow year`; pad the shorter
/// crontab forms.
fn normalize_cron_fields(body: &str) -> std::result::Result<String, String> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!(
            "0 {} {} *",
            fields[..4].join(" "),
            crontab_weekdays(fields[4])?
        )),
        6 => Ok(format!("{} *", fields.join(" "))),
        7 => Ok(fields.join(" ")),
        n => Err(format!("expected 5, 6 or 7 cron fields, got {n}")),
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Crontab counts weekdays from 0 (Sunday, also 7) while the `cron` crate
/// counts from 1. Numeric items are rewritten as day names; named items pass
/// through.
fn crontab_weekdays(field: &str) -> std::result::Result<String, String> {
    let items = field
        .split(',')
        .map(crontab_weekday_item)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items.join(","))
}

fn crontab_weekday_item(item: &str) -> std::result::Result<String, String> {
    let invalid = || format!("invalid day of week: {item}");
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step.parse::<usize>().map_err(|_| invalid())?)),
        None => (item, None),
    };

    let (first, last) = match (base, base.split_once('-')) {
        ("*", _) if step.is_none() => return Ok(item.to_string()),
        ("*", _) => (0, 6),
        (_, Some((a, b))) => match (a.parse::<usize>(), b.parse::<usize>()) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return Ok(item.to_string()),
        },
        (_, None) => match base.parse::<usize>() {
            Ok(n) if step.is_some() => (n, n.max(6)),
            Ok(n) => (n, n),
            Err(_) => return Ok(item.to_string()),
        },
    };
    if first > last || last > 7 || step == Some(0) {
        return Err(invalid());
    }

    let mut days: Vec<usize> = (first..=last)
        .step_by(step.unwrap_or(1))
        .map(|d| d % 7)
        .collect();
    days.sort_unstable();
    days.dedup();
    Ok(days
        .into_iter()
        .map(|d| WEEKDAYS[d])
        .collect::<Vec<_>>()
        .join(","))
}
