//! Scheduler module - Compute next fire times for calendar triggers
//!
//! Times are local wall-clock times, as trigger boundaries are. Repetition
//! and random delay are not expanded; the result is the next time the
//! trigger itself fires.

use crate::calendar::{encode_month_set, encode_weekday_set, DayOfWeek, MonthOfYear, WeekOfMonth};
use crate::models::*;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// How far ahead calendar rules are searched before giving up
const SEARCH_DAYS: i64 = 366 * 8;

/// Next time `trigger` fires strictly after `after`.
///
/// `None` for triggers without calendar time (logon, startup, event,
/// unknown), for a `Once` trigger already past, and past the expiration
/// boundary.
pub fn next_fire_time(trigger: &Trigger, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let start = trigger.start_boundary;
    let next = match trigger.kind {
        TriggerKind::Once => (start > after).then_some(start),
        TriggerKind::Daily => next_daily(start, after, trigger.daily_interval.max(1)),
        TriggerKind::Weekly | TriggerKind::MonthlyByDay | TriggerKind::MonthlyByWeekday => {
            scan_days(start, after, |date| fires_on(trigger, date))
        }
        TriggerKind::AtLogon | TriggerKind::AtStartup | TriggerKind::Event | TriggerKind::Unknown => None,
    }?;

    match trigger.expiration_boundary {
        Some(end) if next > end => None,
        _ => Some(next),
    }
}

/// Earliest next fire time over all triggers; `None` for disabled tasks.
pub fn next_run_time(task: &Task, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !task.enabled {
        return None;
    }
    let after = now.with_timezone(&Local).naive_local();
    task.triggers
        .iter()
        .filter_map(|t| next_fire_time(t, after))
        .min()
        .and_then(|local| resolve_local(&Local, local))
        .map(|t| t.with_timezone(&Utc))
}

/// Longest clock jump searched past when a wall-clock time does not exist
const MAX_GAP_MINUTES: i64 = 180;

/// Pin a wall-clock time to an instant in `tz`. A repeated time takes its
/// first occurrence; a time skipped by a forward jump moves to the first
/// minute after the jump.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    (0..=MAX_GAP_MINUTES).find_map(|minutes| {
        let shifted = local.checked_add_signed(Duration::minutes(minutes))?;
        tz.from_local_datetime(&shifted).earliest()
    })
}

fn next_daily(start: NaiveDateTime, after: NaiveDateTime, interval: u16) -> Option<NaiveDateTime> {
    if start > after {
        return Some(start);
    }
    let interval = i64::from(interval);
    let periods = (after.date() - start.date()).num_days() / interval;
    [periods, periods + 1]
        .into_iter()
        .filter_map(|k| start.checked_add_signed(Duration::days(k * interval)))
        .find(|candidate| *candidate > after)
}

fn scan_days<F>(start: NaiveDateTime, after: NaiveDateTime, fires: F) -> Option<NaiveDateTime>
where
    F: Fn(NaiveDate) -> bool,
{
    let first = start.date().max(after.date());
    let time = start.time();
    first
        .iter_days()
        .take(SEARCH_DAYS as usize)
        .map(|date| date.and_time(time))
        .filter(|candidate| *candidate > after && *candidate >= start)
        .find(|candidate| fires(candidate.date()))
}

fn fires_on(trigger: &Trigger, date: NaiveDate) -> bool {
    match trigger.kind {
        TriggerKind::Weekly => {
            let days = encode_weekday_set(&trigger.weekly_days);
            if !days.contains(DayOfWeek::from(date.weekday())) {
                return false;
            }
            let weeks = (week_start(date) - week_start(trigger.start_boundary.date())).num_days() / 7;
            weeks % i64::from(trigger.weekly_interval.max(1)) == 0
        }
        TriggerKind::MonthlyByDay => {
            in_months(trigger, date) && monthly_days(trigger).iter().any(|&day| {
                if day == LAST_DAY_OF_MONTH {
                    date.day() == days_in_month(date)
                } else {
                    u32::from(day) == date.day()
                }
            })
        }
        TriggerKind::MonthlyByWeekday => {
            in_months(trigger, date)
                && DayOfWeek::from(date.weekday()) == trigger.monthly_weekday
                && in_week_of_month(trigger.monthly_week, date)
        }
        _ => false,
    }
}

fn in_months(trigger: &Trigger, date: NaiveDate) -> bool {
    let months = encode_month_set(&trigger.monthly_months);
    MonthOfYear::from_number(date.month()).is_some_and(|m| months.contains(m))
}

/// Valid days, or the start boundary's day when none are set
fn monthly_days(trigger: &Trigger) -> Vec<u8> {
    let days: Vec<u8> = trigger
        .monthly_days
        .iter()
        .copied()
        .filter(|d| (1..=31).contains(d) || *d == LAST_DAY_OF_MONTH)
        .collect();
    if days.is_empty() {
        vec![trigger.start_boundary.day() as u8]
    } else {
        days
    }
}

fn in_week_of_month(week: WeekOfMonth, date: NaiveDate) -> bool {
    let ordinal = (date.day() - 1) / 7;
    match week {
        WeekOfMonth::First => ordinal == 0,
        WeekOfMonth::Second => ordinal == 1,
        WeekOfMonth::Third => ordinal == 2,
        WeekOfMonth::Fourth => ordinal == 3,
        WeekOfMonth::Last => date.day() + 7 > days_in_month(date),
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}
