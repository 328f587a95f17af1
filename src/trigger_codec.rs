//! Trigger model ⇄ native trigger
//!
//! Encoding dispatches on [`TriggerKind`] and then applies the shared
//! modifiers (boundaries, repetition, random delay). Decoding is the
//! inverse; native trigger types the model has no kind for decode to
//! [`TriggerKind::Unknown`] with only their start boundary. Neither
//! direction fails: bad optional input is logged and left out.

use crate::calendar::{decode_month_set, decode_weekday_set, encode_month_set, encode_weekday_set, DaysOfWeekMask};
use crate::duration::IsoDuration;
use crate::models::{default_start_boundary, Trigger, TriggerKind, LAST_DAY_OF_MONTH};
use crate::native::{NativeSchedule, NativeTrigger, Repetition};
use chrono::{Datelike, Duration};
use quick_xml::escape::{escape, partial_escape, unescape};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub const DEFAULT_EVENT_LOG: &str = "Application";

/// Event log filter carried by an event trigger's subscription query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub log: String,
    pub source: Option<String>,
    pub event_id: Option<u32>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            log: DEFAULT_EVENT_LOG.to_string(),
            source: None,
            event_id: None,
        }
    }
}

pub fn to_native(trigger: &Trigger) -> NativeTrigger {
    let schedule = match trigger.kind {
        TriggerKind::Daily => NativeSchedule::Daily {
            days_interval: trigger.daily_interval.max(1),
        },
        TriggerKind::Weekly => NativeSchedule::Weekly {
            weeks_interval: trigger.weekly_interval.max(1),
            days_of_week: encode_weekday_set(&trigger.weekly_days),
        },
        TriggerKind::MonthlyByDay => {
            let (days_of_month, run_on_last_day_of_month) = split_monthly_days(trigger);
            NativeSchedule::Monthly {
                months: encode_month_set(&trigger.monthly_months),
                days_of_month,
                run_on_last_day_of_month,
            }
        }
        TriggerKind::MonthlyByWeekday => NativeSchedule::MonthlyDow {
            months: encode_month_set(&trigger.monthly_months),
            weeks: trigger.monthly_week.into(),
            days_of_week: DaysOfWeekMask(trigger.monthly_weekday.bit()),
        },
        TriggerKind::AtLogon => NativeSchedule::Logon { user_id: None },
        TriggerKind::AtStartup => NativeSchedule::Boot,
        TriggerKind::Once => NativeSchedule::Time,
        TriggerKind::Event => NativeSchedule::Event {
            subscription: build_event_query(
                trigger.event_log_name.as_deref(),
                trigger.event_source_filter.as_deref(),
                trigger.event_id_filter,
            ),
        },
        TriggerKind::Unknown => {
            debug!("Encoding unknown trigger kind as a daily trigger");
            NativeSchedule::Daily { days_interval: 1 }
        }
    };

    let mut native = NativeTrigger::new(schedule);
    if trigger.kind.uses_start_boundary() {
        native.start_boundary = Some(trigger.start_boundary);
    }
    native.end_boundary = trigger.expiration_boundary;
    apply_repetition(&mut native, trigger);
    apply_random_delay(&mut native, trigger);
    native
}

/// Concrete days 1..=31 for the native list, and whether the last-day
/// sentinel was present.
fn split_monthly_days(trigger: &Trigger) -> (Vec<u8>, bool) {
    let mut days = Vec::new();
    let mut last = false;
    for &day in &trigger.monthly_days {
        match day {
            1..=31 => days.push(day),
            LAST_DAY_OF_MONTH => last = true,
            other => warn!("Dropping invalid day of month {}", other),
        }
    }
    if days.is_empty() && !last {
        let fallback = trigger.start_boundary.day() as u8;
        warn!("Monthly trigger has no days, using day {} of the start boundary", fallback);
        days.push(fallback);
    }
    (days, last)
}

/// Parse an optional duration field; `Ok(None)` when absent or blank.
fn optional_duration(field: &str, value: Option<&IsoDuration>) -> Result<Option<Duration>, ()> {
    match value.filter(|d| !d.is_blank()) {
        None => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|e| {
            warn!("Ignoring {}: {}", field, e);
        }),
    }
}

fn apply_repetition(native: &mut NativeTrigger, trigger: &Trigger) {
    // Interval and duration are applied together or not at all
    let Ok(Some(interval)) = optional_duration("repetition interval", trigger.repetition_interval.as_ref()) else {
        return;
    };
    let Ok(duration) = optional_duration("repetition duration", trigger.repetition_duration.as_ref()) else {
        warn!("Skipping repetition for {}", trigger);
        return;
    };
    if interval <= Duration::zero() {
        debug!("Skipping zero repetition interval");
        return;
    }
    let repetition = Repetition {
        interval,
        duration,
        stop_at_duration_end: false,
    };
    if let Err(e) = native.set_repetition(repetition) {
        debug!("{}", e);
    }
}

fn apply_random_delay(native: &mut NativeTrigger, trigger: &Trigger) {
    let Ok(Some(delay)) = optional_duration("random delay", trigger.random_delay.as_ref()) else {
        return;
    };
    if delay <= Duration::zero() {
        return;
    }
    if let Err(e) = native.set_random_delay(delay) {
        debug!("{}", e);
    }
}

pub fn from_native(native: &NativeTrigger) -> Trigger {
    let start = native.start_boundary.unwrap_or_else(default_start_boundary);
    let mut trigger = Trigger::new(TriggerKind::Unknown, start);

    match &native.schedule {
        NativeSchedule::Time => trigger.kind = TriggerKind::Once,
        NativeSchedule::Daily { days_interval } => {
            trigger.kind = TriggerKind::Daily;
            trigger.daily_interval = (*days_interval).max(1);
        }
        NativeSchedule::Weekly {
            weeks_interval,
            days_of_week,
        } => {
            trigger.kind = TriggerKind::Weekly;
            trigger.weekly_interval = (*weeks_interval).max(1);
            trigger.weekly_days = decode_weekday_set(*days_of_week);
        }
        NativeSchedule::Monthly {
            months,
            days_of_month,
            run_on_last_day_of_month,
        } => {
            trigger.kind = TriggerKind::MonthlyByDay;
            trigger.monthly_months = decode_month_set(*months);
            trigger.monthly_days = days_of_month
                .iter()
                .copied()
                .filter(|d| (1..=31).contains(d))
                .collect();
            if *run_on_last_day_of_month {
                trigger.monthly_days.insert(LAST_DAY_OF_MONTH);
            }
        }
        NativeSchedule::MonthlyDow {
            months,
            weeks,
            days_of_week,
        } => {
            trigger.kind = TriggerKind::MonthlyByWeekday;
            trigger.monthly_months = decode_month_set(*months);
            trigger.monthly_week = weeks.first().unwrap_or_default();
            trigger.monthly_weekday = decode_weekday_set(*days_of_week)
                .into_iter()
                .next()
                .unwrap_or_default();
        }
        NativeSchedule::Logon { .. } => trigger.kind = TriggerKind::AtLogon,
        NativeSchedule::Boot => trigger.kind = TriggerKind::AtStartup,
        NativeSchedule::Event { subscription } => {
            let query = parse_event_query(subscription);
            trigger.kind = TriggerKind::Event;
            trigger.event_log_name = Some(query.log);
            trigger.event_source_filter = query.source;
            trigger.event_id_filter = query.event_id;
        }
        other => {
            debug!("Decoding {} trigger as unknown", other.trigger_type());
            return trigger;
        }
    }

    trigger.expiration_boundary = native.end_boundary;
    if let Some(rep) = native.repetition() {
        trigger.repetition_interval = Some(IsoDuration::from(rep.interval));
        trigger.repetition_duration = rep.duration.map(IsoDuration::from);
    }
    trigger.random_delay = native.random_delay().map(IsoDuration::from);
    trigger
}

/// Build the subscription query for an event trigger.
///
/// A blank log means `Application`. The source is written as an XPath
/// literal, using `concat()` when it holds both quote characters.
pub fn build_event_query(log: Option<&str>, source: Option<&str>, event_id: Option<u32>) -> String {
    let log = log.filter(|l| !l.trim().is_empty()).unwrap_or(DEFAULT_EVENT_LOG);

    let mut conditions = Vec::new();
    if let Some(source) = source.filter(|s| !s.trim().is_empty()) {
        conditions.push(format!("Provider[@Name={}]", xpath_literal(source)));
    }
    if let Some(id) = event_id {
        conditions.push(format!("(EventID={id})"));
    }

    let predicate = if conditions.is_empty() {
        "*".to_string()
    } else {
        format!("*[System[{}]]", conditions.join(" and "))
    };

    let path = escape(log);
    format!(
        r#"<QueryList><Query Id="0" Path="{path}"><Select Path="{path}">{}</Select></Query></QueryList>"#,
        partial_escape(&predicate)
    )
}

/// XPath 1.0 has no escape inside string literals, so a value with both
/// quote kinds is split on `'` and joined with `concat()`.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let mut parts = Vec::new();
    for (i, piece) in value.split('\'').enumerate() {
        if i > 0 {
            parts.push("\"'\"".to_string());
        }
        if !piece.is_empty() {
            parts.push(format!("'{piece}'"));
        }
    }
    format!("concat({})", parts.join(","))
}

/// Read one XPath string expression (quoted literal or `concat()` of
/// literals) from the front of `text`; returns the value and the rest.
fn read_xpath_string(text: &str) -> Option<(String, &str)> {
    if let Some(rest) = text.strip_prefix("concat(") {
        let mut value = String::new();
        let mut rest = rest.trim_start();
        loop {
            let (piece, after) = read_xpath_quoted(rest)?;
            value.push_str(&piece);
            let after = after.trim_start();
            if let Some(after) = after.strip_prefix(',') {
                rest = after.trim_start();
            } else {
                return Some((value, after.strip_prefix(')')?));
            }
        }
    }
    read_xpath_quoted(text)
}

fn read_xpath_quoted(text: &str) -> Option<(String, &str)> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &text[1..];
    let end = body.find(quote)?;
    Some((body[..end].to_string(), &body[end + 1..]))
}

/// Parse the exact predicate shape [`build_event_query`] writes:
/// `*`, or `*[System[...]]` holding a provider test, an event id test, or
/// both joined by ` and `.
fn parse_own_predicate(predicate: &str) -> Option<(Option<String>, Option<u32>)> {
    let predicate = predicate.trim();
    if predicate == "*" {
        return Some((None, None));
    }
    let mut rest = predicate.strip_prefix("*[System[")?.strip_suffix("]]")?;

    let mut source = None;
    if let Some(after) = rest.strip_prefix("Provider[@Name=") {
        let (value, after) = read_xpath_string(after)?;
        rest = after.strip_prefix(']')?;
        source = Some(value);
        if !rest.is_empty() {
            rest = rest.strip_prefix(" and ")?;
        }
    }

    let event_id = if rest.is_empty() {
        None
    } else {
        Some(rest.strip_prefix("(EventID=")?.strip_suffix(')')?.trim().parse().ok()?)
    };
    if source.is_none() && event_id.is_none() {
        return None;
    }
    Some((source, event_id))
}

fn select_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<Select\s+Path="([^"]*)"\s*>(.*?)</Select>"#).expect("valid regex"))
}

fn provider_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"Provider\[@Name=(?:'([^']*)'|"([^"]*)")\]"#).expect("valid regex"))
}

fn event_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"EventID\s*=\s*(\d+)").expect("valid regex"))
}

fn unescape_or_raw(text: &str) -> String {
    unescape(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

/// Best effort for hand-written queries: the first provider test, and an
/// event id test found outside any provider literal.
fn parse_foreign_predicate(predicate: &str) -> (Option<String>, Option<u32>) {
    let source = provider_re().captures(predicate).and_then(|provider| {
        provider
            .get(1)
            .or_else(|| provider.get(2))
            .map(|m| m.as_str().to_string())
    });
    let outside = provider_re().replace_all(predicate, "");
    let event_id = event_id_re()
        .captures(&outside)
        .and_then(|id| id[1].parse().ok());
    (source, event_id)
}

/// Recover log, source and event id from a subscription query.
///
/// The shape [`build_event_query`] writes is read exactly. Other queries
/// get a best-effort reading, with defaults for whatever cannot be matched.
pub fn parse_event_query(text: &str) -> EventQuery {
    let mut query = EventQuery::default();
    let Some(select) = select_re().captures(text) else {
        debug!("Subscription has no Select element, using defaults");
        return query;
    };

    let log = unescape_or_raw(&select[1]);
    if !log.trim().is_empty() {
        query.log = log;
    }

    let predicate = unescape_or_raw(&select[2]);
    let (source, event_id) = parse_own_predicate(&predicate).unwrap_or_else(|| {
        debug!("Reading foreign event query predicate {:?}", predicate);
        parse_foreign_predicate(&predicate)
    });
    query.source = source;
    query.event_id = event_id;
    query
}
