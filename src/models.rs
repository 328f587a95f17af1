//! Data models for Taskdeck

use crate::calendar::{DayOfWeek, MonthOfYear, WeekOfMonth};
use crate::duration::IsoDuration;
use crate::error::FormatError;
use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Day-of-month sentinel meaning "last day of the month"
pub const LAST_DAY_OF_MONTH: u8 = 32;

/// Recurrence kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    #[default]
    Daily,
    Weekly,
    #[serde(alias = "monthly")]
    MonthlyByDay,
    MonthlyByWeekday,
    AtLogon,
    AtStartup,
    Once,
    Event,
    /// Native trigger this model has no kind for; only produced by decode
    Unknown,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 9] = [
        TriggerKind::Daily,
        TriggerKind::Weekly,
        TriggerKind::MonthlyByDay,
        TriggerKind::MonthlyByWeekday,
        TriggerKind::AtLogon,
        TriggerKind::AtStartup,
        TriggerKind::Once,
        TriggerKind::Event,
        TriggerKind::Unknown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::Daily => "Daily",
            TriggerKind::Weekly => "Weekly",
            TriggerKind::MonthlyByDay => "MonthlyByDay",
            TriggerKind::MonthlyByWeekday => "MonthlyByWeekday",
            TriggerKind::AtLogon => "AtLogon",
            TriggerKind::AtStartup => "AtStartup",
            TriggerKind::Once => "Once",
            TriggerKind::Event => "Event",
            TriggerKind::Unknown => "Unknown",
        }
    }

    /// Whether the start boundary carries meaning (and is written) for this kind
    pub fn uses_start_boundary(self) -> bool {
        !matches!(
            self,
            TriggerKind::AtLogon | TriggerKind::AtStartup | TriggerKind::Event
        )
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TriggerKind {
    type Err = FormatError;

    /// Accepts `MonthlyByDay`, `monthly_by_day`, `monthly-by-day` and the
    /// older single `Monthly` tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        if folded == "monthly" {
            return Ok(TriggerKind::MonthlyByDay);
        }
        TriggerKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(&folded))
            .ok_or_else(|| FormatError::TriggerKind(s.to_string()))
    }
}

/// One recurrence rule plus its modifiers.
///
/// Fields that do not apply to `kind` are kept as entered so switching the
/// kind back and forth during an edit loses nothing; the codec ignores them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub start_boundary: NaiveDateTime,
    pub expiration_boundary: Option<NaiveDateTime>,

    pub daily_interval: u16,

    pub weekly_interval: u16,
    pub weekly_days: BTreeSet<DayOfWeek>,

    pub monthly_months: BTreeSet<MonthOfYear>,
    /// 1..=31, plus [`LAST_DAY_OF_MONTH`]
    pub monthly_days: BTreeSet<u8>,
    pub monthly_week: WeekOfMonth,
    pub monthly_weekday: DayOfWeek,

    pub random_delay: Option<IsoDuration>,
    pub repetition_interval: Option<IsoDuration>,
    pub repetition_duration: Option<IsoDuration>,

    pub event_log_name: Option<String>,
    pub event_source_filter: Option<String>,
    pub event_id_filter: Option<u32>,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(TriggerKind::Daily, default_start_boundary())
    }
}

/// Today at 09:00 local time
pub fn default_start_boundary() -> NaiveDateTime {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN);
    Local::now().date_naive().and_time(nine)
}

impl Trigger {
    pub fn new(kind: TriggerKind, start_boundary: NaiveDateTime) -> Self {
        Self {
            kind,
            start_boundary,
            expiration_boundary: None,
            daily_interval: 1,
            weekly_interval: 1,
            weekly_days: BTreeSet::new(),
            monthly_months: BTreeSet::new(),
            monthly_days: BTreeSet::new(),
            monthly_week: WeekOfMonth::First,
            monthly_weekday: DayOfWeek::Monday,
            random_delay: None,
            repetition_interval: None,
            repetition_duration: None,
            event_log_name: None,
            event_source_filter: None,
            event_id_filter: None,
        }
    }

    pub fn daily(start_boundary: NaiveDateTime, every_days: u16) -> Self {
        Self {
            daily_interval: every_days,
            ..Self::new(TriggerKind::Daily, start_boundary)
        }
    }

    pub fn weekly(start_boundary: NaiveDateTime, every_weeks: u16, days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        Self {
            weekly_interval: every_weeks,
            weekly_days: days.into_iter().collect(),
            ..Self::new(TriggerKind::Weekly, start_boundary)
        }
    }

    pub fn event(log: &str, source: Option<&str>, event_id: Option<u32>) -> Self {
        Self {
            event_log_name: Some(log.to_string()),
            event_source_filter: source.map(str::to_string),
            event_id_filter: event_id,
            ..Self::new(TriggerKind::Event, default_start_boundary())
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.uses_start_boundary() {
            write!(
                f,
                "{} at {}",
                self.kind,
                self.start_boundary.format("%Y-%m-%d %H:%M:%S")
            )
        } else if self.kind == TriggerKind::Event {
            let log = self.event_log_name.as_deref().unwrap_or("Application");
            write!(f, "Event on {log}")
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// One command run when the task fires
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    pub command: String,
    pub arguments: String,
    pub working_directory: String,
}

impl Action {
    pub fn new(command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.into(),
            working_directory: String::new(),
        }
    }
}

/// Conditions the host checks before starting the task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConditions {
    pub only_if_idle: bool,
    pub only_if_ac_power: bool,
    pub only_if_network: bool,
    pub wake_to_run: bool,
    pub stop_on_battery_power: bool,
    pub run_if_missed_while_off: bool,
}

/// Task state as reported by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ready,
    Running,
    Disabled,
    #[default]
    Unknown,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Ready => "Ready",
            TaskState::Running => "Running",
            TaskState::Disabled => "Disabled",
            TaskState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Read-only runtime fields, filled in by the repository
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRuntime {
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_result: i32,
    pub state: TaskState,
}

/// Main Task aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub name: String,
    /// Folder-qualified identity, assigned by the repository
    pub path: Option<String>,
    pub description: String,
    pub author: String,
    pub enabled: bool,
    pub run_with_highest_privileges: bool,

    pub triggers: Vec<Trigger>,
    pub actions: Vec<Action>,
    pub conditions: RunConditions,

    // Failure handling
    pub execution_time_limit: Option<IsoDuration>,
    pub restart_on_failure: bool,
    pub restart_interval: IsoDuration,
    pub restart_count: u32,

    pub runtime: TaskRuntime,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: None,
            description: String::new(),
            author: String::new(),
            enabled: true,
            run_with_highest_privileges: false,
            triggers: vec![],
            actions: vec![],
            conditions: RunConditions::default(),
            execution_time_limit: None,
            restart_on_failure: false,
            restart_interval: IsoDuration::new("PT1M"),
            restart_count: 3,
            runtime: TaskRuntime::default(),
        }
    }
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// All trigger descriptors joined for display
    pub fn trigger_summary(&self) -> String {
        self.triggers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One entry of a task's execution history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub event_id: u32,
    pub result_label: String,
    pub exit_code: String,
    pub message: String,
    pub user: String,
    pub activity_id: Option<uuid::Uuid>,
}

/// Folder node of the task tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskFolder {
    pub name: String,
    pub path: String,
    pub sub_folders: Vec<TaskFolder>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn nine_am() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_trigger_kind_parses_legacy_tags() {
        assert_eq!("Daily".parse::<TriggerKind>(), Ok(TriggerKind::Daily));
        assert_eq!("Monthly".parse::<TriggerKind>(), Ok(TriggerKind::MonthlyByDay));
        assert_eq!("at_logon".parse::<TriggerKind>(), Ok(TriggerKind::AtLogon));
        assert_eq!("AtStartup".parse::<TriggerKind>(), Ok(TriggerKind::AtStartup));
        assert_eq!("monthly-by-weekday".parse::<TriggerKind>(), Ok(TriggerKind::MonthlyByWeekday));
        assert!("Hourly".parse::<TriggerKind>().is_err());
    }

    #[test]
    fn test_trigger_descriptor() {
        assert_eq!(Trigger::daily(nine_am(), 1).to_string(), "Daily at 2024-01-01 09:00:00");
        assert_eq!(Trigger::new(TriggerKind::AtLogon, nine_am()).to_string(), "AtLogon");
        assert_eq!(Trigger::event("System", None, None).to_string(), "Event on System");
    }

    #[test]
    fn test_sparse_task_json_takes_defaults() {
        let task: Task = serde_json::from_str(
            r#"{
                "name": "Backup",
                "triggers": [{"kind": "weekly", "start_boundary": "2024-01-01T09:00:00", "weekly_days": ["Friday"]}],
                "actions": [{"command": "backup.exe"}]
            }"#,
        )
        .unwrap();
        assert!(task.enabled);
        assert_eq!(task.restart_interval.as_str(), "PT1M");
        assert_eq!(task.restart_count, 3);
        assert_eq!(task.triggers[0].kind, TriggerKind::Weekly);
        assert_eq!(task.triggers[0].weekly_interval, 1);
        assert_eq!(task.triggers[0].weekly_days, BTreeSet::from([DayOfWeek::Friday]));
        assert_eq!(task.actions[0].arguments, "");
        assert_eq!(task.runtime.state, TaskState::Unknown);
    }

    #[test]
    fn test_trigger_summary_joins_all_triggers() {
        let mut task = Task::new("x");
        task.triggers.push(Trigger::daily(nine_am(), 2));
        task.triggers.push(Trigger::new(TriggerKind::AtStartup, nine_am()));
        assert_eq!(task.trigger_summary(), "Daily at 2024-01-01 09:00:00, AtStartup");
    }
}
