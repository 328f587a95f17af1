//! Task aggregate ⇄ native task definition

use crate::action_codec;
use crate::duration::IsoDuration;
use crate::models::{RunConditions, Task, TaskRuntime, TaskState, Trigger};
use crate::native::{NativeSettings, NativeTaskDefinition, RegistrationInfo, RestartPolicy, RunLevel};
use crate::repository::{join_path, task_name, ROOT_FOLDER};
use crate::trigger_codec;
use chrono::Duration;
use tracing::{debug, warn};

/// Applied when the execution time limit is missing, blank or unreadable
pub fn default_execution_time_limit() -> Duration {
    Duration::hours(72)
}

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Build a complete native definition. Never fails: bad optional values are
/// replaced by their defaults, and the trigger and action lists are never
/// left empty.
pub fn to_native(task: &Task) -> NativeTaskDefinition {
    let mut def = NativeTaskDefinition::new();

    def.registration_info = RegistrationInfo {
        author: non_empty(&task.author),
        description: non_empty(&task.description),
        uri: registration_uri(task),
    };
    def.principal.run_level = if task.run_with_highest_privileges {
        RunLevel::HighestAvailable
    } else {
        RunLevel::LeastPrivilege
    };

    def.triggers = if task.triggers.is_empty() {
        warn!("Task {:?} has no trigger, adding a daily trigger", task.name);
        vec![trigger_codec::to_native(&Trigger::default())]
    } else {
        task.triggers.iter().map(trigger_codec::to_native).collect()
    };
    def.actions = action_codec::encode_actions(&task.actions);

    apply_settings(&mut def.settings, task);
    def
}

/// The task's path; a task not yet registered is addressed in the root
/// folder by name, so the name survives a round trip.
fn registration_uri(task: &Task) -> Option<String> {
    match &task.path {
        Some(path) => Some(path.clone()),
        None if !task.name.trim().is_empty() => Some(join_path(ROOT_FOLDER, task.name.trim())),
        None => None,
    }
}

fn apply_settings(settings: &mut NativeSettings, task: &Task) {
    let c = &task.conditions;
    settings.enabled = task.enabled;
    settings.run_only_if_idle = c.only_if_idle;
    settings.disallow_start_if_on_batteries = c.only_if_ac_power;
    settings.run_only_if_network_available = c.only_if_network;
    settings.wake_to_run = c.wake_to_run;
    settings.stop_if_going_on_batteries = c.stop_on_battery_power;
    settings.start_when_available = c.run_if_missed_while_off;

    settings.execution_time_limit = Some(execution_time_limit(task.execution_time_limit.as_ref()));
    settings.restart_on_failure = restart_policy(task);
}

/// `PT0S` is an explicit "no limit"; absent, blank and invalid text all mean
/// the 72 hour default.
fn execution_time_limit(value: Option<&IsoDuration>) -> Duration {
    match value.filter(|d| !d.is_blank()) {
        None => default_execution_time_limit(),
        Some(text) => text.parse().unwrap_or_else(|e| {
            warn!("{}, using 72 hour execution time limit", e);
            default_execution_time_limit()
        }),
    }
}

/// Interval and count are applied together; an unreadable interval means
/// no restart policy at all.
fn restart_policy(task: &Task) -> Option<RestartPolicy> {
    if !task.restart_on_failure {
        return None;
    }
    if task.restart_count == 0 {
        debug!("Restart on failure requested with zero retries, skipping");
        return None;
    }
    match task.restart_interval.parse() {
        Ok(interval) => Some(RestartPolicy {
            interval,
            count: task.restart_count,
        }),
        Err(e) => {
            warn!("{}, skipping restart on failure", e);
            None
        }
    }
}

pub fn from_native(def: &NativeTaskDefinition) -> Task {
    let reg = &def.registration_info;
    let s = &def.settings;
    let restart = s.restart_on_failure.filter(|r| r.count > 0);
    let defaults = Task::default();

    Task {
        name: reg.uri.as_deref().map(|uri| task_name(uri).to_string()).unwrap_or_default(),
        path: reg.uri.clone(),
        description: reg.description.clone().unwrap_or_default(),
        author: reg.author.clone().unwrap_or_default(),
        enabled: s.enabled,
        run_with_highest_privileges: def.principal.run_level == RunLevel::HighestAvailable,
        triggers: def.triggers.iter().map(trigger_codec::from_native).collect(),
        actions: action_codec::decode_actions(&def.actions),
        conditions: RunConditions {
            only_if_idle: s.run_only_if_idle,
            only_if_ac_power: s.disallow_start_if_on_batteries,
            only_if_network: s.run_only_if_network_available,
            wake_to_run: s.wake_to_run,
            stop_on_battery_power: s.stop_if_going_on_batteries,
            run_if_missed_while_off: s.start_when_available,
        },
        execution_time_limit: s.execution_time_limit.map(IsoDuration::from),
        restart_on_failure: restart.is_some(),
        restart_interval: restart
            .map(|r| IsoDuration::from(r.interval))
            .unwrap_or(defaults.restart_interval),
        restart_count: restart.map(|r| r.count).unwrap_or(defaults.restart_count),
        runtime: TaskRuntime::default(),
    }
}

/// Decode a definition registered at `path`, attaching the host's runtime
/// state. A disabled definition always reports [`TaskState::Disabled`].
pub fn from_registered(path: &str, def: &NativeTaskDefinition, runtime: TaskRuntime) -> Task {
    let mut task = from_native(def);
    task.name = task_name(path).to_string();
    task.path = Some(path.to_string());
    task.runtime = runtime;
    if !task.enabled {
        task.runtime.state = TaskState::Disabled;
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DayOfWeek;
    use crate::models::{Action, TriggerKind};
    use chrono::NaiveDate;

    fn sample_task() -> Task {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut task = Task::new("Sync");
        task.description = "Sync the mirror".to_string();
        task.author = "ops".to_string();
        task.run_with_highest_privileges = true;
        task.triggers = vec![
            Trigger::daily(start, 1),
            Trigger::weekly(start, 2, [DayOfWeek::Saturday]),
            Trigger::new(TriggerKind::AtLogon, start),
        ];
        task.actions = vec![
            Action::new("first.exe", "a"),
            Action::new("second.exe", "b"),
            Action::new("third.exe", "c"),
        ];
        task.conditions = RunConditions {
            only_if_idle: true,
            only_if_ac_power: true,
            only_if_network: false,
            wake_to_run: true,
            stop_on_battery_power: false,
            run_if_missed_while_off: true,
        };
        task.execution_time_limit = Some(IsoDuration::from("PT2H"));
        task.restart_on_failure = true;
        task.restart_interval = IsoDuration::from("PT5M");
        task.restart_count = 2;
        task
    }

    #[test]
    fn test_task_round_trip() {
        let task = sample_task();
        let decoded = from_native(&to_native(&task));
        assert_eq!(decoded.description, task.description);
        assert_eq!(decoded.author, task.author);
        assert!(decoded.run_with_highest_privileges);
        assert_eq!(decoded.conditions, task.conditions);
        assert_eq!(decoded.execution_time_limit, task.execution_time_limit);
        assert!(decoded.restart_on_failure);
        assert_eq!(decoded.restart_interval, task.restart_interval);
        assert_eq!(decoded.restart_count, 2);
        assert_eq!(decoded.triggers.len(), 3);
        assert_eq!(decoded.triggers[..2], task.triggers[..2]);
        assert_eq!(decoded.triggers[2].kind, TriggerKind::AtLogon);
    }

    #[test]
    fn test_unregistered_task_keeps_its_name() {
        let task = sample_task();
        assert_eq!(task.path, None);
        let def = to_native(&task);
        assert_eq!(def.registration_info.uri.as_deref(), Some(r"\Sync"));

        let decoded = from_native(&def);
        assert_eq!(decoded.name, "Sync");
        assert_eq!(decoded.path.as_deref(), Some(r"\Sync"));

        let mut filed = sample_task();
        filed.path = Some(r"\Mirror\Sync".to_string());
        assert_eq!(from_native(&to_native(&filed)).path, filed.path);
        assert_eq!(from_native(&to_native(&Task::new("  "))).name, "");
    }

    #[test]
    fn test_action_order_preserved() {
        let task = sample_task();
        let decoded = from_native(&to_native(&task));
        assert_eq!(decoded.actions, task.actions);
    }

    #[test]
    fn test_invalid_execution_limit_falls_back_to_72_hours() {
        let mut task = sample_task();
        task.execution_time_limit = Some(IsoDuration::from("not-a-duration"));
        assert!(task.execution_time_limit.as_ref().unwrap().parse().is_err());
        let def = to_native(&task);
        assert_eq!(def.settings.execution_time_limit, Some(Duration::hours(72)));
    }

    #[test]
    fn test_missing_execution_limit_is_explicit_72_hours() {
        let mut task = sample_task();
        task.execution_time_limit = None;
        assert_eq!(to_native(&task).settings.execution_time_limit, Some(Duration::hours(72)));
        task.execution_time_limit = Some(IsoDuration::from("  "));
        assert_eq!(to_native(&task).settings.execution_time_limit, Some(Duration::hours(72)));
        task.execution_time_limit = Some(IsoDuration::from("PT0S"));
        assert_eq!(to_native(&task).settings.execution_time_limit, Some(Duration::zero()));
    }

    #[test]
    fn test_invalid_restart_interval_sets_no_policy() {
        let mut task = sample_task();
        task.restart_interval = IsoDuration::from("every now and then");
        let def = to_native(&task);
        assert_eq!(def.settings.restart_on_failure, None);

        let decoded = from_native(&def);
        assert!(!decoded.restart_on_failure);
        assert_eq!(decoded.restart_interval.as_str(), "PT1M");
        assert_eq!(decoded.restart_count, 3);
    }

    #[test]
    fn test_empty_task_is_structurally_valid() {
        let def = to_native(&Task::new("Bare"));
        assert_eq!(def.triggers.len(), 1);
        assert_eq!(def.actions, vec![action_codec::placeholder()]);
        assert_eq!(def.principal.run_level, RunLevel::LeastPrivilege);
    }

    #[test]
    fn test_from_registered_fills_identity_and_state() {
        let mut task = sample_task();
        task.enabled = false;
        let def = to_native(&task);
        let runtime = TaskRuntime {
            last_result: 1,
            state: TaskState::Ready,
            ..Default::default()
        };
        let decoded = from_registered(r"\Mirror\Sync", &def, runtime);
        assert_eq!(decoded.name, "Sync");
        assert_eq!(decoded.path.as_deref(), Some(r"\Mirror\Sync"));
        assert_eq!(decoded.runtime.last_result, 1);
        assert_eq!(decoded.runtime.state, TaskState::Disabled);
    }
}
