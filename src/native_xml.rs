//! Task Scheduler XML for native task definitions
//!
//! This is the raw definition text the host exports and accepts. Reading is
//! tolerant: malformed optional values fall back to the schema defaults and
//! unknown trigger elements are kept by name. Non-`Exec` actions are dropped.

use crate::calendar::{DayOfWeek, DaysOfWeekMask, MonthOfYear, MonthsMask, WeekOfMonth, WeeksOfMonthMask};
use crate::duration::{decode_duration, encode_duration};
use crate::error::FormatError;
use crate::native::*;
use crate::xml::{self, XmlError, XmlNode};
use chrono::{DateTime, NaiveDateTime};

pub const TASK_NAMESPACE: &str = "http://schemas.microsoft.com/windows/2004/02/mit/task";
pub const TASK_SCHEMA_VERSION: &str = "1.2";

const BOUNDARY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl NativeTaskDefinition {
    /// Raw XML text of this definition
    pub fn xml_text(&self) -> Result<String, XmlError> {
        xml::write(&to_xml(self), "UTF-16")
    }

    pub fn from_xml_text(text: &str) -> Result<Self, XmlError> {
        from_xml(&xml::parse(text)?)
    }
}

/// Parse a trigger boundary: local `2024-01-01T09:00:00[.fff]`, or RFC 3339
/// with an offset (kept as the wall-clock time at that offset).
pub fn parse_boundary(text: &str) -> Result<NaiveDateTime, FormatError> {
    let text = text.trim();
    if let Ok(local) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(local);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_local())
        .map_err(|_| FormatError::Timestamp(text.to_string()))
}

pub fn format_boundary(value: &NaiveDateTime) -> String {
    value.format(BOUNDARY_FORMAT).to_string()
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn parse_bool(text: &str) -> bool {
    text.eq_ignore_ascii_case("true") || text == "1"
}

fn flag(node: &XmlNode, name: &str, default: bool) -> bool {
    node.child_text(name).map(parse_bool).unwrap_or(default)
}

pub fn to_xml(def: &NativeTaskDefinition) -> XmlNode {
    let mut task = XmlNode::new("Task")
        .attr("version", TASK_SCHEMA_VERSION)
        .attr("xmlns", TASK_NAMESPACE);

    let mut info = XmlNode::new("RegistrationInfo");
    let reg = &def.registration_info;
    for (name, value) in [("Author", &reg.author), ("Description", &reg.description), ("URI", &reg.uri)] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            info.push_text(name, value);
        }
    }
    task.push(info);

    let mut triggers = XmlNode::new("Triggers");
    for trigger in &def.triggers {
        triggers.push(trigger_to_xml(trigger));
    }
    task.push(triggers);

    let p = &def.principal;
    let mut principal = XmlNode::new("Principal").attr("id", p.id.as_str());
    if let Some(user) = &p.user_id {
        principal.push_text("UserId", user.as_str());
    }
    if let Some(logon) = &p.logon_type {
        principal.push_text("LogonType", logon.as_str());
    }
    principal.push_text("RunLevel", p.run_level.as_str());
    let mut principals = XmlNode::new("Principals");
    principals.push(principal);
    task.push(principals);

    task.push(settings_to_xml(&def.settings));

    let mut actions = XmlNode::new("Actions").attr("Context", p.id.as_str());
    for action in &def.actions {
        let mut exec = XmlNode::new("Exec");
        exec.push_text("Command", action.command.as_str());
        if let Some(args) = action.arguments.as_deref().filter(|a| !a.is_empty()) {
            exec.push_text("Arguments", args);
        }
        if let Some(dir) = action.working_directory.as_deref().filter(|d| !d.is_empty()) {
            exec.push_text("WorkingDirectory", dir);
        }
        actions.push(exec);
    }
    task.push(actions);

    task
}

fn settings_to_xml(s: &NativeSettings) -> XmlNode {
    let mut node = XmlNode::new("Settings");
    node.push_text("MultipleInstancesPolicy", s.multiple_instances_policy.as_str());
    node.push_text("DisallowStartIfOnBatteries", bool_text(s.disallow_start_if_on_batteries));
    node.push_text("StopIfGoingOnBatteries", bool_text(s.stop_if_going_on_batteries));
    node.push_text("AllowHardTerminate", "true");
    node.push_text("StartWhenAvailable", bool_text(s.start_when_available));
    node.push_text("RunOnlyIfNetworkAvailable", bool_text(s.run_only_if_network_available));
    node.push_text("AllowStartOnDemand", bool_text(s.allow_start_on_demand));
    node.push_text("Enabled", bool_text(s.enabled));
    node.push_text("Hidden", bool_text(s.hidden));
    node.push_text("RunOnlyIfIdle", bool_text(s.run_only_if_idle));
    node.push_text("WakeToRun", bool_text(s.wake_to_run));
    if let Some(limit) = s.execution_time_limit {
        node.push_text("ExecutionTimeLimit", encode_duration(limit));
    }
    node.push_text("Priority", s.priority.to_string());
    if let Some(restart) = &s.restart_on_failure {
        let mut r = XmlNode::new("RestartOnFailure");
        r.push_text("Interval", encode_duration(restart.interval));
        r.push_text("Count", restart.count.to_string());
        node.push(r);
    }
    node
}

fn trigger_to_xml(t: &NativeTrigger) -> XmlNode {
    let element = match &t.schedule {
        NativeSchedule::Time => "TimeTrigger",
        NativeSchedule::Daily { .. }
        | NativeSchedule::Weekly { .. }
        | NativeSchedule::Monthly { .. }
        | NativeSchedule::MonthlyDow { .. } => "CalendarTrigger",
        NativeSchedule::Logon { .. } => "LogonTrigger",
        NativeSchedule::Boot => "BootTrigger",
        NativeSchedule::Event { .. } => "EventTrigger",
        NativeSchedule::Idle => "IdleTrigger",
        NativeSchedule::Registration => "RegistrationTrigger",
        NativeSchedule::SessionStateChange => "SessionStateChangeTrigger",
        NativeSchedule::Other { element } => element.as_str(),
    };
    let mut node = XmlNode::new(element);

    if let Some(rep) = t.repetition() {
        let mut r = XmlNode::new("Repetition");
        r.push_text("Interval", encode_duration(rep.interval));
        if let Some(duration) = rep.duration {
            r.push_text("Duration", encode_duration(duration));
        }
        r.push_text("StopAtDurationEnd", bool_text(rep.stop_at_duration_end));
        node.push(r);
    }
    if let Some(start) = &t.start_boundary {
        node.push_text("StartBoundary", format_boundary(start));
    }
    if let Some(end) = &t.end_boundary {
        node.push_text("EndBoundary", format_boundary(end));
    }
    node.push_text("Enabled", bool_text(t.enabled));
    if let Some(delay) = t.random_delay() {
        node.push_text("RandomDelay", encode_duration(delay));
    }

    match &t.schedule {
        NativeSchedule::Daily { days_interval } => {
            let mut by_day = XmlNode::new("ScheduleByDay");
            by_day.push_text("DaysInterval", days_interval.to_string());
            node.push(by_day);
        }
        NativeSchedule::Weekly {
            weeks_interval,
            days_of_week,
        } => {
            let mut by_week = XmlNode::new("ScheduleByWeek");
            by_week.push_text("WeeksInterval", weeks_interval.to_string());
            by_week.push(days_to_xml(*days_of_week));
            node.push(by_week);
        }
        NativeSchedule::Monthly {
            months,
            days_of_month,
            run_on_last_day_of_month,
        } => {
            let mut by_month = XmlNode::new("ScheduleByMonth");
            let mut days = XmlNode::new("DaysOfMonth");
            for day in days_of_month {
                days.push_text("Day", day.to_string());
            }
            if *run_on_last_day_of_month {
                days.push_text("Day", "Last");
            }
            by_month.push(days);
            by_month.push(months_to_xml(*months));
            node.push(by_month);
        }
        NativeSchedule::MonthlyDow {
            months,
            weeks,
            days_of_week,
        } => {
            let mut by_dow = XmlNode::new("ScheduleByMonthDayOfWeek");
            let mut weeks_node = XmlNode::new("Weeks");
            for week in WeekOfMonth::ALL.into_iter().filter(|w| weeks.contains(*w)) {
                weeks_node.push_text("Week", week.xml_token());
            }
            by_dow.push(weeks_node);
            by_dow.push(days_to_xml(*days_of_week));
            by_dow.push(months_to_xml(*months));
            node.push(by_dow);
        }
        NativeSchedule::Logon { user_id: Some(user) } => node.push_text("UserId", user.as_str()),
        NativeSchedule::Event { subscription } => node.push_text("Subscription", subscription.as_str()),
        _ => {}
    }
    node
}

fn days_to_xml(mask: DaysOfWeekMask) -> XmlNode {
    let mut node = XmlNode::new("DaysOfWeek");
    for day in DayOfWeek::ALL.into_iter().filter(|d| mask.contains(*d)) {
        node.push(XmlNode::new(day.name()));
    }
    node
}

fn months_to_xml(mask: MonthsMask) -> XmlNode {
    let mut node = XmlNode::new("Months");
    for month in MonthOfYear::ALL.into_iter().filter(|m| mask.contains(*m)) {
        node.push(XmlNode::new(month.name()));
    }
    node
}

pub fn from_xml(root: &XmlNode) -> Result<NativeTaskDefinition, XmlError> {
    if root.local_name() != "Task" {
        return Err(XmlError::UnexpectedRoot(root.name.clone()));
    }

    let mut def = NativeTaskDefinition::new();

    if let Some(info) = root.child("RegistrationInfo") {
        def.registration_info = RegistrationInfo {
            author: info.child_text("Author").map(str::to_string),
            description: info.child_text("Description").map(str::to_string),
            uri: info.child_text("URI").map(str::to_string),
        };
    }

    if let Some(p) = root.child("Principals").and_then(|ps| ps.child("Principal")) {
        def.principal = Principal {
            id: p.attribute("id").unwrap_or("Author").to_string(),
            user_id: p.child_text("UserId").map(str::to_string),
            logon_type: p.child_text("LogonType").map(str::to_string),
            run_level: match p.child_text("RunLevel") {
                Some("HighestAvailable") => RunLevel::HighestAvailable,
                _ => RunLevel::LeastPrivilege,
            },
        };
    }

    if let Some(settings) = root.child("Settings") {
        def.settings = settings_from_xml(settings);
    }

    if let Some(triggers) = root.child("Triggers") {
        def.triggers = triggers.children.iter().map(trigger_from_xml).collect();
    }

    if let Some(actions) = root.child("Actions") {
        for action in &actions.children {
            if action.local_name() != "Exec" {
                tracing::debug!("Dropping unsupported <{}> action", action.name);
                continue;
            }
            def.actions.push(ExecAction {
                command: action.child_text("Command").unwrap_or_default().to_string(),
                arguments: action.child_text("Arguments").map(str::to_string),
                working_directory: action.child_text("WorkingDirectory").map(str::to_string),
            });
        }
    }

    Ok(def)
}

fn settings_from_xml(node: &XmlNode) -> NativeSettings {
    let d = NativeSettings::default();
    NativeSettings {
        enabled: flag(node, "Enabled", d.enabled),
        allow_start_on_demand: flag(node, "AllowStartOnDemand", d.allow_start_on_demand),
        hidden: flag(node, "Hidden", d.hidden),
        run_only_if_idle: flag(node, "RunOnlyIfIdle", d.run_only_if_idle),
        disallow_start_if_on_batteries: flag(node, "DisallowStartIfOnBatteries", d.disallow_start_if_on_batteries),
        stop_if_going_on_batteries: flag(node, "StopIfGoingOnBatteries", d.stop_if_going_on_batteries),
        run_only_if_network_available: flag(node, "RunOnlyIfNetworkAvailable", d.run_only_if_network_available),
        wake_to_run: flag(node, "WakeToRun", d.wake_to_run),
        start_when_available: flag(node, "StartWhenAvailable", d.start_when_available),
        execution_time_limit: node
            .child_text("ExecutionTimeLimit")
            .and_then(|t| decode_duration(t).ok()),
        restart_on_failure: node.child("RestartOnFailure").and_then(|r| {
            let interval = decode_duration(r.child_text("Interval")?).ok()?;
            let count = r.child_text("Count")?.parse().ok()?;
            Some(RestartPolicy { interval, count })
        }),
        multiple_instances_policy: node
            .child_text("MultipleInstancesPolicy")
            .and_then(MultipleInstancesPolicy::from_name)
            .unwrap_or_default(),
        priority: node
            .child_text("Priority")
            .and_then(|t| t.parse().ok())
            .unwrap_or(d.priority),
    }
}

fn trigger_from_xml(node: &XmlNode) -> NativeTrigger {
    let schedule = match node.local_name() {
        "TimeTrigger" => NativeSchedule::Time,
        "CalendarTrigger" => calendar_schedule(node),
        "LogonTrigger" => NativeSchedule::Logon {
            user_id: node.child_text("UserId").map(str::to_string),
        },
        "BootTrigger" => NativeSchedule::Boot,
        "EventTrigger" => NativeSchedule::Event {
            subscription: node.child_text("Subscription").unwrap_or_default().to_string(),
        },
        "IdleTrigger" => NativeSchedule::Idle,
        "RegistrationTrigger" => NativeSchedule::Registration,
        "SessionStateChangeTrigger" => NativeSchedule::SessionStateChange,
        other => NativeSchedule::Other {
            element: other.to_string(),
        },
    };

    let mut trigger = NativeTrigger::new(schedule);
    trigger.enabled = flag(node, "Enabled", true);
    trigger.start_boundary = node
        .child_text("StartBoundary")
        .and_then(|t| parse_boundary(t).ok());
    trigger.end_boundary = node
        .child_text("EndBoundary")
        .and_then(|t| parse_boundary(t).ok());

    if let Some(rep) = node.child("Repetition") {
        if let Some(interval) = rep.child_text("Interval").and_then(|t| decode_duration(t).ok()) {
            let repetition = Repetition {
                interval,
                duration: rep.child_text("Duration").and_then(|t| decode_duration(t).ok()),
                stop_at_duration_end: flag(rep, "StopAtDurationEnd", false),
            };
            if let Err(e) = trigger.set_repetition(repetition) {
                tracing::debug!("Ignoring repetition: {}", e);
            }
        }
    }

    if let Some(delay) = node.child_text("RandomDelay").and_then(|t| decode_duration(t).ok()) {
        if let Err(e) = trigger.set_random_delay(delay) {
            tracing::debug!("Ignoring random delay: {}", e);
        }
    }

    trigger
}

fn calendar_schedule(node: &XmlNode) -> NativeSchedule {
    let interval = |n: &XmlNode, name: &str| -> u16 {
        n.child_text(name)
            .and_then(|t| t.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(1)
    };

    if let Some(by_day) = node.child("ScheduleByDay") {
        NativeSchedule::Daily {
            days_interval: interval(by_day, "DaysInterval"),
        }
    } else if let Some(by_week) = node.child("ScheduleByWeek") {
        NativeSchedule::Weekly {
            weeks_interval: interval(by_week, "WeeksInterval"),
            days_of_week: days_from_xml(by_week.child("DaysOfWeek")),
        }
    } else if let Some(by_month) = node.child("ScheduleByMonth") {
        let mut days_of_month = Vec::new();
        let mut run_on_last_day_of_month = false;
        if let Some(days) = by_month.child("DaysOfMonth") {
            for day in days.children_named("Day") {
                if day.text.eq_ignore_ascii_case("Last") {
                    run_on_last_day_of_month = true;
                } else if let Ok(n) = day.text.parse::<u8>() {
                    if (1..=31).contains(&n) {
                        days_of_month.push(n);
                    }
                }
            }
        }
        NativeSchedule::Monthly {
            months: months_from_xml(by_month.child("Months")),
            days_of_month,
            run_on_last_day_of_month,
        }
    } else if let Some(by_dow) = node.child("ScheduleByMonthDayOfWeek") {
        let mut weeks = WeeksOfMonthMask::default();
        if let Some(weeks_node) = by_dow.child("Weeks") {
            for week in weeks_node.children_named("Week") {
                if let Ok(w) = week.text.parse::<WeekOfMonth>() {
                    weeks.0 |= w.bit();
                }
            }
        }
        NativeSchedule::MonthlyDow {
            months: months_from_xml(by_dow.child("Months")),
            weeks,
            days_of_week: days_from_xml(by_dow.child("DaysOfWeek")),
        }
    } else {
        NativeSchedule::Other {
            element: node.name.clone(),
        }
    }
}

fn days_from_xml(node: Option<&XmlNode>) -> DaysOfWeekMask {
    let mut mask = DaysOfWeekMask::default();
    for child in node.map(|n| n.children.as_slice()).unwrap_or_default() {
        if let Ok(day) = child.local_name().parse::<DayOfWeek>() {
            mask.0 |= day.bit();
        }
    }
    mask
}

/// An absent `Months` element means every month.
fn months_from_xml(node: Option<&XmlNode>) -> MonthsMask {
    let Some(node) = node else {
        return MonthsMask::ALL;
    };
    let mut mask = MonthsMask::default();
    for child in &node.children {
        if let Ok(month) = child.local_name().parse::<MonthOfYear>() {
            mask.0 |= month.bit();
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    const EXPORTED: &str = r#"<?xml version="1.0" encoding="UTF-16"?>
<Task version="1.4" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">
  <RegistrationInfo>
    <Date>2024-03-01T10:00:00.1234567</Date>
    <Author>DESKTOP\alice</Author>
    <Description>Nightly backup</Description>
    <URI>\Backups\Nightly</URI>
  </RegistrationInfo>
  <Triggers>
    <CalendarTrigger>
      <Repetition>
        <Interval>PT1H</Interval>
        <Duration>PT12H</Duration>
        <StopAtDurationEnd>false</StopAtDurationEnd>
      </Repetition>
      <StartBoundary>2024-03-01T02:30:00</StartBoundary>
      <Enabled>true</Enabled>
      <RandomDelay>PT10M</RandomDelay>
      <ScheduleByMonth>
        <DaysOfMonth>
          <Day>1</Day>
          <Day>15</Day>
          <Day>Last</Day>
        </DaysOfMonth>
        <Months>
          <January />
          <July />
        </Months>
      </ScheduleByMonth>
    </CalendarTrigger>
    <LogonTrigger>
      <Enabled>true</Enabled>
      <Delay>PT30S</Delay>
    </LogonTrigger>
    <WnfStateChangeTrigger>
      <StartBoundary>2024-05-05T05:05:05Z</StartBoundary>
    </WnfStateChangeTrigger>
  </Triggers>
  <Principals>
    <Principal id="Author">
      <UserId>S-1-5-21-1</UserId>
      <LogonType>InteractiveToken</LogonType>
      <RunLevel>HighestAvailable</RunLevel>
    </Principal>
  </Principals>
  <Settings>
    <MultipleInstancesPolicy>Queue</MultipleInstancesPolicy>
    <DisallowStartIfOnBatteries>false</DisallowStartIfOnBatteries>
    <Enabled>false</Enabled>
    <ExecutionTimeLimit>PT0S</ExecutionTimeLimit>
    <RestartOnFailure>
      <Interval>PT5M</Interval>
      <Count>4</Count>
    </RestartOnFailure>
  </Settings>
  <Actions Context="Author">
    <Exec>
      <Command>C:\Tools\backup.exe</Command>
      <Arguments>--full</Arguments>
    </Exec>
    <ComHandler>
      <ClassId>{00000000-0000-0000-0000-000000000000}</ClassId>
    </ComHandler>
  </Actions>
</Task>"#;

    #[test]
    fn test_reads_exported_definition() {
        let def = NativeTaskDefinition::from_xml_text(EXPORTED).unwrap();
        assert_eq!(def.registration_info.author.as_deref(), Some(r"DESKTOP\alice"));
        assert_eq!(def.registration_info.uri.as_deref(), Some(r"\Backups\Nightly"));
        assert_eq!(def.principal.run_level, RunLevel::HighestAvailable);
        assert!(!def.settings.enabled);
        assert!(!def.settings.disallow_start_if_on_batteries);
        assert!(def.settings.stop_if_going_on_batteries);
        assert_eq!(def.settings.execution_time_limit, Some(Duration::zero()));
        assert_eq!(
            def.settings.restart_on_failure,
            Some(RestartPolicy {
                interval: Duration::minutes(5),
                count: 4
            })
        );
        assert_eq!(def.settings.multiple_instances_policy, MultipleInstancesPolicy::Queue);

        assert_eq!(def.triggers.len(), 3);
        let monthly = &def.triggers[0];
        assert_eq!(monthly.start_boundary, Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(2, 30, 0).unwrap()));
        assert_eq!(monthly.random_delay(), Some(Duration::minutes(10)));
        let rep = monthly.repetition().unwrap();
        assert_eq!(rep.interval, Duration::hours(1));
        assert_eq!(rep.duration, Some(Duration::hours(12)));
        assert_eq!(
            monthly.schedule,
            NativeSchedule::Monthly {
                months: MonthsMask(MonthOfYear::January.bit() | MonthOfYear::July.bit()),
                days_of_month: vec![1, 15],
                run_on_last_day_of_month: true,
            }
        );

        assert_eq!(def.triggers[1].schedule, NativeSchedule::Logon { user_id: None });
        assert_eq!(
            def.triggers[2].schedule,
            NativeSchedule::Other {
                element: "WnfStateChangeTrigger".to_string()
            }
        );
        assert_eq!(def.triggers[2].start_boundary, Some(at(2024, 5, 5, 5) + Duration::seconds(305)));

        assert_eq!(def.actions.len(), 1);
        assert_eq!(def.actions[0].command, r"C:\Tools\backup.exe");
        assert_eq!(def.actions[0].arguments.as_deref(), Some("--full"));
    }

    #[test]
    fn test_written_definition_reads_back() {
        let mut def = NativeTaskDefinition::new();
        def.registration_info.description = Some("Says <hello> & bye".to_string());
        def.principal.run_level = RunLevel::HighestAvailable;
        def.settings.execution_time_limit = Some(Duration::hours(72));
        def.settings.restart_on_failure = Some(RestartPolicy {
            interval: Duration::minutes(1),
            count: 3,
        });

        let mut weekly = NativeTrigger::new(NativeSchedule::Weekly {
            weeks_interval: 2,
            days_of_week: DaysOfWeekMask(DayOfWeek::Monday.bit() | DayOfWeek::Friday.bit()),
        });
        weekly.start_boundary = Some(at(2024, 1, 1, 9));
        weekly.end_boundary = Some(at(2025, 1, 1, 0));
        weekly.set_random_delay(Duration::minutes(15)).unwrap();
        def.triggers.push(weekly);

        let mut dow = NativeTrigger::new(NativeSchedule::MonthlyDow {
            months: MonthsMask::ALL,
            weeks: WeeksOfMonthMask::from(WeekOfMonth::Last),
            days_of_week: DaysOfWeekMask(DayOfWeek::Sunday.bit()),
        });
        dow.start_boundary = Some(at(2024, 1, 1, 18));
        def.triggers.push(dow);

        let mut event = NativeTrigger::new(NativeSchedule::Event {
            subscription: r#"<QueryList><Query Id="0" Path="System"><Select Path="System">*</Select></Query></QueryList>"#.to_string(),
        });
        event
            .set_repetition(Repetition {
                interval: Duration::minutes(5),
                duration: None,
                stop_at_duration_end: false,
            })
            .unwrap();
        def.triggers.push(event);

        def.actions.push(ExecAction {
            command: "cmd.exe".to_string(),
            arguments: Some("/c echo \"hi\"".to_string()),
            working_directory: Some(r"C:\Temp".to_string()),
        });

        let text = def.xml_text().unwrap();
        assert!(text.contains("<ScheduleByWeek>"));
        assert!(text.contains("<Week>Last</Week>"));
        assert_eq!(NativeTaskDefinition::from_xml_text(&text).unwrap(), def);
    }

    #[test]
    fn test_argument_spaces_are_kept() {
        let mut def = NativeTaskDefinition::new();
        def.actions.push(ExecAction {
            command: "tool.exe".to_string(),
            arguments: Some(" --pad  ".to_string()),
            working_directory: None,
        });
        let back = NativeTaskDefinition::from_xml_text(&def.xml_text().unwrap()).unwrap();
        assert_eq!(back.actions[0].arguments.as_deref(), Some(" --pad  "));
    }

    #[test]
    fn test_rejects_non_task_root() {
        let err = NativeTaskDefinition::from_xml_text("<Job/>").unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedRoot(name) if name == "Job"));
    }

    #[test]
    fn test_parse_boundary_forms() {
        assert_eq!(parse_boundary("2024-01-01T09:00:00").unwrap(), at(2024, 1, 1, 9));
        assert_eq!(parse_boundary("2024-01-01T09:00:00.500").unwrap(), at(2024, 1, 1, 9) + Duration::milliseconds(500));
        assert_eq!(parse_boundary("2024-01-01T09:00:00+02:00").unwrap(), at(2024, 1, 1, 9));
        assert!(parse_boundary("tomorrow").is_err());
    }
}
