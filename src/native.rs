//! Typed native task definition
//!
//! Mirrors the Task Scheduler 1.2 task definition: registration info, a
//! principal, a settings block, and ordered trigger and action collections.
//! Optional trigger fields that only some trigger types carry are reachable
//! through capability-guarded setters instead of being set blindly.

use crate::calendar::{DaysOfWeekMask, MonthsMask, WeeksOfMonthMask};
use crate::error::UnsupportedFeature;
use chrono::{Duration, NaiveDateTime};
use std::fmt;

/// Native trigger types, as distinguished by the XML element name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeTriggerType {
    Time,
    Daily,
    Weekly,
    Monthly,
    MonthlyDow,
    Logon,
    Boot,
    Event,
    Idle,
    Registration,
    SessionStateChange,
    Other,
}

impl NativeTriggerType {
    /// Only time-based triggers carry `RandomDelay`; the others use `Delay`.
    pub fn supports_random_delay(self) -> bool {
        matches!(
            self,
            NativeTriggerType::Time
                | NativeTriggerType::Daily
                | NativeTriggerType::Weekly
                | NativeTriggerType::Monthly
                | NativeTriggerType::MonthlyDow
        )
    }

    pub fn supports_repetition(self) -> bool {
        !matches!(self, NativeTriggerType::Other)
    }
}

impl fmt::Display for NativeTriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NativeTriggerType::Time => "time",
            NativeTriggerType::Daily => "daily",
            NativeTriggerType::Weekly => "weekly",
            NativeTriggerType::Monthly => "monthly",
            NativeTriggerType::MonthlyDow => "monthly day-of-week",
            NativeTriggerType::Logon => "logon",
            NativeTriggerType::Boot => "boot",
            NativeTriggerType::Event => "event",
            NativeTriggerType::Idle => "idle",
            NativeTriggerType::Registration => "registration",
            NativeTriggerType::SessionStateChange => "session state change",
            NativeTriggerType::Other => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Kind-specific part of a native trigger
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSchedule {
    Time,
    Daily {
        days_interval: u16,
    },
    Weekly {
        weeks_interval: u16,
        days_of_week: DaysOfWeekMask,
    },
    Monthly {
        months: MonthsMask,
        days_of_month: Vec<u8>,
        run_on_last_day_of_month: bool,
    },
    MonthlyDow {
        months: MonthsMask,
        weeks: WeeksOfMonthMask,
        days_of_week: DaysOfWeekMask,
    },
    Logon {
        user_id: Option<String>,
    },
    Boot,
    Event {
        subscription: String,
    },
    Idle,
    Registration,
    SessionStateChange,
    /// Element this crate does not know, kept by name
    Other {
        element: String,
    },
}

impl NativeSchedule {
    pub fn trigger_type(&self) -> NativeTriggerType {
        match self {
            NativeSchedule::Time => NativeTriggerType::Time,
            NativeSchedule::Daily { .. } => NativeTriggerType::Daily,
            NativeSchedule::Weekly { .. } => NativeTriggerType::Weekly,
            NativeSchedule::Monthly { .. } => NativeTriggerType::Monthly,
            NativeSchedule::MonthlyDow { .. } => NativeTriggerType::MonthlyDow,
            NativeSchedule::Logon { .. } => NativeTriggerType::Logon,
            NativeSchedule::Boot => NativeTriggerType::Boot,
            NativeSchedule::Event { .. } => NativeTriggerType::Event,
            NativeSchedule::Idle => NativeTriggerType::Idle,
            NativeSchedule::Registration => NativeTriggerType::Registration,
            NativeSchedule::SessionStateChange => NativeTriggerType::SessionStateChange,
            NativeSchedule::Other { .. } => NativeTriggerType::Other,
        }
    }
}

/// Secondary re-firing after a trigger fires
#[derive(Debug, Clone, PartialEq)]
pub struct Repetition {
    pub interval: Duration,
    /// `None` repeats until the trigger's own window closes
    pub duration: Option<Duration>,
    pub stop_at_duration_end: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeTrigger {
    pub enabled: bool,
    pub start_boundary: Option<NaiveDateTime>,
    pub end_boundary: Option<NaiveDateTime>,
    pub schedule: NativeSchedule,
    repetition: Option<Repetition>,
    random_delay: Option<Duration>,
}

impl NativeTrigger {
    pub fn new(schedule: NativeSchedule) -> Self {
        Self {
            enabled: true,
            start_boundary: None,
            end_boundary: None,
            schedule,
            repetition: None,
            random_delay: None,
        }
    }

    pub fn trigger_type(&self) -> NativeTriggerType {
        self.schedule.trigger_type()
    }

    pub fn random_delay(&self) -> Option<Duration> {
        self.random_delay
    }

    pub fn set_random_delay(&mut self, delay: Duration) -> Result<(), UnsupportedFeature> {
        let trigger = self.trigger_type();
        if !trigger.supports_random_delay() {
            return Err(UnsupportedFeature {
                feature: "random delay",
                trigger,
            });
        }
        self.random_delay = Some(delay);
        Ok(())
    }

    pub fn repetition(&self) -> Option<&Repetition> {
        self.repetition.as_ref()
    }

    pub fn set_repetition(&mut self, repetition: Repetition) -> Result<(), UnsupportedFeature> {
        let trigger = self.trigger_type();
        if !trigger.supports_repetition() {
            return Err(UnsupportedFeature {
                feature: "repetition",
                trigger,
            });
        }
        self.repetition = Some(repetition);
        Ok(())
    }
}

/// One `Exec` action
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecAction {
    pub command: String,
    pub arguments: Option<String>,
    pub working_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationInfo {
    pub author: Option<String>,
    pub description: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunLevel {
    #[default]
    LeastPrivilege,
    HighestAvailable,
}

impl RunLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RunLevel::LeastPrivilege => "LeastPrivilege",
            RunLevel::HighestAvailable => "HighestAvailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub user_id: Option<String>,
    pub logon_type: Option<String>,
    pub run_level: RunLevel,
}

impl Default for Principal {
    fn default() -> Self {
        Self {
            id: "Author".to_string(),
            user_id: None,
            logon_type: Some("InteractiveToken".to_string()),
            run_level: RunLevel::LeastPrivilege,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipleInstancesPolicy {
    Parallel,
    Queue,
    #[default]
    IgnoreNew,
    StopExisting,
}

impl MultipleInstancesPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MultipleInstancesPolicy::Parallel => "Parallel",
            MultipleInstancesPolicy::Queue => "Queue",
            MultipleInstancesPolicy::IgnoreNew => "IgnoreNew",
            MultipleInstancesPolicy::StopExisting => "StopExisting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Parallel" => Some(MultipleInstancesPolicy::Parallel),
            "Queue" => Some(MultipleInstancesPolicy::Queue),
            "IgnoreNew" => Some(MultipleInstancesPolicy::IgnoreNew),
            "StopExisting" => Some(MultipleInstancesPolicy::StopExisting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub interval: Duration,
    pub count: u32,
}

/// Settings block; defaults are the schema defaults for absent elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSettings {
    pub enabled: bool,
    pub allow_start_on_demand: bool,
    pub hidden: bool,
    pub run_only_if_idle: bool,
    pub disallow_start_if_on_batteries: bool,
    pub stop_if_going_on_batteries: bool,
    pub run_only_if_network_available: bool,
    pub wake_to_run: bool,
    pub start_when_available: bool,
    /// `None` leaves the host default in force
    pub execution_time_limit: Option<Duration>,
    pub restart_on_failure: Option<RestartPolicy>,
    pub multiple_instances_policy: MultipleInstancesPolicy,
    pub priority: u8,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_start_on_demand: true,
            hidden: false,
            run_only_if_idle: false,
            disallow_start_if_on_batteries: true,
            stop_if_going_on_batteries: true,
            run_only_if_network_available: false,
            wake_to_run: false,
            start_when_available: false,
            execution_time_limit: None,
            restart_on_failure: None,
            multiple_instances_policy: MultipleInstancesPolicy::IgnoreNew,
            priority: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeTaskDefinition {
    pub registration_info: RegistrationInfo,
    pub principal: Principal,
    pub settings: NativeSettings,
    pub triggers: Vec<NativeTrigger>,
    pub actions: Vec<ExecAction>,
}

impl NativeTaskDefinition {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_delay_guarded_by_trigger_type() {
        let mut daily = NativeTrigger::new(NativeSchedule::Daily { days_interval: 1 });
        assert!(daily.set_random_delay(Duration::minutes(5)).is_ok());
        assert_eq!(daily.random_delay(), Some(Duration::minutes(5)));

        let mut logon = NativeTrigger::new(NativeSchedule::Logon { user_id: None });
        let err = logon.set_random_delay(Duration::minutes(5)).unwrap_err();
        assert_eq!(err.trigger, NativeTriggerType::Logon);
        assert_eq!(logon.random_delay(), None);
    }

    #[test]
    fn test_repetition_rejected_on_unrecognized_trigger() {
        let repetition = Repetition {
            interval: Duration::minutes(10),
            duration: None,
            stop_at_duration_end: false,
        };
        let mut boot = NativeTrigger::new(NativeSchedule::Boot);
        assert!(boot.set_repetition(repetition.clone()).is_ok());

        let mut other = NativeTrigger::new(NativeSchedule::Other {
            element: "WnfStateChangeTrigger".to_string(),
        });
        assert!(other.set_repetition(repetition).is_err());
        assert!(other.repetition().is_none());
    }

    #[test]
    fn test_settings_defaults_follow_schema() {
        let settings = NativeSettings::default();
        assert!(settings.enabled);
        assert!(settings.disallow_start_if_on_batteries);
        assert!(settings.stop_if_going_on_batteries);
        assert_eq!(settings.execution_time_limit, None);
        assert_eq!(settings.priority, 7);
    }
}
