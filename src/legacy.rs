//! "First trigger" / "first action" compatibility view
//!
//! Older call sites treat a task as having a single trigger and a single
//! action. These adapters read and write element 0 of the underlying list;
//! the list stays the source of truth. Reads on an empty list return the
//! defaults an unconfigured task shows, writes create element 0 first.

use crate::calendar::{DayOfWeek, MonthOfYear, WeekOfMonth};
use crate::duration::IsoDuration;
use crate::models::{Action, Task, Trigger, TriggerKind};
use crate::trigger_codec::DEFAULT_EVENT_LOG;
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

/// Read-only view of the first element of a list
#[derive(Debug, Clone, Copy)]
pub struct PrimaryView<'a, T> {
    items: &'a [T],
}

impl<'a, T> PrimaryView<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self { items }
    }

    pub fn get(&self) -> Option<&'a T> {
        self.items.first()
    }
}

/// Writable view of the first element of a list
#[derive(Debug)]
pub struct PrimaryMut<'a, T> {
    items: &'a mut Vec<T>,
}

impl<'a, T: Default> PrimaryMut<'a, T> {
    pub fn new(items: &'a mut Vec<T>) -> Self {
        Self { items }
    }

    pub fn get(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn view(&self) -> PrimaryView<'_, T> {
        PrimaryView::new(self.items.as_slice())
    }

    /// Element 0, created from `T::default()` if the list is empty
    pub fn get_or_insert(&mut self) -> &mut T {
        if self.items.is_empty() {
            self.items.push(T::default());
        }
        &mut self.items[0]
    }

    pub fn set(&mut self, value: T) {
        match self.items.first_mut() {
            Some(first) => *first = value,
            None => self.items.push(value),
        }
    }
}

macro_rules! primary_fields {
    ($item:ty { $($field:ident, $setter:ident: $ty:ty = $default:expr;)* }) => {
        impl PrimaryView<'_, $item> {
            $(
                pub fn $field(&self) -> $ty {
                    self.get().map(|item| item.$field.clone()).unwrap_or_else(|| $default)
                }
            )*
        }

        impl PrimaryMut<'_, $item> {
            $(
                pub fn $setter(&mut self, value: $ty) {
                    self.get_or_insert().$field = value;
                }
            )*
        }
    };
}

primary_fields!(Trigger {
    kind, set_kind: TriggerKind = TriggerKind::Daily;
    expiration_boundary, set_expiration_boundary: Option<NaiveDateTime> = None;
    daily_interval, set_daily_interval: u16 = 1;
    weekly_interval, set_weekly_interval: u16 = 1;
    weekly_days, set_weekly_days: BTreeSet<DayOfWeek> = BTreeSet::new();
    monthly_months, set_monthly_months: BTreeSet<MonthOfYear> = BTreeSet::new();
    monthly_days, set_monthly_days: BTreeSet<u8> = BTreeSet::new();
    monthly_week, set_monthly_week: WeekOfMonth = WeekOfMonth::First;
    monthly_weekday, set_monthly_weekday: DayOfWeek = DayOfWeek::Monday;
    random_delay, set_random_delay: Option<IsoDuration> = None;
    repetition_interval, set_repetition_interval: Option<IsoDuration> = None;
    repetition_duration, set_repetition_duration: Option<IsoDuration> = None;
    event_source_filter, set_event_source_filter: Option<String> = None;
    event_id_filter, set_event_id_filter: Option<u32> = None;
});

primary_fields!(Action {
    command, set_command: String = String::new();
    arguments, set_arguments: String = String::new();
    working_directory, set_working_directory: String = String::new();
});

impl PrimaryView<'_, Trigger> {
    /// `None` when there is no trigger yet
    pub fn start_boundary(&self) -> Option<NaiveDateTime> {
        self.get().map(|t| t.start_boundary)
    }

    pub fn event_log_name(&self) -> String {
        self.get()
            .and_then(|t| t.event_log_name.clone())
            .unwrap_or_else(|| DEFAULT_EVENT_LOG.to_string())
    }
}

impl PrimaryMut<'_, Trigger> {
    pub fn set_start_boundary(&mut self, value: NaiveDateTime) {
        self.get_or_insert().start_boundary = value;
    }

    pub fn set_event_log_name(&mut self, value: impl Into<String>) {
        self.get_or_insert().event_log_name = Some(value.into());
    }
}

impl Task {
    pub fn primary_trigger(&self) -> PrimaryView<'_, Trigger> {
        PrimaryView::new(&self.triggers)
    }

    pub fn primary_trigger_mut(&mut self) -> PrimaryMut<'_, Trigger> {
        PrimaryMut::new(&mut self.triggers)
    }

    pub fn primary_action(&self) -> PrimaryView<'_, Action> {
        PrimaryView::new(&self.actions)
    }

    pub fn primary_action_mut(&mut self) -> PrimaryMut<'_, Action> {
        PrimaryMut::new(&mut self.actions)
    }
}
