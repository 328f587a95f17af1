//! Calendar enums and their native bitmask encoding
//!
//! The native scheduler stores weekdays, months and week ordinals as bitmasks.
//! The model keeps them as ordered sets of named values; this module converts
//! between the two and applies the empty-set policies on encode.

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Day of week, Monday first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum DayOfWeek {
    #[default]
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
            DayOfWeek::Sunday => "Sunday",
        }
    }

    /// Native bit (Sunday = 0x01 ... Saturday = 0x40)
    pub fn bit(self) -> u16 {
        match self {
            DayOfWeek::Sunday => 0x01,
            DayOfWeek::Monday => 0x02,
            DayOfWeek::Tuesday => 0x04,
            DayOfWeek::Wednesday => 0x08,
            DayOfWeek::Thursday => 0x10,
            DayOfWeek::Friday => 0x20,
            DayOfWeek::Saturday => 0x40,
        }
    }
}

impl From<chrono::Weekday> for DayOfWeek {
    fn from(wd: chrono::Weekday) -> Self {
        match wd {
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
            chrono::Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl From<DayOfWeek> for chrono::Weekday {
    fn from(day: DayOfWeek) -> Self {
        match day {
            DayOfWeek::Monday => chrono::Weekday::Mon,
            DayOfWeek::Tuesday => chrono::Weekday::Tue,
            DayOfWeek::Wednesday => chrono::Weekday::Wed,
            DayOfWeek::Thursday => chrono::Weekday::Thu,
            DayOfWeek::Friday => chrono::Weekday::Fri,
            DayOfWeek::Saturday => chrono::Weekday::Sat,
            DayOfWeek::Sunday => chrono::Weekday::Sun,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DayOfWeek {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DayOfWeek::ALL
            .into_iter()
            .find(|d| matches_name(d.name(), wanted))
            .ok_or_else(|| FormatError::Weekday(s.to_string()))
    }
}

/// Month of year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MonthOfYear {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl MonthOfYear {
    pub const ALL: [MonthOfYear; 12] = [
        MonthOfYear::January,
        MonthOfYear::February,
        MonthOfYear::March,
        MonthOfYear::April,
        MonthOfYear::May,
        MonthOfYear::June,
        MonthOfYear::July,
        MonthOfYear::August,
        MonthOfYear::September,
        MonthOfYear::October,
        MonthOfYear::November,
        MonthOfYear::December,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MonthOfYear::January => "January",
            MonthOfYear::February => "February",
            MonthOfYear::March => "March",
            MonthOfYear::April => "April",
            MonthOfYear::May => "May",
            MonthOfYear::June => "June",
            MonthOfYear::July => "July",
            MonthOfYear::August => "August",
            MonthOfYear::September => "September",
            MonthOfYear::October => "October",
            MonthOfYear::November => "November",
            MonthOfYear::December => "December",
        }
    }

    /// 1-based month number
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(month: u32) -> Option<Self> {
        MonthOfYear::ALL.get(month.checked_sub(1)? as usize).copied()
    }

    /// Native bit (January = 0x001 ... December = 0x800)
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for MonthOfYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MonthOfYear {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MonthOfYear::ALL
            .into_iter()
            .find(|m| matches_name(m.name(), wanted))
            .ok_or_else(|| FormatError::Month(s.to_string()))
    }
}

/// Which week of the month a monthly-by-weekday trigger fires in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum WeekOfMonth {
    #[default]
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl WeekOfMonth {
    pub const ALL: [WeekOfMonth; 5] = [
        WeekOfMonth::First,
        WeekOfMonth::Second,
        WeekOfMonth::Third,
        WeekOfMonth::Fourth,
        WeekOfMonth::Last,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WeekOfMonth::First => "First",
            WeekOfMonth::Second => "Second",
            WeekOfMonth::Third => "Third",
            WeekOfMonth::Fourth => "Fourth",
            WeekOfMonth::Last => "Last",
        }
    }

    /// Native bit (First = 0x01 ... Last = 0x10)
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Ordinal as written in the native XML (`1`..`4`, `Last`)
    pub fn xml_token(self) -> &'static str {
        match self {
            WeekOfMonth::First => "1",
            WeekOfMonth::Second => "2",
            WeekOfMonth::Third => "3",
            WeekOfMonth::Fourth => "4",
            WeekOfMonth::Last => "Last",
        }
    }
}

impl fmt::Display for WeekOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WeekOfMonth {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        WeekOfMonth::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(wanted) || w.xml_token() == wanted)
            .ok_or_else(|| FormatError::WeekOfMonth(s.to_string()))
    }
}

fn matches_name(full: &str, wanted: &str) -> bool {
    full.eq_ignore_ascii_case(wanted)
        || (wanted.len() == 3 && full[..3].eq_ignore_ascii_case(wanted))
}

/// Native days-of-week bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaysOfWeekMask(pub u16);

impl DaysOfWeekMask {
    pub fn contains(self, day: DayOfWeek) -> bool {
        self.0 & day.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & 0x7F == 0
    }
}

/// Native months-of-year bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonthsMask(pub u16);

impl MonthsMask {
    pub const ALL: MonthsMask = MonthsMask(0x0FFF);

    pub fn contains(self, month: MonthOfYear) -> bool {
        self.0 & month.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 & 0x0FFF == 0
    }
}

/// Native weeks-of-month bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeeksOfMonthMask(pub u8);

impl WeeksOfMonthMask {
    pub fn contains(self, week: WeekOfMonth) -> bool {
        self.0 & week.bit() != 0
    }

    /// First ordinal present, Last only when no numbered week is set
    pub fn first(self) -> Option<WeekOfMonth> {
        WeekOfMonth::ALL.into_iter().find(|w| self.contains(*w))
    }
}

impl From<WeekOfMonth> for WeeksOfMonthMask {
    fn from(week: WeekOfMonth) -> Self {
        WeeksOfMonthMask(week.bit())
    }
}

/// Encode a weekday set; an empty set becomes Monday so the trigger can fire.
pub fn encode_weekday_set(days: &BTreeSet<DayOfWeek>) -> DaysOfWeekMask {
    let mask = days.iter().fold(0u16, |acc, d| acc | d.bit());
    if mask == 0 {
        DaysOfWeekMask(DayOfWeek::Monday.bit())
    } else {
        DaysOfWeekMask(mask)
    }
}

pub fn decode_weekday_set(mask: DaysOfWeekMask) -> BTreeSet<DayOfWeek> {
    DayOfWeek::ALL.into_iter().filter(|d| mask.contains(*d)).collect()
}

/// Encode a month set; an empty set means every month.
pub fn encode_month_set(months: &BTreeSet<MonthOfYear>) -> MonthsMask {
    let mask = months.iter().fold(0u16, |acc, m| acc | m.bit());
    if mask == 0 {
        MonthsMask::ALL
    } else {
        MonthsMask(mask)
    }
}

pub fn decode_month_set(mask: MonthsMask) -> BTreeSet<MonthOfYear> {
    MonthOfYear::ALL.into_iter().filter(|m| mask.contains(*m)).collect()
}

/// Parse a list of day names, e.g. from a legacy string field.
pub fn parse_weekday_names<'a, I>(names: I) -> Result<BTreeSet<DayOfWeek>, FormatError>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().map(str::parse).collect()
}
