//! Task history: event labels and the client-side date filter

use crate::models::HistoryEntry;
use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

/// Display label for a Task Scheduler operational event id
pub fn event_label(event_id: u32) -> String {
    let label = match event_id {
        100 => "Task Started",
        101 => "Task Start Failed",
        102 => "Task Completed",
        103 => "Action Start Failed",
        106 => "Task Registered",
        107 => "Triggered on Scheduler",
        110 => "Triggered by User",
        111 => "Task Terminated",
        129 => "Created Task Process",
        140 => "Task Registration Updated",
        141 => "Task Registration Deleted",
        200 => "Action Started",
        201 => "Action Completed",
        203 => "Action Failed To Start",
        other => return format!("Event {other}"),
    };
    label.to_string()
}

/// Which slice of history to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFilter {
    Today,
    Yesterday,
    /// The last seven days
    Week,
    #[default]
    All,
}

impl HistoryFilter {
    /// Today and Yesterday compare local calendar dates.
    pub fn matches(self, timestamp: DateTime<Utc>, now: DateTime<Local>) -> bool {
        let local = timestamp.with_timezone(&Local).date_naive();
        let today = now.date_naive();
        match self {
            HistoryFilter::Today => local == today,
            HistoryFilter::Yesterday => today.pred_opt() == Some(local),
            HistoryFilter::Week => timestamp >= (now - Duration::days(7)).with_timezone(&Utc),
            HistoryFilter::All => true,
        }
    }

    pub fn apply(self, entries: Vec<HistoryEntry>, now: DateTime<Local>) -> Vec<HistoryEntry> {
        entries
            .into_iter()
            .filter(|e| self.matches(e.timestamp, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            timestamp,
            event_id: 102,
            result_label: event_label(102),
            exit_code: "0".to_string(),
            message: String::new(),
            user: String::new(),
            activity_id: None,
        }
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(event_label(100), "Task Started");
        assert_eq!(event_label(141), "Task Registration Deleted");
        assert_eq!(event_label(203), "Action Failed To Start");
        assert_eq!(event_label(322), "Event 322");
    }

    #[test]
    fn test_filters() {
        let now = Local::now();
        let utc_now = now.with_timezone(&Utc);
        let yesterday = utc_now - Duration::days(1);
        let last_month = utc_now - Duration::days(30);

        assert!(HistoryFilter::Today.matches(utc_now, now));
        assert!(!HistoryFilter::Today.matches(yesterday, now));
        assert!(HistoryFilter::Yesterday.matches(yesterday, now));
        assert!(!HistoryFilter::Yesterday.matches(utc_now, now));
        assert!(HistoryFilter::Week.matches(yesterday, now));
        assert!(!HistoryFilter::Week.matches(last_month, now));
        assert!(HistoryFilter::All.matches(last_month, now));

        let kept = HistoryFilter::Week.apply(vec![entry(utc_now), entry(last_month)], now);
        assert_eq!(kept.len(), 1);
    }
}
