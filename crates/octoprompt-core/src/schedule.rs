//! Schedule definitions — the core data model for recurring prompt fires.
//!
//! Schedules are owned by the config file and are read-only to the
//! engine; the only mutation path is `ConfigHandle::toggle_schedule`.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single scheduled prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// Unique schedule id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the schedule is armed.
    pub enabled: bool,
    /// Prompt file, relative to the prompts directory.
    pub prompt_file: String,
    /// When to fire.
    pub schedule: ScheduleTiming,
    /// Delivery options.
    #[serde(default)]
    pub options: ScheduleOptions,
}

/// When a schedule fires: a time of day, optionally restricted to weekdays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTiming {
    /// Timing kind. Only "daily" exists today.
    #[serde(rename = "type", default = "default_timing_type")]
    pub timing_type: String,
    /// Time of day, "HH:MM".
    pub time: String,
    /// Weekday abbreviations ("mon".."sun"). Absent means every day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<String>>,
}

fn default_timing_type() -> String {
    "daily".into()
}

impl ScheduleTiming {
    /// Parses the "HH:MM" time string. `None` if malformed.
    pub fn time_parts(&self) -> Option<(u32, u32)> {
        let mut parts = self.time.split(':');
        let hour: u32 = parts.next()?.trim().parse().ok()?;
        let minute: u32 = parts.next()?.trim().parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        Some((hour, minute))
    }

    /// The allowed weekday set. `None` means "every day".
    ///
    /// A present-but-empty list (or a list of unrecognized names) yields an
    /// empty set, which allows no day at all — deliberately not a daily
    /// fallback, so a typo'd weekday list fails loudly instead of firing
    /// every day.
    pub fn weekday_set(&self) -> Option<HashSet<Weekday>> {
        self.days_of_week.as_ref().map(|days| {
            days.iter()
                .filter_map(|d| parse_weekday(d))
                .collect::<HashSet<_>>()
        })
    }
}

fn parse_weekday(abbrev: &str) -> Option<Weekday> {
    match abbrev.to_ascii_lowercase().as_str() {
        "sun" => Some(Weekday::Sun),
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        _ => None,
    }
}

/// Per-schedule delivery options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOptions {
    /// Bring the assistant to the foreground before delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activate: Option<bool>,
    /// Start a fresh conversation for each fire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_conversation: Option<bool>,
    /// Block until the assistant responds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_response: Option<bool>,
    /// Slack channel override for this schedule's events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_channel: Option<String>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            activate: Some(true),
            new_conversation: Some(true),
            wait_for_response: Some(false),
            slack_channel: None,
        }
    }
}
