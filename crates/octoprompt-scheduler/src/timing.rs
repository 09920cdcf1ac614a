//! Fire-time computation — pure functions over a schedule's timing spec.
//!
//! All computation happens on naive wall-clock time; conversion to and
//! from UTC instants lives at the edges so the search itself is
//! deterministic and clock-injectable in tests.

use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use octoprompt_core::ScheduleTiming;

/// Days searched for the next occurrence: today plus seven more always
/// contains a match when at least one weekday is allowed.
pub const SEARCH_WINDOW_DAYS: i64 = 8;

/// The earliest instant strictly after `after` that matches the timing
/// spec. `None` when the time string is malformed or no weekday is
/// allowed.
pub fn next_fire_date(timing: &ScheduleTiming, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let (hour, minute) = timing.time_parts()?;
    let allowed = timing.weekday_set();

    for day_offset in 0..SEARCH_WINDOW_DAYS {
        let day = after.date() + Duration::days(day_offset);
        let Some(candidate) = day.and_hms_opt(hour, minute, 0) else {
            continue;
        };
        // Strictly greater: a fire exactly at `after` rolls to the next slot.
        if candidate <= after {
            continue;
        }
        if let Some(days) = &allowed {
            if !days.contains(&candidate.weekday()) {
                continue;
            }
        }
        return Some(candidate);
    }
    None
}

/// Wall-clock naive time → UTC instant. `None` for local times that do
/// not exist (DST spring-forward gap).
pub fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// UTC instant → wall-clock naive time.
pub fn utc_to_local_naive(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&Local).naive_local()
}
