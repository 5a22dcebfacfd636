//! Weekly window math in the campaign's local timezone.
//!
//! Schedule rules are stored as a weekday plus local start/end times; the
//! engine works in UTC instants. These functions do the conversion under
//! the timezone's real rules: a start time that falls in a spring-forward
//! gap shifts to the first valid wall time, and an ambiguous fall-back time
//! takes the earlier instant so a weekly edge never resolves twice.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// One weekly rule's window shape.
#[derive(Debug, Clone, Copy)]
pub struct WeeklyWindow {
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut naive = date.and_time(time);
    for _ in 0..4 {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _later) => return earlier.with_timezone(&Utc),
            LocalResult::None => naive += Duration::hours(1),
        }
    }
    // No zone in the tz database has a gap this long; read the wall time
    // as UTC rather than looping.
    naive.and_utc()
}

/// First window-start instant strictly after `after`.
#[must_use]
pub fn next_window_start(window: &WeeklyWindow, tz: Tz, after: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = after.with_timezone(&tz).date_naive();
    for offset in 0..=7 {
        let date = local_date + Duration::days(offset);
        if date.weekday() != window.day_of_week {
            continue;
        }
        let start = resolve_local(tz, date, window.start_time);
        if start > after {
            return start;
        }
    }
    // A weekday recurs within seven days, so the loop always returns.
    after + Duration::days(7)
}

/// The edge a newly created or edited rule should fire on next: today's
/// window when it is still open (a late fire inside the window is valid),
/// otherwise the next weekly occurrence.
#[must_use]
pub fn first_window_start(window: &WeeklyWindow, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = now.with_timezone(&tz).date_naive();
    for offset in 0..=7 {
        let date = local_date + Duration::days(offset);
        if date.weekday() != window.day_of_week {
            continue;
        }
        let end = resolve_local(tz, date, window.end_time);
        if end > now {
            return resolve_local(tz, date, window.start_time);
        }
    }
    now + Duration::days(7)
}

/// End instant of the window whose start edge is `start`.
#[must_use]
pub fn window_end_for_start(window: &WeeklyWindow, tz: Tz, start: DateTime<Utc>) -> DateTime<Utc> {
    let date = start.with_timezone(&tz).date_naive();
    resolve_local(tz, date, window.end_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday_business_hours() -> WeeklyWindow {
        WeeklyWindow {
            day_of_week: Weekday::Mon,
            start_time: t(9, 0),
            end_time: t(18, 0),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn next_start_lands_on_the_coming_weekday() {
        // Buenos Aires is UTC-3 year round; Wednesday June 4th 2025.
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        let next = next_window_start(&monday_business_hours(), tz, utc(2025, 6, 4, 12, 0));
        // Monday June 9th, 09:00 local.
        assert_eq!(next, utc(2025, 6, 9, 12, 0));
    }

    #[test]
    fn next_start_can_be_later_the_same_day() {
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        // Monday June 2nd, 06:00 local.
        let next = next_window_start(&monday_business_hours(), tz, utc(2025, 6, 2, 9, 0));
        assert_eq!(next, utc(2025, 6, 2, 12, 0));
    }

    #[test]
    fn next_start_is_strictly_after_the_given_instant() {
        let tz: Tz = "UTC".parse().unwrap();
        let edge = utc(2025, 6, 2, 9, 0); // Monday 09:00 UTC
        let next = next_window_start(&monday_business_hours(), tz, edge);
        assert_eq!(next, utc(2025, 6, 9, 9, 0));
    }

    #[test]
    fn first_start_returns_the_open_window_even_though_it_began_already() {
        let tz: Tz = "UTC".parse().unwrap();
        // Monday 10:30, inside the 09:00-18:00 window.
        let now = utc(2025, 6, 2, 10, 30);
        let first = first_window_start(&monday_business_hours(), tz, now);
        assert_eq!(first, utc(2025, 6, 2, 9, 0));
        assert!(first <= now);
    }

    #[test]
    fn first_start_skips_a_window_that_already_closed() {
        let tz: Tz = "UTC".parse().unwrap();
        // Monday 19:00, past the window end.
        let now = utc(2025, 6, 2, 19, 0);
        let first = first_window_start(&monday_business_hours(), tz, now);
        assert_eq!(first, utc(2025, 6, 9, 9, 0));
    }

    #[test]
    fn spring_forward_gap_shifts_the_edge_to_valid_wall_time() {
        // New York skipped 02:00-03:00 on Sunday March 9th 2025.
        let tz: Tz = "America/New_York".parse().unwrap();
        let window = WeeklyWindow {
            day_of_week: Weekday::Sun,
            start_time: t(2, 30),
            end_time: t(4, 0),
        };
        let next = next_window_start(&window, tz, utc(2025, 3, 8, 12, 0));
        // 02:30 does not exist; the edge resolves to 03:30 EDT = 07:30 UTC.
        assert_eq!(next, utc(2025, 3, 9, 7, 30));
    }

    #[test]
    fn fall_back_ambiguity_takes_the_earlier_instant() {
        // New York repeated 01:00-02:00 on Sunday November 2nd 2025.
        let tz: Tz = "America/New_York".parse().unwrap();
        let window = WeeklyWindow {
            day_of_week: Weekday::Sun,
            start_time: t(1, 30),
            end_time: t(5, 0),
        };
        let next = next_window_start(&window, tz, utc(2025, 11, 1, 12, 0));
        // First 01:30 is still EDT (UTC-4): 05:30 UTC, not 06:30.
        assert_eq!(next, utc(2025, 11, 2, 5, 30));
    }

    #[test]
    fn window_end_resolves_on_the_start_edge_date() {
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        let start = utc(2025, 6, 2, 12, 0); // Monday 09:00 local
        let end = window_end_for_start(&monday_business_hours(), tz, start);
        assert_eq!(end, utc(2025, 6, 2, 21, 0)); // 18:00 local
    }

    #[test]
    fn consecutive_edges_are_a_week_apart_outside_dst_shifts() {
        let tz: Tz = "America/Argentina/Buenos_Aires".parse().unwrap();
        let first = next_window_start(&monday_business_hours(), tz, utc(2025, 6, 1, 0, 0));
        let second = next_window_start(&monday_business_hours(), tz, first);
        assert_eq!(second - first, Duration::days(7));
    }
}
