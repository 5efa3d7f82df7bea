//! `Schedule` and `TimeWindow` (spec.md §3): a named, timezone-scoped list
//! of active windows plus an optional daily reset time.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use chrono_tz::Tz;

/// `(start_local, end_local, weekdays, overnight_flag)`. A window with
/// `start_local > end_local`, or `overnight == true`, spans midnight:
/// `[start_local, 24:00) ∪ [00:00, end_local)`.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    pub start_local: NaiveTime,
    pub end_local: NaiveTime,
    pub weekdays: Vec<Weekday>,
    pub overnight: bool,
}

impl TimeWindow {
    pub fn new(start_local: NaiveTime, end_local: NaiveTime, weekdays: Vec<Weekday>) -> Self {
        let overnight = start_local > end_local;
        TimeWindow {
            start_local,
            end_local,
            weekdays,
            overnight,
        }
    }

    fn spans_midnight(&self) -> bool {
        self.overnight || self.start_local > self.end_local
    }

    /// Whether `local_dt` falls inside this window. For an overnight
    /// window, the late-night half (`t >= start`) is attributed to
    /// `local_dt`'s own weekday, and the early-morning half (`t < end`) is
    /// attributed to the previous calendar day's weekday — matching a
    /// window that started the evening before.
    pub fn contains(&self, local_dt: NaiveDateTime) -> bool {
        let t = local_dt.time();
        let weekday = local_dt.weekday();
        if self.spans_midnight() {
            if t >= self.start_local {
                return self.weekdays.contains(&weekday);
            }
            if t < self.end_local {
                return self.weekdays.contains(&weekday.pred());
            }
            false
        } else {
            t >= self.start_local && t < self.end_local && self.weekdays.contains(&weekday)
        }
    }
}

/// `(name, timezone, windows, reset_time)` (spec.md §3).
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub timezone: Tz,
    pub windows: Vec<TimeWindow>,
    pub reset_time: Option<NaiveTime>,
    pub reset_tolerance: Duration,
    pub warning_before_reset: Duration,
}

impl Schedule {
    pub fn new(name: impl Into<String>, timezone: Tz) -> Self {
        Schedule {
            name: name.into(),
            timezone,
            windows: Vec::new(),
            reset_time: None,
            reset_tolerance: Duration::minutes(1),
            warning_before_reset: Duration::minutes(0),
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.windows.push(window);
        self
    }

    pub fn with_reset(mut self, reset_time: NaiveTime, tolerance: Duration) -> Self {
        self.reset_time = Some(reset_time);
        self.reset_tolerance = tolerance;
        self
    }

    pub fn with_warning(mut self, before: Duration) -> Self {
        self.warning_before_reset = before;
        self
    }

    /// Whether a session bound to this schedule should be active at
    /// `local_dt` (any window matching counts).
    pub fn is_active_at(&self, local_dt: NaiveDateTime) -> bool {
        self.windows.iter().any(|w| w.contains(local_dt))
    }

    /// `Some(true)` if `local_dt.time()` falls within
    /// `[reset_time, reset_time + tolerance]` and `last_reset_date` isn't
    /// already today, `Some(false)` if the reset time hasn't been reached
    /// or was already handled today, `None` if no reset is configured.
    pub fn reset_due(&self, local_dt: NaiveDateTime, last_reset_date: Option<NaiveDate>) -> Option<bool> {
        let reset_time = self.reset_time?;
        if last_reset_date == Some(local_dt.date()) {
            return Some(false);
        }
        let elapsed = local_dt.time() - reset_time;
        Some(elapsed >= Duration::zero() && elapsed <= self.reset_tolerance)
    }

    pub fn warning_due(&self, local_dt: NaiveDateTime, last_warned_date: Option<NaiveDate>) -> Option<bool> {
        let reset_time = self.reset_time?;
        if self.warning_before_reset <= Duration::zero() {
            return Some(false);
        }
        if last_warned_date == Some(local_dt.date()) {
            return Some(false);
        }
        let warn_at = reset_time - self.warning_before_reset;
        Some(local_dt.time() >= warn_at && local_dt.time() < reset_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn overnight_window_includes_start_minute_and_excludes_end_minute() {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            vec![Weekday::Mon],
        );
        assert!(window.contains(dt(2026, 3, 2, 20, 0))); // Monday 20:00, start inclusive
        assert!(window.contains(dt(2026, 3, 3, 5, 59))); // Tuesday early morning, started Monday
        assert!(!window.contains(dt(2026, 3, 3, 6, 0))); // end exclusive
    }

    #[test]
    fn daytime_window_respects_configured_weekdays() {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        );
        assert!(window.contains(dt(2026, 3, 2, 10, 0))); // Monday
        assert!(!window.contains(dt(2026, 3, 7, 10, 0))); // Saturday
    }

    #[test]
    fn fixed_time_reset_fires_once_within_tolerance() {
        let schedule = Schedule::new("NYSE", chrono_tz::America::New_York)
            .with_reset(NaiveTime::from_hms_opt(17, 0, 0).unwrap(), Duration::minutes(1));

        assert_eq!(schedule.reset_due(dt(2026, 3, 2, 16, 59), None), Some(false));
        assert_eq!(schedule.reset_due(dt(2026, 3, 2, 17, 0), None), Some(true));
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(schedule.reset_due(dt(2026, 3, 2, 17, 30), Some(today)), Some(false));
        assert_eq!(schedule.reset_due(dt(2026, 3, 3, 17, 0), Some(today)), Some(true));
    }
}
