//! crates/commitment_core/src/windows.rs
//!
//! Time window computation for day and week cycles.
//!
//! A "day" does not start at midnight: the boundary between two day cycles
//! is 04:00 in the reference timezone, so a late-night submission still
//! counts toward the previous evening. Weeks start on Sunday 00:00 local.
//! The reference timezone is explicit configuration; nothing here consults
//! the ambient system zone.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};

use crate::domain::CycleType;
use crate::error::CommitmentError;

/// Local hour at which one day cycle ends and the next begins.
pub const DAY_BOUNDARY_HOUR: u32 = 4;

/// Which kind of interval a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Progress so far in the current cycle; ends at "now".
    Manual,
    /// The just-completed full cycle, for scheduled recap runs fired at the
    /// boundary.
    Automated,
}

/// An interval of instants. `start` is inclusive and `end` exclusive for
/// membership tests; the recap day enumeration is inclusive of both
/// endpoint dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CycleWindow {
    /// Every local calendar date touched by the window, inclusive of both
    /// endpoint dates.
    pub fn local_days(&self, tz: FixedOffset) -> Vec<NaiveDate> {
        let first = self.start.with_timezone(&tz).date_naive();
        let last = self.end.with_timezone(&tz).date_naive();
        let mut days = Vec::new();
        let mut day = first;
        while day <= last {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }
}

/// Computes cycle windows against a fixed reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct WindowCalculator {
    tz: FixedOffset,
}

impl WindowCalculator {
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> FixedOffset {
        self.tz
    }

    /// The local calendar date of an instant.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// 04:00 local on the calendar date of `at`. Sits ahead of `at` when
    /// `at` falls between midnight and the boundary.
    fn calendar_day_boundary(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local = at.with_timezone(&self.tz);
        self.tz
            .with_ymd_and_hms(
                local.year(),
                local.month(),
                local.day(),
                DAY_BOUNDARY_HOUR,
                0,
                0,
            )
            .single()
            .expect("fixed-offset conversions are unambiguous")
            .with_timezone(&Utc)
    }

    /// The most recent day boundary at or before `at`.
    pub fn day_cycle_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let boundary = self.calendar_day_boundary(at);
        if at.with_timezone(&self.tz).hour() < DAY_BOUNDARY_HOUR {
            boundary - Duration::hours(24)
        } else {
            boundary
        }
    }

    /// The most recent Sunday 00:00 local at or before `at`.
    pub fn week_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local = at.with_timezone(&self.tz);
        let days_back = local.weekday().num_days_from_sunday();
        let sunday = local.date_naive() - Duration::days(i64::from(days_back));
        self.tz
            .with_ymd_and_hms(sunday.year(), sunday.month(), sunday.day(), 0, 0, 0)
            .single()
            .expect("fixed-offset conversions are unambiguous")
            .with_timezone(&Utc)
    }

    /// The window for a cycle at `now`.
    ///
    /// Automated daily windows always anchor on the boundary of the current
    /// local calendar date, so a run fired at the boundary captures exactly
    /// the prior full cycle.
    pub fn window(
        &self,
        cycle: CycleType,
        mode: WindowMode,
        now: DateTime<Utc>,
    ) -> Result<CycleWindow, CommitmentError> {
        let window = match cycle {
            CycleType::Daily => match mode {
                WindowMode::Automated => {
                    let boundary = self.calendar_day_boundary(now);
                    CycleWindow {
                        start: boundary - Duration::hours(24),
                        end: boundary,
                    }
                }
                WindowMode::Manual => CycleWindow {
                    start: self.day_cycle_start(now),
                    end: now,
                },
            },
            CycleType::Weekly => {
                let week_start = self.week_start(now);
                match mode {
                    WindowMode::Automated => CycleWindow {
                        start: week_start - Duration::days(7),
                        end: week_start,
                    },
                    WindowMode::Manual => CycleWindow {
                        start: week_start,
                        end: now,
                    },
                }
            }
        };

        if window.start >= window.end {
            return Err(CommitmentError::InvalidRange {
                start: window.start,
                end: window.end,
            });
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // UTC-5, the reference zone the defaults assume.
    fn tz() -> FixedOffset {
        FixedOffset::east_opt(-5 * 3600).unwrap()
    }

    fn calc() -> WindowCalculator {
        WindowCalculator::new(tz())
    }

    /// An instant given as local wall-clock time in the reference zone.
    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        tz().with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn manual_daily_after_boundary_starts_at_todays_boundary() {
        let now = local(2024, 1, 15, 9, 30, 0);
        let window = calc()
            .window(CycleType::Daily, WindowMode::Manual, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 15, 4, 0, 0));
        assert_eq!(window.end, now);
    }

    #[test]
    fn manual_daily_before_boundary_starts_at_previous_boundary() {
        let now = local(2024, 1, 15, 3, 59, 0);
        let window = calc()
            .window(CycleType::Daily, WindowMode::Manual, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 14, 4, 0, 0));
        assert_eq!(window.end, now);
    }

    #[test]
    fn manual_daily_starts_jump_24h_across_the_boundary() {
        let before = calc()
            .window(CycleType::Daily, WindowMode::Manual, local(2024, 1, 15, 3, 59, 0))
            .unwrap();
        let after = calc()
            .window(CycleType::Daily, WindowMode::Manual, local(2024, 1, 15, 4, 1, 0))
            .unwrap();
        assert_eq!(after.start - before.start, Duration::hours(24));
    }

    #[test]
    fn automated_daily_is_exactly_24h_ending_at_todays_boundary() {
        let now = local(2024, 1, 15, 4, 0, 30);
        let window = calc()
            .window(CycleType::Daily, WindowMode::Automated, now)
            .unwrap();
        assert_eq!(window.end, local(2024, 1, 15, 4, 0, 0));
        assert_eq!(window.end - window.start, Duration::hours(24));
    }

    #[test]
    fn automated_daily_anchors_on_the_calendar_date_even_before_the_boundary() {
        // A run fired slightly early still closes at today's 04:00.
        let now = local(2024, 1, 15, 2, 0, 0);
        let window = calc()
            .window(CycleType::Daily, WindowMode::Automated, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 14, 4, 0, 0));
        assert_eq!(window.end, local(2024, 1, 15, 4, 0, 0));
    }

    #[test]
    fn weekly_manual_starts_on_the_most_recent_sunday() {
        // 2024-01-17 is a Wednesday.
        let now = local(2024, 1, 17, 12, 0, 0);
        let window = calc()
            .window(CycleType::Weekly, WindowMode::Manual, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 14, 0, 0, 0));
        assert_eq!(window.end, now);
    }

    #[test]
    fn weekly_manual_on_a_sunday_starts_that_same_day() {
        let now = local(2024, 1, 14, 10, 0, 0);
        let window = calc()
            .window(CycleType::Weekly, WindowMode::Manual, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 14, 0, 0, 0));
    }

    #[test]
    fn weekly_automated_covers_the_previous_week() {
        let now = local(2024, 1, 17, 20, 0, 0);
        let window = calc()
            .window(CycleType::Weekly, WindowMode::Automated, now)
            .unwrap();
        assert_eq!(window.start, local(2024, 1, 7, 0, 0, 0));
        assert_eq!(window.end, local(2024, 1, 14, 0, 0, 0));
    }

    #[test]
    fn degenerate_manual_window_at_the_exact_boundary_is_rejected() {
        let at_boundary = calc().window(
            CycleType::Daily,
            WindowMode::Manual,
            local(2024, 1, 15, 4, 0, 0),
        );
        assert!(matches!(
            at_boundary,
            Err(CommitmentError::InvalidRange { .. })
        ));

        let at_week_start = calc().window(
            CycleType::Weekly,
            WindowMode::Manual,
            local(2024, 1, 14, 0, 0, 0),
        );
        assert!(matches!(
            at_week_start,
            Err(CommitmentError::InvalidRange { .. })
        ));
    }

    #[test]
    fn local_days_enumeration_includes_both_endpoint_dates() {
        let window = calc()
            .window(
                CycleType::Weekly,
                WindowMode::Automated,
                local(2024, 1, 17, 20, 0, 0),
            )
            .unwrap();
        let days = window.local_days(tz());
        assert_eq!(days.len(), 8);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(days[7], NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
    }

    #[test]
    fn local_date_respects_the_reference_offset() {
        // 03:00 UTC is 22:00 the previous local day at UTC-5.
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        assert_eq!(
            calc().local_date(at),
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()
        );
    }
}
