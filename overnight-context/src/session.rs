//! Session boundary classification for the overnight trading window.
//!
//! Partitions a continuous bar stream into non-overlapping overnight windows
//! (18:00 → next-day 09:30 in the trading timezone). All logic consumes civil
//! date-times produced by a [`SessionClock`]; the bundled [`EasternClock`]
//! converts instants to America/New_York with DST handled by `chrono-tz`.

use crate::bar::BarSource;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// RTH open, seconds from midnight (09:30:00 ET).
const RTH_OPEN_SECS: u32 = 9 * 3600 + 30 * 60;
/// Overnight session open, seconds from midnight (18:00:00 ET).
const OVERNIGHT_OPEN_SECS: u32 = 18 * 3600;

/// Market session taxonomy.
///
/// `Extended` is reserved for future pre/post-market splits and is never
/// produced by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SessionKind {
    Overnight,
    Rth,
    Extended,
}

impl SessionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Overnight => "OVERNIGHT",
            SessionKind::Rth => "RTH",
            SessionKind::Extended => "EXTENDED",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Converts bar instants into civil date-times in the trading timezone.
///
/// The analytics core never touches timezone math directly; callers with a
/// bespoke calendar substitute their own implementation.
pub trait SessionClock {
    fn civil(&self, instant: chrono::DateTime<chrono::Utc>) -> NaiveDateTime;
}

/// America/New_York clock, DST-correct via the tz database.
#[derive(Debug, Clone, Copy, Default)]
pub struct EasternClock;

impl SessionClock for EasternClock {
    fn civil(&self, instant: chrono::DateTime<chrono::Utc>) -> NaiveDateTime {
        instant.with_timezone(&New_York).naive_local()
    }
}

/// One resolved overnight session: civil bounds plus the bar-index range
/// covering it in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub start_index: usize,
    pub end_index: usize,
    pub kind: SessionKind,
}

impl SessionWindow {
    /// Number of bar indices covered, inclusive of both bounds.
    pub fn bar_count(&self) -> usize {
        self.end_index.saturating_sub(self.start_index) + 1
    }

    /// Check whether a civil time falls inside the window bounds.
    pub fn contains(&self, civil: NaiveDateTime) -> bool {
        civil >= self.start && civil <= self.end
    }
}

/// Classify a civil date-time: overnight iff strictly after 18:00 or strictly
/// before 09:30, otherwise RTH.
pub fn classify(civil: NaiveDateTime) -> SessionKind {
    let secs = civil.time().num_seconds_from_midnight();
    if secs > OVERNIGHT_OPEN_SECS || secs < RTH_OPEN_SECS {
        SessionKind::Overnight
    } else {
        SessionKind::Rth
    }
}

/// A boundary occurs when the classification flips between consecutive bars,
/// or when there is no previous bar.
pub fn is_boundary(prev: Option<NaiveDateTime>, curr: NaiveDateTime) -> bool {
    match prev {
        None => true,
        Some(prev) => classify(prev) != classify(curr),
    }
}

/// Build a civil date-time at a fixed seconds-from-midnight offset.
fn at_secs(date: NaiveDate, secs: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap_or(NaiveTime::MIN))
}

/// Resolve the overnight window relevant to the anchor bar.
///
/// Window start is 18:00 on the anchor date when the anchor sits in the
/// evening part of the session, otherwise 18:00 on the previous calendar day
/// (morning part, or the most recently completed session during RTH). The end
/// is always 09:30 the next calendar day.
///
/// Never fails: with sparse data the index search degrades to the anchor
/// index, and an empty source yields a degenerate single-index window.
pub fn resolve_overnight_window<S, C>(source: &S, clock: &C, anchor_index: usize) -> SessionWindow
where
    S: BarSource + ?Sized,
    C: SessionClock,
{
    let anchor = anchor_index.min(source.len().saturating_sub(1));
    let Some(bar) = source.bar(anchor) else {
        // Empty source: a window no bar will ever fall into.
        return SessionWindow {
            start: NaiveDateTime::MIN,
            end: NaiveDateTime::MIN,
            start_index: 0,
            end_index: 0,
            kind: SessionKind::Overnight,
        };
    };

    let civil = clock.civil(bar.time);
    let secs = civil.time().num_seconds_from_midnight();
    let date = civil.date();

    let start_date = if secs > OVERNIGHT_OPEN_SECS {
        // Evening part of the overnight session
        date
    } else {
        // Morning part, or RTH (most recently completed session)
        date.pred_opt().unwrap_or(date)
    };

    let start = at_secs(start_date, OVERNIGHT_OPEN_SECS);
    let end = at_secs(start_date.succ_opt().unwrap_or(start_date), RTH_OPEN_SECS);

    let start_index = find_time_index(source, clock, anchor, start);
    let end_index = find_time_index(source, clock, anchor, end);

    debug!(
        %start,
        %end,
        start_index,
        end_index,
        "resolved overnight session window"
    );

    SessionWindow {
        start,
        end,
        start_index,
        end_index,
        kind: SessionKind::Overnight,
    }
}

/// Two-phase index search tolerating missing bars at exact boundaries.
///
/// Backward from the anchor for the last bar at or before the target, then
/// forward from the front for the first bar at or after it, falling back to
/// the anchor. The forward phase restarts at index 0: when the backward phase
/// misses, every bar up to the anchor is already past the target.
fn find_time_index<S, C>(source: &S, clock: &C, anchor: usize, target: NaiveDateTime) -> usize
where
    S: BarSource + ?Sized,
    C: SessionClock,
{
    for index in (0..=anchor).rev() {
        if let Some(bar) = source.bar(index) {
            if clock.civil(bar.time) <= target {
                return index;
            }
        }
    }

    for index in 0..source.len() {
        if let Some(bar) = source.bar(index) {
            if clock.civil(bar.time) >= target {
                return index;
            }
        }
    }

    anchor
}

/// Trading date a bar belongs to: bars after 18:00 roll to the next calendar
/// day's session.
pub fn market_date(civil: NaiveDateTime) -> NaiveDate {
    let date = civil.date();
    if civil.time().num_seconds_from_midnight() > OVERNIGHT_OPEN_SECS {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Next RTH open (09:30) at or after the given civil time.
pub fn next_rth_open(civil: NaiveDateTime) -> NaiveDateTime {
    let date = civil.date();
    if civil.time().num_seconds_from_midnight() < RTH_OPEN_SECS {
        at_secs(date, RTH_OPEN_SECS)
    } else {
        at_secs(date.succ_opt().unwrap_or(date), RTH_OPEN_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use chrono::{TimeZone, Utc};

    fn civil(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    /// Bar whose New York civil time equals the given components (winter,
    /// EST = UTC-5).
    fn est_bar(d: u32, h: u32, mi: u32) -> Bar {
        let local = civil(2024, 1, d, h, mi, 0);
        Bar {
            time: Utc.from_utc_datetime(&(local + chrono::TimeDelta::hours(5))),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10,
        }
    }

    #[test]
    fn test_classify_flips_exactly_at_session_edges() {
        struct TestCase {
            input: NaiveDateTime,
            expected: SessionKind,
        }

        let tests = vec![
            // TC0: one second before RTH open
            TestCase {
                input: civil(2024, 1, 8, 9, 29, 59),
                expected: SessionKind::Overnight,
            },
            // TC1: exactly at RTH open
            TestCase {
                input: civil(2024, 1, 8, 9, 30, 0),
                expected: SessionKind::Rth,
            },
            // TC2: exactly at 18:00 still RTH (overnight starts strictly after)
            TestCase {
                input: civil(2024, 1, 8, 18, 0, 0),
                expected: SessionKind::Rth,
            },
            // TC3: one second after 18:00
            TestCase {
                input: civil(2024, 1, 8, 18, 0, 1),
                expected: SessionKind::Overnight,
            },
            // TC4: midnight
            TestCase {
                input: civil(2024, 1, 9, 0, 0, 0),
                expected: SessionKind::Overnight,
            },
            // TC5: mid RTH
            TestCase {
                input: civil(2024, 1, 8, 12, 0, 0),
                expected: SessionKind::Rth,
            },
            // TC6: no flip at RTH close (16:00 stays Rth under two-way split)
            TestCase {
                input: civil(2024, 1, 8, 16, 0, 1),
                expected: SessionKind::Rth,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(classify(test.input), test.expected, "TC{index} failed");
        }
    }

    #[test]
    fn test_first_bar_is_always_boundary() {
        assert!(is_boundary(None, civil(2024, 1, 8, 12, 0, 0)));
    }

    #[test]
    fn test_boundary_only_on_classification_flip() {
        let evening = civil(2024, 1, 8, 19, 0, 0);
        let later_evening = civil(2024, 1, 8, 23, 0, 0);
        let morning_open = civil(2024, 1, 9, 9, 30, 0);
        assert!(!is_boundary(Some(evening), later_evening));
        assert!(is_boundary(Some(later_evening), morning_open));
    }

    #[test]
    fn test_resolve_window_morning_anchor_starts_previous_day() {
        // Bars: 17:55 day 8, 19:00 day 8, 02:00 day 9 (anchor)
        let bars = vec![est_bar(8, 17, 55), est_bar(8, 19, 0), est_bar(9, 2, 0)];
        let window = resolve_overnight_window(&bars, &EasternClock, 2);

        assert_eq!(window.start, civil(2024, 1, 8, 18, 0, 0));
        assert_eq!(window.end, civil(2024, 1, 9, 9, 30, 0));
        // Backward search: first bar at or before 18:00 is the 17:55 bar.
        assert_eq!(window.start_index, 0);
        // No bar reaches 09:30 day 9: backward search stops at the anchor.
        assert_eq!(window.end_index, 2);
        assert_eq!(window.kind, SessionKind::Overnight);
    }

    #[test]
    fn test_resolve_window_session_opens_at_first_bar() {
        // No bar at or before 18:00: the forward phase picks the first bar
        // after the boundary as the session open.
        let bars = vec![est_bar(8, 19, 0), est_bar(8, 23, 0)];
        let window = resolve_overnight_window(&bars, &EasternClock, 1);
        assert_eq!(window.start_index, 0);
    }

    #[test]
    fn test_resolve_window_evening_anchor_starts_same_day() {
        let bars = vec![est_bar(8, 18, 30), est_bar(8, 20, 0)];
        let window = resolve_overnight_window(&bars, &EasternClock, 1);
        assert_eq!(window.start, civil(2024, 1, 8, 18, 0, 0));
        assert_eq!(window.end, civil(2024, 1, 9, 9, 30, 0));
    }

    #[test]
    fn test_resolve_window_rth_anchor_uses_completed_session() {
        let bars = vec![est_bar(8, 19, 0), est_bar(9, 2, 0), est_bar(9, 10, 0)];
        let window = resolve_overnight_window(&bars, &EasternClock, 2);
        assert_eq!(window.start, civil(2024, 1, 8, 18, 0, 0));
        assert_eq!(window.end, civil(2024, 1, 9, 9, 30, 0));
    }

    #[test]
    fn test_resolve_window_empty_source_degrades() {
        let bars: Vec<Bar> = Vec::new();
        let window = resolve_overnight_window(&bars, &EasternClock, 5);
        assert_eq!(window.start_index, 0);
        assert_eq!(window.end_index, 0);
    }

    #[test]
    fn test_window_bar_count_and_contains() {
        let window = SessionWindow {
            start: civil(2024, 1, 8, 18, 0, 0),
            end: civil(2024, 1, 9, 9, 30, 0),
            start_index: 3,
            end_index: 7,
            kind: SessionKind::Overnight,
        };
        assert_eq!(window.bar_count(), 5);
        assert!(window.contains(civil(2024, 1, 9, 2, 0, 0)));
        assert!(!window.contains(civil(2024, 1, 9, 12, 0, 0)));
    }

    #[test]
    fn test_market_date_rolls_after_overnight_open() {
        let evening = civil(2024, 1, 8, 18, 0, 1);
        let afternoon = civil(2024, 1, 8, 15, 0, 0);
        assert_eq!(market_date(evening), NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
        assert_eq!(market_date(afternoon), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn test_next_rth_open() {
        assert_eq!(
            next_rth_open(civil(2024, 1, 9, 2, 0, 0)),
            civil(2024, 1, 9, 9, 30, 0)
        );
        assert_eq!(
            next_rth_open(civil(2024, 1, 9, 11, 0, 0)),
            civil(2024, 1, 10, 9, 30, 0)
        );
    }

    #[test]
    fn test_eastern_clock_handles_dst() {
        // 2024-03-10 07:00 UTC is 02:00 EST; 2024-03-10 07:00+1h is 03:00 EDT
        // (spring-forward skips 02:00-03:00 local).
        let before = Utc.with_ymd_and_hms(2024, 3, 10, 6, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
        assert_eq!(EasternClock.civil(before).time().hour(), 1);
        assert_eq!(EasternClock.civil(after).time().hour(), 3);
    }
}
