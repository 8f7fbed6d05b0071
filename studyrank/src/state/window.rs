// studyrank/src/state/window.rs
//
// Calendar policy + per-user session window.
//
// Every "calendar day", "hour of day", "week start" and "first of month" in
// the crate goes through CalendarPolicy, so consistency, streak and period
// boundaries always agree with each other. The policy is a single fixed UTC
// offset for the whole population (default: UTC).
//
// UserWindow is the parsed, time-sorted view of one learner's sessions.
// Sessions whose timestamp cannot be parsed never make it into a window.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::events::{Period, Session};

// ── Window durations ──────────────────────────────────────────────────────────

pub const W_15MIN: i64 = 15 * 60;
pub const W_24HR:  i64 = 24 * 60 * 60;

// ── Calendar policy ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarPolicy {
    /// Offset applied to every timestamp before taking its calendar day.
    pub utc_offset_minutes: i32,
    pub week_start: Weekday,
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self { utc_offset_minutes: 0, week_start: Weekday::Mon }
    }
}

impl CalendarPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)) {
            Some(_) => Ok(()),
            None => Err(ConfigError::OutOfRange {
                field: "calendar.utc_offset_minutes",
                value: self.utc_offset_minutes as f64,
            }),
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }

    pub fn day_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.offset()).date_naive()
    }

    pub fn hour_of(&self, ts: DateTime<Utc>) -> u32 {
        ts.with_timezone(&self.offset()).hour()
    }

    /// Local midnight of `date`, as a UTC instant.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN).and_utc();
        local_midnight - Duration::seconds(self.offset().local_minus_utc() as i64)
    }

    /// Earliest instant whose sessions belong to `period` as of `now`.
    pub fn period_start(&self, period: Period, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.day_of(now);
        match period {
            Period::All => DateTime::UNIX_EPOCH,
            Period::Weekly => {
                let back = (7 + today.weekday().num_days_from_monday()
                    - self.week_start.num_days_from_monday())
                    % 7;
                self.start_of_day(today - Duration::days(back as i64))
            }
            Period::Monthly => self.start_of_day(today - Duration::days(today.day0() as i64)),
        }
    }

    /// Inclusive day range of the trailing scoring window ending on `now`'s day.
    /// Shortened when the period started fewer than `max_days` days ago.
    pub fn trailing_days(
        &self,
        now: DateTime<Utc>,
        start: Option<DateTime<Utc>>,
        max_days: u32,
    ) -> (NaiveDate, NaiveDate) {
        let last = self.day_of(now);
        let mut span = max_days.max(1) as i64;
        if let Some(start) = start {
            let since_start = (last - self.day_of(start)).num_days() + 1;
            span = span.min(since_start.max(1));
        }
        (last - Duration::days(span - 1), last)
    }
}

// ── Per-user window ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TimedSession<'a> {
    pub at:      DateTime<Utc>,
    pub day:     NaiveDate,
    pub session: &'a Session,
}

#[derive(Debug)]
pub struct UserWindow<'a> {
    pub sessions: Vec<TimedSession<'a>>, // ascending by `at`
    policy:       CalendarPolicy,
}

impl<'a> UserWindow<'a> {
    pub fn new(sessions: &'a [Session], policy: &CalendarPolicy) -> Self {
        let mut timed: Vec<TimedSession<'a>> = sessions
            .iter()
            .filter_map(|s| {
                let at = s.timestamp()?;
                Some(TimedSession { at, day: policy.day_of(at), session: s })
            })
            .collect();
        timed.sort_by_key(|t| t.at);
        Self { sessions: timed, policy: policy.clone() }
    }

    /// Drop sessions before `start` (period pre-filter).
    pub fn retain_since(mut self, start: Option<DateTime<Utc>>) -> Self {
        if let Some(start) = start {
            self.sessions.retain(|t| t.at >= start);
        }
        self
    }

    pub fn policy(&self) -> &CalendarPolicy { &self.policy }
    pub fn len(&self) -> usize { self.sessions.len() }
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    pub fn distinct_days(&self) -> BTreeSet<NaiveDate> {
        self.sessions.iter().map(|t| t.day).collect()
    }

    /// Sessions whose calendar day lies in `[first, last]`.
    pub fn in_days(&self, first: NaiveDate, last: NaiveDate) -> Vec<&TimedSession<'a>> {
        self.sessions.iter().filter(|t| t.day >= first && t.day <= last).collect()
    }

    /// Sessions in the `seconds` before `now` (inclusive of `now`).
    pub fn events_in(&self, now: DateTime<Utc>, seconds: i64) -> Vec<&TimedSession<'a>> {
        let cutoff = now - Duration::seconds(seconds);
        self.sessions.iter().filter(|t| t.at >= cutoff && t.at <= now).collect()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.sessions.last().map(|t| t.at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::events::RawTimestamp;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn session(id: &str, ts: RawTimestamp) -> Session {
        Session {
            id: id.into(),
            user_id: "u1".into(),
            created_at: ts,
            duration: 30,
            reflection: None,
            achievement: None,
            subject: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn weekly_start_is_previous_monday_midnight() {
        let policy = CalendarPolicy::default();
        // 2026-10-22 is a Thursday
        assert_eq!(policy.period_start(Period::Weekly, at(2026, 10, 22, 15, 0)), at(2026, 10, 19, 0, 0));
        // On Monday itself the week starts that morning
        assert_eq!(policy.period_start(Period::Weekly, at(2026, 10, 19, 0, 5)), at(2026, 10, 19, 0, 0));
    }

    #[test]
    fn monthly_and_all_time_starts() {
        let policy = CalendarPolicy::default();
        assert_eq!(policy.period_start(Period::Monthly, at(2026, 10, 22, 15, 0)), at(2026, 10, 1, 0, 0));
        assert_eq!(policy.period_start(Period::All, at(2026, 10, 22, 15, 0)).timestamp(), 0);
    }

    #[test]
    fn offset_moves_day_boundary() {
        let kst = CalendarPolicy { utc_offset_minutes: 9 * 60, ..CalendarPolicy::default() };
        // 16:00 UTC is 01:00 next day at +09:00
        let ts = at(2026, 10, 18, 16, 0);
        assert_eq!(kst.day_of(ts), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(kst.hour_of(ts), 1);
        // Local midnight 2026-10-19 is 15:00 UTC the day before
        assert_eq!(kst.start_of_day(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()), at(2026, 10, 18, 15, 0));
    }

    #[test]
    fn trailing_window_shrinks_to_period() {
        let policy = CalendarPolicy::default();
        let now = at(2026, 10, 22, 12, 0);
        let (first, last) = policy.trailing_days(now, None, 30);
        assert_eq!((last - first).num_days(), 29);
        let week = policy.period_start(Period::Weekly, now);
        let (first, last) = policy.trailing_days(now, Some(week), 30);
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 10, 22).unwrap());
    }

    #[test]
    fn window_drops_unparseable_and_sorts() {
        let sessions = vec![
            session("b", at(2026, 10, 2, 9, 0).into()),
            session("x", RawTimestamp::Text("not a date".into())),
            session("a", at(2026, 10, 1, 9, 0).into()),
        ];
        let w = UserWindow::new(&sessions, &CalendarPolicy::default());
        assert_eq!(w.len(), 2);
        assert_eq!(w.sessions[0].session.id, "a");
        assert_eq!(w.distinct_days().len(), 2);
        assert_eq!(w.last_seen(), Some(at(2026, 10, 2, 9, 0)));
    }
}
