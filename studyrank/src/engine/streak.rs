// studyrank/src/engine/streak.rs
//
// Longest run of consecutive calendar days with at least one session.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::state::window::UserWindow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakStats {
    pub longest:     u32,
    /// Run ending today or yesterday; 0 once broken.
    pub current:     u32,
    pub active_days: u32,
}

/// Longest consecutive-day run. 0 for an empty window, otherwise ≥ 1.
pub fn longest_streak(window: &UserWindow<'_>) -> u32 {
    let days: Vec<NaiveDate> = window.distinct_days().into_iter().rev().collect();
    longest_run_desc(&days)
}

/// Walk distinct days newest-first; a gap wider than one day resets the run.
fn longest_run_desc(days: &[NaiveDate]) -> u32 {
    if days.is_empty() {
        return 0;
    }
    let mut best = 1u32;
    let mut run = 1u32;
    for pair in days.windows(2) {
        if (pair[0] - pair[1]).num_days() == 1 {
            run += 1;
            best = best.max(run);
        } else {
            run = 1;
        }
    }
    best
}

pub fn streak_stats(window: &UserWindow<'_>, now: DateTime<Utc>) -> StreakStats {
    let days: Vec<NaiveDate> = window.distinct_days().into_iter().rev().collect();
    let longest = longest_run_desc(&days);

    let today = window.policy().day_of(now);
    let current = match days.first() {
        Some(&newest) if newest == today || newest == today - Duration::days(1) => {
            1 + days
                .windows(2)
                .take_while(|p| (p[0] - p[1]).num_days() == 1)
                .count() as u32
        }
        _ => 0,
    };

    StreakStats { longest, current, active_days: days.len() as u32 }
}
