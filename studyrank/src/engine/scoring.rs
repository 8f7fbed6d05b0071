// studyrank/src/engine/scoring.rs
//
// Weighted fusion of four sub-scores into one composite (0–100).
//
// Default weight distribution (sum = 1.00):
//   Consistency 0.40  — distinct active days / trailing window days
//   Quality     0.35  — reflection rubric, averaged over reflective sessions
//   Engagement  0.15  — sessions in window (≤ cap per day) / target
//   Streak      0.10  — longest consecutive-day run / target days
//
// Each sub-score is rounded to an integer first; the composite is the rounded
// weighted sum of the rounded sub-scores.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::engine::streak::longest_streak;
use crate::error::ConfigError;
use crate::events::{ScoreBreakdown, ScoreResult, Session};
use crate::state::window::{CalendarPolicy, UserWindow};

pub struct ScoreCalculator {
    config:   ScoringConfig,
    policy:   CalendarPolicy,
    keywords: Option<AhoCorasick>,
}

impl ScoreCalculator {
    pub fn new(config: ScoringConfig, policy: CalendarPolicy) -> Result<Self, ConfigError> {
        config.validate()?;
        let patterns: Vec<&str> = config
            .quality
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        let keywords = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&patterns)
                    .map_err(|e| ConfigError::Keywords(e.to_string()))?,
            )
        };
        Ok(Self { config, policy, keywords })
    }

    pub fn policy(&self) -> &CalendarPolicy { &self.policy }

    /// Score one learner's sessions as of `now`.
    /// `start` pre-filters to sessions at or after the period start and caps
    /// the trailing window at the period's length.
    pub fn score(
        &self,
        sessions: &[Session],
        start:    Option<DateTime<Utc>>,
        now:      DateTime<Utc>,
    ) -> ScoreResult {
        let window = UserWindow::new(sessions, &self.policy).retain_since(start);
        if window.is_empty() {
            return ScoreResult::default();
        }

        let (first, last) = self.policy.trailing_days(now, start, self.config.window_days);
        let span_days = (last - first).num_days() + 1;

        let breakdown = ScoreBreakdown {
            consistency: self.consistency(&window, first, last, span_days),
            quality:     self.quality(&window),
            engagement:  self.engagement(&window, first, last),
            streak:      percent(longest_streak(&window) as f64, self.config.streak_target_days as f64),
        };

        ScoreResult { score: self.composite(&breakdown), breakdown }
    }

    pub fn composite(&self, b: &ScoreBreakdown) -> u32 {
        let c = &self.config;
        let weighted = b.consistency as f64 * c.consistency_weight
            + b.quality as f64 * c.quality_weight
            + b.engagement as f64 * c.engagement_weight
            + b.streak as f64 * c.streak_weight;
        (weighted.round() as u32).min(100)
    }

    fn consistency(&self, window: &UserWindow<'_>, first: NaiveDate, last: NaiveDate, span_days: i64) -> u32 {
        let active = window
            .distinct_days()
            .range(first..=last)
            .count();
        percent(active as f64, span_days as f64)
    }

    fn engagement(&self, window: &UserWindow<'_>, first: NaiveDate, last: NaiveDate) -> u32 {
        let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for t in window.in_days(first, last) {
            *per_day.entry(t.day).or_insert(0) += 1;
        }
        let counted: u32 = per_day
            .values()
            .map(|&n| match self.config.engagement_daily_cap {
                Some(cap) => n.min(cap),
                None      => n,
            })
            .sum();
        percent(counted as f64, self.config.engagement_target_sessions as f64)
    }

    fn quality(&self, window: &UserWindow<'_>) -> u32 {
        let points: Vec<u32> = window
            .sessions
            .iter()
            .filter_map(|t| t.session.reflection_text())
            .map(|r| self.reflection_points(r))
            .collect();
        if points.is_empty() {
            return 0;
        }
        let mean = points.iter().sum::<u32>() as f64 / points.len() as f64;
        (mean.round() as u32).min(100)
    }

    /// Rubric points for a single (trimmed, non-empty) reflection.
    pub fn reflection_points(&self, reflection: &str) -> u32 {
        let rubric = &self.config.quality;
        let len = reflection.chars().count();
        let mut points = 0;
        if len >= rubric.short_min_chars {
            points += rubric.short_points;
            if len >= rubric.long_min_chars {
                points += rubric.long_points;
            }
        }
        if self.has_keyword(reflection) {
            points += rubric.keyword_points;
        }
        points.min(rubric.max_points)
    }

    fn has_keyword(&self, text: &str) -> bool {
        self.keywords.as_ref().map(|ac| ac.is_match(text)).unwrap_or(false)
    }
}

/// `n / d × 100`, capped at 100 and rounded.
fn percent(n: f64, d: f64) -> u32 {
    if d <= 0.0 {
        return 0;
    }
    ((n / d) * 100.0).min(100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    use crate::events::RawTimestamp;

    const LONG_REFLECTION: &str =
        "Today I finally understand how to solve quadratic problems by completing the square.";

    fn calc() -> ScoreCalculator {
        ScoreCalculator::new(ScoringConfig::default(), CalendarPolicy::default()).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 21, 0, 0).unwrap()
    }

    fn session(id: usize, at: DateTime<Utc>, duration: u32, reflection: Option<&str>) -> Session {
        Session {
            id: format!("s{id}"),
            user_id: "u1".into(),
            created_at: at.into(),
            duration,
            reflection: reflection.map(str::to_string),
            achievement: None,
            subject: "math".into(),
            description: String::new(),
        }
    }

    #[test]
    fn empty_sessions_score_zero() {
        let r = calc().score(&[], None, now());
        assert_eq!(r, ScoreResult::default());
    }

    #[test]
    fn three_recent_days_end_to_end() {
        let sessions: Vec<Session> = (0..3)
            .map(|d| session(d, now() - Duration::days(d as i64) - Duration::hours(2), 45, Some(LONG_REFLECTION)))
            .collect();
        let r = calc().score(&sessions, None, now());
        assert_eq!(
            r.breakdown,
            ScoreBreakdown { consistency: 10, quality: 100, engagement: 10, streak: 43 }
        );
        assert_eq!(r.score, 45);
    }

    #[test]
    fn reflection_rubric_thresholds() {
        let c = calc();
        assert_eq!(c.reflection_points("short note"), 0);
        assert_eq!(c.reflection_points("a reflection of twenty+ chars"), 40);
        assert_eq!(c.reflection_points(&"x".repeat(50)), 70);
        assert_eq!(c.reflection_points("I had a PROBLEM"), 30);
        assert_eq!(c.reflection_points(LONG_REFLECTION), 100);
        // Korean keyword, 20+ characters
        assert_eq!(c.reflection_points("오늘은 이차방정식 문제를 여러 번 반복해서 풀어 보았다"), 70);
    }

    #[test]
    fn quality_ignores_sessions_without_reflection() {
        let sessions = vec![
            session(0, now() - Duration::hours(1), 30, Some(LONG_REFLECTION)),
            session(1, now() - Duration::hours(5), 30, None),
            session(2, now() - Duration::hours(9), 30, Some("   ")),
        ];
        assert_eq!(calc().score(&sessions, None, now()).breakdown.quality, 100);
    }

    #[test]
    fn engagement_caps_sessions_per_day() {
        let sessions: Vec<Session> =
            (0..10).map(|i| session(i, now() - Duration::minutes(40 * i as i64), 20, None)).collect();
        let r = calc().score(&sessions, None, now());
        assert_eq!(r.breakdown.engagement, 10); // 3 counted / 30

        let uncapped = ScoringConfig { engagement_daily_cap: None, ..ScoringConfig::default() };
        let c = ScoreCalculator::new(uncapped, CalendarPolicy::default()).unwrap();
        assert_eq!(c.score(&sessions, None, now()).breakdown.engagement, 33);
    }

    #[test]
    fn consistency_window_shrinks_with_period_start() {
        // Monday 2026-10-19; week started this morning, one-day window
        let start = CalendarPolicy::default().period_start(crate::events::Period::Weekly, now());
        let sessions = vec![
            session(0, now() - Duration::hours(3), 30, None),
            session(1, now() - Duration::days(2), 30, None), // before the week, filtered
        ];
        let r = calc().score(&sessions, Some(start), now());
        assert_eq!(r.breakdown.consistency, 100);
        assert_eq!(r.breakdown.streak, 14);
    }

    #[test]
    fn trailing_window_covers_exactly_thirty_days() {
        let inside  = session(0, now() - Duration::days(29), 30, None);
        let outside = session(1, now() - Duration::days(30), 30, None);

        let only_inside = calc().score(&[inside.clone()], None, now());
        assert_eq!(only_inside.breakdown.consistency, 3); // 1 of 30 days
        assert_eq!(only_inside.breakdown.engagement, 3);

        let only_outside = calc().score(&[outside.clone()], None, now());
        assert_eq!(only_outside.breakdown.consistency, 0);
        assert_eq!(only_outside.breakdown.engagement, 0);

        let both = calc().score(&[inside, outside], None, now());
        assert_eq!(both.breakdown.consistency, only_inside.breakdown.consistency);
        assert_eq!(both.breakdown.engagement, only_inside.breakdown.engagement);
    }

    #[test]
    fn unparseable_sessions_are_dropped() {
        let mut bad = session(0, now(), 30, Some(LONG_REFLECTION));
        bad.created_at = RawTimestamp::Text("garbage".into());
        assert_eq!(calc().score(&[bad], None, now()), ScoreResult::default());
    }

    #[test]
    fn long_history_caps_at_one_hundred() {
        let sessions: Vec<Session> = (0..60)
            .flat_map(|d| {
                (0..3).map(move |k| {
                    session(d * 3 + k, now() - Duration::days(d as i64) - Duration::hours(k as i64), 60, Some(LONG_REFLECTION))
                })
            })
            .collect();
        let r = calc().score(&sessions, None, now());
        assert_eq!(r.breakdown, ScoreBreakdown { consistency: 100, quality: 100, engagement: 100, streak: 100 });
        assert_eq!(r.score, 100);
    }

    proptest! {
        #[test]
        fn scores_stay_in_bounds(
            offsets in proptest::collection::vec((0i64..90 * 24, 1u32..400, 0usize..120), 1..60)
        ) {
            let sessions: Vec<Session> = offsets
                .iter()
                .enumerate()
                .map(|(i, (h, dur, len))| {
                    let text = "study ".repeat(*len / 6);
                    session(i, now() - Duration::hours(*h), *dur, Some(text.as_str()))
                })
                .collect();
            let r = calc().score(&sessions, None, now());
            prop_assert!(r.score <= 100);
            let b = r.breakdown;
            for v in [b.consistency, b.quality, b.engagement, b.streak] {
                prop_assert!(v <= 100);
            }
        }
    }
}
