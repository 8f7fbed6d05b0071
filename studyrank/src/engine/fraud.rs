// studyrank/src/engine/fraud.rs
//
// Rule-based abuse screening. Every entry point is a pure function of its
// arguments plus the injected config; nothing here remembers earlier calls.
//
//   validate_session               — submission-time gate (rejects + warnings)
//   detect_suspicious_patterns     — fuses workers/* into a 0–1 level
//   adjust_score                   — penalty above the configured threshold
//   monitor_real_time_activity     — advisory 24h alert level
//   flag_suspicious_students       — reviewer report, never an automatic block

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::FraudDetectionConfig;
use crate::events::{ActivityAlert, AlertLevel, FlaggedStudent, Session, SuspiciousPatternReport, ValidationResult};
use crate::state::window::{CalendarPolicy, UserWindow, W_15MIN, W_24HR};
use crate::workers;

// Monitor thresholds (trailing 24h)
const HIGH_SESSIONS:   usize = 10;
const MEDIUM_SESSIONS: usize = 6;
const RAPID_PAIRS:     usize = 3;

/// Largest fraction a suspicious level can take off a score.
const MAX_PENALTY: f64 = 0.5;

pub struct FraudDetector {
    config: FraudDetectionConfig,
    policy: CalendarPolicy,
}

impl FraudDetector {
    pub fn new(config: FraudDetectionConfig, policy: CalendarPolicy) -> Self {
        Self { config, policy }
    }

    /// Check a candidate submission against the learner's recorded sessions.
    /// All triggered checks report together; a short reflection only warns.
    pub fn validate_session(&self, candidate: &Session, prior: &[Session]) -> ValidationResult {
        let cfg = &self.config;
        let mut warnings = Vec::new();
        let mut is_valid = true;

        let Some(at) = candidate.timestamp() else {
            return ValidationResult {
                is_valid: false,
                warnings: vec!["session timestamp could not be read".into()],
            };
        };
        let day = self.policy.day_of(at);

        let history = UserWindow::new(prior, &self.policy);
        let earlier: Vec<_> = history.sessions.iter().filter(|t| t.at <= at).collect();
        let same_day: Vec<_> = earlier.iter().filter(|t| t.day == day).collect();

        // (a) daily session cap
        if same_day.len() as u32 >= cfg.max_sessions_per_day {
            is_valid = false;
            warnings.push(format!(
                "daily session cap reached: {} sessions already recorded today (max {} per day)",
                same_day.len(),
                cfg.max_sessions_per_day
            ));
        }

        // (b) minimum spacing from the most recent session
        if let Some(last) = earlier.last() {
            let gap = (at - last.at).num_minutes();
            if gap < cfg.min_session_interval_minutes {
                is_valid = false;
                warnings.push(format!(
                    "only {} minutes since the previous session (minimum interval {} minutes)",
                    gap, cfg.min_session_interval_minutes
                ));
            }
        }

        // (c) daily study time
        let today_minutes: u64 = same_day.iter().map(|t| t.session.duration as u64).sum();
        let total_hours = (today_minutes + candidate.duration as u64) as f64 / 60.0;
        if total_hours > cfg.max_daily_study_hours {
            is_valid = false;
            warnings.push(format!(
                "daily study time would reach {:.1} hours (max {:.1} hours)",
                total_hours, cfg.max_daily_study_hours
            ));
        }

        // Non-blocking
        let reflection_len = candidate.reflection_text().map(|r| r.chars().count()).unwrap_or(0);
        if reflection_len < cfg.min_reflection_length {
            warnings.push(format!(
                "reflection is shorter than {} characters; add what you learned",
                cfg.min_reflection_length
            ));
        }

        ValidationResult { is_valid, warnings }
    }

    pub fn detect_suspicious_patterns(&self, sessions: &[Session]) -> SuspiciousPatternReport {
        let window = UserWindow::new(sessions, &self.policy);
        let signals = workers::run_all(&window);

        let points: u32 = signals.iter().map(|s| s.points).sum();
        let level = (points as f64 / 100.0).min(1.0);

        SuspiciousPatternReport {
            suspicious_level: level,
            patterns: signals.iter().map(|s| s.kind.label().to_string()).collect(),
            evidence: signals.iter().map(|s| format!("{}:{}", s.kind, s.evidence)).collect(),
        }
    }

    /// Scale `score` by `1 − level × 0.5` once `level` reaches the threshold.
    pub fn adjust_score(&self, score: u32, suspicious_level: f64) -> u32 {
        if suspicious_level < self.config.suspicious_pattern_threshold {
            return score;
        }
        let level = suspicious_level.clamp(0.0, 1.0);
        (score as f64 * (1.0 - level * MAX_PENALTY)).round() as u32
    }

    /// Advisory alert over the 24 hours before `now`.
    pub fn monitor_real_time_activity(&self, sessions: &[Session], now: DateTime<Utc>) -> ActivityAlert {
        let window = UserWindow::new(sessions, &self.policy);
        let recent = window.events_in(now, W_24HR);
        let n = recent.len();

        let rapid_pairs = recent
            .windows(2)
            .filter(|p| (p[1].at - p[0].at).num_seconds() < W_15MIN)
            .count();

        let mut level = if n > HIGH_SESSIONS {
            AlertLevel::High
        } else if n > MEDIUM_SESSIONS {
            AlertLevel::Medium
        } else {
            AlertLevel::Low
        };
        if rapid_pairs > RAPID_PAIRS {
            level = level.max(AlertLevel::Medium);
        }

        let mut recommendations = Vec::new();
        match level {
            AlertLevel::High => recommendations.push(format!(
                "{} sessions in the last 24 hours; review this learner's recent submissions",
                n
            )),
            AlertLevel::Medium if n > MEDIUM_SESSIONS => recommendations.push(format!(
                "{} sessions in the last 24 hours; suggest fewer, longer study blocks",
                n
            )),
            _ => {}
        }
        if rapid_pairs > RAPID_PAIRS {
            recommendations.push(format!(
                "{} sessions started within 15 minutes of the previous one; encourage breaks between sessions",
                rapid_pairs
            ));
        }
        if recommendations.is_empty() {
            recommendations.push("activity looks normal".into());
        }

        ActivityAlert { alert_level: level, sessions_last_24h: n, rapid_pairs, recommendations }
    }

    /// Learners at or above the threshold, most suspicious first.
    pub fn flag_suspicious_students(&self, per_user: &HashMap<String, Vec<Session>>) -> Vec<FlaggedStudent> {
        let mut flagged: Vec<FlaggedStudent> = per_user
            .iter()
            .filter_map(|(user_id, sessions)| {
                let report = self.detect_suspicious_patterns(sessions);
                if report.suspicious_level < self.config.suspicious_pattern_threshold {
                    return None;
                }
                Some(FlaggedStudent {
                    user_id: user_id.clone(),
                    suspicious_level: report.suspicious_level,
                    issues: report.patterns,
                })
            })
            .collect();

        flagged.sort_by(|a, b| {
            b.suspicious_level
                .total_cmp(&a.suspicious_level)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn detector() -> FraudDetector {
        FraudDetector::new(FraudDetectionConfig::default(), CalendarPolicy::default())
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, 0).unwrap()
    }

    fn session(id: &str, ts: DateTime<Utc>, duration: u32) -> Session {
        Session {
            id: id.into(),
            user_id: "u1".into(),
            created_at: ts.into(),
            duration,
            reflection: Some("Reviewed the fractions chapter and redid the exercises.".into()),
            achievement: None,
            subject: "math".into(),
            description: String::new(),
        }
    }

    #[test]
    fn fourth_session_of_the_day_is_rejected() {
        let prior = vec![
            session("a", at(8, 0), 40),
            session("b", at(11, 0), 40),
            session("c", at(15, 0), 40),
        ];
        let r = detector().validate_session(&session("d", at(19, 0), 40), &prior);
        assert!(!r.is_valid);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("daily session cap"));
    }

    #[test]
    fn ten_minute_gap_is_rejected() {
        let prior = vec![session("a", at(9, 0), 20)];
        let r = detector().validate_session(&session("b", at(9, 10), 20), &prior);
        assert!(!r.is_valid);
        assert!(r.warnings.iter().any(|w| w.contains("10 minutes")));
    }

    #[test]
    fn checks_are_not_short_circuited() {
        let prior = vec![
            session("a", at(6, 0), 150),
            session("b", at(9, 0), 150),
            session("c", at(12, 0), 150),
        ];
        let mut candidate = session("d", at(12, 5), 120);
        candidate.reflection = Some("ok".into());
        let r = detector().validate_session(&candidate, &prior);
        assert!(!r.is_valid);
        // cap + interval + hours + short reflection
        assert_eq!(r.warnings.len(), 4, "{:?}", r.warnings);
    }

    #[test]
    fn short_reflection_only_warns() {
        let mut candidate = session("a", at(9, 0), 30);
        candidate.reflection = None;
        let r = detector().validate_session(&candidate, &[]);
        assert!(r.is_valid);
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn previous_day_does_not_count_toward_cap() {
        let yesterday = at(20, 0) - Duration::days(1);
        let prior: Vec<_> = (0..3).map(|i| session(&format!("y{i}"), yesterday + Duration::hours(i), 30)).collect();
        assert!(detector().validate_session(&session("t", at(9, 0), 30), &prior).is_valid);
    }

    #[test]
    fn unreadable_candidate_timestamp_is_rejected() {
        let mut candidate = session("a", at(9, 0), 30);
        candidate.created_at = crate::events::RawTimestamp::Text("??".into());
        assert!(!detector().validate_session(&candidate, &[]).is_valid);
    }

    #[test]
    fn patterns_sum_and_cap() {
        // Same hour every day, 4h each, identical reflection, always 100%
        let sessions: Vec<Session> = (0..8)
            .map(|d| {
                let mut s = session(&format!("s{d}"), at(23, 0) - Duration::days(d), 240);
                s.achievement = Some(100.0);
                s
            })
            .collect();
        let report = detector().detect_suspicious_patterns(&sessions);
        assert_eq!(report.patterns.len(), 4);
        assert_eq!(report.suspicious_level, 1.0);
    }

    #[test]
    fn varied_activity_is_clean() {
        let sessions = vec![
            session("a", at(8, 0), 30),
            session("b", at(13, 0) - Duration::days(1), 60),
            session("c", at(19, 0) - Duration::days(2), 45),
        ];
        let report = detector().detect_suspicious_patterns(&sessions);
        assert_eq!(report.suspicious_level, 0.0);
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn adjustment_below_threshold_is_noop() {
        let d = detector();
        assert_eq!(d.adjust_score(80, 0.69), 80);
        assert_eq!(d.adjust_score(80, 0.7), 52); // 80 × 0.65
        assert_eq!(d.adjust_score(80, 1.0), 40);
    }

    #[test]
    fn monitor_levels() {
        let d = detector();
        let now = at(23, 0);
        let spaced = |n: i64| -> Vec<Session> {
            (0..n).map(|i| session(&format!("s{i}"), now - Duration::minutes(90 * i), 20)).collect()
        };
        assert_eq!(d.monitor_real_time_activity(&spaced(3), now).alert_level, AlertLevel::Low);
        assert_eq!(d.monitor_real_time_activity(&spaced(7), now).alert_level, AlertLevel::Medium);
        assert_eq!(d.monitor_real_time_activity(&spaced(11), now).alert_level, AlertLevel::High);
    }

    #[test]
    fn rapid_pairs_escalate_to_medium() {
        let now = at(23, 0);
        let sessions: Vec<Session> =
            (0..5).map(|i| session(&format!("s{i}"), now - Duration::minutes(5 * i), 5)).collect();
        let alert = detector().monitor_real_time_activity(&sessions, now);
        assert_eq!(alert.rapid_pairs, 4);
        assert_eq!(alert.alert_level, AlertLevel::Medium);
    }

    #[test]
    fn old_sessions_do_not_count_toward_monitor() {
        let now = at(23, 0);
        let sessions: Vec<Session> = (0..12)
            .map(|i| session(&format!("s{i}"), now - Duration::days(2) - Duration::hours(i), 20))
            .collect();
        let alert = detector().monitor_real_time_activity(&sessions, now);
        assert_eq!(alert.sessions_last_24h, 0);
        assert_eq!(alert.alert_level, AlertLevel::Low);
    }

    #[test]
    fn flags_only_above_threshold_sorted() {
        let marathon_same_hour: Vec<Session> = (0..6)
            .map(|d| {
                let mut s = session(&format!("m{d}"), at(22, 0) - Duration::days(d), 200);
                s.reflection = Some("same text".into());
                s
            })
            .collect();
        let mut everything = marathon_same_hour.clone();
        for s in &mut everything {
            s.achievement = Some(99.0);
        }
        let clean = vec![session("c", at(10, 0), 30)];

        let per_user: HashMap<String, Vec<Session>> = [
            ("bob".to_string(), marathon_same_hour), // 20 + 30 + 25 = 75
            ("amy".to_string(), everything),         // 100
            ("cal".to_string(), clean),              // single session: 20
        ]
        .into_iter()
        .collect();

        let flagged = detector().flag_suspicious_students(&per_user);
        let ids: Vec<&str> = flagged.iter().map(|f| f.user_id.as_str()).collect();
        assert_eq!(ids, vec!["amy", "bob"]);
        assert_eq!(flagged[1].issues.len(), 3);
    }
}
