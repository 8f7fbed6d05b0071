// studyrank/src/config.rs
//
// Injected configuration. Every threshold the calculators use lives here;
// nothing in engine/ or workers/ hardcodes a policy value.
//
// Loaded from an optional JSON file (`--config path`). Missing sections and
// fields fall back to the defaults below.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::window::CalendarPolicy;

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Per-session reflection rubric (threshold formula).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityRubric {
    pub short_min_chars: usize,
    pub short_points:    u32,
    pub long_min_chars:  usize,
    pub long_points:     u32, // on top of short_points
    pub keyword_points:  u32,
    pub max_points:      u32,
    pub keywords:        Vec<String>,
}

impl Default for QualityRubric {
    fn default() -> Self {
        Self {
            short_min_chars: 20,
            short_points:    40,
            long_min_chars:  50,
            long_points:     30,
            keyword_points:  30,
            max_points:      100,
            keywords: [
                "understand", "learned", "realized", "problem", "solve", "solution",
                "concept", "review", "practice", "mistake", "question", "study",
                "이해", "문제", "공부", "복습", "개념", "풀이", "깨달",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    // Sub-score weights, must sum to 1.0
    pub consistency_weight: f64,
    pub quality_weight:     f64,
    pub engagement_weight:  f64,
    pub streak_weight:      f64,

    /// Trailing window for consistency + engagement.
    pub window_days: u32,
    /// Sessions in the window that earn a full engagement score.
    pub engagement_target_sessions: u32,
    /// Sessions per calendar day that count toward engagement. `None` = uncapped.
    pub engagement_daily_cap: Option<u32>,
    /// Streak length that earns a full streak score.
    pub streak_target_days: u32,

    pub quality: QualityRubric,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            consistency_weight: 0.40,
            quality_weight:     0.35,
            engagement_weight:  0.15,
            streak_weight:      0.10,
            window_days:                30,
            engagement_target_sessions: 30,
            engagement_daily_cap:       Some(3),
            streak_target_days:         7,
            quality: QualityRubric::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            self.consistency_weight,
            self.quality_weight,
            self.engagement_weight,
            self.streak_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::NegativeWeight);
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::WeightSum(sum));
        }
        if self.window_days == 0 {
            return Err(ConfigError::Zero("scoring.window_days"));
        }
        if self.engagement_target_sessions == 0 {
            return Err(ConfigError::Zero("scoring.engagement_target_sessions"));
        }
        if self.streak_target_days == 0 {
            return Err(ConfigError::Zero("scoring.streak_target_days"));
        }
        Ok(())
    }
}

// ── Fraud detection ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudDetectionConfig {
    pub max_sessions_per_day:         u32,
    pub min_session_interval_minutes: i64,
    pub max_daily_study_hours:        f64,
    pub min_reflection_length:        usize,
    /// Suspicious level (0–1) at which scores are penalized and learners flagged.
    pub suspicious_pattern_threshold: f64,
}

impl Default for FraudDetectionConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_day:         3,
            min_session_interval_minutes: 30,
            max_daily_study_hours:        8.0,
            min_reflection_length:        10,
            suspicious_pattern_threshold: 0.7,
        }
    }
}

impl FraudDetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.suspicious_pattern_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "fraud.suspicious_pattern_threshold",
                value: self.suspicious_pattern_threshold,
            });
        }
        if self.max_daily_study_hours <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "fraud.max_daily_study_hours",
                value: self.max_daily_study_hours,
            });
        }
        Ok(())
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Entries kept in a global-scope snapshot.
    pub global_entry_limit: usize,
    /// Entries kept in a school-scope snapshot. `None` = whole school.
    pub school_entry_limit: Option<usize>,
    /// Concurrent per-user session reads during a run.
    pub max_concurrent_reads: usize,
    /// Hour of day (calendar policy offset) for the scheduled run.
    pub run_at_hour: u32,
    /// Penalize scores by each learner's suspicious level before ranking.
    pub apply_fraud_adjustment: bool,
    /// Write each snapshot only if the stored one still has the ETag read
    /// just before; a concurrent writer fails the run instead of being overwritten.
    pub optimistic_writes: bool,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            global_entry_limit:     50,
            school_entry_limit:     None,
            max_concurrent_reads:   16,
            run_at_hour:            3,
            apply_fraud_adjustment: false,
            optimistic_writes:      false,
        }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scoring:     ScoringConfig,
    pub fraud:       FraudDetectionConfig,
    pub aggregation: AggregationConfig,
    pub calendar:    CalendarPolicy,
}

impl AppConfig {
    /// Read a JSON config file, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                serde_json::from_str::<AppConfig>(&raw)
                    .with_context(|| format!("parsing config {}", p.display()))?
            }
            None => AppConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.fraud.validate()?;
        self.calendar.validate()?;
        if self.aggregation.max_concurrent_reads == 0 {
            return Err(ConfigError::Zero("aggregation.max_concurrent_reads"));
        }
        if self.aggregation.run_at_hour > 23 {
            return Err(ConfigError::OutOfRange {
                field: "aggregation.run_at_hour",
                value: self.aggregation.run_at_hour as f64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"fraud": {"max_sessions_per_day": 5}, "aggregation": {"global_entry_limit": 10}}"#,
        )
        .unwrap();
        assert_eq!(cfg.fraud.max_sessions_per_day, 5);
        assert_eq!(cfg.fraud.min_session_interval_minutes, 30);
        assert_eq!(cfg.aggregation.global_entry_limit, 10);
        assert_eq!(cfg.scoring, ScoringConfig::default());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut cfg = ScoringConfig::default();
        cfg.streak_weight = 0.30;
        assert!(matches!(cfg.validate(), Err(ConfigError::WeightSum(_))));
    }

    #[test]
    fn threshold_outside_unit_interval_rejected() {
        let cfg = FraudDetectionConfig { suspicious_pattern_threshold: 1.5, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn every_section_uses_snake_case_keys() {
        let json = serde_json::to_value(AppConfig::default()).unwrap();
        for section in ["scoring", "fraud", "aggregation", "calendar"] {
            let keys = json[section].as_object().unwrap().keys();
            for key in keys {
                assert!(!key.chars().any(|c| c.is_ascii_uppercase()), "{section}.{key}");
            }
        }
        // camelCase spellings are not silently accepted as the real field
        let cfg: AppConfig = serde_json::from_str(r#"{"fraud": {"maxSessionsPerDay": 9}}"#).unwrap();
        assert_eq!(cfg.fraud.max_sessions_per_day, 3);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyrank.json");
        std::fs::write(&path, r#"{"scoring": {"window_days": 14}}"#).unwrap();
        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.scoring.window_days, 14);
    }
}
