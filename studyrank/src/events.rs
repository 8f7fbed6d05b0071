// studyrank/src/events.rs
//
// Shared domain types flowing through studyrank.
// Wire format is camelCase JSON so session exports and leaderboard documents
// can be exchanged with the surrounding application unchanged.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Raw timestamps ────────────────────────────────────────────────────────────

/// `createdAt` as it arrives from the session store.
/// Parsed best-effort; a value that still fails to parse drops the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(i64),    // seconds, or milliseconds when the magnitude says so
    Text(String), // RFC 3339, naive date-time, date-only, or digits
}

// Anything at or above this is read as milliseconds (seconds would be year 5138+).
const MILLIS_CUTOFF: i64 = 100_000_000_000;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

impl RawTimestamp {
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unix(n) => from_unix(*n),
            Self::Text(s) => parse_text(s.trim()),
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Text(ts.to_rfc3339())
    }
}

fn from_unix(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= MILLIS_CUTOFF {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

fn parse_text(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
    }
    s.parse::<i64>().ok().and_then(from_unix)
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// One recorded unit of study activity. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: RawTimestamp,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub reflection: Option<String>,
    /// Self-reported completion percent.
    #[serde(default)]
    pub achievement: Option<f64>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub description: String,
}

impl Session {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.created_at.parse()
    }

    /// Trimmed reflection, `None` when absent or blank.
    pub fn reflection_text(&self) -> Option<&str> {
        self.reflection
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

// ── Learners ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "student")]
    Learner,
    Teacher,
    Admin,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub grade: Option<u32>,
    #[serde(default)]
    pub class_num: Option<u32>,
    pub role: Role,
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Four integer sub-scores, each 0–100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub consistency: u32,
    pub quality: u32,
    pub engagement: u32,
    pub streak: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u32,
    pub breakdown: ScoreBreakdown,
}

// ── Leaderboards ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    All,
    Weekly,
    Monthly,
}

impl Period {
    pub const EVERY: [Period; 3] = [Period::All, Period::Weekly, Period::Monthly];
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown period '{other}' (expected all|weekly|monthly)")),
        }
    }
}

/// Wire and key label of the global scope. Reserved: no school may use it.
pub const GLOBAL_SCOPE: &str = "all";

/// Ranking population: everyone, or one school.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    Global,
    School(String),
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        if s == GLOBAL_SCOPE {
            Self::Global
        } else {
            Self::School(s)
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

impl Scope {
    /// School scope for `name`, or `None` when the name cannot be told apart
    /// from the global scope in a key (case-insensitive filesystems included).
    pub fn school(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(GLOBAL_SCOPE) {
            None
        } else {
            Some(Self::School(name.to_string()))
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "{}", GLOBAL_SCOPE),
            Self::School(name) => write!(f, "{}", name),
        }
    }
}

/// Identity of one snapshot: `(period, scope, aggregationDate)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub period: Period,
    pub scope: Scope,
    pub date: NaiveDate,
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.period, self.scope, self.date.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub school: String,
    pub grade: Option<u32>,
    pub class_num: Option<u32>,
    pub score: u32,
    pub breakdown: ScoreBreakdown,
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_rank: Option<u32>,
    pub session_count: u32,
    pub last_session_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedLeaderboardDocument {
    pub period: Period,
    pub scope: Scope,
    pub aggregation_date: NaiveDate,
    pub last_updated: DateTime<Utc>,
    /// Users with score > 0, counted before truncation.
    pub total_participants: u32,
    pub entries: Vec<LeaderboardEntry>,
}

impl AggregatedLeaderboardDocument {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            period: self.period,
            scope: self.scope.clone(),
            date: self.aggregation_date,
        }
    }

    /// SHA256[:8] over the canonical JSON, used as an ETag for guarded writes.
    pub fn etag(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut h = Sha256::new();
        h.update(&canonical);
        hex::encode(&h.finalize()[..8])
    }
}

// ── Fraud detection ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PatternKind {
    TimeConcentration,
    DuplicateReflection,
    ImplausibleCompletion,
    MarathonSession,
}

impl PatternKind {
    /// Reviewer-facing description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TimeConcentration => "always same hour",
            Self::DuplicateReflection => "near-duplicate reflections",
            Self::ImplausibleCompletion => "implausibly high completion",
            Self::MarathonSession => "excessive continuous duration",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeConcentration => write!(f, "time_concentration"),
            Self::DuplicateReflection => write!(f, "duplicate_reflection"),
            Self::ImplausibleCompletion => write!(f, "implausible_completion"),
            Self::MarathonSession => write!(f, "marathon_session"),
        }
    }
}

/// Output of one pattern worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub kind: PatternKind,
    pub points: u32,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousPatternReport {
    /// 0.0–1.0
    pub suspicious_level: f64,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAlert {
    pub alert_level: AlertLevel,
    pub sessions_last_24h: usize,
    pub rapid_pairs: usize,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedStudent {
    pub user_id: String,
    pub suspicious_level: f64,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_and_naive_forms() {
        let want = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        for raw in ["2026-03-02T09:30:00Z", "2026-03-02T18:30:00+09:00", "2026-03-02 09:30:00", "2026-03-02T09:30"] {
            assert_eq!(RawTimestamp::Text(raw.into()).parse(), Some(want), "{raw}");
        }
    }

    #[test]
    fn parses_unix_seconds_and_millis() {
        let want = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        assert_eq!(RawTimestamp::Unix(want.timestamp()).parse(), Some(want));
        assert_eq!(RawTimestamp::Unix(want.timestamp_millis()).parse(), Some(want));
        assert_eq!(RawTimestamp::Text(want.timestamp().to_string()).parse(), Some(want));
    }

    #[test]
    fn garbage_timestamp_is_none() {
        assert_eq!(RawTimestamp::Text("yesterday-ish".into()).parse(), None);
        assert_eq!(RawTimestamp::Text("   ".into()).parse(), None);
    }

    #[test]
    fn session_deserializes_from_camel_case() {
        let json = r#"{"id":"s1","userId":"u1","createdAt":"2026-03-02T09:30:00Z","duration":45,
                       "reflection":"  ","subject":"math","description":"ch.3"}"#;
        let s: Session = serde_json::from_str(json).unwrap();
        assert_eq!(s.user_id, "u1");
        assert_eq!(s.reflection_text(), None);
        assert!(s.timestamp().is_some());
    }

    #[test]
    fn role_accepts_student_alias() {
        let p: LearnerProfile = serde_json::from_str(r#"{"id":"u1","role":"student"}"#).unwrap();
        assert_eq!(p.role, Role::Learner);
        let p: LearnerProfile = serde_json::from_str(r#"{"id":"u2","role":"parent"}"#).unwrap();
        assert_eq!(p.role, Role::Other);
    }

    #[test]
    fn scope_round_trips_as_plain_string() {
        assert_eq!(serde_json::to_string(&Scope::Global).unwrap(), r#""all""#);
        let s: Scope = serde_json::from_str(r#""Hanbit High""#).unwrap();
        assert_eq!(s, Scope::School("Hanbit High".into()));
    }

    #[test]
    fn school_named_like_global_scope_is_refused() {
        assert_eq!(Scope::school("all"), None);
        assert_eq!(Scope::school("ALL"), None);
        assert_eq!(Scope::school("All Saints"), Some(Scope::School("All Saints".into())));
    }

    #[test]
    fn snapshot_key_is_period_scope_date() {
        let key = SnapshotKey {
            period: Period::Weekly,
            scope: Scope::School("North".into()),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        };
        assert_eq!(key.to_string(), "weekly_North_2026-10-19");
    }
}
