// studyrank/src/scheduler.rs
//
// Aggregation Scheduler: materializes ranked snapshots for every
// (period, scope) pair.
//
//   Idle ──run──▶ Running ──▶ Completed
//                         └─▶ Failed
//
// Per run:
//   1. load learners from the UserDirectory (failure aborts, nothing written)
//   2. per period: score every learner on bounded tokio tasks; a learner whose
//      sessions cannot be read is logged and left out of that period only
//   3. build the global snapshot (top N) and one snapshot per school
//   4. only once every period is built, write all documents (optionally
//      guarded by the ETag of the document being replaced)
//
// Ties are broken by user id so identical input always yields identical
// documents. Two runs racing on one key resolve last-write-wins unless
// `optimistic_writes` is set, in which case the later writer fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{AggregationConfig, AppConfig};
use crate::engine::fraud::FraudDetector;
use crate::engine::scoring::ScoreCalculator;
use crate::error::{AggregationError, ConfigError, StoreError};
use crate::events::{
    AggregatedLeaderboardDocument, LeaderboardEntry, LearnerProfile, Period, Role, Scope, ScoreResult,
};
use crate::state::window::UserWindow;
use crate::store::{LeaderboardStore, SessionRepository, UserDirectory};

// ── Run state ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle      => write!(f, "IDLE"),
            Self::Running   => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed    => write!(f, "FAILED"),
        }
    }
}

/// Latest run, readable at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub state:             RunState,
    pub started_at:        Option<DateTime<Utc>>,
    pub finished_at:       Option<DateTime<Utc>>,
    pub documents_written: usize,
    /// Successful (learner, period) scorings.
    pub users_scored:      usize,
    pub user_failures:     usize,
    pub error:             Option<String>,
}

impl RunReport {
    fn idle() -> Self {
        Self {
            state:             RunState::Idle,
            started_at:        None,
            finished_at:       None,
            documents_written: 0,
            users_scored:      0,
            user_failures:     0,
            error:             None,
        }
    }
}

// ── Scored learner ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Scored {
    profile:       LearnerProfile,
    result:        ScoreResult,
    session_count: u32,
    last_session:  Option<DateTime<Utc>>,
}

impl Scored {
    fn entry(&self, rank: u32, school_rank: Option<u32>) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id:           self.profile.id.clone(),
            name:              self.profile.name.clone(),
            school:            self.profile.school.clone(),
            grade:             self.profile.grade,
            class_num:         self.profile.class_num,
            score:             self.result.score,
            breakdown:         self.result.breakdown,
            rank,
            school_rank,
            session_count:     self.session_count,
            last_session_date: self.last_session,
        }
    }
}

struct PeriodOutcome {
    scored:   Vec<Scored>,
    failures: usize,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

pub struct AggregationScheduler {
    sessions:   Arc<dyn SessionRepository>,
    users:      Arc<dyn UserDirectory>,
    store:      Arc<dyn LeaderboardStore>,
    calculator: Arc<ScoreCalculator>,
    detector:   Arc<FraudDetector>,
    config:     AggregationConfig,
    status:     RwLock<RunReport>,
}

impl AggregationScheduler {
    pub fn new(
        config:   &AppConfig,
        sessions: Arc<dyn SessionRepository>,
        users:    Arc<dyn UserDirectory>,
        store:    Arc<dyn LeaderboardStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            sessions,
            users,
            store,
            calculator: Arc::new(ScoreCalculator::new(config.scoring.clone(), config.calendar.clone())?),
            detector:   Arc::new(FraudDetector::new(config.fraud.clone(), config.calendar.clone())),
            config:     config.aggregation.clone(),
            status:     RwLock::new(RunReport::idle()),
        })
    }

    pub fn status(&self) -> RunReport {
        self.status.read().clone()
    }

    pub async fn run_now(&self) -> Result<RunReport, AggregationError> {
        self.run_at(Utc::now()).await
    }

    /// One full run as of `now`. `now` fixes the aggregation date, every
    /// period start and each document's `lastUpdated`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunReport, AggregationError> {
        *self.status.write() = RunReport {
            state:      RunState::Running,
            started_at: Some(now),
            ..RunReport::idle()
        };
        info!(at = %now, "Aggregation run started");

        let mut scored_total = 0;
        let mut failed_total = 0;
        let outcome = self.execute(now, &mut scored_total, &mut failed_total).await;

        let mut report = self.status.write();
        report.finished_at   = Some(Utc::now());
        report.users_scored  = scored_total;
        report.user_failures = failed_total;
        match outcome {
            Ok(written) => {
                report.state             = RunState::Completed;
                report.documents_written = written;
                info!(
                    documents = written,
                    scored = scored_total,
                    failures = failed_total,
                    "Aggregation run completed"
                );
                Ok(report.clone())
            }
            Err(e) => {
                report.state = RunState::Failed;
                report.error = Some(e.to_string());
                error!("Aggregation run failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        now:    DateTime<Utc>,
        scored: &mut usize,
        failed: &mut usize,
    ) -> Result<usize, AggregationError> {
        let learners = self
            .users
            .by_role(Role::Learner)
            .await
            .map_err(AggregationError::DirectoryUnavailable)?;
        info!(learners = learners.len(), "Population loaded");

        let policy = self.calculator.policy().clone();
        let today  = policy.day_of(now);

        let mut documents = Vec::new();
        for period in Period::EVERY {
            let since = match period {
                Period::All => None,
                _           => Some(policy.period_start(period, now)),
            };
            let outcome = self.score_population(&learners, since, now).await;
            *scored += outcome.scored.len();
            *failed += outcome.failures;

            if !learners.is_empty() && outcome.scored.is_empty() {
                return Err(AggregationError::PopulationFailed { period, failures: outcome.failures });
            }
            documents.extend(self.build_documents(period, today, now, outcome.scored));
        }

        for doc in &documents {
            self.write(doc).await.map_err(|source| AggregationError::WriteFailed {
                key: doc.key().to_string(),
                source,
            })?;
        }
        Ok(documents.len())
    }

    async fn write(&self, doc: &AggregatedLeaderboardDocument) -> Result<(), StoreError> {
        if !self.config.optimistic_writes {
            return self.store.put(doc).await;
        }
        let current = self.store.get(&doc.key()).await?.map(|d| d.etag());
        self.store.put_if_match(doc, current.as_deref()).await
    }

    async fn score_population(
        &self,
        learners: &[LearnerProfile],
        since:    Option<DateTime<Utc>>,
        now:      DateTime<Utc>,
    ) -> PeriodOutcome {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_reads.max(1)));
        let mut tasks: JoinSet<(String, Result<Scored, StoreError>)> = JoinSet::new();

        for profile in learners.iter().cloned() {
            let permits    = Arc::clone(&permits);
            let sessions   = Arc::clone(&self.sessions);
            let calculator = Arc::clone(&self.calculator);
            let detector   = Arc::clone(&self.detector);
            let adjust     = self.config.apply_fraud_adjustment;

            tasks.spawn(async move {
                let user_id = profile.id.clone();
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (user_id, Err(StoreError::Unavailable("read limiter closed".into())));
                };
                let history = match sessions.sessions_for(&profile.id, since).await {
                    Ok(h)  => h,
                    Err(e) => return (user_id, Err(e)),
                };

                let mut result = calculator.score(&history, since, now);
                if adjust {
                    let level = detector.detect_suspicious_patterns(&history).suspicious_level;
                    result.score = detector.adjust_score(result.score, level);
                }
                let window = UserWindow::new(&history, calculator.policy()).retain_since(since);

                (user_id, Ok(Scored {
                    profile,
                    result,
                    session_count: window.len() as u32,
                    last_session:  window.last_seen(),
                }))
            });
        }

        let mut outcome = PeriodOutcome { scored: Vec::with_capacity(learners.len()), failures: 0 };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(s))) => outcome.scored.push(s),
                Ok((user_id, Err(e))) => {
                    outcome.failures += 1;
                    warn!(user_id = %user_id, "Skipping learner this period: {}", e);
                }
                Err(e) => {
                    outcome.failures += 1;
                    warn!("Scoring task failed: {}", e);
                }
            }
        }
        outcome
    }

    fn build_documents(
        &self,
        period: Period,
        today:  NaiveDate,
        now:    DateTime<Utc>,
        mut scored: Vec<Scored>,
    ) -> Vec<AggregatedLeaderboardDocument> {
        scored.sort_by(|a, b| {
            b.result.score
                .cmp(&a.result.score)
                .then_with(|| a.profile.id.cmp(&b.profile.id))
        });

        let mut docs = Vec::new();
        docs.push(AggregatedLeaderboardDocument {
            period,
            scope:              Scope::Global,
            aggregation_date:   today,
            last_updated:       now,
            total_participants: participants(scored.iter()),
            entries: scored
                .iter()
                .take(self.config.global_entry_limit)
                .enumerate()
                .map(|(i, s)| s.entry(i as u32 + 1, None))
                .collect(),
        });

        // Global rank = position in the full sorted population.
        let mut schools: BTreeMap<&str, Vec<(u32, &Scored)>> = BTreeMap::new();
        for (i, s) in scored.iter().enumerate() {
            let school = s.profile.school.trim();
            if !school.is_empty() {
                schools.entry(school).or_default().push((i as u32 + 1, s));
            }
        }

        for (school, members) in schools {
            // Would share a key with the global snapshot and replace it.
            let Some(scope) = Scope::school(school) else {
                warn!(school, period = %period, learners = members.len(), "School name collides with global scope; no school snapshot");
                continue;
            };
            let limit = self.config.school_entry_limit.unwrap_or(usize::MAX);
            docs.push(AggregatedLeaderboardDocument {
                period,
                scope,
                aggregation_date:   today,
                last_updated:       now,
                total_participants: participants(members.iter().map(|(_, s)| *s)),
                entries: members
                    .iter()
                    .take(limit)
                    .enumerate()
                    .map(|(i, (rank, s))| s.entry(*rank, Some(i as u32 + 1)))
                    .collect(),
            });
        }
        docs
    }

    /// Next scheduled run strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let policy = self.calculator.policy();
        let today = policy.start_of_day(policy.day_of(now))
            + Duration::hours(self.config.run_at_hour as i64);
        if today > now { today } else { today + Duration::days(1) }
    }

    /// Sleep until each day's configured hour and run. A failed run is logged
    /// and the loop carries on to the next day.
    pub async fn daily_loop(self: Arc<Self>) {
        loop {
            let now  = Utc::now();
            let next = self.next_run_after(now);
            info!(next = %next, "Next aggregation scheduled");
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = self.run_now().await {
                error!("Scheduled aggregation failed: {}", e);
            }
        }
    }
}

fn participants<'a>(scored: impl Iterator<Item = &'a Scored>) -> u32 {
    scored.filter(|s| s.result.score > 0).count() as u32
}
