// studyrank/src/store/mod.rs
//
// Boundaries to the surrounding application: where sessions and learners come
// from, and where leaderboard snapshots go. The scheduler only ever sees these
// traits; memory.rs and file.rs provide the concrete stores.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::events::{AggregatedLeaderboardDocument, LearnerProfile, Period, Role, Scope, Session, SnapshotKey};

/// Read access to recorded study sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Sessions of `user_id`, restricted to `createdAt >= since` when given.
    /// Sessions whose timestamp cannot be read are left out of a bounded query.
    async fn sessions_for(
        &self,
        user_id: &str,
        since:   Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>, StoreError>;
}

/// Read access to learner profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn by_role(&self, role: Role) -> Result<Vec<LearnerProfile>, StoreError>;
}

/// Whole-document snapshot persistence keyed by `period_scope_date`.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Replace the document at its key. Readers see the old or the new
    /// document, never a mix.
    async fn put(&self, doc: &AggregatedLeaderboardDocument) -> Result<(), StoreError>;

    /// Replace only if the stored document's ETag equals `expected`
    /// (`None` = the key must not exist yet).
    async fn put_if_match(
        &self,
        doc:      &AggregatedLeaderboardDocument,
        expected: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get(&self, key: &SnapshotKey) -> Result<Option<AggregatedLeaderboardDocument>, StoreError>;

    /// Newest document for `(period, scope)` dated on or before `on_or_before`.
    async fn latest(
        &self,
        period:       Period,
        scope:        &Scope,
        on_or_before: NaiveDate,
    ) -> Result<Option<AggregatedLeaderboardDocument>, StoreError>;
}

pub(crate) fn since_filter(session: &Session, since: Option<DateTime<Utc>>) -> bool {
    match since {
        None => true,
        Some(since) => session.timestamp().map(|ts| ts >= since).unwrap_or(false),
    }
}

// ── Reads ─────────────────────────────────────────────────────────────────────

/// What a reader gets for a requested snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaderboardView {
    Exact(AggregatedLeaderboardDocument),
    /// The requested day was not aggregated; this is the most recent older one.
    Fallback(AggregatedLeaderboardDocument),
    NotGenerated,
}

pub async fn fetch_leaderboard(
    store:  &dyn LeaderboardStore,
    period: Period,
    scope:  &Scope,
    date:   NaiveDate,
) -> Result<LeaderboardView, StoreError> {
    let key = SnapshotKey { period, scope: scope.clone(), date };
    if let Some(doc) = store.get(&key).await? {
        return Ok(LeaderboardView::Exact(doc));
    }
    Ok(match store.latest(period, scope, date).await? {
        Some(doc) => LeaderboardView::Fallback(doc),
        None      => LeaderboardView::NotGenerated,
    })
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryLeaderboardStore;
    use super::test_support::{day, doc};
    use super::*;

    #[tokio::test]
    async fn exact_fallback_and_not_generated() {
        let store = MemoryLeaderboardStore::new();
        store.put(&doc(Period::Weekly, Scope::Global, day(17), 4)).await.unwrap();

        let exact = fetch_leaderboard(&store, Period::Weekly, &Scope::Global, day(17)).await.unwrap();
        assert!(matches!(exact, LeaderboardView::Exact(ref d) if d.aggregation_date == day(17)));

        let fallback = fetch_leaderboard(&store, Period::Weekly, &Scope::Global, day(19)).await.unwrap();
        assert!(matches!(fallback, LeaderboardView::Fallback(ref d) if d.aggregation_date == day(17)));

        let before = fetch_leaderboard(&store, Period::Weekly, &Scope::Global, day(16)).await.unwrap();
        assert_eq!(before, LeaderboardView::NotGenerated);

        let other_scope = Scope::School("Hanbit High".into());
        let missing = fetch_leaderboard(&store, Period::Weekly, &other_scope, day(19)).await.unwrap();
        assert_eq!(missing, LeaderboardView::NotGenerated);
    }
}
