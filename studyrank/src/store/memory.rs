// studyrank/src/store/memory.rs
//
// In-process stores. DashMap = sharded concurrent HashMap, so scoring tasks can
// read sessions while the scheduler writes snapshots without a global lock.
// Session and user stores can be seeded from JSONL exports.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::{since_filter, LeaderboardStore, SessionRepository, UserDirectory};
use crate::error::StoreError;
use crate::events::{AggregatedLeaderboardDocument, LearnerProfile, Period, Role, Scope, Session, SnapshotKey};

/// Parse one JSON value per line. Blank lines are skipped; a malformed line
/// is logged and skipped rather than failing the whole file.
pub async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let mut out = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() { continue; }
        match serde_json::from_str::<T>(line) {
            Ok(v)  => out.push(v),
            Err(e) => warn!(path = %path.display(), line = n + 1, "Parse error: {}", e),
        }
    }
    Ok(out)
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySessionRepository {
    by_user: DashMap<String, Vec<Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self { Self::default() }

    pub fn from_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let repo = Self::new();
        for s in sessions {
            repo.insert(s);
        }
        repo
    }

    pub async fn load_jsonl(path: &Path) -> Result<Self> {
        let sessions: Vec<Session> = read_jsonl(path).await?;
        let repo = Self::from_sessions(sessions);
        info!(path = %path.display(), users = repo.by_user.len(), "Loaded sessions");
        Ok(repo)
    }

    pub fn insert(&self, session: Session) {
        self.by_user.entry(session.user_id.clone()).or_default().push(session);
    }

    /// Every learner's full history, for cohort-wide reports.
    pub fn snapshot(&self) -> HashMap<String, Vec<Session>> {
        self.by_user.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn sessions_for(
        &self,
        user_id: &str,
        since:   Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .by_user
            .get(user_id)
            .map(|v| v.iter().filter(|s| since_filter(s, since)).cloned().collect())
            .unwrap_or_default())
    }
}

// ── Users ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryUserDirectory {
    users: DashMap<String, LearnerProfile>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn from_profiles(profiles: impl IntoIterator<Item = LearnerProfile>) -> Self {
        let dir = Self::new();
        for p in profiles {
            dir.users.insert(p.id.clone(), p);
        }
        dir
    }

    pub async fn load_jsonl(path: &Path) -> Result<Self> {
        let profiles: Vec<LearnerProfile> = read_jsonl(path).await?;
        let dir = Self::from_profiles(profiles);
        info!(path = %path.display(), users = dir.users.len(), "Loaded user directory");
        Ok(dir)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn by_role(&self, role: Role) -> Result<Vec<LearnerProfile>, StoreError> {
        let mut out: Vec<LearnerProfile> = self
            .users
            .iter()
            .filter(|e| e.value().role == role)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

// ── Leaderboards ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryLeaderboardStore {
    docs: DashMap<SnapshotKey, AggregatedLeaderboardDocument>,
}

impl MemoryLeaderboardStore {
    pub fn new() -> Self { Self::default() }
}

#[cfg(test)]
impl MemoryLeaderboardStore {
    pub fn len(&self) -> usize { self.docs.len() }
    pub fn is_empty(&self) -> bool { self.docs.is_empty() }
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboardStore {
    async fn put(&self, doc: &AggregatedLeaderboardDocument) -> Result<(), StoreError> {
        self.docs.insert(doc.key(), doc.clone());
        Ok(())
    }

    async fn put_if_match(
        &self,
        doc:      &AggregatedLeaderboardDocument,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let key = doc.key();
        match self.docs.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                let found = slot.get().etag();
                if expected != Some(found.as_str()) {
                    return Err(StoreError::Conflict {
                        key:      key.to_string(),
                        expected: expected.map(str::to_string),
                        found:    Some(found),
                    });
                }
                slot.insert(doc.clone());
            }
            Entry::Vacant(slot) => {
                if expected.is_some() {
                    return Err(StoreError::Conflict {
                        key:      key.to_string(),
                        expected: expected.map(str::to_string),
                        found:    None,
                    });
                }
                slot.insert(doc.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, key: &SnapshotKey) -> Result<Option<AggregatedLeaderboardDocument>, StoreError> {
        Ok(self.docs.get(key).map(|d| d.clone()))
    }

    async fn latest(
        &self,
        period:       Period,
        scope:        &Scope,
        on_or_before: NaiveDate,
    ) -> Result<Option<AggregatedLeaderboardDocument>, StoreError> {
        Ok(self
            .docs
            .iter()
            .filter(|e| e.key().period == period && &e.key().scope == scope && e.key().date <= on_or_before)
            .max_by_key(|e| e.key().date)
            .map(|e| e.value().clone()))
    }
}
