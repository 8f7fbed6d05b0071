// studyrank/src/store/file.rs
//
// One JSON file per snapshot key under an output directory:
//   <dir>/weekly_all_2026-10-19.json
//   <dir>/monthly_Hanbit High_2026-10-01.json
//
// Each write goes to a unique temp file in the same directory and is renamed
// over the target, so a reader sees either the previous document or the new
// one in full.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::LeaderboardStore;
use crate::error::StoreError;
use crate::events::{AggregatedLeaderboardDocument, Period, Scope, SnapshotKey};

pub struct FileLeaderboardStore {
    dir:     PathBuf,
    seq:     AtomicU64,
    // Serializes check-then-write for put_if_match within this process.
    guarded: Mutex<()>,
}

impl FileLeaderboardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir: PathBuf = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, seq: AtomicU64::new(0), guarded: Mutex::new(()) })
    }

    pub fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key.period, &key.scope, key.date)))
    }

    async fn read(&self, path: &Path) -> Result<Option<AggregatedLeaderboardDocument>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_atomic(&self, doc: &AggregatedLeaderboardDocument) -> Result<(), StoreError> {
        let target = self.path_for(&doc.key());
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            file_stem(doc.period, &doc.scope, doc.aggregation_date),
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        ));

        let bytes = serde_json::to_vec_pretty(doc)?;
        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        debug!(path = %target.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }
}

/// `period_scope_date` with path-hostile characters in the scope replaced.
fn file_stem(period: Period, scope: &Scope, date: NaiveDate) -> String {
    format!("{}_{}_{}", period, sanitize(&scope.to_string()), date.format("%Y-%m-%d"))
}

fn sanitize(scope: &str) -> String {
    scope
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[async_trait]
impl LeaderboardStore for FileLeaderboardStore {
    async fn put(&self, doc: &AggregatedLeaderboardDocument) -> Result<(), StoreError> {
        self.write_atomic(doc).await
    }

    async fn put_if_match(
        &self,
        doc:      &AggregatedLeaderboardDocument,
        expected: Option<&str>,
    ) -> Result<(), StoreError> {
        let _guard = self.guarded.lock().await;
        let key = doc.key();
        let found = self.read(&self.path_for(&key)).await?.map(|d| d.etag());
        if found.as_deref() != expected {
            return Err(StoreError::Conflict {
                key:      key.to_string(),
                expected: expected.map(str::to_string),
                found,
            });
        }
        self.write_atomic(doc).await
    }

    async fn get(&self, key: &SnapshotKey) -> Result<Option<AggregatedLeaderboardDocument>, StoreError> {
        // Sanitized names can collide; only the document's own key counts.
        Ok(self.read(&self.path_for(key)).await?.filter(|d| &d.key() == key))
    }

    async fn latest(
        &self,
        period:       Period,
        scope:        &Scope,
        on_or_before: NaiveDate,
    ) -> Result<Option<AggregatedLeaderboardDocument>, StoreError> {
        let prefix = format!("{}_{}_", period, sanitize(&scope.to_string()));

        let mut dates: Vec<NaiveDate> = Vec::new();
        let mut rd = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix).and_then(|r| r.strip_suffix(".json")) else {
                continue;
            };
            // A longer scope sharing this prefix leaves more than a date behind.
            if let Ok(date) = NaiveDate::parse_from_str(rest, "%Y-%m-%d") {
                if date <= on_or_before {
                    dates.push(date);
                }
            }
        }
        dates.sort_unstable_by(|a, b| b.cmp(a));

        for date in dates {
            let key = SnapshotKey { period, scope: scope.clone(), date };
            match self.get(&key).await {
                Ok(Some(doc)) => return Ok(Some(doc)),
                Ok(None) => continue,
                Err(e) => warn!(key = %key, "Skipping unreadable snapshot: {}", e),
            }
        }
        Ok(None)
    }
}
