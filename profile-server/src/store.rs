//! Profile store used to resolve queries and mutations.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use snafu::Snafu;
use tracing::{debug, warn};

use crate::{
    metrics::Metrics,
    profile::{Profile, ProfileFields, ProfileId},
};

pub use self::profile_db::ProfileDb;

mod profile_db;

/// Default upper bound for a single store operation.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result type of store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`ProfileStore`].
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum StoreError {
    #[snafu(display("no profile matches {key}"))]
    NotFound { key: String },
    #[snafu(display("storage failure: {source}"))]
    Storage { source: redb::Error },
    #[snafu(display("failed to create database directory at {}", path.display()))]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("stored profile {id} could not be decoded"))]
    Corrupt {
        id: ProfileId,
        source: serde_json::Error,
    },
    #[snafu(display("profile could not be encoded"))]
    Encode { source: serde_json::Error },
    /// The blocking work is not cancelled and may still complete.
    #[snafu(display("{op} timed out after {after:?}, its outcome is unknown"))]
    Timeout { op: &'static str, after: Duration },
    #[snafu(display("{op} did not run to completion"))]
    Join {
        op: &'static str,
        source: tokio::task::JoinError,
    },
}

impl StoreError {
    /// Whether this error means no profile matched the lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    fn not_found_id(id: &ProfileId) -> Self {
        Self::NotFound {
            key: format!("id {id}"),
        }
    }

    fn not_found_pnc(pnc: &str) -> Self {
        Self::NotFound {
            key: format!("pnc {pnc:?}"),
        }
    }
}

/// Point operations against the profile collection.
#[async_trait]
pub trait ProfileStore: std::fmt::Debug + Send + Sync + 'static {
    /// Look up a profile by id.
    async fn find_by_id(&self, id: ProfileId) -> StoreResult<Profile>;

    /// Look up the first profile with the given `pnc`.
    ///
    /// `pnc` is not unique. When several profiles share it, the one with the lowest id,
    /// i.e. the earliest created, is returned.
    async fn find_by_pnc(&self, pnc: &str) -> StoreResult<Profile>;

    /// Persist a new profile and return it with its assigned id.
    async fn create(&self, fields: ProfileFields) -> StoreResult<Profile>;

    /// Replace the content fields of an existing profile. The id is preserved.
    async fn update(&self, id: ProfileId, fields: ProfileFields) -> StoreResult<Profile>;

    /// Remove a profile. Returns whether a profile was actually removed.
    async fn delete(&self, id: ProfileId) -> StoreResult<bool>;

    /// Number of stored profiles.
    async fn count(&self) -> StoreResult<u64>;
}

/// The profile collection.
///
/// Documents live in the persistent [`ProfileDb`]. Each operation runs on the blocking
/// thread pool and is bounded by a timeout, so a stalled database cannot hang a request.
#[derive(Debug, Clone)]
pub struct ProfileCollection {
    db: Arc<ProfileDb>,
    op_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ProfileCollection {
    /// Create a persistent collection
    pub fn persistent(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = ProfileDb::persistent(path)?;
        Ok(Self::new(db))
    }

    /// Create an in-memory collection.
    pub fn in_memory() -> StoreResult<Self> {
        let db = ProfileDb::in_memory()?;
        Ok(Self::new(db))
    }

    /// Create a new collection on top of an opened database.
    pub fn new(db: ProfileDb) -> Self {
        Self {
            db: Arc::new(db),
            op_timeout: DEFAULT_OP_TIMEOUT,
            metrics: Default::default(),
        }
    }

    /// Set the upper bound for a single store operation.
    pub fn with_op_timeout(self, op_timeout: Duration) -> Self {
        Self { op_timeout, ..self }
    }

    /// The metrics this collection reports to.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ProfileDb) -> StoreResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));
        let res = match tokio::time::timeout(self.op_timeout, task).await {
            Ok(Ok(res)) => res,
            Ok(Err(source)) => Err(StoreError::Join { op, source }),
            Err(_elapsed) => {
                self.metrics.store_timeouts.inc();
                Err(StoreError::Timeout {
                    op,
                    after: self.op_timeout,
                })
            }
        };
        if let Err(err) = &res {
            if !err.is_not_found() {
                self.metrics.store_errors.inc();
                warn!(op, %err, "store operation failed");
            }
        }
        res
    }

    fn record_lookup(&self, res: &StoreResult<Profile>) {
        self.metrics.store_lookups.inc();
        if matches!(res, Err(err) if err.is_not_found()) {
            self.metrics.store_lookups_notfound.inc();
        }
    }
}

#[async_trait]
impl ProfileStore for ProfileCollection {
    async fn find_by_id(&self, id: ProfileId) -> StoreResult<Profile> {
        let res = self
            .run("find_by_id", move |db| {
                db.get(&id)?.ok_or_else(|| StoreError::not_found_id(&id))
            })
            .await;
        self.record_lookup(&res);
        res
    }

    async fn find_by_pnc(&self, pnc: &str) -> StoreResult<Profile> {
        let pnc = pnc.to_string();
        let res = self
            .run("find_by_pnc", move |db| {
                db.first_by_pnc(&pnc)?
                    .ok_or_else(|| StoreError::not_found_pnc(&pnc))
            })
            .await;
        self.record_lookup(&res);
        res
    }

    async fn create(&self, fields: ProfileFields) -> StoreResult<Profile> {
        let profile = self.run("create", move |db| db.insert(&fields)).await?;
        self.metrics.store_profiles_inserted.inc();
        debug!(id = %profile.id, "profile created");
        Ok(profile)
    }

    async fn update(&self, id: ProfileId, fields: ProfileFields) -> StoreResult<Profile> {
        let profile = self
            .run("update", move |db| {
                db.replace(&id, &fields)?
                    .ok_or_else(|| StoreError::not_found_id(&id))
            })
            .await?;
        self.metrics.store_profiles_updated.inc();
        debug!(%id, "profile updated");
        Ok(profile)
    }

    async fn delete(&self, id: ProfileId) -> StoreResult<bool> {
        let removed = self.run("delete", move |db| db.remove(&id)).await?;
        if removed {
            self.metrics.store_profiles_removed.inc();
        }
        debug!(%id, removed, "profile delete");
        Ok(removed)
    }

    async fn count(&self) -> StoreResult<u64> {
        self.run("count", |db| db.count()).await
    }
}

#[cfg(test)]
mod tests {
    use n0_snafu::{Result, ResultExt};
    use tracing_test::traced_test;

    use super::*;

    fn fields(pnc: &str, elc: &str, cpv: &str) -> ProfileFields {
        ProfileFields::new(pnc, elc, cpv)
    }

    #[tokio::test]
    #[traced_test]
    async fn create_then_find_by_id() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let created = store.create(fields("P1", "E1", "C1")).await.e()?;
        assert_eq!(created.fields(), fields("P1", "E1", "C1"));

        let found = store.find_by_id(created.id).await.e()?;
        assert_eq!(found, created);
        assert_eq!(store.metrics().store_profiles_inserted.get(), 1);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn update_preserves_identity() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let created = store.create(fields("P1", "E1", "C1")).await.e()?;

        let updated = store
            .update(created.id, fields("P1", "E2", "C1"))
            .await
            .e()?;
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.elc, "E2");

        let found = store.find_by_id(created.id).await.e()?;
        assert_eq!(found, updated);
        assert_eq!(store.count().await.e()?, 1);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn unknown_ids_are_not_found() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let id = ProfileId::generate();

        let err = store.find_by_id(id).await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.update(id, fields("P", "E", "C")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.metrics().store_lookups_notfound.get(), 1);
        assert_eq!(store.metrics().store_errors.get(), 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn delete_reports_whether_a_profile_was_removed() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let created = store.create(fields("P1", "E1", "C1")).await.e()?;

        assert!(store.delete(created.id).await.e()?);
        assert!(store.find_by_id(created.id).await.unwrap_err().is_not_found());
        assert!(store.find_by_pnc("P1").await.unwrap_err().is_not_found());
        assert!(!store.delete(created.id).await.e()?);
        assert_eq!(store.count().await.e()?, 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn pnc_lookup_returns_earliest_match() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let first = store.create(fields("dup", "E1", "C1")).await.e()?;
        let _second = store.create(fields("dup", "E2", "C2")).await.e()?;

        let found = store.find_by_pnc("dup").await.e()?;
        assert_eq!(found, first);

        store.delete(first.id).await.e()?;
        let found = store.find_by_pnc("dup").await.e()?;
        assert_eq!(found.elc, "E2");
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn update_moves_pnc_index_entry() -> Result {
        let store = ProfileCollection::in_memory().e()?;
        let created = store.create(fields("old", "E1", "C1")).await.e()?;
        store
            .update(created.id, fields("new", "E1", "C1"))
            .await
            .e()?;

        assert!(store.find_by_pnc("old").await.unwrap_err().is_not_found());
        assert_eq!(store.find_by_pnc("new").await.e()?.id, created.id);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn persistent_store_survives_reopen() -> Result {
        let dir = tempfile::tempdir().e()?;
        let path = dir.path().join("nested").join("profiles.db");

        let id = {
            let store = ProfileCollection::persistent(&path).e()?;
            store.create(fields("P1", "E1", "C1")).await.e()?.id
        };

        let store = ProfileCollection::persistent(&path).e()?;
        let found = store.find_by_pnc("P1").await.e()?;
        assert_eq!(found.id, id);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn stalled_operations_time_out() -> Result {
        let store = ProfileCollection::in_memory()
            .e()?
            .with_op_timeout(Duration::from_millis(20));

        let err = store
            .run("stall", |_db| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout { op: "stall", .. }));
        assert!(err.to_string().contains("outcome is unknown"), "{err}");
        assert_eq!(store.metrics().store_timeouts.get(), 1);
        Ok(())
    }
}
