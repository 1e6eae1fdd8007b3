use std::path::Path;

use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, TableDefinition, backends::InMemoryBackend,
};
use snafu::ResultExt;
use tracing::info;

use super::{CorruptSnafu, CreateDirSnafu, EncodeSnafu, StoreError, StoreResult};
use crate::profile::{Profile, ProfileFields, ProfileId};

type ProfileKey = [u8; 12];
const PROFILES_TABLE: TableDefinition<&ProfileKey, &[u8]> = TableDefinition::new("profiles-1");
const PNC_INDEX_TABLE: MultimapTableDefinition<&str, &ProfileKey> =
    MultimapTableDefinition::new("profiles-by-pnc-1");

/// The persistent profile collection.
///
/// Documents are JSON encoded [`ProfileFields`] keyed by id. A multimap table indexes ids
/// by `pnc`; it is updated in the same write transaction as the documents.
#[derive(Debug)]
pub struct ProfileDb {
    db: Database,
}

impl ProfileDb {
    /// Open or create a database file.
    pub fn persistent(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("loading profile database from {}", path.to_string_lossy());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu { path: parent })?;
        }
        let db = Database::builder().create(path).db()?;
        Self::open(db)
    }

    /// Create a database that lives in memory only.
    pub fn in_memory() -> StoreResult<Self> {
        info!("using in-memory profile database");
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .db()?;
        Self::open(db)
    }

    /// Make sure all tables exist.
    pub fn open(db: Database) -> StoreResult<Self> {
        let write_tx = db.begin_write().db()?;
        {
            let _table = write_tx.open_table(PROFILES_TABLE).db()?;
            let _index = write_tx.open_multimap_table(PNC_INDEX_TABLE).db()?;
        }
        write_tx.commit().db()?;
        Ok(Self { db })
    }

    /// Get a profile by id.
    pub fn get(&self, id: &ProfileId) -> StoreResult<Option<Profile>> {
        let tx = self.db.begin_read().db()?;
        let table = tx.open_table(PROFILES_TABLE).db()?;
        get_profile(&table, id)
    }

    /// Get the profile with the lowest id among those with the given `pnc`.
    pub fn first_by_pnc(&self, pnc: &str) -> StoreResult<Option<Profile>> {
        let tx = self.db.begin_read().db()?;
        let index = tx.open_multimap_table(PNC_INDEX_TABLE).db()?;
        // multimap values are sorted, so the first one is the lowest id
        let Some(entry) = index.get(pnc).db()?.next() else {
            return Ok(None);
        };
        let id = ProfileId::from(*entry.db()?.value());
        let table = tx.open_table(PROFILES_TABLE).db()?;
        get_profile(&table, &id)
    }

    /// Insert a new profile under a freshly generated id.
    pub fn insert(&self, fields: &ProfileFields) -> StoreResult<Profile> {
        let doc = serde_json::to_vec(fields).context(EncodeSnafu)?;
        let tx = self.db.begin_write().db()?;
        let id = {
            let mut table = tx.open_table(PROFILES_TABLE).db()?;
            let mut index = tx.open_multimap_table(PNC_INDEX_TABLE).db()?;
            let mut id = ProfileId::generate();
            while table.get(id.as_bytes()).db()?.is_some() {
                id = ProfileId::generate();
            }
            table.insert(id.as_bytes(), doc.as_slice()).db()?;
            index.insert(fields.pnc.as_str(), id.as_bytes()).db()?;
            id
        };
        tx.commit().db()?;
        Ok(Profile::new(id, fields.clone()))
    }

    /// Replace the document of an existing profile.
    ///
    /// Returns `None` and leaves the database untouched if there is no such profile.
    pub fn replace(&self, id: &ProfileId, fields: &ProfileFields) -> StoreResult<Option<Profile>> {
        let doc = serde_json::to_vec(fields).context(EncodeSnafu)?;
        let tx = self.db.begin_write().db()?;
        {
            let mut table = tx.open_table(PROFILES_TABLE).db()?;
            let mut index = tx.open_multimap_table(PNC_INDEX_TABLE).db()?;
            let Some(previous) = get_fields(&table, id)? else {
                return Ok(None);
            };
            if previous.pnc != fields.pnc {
                index.remove(previous.pnc.as_str(), id.as_bytes()).db()?;
                index.insert(fields.pnc.as_str(), id.as_bytes()).db()?;
            }
            table.insert(id.as_bytes(), doc.as_slice()).db()?;
        }
        tx.commit().db()?;
        Ok(Some(Profile::new(*id, fields.clone())))
    }

    /// Remove a profile and its index entry. Returns whether a profile was removed.
    pub fn remove(&self, id: &ProfileId) -> StoreResult<bool> {
        let tx = self.db.begin_write().db()?;
        let removed = {
            let mut table = tx.open_table(PROFILES_TABLE).db()?;
            let mut index = tx.open_multimap_table(PNC_INDEX_TABLE).db()?;
            let fields = match table.remove(id.as_bytes()).db()? {
                Some(doc) => Some(decode_fields(id, doc.value())?),
                None => None,
            };
            if let Some(fields) = &fields {
                index.remove(fields.pnc.as_str(), id.as_bytes()).db()?;
            }
            fields.is_some()
        };
        tx.commit().db()?;
        Ok(removed)
    }

    /// Number of stored profiles.
    pub fn count(&self) -> StoreResult<u64> {
        let tx = self.db.begin_read().db()?;
        let table = tx.open_table(PROFILES_TABLE).db()?;
        table.len().db()
    }
}

fn get_profile(
    table: &impl ReadableTable<&'static ProfileKey, &'static [u8]>,
    id: &ProfileId,
) -> StoreResult<Option<Profile>> {
    let fields = get_fields(table, id)?;
    Ok(fields.map(|fields| Profile::new(*id, fields)))
}

fn get_fields(
    table: &impl ReadableTable<&'static ProfileKey, &'static [u8]>,
    id: &ProfileId,
) -> StoreResult<Option<ProfileFields>> {
    let Some(row) = table.get(id.as_bytes()).db()? else {
        return Ok(None);
    };
    decode_fields(id, row.value()).map(Some)
}

fn decode_fields(id: &ProfileId, doc: &[u8]) -> StoreResult<ProfileFields> {
    serde_json::from_slice(doc).context(CorruptSnafu { id: *id })
}

/// Wraps any redb error into [`StoreError::Storage`].
trait DbResultExt<T> {
    fn db(self) -> StoreResult<T>;
}

impl<T, E: Into<redb::Error>> DbResultExt<T> for Result<T, E> {
    fn db(self) -> StoreResult<T> {
        self.map_err(|err| StoreError::Storage { source: err.into() })
    }
}
