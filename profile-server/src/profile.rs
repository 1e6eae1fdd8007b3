//! The profile document and its identifier.

use std::{
    fmt,
    str::FromStr,
    sync::{
        LazyLock,
        atomic::{AtomicU32, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use rand::Rng;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu};

/// Random bytes fixed for the lifetime of the process, as in a document database object id.
static PROCESS_NONCE: LazyLock<[u8; 5]> = LazyLock::new(|| rand::thread_rng().r#gen());
static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Identifier of a stored profile.
///
/// Twelve bytes: a big-endian unix timestamp in seconds, five bytes of per-process
/// randomness and a three byte counter. Ids created later compare greater, except across
/// processes started within the same second.
#[derive(
    derive_more::From, derive_more::Into, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy,
)]
pub struct ProfileId([u8; 12]);

impl ProfileId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let secs = u32::try_from(secs).unwrap_or(u32::MAX);
        let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_NONCE);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// The raw bytes, used as the storage key.
    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", self.to_hex())
    }
}

impl FromStr for ProfileId {
    type Err = InvalidProfileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .ok()
            .and_then(|bytes| <[u8; 12]>::try_from(bytes).ok())
            .map(Self)
            .context(InvalidProfileIdSnafu { value: s })
    }
}

/// Error returned when a string is not a well-formed [`ProfileId`].
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(display("invalid profile id `{value}`: expected 24 hex characters"))]
pub struct InvalidProfileId {
    value: String,
}

/// The content fields of a profile.
///
/// This is both the payload of create and update operations and the document persisted
/// for each profile. Updates replace all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    /// Alternate lookup key. Not required to be unique.
    pub pnc: String,
    /// Opaque string field.
    pub elc: String,
    /// Opaque string field.
    pub cpv: String,
}

impl ProfileFields {
    /// Create a new set of fields.
    pub fn new(pnc: impl Into<String>, elc: impl Into<String>, cpv: impl Into<String>) -> Self {
        Self {
            pnc: pnc.into(),
            elc: elc.into(),
            cpv: cpv.into(),
        }
    }
}

/// A stored profile: its identity plus its content fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Assigned by the store on creation, never changes afterwards.
    pub id: ProfileId,
    /// Alternate lookup key.
    pub pnc: String,
    /// Opaque string field.
    pub elc: String,
    /// Opaque string field.
    pub cpv: String,
}

impl Profile {
    /// Combine an id with content fields.
    pub fn new(id: ProfileId, fields: ProfileFields) -> Self {
        let ProfileFields { pnc, elc, cpv } = fields;
        Self { id, pnc, elc, cpv }
    }

    /// A copy of the content fields.
    pub fn fields(&self) -> ProfileFields {
        ProfileFields::new(&self.pnc, &self.elc, &self.cpv)
    }
}
