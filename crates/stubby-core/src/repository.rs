use crate::cache::UrlRecord;
use crate::error::StorageError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A durable short-code mapping, as held by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    /// Store-assigned identifier.
    pub id: u64,
    pub short_code: ShortCode,
    pub original_url: String,
    /// When the mapping expires, if ever.
    pub expire_at: Option<Timestamp>,
    pub access_count: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Soft-delete flag; deleted rows are invisible to lookups.
    pub deleted: bool,
}

impl UrlMapping {
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }

    /// The cacheable projection of this mapping.
    pub fn to_record(&self) -> UrlRecord {
        UrlRecord {
            original_url: self.original_url.clone(),
            expire_at: self.expire_at,
        }
    }
}

/// A mapping about to be inserted; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUrlMapping {
    pub short_code: ShortCode,
    pub original_url: String,
    pub expire_at: Option<Timestamp>,
}

/// The read side of the durable store.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the non-deleted mapping for a short code.
    ///
    /// Expired mappings are still returned; the caller decides what expiry means.
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>>;

    /// Checks whether a short code is taken by a non-deleted mapping that has
    /// not expired at the time of the call.
    async fn exists(&self, code: &ShortCode) -> Result<bool>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new mapping and returns its id.
    ///
    /// A non-deleted mapping that already expired is soft-deleted to make room.
    /// Returns `Err(StorageError::Conflict)` if an unexpired mapping already
    /// uses the code.
    async fn insert(&self, mapping: NewUrlMapping) -> Result<u64>;

    /// Atomically adds `delta` to the access count of mapping `id`.
    ///
    /// Returns the number of affected rows.
    async fn increment_access_count(&self, id: u64, delta: u64) -> Result<u64>;

    /// Soft-deletes the mapping for a short code.
    /// Returns `true` if a live mapping was marked deleted.
    async fn delete(&self, code: &ShortCode) -> Result<bool>;

    /// Soft-deletes the mapping for a short code only if it has expired at `now`.
    ///
    /// A mapping inserted for the same code in the meantime is left alone.
    async fn delete_expired(&self, code: &ShortCode, now: Timestamp) -> Result<bool>;
}
