use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use stubby_core::repository::{NewUrlMapping, ReadRepository, Repository, Result, UrlMapping};
use stubby_core::{ShortCode, StorageError};

/// In-memory implementation of the repository contract using DashMap.
///
/// Rows are kept by id, with a second index from short code to the id of
/// its non-deleted row. DashMap's sharded locks let reads and writes to
/// different codes proceed without blocking each other.
#[derive(Debug)]
pub struct InMemoryRepository {
    rows: DashMap<u64, UrlMapping>,
    live: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a new in-memory repository with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: DashMap::with_capacity(capacity),
            live: DashMap::with_capacity(capacity),
            next_id: AtomicU64::new(1),
        }
    }

    /// Looks a row up by id, deleted rows included.
    pub fn get_by_id(&self, id: u64) -> Option<UrlMapping> {
        self.rows.get(&id).map(|row| row.clone())
    }

    /// Number of rows ever inserted, deleted rows included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl InMemoryRepository {
    fn insert_row(&self, mapping: NewUrlMapping, now: Timestamp) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(
            id,
            UrlMapping {
                id,
                short_code: mapping.short_code,
                original_url: mapping.original_url,
                expire_at: mapping.expire_at,
                access_count: 0,
                created_at: now,
                updated_at: now,
                deleted: false,
            },
        );
        id
    }

    /// Flags row `id` deleted when it has expired at `now`.
    ///
    /// Called with the code's `live` entry locked, so the caller decides
    /// whether to drop or replace that entry.
    fn mark_deleted_if_expired(&self, id: u64, now: Timestamp) -> bool {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return true;
        };
        if !row.is_expired_at(now) {
            return false;
        }
        row.deleted = true;
        row.updated_at = now;
        true
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
        let Some(id) = self.live.get(code.as_str()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.get_by_id(id))
    }

    async fn exists(&self, code: &ShortCode) -> Result<bool> {
        let Some(id) = self.live.get(code.as_str()).map(|id| *id) else {
            return Ok(false);
        };
        let now = Timestamp::now();
        Ok(self
            .rows
            .get(&id)
            .is_some_and(|row| !row.is_expired_at(now)))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, mapping: NewUrlMapping) -> Result<u64> {
        let now = Timestamp::now();
        match self.live.entry(mapping.short_code.as_str().to_owned()) {
            Entry::Occupied(mut slot) => {
                let previous = *slot.get();
                if !self.mark_deleted_if_expired(previous, now) {
                    return Err(StorageError::Conflict(mapping.short_code.to_string()));
                }
                let id = self.insert_row(mapping, now);
                slot.insert(id);
                Ok(id)
            }
            Entry::Vacant(slot) => {
                let id = self.insert_row(mapping, now);
                slot.insert(id);
                Ok(id)
            }
        }
    }

    async fn increment_access_count(&self, id: u64, delta: u64) -> Result<u64> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(0);
        };
        row.access_count = row.access_count.saturating_add(delta);
        row.updated_at = Timestamp::now();
        Ok(1)
    }

    async fn delete(&self, code: &ShortCode) -> Result<bool> {
        let Some((_, id)) = self.live.remove(code.as_str()) else {
            return Ok(false);
        };
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.deleted = true;
            row.updated_at = Timestamp::now();
        }
        Ok(true)
    }

    async fn delete_expired(&self, code: &ShortCode, now: Timestamp) -> Result<bool> {
        let removed = self
            .live
            .remove_if(code.as_str(), |_, id| self.mark_deleted_if_expired(*id, now));
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;
    use std::sync::Arc;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    fn mapping(c: &str, url: &str, expire_at: Option<Timestamp>) -> NewUrlMapping {
        NewUrlMapping {
            short_code: code(c),
            original_url: url.to_string(),
            expire_at,
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let repo = InMemoryRepository::new();

        let id = repo
            .insert(mapping("abc123", "https://example.com", None))
            .await
            .unwrap();

        let found = repo.find_by_code(&code("abc123")).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.original_url, "https://example.com");
        assert_eq!(found.access_count, 0);
        assert!(!found.deleted);
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let repo = InMemoryRepository::new();
        let a = repo.insert(mapping("a", "https://a.example", None)).await.unwrap();
        let b = repo.insert(mapping("b", "https://b.example", None)).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn duplicate_live_code_conflicts() {
        let repo = InMemoryRepository::new();
        repo.insert(mapping("abc", "https://one.example", None))
            .await
            .unwrap();

        let err = repo
            .insert(mapping("abc", "https://two.example", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_mapping_is_returned_but_not_taken() {
        let repo = InMemoryRepository::new();
        let past = Timestamp::now() - SignedDuration::from_secs(5);
        let old = repo
            .insert(mapping("old", "https://example.com", Some(past)))
            .await
            .unwrap();

        let found = repo.find_by_code(&code("old")).await.unwrap().unwrap();
        assert!(found.is_expired_at(Timestamp::now()));
        assert!(!repo.exists(&code("old")).await.unwrap());

        let new = repo
            .insert(mapping("old", "https://new.example", None))
            .await
            .unwrap();
        assert!(repo.get_by_id(old).unwrap().deleted);
        let found = repo.find_by_code(&code("old")).await.unwrap().unwrap();
        assert_eq!(found.id, new);
    }

    #[tokio::test]
    async fn delete_expired_only_touches_expired_rows() {
        let repo = InMemoryRepository::new();
        let now = Timestamp::now();
        let expired = repo
            .insert(mapping("old", "https://example.com", Some(now - SignedDuration::from_secs(1))))
            .await
            .unwrap();
        repo.insert(mapping("live", "https://example.com", Some(now + SignedDuration::from_secs(60))))
            .await
            .unwrap();

        assert!(repo.delete_expired(&code("old"), now).await.unwrap());
        assert!(repo.get_by_id(expired).unwrap().deleted);
        assert!(repo.find_by_code(&code("old")).await.unwrap().is_none());

        assert!(!repo.delete_expired(&code("live"), now).await.unwrap());
        assert!(!repo.delete_expired(&code("missing"), now).await.unwrap());
        assert!(repo.exists(&code("live")).await.unwrap());
    }

    #[tokio::test]
    async fn soft_delete_hides_row_and_frees_code() {
        let repo = InMemoryRepository::new();
        let id = repo
            .insert(mapping("gone", "https://example.com", None))
            .await
            .unwrap();

        assert!(repo.delete(&code("gone")).await.unwrap());
        assert!(!repo.delete(&code("gone")).await.unwrap());
        assert!(repo.find_by_code(&code("gone")).await.unwrap().is_none());
        assert!(!repo.exists(&code("gone")).await.unwrap());
        assert!(repo.get_by_id(id).unwrap().deleted);

        let reused = repo
            .insert(mapping("gone", "https://new.example", None))
            .await
            .unwrap();
        assert_ne!(reused, id);
    }

    #[tokio::test]
    async fn increment_adds_delta() {
        let repo = InMemoryRepository::new();
        let id = repo
            .insert(mapping("abc", "https://example.com", None))
            .await
            .unwrap();

        assert_eq!(repo.increment_access_count(id, 50).await.unwrap(), 1);
        assert_eq!(repo.increment_access_count(id, 2).await.unwrap(), 1);
        assert_eq!(repo.increment_access_count(999, 1).await.unwrap(), 0);

        let found = repo.find_by_code(&code("abc")).await.unwrap().unwrap();
        assert_eq!(found.access_count, 52);
    }

    #[tokio::test]
    async fn concurrent_inserts_of_one_code_admit_exactly_one() {
        let repo = Arc::new(InMemoryRepository::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.insert(mapping("race", &format!("https://{i}.example"), None))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
