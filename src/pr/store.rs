use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{ChangeRequest, ListFilter, NewChangeRequest, PrStatus, StoreStats};
use super::PrError;

/// Registry of change requests that were not filed on a real VCS host.
///
/// Implementations must apply each operation atomically: a transition checks
/// the current status and writes the new one under the same lock.
#[async_trait]
pub trait ChangeRequestStore: Send + Sync {
    /// Record a new open change request, assigning its id, number and URLs.
    async fn insert(&self, new: NewChangeRequest) -> Result<ChangeRequest, PrError>;

    /// Look up by opaque id, or by display number when `identifier` is numeric.
    async fn get(&self, identifier: &str) -> Result<Option<ChangeRequest>, PrError>;

    /// All records matching `filter`, in insertion order.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ChangeRequest>, PrError>;

    /// Move the record with `id` to `to`, stamping the matching timestamp.
    async fn transition(
        &self,
        id: &str,
        to: PrStatus,
        at: DateTime<Utc>,
    ) -> Result<ChangeRequest, PrError>;

    async fn stats(&self) -> Result<StoreStats, PrError>;
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ChangeRequest>,
    next_number: u64,
}

/// Process-local store behind a single `RwLock`. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeRequestStore for MemoryStore {
    async fn insert(&self, new: NewChangeRequest) -> Result<ChangeRequest, PrError> {
        let mut inner = self.inner.write().await;
        inner.next_number += 1;
        let number = inner.next_number;
        let pr_url = format!("https://github.com/{}/pull/{}", new.repository, number);

        let record = ChangeRequest {
            id: uuid::Uuid::new_v4().to_string(),
            number,
            repository: new.repository,
            base_branch: new.base_branch,
            head_branch: new.head_branch,
            title: new.title,
            description: new.description,
            files: new.files,
            labels: new.labels,
            status: PrStatus::Open,
            created_at: new.created_at,
            merged_at: None,
            closed_at: None,
            created_by: super::template::BOT_NAME.to_string(),
            diff_url: format!("{pr_url}/files"),
            pr_url,
        };
        inner.records.push(record.clone());
        debug!(id = %record.id, number, total = inner.records.len(), "stored change request");
        Ok(record)
    }

    async fn get(&self, identifier: &str) -> Result<Option<ChangeRequest>, PrError> {
        let number = identifier.parse::<u64>().ok();
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .find(|pr| pr.id == identifier || Some(pr.number) == number)
            .cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ChangeRequest>, PrError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|pr| filter.matches(pr))
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: &str,
        to: PrStatus,
        at: DateTime<Utc>,
    ) -> Result<ChangeRequest, PrError> {
        let mut inner = self.inner.write().await;
        let pr = inner
            .records
            .iter_mut()
            .find(|pr| pr.id == id)
            .ok_or_else(|| PrError::NotFound(id.to_string()))?;

        if !pr.status.can_transition_to(to) {
            return Err(PrError::Conflict {
                id: id.to_string(),
                status: pr.status,
            });
        }

        pr.status = to;
        match to {
            PrStatus::Merged => pr.merged_at = Some(at),
            PrStatus::Closed => pr.closed_at = Some(at),
            PrStatus::Open => {}
        }
        Ok(pr.clone())
    }

    async fn stats(&self) -> Result<StoreStats, PrError> {
        let inner = self.inner.read().await;
        let count = |s: PrStatus| inner.records.iter().filter(|pr| pr.status == s).count();
        Ok(StoreStats {
            total: inner.records.len(),
            open: count(PrStatus::Open),
            merged: count(PrStatus::Merged),
            closed: count(PrStatus::Closed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_pr(repository: &str) -> NewChangeRequest {
        NewChangeRequest {
            repository: repository.to_string(),
            base_branch: "main".to_string(),
            head_branch: "fix/null_pointer-1".to_string(),
            title: "Fix: TypeError - null pointer".to_string(),
            description: String::new(),
            files: vec![],
            labels: vec!["automated-fix".to_string()],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_numbers_and_urls() {
        let store = MemoryStore::new();
        let first = store.insert(new_pr("company/user-service")).await.unwrap();
        let second = store.insert(new_pr("company/user-service")).await.unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_ne!(first.id, second.id);
        assert_eq!(first.status, PrStatus::Open);
        assert_eq!(first.pr_url, "https://github.com/company/user-service/pull/1");
        assert_eq!(first.diff_url, "https://github.com/company/user-service/pull/1/files");
        assert_eq!(first.created_by, "log-maintenance-bot");
    }

    #[tokio::test]
    async fn test_get_by_id_or_number() {
        let store = MemoryStore::new();
        let pr = store.insert(new_pr("a/b")).await.unwrap();
        assert_eq!(store.get(&pr.id).await.unwrap().unwrap().number, 1);
        assert_eq!(store.get("1").await.unwrap().unwrap().id, pr.id);
        assert!(store.get("99").await.unwrap().is_none());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_conjunctive_and_ordered() {
        let store = MemoryStore::new();
        let a1 = store.insert(new_pr("a/one")).await.unwrap();
        let b1 = store.insert(new_pr("b/two")).await.unwrap();
        let a2 = store.insert(new_pr("a/one")).await.unwrap();
        store.transition(&a2.id, PrStatus::Merged, Utc::now()).await.unwrap();

        let all = store.list(&ListFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![a1.id.as_str(), b1.id.as_str(), a2.id.as_str()]);

        let by_repo = store
            .list(&ListFilter { repository: Some("a/one".to_string()), status: None })
            .await
            .unwrap();
        assert_eq!(by_repo.len(), 2);

        let both = store
            .list(&ListFilter {
                repository: Some("a/one".to_string()),
                status: Some(PrStatus::Open),
            })
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, a1.id);
    }

    #[tokio::test]
    async fn test_transition_rejects_terminal_status() {
        let store = MemoryStore::new();
        let pr = store.insert(new_pr("a/b")).await.unwrap();
        let merged = store.transition(&pr.id, PrStatus::Merged, Utc::now()).await.unwrap();
        assert!(merged.merged_at.is_some());

        let err = store.transition(&pr.id, PrStatus::Closed, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PrError::Conflict { status: PrStatus::Merged, .. }));

        let err = store.transition("missing", PrStatus::Merged, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PrError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_merges_only_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let pr = store.insert(new_pr("a/b")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = pr.id.clone();
            handles.push(tokio::spawn(async move {
                store.transition(&id, PrStatus::Merged, Utc::now()).await.is_ok()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.stats().await.unwrap().merged, 1);
    }
}
