//! In-memory store for tests and local development.
//!
//! Implements every store trait over plain collections behind a single
//! `RwLock`. Ordering matches the `PostgreSQL` repositories: commuters scan
//! by ascending ID, email records newest first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use commuter_core::{Commuter, CommuterId, EmailId, ServiceAlert};

use super::{AlertStore, CommuterStore, EmailStore, RepositoryError};
use crate::models::email::{EmailRecord, NewEmailRecord};

#[derive(Default)]
struct MemoryData {
    commuters: BTreeMap<CommuterId, Commuter>,
    emails: Vec<EmailRecord>,
    alerts: Vec<ServiceAlert>,
    next_commuter_id: i32,
    next_email_id: i32,
}

impl MemoryData {
    fn insert_commuter(
        &mut self,
        mut commuter: Commuter,
        link: String,
    ) -> Result<Commuter, RepositoryError> {
        if self
            .commuters
            .values()
            .any(|c| c.link.as_deref() == Some(link.as_str()))
        {
            return Err(RepositoryError::Conflict(
                "commuter link already exists".to_owned(),
            ));
        }

        self.next_commuter_id += 1;
        let id = CommuterId::new(self.next_commuter_id);
        commuter.id = Some(id);
        commuter.link = Some(link);
        self.commuters.insert(id, commuter.clone());
        Ok(commuter)
    }
}

/// A store holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service alert.
    pub async fn insert_alert(&self, alert: ServiceAlert) {
        self.data.write().await.alerts.push(alert);
    }

    /// Number of stored commuters.
    pub async fn commuter_count(&self) -> usize {
        self.data.read().await.commuters.len()
    }

    /// Every email record, oldest first.
    pub async fn emails(&self) -> Vec<EmailRecord> {
        self.data.read().await.emails.clone()
    }
}

#[async_trait]
impl CommuterStore for MemoryStore {
    async fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Commuter>, RepositoryError> {
        let data = self.data.read().await;
        Ok(data
            .commuters
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_account(&self, account: &str) -> Result<Vec<Commuter>, RepositoryError> {
        let data = self.data.read().await;
        Ok(data
            .commuters
            .values()
            .filter(|c| c.account.as_deref() == Some(account))
            .cloned()
            .collect())
    }

    async fn find_by_link(&self, link: &str) -> Result<Option<Commuter>, RepositoryError> {
        let data = self.data.read().await;
        Ok(data
            .commuters
            .values()
            .find(|c| c.link.as_deref() == Some(link))
            .cloned())
    }

    async fn get(&self, id: CommuterId) -> Result<Option<Commuter>, RepositoryError> {
        Ok(self.data.read().await.commuters.get(&id).cloned())
    }

    async fn create(&self, commuter: Commuter) -> Result<Commuter, RepositoryError> {
        self.data
            .write()
            .await
            .insert_commuter(commuter, commuter_core::new_link_token())
    }

    async fn save(&self, commuter: &mut Commuter) -> Result<(), RepositoryError> {
        let mut data = self.data.write().await;

        let Some(id) = commuter.id else {
            let link = commuter
                .link
                .clone()
                .unwrap_or_else(commuter_core::new_link_token);
            *commuter = data.insert_commuter(commuter.clone(), link)?;
            return Ok(());
        };

        let stored = data.commuters.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let link = stored.link.clone();
        *stored = commuter.clone();
        stored.link = link;
        commuter.link.clone_from(&stored.link);
        Ok(())
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn create(&self, record: NewEmailRecord) -> Result<EmailRecord, RepositoryError> {
        let mut data = self.data.write().await;
        if !data.commuters.contains_key(&record.commuter) {
            return Err(RepositoryError::NotFound);
        }

        data.next_email_id += 1;
        let now = Utc::now();
        let stored = EmailRecord {
            id: EmailId::new(data.next_email_id),
            account: record.account,
            commuter: record.commuter,
            organization: record.organization,
            metadata: record.metadata,
            result: record.result,
            created_at: now,
            modified_at: now,
        };
        data.emails.push(stored.clone());
        Ok(stored)
    }

    async fn latest_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Option<EmailRecord>, RepositoryError> {
        let data = self.data.read().await;
        Ok(data
            .emails
            .iter()
            .filter(|e| e.commuter == commuter)
            .max_by_key(|e| (e.modified_at, e.id))
            .cloned())
    }

    async fn list_for_commuter(
        &self,
        commuter: CommuterId,
    ) -> Result<Vec<EmailRecord>, RepositoryError> {
        let data = self.data.read().await;
        let mut records: Vec<EmailRecord> = data
            .emails
            .iter()
            .filter(|e| e.commuter == commuter)
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.modified_at, b.id).cmp(&(a.modified_at, a.id)));
        Ok(records)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<ServiceAlert>, RepositoryError> {
        Ok(self.data.read().await.alerts.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::email::{DeliveryResult, EmailOptions};
    use serde_json::Map;

    fn named(name: &str) -> Commuter {
        Commuter {
            given_name: Some(name.to_string()),
            anonymous: false,
            ..Commuter::default()
        }
    }

    fn record(commuter: CommuterId, status: Option<&str>) -> NewEmailRecord {
        NewEmailRecord {
            account: None,
            commuter,
            organization: None,
            metadata: EmailOptions::default(),
            result: DeliveryResult {
                id: None,
                status: status.map(str::to_string),
                details: Map::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_pages_follow_id_order() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c", "d", "e"] {
            CommuterStore::create(&store, named(name)).await.unwrap();
        }

        let page = store.find_page(2, 2).await.unwrap();
        let names: Vec<_> = page.iter().filter_map(|c| c.given_name.as_deref()).collect();
        assert_eq!(names, ["c", "d"]);

        assert!(store.find_page(5, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_always_generates_a_link() {
        let store = MemoryStore::new();
        let mut commuter = named("a");
        commuter.link = Some("caller-chosen".to_string());

        let created = CommuterStore::create(&store, commuter).await.unwrap();
        assert_ne!(created.link.as_deref(), Some("caller-chosen"));
        assert!(created.id.is_some());
    }

    #[tokio::test]
    async fn test_save_never_replaces_an_existing_link() {
        let store = MemoryStore::new();
        let mut commuter = CommuterStore::create(&store, named("a")).await.unwrap();
        let link = commuter.link.clone();

        commuter.link = Some("tampered".to_string());
        commuter.status = "sent".to_string();
        store.save(&mut commuter).await.unwrap();

        assert_eq!(commuter.link, link);
        let stored = store.get(commuter.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.link, link);
        assert_eq!(stored.status, "sent");
    }

    #[tokio::test]
    async fn test_save_inserts_new_commuters() {
        let store = MemoryStore::new();
        let mut commuter = named("a");
        store.save(&mut commuter).await.unwrap();

        assert!(commuter.id.is_some());
        assert!(commuter.link.is_some());
        assert_eq!(store.commuter_count().await, 1);
    }

    #[tokio::test]
    async fn test_latest_email_is_most_recent() {
        let store = MemoryStore::new();
        let commuter = CommuterStore::create(&store, named("a")).await.unwrap();
        let id = commuter.id.unwrap();

        EmailStore::create(&store, record(id, Some("queued"))).await.unwrap();
        EmailStore::create(&store, record(id, Some("delivered"))).await.unwrap();

        let latest = store.latest_for_commuter(id).await.unwrap().unwrap();
        assert_eq!(latest.delivery_status(), "delivered");
        assert_eq!(store.list_for_commuter(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_email_for_unknown_commuter_is_rejected() {
        let store = MemoryStore::new();
        let result = EmailStore::create(&store, record(CommuterId::new(99), None)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
