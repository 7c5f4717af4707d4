//! # In-Memory Repository
//!
//! Reference `Repository` implementation: `DashMap`-backed storage with a
//! per-user `tokio::sync::Mutex` serializing credit debits, matching the
//! concurrency model spec.md §5 specifies. Not meant for production use
//! (entirely volatile) — it exists so the dispatch core, the server, and the
//! integration tests have a real implementation to run against without a
//! database dependency.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use relay_sdk::entities::{ApiRequest, User};
use relay_sdk::repository::{Repository, RepositoryError};

pub struct InMemoryRepository {
    users_by_id: DashMap<String, User>,
    users_by_key_hash: DashMap<String, String>,
    requests: DashMap<String, ApiRequest>,
    /// One lock per user id, created lazily, so debits for different users
    /// never contend with each other.
    debit_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            users_by_id: DashMap::new(),
            users_by_key_hash: DashMap::new(),
            requests: DashMap::new(),
            debit_locks: DashMap::new(),
        }
    }

    pub fn seed_user(&self, user: User) {
        for hash in &user.api_key_hashes {
            self.users_by_key_hash.insert(hash.clone(), user.id.clone());
        }
        self.users_by_id.insert(user.id.clone(), user);
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.debit_locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users_by_id.get(id).map(|u| u.clone()))
    }

    async fn find_user_by_api_key_hash(&self, hash: &str) -> Result<Option<User>, RepositoryError> {
        let Some(user_id) = self.users_by_key_hash.get(hash).map(|v| v.clone()) else {
            return Ok(None);
        };
        Ok(self.users_by_id.get(&user_id).map(|u| u.clone()))
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        for hash in &user.api_key_hashes {
            self.users_by_key_hash.insert(hash.clone(), user.id.clone());
        }
        self.users_by_id.insert(user.id.clone(), user);
        Ok(())
    }

    async fn debit_credits(&self, user_id: &str, amount: u64) -> Result<bool, RepositoryError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let mut entry = self
            .users_by_id
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::NotFound { what: format!("user {user_id}") })?;
        Ok(entry.debit_credits(amount))
    }

    async fn record_request(&self, request: ApiRequest) -> Result<(), RepositoryError> {
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }

    async fn find_request_by_id(&self, id: &str) -> Result<Option<ApiRequest>, RepositoryError> {
        Ok(self.requests.get(id).map(|r| r.clone()))
    }

    async fn finalize_request(&self, request: ApiRequest) -> Result<(), RepositoryError> {
        if let Some(existing) = self.requests.get(&request.id) {
            if existing.is_terminal() {
                return Ok(());
            }
        }
        self.requests.insert(request.id.clone(), request);
        Ok(())
    }
}
