//! # Repository Boundary
//!
//! Persistence seam for `User` and `ApiRequest` (spec.md §6). The dispatch
//! core and accounting finalizer depend only on this trait; `relay-gateway`
//! provides the bundled in-memory implementation. Every method that mutates a
//! single entity by id must be linearizable per id — concurrent calls
//! touching the same id observe a total order, calls touching different ids
//! may run concurrently. `relay-sdk` does not assume anything stronger (no
//! cross-row transactions) so a networked store can implement this without a
//! distributed-transaction layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{ApiRequest, User};

#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("not found: {what}")]
    NotFound { what: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_api_key_hash(&self, hash: &str) -> Result<Option<User>, RepositoryError>;
    async fn save_user(&self, user: User) -> Result<(), RepositoryError>;

    /// Debit `amount` credits from `user_id`, linearizable per user id. The
    /// bool return mirrors `User::debit_credits`: `true` if the full amount
    /// was available, `false` if the debit was clamped at zero (a billing
    /// overrun the caller must log/alert on, not retry).
    async fn debit_credits(&self, user_id: &str, amount: u64) -> Result<bool, RepositoryError>;

    async fn record_request(&self, request: ApiRequest) -> Result<(), RepositoryError>;
    async fn find_request_by_id(&self, id: &str) -> Result<Option<ApiRequest>, RepositoryError>;

    /// Idempotent: calling this twice with a request already in a terminal
    /// state must not double-count usage (spec.md §4.6).
    async fn finalize_request(&self, request: ApiRequest) -> Result<(), RepositoryError>;
}
