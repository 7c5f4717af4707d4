//! # Accounting Finalizer
//!
//! Runs once a dispatch reaches a terminal state: persist the request,
//! debit credits, update usage counters, and propagate the outcome back to
//! the caller (spec.md §4.6). Credit debit is compare-and-commit against the
//! repository with up to three retries before the overrun is accepted and
//! logged — the core deliberately does not hold a lock across the adapter
//! call, so a debit can race a concurrent request from the same user; three
//! retries absorbs that without blocking the hot path on a distributed lock.

use chrono::Utc;
use tracing::{error, warn};

use crate::entities::{ApiRequest, RequestHistoryEntry};
use crate::error::CoreError;
use crate::repository::{Repository, RepositoryError};

const DEBIT_RETRY_ATTEMPTS: u32 = 3;

pub struct FinalizeOutcome {
    pub billed_credits: u64,
    pub overrun: bool,
}

/// Persists `request` and debits `credits` from `user_id`. Idempotent: if
/// `request` is already terminal, the repository's `finalize_request` must
/// not double count — this function itself does not guard against being
/// called twice, that guarantee belongs to the repository implementation.
pub async fn finalize(
    repository: &dyn Repository,
    request: ApiRequest,
    user_id: &str,
    credits: u64,
) -> Result<FinalizeOutcome, CoreError> {
    if let Err(err) = repository.finalize_request(request.clone()).await {
        error!(request_id = %request.id, user_id, error = %err, "failed to persist finalized request");
        return Err(persistence_error(err));
    }

    let mut last_result = Ok(false);
    for attempt in 1..=DEBIT_RETRY_ATTEMPTS {
        match repository.debit_credits(user_id, credits).await {
            Ok(full) => {
                last_result = Ok(full);
                if full {
                    break;
                }
                if attempt < DEBIT_RETRY_ATTEMPTS {
                    continue;
                }
            }
            Err(err) => {
                error!(request_id = %request.id, user_id, attempt, error = %err, "credit debit failed");
                last_result = Err(err);
            }
        }
    }

    let outcome = match last_result {
        Ok(full) => {
            if !full {
                warn!(
                    request_id = %request.id,
                    user_id,
                    credits,
                    "billing.overrun: user balance insufficient to cover actual usage"
                );
            }
            FinalizeOutcome { billed_credits: credits, overrun: !full }
        }
        Err(err) => return Err(persistence_error(err)),
    };

    update_usage_and_history(repository, &request, user_id, credits).await;

    Ok(outcome)
}

/// Step 3 of spec.md §4.6: update `user.usage` counters and append to the
/// bounded `requestHistory` ring. Best-effort — a failure here doesn't
/// unwind the debit that already happened, it's just logged.
async fn update_usage_and_history(repository: &dyn Repository, request: &ApiRequest, user_id: &str, credits: u64) {
    let mut user = match repository.find_user_by_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(request_id = %request.id, user_id, "cannot update usage: user not found");
            return;
        }
        Err(err) => {
            error!(request_id = %request.id, user_id, error = %err, "failed to load user for usage update");
            return;
        }
    };

    user.record_completed_request(RequestHistoryEntry {
        request_id: request.id.clone(),
        endpoint: request.endpoint.clone(),
        tokens: request.tokens,
        credits,
        completed_at: request.completed_at.unwrap_or_else(Utc::now),
    });

    if let Err(err) = repository.save_user(user).await {
        error!(request_id = %request.id, user_id, error = %err, "failed to persist updated usage counters");
    }
}

fn persistence_error(err: RepositoryError) -> CoreError {
    match err {
        RepositoryError::NotFound { what } => CoreError::NotFound { what },
        RepositoryError::Storage { message } => CoreError::Internal { message },
    }
}
