//! # Moderation Predicate
//!
//! Moderation/CSAM policy is treated as a pluggable predicate at the gateway
//! boundary, not a built-in classifier (spec.md §1). The default
//! implementation is permissive; a deployment wires in its own `ModerationGate`
//! and, optionally, the bundled Discord notifier for positive matches.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Allowed,
    Flagged,
}

#[async_trait]
pub trait ModerationGate: Send + Sync {
    async fn check(&self, user_id: &str, model: &str, content: &str) -> ModerationVerdict;
}

/// Never flags anything — the bundled default when no policy is configured.
pub struct PermissiveGate;

#[async_trait]
impl ModerationGate for PermissiveGate {
    async fn check(&self, _user_id: &str, _model: &str, _content: &str) -> ModerationVerdict {
        ModerationVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permissive_gate_always_allows() {
        let gate = PermissiveGate;
        assert_eq!(gate.check("u1", "gpt-4", "anything").await, ModerationVerdict::Allowed);
    }
}
