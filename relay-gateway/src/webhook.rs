//! # Discord Webhook Notifier
//!
//! Fires a best-effort Discord webhook when the moderation gate flags a
//! request (spec.md §6's `DISCORD_WEBHOOK_URL`). A missing URL disables the
//! notifier entirely rather than erroring — alerting is ambient ops, not a
//! request-path dependency.

use tracing::warn;

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), webhook_url }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Fire-and-forget: a webhook failure is logged, never surfaced to the
    /// caller whose request triggered the flag.
    pub async fn notify_flagged(&self, user_id: &str, model: &str, request_id: &str) {
        let Some(url) = &self.webhook_url else { return };
        let payload = serde_json::json!({
            "content": format!(
                "moderation flag — user `{user_id}`, model `{model}`, request `{request_id}`"
            )
        });
        if let Err(err) = self.client.post(url).json(&payload).send().await {
            warn!(user_id, model, request_id, error = %err, "failed to deliver moderation webhook");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_url() {
        let notifier = DiscordNotifier::new(None);
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn enabled_with_url() {
        let notifier = DiscordNotifier::new(Some("https://discord.com/api/webhooks/x".to_string()));
        assert!(notifier.is_enabled());
    }
}
