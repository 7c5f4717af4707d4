//! # Echo Adapter
//!
//! A trivial `Adapter` implementation that never leaves the process: it
//! echoes a synthesized chat-completion body back to the caller. Vendor wire
//! formats and real upstream transport are explicitly out of scope for this
//! codebase (spec.md §1) — this adapter exists purely so `create_server` has
//! something concrete to dispatch through out of the box, and so the
//! integration tests can drive the full pipeline without network access.
//! A real deployment registers its own `Adapter` per sub-provider instead.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use relay_sdk::adapter::{Adapter, AdapterError, AdapterResponse};

pub struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, _endpoint: &str, normalized_request: Value, _deadline: Duration) -> Result<AdapterResponse, AdapterError> {
        let model = normalized_request.get("model").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let prompt_tokens = normalized_request
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|arr| arr.len() as u64 * 8)
            .unwrap_or(8);
        let completion_tokens = 16u64;

        let body = json!({
            "id": format!("echo-{}", uuid::Uuid::new_v4()),
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "This is a response from the echo adapter." },
                "finish_reason": "stop",
            }],
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
                "total_tokens": prompt_tokens + completion_tokens,
            }
        });
        let size_bytes = body.to_string().len() as u64;

        Ok(AdapterResponse { body, tokens: prompt_tokens + completion_tokens, size_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_a_well_formed_completion() {
        let adapter = EchoAdapter;
        let request = json!({"model": "gpt-4", "messages": [{"role": "user", "content": "hi"}]});
        let response = adapter.invoke("/v1/chat/completions", request, Duration::from_secs(5)).await.unwrap();
        assert_eq!(response.body["model"], "gpt-4");
        assert!(response.tokens > 0);
    }
}
