// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured
//! responses, enabling fast, CI-runnable tests without external API
//! calls. Responses can be routed by prompt substring (stable mappings
//! that survive concurrent fan-outs) or queued FIFO.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use reverie_core::traits::adapter::PluginAdapter;
use reverie_core::traits::provider::ProviderAdapter;
use reverie_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use reverie_core::ReverieError;

/// A mock LLM provider with routed and queued responses.
///
/// On each call, routes are checked first (first pattern contained in
/// the prompt wins; routes are not consumed). Otherwise the FIFO queue
/// is popped. When both are empty, a default "mock response" is
/// returned. `Err` entries produce `ReverieError::Provider`.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    routes: Arc<Mutex<Vec<(String, Result<String, String>)>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with no scripted responses.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            routes: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let provider = Self::new();
        {
            let mut queue = provider.responses.try_lock().expect("fresh mutex");
            queue.extend(responses.into_iter().map(Ok));
        }
        provider
    }

    /// Queue a successful response.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.responses.lock().await.push_back(Ok(text.into()));
    }

    /// Queue a provider failure.
    pub async fn add_error(&self, message: impl Into<String>) {
        self.responses.lock().await.push_back(Err(message.into()));
    }

    /// Respond with `text` whenever the prompt contains `pattern`.
    pub async fn route(&self, pattern: impl Into<String>, text: impl Into<String>) {
        self.routes.lock().await.push((pattern.into(), Ok(text.into())));
    }

    /// Fail whenever the prompt contains `pattern`.
    pub async fn route_error(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.routes.lock().await.push((pattern.into(), Err(message.into())));
    }

    /// Number of completion calls made so far.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All requests received so far, in call order.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_response(&self, prompt: &str) -> Result<String, String> {
        let routes = self.routes.lock().await;
        for (pattern, response) in routes.iter() {
            if prompt.contains(pattern) {
                return response.clone();
            }
        }
        drop(routes);

        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("mock response".to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ReverieError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ReverieError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ReverieError> {
        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.requests.lock().await.push(request.clone());

        match self.next_response(&prompt).await {
            Ok(text) => Ok(ProviderResponse {
                id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
                content: text,
                model: request.model,
                stop_reason: Some("end_turn".to_string()),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
            }),
            Err(message) => Err(ReverieError::Provider {
                message,
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_core::ChatMessage;

    fn request(prompt: &str) -> ProviderRequest {
        ProviderRequest {
            model: "test-model".to_string(),
            system_prompt: None,
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let resp = provider.complete(request("anything")).await.unwrap();
        assert_eq!(resp.content, "mock response");
    }

    #[tokio::test]
    async fn queued_responses_returned_in_order() {
        let provider =
            MockProvider::with_responses(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(provider.complete(request("a")).await.unwrap().content, "first");
        assert_eq!(provider.complete(request("b")).await.unwrap().content, "second");
        assert_eq!(
            provider.complete(request("c")).await.unwrap().content,
            "mock response"
        );
    }

    #[tokio::test]
    async fn routed_response_wins_over_queue() {
        let provider = MockProvider::with_responses(vec!["queued".to_string()]);
        provider.route("Score the relevance", "0.9").await;

        let routed = provider
            .complete(request("Score the relevance of this document"))
            .await
            .unwrap();
        assert_eq!(routed.content, "0.9");

        // Routes are not consumed.
        let routed_again = provider
            .complete(request("Score the relevance again"))
            .await
            .unwrap();
        assert_eq!(routed_again.content, "0.9");

        // Unrouted prompts still pop the queue.
        assert_eq!(provider.complete(request("other")).await.unwrap().content, "queued");
    }

    #[tokio::test]
    async fn queued_error_surfaces_as_provider_error() {
        let provider = MockProvider::new();
        provider.add_error("rate limited").await;
        let err = provider.complete(request("x")).await.unwrap_err();
        assert!(matches!(err, ReverieError::Provider { .. }));
    }

    #[tokio::test]
    async fn call_count_tracks_requests() {
        let provider = MockProvider::new();
        provider.complete(request("one")).await.unwrap();
        provider.complete(request("two")).await.unwrap();
        assert_eq!(provider.call_count().await, 2);
        assert_eq!(provider.requests().await.len(), 2);
    }
}
