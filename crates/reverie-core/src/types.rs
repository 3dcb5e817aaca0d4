// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Reverie engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Storage,
}

/// A single conversation message as consumed by extraction and fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author role: "user", "assistant", or "system".
    pub role: String,
    /// Plain-text message content.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Optional system prompt prepended to the conversation.
    pub system_prompt: Option<String>,
    /// Conversation messages in chronological order.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A completion response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Provider-assigned response id.
    pub id: String,
    /// Generated text content.
    pub content: String,
    /// Model that produced the response.
    pub model: String,
    /// Why generation stopped, if reported.
    pub stop_reason: Option<String>,
    /// Token accounting for the call.
    pub usage: TokenUsage,
}

/// Token usage reported by a provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn chat_message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hello");

        let assistant = ChatMessage::assistant("hi there");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn adapter_type_display_round_trip() {
        for variant in [AdapterType::Provider, AdapterType::Embedding, AdapterType::Storage] {
            let s = variant.to_string();
            assert_eq!(AdapterType::from_str(&s).unwrap(), variant);
        }
    }

    #[test]
    fn chat_message_serde_round_trip() {
        let msg = ChatMessage::user("my dog is named Max");
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, "user");
        assert_eq!(back.content, "my dog is named Max");
    }
}
