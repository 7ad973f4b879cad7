//! OpenAI chat-completions integration.

pub mod api_types;
pub mod client;

pub use api_types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Usage};
pub use client::{ChatOutput, OpenAiClient, OpenAiConfig, OpenAiError};
