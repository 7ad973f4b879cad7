//! OpenAI chat-completions API types.

use serde::{Deserialize, Serialize};

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user`, or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    /// Completion choices.
    pub choices: Vec<ChatChoice>,
    /// Token accounting, if reported.
    pub usage: Option<Usage>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    /// The generated message.
    pub message: ChatMessage,
}

/// Token usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens billed.
    pub total_tokens: u32,
}

/// Error body returned by the OpenAI API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error payload.
    pub error: ApiErrorBody,
}

/// Error payload inside an API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes() {
        let request = ChatCompletionRequest {
            model: "gpt-4".to_string(),
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            max_tokens: 100,
            temperature: 0.7,
        };
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
    }

    #[test]
    fn response_parses() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }"#;
        let response: ChatCompletionResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(response.choices[0].message.content, "hello");
        assert_eq!(response.usage.unwrap().total_tokens, 7);
    }
}
