use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::state::{HistoryTurn, Level};

/// Most recent history entries sent along with a question.
pub const HISTORY_LIMIT: usize = 10;

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub level: Level,
    pub history: Vec<HistoryTurn>,
}

impl ChatRequest {
    /// Build a request, keeping only the last [`HISTORY_LIMIT`] history entries.
    pub fn new(message: &str, level: Level, history: &[HistoryTurn]) -> Self {
        let start = history.len().saturating_sub(HISTORY_LIMIT);
        Self {
            message: message.to_string(),
            level,
            history: history[start..].to_vec(),
        }
    }
}

/// Structured answer from the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Body of `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Anything that can answer a chat question.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send_chat_message(
        &self,
        message: &str,
        level: Level,
        history: &[HistoryTurn],
    ) -> Result<ChatReply, RequestError>;
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single best-effort POST; the response is buffered and parsed whole.
    pub async fn send_chat_message(
        &self,
        message: &str,
        level: Level,
        history: &[HistoryTurn],
    ) -> Result<ChatReply, RequestError> {
        let url = format!("{}/chat", self.base_url);
        let request = ChatRequest::new(message, level, history);

        tracing::debug!(
            level = level.as_str(),
            history = request.history.len(),
            "posting chat message"
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }

        let body = response.text().await?;
        let reply: ChatReply = serde_json::from_str(&body)?;
        Ok(reply)
    }

    /// Query the backend's health endpoint.
    pub async fn status(&self) -> Result<BackendStatus, RequestError> {
        let url = format!("{}/", self.base_url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RequestError::Status(status));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn send_chat_message(
        &self,
        message: &str,
        level: Level,
        history: &[HistoryTurn],
    ) -> Result<ChatReply, RequestError> {
        ChatClient::send_chat_message(self, message, level, history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn turn(role: ChatRole, content: &str) -> HistoryTurn {
        HistoryTurn {
            role,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_json_and_parses_reply() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "message": "What is a quasar?",
                "level": "advanced",
                "history": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello!"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"answer":"An active galactic nucleus.","sources":["https://a.com/p"]}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url());
        let history = vec![turn(ChatRole::User, "Hi"), turn(ChatRole::Assistant, "Hello!")];
        let reply = client
            .send_chat_message("What is a quasar?", Level::Advanced, &history)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply.answer, "An active galactic nucleus.");
        assert_eq!(reply.sources, vec!["https://a.com/p".to_string()]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = ChatClient::new(&server.url());
        let err = client
            .send_chat_message("hi", Level::Beginner, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"text":"wrong shape"}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url());
        let err = client
            .send_chat_message("hi", Level::Beginner, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[tokio::test]
    async fn test_missing_sources_defaults_to_empty() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat")
            .with_status(200)
            .with_body(r#"{"answer":"Yes."}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&server.url());
        let reply = client
            .send_chat_message("hi", Level::Beginner, &[])
            .await
            .unwrap();

        assert_eq!(reply.answer, "Yes.");
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_transport_error() {
        // Port 1 is reserved and nothing listens there.
        let client = ChatClient::new("http://127.0.0.1:1");
        let err = client
            .send_chat_message("hi", Level::Beginner, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::Transport(_)));
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"{"status":"ok","message":"AstroGuide backend is running"}"#)
            .create_async()
            .await;

        let client = ChatClient::new(&format!("{}/", server.url()));
        let status = client.status().await.unwrap();
        assert_eq!(status.status, "ok");
        assert_eq!(status.message, "AstroGuide backend is running");
    }

    #[test]
    fn test_request_keeps_last_ten_history_entries() {
        let history: Vec<HistoryTurn> = (0..15)
            .map(|i| turn(ChatRole::User, &format!("q{}", i)))
            .collect();

        let request = ChatRequest::new("next", Level::Beginner, &history);
        assert_eq!(request.history.len(), HISTORY_LIMIT);
        assert_eq!(request.history.first().unwrap().content, "q5");
        assert_eq!(request.history.last().unwrap().content, "q14");
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = ChatClient::new("http://example.com:8000//");
        assert_eq!(client.base_url(), "http://example.com:8000");
    }
}
