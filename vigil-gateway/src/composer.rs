//! Best-effort answer composition over retrieved documents.
//!
//! The composer is an external collaborator: the engine hands it the query
//! plus the retrieved texts and gets back a natural-language answer. It is
//! optional and strictly best-effort; the query service already bounds it
//! with a timeout and falls back to raw retrieval on any failure.

use crate::service::RetrievedDocument;
use async_trait::async_trait;
use std::time::Duration;

/// Capability for turning a query plus retrieved context into an answer.
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    async fn compose(&self, query: &str, context: &[RetrievedDocument]) -> anyhow::Result<String>;
}

/// Configuration for the HTTP chat composer.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// OpenAI-compatible chat-completions endpoint URL.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Bearer token, if the endpoint requires one. Never logged.
    pub api_key: Option<String>,
    /// Hard cap on the outbound request, independent of the service-level
    /// composition timeout.
    pub request_timeout: Duration,
}

impl ComposerConfig {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            request_timeout: Duration::from_secs(8),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Composer backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpChatComposer {
    client: reqwest::Client,
    config: ComposerConfig,
}

impl HttpChatComposer {
    pub fn new(config: ComposerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn build_prompt(query: &str, context: &[RetrievedDocument]) -> String {
        let mut prompt = String::from(
            "Answer the question using only the intelligence reports below. \
             If the reports do not contain the answer, say so.\n\n",
        );
        for (i, doc) in context.iter().enumerate() {
            prompt.push_str(&format!("Report {} [{}]: {}\n", i + 1, doc.source, doc.text));
        }
        prompt.push_str(&format!("\nQuestion: {query}"));
        prompt
    }

    fn parse_response(body: &serde_json::Value) -> anyhow::Result<String> {
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("no message content in composer response"))
    }
}

#[async_trait]
impl AnswerComposer for HttpChatComposer {
    async fn compose(&self, query: &str, context: &[RetrievedDocument]) -> anyhow::Result<String> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a retrieval assistant summarizing field reports."
                },
                {
                    "role": "user",
                    "content": Self::build_prompt(query, context)
                }
            ],
            "temperature": 0.1,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&payload);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_context_and_query() {
        let context = vec![
            RetrievedDocument {
                text: "Troop buildup near Galwan".to_string(),
                source: "SAT".to_string(),
                score: 0.9,
            },
            RetrievedDocument {
                text: "Routine patrol near Poonch".to_string(),
                source: "HUMINT".to_string(),
                score: 0.4,
            },
        ];

        let prompt = HttpChatComposer::build_prompt("What is happening at Galwan?", &context);
        assert!(prompt.contains("Report 1 [SAT]: Troop buildup near Galwan"));
        assert!(prompt.contains("Report 2 [HUMINT]: Routine patrol near Poonch"));
        assert!(prompt.ends_with("Question: What is happening at Galwan?"));
    }

    #[test]
    fn parses_chat_completion_response() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Buildup confirmed."}}]
        });
        assert_eq!(
            HttpChatComposer::parse_response(&body).unwrap(),
            "Buildup confirmed."
        );
    }

    #[test]
    fn rejects_malformed_response() {
        let body = serde_json::json!({"choices": []});
        assert!(HttpChatComposer::parse_response(&body).is_err());
    }
}
