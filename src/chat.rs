//! Chat completion client
//!
//! Generates a persona's spoken reply from a transcript. Each request is
//! stateless: the persona's prompt prefix carries the addressing context,
//! and no conversation history is kept across round trips.

use crate::persona::Persona;
use crate::{Error, Result};

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Stateless chat completion client
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Create a chat client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    /// Generate a reply to `transcript` in the persona's voice
    ///
    /// The persona's prompt prefix is prepended to the transcript so the
    /// model knows which persona was addressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Chat`] if the service rejects the request or the
    /// response carries no choices
    pub async fn respond(&self, transcript: &str, persona: &Persona) -> Result<String> {
        let content = format!("{}{transcript}", persona.prompt_prefix);
        tracing::debug!(persona = %persona.name, "requesting chat completion");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &content,
            }],
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Chat(format!("chat API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Chat("chat response carried no choices".to_string()))?;

        tracing::info!(persona = %persona.name, chars = reply.len(), "reply generated");
        Ok(reply)
    }
}
