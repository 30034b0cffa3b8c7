//! Chat-completion service contract and the Azure OpenAI client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::CompletionSettings;
use crate::decision::ResponseSchema;
use crate::error::{CouncilError, Result};
use crate::transcript::{ChatMessage, Role};

/// A chat-completion backend.
///
/// Given a message list, return the assistant's reply text. When `schema` is
/// set the backend must constrain the reply to that structured shape.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Option<ResponseSchema>,
    ) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Azure OpenAI chat-completions client
#[derive(Clone)]
pub struct AzureOpenAiClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl AzureOpenAiClient {
    /// Build on a shared HTTP client; request timeouts are the client's
    pub fn with_client(client: reqwest::Client, settings: &CompletionSettings) -> Self {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.endpoint.trim_end_matches('/'),
            settings.deployment,
            settings.api_version
        );
        Self {
            client,
            url,
            api_key: settings.api_key.clone(),
            deployment: settings.deployment.clone(),
        }
    }

    fn request_body(messages: &[ChatMessage], schema: Option<ResponseSchema>) -> serde_json::Value {
        let wire: Vec<WireMessage<'_>> = messages.iter().map(WireMessage::from).collect();
        let mut body = json!({ "messages": wire });
        if let Some(schema) = schema {
            body["response_format"] = schema.response_format();
        }
        body
    }
}

#[async_trait]
impl ChatCompletion for AzureOpenAiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Option<ResponseSchema>,
    ) -> Result<String> {
        let body = Self::request_body(messages, schema);

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CouncilError::upstream(
                "Azure OpenAI",
                format!("{status}: {text}"),
            ));
        }

        let api_response: ApiResponse = response.json().await?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CouncilError::upstream("Azure OpenAI", "response had no content"))?;

        debug!(
            deployment = %self.deployment,
            chars = content.len(),
            structured = schema.is_some(),
            "Completion received"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.deployment
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role,
            name: message
                .name
                .as_deref()
                .map(wire_name)
                .filter(|name| !name.is_empty()),
            content: &message.content,
        }
    }
}

/// The API only accepts `[A-Za-z0-9_-]` in author names
fn wire_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(64)
        .collect()
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}
