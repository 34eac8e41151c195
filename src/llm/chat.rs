//! OpenAI Chat Completions client (`/v1/chat/completions`), non-streaming.

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::AgentError;

use super::{LlmSettings, TextGenerator};

#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}

impl ChatCompletionsClient {
    pub fn new(settings: LlmSettings, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            settings,
        })
    }
}

#[async_trait::async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, AgentError> {
        let url = self
            .settings
            .provider
            .build_chat_url(&self.settings.base_url, &self.settings.model);

        let body = json!({
            "model": self.settings.model,
            "stream": false,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        let request = self
            .settings
            .provider
            .authorize(self.http.post(&url).json(&body), self.settings.api_key.as_deref());

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("generation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!(
                "generation service returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("malformed generation response: {e}")))?;

        extract_content(&payload)
    }

    fn name(&self) -> String {
        self.settings.model.clone()
    }
}

fn extract_content(payload: &Value) -> Result<String, AgentError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            AgentError::Provider("generation response contained no message content".to_string())
        })
}
