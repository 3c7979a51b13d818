//! OpenAI chat client with JSON-mode support.

use super::{LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiClient {
    pub model: String,
    api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(model: String, api_key: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            model,
            api_key,
            temperature: 0.0,
            max_tokens: 4096,
            client,
        })
    }

    async fn request(
        &self,
        prompt: &str,
        system: Option<&str>,
        json_mode: bool,
    ) -> Result<LlmResponse, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let resp = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_s = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(LlmError::RateLimited {
                status,
                retry_after_s,
            });
        }
        if status >= 500 {
            return Err(LlmError::Server { status });
        }
        if status >= 400 {
            let detail = resp.text().await.unwrap_or_default();
            return Err(LlmError::InvalidResponse(format!(
                "status {}: {}",
                status, detail
            )));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("response missing content".to_string()))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: self.model.clone(),
            cached: false,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        self.request(prompt, system, false).await
    }

    async fn complete_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        self.request(prompt, system, true).await
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
