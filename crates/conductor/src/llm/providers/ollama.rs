// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::{backoff, build_http_client, network_error, status_error};
use crate::llm::ApiClient;
use async_trait::async_trait;
use chrono::Utc;
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, timeout: Duration, max_retries: u32) -> LLMResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
            max_retries: max_retries.max(1),
        })
    }

    pub(crate) fn build_ollama_payload(request: &ProviderRequest) -> Value {
        let mut options = serde_json::Map::new();
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            options.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(stop) = &request.stop_sequences {
            options.insert("stop".to_string(), json!(stop));
        }

        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>(),
            "stream": false
        });
        if !options.is_empty() {
            payload["options"] = Value::Object(options);
        }
        if request.json_mode {
            payload["format"] = json!("json");
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }

    pub(crate) fn parse_ollama_response(
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let content = response_data["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from Ollama response".to_string())
            })?;

        let count = |key: &str| {
            response_data[key]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0)
        };
        let usage = Usage::new(count("prompt_eval_count"), count("eval_count"));

        let finish_reason = if response_data["done"].as_bool().unwrap_or(false) {
            Some("stop".to_string())
        } else {
            None
        };

        Ok(ProviderResponse {
            content: content.to_string(),
            model,
            usage,
            finish_reason,
            raw_response: response_data,
            received_at: Utc::now(),
        })
    }

    async fn execute_request_with_retry(&self, payload: &Value) -> LLMResult<Value> {
        let url = format!("{}/api/chat", self.base_url);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            let error = match self.client.post(&url).json(payload).send().await {
                Ok(response) if response.status().is_success() => {
                    return response.json().await.map_err(|e| {
                        LLMError::Serialisation(format!("Failed to parse response: {e}"))
                    });
                }
                Ok(response) => status_error("Ollama", response).await,
                Err(e) => network_error(&e, self.timeout),
            };

            if !error.is_transient() {
                return Err(error);
            }
            warn!(
                attempt = attempt + 1,
                error = %error,
                "Ollama request failed. Is Ollama running?"
            );
            last_error = Some(error);
            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Internal("Unknown error".to_string())))
    }
}

#[async_trait]
impl ApiClient for OllamaClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_ollama_payload(&request);
        debug!(model = %request.model, request_id = %request.id, "Sending Ollama request");
        let response_data = self.execute_request_with_retry(&payload).await?;
        Self::parse_ollama_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::{GenerationConfig, Message};

    #[test]
    fn sampling_options_are_nested() {
        let request = ProviderRequest::new(
            "llama3.1",
            vec![Message::user("hi")],
            &GenerationConfig::default(),
        )
        .with_json_mode(true);
        let payload = OllamaClient::build_ollama_payload(&request);
        assert_eq!(payload["options"]["temperature"], json!(0.0));
        assert_eq!(payload["format"], "json");
        assert_eq!(payload["stream"], false);
    }

    #[test]
    fn token_counts_are_summed() {
        let raw = json!({
            "message": {"content": "ok"},
            "done": true,
            "prompt_eval_count": 10,
            "eval_count": 5
        });
        let response = OllamaClient::parse_ollama_response(raw, "llama3.1".into()).unwrap();
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = OllamaClient::new(
            Some("http://gpu-box:11434/".into()),
            Duration::from_secs(1),
            1,
        )
        .unwrap();
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }
}
