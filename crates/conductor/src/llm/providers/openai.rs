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

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAIClient {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> LLMResult<Self> {
        if api_key.trim().is_empty() {
            return Err(LLMError::Authentication(
                "OpenAI API key is empty".to_string(),
            ));
        }
        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
            max_retries: max_retries.max(1),
        })
    }

    pub(crate) fn build_openai_payload(request: &ProviderRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| {
                json!({
                    "role": msg.role,
                    "content": msg.content
                })
            }).collect::<Vec<_>>()
        });

        if let Some(max_tokens) = request.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop_sequences {
            payload["stop"] = json!(stop);
        }
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        for (key, value) in &request.provider_specific {
            payload[key] = value.clone();
        }

        payload
    }

    pub(crate) fn parse_openai_response(
        response_data: Value,
        model: String,
    ) -> LLMResult<ProviderResponse> {
        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider("Failed to extract content from OpenAI response".to_string())
            })?;

        let usage = response_data
            .get("usage")
            .map(|usage_data| {
                Usage::new(
                    token_count(&usage_data["prompt_tokens"]),
                    token_count(&usage_data["completion_tokens"]),
                )
            })
            .unwrap_or_default();

        let finish_reason = response_data["choices"][0]["finish_reason"]
            .as_str()
            .map(|s| s.to_string());

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
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            let sent = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await;

            let error = match sent {
                Ok(response) if response.status().is_success() => {
                    return response.json().await.map_err(|e| {
                        LLMError::Serialisation(format!("Failed to parse response: {e}"))
                    });
                }
                Ok(response) => status_error("OpenAI", response).await,
                Err(e) => network_error(&e, self.timeout),
            };

            if !error.is_transient() {
                return Err(error);
            }
            warn!(attempt = attempt + 1, error = %error, "OpenAI request failed");
            last_error = Some(error);
            if attempt + 1 < self.max_retries {
                tokio::time::sleep(backoff(attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| LLMError::Internal("Unknown error".to_string())))
    }
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

#[async_trait]
impl ApiClient for OpenAIClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        let payload = Self::build_openai_payload(&request);
        debug!(model = %request.model, request_id = %request.id, "Sending OpenAI request");
        let response_data = self.execute_request_with_retry(&payload).await?;
        Self::parse_openai_response(response_data, request.model)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_contracts::{GenerationConfig, Message};

    #[test]
    fn payload_carries_zero_temperature_and_json_mode() {
        let request = ProviderRequest::new(
            "gpt-4o-mini",
            vec![Message::system("rules"), Message::user("task")],
            &GenerationConfig::default(),
        )
        .with_json_mode(true);
        let payload = OpenAIClient::build_openai_payload(&request);
        assert_eq!(payload["temperature"], json!(0.0));
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert!(payload.get("max_tokens").is_none());
    }

    #[test]
    fn response_content_and_usage_are_extracted() {
        let raw = json!({
            "choices": [{"message": {"content": "{\"subtasks\": []}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let response = OpenAIClient::parse_openai_response(raw, "m".into()).unwrap();
        assert_eq!(response.content, "{\"subtasks\": []}");
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn missing_content_is_a_provider_error() {
        let err = OpenAIClient::parse_openai_response(json!({"choices": []}), "m".into())
            .unwrap_err();
        assert!(matches!(err, LLMError::Provider(_)));
    }

    #[test]
    fn empty_key_is_rejected_up_front() {
        let err = OpenAIClient::new(String::new(), None, Duration::from_secs(1), 1).unwrap_err();
        assert!(matches!(err, LLMError::Authentication(_)));
    }
}
