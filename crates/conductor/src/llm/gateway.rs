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

use super::json::extract_json_from_text;
use super::shape::ResponseShape;
use super::{ApiClient, OllamaClient, OpenAIClient};
use llm_contracts::{
    GenerationConfig, LLMError, LLMResult, Message, ModelConfig, Provider, ProviderRequest,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("model query failed: {0}")]
    Model(#[from] LLMError),

    #[error("reply contains no parseable JSON")]
    Unparseable { raw: String },

    #[error("reply has the wrong shape: {reason}")]
    ShapeMismatch { reason: String, raw: String },
}

impl QueryError {
    pub fn raw(&self) -> Option<&str> {
        match self {
            QueryError::Model(_) => None,
            QueryError::Unparseable { raw } | QueryError::ShapeMismatch { raw, .. } => Some(raw),
        }
    }
}

/// Structured, time-bounded access to a model service.
#[derive(Clone)]
pub struct ModelGateway {
    client: Arc<dyn ApiClient>,
    model: String,
    generation: GenerationConfig,
    timeout: Duration,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelGateway {
    pub fn new(client: Arc<dyn ApiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            generation: GenerationConfig::default(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Builds the HTTP provider named in `config`. Credentials come from the
    /// environment variable the config points at.
    pub fn from_config(config: &ModelConfig) -> LLMResult<Self> {
        let timeout = Duration::from_secs(config.query_timeout_seconds.max(1));
        let client: Arc<dyn ApiClient> = match config.provider_kind() {
            Provider::OpenAI => {
                let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                    LLMError::Configuration(format!(
                        "Missing {} in environment variables.",
                        config.api_key_env
                    ))
                })?;
                Arc::new(OpenAIClient::new(
                    api_key,
                    config.endpoint.clone(),
                    timeout,
                    config.max_retries,
                )?)
            }
            Provider::Ollama => Arc::new(OllamaClient::new(
                config.endpoint.clone(),
                timeout,
                config.max_retries,
            )?),
            Provider::Scripted => {
                return Err(LLMError::Configuration(
                    "the scripted provider cannot be built from configuration".to_string(),
                ))
            }
            Provider::Custom(name) => {
                return Err(LLMError::Configuration(format!(
                    "unsupported model provider '{name}'"
                )))
            }
        };

        let generation = GenerationConfig {
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            ..GenerationConfig::default()
        };
        Ok(Self::new(client, config.model.clone())
            .with_timeout(timeout)
            .with_generation(generation))
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One raw completion, bounded by the configured timeout.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<String, QueryError> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(system_prompt), Message::user(user_prompt)],
            &self.generation,
        )
        .with_json_mode(json_mode);
        let request_id = request.id;

        let started = Instant::now();
        let pending = self.client.send_request(request);
        let response = match tokio::time::timeout(self.timeout, pending).await {
            Ok(result) => result?,
            Err(_) => {
                let err = LLMError::timeout(self.timeout);
                warn!(%request_id, error = %err, "Model query timed out");
                return Err(err.into());
            }
        };
        debug!(
            %request_id,
            provider = self.client.provider_name(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            tokens = response.usage.total_tokens,
            "Model query completed"
        );
        Ok(response.content.trim().to_string())
    }

    /// A completion whose reply must contain JSON matching `shape`.
    pub async fn query(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        shape: &ResponseShape,
    ) -> Result<Value, QueryError> {
        let raw = self
            .complete(system_prompt, user_prompt, shape.wants_object())
            .await?;
        let value = extract_json_from_text(&raw)
            .ok_or_else(|| QueryError::Unparseable { raw: raw.clone() })?;
        shape
            .check(&value)
            .map_err(|reason| QueryError::ShapeMismatch { reason, raw })?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::shape::ShapeKind;
    use crate::llm::ScriptedClient;
    use serde_json::json;

    fn gateway(client: ScriptedClient) -> (Arc<ScriptedClient>, ModelGateway) {
        let client = Arc::new(client);
        let gateway = ModelGateway::new(client.clone(), "test-model");
        (client, gateway)
    }

    #[tokio::test]
    async fn query_extracts_and_checks_json() {
        let (client, gateway) =
            gateway(ScriptedClient::replies(["```json\n{\"subtasks\": []}\n```"]));
        let shape = ResponseShape::new(ShapeKind::Object).require_field("subtasks");
        let value = gateway.query("system", "user", &shape).await.unwrap();
        assert_eq!(value, json!({"subtasks": []}));

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].temperature, Some(0.0));
        assert!(calls[0].json_mode);
        assert_eq!(calls[0].system_prompt(), Some("system"));
    }

    #[tokio::test]
    async fn unparseable_reply_keeps_raw_text() {
        let (_, gateway) = gateway(ScriptedClient::replies(["no idea, sorry"]));
        let shape = ResponseShape::new(ShapeKind::Object);
        let err = gateway.query("s", "u", &shape).await.unwrap_err();
        assert_eq!(
            err,
            QueryError::Unparseable {
                raw: "no idea, sorry".into()
            }
        );
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let (_, gateway) = gateway(
            ScriptedClient::replies(["{}"]).with_delay(Duration::from_millis(200)),
        );
        let gateway = gateway.with_timeout(Duration::from_millis(20));
        let err = gateway.complete("s", "u", false).await.unwrap_err();
        assert_eq!(err, QueryError::Model(LLMError::Timeout { millis: 20 }));
    }

    #[test]
    fn scripted_and_unknown_providers_are_not_configurable() {
        let config = ModelConfig {
            provider: "scripted".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            ModelGateway::from_config(&config),
            Err(LLMError::Configuration(_))
        ));
        let config = ModelConfig {
            provider: "gemini".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            ModelGateway::from_config(&config),
            Err(LLMError::Configuration(_))
        ));
    }
}
