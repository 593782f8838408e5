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

use crate::types::Provider;
use serde::{Deserialize, Serialize};

/// Which model service to talk to and how patiently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub query_timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            endpoint: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: None,
            query_timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_timeout_seconds() -> u64 {
    60
}

impl ModelConfig {
    pub fn provider_kind(&self) -> Provider {
        Provider::from(self.provider.clone())
    }

    pub fn needs_api_key(&self) -> bool {
        matches!(self.provider_kind(), Provider::OpenAI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_fall_back_to_defaults() {
        let config: ModelConfig = toml::from_str(
            r#"
            provider = "ollama"
            model = "llama3.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.provider_kind(), Provider::Ollama);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.query_timeout_seconds, 60);
        assert!(!config.needs_api_key());
    }
}
