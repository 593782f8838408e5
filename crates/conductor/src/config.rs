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

use crate::registry::DEFAULT_FUNCTION_PREFIX;
use crate::types::SuccessPolicy;
use llm_contracts::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing {0} in environment variables.")]
    MissingCredential(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub function_prefix: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            function_prefix: DEFAULT_FUNCTION_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub success_policy: SuccessPolicy,
    pub leaf_timeout_seconds: Option<u64>,
}

impl ExecutionSettings {
    pub fn leaf_timeout(&self) -> Option<Duration> {
        self.leaf_timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Root directory the file functions operate in.
    pub base_dir: PathBuf,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub model: ModelConfig,
    pub registry: RegistrySettings,
    pub execution: ExecutionSettings,
    pub workspace: WorkspaceSettings,
}

impl ConductorConfig {
    /// Reads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), provider = %config.model.provider, "Loaded configuration");
        config.with_env_overrides()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("CONDUCTOR_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(model) = lookup("CONDUCTOR_MODEL") {
            self.model.model = model;
        }
        if let Some(endpoint) = lookup("CONDUCTOR_ENDPOINT") {
            self.model.endpoint = Some(endpoint);
        }
        if let Some(timeout) = lookup("CONDUCTOR_QUERY_TIMEOUT") {
            self.model.query_timeout_seconds =
                timeout.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "CONDUCTOR_QUERY_TIMEOUT".to_string(),
                    reason: format!("'{timeout}' is not a whole number of seconds"),
                })?;
        }
        if let Some(policy) = lookup("CONDUCTOR_SUCCESS_POLICY") {
            self.execution.success_policy =
                policy.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: "CONDUCTOR_SUCCESS_POLICY".to_string(),
                    reason,
                })?;
        }
        Ok(self)
    }

    /// Checks settings that can only be judged at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.query_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "model.query_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.execution.leaf_timeout_seconds == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "execution.leaf_timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.model.needs_api_key() && std::env::var(&self.model.api_key_env).is_err() {
            return Err(ConfigError::MissingCredential(self.model.api_key_env.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn load_reads_every_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[model]
provider = "ollama"
model = "llama3.1"
query_timeout_seconds = 15

[registry]
function_prefix = "tool_"

[execution]
success_policy = "required_only"
leaf_timeout_seconds = 5

[workspace]
base_dir = "/tmp/work"
"#
        )
        .unwrap();

        let config = ConductorConfig::load(file.path()).unwrap();
        assert_eq!(config.model.model, "llama3.1");
        assert_eq!(config.model.query_timeout_seconds, 15);
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.registry.function_prefix, "tool_");
        assert_eq!(config.execution.success_policy, SuccessPolicy::RequiredOnly);
        assert_eq!(config.execution.leaf_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.workspace.base_dir, PathBuf::from("/tmp/work"));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: ConductorConfig = toml::from_str("").unwrap();
        assert_eq!(config, ConductorConfig::default());
        assert_eq!(config.registry.function_prefix, "ai_");
        assert_eq!(config.execution.success_policy, SuccessPolicy::AllSubtasks);
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("CONDUCTOR_PROVIDER", "ollama"),
            ("CONDUCTOR_QUERY_TIMEOUT", "9"),
            ("CONDUCTOR_SUCCESS_POLICY", "required-only"),
        ]
        .into_iter()
        .collect();
        let config = ConductorConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.model.provider, "ollama");
        assert_eq!(config.model.query_timeout_seconds, 9);
        assert_eq!(config.execution.success_policy, SuccessPolicy::RequiredOnly);
    }

    #[test]
    fn bad_override_is_reported() {
        let err = ConductorConfig::default()
            .apply_overrides(|key| (key == "CONDUCTOR_QUERY_TIMEOUT").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ConductorConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut config = ConductorConfig::default();
        config.model.provider = "ollama".into();
        config.model.query_timeout_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
