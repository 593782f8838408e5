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

pub mod ollama;
pub mod openai;
pub mod scripted;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use scripted::ScriptedClient;

use llm_contracts::{LLMError, LLMResult};
use reqwest::{Response, StatusCode};
use std::time::Duration;

/// Exponential backoff between attempts, capped at eight seconds.
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.pow(attempt.min(3)))
}

/// Maps a non-success HTTP status to the contract error it stands for.
pub(crate) async fn status_error(provider: &str, response: Response) -> LLMError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LLMError::Authentication(format!("{provider} rejected credentials: {body}"))
        }
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
        _ => LLMError::Provider(format!("{provider} API error {status}: {body}")),
    }
}

pub(crate) fn network_error(err: &reqwest::Error, timeout: Duration) -> LLMError {
    if err.is_timeout() {
        LLMError::timeout(timeout)
    } else {
        LLMError::Network(format!("Request failed: {err}"))
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> LLMResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LLMError::Configuration(format!("Failed to create HTTP client: {e}")))
}
