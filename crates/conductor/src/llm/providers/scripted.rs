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

use crate::llm::ApiClient;
use async_trait::async_trait;
use llm_contracts::{LLMError, LLMResult, ProviderRequest, ProviderResponse};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Responder = Arc<dyn Fn(&ProviderRequest) -> LLMResult<String> + Send + Sync>;
pub type Delay = Arc<dyn Fn(&ProviderRequest) -> Option<Duration> + Send + Sync>;

/// Deterministic stand-in for a model service. Replies are computed from
/// the request alone, and every request is recorded for later inspection.
pub struct ScriptedClient {
    responder: Responder,
    calls: Mutex<Vec<ProviderRequest>>,
    delay: Option<Delay>,
}

impl ScriptedClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ProviderRequest) -> LLMResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Replays `replies` in order, one per request.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: Vec<String> = replies.into_iter().map(Into::into).collect();
        let next = AtomicUsize::new(0);
        Self::new(move |_| {
            let i = next.fetch_add(1, Ordering::SeqCst);
            replies.get(i).cloned().ok_or_else(|| {
                LLMError::Internal(format!("scripted replies exhausted after {i} requests"))
            })
        })
    }

    /// Holds every reply back by `delay`, for timeout tests.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_for(move |_| Some(delay))
    }

    /// Holds back only the replies for which `delay` returns a duration.
    pub fn with_delay_for<F>(mut self, delay: F) -> Self
    where
        F: Fn(&ProviderRequest) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay = Some(Arc::new(delay));
        self
    }

    pub fn calls(&self) -> Vec<ProviderRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        if let Some(delay) = self.delay.as_ref().and_then(|delay| delay(&request)) {
            tokio::time::sleep(delay).await;
        }
        let content = (self.responder)(&request)?;
        Ok(ProviderResponse::text(content, request.model))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
