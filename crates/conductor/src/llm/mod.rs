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

pub mod gateway;
pub mod json;
pub mod providers;
pub mod shape;

use async_trait::async_trait;
use llm_contracts::{LLMResult, ProviderRequest, ProviderResponse};

pub use gateway::{ModelGateway, QueryError};
pub use json::extract_json_from_text;
pub use providers::{OllamaClient, OpenAIClient, ScriptedClient};
pub use shape::{ResponseShape, ShapeKind, ValueType};

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_request(&self, request: ProviderRequest) -> LLMResult<ProviderResponse>;

    fn provider_name(&self) -> &'static str;
}
