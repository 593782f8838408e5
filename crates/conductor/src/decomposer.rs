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

use crate::error::{AgentError, AgentResult};
use crate::llm::{ModelGateway, QueryError, ResponseShape, ShapeKind};
use crate::prompts;
use crate::registry::FunctionSpec;
use crate::types::Subtask;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supplies the contents of the user's todo file, if there is one.
pub trait TodoSource: Send + Sync {
    fn read_todo(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct FileTodoSource {
    path: PathBuf,
}

impl FileTodoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TodoSource for FileTodoSource {
    fn read_todo(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Todo file unavailable");
                None
            }
        }
    }
}

/// Turns an instruction into an ordered, validated subtask list with one
/// model query.
pub struct Decomposer {
    gateway: Arc<ModelGateway>,
    todo: Option<Arc<dyn TodoSource>>,
}

impl Decomposer {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway,
            todo: None,
        }
    }

    /// Todo contents are added to the prompt when the instruction mentions a todo list.
    pub fn with_todo_source(mut self, source: Arc<dyn TodoSource>) -> Self {
        self.todo = Some(source);
        self
    }

    fn response_shape() -> ResponseShape {
        ResponseShape::new(ShapeKind::ObjectOrArray).require_field("subtasks")
    }

    pub async fn decompose(
        &self,
        instruction: &str,
        available: &[FunctionSpec],
    ) -> AgentResult<Vec<Subtask>> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(AgentError::InvalidInput(
                "instruction is empty".to_string(),
            ));
        }
        if instruction.chars().all(|c| c.is_control() || c.is_whitespace()) {
            return Err(AgentError::InvalidInput(
                "instruction contains no printable text".to_string(),
            ));
        }

        let todo = self
            .todo
            .as_ref()
            .filter(|_| mentions_todo(instruction))
            .and_then(|source| source.read_todo());
        if todo.is_some() {
            debug!("Including todo file contents in decomposition prompt");
        }

        let system = prompts::decomposer_system_prompt(available, todo.as_deref());
        let user = prompts::decomposer_user_prompt(instruction);

        let reply = self
            .gateway
            .query(&system, &user, &Self::response_shape())
            .await
            .map_err(|err| match err {
                QueryError::Model(e) => AgentError::Decomposition {
                    reason: format!("model query failed: {e}"),
                    raw: String::new(),
                },
                QueryError::Unparseable { raw } => AgentError::Decomposition {
                    reason: "reply contains no parseable subtask list".to_string(),
                    raw,
                },
                QueryError::ShapeMismatch { reason, raw } => {
                    AgentError::Decomposition { reason, raw }
                }
            })?;

        let subtasks = parse_subtasks(&reply).map_err(|reason| AgentError::Decomposition {
            reason,
            raw: reply.to_string(),
        })?;

        info!(count = subtasks.len(), "Decomposed instruction into subtasks");
        for subtask in &subtasks {
            debug!(
                subtask = subtask.index,
                description = %subtask.description,
                depends_on = ?subtask.depends_on,
                function = ?subtask.function,
                "Planned subtask"
            );
        }
        Ok(subtasks)
    }
}

fn mentions_todo(instruction: &str) -> bool {
    let lower = instruction.to_lowercase();
    lower.contains("todo") || lower.contains("to-do")
}

/// Validates a decomposition reply. Accepts `{"subtasks": [...]}` or a bare
/// array whose items are subtask objects or plain descriptions.
pub fn parse_subtasks(reply: &Value) -> Result<Vec<Subtask>, String> {
    let items = match reply {
        Value::Array(items) => items,
        Value::Object(object) => object
            .get("subtasks")
            .and_then(Value::as_array)
            .ok_or_else(|| "'subtasks' must be a list".to_string())?,
        _ => return Err("reply is neither a list nor an object".to_string()),
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_item(i + 1, item))
        .collect()
}

fn parse_item(index: usize, item: &Value) -> Result<Subtask, String> {
    match item {
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(format!("subtask {index} has an empty description"));
            }
            Ok(Subtask::new(index, text))
        }
        Value::Object(fields) => parse_object(index, fields),
        _ => Err(format!("subtask {index} is neither a string nor an object")),
    }
}

fn parse_object(index: usize, fields: &Map<String, Value>) -> Result<Subtask, String> {
    if let Some(declared) = fields.get("index").filter(|v| !v.is_null()) {
        if declared.as_u64() != u64::try_from(index).ok() {
            return Err(format!(
                "subtask at position {index} declares index {declared}"
            ));
        }
    }

    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| format!("subtask {index} has no description"))?;
    let mut subtask = Subtask::new(index, description);

    match fields.get("function") {
        None | Some(Value::Null) => {}
        Some(Value::String(name)) if !name.trim().is_empty() => {
            subtask.function = Some(name.trim().to_string());
        }
        Some(Value::String(_)) => {}
        Some(other) => return Err(format!("subtask {index} has a non-string function {other}")),
    }

    match fields.get("depends_on") {
        None | Some(Value::Null) => {}
        Some(value) => {
            let dependency = value
                .as_u64()
                .and_then(|k| usize::try_from(k).ok())
                .ok_or_else(|| format!("subtask {index} has a non-integer dependency {value}"))?;
            if dependency == 0 || dependency >= index {
                return Err(format!(
                    "subtask {index} depends on {dependency}, which is not an earlier subtask"
                ));
            }
            subtask.depends_on = Some(dependency);
        }
    }

    match fields.get("optional") {
        None | Some(Value::Null) => {}
        Some(Value::Bool(optional)) => subtask.optional = *optional,
        Some(other) => {
            return Err(format!("subtask {index} has a non-boolean optional flag {other}"));
        }
    }

    Ok(subtask)
}
