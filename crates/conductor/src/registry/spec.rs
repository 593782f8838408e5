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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Declared type of a leaf function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    List,
    Object,
    Any,
}

impl ParamType {
    /// Whether `value` already has this type, without any coercion.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::List => "list",
            ParamType::Object => "object",
            ParamType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        Self {
            default: Some(default),
            ..Self::required(name, ty)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Immutable description of one callable leaf operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(rename = "parameters")]
    pub params: Vec<ParamSpec>,
    pub description: String,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            description: description.into(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn find_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// One-line rendering used in model prompts, e.g.
    /// `ai_list_files(path: string, recursive: boolean = false) - Lists files.`
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| match &p.default {
                Some(default) => format!("{}: {} = {}", p.name, p.ty, default),
                None => format!("{}: {}", p.name, p.ty),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let description = if self.description.is_empty() {
            "No description available."
        } else {
            self.description.as_str()
        };
        format!("{}({}) - {}", self.name, params, description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_files() -> FunctionSpec {
        FunctionSpec::new("ai_list_files", "Lists files in a folder.")
            .param(ParamSpec::required("path", ParamType::String))
            .param(ParamSpec::optional("recursive", ParamType::Boolean, json!(false)))
    }

    #[test]
    fn signature_shows_types_and_defaults() {
        assert_eq!(
            list_files().signature(),
            "ai_list_files(path: string, recursive: boolean = false) - Lists files in a folder."
        );
    }

    #[test]
    fn missing_description_is_called_out() {
        let spec = FunctionSpec::new("ai_noop", "");
        assert_eq!(spec.signature(), "ai_noop() - No description available.");
    }

    #[test]
    fn integer_accepts_only_integral_numbers() {
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(!ParamType::Integer.accepts(&json!(3.5)));
        assert!(ParamType::Number.accepts(&json!(3.5)));
        assert!(ParamType::Any.accepts(&Value::Null));
    }

    #[test]
    fn catalog_json_uses_wire_names() {
        let rendered = serde_json::to_value(list_files()).unwrap();
        assert_eq!(rendered["parameters"][0]["type"], "string");
        assert_eq!(rendered["parameters"][1]["default"], false);
        assert!(rendered["parameters"][0].get("default").is_none());
    }
}
