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

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Object,
    Array,
    ObjectOrArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Array => value.is_array(),
            ValueType::Object => value.is_object(),
        }
    }
}

/// Expected structure of a model reply. Replies are checked, never patched:
/// a mismatch is reported back to the caller.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    pub kind: ShapeKind,
    pub required_fields: Vec<String>,
    pub field_types: Vec<(String, ValueType)>,
}

impl ResponseShape {
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            required_fields: Vec::new(),
            field_types: Vec::new(),
        }
    }

    pub fn require_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn expect_type(mut self, field: impl Into<String>, value_type: ValueType) -> Self {
        self.field_types.push((field.into(), value_type));
        self
    }

    /// Whether the provider should be asked for JSON-object-only output.
    pub fn wants_object(&self) -> bool {
        self.kind == ShapeKind::Object
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self.kind, value) {
            (ShapeKind::Object | ShapeKind::ObjectOrArray, Value::Object(_))
            | (ShapeKind::Array | ShapeKind::ObjectOrArray, Value::Array(_)) => {}
            (kind, other) => {
                return Err(format!(
                    "expected {kind:?} at top level, got {}",
                    describe(other)
                ))
            }
        }

        // Field rules only apply to objects.
        let Some(object) = value.as_object() else {
            return Ok(());
        };

        if let Some(missing) = self
            .required_fields
            .iter()
            .find(|field| !object.contains_key(field.as_str()))
        {
            return Err(format!("required field '{missing}' is missing"));
        }

        for (field, expected) in &self.field_types {
            if let Some(found) = object.get(field) {
                if !found.is_null() && !expected.matches(found) {
                    return Err(format!(
                        "field '{field}' should be {expected:?}, got {}",
                        describe(found)
                    ));
                }
            }
        }
        Ok(())
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn top_level_kind_is_enforced() {
        let shape = ResponseShape::new(ShapeKind::Object);
        assert!(shape.check(&json!({})).is_ok());
        let err = shape.check(&json!([1])).unwrap_err();
        assert!(err.contains("got array"));

        let either = ResponseShape::new(ShapeKind::ObjectOrArray);
        assert!(either.check(&json!([])).is_ok());
        assert!(either.check(&json!("text")).is_err());
    }

    #[test]
    fn required_fields_and_types_are_checked() {
        let shape = ResponseShape::new(ShapeKind::Object)
            .require_field("function")
            .expect_type("function", ValueType::String)
            .expect_type("args", ValueType::Object);

        assert!(shape.check(&json!({"function": "ai_x", "args": {}})).is_ok());
        assert!(shape.check(&json!({"function": "ai_x"})).is_ok());
        assert_eq!(
            shape.check(&json!({"args": {}})).unwrap_err(),
            "required field 'function' is missing"
        );
        assert!(shape
            .check(&json!({"function": "ai_x", "args": [1]}))
            .unwrap_err()
            .contains("'args'"));
    }
}
