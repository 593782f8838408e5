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

use crate::registry::ParamType;
use serde_json::{Number, Value};

/// Converts `value` to the declared parameter type. Values the type already
/// accepts pass through untouched; anything that cannot be converted
/// faithfully is an error.
pub fn coerce(value: Value, ty: ParamType) -> Result<Value, String> {
    if ty.accepts(&value) {
        return Ok(value);
    }
    let converted = match (ty, &value) {
        (ParamType::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool),
        (ParamType::Boolean, Value::Number(n)) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(Value::Bool(true)),
            Some(x) if x == 0.0 => Some(Value::Bool(false)),
            _ => None,
        },
        (ParamType::Integer, Value::String(s)) => parse_integer(s.trim()),
        (ParamType::Integer, Value::Number(n)) => n.as_f64().and_then(integral),
        (ParamType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (ParamType::String, Value::Number(_) | Value::Bool(_)) => {
            Some(Value::String(value.to_string()))
        }
        (ParamType::String, Value::Array(_) | Value::Object(_)) => {
            Some(Value::String(value.to_string()))
        }
        (ParamType::List, Value::String(s)) => match parse_json_text(s) {
            Some(list @ Value::Array(_)) => Some(list),
            _ => Some(Value::Array(vec![value.clone()])),
        },
        (ParamType::List, Value::Number(_) | Value::Bool(_)) => {
            Some(Value::Array(vec![value.clone()]))
        }
        (ParamType::Object, Value::String(s)) => match parse_json_text(s) {
            Some(object @ Value::Object(_)) => Some(object),
            _ => None,
        },
        _ => None,
    };
    converted.ok_or_else(|| format!("expected {ty}, got {}", render(&value)))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_integer(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::from(i));
    }
    text.parse::<f64>().ok().and_then(integral)
}

#[allow(clippy::cast_possible_truncation)]
fn integral(x: f64) -> Option<Value> {
    // 2^63 bounds the exactly representable i64 range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if x.is_finite() && x.fract() == 0.0 && x.abs() < LIMIT {
        Some(Value::from(x as i64))
    } else {
        None
    }
}

fn parse_json_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        serde_json::from_str(trimmed).ok()
    } else {
        None
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}
