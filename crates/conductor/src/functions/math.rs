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

use crate::registry::{
    CallArgs, FunctionModule, FunctionSpec, LeafError, LeafFunction, LeafResult, ParamSpec,
    ParamType,
};
use serde_json::{Number, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct MathModule;

impl FunctionModule for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn exports(&self) -> Vec<LeafFunction> {
        vec![
            binary(
                "ai_add_two_numbers",
                "Adds two numbers and returns the sum.",
                i64::checked_add,
                |a, b| a + b,
            ),
            binary(
                "ai_sub_two_numbers",
                "Subtracts b from a and returns the difference.",
                i64::checked_sub,
                |a, b| a - b,
            ),
            binary(
                "ai_mul_two_numbers",
                "Multiplies two numbers and returns the product.",
                i64::checked_mul,
                |a, b| a * b,
            ),
        ]
    }
}

fn binary(
    name: &str,
    description: &str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> LeafFunction {
    let spec = FunctionSpec::new(name, description)
        .param(ParamSpec::required("a", ParamType::Number).describe("First number."))
        .param(ParamSpec::required("b", ParamType::Number).describe("Second number."));
    LeafFunction::new(spec, move |args| apply(args, int_op, float_op))
}

/// Integers stay integers unless the result overflows.
fn apply(
    args: &CallArgs,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> LeafResult {
    if let (Some(a), Some(b)) = (args.value("a")?.as_i64(), args.value("b")?.as_i64()) {
        if let Some(result) = int_op(a, b) {
            return Ok(Value::from(result));
        }
    }
    let result = float_op(args.f64("a")?, args.f64("b")?);
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| {
            LeafError::invalid_argument(format!("result {result} is not a finite number"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn call(name: &str, a: Value, b: Value) -> LeafResult {
        let function = MathModule
            .exports()
            .into_iter()
            .find(|f| f.name() == name)
            .unwrap();
        function.call(&CallArgs::new(BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)])))
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(call("ai_add_two_numbers", json!(2), json!(3)).unwrap(), json!(5));
        assert_eq!(call("ai_sub_two_numbers", json!(2), json!(3)).unwrap(), json!(-1));
        assert_eq!(call("ai_mul_two_numbers", json!(4), json!(5)).unwrap(), json!(20));
    }

    #[test]
    fn mixed_arithmetic_uses_floats() {
        assert_eq!(call("ai_add_two_numbers", json!(2), json!(0.5)).unwrap(), json!(2.5));
    }

    #[test]
    fn overflow_falls_back_to_float() {
        let result = call("ai_mul_two_numbers", json!(i64::MAX), json!(2)).unwrap();
        assert!(result.is_f64());
    }
}
