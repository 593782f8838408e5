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
use crate::registry::FunctionSpec;
use crate::types::{ResolvedArg, Subtask};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Recognizes a prior-result placeholder: `{"$ref": k}` or `"$result_k"`.
/// Returns `None` for ordinary values, so text such as `"$5"` stays literal.
pub fn placeholder(value: &Value) -> Option<Result<usize, String>> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let target = map.get("$ref")?;
            let index = match target {
                Value::Number(n) => n.as_u64().and_then(|k| usize::try_from(k).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            Some(
                index
                    .filter(|k| *k > 0)
                    .ok_or_else(|| format!("invalid result reference {target}")),
            )
        }
        Value::String(s) => {
            let s = s.trim();
            let rest = s.strip_prefix("$result_")?;
            Some(parse_index(rest).ok_or_else(|| format!("invalid result reference '{s}'")))
        }
        _ => None,
    }
}

fn parse_index(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|k| *k > 0)
}

/// Replaces placeholders with prior results and makes sure a declared
/// dependency actually reaches the call.
pub fn bind_prior_results(
    spec: &FunctionSpec,
    subtask: &Subtask,
    args: Vec<(String, Value)>,
    prior: &BTreeMap<usize, Value>,
) -> AgentResult<BTreeMap<String, ResolvedArg>> {
    let mut bound = BTreeMap::new();
    let mut referenced = false;

    for (name, value) in args {
        match placeholder(&value) {
            None => {
                bound.insert(name, ResolvedArg::literal(value));
            }
            Some(Err(reason)) => {
                return Err(AgentError::argument(&spec.name, Some(name.as_str()), reason));
            }
            Some(Ok(k)) => {
                let Some(dependency) = subtask.depends_on else {
                    return Err(AgentError::argument(
                        &spec.name,
                        Some(name.as_str()),
                        format!(
                            "references the result of subtask {k}, \
                             but subtask {} declares no dependency",
                            subtask.index
                        ),
                    ));
                };
                if k != dependency {
                    return Err(AgentError::argument(
                        &spec.name,
                        Some(name.as_str()),
                        format!(
                            "references subtask {k}, \
                             but the declared dependency is subtask {dependency}"
                        ),
                    ));
                }
                let value = prior_value(subtask, dependency, prior)?;
                bound.insert(name, ResolvedArg::prior(value.clone(), dependency));
                referenced = true;
            }
        }
    }

    if let (Some(dependency), false) = (subtask.depends_on, referenced) {
        let value = prior_value(subtask, dependency, prior)?;
        let target = spec
            .params
            .iter()
            .find(|p| bound.get(&p.name).is_some_and(|arg| same_value(&arg.value, value)))
            .or_else(|| {
                spec.params
                    .iter()
                    .find(|p| p.is_required() && !bound.contains_key(&p.name))
            })
            .or_else(|| spec.params.iter().find(|p| p.ty.accepts(value)))
            .or_else(|| spec.params.first())
            .ok_or_else(|| {
                AgentError::argument(
                    &spec.name,
                    None,
                    format!(
                        "takes no parameters, \
                         so the result of subtask {dependency} cannot be passed"
                    ),
                )
            })?;
        if let Some(echoed) = bound.get(&target.name) {
            debug!(
                subtask = subtask.index,
                parameter = %target.name,
                echoed = %echoed.value,
                "Overriding model literal with prior result"
            );
        }
        bound.insert(target.name.clone(), ResolvedArg::prior(value.clone(), dependency));
    }

    Ok(bound)
}

/// Equality that treats `5` and `5.0` as the same echoed number.
fn same_value(literal: &Value, prior: &Value) -> bool {
    match (literal, prior) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => literal == prior,
    }
}

fn prior_value<'a>(
    subtask: &Subtask,
    dependency: usize,
    prior: &'a BTreeMap<usize, Value>,
) -> AgentResult<&'a Value> {
    prior.get(&dependency).ok_or(AgentError::DependencyUnmet {
        subtask: subtask.index,
        dependency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::{ParamSpec, ParamType};
    use crate::types::ArgSource;
    use serde_json::json;

    fn create_folders() -> FunctionSpec {
        FunctionSpec::new("ai_create_folders", "")
            .param(ParamSpec::required("base_path", ParamType::String))
            .param(ParamSpec::required("categories", ParamType::Object))
    }

    fn prior() -> BTreeMap<usize, Value> {
        BTreeMap::from([(2, json!({"images": ["a.png"]}))])
    }

    #[test]
    fn placeholder_spellings() {
        assert_eq!(placeholder(&json!({"$ref": 2})), Some(Ok(2)));
        assert_eq!(placeholder(&json!("$result_3")), Some(Ok(3)));
        assert_eq!(placeholder(&json!("$4")), None);
        assert_eq!(placeholder(&json!("$5.99")), None);
        assert_eq!(placeholder(&json!("$HOME")), None);
        assert_eq!(placeholder(&json!("inbox")), None);
        assert!(matches!(placeholder(&json!("$result_x")), Some(Err(_))));
        assert!(matches!(placeholder(&json!({"$ref": "two"})), Some(Err(_))));
    }

    #[test]
    fn placeholder_is_replaced_by_prior_result() {
        let subtask = Subtask::new(3, "create folders").depending_on(2);
        let args = vec![
            ("base_path".to_string(), json!("inbox")),
            ("categories".to_string(), json!({"$ref": 2})),
        ];
        let bound = bind_prior_results(&create_folders(), &subtask, args, &prior()).unwrap();
        assert_eq!(bound["categories"].value, json!({"images": ["a.png"]}));
        assert_eq!(bound["categories"].source, ArgSource::PriorResult(2));
        assert_eq!(bound["base_path"].source, ArgSource::Literal);
    }

    #[test]
    fn missing_required_parameter_receives_prior_result() {
        let subtask = Subtask::new(3, "create folders").depending_on(2);
        let args = vec![("base_path".to_string(), json!("inbox"))];
        let bound = bind_prior_results(&create_folders(), &subtask, args, &prior()).unwrap();
        assert_eq!(bound["categories"].source, ArgSource::PriorResult(2));
    }

    #[test]
    fn echoed_literal_is_overridden_by_matching_type() {
        let subtask = Subtask::new(3, "create folders").depending_on(2);
        let args = vec![
            ("base_path".to_string(), json!("inbox")),
            ("categories".to_string(), json!({"images": ["stale.png"]})),
        ];
        let bound = bind_prior_results(&create_folders(), &subtask, args, &prior()).unwrap();
        assert_eq!(bound["categories"].value, json!({"images": ["a.png"]}));
        assert_eq!(bound["base_path"].value, json!("inbox"));
    }

    #[test]
    fn echoed_prior_value_keeps_its_parameter() {
        let spec = FunctionSpec::new("ai_mul_two_numbers", "")
            .param(ParamSpec::required("a", ParamType::Number))
            .param(ParamSpec::required("b", ParamType::Number));
        let subtask = Subtask::new(2, "multiply the sum by 4").depending_on(1);
        let args = vec![("a".to_string(), json!(4)), ("b".to_string(), json!(5))];
        let prior = BTreeMap::from([(1, json!(5.0))]);
        let bound = bind_prior_results(&spec, &subtask, args, &prior).unwrap();
        assert_eq!(bound["a"].value, json!(4));
        assert_eq!(bound["a"].source, ArgSource::Literal);
        assert_eq!(bound["b"].source, ArgSource::PriorResult(1));
    }

    #[test]
    fn dollar_amount_without_dependency_is_literal() {
        let spec = FunctionSpec::new("ai_echo", "")
            .param(ParamSpec::required("text", ParamType::String));
        let subtask = Subtask::new(1, "quote the price");
        let args = vec![("text".to_string(), json!("$5"))];
        let bound = bind_prior_results(&spec, &subtask, args, &BTreeMap::new()).unwrap();
        assert_eq!(bound["text"].value, json!("$5"));
        assert_eq!(bound["text"].source, ArgSource::Literal);
    }

    #[test]
    fn placeholder_without_dependency_is_an_argument_error() {
        let subtask = Subtask::new(3, "create folders");
        let args = vec![("categories".to_string(), json!("$result_2"))];
        let err = bind_prior_results(&create_folders(), &subtask, args, &prior()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentError);
    }

    #[test]
    fn placeholder_to_other_subtask_is_an_argument_error() {
        let subtask = Subtask::new(3, "create folders").depending_on(2);
        let args = vec![("categories".to_string(), json!({"$ref": 1}))];
        let err = bind_prior_results(&create_folders(), &subtask, args, &prior()).unwrap_err();
        assert!(err.to_string().contains("declared dependency is subtask 2"));
    }

    #[test]
    fn parameterless_function_cannot_take_prior_result() {
        let spec = FunctionSpec::new("ai_ping", "");
        let subtask = Subtask::new(3, "ping").depending_on(2);
        let err = bind_prior_results(&spec, &subtask, vec![], &prior()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentError);
    }

    #[test]
    fn absent_prior_result_is_dependency_unmet() {
        let subtask = Subtask::new(3, "create folders").depending_on(1);
        let err = bind_prior_results(&create_folders(), &subtask, vec![], &prior()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyUnmet);
    }
}
