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

pub mod binding;
pub mod call_syntax;
pub mod coerce;

pub use call_syntax::{parse_call, ParsedCall};
pub use coerce::coerce;

use crate::error::{AgentError, AgentResult};
use crate::llm::json::strip_code_fence;
use crate::llm::{extract_json_from_text, ModelGateway, ResponseShape, ShapeKind, ValueType};
use crate::prompts;
use crate::registry::FunctionSpec;
use crate::types::{CallSpec, ResolvedArg, Subtask};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Maps one subtask onto one registered function with one model query.
/// The model's answer is treated as an untrusted proposal: the function must
/// be in the catalog and every argument is checked and coerced before a
/// [`CallSpec`] is produced.
pub struct Dispatcher {
    gateway: Arc<ModelGateway>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn dispatch(
        &self,
        subtask: &Subtask,
        available: &[FunctionSpec],
        prior_results: &BTreeMap<usize, Value>,
    ) -> AgentResult<CallSpec> {
        let prior = match subtask.depends_on {
            Some(dependency) => Some(prior_results.get(&dependency).ok_or(
                AgentError::DependencyUnmet {
                    subtask: subtask.index,
                    dependency,
                },
            )?),
            None => None,
        };

        let system = prompts::dispatcher_system_prompt(available);
        let user = prompts::dispatcher_user_prompt(subtask, prior);
        let raw = self
            .gateway
            .complete(&system, &user, true)
            .await
            .map_err(|e| AgentError::DispatchFailed {
                reason: e.to_string(),
                raw: e.raw().map(str::to_string),
            })?;
        debug!(subtask = subtask.index, reply = %raw, "Dispatcher reply");

        let proposed = parse_reply(&raw).map_err(|reason| AgentError::DispatchFailed {
            reason,
            raw: Some(raw.clone()),
        })?;
        build_call(proposed, subtask, available, prior_results)
    }
}

/// Reads a dispatcher reply. A reply that is JSON as a whole (or a whole
/// fenced block) must be `{"function": ..., "args": {...}}`; otherwise the
/// call-expression form is tried before looking for JSON embedded in prose,
/// so a map argument is never mistaken for the reply itself.
pub fn parse_reply(raw: &str) -> Result<ParsedCall, String> {
    if let Ok(value) = serde_json::from_str::<Value>(strip_code_fence(raw)) {
        return if value.get("function").is_some() {
            from_json(&value)
        } else {
            Err("JSON reply has no 'function' field".to_string())
        };
    }
    let call_error = match parse_call(raw) {
        Ok(call) => return Ok(call),
        Err(e) => e,
    };
    match extract_json_from_text(raw) {
        Some(value) if value.get("function").is_some() => from_json(&value),
        Some(_) => Err("JSON reply has no 'function' field".to_string()),
        None => Err(format!("reply is neither JSON nor a call expression ({call_error})")),
    }
}

fn from_json(value: &Value) -> Result<ParsedCall, String> {
    let shape = ResponseShape::new(ShapeKind::Object)
        .require_field("function")
        .expect_type("function", ValueType::String);
    shape.check(value)?;

    let function = value
        .get("function")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| "'function' must be a non-empty string".to_string())?
        .to_string();

    let args = value.get("args").or_else(|| value.get("arguments"));
    let (positional, keyword) = match args {
        None | Some(Value::Null) => (Vec::new(), Vec::new()),
        Some(Value::Object(map)) => (Vec::new(), keyword_pairs(map)),
        Some(Value::Array(items)) => (items.clone(), Vec::new()),
        Some(other) => return Err(format!("'args' must be an object or a list, got {other}")),
    };
    Ok(ParsedCall {
        function,
        positional,
        keyword,
    })
}

fn keyword_pairs(map: &Map<String, Value>) -> Vec<(String, Value)> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Validates a proposed call against the catalog and produces the final
/// [`CallSpec`].
pub fn build_call(
    proposed: ParsedCall,
    subtask: &Subtask,
    available: &[FunctionSpec],
    prior_results: &BTreeMap<usize, Value>,
) -> AgentResult<CallSpec> {
    let ParsedCall {
        function,
        positional,
        keyword,
    } = proposed;
    let spec = available
        .iter()
        .find(|spec| spec.name == function)
        .ok_or(AgentError::UnknownFunction { name: function })?;

    let named = name_arguments(spec, positional, keyword)?;
    let bound = binding::bind_prior_results(spec, subtask, named, prior_results)?;

    let mut args = BTreeMap::new();
    for param in &spec.params {
        let arg = match bound.get(&param.name) {
            Some(arg) if arg.value.is_null() && param.default.is_some() => None,
            other => other.cloned(),
        };
        let resolved = match (arg, &param.default) {
            (Some(arg), _) => {
                let value = coerce(arg.value, param.ty).map_err(|reason| {
                    AgentError::argument(
                        &spec.name,
                        Some(param.name.as_str()),
                        format!("parameter '{}': {reason}", param.name),
                    )
                })?;
                ResolvedArg {
                    value,
                    source: arg.source,
                }
            }
            (None, Some(default)) => ResolvedArg::literal(default.clone()),
            (None, None) => {
                return Err(AgentError::argument(
                    &spec.name,
                    Some(param.name.as_str()),
                    format!("missing required argument '{}'", param.name),
                ))
            }
        };
        args.insert(param.name.clone(), resolved);
    }

    Ok(CallSpec {
        function: spec.name.clone(),
        args,
    })
}

/// Gives positional arguments their parameter names and rejects names the
/// function does not declare.
fn name_arguments(
    spec: &FunctionSpec,
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
) -> AgentResult<Vec<(String, Value)>> {
    if positional.len() > spec.params.len() {
        return Err(AgentError::argument(
            &spec.name,
            None,
            format!(
                "takes {} arguments but {} were given",
                spec.params.len(),
                positional.len()
            ),
        ));
    }

    let mut named: Vec<(String, Value)> = spec
        .params
        .iter()
        .zip(positional)
        .map(|(param, value)| (param.name.clone(), value))
        .collect();

    for (name, value) in keyword {
        if spec.find_param(&name).is_none() {
            return Err(AgentError::argument(
                &spec.name,
                Some(name.as_str()),
                format!("'{name}' is not a parameter of {}", spec.name),
            ));
        }
        if named.iter().any(|(existing, _)| *existing == name) {
            return Err(AgentError::argument(
                &spec.name,
                Some(name.as_str()),
                format!("argument '{name}' given twice"),
            ));
        }
        named.push((name, value));
    }
    Ok(named)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::{ParamSpec, ParamType};
    use crate::types::ArgSource;
    use serde_json::json;

    fn catalog() -> Vec<FunctionSpec> {
        vec![
            FunctionSpec::new("ai_list_files", "Lists files.")
                .param(ParamSpec::required("path", ParamType::String))
                .param(ParamSpec::optional("recursive", ParamType::Boolean, json!(false))),
            FunctionSpec::new("ai_add_two_numbers", "Adds two numbers.")
                .param(ParamSpec::required("a", ParamType::Number))
                .param(ParamSpec::required("b", ParamType::Number)),
        ]
    }

    fn build(reply: &str, subtask: &Subtask) -> AgentResult<CallSpec> {
        let proposed = parse_reply(reply).map_err(|reason| AgentError::DispatchFailed {
            reason,
            raw: Some(reply.to_string()),
        })?;
        build_call(proposed, subtask, &catalog(), &BTreeMap::new())
    }

    #[test]
    fn json_reply_is_coerced_and_defaulted() {
        let call = build(
            r#"{"function": "ai_list_files", "args": {"path": "inbox"}}"#,
            &Subtask::new(1, "list"),
        )
        .unwrap();
        assert_eq!(call.function, "ai_list_files");
        assert_eq!(call.args["path"].value, json!("inbox"));
        assert_eq!(call.args["recursive"].value, json!(false));
        assert_eq!(call.args["recursive"].source, ArgSource::Literal);
    }

    #[test]
    fn call_syntax_reply_maps_positionals() {
        let call = build("ai_add_two_numbers('2', 3)", &Subtask::new(1, "add")).unwrap();
        assert_eq!(call.args["a"].value, json!(2.0));
        assert_eq!(call.args["b"].value, json!(3));
    }

    #[test]
    fn textual_boolean_is_coerced() {
        let call = build(
            "ai_list_files(path='inbox', recursive='yes')",
            &Subtask::new(1, "list"),
        )
        .unwrap();
        assert_eq!(call.args["recursive"].value, json!(true));
    }

    #[test]
    fn unknown_function_is_reported() {
        let err = build(
            r#"{"function": "ai_delete_everything", "args": {}}"#,
            &Subtask::new(1, "x"),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AgentError::UnknownFunction {
                name: "ai_delete_everything".into()
            }
        );
    }

    #[test]
    fn coercion_failure_names_the_parameter() {
        let err = build(
            r#"{"function": "ai_add_two_numbers", "args": {"a": "two", "b": 1}}"#,
            &Subtask::new(1, "x"),
        )
        .unwrap_err();
        match err {
            AgentError::Argument { parameter, reason, .. } => {
                assert_eq!(parameter.as_deref(), Some("a"));
                assert!(reason.contains("expected number"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_and_undeclared_arguments_are_rejected() {
        let missing = build(
            r#"{"function": "ai_add_two_numbers", "args": {"a": 1}}"#,
            &Subtask::new(1, "x"),
        )
        .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::ArgumentError);
        let extra =
            build("ai_list_files(path='a', colour='red')", &Subtask::new(1, "x")).unwrap_err();
        assert_eq!(extra.kind(), ErrorKind::ArgumentError);
        let too_many = build("ai_add_two_numbers(1, 2, 3)", &Subtask::new(1, "x")).unwrap_err();
        assert_eq!(too_many.kind(), ErrorKind::ArgumentError);
    }

    #[test]
    fn prose_reply_is_a_dispatch_failure() {
        let err = build("I think you should list the files.", &Subtask::new(1, "x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DispatchFailed);
        assert_eq!(err.raw_output(), Some("I think you should list the files."));
    }

    #[test]
    fn map_argument_with_function_key_keeps_the_called_function() {
        let call = parse_reply(
            r#"ai_move_files(base_path='inbox', categories={"function": "ai_read_file"})"#,
        )
        .unwrap();
        assert_eq!(call.function, "ai_move_files");
        assert_eq!(call.keyword[1].1, json!({"function": "ai_read_file"}));
    }

    #[test]
    fn json_reply_embedded_in_prose_is_still_read() {
        let reply = concat!(
            "Here you go:\n```json\n",
            r#"{"function": "ai_list_files", "args": {"path": "inbox"}}"#,
            "\n```"
        );
        let call = parse_reply(reply).unwrap();
        assert_eq!(call.function, "ai_list_files");
        let fenced = parse_reply("```json\n{\"function\": \"ai_list_files\"}\n```").unwrap();
        assert_eq!(fenced.function, "ai_list_files");
    }

    #[test]
    fn deeply_nested_reply_is_a_dispatch_failure() {
        let reply = format!("ai_list_files(path={}1{})", "[".repeat(2000), "]".repeat(2000));
        let err = build(&reply, &Subtask::new(1, "list")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DispatchFailed);
    }

    #[test]
    fn null_optional_argument_takes_default() {
        let call = build(
            r#"{"function": "ai_list_files", "args": {"path": "inbox", "recursive": null}}"#,
            &Subtask::new(1, "list"),
        )
        .unwrap();
        assert_eq!(call.args["recursive"].value, json!(false));
    }
}
