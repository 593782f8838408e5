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

use crate::error::{AgentError, ErrorKind};
use crate::registry::CallArgs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One ordered unit of work produced by the decomposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// 1-based position; defines execution order.
    pub index: usize,
    pub description: String,
    /// Function the decomposer expects to be used. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Earlier subtask whose result feeds this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<usize>,
    #[serde(default)]
    pub optional: bool,
}

impl Subtask {
    pub fn new(index: usize, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            function: None,
            depends_on: None,
            optional: false,
        }
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn depending_on(mut self, index: usize) -> Self {
        self.depends_on = Some(index);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "index")]
pub enum ArgSource {
    Literal,
    PriorResult(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedArg {
    pub value: Value,
    pub source: ArgSource,
}

impl ResolvedArg {
    pub fn literal(value: Value) -> Self {
        Self {
            value,
            source: ArgSource::Literal,
        }
    }

    pub fn prior(value: Value, index: usize) -> Self {
        Self {
            value,
            source: ArgSource::PriorResult(index),
        }
    }
}

/// A validated, type-coerced invocation of a registered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    pub function: String,
    pub args: BTreeMap<String, ResolvedArg>,
}

impl CallSpec {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, arg: ResolvedArg) -> Self {
        self.args.insert(name.into(), arg);
        self
    }

    /// Indices of prior results bound into this call.
    pub fn prior_references(&self) -> Vec<usize> {
        let mut refs: Vec<usize> = self
            .args
            .values()
            .filter_map(|arg| match arg.source {
                ArgSource::PriorResult(k) => Some(k),
                ArgSource::Literal => None,
            })
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs
    }

    pub fn call_args(&self) -> CallArgs {
        CallArgs::new(
            self.args
                .iter()
                .map(|(name, arg)| (name.clone(), arg.value.clone()))
                .collect(),
        )
    }
}

impl fmt::Display for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, (name, arg)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match arg.source {
                ArgSource::PriorResult(k) => write!(f, "{name}=$result_{k}")?,
                ArgSource::Literal => write!(f, "{name}={}", arg.value)?,
            }
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AgentError> for ExecutionError {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one subtask, appended to the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub index: usize,
    pub description: String,
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<ExecutionError>,
    pub call: Option<CallSpec>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        subtask: &Subtask,
        call: CallSpec,
        value: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            index: subtask.index,
            description: subtask.description.clone(),
            success: true,
            value: Some(value),
            error: None,
            call: Some(call),
            timestamp,
        }
    }

    pub fn failed(
        subtask: &Subtask,
        call: Option<CallSpec>,
        error: &AgentError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            index: subtask.index,
            description: subtask.description.clone(),
            success: false,
            value: None,
            error: Some(error.into()),
            call,
            timestamp,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// How a run's overall success is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Every subtask must succeed.
    #[default]
    #[serde(alias = "all")]
    AllSubtasks,
    /// Failures of subtasks marked optional are ignored.
    #[serde(alias = "required-only")]
    RequiredOnly,
}

impl FromStr for SuccessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "all" | "all_subtasks" => Ok(Self::AllSubtasks),
            "required_only" | "required" => Ok(Self::RequiredOnly),
            other => Err(format!("unknown success policy '{other}'")),
        }
    }
}

impl fmt::Display for SuccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AllSubtasks => "all",
            Self::RequiredOnly => "required_only",
        })
    }
}

/// Failure that stopped a run before any subtask was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl From<&AgentError> for RunError {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            raw_output: err.raw_output().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub instruction: String,
    pub success: bool,
    pub subtasks: Vec<Subtask>,
    pub results: Vec<ExecutionResult>,
    pub error: Option<RunError>,
    #[serde(default)]
    pub cancelled: bool,
}

impl RunReport {
    /// Report for a run that never produced subtasks.
    pub fn aborted(instruction: impl Into<String>, error: &AgentError) -> Self {
        Self {
            instruction: instruction.into(),
            success: false,
            subtasks: Vec::new(),
            results: Vec::new(),
            error: Some(error.into()),
            cancelled: matches!(error, AgentError::Cancelled),
        }
    }

    pub fn completed(
        instruction: impl Into<String>,
        subtasks: Vec<Subtask>,
        results: Vec<ExecutionResult>,
        cancelled: bool,
        policy: SuccessPolicy,
    ) -> Self {
        let success = !cancelled
            && results.iter().all(|result| {
                result.success
                    || (policy == SuccessPolicy::RequiredOnly
                        && subtasks
                            .iter()
                            .any(|s| s.index == result.index && s.optional))
            });
        Self {
            instruction: instruction.into(),
            success,
            subtasks,
            results,
            error: None,
            cancelled,
        }
    }

    pub fn result(&self, index: usize) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.index == index)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Human-readable rendering for terminals.
    pub fn summary(&self) -> String {
        let mark = |ok: bool| if ok { "✓" } else { "✗" };
        let mut out = String::from("\n===== AGENT EXECUTION RESULTS =====\n");
        out.push_str(&format!("Task: {}\n", self.instruction));
        out.push_str(&format!("Overall success: {}\n", mark(self.success)));
        if let Some(error) = &self.error {
            out.push_str(&format!("Error: {}: {}\n", error.kind, error.message));
        } else if let Some(first) = self.failures().next() {
            if let Some(error) = &first.error {
                out.push_str(&format!("Error in subtask {}: {}\n", first.index, error.message));
            }
        }
        if self.cancelled {
            out.push_str("Run was cancelled.\n");
        }
        if !self.results.is_empty() {
            out.push_str("\nSubtasks execution:\n");
        }
        for result in &self.results {
            out.push_str(&format!(
                "\n{}. {} {}\n",
                result.index,
                result.description,
                mark(result.success)
            ));
            if let Some(call) = &result.call {
                out.push_str(&format!("   call: {call}\n"));
            }
            if let Some(error) = &result.error {
                out.push_str(&format!("   {}: {}\n", error.kind, error.message));
            }
        }
        out.push_str("\n===================================\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn failed(subtask: &Subtask) -> ExecutionResult {
        let err = AgentError::UnknownFunction {
            name: "ai_nope".into(),
        };
        ExecutionResult::failed(subtask, None, &err, ts())
    }

    #[test]
    fn empty_run_is_vacuously_successful() {
        let report =
            RunReport::completed("nothing", vec![], vec![], false, SuccessPolicy::AllSubtasks);
        assert!(report.success);
        assert!(report.subtasks.is_empty());
    }

    #[test]
    fn required_only_ignores_optional_failures() {
        let required = Subtask::new(1, "list files");
        let optional = Subtask::new(2, "compress images").optional();
        let results = vec![
            ExecutionResult::succeeded(
                &required,
                CallSpec::new("ai_list_files"),
                json!([]),
                ts(),
            ),
            failed(&optional),
        ];
        let subtasks = vec![required, optional];

        let strict = RunReport::completed(
            "t",
            subtasks.clone(),
            results.clone(),
            false,
            SuccessPolicy::AllSubtasks,
        );
        assert!(!strict.success);
        let lenient =
            RunReport::completed("t", subtasks, results, false, SuccessPolicy::RequiredOnly);
        assert!(lenient.success);
    }

    #[test]
    fn cancelled_runs_never_succeed() {
        let report = RunReport::completed("t", vec![], vec![], true, SuccessPolicy::AllSubtasks);
        assert!(!report.success);
    }

    #[test]
    fn call_spec_renders_prior_references() {
        let call = CallSpec::new("ai_categorize_files")
            .arg("files", ResolvedArg::prior(json!(["a.png"]), 1))
            .arg("verbose", ResolvedArg::literal(json!(true)));
        assert_eq!(call.to_string(), "ai_categorize_files(files=$result_1, verbose=true)");
        assert_eq!(call.prior_references(), vec![1]);
        assert_eq!(call.call_args().len(), 2);
    }

    #[test]
    fn prior_references_are_unique_across_arguments() {
        let call = CallSpec::new("ai_move_files")
            .arg("a", ResolvedArg::prior(json!(1), 2))
            .arg("b", ResolvedArg::literal(json!("inbox")))
            .arg("c", ResolvedArg::prior(json!(1), 2));
        assert_eq!(call.prior_references(), vec![2]);
    }

    #[test]
    fn policy_parses_cli_spellings() {
        assert_eq!("all".parse::<SuccessPolicy>().unwrap(), SuccessPolicy::AllSubtasks);
        assert_eq!(
            "required-only".parse::<SuccessPolicy>().unwrap(),
            SuccessPolicy::RequiredOnly
        );
        assert!("most".parse::<SuccessPolicy>().is_err());
    }

    #[test]
    fn summary_marks_each_subtask() {
        let subtask = Subtask::new(1, "list files");
        let report = RunReport::completed(
            "organize",
            vec![subtask.clone()],
            vec![failed(&subtask)],
            false,
            SuccessPolicy::AllSubtasks,
        );
        let text = report.summary();
        assert!(text.contains("Task: organize"));
        assert!(text.contains("1. list files ✗"));
        assert!(text.contains("UnknownFunction"));
    }
}
