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

use crate::clock::{Clock, SystemClock};
use crate::config::ExecutionSettings;
use crate::decomposer::{Decomposer, TodoSource};
use crate::dispatcher::Dispatcher;
use crate::error::AgentError;
use crate::executor::Executor;
use crate::llm::ModelGateway;
use crate::logging::{log_call_attempt, log_failure, log_phase_transition, log_subtask_event};
use crate::registry::{FunctionRegistry, FunctionSpec};
use crate::types::{ExecutionResult, RunReport, Subtask, SuccessPolicy};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Decomposing,
    DecompositionFailed,
    Dispatching(usize),
    Executing(usize),
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => f.write_str("idle"),
            RunPhase::Decomposing => f.write_str("decomposing"),
            RunPhase::DecompositionFailed => f.write_str("decomposition_failed"),
            RunPhase::Dispatching(i) => write!(f, "dispatching({i})"),
            RunPhase::Executing(i) => write!(f, "executing({i})"),
            RunPhase::Done => f.write_str("done"),
        }
    }
}

impl RunPhase {
    fn advance(&mut self, next: RunPhase) {
        log_phase_transition(&self.to_string(), &next.to_string());
        *self = next;
    }
}

pub struct OrchestratorBuilder {
    registry: Arc<FunctionRegistry>,
    gateway: Arc<ModelGateway>,
    clock: Arc<dyn Clock>,
    policy: SuccessPolicy,
    leaf_timeout: Option<Duration>,
    todo: Option<Arc<dyn TodoSource>>,
}

impl OrchestratorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(mut self, policy: SuccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn leaf_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.leaf_timeout = timeout;
        self
    }

    pub fn todo_source(mut self, source: Arc<dyn TodoSource>) -> Self {
        self.todo = Some(source);
        self
    }

    pub fn execution_settings(self, settings: &ExecutionSettings) -> Self {
        self.policy(settings.success_policy)
            .leaf_timeout(settings.leaf_timeout())
    }

    pub fn build(self) -> Orchestrator {
        let mut decomposer = Decomposer::new(Arc::clone(&self.gateway));
        if let Some(todo) = self.todo {
            decomposer = decomposer.with_todo_source(todo);
        }
        Orchestrator {
            decomposer,
            dispatcher: Dispatcher::new(self.gateway),
            executor: Executor::new(Arc::clone(&self.registry), Arc::clone(&self.clock))
                .with_leaf_timeout(self.leaf_timeout),
            registry: self.registry,
            clock: self.clock,
            policy: self.policy,
        }
    }
}

/// Drives decomposition, then dispatch and execution of each subtask in
/// order. Runs share nothing but the registry.
pub struct Orchestrator {
    registry: Arc<FunctionRegistry>,
    decomposer: Decomposer,
    dispatcher: Dispatcher,
    executor: Executor,
    clock: Arc<dyn Clock>,
    policy: SuccessPolicy,
}

impl Orchestrator {
    pub fn builder(
        registry: Arc<FunctionRegistry>,
        gateway: Arc<ModelGateway>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            gateway,
            clock: Arc::new(SystemClock),
            policy: SuccessPolicy::default(),
            leaf_timeout: None,
            todo: None,
        }
    }

    pub fn new(registry: Arc<FunctionRegistry>, gateway: Arc<ModelGateway>) -> Self {
        Self::builder(registry, gateway).build()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn policy(&self) -> SuccessPolicy {
        self.policy
    }

    pub async fn run(&self, instruction: &str) -> RunReport {
        self.run_with_cancel(instruction, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), checking `cancel` before each subtask.
    /// Subtasks not started when cancellation is seen are recorded as
    /// cancelled failures.
    pub async fn run_with_cancel(
        &self,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> RunReport {
        let span = info_span!("run", run_id = %Uuid::new_v4());
        self.drive(instruction, cancel).instrument(span).await
    }

    async fn drive(&self, instruction: &str, cancel: &CancellationToken) -> RunReport {
        let mut phase = RunPhase::Idle;
        let catalog = self.registry.describe_all();
        info!(functions = catalog.len(), policy = %self.policy, "Starting run");

        if cancel.is_cancelled() {
            return RunReport::aborted(instruction, &AgentError::Cancelled);
        }

        phase.advance(RunPhase::Decomposing);
        let subtasks = match self.decomposer.decompose(instruction, catalog).await {
            Ok(subtasks) => subtasks,
            Err(err) => {
                phase.advance(RunPhase::DecompositionFailed);
                log_failure(None, None, &err);
                return RunReport::aborted(instruction, &err);
            }
        };

        let mut results: Vec<ExecutionResult> = Vec::with_capacity(subtasks.len());
        let mut prior: BTreeMap<usize, Value> = BTreeMap::new();
        let mut cancelled = false;

        for subtask in &subtasks {
            if cancelled || cancel.is_cancelled() {
                cancelled = true;
                results.push(ExecutionResult::failed(
                    subtask,
                    None,
                    &AgentError::Cancelled,
                    self.clock.now(),
                ));
                continue;
            }

            let result = self.step(subtask, catalog, &prior, &mut phase).await;
            if let (true, Some(value)) = (result.success, &result.value) {
                prior.insert(subtask.index, value.clone());
            }
            results.push(result);
        }

        phase.advance(RunPhase::Done);
        let report = RunReport::completed(instruction, subtasks, results, cancelled, self.policy);
        info!(
            success = report.success,
            subtasks = report.subtasks.len(),
            failed = report.failures().count(),
            cancelled = report.cancelled,
            "Run finished"
        );
        report
    }

    async fn step(
        &self,
        subtask: &Subtask,
        catalog: &[FunctionSpec],
        prior: &BTreeMap<usize, Value>,
        phase: &mut RunPhase,
    ) -> ExecutionResult {
        if let Some(dependency) = subtask.depends_on {
            if !prior.contains_key(&dependency) {
                let err = AgentError::DependencyUnmet {
                    subtask: subtask.index,
                    dependency,
                };
                log_failure(Some(subtask), None, &err);
                return ExecutionResult::failed(subtask, None, &err, self.clock.now());
            }
        }

        phase.advance(RunPhase::Dispatching(subtask.index));
        let call = match self.dispatcher.dispatch(subtask, catalog, prior).await {
            Ok(call) => call,
            Err(err) => {
                log_failure(Some(subtask), None, &err);
                return ExecutionResult::failed(subtask, None, &err, self.clock.now());
            }
        };

        phase.advance(RunPhase::Executing(subtask.index));
        log_call_attempt(subtask, &call);
        let result = self.executor.execute(call, subtask).await;
        if result.success {
            log_subtask_event(
                subtask,
                "completed",
                json!({ "function": result.call.as_ref().map(|c| c.function.as_str()) }),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_render_with_subtask_index() {
        assert_eq!(RunPhase::Dispatching(3).to_string(), "dispatching(3)");
        let mut phase = RunPhase::Idle;
        phase.advance(RunPhase::Decomposing);
        assert_eq!(phase, RunPhase::Decomposing);
    }
}
