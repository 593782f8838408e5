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

use crate::clock::Clock;
use crate::error::{AgentError, AgentResult};
use crate::logging::log_failure;
use crate::registry::{FunctionRegistry, LeafErrorKind};
use crate::types::{CallSpec, ExecutionResult, Subtask};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Invokes leaf functions inside an error boundary. Leaf failures, panics
/// and timeouts all come back as failed [`ExecutionResult`]s.
pub struct Executor {
    registry: Arc<FunctionRegistry>,
    clock: Arc<dyn Clock>,
    leaf_timeout: Option<Duration>,
}

impl Executor {
    pub fn new(registry: Arc<FunctionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            clock,
            leaf_timeout: None,
        }
    }

    /// A timed-out leaf keeps running on its blocking thread; only the
    /// result is abandoned.
    pub fn with_leaf_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.leaf_timeout = timeout;
        self
    }

    pub async fn execute(&self, call: CallSpec, subtask: &Subtask) -> ExecutionResult {
        match self.invoke(&call).await {
            Ok(value) => ExecutionResult::succeeded(subtask, call, value, self.clock.now()),
            Err(error) => {
                log_failure(Some(subtask), Some(&call), &error);
                ExecutionResult::failed(subtask, Some(call), &error, self.clock.now())
            }
        }
    }

    pub async fn invoke(&self, call: &CallSpec) -> AgentResult<Value> {
        let function = self.registry.callable(&call.function)?.clone();
        let args = call.call_args();
        let name = call.function.clone();

        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || function.call(&args));
        let joined = match self.leaf_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(AgentError::LeafExecution {
                        function: name,
                        kind: LeafErrorKind::Timeout,
                        message: format!("did not finish within {}ms", limit.as_millis()),
                    })
                }
            },
            None => task.await,
        };
        debug!(
            function = %name,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Leaf function returned"
        );

        match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(leaf)) => Err(AgentError::LeafExecution {
                function: name,
                kind: leaf.kind,
                message: leaf.message,
            }),
            Err(join) if join.is_panic() => Err(AgentError::LeafExecution {
                function: name,
                kind: LeafErrorKind::Panicked,
                message: panic_message(join.into_panic()),
            }),
            Err(join) => Err(AgentError::LeafExecution {
                function: name,
                kind: LeafErrorKind::Other,
                message: join.to_string(),
            }),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "leaf function panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use crate::registry::{
        FunctionSpec, LeafError, LeafFunction, ParamSpec, ParamType, StaticModule,
    };
    use crate::types::ResolvedArg;
    use serde_json::json;

    fn registry() -> Arc<FunctionRegistry> {
        let module = StaticModule::new("test")
            .with(LeafFunction::new(
                FunctionSpec::new("ai_echo", "")
                    .param(ParamSpec::required("text", ParamType::String)),
                |args| Ok(json!(args.str("text")?)),
            ))
            .with(LeafFunction::new(FunctionSpec::new("ai_denied", ""), |_| {
                Err(LeafError::permission_denied("/root is not writable"))
            }))
            .with(LeafFunction::new(FunctionSpec::new("ai_panics", ""), |_| {
                panic!("boom")
            }))
            .with(LeafFunction::new(FunctionSpec::new("ai_sleeps", ""), |_| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Value::Null)
            }));
        let mut builder = FunctionRegistry::builder();
        builder.register(&module);
        Arc::new(builder.build())
    }

    fn executor() -> Executor {
        Executor::new(registry(), Arc::new(FixedClock::epoch()))
    }

    #[tokio::test]
    async fn successful_call_records_value() {
        let call = CallSpec::new("ai_echo").arg("text", ResolvedArg::literal(json!("hi")));
        let result = executor().execute(call, &Subtask::new(1, "echo")).await;
        assert!(result.success);
        assert_eq!(result.value, Some(json!("hi")));
        assert_eq!(result.timestamp, FixedClock::epoch().now());
    }

    #[tokio::test]
    async fn leaf_error_is_captured_verbatim() {
        let result = executor()
            .execute(CallSpec::new("ai_denied"), &Subtask::new(2, "write"))
            .await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, ErrorKind::LeafExecutionError);
        assert!(error.message.contains("permission denied"));
        assert!(error.message.contains("/root is not writable"));
    }

    #[tokio::test]
    async fn panics_do_not_escape() {
        let err = executor().invoke(&CallSpec::new("ai_panics")).await.unwrap_err();
        assert_eq!(
            err,
            AgentError::LeafExecution {
                function: "ai_panics".into(),
                kind: LeafErrorKind::Panicked,
                message: "boom".into(),
            }
        );
    }

    #[tokio::test]
    async fn slow_leaf_times_out() {
        let executor = executor().with_leaf_timeout(Some(Duration::from_millis(20)));
        let err = executor.invoke(&CallSpec::new("ai_sleeps")).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::LeafExecution {
                kind: LeafErrorKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_function_fails_the_result() {
        let result = executor()
            .execute(CallSpec::new("ai_missing"), &Subtask::new(1, "x"))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::UnknownFunction));
    }
}
