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

//! Instruction-driven task automation: a model decomposes an instruction
//! into ordered subtasks, a second query maps each subtask onto a function
//! from a closed registry, and the resulting calls run in order with their
//! results threaded forward.

pub mod clock;
pub mod config;
pub mod decomposer;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod functions;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod todo;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConductorConfig, ConfigError};
pub use decomposer::{Decomposer, FileTodoSource, TodoSource};
pub use dispatcher::Dispatcher;
pub use error::{AgentError, AgentResult, ErrorKind};
pub use executor::Executor;
pub use llm::{ApiClient, ModelGateway, QueryError, ScriptedClient};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunPhase};
pub use registry::{
    CallArgs, FunctionModule, FunctionRegistry, FunctionSpec, LeafError, LeafErrorKind,
    LeafFunction, ParamSpec, ParamType, RegistryBuilder, StaticModule,
};
pub use types::{
    ArgSource, CallSpec, ExecutionError, ExecutionResult, ResolvedArg, RunError, RunReport,
    Subtask, SuccessPolicy,
};
