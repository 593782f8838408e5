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

pub mod leaf;
pub mod module;
pub mod spec;

pub use leaf::{CallArgs, LeafError, LeafErrorKind, LeafFn, LeafFunction, LeafResult};
pub use module::{FunctionModule, StaticModule};
pub use spec::{FunctionSpec, ParamSpec, ParamType};

use crate::error::{AgentError, AgentResult};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const DEFAULT_FUNCTION_PREFIX: &str = "ai_";

/// Mutable phase of registry construction. Freeze with [`RegistryBuilder::build`].
#[derive(Debug)]
pub struct RegistryBuilder {
    prefix: String,
    functions: Vec<LeafFunction>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_FUNCTION_PREFIX)
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only exports whose name starts with `prefix` are registered. An empty
    /// prefix accepts everything.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            functions: Vec::new(),
        }
    }

    /// Registers the module's matching exports and returns how many were
    /// taken. A module with no matching callables is a no-op.
    pub fn register(&mut self, module: &dyn FunctionModule) -> usize {
        let matching: Vec<LeafFunction> = module
            .exports()
            .into_iter()
            .filter(|f| f.name().starts_with(&self.prefix))
            .collect();

        if matching.is_empty() {
            debug!(
                module = module.name(),
                prefix = %self.prefix,
                "Module exports no matching functions"
            );
            return 0;
        }

        let count = matching.len();
        for function in matching {
            if let Some(existing) = self
                .functions
                .iter_mut()
                .find(|f| f.name() == function.name())
            {
                warn!(
                    function = function.name(),
                    module = module.name(),
                    "Replacing previously registered function"
                );
                *existing = function;
            } else {
                self.functions.push(function);
            }
        }

        info!(
            module = module.name(),
            registered = count,
            functions = ?self.functions.iter().map(LeafFunction::name).collect::<Vec<_>>(),
            "Loaded functions from module"
        );
        count
    }

    pub fn build(self) -> FunctionRegistry {
        let index = self
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();
        let specs = self.functions.iter().map(|f| f.spec.clone()).collect();
        FunctionRegistry {
            specs,
            functions: self.functions,
            index,
        }
    }
}

/// Closed, read-only set of callable operations. Share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    specs: Vec<FunctionSpec>,
    functions: Vec<LeafFunction>,
    index: HashMap<String, usize>,
}

impl FunctionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn resolve(&self, name: &str) -> AgentResult<&FunctionSpec> {
        self.index
            .get(name)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| AgentError::UnknownFunction {
                name: name.to_string(),
            })
    }

    pub fn callable(&self, name: &str) -> AgentResult<&LeafFunction> {
        self.index
            .get(name)
            .map(|&i| &self.functions[i])
            .ok_or_else(|| AgentError::UnknownFunction {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All specs in registration order.
    pub fn describe_all(&self) -> &[FunctionSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Prompt rendering of a catalog, one signature per paragraph.
pub fn render_signatures(catalog: &[FunctionSpec]) -> String {
    catalog
        .iter()
        .map(FunctionSpec::signature)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn catalog_json(catalog: &[FunctionSpec]) -> Value {
    serde_json::to_value(catalog).unwrap_or_else(|_| Value::Array(Vec::new()))
}
