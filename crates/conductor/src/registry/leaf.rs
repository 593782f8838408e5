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

use super::spec::FunctionSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafErrorKind {
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Io,
    Timeout,
    Panicked,
    Other,
}

impl fmt::Display for LeafErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeafErrorKind::PermissionDenied => "permission denied",
            LeafErrorKind::NotFound => "not found",
            LeafErrorKind::InvalidArgument => "invalid argument",
            LeafErrorKind::Io => "io",
            LeafErrorKind::Timeout => "timeout",
            LeafErrorKind::Panicked => "panicked",
            LeafErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Typed failure signalled by a leaf function.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct LeafError {
    pub kind: LeafErrorKind,
    pub message: String,
}

impl LeafError {
    pub fn new(kind: LeafErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(LeafErrorKind::InvalidArgument, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(LeafErrorKind::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(LeafErrorKind::NotFound, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(LeafErrorKind::Other, message)
    }
}

impl From<io::Error> for LeafError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => LeafErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => LeafErrorKind::NotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                LeafErrorKind::InvalidArgument
            }
            io::ErrorKind::TimedOut => LeafErrorKind::Timeout,
            _ => LeafErrorKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

pub type LeafResult = Result<Value, LeafError>;

pub type LeafFn = Arc<dyn Fn(&CallArgs) -> LeafResult + Send + Sync>;

/// Resolved, type-coerced arguments handed to a leaf function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    values: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> Result<&Value, LeafError> {
        self.values
            .get(name)
            .ok_or_else(|| LeafError::invalid_argument(format!("missing argument '{name}'")))
    }

    pub fn str(&self, name: &str) -> Result<&str, LeafError> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| type_mismatch(name, "a string"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, LeafError> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| type_mismatch(name, "a number"))
    }

    pub fn i64(&self, name: &str) -> Result<i64, LeafError> {
        self.value(name)?
            .as_i64()
            .ok_or_else(|| type_mismatch(name, "an integer"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, LeafError> {
        self.value(name)?
            .as_bool()
            .ok_or_else(|| type_mismatch(name, "a boolean"))
    }

    pub fn list(&self, name: &str) -> Result<&Vec<Value>, LeafError> {
        self.value(name)?
            .as_array()
            .ok_or_else(|| type_mismatch(name, "a list"))
    }

    pub fn object(&self, name: &str) -> Result<&Map<String, Value>, LeafError> {
        self.value(name)?
            .as_object()
            .ok_or_else(|| type_mismatch(name, "an object"))
    }

    pub fn string_list(&self, name: &str) -> Result<Vec<String>, LeafError> {
        self.list(name)?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| type_mismatch(name, "a list of strings"))
            })
            .collect()
    }
}

fn type_mismatch(name: &str, expected: &str) -> LeafError {
    LeafError::invalid_argument(format!("argument '{name}' must be {expected}"))
}

/// A registrable callable: its spec plus the code behind it.
#[derive(Clone)]
pub struct LeafFunction {
    pub spec: FunctionSpec,
    pub func: LeafFn,
}

impl LeafFunction {
    pub fn new<F>(spec: FunctionSpec, func: F) -> Self
    where
        F: Fn(&CallArgs) -> LeafResult + Send + Sync + 'static,
    {
        Self {
            spec,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn call(&self, args: &CallArgs) -> LeafResult {
        (self.func)(args)
    }
}

impl fmt::Debug for LeafFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafFunction")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let denied: LeafError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert_eq!(denied.kind, LeafErrorKind::PermissionDenied);
        let missing: LeafError = io::Error::from(io::ErrorKind::NotFound).into();
        assert_eq!(missing.kind, LeafErrorKind::NotFound);
        let other: LeafError = io::Error::other("disk on fire").into();
        assert_eq!(other.kind, LeafErrorKind::Io);
    }

    #[test]
    fn typed_getters_report_the_argument_name() {
        let args = CallArgs::new(BTreeMap::from([
            ("path".to_string(), json!("docs")),
            ("count".to_string(), json!(2)),
        ]));
        assert_eq!(args.str("path").unwrap(), "docs");
        assert_eq!(args.i64("count").unwrap(), 2);

        let err = args.bool("path").unwrap_err();
        assert_eq!(err.kind, LeafErrorKind::InvalidArgument);
        assert!(err.message.contains("'path'"));

        let err = args.str("missing").unwrap_err();
        assert!(err.message.contains("missing argument 'missing'"));
    }
}
