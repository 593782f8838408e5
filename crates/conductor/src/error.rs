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

use crate::registry::LeafErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure taxonomy recorded in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    DecompositionError,
    UnknownFunction,
    ArgumentError,
    DependencyUnmet,
    LeafExecutionError,
    DispatchFailed,
    Cancelled,
}

impl ErrorKind {
    /// Fatal kinds abort a run before any subtask is attempted.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::InvalidInput | ErrorKind::DecompositionError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::DecompositionError => "DecompositionError",
            ErrorKind::UnknownFunction => "UnknownFunction",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::DependencyUnmet => "DependencyUnmet",
            ErrorKind::LeafExecutionError => "LeafExecutionError",
            ErrorKind::DispatchFailed => "DispatchFailed",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Decomposition failed: {reason}")]
    Decomposition { reason: String, raw: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Argument error in {function}: {reason}")]
    Argument {
        function: String,
        parameter: Option<String>,
        reason: String,
    },

    #[error("Subtask {subtask} depends on subtask {dependency}, which did not succeed")]
    DependencyUnmet { subtask: usize, dependency: usize },

    #[error("{function} failed ({kind}): {message}")]
    LeafExecution {
        function: String,
        kind: LeafErrorKind,
        message: String,
    },

    #[error("Dispatch failed: {reason}")]
    DispatchFailed { reason: String, raw: Option<String> },

    #[error("Run cancelled")]
    Cancelled,
}

pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::InvalidInput(_) => ErrorKind::InvalidInput,
            AgentError::Decomposition { .. } => ErrorKind::DecompositionError,
            AgentError::UnknownFunction { .. } => ErrorKind::UnknownFunction,
            AgentError::Argument { .. } => ErrorKind::ArgumentError,
            AgentError::DependencyUnmet { .. } => ErrorKind::DependencyUnmet,
            AgentError::LeafExecution { .. } => ErrorKind::LeafExecutionError,
            AgentError::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            AgentError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Raw model output attached to the failure, if any.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            AgentError::Decomposition { raw, .. } => Some(raw),
            AgentError::DispatchFailed { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }

    pub fn argument(
        function: impl Into<String>,
        parameter: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        AgentError::Argument {
            function: function.into(),
            parameter: parameter.map(str::to_string),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_input_and_decomposition_failures_are_fatal() {
        assert!(AgentError::InvalidInput("empty".into()).kind().is_fatal());
        assert!(AgentError::Decomposition {
            reason: "bad".into(),
            raw: "???".into()
        }
        .kind()
        .is_fatal());
        assert!(!AgentError::UnknownFunction { name: "x".into() }
            .kind()
            .is_fatal());
        assert!(!AgentError::Cancelled.kind().is_fatal());
    }

    #[test]
    fn decomposition_error_keeps_raw_output() {
        let err = AgentError::Decomposition {
            reason: "no JSON".into(),
            raw: "sure! here you go".into(),
        };
        assert_eq!(err.raw_output(), Some("sure! here you go"));
        assert_eq!(err.kind().to_string(), "DecompositionError");
    }
}
