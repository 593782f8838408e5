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

use crate::error::AgentError;
use crate::types::{CallSpec, Subtask};
use serde_json::Value;
use tracing::{debug, info, warn};

pub fn log_phase_transition(from: &str, to: &str) {
    debug!(from = from, to = to, "Run phase transition");
}

pub fn log_subtask_event(subtask: &Subtask, event: &str, payload: Value) {
    info!(
        subtask = subtask.index,
        description = %subtask.description,
        event = event,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Subtask event"
    );
}

pub fn log_call_attempt(subtask: &Subtask, call: &CallSpec) {
    info!(
        subtask = subtask.index,
        function = %call.function,
        call = %call,
        "Invoking function"
    );
}

/// Every failure carries enough context to diagnose without re-running.
pub fn log_failure(subtask: Option<&Subtask>, call: Option<&CallSpec>, error: &AgentError) {
    let call = call.map(ToString::to_string).unwrap_or_default();
    match subtask {
        Some(subtask) => warn!(
            subtask = subtask.index,
            description = %subtask.description,
            call = %call,
            kind = %error.kind(),
            raw_output = error.raw_output().unwrap_or(""),
            error = %error,
            "Subtask failed"
        ),
        None => warn!(
            kind = %error.kind(),
            raw_output = error.raw_output().unwrap_or(""),
            error = %error,
            "Run failed"
        ),
    }
}
