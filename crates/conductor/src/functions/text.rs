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

use crate::registry::{FunctionModule, FunctionSpec, LeafFunction, ParamSpec, ParamType};
use crate::todo;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextModule;

impl FunctionModule for TextModule {
    fn name(&self) -> &str {
        "text"
    }

    fn exports(&self) -> Vec<LeafFunction> {
        let spec = FunctionSpec::new(
            "ai_split_lines",
            "Splits text into its non-empty lines, skipping lines that start with '#'.",
        )
        .param(ParamSpec::required("text", ParamType::String));
        vec![LeafFunction::new(spec, |args| {
            Ok(Value::from(todo::instructions(args.str("text")?)))
        })]
    }
}
