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

//! Leaf function modules shipped with the crate. They keep their business
//! logic deliberately small; the orchestration core treats them like any
//! other external collaborator.

pub mod files;
pub mod math;
pub mod text;

pub use files::FilesModule;
pub use math::MathModule;
pub use text::TextModule;

use crate::registry::{FunctionModule, FunctionRegistry, RegistryBuilder};
use std::path::PathBuf;

pub fn builtin_modules(workspace: impl Into<PathBuf>) -> Vec<Box<dyn FunctionModule>> {
    vec![
        Box::new(FilesModule::new(workspace)),
        Box::new(MathModule),
        Box::new(TextModule),
    ]
}

/// Registry holding every built-in module whose exports match `prefix`.
pub fn builtin_registry(workspace: impl Into<PathBuf>, prefix: &str) -> FunctionRegistry {
    let mut builder = RegistryBuilder::with_prefix(prefix);
    for module in builtin_modules(workspace) {
        builder.register(module.as_ref());
    }
    builder.build()
}
