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

use super::leaf::LeafFunction;

/// A group of leaf functions offered to the registry together, the unit
/// a caller hands to [`RegistryBuilder::register`](super::RegistryBuilder::register).
pub trait FunctionModule {
    fn name(&self) -> &str;

    /// Every callable the module makes public. The registry decides which
    /// of them match its naming convention.
    fn exports(&self) -> Vec<LeafFunction>;
}

/// Ad-hoc module assembled from closures, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticModule {
    name: String,
    functions: Vec<LeafFunction>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn with(mut self, function: LeafFunction) -> Self {
        self.functions.push(function);
        self
    }
}

impl FunctionModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn exports(&self) -> Vec<LeafFunction> {
        self.functions.clone()
    }
}
