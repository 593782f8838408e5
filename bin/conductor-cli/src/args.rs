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

use clap::{Parser, ValueEnum};
use conductor::SuccessPolicy;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Carry out natural-language instructions with a closed set of functions"
)]
pub struct Args {
    #[arg(help = "Instruction to carry out (omit when using --todo-file)")]
    pub instruction: Option<String>,
    #[arg(
        long = "todo-file",
        conflicts_with = "instruction",
        help = "Run every non-empty, non-comment line of this file as its own instruction"
    )]
    pub todo_file: Option<PathBuf>,
    #[arg(long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "Directory the file functions operate in")]
    pub workspace: Option<PathBuf>,
    #[arg(long, value_enum, help = "How overall run success is decided")]
    pub policy: Option<PolicyArg>,
    #[arg(long, default_value_t = false, help = "Print run reports as JSON")]
    pub json: bool,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
    #[arg(long = "log-json", default_value_t = false, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    All,
    RequiredOnly,
}

impl From<PolicyArg> for SuccessPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::All => SuccessPolicy::AllSubtasks,
            PolicyArg::RequiredOnly => SuccessPolicy::RequiredOnly,
        }
    }
}
