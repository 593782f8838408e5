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

mod args;

use anyhow::{bail, Context, Result};
use args::Args;
use clap::Parser;
use conductor::functions::builtin_registry;
use conductor::{todo, ConductorConfig, FileTodoSource, ModelGateway, Orchestrator};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TODO_FILE_NAME: &str = "todo.txt";

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.debug {
            EnvFilter::new("debug,reqwest=info,hyper=info,h2=info,hyper_util=info,rustls=info")
        } else {
            EnvFilter::new("info,reqwest=warn,hyper=warn,h2=warn,hyper_util=warn,rustls=warn")
        }
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<ConductorConfig> {
    let mut config = match &args.config {
        Some(path) => ConductorConfig::load(path)?,
        None => ConductorConfig::from_env()?,
    };
    if let Some(workspace) = &args.workspace {
        config.workspace.base_dir.clone_from(workspace);
    }
    if let Some(policy) = args.policy {
        config.execution.success_policy = policy.into();
    }
    config.validate()?;
    Ok(config)
}

fn collect_instructions(args: &Args) -> Result<Vec<String>> {
    if let Some(path) = &args.todo_file {
        let instructions = todo::read_instructions(path)
            .with_context(|| format!("failed to read todo file {}", path.display()))?;
        if instructions.is_empty() {
            warn!(path = %path.display(), "Todo file contains no instructions");
        }
        return Ok(instructions);
    }
    match &args.instruction {
        Some(instruction) => Ok(vec![instruction.clone()]),
        None => bail!("provide an instruction or --todo-file"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args);

    let config = load_config(&args)?;
    let instructions = collect_instructions(&args)?;

    let registry = Arc::new(builtin_registry(
        &config.workspace.base_dir,
        &config.registry.function_prefix,
    ));
    if registry.is_empty() {
        warn!(
            prefix = %config.registry.function_prefix,
            "No functions matched the configured prefix"
        );
    }
    let gateway = Arc::new(ModelGateway::from_config(&config.model)?);
    info!(
        provider = gateway.provider_name(),
        model = %config.model.model,
        functions = registry.len(),
        "Conductor ready"
    );

    let orchestrator = Orchestrator::builder(registry, gateway)
        .execution_settings(&config.execution)
        .todo_source(Arc::new(FileTodoSource::new(
            config.workspace.base_dir.join(TODO_FILE_NAME),
        )))
        .build();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current subtask");
            interrupt.cancel();
        }
    });

    let mut all_succeeded = true;
    let mut reports = Vec::with_capacity(instructions.len());
    for instruction in &instructions {
        if cancel.is_cancelled() {
            all_succeeded = false;
            break;
        }
        let report = orchestrator.run_with_cancel(instruction, &cancel).await;
        all_succeeded &= report.success;
        if !args.json {
            println!("{}", report.summary());
        }
        reports.push(report);
    }

    if args.json {
        let rendered = match (args.todo_file.is_some(), reports.as_slice()) {
            (false, [report]) => serde_json::to_string_pretty(report)?,
            _ => serde_json::to_string_pretty(&reports)?,
        };
        println!("{rendered}");
    }

    if !all_succeeded {
        std::process::exit(1);
    }
    Ok(())
}
