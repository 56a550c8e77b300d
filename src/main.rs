// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! lexa - scope resolution and control-flow compiler for an ECMAScript subset
//!
//! Reads programs as JSON ASTs, compiles them and prints the bytecode.
//!
//! ## Features
//!
//! - Parallel compilation of many inputs
//! - Text or JSON output
//! - Optional execution in the reference interpreter

mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use lexa_frontend::ast::{Program, SourceType};
use lexa_frontend::compiler::{CompileOutput, CompiledFunction, Operand};
use lexa_frontend::{CompileError, CompilerOptions, VM, compile_all};
use owo_colors::OwoColorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Format};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let options = load_options(&cli).await?;

    let mut programs = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        programs.push(read_program(path).await?);
    }
    tracing::debug!(files = programs.len(), "inputs loaded");

    let results = compile_all(&programs, &options);
    let mut failed = false;
    for (path, result) in cli.files.iter().zip(results) {
        match result {
            Ok(output) => {
                if !cli.quiet {
                    print_output(path, &output, cli.format)?;
                }
                if cli.run && !run_program(path, &output) {
                    failed = true;
                }
            }
            Err(err) => {
                report_error(path, &err);
                failed = true;
            }
        }
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Builds compiler options from the config file and flags.
async fn load_options(cli: &Cli) -> Result<CompilerOptions> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str::<CompilerOptions>(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => CompilerOptions::default(),
    };
    if cli.debug_names {
        options.debug_names = true;
    }
    if cli.module {
        options.source_type = Some(SourceType::Module);
    }
    Ok(options)
}

async fn read_program(path: &Path) -> Result<Program> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid AST", path.display()))
}

fn report_error(path: &Path, err: &CompileError) {
    let label = if err.is_internal() { "internal error" } else { "error" };
    eprintln!(
        "{}: {} ({}:{})",
        label.red().bold(),
        err.message,
        path.display().cyan(),
        err.location
    );
}

fn print_output(path: &Path, output: &CompileOutput, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(output)?);
        }
        Format::Text => {
            println!("{} {}", "==>".dimmed(), path.display().bold());
            print_function(&output.main, 0);
            if !output.layout.frames.is_empty() {
                println!("{}", "frames:".white().bold());
                for frame in &output.layout.frames {
                    let slots: Vec<String> = frame
                        .slots
                        .iter()
                        .map(|s| match &s.name {
                            Some(name) => format!("{}:{}", s.slot, name),
                            None => s.slot.to_string(),
                        })
                        .collect();
                    println!(
                        "  {} {:?} depth {} [{}]",
                        frame.scope.yellow(),
                        frame.kind,
                        frame.depth,
                        slots.join(", ")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_function(function: &CompiledFunction, indent: usize) {
    let pad = "  ".repeat(indent);
    println!(
        "{}{} {} {}",
        pad,
        "function".magenta(),
        function.name.bold(),
        format!("(params: {}, registers: {})", function.param_count, function.register_count).dimmed()
    );
    for (i, instruction) in function.instructions.iter().enumerate() {
        let opcode = format!("{:?}", instruction.opcode);
        let operand = instruction.operand.map(|o| o.to_string()).unwrap_or_default();
        let comment = match instruction.operand {
            Some(Operand::Constant(k)) | Some(Operand::Property(k)) => function
                .constants
                .get(k as usize)
                .map(|c| format!("; {}", c))
                .unwrap_or_default(),
            _ => String::new(),
        };
        println!("{}  {:>4}  {:<14} {:<10} {}", pad, i.dimmed(), opcode.cyan(), operand, comment.dimmed());
    }
    for h in &function.handlers {
        println!(
            "{}  {} [{}, {}) -> {}{}{}",
            pad,
            "handler".green(),
            h.start,
            h.end,
            h.handler,
            if h.has_catch_param { " catch-param" } else { "" },
            if h.has_finally { " finally" } else { "" },
        );
    }
    for nested in &function.functions {
        print_function(nested, indent + 1);
    }
}

/// Executes a program; returns whether it completed normally.
fn run_program(path: &Path, output: &CompileOutput) -> bool {
    let mut vm = VM::new();
    match vm.execute(output) {
        Ok(value) => {
            println!("{} {}", "=>".green().bold(), value);
            true
        }
        Err(err) => {
            eprintln!("{}: {} ({})", "runtime error".red().bold(), err, path.display().cyan());
            false
        }
    }
}
