// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode compiler for the ECMAScript subset.
//!
//! Transforms an AST into flat instructions in three passes.
//!
//! # Module Structure
//!
//! - `scope`: scope tree, binding classification and frame layout
//! - `bytecode`: instruction definitions and the label backpatcher
//! - `codegen`: the emitter, including loops, labels and finally regions
//! - `context`: per-compile state

pub mod bytecode;
pub mod codegen;
pub mod context;
pub mod scope;

pub use bytecode::{Bytecode, CompiledFunction, Constant, HandlerEntry, Instruction, Label, OpCode, Operand};
pub use codegen::Compiler;
pub use context::CompilerContext;

use serde::{Deserialize, Serialize};

use crate::ast::{Program, SourceType};
use crate::error::{DiagnosticSink, Result};
use crate::options::CompilerOptions;
use scope::{ScopeKind, ScopeLayout};

/// Result of compiling one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    /// Top-level code; nested functions hang off it
    pub main: CompiledFunction,
    /// Captured-slot layout of every frame
    pub layout: ScopeLayout,
}

/// Compiles a program, reporting a failure to `sink`.
///
/// Compilation stops at the first error; no partial output is returned.
pub fn compile_with_sink(
    program: &Program,
    options: &CompilerOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<CompileOutput> {
    let result = run(program, options);
    if let Err(error) = &result {
        sink.report(error);
    }
    result
}

/// Compiles a program.
pub fn compile(program: &Program, options: &CompilerOptions) -> Result<CompileOutput> {
    let mut sink = crate::error::Diagnostics::new();
    compile_with_sink(program, options, &mut sink)
}

#[tracing::instrument(level = "debug", skip_all, fields(statements = program.body.len()))]
fn run(program: &Program, options: &CompilerOptions) -> Result<CompileOutput> {
    let root = match options.source_type.unwrap_or(program.source_type) {
        SourceType::Script => ScopeKind::Global,
        SourceType::Module => ScopeKind::Module,
    };
    let collected = scope::collect(program, root, options)?;
    let classification = scope::classify(&collected.table, &collected.references, options)?;
    let ctx = CompilerContext::new(options, &collected.table, &classification)?;
    let main = Compiler::new(&ctx).compile(program)?;
    let layout = ctx.envs.layout(options.debug_names);
    Ok(CompileOutput { main, layout })
}

/// Compiles a batch of independent programs.
#[cfg(feature = "parallel")]
pub fn compile_all(programs: &[Program], options: &CompilerOptions) -> Vec<Result<CompileOutput>> {
    use rayon::prelude::*;

    programs.par_iter().map(|program| compile(program, options)).collect()
}

/// Compiles a batch of independent programs.
#[cfg(not(feature = "parallel"))]
pub fn compile_all(programs: &[Program], options: &CompilerOptions) -> Vec<Result<CompileOutput>> {
    programs.iter().map(|program| compile(program, options)).collect()
}
