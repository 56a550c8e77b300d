// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # lexa-frontend
//!
//! Scope resolution and control-flow compilation for an ECMAScript subset.
//!
//! ## Overview
//!
//! The front-end takes a parsed program and produces flat instructions:
//! - Scope collection builds the static scope tree
//! - Binding classification decides register vs. environment slot storage
//! - Frame layout assigns captured bindings to lexical environment frames
//! - The emitter compiles loops, labels, switch and try/catch/finally with
//!   backpatched jumps and an exception handler table
//!
//! A small reference interpreter in [`vm`] executes the output, which is how
//! the compiled semantics are tested.
//!
//! ## Quick Start
//!
//! ```rust
//! use lexa_frontend::ast::build::*;
//! use lexa_frontend::{CompilerOptions, VM, Value, compile};
//!
//! let program = script(vec![
//!     let_("x", Some(num(20.0))),
//!     expr(binary(lexa_frontend::ast::BinaryOperator::Add, ident("x"), num(22.0))),
//! ]);
//! let output = compile(&program, &CompilerOptions::default()).unwrap();
//! let result = VM::new().execute(&output).unwrap();
//! assert_eq!(result, Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod error;
pub mod options;
pub mod vm;

// Re-exports for convenience
pub use compiler::{CompileOutput, CompiledFunction, compile, compile_all, compile_with_sink};
pub use error::{CompileError, DiagnosticSink, Diagnostics, ErrorKind, Result};
pub use options::CompilerOptions;
pub use vm::{VM, Value, VmError};
