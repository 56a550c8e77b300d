// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the compiler front-end.

use serde::Serialize;
use thiserror::Error;

use crate::ast::SourceLocation;
use crate::compiler::scope::ScopeId;

/// Result type for front-end operations.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Compiler pass in which an internal error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Scope collection (pass 1)
    Collect,
    /// Binding classification (pass 2)
    Classify,
    /// Lexical environment layout
    Environment,
    /// Instruction emission (pass 3)
    Emit,
    /// Label backpatching
    Backpatch,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Collect => "collect",
            Phase::Classify => "classify",
            Phase::Environment => "environment",
            Phase::Emit => "emit",
            Phase::Backpatch => "backpatch",
        };
        f.write_str(name)
    }
}

/// What went wrong.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ErrorKind {
    /// A declaration conflicts with an existing binding in the same scope
    #[error("Identifier '{name}' has already been declared")]
    DuplicateBinding {
        /// The redeclared name
        name: String,
    },

    /// `continue` outside a loop, or naming a non-loop label
    #[error("Illegal continue statement{}", label_suffix(.label))]
    IllegalContinue {
        /// The label, when it names a statement that is not a loop
        label: Option<String>,
    },

    /// `break` outside a loop or switch
    #[error("Illegal break statement")]
    IllegalBreak,

    /// No enclosing statement carries the label
    #[error("Undefined label '{label}'")]
    UnresolvedLabel {
        /// The label that was not found
        label: String,
    },

    /// Unresolvable `break`/`continue` inside a finally body
    #[error("Illegal {statement} statement inside finally block")]
    InvalidFinallyControlFlow {
        /// `break` or `continue`
        statement: &'static str,
    },

    /// A label shadows an enclosing label of the same name
    #[error("Label '{label}' has already been declared")]
    DuplicateLabel {
        /// The repeated label
        label: String,
    },

    /// `return` outside a function body
    #[error("Illegal return statement")]
    IllegalReturn,

    /// Left-hand side is not an identifier or member expression
    #[error("Invalid left-hand side in assignment")]
    InvalidAssignmentTarget,

    /// A configured limit was exceeded
    #[error("Too many {what} (limit {limit})")]
    LimitExceeded {
        /// The exhausted resource
        what: &'static str,
        /// The configured maximum
        limit: u32,
    },

    /// Broken compiler invariant; never recovered
    #[error("internal compiler error in {phase} (scope {}): {detail}", scope_label(.scope))]
    Internal {
        /// The pass that failed
        phase: Phase,
        /// The scope being processed, if known
        scope: Option<ScopeId>,
        /// What invariant broke
        detail: String,
    },
}

fn label_suffix(label: &Option<String>) -> String {
    label
        .as_ref()
        .map(|l| format!(": '{}' does not denote an iteration statement", l))
        .unwrap_or_default()
}

fn scope_label(scope: &Option<ScopeId>) -> String {
    scope
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl ErrorKind {
    /// Builds an internal error.
    pub fn internal(phase: Phase, scope: Option<ScopeId>, detail: impl Into<String>) -> Self {
        ErrorKind::Internal {
            phase,
            scope,
            detail: detail.into(),
        }
    }

    /// Attaches a source location.
    pub fn at(self, location: SourceLocation) -> CompileError {
        CompileError::new(self, location)
    }
}

/// An error reported by the front-end.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message} at {location}")]
pub struct CompileError {
    /// The error kind
    pub kind: ErrorKind,
    /// Where the error was detected
    pub location: SourceLocation,
    /// Rendered message
    pub message: String,
}

impl CompileError {
    /// Creates a new error.
    pub fn new(kind: ErrorKind, location: SourceLocation) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            location,
            message,
        }
    }

    /// Whether this is a compiler bug rather than a problem in the input.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, ErrorKind::Internal { .. })
    }
}

impl From<ErrorKind> for CompileError {
    fn from(kind: ErrorKind) -> Self {
        CompileError::new(kind, SourceLocation::default())
    }
}

/// Receives diagnostics produced during a compile.
pub trait DiagnosticSink {
    /// Reports one error.
    fn report(&mut self, error: &CompileError);
}

/// Collecting diagnostic sink.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    errors: Vec<CompileError>,
}

impl Diagnostics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reported errors in order.
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, error: &CompileError) {
        if error.is_internal() {
            tracing::error!(error = %error, "internal compiler error");
        } else {
            tracing::debug!(error = %error, "compile error");
        }
        self.errors.push(error.clone());
    }
}
