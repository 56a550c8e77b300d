// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-compile state shared by the emitter.

use crate::compiler::scope::{Classification, LexicalEnvironments, ScopeTable};
use crate::error::Result;
use crate::options::CompilerOptions;

/// Everything the emitter consults, created fresh for each compile.
///
/// Nothing here is global, so independent programs can be compiled on
/// different threads at the same time.
pub struct CompilerContext<'a> {
    /// Options for this compile
    pub options: &'a CompilerOptions,
    /// Frozen scope tree from pass 1
    pub table: &'a ScopeTable,
    /// Storage decisions from pass 2
    pub classification: &'a Classification,
    /// Frame layout
    pub envs: LexicalEnvironments<'a>,
}

impl<'a> CompilerContext<'a> {
    /// Builds the context, laying out frames for the classified table.
    pub fn new(
        options: &'a CompilerOptions,
        table: &'a ScopeTable,
        classification: &'a Classification,
    ) -> Result<Self> {
        Ok(Self {
            options,
            table,
            classification,
            envs: LexicalEnvironments::build(table, classification)?,
        })
    }
}
