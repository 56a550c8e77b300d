// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler configuration.

use serde::{Deserialize, Serialize};

use crate::ast::SourceType;

/// Options for a single compile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Overrides the program's own source type when set
    pub source_type: Option<SourceType>,

    /// Keep binding names in the captured-slot layout
    pub debug_names: bool,

    /// Maximum registers per function (bindings plus temporaries)
    pub max_registers: u32,

    /// Maximum slots in one lexical environment frame
    pub max_frame_slots: u32,

    /// Maximum function nesting depth
    pub max_function_depth: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            source_type: None,
            debug_names: false,
            max_registers: u16::MAX as u32,
            max_frame_slots: u16::MAX as u32,
            max_function_depth: 256,
        }
    }
}

impl CompilerOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables debug names.
    pub fn with_debug_names(mut self, enabled: bool) -> Self {
        self.debug_names = enabled;
        self
    }

    /// Forces a source type.
    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CompilerOptions::default();
        assert_eq!(opts.source_type, None);
        assert!(!opts.debug_names);
        assert_eq!(opts.max_registers, 65535);
        assert_eq!(opts.max_function_depth, 256);
    }

    #[test]
    fn test_partial_deserialize() {
        let opts: CompilerOptions =
            serde_json::from_str(r#"{ "debug_names": true, "source_type": "module" }"#).unwrap();
        assert!(opts.debug_names);
        assert_eq!(opts.source_type, Some(SourceType::Module));
        assert_eq!(opts.max_frame_slots, 65535);
    }
}
