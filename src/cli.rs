// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// lexa - compile ECMAScript ASTs to bytecode
#[derive(Parser, Debug)]
#[command(name = "lexa")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON AST files to compile
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// TOML file with compiler options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Run each program in the reference interpreter after compiling
    #[arg(short, long)]
    pub run: bool,

    /// Keep binding names in the captured-slot layout
    #[arg(long)]
    pub debug_names: bool,

    /// Treat every input as an ES module
    #[arg(long)]
    pub module: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// How compiled output is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Colored disassembly
    Text,
    /// The serialized compile output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from(["lexa", "--run", "-f", "json", "--debug-names", "a.json", "b.json"]);
        assert!(cli.run);
        assert!(cli.debug_names);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.files.len(), 2);
    }

    #[test]
    fn test_files_required() {
        assert!(Cli::try_parse_from(["lexa"]).is_err());
    }
}
