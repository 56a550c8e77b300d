// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope analysis.
//!
//! - `table` - scope tree and bindings
//! - `collector` - pass 1, builds the table
//! - `classify` - pass 2, register vs. frame slot storage
//! - `env` - frame layout and chain depths

pub mod classify;
pub mod collector;
pub mod env;
pub mod table;

pub use classify::{Classification, Storage, classify};
pub use collector::{Collected, ScopeCollector, collect};
pub use env::{FrameId, FrameLayout, LexicalEnvironments, ScopeLayout, SlotLayout};
pub use table::{
    Binding, BindingId, BindingKind, Reference, Resolution, Scope, ScopeId, ScopeKind, ScopeTable,
    ScopeTableBuilder,
};
