// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Reference interpreter for compiled output.
//!
//! A stack machine with per-call registers and a chain of heap-allocated
//! lexical environments. The runtime library is small: arrays with `push`,
//! `pop` and `join`, plain objects, strings and numbers.

mod interpreter;
mod value;

pub use interpreter::{VM, VmError};
pub use value::{Closure, Environment, NativeMethod, Prototype, Value};
