// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Binding classification (pass 2).
//!
//! Decides for every binding whether it lives in a register of its owning
//! function or in a slot of a heap-allocated lexical environment frame. A
//! binding is captured when any reference to it is resolved from inside a
//! different function than the one that owns it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::options::CompilerOptions;

use super::table::{BindingId, Reference, Resolution, ScopeId, ScopeTable};

/// Where a binding is stored at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    /// Register of the owning function
    Register(u32),
    /// Slot in a lexical environment frame
    LexicalSlot {
        /// Absolute depth of the owning frame in the static frame chain
        frame_depth: u32,
        /// Slot index inside the frame
        slot: u32,
    },
}

/// Result of the classification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    storage: Vec<Storage>,
    captured: Vec<bool>,
    /// Binding registers per function-level scope
    register_counts: FxHashMap<ScopeId, u32>,
    /// Captured slots per scope (0 means no frame)
    frame_slots: Vec<u32>,
    /// Depth of the innermost frame-bearing scope enclosing each scope
    chain_tops: Vec<Option<u32>>,
}

impl Classification {
    /// Storage of a binding.
    pub fn storage(&self, binding: BindingId) -> Storage {
        self.storage[binding.index()]
    }

    /// Whether a binding is referenced across a function boundary.
    pub fn is_captured(&self, binding: BindingId) -> bool {
        self.captured[binding.index()]
    }

    /// Registers used by bindings of a function-level scope.
    pub fn register_count(&self, function: ScopeId) -> u32 {
        self.register_counts.get(&function).copied().unwrap_or(0)
    }

    /// Number of captured slots owned by a scope.
    pub fn frame_slot_count(&self, scope: ScopeId) -> u32 {
        self.frame_slots[scope.index()]
    }

    /// Whether a scope allocates a frame.
    pub fn has_frame(&self, scope: ScopeId) -> bool {
        self.frame_slots[scope.index()] > 0
    }

    /// Absolute depth of the innermost frame at or above `scope`.
    pub fn chain_top(&self, scope: ScopeId) -> Option<u32> {
        self.chain_tops[scope.index()]
    }

    /// Number of captured bindings.
    pub fn captured_count(&self) -> usize {
        self.captured.iter().filter(|c| **c).count()
    }
}

/// Classifies every binding in `table` using the references from pass 1.
///
/// The result depends only on the table and references, so running it twice
/// yields identical output.
#[tracing::instrument(level = "debug", skip_all, fields(bindings = table.binding_count()))]
pub fn classify(table: &ScopeTable, references: &[Reference], options: &CompilerOptions) -> Result<Classification> {
    let mut captured = vec![false; table.binding_count()];
    for reference in references {
        if let Resolution::Binding(binding) = table.resolve(reference.scope, &reference.name) {
            let owner = table.scope(table.binding(binding).scope).function;
            let user = table.scope(reference.scope).function;
            if owner != user && !captured[binding.index()] {
                captured[binding.index()] = true;
                tracing::trace!(name = %reference.name, from = %reference.scope, "binding captured");
            }
        }
    }

    // Frames: parents are created before children, so one forward sweep
    // sees every ancestor first.
    let mut frame_slots = vec![0u32; table.scope_count()];
    let mut chain_tops: Vec<Option<u32>> = vec![None; table.scope_count()];
    for scope in table.scope_ids() {
        let count = table
            .scope(scope)
            .bindings()
            .iter()
            .filter(|b| captured[b.index()])
            .count() as u32;
        if count > options.max_frame_slots {
            return Err(ErrorKind::LimitExceeded {
                what: "captured bindings in one scope",
                limit: options.max_frame_slots,
            }
            .into());
        }
        let inherited = table.scope(scope).parent.and_then(|p| chain_tops[p.index()]);
        frame_slots[scope.index()] = count;
        chain_tops[scope.index()] = if count > 0 {
            Some(inherited.map_or(0, |d| d + 1))
        } else {
            inherited
        };
    }

    let mut storage = Vec::with_capacity(table.binding_count());
    let mut register_counts: FxHashMap<ScopeId, u32> = FxHashMap::default();
    let mut next_slot: FxHashMap<ScopeId, u32> = FxHashMap::default();
    for binding in table.binding_ids() {
        let owner = table.binding(binding).scope;
        let assigned = if captured[binding.index()] {
            let slot = next_slot.entry(owner).or_insert(0);
            let frame_depth = chain_tops[owner.index()].unwrap_or(0);
            let s = Storage::LexicalSlot {
                frame_depth,
                slot: *slot,
            };
            *slot += 1;
            s
        } else {
            let function = table.scope(owner).function;
            let reg = register_counts.entry(function).or_insert(0);
            let s = Storage::Register(*reg);
            *reg += 1;
            s
        };
        storage.push(assigned);
    }

    for count in register_counts.values() {
        if *count > options.max_registers {
            return Err(ErrorKind::LimitExceeded {
                what: "registers",
                limit: options.max_registers,
            }
            .into());
        }
    }

    let result = Classification {
        storage,
        captured,
        register_counts,
        frame_slots,
        chain_tops,
    };
    tracing::debug!(captured = result.captured_count(), "classification finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinaryOperator, Program};
    use crate::compiler::scope::collector::{Collected, collect};
    use crate::compiler::scope::ScopeKind;

    fn run(program: &Program) -> (Collected, Classification) {
        let options = CompilerOptions::default();
        let collected = collect(program, ScopeKind::Global, &options).unwrap();
        let classification = classify(&collected.table, &collected.references, &options).unwrap();
        (collected, classification)
    }

    fn binding(c: &Collected, scope: ScopeId, name: &str) -> BindingId {
        c.table.scope(scope).get(name).unwrap()
    }

    #[test]
    fn test_uncaptured_bindings_get_dense_registers() {
        let (c, cls) = run(&script(vec![var("a", None), let_("b", None), block(vec![let_("c", None)])]));
        let root = c.table.root();
        let block_scope = c.table.scope(root).children[0];
        assert_eq!(cls.storage(binding(&c, root, "a")), Storage::Register(0));
        assert_eq!(cls.storage(binding(&c, root, "b")), Storage::Register(1));
        assert_eq!(cls.storage(binding(&c, block_scope, "c")), Storage::Register(2));
        assert_eq!(cls.register_count(root), 3);
        assert!(!cls.has_frame(root));
    }

    #[test]
    fn test_reference_from_inner_function_captures() {
        // function outer() { let x = 1; let y = 2; function inner() { return x; } }
        let program = script(vec![function(
            "outer",
            &[],
            vec![
                let_("x", Some(num(1.0))),
                let_("y", Some(num(2.0))),
                function("inner", &[], vec![ret(Some(ident("x")))]),
            ],
        )]);
        let (c, cls) = run(&program);
        let outer = c.table.scope(c.table.root()).children[0];
        let x = binding(&c, outer, "x");
        let y = binding(&c, outer, "y");
        assert!(cls.is_captured(x));
        assert!(!cls.is_captured(y));
        assert_eq!(
            cls.storage(x),
            Storage::LexicalSlot {
                frame_depth: 0,
                slot: 0
            }
        );
        // inner is a register of outer, y follows it.
        assert!(matches!(cls.storage(y), Storage::Register(_)));
        assert_eq!(cls.frame_slot_count(outer), 1);
    }

    #[test]
    fn test_frame_depths_nest() {
        // let a; { let b; () => a + b; }
        let program = script(vec![
            let_("a", None),
            block(vec![
                let_("b", None),
                expr(arrow(&[], binary(BinaryOperator::Add, ident("a"), ident("b")))),
            ]),
        ]);
        let (c, cls) = run(&program);
        let root = c.table.root();
        let inner = c.table.scope(root).children[0];
        assert_eq!(
            cls.storage(binding(&c, root, "a")),
            Storage::LexicalSlot {
                frame_depth: 0,
                slot: 0
            }
        );
        assert_eq!(
            cls.storage(binding(&c, inner, "b")),
            Storage::LexicalSlot {
                frame_depth: 1,
                slot: 0
            }
        );
        let arrow_scope = c.table.scope(inner).children[0];
        assert_eq!(cls.chain_top(arrow_scope), Some(1));
    }

    #[test]
    fn test_catch_param_capture_behaves_like_block() {
        let program = script(vec![try_(
            vec![],
            Some((Some("e"), vec![expr(arrow(&[], ident("e")))])),
            None,
        )]);
        let (c, cls) = run(&program);
        let catch = c.table.scope(c.table.root()).children[1];
        assert!(cls.has_frame(catch));
        assert!(cls.is_captured(binding(&c, catch, "e")));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let program = script(vec![for_let(
            "i",
            num(0.0),
            None,
            None,
            block(vec![var("v", None), expr(arrow(&[], ident("i")))]),
        )]);
        let options = CompilerOptions::default();
        let c = collect(&program, ScopeKind::Global, &options).unwrap();
        let first = classify(&c.table, &c.references, &options).unwrap();
        let second = classify(&c.table, &c.references, &options).unwrap();
        assert_eq!(first, second);
        for b in c.table.binding_ids() {
            assert_eq!(first.storage(b), second.storage(b));
        }
    }

    #[test]
    fn test_register_limit() {
        let options = CompilerOptions {
            max_registers: 1,
            ..CompilerOptions::default()
        };
        let program = script(vec![var("a", None), var("b", None)]);
        let c = collect(&program, ScopeKind::Global, &options).unwrap();
        let err = classify(&c.table, &c.references, &options).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::LimitExceeded { what: "registers", .. }));
    }
}
