// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lexical environment frames.
//!
//! A frame exists for every scope that owns at least one captured binding.
//! At runtime the frames form a chain; code running in a scope sees the
//! frames of all frame-bearing scopes that enclose it, innermost first.
//! Access to a slot is expressed as `(hops, slot)` where `hops` counts the
//! frame-bearing scopes between the use site and the owning frame.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Phase, Result};

use super::classify::{Classification, Storage};
use super::table::{BindingId, BindingKind, ScopeId, ScopeKind, ScopeTable};

/// Identifies a frame in [`LexicalEnvironments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u32);

/// A lexical environment frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Owning scope
    pub scope: ScopeId,
    /// Enclosing frame
    pub parent: Option<FrameId>,
    /// Absolute depth in the static chain (0 for the outermost frame)
    pub depth: u32,
    /// Captured bindings in slot order
    pub slots: Vec<BindingId>,
}

/// Frame layout for a classified scope table.
pub struct LexicalEnvironments<'a> {
    table: &'a ScopeTable,
    classification: &'a Classification,
    frames: Vec<Frame>,
    scope_frames: Vec<Option<FrameId>>,
}

impl<'a> LexicalEnvironments<'a> {
    /// Builds frames for every scope with captured bindings.
    pub fn build(table: &'a ScopeTable, classification: &'a Classification) -> Result<Self> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut scope_frames: Vec<Option<FrameId>> = vec![None; table.scope_count()];
        // Nearest enclosing frame per scope.
        let mut enclosing: Vec<Option<FrameId>> = vec![None; table.scope_count()];

        for scope in table.scope_ids() {
            let inherited = table.scope(scope).parent.and_then(|p| enclosing[p.index()]);
            if !classification.has_frame(scope) {
                enclosing[scope.index()] = inherited;
                continue;
            }
            let slots: Vec<BindingId> = table
                .scope(scope)
                .bindings()
                .iter()
                .copied()
                .filter(|b| classification.is_captured(*b))
                .collect();
            let depth = inherited.map_or(0, |p| frames[p.0 as usize].depth + 1);
            if Some(depth) != classification.chain_top(scope) {
                return Err(ErrorKind::internal(
                    Phase::Environment,
                    Some(scope),
                    "frame depth disagrees with classification",
                )
                .into());
            }
            let id = FrameId(frames.len() as u32);
            tracing::trace!(scope = %scope, depth, slots = slots.len(), "allocate frame");
            frames.push(Frame {
                scope,
                parent: inherited,
                depth,
                slots,
            });
            scope_frames[scope.index()] = Some(id);
            enclosing[scope.index()] = Some(id);
        }

        Ok(Self {
            table,
            classification,
            frames,
            scope_frames,
        })
    }

    /// All frames, parents first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Looks up a frame.
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    /// The frame owned by `scope`, if any.
    pub fn frame_for(&self, scope: ScopeId) -> Option<FrameId> {
        self.scope_frames[scope.index()]
    }

    /// Number of captured slots owned by `scope`.
    pub fn slot_count(&self, scope: ScopeId) -> u32 {
        self.classification.frame_slot_count(scope)
    }

    /// Slot index of a captured binding.
    pub fn slot_for(&self, binding: BindingId) -> Result<u32> {
        match self.classification.storage(binding) {
            Storage::LexicalSlot { slot, .. } => Ok(slot),
            Storage::Register(_) => Err(ErrorKind::internal(
                Phase::Environment,
                Some(self.table.binding(binding).scope),
                format!("'{}' is not stored in a frame", self.table.binding(binding).name),
            )
            .into()),
        }
    }

    /// Frames visible from code running in `scope`.
    pub fn active_frames(&self, scope: ScopeId) -> u32 {
        self.classification.chain_top(scope).map_or(0, |d| d + 1)
    }

    /// Number of frame hops from `from` to the frame owned by `to`.
    pub fn chain_depth(&self, from: ScopeId, to: ScopeId) -> Result<u32> {
        let Some(target) = self.frame_for(to) else {
            return Err(ErrorKind::internal(
                Phase::Environment,
                Some(to),
                format!("chain depth requested to scope {} which has no frame", to),
            )
            .into());
        };
        if !self.table.is_ancestor(to, from) {
            return Err(ErrorKind::internal(
                Phase::Environment,
                Some(from),
                format!("scope {} does not enclose {}", to, from),
            )
            .into());
        }
        Ok(self.active_frames(from) - (self.frame(target).depth + 1))
    }

    /// Whether each iteration of the loop needs its own environment.
    pub fn requires_fresh_frame(&self, loop_scope: ScopeId) -> bool {
        let s = self.table.scope(loop_scope);
        if s.kind != ScopeKind::Loop {
            return false;
        }
        self.frame_for(loop_scope).is_some() || s.loop_body.is_some_and(|body| self.frame_for(body).is_some())
    }

    /// Public captured-slot table.
    pub fn layout(&self, debug_names: bool) -> ScopeLayout {
        let frames = self
            .frames
            .iter()
            .map(|frame| FrameLayout {
                scope: frame.scope,
                kind: self.table.scope(frame.scope).kind,
                depth: frame.depth,
                parent: frame.parent.map(|p| p.0),
                slots: frame
                    .slots
                    .iter()
                    .enumerate()
                    .map(|(i, b)| {
                        let binding = self.table.binding(*b);
                        SlotLayout {
                            slot: i as u32,
                            kind: binding.kind,
                            name: debug_names.then(|| binding.name.clone()),
                        }
                    })
                    .collect(),
            })
            .collect();
        ScopeLayout { frames }
    }
}

/// Captured-slot table emitted with the compiled program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeLayout {
    /// Frames, parents first
    pub frames: Vec<FrameLayout>,
}

impl ScopeLayout {
    /// Finds the frame owned by `scope`.
    pub fn frame_of(&self, scope: ScopeId) -> Option<&FrameLayout> {
        self.frames.iter().find(|f| f.scope == scope)
    }
}

/// One frame in a [`ScopeLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Owning scope
    pub scope: ScopeId,
    /// Kind of the owning scope
    pub kind: ScopeKind,
    /// Absolute chain depth
    pub depth: u32,
    /// Index of the parent frame
    pub parent: Option<u32>,
    /// Slots in order
    pub slots: Vec<SlotLayout>,
}

/// One slot in a [`FrameLayout`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotLayout {
    /// Slot index
    pub slot: u32,
    /// Declared kind of the binding
    pub kind: BindingKind,
    /// Binding name, kept only with debug names enabled
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinaryOperator, Program};
    use crate::compiler::scope::classify::classify;
    use crate::compiler::scope::collector::{Collected, collect};
    use crate::options::CompilerOptions;

    fn analyze(program: &Program) -> (Collected, Classification) {
        let options = CompilerOptions::default();
        let c = collect(program, ScopeKind::Global, &options).unwrap();
        let cls = classify(&c.table, &c.references, &options).unwrap();
        (c, cls)
    }

    #[test]
    fn test_frames_only_for_captured_scopes() {
        // let a; { let b; } { let c; () => c; }
        let program = script(vec![
            let_("a", None),
            block(vec![let_("b", None)]),
            block(vec![let_("c", None), expr(arrow(&[], ident("c")))]),
        ]);
        let (c, cls) = analyze(&program);
        let env = LexicalEnvironments::build(&c.table, &cls).unwrap();
        let root = c.table.root();
        let children = &c.table.scope(root).children;
        assert!(env.frame_for(root).is_none());
        assert!(env.frame_for(children[0]).is_none());
        let frame = env.frame_for(children[1]).unwrap();
        assert_eq!(env.frame(frame).depth, 0);
        assert_eq!(env.frames().len(), 1);
    }

    #[test]
    fn test_chain_depth_skips_frameless_scopes() {
        // let a; { { let b; () => a + b; } }
        let program = script(vec![
            let_("a", None),
            block(vec![block(vec![
                let_("b", None),
                expr(arrow(&[], binary(BinaryOperator::Add, ident("a"), ident("b")))),
            ])]),
        ]);
        let (c, cls) = analyze(&program);
        let env = LexicalEnvironments::build(&c.table, &cls).unwrap();
        let root = c.table.root();
        let middle = c.table.scope(root).children[0];
        let inner = c.table.scope(middle).children[0];
        let arrow_scope = c.table.scope(inner).children[0];

        assert_eq!(env.chain_depth(inner, inner).unwrap(), 0);
        assert_eq!(env.chain_depth(inner, root).unwrap(), 1);
        assert_eq!(env.chain_depth(arrow_scope, root).unwrap(), 1);
        assert_eq!(env.chain_depth(middle, root).unwrap(), 0);
        assert!(env.chain_depth(inner, middle).unwrap_err().is_internal());
        assert!(env.chain_depth(root, inner).unwrap_err().is_internal());
    }

    #[test]
    fn test_slot_for_register_is_internal_error() {
        let program = script(vec![let_("a", None)]);
        let (c, cls) = analyze(&program);
        let env = LexicalEnvironments::build(&c.table, &cls).unwrap();
        let a = c.table.scope(c.table.root()).get("a").unwrap();
        assert!(env.slot_for(a).unwrap_err().is_internal());
    }

    #[test]
    fn test_requires_fresh_frame() {
        // for (let i = 0;;) { () => i; }   for (let j = 0;;) { let k; () => k; }   for (var v = 0;;) {}
        let program = script(vec![
            for_let("i", num(0.0), None, None, block(vec![expr(arrow(&[], ident("i")))])),
            for_let(
                "j",
                num(0.0),
                None,
                None,
                block(vec![let_("k", None), expr(arrow(&[], ident("k")))]),
            ),
            for_decl(crate::ast::VariableKind::Var, "v", num(0.0), None, None, block(vec![])),
        ]);
        let (c, cls) = analyze(&program);
        let env = LexicalEnvironments::build(&c.table, &cls).unwrap();
        let loops = &c.table.scope(c.table.root()).children;
        assert!(env.requires_fresh_frame(loops[0]));
        assert!(env.requires_fresh_frame(loops[1]));
        assert!(env.frame_for(loops[1]).is_none());
        assert!(!env.requires_fresh_frame(loops[2]));
    }

    #[test]
    fn test_layout_names_follow_option() {
        let program = script(vec![let_("x", None), expr(arrow(&[], ident("x")))]);
        let (c, cls) = analyze(&program);
        let env = LexicalEnvironments::build(&c.table, &cls).unwrap();

        let plain = env.layout(false);
        assert_eq!(plain.frames.len(), 1);
        assert_eq!(plain.frames[0].slots[0].name, None);

        let named = env.layout(true);
        assert_eq!(named.frames[0].slots[0].name.as_deref(), Some("x"));
        assert_eq!(named.frames[0].slots[0].kind, BindingKind::Let);
        assert!(named.frame_of(c.table.root()).is_some());
    }
}
