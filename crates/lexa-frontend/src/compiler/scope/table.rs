// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The static scope table.
//!
//! Scopes and bindings live in flat arrays indexed by [`ScopeId`] and
//! [`BindingId`]. Parents are stored as ids, never as owning pointers. All
//! mutation happens on [`ScopeTableBuilder`]; [`ScopeTableBuilder::finish`]
//! produces the read-only [`ScopeTable`] consumed by later passes.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::ast::SourceLocation;
use crate::error::{ErrorKind, Phase, Result};

/// Identifies a scope in a [`ScopeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// Index into the scope array.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a binding in a [`ScopeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId(pub u32);

impl BindingId {
    /// Index into the binding array.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of lexical block a scope represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// Script top level
    Global,
    /// Function body, including parameters
    Function,
    /// Block statement or switch body
    Block,
    /// Head of a for, for-in or for-of loop
    Loop,
    /// Catch clause, parameter and body
    Catch,
    /// Finally body
    Finally,
    /// Module top level
    Module,
}

impl ScopeKind {
    /// Whether `var` and function declarations hoist to this scope.
    pub fn is_function_level(self) -> bool {
        matches!(self, ScopeKind::Global | ScopeKind::Function | ScopeKind::Module)
    }
}

/// How a binding was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// Catch clause parameter
    CatchParam,
    /// Function parameter
    Param,
    /// Function declaration
    Function,
    /// Name of a named function expression, visible in its own body
    SelfName,
}

impl BindingKind {
    /// Whether assignment after initialization is a `TypeError`.
    pub fn is_immutable(self) -> bool {
        matches!(self, BindingKind::Const | BindingKind::SelfName)
    }

    /// Whether the binding is block scoped.
    pub fn is_lexical(self) -> bool {
        matches!(self, BindingKind::Let | BindingKind::Const)
    }
}

/// A declared name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Binding {
    /// The declared name
    pub name: String,
    /// Declared kind
    pub kind: BindingKind,
    /// Scope that owns the binding
    pub scope: ScopeId,
    /// Location of the first declaration
    pub loc: SourceLocation,
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct Scope {
    /// The kind of block
    pub kind: ScopeKind,
    /// Enclosing scope (None only for the root)
    pub parent: Option<ScopeId>,
    /// Nearest function-level scope, itself for Function/Global/Module
    pub function: ScopeId,
    /// Child scopes in traversal order
    pub children: Vec<ScopeId>,
    /// For loop scopes, the scope of the loop body block
    pub loop_body: Option<ScopeId>,
    /// Bindings in declaration order
    bindings: Vec<BindingId>,
    names: FxHashMap<String, BindingId>,
    /// Names of `var` declarations hoisted through or into this scope
    var_names: FxHashSet<String>,
    closed: bool,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, function: ScopeId) -> Self {
        Self {
            kind,
            parent,
            function,
            children: Vec::new(),
            loop_body: None,
            bindings: Vec::new(),
            names: FxHashMap::default(),
            var_names: FxHashSet::default(),
            closed: false,
        }
    }

    /// Bindings owned by this scope in declaration order.
    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    /// Looks up a name declared directly in this scope.
    pub fn get(&self, name: &str) -> Option<BindingId> {
        self.names.get(name).copied()
    }
}

/// Result of resolving a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A declared binding
    Binding(BindingId),
    /// Not declared anywhere; a property of the global object
    Global,
}

/// An identifier occurrence recorded by the collector.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Scope in which the identifier appears
    pub scope: ScopeId,
    /// The referenced name
    pub name: String,
    /// Where it appears
    pub loc: SourceLocation,
}

fn resolve_in(scopes: &[Scope], mut scope: ScopeId, name: &str) -> Resolution {
    loop {
        let s = &scopes[scope.index()];
        if let Some(binding) = s.get(name) {
            return Resolution::Binding(binding);
        }
        match s.parent {
            Some(parent) => scope = parent,
            None => return Resolution::Global,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Mutable scope table used during collection.
#[derive(Debug)]
pub struct ScopeTableBuilder {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
    current: ScopeId,
}

impl ScopeTableBuilder {
    /// Creates a builder with a root scope of the given kind.
    pub fn new(root: ScopeKind) -> Self {
        let id = ScopeId(0);
        Self {
            scopes: vec![Scope::new(root, None, id)],
            bindings: Vec::new(),
            current: id,
        }
    }

    /// The root scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// The innermost open scope.
    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Kind of a scope.
    pub fn kind(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope.index()].kind
    }

    /// Opens a child scope of the current scope and makes it current.
    pub fn enter_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = self.current;
        let id = ScopeId(self.scopes.len() as u32);
        let function = if kind.is_function_level() {
            id
        } else {
            self.scopes[parent.index()].function
        };
        self.scopes.push(Scope::new(kind, Some(parent), function));
        self.scopes[parent.index()].children.push(id);
        self.current = id;
        tracing::trace!(scope = %id, ?kind, parent = %parent, "enter scope");
        id
    }

    /// Closes the current scope, which must be `scope`.
    pub fn exit_scope(&mut self, scope: ScopeId) -> Result<()> {
        if scope != self.current {
            return Err(ErrorKind::internal(
                Phase::Collect,
                Some(scope),
                format!("exit of {} while {} is open", scope, self.current),
            )
            .into());
        }
        let s = &mut self.scopes[scope.index()];
        s.closed = true;
        tracing::trace!(scope = %scope, bindings = s.bindings.len(), "exit scope");
        if let Some(parent) = s.parent {
            self.current = parent;
        }
        Ok(())
    }

    /// Records the body block of a loop scope.
    pub fn set_loop_body(&mut self, loop_scope: ScopeId, body: ScopeId) {
        self.scopes[loop_scope.index()].loop_body = Some(body);
    }

    /// Declares `name` for a declaration appearing in `scope`.
    ///
    /// `var` and function declarations are placed in the nearest
    /// function-level scope; everything else is placed in `scope` itself.
    /// Re-declarations that ECMAScript permits return the existing binding.
    pub fn declare_binding(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        loc: SourceLocation,
    ) -> Result<BindingId> {
        if self.scopes[scope.index()].closed {
            return Err(ErrorKind::internal(
                Phase::Collect,
                Some(scope),
                format!("declaration of '{}' in a closed scope", name),
            )
            .into());
        }
        match kind {
            BindingKind::Var | BindingKind::Function => self.declare_hoisted(scope, name, kind, loc),
            _ => self.declare_lexical(scope, name, kind, loc),
        }
    }

    fn duplicate(name: &str, loc: SourceLocation) -> crate::error::CompileError {
        ErrorKind::DuplicateBinding {
            name: name.to_string(),
        }
        .at(loc)
    }

    fn declare_lexical(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        loc: SourceLocation,
    ) -> Result<BindingId> {
        let s = &self.scopes[scope.index()];
        if let Some(existing) = s.get(name) {
            if self.bindings[existing.index()].kind != BindingKind::SelfName {
                return Err(Self::duplicate(name, loc));
            }
        }
        if s.var_names.contains(name) {
            return Err(Self::duplicate(name, loc));
        }
        Ok(self.insert(scope, name, kind, loc))
    }

    fn declare_hoisted(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: BindingKind,
        loc: SourceLocation,
    ) -> Result<BindingId> {
        // Walk up to the hoisting target, checking each scope passed through.
        let mut cursor = scope;
        loop {
            let s = &self.scopes[cursor.index()];
            if s.kind.is_function_level() {
                break;
            }
            if let Some(existing) = s.get(name) {
                let existing_kind = self.bindings[existing.index()].kind;
                let allowed = existing_kind == BindingKind::CatchParam && kind == BindingKind::Var;
                if !allowed {
                    return Err(Self::duplicate(name, loc));
                }
            }
            if kind == BindingKind::Var {
                self.scopes[cursor.index()].var_names.insert(name.to_string());
            }
            match self.scopes[cursor.index()].parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }

        let target = cursor;
        if kind == BindingKind::Var {
            self.scopes[target.index()].var_names.insert(name.to_string());
        }
        if let Some(existing) = self.scopes[target.index()].get(name) {
            let binding = &mut self.bindings[existing.index()];
            match binding.kind {
                BindingKind::Let | BindingKind::Const => return Err(Self::duplicate(name, loc)),
                BindingKind::SelfName => {}
                BindingKind::Var if kind == BindingKind::Function => {
                    binding.kind = BindingKind::Function;
                    return Ok(existing);
                }
                _ => return Ok(existing),
            }
        }
        Ok(self.insert(target, name, kind, loc))
    }

    fn insert(&mut self, scope: ScopeId, name: &str, kind: BindingKind, loc: SourceLocation) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Binding {
            name: name.to_string(),
            kind,
            scope,
            loc,
        });
        let s = &mut self.scopes[scope.index()];
        s.bindings.push(id);
        s.names.insert(name.to_string(), id);
        tracing::trace!(scope = %scope, name, ?kind, "declare binding");
        id
    }

    /// Resolves a name against the scopes declared so far.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Resolution {
        resolve_in(&self.scopes, scope, name)
    }

    /// Freezes the table.
    pub fn finish(self) -> Result<ScopeTable> {
        if self.current != ScopeId(0) {
            return Err(ErrorKind::internal(
                Phase::Collect,
                Some(self.current),
                "scope left open at end of collection",
            )
            .into());
        }
        Ok(ScopeTable {
            scopes: self.scopes,
            bindings: self.bindings,
        })
    }
}

// ============================================================================
// Frozen table
// ============================================================================

/// Immutable scope table produced by the collector.
#[derive(Debug, Clone)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
    bindings: Vec<Binding>,
}

impl ScopeTable {
    /// The root scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Looks up a scope.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Looks up a binding.
    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.index()]
    }

    /// Number of scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Number of bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// All scope ids in creation order (parents before children).
    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        (0..self.scopes.len() as u32).map(ScopeId)
    }

    /// All binding ids in declaration order.
    pub fn binding_ids(&self) -> impl Iterator<Item = BindingId> + '_ {
        (0..self.bindings.len() as u32).map(BindingId)
    }

    /// Resolves `name` starting at `scope`, walking parents.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Resolution {
        resolve_in(&self.scopes, scope, name)
    }

    /// Whether `ancestor` is `scope` or encloses it.
    pub fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.scope(id).parent;
        }
        false
    }

    /// Number of function boundaries between `scope` and the root.
    pub fn function_depth(&self, scope: ScopeId) -> u32 {
        let mut depth = 0;
        let mut function = self.scope(scope).function;
        while let Some(parent) = self.scope(function).parent {
            depth += 1;
            function = self.scope(parent).function;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn test_resolve_walks_parents() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let root = b.root();
        let x = b.declare_binding(root, "x", BindingKind::Let, loc()).unwrap();
        let block = b.enter_scope(ScopeKind::Block);
        assert_eq!(b.resolve(block, "x"), Resolution::Binding(x));
        assert_eq!(b.resolve(block, "nope"), Resolution::Global);
        b.exit_scope(block).unwrap();
        let table = b.finish().unwrap();
        assert_eq!(table.resolve(block, "x"), Resolution::Binding(x));
        assert_eq!(table.scope(block).parent, Some(root));
        assert_eq!(table.scope(root).children, vec![block]);
    }

    #[test]
    fn test_let_redeclaration_is_duplicate() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let root = b.root();
        b.declare_binding(root, "x", BindingKind::Let, loc()).unwrap();
        let err = b.declare_binding(root, "x", BindingKind::Let, loc()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateBinding { ref name } if name == "x"));
    }

    #[test]
    fn test_var_redeclaration_reuses_binding() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let root = b.root();
        let a = b.declare_binding(root, "x", BindingKind::Var, loc()).unwrap();
        let c = b.declare_binding(root, "x", BindingKind::Var, loc()).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_var_hoists_out_of_blocks() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let root = b.root();
        let block = b.enter_scope(ScopeKind::Block);
        let inner = b.enter_scope(ScopeKind::Block);
        let x = b.declare_binding(inner, "x", BindingKind::Var, loc()).unwrap();
        b.exit_scope(inner).unwrap();
        b.exit_scope(block).unwrap();
        let table = b.finish().unwrap();
        assert_eq!(table.binding(x).scope, root);
        assert!(table.scope(inner).bindings().is_empty());
    }

    #[test]
    fn test_var_conflicts_with_enclosing_let() {
        // { let x; { var x; } }
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let block = b.enter_scope(ScopeKind::Block);
        b.declare_binding(block, "x", BindingKind::Let, loc()).unwrap();
        let inner = b.enter_scope(ScopeKind::Block);
        let err = b.declare_binding(inner, "x", BindingKind::Var, loc()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateBinding { .. }));
    }

    #[test]
    fn test_let_after_hoisted_var_conflicts() {
        // { var x; let x; }
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let block = b.enter_scope(ScopeKind::Block);
        b.declare_binding(block, "x", BindingKind::Var, loc()).unwrap();
        assert!(b.declare_binding(block, "x", BindingKind::Let, loc()).is_err());
    }

    #[test]
    fn test_var_may_share_catch_param() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let catch = b.enter_scope(ScopeKind::Catch);
        b.declare_binding(catch, "e", BindingKind::CatchParam, loc()).unwrap();
        assert!(b.declare_binding(catch, "e", BindingKind::Var, loc()).is_ok());
        assert!(b.declare_binding(catch, "e", BindingKind::Let, loc()).is_err());
    }

    #[test]
    fn test_var_may_share_param() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let f = b.enter_scope(ScopeKind::Function);
        let p = b.declare_binding(f, "a", BindingKind::Param, loc()).unwrap();
        assert_eq!(b.declare_binding(f, "a", BindingKind::Var, loc()).unwrap(), p);
        assert!(b.declare_binding(f, "a", BindingKind::Let, loc()).is_err());
    }

    #[test]
    fn test_function_replaces_var() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let root = b.root();
        let v = b.declare_binding(root, "f", BindingKind::Var, loc()).unwrap();
        let f = b.declare_binding(root, "f", BindingKind::Function, loc()).unwrap();
        assert_eq!(v, f);
        let table = b.finish().unwrap();
        assert_eq!(table.binding(f).kind, BindingKind::Function);
    }

    #[test]
    fn test_self_name_is_shadowable() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let f = b.enter_scope(ScopeKind::Function);
        let own = b.declare_binding(f, "g", BindingKind::SelfName, loc()).unwrap();
        let param = b.declare_binding(f, "g", BindingKind::Param, loc()).unwrap();
        assert_ne!(own, param);
        assert_eq!(b.resolve(f, "g"), Resolution::Binding(param));
    }

    #[test]
    fn test_function_level_tracking() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Module);
        let root = b.root();
        let block = b.enter_scope(ScopeKind::Block);
        let f = b.enter_scope(ScopeKind::Function);
        let inner = b.enter_scope(ScopeKind::Loop);
        b.exit_scope(inner).unwrap();
        b.exit_scope(f).unwrap();
        b.exit_scope(block).unwrap();
        let table = b.finish().unwrap();
        assert_eq!(table.scope(block).function, root);
        assert_eq!(table.scope(inner).function, f);
        assert_eq!(table.function_depth(inner), 1);
        assert_eq!(table.function_depth(block), 0);
        assert!(table.is_ancestor(root, inner));
        assert!(!table.is_ancestor(inner, root));
    }

    #[test]
    fn test_mismatched_exit_is_internal() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        let outer = b.enter_scope(ScopeKind::Block);
        let _inner = b.enter_scope(ScopeKind::Block);
        let err = b.exit_scope(outer).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_finish_with_open_scope_fails() {
        let mut b = ScopeTableBuilder::new(ScopeKind::Global);
        b.enter_scope(ScopeKind::Block);
        assert!(b.finish().unwrap_err().is_internal());
    }
}
