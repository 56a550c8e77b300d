// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Scope collection (pass 1).
//!
//! A single top-down walk that builds the scope tree, declares every binding
//! and records each identifier occurrence together with the scope it appears
//! in. Child scopes are opened in exactly the order the emitter later visits
//! them, which is what lets the emitter find its scopes by position.

use crate::ast::*;
use crate::error::{ErrorKind, Result};
use crate::options::CompilerOptions;

use super::table::{BindingKind, Reference, ScopeKind, ScopeTable, ScopeTableBuilder};

/// Output of the collection pass.
#[derive(Debug, Clone)]
pub struct Collected {
    /// The frozen scope tree
    pub table: ScopeTable,
    /// Every identifier occurrence in traversal order
    pub references: Vec<Reference>,
}

/// Walks a program and builds its scope table.
pub struct ScopeCollector<'o> {
    builder: ScopeTableBuilder,
    references: Vec<Reference>,
    function_depth: u32,
    options: &'o CompilerOptions,
}

impl<'o> ScopeCollector<'o> {
    /// Creates a collector whose root scope has the given kind.
    pub fn new(root: ScopeKind, options: &'o CompilerOptions) -> Self {
        Self {
            builder: ScopeTableBuilder::new(root),
            references: Vec::new(),
            function_depth: 0,
            options,
        }
    }

    /// Collects a whole program.
    #[tracing::instrument(level = "debug", skip_all, fields(statements = program.body.len()))]
    pub fn collect(mut self, program: &Program) -> Result<Collected> {
        self.visit_list(&program.body)?;
        let table = self.builder.finish()?;
        tracing::debug!(
            scopes = table.scope_count(),
            bindings = table.binding_count(),
            references = self.references.len(),
            "scope collection finished"
        );
        Ok(Collected {
            table,
            references: self.references,
        })
    }

    fn declare(&mut self, id: &Identifier, kind: BindingKind) -> Result<()> {
        let scope = self.builder.current();
        self.builder.declare_binding(scope, &id.name, kind, id.loc)?;
        Ok(())
    }

    fn reference(&mut self, id: &Identifier) {
        self.references.push(Reference {
            scope: self.builder.current(),
            name: id.name.clone(),
            loc: id.loc,
        });
    }

    fn visit_list(&mut self, statements: &[Statement]) -> Result<()> {
        for stmt in hoisting_order(statements) {
            self.visit_statement(stmt)?;
        }
        Ok(())
    }

    fn visit_block(&mut self, block: &BlockStatement) -> Result<()> {
        let scope = self.builder.enter_scope(ScopeKind::Block);
        self.visit_list(&block.body)?;
        self.builder.exit_scope(scope)
    }

    fn visit_declaration(&mut self, decl: &VariableDeclaration) -> Result<()> {
        let kind = match decl.kind {
            VariableKind::Var => BindingKind::Var,
            VariableKind::Let => BindingKind::Let,
            VariableKind::Const => BindingKind::Const,
        };
        for declarator in &decl.declarations {
            self.declare(&declarator.id, kind)?;
            if let Some(init) = &declarator.init {
                self.visit_expression(init)?;
            }
        }
        Ok(())
    }

    /// Visits a loop body; a block body becomes the loop's body scope.
    fn visit_loop_body(&mut self, loop_scope: super::ScopeId, body: &Statement) -> Result<()> {
        if let Statement::Block(block) = body {
            let scope = self.builder.enter_scope(ScopeKind::Block);
            self.builder.set_loop_body(loop_scope, scope);
            self.visit_list(&block.body)?;
            self.builder.exit_scope(scope)
        } else {
            self.visit_statement(body)
        }
    }

    fn visit_statement(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::VariableDeclaration(decl) => self.visit_declaration(decl),
            Statement::FunctionDeclaration(func) => {
                self.declare(&func.id, BindingKind::Function)?;
                self.visit_function(func.as_node())
            }
            Statement::Expression(expr_stmt) => self.visit_expression(&expr_stmt.expression),
            Statement::Block(block) => self.visit_block(block),
            Statement::If(if_stmt) => {
                self.visit_expression(&if_stmt.test)?;
                self.visit_statement(&if_stmt.consequent)?;
                if let Some(alt) = &if_stmt.alternate {
                    self.visit_statement(alt)?;
                }
                Ok(())
            }
            Statement::Switch(switch) => {
                self.visit_expression(&switch.discriminant)?;
                let scope = self.builder.enter_scope(ScopeKind::Block);
                // Case bodies share one statement list for hoisting purposes.
                for case in &switch.cases {
                    for func in case.consequent.iter().filter_map(Statement::as_function_declaration) {
                        self.declare(&func.id, BindingKind::Function)?;
                        self.visit_function(func.as_node())?;
                    }
                }
                for case in &switch.cases {
                    if let Some(test) = &case.test {
                        self.visit_expression(test)?;
                    }
                }
                for case in &switch.cases {
                    for s in case.consequent.iter().filter(|s| s.as_function_declaration().is_none()) {
                        self.visit_statement(s)?;
                    }
                }
                self.builder.exit_scope(scope)
            }
            Statement::While(while_stmt) => {
                self.visit_expression(&while_stmt.test)?;
                self.visit_statement(&while_stmt.body)
            }
            Statement::DoWhile(do_while) => {
                self.visit_statement(&do_while.body)?;
                self.visit_expression(&do_while.test)
            }
            Statement::For(for_stmt) => {
                let scope = self.builder.enter_scope(ScopeKind::Loop);
                match &for_stmt.init {
                    Some(ForInit::Declaration(decl)) => self.visit_declaration(decl)?,
                    Some(ForInit::Expression(expr)) => self.visit_expression(expr)?,
                    None => {}
                }
                if let Some(test) = &for_stmt.test {
                    self.visit_expression(test)?;
                }
                self.visit_loop_body(scope, &for_stmt.body)?;
                if let Some(update) = &for_stmt.update {
                    self.visit_expression(update)?;
                }
                self.builder.exit_scope(scope)
            }
            Statement::ForIn(ForInStatement { left, right, body })
            | Statement::ForOf(ForOfStatement { left, right, body }) => {
                self.visit_expression(right)?;
                let scope = self.builder.enter_scope(ScopeKind::Loop);
                match left {
                    ForInLeft::Declaration(decl) => {
                        let kind = match decl.kind {
                            VariableKind::Var => BindingKind::Var,
                            VariableKind::Let => BindingKind::Let,
                            VariableKind::Const => BindingKind::Const,
                        };
                        for declarator in &decl.declarations {
                            self.declare(&declarator.id, kind)?;
                        }
                    }
                    ForInLeft::Expression(expr) => self.visit_expression(expr)?,
                }
                self.visit_loop_body(scope, body)?;
                self.builder.exit_scope(scope)
            }
            Statement::Return(ret) => {
                if self.function_depth == 0 {
                    return Err(ErrorKind::IllegalReturn.at(ret.loc));
                }
                if let Some(arg) = &ret.argument {
                    self.visit_expression(arg)?;
                }
                Ok(())
            }
            Statement::Throw(throw) => self.visit_expression(&throw.argument),
            Statement::Try(try_stmt) => {
                self.visit_block(&try_stmt.block)?;
                if let Some(handler) = &try_stmt.handler {
                    let scope = self.builder.enter_scope(ScopeKind::Catch);
                    if let Some(param) = &handler.param {
                        self.declare(param, BindingKind::CatchParam)?;
                    }
                    self.visit_list(&handler.body.body)?;
                    self.builder.exit_scope(scope)?;
                }
                if let Some(finalizer) = &try_stmt.finalizer {
                    let scope = self.builder.enter_scope(ScopeKind::Finally);
                    self.visit_list(&finalizer.body)?;
                    self.builder.exit_scope(scope)?;
                }
                Ok(())
            }
            Statement::Labeled(labeled) => self.visit_statement(&labeled.body),
            Statement::Break(_) | Statement::Continue(_) | Statement::Debugger | Statement::Empty => Ok(()),
        }
    }

    fn visit_function(&mut self, func: FunctionNode<'_>) -> Result<()> {
        if self.function_depth >= self.options.max_function_depth {
            return Err(ErrorKind::LimitExceeded {
                what: "nested functions",
                limit: self.options.max_function_depth,
            }
            .into());
        }
        self.function_depth += 1;
        let scope = self.builder.enter_scope(ScopeKind::Function);
        tracing::trace!(scope = %scope, name = func.display_name(), "collect function");
        if let Some(name) = func.self_name {
            self.declare(name, BindingKind::SelfName)?;
        }
        for param in func.params {
            self.declare(param, BindingKind::Param)?;
        }
        match func.body {
            FunctionBodyRef::Statements(body) => self.visit_list(body)?,
            FunctionBodyRef::Expression(expr) => self.visit_expression(expr)?,
        }
        self.builder.exit_scope(scope)?;
        self.function_depth -= 1;
        Ok(())
    }

    fn visit_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Literal(_) => Ok(()),
            Expression::Identifier(id) => {
                self.reference(id);
                Ok(())
            }
            Expression::Array(array) => {
                for element in array.elements.iter().flatten() {
                    self.visit_expression(element)?;
                }
                Ok(())
            }
            Expression::Object(object) => {
                for prop in &object.properties {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.visit_expression(key)?;
                    }
                    self.visit_expression(&prop.value)?;
                }
                Ok(())
            }
            Expression::Binary(bin) => {
                self.visit_expression(&bin.left)?;
                self.visit_expression(&bin.right)
            }
            Expression::Unary(unary) => self.visit_expression(&unary.argument),
            Expression::Assignment(assign) => {
                self.visit_expression(&assign.left)?;
                self.visit_expression(&assign.right)
            }
            Expression::Call(call) => {
                self.visit_expression(&call.callee)?;
                for arg in &call.arguments {
                    self.visit_expression(arg)?;
                }
                Ok(())
            }
            Expression::New(new) => {
                self.visit_expression(&new.callee)?;
                for arg in &new.arguments {
                    self.visit_expression(arg)?;
                }
                Ok(())
            }
            Expression::Member(member) => {
                self.visit_expression(&member.object)?;
                if let MemberProperty::Expression(prop) = &member.property {
                    self.visit_expression(prop)?;
                }
                Ok(())
            }
            Expression::Conditional(cond) => {
                self.visit_expression(&cond.test)?;
                self.visit_expression(&cond.consequent)?;
                self.visit_expression(&cond.alternate)
            }
            Expression::Function(func) => self.visit_function(func.as_node()),
            Expression::Arrow(arrow) => self.visit_function(arrow.as_node()),
            Expression::Update(update) => self.visit_expression(&update.argument),
            Expression::Sequence(seq) => {
                for e in &seq.expressions {
                    self.visit_expression(e)?;
                }
                Ok(())
            }
        }
    }
}

/// Runs the collection pass over `program`.
pub fn collect(program: &Program, root: ScopeKind, options: &CompilerOptions) -> Result<Collected> {
    ScopeCollector::new(root, options).collect(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::compiler::scope::{Resolution, ScopeId};

    fn collect_ok(body: Vec<Statement>) -> Collected {
        collect(&script(body), ScopeKind::Global, &CompilerOptions::default()).unwrap()
    }

    #[test]
    fn test_block_and_loop_scopes() {
        // for (let i = 0; i < 3; i++) { let x = i; }
        let c = collect_ok(vec![for_let(
            "i",
            num(0.0),
            Some(binary(BinaryOperator::LessThan, ident("i"), num(3.0))),
            Some(incr("i")),
            block(vec![let_("x", Some(ident("i")))]),
        )]);
        let table = &c.table;
        let root = table.root();
        let loop_scope = table.scope(root).children[0];
        assert_eq!(table.scope(loop_scope).kind, ScopeKind::Loop);
        let body = table.scope(loop_scope).loop_body.unwrap();
        assert_eq!(table.scope(body).kind, ScopeKind::Block);
        assert!(table.scope(loop_scope).get("i").is_some());
        assert!(table.scope(body).get("x").is_some());
        assert_eq!(c.references.len(), 3);
    }

    #[test]
    fn test_function_declarations_visited_first() {
        // x; function f() {}
        let c = collect_ok(vec![expr(ident("x")), function("f", &[], vec![])]);
        let root = c.table.root();
        assert_eq!(c.table.scope(root).children.len(), 1);
        let f = c.table.scope(root).get("f").unwrap();
        assert_eq!(c.table.binding(f).kind, BindingKind::Function);
    }

    #[test]
    fn test_catch_param_scope() {
        let c = collect_ok(vec![try_(
            vec![],
            Some((Some("e"), vec![var("e", None), expr(ident("e"))])),
            Some(vec![]),
        )]);
        let root = c.table.root();
        let children = &c.table.scope(root).children;
        let kinds: Vec<_> = children.iter().map(|s| c.table.scope(*s).kind).collect();
        assert_eq!(kinds, vec![ScopeKind::Block, ScopeKind::Catch, ScopeKind::Finally]);
        let catch = children[1];
        assert!(matches!(c.table.resolve(catch, "e"), Resolution::Binding(b) if c.table.binding(b).kind == BindingKind::CatchParam));
        // The var hoisted to the root.
        assert!(c.table.scope(root).get("e").is_some());
    }

    #[test]
    fn test_named_function_expression_binds_self() {
        let c = collect_ok(vec![expr(function_expr(Some("fact"), &["n"], vec![ret(Some(ident("fact")))]))]);
        let f = c.table.scope(ScopeId(0)).children[0];
        let own = c.table.scope(f).get("fact").unwrap();
        assert_eq!(c.table.binding(own).kind, BindingKind::SelfName);
        assert!(c.table.scope(ScopeId(0)).get("fact").is_none());
    }

    #[test]
    fn test_program_level_return_rejected() {
        let err = collect(&script(vec![ret(None)]), ScopeKind::Global, &CompilerOptions::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalReturn);
    }

    #[test]
    fn test_function_depth_limit() {
        let options = CompilerOptions {
            max_function_depth: 1,
            ..CompilerOptions::default()
        };
        let program = script(vec![function("a", &[], vec![function("b", &[], vec![])])]);
        let err = collect(&program, ScopeKind::Global, &options).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::LimitExceeded { limit: 1, .. }));
    }

    #[test]
    fn test_duplicate_let_in_function_body() {
        let program = script(vec![function("f", &["a"], vec![let_("a", None)])]);
        let err = collect(&program, ScopeKind::Global, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateBinding { .. }));
    }
}
