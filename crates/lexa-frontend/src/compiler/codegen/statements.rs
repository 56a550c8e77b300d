// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement compilation.
//!
//! | Statement | Key Operations | Notes |
//! |-----------|----------------|-------|
//! | `var/let/const` | `StoreReg`, `StoreSlot` | `let` without initializer stores undefined |
//! | block | `PushLexEnv`, `PopLexEnv` | frame only when a binding is captured |
//! | `for` | `CopyLexEnv` | per-iteration copy of a captured head |
//! | `for-in/of` | `ForInInit`, `IterDone`, `IterNext` | fresh frame per iteration |
//! | `switch` | `StrictEq`, `JumpIfTrue` | tests first, then bodies |
//! | `break/continue` | `PopLexEnv`, `Jump` | routed through finalizers |
//! | `try` | see `finally` | |
//!
//! ### Classic for loop with a captured `let`
//!
//! ```text
//!   PushLexEnv n
//!   [init]
//!   CopyLexEnv
//! top:
//!   [test]; JumpIfFalse exit
//!   [body]
//! continue:
//!   CopyLexEnv
//!   [update]; Pop
//!   Jump top
//! exit:
//!   PopLexEnv
//! end:
//! ```
//!
//! ### for-in / for-of with a captured `let`
//!
//! ```text
//!   [right]; ForInInit r_iter
//! top:
//!   IterDone r_iter; JumpIfTrue end
//!   PushLexEnv n
//!   IterNext r_iter; [store binding]
//!   [body]
//! continue:
//!   PopLexEnv
//!   Jump top
//! end:
//! ```

use crate::ast::*;
use crate::compiler::bytecode::{OpCode, Operand};
use crate::compiler::scope::{ScopeId, ScopeKind};
use crate::error::{CompileError, ErrorKind, Result};

use super::{Compiler, StoreKind};

/// Labels attached to a loop or switch, located at the innermost label.
#[derive(Debug, Default)]
struct StatementLabels {
    names: Vec<String>,
    loc: SourceLocation,
}

impl Compiler<'_, '_> {
    /// Compiles a statement list: function declarations are instantiated at
    /// entry, then the remaining statements run in order.
    pub(super) fn compile_statement_list(&mut self, statements: &[Statement]) -> Result<()> {
        for stmt in hoisting_order(statements) {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    pub(super) fn compile_statement(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::VariableDeclaration(decl) => self.compile_variable_declaration(decl),
            Statement::FunctionDeclaration(func) => {
                let index = self.compile_function(func.as_node())?;
                self.emit_with(OpCode::Closure, Operand::Function(index));
                self.store_name(&func.id, StoreKind::Init)
            }
            Statement::Expression(expr) => {
                self.compile_expression(&expr.expression)?;
                self.emit_op(OpCode::Pop);
                Ok(())
            }
            Statement::Block(block) => self.compile_block(block),
            Statement::If(if_stmt) => self.compile_if(if_stmt),
            Statement::Switch(switch) => self.compile_switch(switch, StatementLabels::default()),
            Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::For(_)
            | Statement::ForIn(_)
            | Statement::ForOf(_) => self.compile_loop(stmt, StatementLabels::default()),
            Statement::Return(ret) => {
                match &ret.argument {
                    Some(arg) => self.compile_expression(arg)?,
                    None => {
                        self.emit_op(OpCode::LoadUndefined);
                    }
                }
                self.emit_return();
                Ok(())
            }
            Statement::Break(brk) => {
                let label = brk.label.as_ref().map(|l| l.name.as_str());
                let target = self
                    .state
                    .labels
                    .resolve_break(label)
                    .map_err(|kind| self.jump_error(kind, "break", brk.loc))?;
                self.emit_exit(target)
            }
            Statement::Continue(cont) => {
                let label = cont.label.as_ref().map(|l| l.name.as_str());
                let target = self
                    .state
                    .labels
                    .resolve_continue(label)
                    .map_err(|kind| self.jump_error(kind, "continue", cont.loc))?;
                self.emit_exit(target)
            }
            Statement::Throw(throw) => {
                self.compile_expression(&throw.argument)?;
                self.emit_op(OpCode::Throw);
                Ok(())
            }
            Statement::Try(try_stmt) => self.compile_try(try_stmt),
            Statement::Labeled(_) => self.compile_labeled(stmt),
            Statement::Debugger => {
                self.emit_op(OpCode::Debugger);
                Ok(())
            }
            Statement::Empty => Ok(()),
        }
    }

    /// Inside a finally body an unresolvable jump gets its own error.
    fn jump_error(&self, kind: ErrorKind, statement: &'static str, loc: SourceLocation) -> CompileError {
        if self.state.finally_body_depth > 0 {
            ErrorKind::InvalidFinallyControlFlow { statement }.at(loc)
        } else {
            kind.at(loc)
        }
    }

    fn compile_variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<()> {
        for declarator in &decl.declarations {
            match &declarator.init {
                Some(init) => self.compile_expression(init)?,
                None if decl.kind == VariableKind::Var => continue,
                None => {
                    self.emit_op(OpCode::LoadUndefined);
                }
            }
            self.store_name(&declarator.id, StoreKind::Init)?;
        }
        Ok(())
    }

    pub(super) fn compile_block(&mut self, block: &BlockStatement) -> Result<()> {
        let scope = self.enter_child(ScopeKind::Block)?;
        self.push_frame(scope);
        self.compile_statement_list(&block.body)?;
        self.pop_frame(scope);
        self.exit_scope(scope);
        Ok(())
    }

    fn compile_if(&mut self, if_stmt: &IfStatement) -> Result<()> {
        let else_label = self.new_label();
        let end = self.new_label();
        self.compile_expression(&if_stmt.test)?;
        self.emit_jump(OpCode::JumpIfFalse, else_label);
        self.compile_statement(&if_stmt.consequent)?;
        self.emit_jump(OpCode::Jump, end);
        self.bind_label(else_label);
        if let Some(alt) = &if_stmt.alternate {
            self.compile_statement(alt)?;
        }
        self.bind_label(end);
        Ok(())
    }

    // ========================================================================
    // Labels
    // ========================================================================

    fn compile_labeled(&mut self, stmt: &Statement) -> Result<()> {
        let mut labels = StatementLabels::default();
        let mut body = stmt;
        while let Statement::Labeled(labeled) = body {
            labels.names.push(labeled.label.name.clone());
            labels.loc = labeled.label.loc;
            body = &labeled.body;
        }

        if body.is_loop() {
            return self.compile_loop(body, labels);
        }
        if let Statement::Switch(switch) = body {
            return self.compile_switch(switch, labels);
        }

        let end = self.new_label();
        let target = self.jump_target(end, self.env_depth());
        let loc = labels.loc;
        self.state
            .labels
            .push_plain_label(labels.names, target)
            .map_err(|kind| kind.at(loc))?;
        self.compile_statement(body)?;
        self.state.labels.pop();
        self.bind_label(end);
        Ok(())
    }

    // ========================================================================
    // Loops
    // ========================================================================

    fn compile_loop(&mut self, stmt: &Statement, labels: StatementLabels) -> Result<()> {
        match stmt {
            Statement::While(while_stmt) => self.compile_while(while_stmt, labels),
            Statement::DoWhile(do_while) => self.compile_do_while(do_while, labels),
            Statement::For(for_stmt) => self.compile_for(for_stmt, labels),
            Statement::ForIn(for_in) => self.compile_for_each(&for_in.left, &for_in.right, &for_in.body, false, labels),
            Statement::ForOf(for_of) => self.compile_for_each(&for_of.left, &for_of.right, &for_of.body, true, labels),
            _ => self.compile_statement(stmt),
        }
    }

    fn push_loop(
        &mut self,
        break_target: super::JumpTarget,
        continue_target: super::JumpTarget,
        labels: StatementLabels,
        fresh_frame: bool,
    ) -> Result<()> {
        let loc = labels.loc;
        self.state
            .labels
            .push_loop(break_target, continue_target, labels.names, fresh_frame)
            .map_err(|kind| kind.at(loc))
    }

    fn compile_while(&mut self, while_stmt: &WhileStatement, labels: StatementLabels) -> Result<()> {
        let top = self.new_label();
        let end = self.new_label();
        let depth = self.env_depth();

        self.bind_label(top);
        self.compile_expression(&while_stmt.test)?;
        self.emit_jump(OpCode::JumpIfFalse, end);

        let break_target = self.jump_target(end, depth);
        let continue_target = self.jump_target(top, depth);
        self.push_loop(break_target, continue_target, labels, false)?;
        self.compile_statement(&while_stmt.body)?;
        self.state.labels.pop();

        self.emit_jump(OpCode::Jump, top);
        self.bind_label(end);
        Ok(())
    }

    fn compile_do_while(&mut self, do_while: &DoWhileStatement, labels: StatementLabels) -> Result<()> {
        let top = self.new_label();
        let cont = self.new_label();
        let end = self.new_label();
        let depth = self.env_depth();

        self.bind_label(top);
        let break_target = self.jump_target(end, depth);
        let continue_target = self.jump_target(cont, depth);
        self.push_loop(break_target, continue_target, labels, false)?;
        self.compile_statement(&do_while.body)?;
        self.state.labels.pop();

        self.bind_label(cont);
        self.compile_expression(&do_while.test)?;
        self.emit_jump(OpCode::JumpIfTrue, top);
        self.bind_label(end);
        Ok(())
    }

    /// Compiles a loop body; a block body uses the loop's body scope.
    fn compile_loop_body(&mut self, body: &Statement) -> Result<()> {
        match body {
            Statement::Block(block) => self.compile_block(block),
            other => self.compile_statement(other),
        }
    }

    fn compile_for(&mut self, for_stmt: &ForStatement, labels: StatementLabels) -> Result<()> {
        let outside = self.env_depth();
        let scope = self.enter_child(ScopeKind::Loop)?;
        let has_frame = self.ctx.envs.frame_for(scope).is_some();
        let fresh = self.ctx.envs.requires_fresh_frame(scope);
        let copy_per_iteration = has_frame && fresh;
        tracing::trace!(scope = %scope, has_frame, fresh, "compile for loop");

        self.push_frame(scope);
        match &for_stmt.init {
            Some(ForInit::Declaration(decl)) => self.compile_variable_declaration(decl)?,
            Some(ForInit::Expression(expr)) => {
                self.compile_expression(expr)?;
                self.emit_op(OpCode::Pop);
            }
            None => {}
        }
        if copy_per_iteration {
            self.emit_op(OpCode::CopyLexEnv);
        }

        let top = self.new_label();
        let cont = self.new_label();
        let exit = self.new_label();
        let end = self.new_label();

        self.bind_label(top);
        if let Some(test) = &for_stmt.test {
            self.compile_expression(test)?;
            self.emit_jump(OpCode::JumpIfFalse, exit);
        }

        let inside = self.env_depth();
        let break_target = self.jump_target(end, outside);
        let continue_target = self.jump_target(cont, inside);
        self.push_loop(break_target, continue_target, labels, fresh)?;
        self.compile_loop_body(&for_stmt.body)?;
        self.state.labels.pop();

        self.bind_label(cont);
        if copy_per_iteration {
            self.emit_op(OpCode::CopyLexEnv);
        }
        if let Some(update) = &for_stmt.update {
            self.compile_expression(update)?;
            self.emit_op(OpCode::Pop);
        }
        self.emit_jump(OpCode::Jump, top);

        self.bind_label(exit);
        self.pop_frame(scope);
        self.exit_scope(scope);
        self.bind_label(end);
        Ok(())
    }

    fn compile_for_each(
        &mut self,
        left: &ForInLeft,
        right: &Expression,
        body: &Statement,
        of: bool,
        labels: StatementLabels,
    ) -> Result<()> {
        let outside = self.env_depth();
        self.compile_expression(right)?;
        let iterator = self.alloc_temp()?;
        let init = if of { OpCode::ForOfInit } else { OpCode::ForInInit };
        self.emit_with(init, Operand::Register(iterator));

        let scope = self.enter_child(ScopeKind::Loop)?;
        let fresh = self.ctx.envs.requires_fresh_frame(scope);
        let top = self.new_label();
        let cont = self.new_label();
        let end = self.new_label();

        self.bind_label(top);
        self.emit_with(OpCode::IterDone, Operand::Register(iterator));
        self.emit_jump(OpCode::JumpIfTrue, end);
        self.push_frame(scope);
        self.compile_iteration_store(left, iterator)?;

        let inside = self.env_depth();
        let break_target = self.jump_target(end, outside);
        let continue_target = self.jump_target(cont, inside);
        self.push_loop(break_target, continue_target, labels, fresh)?;
        self.compile_loop_body(body)?;
        self.state.labels.pop();

        self.bind_label(cont);
        self.pop_frame(scope);
        self.emit_jump(OpCode::Jump, top);
        self.exit_scope(scope);
        self.bind_label(end);
        Ok(())
    }

    /// Stores the next iteration value into the loop's left-hand side.
    fn compile_iteration_store(&mut self, left: &ForInLeft, iterator: u16) -> Result<()> {
        match left {
            ForInLeft::Declaration(decl) => {
                let Some(declarator) = decl.declarations.first() else {
                    return Err(ErrorKind::InvalidAssignmentTarget.into());
                };
                self.emit_with(OpCode::IterNext, Operand::Register(iterator));
                self.store_name(&declarator.id, StoreKind::Init)
            }
            ForInLeft::Expression(Expression::Identifier(id)) => {
                self.emit_with(OpCode::IterNext, Operand::Register(iterator));
                self.store_name(id, StoreKind::Assign)
            }
            ForInLeft::Expression(Expression::Member(member)) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    MemberProperty::Identifier(name) => {
                        let k = self.name_constant(&name.name)?;
                        self.emit_with(OpCode::IterNext, Operand::Register(iterator));
                        self.emit_with(OpCode::SetProperty, Operand::Property(k));
                    }
                    MemberProperty::Expression(key) => {
                        self.compile_expression(key)?;
                        self.emit_with(OpCode::IterNext, Operand::Register(iterator));
                        self.emit_op(OpCode::SetElement);
                    }
                }
                self.emit_op(OpCode::Pop);
                Ok(())
            }
            ForInLeft::Expression(_) => Err(ErrorKind::InvalidAssignmentTarget.into()),
        }
    }

    // ========================================================================
    // Switch
    // ========================================================================

    fn compile_switch(&mut self, switch: &SwitchStatement, labels: StatementLabels) -> Result<()> {
        let outside = self.env_depth();
        self.compile_expression(&switch.discriminant)?;
        let discriminant = self.alloc_temp()?;
        self.emit_with(OpCode::StoreReg, Operand::Register(discriminant));

        let scope: ScopeId = self.enter_child(ScopeKind::Block)?;
        self.push_frame(scope);
        for case in &switch.cases {
            for stmt in case.consequent.iter().filter(|s| s.as_function_declaration().is_some()) {
                self.compile_statement(stmt)?;
            }
        }

        let exit = self.new_label();
        let end = self.new_label();
        let case_labels: Vec<_> = switch.cases.iter().map(|_| self.state.bytecode.new_label()).collect();
        let mut default = None;
        for (case, label) in switch.cases.iter().zip(&case_labels) {
            match &case.test {
                Some(test) => {
                    self.emit_with(OpCode::LoadReg, Operand::Register(discriminant));
                    self.compile_expression(test)?;
                    self.emit_op(OpCode::StrictEq);
                    self.emit_jump(OpCode::JumpIfTrue, *label);
                }
                None => default = Some(*label),
            }
        }
        self.emit_jump(OpCode::Jump, default.unwrap_or(exit));

        let break_target = self.jump_target(end, outside);
        self.state
            .labels
            .push_switch(break_target, labels.names)
            .map_err(|kind| kind.at(labels.loc))?;
        for (case, label) in switch.cases.iter().zip(&case_labels) {
            self.bind_label(*label);
            for stmt in case.consequent.iter().filter(|s| s.as_function_declaration().is_none()) {
                self.compile_statement(stmt)?;
            }
        }
        self.state.labels.pop();

        self.bind_label(exit);
        self.pop_frame(scope);
        self.exit_scope(scope);
        self.bind_label(end);
        Ok(())
    }
}
