// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Try/catch/finally regions and abrupt-completion routing.
//!
//! A finally body is emitted once. Every way out of the protected region
//! stores a completion code in a register, parks the pending value in a
//! second register and jumps to the finalizer; the dispatch emitted after the
//! finalizer replays the completion:
//!
//! ```text
//!     SaveEnv r_env
//! try_start:
//!     [try block]                     ; break/continue/return route here
//!     LoadInt 0; StoreReg r_code; Jump finalizer
//! try_end:
//! catch:                              ; handler for [try_start, try_end)
//!     RestoreEnv r_env
//!     [bind param, catch body]
//!     LoadInt 0; StoreReg r_code; Jump finalizer
//! catch_end:
//! pad:                                ; handler for [catch, catch_end)
//!     RestoreEnv r_env
//!     StoreReg r_value; LoadInt 1; StoreReg r_code
//! finalizer:
//!     [finally body]
//!     dispatch on r_code: 0 -> end, 1 -> throw r_value,
//!                         2 -> return r_value, n >= 3 -> recorded target
//! end:
//! ```
//!
//! An abrupt completion inside the finally body jumps past the dispatch and
//! so replaces whatever completion was pending.

use crate::ast::*;
use crate::compiler::bytecode::{Label, OpCode, Operand};
use crate::compiler::scope::ScopeKind;
use crate::error::{ErrorKind, Phase, Result};

use super::labels::JumpTarget;
use super::{Compiler, StoreKind};

/// Completion code for falling off the end of the region.
pub const COMPLETION_NORMAL: i32 = 0;
/// Completion code for a pending exception.
pub const COMPLETION_THROW: i32 = 1;
/// Completion code for a pending return.
pub const COMPLETION_RETURN: i32 = 2;
/// First code assigned to break/continue targets.
pub const FIRST_JUMP_CODE: i32 = 3;

/// An active try statement with a finally clause.
#[derive(Debug)]
pub(super) struct FinallyContext {
    /// Start of the finally body
    finalizer: Label,
    /// Register holding the completion code
    completion: u16,
    /// Register holding the pending exception or return value
    value: u16,
    /// Frames active at the try statement
    env_depth: u32,
    /// Jump targets routed through this finalizer, with their codes
    jumps: Vec<(i32, JumpTarget)>,
    /// Whether a return was routed through this finalizer
    has_return: bool,
}

impl FinallyContext {
    fn register_jump(&mut self, target: JumpTarget) -> i32 {
        if let Some((code, _)) = self.jumps.iter().find(|(_, t)| t.label == target.label) {
            return *code;
        }
        let code = FIRST_JUMP_CODE + self.jumps.len() as i32;
        self.jumps.push((code, target));
        code
    }
}

impl Compiler<'_, '_> {
    /// Emits a jump to a break/continue target, passing through any
    /// finalizers between here and the target.
    pub(super) fn emit_exit(&mut self, target: JumpTarget) -> Result<()> {
        let depth = self.env_depth();
        let routed = self.state.finally.len() > target.finally_depth;
        match self.state.finally.last_mut() {
            Some(ctx) if routed => {
                let code = ctx.register_jump(target);
                let (finalizer, completion, env_depth) = (ctx.finalizer, ctx.completion, ctx.env_depth);
                tracing::trace!(code, "route jump through finalizer");
                self.emit_env_pops(depth.saturating_sub(env_depth));
                self.emit_int(code);
                self.emit_with(OpCode::StoreReg, Operand::Register(completion));
                self.emit_jump(OpCode::Jump, finalizer);
            }
            _ => {
                self.emit_env_pops(depth.saturating_sub(target.env_depth));
                self.emit_jump(OpCode::Jump, target.label);
            }
        }
        Ok(())
    }

    /// Returns the value on top of the stack, passing through any finalizers.
    pub(super) fn emit_return(&mut self) {
        let depth = self.env_depth();
        match self.state.finally.last_mut() {
            Some(ctx) => {
                ctx.has_return = true;
                let (finalizer, completion, value, env_depth) =
                    (ctx.finalizer, ctx.completion, ctx.value, ctx.env_depth);
                self.emit_with(OpCode::StoreReg, Operand::Register(value));
                self.emit_env_pops(depth.saturating_sub(env_depth));
                self.emit_int(COMPLETION_RETURN);
                self.emit_with(OpCode::StoreReg, Operand::Register(completion));
                self.emit_jump(OpCode::Jump, finalizer);
            }
            None => {
                self.emit_op(OpCode::Return);
            }
        }
    }

    fn emit_normal_completion(&mut self, finally: Option<(Label, u16)>, end: Label) {
        match finally {
            Some((finalizer, completion)) => {
                self.emit_int(COMPLETION_NORMAL);
                self.emit_with(OpCode::StoreReg, Operand::Register(completion));
                self.emit_jump(OpCode::Jump, finalizer);
            }
            None => {
                self.emit_jump(OpCode::Jump, end);
            }
        }
    }

    // ========================================================================
    // Try statement
    // ========================================================================

    pub(super) fn compile_try(&mut self, stmt: &TryStatement) -> Result<()> {
        let saved_env = self.alloc_temp()?;
        self.emit_with(OpCode::SaveEnv, Operand::Register(saved_env));

        let end = self.new_label();
        let finally = match stmt.finalizer {
            Some(_) => {
                let completion = self.alloc_temp()?;
                let value = self.alloc_temp()?;
                let finalizer = self.new_label();
                self.state.finally.push(FinallyContext {
                    finalizer,
                    completion,
                    value,
                    env_depth: self.env_depth(),
                    jumps: Vec::new(),
                    has_return: false,
                });
                Some((finalizer, completion, value))
            }
            None => None,
        };
        let has_finally = finally.is_some();
        let pad = self.new_label();
        let normal = finally.map(|(finalizer, completion, _)| (finalizer, completion));

        // Protected block
        let try_start = self.new_label();
        let try_end = self.new_label();
        self.bind_label(try_start);
        self.compile_block(&stmt.block)?;
        self.emit_normal_completion(normal, end);
        self.bind_label(try_end);

        // Catch clause
        match &stmt.handler {
            Some(handler) => {
                let catch = self.new_label();
                let catch_end = self.new_label();
                self.state
                    .bytecode
                    .add_handler(try_start, try_end, catch, handler.param.is_some(), has_finally);
                self.bind_label(catch);
                self.emit_with(OpCode::RestoreEnv, Operand::Register(saved_env));

                let scope = self.enter_child(ScopeKind::Catch)?;
                self.push_frame(scope);
                match &handler.param {
                    Some(param) => self.store_name(param, StoreKind::Init)?,
                    None => {
                        self.emit_op(OpCode::Pop);
                    }
                }
                self.compile_statement_list(&handler.body.body)?;
                self.pop_frame(scope);
                self.exit_scope(scope);

                self.emit_normal_completion(normal, end);
                self.bind_label(catch_end);
                if has_finally {
                    self.state.bytecode.add_handler(catch, catch_end, pad, false, true);
                }
            }
            None => {
                if has_finally {
                    self.state.bytecode.add_handler(try_start, try_end, pad, false, true);
                }
            }
        }

        // Finally clause
        if let (Some(finalizer_body), Some((finalizer, completion, value))) = (&stmt.finalizer, finally) {
            let Some(ctx) = self.state.finally.pop() else {
                return Err(ErrorKind::internal(Phase::Emit, Some(self.scope), "finally context missing").into());
            };

            self.bind_label(pad);
            self.emit_with(OpCode::RestoreEnv, Operand::Register(saved_env));
            self.emit_with(OpCode::StoreReg, Operand::Register(value));
            self.emit_int(COMPLETION_THROW);
            self.emit_with(OpCode::StoreReg, Operand::Register(completion));

            self.bind_label(finalizer);
            self.state.finally_body_depth += 1;
            let scope = self.enter_child(ScopeKind::Finally)?;
            self.push_frame(scope);
            self.compile_statement_list(&finalizer_body.body)?;
            self.pop_frame(scope);
            self.exit_scope(scope);
            self.state.finally_body_depth -= 1;

            self.emit_dispatch(ctx, end)?;
        }

        self.bind_label(end);
        Ok(())
    }

    /// Replays the completion recorded for a finalizer that fell through.
    fn emit_dispatch(&mut self, ctx: FinallyContext, end: Label) -> Result<()> {
        let compare = |this: &mut Self, code: i32, on_mismatch: Label| {
            this.emit_with(OpCode::LoadReg, Operand::Register(ctx.completion));
            this.emit_int(code);
            this.emit_op(OpCode::StrictEq);
            this.emit_jump(OpCode::JumpIfFalse, on_mismatch);
        };

        self.emit_with(OpCode::LoadReg, Operand::Register(ctx.completion));
        self.emit_int(COMPLETION_NORMAL);
        self.emit_op(OpCode::StrictEq);
        self.emit_jump(OpCode::JumpIfTrue, end);

        let next = self.new_label();
        compare(self, COMPLETION_THROW, next);
        self.emit_with(OpCode::LoadReg, Operand::Register(ctx.value));
        self.emit_op(OpCode::Throw);
        self.bind_label(next);

        if ctx.has_return {
            let next = self.new_label();
            compare(self, COMPLETION_RETURN, next);
            self.emit_with(OpCode::LoadReg, Operand::Register(ctx.value));
            self.emit_return();
            self.bind_label(next);
        }

        for (code, target) in &ctx.jumps {
            let next = self.new_label();
            compare(self, *code, next);
            self.emit_exit(*target)?;
            self.bind_label(next);
        }

        self.emit_jump(OpCode::Jump, end);
        Ok(())
    }
}
