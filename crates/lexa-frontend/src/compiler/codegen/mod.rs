// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from AST to bytecode (pass 3).
//!
//! The `Compiler` walks each function once, emitting into a growing
//! instruction buffer with symbolic labels that are backpatched when the
//! function is finished. Scopes are not re-created here: the emitter steps
//! through the children recorded by the collector, in the same order, and
//! consults the classification and frame layout for every name it touches.

mod expressions;
mod finally;
pub mod labels;
mod statements;

#[cfg(test)]
mod tests;

pub use finally::{COMPLETION_NORMAL, COMPLETION_RETURN, COMPLETION_THROW, FIRST_JUMP_CODE};
pub use labels::{JumpTarget, LoopLabelTracker};

use rustc_hash::FxHashMap;

use crate::ast::*;
use crate::compiler::bytecode::{Bytecode, CompiledFunction, Constant, Instruction, Label, OpCode, Operand};
use crate::compiler::context::CompilerContext;
use crate::compiler::scope::{ScopeId, ScopeKind, Storage, Resolution};
use crate::error::{ErrorKind, Phase, Result};

use finally::FinallyContext;

/// How a store to a name is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    /// Declaration initializer; always allowed
    Init,
    /// Ordinary assignment; rejected at runtime for constants
    Assign,
}

/// Per-function emission state.
struct FunctionState {
    name: String,
    param_count: u32,
    bytecode: Bytecode,
    next_register: u32,
    labels: LoopLabelTracker,
    finally: Vec<FinallyContext>,
    /// Nesting of finally bodies being compiled
    finally_body_depth: u32,
    functions: Vec<CompiledFunction>,
}

impl FunctionState {
    fn new(name: String, param_count: u32, registers: u32) -> Self {
        Self {
            name,
            param_count,
            bytecode: Bytecode::new(),
            next_register: registers,
            labels: LoopLabelTracker::new(),
            finally: Vec::new(),
            finally_body_depth: 0,
            functions: Vec::new(),
        }
    }
}

/// Compiles AST to bytecode.
pub struct Compiler<'c, 'a> {
    ctx: &'c CompilerContext<'a>,
    state: FunctionState,
    /// Scope of the code being emitted
    scope: ScopeId,
    /// Next child to enter, per scope
    cursors: FxHashMap<ScopeId, usize>,
}

impl<'c, 'a> Compiler<'c, 'a> {
    /// Creates a compiler positioned at the root scope.
    pub fn new(ctx: &'c CompilerContext<'a>) -> Self {
        let root = ctx.table.root();
        Self {
            ctx,
            state: FunctionState::new(
                "<main>".to_string(),
                0,
                ctx.classification.register_count(root),
            ),
            scope: root,
            cursors: FxHashMap::default(),
        }
    }

    // ========================================================================
    // Main Compilation Entry Point
    // ========================================================================

    /// Compiles a program into its top-level function.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(mut self, program: &Program) -> Result<CompiledFunction> {
        let root = self.scope;
        self.push_frame(root);

        // The value of a trailing expression statement is the program result.
        let ordered: Vec<&Statement> = hoisting_order(&program.body).collect();
        match ordered.split_last() {
            Some((Statement::Expression(last), rest)) => {
                for stmt in rest {
                    self.compile_statement(stmt)?;
                }
                self.compile_expression(&last.expression)?;
            }
            _ => {
                for stmt in &ordered {
                    self.compile_statement(stmt)?;
                }
                self.emit_op(OpCode::LoadUndefined);
            }
        }
        self.emit_op(OpCode::Return);

        let state = std::mem::replace(&mut self.state, FunctionState::new(String::new(), 0, 0));
        let main = self.finish_function(state)?;
        tracing::debug!(
            instructions = main.instructions.len(),
            functions = main.functions.len(),
            "program compiled"
        );
        Ok(main)
    }

    fn finish_function(&self, state: FunctionState) -> Result<CompiledFunction> {
        let (instructions, constants, handlers) = state.bytecode.finish()?;
        Ok(CompiledFunction {
            name: state.name,
            param_count: state.param_count,
            register_count: state.next_register,
            instructions,
            constants,
            handlers,
            functions: state.functions,
        })
    }

    /// Compiles a nested function and returns its index in the current
    /// function's table.
    fn compile_function(&mut self, func: FunctionNode<'_>) -> Result<u16> {
        let scope = self.enter_child(ScopeKind::Function)?;
        let registers = self.ctx.classification.register_count(scope);
        let nested = FunctionState::new(
            func.display_name().to_string(),
            func.params.len() as u32,
            registers,
        );
        let outer = std::mem::replace(&mut self.state, nested);
        tracing::debug!(name = func.display_name(), scope = %scope, "compile function");

        let body = self.compile_function_body(func, scope);
        let inner = std::mem::replace(&mut self.state, outer);
        body?;
        self.exit_scope(scope);

        let compiled = self.finish_function(inner)?;
        let index = u16::try_from(self.state.functions.len()).map_err(|_| ErrorKind::LimitExceeded {
            what: "nested functions",
            limit: u16::MAX as u32,
        })?;
        self.state.functions.push(compiled);
        Ok(index)
    }

    fn compile_function_body(&mut self, func: FunctionNode<'_>, scope: ScopeId) -> Result<()> {
        self.push_frame(scope);
        if let Some(name) = func.self_name {
            self.emit_op(OpCode::LoadCallee);
            self.store_name(name, StoreKind::Init)?;
        }
        for (i, param) in func.params.iter().enumerate() {
            self.emit_with(OpCode::LoadArg, Operand::Int(i as i32));
            self.store_name(param, StoreKind::Init)?;
        }
        match func.body {
            FunctionBodyRef::Statements(body) => {
                self.compile_statement_list(body)?;
                self.emit_op(OpCode::LoadUndefined);
                self.emit_op(OpCode::Return);
            }
            FunctionBodyRef::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit_op(OpCode::Return);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Scopes and frames
    // ========================================================================

    /// Steps into the next child scope recorded by the collector.
    fn enter_child(&mut self, kind: ScopeKind) -> Result<ScopeId> {
        let parent = self.scope;
        let cursor = self.cursors.entry(parent).or_insert(0);
        let Some(&child) = self.ctx.table.scope(parent).children.get(*cursor) else {
            return Err(ErrorKind::internal(
                Phase::Emit,
                Some(parent),
                format!("no child scope left for {:?}", kind),
            )
            .into());
        };
        let actual = self.ctx.table.scope(child).kind;
        if actual != kind {
            return Err(ErrorKind::internal(
                Phase::Emit,
                Some(child),
                format!("expected {:?} scope, found {:?}", kind, actual),
            )
            .into());
        }
        *cursor += 1;
        self.scope = child;
        Ok(child)
    }

    fn exit_scope(&mut self, scope: ScopeId) {
        if let Some(parent) = self.ctx.table.scope(scope).parent {
            self.scope = parent;
        }
    }

    /// Frames visible at the current emission point.
    fn env_depth(&self) -> u32 {
        self.ctx.envs.active_frames(self.scope)
    }

    fn push_frame(&mut self, scope: ScopeId) {
        if self.ctx.envs.frame_for(scope).is_some() {
            let slots = self.ctx.envs.slot_count(scope);
            self.emit_with(OpCode::PushLexEnv, Operand::Count(slots as u16));
        }
    }

    fn pop_frame(&mut self, scope: ScopeId) {
        if self.ctx.envs.frame_for(scope).is_some() {
            self.emit_op(OpCode::PopLexEnv);
        }
    }

    fn emit_env_pops(&mut self, count: u32) {
        for _ in 0..count {
            self.emit_op(OpCode::PopLexEnv);
        }
    }

    /// Allocates a fresh temporary register.
    fn alloc_temp(&mut self) -> Result<u16> {
        let reg = self.state.next_register;
        if reg >= self.ctx.options.max_registers {
            return Err(ErrorKind::LimitExceeded {
                what: "registers",
                limit: self.ctx.options.max_registers,
            }
            .into());
        }
        self.state.next_register += 1;
        Ok(reg as u16)
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn name_constant(&mut self, name: &str) -> Result<u16> {
        self.state.bytecode.add_constant(Constant::String(name.to_string()))
    }

    fn binding_operand(&self, binding: crate::compiler::scope::BindingId) -> Result<(Operand, bool)> {
        let b = self.ctx.table.binding(binding);
        match self.ctx.classification.storage(binding) {
            Storage::Register(reg) => Ok((Operand::Register(reg as u16), false)),
            Storage::LexicalSlot { .. } => {
                let depth = self.ctx.envs.chain_depth(self.scope, b.scope)?;
                let index = self.ctx.envs.slot_for(binding)?;
                Ok((
                    Operand::Slot {
                        depth: depth as u16,
                        index: index as u16,
                    },
                    true,
                ))
            }
        }
    }

    fn load_name(&mut self, id: &Identifier) -> Result<()> {
        match self.ctx.table.resolve(self.scope, &id.name) {
            Resolution::Binding(binding) => {
                let (operand, slot) = self.binding_operand(binding)?;
                let op = if slot { OpCode::LoadSlot } else { OpCode::LoadReg };
                self.emit_with(op, operand);
            }
            Resolution::Global => {
                let k = self.name_constant(&id.name)?;
                self.emit_with(OpCode::LoadGlobal, Operand::Property(k));
            }
        }
        Ok(())
    }

    /// Like `load_name`, but an undeclared global loads undefined instead of throwing.
    fn load_name_for_typeof(&mut self, id: &Identifier) -> Result<()> {
        if let Resolution::Global = self.ctx.table.resolve(self.scope, &id.name) {
            let k = self.name_constant(&id.name)?;
            self.emit_with(OpCode::LoadGlobalOrUndefined, Operand::Property(k));
            return Ok(());
        }
        self.load_name(id)
    }

    /// Pops the top of stack into `id`.
    fn store_name(&mut self, id: &Identifier, kind: StoreKind) -> Result<()> {
        match self.ctx.table.resolve(self.scope, &id.name) {
            Resolution::Binding(binding) => {
                if kind == StoreKind::Assign && self.ctx.table.binding(binding).kind.is_immutable() {
                    let k = self.name_constant(&id.name)?;
                    self.emit_with(OpCode::ThrowConstAssign, Operand::Property(k));
                    return Ok(());
                }
                let (operand, slot) = self.binding_operand(binding)?;
                let op = if slot { OpCode::StoreSlot } else { OpCode::StoreReg };
                self.emit_with(op, operand);
            }
            Resolution::Global => {
                let k = self.name_constant(&id.name)?;
                self.emit_with(OpCode::StoreGlobal, Operand::Property(k));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn emit_op(&mut self, opcode: OpCode) -> usize {
        self.state.bytecode.emit(Instruction::simple(opcode))
    }

    fn emit_with(&mut self, opcode: OpCode, operand: Operand) -> usize {
        self.state.bytecode.emit(Instruction::with_operand(opcode, operand))
    }

    fn emit_jump(&mut self, opcode: OpCode, label: Label) -> usize {
        self.state.bytecode.emit_jump(opcode, label)
    }

    fn new_label(&mut self) -> Label {
        self.state.bytecode.new_label()
    }

    fn bind_label(&mut self, label: Label) {
        self.state.bytecode.bind_label(label);
    }

    fn emit_int(&mut self, value: i32) {
        self.emit_with(OpCode::LoadInt, Operand::Int(value));
    }

    fn jump_target(&self, label: Label, env_depth: u32) -> JumpTarget {
        JumpTarget {
            label,
            env_depth,
            finally_depth: self.state.finally.len(),
        }
    }
}
