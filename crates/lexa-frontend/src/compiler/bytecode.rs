// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.

use std::fmt::{self, Write as _};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Phase, Result};

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Number
    Number(f64),
    /// String, also used for property and global names
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Number(n) => write!(f, "{}", n),
            Constant::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A symbolic jump target, resolved to an instruction index by backpatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Optional operand
    pub operand: Option<Operand>,
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            None => write!(f, "{:?}", self.opcode),
            Some(operand) => write!(f, "{:?} {}", self.opcode, operand),
        }
    }
}

/// Instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Constant pool index
    Constant(u16),
    /// Small integer immediate
    Int(i32),
    /// Register index
    Register(u16),
    /// Frame slot: hops up the environment chain, then slot index
    Slot {
        /// Frames to walk outward
        depth: u16,
        /// Slot within the frame
        index: u16,
    },
    /// Unresolved jump target; never present after backpatching
    Label(Label),
    /// Jump target instruction index
    Jump(u32),
    /// Number of arguments
    ArgCount(u8),
    /// Property name index in constant pool
    Property(u16),
    /// Index into the enclosing function's nested functions
    Function(u16),
    /// Element or slot count
    Count(u16),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(i) => write!(f, "k{}", i),
            Operand::Int(v) => write!(f, "#{}", v),
            Operand::Register(r) => write!(f, "r{}", r),
            Operand::Slot { depth, index } => write!(f, "[{}, {}]", depth, index),
            Operand::Label(l) => write!(f, "L{}", l.0),
            Operand::Jump(target) => write!(f, "@{}", target),
            Operand::ArgCount(n) => write!(f, "({})", n),
            Operand::Property(i) => write!(f, ".k{}", i),
            Operand::Function(i) => write!(f, "fn{}", i),
            Operand::Count(n) => write!(f, "x{}", n),
        }
    }
}

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    // Stack operations
    /// Push a constant onto the stack
    LoadConst,
    /// Push a small integer
    LoadInt,
    /// Push undefined
    LoadUndefined,
    /// Push null
    LoadNull,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Pop the top value
    Pop,
    /// Duplicate the top value
    Dup,
    /// Swap top two values on stack
    Swap,

    // Arithmetic operations
    /// Add top two values
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Modulo
    Mod,
    /// Negate (unary minus)
    Neg,
    /// Convert to number (unary plus)
    ToNumber,

    // Comparison operations
    /// Equal (==)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Strict equal (===)
    StrictEq,
    /// Strict not equal (!==)
    StrictNe,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,

    // Logical operations
    /// Logical not
    Not,
    /// typeof operator
    TypeOf,

    // Variable operations
    /// Push a register
    LoadReg,
    /// Pop into a register
    StoreReg,
    /// Push a frame slot
    LoadSlot,
    /// Pop into a frame slot
    StoreSlot,
    /// Push a global by name
    LoadGlobal,
    /// Push a global by name, or undefined if it does not exist
    LoadGlobalOrUndefined,
    /// Pop into a global by name
    StoreGlobal,
    /// Push an argument of the current call (undefined if missing)
    LoadArg,
    /// Push the closure being executed
    LoadCallee,
    /// Throw a TypeError for assignment to a constant binding
    ThrowConstAssign,

    // Environment operations
    /// Push a fresh frame with the given slot count
    PushLexEnv,
    /// Drop the innermost frame
    PopLexEnv,
    /// Replace the innermost frame with a copy of itself
    CopyLexEnv,
    /// Save the current environment into a register
    SaveEnv,
    /// Restore the environment saved in a register
    RestoreEnv,

    // Object operations
    /// Get property by name: [obj] -> [value]
    GetProperty,
    /// Set property by name: [obj, value] -> [value]
    SetProperty,
    /// Get element: [obj, key] -> [value]
    GetElement,
    /// Set element: [obj, key, value] -> [value]
    SetElement,
    /// Create an array from the top N values
    NewArray,
    /// Create an empty object
    NewObject,
    /// Create a closure over the current environment
    Closure,

    // Iteration
    /// Pop an object and store a key iterator in a register
    ForInInit,
    /// Pop an iterable and store a value iterator in a register
    ForOfInit,
    /// Push whether the iterator in a register is exhausted
    IterDone,
    /// Push the next value of the iterator in a register
    IterNext,

    // Control flow
    /// Unconditional jump
    Jump,
    /// Jump if top of stack is falsy (pops)
    JumpIfFalse,
    /// Jump if top of stack is truthy (pops)
    JumpIfTrue,
    /// Call function
    Call,
    /// Construct
    New,
    /// Return from function
    Return,
    /// Throw exception
    Throw,

    // Misc
    /// No operation
    Nop,
    /// Debugger statement
    Debugger,
}

impl OpCode {
    /// Whether the operand of this opcode is a jump target.
    pub fn is_jump(self) -> bool {
        matches!(self, OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue)
    }
}

/// One entry of a function's exception handler table.
///
/// Offsets are instruction indices; the protected range is `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerEntry {
    /// First protected instruction
    pub start: u32,
    /// One past the last protected instruction
    pub end: u32,
    /// Landing pad
    pub handler: u32,
    /// Whether the handler binds a catch parameter
    pub has_catch_param: bool,
    /// Whether a finally clause is attached to the region
    pub has_finally: bool,
}

impl HandlerEntry {
    /// Whether `pc` lies in the protected range.
    pub fn covers(&self, pc: u32) -> bool {
        self.start <= pc && pc < self.end
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    has_catch_param: bool,
    has_finally: bool,
}

/// Instruction buffer for one function under construction.
#[derive(Debug, Default)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Constant>,
    labels: Vec<Option<u32>>,
    handlers: Vec<PendingHandler>,
    strings: FxHashMap<String, u16>,
}

impl Bytecode {
    /// Creates a new empty bytecode chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Index the next instruction will get.
    pub fn position(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Adds a constant and returns its index. Strings are interned.
    pub fn add_constant(&mut self, value: Constant) -> Result<u16> {
        if let Constant::String(s) = &value {
            if let Some(index) = self.strings.get(s) {
                return Ok(*index);
            }
        }
        let index = u16::try_from(self.constants.len()).map_err(|_| ErrorKind::LimitExceeded {
            what: "constants",
            limit: u16::MAX as u32,
        })?;
        if let Constant::String(s) = &value {
            self.strings.insert(s.clone(), index);
        }
        self.constants.push(value);
        Ok(index)
    }

    /// Creates an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Binds a label to the next instruction.
    pub fn bind_label(&mut self, label: Label) {
        let position = self.position();
        if let Some(slot) = self.labels.get_mut(label.0 as usize) {
            *slot = Some(position);
        }
    }

    /// Emits a jump to a label.
    pub fn emit_jump(&mut self, opcode: OpCode, label: Label) -> usize {
        self.emit(Instruction::with_operand(opcode, Operand::Label(label)))
    }

    /// Records a handler region in program order.
    pub fn add_handler(&mut self, start: Label, end: Label, handler: Label, has_catch_param: bool, has_finally: bool) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            has_catch_param,
            has_finally,
        });
    }

    fn resolve(&self, label: Label) -> Result<u32> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| ErrorKind::internal(Phase::Backpatch, None, format!("label L{} was never bound", label.0)).into())
    }

    /// Resolves every label and returns the final code and handler table.
    pub fn finish(mut self) -> Result<(Vec<Instruction>, Vec<Constant>, Vec<HandlerEntry>)> {
        for i in 0..self.instructions.len() {
            if let Some(Operand::Label(label)) = self.instructions[i].operand {
                let target = self.resolve(label)?;
                self.instructions[i].operand = Some(Operand::Jump(target));
            }
        }
        let mut handlers = Vec::with_capacity(self.handlers.len());
        for pending in &self.handlers {
            handlers.push(HandlerEntry {
                start: self.resolve(pending.start)?,
                end: self.resolve(pending.end)?,
                handler: self.resolve(pending.handler)?,
                has_catch_param: pending.has_catch_param,
                has_finally: pending.has_finally,
            });
        }
        Ok((self.instructions, self.constants, handlers))
    }
}

/// A fully compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    /// Display name
    pub name: String,
    /// Declared parameter count
    pub param_count: u32,
    /// Registers needed (bindings plus temporaries)
    pub register_count: u32,
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Constant>,
    /// Exception handler table in program order
    pub handlers: Vec<HandlerEntry>,
    /// Nested functions referenced by `Closure`
    pub functions: Vec<CompiledFunction>,
}

impl CompiledFunction {
    /// Returns the innermost handler covering `pc`.
    pub fn handler_for(&self, pc: u32) -> Option<&HandlerEntry> {
        self.handlers
            .iter()
            .filter(|h| h.covers(pc))
            .min_by_key(|h| h.end - h.start)
    }

    /// Number of instructions with the given opcode, nested functions excluded.
    pub fn count(&self, opcode: OpCode) -> usize {
        self.instructions.iter().filter(|i| i.opcode == opcode).count()
    }

    /// Human readable listing of this function and its nested functions.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out, 0);
        out
    }

    fn disassemble_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        let _ = writeln!(
            out,
            "{}function {} (params: {}, registers: {})",
            pad, self.name, self.param_count, self.register_count
        );
        for (i, instruction) in self.instructions.iter().enumerate() {
            let _ = write!(out, "{}  {:>4}  {}", pad, i, instruction);
            match instruction.operand {
                Some(Operand::Constant(k)) | Some(Operand::Property(k)) => {
                    if let Some(c) = self.constants.get(k as usize) {
                        let _ = write!(out, "    ; {}", c);
                    }
                }
                _ => {}
            }
            out.push('\n');
        }
        for h in &self.handlers {
            let _ = writeln!(
                out,
                "{}  handler [{}, {}) -> {}{}{}",
                pad,
                h.start,
                h.end,
                h.handler,
                if h.has_catch_param { " catch-param" } else { "" },
                if h.has_finally { " finally" } else { "" },
            );
        }
        for nested in &self.functions {
            nested.disassemble_into(out, indent + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backpatch_resolves_labels() {
        let mut code = Bytecode::new();
        let end = code.new_label();
        code.emit_jump(OpCode::Jump, end);
        code.emit(Instruction::simple(OpCode::Nop));
        code.bind_label(end);
        code.emit(Instruction::simple(OpCode::Return));
        let (instructions, _, _) = code.finish().unwrap();
        assert_eq!(instructions[0].operand, Some(Operand::Jump(2)));
    }

    #[test]
    fn test_unbound_label_is_internal_error() {
        let mut code = Bytecode::new();
        let nowhere = code.new_label();
        code.emit_jump(OpCode::JumpIfFalse, nowhere);
        let err = code.finish().unwrap_err();
        assert!(err.is_internal());
        assert!(matches!(err.kind, ErrorKind::Internal { phase: Phase::Backpatch, .. }));
    }

    #[test]
    fn test_string_constants_are_interned() {
        let mut code = Bytecode::new();
        let a = code.add_constant(Constant::String("x".into())).unwrap();
        let b = code.add_constant(Constant::Number(1.0)).unwrap();
        let c = code.add_constant(Constant::String("x".into())).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(code.constants.len(), 2);
    }

    #[test]
    fn test_innermost_handler_wins() {
        let f = CompiledFunction {
            name: "f".into(),
            param_count: 0,
            register_count: 0,
            instructions: vec![],
            constants: vec![],
            handlers: vec![
                HandlerEntry {
                    start: 0,
                    end: 10,
                    handler: 20,
                    has_catch_param: false,
                    has_finally: true,
                },
                HandlerEntry {
                    start: 2,
                    end: 5,
                    handler: 12,
                    has_catch_param: true,
                    has_finally: false,
                },
            ],
            functions: vec![],
        };
        assert_eq!(f.handler_for(3).map(|h| h.handler), Some(12));
        assert_eq!(f.handler_for(7).map(|h| h.handler), Some(20));
        assert!(f.handler_for(10).is_none());
    }
}
