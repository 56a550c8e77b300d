// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode interpreter.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::value::{Closure, Environment, NativeMethod, Prototype, Value, number_to_string};
use crate::compiler::CompileOutput;
use crate::compiler::bytecode::{Constant, Instruction, OpCode, Operand};

/// Maximum nesting of calls before a RangeError is raised.
const MAX_CALL_DEPTH: usize = 128;

/// Arrays are stored densely; writes past this length are rejected.
const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// A runtime failure.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// A thrown value nobody caught
    #[error("Uncaught {0}")]
    Uncaught(Value),

    /// TypeError raised by the runtime
    #[error("TypeError: {0}")]
    TypeError(String),

    /// ReferenceError raised by the runtime
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// RangeError raised by the runtime
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Malformed code; never catchable
    #[error("invalid bytecode: {0}")]
    InvalidBytecode(String),
}

impl VmError {
    /// The value a catch clause observes, if the error is catchable.
    ///
    /// Runtime errors surface as strings such as `"TypeError: ..."`.
    pub fn thrown_value(&self) -> Option<Value> {
        match self {
            VmError::Uncaught(value) => Some(value.clone()),
            VmError::TypeError(_) | VmError::ReferenceError(_) | VmError::RangeError(_) => {
                Some(Value::string(self.to_string()))
            }
            VmError::InvalidBytecode(_) => None,
        }
    }
}

type VmResult<T> = std::result::Result<T, VmError>;

fn invalid(detail: impl Into<String>) -> VmError {
    VmError::InvalidBytecode(detail.into())
}

/// Iteration state kept in a register by for-in/for-of.
enum Iteration {
    /// Snapshot of keys or characters
    Values(VecDeque<Value>),
    /// Live walk over an array
    Array { array: Rc<RefCell<Vec<Value>>>, next: usize },
}

impl Iteration {
    fn is_done(&self) -> bool {
        match self {
            Iteration::Values(values) => values.is_empty(),
            Iteration::Array { array, next } => *next >= array.borrow().len(),
        }
    }

    fn next_value(&mut self) -> Value {
        match self {
            Iteration::Values(values) => values.pop_front().unwrap_or(Value::Undefined),
            Iteration::Array { array, next } => {
                let value = array.borrow().get(*next).cloned().unwrap_or(Value::Undefined);
                *next += 1;
                value
            }
        }
    }
}

/// Register contents. Iterators and saved environments never reach the
/// operand stack.
enum Register {
    Value(Value),
    Iterator(Iteration),
    Env(Option<Rc<Environment>>),
}

/// Activation record of one call.
struct Frame<'p> {
    prototype: &'p Prototype,
    registers: Vec<Register>,
    stack: Vec<Value>,
    env: Option<Rc<Environment>>,
    pc: usize,
}

impl Frame<'_> {
    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or_else(|| invalid("stack underflow"))
    }

    fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or_else(|| invalid("stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(invalid("stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn register(&mut self, index: u16) -> VmResult<&mut Register> {
        self.registers
            .get_mut(index as usize)
            .ok_or_else(|| invalid(format!("register r{} out of range", index)))
    }

    fn constant(&self, index: u16) -> VmResult<&Constant> {
        self.prototype
            .constants
            .get(index as usize)
            .ok_or_else(|| invalid(format!("constant k{} out of range", index)))
    }

    fn name(&self, index: u16) -> VmResult<String> {
        match self.constant(index)? {
            Constant::String(s) => Ok(s.clone()),
            Constant::Number(n) => Ok(number_to_string(*n)),
        }
    }

    fn slot_env(&self, depth: u16) -> VmResult<Rc<Environment>> {
        self.env
            .as_ref()
            .and_then(|env| env.ancestor(depth as usize))
            .ok_or_else(|| invalid(format!("no environment {} frames up", depth)))
    }

    fn iterator(&mut self, index: u16) -> VmResult<&mut Iteration> {
        match self.register(index)? {
            Register::Iterator(iteration) => Ok(iteration),
            _ => Err(invalid(format!("r{} does not hold an iterator", index))),
        }
    }
}

enum Flow {
    Next,
    Return(Value),
}

/// The virtual machine.
pub struct VM {
    globals: FxHashMap<String, Value>,
    call_depth: usize,
}

impl VM {
    /// Creates a new VM.
    pub fn new() -> Self {
        let mut globals = FxHashMap::default();
        globals.insert("undefined".to_string(), Value::Undefined);
        globals.insert("NaN".to_string(), Value::Number(f64::NAN));
        globals.insert("Infinity".to_string(), Value::Number(f64::INFINITY));
        Self { globals, call_depth: 0 }
    }

    /// Reads a global variable.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Defines or overwrites a global variable.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Runs a compiled program and returns its completion value.
    pub fn execute(&mut self, output: &CompileOutput) -> VmResult<Value> {
        let main = Prototype::load(&output.main);
        tracing::debug!(instructions = main.instructions.len(), "execute");
        self.run(&main, None, &[], Value::Undefined)
    }

    /// Calls a function value with the given arguments.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        match callee {
            Value::Closure(closure) => {
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(VmError::RangeError("Maximum call stack size exceeded".into()));
                }
                self.call_depth += 1;
                let result = self.run(&closure.prototype, closure.env.clone(), args, callee.clone());
                self.call_depth -= 1;
                result
            }
            Value::Native(method) => call_native(method, args),
            other => Err(VmError::TypeError(format!("{} is not a function", other))),
        }
    }

    fn run(
        &mut self,
        prototype: &Prototype,
        env: Option<Rc<Environment>>,
        args: &[Value],
        callee: Value,
    ) -> VmResult<Value> {
        let mut frame = Frame {
            prototype,
            registers: (0..prototype.register_count)
                .map(|_| Register::Value(Value::Undefined))
                .collect(),
            stack: Vec::new(),
            env,
            pc: 0,
        };

        while frame.pc < prototype.instructions.len() {
            let instruction = &prototype.instructions[frame.pc];
            let pc = frame.pc;
            frame.pc += 1;
            match self.step(&mut frame, instruction, args, &callee) {
                Ok(Flow::Next) => {}
                Ok(Flow::Return(value)) => return Ok(value),
                Err(error) => {
                    let handler = prototype.handler_for(pc as u32);
                    match (handler, error.thrown_value()) {
                        (Some(entry), Some(thrown)) => {
                            tracing::trace!(pc, handler = entry.handler, "exception caught");
                            frame.stack.clear();
                            frame.stack.push(thrown);
                            frame.pc = entry.handler as usize;
                        }
                        _ => return Err(error),
                    }
                }
            }
        }
        Ok(Value::Undefined)
    }

    fn step(&mut self, frame: &mut Frame<'_>, instruction: &Instruction, args: &[Value], callee: &Value) -> VmResult<Flow> {
        let operand = instruction.operand;
        match instruction.opcode {
            OpCode::LoadConst => {
                let k = expect_index(operand)?;
                let value = match frame.constant(k)? {
                    Constant::Number(n) => Value::Number(*n),
                    Constant::String(s) => Value::string(s),
                };
                frame.stack.push(value);
            }
            OpCode::LoadInt => match operand {
                Some(Operand::Int(v)) => frame.stack.push(Value::Number(v as f64)),
                _ => return Err(bad_operand(instruction)),
            },
            OpCode::LoadUndefined => frame.stack.push(Value::Undefined),
            OpCode::LoadNull => frame.stack.push(Value::Null),
            OpCode::LoadTrue => frame.stack.push(Value::Boolean(true)),
            OpCode::LoadFalse => frame.stack.push(Value::Boolean(false)),
            OpCode::Pop => {
                frame.pop()?;
            }
            OpCode::Dup => {
                let top = frame.peek()?.clone();
                frame.stack.push(top);
            }
            OpCode::Swap => {
                let a = frame.pop()?;
                let b = frame.pop()?;
                frame.stack.push(a);
                frame.stack.push(b);
            }

            OpCode::Add => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let result = match (&left, &right) {
                    (Value::String(_), _) | (_, Value::String(_)) => Value::string(format!("{}{}", left, right)),
                    (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
                        Value::string(format!("{}{}", left, right))
                    }
                    _ => Value::Number(left.to_number() + right.to_number()),
                };
                frame.stack.push(result);
            }
            OpCode::Sub => arithmetic(frame, |a, b| a - b)?,
            OpCode::Mul => arithmetic(frame, |a, b| a * b)?,
            OpCode::Div => arithmetic(frame, |a, b| a / b)?,
            OpCode::Mod => arithmetic(frame, |a, b| a % b)?,
            OpCode::Neg => {
                let value = frame.pop()?;
                frame.stack.push(Value::Number(-value.to_number()));
            }
            OpCode::ToNumber => {
                let value = frame.pop()?;
                frame.stack.push(Value::Number(value.to_number()));
            }

            OpCode::Eq | OpCode::Ne => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let equal = left.loose_equals(&right);
                frame.stack.push(Value::Boolean(equal == (instruction.opcode == OpCode::Eq)));
            }
            OpCode::StrictEq | OpCode::StrictNe => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                let equal = left.strict_equals(&right);
                frame.stack.push(Value::Boolean(equal == (instruction.opcode == OpCode::StrictEq)));
            }
            OpCode::Lt => relational(frame, |o| o == std::cmp::Ordering::Less)?,
            OpCode::Le => relational(frame, |o| o != std::cmp::Ordering::Greater)?,
            OpCode::Gt => relational(frame, |o| o == std::cmp::Ordering::Greater)?,
            OpCode::Ge => relational(frame, |o| o != std::cmp::Ordering::Less)?,

            OpCode::Not => {
                let value = frame.pop()?;
                frame.stack.push(Value::Boolean(!value.is_truthy()));
            }
            OpCode::TypeOf => {
                let value = frame.pop()?;
                frame.stack.push(Value::string(value.type_of()));
            }

            OpCode::LoadReg => {
                let r = expect_register(operand)?;
                let value = match frame.register(r)? {
                    Register::Value(value) => value.clone(),
                    _ => return Err(invalid(format!("r{} does not hold a value", r))),
                };
                frame.stack.push(value);
            }
            OpCode::StoreReg => {
                let r = expect_register(operand)?;
                let value = frame.pop()?;
                *frame.register(r)? = Register::Value(value);
            }
            OpCode::LoadSlot => {
                let (depth, index) = expect_slot(operand)?;
                let env = frame.slot_env(depth)?;
                let value = env
                    .slots
                    .borrow()
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| invalid(format!("slot {} out of range", index)))?;
                frame.stack.push(value);
            }
            OpCode::StoreSlot => {
                let (depth, index) = expect_slot(operand)?;
                let value = frame.pop()?;
                let env = frame.slot_env(depth)?;
                let mut slots = env.slots.borrow_mut();
                let slot = slots
                    .get_mut(index as usize)
                    .ok_or_else(|| invalid(format!("slot {} out of range", index)))?;
                *slot = value;
            }
            OpCode::LoadGlobal => {
                let name = frame.name(expect_index(operand)?)?;
                match self.globals.get(&name) {
                    Some(value) => frame.stack.push(value.clone()),
                    None => return Err(VmError::ReferenceError(format!("{} is not defined", name))),
                }
            }
            OpCode::LoadGlobalOrUndefined => {
                let name = frame.name(expect_index(operand)?)?;
                let value = self.globals.get(&name).cloned().unwrap_or(Value::Undefined);
                frame.stack.push(value);
            }
            OpCode::StoreGlobal => {
                let name = frame.name(expect_index(operand)?)?;
                let value = frame.pop()?;
                self.globals.insert(name, value);
            }
            OpCode::LoadArg => match operand {
                Some(Operand::Int(i)) => {
                    let value = usize::try_from(i)
                        .ok()
                        .and_then(|i| args.get(i))
                        .cloned()
                        .unwrap_or(Value::Undefined);
                    frame.stack.push(value);
                }
                _ => return Err(bad_operand(instruction)),
            },
            OpCode::LoadCallee => frame.stack.push(callee.clone()),
            OpCode::ThrowConstAssign => {
                let name = frame.name(expect_index(operand)?)?;
                return Err(VmError::TypeError(format!("Assignment to constant variable '{}'", name)));
            }

            OpCode::PushLexEnv => {
                let count = match operand {
                    Some(Operand::Count(n)) => n as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                frame.env = Some(Rc::new(Environment::new(count, frame.env.take())));
            }
            OpCode::PopLexEnv => {
                let env = frame.env.take().ok_or_else(|| invalid("no environment to pop"))?;
                frame.env = env.parent.clone();
            }
            OpCode::CopyLexEnv => {
                let env = frame.env.take().ok_or_else(|| invalid("no environment to copy"))?;
                let copy = Environment {
                    slots: RefCell::new(env.slots.borrow().clone()),
                    parent: env.parent.clone(),
                };
                frame.env = Some(Rc::new(copy));
            }
            OpCode::SaveEnv => {
                let r = expect_register(operand)?;
                let env = frame.env.clone();
                *frame.register(r)? = Register::Env(env);
            }
            OpCode::RestoreEnv => {
                let r = expect_register(operand)?;
                let env = match frame.register(r)? {
                    Register::Env(env) => env.clone(),
                    _ => return Err(invalid(format!("r{} does not hold an environment", r))),
                };
                frame.env = env;
            }

            OpCode::GetProperty => {
                let name = frame.name(expect_index(operand)?)?;
                let object = frame.pop()?;
                frame.stack.push(get_property(&object, &name)?);
            }
            OpCode::SetProperty => {
                let name = frame.name(expect_index(operand)?)?;
                let value = frame.pop()?;
                let object = frame.pop()?;
                set_property(&object, &name, value.clone())?;
                frame.stack.push(value);
            }
            OpCode::GetElement => {
                let key = frame.pop()?;
                let object = frame.pop()?;
                frame.stack.push(get_property(&object, &property_key(&key))?);
            }
            OpCode::SetElement => {
                let value = frame.pop()?;
                let key = frame.pop()?;
                let object = frame.pop()?;
                set_property(&object, &property_key(&key), value.clone())?;
                frame.stack.push(value);
            }
            OpCode::NewArray => {
                let count = match operand {
                    Some(Operand::Count(n)) => n as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                let elements = frame.pop_n(count)?;
                frame.stack.push(Value::array(elements));
            }
            OpCode::NewObject => frame.stack.push(Value::object()),
            OpCode::Closure => {
                let index = match operand {
                    Some(Operand::Function(i)) => i as usize,
                    _ => return Err(bad_operand(instruction)),
                };
                let prototype = frame
                    .prototype
                    .nested
                    .get(index)
                    .cloned()
                    .ok_or_else(|| invalid(format!("function fn{} out of range", index)))?;
                frame.stack.push(Value::Closure(Rc::new(Closure {
                    prototype,
                    env: frame.env.clone(),
                })));
            }

            OpCode::ForInInit => {
                let r = expect_register(operand)?;
                let object = frame.pop()?;
                let keys: VecDeque<Value> = match &object {
                    Value::Array(items) => (0..items.borrow().len()).map(|i| Value::string(i.to_string())).collect(),
                    Value::String(s) => (0..s.chars().count()).map(|i| Value::string(i.to_string())).collect(),
                    Value::Object(props) => props.borrow().iter().map(|(k, _)| Value::string(k)).collect(),
                    _ => VecDeque::new(),
                };
                *frame.register(r)? = Register::Iterator(Iteration::Values(keys));
            }
            OpCode::ForOfInit => {
                let r = expect_register(operand)?;
                let iterable = frame.pop()?;
                let iteration = match iterable {
                    Value::Array(array) => Iteration::Array { array, next: 0 },
                    Value::String(s) => Iteration::Values(s.chars().map(|c| Value::string(c.to_string())).collect()),
                    other => return Err(VmError::TypeError(format!("{} is not iterable", other))),
                };
                *frame.register(r)? = Register::Iterator(iteration);
            }
            OpCode::IterDone => {
                let r = expect_register(operand)?;
                let done = frame.iterator(r)?.is_done();
                frame.stack.push(Value::Boolean(done));
            }
            OpCode::IterNext => {
                let r = expect_register(operand)?;
                let value = frame.iterator(r)?.next_value();
                frame.stack.push(value);
            }

            OpCode::Jump => frame.pc = expect_jump(operand)?,
            OpCode::JumpIfFalse => {
                let target = expect_jump(operand)?;
                if !frame.pop()?.is_truthy() {
                    frame.pc = target;
                }
            }
            OpCode::JumpIfTrue => {
                let target = expect_jump(operand)?;
                if frame.pop()?.is_truthy() {
                    frame.pc = target;
                }
            }
            OpCode::Call => {
                let argc = expect_argc(operand)?;
                let call_args = frame.pop_n(argc)?;
                let function = frame.pop()?;
                let result = self.call(&function, &call_args)?;
                frame.stack.push(result);
            }
            OpCode::New => {
                let argc = expect_argc(operand)?;
                let call_args = frame.pop_n(argc)?;
                let constructor = frame.pop()?;
                if !matches!(constructor, Value::Closure(_)) {
                    return Err(VmError::TypeError(format!("{} is not a constructor", constructor)));
                }
                let result = self.call(&constructor, &call_args)?;
                let instance = match result {
                    Value::Object(_) | Value::Array(_) => result,
                    _ => Value::object(),
                };
                frame.stack.push(instance);
            }
            OpCode::Return => {
                let value = frame.stack.pop().unwrap_or(Value::Undefined);
                return Ok(Flow::Return(value));
            }
            OpCode::Throw => {
                let value = frame.pop()?;
                return Err(VmError::Uncaught(value));
            }

            OpCode::Nop | OpCode::Debugger => {}
        }
        Ok(Flow::Next)
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

fn bad_operand(instruction: &Instruction) -> VmError {
    invalid(format!("bad operand for {}", instruction))
}

fn expect_index(operand: Option<Operand>) -> VmResult<u16> {
    match operand {
        Some(Operand::Constant(k)) | Some(Operand::Property(k)) => Ok(k),
        other => Err(invalid(format!("expected constant operand, found {:?}", other))),
    }
}

fn expect_register(operand: Option<Operand>) -> VmResult<u16> {
    match operand {
        Some(Operand::Register(r)) => Ok(r),
        other => Err(invalid(format!("expected register operand, found {:?}", other))),
    }
}

fn expect_slot(operand: Option<Operand>) -> VmResult<(u16, u16)> {
    match operand {
        Some(Operand::Slot { depth, index }) => Ok((depth, index)),
        other => Err(invalid(format!("expected slot operand, found {:?}", other))),
    }
}

fn expect_jump(operand: Option<Operand>) -> VmResult<usize> {
    match operand {
        Some(Operand::Jump(target)) => Ok(target as usize),
        other => Err(invalid(format!("unresolved jump operand {:?}", other))),
    }
}

fn expect_argc(operand: Option<Operand>) -> VmResult<usize> {
    match operand {
        Some(Operand::ArgCount(n)) => Ok(n as usize),
        other => Err(invalid(format!("expected argument count, found {:?}", other))),
    }
}

fn arithmetic(frame: &mut Frame<'_>, op: impl Fn(f64, f64) -> f64) -> VmResult<()> {
    let right = frame.pop()?.to_number();
    let left = frame.pop()?.to_number();
    frame.stack.push(Value::Number(op(left, right)));
    Ok(())
}

fn relational(frame: &mut Frame<'_>, test: impl Fn(std::cmp::Ordering) -> bool) -> VmResult<()> {
    let right = frame.pop()?;
    let left = frame.pop()?;
    let ordering = match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    frame.stack.push(Value::Boolean(ordering.is_some_and(test)));
    Ok(())
}

fn property_key(key: &Value) -> String {
    key.to_string()
}

fn array_index(name: &str) -> Option<usize> {
    if name == "0" || (!name.starts_with('0') && !name.is_empty()) {
        name.parse::<usize>().ok()
    } else {
        None
    }
}

fn dense_length(len: usize) -> VmResult<usize> {
    if len > MAX_ARRAY_LENGTH {
        return Err(VmError::RangeError(format!("Invalid array length {}", len)));
    }
    Ok(len)
}

fn array_method(name: &str) -> Option<&'static str> {
    ["push", "pop", "join"].into_iter().find(|m| *m == name)
}

fn get_property(object: &Value, name: &str) -> VmResult<Value> {
    let value = match object {
        Value::Undefined | Value::Null => {
            return Err(VmError::TypeError(format!(
                "Cannot read properties of {} (reading '{}')",
                object, name
            )));
        }
        Value::Array(items) => match (name, array_index(name)) {
            ("length", _) => Value::Number(items.borrow().len() as f64),
            (_, _) if array_method(name).is_some() => Value::Native(Rc::new(NativeMethod {
                receiver: object.clone(),
                name: array_method(name).unwrap_or_default(),
            })),
            (_, Some(i)) => items.borrow().get(i).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        },
        Value::String(s) => match (name, array_index(name)) {
            ("length", _) => Value::Number(s.chars().count() as f64),
            (_, Some(i)) => s
                .chars()
                .nth(i)
                .map(|c| Value::string(c.to_string()))
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        },
        Value::Object(props) => props
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    };
    Ok(value)
}

fn set_property(object: &Value, name: &str, value: Value) -> VmResult<()> {
    match object {
        Value::Undefined | Value::Null => Err(VmError::TypeError(format!(
            "Cannot set properties of {} (setting '{}')",
            object, name
        ))),
        Value::Object(props) => {
            let mut props = props.borrow_mut();
            match props.iter_mut().find(|(k, _)| k == name) {
                Some((_, slot)) => *slot = value,
                None => props.push((name.to_string(), value)),
            }
            Ok(())
        }
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            if name == "length" {
                let len = value.to_number();
                if len >= 0.0 && len.fract() == 0.0 {
                    let len = dense_length(len as usize)?;
                    items.resize(len, Value::Undefined);
                }
            } else if let Some(i) = array_index(name) {
                if i >= items.len() {
                    items.resize(dense_length(i + 1)?, Value::Undefined);
                }
                items[i] = value;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn call_native(method: &NativeMethod, args: &[Value]) -> VmResult<Value> {
    let Value::Array(items) = &method.receiver else {
        return Err(VmError::TypeError(format!("{} called on non-array", method.name)));
    };
    match method.name {
        "push" => {
            let mut items = items.borrow_mut();
            items.extend(args.iter().cloned());
            Ok(Value::Number(items.len() as f64))
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        "join" => {
            let separator = match args.first() {
                Some(Value::Undefined) | None => ",".to_string(),
                Some(other) => other.to_string(),
            };
            let joined = items
                .borrow()
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(Value::string(joined))
        }
        other => Err(VmError::TypeError(format!("unknown method {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::{BinaryOperator, Program};
    use crate::compiler::compile;
    use crate::options::CompilerOptions;

    fn run(program: Program) -> VmResult<Value> {
        let output = compile(&program, &CompilerOptions::default()).unwrap();
        VM::new().execute(&output)
    }

    #[test]
    fn test_arithmetic() {
        let result = run(script(vec![expr(binary(
            BinaryOperator::Multiply,
            binary(BinaryOperator::Add, num(1.0), num(2.0)),
            num(4.0),
        ))]));
        assert_eq!(result.unwrap(), Value::Number(12.0));
    }

    #[test]
    fn test_string_concat() {
        let result = run(script(vec![expr(binary(BinaryOperator::Add, string("n="), num(3.0)))]));
        assert_eq!(result.unwrap(), Value::string("n=3"));
    }

    #[test]
    fn test_undefined_global_is_reference_error() {
        let err = run(script(vec![expr(ident("nope"))])).unwrap_err();
        assert!(matches!(err, VmError::ReferenceError(_)));
        assert_eq!(err.to_string(), "ReferenceError: nope is not defined");
    }

    #[test]
    fn test_uncaught_throw() {
        let err = run(script(vec![throw(string("boom"))])).unwrap_err();
        match err {
            VmError::Uncaught(value) => assert_eq!(value, Value::string("boom")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_runtime_errors_are_catchable() {
        let program = script(vec![
            var("r", None),
            try_(
                vec![expr(member(null(), "x"))],
                Some((Some("e"), vec![expr(assign(ident("r"), ident("e")))])),
                None,
            ),
            expr(ident("r")),
        ]);
        let result = run(program).unwrap();
        assert!(result.to_string().starts_with("TypeError: Cannot read properties of null"));
    }

    #[test]
    fn test_array_methods() {
        let program = script(vec![
            let_("a", Some(array(vec![num(1.0)]))),
            expr(method_call(ident("a"), "push", vec![num(2.0), num(3.0)])),
            expr(method_call(ident("a"), "join", vec![string("-")])),
        ]);
        assert_eq!(run(program).unwrap(), Value::string("1-2-3"));
    }

    #[test]
    fn test_unbounded_recursion_is_range_error() {
        let program = script(vec![
            function("f", &[], vec![ret(Some(call(ident("f"), vec![])))]),
            expr(call(ident("f"), vec![])),
        ]);
        assert!(matches!(run(program).unwrap_err(), VmError::RangeError(_)));
    }

    #[test]
    fn test_huge_array_index_is_range_error() {
        let program = script(vec![
            let_("a", Some(array(vec![]))),
            expr(assign(index(ident("a"), num(1e9)), num(1.0))),
        ]);
        assert!(matches!(run(program).unwrap_err(), VmError::RangeError(_)));

        let program = script(vec![
            let_("a", Some(array(vec![]))),
            expr(assign(index(ident("a"), num(4.0)), num(1.0))),
            expr(member(ident("a"), "length")),
        ]);
        assert_eq!(run(program).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_assignment_to_undeclared_name_creates_global() {
        let program = script(vec![expr(assign(ident("g"), num(7.0)))]);
        let output = compile(&program, &CompilerOptions::default()).unwrap();
        let mut vm = VM::new();
        vm.execute(&output).unwrap();
        assert_eq!(vm.global("g"), Some(&Value::Number(7.0)));
    }
}
