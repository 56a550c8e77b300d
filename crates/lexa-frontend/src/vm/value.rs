// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime values of the reference interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::compiler::bytecode::{CompiledFunction, Constant, HandlerEntry, Instruction};

/// A loaded function: the compiled code plus its nested functions, shared
/// between every closure created from it.
#[derive(Debug)]
pub struct Prototype {
    /// Display name
    pub name: String,
    /// Registers to allocate per call
    pub register_count: u32,
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// The constant pool
    pub constants: Vec<Constant>,
    /// Handler table
    pub handlers: Vec<HandlerEntry>,
    /// Nested functions by index
    pub nested: Vec<Rc<Prototype>>,
}

impl Prototype {
    /// Loads a compiled function tree.
    pub fn load(function: &CompiledFunction) -> Rc<Self> {
        Rc::new(Self {
            name: function.name.clone(),
            register_count: function.register_count,
            instructions: function.instructions.clone(),
            constants: function.constants.clone(),
            handlers: function.handlers.clone(),
            nested: function.functions.iter().map(Prototype::load).collect(),
        })
    }

    /// Innermost handler covering `pc`.
    pub fn handler_for(&self, pc: u32) -> Option<&HandlerEntry> {
        self.handlers
            .iter()
            .filter(|h| h.covers(pc))
            .min_by_key(|h| h.end - h.start)
    }
}

/// A lexical environment frame at runtime.
#[derive(Debug)]
pub struct Environment {
    /// Slot values
    pub slots: RefCell<Vec<Value>>,
    /// Enclosing frame
    pub parent: Option<Rc<Environment>>,
}

impl Environment {
    /// Creates a frame with `count` undefined slots.
    pub fn new(count: usize, parent: Option<Rc<Environment>>) -> Self {
        Self {
            slots: RefCell::new(vec![Value::Undefined; count]),
            parent,
        }
    }

    /// Walks `depth` frames outward.
    pub fn ancestor(self: &Rc<Self>, depth: usize) -> Option<Rc<Environment>> {
        let mut env = Rc::clone(self);
        for _ in 0..depth {
            env = env.parent.clone()?;
        }
        Some(env)
    }
}

/// A function value.
pub struct Closure {
    /// The code
    pub prototype: Rc<Prototype>,
    /// Environment captured at creation
    pub env: Option<Rc<Environment>>,
}

/// A built-in method bound to its receiver.
#[derive(Debug)]
pub struct NativeMethod {
    /// The receiver
    pub receiver: Value,
    /// Method name
    pub name: &'static str,
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String
    String(Rc<str>),
    /// Array
    Array(Rc<RefCell<Vec<Value>>>),
    /// Plain object with properties in insertion order
    Object(Rc<RefCell<Vec<(String, Value)>>>),
    /// User function
    Closure(Rc<Closure>),
    /// Bound built-in method
    Native(Rc<NativeMethod>),
}

impl Value {
    /// Creates a string value.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Creates an array value.
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    /// Creates an empty object.
    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(Vec::new())))
    }

    /// ToBoolean.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ToNumber.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// The `typeof` result.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Closure(_) | Value::Native(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
        }
    }

    /// Strict equality (`===`).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Abstract equality (`==`), without object-to-primitive conversion.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Boolean(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Boolean(_)) => self.loose_equals(&Value::Number(other.to_number())),
            _ => self.strict_equals(other),
        }
    }
}

/// Formats a number the way ECMAScript's ToString does for common cases.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                let items = items.borrow();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        Value::Undefined | Value::Null => {}
                        other => write!(f, "{}", other)?,
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Closure(c) => write!(f, "function {}() {{ [code] }}", c.prototype.name),
            Value::Native(m) => write!(f, "function {}() {{ [native code] }}", m.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Object(props) => {
                let props = props.borrow();
                f.debug_map().entries(props.iter().map(|(k, v)| (k, v))).finish()
            }
            Value::Closure(c) => write!(f, "<closure {}>", c.prototype.name),
            other => write!(f, "{}", other),
        }
    }
}
