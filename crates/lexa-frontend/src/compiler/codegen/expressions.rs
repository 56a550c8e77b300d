// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression compilation.
//!
//! Every expression leaves exactly one value on the operand stack.

use crate::ast::*;
use crate::compiler::bytecode::{Constant, OpCode, Operand};
use crate::error::{ErrorKind, Result};

use super::{Compiler, StoreKind};

fn binary_opcode(op: BinaryOperator) -> Option<OpCode> {
    Some(match op {
        BinaryOperator::Add => OpCode::Add,
        BinaryOperator::Subtract => OpCode::Sub,
        BinaryOperator::Multiply => OpCode::Mul,
        BinaryOperator::Divide => OpCode::Div,
        BinaryOperator::Modulo => OpCode::Mod,
        BinaryOperator::Equal => OpCode::Eq,
        BinaryOperator::NotEqual => OpCode::Ne,
        BinaryOperator::StrictEqual => OpCode::StrictEq,
        BinaryOperator::StrictNotEqual => OpCode::StrictNe,
        BinaryOperator::LessThan => OpCode::Lt,
        BinaryOperator::LessThanEqual => OpCode::Le,
        BinaryOperator::GreaterThan => OpCode::Gt,
        BinaryOperator::GreaterThanEqual => OpCode::Ge,
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr | BinaryOperator::NullishCoalescing => return None,
    })
}

impl Compiler<'_, '_> {
    pub(super) fn compile_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Literal(lit) => self.compile_literal(lit),
            Expression::Identifier(id) => self.load_name(id),
            Expression::Array(array) => {
                for element in &array.elements {
                    match element {
                        Some(e) => self.compile_expression(e)?,
                        None => {
                            self.emit_op(OpCode::LoadUndefined);
                        }
                    }
                }
                let count = u16::try_from(array.elements.len()).map_err(|_| ErrorKind::LimitExceeded {
                    what: "array literal elements",
                    limit: u16::MAX as u32,
                })?;
                self.emit_with(OpCode::NewArray, Operand::Count(count));
                Ok(())
            }
            Expression::Object(object) => {
                self.emit_op(OpCode::NewObject);
                for prop in &object.properties {
                    self.emit_op(OpCode::Dup);
                    match &prop.key {
                        PropertyKey::Identifier(id) => {
                            let k = self.name_constant(&id.name)?;
                            self.compile_expression(&prop.value)?;
                            self.emit_with(OpCode::SetProperty, Operand::Property(k));
                        }
                        PropertyKey::Literal(lit) => {
                            let k = self.name_constant(&literal_key(lit))?;
                            self.compile_expression(&prop.value)?;
                            self.emit_with(OpCode::SetProperty, Operand::Property(k));
                        }
                        PropertyKey::Computed(key) => {
                            self.compile_expression(key)?;
                            self.compile_expression(&prop.value)?;
                            self.emit_op(OpCode::SetElement);
                        }
                    }
                    self.emit_op(OpCode::Pop);
                }
                Ok(())
            }
            Expression::Binary(bin) => self.compile_binary(bin),
            Expression::Unary(unary) => {
                match (&unary.operator, unary.argument.as_ref()) {
                    (UnaryOperator::Typeof, Expression::Identifier(id)) => self.load_name_for_typeof(id)?,
                    _ => self.compile_expression(&unary.argument)?,
                }
                match unary.operator {
                    UnaryOperator::Minus => {
                        self.emit_op(OpCode::Neg);
                    }
                    UnaryOperator::Plus => {
                        self.emit_op(OpCode::ToNumber);
                    }
                    UnaryOperator::LogicalNot => {
                        self.emit_op(OpCode::Not);
                    }
                    UnaryOperator::Typeof => {
                        self.emit_op(OpCode::TypeOf);
                    }
                    UnaryOperator::Void => {
                        self.emit_op(OpCode::Pop);
                        self.emit_op(OpCode::LoadUndefined);
                    }
                }
                Ok(())
            }
            Expression::Assignment(assign) => self.compile_assignment(assign),
            Expression::Update(update) => self.compile_update(update),
            Expression::Call(call) => {
                self.compile_expression(&call.callee)?;
                let argc = self.compile_arguments(&call.arguments)?;
                self.emit_with(OpCode::Call, Operand::ArgCount(argc));
                Ok(())
            }
            Expression::New(new) => {
                self.compile_expression(&new.callee)?;
                let argc = self.compile_arguments(&new.arguments)?;
                self.emit_with(OpCode::New, Operand::ArgCount(argc));
                Ok(())
            }
            Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    MemberProperty::Identifier(name) => {
                        let k = self.name_constant(&name.name)?;
                        self.emit_with(OpCode::GetProperty, Operand::Property(k));
                    }
                    MemberProperty::Expression(key) => {
                        self.compile_expression(key)?;
                        self.emit_op(OpCode::GetElement);
                    }
                }
                Ok(())
            }
            Expression::Conditional(cond) => {
                let else_label = self.new_label();
                let end = self.new_label();
                self.compile_expression(&cond.test)?;
                self.emit_jump(OpCode::JumpIfFalse, else_label);
                self.compile_expression(&cond.consequent)?;
                self.emit_jump(OpCode::Jump, end);
                self.bind_label(else_label);
                self.compile_expression(&cond.alternate)?;
                self.bind_label(end);
                Ok(())
            }
            Expression::Function(func) => self.compile_closure(func.as_node()),
            Expression::Arrow(arrow) => self.compile_closure(arrow.as_node()),
            Expression::Sequence(seq) => {
                let Some((last, rest)) = seq.expressions.split_last() else {
                    self.emit_op(OpCode::LoadUndefined);
                    return Ok(());
                };
                for e in rest {
                    self.compile_expression(e)?;
                    self.emit_op(OpCode::Pop);
                }
                self.compile_expression(last)
            }
        }
    }

    fn compile_closure(&mut self, func: FunctionNode<'_>) -> Result<()> {
        let index = self.compile_function(func)?;
        self.emit_with(OpCode::Closure, Operand::Function(index));
        Ok(())
    }

    fn compile_literal(&mut self, lit: &Literal) -> Result<()> {
        match lit {
            Literal::Number(n) => {
                let small = n.fract() == 0.0 && n.abs() <= i32::MAX as f64 && !(*n == 0.0 && n.is_sign_negative());
                if small {
                    self.emit_int(*n as i32);
                } else {
                    let k = self.state.bytecode.add_constant(Constant::Number(*n))?;
                    self.emit_with(OpCode::LoadConst, Operand::Constant(k));
                }
            }
            Literal::String(s) => {
                let k = self.state.bytecode.add_constant(Constant::String(s.clone()))?;
                self.emit_with(OpCode::LoadConst, Operand::Constant(k));
            }
            Literal::Boolean(true) => {
                self.emit_op(OpCode::LoadTrue);
            }
            Literal::Boolean(false) => {
                self.emit_op(OpCode::LoadFalse);
            }
            Literal::Null => {
                self.emit_op(OpCode::LoadNull);
            }
            Literal::Undefined => {
                self.emit_op(OpCode::LoadUndefined);
            }
        }
        Ok(())
    }

    fn compile_arguments(&mut self, arguments: &[Expression]) -> Result<u8> {
        let argc = u8::try_from(arguments.len()).map_err(|_| ErrorKind::LimitExceeded {
            what: "call arguments",
            limit: u8::MAX as u32,
        })?;
        for arg in arguments {
            self.compile_expression(arg)?;
        }
        Ok(argc)
    }

    fn compile_binary(&mut self, bin: &BinaryExpression) -> Result<()> {
        if let Some(op) = binary_opcode(bin.operator) {
            self.compile_expression(&bin.left)?;
            self.compile_expression(&bin.right)?;
            self.emit_op(op);
            return Ok(());
        }

        // Short-circuit: keep the left value when it decides the result.
        let end = self.new_label();
        self.compile_expression(&bin.left)?;
        self.emit_op(OpCode::Dup);
        match bin.operator {
            BinaryOperator::LogicalAnd => {
                self.emit_jump(OpCode::JumpIfFalse, end);
            }
            BinaryOperator::LogicalOr => {
                self.emit_jump(OpCode::JumpIfTrue, end);
            }
            _ => {
                // `null == value` holds exactly for null and undefined.
                self.emit_op(OpCode::LoadNull);
                self.emit_op(OpCode::Eq);
                self.emit_jump(OpCode::JumpIfFalse, end);
            }
        }
        self.emit_op(OpCode::Pop);
        self.compile_expression(&bin.right)?;
        self.bind_label(end);
        Ok(())
    }

    // ========================================================================
    // Assignment targets
    // ========================================================================

    fn compile_assignment(&mut self, assign: &AssignmentExpression) -> Result<()> {
        let op = assign.operator.binary_operator().and_then(binary_opcode);
        match assign.left.as_ref() {
            Expression::Identifier(id) => {
                if let Some(op) = op {
                    self.load_name(id)?;
                    self.compile_expression(&assign.right)?;
                    self.emit_op(op);
                } else {
                    self.compile_expression(&assign.right)?;
                }
                self.emit_op(OpCode::Dup);
                self.store_name(id, StoreKind::Assign)
            }
            Expression::Member(member) => {
                self.compile_expression(&member.object)?;
                match &member.property {
                    MemberProperty::Identifier(name) => {
                        let k = self.name_constant(&name.name)?;
                        if let Some(op) = op {
                            self.emit_op(OpCode::Dup);
                            self.emit_with(OpCode::GetProperty, Operand::Property(k));
                            self.compile_expression(&assign.right)?;
                            self.emit_op(op);
                        } else {
                            self.compile_expression(&assign.right)?;
                        }
                        self.emit_with(OpCode::SetProperty, Operand::Property(k));
                    }
                    MemberProperty::Expression(key) => {
                        self.compile_expression(key)?;
                        if let Some(op) = op {
                            let (object, key) = self.spill_pair()?;
                            self.emit_with(OpCode::LoadReg, Operand::Register(object));
                            self.emit_with(OpCode::LoadReg, Operand::Register(key));
                            self.emit_op(OpCode::GetElement);
                            self.compile_expression(&assign.right)?;
                            self.emit_op(op);
                        } else {
                            self.compile_expression(&assign.right)?;
                        }
                        self.emit_op(OpCode::SetElement);
                    }
                }
                Ok(())
            }
            _ => Err(ErrorKind::InvalidAssignmentTarget.into()),
        }
    }

    /// Moves `[object, key]` into two temporaries and pushes them back,
    /// so the pair can be read again.
    fn spill_pair(&mut self) -> Result<(u16, u16)> {
        let object = self.alloc_temp()?;
        let key = self.alloc_temp()?;
        self.emit_with(OpCode::StoreReg, Operand::Register(key));
        self.emit_with(OpCode::StoreReg, Operand::Register(object));
        self.emit_with(OpCode::LoadReg, Operand::Register(object));
        self.emit_with(OpCode::LoadReg, Operand::Register(key));
        Ok((object, key))
    }

    fn compile_update(&mut self, update: &UpdateExpression) -> Result<()> {
        let op = match update.operator {
            UpdateOperator::Increment => OpCode::Add,
            UpdateOperator::Decrement => OpCode::Sub,
        };
        match update.argument.as_ref() {
            Expression::Identifier(id) => {
                self.load_name(id)?;
                self.emit_op(OpCode::ToNumber);
                if !update.prefix {
                    self.emit_op(OpCode::Dup);
                }
                self.emit_int(1);
                self.emit_op(op);
                if update.prefix {
                    self.emit_op(OpCode::Dup);
                }
                self.store_name(id, StoreKind::Assign)
            }
            Expression::Member(member) => {
                let old = self.alloc_temp()?;
                self.compile_expression(&member.object)?;
                match &member.property {
                    MemberProperty::Identifier(name) => {
                        let k = self.name_constant(&name.name)?;
                        self.emit_op(OpCode::Dup);
                        self.emit_with(OpCode::GetProperty, Operand::Property(k));
                        self.emit_op(OpCode::ToNumber);
                        self.emit_op(OpCode::Dup);
                        self.emit_with(OpCode::StoreReg, Operand::Register(old));
                        self.emit_int(1);
                        self.emit_op(op);
                        self.emit_with(OpCode::SetProperty, Operand::Property(k));
                    }
                    MemberProperty::Expression(key) => {
                        self.compile_expression(key)?;
                        let (object, key) = self.spill_pair()?;
                        self.emit_with(OpCode::LoadReg, Operand::Register(object));
                        self.emit_with(OpCode::LoadReg, Operand::Register(key));
                        self.emit_op(OpCode::GetElement);
                        self.emit_op(OpCode::ToNumber);
                        self.emit_op(OpCode::Dup);
                        self.emit_with(OpCode::StoreReg, Operand::Register(old));
                        self.emit_int(1);
                        self.emit_op(op);
                        self.emit_op(OpCode::SetElement);
                    }
                }
                if !update.prefix {
                    self.emit_op(OpCode::Pop);
                    self.emit_with(OpCode::LoadReg, Operand::Register(old));
                }
                Ok(())
            }
            _ => Err(ErrorKind::InvalidAssignmentTarget.into()),
        }
    }
}

/// Property name for a literal object key.
fn literal_key(lit: &Literal) -> String {
    match lit {
        Literal::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Literal::Number(n) => n.to_string(),
        Literal::String(s) => s.clone(),
        Literal::Boolean(b) => b.to_string(),
        Literal::Null => "null".to_string(),
        Literal::Undefined => "undefined".to_string(),
    }
}
