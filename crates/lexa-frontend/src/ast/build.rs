// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Constructor helpers for hand-built trees.
//!
//! The compiler never parses source text, so tests and embedders use these
//! helpers to assemble programs without spelling out every struct.

use super::*;

/// A script program.
pub fn script(body: Vec<Statement>) -> Program {
    Program {
        source_type: SourceType::Script,
        body,
    }
}

/// A module program.
pub fn module(body: Vec<Statement>) -> Program {
    Program {
        source_type: SourceType::Module,
        body,
    }
}

/// An identifier without location.
pub fn id(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
        loc: SourceLocation::default(),
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Identifier reference.
pub fn ident(name: &str) -> Expression {
    Expression::Identifier(id(name))
}

/// Numeric literal.
pub fn num(value: f64) -> Expression {
    Expression::Literal(Literal::Number(value))
}

/// String literal.
pub fn string(value: &str) -> Expression {
    Expression::Literal(Literal::String(value.to_string()))
}

/// Boolean literal.
pub fn boolean(value: bool) -> Expression {
    Expression::Literal(Literal::Boolean(value))
}

/// `null`.
pub fn null() -> Expression {
    Expression::Literal(Literal::Null)
}

/// `undefined`.
pub fn undefined() -> Expression {
    Expression::Literal(Literal::Undefined)
}

/// Array literal without holes.
pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::Array(ArrayExpression {
        elements: elements.into_iter().map(Some).collect(),
    })
}

/// Object literal with identifier keys.
pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectExpression {
        properties: properties
            .into_iter()
            .map(|(key, value)| Property {
                key: PropertyKey::Identifier(id(key)),
                value,
            })
            .collect(),
    })
}

/// Binary expression.
pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Unary expression.
pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        argument: Box::new(argument),
    })
}

/// Simple assignment `left = right`.
pub fn assign(left: Expression, right: Expression) -> Expression {
    assign_op(AssignmentOperator::Assign, left, right)
}

/// Assignment with an explicit operator.
pub fn assign_op(operator: AssignmentOperator, left: Expression, right: Expression) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// Update expression such as `i++` or `--i`.
pub fn update(operator: UpdateOperator, prefix: bool, argument: Expression) -> Expression {
    Expression::Update(UpdateExpression {
        operator,
        prefix,
        argument: Box::new(argument),
    })
}

/// Postfix increment `name++`.
pub fn incr(name: &str) -> Expression {
    update(UpdateOperator::Increment, false, ident(name))
}

/// Call expression.
pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// `new` expression.
pub fn new(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::New(NewExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// Dotted member access `object.name`.
pub fn member(object: Expression, name: &str) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: MemberProperty::Identifier(id(name)),
    })
}

/// Computed member access `object[index]`.
pub fn index(object: Expression, index: Expression) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: MemberProperty::Expression(Box::new(index)),
    })
}

/// Method call `object.name(arguments)`.
pub fn method_call(object: Expression, name: &str, arguments: Vec<Expression>) -> Expression {
    call(member(object, name), arguments)
}

/// Conditional expression.
pub fn conditional(test: Expression, consequent: Expression, alternate: Expression) -> Expression {
    Expression::Conditional(ConditionalExpression {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

/// Sequence expression.
pub fn sequence(expressions: Vec<Expression>) -> Expression {
    Expression::Sequence(SequenceExpression { expressions })
}

/// Function expression.
pub fn function_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::Function(FunctionExpression {
        id: name.map(id),
        params: params.iter().map(|p| id(p)).collect(),
        body,
    })
}

/// Arrow function with a concise expression body.
pub fn arrow(params: &[&str], body: Expression) -> Expression {
    Expression::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Expression(Box::new(body)),
    })
}

/// Arrow function with a block body.
pub fn arrow_block(params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Block(body),
    })
}

// ============================================================================
// Statements
// ============================================================================

fn declaration(kind: VariableKind, name: &str, init: Option<Expression>) -> VariableDeclaration {
    VariableDeclaration {
        kind,
        declarations: vec![VariableDeclarator { id: id(name), init }],
    }
}

/// `var name = init;`
pub fn var(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Var, name, init))
}

/// `let name = init;`
pub fn let_(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Let, name, init))
}

/// `const name = init;`
pub fn const_(name: &str, init: Expression) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Const, name, Some(init)))
}

/// Expression statement.
pub fn expr(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement { expression })
}

/// Block statement.
pub fn block(body: Vec<Statement>) -> Statement {
    Statement::Block(BlockStatement { body })
}

/// Function declaration.
pub fn function(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(FunctionDeclaration {
        id: id(name),
        params: params.iter().map(|p| id(p)).collect(),
        body,
    })
}

/// `return argument;`
pub fn ret(argument: Option<Expression>) -> Statement {
    Statement::Return(ReturnStatement {
        argument,
        loc: SourceLocation::default(),
    })
}

/// `break label;`
pub fn break_(label: Option<&str>) -> Statement {
    Statement::Break(BreakStatement {
        label: label.map(id),
        loc: SourceLocation::default(),
    })
}

/// `continue label;`
pub fn continue_(label: Option<&str>) -> Statement {
    Statement::Continue(ContinueStatement {
        label: label.map(id),
        loc: SourceLocation::default(),
    })
}

/// `throw argument;`
pub fn throw(argument: Expression) -> Statement {
    Statement::Throw(ThrowStatement { argument })
}

/// If statement.
pub fn if_(test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
    Statement::If(IfStatement {
        test,
        consequent: Box::new(consequent),
        alternate: alternate.map(Box::new),
    })
}

/// While statement.
pub fn while_(test: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement {
        test,
        body: Box::new(body),
    })
}

/// Do-while statement.
pub fn do_while(body: Statement, test: Expression) -> Statement {
    Statement::DoWhile(DoWhileStatement {
        body: Box::new(body),
        test,
    })
}

/// Classic `for` loop whose initializer is a `let` declaration.
pub fn for_let(
    name: &str,
    init: Expression,
    test: Option<Expression>,
    update: Option<Expression>,
    body: Statement,
) -> Statement {
    for_decl(VariableKind::Let, name, init, test, update, body)
}

/// Classic `for` loop with a single-declarator initializer.
pub fn for_decl(
    kind: VariableKind,
    name: &str,
    init: Expression,
    test: Option<Expression>,
    update: Option<Expression>,
    body: Statement,
) -> Statement {
    Statement::For(ForStatement {
        init: Some(ForInit::Declaration(declaration(kind, name, Some(init)))),
        test,
        update,
        body: Box::new(body),
    })
}

/// Classic `for` loop with arbitrary parts.
pub fn for_(
    init: Option<ForInit>,
    test: Option<Expression>,
    update: Option<Expression>,
    body: Statement,
) -> Statement {
    Statement::For(ForStatement {
        init,
        test,
        update,
        body: Box::new(body),
    })
}

/// `for (kind name in right) body`
pub fn for_in(kind: VariableKind, name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForIn(ForInStatement {
        left: ForInLeft::Declaration(declaration(kind, name, None)),
        right,
        body: Box::new(body),
    })
}

/// `for (kind name of right) body`
pub fn for_of(kind: VariableKind, name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForOf(ForOfStatement {
        left: ForInLeft::Declaration(declaration(kind, name, None)),
        right,
        body: Box::new(body),
    })
}

/// Labeled statement.
pub fn labeled(label: &str, body: Statement) -> Statement {
    Statement::Labeled(LabeledStatement {
        label: id(label),
        body: Box::new(body),
    })
}

/// Switch statement; a `None` test is the default clause.
pub fn switch(discriminant: Expression, cases: Vec<(Option<Expression>, Vec<Statement>)>) -> Statement {
    Statement::Switch(SwitchStatement {
        discriminant,
        cases: cases
            .into_iter()
            .map(|(test, consequent)| SwitchCase { test, consequent })
            .collect(),
    })
}

/// Try statement.
pub fn try_(
    block: Vec<Statement>,
    handler: Option<(Option<&str>, Vec<Statement>)>,
    finalizer: Option<Vec<Statement>>,
) -> Statement {
    Statement::Try(TryStatement {
        block: BlockStatement { body: block },
        handler: handler.map(|(param, body)| CatchClause {
            param: param.map(id),
            body: BlockStatement { body },
        }),
        finalizer: finalizer.map(|body| BlockStatement { body }),
    })
}
