// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree (AST) definitions for the compiled ECMAScript subset.
//!
//! These structures are designed to be ESTree-compatible where possible. The
//! tree is produced by an external parser (or by the helpers in [`build`]) and
//! is only ever read by the compiler passes.

pub mod build;

use serde::{Deserialize, Serialize};

/// A position in the original source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line number (0 when unknown)
    pub line: u32,
    /// 1-based column number (0 when unknown)
    pub column: u32,
}

impl SourceLocation {
    /// Creates a location from a line and column.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Whether a program is a classic script or a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Classic script, top-level scope is the global scope
    #[default]
    Script,
    /// ES module, top-level scope is a module scope
    Module,
}

/// A complete program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// Script or module
    #[serde(default)]
    pub source_type: SourceType,
    /// The statements in the program
    pub body: Vec<Statement>,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
    /// Where the identifier appears
    #[serde(default)]
    pub loc: SourceLocation,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Variable declaration (var, let, const)
    VariableDeclaration(VariableDeclaration),
    /// Function declaration
    FunctionDeclaration(FunctionDeclaration),
    /// Expression statement
    Expression(ExpressionStatement),
    /// Block statement { ... }
    Block(BlockStatement),
    /// If statement
    If(IfStatement),
    /// Switch statement
    Switch(SwitchStatement),
    /// While statement
    While(WhileStatement),
    /// Do-while statement
    DoWhile(DoWhileStatement),
    /// For statement
    For(ForStatement),
    /// For-in statement
    ForIn(ForInStatement),
    /// For-of statement
    ForOf(ForOfStatement),
    /// Return statement
    Return(ReturnStatement),
    /// Break statement, optionally labeled
    Break(BreakStatement),
    /// Continue statement, optionally labeled
    Continue(ContinueStatement),
    /// Throw statement
    Throw(ThrowStatement),
    /// Try statement
    Try(TryStatement),
    /// Labeled statement
    Labeled(LabeledStatement),
    /// Debugger statement
    Debugger,
    /// Empty statement (;)
    Empty,
}

/// Variable declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// var declaration
    Var,
    /// let declaration
    Let,
    /// const declaration
    Const,
}

/// A variable declaration statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    /// The kind of declaration
    pub kind: VariableKind,
    /// The declarators
    pub declarations: Vec<VariableDeclarator>,
}

/// A single variable declarator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    /// The identifier being declared
    pub id: Identifier,
    /// Optional initializer expression
    #[serde(default)]
    pub init: Option<Expression>,
}

/// A function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// The function name
    pub id: Identifier,
    /// The parameters
    pub params: Vec<Identifier>,
    /// The function body
    pub body: Vec<Statement>,
}

/// An expression statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    /// The expression
    pub expression: Expression,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockStatement {
    /// The statements in the block
    pub body: Vec<Statement>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// The condition
    pub test: Expression,
    /// The then branch
    pub consequent: Box<Statement>,
    /// The optional else branch
    #[serde(default)]
    pub alternate: Option<Box<Statement>>,
}

/// A while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    /// The condition
    pub test: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A do-while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoWhileStatement {
    /// The loop body
    pub body: Box<Statement>,
    /// The condition
    pub test: Expression,
}

/// A for statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    /// The initializer
    #[serde(default)]
    pub init: Option<ForInit>,
    /// The condition
    #[serde(default)]
    pub test: Option<Expression>,
    /// The update expression
    #[serde(default)]
    pub update: Option<Expression>,
    /// The loop body
    pub body: Box<Statement>,
}

/// For loop initializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInit {
    /// Variable declaration
    Declaration(VariableDeclaration),
    /// Expression
    Expression(Expression),
}

/// A for-in statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForInStatement {
    /// The left-hand side
    pub left: ForInLeft,
    /// The object to iterate over
    pub right: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A for-of statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForOfStatement {
    /// The left-hand side
    pub left: ForInLeft,
    /// The iterable
    pub right: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// Left-hand side of for-in/for-of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInLeft {
    /// Variable declaration with a single declarator
    Declaration(VariableDeclaration),
    /// Assignment target (identifier or member)
    Expression(Expression),
}

/// A switch statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    /// The discriminant expression
    pub discriminant: Expression,
    /// The case clauses
    pub cases: Vec<SwitchCase>,
}

/// A switch case clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// The test expression (None for default)
    #[serde(default)]
    pub test: Option<Expression>,
    /// The consequent statements
    pub consequent: Vec<Statement>,
}

/// A return statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    /// The return value
    #[serde(default)]
    pub argument: Option<Expression>,
    /// Where the statement appears
    #[serde(default)]
    pub loc: SourceLocation,
}

/// A break statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakStatement {
    /// Optional target label
    #[serde(default)]
    pub label: Option<Identifier>,
    /// Where the statement appears
    #[serde(default)]
    pub loc: SourceLocation,
}

/// A continue statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueStatement {
    /// Optional target label
    #[serde(default)]
    pub label: Option<Identifier>,
    /// Where the statement appears
    #[serde(default)]
    pub loc: SourceLocation,
}

/// A throw statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowStatement {
    /// The thrown expression
    pub argument: Expression,
}

/// A try statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStatement {
    /// The try block
    pub block: BlockStatement,
    /// The catch clause
    #[serde(default)]
    pub handler: Option<CatchClause>,
    /// The finally block
    #[serde(default)]
    pub finalizer: Option<BlockStatement>,
}

/// A catch clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// The error parameter
    #[serde(default)]
    pub param: Option<Identifier>,
    /// The catch body
    pub body: BlockStatement,
}

/// A labeled statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledStatement {
    /// The label identifier
    pub label: Identifier,
    /// The labeled body
    pub body: Box<Statement>,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Literal value
    Literal(Literal),
    /// Identifier reference
    Identifier(Identifier),
    /// Array literal
    Array(ArrayExpression),
    /// Object literal
    Object(ObjectExpression),
    /// Binary expression (including `&&`, `||` and `??`)
    Binary(BinaryExpression),
    /// Unary expression
    Unary(UnaryExpression),
    /// Assignment expression
    Assignment(AssignmentExpression),
    /// Call expression
    Call(CallExpression),
    /// Member access expression
    Member(MemberExpression),
    /// Conditional (ternary) expression
    Conditional(ConditionalExpression),
    /// Function expression
    Function(FunctionExpression),
    /// Arrow function expression
    Arrow(ArrowFunctionExpression),
    /// new expression
    New(NewExpression),
    /// Update expression (++/--)
    Update(UpdateExpression),
    /// Sequence expression (comma operator)
    Sequence(SequenceExpression),
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// null literal
    Null,
    /// undefined literal
    Undefined,
}

/// An array expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpression {
    /// The elements (None represents a hole)
    pub elements: Vec<Option<Expression>>,
}

/// An object expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpression {
    /// The properties
    pub properties: Vec<Property>,
}

/// An object property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The property key
    pub key: PropertyKey,
    /// The property value
    pub value: Expression,
}

/// A property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyKey {
    /// Identifier key
    Identifier(Identifier),
    /// Computed key
    Computed(Box<Expression>),
    /// Literal key (e.g., numeric or string)
    Literal(Literal),
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// The left operand
    pub left: Box<Expression>,
    /// The right operand
    pub right: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // Comparison
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    // Logical
    LogicalAnd,
    LogicalOr,
    NullishCoalescing,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub argument: Box<Expression>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// -
    Minus,
    /// +
    Plus,
    /// !
    LogicalNot,
    /// typeof
    Typeof,
    /// void
    Void,
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    /// The operator
    pub operator: AssignmentOperator,
    /// The assignment target
    pub left: Box<Expression>,
    /// The assigned value
    pub right: Box<Expression>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOperator {
    /// =
    Assign,
    /// +=
    AddAssign,
    /// -=
    SubtractAssign,
    /// *=
    MultiplyAssign,
    /// /=
    DivideAssign,
    /// %=
    ModuloAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::AddAssign => Some(BinaryOperator::Add),
            AssignmentOperator::SubtractAssign => Some(BinaryOperator::Subtract),
            AssignmentOperator::MultiplyAssign => Some(BinaryOperator::Multiply),
            AssignmentOperator::DivideAssign => Some(BinaryOperator::Divide),
            AssignmentOperator::ModuloAssign => Some(BinaryOperator::Modulo),
        }
    }
}

/// A call expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    /// The function being called
    pub callee: Box<Expression>,
    /// The arguments
    pub arguments: Vec<Expression>,
}

/// A member access expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberExpression {
    /// The object
    pub object: Box<Expression>,
    /// The property
    pub property: MemberProperty,
}

/// Member property access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberProperty {
    /// Dot notation (obj.prop)
    Identifier(Identifier),
    /// Bracket notation (obj[expr])
    Expression(Box<Expression>),
}

/// A conditional expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpression {
    /// The condition
    pub test: Box<Expression>,
    /// The value if true
    pub consequent: Box<Expression>,
    /// The value if false
    pub alternate: Box<Expression>,
}

/// A function expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpression {
    /// Optional function name, bound inside the function only
    #[serde(default)]
    pub id: Option<Identifier>,
    /// The parameters
    pub params: Vec<Identifier>,
    /// The function body
    pub body: Vec<Statement>,
}

/// An arrow function expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrowFunctionExpression {
    /// The parameters
    pub params: Vec<Identifier>,
    /// The body
    pub body: ArrowBody,
}

/// Arrow function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrowBody {
    /// Expression body
    Expression(Box<Expression>),
    /// Block body
    Block(Vec<Statement>),
}

/// A new expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExpression {
    /// The constructor
    pub callee: Box<Expression>,
    /// The arguments
    pub arguments: Vec<Expression>,
}

/// An update expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpression {
    /// The operator
    pub operator: UpdateOperator,
    /// Whether the operator is prefix
    pub prefix: bool,
    /// The argument
    pub argument: Box<Expression>,
}

/// Update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOperator {
    /// ++
    Increment,
    /// --
    Decrement,
}

/// A sequence expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpression {
    /// The expressions
    pub expressions: Vec<Expression>,
}

/// Borrowed view over the three function forms, so passes can treat
/// declarations, expressions and arrows uniformly.
#[derive(Debug, Clone, Copy)]
pub struct FunctionNode<'a> {
    /// Name bound in the enclosing scope (declarations only)
    pub declared_name: Option<&'a Identifier>,
    /// Name bound inside the function (named function expressions only)
    pub self_name: Option<&'a Identifier>,
    /// Parameters
    pub params: &'a [Identifier],
    /// Body
    pub body: FunctionBodyRef<'a>,
    /// Whether this is an arrow function
    pub is_arrow: bool,
}

/// Borrowed function body.
#[derive(Debug, Clone, Copy)]
pub enum FunctionBodyRef<'a> {
    /// Statement list
    Statements(&'a [Statement]),
    /// Concise arrow body
    Expression(&'a Expression),
}

impl FunctionDeclaration {
    /// Uniform view of this declaration.
    pub fn as_node(&self) -> FunctionNode<'_> {
        FunctionNode {
            declared_name: Some(&self.id),
            self_name: None,
            params: &self.params,
            body: FunctionBodyRef::Statements(&self.body),
            is_arrow: false,
        }
    }
}

impl FunctionExpression {
    /// Uniform view of this expression.
    pub fn as_node(&self) -> FunctionNode<'_> {
        FunctionNode {
            declared_name: None,
            self_name: self.id.as_ref(),
            params: &self.params,
            body: FunctionBodyRef::Statements(&self.body),
            is_arrow: false,
        }
    }
}

impl ArrowFunctionExpression {
    /// Uniform view of this arrow function.
    pub fn as_node(&self) -> FunctionNode<'_> {
        FunctionNode {
            declared_name: None,
            self_name: None,
            params: &self.params,
            body: match &self.body {
                ArrowBody::Expression(expr) => FunctionBodyRef::Expression(expr),
                ArrowBody::Block(stmts) => FunctionBodyRef::Statements(stmts),
            },
            is_arrow: true,
        }
    }
}

impl<'a> FunctionNode<'a> {
    /// Display name for diagnostics and disassembly.
    pub fn display_name(&self) -> &'a str {
        self.declared_name
            .or(self.self_name)
            .map(|id| id.name.as_str())
            .unwrap_or(if self.is_arrow { "<arrow>" } else { "<anonymous>" })
    }
}

impl Statement {
    /// Returns the nested function declaration, if this is one.
    pub fn as_function_declaration(&self) -> Option<&FunctionDeclaration> {
        match self {
            Statement::FunctionDeclaration(decl) => Some(decl),
            _ => None,
        }
    }

    /// Whether this statement is an iteration statement.
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            Statement::While(_)
                | Statement::DoWhile(_)
                | Statement::For(_)
                | Statement::ForIn(_)
                | Statement::ForOf(_)
        )
    }
}

/// Splits a statement list into the function declarations hoisted to its
/// entry and the remaining statements, both in source order.
///
/// Every pass walks statement lists in this order so that child scopes are
/// visited identically by the collector and the emitter.
pub fn hoisting_order(statements: &[Statement]) -> impl Iterator<Item = &Statement> {
    statements
        .iter()
        .filter(|s| s.as_function_declaration().is_some())
        .chain(
            statements
                .iter()
                .filter(|s| s.as_function_declaration().is_none()),
        )
}
