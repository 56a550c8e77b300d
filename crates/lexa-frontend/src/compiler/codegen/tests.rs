// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the bytecode emitter.

use super::*;
use crate::ast::build::*;
use crate::compiler::{CompileOutput, compile};
use crate::options::CompilerOptions;

fn compile_source(program: Program) -> Result<CompileOutput> {
    compile(&program, &CompilerOptions::default())
}

fn compile_ok(program: Program) -> CompiledFunction {
    compile_source(program).expect("Compilation should succeed").main
}

fn compile_err(program: Program) -> ErrorKind {
    compile_source(program).expect_err("Compilation should fail").kind
}

fn contains(function: &CompiledFunction, opcode: OpCode, operand: Operand) -> bool {
    function
        .instructions
        .contains(&Instruction::with_operand(opcode, operand))
}

fn no_labels_left(function: &CompiledFunction) -> bool {
    function
        .instructions
        .iter()
        .all(|i| !matches!(i.operand, Some(Operand::Label(_))))
        && function.functions.iter().all(no_labels_left)
}

fn push_closure(body: Expression) -> Statement {
    block(vec![expr(method_call(ident("fns"), "push", vec![body]))])
}

#[test]
fn test_compile_empty_program() {
    let main = compile_ok(script(vec![]));
    assert_eq!(
        main.instructions,
        vec![Instruction::simple(OpCode::LoadUndefined), Instruction::simple(OpCode::Return)]
    );
}

#[test]
fn test_trailing_expression_is_program_result() {
    let main = compile_ok(script(vec![expr(binary(BinaryOperator::Add, num(1.0), num(2.0)))]));
    assert_eq!(main.count(OpCode::Pop), 0);
    assert_eq!(main.instructions.last(), Some(&Instruction::simple(OpCode::Return)));
}

#[test]
fn test_uncaptured_let_lives_in_register() {
    let main = compile_ok(script(vec![let_("x", Some(num(1.0))), expr(ident("x"))]));
    assert_eq!(main.count(OpCode::PushLexEnv), 0);
    assert_eq!(main.count(OpCode::StoreReg), 1);
    assert_eq!(main.count(OpCode::LoadReg), 1);
    assert_eq!(main.count(OpCode::LoadSlot), 0);
}

#[test]
fn test_captured_let_lives_in_slot() {
    let main = compile_ok(script(vec![
        let_("x", Some(num(1.0))),
        function("f", &[], vec![ret(Some(ident("x")))]),
    ]));
    assert_eq!(main.count(OpCode::PushLexEnv), 1);
    assert!(contains(&main, OpCode::StoreSlot, Operand::Slot { depth: 0, index: 0 }));
    let f = &main.functions[0];
    assert!(contains(f, OpCode::LoadSlot, Operand::Slot { depth: 0, index: 0 }));
}

#[test]
fn test_slot_depth_counts_intermediate_frames() {
    // outer -> inner: `a` lives two frames up from inner's own frame.
    let main = compile_ok(script(vec![
        let_("a", Some(num(1.0))),
        function(
            "outer",
            &[],
            vec![
                let_("b", Some(num(2.0))),
                function(
                    "inner",
                    &[],
                    vec![
                        let_("c", Some(num(3.0))),
                        expr(arrow(&[], ident("c"))),
                        ret(Some(binary(BinaryOperator::Add, ident("a"), ident("b")))),
                    ],
                ),
            ],
        ),
    ]));
    let inner = &main.functions[0].functions[0];
    assert!(contains(inner, OpCode::LoadSlot, Operand::Slot { depth: 2, index: 0 }));
    assert!(contains(inner, OpCode::LoadSlot, Operand::Slot { depth: 1, index: 0 }));
}

#[test]
fn test_for_let_copies_frame_per_iteration() {
    let main = compile_ok(script(vec![
        let_("fns", Some(array(vec![]))),
        for_let(
            "i",
            num(0.0),
            Some(binary(BinaryOperator::LessThan, ident("i"), num(3.0))),
            Some(incr("i")),
            push_closure(arrow(&[], ident("i"))),
        ),
    ]));
    assert_eq!(main.count(OpCode::PushLexEnv), 1);
    assert_eq!(main.count(OpCode::CopyLexEnv), 2);
    assert_eq!(main.count(OpCode::PopLexEnv), 1);
}

#[test]
fn test_for_let_without_capture_has_no_frame() {
    let main = compile_ok(script(vec![
        let_("fns", Some(array(vec![]))),
        for_let(
            "i",
            num(0.0),
            Some(binary(BinaryOperator::LessThan, ident("i"), num(3.0))),
            Some(incr("i")),
            push_closure(ident("i")),
        ),
    ]));
    assert_eq!(main.count(OpCode::PushLexEnv), 0);
    assert_eq!(main.count(OpCode::CopyLexEnv), 0);
}

#[test]
fn test_for_var_is_not_copied() {
    let main = compile_ok(script(vec![
        let_("fns", Some(array(vec![]))),
        for_decl(
            VariableKind::Var,
            "i",
            num(0.0),
            Some(binary(BinaryOperator::LessThan, ident("i"), num(3.0))),
            Some(incr("i")),
            push_closure(arrow(&[], ident("i"))),
        ),
    ]));
    // The only frame belongs to the global scope, which owns `i`.
    assert_eq!(main.count(OpCode::PushLexEnv), 1);
    assert_eq!(main.count(OpCode::CopyLexEnv), 0);
}

#[test]
fn test_for_in_pushes_frame_each_iteration() {
    let main = compile_ok(script(vec![
        let_("fns", Some(array(vec![]))),
        for_in(
            VariableKind::Let,
            "k",
            object(vec![("a", num(1.0))]),
            push_closure(arrow(&[], ident("k"))),
        ),
    ]));
    assert_eq!(main.count(OpCode::ForInInit), 1);
    assert_eq!(main.count(OpCode::IterDone), 1);
    assert_eq!(main.count(OpCode::PushLexEnv), 1);
    assert_eq!(main.count(OpCode::PopLexEnv), 1);
}

#[test]
fn test_try_catch_handler_table() {
    let main = compile_ok(script(vec![try_(
        vec![expr(call(ident("f"), vec![]))],
        Some((Some("e"), vec![expr(call(ident("g"), vec![ident("e")]))])),
        None,
    )]));
    assert_eq!(main.handlers.len(), 1);
    let h = main.handlers[0];
    assert!(h.has_catch_param);
    assert!(!h.has_finally);
    assert!(h.start < h.end && h.end <= h.handler);
    assert_eq!(main.count(OpCode::SaveEnv), 1);
    assert_eq!(main.count(OpCode::RestoreEnv), 1);
}

#[test]
fn test_try_finally_handler_table() {
    let main = compile_ok(script(vec![try_(
        vec![expr(call(ident("f"), vec![]))],
        None,
        Some(vec![expr(call(ident("g"), vec![]))]),
    )]));
    assert_eq!(main.handlers.len(), 1);
    assert!(!main.handlers[0].has_catch_param);
    assert!(main.handlers[0].has_finally);
    assert_eq!(main.count(OpCode::RestoreEnv), 1);
}

#[test]
fn test_try_catch_finally_guards_catch_body() {
    let main = compile_ok(script(vec![try_(
        vec![expr(call(ident("f"), vec![]))],
        Some((None, vec![expr(call(ident("g"), vec![]))])),
        Some(vec![expr(call(ident("h"), vec![]))]),
    )]));
    assert_eq!(main.handlers.len(), 2);
    let (try_entry, catch_entry) = (main.handlers[0], main.handlers[1]);
    assert!(!try_entry.has_catch_param);
    assert!(try_entry.has_finally);
    assert_eq!(catch_entry.start, try_entry.handler);
    assert!(catch_entry.handler >= catch_entry.end);
    // Finally body is emitted once
    assert_eq!(main.count(OpCode::Call), 3);
}

#[test]
fn test_return_through_finally_emits_body_once() {
    let main = compile_ok(script(vec![function(
        "f",
        &["x"],
        vec![try_(
            vec![if_(ident("x"), block(vec![ret(Some(num(1.0)))]), None)],
            None,
            Some(vec![expr(call(ident("g"), vec![]))]),
        )],
    )]));
    let f = &main.functions[0];
    assert_eq!(f.count(OpCode::Call), 1);
    assert!(contains(f, OpCode::LoadInt, Operand::Int(COMPLETION_RETURN)));
    assert_eq!(f.count(OpCode::Return), 2);
}

#[test]
fn test_break_through_finally_uses_jump_code() {
    let main = compile_ok(script(vec![while_(
        boolean(true),
        block(vec![try_(
            vec![break_(None)],
            None,
            Some(vec![expr(call(ident("g"), vec![]))]),
        )]),
    )]));
    assert!(contains(&main, OpCode::LoadInt, Operand::Int(FIRST_JUMP_CODE)));
    assert_eq!(main.count(OpCode::Call), 1);
}

#[test]
fn test_switch_tests_precede_bodies() {
    let main = compile_ok(script(vec![switch(
        ident("x"),
        vec![
            (Some(num(1.0)), vec![expr(call(ident("a"), vec![])), break_(None)]),
            (Some(num(2.0)), vec![expr(call(ident("b"), vec![]))]),
            (None, vec![expr(call(ident("c"), vec![]))]),
        ],
    )]));
    assert_eq!(main.count(OpCode::StrictEq), 2);
    let last_test = main
        .instructions
        .iter()
        .rposition(|i| i.opcode == OpCode::StrictEq)
        .unwrap();
    let first_call = main.instructions.iter().position(|i| i.opcode == OpCode::Call).unwrap();
    assert!(last_test < first_call);
}

#[test]
fn test_const_assignment_throws_at_runtime() {
    let main = compile_ok(script(vec![
        const_("c", num(1.0)),
        expr(assign(ident("c"), num(2.0))),
    ]));
    assert_eq!(main.count(OpCode::ThrowConstAssign), 1);
}

#[test]
fn test_named_function_expression_binds_callee() {
    let main = compile_ok(script(vec![expr(function_expr(
        Some("fact"),
        &["n"],
        vec![ret(Some(call(ident("fact"), vec![ident("n")])))],
    ))]));
    let fact = &main.functions[0];
    assert_eq!(fact.name, "fact");
    assert_eq!(fact.count(OpCode::LoadCallee), 1);
    assert_eq!(fact.count(OpCode::LoadGlobal), 0);
}

#[test]
fn test_labels_are_backpatched() {
    let main = compile_ok(script(vec![
        labeled(
            "outer",
            while_(
                ident("x"),
                block(vec![do_while(
                    block(vec![if_(ident("y"), continue_(Some("outer")), Some(break_(Some("outer"))))]),
                    ident("z"),
                )]),
            ),
        ),
        function("f", &[], vec![while_(ident("x"), break_(None))]),
    ]));
    assert!(no_labels_left(&main));
}

#[test]
fn test_disassemble_lists_nested_functions() {
    let main = compile_ok(script(vec![function("helper", &["a"], vec![ret(Some(ident("a")))])]));
    let listing = main.disassemble();
    assert!(listing.contains("function <main>"));
    assert!(listing.contains("function helper (params: 1"));
    assert!(listing.contains("LoadArg #0"));
}

// ========================================================================
// Errors
// ========================================================================

#[test]
fn test_break_outside_loop() {
    assert_eq!(compile_err(script(vec![break_(None)])), ErrorKind::IllegalBreak);
}

#[test]
fn test_continue_outside_loop() {
    assert_eq!(
        compile_err(script(vec![continue_(None)])),
        ErrorKind::IllegalContinue { label: None }
    );
}

#[test]
fn test_continue_to_non_loop_label() {
    let program = script(vec![labeled(
        "a",
        block(vec![while_(ident("x"), continue_(Some("a")))]),
    )]);
    assert_eq!(
        compile_err(program),
        ErrorKind::IllegalContinue {
            label: Some("a".to_string())
        }
    );
}

#[test]
fn test_unresolved_label() {
    let program = script(vec![while_(ident("x"), break_(Some("nope")))]);
    assert_eq!(
        compile_err(program),
        ErrorKind::UnresolvedLabel {
            label: "nope".to_string()
        }
    );
}

#[test]
fn test_duplicate_label() {
    let program = script(vec![labeled("a", labeled("a", while_(ident("x"), Statement::Empty)))]);
    assert_eq!(
        compile_err(program),
        ErrorKind::DuplicateLabel { label: "a".to_string() }
    );
}

#[test]
fn test_typeof_undeclared_name_does_not_throw() {
    let main = compile_ok(script(vec![
        let_("x", Some(num(1.0))),
        expr(unary(UnaryOperator::Typeof, ident("nope"))),
        expr(unary(UnaryOperator::Typeof, ident("x"))),
        expr(ident("nope")),
    ]));
    assert_eq!(main.count(OpCode::LoadGlobalOrUndefined), 1);
    assert_eq!(main.count(OpCode::LoadGlobal), 1);
    assert_eq!(main.count(OpCode::TypeOf), 2);
}

fn labeled_at(label: &str, line: u32, column: u32, body: Statement) -> Statement {
    Statement::Labeled(LabeledStatement {
        label: Identifier {
            name: label.to_string(),
            loc: SourceLocation::new(line, column),
        },
        body: Box::new(body),
    })
}

#[test]
fn test_duplicate_label_location() {
    let on_loop = script(vec![labeled_at(
        "a",
        1,
        1,
        block(vec![labeled_at("a", 2, 1, while_(ident("x"), Statement::Empty))]),
    )]);
    let err = compile_source(on_loop).expect_err("Compilation should fail");
    assert_eq!(err.kind, ErrorKind::DuplicateLabel { label: "a".to_string() });
    assert_eq!(err.location, SourceLocation::new(2, 1));

    let on_switch = script(vec![labeled_at(
        "s",
        1,
        1,
        block(vec![labeled_at("s", 3, 5, switch(ident("x"), vec![]))]),
    )]);
    let err = compile_source(on_switch).expect_err("Compilation should fail");
    assert_eq!(err.location, SourceLocation::new(3, 5));
}

#[test]
fn test_break_out_of_finally_without_target() {
    let program = script(vec![try_(vec![], None, Some(vec![break_(None)]))]);
    assert_eq!(
        compile_err(program),
        ErrorKind::InvalidFinallyControlFlow { statement: "break" }
    );
}

#[test]
fn test_break_inside_finally_to_enclosing_loop_is_allowed() {
    let program = script(vec![while_(
        ident("x"),
        block(vec![try_(vec![], None, Some(vec![break_(None)]))]),
    )]);
    assert!(compile_source(program).is_ok());
}

#[test]
fn test_invalid_assignment_target() {
    let program = script(vec![expr(assign(num(1.0), num(2.0)))]);
    assert_eq!(compile_err(program), ErrorKind::InvalidAssignmentTarget);
}

#[test]
fn test_top_level_return() {
    assert_eq!(compile_err(script(vec![ret(None)])), ErrorKind::IllegalReturn);
}

#[test]
fn test_duplicate_let() {
    let program = script(vec![let_("x", None), let_("x", None)]);
    assert_eq!(
        compile_err(program),
        ErrorKind::DuplicateBinding { name: "x".to_string() }
    );
}
