//! Tests for the individual passes and the public pipeline API.

use lexa_frontend::ast::build::*;
use lexa_frontend::ast::{Program, SourceType};
use lexa_frontend::compiler::scope::{BindingKind, ScopeKind, Storage, classify, collect};
use lexa_frontend::{CompileError, CompilerOptions, DiagnosticSink, Diagnostics, ErrorKind, VM, Value, compile, compile_all, compile_with_sink};

fn closure_over_x() -> Program {
    script(vec![
        let_("x", Some(num(1.0))),
        var("y", Some(num(2.0))),
        function("f", &[], vec![ret(Some(ident("x")))]),
    ])
}

#[test]
fn test_captured_bindings_get_slots() {
    let options = CompilerOptions::default();
    let collected = collect(&closure_over_x(), ScopeKind::Global, &options).unwrap();
    let cls = classify(&collected.table, &collected.references, &options).unwrap();
    let root = collected.table.scope(collected.table.root());

    let x = root.get("x").unwrap();
    let y = root.get("y").unwrap();
    assert!(cls.is_captured(x));
    assert!(matches!(cls.storage(x), Storage::LexicalSlot { frame_depth: 0, slot: 0 }));
    assert!(!cls.is_captured(y));
    assert!(matches!(cls.storage(y), Storage::Register(_)));
    assert_eq!(cls.captured_count(), 1);
}

#[test]
fn test_classification_is_idempotent() {
    let options = CompilerOptions::default();
    let program = script(vec![
        let_("fns", Some(array(vec![]))),
        for_let(
            "i",
            num(0.0),
            None,
            None,
            block(vec![expr(method_call(ident("fns"), "push", vec![arrow(&[], ident("i"))])), break_(None)]),
        ),
    ]);
    let collected = collect(&program, ScopeKind::Global, &options).unwrap();
    let first = classify(&collected.table, &collected.references, &options).unwrap();
    let second = classify(&collected.table, &collected.references, &options).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_var_and_let_in_loop() {
    let options = CompilerOptions::default();
    let program = script(vec![for_let(
        "i",
        num(0.0),
        None,
        None,
        block(vec![var("v", None), let_("l", None), break_(None)]),
    )]);
    let collected = collect(&program, ScopeKind::Global, &options).unwrap();
    let table = &collected.table;
    let root = table.scope(table.root());

    // `var` hoists out of the loop; `let` stays in the body block.
    let v = root.get("v").unwrap();
    assert_eq!(table.binding(v).kind, BindingKind::Var);
    assert!(root.get("l").is_none());
    let l = table
        .binding_ids()
        .find(|b| table.binding(*b).name == "l")
        .unwrap();
    assert_eq!(table.scope(table.binding(l).scope).kind, ScopeKind::Block);
}

#[test]
fn test_layout_debug_names() {
    let with_names = compile(&closure_over_x(), &CompilerOptions::default().with_debug_names(true)).unwrap();
    let frame = &with_names.layout.frames[0];
    assert_eq!(frame.depth, 0);
    assert_eq!(frame.slots.len(), 1);
    assert_eq!(frame.slots[0].kind, BindingKind::Let);
    assert_eq!(frame.slots[0].name.as_deref(), Some("x"));

    let without = compile(&closure_over_x(), &CompilerOptions::default()).unwrap();
    assert_eq!(without.layout.frames[0].slots[0].name, None);
}

#[test]
fn test_source_type_override() {
    let program = script(vec![let_("x", Some(num(1.0))), expr(ident("x"))]);
    let options = CompilerOptions::default().with_source_type(SourceType::Module);
    let output = compile(&program, &options).unwrap();
    assert_eq!(VM::new().execute(&output).unwrap(), Value::Number(1.0));
}

#[test]
fn test_compile_all_keeps_order() {
    let programs = vec![
        script(vec![expr(num(1.0))]),
        script(vec![break_(None)]),
        script(vec![expr(num(3.0))]),
    ];
    let results = compile_all(&programs, &CompilerOptions::default());
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(results[1].as_ref().unwrap_err().kind, ErrorKind::IllegalBreak);
    let third = results[2].as_ref().unwrap();
    assert_eq!(VM::new().execute(third).unwrap(), Value::Number(3.0));
}

#[test]
fn test_sink_receives_first_error() {
    let mut sink = Diagnostics::new();
    let program = script(vec![let_("a", None), let_("a", None), break_(None)]);
    let err = compile_with_sink(&program, &CompilerOptions::default(), &mut sink).unwrap_err();
    assert_eq!(sink.errors().len(), 1);
    assert_eq!(sink.errors()[0], err);
    assert!(!err.is_internal());
}

#[test]
fn test_custom_sink() {
    struct Count(usize);
    impl DiagnosticSink for Count {
        fn report(&mut self, _error: &CompileError) {
            self.0 += 1;
        }
    }
    let mut sink = Count(0);
    let ok = compile_with_sink(&script(vec![]), &CompilerOptions::default(), &mut sink);
    assert!(ok.is_ok());
    assert_eq!(sink.0, 0);
}

#[test]
fn test_register_limit() {
    let options = CompilerOptions {
        max_registers: 2,
        ..CompilerOptions::default()
    };
    let program = script(vec![
        let_("a", Some(num(1.0))),
        let_("b", Some(num(2.0))),
        let_("c", Some(num(3.0))),
    ]);
    let err = compile(&program, &options).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::LimitExceeded { what: "registers", limit: 2 }));
}

#[test]
fn test_program_from_json() {
    let json = r#"{
        "source_type": "script",
        "body": [
            { "VariableDeclaration": { "kind": "let", "declarations": [
                { "id": { "name": "x" }, "init": { "Literal": { "Number": 40 } } }
            ] } },
            { "Expression": { "expression": { "Binary": {
                "operator": "Add",
                "left": { "Identifier": { "name": "x" } },
                "right": { "Literal": { "Number": 2 } }
            } } } }
        ]
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let output = compile(&program, &CompilerOptions::default()).unwrap();
    assert_eq!(VM::new().execute(&output).unwrap(), Value::Number(42.0));
}

#[test]
fn test_output_serializes() {
    let output = compile(&closure_over_x(), &CompilerOptions::default()).unwrap();
    let json = serde_json::to_string(&output).unwrap();
    assert!(json.contains("\"layout\""));
    assert!(json.contains("PushLexEnv"));
}
