//! End-to-end runs of whole programs through the public `Runner`,
//! asserting the analyzer's reported return type, the printed value, and
//! the diagnostics of programs that must be rejected.

use std::{path::PathBuf, rc::Rc};

use clay::{CompileResult, RunOutcome, Runner};
use pretty_assertions::assert_eq;

fn new_runner() -> Runner {
    let runner = Runner::new();
    runner.add_search_path(concat!(env!("CARGO_MANIFEST_DIR"), "/../../lib-clay"));
    runner
}

fn program_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/programs").join(name)
}

fn run(name: &str) -> CompileResult<RunOutcome> {
    new_runner().run_file(&program_path(name))
}

fn run_ok(name: &str) -> RunOutcome {
    match run(name) {
        Ok(outcome) => outcome,
        Err(err) => panic!("{name} failed:\n{err}"),
    }
}

fn run_err(name: &str) -> String {
    match run(name) {
        Ok(outcome) => panic!("{name} unexpectedly succeeded with {}", outcome.value),
        Err(err) => err.message,
    }
}

#[test]
fn integer_arithmetic() {
    let outcome = run_ok("arithmetic.clay");
    assert_eq!(outcome.return_type, "Int32");
    assert!(!outcome.return_by_ref);
    assert_eq!(outcome.value_type, "Int32");
    assert_eq!(outcome.value, "5");
}

#[test]
fn generic_identity_specializes_on_bool() {
    let outcome = run_ok("identity.clay");
    assert_eq!(outcome.return_type, "Bool");
    assert_eq!(outcome.value, "true");
}

#[test]
fn overload_dispatch_selects_by_record_type() {
    let outcome = run_ok("overload_dispatch.clay");
    assert_eq!(outcome.return_type, "Float64");
    assert_eq!(outcome.value, "4.0#f64");
}

#[test]
fn mutual_recursion_resolves_through_sentinel() {
    let outcome = run_ok("mutual_recursion.clay");
    assert_eq!(outcome.return_type, "Bool");
    assert_eq!(outcome.value, "true");
}

#[test]
fn record_constructor_and_field_by_name() {
    let outcome = run_ok("record_pair.clay");
    assert_eq!(outcome.return_type, "Bool");
    assert_eq!(outcome.value, "true");
}

#[test]
fn record_constructor_arity_is_checked() {
    let message = run_err("record_arity.clay");
    assert!(message.contains("incorrect no. of arguments"), "got: {message}");
}

#[test]
fn pointer_round_trip_is_leak_free() {
    let runner = new_runner();
    let outcome = runner
        .run_file(&program_path("pointer_round_trip.clay"))
        .expect("pointer round trip runs");
    assert_eq!(outcome.return_type, "Int32");
    assert_eq!(outcome.value, "7");
    assert_eq!(runner.outstanding_allocations(), 0);
}

#[test]
fn static_argument_specialization_unrolls() {
    let outcome = run_ok("static_dispatch.clay");
    assert_eq!(outcome.return_type, "Int32");
    assert_eq!(outcome.value, "9");
}

#[test]
fn for_loop_drives_the_iteration_protocol() {
    let outcome = run_ok("loops.clay");
    assert_eq!(outcome.value, "10");
}

#[test]
fn goto_resolves_labels_after_bindings() {
    let outcome = run_ok("goto_label.clay");
    assert_eq!(outcome.value, "3");
}

#[test]
fn while_with_break() {
    let outcome = run_ok("while_break.clay");
    assert_eq!(outcome.value, "4");
}

#[test]
fn tuple_reference_by_index() {
    let outcome = run_ok("tuple_ref.clay");
    assert_eq!(outcome.return_type, "Bool");
    assert_eq!(outcome.value, "true");
}

#[test]
fn tuple_index_out_of_range_is_rejected() {
    let message = run_err("tuple_out_of_range.clay");
    assert!(message.contains("out of range"), "got: {message}");
}

#[test]
fn unknown_record_field_is_rejected() {
    let message = run_err("field_unknown.clay");
    assert!(message.contains("field not in record"), "got: {message}");
}

#[test]
fn int8_literal_boundaries() {
    let outcome = run_ok("int8_in_range.clay");
    assert_eq!(outcome.return_type, "Int8");
    assert_eq!(outcome.value, "127#i8");

    let message = run_err("int8_out_of_range.clay");
    assert!(message.contains("int8 literal out of range"), "got: {message}");
}

#[test]
fn float_literal_boundaries() {
    let message = run_err("float32_out_of_range.clay");
    assert!(message.contains("float32 literal out of range"), "got: {message}");

    let outcome = run_ok("float64_in_range.clay");
    assert_eq!(outcome.return_type, "Float64");
    assert_eq!(outcome.value, "1e100#f64");
}

#[test]
fn assigning_to_a_temporary_is_rejected() {
    let message = run_err("assign_to_temp.clay");
    assert!(message.contains("cannot assign to a temp"), "got: {message}");
}

#[test]
fn returning_a_temporary_by_reference_is_rejected() {
    let message = run_err("returnref_temp.clay");
    assert!(
        message.contains("cannot return a temporary by reference"),
        "got: {message}"
    );
}

#[test]
fn char_literal_desugars_to_char_record() {
    let outcome = run_ok("char_literal.clay");
    assert_eq!(outcome.return_type, "Char");
    assert_eq!(outcome.value, "Char(65#i8)");
}

#[test]
fn string_literal_desugars_to_string_record() {
    let outcome = run_ok("string_literal.clay");
    assert_eq!(outcome.return_type, "String[Array[Char, 2]]");
    assert_eq!(outcome.value, "String[Array[Char, 2]]([Char(104#i8), Char(105#i8)])");
}

#[test]
fn static_flag_vectors_must_agree_across_overloads() {
    let message = run_err("static_flags_conflict.clay");
    assert!(message.contains("static argument"), "got: {message}");
}

#[test]
fn external_procedures_marshal_through_the_backend() {
    let runner = new_runner();
    runner.register_external(
        "add_ints",
        Rc::new(|args: &[*mut u8], ret: *mut u8| {
            // SAFETY: declared as (Int32, Int32) Int32; the engine passes
            // one pointer per argument slot and an output slot.
            unsafe {
                let a = args[0].cast::<i32>().read_unaligned();
                let b = args[1].cast::<i32>().read_unaligned();
                ret.cast::<i32>().write_unaligned(a + b);
            }
        }),
    );
    let outcome = runner
        .run_file(&program_path("external_add.clay"))
        .expect("external call runs");
    assert_eq!(outcome.return_type, "Int32");
    assert_eq!(outcome.value, "5");
}

#[test]
fn analysis_and_evaluation_agree_on_the_result_type() {
    for name in [
        "arithmetic.clay",
        "identity.clay",
        "overload_dispatch.clay",
        "record_pair.clay",
        "static_dispatch.clay",
    ] {
        let outcome = run_ok(name);
        assert_eq!(outcome.return_type, outcome.value_type, "{name}");
    }
}

#[test]
fn missing_module_is_a_resolution_error() {
    let runner = Runner::new();
    // no search path configured, so the support modules cannot load
    let err = runner
        .run_file(&program_path("arithmetic.clay"))
        .expect_err("core cannot be located");
    assert!(err.message.contains("module not found"), "got: {}", err.message);
}
