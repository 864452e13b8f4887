//! Tests for the native catalogue as seen from programs

use super::helpers::*;
use crate::interpreter::{ExceptionKind, Expr, Val};
use maplit::hashmap;

fn numbers(values: &[f64]) -> Expr {
    list(values.iter().map(|v| n(*v)).collect())
}

fn letters() -> Expr {
    map(vec![(n(1.0), t("a")), (n(2.0), t("b"))])
}

#[test]
fn test_boolean_functions() {
    let cases = hashmap! {
        "⊤" => bin(b(true), "|", b(false)),
        "⊥" => bin(b(true), "&", b(false)),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }
    assert!(matches!(
        exception_kind(bin(b(true), "&", n(1.0))),
        ExceptionKind::TypeMismatch { .. }
    ));
}

#[test]
fn test_number_functions() {
    let cases = hashmap! {
        "1" => bin(n(7.0), "%", n(3.0)),
        "8" => bin(n(2.0), "^", n(3.0)),
        "2" => method(n(2.7), "roundDown", vec![]),
        "3" => method(n(2.1), "roundUp", vec![]),
        "4m" => method(m(-4.0, "m"), "abs", vec![]),
        "⊤" => bin(n(2.0), "≥", n(2.0)),
        "⊥" => bin(n(2.0), "<", n(2.0)),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }
}

#[test]
fn test_text_functions() {
    let cases = hashmap! {
        "\"ab\"" => bin(t("a"), "+", t("b")),
        "2" => method(t("hi"), "length", vec![]),
        "\"ababab\"" => method(t("ab"), "repeat", vec![n(3.0)]),
        "[\"a\" \"b\"]" => method(t("a,b"), "segment", vec![t(",")]),
        "⊤" => method(t("hello"), "has", vec![t("ell")]),
        "\"xy\"" => method(t("x"), "combine", vec![t("y")]),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }
}

#[test]
fn test_repeat_refuses_oversized_text() {
    assert_eq!(
        exception_kind(method(t("ab"), "repeat", vec![n(1e19)])),
        ExceptionKind::TextTooLong { limit: 1 << 24 }
    );
    assert!(matches!(
        exception_kind(method(t("ab"), "repeat", vec![n(1e7)])),
        ExceptionKind::TextTooLong { .. }
    ));
    assert_eq!(render(method(t(""), "repeat", vec![n(1e19)])), "\"\"");
    assert_eq!(render(method(t("ab"), "repeat", vec![n(0.0)])), "\"\"");
}

#[test]
fn test_list_functions() {
    let cases = hashmap! {
        "3" => method(numbers(&[1.0, 2.0, 3.0]), "length", vec![]),
        "1" => method(numbers(&[1.0, 2.0, 3.0]), "first", vec![]),
        "2" => method(numbers(&[1.0, 2.0, 3.0]), "at", vec![n(2.0)]),
        "[1 2 3 4]" => method(numbers(&[1.0, 2.0, 3.0]), "add", vec![n(4.0)]),
        "[1 3]" => method(numbers(&[1.0, 2.0, 3.0, 2.0]), "sans", vec![n(2.0)]),
        "[2 4 6]" => method(
            numbers(&[1.0, 2.0, 3.0]),
            "translate",
            vec![func(None, &["v"], bin(name("v"), "·", n(2.0)))],
        ),
        "[2 3]" => method(
            numbers(&[1.0, 2.0, 3.0]),
            "filter",
            vec![func(None, &["v"], bin(name("v"), ">", n(1.0)))],
        ),
        "⊤" => method(
            numbers(&[1.0, 2.0, 3.0]),
            "all",
            vec![func(None, &["v"], bin(name("v"), ">", n(0.0)))],
        ),
        "6" => method(
            numbers(&[1.0, 2.0, 3.0]),
            "combine",
            vec![n(0.0), func(None, &["sum", "v"], bin(name("sum"), "+", name("v")))],
        ),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }
}

#[test]
fn test_list_index_out_of_bounds() {
    assert_eq!(
        exception_kind(method(numbers(&[1.0]), "at", vec![n(5.0)])),
        ExceptionKind::IndexOutOfBounds {
            index: "5".into(),
            length: 1
        }
    );
    assert!(matches!(
        exception_kind(method(list(vec![]), "first", vec![])),
        ExceptionKind::IndexOutOfBounds { .. }
    ));
}

#[test]
fn test_callback_exceptions_propagate() {
    let program = method(
        numbers(&[1.0, 2.0]),
        "translate",
        vec![func(None, &["v"], bin(name("v"), "+", t("x")))],
    );
    assert!(matches!(
        exception_kind(program),
        ExceptionKind::TypeMismatch { .. }
    ));

    // filter needs a Boolean answer
    let program = method(numbers(&[1.0]), "filter", vec![func(None, &["v"], name("v"))]);
    assert!(matches!(
        exception_kind(program),
        ExceptionKind::TypeMismatch { .. }
    ));
}

#[test]
fn test_set_functions() {
    let one_two = || set(vec![n(1.0), n(2.0)]);
    let cases = hashmap! {
        "2" => method(one_two(), "size", vec![]),
        "⊤" => method(one_two(), "has", vec![n(2.0)]),
        "{1 2 3}" => method(one_two(), "add", vec![n(3.0)]),
        "{1 2}" => method(one_two(), "add", vec![n(2.0)]),
        "{2}" => method(one_two(), "remove", vec![n(1.0)]),
        "{1 2 5}" => method(one_two(), "union", vec![set(vec![n(2.0), n(5.0)])]),
        "{1}" => method(
            one_two(),
            "filter",
            vec![func(None, &["v"], bin(name("v"), "<", n(2.0)))],
        ),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }
}

#[test]
fn test_map_functions() {
    let cases = hashmap! {
        "2" => method(letters(), "size", vec![]),
        "⊤" => method(letters(), "has", vec![n(1.0)]),
        "\"b\"" => method(letters(), "get", vec![n(2.0)]),
        "{1:\"a\" 2:\"b\" 3:\"c\"}" => method(letters(), "set", vec![n(3.0), t("c")]),
        "{1:\"z\" 2:\"b\"}" => method(letters(), "set", vec![n(1.0), t("z")]),
        "{2:\"b\"}" => method(letters(), "unset", vec![n(1.0)]),
        "{1:\"a\"}" => method(letters(), "remove", vec![t("b")]),
        "{1 2}" => method(letters(), "keys", vec![]),
        "[\"a\" \"b\"]" => method(letters(), "values", vec![]),
        "{1:10 2:20}" => method(
            letters(),
            "translate",
            vec![func(None, &["k", "v"], bin(name("k"), "·", n(10.0)))],
        ),
    };
    for (expected, program) in cases {
        assert_eq!(render(program), expected);
    }

    let program = method(
        letters(),
        "filter",
        vec![func(None, &["k", "v"], bin(name("k"), ">", n(1.0)))],
    );
    assert_eq!(render(program), "{2:\"b\"}");

    assert_eq!(
        exception_kind(method(letters(), "get", vec![n(9.0)])),
        ExceptionKind::MissingKey { key: "9".into() }
    );
}

#[test]
fn test_natives_never_mutate_receivers() {
    let program = block(vec![
        bind("xs", numbers(&[1.0, 2.0])),
        bind("ys", method(name("xs"), "add", vec![n(3.0)])),
        list(vec![name("xs"), name("ys")]),
    ]);

    assert_eq!(render(program), "[[1 2] [1 2 3]]");
    assert_eq!(eval(method(numbers(&[]), "length", vec![])), Val::num(0.0));
}
