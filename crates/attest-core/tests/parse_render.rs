//! Parser and renderer integration tests.
//!
//! Rendering is what mutation reports show, so these tests pin the rendered
//! form of parsed code and check that rendering parses back to the same tree.

use attest_core::ast::{ArithOp, BoolOp, CmpOp, Expr, ExprKind, Literal, Span, StmtKind};
use attest_core::{parse_expr, parse_module, TypeDesc};
use proptest::prelude::*;

const SORT_SOURCE: &str = r#"
record Interval { lo: int, hi: int }

# insertion sort
@ensures(len(result) == len(xs))
fn my_sort(xs: list[int]) -> list[int] {
    let out = [];
    for x in xs {
        let i = 0;
        while i < len(out) and out[i] <= x {
            i = i + 1;
        }
        out = insert(out, i, x);
    }
    return out;
}

@spec
fn ref_sort(xs: list[int]) -> list[int] {
    return sorted(xs);
}
"#;

#[test]
fn parses_a_realistic_module() {
    let module = parse_module(SORT_SOURCE).unwrap();
    assert_eq!(module.records.len(), 1);
    assert_eq!(module.records[0].name, "Interval");
    let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["my_sort", "ref_sort"]);

    let body = &module.functions[0].body;
    let StmtKind::For { body: loop_body, .. } = &body[1].kind else {
        panic!("expected for loop, got {:?}", body[1]);
    };
    insta::assert_snapshot!(loop_body[1].to_string(), @"while i < len(out) and out[i] <= x");
    insta::assert_snapshot!(loop_body[2].to_string(), @"out = insert(out, i, x)");
    insta::assert_snapshot!(body[2].to_string(), @"return out");
}

#[test]
fn spans_point_at_source() {
    let module = parse_module(SORT_SOURCE).unwrap();
    let f = &module.functions[0];
    assert_eq!(f.span, Span::new(6, 1));
    assert_eq!(f.body[0].span, Span::new(7, 5));
}

#[test]
fn ir_serializes_to_json() {
    let expr = parse_expr("x[0] + 1").unwrap();
    let json = serde_json::to_value(&expr).unwrap();
    assert_eq!(json["span"], serde_json::json!({"line": 1, "column": 6}));
    assert_eq!(json["kind"]["Arith"]["op"], "Add");
    assert_eq!(
        json["kind"]["Arith"]["rhs"]["kind"],
        serde_json::json!({"Literal": {"Int": 1}})
    );
    let index = &json["kind"]["Arith"]["lhs"];
    assert_eq!(index["kind"]["Index"]["base"]["kind"]["Name"], "x");
    assert_eq!(index["span"], serde_json::json!({"line": 1, "column": 2}));

    let back: Expr = serde_json::from_value(json).unwrap();
    assert_eq!(back, expr);
}

#[test]
fn type_rendering_is_parseable() {
    for src in [
        "list[int[0..9]]",
        "dict[str, option[float[-1.0..1.0]]]",
        "tuple[bool, bytes] | none",
        "Matrix[float]",
    ] {
        let ty: TypeDesc = attest_core::parse_type(src).unwrap();
        assert_eq!(ty.to_string(), src);
    }
}

fn leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0i64..100).prop_map(|n| Expr::new(ExprKind::Literal(Literal::Int(n)), Span::default())),
        prop::sample::select(vec!["a", "b", "xs"])
            .prop_map(|n| Expr::new(ExprKind::Name(n.to_string()), Span::default())),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    leaf().prop_recursive(4, 24, 2, |inner| {
        let arith = prop::sample::select(vec![
            ArithOp::Add,
            ArithOp::Sub,
            ArithOp::Mul,
            ArithOp::FloorDiv,
            ArithOp::Rem,
        ]);
        let cmp = prop::sample::select(vec![CmpOp::Lt, CmpOp::Eq, CmpOp::In, CmpOp::NotIn]);
        let logic = prop::sample::select(vec![BoolOp::And, BoolOp::Or]);
        prop_oneof![
            (arith, inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::new(
                ExprKind::Arith {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(r)
                },
                Span::default()
            )),
            (cmp, inner.clone(), inner.clone()).prop_map(|(op, l, r)| Expr::new(
                ExprKind::Compare {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(r)
                },
                Span::default()
            )),
            (logic, inner.clone(), inner).prop_map(|(op, l, r)| Expr::new(
                ExprKind::Logic {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(r)
                },
                Span::default()
            )),
        ]
    })
}

/// Structural equality ignoring spans.
fn same_shape(a: &Expr, b: &Expr) -> bool {
    match (&a.kind, &b.kind) {
        (ExprKind::Literal(x), ExprKind::Literal(y)) => x == y,
        (ExprKind::Name(x), ExprKind::Name(y)) => x == y,
        (
            ExprKind::Arith { op: o1, lhs: l1, rhs: r1 },
            ExprKind::Arith { op: o2, lhs: l2, rhs: r2 },
        ) => o1 == o2 && same_shape(l1, l2) && same_shape(r1, r2),
        (
            ExprKind::Compare { op: o1, lhs: l1, rhs: r1 },
            ExprKind::Compare { op: o2, lhs: l2, rhs: r2 },
        ) => o1 == o2 && same_shape(l1, l2) && same_shape(r1, r2),
        (
            ExprKind::Logic { op: o1, lhs: l1, rhs: r1 },
            ExprKind::Logic { op: o2, lhs: l2, rhs: r2 },
        ) => o1 == o2 && same_shape(l1, l2) && same_shape(r1, r2),
        _ => false,
    }
}

proptest! {
    #[test]
    fn rendered_expressions_parse_back(e in expr()) {
        let text = e.to_string();
        let parsed = parse_expr(&text).unwrap();
        prop_assert!(same_shape(&e, &parsed), "{text} parsed as {parsed:?}");
    }
}
