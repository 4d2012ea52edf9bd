//! Result comparison for the equivalence search.

use crate::contracts::EqualityMode;
use crate::interpreter::Value;

/// Compares an implementation result with a specification result.
///
/// `Auto` should be resolved before comparing; unresolved it behaves as
/// approximate comparison with default tolerances.
pub fn results_equal(mode: &EqualityMode, a: &Value, b: &Value) -> bool {
    match mode {
        EqualityMode::Structural => a.equals(b),
        EqualityMode::Approx { rel_tol, abs_tol } => approx_equal(a, b, *rel_tol, *abs_tol),
        EqualityMode::Auto => approx_equal(
            a,
            b,
            EqualityMode::DEFAULT_REL_TOL,
            EqualityMode::DEFAULT_ABS_TOL,
        ),
        EqualityMode::Custom(eq) => eq(a, b),
    }
}

/// `|a - b| <= max(rel_tol * max(|a|, |b|), abs_tol)`. NaN equals NaN;
/// infinities equal only themselves.
pub fn isclose(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a == b {
        return true;
    }
    if a.is_infinite() || b.is_infinite() {
        return false;
    }
    (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol)
}

/// Component-wise approximate equality. Shape mismatches (different
/// lengths, kinds, keys or record names) are inequality, never an error.
pub fn approx_equal(a: &Value, b: &Value, rel_tol: f64, abs_tol: f64) -> bool {
    let all = |xs: &[Value], ys: &[Value]| {
        xs.len() == ys.len()
            && xs
                .iter()
                .zip(ys)
                .all(|(x, y)| approx_equal(x, y, rel_tol, abs_tol))
    };
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => isclose(*x, *y, rel_tol, abs_tol),
        (Value::Float(x), Value::Int(n)) | (Value::Int(n), Value::Float(x)) => {
            isclose(*x, *n as f64, rel_tol, abs_tol)
        }
        (Value::List(xs), Value::List(ys))
        | (Value::Tuple(xs), Value::Tuple(ys))
        | (Value::Set(xs), Value::Set(ys)) => all(xs, ys),
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|((ka, va), (kb, vb))| {
                    ka.equals(kb) && approx_equal(va, vb, rel_tol, abs_tol)
                })
        }
        (
            Value::Record { name: na, fields: fa },
            Value::Record { name: nb, fields: fb },
        ) => {
            na == nb
                && fa.len() == fb.len()
                && fa.iter().zip(fb).all(|((ka, va), (kb, vb))| {
                    ka == kb && approx_equal(va, vb, rel_tol, abs_tol)
                })
        }
        _ => a.equals(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn floats(xs: &[f64]) -> Value {
        Value::List(xs.iter().copied().map(Value::Float).collect())
    }

    #[test]
    fn approx_accepts_small_differences() {
        let mode = EqualityMode::Approx {
            rel_tol: 0.0,
            abs_tol: 1e-3,
        };
        assert!(results_equal(&mode, &floats(&[1.0, 2.0]), &floats(&[1.0005, 1.9995])));
        assert!(!results_equal(&mode, &floats(&[1.0, 2.0]), &floats(&[1.01, 2.0])));
    }

    #[test]
    fn approx_rejects_shape_mismatch() {
        let mode = EqualityMode::approx();
        assert!(!results_equal(&mode, &floats(&[1.0, 2.0]), &floats(&[1.0])));
        assert!(!results_equal(
            &mode,
            &floats(&[1.0]),
            &Value::Tuple(vec![Value::Float(1.0)])
        ));
        assert!(!results_equal(&mode, &Value::Float(1.0), &Value::Str("1.0".into())));
    }

    #[test]
    fn structural_is_exact() {
        let a = floats(&[0.1 + 0.2]);
        let b = floats(&[0.3]);
        assert!(!results_equal(&EqualityMode::Structural, &a, &b));
        assert!(results_equal(&EqualityMode::approx(), &a, &b));
        assert!(results_equal(
            &EqualityMode::Structural,
            &Value::Int(2),
            &Value::Float(2.0)
        ));
    }

    #[test]
    fn custom_comparison() {
        let same_len = EqualityMode::custom(|a, b| match (a, b) {
            (Value::List(x), Value::List(y)) => x.len() == y.len(),
            _ => false,
        });
        assert!(results_equal(&same_len, &floats(&[1.0]), &floats(&[9.0])));
    }

    #[test]
    fn isclose_edge_cases() {
        assert!(isclose(f64::NAN, f64::NAN, 1e-5, 1e-8));
        assert!(isclose(f64::INFINITY, f64::INFINITY, 1e-5, 1e-8));
        assert!(!isclose(f64::INFINITY, f64::MAX, 1e-5, 1e-8));
        assert!(isclose(0.0, 1e-9, 1e-5, 1e-8));
    }

    proptest! {
        #[test]
        fn approx_within_tolerance(
            xs in proptest::collection::vec(-1e6f64..1e6, 0..10),
            shift in -1e-3f64..1e-3,
        ) {
            let shifted: Vec<f64> = xs.iter().map(|x| x + shift).collect();
            let mode = EqualityMode::Approx { rel_tol: 0.0, abs_tol: 2e-3 };
            prop_assert!(results_equal(&mode, &floats(&xs), &floats(&shifted)));
        }

        #[test]
        fn approx_is_symmetric(a in -1e3f64..1e3, b in -1e3f64..1e3) {
            let mode = EqualityMode::approx();
            prop_assert_eq!(
                results_equal(&mode, &Value::Float(a), &Value::Float(b)),
                results_equal(&mode, &Value::Float(b), &Value::Float(a))
            );
        }
    }
}
