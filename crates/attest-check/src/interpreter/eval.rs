//! Operator evaluation: arithmetic, comparison and membership.
//!
//! Integer arithmetic is checked and traps on overflow. `/` is true
//! division and always yields a float; `//` and `%` use floor semantics, so
//! the remainder takes the sign of the divisor.

use std::cmp::Ordering;

use attest_core::ast::{ArithOp, CmpOp};

use super::error::RuntimeError;
use super::value::Value;

/// Evaluates a binary arithmetic operator.
///
/// # Errors
///
/// Returns `RuntimeError` for integer overflow, division by zero and
/// operand type mismatches.
pub fn eval_arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_arith(op, as_f64(lhs), as_f64(rhs))
        }
        (Value::Str(a), Value::Str(b)) if op == ArithOp::Add => Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(a), Value::List(b)) if op == ArithOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Value::Tuple(a), Value::Tuple(b)) if op == ArithOp::Add => {
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (Value::Bytes(a), Value::Bytes(b)) if op == ArithOp::Add => {
            Ok(Value::Bytes(a.iter().chain(b).copied().collect()))
        }
        (Value::Str(s), Value::Int(n)) if op == ArithOp::Mul => {
            Ok(Value::Str(s.repeat(repeat_count(*n))))
        }
        (Value::List(items), Value::Int(n)) if op == ArithOp::Mul => {
            let count = repeat_count(*n);
            let mut out = Vec::with_capacity(items.len().saturating_mul(count));
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => Err(RuntimeError::TypeMismatch {
            expected: format!("operands supporting '{}'", op.symbol()),
            got: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        }),
    }
}

fn repeat_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> Result<Value, RuntimeError> {
    let result = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => {
            if b == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        ArithOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        ArithOp::Rem => {
            if b == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            // i64::MIN % -1 is mathematically 0.
            let r = a.checked_rem(b).unwrap_or(0);
            Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
    };
    result.map(Value::Int).ok_or(RuntimeError::IntegerOverflow)
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::FloorDiv | ArithOp::Rem if b == 0.0 => {
            return Err(RuntimeError::DivideByZero)
        }
        ArithOp::Div => a / b,
        ArithOp::FloorDiv => (a / b).floor(),
        ArithOp::Rem => {
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
    };
    Ok(Value::Float(result))
}

/// Evaluates a comparison or membership operator.
pub fn eval_compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let holds = match op {
        CmpOp::Eq => lhs.equals(rhs),
        CmpOp::Ne => !lhs.equals(rhs),
        CmpOp::In => contains(rhs, lhs)?,
        CmpOp::NotIn => !contains(rhs, lhs)?,
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => match order(lhs, rhs)? {
            // NaN is unordered: every ordering comparison is false.
            None => false,
            Some(ord) => match op {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            },
        },
    };
    Ok(Value::Bool(holds))
}

/// Ordering for `<`-style comparisons. Only like-kinded values are ordered.
fn order(lhs: &Value, rhs: &Value) -> Result<Option<Ordering>, RuntimeError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(as_f64(lhs).partial_cmp(&as_f64(rhs)))
        }
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x.equals(y) {
                    continue;
                }
                return order(x, y);
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(RuntimeError::TypeMismatch {
            expected: "comparable operands".into(),
            got: format!("{} and {}", lhs.type_name(), rhs.type_name()),
        }),
    }
}

/// Membership test: `needle in haystack`.
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool, RuntimeError> {
    match haystack {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            Ok(items.iter().any(|item| item.equals(needle)))
        }
        Value::Map(entries) => Ok(entries.iter().any(|(k, _)| k.equals(needle))),
        Value::Str(s) => match needle {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(RuntimeError::type_mismatch("str", other)),
        },
        Value::Bytes(bytes) => match needle {
            Value::Int(n) => Ok(u8::try_from(*n).is_ok_and(|b| bytes.contains(&b))),
            other => Err(RuntimeError::type_mismatch("int", other)),
        },
        other => Err(RuntimeError::type_mismatch("container", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    #[test]
    fn checked_integer_arithmetic() {
        assert_eq!(eval_arith(ArithOp::Add, &int(2), &int(3)).unwrap(), int(5));
        assert_eq!(
            eval_arith(ArithOp::Add, &int(i64::MAX), &int(1)).unwrap_err(),
            RuntimeError::IntegerOverflow
        );
        assert_eq!(
            eval_arith(ArithOp::FloorDiv, &int(i64::MIN), &int(-1)).unwrap_err(),
            RuntimeError::IntegerOverflow
        );
    }

    #[test]
    fn floor_division_and_remainder() {
        assert_eq!(eval_arith(ArithOp::FloorDiv, &int(-7), &int(2)).unwrap(), int(-4));
        assert_eq!(eval_arith(ArithOp::Rem, &int(-7), &int(2)).unwrap(), int(1));
        assert_eq!(eval_arith(ArithOp::Rem, &int(7), &int(-2)).unwrap(), int(-1));
        assert_eq!(eval_arith(ArithOp::Rem, &int(i64::MIN), &int(-1)).unwrap(), int(0));
        assert_eq!(
            eval_arith(ArithOp::Rem, &Value::Float(-7.0), &Value::Float(2.0)).unwrap(),
            Value::Float(1.0)
        );
    }

    #[test]
    fn true_division_yields_float() {
        assert_eq!(
            eval_arith(ArithOp::Div, &int(7), &int(2)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            eval_arith(ArithOp::Div, &int(1), &int(0)).unwrap_err(),
            RuntimeError::DivideByZero
        );
        assert_eq!(
            eval_arith(ArithOp::Div, &Value::Float(1.0), &Value::Float(0.0)).unwrap_err(),
            RuntimeError::DivideByZero
        );
    }

    #[test]
    fn sequence_concatenation_and_repeat() {
        let ab = eval_arith(
            ArithOp::Add,
            &Value::Str("a".into()),
            &Value::Str("b".into()),
        )
        .unwrap();
        assert_eq!(ab, Value::Str("ab".into()));
        let rep = eval_arith(ArithOp::Mul, &Value::List(vec![int(1)]), &int(3)).unwrap();
        assert_eq!(rep, Value::List(vec![int(1), int(1), int(1)]));
        assert!(matches!(
            eval_arith(ArithOp::Sub, &Value::Str("a".into()), &int(1)),
            Err(RuntimeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval_compare(CmpOp::Lt, &int(1), &Value::Float(1.5)).unwrap(), Value::Bool(true));
        assert_eq!(
            eval_compare(CmpOp::Ge, &Value::Float(f64::NAN), &int(0)).unwrap(),
            Value::Bool(false)
        );
        let a = Value::List(vec![int(1), int(2)]);
        let b = Value::List(vec![int(1), int(3)]);
        assert_eq!(eval_compare(CmpOp::Lt, &a, &b).unwrap(), Value::Bool(true));
        assert!(eval_compare(CmpOp::Lt, &a, &int(1)).is_err());
    }

    #[test]
    fn membership() {
        let xs = Value::List(vec![int(1), int(2)]);
        assert_eq!(eval_compare(CmpOp::In, &int(2), &xs).unwrap(), Value::Bool(true));
        assert_eq!(eval_compare(CmpOp::NotIn, &int(5), &xs).unwrap(), Value::Bool(true));
        let s = Value::Str("hello".into());
        assert_eq!(
            eval_compare(CmpOp::In, &Value::Str("ell".into()), &s).unwrap(),
            Value::Bool(true)
        );
    }
}
