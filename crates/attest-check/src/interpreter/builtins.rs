//! Builtin functions of the script language.
//!
//! Every builtin is a pure function of its arguments except `print` (writes
//! to the interpreter's output log) and `random` (draws from the
//! interpreter's seeded RNG). Builtins never mutate their inputs.

use std::cmp::Ordering;

use rand::Rng;

use super::error::RuntimeError;
use super::eval::eval_arith;
use super::value::Value;
use super::Interpreter;
use attest_core::ast::ArithOp;

/// Names of all builtins.
pub const BUILTINS: &[&str] = &[
    "len", "abs", "min", "max", "sum", "sorted", "reversed", "range", "append", "set", "list",
    "keys", "values", "items", "get", "insert", "slice", "str", "int", "float", "all", "any",
    "count", "fail", "print", "random",
];

/// Builtins that perform output.
pub const IO_BUILTINS: &[&str] = &["print"];

/// Builtins whose result depends on RNG state.
pub const NONDETERMINISTIC_BUILTINS: &[&str] = &["random"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Calls builtin `name`. Returns `None` if no builtin has that name.
pub(crate) fn call_builtin(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
) -> Option<Result<Value, RuntimeError>> {
    let result = match name {
        "len" => len(&args),
        "abs" => abs(&args),
        "min" => extremum(interp, name, args, Ordering::Less),
        "max" => extremum(interp, name, args, Ordering::Greater),
        "sum" => sum(interp, args),
        "sorted" => sorted(interp, &args),
        "reversed" => reversed(&args),
        "range" => range(interp, &args),
        "append" => append(&args),
        "set" => collect(interp, name, &args, Value::set_from),
        "list" => collect(interp, name, &args, Value::List),
        "keys" | "values" | "items" => map_view(name, &args),
        "get" => get(&args),
        "insert" => insert(&args),
        "slice" => slice(&args),
        "str" => arity(name, &args, 1, 1).map(|()| Value::Str(args[0].to_string())),
        "int" => to_int(&args),
        "float" => to_float(&args),
        "all" => truth_fold(interp, name, &args, true),
        "any" => truth_fold(interp, name, &args, false),
        "count" => count(&args),
        "fail" => Err(RuntimeError::Raised {
            message: args
                .first()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "fail() called".to_string()),
        }),
        "print" => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            interp.log_output(line);
            Ok(Value::None)
        }
        "random" => random(interp, &args),
        _ => return None,
    };
    Some(result)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::ArityMismatch {
            function: name.to_string(),
            expected: if args.len() < min { min } else { max },
            got: args.len(),
        });
    }
    Ok(())
}

/// Elements visited by iterating `value`: sequence items, string
/// characters, map keys, byte values.
pub(crate) fn elements(value: &Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => Ok(items.clone()),
        Value::Map(entries) => Ok(entries.iter().map(|(k, _)| k.clone()).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Bytes(bytes) => Ok(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
        other => Err(RuntimeError::type_mismatch("iterable", other)),
    }
}

fn iterated(interp: &mut Interpreter, value: &Value) -> Result<Vec<Value>, RuntimeError> {
    let items = elements(value)?;
    interp.charge(items.len() as u64)?;
    Ok(items)
}

fn len(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("len", args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(RuntimeError::type_mismatch("sized value", other)),
    };
    Ok(Value::Int(n as i64))
}

fn abs(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or(RuntimeError::IntegerOverflow),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(RuntimeError::type_mismatch("number", other)),
    }
}

/// `min(xs)` / `min(a, b, ...)`; the first extreme element wins ties.
fn extremum(
    interp: &mut Interpreter,
    name: &str,
    args: Vec<Value>,
    keep: Ordering,
) -> Result<Value, RuntimeError> {
    let items = if args.len() == 1 {
        iterated(interp, &args[0])?
    } else {
        args
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(RuntimeError::invalid(format!("{name}() of an empty sequence")));
    };
    for item in iter {
        if item.total_cmp(&best) == keep {
            best = item;
        }
    }
    Ok(best)
}

fn sum(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity("sum", &args, 1, 2)?;
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    for item in iterated(interp, &args[0])? {
        total = eval_arith(ArithOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn sorted(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    arity("sorted", args, 1, 1)?;
    let mut items = iterated(interp, &args[0])?;
    items.sort_by(Value::total_cmp);
    Ok(Value::List(items))
}

fn reversed(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("reversed", args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Str(s.chars().rev().collect())),
        other => {
            let mut items = elements(other)?;
            items.reverse();
            Ok(Value::List(items))
        }
    }
}

fn int_arg(value: &Value) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(RuntimeError::type_mismatch("int", other)),
    }
}

fn range(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    arity("range", args, 1, 3)?;
    let (start, stop, step) = match args.len() {
        1 => (0, int_arg(&args[0])?, 1),
        2 => (int_arg(&args[0])?, int_arg(&args[1])?, 1),
        _ => (int_arg(&args[0])?, int_arg(&args[1])?, int_arg(&args[2])?),
    };
    if step == 0 {
        return Err(RuntimeError::invalid("range() step must not be zero"));
    }
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let span = if step > 0 { stop - start } else { start - stop };
    let len = if span <= 0 {
        0
    } else {
        (span - 1) / step.abs() + 1
    };
    interp.charge(u64::try_from(len).unwrap_or(u64::MAX))?;
    // Every produced value lies between start and stop, so it fits in i64.
    let items = (0..len)
        .map(|i| Value::Int((start + i * step) as i64))
        .collect();
    Ok(Value::List(items))
}

fn append(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("append", args, 2, 2)?;
    match &args[0] {
        Value::List(items) => {
            let mut out = items.clone();
            out.push(args[1].clone());
            Ok(Value::List(out))
        }
        other => Err(RuntimeError::type_mismatch("list", other)),
    }
}

fn collect(
    interp: &mut Interpreter,
    name: &str,
    args: &[Value],
    build: fn(Vec<Value>) -> Value,
) -> Result<Value, RuntimeError> {
    arity(name, args, 0, 1)?;
    match args.first() {
        Some(value) => Ok(build(iterated(interp, value)?)),
        None => Ok(build(Vec::new())),
    }
}

fn map_view(name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    arity(name, args, 1, 1)?;
    let Value::Map(entries) = &args[0] else {
        return Err(RuntimeError::type_mismatch("dict", &args[0]));
    };
    let items = entries
        .iter()
        .map(|(k, v)| match name {
            "keys" => k.clone(),
            "values" => v.clone(),
            _ => Value::Tuple(vec![k.clone(), v.clone()]),
        })
        .collect();
    Ok(Value::List(items))
}

/// Resolves a possibly negative index against `len`.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// Indexing shared by `get` and the `e[i]` operator.
pub(crate) fn index_value(base: &Value, index: &Value) -> Result<Option<Value>, RuntimeError> {
    match base {
        Value::List(items) | Value::Tuple(items) => {
            let i = int_arg(index)?;
            Ok(normalize_index(i, items.len()).map(|i| items[i].clone()))
        }
        Value::Str(s) => {
            let i = int_arg(index)?;
            let chars: Vec<char> = s.chars().collect();
            Ok(normalize_index(i, chars.len()).map(|i| Value::Str(chars[i].to_string())))
        }
        Value::Bytes(bytes) => {
            let i = int_arg(index)?;
            Ok(normalize_index(i, bytes.len()).map(|i| Value::Int(i64::from(bytes[i]))))
        }
        Value::Map(entries) => Ok(entries
            .iter()
            .find(|(k, _)| k.equals(index))
            .map(|(_, v)| v.clone())),
        other => Err(RuntimeError::type_mismatch("indexable value", other)),
    }
}

fn get(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("get", args, 2, 3)?;
    let default = args.get(2).cloned().unwrap_or(Value::None);
    if let Value::Record { fields, .. } = &args[0] {
        let Value::Str(field) = &args[1] else {
            return Err(RuntimeError::type_mismatch("str", &args[1]));
        };
        return Ok(fields.get(field).cloned().unwrap_or(default));
    }
    Ok(index_value(&args[0], &args[1])?.unwrap_or(default))
}

fn insert(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("insert", args, 3, 3)?;
    match &args[0] {
        Value::List(items) => {
            let len = items.len() as i64;
            let i = int_arg(&args[1])?;
            let at = if i < 0 { (i + len).max(0) } else { i.min(len) };
            let mut out = items.clone();
            out.insert(at as usize, args[2].clone());
            Ok(Value::List(out))
        }
        Value::Map(entries) => {
            let mut pairs = entries.clone();
            pairs.push((args[1].clone(), args[2].clone()));
            Ok(Value::map_from(pairs))
        }
        other => Err(RuntimeError::type_mismatch("list or dict", other)),
    }
}

/// Clamps a slice bound the way sequence slicing does.
fn slice_bound(bound: i64, len: usize) -> usize {
    let len = len as i64;
    let b = if bound < 0 { bound + len } else { bound };
    b.clamp(0, len) as usize
}

fn slice(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("slice", args, 2, 3)?;
    let start = int_arg(&args[1])?;
    let stop = match args.get(2) {
        None | Some(Value::None) => None,
        Some(v) => Some(int_arg(v)?),
    };
    let range_of = |len: usize| {
        let lo = slice_bound(start, len);
        let hi = stop.map_or(len, |s| slice_bound(s, len));
        lo..hi.max(lo)
    };
    match &args[0] {
        Value::List(items) => Ok(Value::List(items[range_of(items.len())].to_vec())),
        Value::Tuple(items) => Ok(Value::Tuple(items[range_of(items.len())].to_vec())),
        Value::Bytes(bytes) => Ok(Value::Bytes(bytes[range_of(bytes.len())].to_vec())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[range_of(chars.len())].iter().collect()))
        }
        other => Err(RuntimeError::type_mismatch("sequence", other)),
    }
}

fn to_int(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("int", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(x) => {
            let t = x.trunc();
            if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                Ok(Value::Int(t as i64))
            } else {
                Err(RuntimeError::invalid(format!("cannot convert {x} to int")))
            }
        }
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RuntimeError::invalid(format!("invalid int literal {s:?}"))),
        other => Err(RuntimeError::type_mismatch("number or str", other)),
    }
}

fn to_float(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("float", args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::invalid(format!("invalid float literal {s:?}"))),
        other => Err(RuntimeError::type_mismatch("number or str", other)),
    }
}

fn truth_fold(
    interp: &mut Interpreter,
    name: &str,
    args: &[Value],
    all: bool,
) -> Result<Value, RuntimeError> {
    arity(name, args, 1, 1)?;
    let items = iterated(interp, &args[0])?;
    let result = if all {
        items.iter().all(Value::is_truthy)
    } else {
        items.iter().any(Value::is_truthy)
    };
    Ok(Value::Bool(result))
}

fn count(args: &[Value]) -> Result<Value, RuntimeError> {
    arity("count", args, 2, 2)?;
    let n = elements(&args[0])?
        .iter()
        .filter(|item| item.equals(&args[1]))
        .count();
    Ok(Value::Int(n as i64))
}

/// `random()` draws a float in `[0, 1)`; `random(lo, hi)` an int in
/// `[lo, hi]`.
fn random(interp: &mut Interpreter, args: &[Value]) -> Result<Value, RuntimeError> {
    arity("random", args, 0, 2)?;
    match args {
        [] => Ok(Value::Float(interp.rng().gen::<f64>())),
        [lo, hi] => {
            let (lo, hi) = (int_arg(lo)?, int_arg(hi)?);
            if lo > hi {
                return Err(RuntimeError::invalid("random() with an empty range"));
            }
            Ok(Value::Int(interp.rng().gen_range(lo..=hi)))
        }
        _ => Err(RuntimeError::ArityMismatch {
            function: "random".into(),
            expected: 2,
            got: args.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InterpreterConfig;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::new(InterpreterConfig::default());
        call_builtin(&mut interp, name, args).expect("builtin exists")
    }

    fn ints(ns: &[i64]) -> Value {
        Value::List(ns.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn every_listed_builtin_dispatches() {
        let mut interp = Interpreter::new(InterpreterConfig::default());
        for name in BUILTINS {
            assert!(
                call_builtin(&mut interp, name, vec![]).is_some(),
                "{name} is listed but not dispatched"
            );
        }
        assert!(call_builtin(&mut interp, "nope", vec![]).is_none());
    }

    #[test]
    fn sorting_and_extremes() {
        assert_eq!(call("sorted", vec![ints(&[3, 1, 2])]).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(call("max", vec![ints(&[3, 9, 2])]).unwrap(), Value::Int(9));
        assert_eq!(call("min", vec![Value::Int(4), Value::Int(-1)]).unwrap(), Value::Int(-1));
        assert!(matches!(
            call("min", vec![ints(&[])]),
            Err(RuntimeError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn range_follows_step() {
        assert_eq!(call("range", vec![Value::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
        assert!(call("range", vec![Value::Int(0), Value::Int(1), Value::Int(0)]).is_err());
    }

    #[test]
    fn huge_range_hits_step_limit() {
        let err = call("range", vec![Value::Int(i64::MAX)]).unwrap_err();
        assert!(matches!(err, RuntimeError::StepLimitExceeded { .. }));
    }

    #[test]
    fn insert_and_slice_clamp() {
        assert_eq!(
            call("insert", vec![ints(&[1, 2]), Value::Int(99), Value::Int(3)]).unwrap(),
            ints(&[1, 2, 3])
        );
        assert_eq!(
            call("slice", vec![ints(&[1, 2, 3, 4]), Value::Int(-3), Value::Int(-1)]).unwrap(),
            ints(&[2, 3])
        );
        assert_eq!(
            call("slice", vec![Value::Str("hello".into()), Value::Int(1)]).unwrap(),
            Value::Str("ello".into())
        );
    }

    #[test]
    fn sum_promotes_to_float() {
        let xs = Value::List(vec![Value::Int(1), Value::Float(0.5)]);
        assert_eq!(call("sum", vec![xs]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn print_goes_to_the_output_log() {
        let mut interp = Interpreter::new(InterpreterConfig::default());
        call_builtin(&mut interp, "print", vec![Value::Str("x".into()), Value::Int(1)])
            .unwrap()
            .unwrap();
        assert_eq!(interp.io_log(), ["x 1".to_string()]);
    }

    #[test]
    fn random_is_seeded() {
        let draw = |seed| {
            let mut interp = Interpreter::new(InterpreterConfig {
                seed,
                ..InterpreterConfig::default()
            });
            call_builtin(&mut interp, "random", vec![]).unwrap().unwrap()
        };
        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(7), draw(8));
    }
}
