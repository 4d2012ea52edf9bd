//! Script interpreter for functions under verification.
//!
//! Executes attest script functions with Python-like value semantics,
//! producing a [`Value`] or a [`RuntimeError`].
//!
//! # Architecture
//!
//! - [`Interpreter`] walks a [`FunctionDecl`] body. One interpreter carries
//!   the step budget, recursion depth, seeded RNG and output log of a single
//!   top-level call.
//! - [`Scope`] resolves callee names: scope functions, native helpers, record
//!   constructors, then builtins.
//! - [`Callable`] is the unit the verifier works with: a script function
//!   bound to its scope, or a native closure with a [`Signature`].
//! - [`compile`] is the name-resolution check run before anything executes.
//!
//! # Usage
//!
//! ```ignore
//! let callable = Callable::Script { decl, scope };
//! let mut args = Args::new();
//! args.insert("xs".into(), Value::List(vec![Value::Int(3)]));
//! let result = callable.call(&args)?;
//! ```
//!
//! [`FunctionDecl`]: attest_core::FunctionDecl

pub mod builtins;
pub mod compile;
pub mod error;
pub mod eval;
pub mod exec;
pub mod scope;
pub mod value;

pub use compile::{compile, compile_expr, CompileError};
pub use error::RuntimeError;
pub use exec::{Interpreter, InterpreterConfig};
pub use scope::{Args, Callable, NativeFn, ParamSig, Scope, Signature};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use attest_core::parse_module;
    use attest_core::types::{RecordDef, TypeDesc, TypeEnv};

    /// Parses `source` into a scope and returns it with its function decls.
    fn load(source: &str) -> Arc<Scope> {
        let module = parse_module(source).unwrap();
        let mut types = TypeEnv::new();
        for record in &module.records {
            types
                .register_record(RecordDef {
                    name: record.name.clone(),
                    fields: record.fields.iter().cloned().collect(),
                })
                .unwrap();
        }
        let mut scope = Scope::new(types);
        for decl in module.functions {
            scope.add_function(Arc::new(decl));
        }
        Arc::new(scope)
    }

    fn callable(scope: &Arc<Scope>, name: &str) -> Callable {
        Callable::Script {
            decl: Arc::clone(scope.function(name).unwrap()),
            scope: Arc::clone(scope),
        }
    }

    fn args(pairs: &[(&str, Value)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn ints(ns: &[i64]) -> Value {
        Value::List(ns.iter().copied().map(Value::Int).collect())
    }

    const SOURCE: &str = r#"
        record Point { x: int, y: int }

        fn insertion_sort(xs: list[int]) -> list[int] {
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

        fn fact(n: int) -> int {
            if n <= 1 { return 1; }
            return n * fact(n - 1);
        }

        fn shifted(p: Point, by: int = 1) -> Point {
            return Point(p.x + by, p.y);
        }

        fn first_even(xs: list[int]) -> int | none {
            for x in xs {
                if x % 2 != 0 { continue; }
                return x;
            }
        }

        fn spin() -> int {
            while true { pass; }
            return 0;
        }

        fn deep(n: int) -> int { return deep(n + 1); }

        fn noisy(x: int) -> float {
            print("x is", x);
            return random();
        }
    "#;

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    #[test]
    fn runs_loops_and_helpers() {
        let scope = load(SOURCE);
        let sort = callable(&scope, "insertion_sort");
        let result = sort.call(&args(&[("xs", ints(&[3, 1, 2, 1]))])).unwrap();
        assert_eq!(result, ints(&[1, 1, 2, 3]));
    }

    #[test]
    fn recursion_and_overflow() {
        let scope = load(SOURCE);
        let fact = callable(&scope, "fact");
        assert_eq!(fact.call(&args(&[("n", Value::Int(5))])).unwrap(), Value::Int(120));
        let err = fact.call(&args(&[("n", Value::Int(30))])).unwrap_err();
        assert_eq!(err, RuntimeError::IntegerOverflow);
    }

    #[test]
    fn records_and_defaults() {
        let scope = load(SOURCE);
        let shifted = callable(&scope, "shifted");
        let mut fields = indexmap::IndexMap::new();
        fields.insert("x".to_string(), Value::Int(1));
        fields.insert("y".to_string(), Value::Int(2));
        let p = Value::Record {
            name: "Point".into(),
            fields,
        };
        let moved = shifted.call(&args(&[("p", p)])).unwrap();
        assert_eq!(moved.to_string(), "Point(x=2, y=2)");

        let sig = shifted.signature();
        assert_eq!(sig.params[1].default, Some(Value::Int(1)));
        assert_eq!(sig.params[0].ty, Some(TypeDesc::named("Point")));
    }

    #[test]
    fn falling_off_the_end_returns_none() {
        let scope = load(SOURCE);
        let f = callable(&scope, "first_even");
        assert_eq!(f.call(&args(&[("xs", ints(&[1, 3, 4]))])).unwrap(), Value::Int(4));
        assert_eq!(f.call(&args(&[("xs", ints(&[1, 3]))])).unwrap(), Value::None);
    }

    #[test]
    fn argument_binding_errors() {
        let scope = load(SOURCE);
        let fact = callable(&scope, "fact");
        assert!(matches!(
            fact.call(&Args::new()),
            Err(RuntimeError::InvalidArgument { .. })
        ));
        assert!(matches!(
            fact.call(&args(&[("n", Value::Int(1)), ("m", Value::Int(2))])),
            Err(RuntimeError::InvalidArgument { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Limits
    // -----------------------------------------------------------------------

    #[test]
    fn step_budget_stops_infinite_loops() {
        let scope = load(SOURCE);
        let spin = callable(&scope, "spin");
        let mut interp = Interpreter::new(InterpreterConfig {
            max_steps: 10_000,
            ..InterpreterConfig::default()
        });
        let err = spin.call_with(&Args::new(), &mut interp).unwrap_err();
        assert_eq!(err, RuntimeError::StepLimitExceeded { limit: 10_000 });
    }

    #[test]
    fn deadline_stops_infinite_loops() {
        let scope = load(SOURCE);
        let spin = callable(&scope, "spin");
        let mut interp = Interpreter::new(InterpreterConfig {
            max_steps: u64::MAX,
            deadline: Some(Duration::from_millis(20)),
            ..InterpreterConfig::default()
        });
        let err = spin.call_with(&Args::new(), &mut interp).unwrap_err();
        assert_eq!(err, RuntimeError::DeadlineExceeded { ms: 20 });
    }

    #[test]
    fn recursion_limit() {
        let scope = load(SOURCE);
        let deep = callable(&scope, "deep");
        let mut interp = Interpreter::new(InterpreterConfig {
            max_recursion_depth: 32,
            ..InterpreterConfig::default()
        });
        let err = deep
            .call_with(&args(&[("n", Value::Int(0))]), &mut interp)
            .unwrap_err();
        assert_eq!(err, RuntimeError::RecursionLimitExceeded { limit: 32 });
    }

    #[test]
    fn output_and_rng_are_per_interpreter() {
        let scope = load(SOURCE);
        let noisy = callable(&scope, "noisy");
        let run = |seed| {
            let mut interp = Interpreter::new(InterpreterConfig {
                seed,
                ..InterpreterConfig::default()
            });
            let v = noisy
                .call_with(&args(&[("x", Value::Int(4))]), &mut interp)
                .unwrap();
            (v, interp.io_log().to_vec())
        };
        let (a, log) = run(1);
        let (b, _) = run(1);
        let (c, _) = run(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(log, vec!["x is 4".to_string()]);
    }

    // -----------------------------------------------------------------------
    // Natives and compilation
    // -----------------------------------------------------------------------

    #[test]
    fn script_calls_native_helpers() {
        let module = parse_module("fn twice(x: int) -> int { return double(x) + double(x); }")
            .unwrap();
        let mut scope = Scope::new(TypeEnv::new());
        scope.add_native(
            Signature::new("double", vec![ParamSig::new("v", TypeDesc::INT)], None),
            Arc::new(|a: &Args| match a.get("v") {
                Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                _ => Err(RuntimeError::Native {
                    message: "bad arg".into(),
                }),
            }),
        );
        let decl = Arc::new(module.functions[0].clone());
        scope.add_function(Arc::clone(&decl));
        compile(&decl, &scope).unwrap();
        let f = Callable::Script {
            decl,
            scope: Arc::new(scope),
        };
        assert_eq!(f.call(&args(&[("x", Value::Int(3))])).unwrap(), Value::Int(12));
    }

    #[test]
    fn compile_rejects_unresolved_names() {
        let scope = load(SOURCE);
        let bad = parse_module(
            "fn a(x: int) { return y; }\nfn b() { helper(); }\nfn c() { z = 1; }\nfn d() { break; }",
        )
        .unwrap();
        let errors: Vec<_> = bad
            .functions
            .iter()
            .map(|f| compile(f, &scope).unwrap_err())
            .collect();
        assert!(matches!(errors[0], CompileError::UndefinedName { ref name, .. } if name == "y"));
        assert!(matches!(errors[1], CompileError::UnknownCallee { ref name, .. } if name == "helper"));
        assert!(matches!(errors[2], CompileError::UndeclaredAssignment { ref name, .. } if name == "z"));
        assert!(matches!(errors[3], CompileError::LoopControlOutsideLoop { .. }));
    }

    #[test]
    fn compile_accepts_module_functions() {
        let scope = load(SOURCE);
        for name in ["insertion_sort", "fact", "shifted", "first_even", "spin", "deep", "noisy"] {
            compile(scope.function(name).unwrap(), &scope).unwrap();
        }
    }
}
