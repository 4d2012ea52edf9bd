//! Purity obligations for functions marked `@pure`.
//!
//! The static check walks the syntax tree for calls to impure builtins,
//! following calls into other script functions of the same scope. It is a
//! heuristic: natives are opaque and are skipped. The dynamic check calls
//! the function twice on the same input and compares results, under the
//! declared equality mode, and output.

use std::collections::HashSet;
use std::fmt;

use attest_core::ast::{FunctionDecl, Span};
use attest_core::visit::walk_block;
use attest_core::ExprKind;
use serde::Serialize;
use serde_json::json;

use crate::contracts::PurityConfig;
use crate::interpreter::builtins::{IO_BUILTINS, NONDETERMINISTIC_BUILTINS};
use crate::interpreter::{Interpreter, Scope};

use super::equality::results_equal;
use super::smoke::smoke_input;
use super::{args_json, Outcome, Subject, VerifyConfig};

/// A call to an impure builtin reachable from a checked function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpureCall {
    /// Function whose body contains the call.
    pub function: String,
    pub builtin: String,
    pub span: Span,
}

impl fmt::Display for ImpureCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}() called in {} at {}", self.builtin, self.function, self.span)
    }
}

/// Impure builtin calls reachable from `decl` through script functions of
/// `scope`. With `allow_random`, nondeterministic builtins are accepted.
pub fn impure_calls(decl: &FunctionDecl, scope: &Scope, allow_random: bool) -> Vec<ImpureCall> {
    let mut found = Vec::new();
    let mut seen: HashSet<&str> = HashSet::from([decl.name.as_str()]);
    let mut pending = vec![decl];

    while let Some(current) = pending.pop() {
        walk_block(&current.body, &mut |expr| {
            let ExprKind::Call { callee, .. } = &expr.kind else {
                return;
            };
            if let Some(helper) = scope.function(callee) {
                if seen.insert(helper.name.as_str()) {
                    pending.push(helper.as_ref());
                }
                return;
            }
            if scope.resolves(callee) {
                return;
            }
            let impure = IO_BUILTINS.contains(&callee.as_str())
                || (!allow_random && NONDETERMINISTIC_BUILTINS.contains(&callee.as_str()));
            if impure {
                found.push(ImpureCall {
                    function: current.name.clone(),
                    builtin: callee.clone(),
                    span: expr.span,
                });
            }
        });
    }
    found
}

pub(crate) fn static_purity(subject: &Subject<'_>, purity: &PurityConfig) -> Outcome {
    let (Some(decl), Some(scope)) = (
        subject.implementation.decl(),
        subject.implementation.scope(),
    ) else {
        return Outcome::skip(json!({ "mode": purity.mode(), "reason": "native function" }));
    };
    let calls = impure_calls(decl, scope, purity.seed.is_some());
    if calls.is_empty() {
        Outcome::pass(json!({
            "mode": purity.mode(),
            "message": "no impure operations detected",
        }))
    } else {
        Outcome::fail(json!({
            "mode": purity.mode(),
            "warnings": calls.iter().map(ToString::to_string).collect::<Vec<_>>(),
        }))
    }
}

/// Two calls on the smoke input. Seed-deterministic functions get the same
/// seed twice, strict ones two different seeds.
pub(crate) fn dynamic_purity(
    subject: &Subject<'_>,
    purity: &PurityConfig,
    config: &VerifyConfig,
) -> Outcome {
    let args = match smoke_input(subject, config) {
        Ok(args) => args,
        Err(outcome) => return outcome,
    };
    let (first_seed, second_seed) = purity.seed.map_or((1, 2), |seed| (seed, seed));

    let run = |seed| {
        let mut interp = Interpreter::new(config.interpreter(None, seed));
        subject
            .implementation
            .call_with(&args, &mut interp)
            .map(|value| (value, interp.io_log().to_vec()))
    };
    let (first, second) = match (run(first_seed), run(second_seed)) {
        (Ok(first), Ok(second)) => (first, second),
        (Err(e), _) | (_, Err(e)) => {
            return Outcome::error(json!({
                "mode": purity.mode(),
                "example": args_json(&args),
                "error": e.describe(),
            }))
        }
    };

    let equality = purity
        .equality
        .as_ref()
        .map(|mode| mode.resolve(subject.implementation.signature().returns.as_ref(), subject.types));
    let same = match &equality {
        Some(mode) => results_equal(mode, &first.0, &second.0),
        None => first.0.equals(&second.0),
    };
    if !same {
        return Outcome::fail(json!({
            "mode": purity.mode(),
            "example": args_json(&args),
            "first": first.0.to_json(),
            "second": second.0.to_json(),
            "error": "results differ between calls",
        }));
    }
    let output: Vec<&String> = first.1.iter().chain(&second.1).collect();
    if !output.is_empty() {
        return Outcome::fail(json!({
            "mode": purity.mode(),
            "example": args_json(&args),
            "output": output,
            "error": "function produced output",
        }));
    }
    Outcome::pass(json!({
        "mode": purity.mode(),
        "example": args_json(&args),
        "result": first.0.to_json(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::parse_module;
    use std::sync::Arc;

    fn scope(source: &str) -> Scope {
        let module = parse_module(source).unwrap();
        let mut scope = Scope::default();
        for decl in module.functions {
            scope.add_function(Arc::new(decl));
        }
        scope
    }

    const SOURCE: &str = r#"
fn log(x: int) -> int {
    print("x", x);
    return x;
}

fn roll() -> int {
    return random(0, 6);
}

fn outer(x: int) -> int {
    return log(x) + roll();
}

fn clean(x: int) -> int {
    return abs(x) + 1;
}
"#;

    #[test]
    fn follows_helpers_transitively() {
        let scope = scope(SOURCE);
        let outer = scope.function("outer").unwrap();
        let calls = impure_calls(outer, &scope, false);
        let found: Vec<(&str, &str)> = calls
            .iter()
            .map(|c| (c.function.as_str(), c.builtin.as_str()))
            .collect();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&("log", "print")));
        assert!(found.contains(&("roll", "random")));
    }

    #[test]
    fn seed_mode_accepts_randomness() {
        let scope = scope(SOURCE);
        let calls = impure_calls(scope.function("outer").unwrap(), &scope, true);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].builtin, "print");
        assert_eq!(calls[0].to_string(), "print() called in log at 3:5");
    }

    #[test]
    fn clean_function_has_no_findings() {
        let scope = scope(SOURCE);
        assert!(impure_calls(scope.function("clean").unwrap(), &scope, false).is_empty());
    }
}
