//! Phase 1: contract smoke test.

use serde_json::json;

use crate::contracts::check::check_postconditions;
use crate::interpreter::Args;
use crate::strategy::search::{deterministic_runner, find_satisfying_args, SearchError};

use super::{args_json, call_bounded, Outcome, Subject, VerifyConfig};

/// One satisfying input, one call, every postcondition.
pub(crate) fn run_smoke(subject: &Subject<'_>, config: &VerifyConfig) -> Outcome {
    match smoke_input(subject, config) {
        Ok(args) => check_smoke(subject, &args, config),
        Err(outcome) => outcome,
    }
}

/// The minimal precondition-satisfying input, or the terminal outcome
/// (`skip` when unsatisfiable, `error` when no strategy exists).
pub(crate) fn smoke_input(subject: &Subject<'_>, config: &VerifyConfig) -> Result<Args, Outcome> {
    let strategy = subject
        .args_strategy(config.smoke_limits())
        .map_err(|e| Outcome::error(json!({ "error": e.to_string() })))?;
    find_satisfying_args(
        &strategy,
        subject.preconditions(),
        &subject.predicate_scope,
        &config.search_budget(),
        &mut deterministic_runner(),
    )
    .map_err(|e| match e {
        SearchError::PreconditionUnsatisfiable { attempts } => {
            tracing::debug!(function = subject.name, attempts, "preconditions unsatisfiable");
            Outcome::skip(json!({
                "reason": "precondition_unsatisfiable",
                "attempts": attempts,
            }))
        }
        SearchError::Generation(message) => Outcome::error(json!({ "error": message })),
    })
}

/// Calls the implementation once on `args` and checks the postconditions
/// in order.
pub(crate) fn check_smoke(subject: &Subject<'_>, args: &Args, config: &VerifyConfig) -> Outcome {
    let result = match call_bounded(&subject.implementation, args, config, None, 0) {
        Ok(result) => result,
        Err(e) => {
            return Outcome::error(json!({
                "error": e.describe(),
                "example": args_json(args),
            }))
        }
    };

    if let Some(violation) = check_postconditions(
        subject.bundle.postconditions(),
        &subject.predicate_scope,
        args,
        &result,
    ) {
        return Outcome::fail(json!({
            "example": args_json(args),
            "result": result.to_json(),
            "postcondition_index": violation.index,
            "label": violation.label,
            "error": violation.message,
        }));
    }

    Outcome::pass(json!({
        "example": args_json(args),
        "requires": subject.preconditions().len(),
        "ensures": subject.bundle.postconditions().len(),
    }))
}
