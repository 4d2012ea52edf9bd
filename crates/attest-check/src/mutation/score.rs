//! Mutation scoring.
//!
//! Each mutant is compiled into a copy of the original scope in which it
//! replaces the original, then:
//!
//! - excluded if it does not compile,
//! - excluded if it behaves exactly like the original on a small
//!   deterministic set of satisfying inputs,
//! - killed if the smoke test on the original's smoke input fails or
//!   errors, or if the equivalence search against the specification does,
//! - survived otherwise.
//!
//! `score = killed / (killed + survived)`; `None` when nothing was tested.

use std::sync::Arc;

use proptest::strategy::{Strategy, ValueTree};
use serde::Serialize;
use serde_json::json;

use crate::interpreter::{compile, Args, Callable, RuntimeError, Value};
use crate::module::Module;
use crate::strategy::search::deterministic_runner;
use crate::verify::equivalence::Comparison;
use crate::verify::smoke::{check_smoke, smoke_input};
use crate::verify::{call_bounded, Outcome, Status, Subject, VerifyConfig};

use super::{enumerate_mutants, Mutant};

/// Survivors listed in obligation details.
const REPORTED_SURVIVORS: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationReport {
    /// Mutants that were tested: `killed + survived`.
    pub total: usize,
    pub killed: usize,
    pub survived: usize,
    /// Non-compiling and probe-equivalent mutants.
    pub excluded: usize,
    pub score: Option<f64>,
    pub survivors: Vec<Mutant>,
}

/// Scores the contracts of `function` (qualified or module-local name).
/// Returns `None` for an unknown function.
pub fn mutate_and_score(
    module: &Module,
    function: &str,
    config: &VerifyConfig,
) -> Option<MutationReport> {
    let entry = module.registry().entry(module.lookup(function)?)?;
    Some(score_subject(&Subject::from_entry(module, entry), config))
}

pub(crate) fn score_subject(subject: &Subject<'_>, config: &VerifyConfig) -> MutationReport {
    let (Some(decl), Some(scope)) = (
        subject.implementation.decl(),
        subject.implementation.scope(),
    ) else {
        return MutationReport::default();
    };

    let mutants = enumerate_mutants(decl, config.max_mutants);
    let smoke = smoke_input(subject, config).ok();
    let mut probes = probe_inputs(subject, config);
    if let Some(args) = &smoke {
        probes.push(args.clone());
    }
    let expected: Vec<_> = probes
        .iter()
        .map(|args| call_bounded(&subject.implementation, args, config, None, 0))
        .collect();
    let seed = config.seed.unwrap_or_else(rand::random);

    let mut report = MutationReport::default();
    for mutant in mutants {
        let mutant_scope = scope.with_function(Arc::clone(&mutant.decl));
        if let Err(e) = compile(&mutant.decl, &mutant_scope) {
            tracing::debug!(function = subject.name, operator = %mutant.operator, error = %e, "mutant excluded: does not compile");
            report.excluded += 1;
            continue;
        }
        let callable = Callable::Script {
            decl: Arc::clone(&mutant.decl),
            scope: Arc::new(mutant_scope),
        };

        let equivalent = !probes.is_empty()
            && probes.iter().zip(&expected).all(|(args, expected)| {
                same_outcome(expected, &call_bounded(&callable, args, config, None, 0))
            });
        if equivalent {
            tracing::debug!(function = subject.name, operator = %mutant.operator, "mutant excluded: equivalent on probes");
            report.excluded += 1;
            continue;
        }

        let variant = subject.with_implementation(callable);
        if is_killed(&variant, smoke.as_ref(), config, seed) {
            report.killed += 1;
        } else {
            report.survived += 1;
            report.survivors.push(mutant);
        }
    }

    report.total = report.killed + report.survived;
    if report.total > 0 {
        report.score = Some(report.killed as f64 / report.total as f64);
    }
    tracing::debug!(
        function = subject.name,
        total = report.total,
        killed = report.killed,
        excluded = report.excluded,
        "mutation scored"
    );
    report
}

/// The `mutation_score` obligation.
pub(crate) fn mutation_outcome(subject: &Subject<'_>, config: &VerifyConfig) -> Outcome {
    let report = score_subject(subject, config);
    let survivors: Vec<serde_json::Value> = report
        .survivors
        .iter()
        .take(REPORTED_SURVIVORS)
        .map(|m| {
            json!({
                "operator": m.operator.as_str(),
                "line": m.location.line,
                "column": m.location.column,
                "original": m.original_fragment,
                "mutated": m.mutated_fragment,
            })
        })
        .collect();
    let details = json!({
        "total": report.total,
        "killed": report.killed,
        "survived": report.survived,
        "excluded": report.excluded,
        "score": report.score,
        "threshold": config.mutation_threshold,
        "survivors": survivors,
    });
    match report.score {
        None => Outcome::skip(details),
        Some(score) if score >= config.mutation_threshold => Outcome::pass(details),
        Some(_) => Outcome::fail(details),
    }
}

fn is_killed(
    variant: &Subject<'_>,
    smoke: Option<&Args>,
    config: &VerifyConfig,
    seed: u64,
) -> bool {
    let failed = |outcome: Outcome| matches!(outcome.status, Status::Fail | Status::Error);
    if let Some(args) = smoke {
        if failed(check_smoke(variant, args, config)) {
            return true;
        }
    }
    if let Some((spec_name, spec)) = variant.specification {
        let settings = variant.bundle.equivalence_or_default();
        let comparison = Comparison::new(variant, spec_name, spec, &settings, config);
        return failed(comparison.run(config.mutation_max_examples, config.probe_samples, seed));
    }
    false
}

/// Up to `equivalence_probe_samples` precondition-satisfying inputs from the
/// deterministic runner.
fn probe_inputs(subject: &Subject<'_>, config: &VerifyConfig) -> Vec<Args> {
    let Ok(strategy) = subject.args_strategy(config.limits()) else {
        return Vec::new();
    };
    let wanted = config.equivalence_probe_samples as usize;
    let mut runner = deterministic_runner();
    let mut inputs = Vec::new();
    for _ in 0..config.precondition_budget {
        if inputs.len() >= wanted {
            break;
        }
        let Ok(tree) = strategy.new_tree(&mut runner) else {
            break;
        };
        let args = tree.current();
        if subject.requires_hold(&args) {
            inputs.push(args);
        }
    }
    inputs
}

fn same_outcome(a: &Result<Value, RuntimeError>, b: &Result<Value, RuntimeError>) -> bool {
    match (a, b) {
        (Ok(x), Ok(y)) => x.equals(y),
        (Err(x), Err(y)) => x == y,
        _ => false,
    }
}
