//! Obligation verifier.
//!
//! Runs every obligation of every non-specification function of a
//! [`Module`], one at a time, and emits one [`ObligationResult`] per
//! obligation:
//!
//! 1. `contracts_smoke`: one precondition-satisfying input, one call, every
//!    postcondition.
//! 2. `pure_static` / `pure_dynamic` for functions marked `@pure`.
//! 3. `equiv_to_spec`: deterministic probe, then seeded randomized search,
//!    comparing against the attached specification.
//! 4. `mutation_score` for every function, after all of the above, when
//!    [`VerifyConfig::mutate`] is set.
//! 5. `inferred_properties` for every function, last, when
//!    [`VerifyConfig::infer`] is set.
//!
//! Failures are isolated per obligation: an error in one phase never stops
//! the phases or functions after it.

pub mod config;
pub mod equality;
pub mod equivalence;
pub mod infer;
pub mod purity;
pub mod report;
pub mod result;
pub mod smoke;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attest_core::types::TypeEnv;
use chrono::{SecondsFormat, Utc};
use proptest::strategy::BoxedStrategy;

use crate::contracts::check::preconditions_hold;
use crate::contracts::{ContractBundle, Predicate, RegistryEntry};
use crate::interpreter::{Args, Callable, Interpreter, RuntimeError, Scope, Value};
use crate::module::Module;
use crate::mutation;
use crate::strategy::{StrategyError, StrategyRegistry, SynthesisLimits, Synthesizer};

pub use config::{ProbeBudgetMode, VerifyConfig};
pub use equality::{approx_equal, isclose, results_equal};
pub use infer::{infer_structural, InferredProperty};
pub use result::{ObligationKind, ObligationResult, Outcome, Status, TrustSummary, VerificationRun};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid configuration {var}: {message}")]
    Config { var: String, message: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Verifies every function of `module`.
///
/// `on_result` is called once per finished obligation, in completion order.
/// Report files are written to `config.output_dir` when set; a write failure
/// is logged and does not change the returned run.
pub fn verify_module(
    module: &Module,
    config: &VerifyConfig,
    mut on_result: impl FnMut(&ObligationResult),
) -> VerificationRun {
    let started = Instant::now();
    tracing::info!(module = module.name(), "verifying module");

    let mut results = Vec::new();
    let mut verified = Vec::new();
    let subjects: Vec<Subject<'_>> = module
        .registry()
        .subjects()
        .map(|(_, entry)| Subject::from_entry(module, entry))
        .collect();

    for subject in &subjects {
        verify_function(subject, config, &mut |result: ObligationResult| {
            emit(&mut results, &mut on_result, result)
        });
        verified.push(subject.name.to_string());
    }

    if config.mutate {
        for subject in &subjects {
            let started = Instant::now();
            let outcome = mutation::score::mutation_outcome(subject, config);
            emit(
                &mut results,
                &mut on_result,
                ObligationResult::new(
                    subject.name,
                    ObligationKind::MutationScore,
                    outcome,
                    started.elapsed(),
                ),
            );
        }
    }

    if config.infer {
        for subject in &subjects {
            let started = Instant::now();
            let outcome = infer::inferred_outcome(subject, config);
            emit(
                &mut results,
                &mut on_result,
                ObligationResult::new(
                    subject.name,
                    ObligationKind::InferredProperties,
                    outcome,
                    started.elapsed(),
                ),
            );
        }
    }

    let run = VerificationRun {
        results,
        trust: TrustSummary {
            module: module.name().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            functions: verified,
        },
    };

    if let Some(dir) = &config.output_dir {
        if let Err(e) = report::write_reports(dir, &run) {
            tracing::warn!(module = module.name(), error = %e, "failed to write reports");
        }
    }

    tracing::info!(
        module = module.name(),
        results = run.results.len(),
        clean = run.is_clean(),
        elapsed_s = started.elapsed().as_secs_f64(),
        "module verified"
    );
    run
}

fn verify_function(
    subject: &Subject<'_>,
    config: &VerifyConfig,
    emit: &mut dyn FnMut(ObligationResult),
) {
    let mut timed = |kind: ObligationKind, phase: &dyn Fn() -> Outcome| {
        let started = Instant::now();
        let outcome = phase();
        emit(ObligationResult::new(subject.name, kind, outcome, started.elapsed()));
    };

    timed(ObligationKind::ContractsSmoke, &|| smoke::run_smoke(subject, config));

    if let Some(purity) = subject.bundle.purity() {
        timed(ObligationKind::PureStatic, &|| {
            purity::static_purity(subject, purity)
        });
        timed(ObligationKind::PureDynamic, &|| {
            purity::dynamic_purity(subject, purity, config)
        });
    }

    timed(ObligationKind::EquivToSpec, &|| {
        equivalence::run_equivalence(subject, config)
    });
}

fn emit(
    results: &mut Vec<ObligationResult>,
    on_result: &mut impl FnMut(&ObligationResult),
    result: ObligationResult,
) {
    tracing::info!(
        function = %result.function,
        obligation = %result.obligation,
        status = %result.status,
        "obligation finished"
    );
    on_result(&result);
    results.push(result);
}

// ---------------------------------------------------------------------------
// Subject
// ---------------------------------------------------------------------------

/// A function under verification, with everything its phases need.
#[derive(Clone)]
pub(crate) struct Subject<'a> {
    pub name: &'a str,
    pub implementation: Callable,
    /// Scope in which script predicates are evaluated.
    pub predicate_scope: Arc<Scope>,
    pub bundle: &'a ContractBundle,
    pub specification: Option<(&'a str, &'a Callable)>,
    pub types: &'a TypeEnv,
    pub strategies: &'a StrategyRegistry,
}

impl<'a> Subject<'a> {
    pub(crate) fn from_entry(module: &'a Module, entry: &'a RegistryEntry) -> Self {
        let specification = entry
            .bundle
            .specification()
            .and_then(|id| module.registry().entry(id))
            .map(|spec| (spec.qualified_name.as_str(), &spec.original));
        Subject {
            name: &entry.qualified_name,
            implementation: entry.original.clone(),
            predicate_scope: entry.predicate_scope(),
            bundle: &entry.bundle,
            specification,
            types: module.types(),
            strategies: module.strategies(),
        }
    }

    /// The same subject with another implementation; predicates keep
    /// evaluating in the original scope.
    pub(crate) fn with_implementation(&self, implementation: Callable) -> Self {
        Subject {
            implementation,
            ..self.clone()
        }
    }

    pub(crate) fn args_strategy(
        &self,
        limits: SynthesisLimits,
    ) -> Result<BoxedStrategy<Args>, StrategyError> {
        Synthesizer::new(self.strategies, self.types, limits)
            .args(&self.implementation.signature())
    }

    pub(crate) fn preconditions(&self) -> &[Predicate] {
        self.bundle.preconditions()
    }

    pub(crate) fn requires_hold(&self, args: &Args) -> bool {
        preconditions_hold(self.preconditions(), &self.predicate_scope, args)
    }
}

/// Calls `callable` under the configured interpreter limits. A call that
/// returns after `deadline` is reported as [`RuntimeError::DeadlineExceeded`]
/// even if the callable never checked it (natives).
pub(crate) fn call_bounded(
    callable: &Callable,
    args: &Args,
    config: &VerifyConfig,
    deadline: Option<Duration>,
    seed: u64,
) -> Result<Value, RuntimeError> {
    let started = Instant::now();
    let mut interp = Interpreter::new(config.interpreter(deadline, seed));
    let value = callable.call_with(args, &mut interp)?;
    match deadline {
        Some(limit) if started.elapsed() > limit => Err(RuntimeError::DeadlineExceeded {
            ms: limit.as_millis() as u64,
        }),
        _ => Ok(value),
    }
}

pub(crate) fn args_json(args: &Args) -> serde_json::Value {
    serde_json::Value::Object(
        args.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}
