//! Phase 2: specification equivalence.
//!
//! Two searches over the same argument strategy, stopping at the first
//! failing sample:
//!
//! 1. a deterministic probe (`probe_samples` draws from a fixed-seed
//!    runner, identical on every run),
//! 2. a randomized search of up to `max_examples` precondition-satisfying
//!    samples from a runner seeded by `VerifyConfig::seed` or a fresh seed.
//!
//! Every sample lands in exactly one class: rejected by a precondition,
//! agreed, disagreed, postcondition violated, or raised (either side, a
//! deadline overrun included). A failing sample is shrunk through its value
//! tree while the failure class stays the same, and the last failing value
//! is reported together with the outcome recorded for it.
//!
//! A run in which neither search accepted a single sample compared nothing
//! and is a `skip`, never a `pass`.

use std::time::{Duration, Instant};

use proptest::strategy::{Strategy, ValueTree};
use serde_json::json;

use crate::contracts::check::check_postconditions;
use crate::contracts::{ContractViolation, EqualityMode, EquivalenceConfig, HealthCheck};
use crate::interpreter::{Args, Callable, RuntimeError, Value};
use crate::module::Module;
use crate::strategy::minimize;
use crate::strategy::search::{deterministic_runner, seeded_runner};

use super::equality::results_equal;
use super::{args_json, call_bounded, Outcome, ProbeBudgetMode, Subject, VerifyConfig};

/// Draws whose generation time is measured for the `too_slow` check.
const SLOW_WINDOW: u32 = 10;
const SLOW_LIMIT: Duration = Duration::from_secs(1);

pub(crate) fn run_equivalence(subject: &Subject<'_>, config: &VerifyConfig) -> Outcome {
    let Some((spec_name, spec)) = subject.specification else {
        return Outcome::skip(json!({ "reason": "no_specification" }));
    };
    let settings = subject.bundle.equivalence_or_default();
    let seed = config.seed.unwrap_or_else(rand::random);
    Comparison::new(subject, spec_name, spec, &settings, config).run(
        settings.max_examples,
        config.probe_samples,
        seed,
    )
}

/// Compares a function with its specification on one fixed input.
///
/// `function` is a qualified or module-local name. Returns `None` for an
/// unknown function; the outcome is `skip` without a specification or when
/// the input violates a precondition.
pub fn check_example(
    module: &Module,
    function: &str,
    args: &Args,
    config: &VerifyConfig,
) -> Option<Outcome> {
    let entry = module.registry().entry(module.lookup(function)?)?;
    let subject = Subject::from_entry(module, entry);
    let Some((spec_name, spec)) = subject.specification else {
        return Some(Outcome::skip(json!({ "reason": "no_specification" })));
    };
    let settings = subject.bundle.equivalence_or_default();
    let comparison = Comparison::new(&subject, spec_name, spec, &settings, config);
    Some(match comparison.evaluate(args) {
        Sample::Rejected => Outcome::skip(json!({
            "reason": "precondition_rejected",
            "args": args_json(args),
        })),
        Sample::Agreed(result) => Outcome::pass(json!({
            "spec": spec_name,
            "phase": "example",
            "args": args_json(args),
            "result": result.to_json(),
        })),
        Sample::Failed(failure) => comparison.failure_outcome("example", None, args, failure, 0),
    })
}

// ── Samples ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Implementation,
    Specification,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Implementation => "implementation",
            Side::Specification => "specification",
        }
    }
}

#[derive(Debug)]
enum Sample {
    Rejected,
    Agreed(Value),
    Failed(Failure),
}

#[derive(Debug)]
enum Failure {
    Disagreed {
        implementation: Value,
        specification: Value,
    },
    Violated {
        implementation: Value,
        violation: ContractViolation,
    },
    Raised {
        side: Side,
        error: RuntimeError,
    },
}

/// What a shrunk counterexample must keep: the failure variant, the
/// violated postcondition and the side that raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Disagreed,
    Violated(usize),
    Raised(Side),
}

impl Failure {
    fn kind(&self) -> FailureKind {
        match self {
            Failure::Disagreed { .. } => FailureKind::Disagreed,
            Failure::Violated { violation, .. } => FailureKind::Violated(violation.index),
            Failure::Raised { side, .. } => FailureKind::Raised(*side),
        }
    }
}

// ── Comparison ───────────────────────────────────────────────────────

/// An implementation paired with its specification and search settings.
pub(crate) struct Comparison<'s, 'a> {
    subject: &'s Subject<'a>,
    spec_name: &'a str,
    spec: &'a Callable,
    settings: &'s EquivalenceConfig,
    equality: EqualityMode,
    deadline: Option<Duration>,
    config: &'s VerifyConfig,
}

impl<'s, 'a> Comparison<'s, 'a> {
    pub(crate) fn new(
        subject: &'s Subject<'a>,
        spec_name: &'a str,
        spec: &'a Callable,
        settings: &'s EquivalenceConfig,
        config: &'s VerifyConfig,
    ) -> Self {
        let equality = settings
            .equality
            .resolve(subject.implementation.signature().returns.as_ref(), subject.types);
        Comparison {
            subject,
            spec_name,
            spec,
            settings,
            equality,
            deadline: settings.deadline_ms.map(Duration::from_millis),
            config,
        }
    }

    /// Probe, then randomized search.
    pub(crate) fn run(&self, max_examples: u32, probe_samples: u32, seed: u64) -> Outcome {
        let strategy = match self.subject.args_strategy(self.config.limits()) {
            Ok(strategy) => strategy,
            Err(e) => {
                return Outcome::error(json!({ "spec": self.spec_name, "error": e.to_string() }))
            }
        };

        let mut probe = deterministic_runner();
        let mut probe_accepted = 0u32;
        for _ in 0..probe_samples {
            let mut tree = match strategy.new_tree(&mut probe) {
                Ok(tree) => tree,
                Err(reason) => return self.generation_error(reason.message()),
            };
            match self.evaluate(&tree.current()) {
                Sample::Rejected => {}
                Sample::Agreed(_) => probe_accepted += 1,
                Sample::Failed(failure) => {
                    return self.shrink_and_report(&mut tree, failure, "probe", None)
                }
            }
        }

        let budget = match self.config.probe_budget {
            ProbeBudgetMode::Additive => max_examples,
            ProbeBudgetMode::Shared => max_examples.saturating_sub(probe_samples),
        };
        let max_rejections = u64::from(max_examples).saturating_mul(10).max(100);
        tracing::debug!(function = self.subject.name, seed, budget, "randomized search");

        let mut runner = seeded_runner(seed);
        let mut examples_run = 0u32;
        let mut rejections = 0u64;
        let mut timed_draws = 0u32;
        let mut generation = Duration::ZERO;
        let mut stopped = None;

        while examples_run < budget {
            let started = Instant::now();
            let mut tree = match strategy.new_tree(&mut runner) {
                Ok(tree) => tree,
                Err(reason) => return self.generation_error(reason.message()),
            };
            if timed_draws < SLOW_WINDOW {
                generation += started.elapsed();
                timed_draws += 1;
                if timed_draws == SLOW_WINDOW && generation > SLOW_LIMIT {
                    let message = format!(
                        "generating {SLOW_WINDOW} inputs took {:.2}s",
                        generation.as_secs_f64()
                    );
                    if let Some(outcome) = self.health_check(HealthCheck::TooSlow, message) {
                        return outcome;
                    }
                }
            }

            match self.evaluate(&tree.current()) {
                Sample::Rejected => {
                    rejections += 1;
                    if rejections >= max_rejections {
                        let message = format!(
                            "{rejections} inputs rejected by preconditions, {examples_run} accepted"
                        );
                        if let Some(outcome) =
                            self.health_check(HealthCheck::FilterTooMuch, message)
                        {
                            return outcome;
                        }
                        stopped = Some(HealthCheck::FilterTooMuch);
                        break;
                    }
                }
                Sample::Agreed(_) => examples_run += 1,
                Sample::Failed(failure) => {
                    return self.shrink_and_report(&mut tree, failure, "search", Some(seed))
                }
            }
        }

        if probe_accepted == 0 && examples_run == 0 {
            tracing::debug!(function = self.subject.name, rejections, "no input satisfied the preconditions");
            return Outcome::skip(json!({
                "spec": self.spec_name,
                "reason": "precondition_unsatisfiable",
                "attempts": u64::from(probe_samples) + rejections,
            }));
        }

        let mut details = json!({
            "spec": self.spec_name,
            "max_examples": max_examples,
            "examples_run": examples_run,
            "probe_samples": probe_samples,
            "probe_accepted": probe_accepted,
            "seed": seed,
            "equality": self.equality.name(),
            "requires": self.subject.preconditions().len(),
            "ensures": self.subject.bundle.postconditions().len(),
        });
        if let Some(check) = stopped {
            details["stopped_early"] = json!(check.as_str());
        }
        Outcome::pass(details)
    }

    fn evaluate(&self, args: &Args) -> Sample {
        if !self.subject.requires_hold(args) {
            return Sample::Rejected;
        }
        let implementation =
            match call_bounded(&self.subject.implementation, args, self.config, self.deadline, 0) {
                Ok(value) => value,
                Err(error) => {
                    return Sample::Failed(Failure::Raised {
                        side: Side::Implementation,
                        error,
                    })
                }
            };
        if let Some(violation) = check_postconditions(
            self.subject.bundle.postconditions(),
            &self.subject.predicate_scope,
            args,
            &implementation,
        ) {
            return Sample::Failed(Failure::Violated {
                implementation,
                violation,
            });
        }
        let specification = match call_bounded(self.spec, args, self.config, self.deadline, 0) {
            Ok(value) => value,
            Err(error) => {
                return Sample::Failed(Failure::Raised {
                    side: Side::Specification,
                    error,
                })
            }
        };
        if results_equal(&self.equality, &implementation, &specification) {
            Sample::Agreed(implementation)
        } else {
            Sample::Failed(Failure::Disagreed {
                implementation,
                specification,
            })
        }
    }

    fn shrink_and_report<T: ValueTree<Value = Args>>(
        &self,
        tree: &mut T,
        failure: Failure,
        phase: &str,
        seed: Option<u64>,
    ) -> Outcome {
        let original = failure.kind();
        let (args, shrunk, steps) =
            minimize(tree, failure, self.config.max_shrink_iters, |args| {
                match self.evaluate(args) {
                    Sample::Failed(f) if f.kind() == original => Some(f),
                    _ => None,
                }
            });
        tracing::debug!(function = self.subject.name, phase, shrink_steps = steps, "counterexample shrunk");
        self.failure_outcome(phase, seed, &args, shrunk, steps)
    }

    fn failure_outcome(
        &self,
        phase: &str,
        seed: Option<u64>,
        args: &Args,
        failure: Failure,
        shrink_steps: usize,
    ) -> Outcome {
        let mut details = json!({
            "spec": self.spec_name,
            "phase": phase,
            "args": args_json(args),
            "shrink_steps": shrink_steps,
        });
        if let Some(seed) = seed {
            details["seed"] = json!(seed);
        }
        match failure {
            Failure::Disagreed {
                implementation,
                specification,
            } => {
                details["implementation_result"] = implementation.to_json();
                details["specification_result"] = specification.to_json();
                Outcome::fail(details)
            }
            Failure::Violated {
                implementation,
                violation,
            } => {
                details["implementation_result"] = implementation.to_json();
                details["specification_result"] = serde_json::Value::Null;
                details["postcondition_index"] = json!(violation.index);
                details["note"] = json!(violation.to_string());
                Outcome::fail(details)
            }
            Failure::Raised { side, error } => {
                details["side"] = json!(side.as_str());
                details["error"] = json!(error.describe());
                Outcome::error(details)
            }
        }
    }

    /// `None` when `check` is suppressed.
    fn health_check(&self, check: HealthCheck, message: String) -> Option<Outcome> {
        if self.settings.suppressed_checks.contains(&check) {
            tracing::debug!(function = self.subject.name, check = check.as_str(), %message, "health check suppressed");
            return None;
        }
        tracing::warn!(function = self.subject.name, check = check.as_str(), %message, "health check failed");
        Some(Outcome::error(json!({
            "spec": self.spec_name,
            "health_check": check.as_str(),
            "error": message,
        })))
    }

    fn generation_error(&self, message: &str) -> Outcome {
        Outcome::error(json!({ "spec": self.spec_name, "error": message }))
    }
}
