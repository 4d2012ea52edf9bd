//! Precondition-filtered input search.

use proptest::strategy::{BoxedStrategy, Strategy, ValueTree};
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::contracts::check::preconditions_hold;
use crate::contracts::Predicate;
use crate::interpreter::{Args, Scope};

use super::minimize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// No sampled input satisfied every precondition. This is an untestable
    /// contract, not a broken function.
    #[error("no input satisfying the preconditions found in {attempts} samples")]
    PreconditionUnsatisfiable { attempts: u32 },

    #[error("value generation failed: {0}")]
    Generation(String),
}

/// Sampling budget of [`find_satisfying_args`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    /// Default: 1000.
    pub max_samples: u32,
    /// Default: 1000.
    pub max_shrink_iters: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        SearchBudget {
            max_samples: 1000,
            max_shrink_iters: 1000,
        }
    }
}

/// A runner whose sample sequence is the same on every run.
pub fn deterministic_runner() -> TestRunner {
    TestRunner::new_with_rng(
        Config::default(),
        TestRng::deterministic_rng(RngAlgorithm::ChaCha),
    )
}

/// A runner whose sample sequence is determined by `seed`.
pub fn seeded_runner(seed: u64) -> TestRunner {
    let mut bytes = [0u8; 32];
    ChaCha8Rng::seed_from_u64(seed).fill_bytes(&mut bytes);
    TestRunner::new_with_rng(
        Config::default(),
        TestRng::from_seed(RngAlgorithm::ChaCha, &bytes),
    )
}

/// Samples argument sets until one satisfies every precondition, then
/// shrinks it while it keeps satisfying them.
///
/// # Errors
///
/// [`SearchError::PreconditionUnsatisfiable`] once `budget.max_samples`
/// samples were rejected.
pub fn find_satisfying_args(
    strategy: &BoxedStrategy<Args>,
    preconditions: &[Predicate],
    scope: &Scope,
    budget: &SearchBudget,
    runner: &mut TestRunner,
) -> Result<Args, SearchError> {
    for _ in 0..budget.max_samples {
        let mut tree = strategy
            .new_tree(runner)
            .map_err(|reason| SearchError::Generation(reason.message().to_string()))?;
        if !preconditions_hold(preconditions, scope, &tree.current()) {
            continue;
        }
        let (args, (), _) = minimize(&mut tree, (), budget.max_shrink_iters, |args| {
            preconditions_hold(preconditions, scope, args).then_some(())
        });
        return Ok(args);
    }
    Err(SearchError::PreconditionUnsatisfiable {
        attempts: budget.max_samples,
    })
}
