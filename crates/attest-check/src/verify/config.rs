//! Verification settings.
//!
//! Defaults suit interactive use. `VerifyConfig::from_env` overrides them
//! from environment variables:
//! - `ATTEST_OUTPUT_DIR`: directory for the report files (default: none,
//!   reports are not written)
//! - `ATTEST_MAX_COLLECTION_SIZE`: collection size for the equivalence
//!   search (default: 20)
//! - `ATTEST_SMOKE_MAX_COLLECTION_SIZE`: collection size for smoke inputs
//!   (default: 5)
//! - `ATTEST_SEED`: seed of the randomized equivalence search (default:
//!   fresh per run)
//! - `ATTEST_MUTATE`: `1`/`true` to run mutation scoring
//! - `ATTEST_INFER`: `1`/`true` to run structural property inference

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::interpreter::InterpreterConfig;
use crate::strategy::search::SearchBudget;
use crate::strategy::SynthesisLimits;

use super::VerifyError;

/// How the deterministic probe's samples relate to `max_examples`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeBudgetMode {
    /// The probe runs on top of the randomized search's `max_examples`.
    #[default]
    Additive,
    /// The probe's samples are subtracted from `max_examples`.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub output_dir: Option<PathBuf>,
    pub max_collection_size: usize,
    pub smoke_max_collection_size: usize,
    pub max_depth: usize,
    /// Seed of the randomized equivalence search.
    pub seed: Option<u64>,
    /// Samples drawn by the deterministic probe.
    pub probe_samples: u32,
    pub probe_budget: ProbeBudgetMode,
    /// Samples drawn while looking for an input satisfying the
    /// preconditions.
    pub precondition_budget: u32,
    pub max_shrink_iters: usize,
    pub max_steps: u64,
    pub max_recursion_depth: usize,
    pub mutate: bool,
    pub max_mutants: usize,
    pub mutation_max_examples: u32,
    pub equivalence_probe_samples: u32,
    pub mutation_threshold: f64,
    /// Emit `inferred_properties` for every function.
    pub infer: bool,
    /// Samples per inferred property.
    pub infer_max_examples: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            output_dir: None,
            max_collection_size: 20,
            smoke_max_collection_size: 5,
            max_depth: 5,
            seed: None,
            probe_samples: 100,
            probe_budget: ProbeBudgetMode::Additive,
            precondition_budget: 1000,
            max_shrink_iters: 1000,
            max_steps: 1_000_000,
            max_recursion_depth: 256,
            mutate: false,
            max_mutants: 50,
            mutation_max_examples: 50,
            equivalence_probe_samples: 10,
            mutation_threshold: 0.8,
            infer: false,
            infer_max_examples: 200,
        }
    }
}

impl VerifyConfig {
    /// Defaults overridden from `ATTEST_*` environment variables.
    ///
    /// # Errors
    ///
    /// [`VerifyError::Config`] if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, VerifyError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, VerifyError> {
        let mut config = VerifyConfig::default();
        if let Some(dir) = var("ATTEST_OUTPUT_DIR") {
            config.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(size) = parse_var(&var, "ATTEST_MAX_COLLECTION_SIZE")? {
            config.max_collection_size = size;
        }
        if let Some(size) = parse_var(&var, "ATTEST_SMOKE_MAX_COLLECTION_SIZE")? {
            config.smoke_max_collection_size = size;
        }
        if let Some(seed) = parse_var(&var, "ATTEST_SEED")? {
            config.seed = Some(seed);
        }
        if let Some(flag) = parse_flag(&var, "ATTEST_MUTATE")? {
            config.mutate = flag;
        }
        if let Some(flag) = parse_flag(&var, "ATTEST_INFER")? {
            config.infer = flag;
        }
        Ok(config)
    }

    pub(crate) fn limits(&self) -> SynthesisLimits {
        SynthesisLimits {
            max_collection_size: self.max_collection_size,
            max_depth: self.max_depth,
        }
    }

    pub(crate) fn smoke_limits(&self) -> SynthesisLimits {
        self.limits()
            .with_collection_size(self.smoke_max_collection_size)
    }

    pub(crate) fn search_budget(&self) -> SearchBudget {
        SearchBudget {
            max_samples: self.precondition_budget,
            max_shrink_iters: self.max_shrink_iters,
        }
    }

    pub(crate) fn interpreter(&self, deadline: Option<Duration>, seed: u64) -> InterpreterConfig {
        InterpreterConfig {
            max_recursion_depth: self.max_recursion_depth,
            max_steps: self.max_steps,
            deadline,
            seed,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, VerifyError>
where
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| VerifyError::Config {
                var: name.to_string(),
                message: format!("invalid value '{raw}': {e}"),
            }),
    }
}

fn parse_flag(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<bool>, VerifyError> {
    let Some(flag) = var(name) else {
        return Ok(None);
    };
    match flag.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" | "" => Ok(Some(false)),
        _ => Err(VerifyError::Config {
            var: name.to_string(),
            message: format!("expected a boolean, got '{flag}'"),
        }),
    }
}
