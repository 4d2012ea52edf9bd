//! Obligation verification for attest functions.
//!
//! Attaches contracts and reference specifications to functions, generates
//! inputs from declared parameter types, and checks the resulting
//! obligations: a contract smoke test, specification equivalence with
//! counterexample shrinking, purity, mutation scoring of the contracts
//! themselves and inference of structural properties.
//!
//! # Modules
//!
//! - [`interpreter`]: values, scopes and the script interpreter
//! - [`contracts`]: contract bundles and the registry that owns them
//! - [`strategy`]: type-driven input generation on top of proptest
//! - [`module`]: loading functions from source and from Rust
//! - [`verify`]: the obligation phases, property inference, results and
//!   report files
//! - [`mutation`]: mutant enumeration and mutation scoring

pub mod contracts;
pub mod interpreter;
pub mod module;
pub mod mutation;
pub mod strategy;
pub mod verify;

pub use contracts::{
    ContractBundle, ContractError, ContractRegistry, Contracted, EqualityMode, EquivalenceConfig,
    HealthCheck, Predicate, PurityConfig,
};
pub use interpreter::{Args, Callable, ParamSig, RuntimeError, Scope, Signature, Value};
pub use module::{LoadError, Module};
pub use mutation::{enumerate_mutants, mutate_and_score, Mutant, MutationOperator, MutationReport};
pub use strategy::{StrategyError, StrategyRegistry, SynthesisLimits, Synthesizer};
pub use verify::{
    infer_structural, verify_module, InferredProperty, ObligationKind, ObligationResult, Outcome,
    Status, TrustSummary, VerificationRun, VerifyConfig, VerifyError,
};
