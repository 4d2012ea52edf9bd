//! Contract bundles and the side table that owns them.
//!
//! A [`ContractBundle`] collects the obligations declared for one function:
//! ordered preconditions and postconditions, an optional reference
//! specification, equivalence-search settings and a purity declaration.
//! Bundles live in a [`ContractRegistry`] keyed by [`FunctionId`], never on
//! the callable itself. Every attach operation returns a [`Contracted`]
//! handle whose plain [`call`](Contracted::call) is exactly the original
//! call, so attaching contracts never changes behavior for other callers.

pub mod check;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use attest_core::ast::Expr;
use attest_core::id::FunctionId;
use attest_core::types::{TypeDesc, TypeEnv};
use attest_core::{parse_expr, CoreError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::interpreter::{Args, Callable, Interpreter, InterpreterConfig, RuntimeError, Scope, Value};

use check::{check_postconditions, check_preconditions};

pub use check::{ContractKind, ContractViolation};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    /// Contract or specification misattachment. Raised at decoration time.
    #[error("configuration error for {function}: {message}")]
    Configuration { function: String, message: String },

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
}

impl ContractError {
    fn configuration(function: &str, message: impl Into<String>) -> Self {
        ContractError::Configuration {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// Native predicate over the call's arguments and, for postconditions, its
/// result.
pub type NativePredicate =
    Arc<dyn Fn(&Args, Option<&Value>) -> Result<bool, RuntimeError> + Send + Sync>;

#[derive(Clone)]
pub enum PredicateBody {
    /// Script expression; parameters are bound by name, the return value as
    /// `result`.
    Script(Expr),
    Native(NativePredicate),
}

/// A labelled boolean condition over a call.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    body: PredicateBody,
}

impl Predicate {
    /// Wraps a script expression, labelled by its rendering.
    pub fn script(expr: Expr) -> Self {
        Predicate {
            label: expr.to_string(),
            body: PredicateBody::Script(expr),
        }
    }

    /// Parses `source` as a script expression.
    pub fn parse(source: &str) -> Result<Self, CoreError> {
        parse_expr(source).map(Predicate::script)
    }

    pub fn native(
        label: impl Into<String>,
        func: impl Fn(&Args, Option<&Value>) -> Result<bool, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Predicate {
            label: label.into(),
            body: PredicateBody::Native(Arc::new(func)),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn body(&self) -> &PredicateBody {
        &self.body
    }

    /// Evaluates the predicate. Script predicates run in `scope` with the
    /// arguments (and `result`) as their only locals.
    pub fn holds(
        &self,
        scope: &Scope,
        args: &Args,
        result: Option<&Value>,
    ) -> Result<bool, RuntimeError> {
        match &self.body {
            PredicateBody::Native(func) => func(args, result),
            PredicateBody::Script(expr) => {
                let mut bindings = args.clone();
                if let Some(result) = result {
                    bindings.insert("result".to_string(), result.clone());
                }
                let mut interp = Interpreter::new(InterpreterConfig::default());
                Ok(interp.eval_with(expr, scope, &bindings)?.is_truthy())
            }
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            PredicateBody::Script(_) => "script",
            PredicateBody::Native(_) => "native",
        };
        write!(f, "Predicate({kind}: {})", self.label)
    }
}

// ---------------------------------------------------------------------------
// Equivalence settings
// ---------------------------------------------------------------------------

/// Generator-quality diagnostics of the randomized search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    /// The first generated examples took too long to produce and run.
    TooSlow,
    /// Too many generated examples were rejected by preconditions.
    FilterTooMuch,
}

impl HealthCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthCheck::TooSlow => "too_slow",
            HealthCheck::FilterTooMuch => "filter_too_much",
        }
    }
}

impl FromStr for HealthCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "too_slow" => Ok(HealthCheck::TooSlow),
            "filter_too_much" => Ok(HealthCheck::FilterTooMuch),
            other => Err(format!("unknown health check '{other}'")),
        }
    }
}

/// Custom result comparison.
pub type EqualityFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// How implementation and specification results are compared.
#[derive(Clone)]
pub enum EqualityMode {
    /// Script `==` applied recursively.
    Structural,
    /// Scalars within `max(rel_tol * max(|a|, |b|), abs_tol)`.
    Approx { rel_tol: f64, abs_tol: f64 },
    /// `Approx` with default tolerances when the declared return type
    /// contains a float, `Structural` otherwise.
    Auto,
    Custom(EqualityFn),
}

impl EqualityMode {
    pub const DEFAULT_REL_TOL: f64 = 1e-5;
    pub const DEFAULT_ABS_TOL: f64 = 1e-8;

    pub fn approx() -> Self {
        EqualityMode::Approx {
            rel_tol: Self::DEFAULT_REL_TOL,
            abs_tol: Self::DEFAULT_ABS_TOL,
        }
    }

    pub fn custom(func: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        EqualityMode::Custom(Arc::new(func))
    }

    /// Replaces `Auto` by the concrete mode for a declared return type.
    pub fn resolve(&self, returns: Option<&TypeDesc>, types: &TypeEnv) -> EqualityMode {
        match self {
            EqualityMode::Auto => match returns {
                Some(ty) if ty.contains_float(types) => EqualityMode::approx(),
                Some(_) => EqualityMode::Structural,
                // Unannotated returns may carry floats.
                None => EqualityMode::approx(),
            },
            other => other.clone(),
        }
    }

    /// Short name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            EqualityMode::Structural => "structural",
            EqualityMode::Approx { .. } => "approx",
            EqualityMode::Auto => "auto",
            EqualityMode::Custom(_) => "custom",
        }
    }
}

impl Default for EqualityMode {
    fn default() -> Self {
        EqualityMode::Structural
    }
}

impl fmt::Debug for EqualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EqualityMode::Approx { rel_tol, abs_tol } => f
                .debug_struct("Approx")
                .field("rel_tol", rel_tol)
                .field("abs_tol", abs_tol)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Settings of the specification-equivalence search.
#[derive(Debug, Clone)]
pub struct EquivalenceConfig {
    /// Randomized samples to run. Must be positive. Default: 200.
    pub max_examples: u32,
    /// Per-sample deadline. Must be positive when set.
    pub deadline_ms: Option<u64>,
    pub suppressed_checks: BTreeSet<HealthCheck>,
    pub equality: EqualityMode,
}

impl Default for EquivalenceConfig {
    fn default() -> Self {
        EquivalenceConfig {
            max_examples: 200,
            deadline_ms: None,
            suppressed_checks: [HealthCheck::TooSlow, HealthCheck::FilterTooMuch]
                .into_iter()
                .collect(),
            equality: EqualityMode::Structural,
        }
    }
}

impl EquivalenceConfig {
    fn validate(&self, function: &str) -> Result<(), ContractError> {
        if self.max_examples == 0 {
            return Err(ContractError::configuration(
                function,
                "max_examples must be positive",
            ));
        }
        if self.deadline_ms == Some(0) {
            return Err(ContractError::configuration(
                function,
                "deadline_ms must be positive",
            ));
        }
        if let EqualityMode::Approx { rel_tol, abs_tol } = self.equality {
            if !(rel_tol >= 0.0 && abs_tol >= 0.0) {
                return Err(ContractError::configuration(
                    function,
                    "tolerances must be non-negative",
                ));
            }
        }
        Ok(())
    }
}

/// Purity declaration.
///
/// With a seed the function is seed-deterministic: it may draw random
/// numbers but must be reproducible when the RNG is seeded. Without one it
/// must be strictly pure. Repeated results are compared with `equality`,
/// structurally when unset.
#[derive(Debug, Clone, Default)]
pub struct PurityConfig {
    pub seed: Option<u64>,
    pub equality: Option<EqualityMode>,
}

impl PurityConfig {
    pub fn mode(&self) -> &'static str {
        if self.seed.is_some() {
            "seed-deterministic"
        } else {
            "strict"
        }
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The obligations declared for one function.
#[derive(Debug, Clone, Default)]
pub struct ContractBundle {
    preconditions: Vec<Predicate>,
    postconditions: Vec<Predicate>,
    specification: Option<FunctionId>,
    equivalence: Option<EquivalenceConfig>,
    purity: Option<PurityConfig>,
}

impl ContractBundle {
    pub fn with_precondition(mut self, predicate: Predicate) -> Self {
        self.preconditions.push(predicate);
        self
    }

    pub fn with_postcondition(mut self, predicate: Predicate) -> Self {
        self.postconditions.push(predicate);
        self
    }

    pub fn with_specification(mut self, spec: FunctionId) -> Self {
        self.specification = Some(spec);
        self
    }

    pub fn with_equivalence(mut self, config: EquivalenceConfig) -> Self {
        self.equivalence = Some(config);
        self
    }

    pub fn with_purity(mut self, config: PurityConfig) -> Self {
        self.purity = Some(config);
        self
    }

    pub fn preconditions(&self) -> &[Predicate] {
        &self.preconditions
    }

    pub fn postconditions(&self) -> &[Predicate] {
        &self.postconditions
    }

    pub fn specification(&self) -> Option<FunctionId> {
        self.specification
    }

    pub fn equivalence(&self) -> Option<&EquivalenceConfig> {
        self.equivalence.as_ref()
    }

    /// The equivalence settings, or the defaults when none were attached.
    pub fn equivalence_or_default(&self) -> EquivalenceConfig {
        self.equivalence.clone().unwrap_or_default()
    }

    pub fn purity(&self) -> Option<&PurityConfig> {
        self.purity.as_ref()
    }

    /// True if the bundle declares anything at all.
    pub fn has_contracts(&self) -> bool {
        !self.preconditions.is_empty()
            || !self.postconditions.is_empty()
            || self.specification.is_some()
            || self.equivalence.is_some()
            || self.purity.is_some()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// One registered function.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub qualified_name: String,
    /// The undecorated callable.
    pub original: Callable,
    pub bundle: ContractBundle,
    /// Marked as ground truth; never verified itself.
    pub is_specification: bool,
}

impl RegistryEntry {
    /// Scope for script predicates: the function's own scope for script
    /// functions, an empty one for natives.
    pub fn predicate_scope(&self) -> Arc<Scope> {
        self.original
            .scope()
            .cloned()
            .unwrap_or_else(|| Arc::new(Scope::default()))
    }
}

/// A registered function: calling it is calling the original.
#[derive(Debug, Clone)]
pub struct Contracted {
    id: FunctionId,
    original: Callable,
}

impl Contracted {
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn original(&self) -> &Callable {
        &self.original
    }

    /// Calls the original function, with no contract checks.
    pub fn call(&self, args: &Args) -> Result<Value, RuntimeError> {
        self.original.call(args)
    }

    /// Calls the original function, enforcing the registered preconditions
    /// before and postconditions after the call.
    pub fn call_checked(
        &self,
        registry: &ContractRegistry,
        args: &Args,
    ) -> Result<Value, CheckedCallError> {
        let entry = registry
            .entry(self.id)
            .ok_or_else(|| ContractError::UnknownFunction {
                name: self.original.name().to_string(),
            })?;
        let scope = entry.predicate_scope();
        if let Some(violation) = check_preconditions(entry.bundle.preconditions(), &scope, args) {
            return Err(CheckedCallError::Violation(violation));
        }
        let result = self.original.call(args)?;
        if let Some(violation) =
            check_postconditions(entry.bundle.postconditions(), &scope, args, &result)
        {
            return Err(CheckedCallError::Violation(violation));
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckedCallError {
    #[error("{0}")]
    Violation(ContractViolation),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

/// Identity-keyed side table of contract bundles, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    entries: IndexMap<FunctionId, RegistryEntry>,
    by_name: HashMap<String, FunctionId>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `original` under `qualified_name` with an empty bundle.
    /// Registering a name again returns the existing handle.
    pub fn register(&mut self, qualified_name: impl Into<String>, original: Callable) -> Contracted {
        let qualified_name = qualified_name.into();
        if let Some(&id) = self.by_name.get(&qualified_name) {
            if let Some(entry) = self.entries.get(&id) {
                return Contracted {
                    id,
                    original: entry.original.clone(),
                };
            }
        }
        let id = FunctionId(self.entries.len() as u32);
        self.by_name.insert(qualified_name.clone(), id);
        let handle = Contracted {
            id,
            original: original.clone(),
        };
        self.entries.insert(
            id,
            RegistryEntry {
                qualified_name,
                original,
                bundle: ContractBundle::default(),
                is_specification: false,
            },
        );
        handle
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<FunctionId> {
        self.by_name.get(qualified_name).copied()
    }

    pub fn entry(&self, id: FunctionId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    pub fn bundle(&self, id: FunctionId) -> Option<&ContractBundle> {
        self.entries.get(&id).map(|e| &e.bundle)
    }

    pub fn entries(&self) -> impl Iterator<Item = (FunctionId, &RegistryEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Registered functions that are verification subjects: everything not
    /// marked as a specification.
    pub fn subjects(&self) -> impl Iterator<Item = (FunctionId, &RegistryEntry)> {
        self.entries().filter(|(_, e)| !e.is_specification)
    }

    /// Marks `id` as a specification.
    pub fn mark_specification(&mut self, id: FunctionId) -> Result<Contracted, ContractError> {
        let entry = self.entry_mut(id)?;
        if entry.bundle.has_contracts() {
            return Err(ContractError::configuration(
                &entry.qualified_name,
                "a specification cannot carry contracts of its own",
            ));
        }
        entry.is_specification = true;
        self.handle(id)
    }

    pub fn attach_precondition(
        &mut self,
        id: FunctionId,
        predicate: Predicate,
    ) -> Result<Contracted, ContractError> {
        self.update(id, |b| b.preconditions.push(predicate))
    }

    pub fn attach_postcondition(
        &mut self,
        id: FunctionId,
        predicate: Predicate,
    ) -> Result<Contracted, ContractError> {
        self.update(id, |b| b.postconditions.push(predicate))
    }

    /// Attaches `spec` as the reference implementation of `id` and marks it
    /// as a specification.
    ///
    /// # Errors
    ///
    /// [`ContractError::Configuration`] if `spec` is `id` itself, carries
    /// contracts of its own, or if `id` already has a specification.
    pub fn attach_specification(
        &mut self,
        id: FunctionId,
        spec: FunctionId,
    ) -> Result<Contracted, ContractError> {
        let target = self.entry_mut(id)?.qualified_name.clone();
        if id == spec {
            return Err(ContractError::configuration(
                &target,
                "a function cannot be its own specification",
            ));
        }
        let spec_entry = self.entry_mut(spec)?;
        if spec_entry.bundle.has_contracts() {
            return Err(ContractError::configuration(
                &target,
                format!(
                    "specification {} carries contracts of its own",
                    spec_entry.qualified_name
                ),
            ));
        }
        if let Some(existing) = self.bundle(id).and_then(|b| b.specification) {
            let existing = self
                .entry(existing)
                .map(|e| e.qualified_name.clone())
                .unwrap_or_default();
            return Err(ContractError::configuration(
                &target,
                format!("already verified against {existing}"),
            ));
        }
        let handle = self.update(id, |b| b.specification = Some(spec))?;
        self.entry_mut(spec)?.is_specification = true;
        Ok(handle)
    }

    pub fn attach_equivalence(
        &mut self,
        id: FunctionId,
        config: EquivalenceConfig,
    ) -> Result<Contracted, ContractError> {
        config.validate(&self.entry_mut(id)?.qualified_name)?;
        self.update(id, |b| b.equivalence = Some(config))
    }

    pub fn attach_purity(
        &mut self,
        id: FunctionId,
        config: PurityConfig,
    ) -> Result<Contracted, ContractError> {
        self.update(id, |b| b.purity = Some(config))
    }

    /// Applies every part of `bundle` to `id`, in the fixed order
    /// preconditions, postconditions, specification, equivalence, purity.
    pub fn apply(&mut self, id: FunctionId, bundle: ContractBundle) -> Result<Contracted, ContractError> {
        let mut handle = self.handle(id)?;
        for predicate in bundle.preconditions {
            handle = self.attach_precondition(id, predicate)?;
        }
        for predicate in bundle.postconditions {
            handle = self.attach_postcondition(id, predicate)?;
        }
        if let Some(spec) = bundle.specification {
            handle = self.attach_specification(id, spec)?;
        }
        if let Some(config) = bundle.equivalence {
            handle = self.attach_equivalence(id, config)?;
        }
        if let Some(config) = bundle.purity {
            handle = self.attach_purity(id, config)?;
        }
        Ok(handle)
    }

    fn entry_mut(&mut self, id: FunctionId) -> Result<&mut RegistryEntry, ContractError> {
        self.entries
            .get_mut(&id)
            .ok_or_else(|| ContractError::UnknownFunction {
                name: format!("#{id}"),
            })
    }

    fn update(
        &mut self,
        id: FunctionId,
        change: impl FnOnce(&mut ContractBundle),
    ) -> Result<Contracted, ContractError> {
        let entry = self.entry_mut(id)?;
        if entry.is_specification {
            return Err(ContractError::configuration(
                &entry.qualified_name,
                "contracts cannot be attached to a specification",
            ));
        }
        change(&mut entry.bundle);
        self.handle(id)
    }

    /// The handle of a registered function.
    pub fn handle(&self, id: FunctionId) -> Result<Contracted, ContractError> {
        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| ContractError::UnknownFunction {
                name: format!("#{id}"),
            })?;
        Ok(Contracted {
            id,
            original: entry.original.clone(),
        })
    }
}
