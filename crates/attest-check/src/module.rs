//! Modules: the unit of verification.
//!
//! A [`Module`] owns the record types, the scope, the contract registry and
//! the strategy registry for a set of functions. Functions come from attest
//! script source ([`Module::load_source`]) or from Rust closures
//! ([`Module::register_native`]). Every function is registered under its
//! qualified name `"<module>.<function>"`.
//!
//! Loading source:
//!
//! 1. parse,
//! 2. register the record types,
//! 3. add every function to the scope and compile it, predicates included,
//! 4. register every function,
//! 5. apply `@spec` marks,
//! 6. apply each function's other attributes in source order.
//!
//! A load that fails at any step leaves the module as it was.
//!
//! Natives become visible to script functions loaded after them.

use std::collections::HashSet;
use std::sync::Arc;

use attest_core::ast::{Attribute, FunctionDecl, Literal, SourceModule};
use attest_core::id::FunctionId;
use attest_core::types::{RecordDef, TypeEnv};
use attest_core::{parse_module, CoreError};

use crate::contracts::{
    Contracted, ContractError, ContractRegistry, EqualityMode, EquivalenceConfig, HealthCheck,
    Predicate, PurityConfig,
};
use crate::interpreter::{
    compile, compile_expr, Args, Callable, CompileError, NativeFn, RuntimeError, Scope, Signature,
    Value,
};
use crate::strategy::StrategyRegistry;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(CoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Duplicate record or function names.
    #[error(transparent)]
    Type(CoreError),
}

impl From<CoreError> for LoadError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Parse { .. } => LoadError::Parse(err),
            other => LoadError::Type(other),
        }
    }
}

#[derive(Debug)]
pub struct Module {
    name: String,
    types: TypeEnv,
    scope: Arc<Scope>,
    registry: ContractRegistry,
    strategies: StrategyRegistry,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            types: TypeEnv::new(),
            scope: Arc::new(Scope::default()),
            registry: ContractRegistry::new(),
            strategies: StrategyRegistry::new(),
        }
    }

    /// A module holding the functions of `source`.
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self, LoadError> {
        let mut module = Module::new(name);
        module.load_source(source)?;
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &TypeEnv {
        &self.types
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// For attaching contracts from Rust.
    pub fn registry_mut(&mut self) -> &mut ContractRegistry {
        &mut self.registry
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.strategies
    }

    pub fn qualified_name(&self, function: &str) -> String {
        format!("{}.{}", self.name, function)
    }

    /// Id of a function, by qualified or module-local name.
    pub fn lookup(&self, function: &str) -> Option<FunctionId> {
        self.registry
            .lookup(function)
            .or_else(|| self.registry.lookup(&self.qualified_name(function)))
    }

    /// Handle of a function, by qualified or module-local name.
    pub fn function(&self, function: &str) -> Option<Contracted> {
        self.registry.handle(self.lookup(function)?).ok()
    }

    /// Registers a Rust function. It can be verified, used as a
    /// specification, and called from script functions loaded afterwards.
    pub fn register_native(
        &mut self,
        signature: Signature,
        func: impl Fn(&Args) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Result<Contracted, LoadError> {
        if self.scope.function(&signature.name).is_some() || self.scope.native(&signature.name).is_some() {
            return Err(LoadError::Type(CoreError::DuplicateFunction {
                name: signature.name,
            }));
        }
        let func: NativeFn = Arc::new(func);
        Arc::make_mut(&mut self.scope).add_native(signature.clone(), Arc::clone(&func));
        let qualified = self.qualified_name(&signature.name);
        Ok(self
            .registry
            .register(qualified, Callable::Native { signature, func }))
    }

    /// Parses `source` and registers its records and functions. Returns the
    /// handles of the new functions in declaration order.
    ///
    /// On error nothing of `source` stays registered.
    pub fn load_source(&mut self, source: &str) -> Result<Vec<Contracted>, LoadError> {
        let parsed = parse_module(source)?;
        let snapshot = (self.types.clone(), Arc::clone(&self.scope), self.registry.clone());
        match self.load_parsed(&parsed) {
            Ok(loaded) => {
                tracing::debug!(
                    module = %self.name,
                    records = parsed.records.len(),
                    functions = loaded.len(),
                    "source loaded"
                );
                Ok(loaded)
            }
            Err(err) => {
                (self.types, self.scope, self.registry) = snapshot;
                tracing::debug!(module = %self.name, error = %err, "source rejected");
                Err(err)
            }
        }
    }

    fn load_parsed(&mut self, parsed: &SourceModule) -> Result<Vec<Contracted>, LoadError> {

        let mut types = self.types.clone();
        for record in &parsed.records {
            types.register_record(RecordDef {
                name: record.name.clone(),
                fields: record.fields.iter().cloned().collect(),
            })?;
        }

        let mut scope = (*self.scope).clone();
        *scope.types_mut() = types.clone();
        for decl in &parsed.functions {
            if scope.function(&decl.name).is_some() || scope.native(&decl.name).is_some() {
                return Err(LoadError::Type(CoreError::DuplicateFunction {
                    name: decl.name.clone(),
                }));
            }
            scope.add_function(Arc::new(decl.clone()));
        }
        for decl in &parsed.functions {
            compile(decl, &scope)?;
            compile_predicates(decl, &scope)?;
        }

        let scope = Arc::new(scope);
        let mut loaded = Vec::with_capacity(parsed.functions.len());
        for decl in &parsed.functions {
            let callable = Callable::Script {
                decl: scope
                    .function(&decl.name)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(decl.clone())),
                scope: Arc::clone(&scope),
            };
            loaded.push(self.registry.register(self.qualified_name(&decl.name), callable));
        }
        self.types = types;
        self.scope = scope;

        for (decl, handle) in parsed.functions.iter().zip(&loaded) {
            if decl.attributes.contains(&Attribute::Spec) {
                self.registry.mark_specification(handle.id())?;
            }
        }
        for (decl, handle) in parsed.functions.iter().zip(&loaded) {
            self.apply_attributes(decl, handle.id())?;
        }
        Ok(loaded)
    }

    fn apply_attributes(&mut self, decl: &FunctionDecl, id: FunctionId) -> Result<(), LoadError> {
        for attribute in &decl.attributes {
            match attribute {
                Attribute::Requires(expr) => {
                    self.registry
                        .attach_precondition(id, Predicate::script(expr.clone()))?;
                }
                Attribute::Ensures(expr) => {
                    self.registry
                        .attach_postcondition(id, Predicate::script(expr.clone()))?;
                }
                Attribute::Spec => {}
                Attribute::Pure { seed, eq } => {
                    let equality = eq
                        .as_deref()
                        .map(|mode| {
                            equality_mode(mode).ok_or_else(|| ContractError::Configuration {
                                function: self.qualified_name(&decl.name),
                                message: format!("unknown equality mode '{mode}'"),
                            })
                        })
                        .transpose()?;
                    self.registry
                        .attach_purity(id, PurityConfig { seed: *seed, equality })?;
                }
                Attribute::Against { spec, options } => {
                    let function = self.qualified_name(&decl.name);
                    let spec_id = self.lookup(spec).ok_or_else(|| ContractError::Configuration {
                        function: function.clone(),
                        message: format!("unknown specification '{spec}'"),
                    })?;
                    self.registry.attach_specification(id, spec_id)?;
                    if !options.is_empty() {
                        let config = equivalence_options(&function, options)?;
                        self.registry.attach_equivalence(id, config)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Preconditions see the parameters; postconditions also see `result`.
fn compile_predicates(decl: &FunctionDecl, scope: &Scope) -> Result<(), CompileError> {
    let mut bound: HashSet<String> = decl.params.iter().map(|p| p.name.clone()).collect();
    for attribute in &decl.attributes {
        if let Attribute::Requires(expr) = attribute {
            compile_expr(expr, &decl.name, &bound, scope)?;
        }
    }
    bound.insert("result".to_string());
    for attribute in &decl.attributes {
        if let Attribute::Ensures(expr) = attribute {
            compile_expr(expr, &decl.name, &bound, scope)?;
        }
    }
    Ok(())
}

/// Options of `@against(spec, key = value, ...)`.
fn equivalence_options(
    function: &str,
    options: &[(String, Literal)],
) -> Result<EquivalenceConfig, ContractError> {
    let invalid = |message: String| ContractError::Configuration {
        function: function.to_string(),
        message,
    };
    let mut config = EquivalenceConfig::default();
    let mut tolerance = None;
    let mut explicit_eq = false;

    for (key, value) in options {
        match (key.as_str(), value) {
            ("max_examples", Literal::Int(n)) => {
                config.max_examples = u32::try_from(*n)
                    .map_err(|_| invalid(format!("max_examples out of range: {n}")))?;
            }
            ("deadline_ms", Literal::Int(n)) => {
                config.deadline_ms = Some(
                    u64::try_from(*n)
                        .map_err(|_| invalid(format!("deadline_ms out of range: {n}")))?,
                );
            }
            ("deadline_ms", Literal::None) => config.deadline_ms = None,
            ("eq", Literal::Str(mode)) => {
                config.equality = equality_mode(mode)
                    .ok_or_else(|| invalid(format!("unknown equality mode '{mode}'")))?;
                explicit_eq = true;
            }
            ("tolerance", Literal::Float(x)) => tolerance = Some(*x),
            ("tolerance", Literal::Int(n)) => tolerance = Some(*n as f64),
            ("suppress", Literal::Str(list)) => {
                config.suppressed_checks = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<HealthCheck>().map_err(|e| invalid(e.to_string())))
                    .collect::<Result<_, _>>()?;
            }
            (key, value) => {
                return Err(invalid(format!("invalid option {key} = {value}")));
            }
        }
    }
    if let Some(tol) = tolerance {
        if explicit_eq && !matches!(config.equality, EqualityMode::Approx { .. }) {
            return Err(invalid(format!(
                "tolerance requires eq = \"approx\", not \"{}\"",
                config.equality.name()
            )));
        }
        config.equality = EqualityMode::Approx {
            rel_tol: tol,
            abs_tol: tol,
        };
    }
    Ok(config)
}

/// Equality mode named in source.
fn equality_mode(name: &str) -> Option<EqualityMode> {
    match name {
        "structural" => Some(EqualityMode::Structural),
        "approx" => Some(EqualityMode::approx()),
        "auto" => Some(EqualityMode::Auto),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ParamSig;
    use attest_core::TypeDesc;

    const SOURCE: &str = r#"
record Point { x: int, y: int }

@spec
fn reference_sort(xs: list[int]) -> list[int] {
    return sorted(xs);
}

@requires(len(xs) >= 0)
@ensures(len(result) == len(xs))
@against(reference_sort, max_examples = 50, suppress = "too_slow")
fn my_sort(xs: list[int]) -> list[int] {
    return sorted(xs);
}

@pure(seed = 7)
fn norm(p: Point) -> int {
    return abs(p.x) + abs(p.y);
}
"#;

    #[test]
    fn loads_functions_and_attributes() {
        let module = Module::from_source("demo", SOURCE).unwrap();
        assert!(module.types().record("Point").is_some());

        let subjects: Vec<&str> = module
            .registry()
            .subjects()
            .map(|(_, e)| e.qualified_name.as_str())
            .collect();
        assert_eq!(subjects, vec!["demo.my_sort", "demo.norm"]);

        let sort = module.registry().bundle(module.lookup("my_sort").unwrap()).unwrap();
        assert_eq!(sort.preconditions().len(), 1);
        assert_eq!(sort.postconditions()[0].label(), "len(result) == len(xs)");
        assert_eq!(sort.specification(), module.lookup("demo.reference_sort"));
        let equivalence = sort.equivalence().unwrap();
        assert_eq!(equivalence.max_examples, 50);
        assert_eq!(
            equivalence.suppressed_checks.iter().copied().collect::<Vec<_>>(),
            vec![HealthCheck::TooSlow]
        );

        let norm = module.registry().bundle(module.lookup("norm").unwrap()).unwrap();
        let purity = norm.purity().unwrap();
        assert_eq!(purity.seed, Some(7));
        assert!(purity.equality.is_none());
    }

    #[test]
    fn loaded_functions_call_through() {
        let module = Module::from_source("demo", SOURCE).unwrap();
        let norm = module.function("norm").unwrap();
        let point = Value::Record {
            name: "Point".into(),
            fields: [("x".to_string(), Value::Int(-3)), ("y".to_string(), Value::Int(4))]
                .into_iter()
                .collect(),
        };
        let args: Args = [("p".to_string(), point)].into_iter().collect();
        assert_eq!(norm.call(&args).unwrap(), Value::Int(7));
    }

    #[test]
    fn unknown_specification_is_a_configuration_error() {
        let err = Module::from_source(
            "demo",
            "@against(missing)\nfn f(x: int) -> int { return x; }",
        )
        .unwrap_err();
        assert!(
            matches!(&err, LoadError::Contract(ContractError::Configuration { message, .. }) if message.contains("missing")),
            "{err}"
        );
    }

    #[test]
    fn specification_with_contracts_is_rejected() {
        let err = Module::from_source(
            "demo",
            "@spec\n@requires(x > 0)\nfn s(x: int) -> int { return x; }",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Contract(_)), "{err}");
    }

    #[test]
    fn bad_options_are_rejected() {
        let source = |options: &str| {
            format!(
                "@spec\nfn s(x: int) -> int {{ return x; }}\n\
                 @against(s, {options})\nfn f(x: int) -> int {{ return x; }}"
            )
        };
        for options in [
            "max_examples = 0",
            "deadline_ms = 0",
            "eq = \"fuzzy\"",
            "suppress = \"too_fast\"",
            "colour = 1",
            "tolerance = -1.0",
            "eq = \"structural\", tolerance = 0.1",
            "tolerance = 0.1, eq = \"auto\"",
        ] {
            let err = Module::from_source("demo", &source(options)).unwrap_err();
            assert!(matches!(err, LoadError::Contract(_)), "{options}: {err}");
        }
    }

    #[test]
    fn tolerance_combines_with_approx_only() {
        let module = Module::from_source(
            "demo",
            "@spec\nfn s(x: float) -> float { return x; }\n\
             @against(s, eq = \"approx\", tolerance = 0.5)\nfn f(x: float) -> float { return x; }",
        )
        .unwrap();
        let bundle = module.registry().bundle(module.lookup("f").unwrap()).unwrap();
        assert!(matches!(
            bundle.equivalence().unwrap().equality,
            EqualityMode::Approx { rel_tol, abs_tol } if rel_tol == 0.5 && abs_tol == 0.5
        ));

        let err = Module::from_source(
            "demo",
            "@spec\nfn s(x: float) -> float { return x; }\n\
             @against(s, eq = \"structural\", tolerance = 0.5)\nfn f(x: float) -> float { return x; }",
        )
        .unwrap_err();
        assert!(
            matches!(&err, LoadError::Contract(ContractError::Configuration { message, .. }) if message.contains("structural")),
            "{err}"
        );
    }

    #[test]
    fn pure_equality_is_parsed() {
        let module = Module::from_source(
            "demo",
            "@pure(eq = \"approx\")\nfn f(x: float) -> float { return x * 2.0; }",
        )
        .unwrap();
        let bundle = module.registry().bundle(module.lookup("f").unwrap()).unwrap();
        let purity = bundle.purity().unwrap();
        assert_eq!(purity.mode(), "strict");
        assert_eq!(purity.equality.as_ref().map(EqualityMode::name), Some("approx"));

        let err = Module::from_source("demo", "@pure(eq = \"fuzzy\")\nfn g() -> int { return 1; }")
            .unwrap_err();
        assert!(matches!(err, LoadError::Contract(ContractError::Configuration { .. })), "{err}");
    }

    #[test]
    fn failed_load_leaves_the_module_untouched() {
        let mut module = Module::from_source("demo", "fn base() -> int { return 1; }").unwrap();

        let err = module
            .load_source(
                "record Pair { a: int, b: int }\n\
                 fn helper() -> int { return 2; }\n\
                 @against(missing)\nfn f(x: int) -> int { return x; }",
            )
            .unwrap_err();
        assert!(matches!(err, LoadError::Contract(_)), "{err}");
        assert!(module.lookup("helper").is_none());
        assert!(module.lookup("f").is_none());
        assert!(module.types().record("Pair").is_none());
        assert!(module.scope().function("helper").is_none());
        assert_eq!(module.registry().entries().count(), 1);

        // The same names load cleanly once the error is fixed.
        let loaded = module
            .load_source(
                "record Pair { a: int, b: int }\n\
                 fn helper() -> int { return 2; }\n\
                 @against(helper)\nfn f() -> int { return 2; }",
            )
            .unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(module.types().record("Pair").is_some());
        let subjects: Vec<&str> = module
            .registry()
            .subjects()
            .map(|(_, e)| e.qualified_name.as_str())
            .collect();
        assert_eq!(subjects, vec!["demo.base", "demo.f"]);
    }

    #[test]
    fn compile_errors_surface() {
        let err = Module::from_source("demo", "fn f(x: int) -> int { return y; }").unwrap_err();
        assert!(matches!(err, LoadError::Compile(CompileError::UndefinedName { .. })));

        let err =
            Module::from_source("demo", "@ensures(result > z)\nfn f(x: int) -> int { return x; }")
                .unwrap_err();
        assert!(matches!(err, LoadError::Compile(_)), "{err}");

        let err = Module::from_source(
            "demo",
            "fn f() -> int { return 1; }\nfn f() -> int { return 2; }",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Type(CoreError::DuplicateFunction { .. })));
    }

    #[test]
    fn natives_are_callable_from_later_source() {
        let mut module = Module::new("demo");
        module
            .register_native(
                Signature::new("twice", vec![ParamSig::new("n", TypeDesc::INT)], Some(TypeDesc::INT)),
                |args| match args.get("n") {
                    Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                    _ => Err(RuntimeError::invalid("n must be an int")),
                },
            )
            .unwrap();
        module
            .load_source("fn quad(n: int) -> int { return twice(twice(n)); }")
            .unwrap();

        let args: Args = [("n".to_string(), Value::Int(3))].into_iter().collect();
        assert_eq!(module.function("quad").unwrap().call(&args).unwrap(), Value::Int(12));
        assert_eq!(module.registry().subjects().count(), 2);
    }
}
