//! Type-driven input generation.
//!
//! [`Synthesizer::synthesize`] turns a declared [`TypeDesc`] into a proptest
//! [`BoxedStrategy`] producing [`Value`]s of that shape. Resolution order for
//! every type, at every nesting level:
//!
//! 1. an exact registration for the type's canonical rendering,
//! 2. a factory registered for the type's [`TypeKind`], called with its
//!    generic arguments,
//! 3. built-in synthesis over the closed descriptor set.
//!
//! Structural nesting is depth-limited: past [`SynthesisLimits::max_depth`]
//! built-in synthesis yields the type's minimal base value instead of
//! recursing, so self-referential records terminate.
//!
//! Sampling and per-value shrinking are proptest's. The search protocols
//! built on them live in [`search`] and `verify`.

pub mod search;

use std::sync::Arc;

use attest_core::types::{TypeDesc, TypeEnv, TypeKind};
use indexmap::IndexMap;
use proptest::collection;
use proptest::prelude::*;
use proptest::strategy::{Union, ValueTree};

use crate::interpreter::{Args, Signature, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("no strategy for type {ty}: {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("type {ty} has an empty range")]
    EmptyRange { ty: String },
}

impl StrategyError {
    fn unsupported(ty: &TypeDesc, reason: impl Into<String>) -> Self {
        StrategyError::UnsupportedType {
            ty: ty.to_string(),
            reason: reason.into(),
        }
    }
}

/// Breadth and depth limits of built-in synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisLimits {
    /// Largest generated list, set, map, string or byte string. Default: 20.
    pub max_collection_size: usize,
    /// Deepest structural nesting before truncation. Default: 5.
    pub max_depth: usize,
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        SynthesisLimits {
            max_collection_size: 20,
            max_depth: 5,
        }
    }
}

impl SynthesisLimits {
    pub fn with_collection_size(mut self, size: usize) -> Self {
        self.max_collection_size = size;
        self
    }
}

/// Builds the strategy of an exact registration.
pub type ExactStrategy = Arc<dyn Fn(&SynthesisLimits) -> BoxedStrategy<Value> + Send + Sync>;

/// Builds a strategy from a type's generic arguments.
pub type StrategyFactory = Arc<
    dyn Fn(&[TypeDesc], &Synthesizer<'_>) -> Result<BoxedStrategy<Value>, StrategyError>
        + Send
        + Sync,
>;

/// User-supplied strategy overrides.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    exact: IndexMap<String, ExactStrategy>,
    factories: IndexMap<TypeKind, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a strategy for exactly `ty` (compared by canonical
    /// rendering, so `list[int]` and `list[str]` are distinct).
    pub fn register(
        &mut self,
        ty: &TypeDesc,
        build: impl Fn(&SynthesisLimits) -> BoxedStrategy<Value> + Send + Sync + 'static,
    ) {
        self.exact.insert(ty.to_string(), Arc::new(build));
    }

    /// Registers a factory for every type of kind `kind`.
    pub fn register_factory(
        &mut self,
        kind: TypeKind,
        factory: impl Fn(&[TypeDesc], &Synthesizer<'_>) -> Result<BoxedStrategy<Value>, StrategyError>
            + Send
            + Sync
            + 'static,
    ) {
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.factories.is_empty()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Synthesis context: registry, record declarations, limits and the current
/// nesting depth.
#[derive(Clone, Copy)]
pub struct Synthesizer<'a> {
    registry: &'a StrategyRegistry,
    types: &'a TypeEnv,
    limits: SynthesisLimits,
    depth: usize,
}

impl<'a> Synthesizer<'a> {
    pub fn new(registry: &'a StrategyRegistry, types: &'a TypeEnv, limits: SynthesisLimits) -> Self {
        Synthesizer {
            registry,
            types,
            limits,
            depth: 0,
        }
    }

    pub fn limits(&self) -> &SynthesisLimits {
        &self.limits
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Strategy for a component of the current type, one level deeper.
    pub fn nested(&self, ty: &TypeDesc) -> Result<BoxedStrategy<Value>, StrategyError> {
        Synthesizer {
            depth: self.depth + 1,
            ..*self
        }
        .synthesize(ty)
    }

    /// Strategy for values of `ty`.
    ///
    /// # Errors
    ///
    /// [`StrategyError::UnsupportedType`] for a named type that is neither a
    /// record nor registered, [`StrategyError::EmptyRange`] for a bounded
    /// numeric type whose bounds exclude every value.
    pub fn synthesize(&self, ty: &TypeDesc) -> Result<BoxedStrategy<Value>, StrategyError> {
        if let Some(build) = self.registry.exact.get(&ty.to_string()) {
            return Ok(build(&self.limits));
        }
        if let Some(factory) = self.registry.factories.get(&ty.kind()) {
            return factory(&ty.type_args(), self);
        }
        if self.depth > self.limits.max_depth {
            return Ok(Just(minimal_value(ty, self.types)?).boxed());
        }
        self.builtin(ty)
    }

    fn builtin(&self, ty: &TypeDesc) -> Result<BoxedStrategy<Value>, StrategyError> {
        let size = 0..=self.limits.max_collection_size;
        let strategy = match ty {
            TypeDesc::Any => prop_oneof![
                Just(Value::None),
                any::<bool>().prop_map(Value::Bool),
                small_int(),
                finite_float(),
                text(self.limits.max_collection_size),
            ]
            .boxed(),
            TypeDesc::None => Just(Value::None).boxed(),
            TypeDesc::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
            TypeDesc::Int { min, max } => int_strategy(ty, *min, *max)?,
            TypeDesc::Float { min, max } => float_strategy(ty, *min, *max)?,
            TypeDesc::Text => text(self.limits.max_collection_size),
            TypeDesc::Bytes => collection::vec(any::<u8>(), size)
                .prop_map(Value::Bytes)
                .boxed(),
            TypeDesc::List(element) => collection::vec(self.nested(element)?, size)
                .prop_map(Value::List)
                .boxed(),
            TypeDesc::Set(element) => collection::vec(self.nested(element)?, size)
                .prop_map(Value::set_from)
                .boxed(),
            TypeDesc::Map(key, value) => {
                collection::vec((self.nested(key)?, self.nested(value)?), size)
                    .prop_map(Value::map_from)
                    .boxed()
            }
            TypeDesc::Tuple(items) => items
                .iter()
                .map(|item| self.nested(item))
                .collect::<Result<Vec<_>, _>>()?
                .prop_map(Value::Tuple)
                .boxed(),
            TypeDesc::Optional(inner) => {
                prop_oneof![1 => Just(Value::None), 3 => self.nested(inner)?].boxed()
            }
            TypeDesc::Union(members) => {
                if members.is_empty() {
                    return Err(StrategyError::unsupported(ty, "empty union"));
                }
                let members = members
                    .iter()
                    .map(|m| self.nested(m))
                    .collect::<Result<Vec<_>, _>>()?;
                Union::new(members).boxed()
            }
            TypeDesc::Named { name, args } => match self.types.record(name) {
                Some(record) if args.is_empty() => {
                    let names: Vec<String> = record.fields.keys().cloned().collect();
                    let record_name = record.name.clone();
                    record
                        .fields
                        .values()
                        .map(|field| self.nested(field))
                        .collect::<Result<Vec<_>, _>>()?
                        .prop_map(move |values| Value::Record {
                            name: record_name.clone(),
                            fields: names.iter().cloned().zip(values).collect(),
                        })
                        .boxed()
                }
                Some(_) => {
                    return Err(StrategyError::unsupported(
                        ty,
                        "records take no type arguments",
                    ))
                }
                None => {
                    return Err(StrategyError::unsupported(
                        ty,
                        "not a record and no strategy is registered",
                    ))
                }
            },
        };
        Ok(strategy)
    }

    /// Strategy for a full keyword-argument set of `signature`.
    ///
    /// A parameter with a default draws either the default or a synthesized
    /// value.
    pub fn args(&self, signature: &Signature) -> Result<BoxedStrategy<Args>, StrategyError> {
        let mut names = Vec::with_capacity(signature.params.len());
        let mut strategies = Vec::with_capacity(signature.params.len());
        for param in &signature.params {
            let strategy = match (&param.ty, &param.default) {
                (Some(ty), None) => self.synthesize(ty)?,
                (Some(ty), Some(default)) => {
                    prop_oneof![Just(default.clone()), self.synthesize(ty)?].boxed()
                }
                (None, Some(default)) => Just(default.clone()).boxed(),
                (None, None) => {
                    return Err(StrategyError::UnsupportedType {
                        ty: "<unannotated>".to_string(),
                        reason: format!(
                            "parameter '{}' of {} has no type annotation",
                            param.name, signature.name
                        ),
                    })
                }
            };
            names.push(param.name.clone());
            strategies.push(strategy);
        }
        Ok(strategies
            .prop_map(move |values| names.iter().cloned().zip(values).collect::<Args>())
            .boxed())
    }
}

// ── Scalars ────────────────────────────────────────────

// Unbounded ints stay within i32 so generated data rarely overflows i64
// arithmetic in the code under test.
fn small_int() -> BoxedStrategy<Value> {
    prop_oneof![
        4 => (-1000i64..=1000).prop_map(Value::Int),
        1 => any::<i32>().prop_map(|n| Value::Int(i64::from(n))),
    ]
    .boxed()
}

const FLOAT_SPAN: f64 = 1e9;

fn finite_float() -> BoxedStrategy<Value> {
    prop_oneof![
        Just(Value::Float(0.0)),
        (-FLOAT_SPAN..=FLOAT_SPAN).prop_map(Value::Float),
    ]
    .boxed()
}

fn int_strategy(
    ty: &TypeDesc,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<BoxedStrategy<Value>, StrategyError> {
    let span = i64::from(i32::MAX);
    let (lo, hi) = match (min, max) {
        (None, None) => return Ok(small_int()),
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo.saturating_add(span)),
        (None, Some(hi)) => (hi.saturating_sub(span), hi),
    };
    if lo > hi {
        return Err(StrategyError::EmptyRange { ty: ty.to_string() });
    }
    Ok((lo..=hi).prop_map(Value::Int).boxed())
}

fn float_strategy(
    ty: &TypeDesc,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<BoxedStrategy<Value>, StrategyError> {
    let (lo, hi) = match (min, max) {
        (None, None) => return Ok(finite_float()),
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo + FLOAT_SPAN),
        (None, Some(hi)) => (hi - FLOAT_SPAN, hi),
    };
    if !(lo <= hi) || !lo.is_finite() || !hi.is_finite() {
        return Err(StrategyError::EmptyRange { ty: ty.to_string() });
    }
    if lo == hi {
        return Ok(Just(Value::Float(lo)).boxed());
    }
    Ok((lo..=hi).prop_map(Value::Float).boxed())
}

fn text(max_len: usize) -> BoxedStrategy<Value> {
    let ch = prop_oneof![
        8 => proptest::char::range(' ', '~'),
        1 => any::<char>(),
    ];
    collection::vec(ch, 0..=max_len)
        .prop_map(|chars| Value::Str(chars.into_iter().collect()))
        .boxed()
}

/// The smallest value of `ty`: what synthesis yields past the depth limit.
pub fn minimal_value(ty: &TypeDesc, types: &TypeEnv) -> Result<Value, StrategyError> {
    let value = match ty {
        TypeDesc::Any | TypeDesc::None | TypeDesc::Optional(_) => Value::None,
        TypeDesc::Bool => Value::Bool(false),
        TypeDesc::Int { min, max } => {
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(StrategyError::EmptyRange { ty: ty.to_string() });
                }
            }
            let mut n = 0;
            if let Some(lo) = min {
                n = n.max(*lo);
            }
            if let Some(hi) = max {
                n = n.min(*hi);
            }
            Value::Int(n)
        }
        TypeDesc::Float { min, max } => {
            let mut x = 0.0f64;
            if let Some(lo) = min {
                x = x.max(*lo);
            }
            if let Some(hi) = max {
                x = x.min(*hi);
            }
            Value::Float(x)
        }
        TypeDesc::Text => Value::Str(String::new()),
        TypeDesc::Bytes => Value::Bytes(Vec::new()),
        TypeDesc::List(_) => Value::List(Vec::new()),
        TypeDesc::Set(_) => Value::Set(Vec::new()),
        TypeDesc::Map(_, _) => Value::Map(Vec::new()),
        TypeDesc::Tuple(items) => Value::Tuple(
            items
                .iter()
                .map(|item| minimal_value(item, types))
                .collect::<Result<_, _>>()?,
        ),
        TypeDesc::Union(members) => match members.first() {
            Some(first) => minimal_value(first, types)?,
            None => return Err(StrategyError::unsupported(ty, "empty union")),
        },
        TypeDesc::Named { name, .. } => {
            if types.record(name).is_none() {
                return Err(StrategyError::unsupported(
                    ty,
                    "not a record and no strategy is registered",
                ));
            }
            Value::None
        }
    };
    Ok(value)
}

/// Shrinks `tree` while `check` keeps reporting a failure.
///
/// `initial` is the failure recorded for the tree's current value. Returns
/// the last value `check` failed on together with that failure, exactly as
/// recorded; the value is never re-derived afterwards.
pub fn minimize<T, R>(
    tree: &mut T,
    initial: R,
    max_iters: usize,
    mut check: impl FnMut(&T::Value) -> Option<R>,
) -> (T::Value, R, usize)
where
    T: ValueTree,
{
    let mut best = (tree.current(), initial);
    let mut iters = 0;
    if !tree.simplify() {
        return (best.0, best.1, iters);
    }
    while iters < max_iters {
        iters += 1;
        let candidate = tree.current();
        match check(&candidate) {
            Some(failure) => {
                best = (candidate, failure);
                if !tree.simplify() {
                    break;
                }
            }
            None => {
                if !tree.complicate() {
                    break;
                }
            }
        }
    }
    (best.0, best.1, iters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::parse_type;
    use attest_core::types::RecordDef;
    use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

    fn runner() -> TestRunner {
        TestRunner::new_with_rng(Config::default(), TestRng::deterministic_rng(RngAlgorithm::ChaCha))
    }

    fn sample(ty: &str, env: &TypeEnv, registry: &StrategyRegistry, n: usize) -> Vec<Value> {
        let ty = parse_type(ty).unwrap();
        let strategy = Synthesizer::new(registry, env, SynthesisLimits::default())
            .synthesize(&ty)
            .unwrap();
        let mut runner = runner();
        (0..n)
            .map(|_| strategy.new_tree(&mut runner).unwrap().current())
            .collect()
    }

    fn tree_env() -> TypeEnv {
        let mut env = TypeEnv::new();
        env.register_record(RecordDef {
            name: "Node".into(),
            fields: [
                ("value".to_string(), TypeDesc::INT),
                ("next".to_string(), TypeDesc::optional(TypeDesc::named("Node"))),
            ]
            .into_iter()
            .collect(),
        })
        .unwrap();
        env
    }

    #[test]
    fn bounded_ints_stay_in_range() {
        let registry = StrategyRegistry::new();
        for v in sample("int[-3..7]", &TypeEnv::new(), &registry, 200) {
            match v {
                Value::Int(n) => assert!((-3..=7).contains(&n)),
                other => panic!("expected int, got {other}"),
            }
        }
    }

    #[test]
    fn collections_respect_limits_and_canonical_form() {
        let registry = StrategyRegistry::new();
        let env = TypeEnv::new();
        for v in sample("set[int[0..5]]", &env, &registry, 100) {
            let Value::Set(items) = v else { panic!("expected set") };
            assert!(items.len() <= 6);
            assert!(items.windows(2).all(|w| w[0].total_cmp(&w[1]).is_lt()));
        }
        for v in sample("list[str]", &env, &registry, 100) {
            let Value::List(items) = v else { panic!("expected list") };
            assert!(items.len() <= 20);
            assert!(items.iter().all(|s| matches!(s, Value::Str(_))));
        }
        for v in sample("dict[int[0..3], bool]", &env, &registry, 100) {
            let Value::Map(entries) = v else { panic!("expected map") };
            assert!(entries.len() <= 4);
        }
    }

    #[test]
    fn tuples_and_unions_compose() {
        let registry = StrategyRegistry::new();
        let env = TypeEnv::new();
        for v in sample("tuple[bool, int[1..1]]", &env, &registry, 20) {
            let Value::Tuple(items) = v else { panic!("expected tuple") };
            assert!(matches!(items[0], Value::Bool(_)));
            assert_eq!(items[1], Value::Int(1));
        }
        let kinds: std::collections::HashSet<_> = sample("int | str", &env, &registry, 100)
            .iter()
            .map(|v| v.type_name())
            .collect();
        assert_eq!(kinds.len(), 2);
    }

    #[test]
    fn recursive_records_terminate() {
        let registry = StrategyRegistry::new();
        let env = tree_env();
        fn depth(v: &Value) -> usize {
            match v {
                Value::Record { fields, .. } => 1 + fields.get("next").map_or(0, depth),
                _ => 0,
            }
        }
        for v in sample("Node", &env, &registry, 50) {
            assert!(depth(&v) <= 7, "too deep: {v}");
        }
    }

    #[test]
    fn exact_registration_beats_factory_beats_builtin() {
        let mut registry = StrategyRegistry::new();
        registry.register_factory(TypeKind::List, |args, synth| {
            let element = synth.nested(&args[0])?;
            Ok(element.prop_map(|v| Value::List(vec![v])).boxed())
        });
        registry.register(&parse_type("list[int]").unwrap(), |_| {
            Just(Value::Str("exact".into())).boxed()
        });
        let env = TypeEnv::new();
        assert!(sample("list[int]", &env, &registry, 5)
            .iter()
            .all(|v| v == &Value::Str("exact".into())));
        assert!(sample("list[bool]", &env, &registry, 5)
            .iter()
            .all(|v| matches!(v, Value::List(items) if items.len() == 1)));
    }

    #[test]
    fn opaque_types_need_a_registration() {
        let registry = StrategyRegistry::new();
        let env = TypeEnv::new();
        let synth = Synthesizer::new(&registry, &env, SynthesisLimits::default());
        let err = synth.synthesize(&TypeDesc::named("Matrix")).unwrap_err();
        assert!(matches!(err, StrategyError::UnsupportedType { ref ty, .. } if ty == "Matrix"));

        let mut registry = StrategyRegistry::new();
        registry.register_factory(TypeKind::Named("Matrix".into()), |_, _| {
            Ok(Just(Value::List(Vec::new())).boxed())
        });
        let synth = Synthesizer::new(&registry, &env, SynthesisLimits::default());
        assert!(synth.synthesize(&TypeDesc::named("Matrix")).is_ok());
    }

    #[test]
    fn empty_ranges_are_errors() {
        let registry = StrategyRegistry::new();
        let env = TypeEnv::new();
        let synth = Synthesizer::new(&registry, &env, SynthesisLimits::default());
        for ty in ["int[5..1]", "float[2.0..1.0]"] {
            let err = synth.synthesize(&parse_type(ty).unwrap()).unwrap_err();
            assert!(matches!(err, StrategyError::EmptyRange { .. }), "{ty}");
        }
    }

    #[test]
    fn unannotated_parameters_are_unsupported() {
        use crate::interpreter::ParamSig;
        let registry = StrategyRegistry::new();
        let env = TypeEnv::new();
        let synth = Synthesizer::new(&registry, &env, SynthesisLimits::default());
        let sig = Signature::new(
            "f",
            vec![ParamSig {
                name: "x".into(),
                ty: None,
                default: None,
            }],
            None,
        );
        let err = synth.args(&sig).unwrap_err();
        assert!(err.to_string().contains("parameter 'x' of f"));

        let with_default = Signature::new(
            "f",
            vec![ParamSig {
                name: "x".into(),
                ty: None,
                default: Some(Value::Int(3)),
            }],
            None,
        );
        let args = synth
            .args(&with_default)
            .unwrap()
            .new_tree(&mut runner())
            .unwrap()
            .current();
        assert_eq!(args.get("x"), Some(&Value::Int(3)));
    }

    #[test]
    fn minimal_values_respect_bounds() {
        let env = tree_env();
        let min = |s: &str| minimal_value(&parse_type(s).unwrap(), &env).unwrap();
        assert_eq!(min("int[3..9]"), Value::Int(3));
        assert_eq!(min("int[..-2]"), Value::Int(-2));
        assert_eq!(min("tuple[bool, str]"), Value::Tuple(vec![Value::Bool(false), Value::Str(String::new())]));
        assert_eq!(min("Node"), Value::None);
    }

    #[test]
    fn minimize_keeps_the_last_failure() {
        let strategy = collection::vec(0i64..1000, 0..20);
        let mut runner = runner();
        let mut tree = loop {
            let tree = strategy.new_tree(&mut runner).unwrap();
            if tree.current().iter().sum::<i64>() >= 100 {
                break tree;
            }
        };
        let initial = tree.current().iter().sum::<i64>();
        let (value, sum, _) = minimize(&mut tree, initial, 10_000, |xs| {
            let sum = xs.iter().sum::<i64>();
            (sum >= 100).then_some(sum)
        });
        assert_eq!(value.iter().sum::<i64>(), sum);
        assert!((100..=initial).contains(&sum));
    }
}
