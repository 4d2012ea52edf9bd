//! Structural property inference.
//!
//! Tries a fixed catalogue of properties against a function, whatever its
//! contracts say, and reports which ones held on every sampled input:
//!
//! - `shape_preservation`: `len(result) == len(xs)` for a list-to-list
//!   function with exactly one list parameter,
//! - `sortedness`: the result of a list-to-list function is ascending,
//! - `idempotence`: `f(f(x)) == f(x)` for a one-parameter function,
//! - `involution`: `f(f(x)) == x` for a one-parameter function.
//!
//! Samples come from the deterministic runner, so the findings are the same
//! on every run. Inputs rejected by a precondition and calls that raise are
//! skipped rather than counted against the property.

use std::cmp::Ordering;

use attest_core::TypeDesc;
use proptest::strategy::{Strategy, ValueTree};
use serde::Serialize;
use serde_json::json;

use crate::interpreter::{Args, Value};
use crate::module::Module;
use crate::strategy::search::deterministic_runner;

use super::{call_bounded, Outcome, Subject, VerifyConfig};

/// Collection size of inference samples.
const INFER_COLLECTION_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredProperty {
    pub name: &'static str,
    pub description: String,
    pub holds: bool,
    pub source: &'static str,
}

impl InferredProperty {
    fn structural(name: &'static str, description: impl Into<String>, holds: bool) -> Self {
        InferredProperty {
            name,
            description: description.into(),
            holds,
            source: "structural",
        }
    }
}

/// Structural properties of `function` (qualified or module-local name).
/// Returns `None` for an unknown function.
pub fn infer_structural(
    module: &Module,
    function: &str,
    config: &VerifyConfig,
) -> Option<Vec<InferredProperty>> {
    let entry = module.registry().entry(module.lookup(function)?)?;
    Some(infer_subject(&Subject::from_entry(module, entry), config))
}

pub(crate) fn infer_subject(subject: &Subject<'_>, config: &VerifyConfig) -> Vec<InferredProperty> {
    let signature = subject.implementation.signature();
    let mut found = Vec::new();

    let list_to_list = matches!(signature.returns, Some(TypeDesc::List(_)))
        && signature
            .params
            .iter()
            .any(|p| matches!(p.ty, Some(TypeDesc::List(_))));
    if list_to_list {
        let lists: Vec<&str> = signature
            .params
            .iter()
            .filter(|p| matches!(p.ty, Some(TypeDesc::List(_))))
            .map(|p| p.name.as_str())
            .collect();
        if let [param] = lists.as_slice() {
            let param = *param;
            let holds = quick_check(subject, config, |args, result| {
                match (args.get(param), result) {
                    (Some(Value::List(input)), Value::List(output)) => input.len() == output.len(),
                    _ => false,
                }
            });
            found.push(InferredProperty::structural(
                "shape_preservation",
                format!("len(result) == len({param})"),
                holds,
            ));
        }

        let holds = quick_check(subject, config, |_, result| match result {
            Value::List(items) => items
                .windows(2)
                .all(|pair| pair[0].total_cmp(&pair[1]) != Ordering::Greater),
            _ => false,
        });
        found.push(InferredProperty::structural("sortedness", "output is sorted", holds));
    }

    if let [param] = &signature.params[..] {
        let name = param.name.as_str();
        let holds = quick_check(subject, config, |_, result| {
            match reapply(subject, config, name, result) {
                Some(second) => second.equals(result),
                None => true,
            }
        });
        found.push(InferredProperty::structural("idempotence", "f(f(x)) == f(x)", holds));

        let holds = quick_check(subject, config, |args, result| {
            match (reapply(subject, config, name, result), args.get(name)) {
                (Some(second), Some(original)) => second.equals(original),
                _ => true,
            }
        });
        found.push(InferredProperty::structural("involution", "f(f(x)) == x", holds));
    }

    tracing::debug!(
        function = subject.name,
        checked = found.len(),
        holding = found.iter().filter(|p| p.holds).count(),
        "properties inferred"
    );
    found
}

/// The `inferred_properties` obligation: `pass` when anything held, `skip`
/// otherwise.
pub(crate) fn inferred_outcome(subject: &Subject<'_>, config: &VerifyConfig) -> Outcome {
    let (holding, rejected): (Vec<_>, Vec<_>) =
        infer_subject(subject, config).into_iter().partition(|p| p.holds);
    let details = json!({
        "properties_found": holding.len(),
        "properties_rejected": rejected.len(),
        "holding": holding,
        "not_holding": rejected,
    });
    if holding.is_empty() {
        Outcome::skip(details)
    } else {
        Outcome::pass(details)
    }
}

/// `true` unless some sampled input satisfying the preconditions produces a
/// result on which `property` is false. A strategy that cannot be built
/// counts as a counterexample.
fn quick_check(
    subject: &Subject<'_>,
    config: &VerifyConfig,
    property: impl Fn(&Args, &Value) -> bool,
) -> bool {
    let limits = config.limits().with_collection_size(INFER_COLLECTION_SIZE);
    let Ok(strategy) = subject.args_strategy(limits) else {
        return false;
    };
    let mut runner = deterministic_runner();
    for _ in 0..config.infer_max_examples {
        let Ok(tree) = strategy.new_tree(&mut runner) else {
            return false;
        };
        let args = tree.current();
        if !subject.requires_hold(&args) {
            continue;
        }
        let Ok(result) = call_bounded(&subject.implementation, &args, config, None, 0) else {
            continue;
        };
        if !property(&args, &result) {
            return false;
        }
    }
    true
}

/// `f` applied to its own result, `None` when that call raises.
fn reapply(subject: &Subject<'_>, config: &VerifyConfig, param: &str, result: &Value) -> Option<Value> {
    let args: Args = [(param.to_string(), result.clone())].into_iter().collect();
    call_bounded(&subject.implementation, &args, config, None, 0).ok()
}
