//! Contract checking: evaluate predicates in order, report the first
//! violation.
//!
//! A predicate that raises does not hold; its error text becomes the
//! violation message.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contracts::Predicate;
use crate::interpreter::{Args, Scope, Value};

/// The kind of contract that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// Checked before the call.
    Precondition,
    /// Checked after the call, with the result bound.
    Postcondition,
}

/// A structured contract violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractViolation {
    pub kind: ContractKind,
    /// Position of the predicate in its bundle, in attachment order.
    pub index: usize,
    pub label: String,
    /// `"returned false"` or the error the predicate raised.
    pub message: String,
    /// Arguments that triggered the violation.
    pub inputs: Args,
    /// For postconditions, the actual return value.
    pub actual_return: Option<Value>,
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ContractKind::Precondition => "precondition",
            ContractKind::Postcondition => "postcondition",
        };
        write!(
            f,
            "{kind} #{} `{}` failed: {}",
            self.index, self.label, self.message
        )
    }
}

/// Returns the first precondition that does not hold for `args`.
pub fn check_preconditions(
    preconditions: &[Predicate],
    scope: &Scope,
    args: &Args,
) -> Option<ContractViolation> {
    first_violation(preconditions, ContractKind::Precondition, scope, args, None)
}

/// Returns the first postcondition that does not hold for `args` and
/// `result`.
pub fn check_postconditions(
    postconditions: &[Predicate],
    scope: &Scope,
    args: &Args,
    result: &Value,
) -> Option<ContractViolation> {
    first_violation(
        postconditions,
        ContractKind::Postcondition,
        scope,
        args,
        Some(result),
    )
}

/// True if every precondition holds.
pub fn preconditions_hold(preconditions: &[Predicate], scope: &Scope, args: &Args) -> bool {
    check_preconditions(preconditions, scope, args).is_none()
}

fn first_violation(
    predicates: &[Predicate],
    kind: ContractKind,
    scope: &Scope,
    args: &Args,
    result: Option<&Value>,
) -> Option<ContractViolation> {
    predicates.iter().enumerate().find_map(|(index, predicate)| {
        let message = match predicate.holds(scope, args, result) {
            Ok(true) => return None,
            Ok(false) => "returned false".to_string(),
            Err(err) => err.describe(),
        };
        Some(ContractViolation {
            kind,
            index,
            label: predicate.label().to_string(),
            message,
            inputs: args.clone(),
            actual_return: result.cloned(),
        })
    })
}
