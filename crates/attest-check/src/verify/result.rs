//! Obligation results and the run summary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Terminal status of one obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Error,
    Skip,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Error => "error",
            Status::Skip => "skip",
        })
    }
}

/// One checkable requirement about a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationKind {
    ContractsSmoke,
    EquivToSpec,
    PureStatic,
    PureDynamic,
    MutationScore,
    InferredProperties,
}

impl ObligationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObligationKind::ContractsSmoke => "contracts_smoke",
            ObligationKind::EquivToSpec => "equiv_to_spec",
            ObligationKind::PureStatic => "pure_static",
            ObligationKind::PureDynamic => "pure_dynamic",
            ObligationKind::MutationScore => "mutation_score",
            ObligationKind::InferredProperties => "inferred_properties",
        }
    }
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and structured payload of a finished phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub details: serde_json::Value,
}

impl Outcome {
    pub fn new(status: Status, details: serde_json::Value) -> Self {
        Outcome { status, details }
    }

    pub fn pass(details: serde_json::Value) -> Self {
        Self::new(Status::Pass, details)
    }

    pub fn fail(details: serde_json::Value) -> Self {
        Self::new(Status::Fail, details)
    }

    pub fn error(details: serde_json::Value) -> Self {
        Self::new(Status::Error, details)
    }

    pub fn skip(details: serde_json::Value) -> Self {
        Self::new(Status::Skip, details)
    }
}

/// The result of one obligation for one function. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObligationResult {
    /// Qualified name, `"<module>.<function>"`.
    pub function: String,
    pub obligation: ObligationKind,
    pub status: Status,
    pub details: Option<serde_json::Value>,
    #[serde(serialize_with = "round_millis")]
    pub duration_s: f64,
}

impl ObligationResult {
    pub fn new(
        function: impl Into<String>,
        obligation: ObligationKind,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Self {
        let details = match outcome.details {
            serde_json::Value::Null => None,
            details => Some(details),
        };
        ObligationResult {
            function: function.into(),
            obligation,
            status: outcome.status,
            details,
            duration_s: elapsed.as_secs_f64(),
        }
    }

    /// A string field of the details payload.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key)?.as_str()
    }
}

fn round_millis<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 1000.0).round() / 1000.0)
}

/// Which functions a run covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustSummary {
    pub module: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    /// Qualified names of the verified functions, in verification order.
    pub functions: Vec<String>,
}

/// Everything a verification run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRun {
    pub results: Vec<ObligationResult>,
    pub trust: TrustSummary,
}

impl VerificationRun {
    /// Results for one function, in emission order.
    pub fn for_function<'a>(&'a self, function: &'a str) -> impl Iterator<Item = &'a ObligationResult> {
        self.results.iter().filter(move |r| r.function == function)
    }

    pub fn find(&self, function: &str, obligation: ObligationKind) -> Option<&ObligationResult> {
        self.results
            .iter()
            .find(|r| r.function == function && r.obligation == obligation)
    }

    /// True if no obligation failed or errored.
    pub fn is_clean(&self) -> bool {
        self.results
            .iter()
            .all(|r| matches!(r.status, Status::Pass | Status::Skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_serializes_with_rounded_duration() {
        let result = ObligationResult::new(
            "m.f",
            ObligationKind::EquivToSpec,
            Outcome::skip(json!({"reason": "no_specification"})),
            Duration::from_micros(1_234_567),
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "function": "m.f",
                "obligation": "equiv_to_spec",
                "status": "skip",
                "details": {"reason": "no_specification"},
                "duration_s": 1.235,
            })
        );
        assert_eq!(result.detail_str("reason"), Some("no_specification"));
    }

    #[test]
    fn null_details_become_none() {
        let result = ObligationResult::new(
            "m.f",
            ObligationKind::PureStatic,
            Outcome::pass(serde_json::Value::Null),
            Duration::ZERO,
        );
        assert!(result.details.is_none());
        assert_eq!(Status::Error.to_string(), "error");
        assert_eq!(ObligationKind::MutationScore.to_string(), "mutation_score");
        assert_eq!(
            serde_json::to_value(ObligationKind::InferredProperties).unwrap(),
            json!("inferred_properties")
        );
    }
}
