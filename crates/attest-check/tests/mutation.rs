//! Mutation scoring of contracts against loaded modules.

use attest_check::{
    mutate_and_score, verify_module, Module, MutationOperator, ObligationKind, Status,
    VerifyConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> VerifyConfig {
    VerifyConfig {
        seed: Some(11),
        mutate: true,
        ..VerifyConfig::default()
    }
}

fn load(source: &str) -> Module {
    Module::from_source("m", source).expect("source should load")
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[test]
fn exact_postcondition_kills_every_constant_mutant() {
    let module = load("@ensures(result == 42)\nfn answer() -> int { return 42; }");
    let report = mutate_and_score(&module, "answer", &config()).unwrap();

    assert!(report.total > 0);
    assert_eq!(report.survived, 0);
    assert_eq!(report.killed, report.total);
    assert_eq!(report.score, Some(1.0));
}

#[test]
fn without_contracts_nothing_is_killed() {
    let module = load("fn double(x: int) -> int { return x + x; }");
    let report = mutate_and_score(&module, "double", &config()).unwrap();

    assert_eq!(report.killed, 0);
    assert_eq!(report.score, Some(0.0));
    assert_eq!(report.survivors.len(), report.survived);
    assert!(report
        .survivors
        .iter()
        .any(|m| m.operator == MutationOperator::SwapArithmetic));
}

#[test]
fn specification_kills_what_contracts_miss() {
    let module = load(
        "@spec\nfn ref_max(a: int, b: int) -> int { if a > b { return a; } return b; }\n\
         @against(ref_max)\n\
         fn my_max(a: int, b: int) -> int { if a > b { return a; } return b; }",
    );
    let report = mutate_and_score(&module, "m.my_max", &config()).unwrap();
    assert!(report.total > 0);
    assert!(report.killed > 0);
    let score = report.score.unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[test]
fn scoring_leaves_the_original_untouched() {
    let module = load("@ensures(result >= x)\nfn bump(x: int[0..10]) -> int { return x + 1; }");
    let before = module.function("bump").unwrap();
    let before_result = before
        .call(&[("x".to_string(), attest_check::Value::Int(3))].into_iter().collect())
        .unwrap();

    mutate_and_score(&module, "bump", &config()).unwrap();

    let after = module.function("bump").unwrap();
    assert_eq!(
        after.original().decl(),
        before.original().decl(),
        "declaration changed"
    );
    let after_result = after
        .call(&[("x".to_string(), attest_check::Value::Int(3))].into_iter().collect())
        .unwrap();
    assert_eq!(before_result, after_result);
}

#[test]
fn unknown_function_has_no_report() {
    let module = load("fn f() -> int { return 1; }");
    assert!(mutate_and_score(&module, "g", &config()).is_none());
}

// ---------------------------------------------------------------------------
// Obligation
// ---------------------------------------------------------------------------

#[test]
fn mutation_score_obligation_follows_the_threshold() {
    let module = load(
        "@ensures(result == 42)\nfn answer() -> int { return 42; }\n\
         fn double(x: int) -> int { return x + x; }",
    );
    let run = verify_module(&module, &config(), |_| {});

    let strong = run.find("m.answer", ObligationKind::MutationScore).unwrap();
    assert_eq!(strong.status, Status::Pass);
    let details = strong.details.as_ref().unwrap();
    assert_eq!(details["score"], 1.0);
    assert_eq!(details["survivors"], serde_json::json!([]));

    let weak = run.find("m.double", ObligationKind::MutationScore).unwrap();
    assert_eq!(weak.status, Status::Fail);
    let survivors = weak.details.as_ref().unwrap()["survivors"].as_array().unwrap();
    assert!(!survivors.is_empty() && survivors.len() <= 5);
    assert!(survivors[0]["line"].as_u64().is_some());

    // Mutation results follow every other obligation.
    let last = run.results.len() - 1;
    assert_eq!(run.results[last].obligation, ObligationKind::MutationScore);
    assert_eq!(run.results[last - 1].obligation, ObligationKind::MutationScore);
}

#[test]
fn no_mutation_without_the_flag() {
    let module = load("@ensures(result == 42)\nfn answer() -> int { return 42; }");
    let config = VerifyConfig {
        mutate: false,
        ..config()
    };
    let run = verify_module(&module, &config, |_| {});
    assert!(run.find("m.answer", ObligationKind::MutationScore).is_none());
}
