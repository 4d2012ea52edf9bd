//! Mutation engine.
//!
//! A mutant is a copy of a script function's syntax tree with one site
//! rewritten by one [`MutationOperator`]. The original declaration is never
//! touched: every mutant clones it first and is compiled into its own
//! scope. Natives have no tree and yield no mutants.

pub mod operators;
pub mod score;

use std::sync::Arc;

use attest_core::ast::{FunctionDecl, Span};
use serde::Serialize;

pub use operators::MutationOperator;
pub use score::{mutate_and_score, MutationReport};

use operators::Rewriter;

/// One syntactic variant of a function.
#[derive(Debug, Clone, Serialize)]
pub struct Mutant {
    pub operator: MutationOperator,
    pub location: Span,
    pub original_fragment: String,
    pub mutated_fragment: String,
    /// The rewritten declaration.
    #[serde(skip)]
    pub decl: Arc<FunctionDecl>,
}

/// Up to `max` mutants of `decl`, in site order. Rewrites that leave the
/// tree unchanged or reproduce an earlier mutant are dropped.
pub fn enumerate_mutants(decl: &FunctionDecl, max: usize) -> Vec<Mutant> {
    let sites = Rewriter::count_sites(&decl.body);
    let mut mutants: Vec<Mutant> = Vec::new();

    for site in 0..sites {
        if mutants.len() >= max {
            break;
        }
        let mut copy = decl.clone();
        let mut rewriter = Rewriter::targeting(site);
        rewriter.block(&mut copy.body);
        let Some(applied) = rewriter.into_applied() else {
            continue;
        };
        if copy == *decl || mutants.iter().any(|m| *m.decl == copy) {
            continue;
        }
        mutants.push(Mutant {
            operator: applied.operator,
            location: applied.span,
            original_fragment: applied.original,
            mutated_fragment: applied.mutated,
            decl: Arc::new(copy),
        });
    }
    mutants
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::parse_module;

    fn decl(source: &str) -> FunctionDecl {
        parse_module(source).unwrap().functions.remove(0)
    }

    #[test]
    fn every_mutant_differs_from_the_original() {
        let original = decl(
            "fn clamp(x: int, lo: int, hi: int) -> int {\n\
             if x < lo { return lo; }\n\
             if x > hi { return hi; }\n\
             return x;\n\
             }",
        );
        let before = original.clone();
        let mutants = enumerate_mutants(&original, 100);

        assert_eq!(original, before);
        assert!(!mutants.is_empty());
        for mutant in &mutants {
            assert_ne!(*mutant.decl, original);
            assert_ne!(mutant.original_fragment, mutant.mutated_fragment);
        }
        for op in [
            MutationOperator::FlipComparison,
            MutationOperator::NegateCondition,
            MutationOperator::DeleteStatement,
            MutationOperator::RemoveReturn,
        ] {
            assert!(mutants.iter().any(|m| m.operator == op), "missing {op}");
        }
    }

    #[test]
    fn respects_the_limit() {
        let original = decl("fn f(a: int, b: int) -> int { return a + b * 2 - 1; }");
        assert_eq!(enumerate_mutants(&original, 3).len(), 3);
        assert!(enumerate_mutants(&original, 100).len() > 3);
    }

    #[test]
    fn serializes_without_the_tree() {
        let original = decl("fn f() -> int { return 1; }");
        let mutants = enumerate_mutants(&original, 10);
        let constant = mutants
            .iter()
            .find(|m| m.operator == MutationOperator::ChangeConstant)
            .unwrap();
        insta::assert_json_snapshot!(constant, @r###"
        {
          "operator": "change_constant",
          "location": {
            "line": 1,
            "column": 24
          },
          "original_fragment": "1",
          "mutated_fragment": "2"
        }
        "###);
    }
}
