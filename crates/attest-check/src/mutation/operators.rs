//! Mutation operators and the site-indexed rewriter.
//!
//! Sites are numbered in one deterministic pre-order walk of a function
//! body: a statement's own sites (delete, negate, remove return) come
//! before the sites of its expressions, which come before nested blocks.
//! Rewriting site `n` walks a copy of the body in the same order and
//! changes only the `n`-th site.

use std::fmt;

use attest_core::ast::{
    ArithOp, Block, BoolOp, CmpOp, Expr, ExprKind, Literal, Span, Stmt, StmtKind, UnaryOp,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperator {
    /// `== ↔ !=`, `< ↔ >=`, `> ↔ <=`, `in ↔ not in`.
    FlipComparison,
    /// `+ ↔ -`, `* ↔ /`, `// ↔ %`.
    SwapArithmetic,
    /// `if c` / `while c` → `if not (c)` / `while not (c)`.
    NegateCondition,
    /// Statement → `pass`.
    DeleteStatement,
    /// Bool flip, int + 1, float + 1.0, non-empty string → `""`.
    ChangeConstant,
    /// `and ↔ or`.
    SwapBoolean,
    /// `return e` → `return none`.
    RemoveReturn,
}

impl MutationOperator {
    pub const ALL: [MutationOperator; 7] = [
        MutationOperator::FlipComparison,
        MutationOperator::SwapArithmetic,
        MutationOperator::NegateCondition,
        MutationOperator::DeleteStatement,
        MutationOperator::ChangeConstant,
        MutationOperator::SwapBoolean,
        MutationOperator::RemoveReturn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MutationOperator::FlipComparison => "flip_comparison",
            MutationOperator::SwapArithmetic => "swap_arithmetic",
            MutationOperator::NegateCondition => "negate_condition",
            MutationOperator::DeleteStatement => "delete_statement",
            MutationOperator::ChangeConstant => "change_constant",
            MutationOperator::SwapBoolean => "swap_boolean",
            MutationOperator::RemoveReturn => "remove_return",
        }
    }
}

impl fmt::Display for MutationOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn flip_comparison(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Eq => CmpOp::Ne,
        CmpOp::Ne => CmpOp::Eq,
        CmpOp::Lt => CmpOp::Ge,
        CmpOp::Ge => CmpOp::Lt,
        CmpOp::Gt => CmpOp::Le,
        CmpOp::Le => CmpOp::Gt,
        CmpOp::In => CmpOp::NotIn,
        CmpOp::NotIn => CmpOp::In,
    }
}

fn swap_arithmetic(op: ArithOp) -> ArithOp {
    match op {
        ArithOp::Add => ArithOp::Sub,
        ArithOp::Sub => ArithOp::Add,
        ArithOp::Mul => ArithOp::Div,
        ArithOp::Div => ArithOp::Mul,
        ArithOp::FloorDiv => ArithOp::Rem,
        ArithOp::Rem => ArithOp::FloorDiv,
    }
}

fn swap_boolean(op: BoolOp) -> BoolOp {
    match op {
        BoolOp::And => BoolOp::Or,
        BoolOp::Or => BoolOp::And,
    }
}

/// The perturbed constant, or `None` when the literal has no mutation.
fn perturb(literal: &Literal) -> Option<Literal> {
    match literal {
        Literal::Bool(b) => Some(Literal::Bool(!b)),
        Literal::Int(n) => n.checked_add(1).map(Literal::Int),
        Literal::Float(x) => Some(Literal::Float(x + 1.0)),
        Literal::Str(s) if !s.is_empty() => Some(Literal::Str(String::new())),
        Literal::Str(_) | Literal::None => None,
    }
}

fn is_none_literal(expr: &Expr) -> bool {
    matches!(expr.kind, ExprKind::Literal(Literal::None))
}

/// The one operator applicable at an expression node, if any.
fn expr_operator(kind: &ExprKind) -> Option<MutationOperator> {
    match kind {
        ExprKind::Compare { .. } => Some(MutationOperator::FlipComparison),
        ExprKind::Arith { .. } => Some(MutationOperator::SwapArithmetic),
        ExprKind::Logic { .. } => Some(MutationOperator::SwapBoolean),
        ExprKind::Literal(lit) if perturb(lit).is_some() => Some(MutationOperator::ChangeConstant),
        _ => None,
    }
}

fn rewrite_expr(kind: &mut ExprKind) {
    match kind {
        ExprKind::Compare { op, .. } => *op = flip_comparison(*op),
        ExprKind::Arith { op, .. } => *op = swap_arithmetic(*op),
        ExprKind::Logic { op, .. } => *op = swap_boolean(*op),
        ExprKind::Literal(lit) => {
            if let Some(changed) = perturb(lit) {
                *lit = changed;
            }
        }
        _ => {}
    }
}

/// A rewrite that was applied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Applied {
    pub operator: MutationOperator,
    pub span: Span,
    pub original: String,
    pub mutated: String,
}

/// Walks a body in site order; rewrites the targeted site, if any.
#[derive(Debug, Default)]
pub(crate) struct Rewriter {
    target: Option<usize>,
    seen: usize,
    applied: Option<Applied>,
}

impl Rewriter {
    pub(crate) fn targeting(site: usize) -> Self {
        Rewriter {
            target: Some(site),
            ..Rewriter::default()
        }
    }

    /// Number of mutation sites in `block`.
    pub(crate) fn count_sites(block: &Block) -> usize {
        let mut counter = Rewriter::default();
        let mut copy = block.clone();
        counter.block(&mut copy);
        counter.seen
    }

    pub(crate) fn into_applied(self) -> Option<Applied> {
        self.applied
    }

    fn done(&self) -> bool {
        self.applied.is_some()
    }

    /// Claims the next site number; true if it is the target.
    fn site(&mut self) -> bool {
        let hit = self.target == Some(self.seen);
        self.seen += 1;
        hit
    }

    fn record(&mut self, operator: MutationOperator, span: Span, original: String, mutated: String) {
        self.applied = Some(Applied {
            operator,
            span,
            original,
            mutated,
        });
    }

    pub(crate) fn block(&mut self, block: &mut Block) {
        for stmt in block {
            if self.done() {
                return;
            }
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        if !matches!(stmt.kind, StmtKind::Pass) && self.site() {
            let original = stmt.to_string();
            stmt.kind = StmtKind::Pass;
            self.record(MutationOperator::DeleteStatement, stmt.span, original, "pass".into());
            return;
        }

        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => {
                if self.site() {
                    let original = cond.to_string();
                    let placeholder = Expr::new(ExprKind::Literal(Literal::None), cond.span);
                    let inner = std::mem::replace(cond, placeholder);
                    *cond = Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::Not,
                            operand: Box::new(inner),
                        },
                        span,
                    );
                    let mutated = cond.to_string();
                    self.record(MutationOperator::NegateCondition, span, original, mutated);
                    return;
                }
            }
            StmtKind::Return(Some(value)) if !is_none_literal(value) => {
                if self.site() {
                    let original = format!("return {value}");
                    *value = Expr::new(ExprKind::Literal(Literal::None), value.span);
                    self.record(
                        MutationOperator::RemoveReturn,
                        span,
                        original,
                        "return none".into(),
                    );
                    return;
                }
            }
            _ => {}
        }

        match &mut stmt.kind {
            StmtKind::Let { value, .. } | StmtKind::Assign { value, .. } => self.expr(value),
            StmtKind::Expr(expr) | StmtKind::Return(Some(expr)) => self.expr(expr),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                self.expr(cond);
                self.block(then_block);
                if let Some(else_block) = else_block {
                    self.block(else_block);
                }
            }
            StmtKind::While { cond, body } => {
                self.expr(cond);
                self.block(body);
            }
            StmtKind::For { iter, body, .. } => {
                self.expr(iter);
                self.block(body);
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
        }
    }

    fn expr(&mut self, expr: &mut Expr) {
        if self.done() {
            return;
        }
        if let Some(operator) = expr_operator(&expr.kind) {
            if self.site() {
                let original = expr.to_string();
                rewrite_expr(&mut expr.kind);
                let mutated = expr.to_string();
                self.record(operator, expr.span, original, mutated);
                return;
            }
        }
        match &mut expr.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => {}
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Arith { lhs, rhs, .. }
            | ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::Logic { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
            ExprKind::Field { base, .. } => self.expr(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_core::parse_module;

    fn body(source: &str) -> Block {
        parse_module(source).unwrap().functions.remove(0).body
    }

    fn rewrite(block: &Block, site: usize) -> (Block, Applied) {
        let mut copy = block.clone();
        let mut rewriter = Rewriter::targeting(site);
        rewriter.block(&mut copy);
        (copy, rewriter.into_applied().unwrap())
    }

    #[test]
    fn counts_sites_in_pre_order() {
        // return stmt: delete, remove_return; `x + 1`: swap; `1`: constant.
        let block = body("fn f(x: int) -> int { return x + 1; }");
        assert_eq!(Rewriter::count_sites(&block), 4);

        let kinds: Vec<MutationOperator> = (0..4).map(|i| rewrite(&block, i).1.operator).collect();
        assert_eq!(
            kinds,
            vec![
                MutationOperator::DeleteStatement,
                MutationOperator::RemoveReturn,
                MutationOperator::SwapArithmetic,
                MutationOperator::ChangeConstant,
            ]
        );
    }

    #[test]
    fn fragments_render_before_and_after() {
        let block = body("fn f(x: int) -> bool { if x < 3 and x != 0 { return true; } return false; }");
        let applied: Vec<(String, String)> = (0..Rewriter::count_sites(&block))
            .map(|i| {
                let a = rewrite(&block, i).1;
                (a.original, a.mutated)
            })
            .collect();
        assert!(applied.contains(&("x < 3 and x != 0".into(), "not (x < 3 and x != 0)".into())));
        assert!(applied.contains(&("x < 3 and x != 0".into(), "x < 3 or x != 0".into())));
        assert!(applied.contains(&("x < 3".into(), "x >= 3".into())));
        assert!(applied.contains(&("x != 0".into(), "x == 0".into())));
        assert!(applied.contains(&("true".into(), "false".into())));
        assert!(applied.contains(&("return false".into(), "return none".into())));
    }

    #[test]
    fn rewriting_leaves_the_source_block_alone() {
        let block = body("fn f(x: int) -> int { let y = x * 2; return y; }");
        let before = block.clone();
        let (mutated, applied) = rewrite(&block, 0);
        assert_eq!(block, before);
        assert_eq!(applied.operator, MutationOperator::DeleteStatement);
        assert_eq!(mutated[0].kind, StmtKind::Pass);
    }

    #[test]
    fn unmutable_literals_are_not_sites() {
        let block = body("fn f() -> str { return \"\"; }");
        // delete and remove_return only; the empty string and none are fixed.
        assert_eq!(Rewriter::count_sites(&block), 2);
        assert_eq!(perturb(&Literal::Int(i64::MAX)), None);
        assert_eq!(perturb(&Literal::Float(0.5)), Some(Literal::Float(1.5)));
    }

    #[test]
    fn operator_names() {
        let names: Vec<String> = MutationOperator::ALL
            .iter()
            .map(|op| serde_json::to_value(op).unwrap().as_str().unwrap().to_string())
            .collect();
        let expected: Vec<&str> = MutationOperator::ALL.iter().map(|op| op.as_str()).collect();
        assert_eq!(names, expected);
    }
}
