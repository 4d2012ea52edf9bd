//! Read-only traversal of function bodies.

use crate::ast::{Block, Expr, ExprKind, StmtKind};

/// Calls `f` on `expr` and then on every sub-expression, pre-order.
pub fn walk_expr<'a, F: FnMut(&'a Expr)>(expr: &'a Expr, f: &mut F) {
    f(expr);
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Name(_) => {}
        ExprKind::List(items) | ExprKind::Tuple(items) => {
            for item in items {
                walk_expr(item, f);
            }
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                walk_expr(arg, f);
            }
        }
        ExprKind::Unary { operand, .. } => walk_expr(operand, f),
        ExprKind::Arith { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Logic { lhs, rhs, .. } => {
            walk_expr(lhs, f);
            walk_expr(rhs, f);
        }
        ExprKind::Index { base, index } => {
            walk_expr(base, f);
            walk_expr(index, f);
        }
        ExprKind::Field { base, .. } => walk_expr(base, f),
    }
}

/// Calls `f` on every expression of `block`, nested blocks included, in
/// source order.
pub fn walk_block<'a, F: FnMut(&'a Expr)>(block: &'a Block, f: &mut F) {
    for stmt in block {
        match &stmt.kind {
            StmtKind::Let { value, .. } | StmtKind::Assign { value, .. } => walk_expr(value, f),
            StmtKind::Expr(expr) | StmtKind::Return(Some(expr)) => walk_expr(expr, f),
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                walk_expr(cond, f);
                walk_block(then_block, f);
                if let Some(else_block) = else_block {
                    walk_block(else_block, f);
                }
            }
            StmtKind::While { cond, body } => {
                walk_expr(cond, f);
                walk_block(body, f);
            }
            StmtKind::For { iter, body, .. } => {
                walk_expr(iter, f);
                walk_block(body, f);
            }
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
        }
    }
}

/// Names of every function called in `block`, in first-call order.
pub fn callees(block: &Block) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    walk_block(block, &mut |expr| {
        if let ExprKind::Call { callee, .. } = &expr.kind {
            if !names.contains(&callee.as_str()) {
                names.push(callee);
            }
        }
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn visits_nested_blocks_in_source_order() {
        let module = parse_module(
            "fn f(xs: list[int]) -> int {\n\
             let total = 0;\n\
             for x in xs {\n\
             if x > helper(x) { total = total + abs(x); }\n\
             }\n\
             return len(xs);\n\
             }",
        )
        .unwrap();
        let body = &module.functions[0].body;
        assert_eq!(callees(body), vec!["helper", "abs", "len"]);

        let mut names = Vec::new();
        walk_block(body, &mut |expr: &Expr| {
            if let ExprKind::Name(name) = &expr.kind {
                names.push(name.clone());
            }
        });
        assert_eq!(names, vec!["xs", "x", "x", "total", "x", "xs"]);
    }
}
