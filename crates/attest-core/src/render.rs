//! Source rendering of expressions and statement headers.
//!
//! Rendering inserts parentheses only where precedence requires them, so a
//! rendered expression parses back to the same tree. Statements render as a
//! one-line header (`if cond`, `return e`) without their bodies; that is the
//! form mutation reports show as `original_fragment` / `mutated_fragment`.

use std::fmt;

use crate::ast::{ArithOp, BoolOp, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp};

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_CMP: u8 = 4;
const PREC_ADD: u8 = 5;
const PREC_MUL: u8 = 6;
const PREC_NEG: u8 = 7;
const PREC_POSTFIX: u8 = 8;
const PREC_ATOM: u8 = 9;

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Logic { op: BoolOp::Or, .. } => PREC_OR,
        ExprKind::Logic { op: BoolOp::And, .. } => PREC_AND,
        ExprKind::Unary {
            op: UnaryOp::Not, ..
        } => PREC_NOT,
        ExprKind::Compare { .. } => PREC_CMP,
        ExprKind::Arith {
            op: ArithOp::Add | ArithOp::Sub,
            ..
        } => PREC_ADD,
        ExprKind::Arith { .. } => PREC_MUL,
        ExprKind::Unary {
            op: UnaryOp::Neg, ..
        } => PREC_NEG,
        // A negative literal reads like a negation.
        ExprKind::Literal(Literal::Int(n)) if *n < 0 => PREC_NEG,
        ExprKind::Literal(Literal::Float(x)) if x.is_sign_negative() => PREC_NEG,
        ExprKind::Call { .. } | ExprKind::Index { .. } | ExprKind::Field { .. } => PREC_POSTFIX,
        ExprKind::Literal(_) | ExprKind::Name(_) | ExprKind::List(_) | ExprKind::Tuple(_) => {
            PREC_ATOM
        }
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, min_prec: u8) -> fmt::Result {
    let prec = precedence(expr);
    if prec < min_prec {
        write!(f, "(")?;
        write_bare(f, expr)?;
        write!(f, ")")
    } else {
        write_bare(f, expr)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write_expr(f, item, 0)?;
    }
    Ok(())
}

fn write_bare(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    let prec = precedence(expr);
    match &expr.kind {
        ExprKind::Literal(lit) => write!(f, "{lit}"),
        ExprKind::Name(name) => write!(f, "{name}"),
        ExprKind::List(items) => {
            write!(f, "[")?;
            write_list(f, items)?;
            write!(f, "]")
        }
        ExprKind::Tuple(items) => {
            write!(f, "(")?;
            write_list(f, items)?;
            if items.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")
        }
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Not => {
                write!(f, "not ")?;
                write_expr(f, operand, PREC_NOT)
            }
            UnaryOp::Neg => {
                write!(f, "-")?;
                write_expr(f, operand, PREC_NEG + 1)
            }
        },
        ExprKind::Arith { op, lhs, rhs } => {
            write_expr(f, lhs, prec)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, rhs, prec + 1)
        }
        ExprKind::Compare { op, lhs, rhs } => {
            write_expr(f, lhs, prec + 1)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, rhs, prec + 1)
        }
        ExprKind::Logic { op, lhs, rhs } => {
            write_expr(f, lhs, prec)?;
            write!(f, " {} ", op.symbol())?;
            write_expr(f, rhs, prec + 1)
        }
        ExprKind::Call { callee, args } => {
            write!(f, "{callee}(")?;
            write_list(f, args)?;
            write!(f, ")")
        }
        ExprKind::Index { base, index } => {
            write_expr(f, base, PREC_POSTFIX)?;
            write!(f, "[")?;
            write_expr(f, index, 0)?;
            write!(f, "]")
        }
        ExprKind::Field { base, field } => {
            write_expr(f, base, PREC_POSTFIX)?;
            write!(f, ".{field}")
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "none"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write_quoted(f, s),
        }
    }
}

pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, 0)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Let { name, value } => write!(f, "let {name} = {value}"),
            StmtKind::Assign { name, value } => write!(f, "{name} = {value}"),
            StmtKind::Expr(e) => write!(f, "{e}"),
            StmtKind::If { cond, .. } => write!(f, "if {cond}"),
            StmtKind::While { cond, .. } => write!(f, "while {cond}"),
            StmtKind::For { var, iter, .. } => write!(f, "for {var} in {iter}"),
            StmtKind::Return(Some(e)) => write!(f, "return {e}"),
            StmtKind::Return(None) => write!(f, "return"),
            StmtKind::Break => write!(f, "break"),
            StmtKind::Continue => write!(f, "continue"),
            StmtKind::Pass => write!(f, "pass"),
        }
    }
}
