//! Compilation check for script functions.
//!
//! Compiling a function resolves every name it references against its
//! parameters, the locals it introduces (`let`, `for`) and the callables of
//! its [`Scope`]. Resolution is flow-insensitive: a local introduced anywhere
//! in the function counts as declared everywhere in it. A function that
//! fails this check is never executed; mutants that fail it are excluded
//! from scoring.

use std::collections::HashSet;

use attest_core::ast::{Block, Expr, ExprKind, FunctionDecl, Span, StmtKind};

use super::builtins::is_builtin;
use super::scope::Scope;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("{function}: name '{name}' is not defined (at {span})")]
    UndefinedName {
        function: String,
        name: String,
        span: Span,
    },

    #[error("{function}: assignment to undeclared variable '{name}' (at {span})")]
    UndeclaredAssignment {
        function: String,
        name: String,
        span: Span,
    },

    #[error("{function}: call to unknown function '{name}' (at {span})")]
    UnknownCallee {
        function: String,
        name: String,
        span: Span,
    },

    #[error("{function}: '{keyword}' outside of a loop (at {span})")]
    LoopControlOutsideLoop {
        function: String,
        keyword: String,
        span: Span,
    },

    #[error("{function}: duplicate parameter '{name}'")]
    DuplicateParameter { function: String, name: String },
}

/// Checks that `decl` compiles in `scope`.
pub fn compile(decl: &FunctionDecl, scope: &Scope) -> Result<(), CompileError> {
    let mut declared = HashSet::new();
    for param in &decl.params {
        if !declared.insert(param.name.clone()) {
            return Err(CompileError::DuplicateParameter {
                function: decl.name.clone(),
                name: param.name.clone(),
            });
        }
    }
    collect_locals(&decl.body, &mut declared);

    let checker = Checker {
        function: &decl.name,
        scope,
        declared: &declared,
    };
    let no_locals = HashSet::new();
    let defaults = Checker {
        declared: &no_locals,
        ..checker
    };
    for param in &decl.params {
        if let Some(default) = &param.default {
            defaults.expr(default)?;
        }
    }
    checker.block(&decl.body, 0)
}

/// Checks a standalone expression (a contract predicate) that may reference
/// only `bound` names and the callables of `scope`.
pub fn compile_expr(
    expr: &Expr,
    context: &str,
    bound: &HashSet<String>,
    scope: &Scope,
) -> Result<(), CompileError> {
    Checker {
        function: context,
        scope,
        declared: bound,
    }
    .expr(expr)
}

fn collect_locals(block: &Block, declared: &mut HashSet<String>) {
    for stmt in block {
        match &stmt.kind {
            StmtKind::Let { name, .. } => {
                declared.insert(name.clone());
            }
            StmtKind::For { var, body, .. } => {
                declared.insert(var.clone());
                collect_locals(body, declared);
            }
            StmtKind::While { body, .. } => collect_locals(body, declared),
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                collect_locals(then_block, declared);
                if let Some(else_block) = else_block {
                    collect_locals(else_block, declared);
                }
            }
            _ => {}
        }
    }
}

#[derive(Clone, Copy)]
struct Checker<'a> {
    function: &'a str,
    scope: &'a Scope,
    declared: &'a HashSet<String>,
}

impl Checker<'_> {
    fn block(&self, block: &Block, loop_depth: usize) -> Result<(), CompileError> {
        for stmt in block {
            match &stmt.kind {
                StmtKind::Let { value, .. } => self.expr(value)?,
                StmtKind::Assign { name, value } => {
                    if !self.declared.contains(name) {
                        return Err(CompileError::UndeclaredAssignment {
                            function: self.function.to_string(),
                            name: name.clone(),
                            span: stmt.span,
                        });
                    }
                    self.expr(value)?;
                }
                StmtKind::Expr(e) => self.expr(e)?,
                StmtKind::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    self.expr(cond)?;
                    self.block(then_block, loop_depth)?;
                    if let Some(else_block) = else_block {
                        self.block(else_block, loop_depth)?;
                    }
                }
                StmtKind::While { cond, body } => {
                    self.expr(cond)?;
                    self.block(body, loop_depth + 1)?;
                }
                StmtKind::For { iter, body, .. } => {
                    self.expr(iter)?;
                    self.block(body, loop_depth + 1)?;
                }
                StmtKind::Return(value) => {
                    if let Some(e) = value {
                        self.expr(e)?;
                    }
                }
                StmtKind::Break | StmtKind::Continue if loop_depth == 0 => {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(CompileError::LoopControlOutsideLoop {
                        function: self.function.to_string(),
                        keyword: keyword.to_string(),
                        span: stmt.span,
                    });
                }
                StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
            }
        }
        Ok(())
    }

    fn expr(&self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Name(name) => {
                if self.declared.contains(name) {
                    Ok(())
                } else {
                    Err(CompileError::UndefinedName {
                        function: self.function.to_string(),
                        name: name.clone(),
                        span: expr.span,
                    })
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().try_for_each(|e| self.expr(e))
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Arith { lhs, rhs, .. }
            | ExprKind::Compare { lhs, rhs, .. }
            | ExprKind::Logic { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)
            }
            ExprKind::Call { callee, args } => {
                if !self.scope.resolves(callee) && !is_builtin(callee) {
                    return Err(CompileError::UnknownCallee {
                        function: self.function.to_string(),
                        name: callee.clone(),
                        span: expr.span,
                    });
                }
                args.iter().try_for_each(|e| self.expr(e))
            }
            ExprKind::Index { base, index } => {
                self.expr(base)?;
                self.expr(index)
            }
            ExprKind::Field { base, .. } => self.expr(base),
        }
    }
}
