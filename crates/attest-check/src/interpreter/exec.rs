//! Tree-walking execution of script functions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attest_core::ast::{
    ArithOp, Block, BoolOp, Expr, ExprKind, FunctionDecl, Literal, Stmt, StmtKind, UnaryOp,
};
use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::builtins::{call_builtin, elements, index_value};
use super::error::RuntimeError;
use super::eval::{eval_arith, eval_compare};
use super::scope::{Args, Scope};
use super::value::Value;

/// Execution limits and the seed of the `random` builtin.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum nesting of script function calls. Default: 256.
    pub max_recursion_depth: usize,
    /// Maximum number of execution steps. Default: 1,000,000.
    pub max_steps: u64,
    /// Wall-clock budget for the whole call, checked cooperatively.
    pub deadline: Option<Duration>,
    /// Seed of the interpreter RNG.
    pub seed: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_recursion_depth: 256,
            max_steps: 1_000_000,
            deadline: None,
            seed: 0,
        }
    }
}

// The clock is read once every this many steps.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// The script interpreter.
///
/// One interpreter carries the state of one top-level call: step counter,
/// call depth, RNG and the lines written by `print`.
pub struct Interpreter {
    config: InterpreterConfig,
    rng: ChaCha8Rng,
    io_log: Vec<String>,
    steps: u64,
    depth: usize,
    started: Instant,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type Locals = HashMap<String, Value>;

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Interpreter {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            io_log: Vec::new(),
            steps: 0,
            depth: 0,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Lines written by `print`, in order.
    pub fn io_log(&self) -> &[String] {
        &self.io_log
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub(crate) fn log_output(&mut self, line: String) {
        self.io_log.push(line);
    }

    /// Charges `n` execution steps against the budget.
    pub(crate) fn charge(&mut self, n: u64) -> Result<(), RuntimeError> {
        let before = self.steps;
        self.steps = self.steps.saturating_add(n);
        if self.steps > self.config.max_steps {
            return Err(RuntimeError::StepLimitExceeded {
                limit: self.config.max_steps,
            });
        }
        if let Some(deadline) = self.config.deadline {
            let crossed = before / DEADLINE_CHECK_INTERVAL != self.steps / DEADLINE_CHECK_INTERVAL;
            if crossed && self.started.elapsed() > deadline {
                return Err(RuntimeError::DeadlineExceeded {
                    ms: deadline.as_millis() as u64,
                });
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.charge(1)
    }

    /// Calls a script function with keyword arguments.
    ///
    /// Missing arguments take their declared default.
    ///
    /// # Errors
    ///
    /// Unknown or missing arguments are [`RuntimeError::InvalidArgument`];
    /// anything the body raises propagates.
    pub fn call_keyword(
        &mut self,
        decl: &FunctionDecl,
        scope: &Scope,
        args: &Args,
    ) -> Result<Value, RuntimeError> {
        if let Some(unknown) = args.keys().find(|k| decl.param(k).is_none()) {
            return Err(RuntimeError::invalid(format!(
                "{}() got an unexpected argument '{unknown}'",
                decl.name
            )));
        }
        let mut locals = Locals::new();
        for param in &decl.params {
            let value = match (args.get(&param.name), &param.default) {
                (Some(v), _) => v.clone(),
                (None, Some(default)) => self.eval_const(default, scope)?,
                (None, None) => {
                    return Err(RuntimeError::invalid(format!(
                        "{}() missing argument '{}'",
                        decl.name, param.name
                    )))
                }
            };
            locals.insert(param.name.clone(), value);
        }
        self.run_body(decl, scope, locals)
    }

    fn call_positional(
        &mut self,
        decl: &FunctionDecl,
        scope: &Scope,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if args.len() > decl.params.len() {
            return Err(RuntimeError::ArityMismatch {
                function: decl.name.clone(),
                expected: decl.params.len(),
                got: args.len(),
            });
        }
        let given = args.len();
        let mut locals = Locals::new();
        let mut args = args.into_iter();
        for param in &decl.params {
            let value = match (args.next(), &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => self.eval_const(default, scope)?,
                (None, None) => {
                    return Err(RuntimeError::ArityMismatch {
                        function: decl.name.clone(),
                        expected: decl.params.len(),
                        got: given,
                    })
                }
            };
            locals.insert(param.name.clone(), value);
        }
        self.run_body(decl, scope, locals)
    }

    fn run_body(
        &mut self,
        decl: &FunctionDecl,
        scope: &Scope,
        mut locals: Locals,
    ) -> Result<Value, RuntimeError> {
        if self.depth >= self.config.max_recursion_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: self.config.max_recursion_depth,
            });
        }
        self.depth += 1;
        let flow = self.exec_block(&decl.body, scope, &mut locals);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// Evaluates an expression with no local bindings (parameter defaults).
    pub fn eval_const(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, RuntimeError> {
        self.eval(expr, scope, &Locals::new())
    }

    /// Evaluates an expression with `bindings` as its locals. Used for
    /// contract predicates, which see the call's arguments (and `result`).
    pub fn eval_with(
        &mut self,
        expr: &Expr,
        scope: &Scope,
        bindings: &Args,
    ) -> Result<Value, RuntimeError> {
        let locals: Locals = bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.eval(expr, scope, &locals)
    }

    // ── Statements ─────────────────────────────────────────

    fn exec_block(
        &mut self,
        block: &Block,
        scope: &Scope,
        locals: &mut Locals,
    ) -> Result<Flow, RuntimeError> {
        for stmt in block {
            match self.exec_stmt(stmt, scope, locals)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &mut self,
        stmt: &Stmt,
        scope: &Scope,
        locals: &mut Locals,
    ) -> Result<Flow, RuntimeError> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Let { name, value } | StmtKind::Assign { name, value } => {
                let v = self.eval(value, scope, locals)?;
                locals.insert(name.clone(), v);
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, scope, locals)?;
                Ok(Flow::Normal)
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond, scope, locals)?.is_truthy() {
                    self.exec_block(then_block, scope, locals)
                } else if let Some(else_block) = else_block {
                    self.exec_block(else_block, scope, locals)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                while self.eval(cond, scope, locals)?.is_truthy() {
                    self.tick()?;
                    match self.exec_block(body, scope, locals)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::For { var, iter, body } => {
                let items = elements(&self.eval(iter, scope, locals)?)?;
                for item in items {
                    self.tick()?;
                    locals.insert(var.clone(), item);
                    match self.exec_block(body, scope, locals)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(expr) => self.eval(expr, scope, locals)?,
                    None => Value::None,
                };
                Ok(Flow::Return(v))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Pass => Ok(Flow::Normal),
        }
    }

    // ── Expressions ────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, scope: &Scope, locals: &Locals) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Name(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::UnboundName { name: name.clone() }),
            ExprKind::List(items) => Ok(Value::List(self.eval_all(items, scope, locals)?)),
            ExprKind::Tuple(items) => Ok(Value::Tuple(self.eval_all(items, scope, locals)?)),
            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand, scope, locals)?;
                match (op, v) {
                    (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(RuntimeError::IntegerOverflow),
                    (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::type_mismatch("number", &other)),
                }
            }
            ExprKind::Arith { op, lhs, rhs } => {
                let l = self.eval(lhs, scope, locals)?;
                let r = self.eval(rhs, scope, locals)?;
                if let (ArithOp::Mul, Value::List(_) | Value::Str(_), Value::Int(n)) = (op, &l, &r) {
                    // Repetition allocates; charge for the output size.
                    let unit = match &l {
                        Value::List(items) => items.len(),
                        Value::Str(s) => s.len(),
                        _ => 0,
                    } as u64;
                    self.charge(u64::try_from(*n).unwrap_or(0).saturating_mul(unit))?;
                }
                eval_arith(*op, &l, &r)
            }
            ExprKind::Compare { op, lhs, rhs } => {
                let l = self.eval(lhs, scope, locals)?;
                let r = self.eval(rhs, scope, locals)?;
                eval_compare(*op, &l, &r)
            }
            ExprKind::Logic { op, lhs, rhs } => {
                let l = self.eval(lhs, scope, locals)?;
                let short_circuit = match op {
                    BoolOp::And => !l.is_truthy(),
                    BoolOp::Or => l.is_truthy(),
                };
                if short_circuit {
                    Ok(l)
                } else {
                    self.eval(rhs, scope, locals)
                }
            }
            ExprKind::Call { callee, args } => {
                let args = self.eval_all(args, scope, locals)?;
                self.call_named(callee, args, scope)
            }
            ExprKind::Index { base, index } => {
                let b = self.eval(base, scope, locals)?;
                let i = self.eval(index, scope, locals)?;
                match index_value(&b, &i)? {
                    Some(v) => Ok(v),
                    None => match (&b, &i) {
                        (Value::Map(_), key) => Err(RuntimeError::KeyNotFound {
                            key: format!("{key:#}"),
                        }),
                        (_, Value::Int(index)) => Err(RuntimeError::IndexOutOfBounds {
                            index: *index,
                            len: elements(&b).map(|items| items.len()).unwrap_or(0),
                        }),
                        (_, other) => Err(RuntimeError::type_mismatch("int", other)),
                    },
                }
            }
            ExprKind::Field { base, field } => match self.eval(base, scope, locals)? {
                Value::Record { name, fields } => {
                    fields
                        .get(field)
                        .cloned()
                        .ok_or_else(|| RuntimeError::MissingField {
                            record: name,
                            field: field.clone(),
                        })
                }
                other => Err(RuntimeError::type_mismatch("record", &other)),
            },
        }
    }

    fn eval_all(
        &mut self,
        exprs: &[Expr],
        scope: &Scope,
        locals: &Locals,
    ) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval(e, scope, locals)).collect()
    }

    /// Resolution order: scope function, native helper, record constructor,
    /// builtin.
    fn call_named(
        &mut self,
        callee: &str,
        args: Vec<Value>,
        scope: &Scope,
    ) -> Result<Value, RuntimeError> {
        self.tick()?;
        if let Some(decl) = scope.function(callee) {
            let decl = Arc::clone(decl);
            return self.call_positional(&decl, scope, args);
        }
        if let Some((signature, func)) = scope.native(callee) {
            if args.len() > signature.params.len() {
                return Err(RuntimeError::ArityMismatch {
                    function: callee.to_string(),
                    expected: signature.params.len(),
                    got: args.len(),
                });
            }
            let given = args.len();
            let mut bound = Args::new();
            let mut args = args.into_iter();
            for param in &signature.params {
                let value = match (args.next(), &param.default) {
                    (Some(v), _) => v,
                    (None, Some(default)) => default.clone(),
                    (None, None) => {
                        return Err(RuntimeError::ArityMismatch {
                            function: callee.to_string(),
                            expected: signature.params.len(),
                            got: given,
                        })
                    }
                };
                bound.insert(param.name.clone(), value);
            }
            return func(&bound);
        }
        if let Some(record) = scope.types().record(callee) {
            if args.len() != record.fields.len() {
                return Err(RuntimeError::ArityMismatch {
                    function: callee.to_string(),
                    expected: record.fields.len(),
                    got: args.len(),
                });
            }
            let fields: IndexMap<String, Value> =
                record.fields.keys().cloned().zip(args).collect();
            return Ok(Value::Record {
                name: record.name.clone(),
                fields,
            });
        }
        call_builtin(self, callee, args).unwrap_or_else(|| {
            Err(RuntimeError::UnknownFunction {
                name: callee.to_string(),
            })
        })
    }
}

pub(crate) fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}
