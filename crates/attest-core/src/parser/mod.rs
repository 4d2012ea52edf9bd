//! Parser: tokenizer plus recursive descent over the script grammar.
//!
//! Expression precedence, lowest first: `or`, `and`, `not`, comparisons
//! (`== != < <= > >= in not in`, non-associative), `+ -`, `* / // %`,
//! unary `-`, postfix (call, index, field), primaries.

pub mod tokenizer;

use crate::ast::{
    ArithOp, Attribute, Block, BoolOp, CmpOp, Expr, ExprKind, FunctionDecl, Literal, Param,
    RecordDecl, SourceModule, Span, Stmt, StmtKind, UnaryOp,
};
use crate::error::CoreError;
use crate::types::TypeDesc;

use tokenizer::{SpannedToken, Token, Tokenizer};

/// Parses a whole source file.
///
/// # Errors
///
/// Returns [`CoreError::Parse`] with the position of the first syntax error.
pub fn parse_module(source: &str) -> Result<SourceModule, CoreError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    Parser::new(tokens).module()
}

/// Parses a single expression, e.g. a contract predicate supplied as text.
pub fn parse_expr(source: &str) -> Result<Expr, CoreError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expr()?;
    parser.expect(&Token::Eof, "end of input")?;
    Ok(expr)
}

/// Parses a type in surface syntax, e.g. `list[int[0..9]]`.
pub fn parse_type(source: &str) -> Result<TypeDesc, CoreError> {
    let tokens = Tokenizer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let ty = parser.ty()?;
    parser.expect(&Token::Eof, "end of input")?;
    Ok(ty)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser { tokens, pos: 0 }
    }

    // ── Token helpers ──────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), CoreError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> CoreError {
        CoreError::parse(
            self.span(),
            format!("expected {what}, found {:?}", self.peek()),
        )
    }

    fn ident(&mut self, what: &str) -> Result<String, CoreError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ── Items ──────────────────────────────────────────────

    fn module(&mut self) -> Result<SourceModule, CoreError> {
        let mut module = SourceModule::default();
        loop {
            match self.peek() {
                Token::Eof => return Ok(module),
                Token::Record => module.records.push(self.record()?),
                Token::At | Token::Fn => module.functions.push(self.function()?),
                _ => return Err(self.unexpected("'fn', 'record' or an attribute")),
            }
        }
    }

    fn record(&mut self) -> Result<RecordDecl, CoreError> {
        let span = self.span();
        self.expect(&Token::Record, "'record'")?;
        let name = self.ident("record name")?;
        self.expect(&Token::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.eat(&Token::RBrace) {
            let field = self.ident("field name")?;
            self.expect(&Token::Colon, "':'")?;
            let ty = self.ty()?;
            fields.push((field, ty));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "',' or '}'")?;
                break;
            }
        }
        Ok(RecordDecl { name, fields, span })
    }

    fn function(&mut self) -> Result<FunctionDecl, CoreError> {
        let mut attributes = Vec::new();
        while self.peek() == &Token::At {
            attributes.push(self.attribute()?);
        }

        let span = self.span();
        self.expect(&Token::Fn, "'fn'")?;
        let name = self.ident("function name")?;
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.eat(&Token::RParen) {
            params.push(self.param()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "',' or ')'")?;
                break;
            }
        }
        let returns = if self.eat(&Token::Arrow) {
            Some(self.ty()?)
        } else {
            None
        };
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            returns,
            body,
            attributes,
            span,
        })
    }

    fn param(&mut self) -> Result<Param, CoreError> {
        let span = self.span();
        let name = self.ident("parameter name")?;
        let ty = if self.eat(&Token::Colon) {
            Some(self.ty()?)
        } else {
            None
        };
        let default = if self.eat(&Token::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Param {
            name,
            ty,
            default,
            span,
        })
    }

    fn attribute(&mut self) -> Result<Attribute, CoreError> {
        self.expect(&Token::At, "'@'")?;
        let span = self.span();
        let name = self.ident("attribute name")?;
        match name.as_str() {
            "requires" | "ensures" => {
                self.expect(&Token::LParen, "'('")?;
                let expr = self.expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(if name == "requires" {
                    Attribute::Requires(expr)
                } else {
                    Attribute::Ensures(expr)
                })
            }
            "spec" => Ok(Attribute::Spec),
            "pure" => {
                let (mut seed, mut eq) = (None, None);
                if self.eat(&Token::LParen) {
                    for (key, value) in self.options()? {
                        match (key.as_str(), value) {
                            ("seed", Literal::Int(n)) if n >= 0 => seed = Some(n as u64),
                            ("eq", Literal::Str(mode)) => eq = Some(mode),
                            (key, _) => {
                                return Err(CoreError::parse(
                                    span,
                                    format!("invalid @pure option '{key}'"),
                                ))
                            }
                        }
                    }
                }
                Ok(Attribute::Pure { seed, eq })
            }
            "against" => {
                self.expect(&Token::LParen, "'('")?;
                let spec = self.ident("specification name")?;
                let options = if self.eat(&Token::Comma) {
                    self.options()?
                } else {
                    self.expect(&Token::RParen, "')'")?;
                    Vec::new()
                };
                Ok(Attribute::Against { spec, options })
            }
            other => Err(CoreError::parse(
                span,
                format!("unknown attribute '@{other}'"),
            )),
        }
    }

    /// `key = literal, ...` up to and including the closing parenthesis.
    fn options(&mut self) -> Result<Vec<(String, Literal)>, CoreError> {
        let mut options = Vec::new();
        while !self.eat(&Token::RParen) {
            let key = self.ident("option name")?;
            self.expect(&Token::Assign, "'='")?;
            let value = self.literal()?;
            options.push((key, value));
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "',' or ')'")?;
                break;
            }
        }
        Ok(options)
    }

    fn literal(&mut self) -> Result<Literal, CoreError> {
        let negative = self.eat(&Token::Minus);
        let lit = match self.bump() {
            Token::Int(n) => Literal::Int(if negative { -n } else { n }),
            Token::Float(x) => Literal::Float(if negative { -x } else { x }),
            Token::Str(s) if !negative => Literal::Str(s),
            Token::True if !negative => Literal::Bool(true),
            Token::False if !negative => Literal::Bool(false),
            Token::None if !negative => Literal::None,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.unexpected("a literal"));
            }
        };
        Ok(lit)
    }

    // ── Types ──────────────────────────────────────────────

    fn ty(&mut self) -> Result<TypeDesc, CoreError> {
        let first = self.ty_atom()?;
        if self.peek() != &Token::Pipe {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Pipe) {
            members.push(self.ty_atom()?);
        }
        Ok(TypeDesc::Union(members))
    }

    fn ty_atom(&mut self) -> Result<TypeDesc, CoreError> {
        let span = self.span();
        if self.eat(&Token::None) {
            return Ok(TypeDesc::None);
        }
        let name = self.ident("a type")?;
        let ty = match name.as_str() {
            "any" => TypeDesc::Any,
            "bool" => TypeDesc::Bool,
            "str" => TypeDesc::Text,
            "bytes" => TypeDesc::Bytes,
            "int" => {
                if self.eat(&Token::LBracket) {
                    let min = self.int_bound()?;
                    self.expect(&Token::DotDot, "'..'")?;
                    let max = self.int_bound()?;
                    self.expect(&Token::RBracket, "']'")?;
                    TypeDesc::Int { min, max }
                } else {
                    TypeDesc::INT
                }
            }
            "float" => {
                if self.eat(&Token::LBracket) {
                    let min = self.float_bound()?;
                    self.expect(&Token::DotDot, "'..'")?;
                    let max = self.float_bound()?;
                    self.expect(&Token::RBracket, "']'")?;
                    TypeDesc::Float { min, max }
                } else {
                    TypeDesc::FLOAT
                }
            }
            "list" | "set" | "option" => {
                let mut args = self.type_args()?;
                if args.len() != 1 {
                    return Err(CoreError::parse(
                        span,
                        format!("{name} takes exactly one type argument"),
                    ));
                }
                let inner = args.remove(0);
                match name.as_str() {
                    "list" => TypeDesc::list(inner),
                    "set" => TypeDesc::set(inner),
                    _ => TypeDesc::optional(inner),
                }
            }
            "dict" => {
                let mut args = self.type_args()?;
                if args.len() != 2 {
                    return Err(CoreError::parse(
                        span,
                        "dict takes exactly two type arguments",
                    ));
                }
                let value = args.remove(1);
                let key = args.remove(0);
                TypeDesc::map(key, value)
            }
            "tuple" => TypeDesc::Tuple(self.type_args()?),
            _ => {
                let args = if self.peek() == &Token::LBracket {
                    self.type_args()?
                } else {
                    Vec::new()
                };
                TypeDesc::Named { name, args }
            }
        };
        Ok(ty)
    }

    fn type_args(&mut self) -> Result<Vec<TypeDesc>, CoreError> {
        self.expect(&Token::LBracket, "'['")?;
        let mut args = Vec::new();
        while !self.eat(&Token::RBracket) {
            args.push(self.ty()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBracket, "',' or ']'")?;
                break;
            }
        }
        Ok(args)
    }

    fn int_bound(&mut self) -> Result<Option<i64>, CoreError> {
        if matches!(self.peek(), Token::DotDot | Token::RBracket) {
            return Ok(None);
        }
        match self.literal()? {
            Literal::Int(n) => Ok(Some(n)),
            _ => Err(CoreError::parse(self.span(), "expected an integer bound")),
        }
    }

    fn float_bound(&mut self) -> Result<Option<f64>, CoreError> {
        if matches!(self.peek(), Token::DotDot | Token::RBracket) {
            return Ok(None);
        }
        match self.literal()? {
            Literal::Int(n) => Ok(Some(n as f64)),
            Literal::Float(x) => Ok(Some(x)),
            _ => Err(CoreError::parse(self.span(), "expected a numeric bound")),
        }
    }

    // ── Statements ─────────────────────────────────────────

    fn block(&mut self) -> Result<Block, CoreError> {
        self.expect(&Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek() == &Token::Eof {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, CoreError> {
        let span = self.span();
        let kind = match self.peek() {
            Token::Let => {
                self.bump();
                let name = self.ident("variable name")?;
                self.expect(&Token::Assign, "'='")?;
                let value = self.expr()?;
                self.expect(&Token::Semi, "';'")?;
                StmtKind::Let { name, value }
            }
            Token::If => return self.if_stmt(),
            Token::While => {
                self.bump();
                let cond = self.expr()?;
                let body = self.block()?;
                StmtKind::While { cond, body }
            }
            Token::For => {
                self.bump();
                let var = self.ident("loop variable")?;
                self.expect(&Token::In, "'in'")?;
                let iter = self.expr()?;
                let body = self.block()?;
                StmtKind::For { var, iter, body }
            }
            Token::Return => {
                self.bump();
                let value = if self.peek() == &Token::Semi {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&Token::Semi, "';'")?;
                StmtKind::Return(value)
            }
            Token::Break | Token::Continue | Token::Pass => {
                let kind = match self.bump() {
                    Token::Break => StmtKind::Break,
                    Token::Continue => StmtKind::Continue,
                    _ => StmtKind::Pass,
                };
                self.expect(&Token::Semi, "';'")?;
                kind
            }
            Token::Ident(name) if self.peek_at(1) == &Token::Assign => {
                let name = name.clone();
                self.bump();
                self.bump();
                let value = self.expr()?;
                self.expect(&Token::Semi, "';'")?;
                StmtKind::Assign { name, value }
            }
            _ => {
                let expr = self.expr()?;
                self.expect(&Token::Semi, "';'")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt::new(kind, span))
    }

    fn if_stmt(&mut self) -> Result<Stmt, CoreError> {
        let span = self.span();
        self.expect(&Token::If, "'if'")?;
        let cond = self.expr()?;
        let then_block = self.block()?;
        let else_block = if self.eat(&Token::Else) {
            if self.peek() == &Token::If {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then_block,
                else_block,
            },
            span,
        ))
    }

    // ── Expressions ────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr, CoreError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == &Token::Or {
            let span = self.span();
            self.bump();
            let rhs = self.and_expr()?;
            lhs = logic(BoolOp::Or, lhs, rhs, span);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.not_expr()?;
        while self.peek() == &Token::And {
            let span = self.span();
            self.bump();
            let rhs = self.not_expr()?;
            lhs = logic(BoolOp::And, lhs, rhs, span);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, CoreError> {
        if self.peek() == &Token::Not {
            let span = self.span();
            self.bump();
            let operand = self.not_expr()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CoreError> {
        let lhs = self.additive()?;
        let span = self.span();
        let op = match self.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            Token::In => CmpOp::In,
            Token::Not if self.peek_at(1) == &Token::In => {
                self.bump();
                CmpOp::NotIn
            }
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.additive()?;
        Ok(Expr::new(
            ExprKind::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn additive(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            let span = self.span();
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = arith(op, lhs, rhs, span);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CoreError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::SlashSlash => ArithOp::FloorDiv,
                Token::Percent => ArithOp::Rem,
                _ => return Ok(lhs),
            };
            let span = self.span();
            self.bump();
            let rhs = self.unary()?;
            lhs = arith(op, lhs, rhs, span);
        }
    }

    fn unary(&mut self) -> Result<Expr, CoreError> {
        if self.peek() != &Token::Minus {
            return self.postfix();
        }
        let span = self.span();
        self.bump();
        let operand = self.unary()?;
        // Fold negative numeric literals so constants mutate as a unit.
        let kind = match operand.kind {
            ExprKind::Literal(Literal::Int(n)) if n != i64::MIN => {
                ExprKind::Literal(Literal::Int(-n))
            }
            ExprKind::Literal(Literal::Float(x)) => ExprKind::Literal(Literal::Float(-x)),
            kind => ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::new(kind, operand.span)),
            },
        };
        Ok(Expr::new(kind, span))
    }

    fn postfix(&mut self) -> Result<Expr, CoreError> {
        let mut expr = self.primary()?;
        loop {
            let span = self.span();
            match self.peek() {
                Token::LParen => {
                    let ExprKind::Name(callee) = &expr.kind else {
                        return Err(CoreError::parse(span, "only named functions can be called"));
                    };
                    let callee = callee.clone();
                    self.bump();
                    let args = self.expr_list(&Token::RParen)?;
                    expr = Expr::new(ExprKind::Call { callee, args }, expr.span);
                }
                Token::LBracket => {
                    self.bump();
                    let index = self.expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                Token::Dot => {
                    self.bump();
                    let field = self.ident("field name")?;
                    expr = Expr::new(
                        ExprKind::Field {
                            base: Box::new(expr),
                            field,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn expr_list(&mut self, close: &Token) -> Result<Vec<Expr>, CoreError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, "',' or a closing bracket")?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, CoreError> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::Int(n) => {
                self.bump();
                ExprKind::Literal(Literal::Int(n))
            }
            Token::Float(x) => {
                self.bump();
                ExprKind::Literal(Literal::Float(x))
            }
            Token::Str(s) => {
                self.bump();
                ExprKind::Literal(Literal::Str(s))
            }
            Token::True => {
                self.bump();
                ExprKind::Literal(Literal::Bool(true))
            }
            Token::False => {
                self.bump();
                ExprKind::Literal(Literal::Bool(false))
            }
            Token::None => {
                self.bump();
                ExprKind::Literal(Literal::None)
            }
            Token::Ident(name) => {
                self.bump();
                ExprKind::Name(name)
            }
            Token::LBracket => {
                self.bump();
                ExprKind::List(self.expr_list(&Token::RBracket)?)
            }
            Token::LParen => {
                self.bump();
                if self.eat(&Token::RParen) {
                    ExprKind::Tuple(Vec::new())
                } else {
                    let first = self.expr()?;
                    if self.eat(&Token::RParen) {
                        return Ok(first);
                    }
                    self.expect(&Token::Comma, "',' or ')'")?;
                    let mut items = vec![first];
                    items.extend(self.expr_list(&Token::RParen)?);
                    ExprKind::Tuple(items)
                }
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr::new(kind, span))
    }
}

fn logic(op: BoolOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Logic {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

fn arith(op: ArithOp, lhs: Expr, rhs: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Arith {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_function_with_attributes() {
        let module = parse_module(
            r#"
            @requires(len(xs) > 0)
            @ensures(result >= 0)
            @against(ref_max, max_examples = 50, eq = "structural")
            fn my_max(xs: list[int], start: int = 0) -> int {
                let best = start;
                for x in xs {
                    if x > best { best = x; }
                }
                return best;
            }
            "#,
        )
        .unwrap();

        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "my_max");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].ty, Some(TypeDesc::list(TypeDesc::INT)));
        assert!(f.params[1].default.is_some());
        assert_eq!(f.returns, Some(TypeDesc::INT));
        assert_eq!(f.body.len(), 3);
        assert_eq!(f.attributes.len(), 3);
        assert_eq!(
            f.attributes[2],
            Attribute::Against {
                spec: "ref_max".into(),
                options: vec![
                    ("max_examples".into(), Literal::Int(50)),
                    ("eq".into(), Literal::Str("structural".into())),
                ],
            }
        );
    }

    #[test]
    fn parses_records_and_types() {
        let module = parse_module(
            "record Point { x: float, y: float[0..1.5] }\nrecord Empty {}",
        )
        .unwrap();
        assert_eq!(module.records.len(), 2);
        assert_eq!(
            module.records[0].fields[1].1,
            TypeDesc::Float {
                min: Some(0.0),
                max: Some(1.5)
            }
        );
        assert!(module.records[1].fields.is_empty());

        assert_eq!(
            parse_type("dict[str, tuple[int, bool]] | none").unwrap(),
            TypeDesc::Union(vec![
                TypeDesc::map(
                    TypeDesc::Text,
                    TypeDesc::Tuple(vec![TypeDesc::INT, TypeDesc::Bool])
                ),
                TypeDesc::None,
            ])
        );
        assert_eq!(
            parse_type("int[-5..]").unwrap(),
            TypeDesc::Int {
                min: Some(-5),
                max: None
            }
        );
    }

    #[test]
    fn precedence() {
        let expr = parse_expr("a + b * c == d or not e and f").unwrap();
        assert_eq!(expr.to_string(), "a + b * c == d or not e and f");
        let ExprKind::Logic { op: BoolOp::Or, lhs, .. } = &expr.kind else {
            panic!("expected or at the root, got {expr:?}");
        };
        assert!(matches!(lhs.kind, ExprKind::Compare { op: CmpOp::Eq, .. }));
    }

    #[test]
    fn not_in_and_negative_literals() {
        let expr = parse_expr("x not in [-1, 2]").unwrap();
        let ExprKind::Compare { op, rhs, .. } = &expr.kind else {
            panic!("expected comparison");
        };
        assert_eq!(*op, CmpOp::NotIn);
        let ExprKind::List(items) = &rhs.kind else {
            panic!("expected list");
        };
        assert_eq!(items[0].kind, ExprKind::Literal(Literal::Int(-1)));
    }

    #[test]
    fn else_if_chains_nest() {
        let module = parse_module(
            "fn sign(x: int) -> int { if x > 0 { return 1; } else if x < 0 { return -1; } else { return 0; } }",
        )
        .unwrap();
        let StmtKind::If { else_block, .. } = &module.functions[0].body[0].kind else {
            panic!("expected if");
        };
        let nested = else_block.as_ref().unwrap();
        assert!(matches!(nested[0].kind, StmtKind::If { else_block: Some(_), .. }));
    }

    #[test]
    fn pure_takes_seed_and_equality() {
        let module = parse_module(
            "@pure\nfn a() -> int { return 1; }\n\
             @pure(seed = 3, eq = \"approx\")\nfn b() -> float { return 1.0; }",
        )
        .unwrap();
        assert_eq!(
            module.functions[0].attributes,
            vec![Attribute::Pure { seed: None, eq: None }]
        );
        assert_eq!(
            module.functions[1].attributes,
            vec![Attribute::Pure {
                seed: Some(3),
                eq: Some("approx".into())
            }]
        );

        let err = parse_module("@pure(eq = 1)\nfn c() { pass; }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { message, .. } if message.contains("'eq'")));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let err = parse_module("@cached fn f() { pass; }").unwrap_err();
        assert!(matches!(err, CoreError::Parse { message, .. } if message.contains("@cached")));
    }

    #[test]
    fn reports_missing_semicolon_position() {
        let err = parse_module("fn f() {\n  return 1\n}").unwrap_err();
        let CoreError::Parse { span, .. } = err else {
            panic!("expected parse error");
        };
        assert_eq!(span, Span::new(3, 1));
    }
}
