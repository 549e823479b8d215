//! Recursive-descent parser producing the statement tree

use super::lexer::{tokenize, Token};
use super::value::Value;
use super::ScriptError;

/// Deepest expression tree the parser accepts
pub const MAX_NESTING_DEPTH: usize = 200;

// ─────────────────────────────────────────────────────────────────
// Syntax Tree
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `a.b.c = expr`; the path has at least one segment
    Assign(Vec<String>, Expr),
    Delete(Vec<String>),
    Import(String),
    Function {
        name: String,
        params: Vec<String>,
        body: Expr,
    },
    Expr(Expr),
}

/// Parse a whole program
pub fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}

/// Split a dotted name into its segments, validating each one
pub fn split_path(name: &str) -> Result<Vec<String>, ScriptError> {
    let segments: Vec<String> = name.split('.').map(str::to_string).collect();
    let valid = segments.iter().all(|s| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_')
    });
    if !valid {
        return Err(ScriptError::syntax(format!("invalid name '{}'", name)));
    }
    Ok(segments)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Depth of the expression tree built so far on the current path
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ScriptError::syntax(format!(
                "expected {}, found {:?}",
                what,
                self.peek()
            )))
        }
    }

    fn nest(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ScriptError::syntax(format!(
                "expression nested too deeply (limit {})",
                MAX_NESTING_DEPTH
            )));
        }
        Ok(())
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        self.nest()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(ScriptError::syntax(format!(
                "expected {}, found {:?}",
                what, other
            ))),
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Separator) {}
            if *self.peek() == Token::Eof {
                break;
            }
            stmts.push(self.statement()?);
            match self.peek() {
                Token::Separator | Token::Eof => {}
                other => {
                    return Err(ScriptError::syntax(format!(
                        "expected end of statement, found {:?}",
                        other
                    )))
                }
            }
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Token::Del => {
                self.advance();
                Ok(Stmt::Delete(self.dotted_path()?))
            }
            Token::Import => {
                self.advance();
                Ok(Stmt::Import(self.ident("module name")?))
            }
            Token::Fn => {
                self.advance();
                let name = self.ident("function name")?;
                self.expect(Token::LParen, "'('")?;
                let mut params = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        params.push(self.ident("parameter name")?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma, "',' or ')'")?;
                    }
                }
                self.expect(Token::Assign, "'='")?;
                let body = self.expression()?;
                Ok(Stmt::Function { name, params, body })
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&Token::Assign) {
                    let target = assignment_target(&expr)?;
                    let value = self.expression()?;
                    Ok(Stmt::Assign(target, value))
                } else {
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    fn dotted_path(&mut self) -> Result<Vec<String>, ScriptError> {
        let mut path = vec![self.ident("name")?];
        while self.eat(&Token::Dot) {
            path.push(self.ident("attribute name")?);
        }
        Ok(path)
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::If) {
            let cond = self.expression()?;
            self.expect(Token::Then, "'then'")?;
            let then = self.expression()?;
            self.expect(Token::Else, "'else'")?;
            let otherwise = self.expression()?;
            return Ok(Expr::If {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            self.nest()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut left = self.not_expr()?;
        while self.eat(&Token::And) {
            self.nest()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::SlashSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.nest()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let base = self.depth;
        let mut expr = self.atom()?;
        loop {
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen) {
                self.nest()?;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let attr = self.ident("attribute name")?;
                    expr = Expr::Attr(Box::new(expr), attr);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.call_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                _ => break,
            }
        }
        self.depth = base;
        Ok(expr)
    }

    fn call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ScriptError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok((args, kwargs));
        }
        loop {
            let is_keyword =
                matches!(self.peek(), Token::Ident(_)) && *self.peek_at(1) == Token::Assign;
            if is_keyword {
                let name = self.ident("keyword")?;
                self.advance();
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(ScriptError::syntax(
                        "positional argument follows keyword argument",
                    ));
                }
                args.push(self.expression()?);
            }
            if self.eat(&Token::RParen) {
                return Ok((args, kwargs));
            }
            self.expect(Token::Comma, "',' or ')'")?;
            // Trailing comma
            if self.eat(&Token::RParen) {
                return Ok((args, kwargs));
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Nil => Ok(Expr::Literal(Value::Nil)),
            Token::Ident(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBracket, "',' or ']'")?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = self.expression()?;
                    self.expect(Token::Colon, "':'")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBrace, "',' or '}'")?;
                        break;
                    }
                }
                Ok(Expr::Map(entries))
            }
            other => Err(ScriptError::syntax(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

fn assignment_target(expr: &Expr) -> Result<Vec<String>, ScriptError> {
    match expr {
        Expr::Name(name) => Ok(vec![name.clone()]),
        Expr::Attr(base, attr) => {
            let mut path = assignment_target(base)?;
            path.push(attr.clone());
            Ok(path)
        }
        _ => Err(ScriptError::syntax("cannot assign to expression")),
    }
}
