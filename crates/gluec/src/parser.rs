use thiserror::Error;

use crate::ast::*;
use crate::diag::Diag;
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Keyword, Punct, Token, TokenKind};

pub const DEFAULT_PORT: u16 = 80;

/// First syntax error of a parse. Parsing stops there; no partial program survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}, column {column}: {message}{}", found_suffix(.found))]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub found: Option<String>,
}

fn found_suffix(found: &Option<String>) -> String {
    match found {
        Some(text) => format!(" (unexpected token: {text})"),
        None => String::new(),
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    lexer: Lexer,
    current: Token,
    prev_span: Span,
    port: u16,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Self {
        let current = lexer.next_token();
        let prev_span = current.span;
        Self {
            lexer,
            current,
            prev_span,
            port: DEFAULT_PORT,
        }
    }

    /// Lexer warnings collected so far.
    pub fn take_diags(&mut self) -> Vec<Diag> {
        self.lexer.take_diags()
    }

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut apis = Vec::new();
        while !self.at_eof() {
            if self.eat_keyword(Keyword::Listen).is_some() {
                self.parse_listen()?;
            } else if let Some(tok) = self.eat_keyword(Keyword::Api) {
                apis.push(self.parse_api(tok.span)?);
            } else {
                return Err(self.error_here("expected `listen` or `api` declaration"));
            }
        }
        Ok(Program { apis })
    }

    fn parse_listen(&mut self) -> ParseResult<()> {
        let port = match self.peek_kind() {
            TokenKind::Int(value) => *value,
            _ => return Err(self.error_here("expected port number after `listen`")),
        };
        if !(1..=i64::from(u16::MAX)).contains(&port) {
            return Err(self.error_here("port must be between 1 and 65535"));
        }
        self.bump();
        self.expect_punct(Punct::Semicolon, "expected `;` after listen port")?;
        self.port = port as u16;
        Ok(())
    }

    fn parse_api(&mut self, start: Span) -> ParseResult<ApiDecl> {
        let path = self.expect_string_lit("expected path string after `api`")?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(ApiDecl {
            path,
            port: self.port,
            body,
            span,
        })
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        let start = self.expect_punct(Punct::LBrace, "expected `{`")?;
        let mut stmts = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.error_here("expected `}` before end of input"));
            }
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect_punct(Punct::RBrace, "expected `}`")?;
        Ok(Block {
            stmts,
            span: start.merge(end),
        })
    }

    pub fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.peek_span();
        if self.at_punct(Punct::LBrace) {
            let block = self.parse_block()?;
            let span = block.span;
            return Ok(Stmt {
                kind: StmtKind::Block(block),
                span,
            });
        }
        if self.eat_keyword(Keyword::If).is_some() {
            let cond = self.parse_paren_cond()?;
            let then_branch = Box::new(self.parse_stmt()?);
            let else_branch = if self.eat_keyword(Keyword::Else).is_some() {
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(self.finish_stmt(
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                },
                start,
            ));
        }
        if self.eat_keyword(Keyword::While).is_some() {
            let cond = self.parse_paren_cond()?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(self.finish_stmt(StmtKind::While { cond, body }, start));
        }
        if self.eat_keyword(Keyword::For).is_some() {
            return self.parse_for(start);
        }
        if self.eat_keyword(Keyword::Each).is_some() {
            return self.parse_each(start);
        }
        if self.eat_keyword(Keyword::Return).is_some() {
            let expr = if self.at_punct(Punct::Semicolon) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.expect_punct(Punct::Semicolon, "expected `;` after return")?;
            return Ok(self.finish_stmt(StmtKind::Return(expr), start));
        }
        if self.eat_keyword(Keyword::Print).is_some() {
            let mut args = vec![self.parse_expr()?];
            while self.eat_punct(Punct::Comma).is_some() {
                args.push(self.parse_expr()?);
            }
            self.expect_punct(Punct::Semicolon, "expected `;` after print")?;
            return Ok(self.finish_stmt(StmtKind::Print(args), start));
        }
        if self.eat_punct(Punct::Semicolon).is_some() {
            return Ok(self.finish_stmt(StmtKind::Empty, start));
        }
        self.parse_simple_stmt()
    }

    /// Declaration or expression statement, including its terminating `;`.
    /// `x;` and `x = e;` are untyped declarations.
    fn parse_simple_stmt(&mut self) -> ParseResult<Stmt> {
        let start = self.peek_span();
        let typed = self.eat_keyword(Keyword::Int).is_some()
            || self.eat_keyword(Keyword::Float).is_some();
        if typed {
            let name = self.expect_ident("expected variable name in declaration")?;
            let init = if self.eat_punct(Punct::Assign).is_some() {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_punct(Punct::Semicolon, "expected `;` after declaration")?;
            return Ok(self.finish_stmt(StmtKind::Decl { name, init }, start));
        }
        let expr = self.parse_expr()?;
        self.expect_punct(Punct::Semicolon, "expected `;` after expression")?;
        let kind = match expr.kind {
            ExprKind::Ident(name) => StmtKind::Decl { name, init: None },
            ExprKind::Assign { target, value } => match *target {
                Expr {
                    kind: ExprKind::Ident(name),
                    ..
                } => StmtKind::Decl {
                    name,
                    init: Some(*value),
                },
                target => StmtKind::Expr(Expr {
                    kind: ExprKind::Assign {
                        target: Box::new(target),
                        value,
                    },
                    span: expr.span,
                }),
            },
            kind => StmtKind::Expr(Expr {
                kind,
                span: expr.span,
            }),
        };
        Ok(self.finish_stmt(kind, start))
    }

    fn parse_for(&mut self, start: Span) -> ParseResult<Stmt> {
        self.expect_punct(Punct::LParen, "expected `(` after `for`")?;
        let init = if self.eat_punct(Punct::Semicolon).is_some() {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        let cond = if self.at_punct(Punct::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(Punct::Semicolon, "expected `;` after for condition")?;
        let update = if self.at_punct(Punct::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect_punct(Punct::RParen, "expected `)` after for clauses")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(self.finish_stmt(
            StmtKind::For {
                init,
                cond,
                update,
                body,
            },
            start,
        ))
    }

    fn parse_each(&mut self, start: Span) -> ParseResult<Stmt> {
        let first = self.expect_ident("expected loop variable after `each`")?;
        self.expect_punct(Punct::Comma, "expected `,` between each variables")?;
        let second = self.expect_ident("expected second loop variable")?;
        if self.eat_keyword(Keyword::In).is_none() {
            return Err(self.error_here("expected `in` after each variables"));
        }
        let source = self.parse_primary()?;
        if self.eat_keyword(Keyword::Meet).is_none() {
            return Err(self.error_here("expected `meet` condition"));
        }
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(self.finish_stmt(
            StmtKind::Each {
                binding: EachBinding {
                    params: [first, second],
                    source,
                },
                cond,
                body,
            },
            start,
        ))
    }

    fn parse_paren_cond(&mut self) -> ParseResult<Expr> {
        self.expect_punct(Punct::LParen, "expected `(` before condition")?;
        let cond = self.parse_expr()?;
        self.expect_punct(Punct::RParen, "expected `)` after condition")?;
        Ok(cond)
    }

    fn finish_stmt(&self, kind: StmtKind, start: Span) -> Stmt {
        Stmt {
            kind,
            span: start.merge(self.prev_span),
        }
    }

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> ParseResult<Expr> {
        let target = self.parse_or()?;
        if self.eat_punct(Punct::Assign).is_some() {
            let value = self.parse_assign()?;
            let span = target.span.merge(value.span);
            return Ok(Expr {
                kind: ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            });
        }
        Ok(target)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat_punct(Punct::OrOr).is_some() {
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_eq()?;
        while self.eat_punct(Punct::AndAnd).is_some() {
            let right = self.parse_eq()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_eq(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_rel()?;
        loop {
            let op = if self.eat_punct(Punct::EqEq).is_some() {
                Some(BinaryOp::Eq)
            } else if self.eat_punct(Punct::NotEq).is_some() {
                Some(BinaryOp::NotEq)
            } else {
                None
            };
            if let Some(op) = op {
                let right = self.parse_rel()?;
                expr = binary(op, expr, right);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_rel(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_add()?;
        loop {
            let op = if self.eat_punct(Punct::Lt).is_some() {
                Some(BinaryOp::Lt)
            } else if self.eat_punct(Punct::LtEq).is_some() {
                Some(BinaryOp::LtEq)
            } else if self.eat_punct(Punct::Gt).is_some() {
                Some(BinaryOp::Gt)
            } else if self.eat_punct(Punct::GtEq).is_some() {
                Some(BinaryOp::GtEq)
            } else {
                None
            };
            if let Some(op) = op {
                let right = self.parse_add()?;
                expr = binary(op, expr, right);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_add(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_fetch()?;
        loop {
            let op = if self.eat_punct(Punct::Plus).is_some() {
                Some(BinaryOp::Add)
            } else if self.eat_punct(Punct::Minus).is_some() {
                Some(BinaryOp::Sub)
            } else {
                None
            };
            if let Some(op) = op {
                let right = self.parse_fetch()?;
                expr = binary(op, expr, right);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_fetch(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_mul()?;
        while self.eat_punct(Punct::LArrow).is_some() {
            let url = self.parse_mul()?;
            let span = expr.span.merge(url.span);
            expr = Expr {
                kind: ExprKind::Fetch {
                    target: Box::new(expr),
                    url: Box::new(url),
                },
                span,
            };
        }
        Ok(expr)
    }

    fn parse_mul(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let op = if self.eat_punct(Punct::Star).is_some() {
                Some(BinaryOp::Mul)
            } else if self.eat_punct(Punct::Slash).is_some() {
                Some(BinaryOp::Div)
            } else {
                None
            };
            if let Some(op) = op {
                let right = self.parse_primary()?;
                expr = binary(op, expr, right);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.peek_span();
        let literal = match self.peek_kind() {
            TokenKind::Int(value) => Some(Literal::Int(*value)),
            TokenKind::Float(value) => Some(Literal::Float(*value)),
            TokenKind::Bool(value) => Some(Literal::Bool(*value)),
            TokenKind::String(value) => Some(Literal::String(value.clone())),
            _ => None,
        };
        if let Some(literal) = literal {
            self.bump();
            return Ok(Expr {
                kind: ExprKind::Literal(literal),
                span,
            });
        }
        if self.eat_punct(Punct::Bang).is_some() {
            let expr = self.parse_primary()?;
            let span = span.merge(expr.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
                span,
            });
        }
        if self.eat_punct(Punct::LParen).is_some() {
            let expr = self.parse_expr()?;
            self.expect_punct(Punct::RParen, "expected `)` after expression")?;
            return Ok(expr);
        }
        if self.eat_punct(Punct::LBracket).is_some() {
            let mut items = Vec::new();
            while !self.at_punct(Punct::RBracket) {
                items.push(self.parse_expr()?);
                if self.eat_punct(Punct::Comma).is_none() && !self.at_punct(Punct::RBracket) {
                    return Err(self.error_here("expected `,` or `]` in array literal"));
                }
            }
            let end = self.expect_punct(Punct::RBracket, "expected `]`")?;
            return Ok(Expr {
                kind: ExprKind::ArrayLit(items),
                span: span.merge(end),
            });
        }
        if self.eat_punct(Punct::LBrace).is_some() {
            return self.parse_object_lit(span);
        }
        if let TokenKind::Ident(name) = self.peek_kind() {
            let ident = Ident {
                name: name.clone(),
                span,
            };
            self.bump();
            let expr = Expr {
                kind: ExprKind::Ident(ident),
                span,
            };
            return self.parse_postfix(expr);
        }
        Err(self.error_here("expected expression"))
    }

    fn parse_object_lit(&mut self, start: Span) -> ParseResult<Expr> {
        let mut fields: Vec<(StringLit, Expr)> = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            let key = self.expect_string_lit("expected string key in object literal")?;
            self.expect_punct(Punct::Colon, "expected `:` after object key")?;
            let value = self.parse_expr()?;
            fields.retain(|(existing, _)| existing.value != key.value);
            fields.push((key, value));
            if self.eat_punct(Punct::Comma).is_none() && !self.at_punct(Punct::RBrace) {
                return Err(self.error_here("expected `,` or `}` in object literal"));
            }
        }
        let end = self.expect_punct(Punct::RBrace, "expected `}`")?;
        Ok(Expr {
            kind: ExprKind::ObjectLit(fields),
            span: start.merge(end),
        })
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> ParseResult<Expr> {
        loop {
            if self.eat_punct(Punct::LBracket).is_some() {
                let index = self.parse_expr()?;
                let end = self.expect_punct(Punct::RBracket, "expected `]` after index")?;
                let span = expr.span.merge(end);
                expr = Expr {
                    kind: ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                };
            } else if self.eat_punct(Punct::Dot).is_some() {
                for key in self.parse_member_tail()? {
                    let span = expr.span.merge(self.prev_span);
                    expr = Expr {
                        kind: ExprKind::Member {
                            base: Box::new(expr),
                            key,
                        },
                        span,
                    };
                }
            } else {
                return Ok(expr);
            }
        }
    }

    /// Tail of a dot accessor: `name`, `N`, `-N` or a parenthesised form of those.
    /// A float token such as `0.1` stands for two consecutive integer accessors.
    fn parse_member_tail(&mut self) -> ParseResult<Vec<MemberKey>> {
        if self.eat_punct(Punct::LParen).is_some() {
            let keys = self.parse_member_tail()?;
            self.expect_punct(Punct::RParen, "expected `)` after member key")?;
            return Ok(keys);
        }
        if self.eat_punct(Punct::Minus).is_some() {
            return match self.peek_kind() {
                TokenKind::Int(value) => {
                    let value = value.wrapping_neg();
                    self.bump();
                    Ok(vec![MemberKey::Index(value)])
                }
                _ => Err(self.error_here("expected integer after `-` in member access")),
            };
        }
        let key = match self.peek_kind() {
            TokenKind::Ident(name) => vec![MemberKey::Name(name.clone())],
            TokenKind::Int(value) => vec![MemberKey::Index(*value)],
            TokenKind::Float(_) => match split_index_pair(&self.current.text) {
                Some((first, second)) => vec![MemberKey::Index(first), MemberKey::Index(second)],
                None => return Err(self.error_here("invalid member access")),
            },
            _ => return Err(self.error_here("expected field name or index after `.`")),
        };
        self.bump();
        Ok(key)
    }

    fn expect_ident(&mut self, message: &str) -> ParseResult<Ident> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                let ident = Ident {
                    name: name.clone(),
                    span: self.peek_span(),
                };
                self.bump();
                Ok(ident)
            }
            _ => Err(self.error_here(message)),
        }
    }

    fn expect_string_lit(&mut self, message: &str) -> ParseResult<StringLit> {
        match self.peek_kind() {
            TokenKind::String(value) => {
                let lit = StringLit {
                    value: value.clone(),
                    span: self.peek_span(),
                };
                self.bump();
                Ok(lit)
            }
            _ => Err(self.error_here(message)),
        }
    }

    fn expect_punct(&mut self, punct: Punct, message: &str) -> ParseResult<Span> {
        match self.eat_punct(punct) {
            Some(tok) => Ok(tok.span),
            None => Err(self.error_here(message)),
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Option<Token> {
        if matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn eat_punct(&mut self, punct: Punct) -> Option<Token> {
        if self.at_punct(punct) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn at_punct(&self, punct: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn at_eof(&self) -> bool {
        self.current.is_eof()
    }

    fn error_here(&self, message: &str) -> ParseError {
        let found = if self.at_eof() {
            Some("end of input".to_string())
        } else {
            Some(self.current.text.clone())
        };
        ParseError {
            message: message.to_string(),
            line: self.current.span.line,
            column: self.current.span.column,
            found,
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current.kind
    }

    fn peek_span(&self) -> Span {
        self.current.span
    }

    fn bump(&mut self) -> Token {
        let next = self.lexer.next_token();
        let tok = std::mem::replace(&mut self.current, next);
        self.prev_span = tok.span;
        tok
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

fn split_index_pair(text: &str) -> Option<(i64, i64)> {
    let (first, second) = text.split_once('.')?;
    if first.is_empty()
        || second.is_empty()
        || !first.bytes().all(|b| b.is_ascii_digit())
        || !second.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    Some((first.parse().ok()?, second.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParseResult<Program> {
        Parser::new(Lexer::new(src)).parse_program()
    }

    fn parse_expr(src: &str) -> Expr {
        let mut parser = Parser::new(Lexer::new(src));
        parser.parse_expr().unwrap()
    }

    #[test]
    fn api_captures_most_recent_listen_port() {
        let program = parse(r#"api "/a" {} listen 8080; api "/b" {} listen 9; api "/c" {}"#).unwrap();
        let ports: Vec<_> = program.apis.iter().map(|api| api.port).collect();
        assert_eq!(ports, vec![80, 8080, 9]);
        assert_eq!(program.apis[1].path.value, "/b");
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = parse("listen 70000;").unwrap_err();
        assert!(err.message.contains("65535"));
        assert!(parse("listen 0;").is_err());
    }

    #[test]
    fn fetch_binds_looser_than_multiplication() {
        let expr = parse_expr("a <- b * c + d");
        let ExprKind::Binary { op, left, .. } = expr.kind else {
            panic!("expected addition");
        };
        assert_eq!(op, BinaryOp::Add);
        let ExprKind::Fetch { url, .. } = left.kind else {
            panic!("expected fetch");
        };
        assert!(matches!(url.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = parse_expr("a = b = 1");
        let ExprKind::Assign { value, .. } = expr.kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn member_tails() {
        let expr = parse_expr("a.name.(-1).2");
        let ExprKind::Member { base, key } = expr.kind else {
            panic!("expected member");
        };
        assert_eq!(key, MemberKey::Index(2));
        let ExprKind::Member { base, key } = base.kind else {
            panic!("expected member");
        };
        assert_eq!(key, MemberKey::Index(-1));
        let ExprKind::Member { key, .. } = base.kind else {
            panic!("expected member");
        };
        assert_eq!(key, MemberKey::Name("name".to_string()));
    }

    #[test]
    fn float_after_dot_splits_into_two_indexes() {
        let expr = parse_expr("a.0.1");
        let ExprKind::Member { base, key } = expr.kind else {
            panic!("expected member");
        };
        assert_eq!(key, MemberKey::Index(1));
        assert!(matches!(
            base.kind,
            ExprKind::Member {
                key: MemberKey::Index(0),
                ..
            }
        ));
    }

    #[test]
    fn dot_rejects_general_expressions() {
        let mut parser = Parser::new(Lexer::new("a.(b + 1)"));
        assert!(parser.parse_expr().is_err());
        let mut parser = Parser::new(Lexer::new("a.\"x\""));
        assert!(parser.parse_expr().is_err());
    }

    #[test]
    fn object_literal_keeps_last_duplicate() {
        let expr = parse_expr(r#"{"a": 1, "b": 2, "a": 3,}"#);
        let ExprKind::ObjectLit(fields) = expr.kind else {
            panic!("expected object");
        };
        let keys: Vec<_> = fields.iter().map(|(k, _)| k.value.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(matches!(fields[1].1.kind, ExprKind::Literal(Literal::Int(3))));
    }

    #[test]
    fn parses_statement_forms() {
        let src = r#"
            listen 8080;
            api "/x" {
                int n = 3;
                float f;
                for (i = 0; i < n; i = i + 1) print i;
                for (;;) return;
                while (false) ;
                if (n == 3) { print "yes"; } else print "no";
                each p, q in arr meet p < q { print p, q; }
                return [1, 2,];
            }
        "#;
        let program = parse(src).unwrap();
        let stmts = &program.apis[0].body.stmts;
        assert_eq!(stmts.len(), 8);
        assert!(matches!(stmts[0].kind, StmtKind::Decl { init: Some(_), .. }));
        assert!(matches!(stmts[1].kind, StmtKind::Decl { init: None, .. }));
        assert!(matches!(
            stmts[3].kind,
            StmtKind::For {
                init: None,
                cond: None,
                update: None,
                ..
            }
        ));
        assert!(matches!(stmts[6].kind, StmtKind::Each { .. }));
    }

    #[test]
    fn untyped_declarations() {
        let program = parse(r#"api "/x" { x; y = 1; a[0] = 2; z <- "http://h/"; }"#).unwrap();
        let stmts = &program.apis[0].body.stmts;
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Decl { name, init: None } if name.name == "x"
        ));
        assert!(matches!(
            &stmts[1].kind,
            StmtKind::Decl { name, init: Some(_) } if name.name == "y"
        ));
        assert!(matches!(
            &stmts[2].kind,
            StmtKind::Expr(Expr { kind: ExprKind::Assign { .. }, .. })
        ));
        assert!(matches!(&stmts[3].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn reports_position_and_token() {
        let err = parse("listen 80;\napi \"/x\" { a = ; }").unwrap_err();
        assert_eq!((err.line, err.column), (2, 16));
        assert_eq!(err.found.as_deref(), Some(";"));
        assert_eq!(
            err.to_string(),
            "parse error at line 2, column 16: expected expression (unexpected token: ;)"
        );
    }

    #[test]
    fn missing_semicolon_is_fatal() {
        let err = parse(r#"api "/x" { print 1 }"#).unwrap_err();
        assert!(err.message.contains("`;`"));
    }
}
