//! Recursive descent parser producing the [`ast`](super::ast).

use std::rc::Rc;

use super::ast::*;
use super::diagnostic::Diagnostic;
use super::lexer::{Spanned, Token};

pub struct Parser<'a> {
    chunk: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    /// Current syntax nesting, bounded by [`MAX_SYNTAX_LEVELS`]
    depth: u32,
}

type ParseResult<T> = Result<T, Diagnostic>;

impl<'a> Parser<'a> {
    pub fn new(chunk: &'a str, tokens: Vec<Spanned>) -> Self {
        Parser {
            chunk,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parse a whole chunk
    pub fn parse_chunk(mut self) -> ParseResult<Block> {
        let block = self.block()?;
        if self.peek().is_some() {
            return Err(self.error_near("'<eof>' expected"));
        }
        Ok(block)
    }

    // Token helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn near(&self) -> String {
        match self.peek() {
            Some(token) => format!("near '{token}'"),
            None => "near <eof>".to_string(),
        }
    }

    fn error_near(&self, message: &str) -> Diagnostic {
        Diagnostic::new(self.chunk, self.line(), format!("{message} {}", self.near()))
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.accept(token) {
            Ok(())
        } else {
            Err(self.error_near(&format!("'{token}' expected")))
        }
    }

    /// Expect the token closing a construct opened on `line`
    fn expect_match(&mut self, close: &Token, open: &Token, line: u32) -> ParseResult<()> {
        if self.accept(close) {
            return Ok(());
        }
        if line == self.line() {
            Err(self.error_near(&format!("'{close}' expected")))
        } else {
            Err(self.error_near(&format!(
                "'{close}' expected (to close '{open}' at line {line})"
            )))
        }
    }

    fn enter_level(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_LEVELS {
            return Err(Diagnostic::new(self.chunk, self.line(), "chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn name(&mut self) -> ParseResult<Rc<str>> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_near("<name> expected")),
        }
    }

    // Statements

    fn block_follows(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::End | Token::Else | Token::Elseif | Token::Until)
        )
    }

    fn block(&mut self) -> ParseResult<Block> {
        let mut block = Vec::new();
        while !self.block_follows() {
            if self.check(&Token::Return) {
                block.push(self.return_stmt()?);
                break;
            }
            if let Some(stmt) = self.statement()? {
                block.push(stmt);
            }
        }
        Ok(block)
    }

    fn return_stmt(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        self.expect(&Token::Return)?;
        let values = if self.block_follows() || self.check(&Token::Semi) {
            Vec::new()
        } else {
            self.expr_list()?
        };
        self.accept(&Token::Semi);
        if !self.block_follows() {
            return Err(self.error_near("'<eof>' expected"));
        }
        Ok(Stmt {
            kind: StmtKind::Return(values),
            line,
        })
    }

    fn statement(&mut self) -> ParseResult<Option<Stmt>> {
        self.enter_level()?;
        let stmt = self.statement_kind();
        self.depth -= 1;
        stmt
    }

    fn statement_kind(&mut self) -> ParseResult<Option<Stmt>> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Token::Semi) => {
                self.pos += 1;
                return Ok(None);
            }
            Some(Token::Break) => {
                self.pos += 1;
                StmtKind::Break
            }
            Some(Token::Do) => {
                self.pos += 1;
                let body = self.block()?;
                self.expect_match(&Token::End, &Token::Do, line)?;
                StmtKind::Do(body)
            }
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                self.expect(&Token::Do)?;
                let body = self.block()?;
                self.expect_match(&Token::End, &Token::While, line)?;
                StmtKind::While { cond, body }
            }
            Some(Token::Repeat) => {
                self.pos += 1;
                let body = self.block()?;
                self.expect_match(&Token::Until, &Token::Repeat, line)?;
                let cond = self.expr()?;
                StmtKind::Repeat { body, cond }
            }
            Some(Token::If) => self.if_stmt(line)?,
            Some(Token::For) => self.for_stmt(line)?,
            Some(Token::Function) => self.function_stmt(line)?,
            Some(Token::Local) => {
                self.pos += 1;
                if self.accept(&Token::Function) {
                    let name = self.name()?;
                    let body = self.func_body(name.to_string(), false, line)?;
                    StmtKind::LocalFunction { name, body }
                } else {
                    let mut names = vec![self.name()?];
                    while self.accept(&Token::Comma) {
                        names.push(self.name()?);
                    }
                    let values = if self.accept(&Token::Assign) {
                        self.expr_list()?
                    } else {
                        Vec::new()
                    };
                    StmtKind::Local { names, values }
                }
            }
            _ => self.expr_stmt()?,
        };
        Ok(Some(Stmt { kind, line }))
    }

    fn if_stmt(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.expect(&Token::If)?;
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.expect(&Token::Then)?;
        arms.push((cond, self.block()?));

        let mut otherwise = None;
        loop {
            if self.accept(&Token::Elseif) {
                let cond = self.expr()?;
                self.expect(&Token::Then)?;
                arms.push((cond, self.block()?));
            } else if self.accept(&Token::Else) {
                otherwise = Some(self.block()?);
                self.expect_match(&Token::End, &Token::If, line)?;
                break;
            } else {
                self.expect_match(&Token::End, &Token::If, line)?;
                break;
            }
        }
        Ok(StmtKind::If { arms, otherwise })
    }

    fn for_stmt(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.expect(&Token::For)?;
        let first = self.name()?;
        if self.accept(&Token::Assign) {
            let start = self.expr()?;
            self.expect(&Token::Comma)?;
            let limit = self.expr()?;
            let step = if self.accept(&Token::Comma) {
                Some(self.expr()?)
            } else {
                None
            };
            self.expect(&Token::Do)?;
            let body = self.block()?;
            self.expect_match(&Token::End, &Token::For, line)?;
            return Ok(StmtKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.accept(&Token::Comma) {
            names.push(self.name()?);
        }
        if !self.accept(&Token::In) {
            return Err(self.error_near("'=' or 'in' expected"));
        }
        let values = self.expr_list()?;
        self.expect(&Token::Do)?;
        let body = self.block()?;
        self.expect_match(&Token::End, &Token::For, line)?;
        Ok(StmtKind::GenericFor {
            names,
            values,
            body,
        })
    }

    fn function_stmt(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.expect(&Token::Function)?;
        let mut path = vec![self.name()?];
        while self.accept(&Token::Dot) {
            path.push(self.name()?);
        }
        let method = if self.accept(&Token::Colon) {
            Some(self.name()?)
        } else {
            None
        };

        let mut full_name = path.join(".");
        if let Some(method) = &method {
            full_name = format!("{full_name}:{method}");
        }
        let body = self.func_body(full_name, method.is_some(), line)?;
        Ok(StmtKind::Function { path, method, body })
    }

    fn func_body(&mut self, name: String, is_method: bool, line: u32) -> ParseResult<FuncBody> {
        let mut params = Vec::new();
        if is_method {
            params.push(Rc::from("self"));
        }
        self.expect(&Token::LParen)?;
        if !self.check(&Token::RParen) {
            loop {
                params.push(self.name()?);
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.block()?;
        self.expect_match(&Token::End, &Token::Function, line)?;
        Ok(FuncBody {
            name,
            params,
            body,
            line,
        })
    }

    fn expr_stmt(&mut self) -> ParseResult<StmtKind> {
        let first = self.suffixed_expr()?;
        if self.check(&Token::Assign) || self.check(&Token::Comma) {
            let mut targets = vec![first];
            while self.accept(&Token::Comma) {
                targets.push(self.suffixed_expr()?);
            }
            self.expect(&Token::Assign)?;
            let values = self.expr_list()?;
            for target in &targets {
                if !matches!(target.kind, ExprKind::Name(_) | ExprKind::Index { .. }) {
                    return Err(Diagnostic::new(self.chunk, target.line, "syntax error: cannot assign to this expression"));
                }
            }
            return Ok(StmtKind::Assign { targets, values });
        }
        if !first.is_multi() {
            return Err(self.error_near("syntax error"));
        }
        Ok(StmtKind::Call(first))
    }

    // Expressions

    fn expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut list = vec![self.expr()?];
        while self.accept(&Token::Comma) {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    pub fn expr(&mut self) -> ParseResult<Expr> {
        self.sub_expr(0)
    }

    fn binary_op(&self) -> Option<BinOp> {
        Some(match self.peek()? {
            Token::Or => BinOp::Or,
            Token::And => BinOp::And,
            Token::Lt => BinOp::Lt,
            Token::Gt => BinOp::Gt,
            Token::LtEq => BinOp::Le,
            Token::GtEq => BinOp::Ge,
            Token::NotEq => BinOp::Ne,
            Token::EqEq => BinOp::Eq,
            Token::DotDot => BinOp::Concat,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::SlashSlash => BinOp::IDiv,
            Token::Percent => BinOp::Mod,
            Token::Caret => BinOp::Pow,
            _ => return None,
        })
    }

    /// Precedence climbing: parse operators binding tighter than `limit`
    fn sub_expr(&mut self, limit: u8) -> ParseResult<Expr> {
        let entry = self.depth;
        self.enter_level()?;
        let line = self.line();
        let unary = match self.peek() {
            Some(Token::Not) => Some(UnOp::Not),
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Hash) => Some(UnOp::Len),
            _ => None,
        };
        let mut lhs = match unary {
            Some(op) => {
                self.pos += 1;
                let operand = self.sub_expr(UNARY_PRECEDENCE)?;
                Expr {
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    line,
                }
            }
            None => self.simple_expr()?,
        };

        while let Some(op) = self.binary_op() {
            let (left, right) = op.precedence();
            if left <= limit {
                break;
            }
            let line = self.line();
            self.pos += 1;
            let rhs = self.sub_expr(right)?;
            // each operator in a chain adds a level to the tree
            self.enter_level()?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                line,
            };
        }
        self.depth = entry;
        Ok(lhs)
    }

    fn simple_expr(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Token::Nil) => ExprKind::Nil,
            Some(Token::True) => ExprKind::True,
            Some(Token::False) => ExprKind::False,
            Some(Token::Integer(i)) => ExprKind::Integer(*i),
            Some(Token::Float(n)) => ExprKind::Float(*n),
            Some(Token::Str(s)) => ExprKind::Str(s.clone()),
            Some(Token::LBrace) => return self.table(),
            Some(Token::Function) => {
                self.pos += 1;
                let body = self.func_body("anonymous".to_string(), false, line)?;
                return Ok(Expr {
                    kind: ExprKind::Function(Box::new(body)),
                    line,
                });
            }
            _ => return self.suffixed_expr(),
        };
        self.pos += 1;
        Ok(Expr { kind, line })
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        match self.peek() {
            Some(Token::Name(_)) => {
                let name = self.name()?;
                Ok(Expr {
                    kind: ExprKind::Name(name),
                    line,
                })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect_match(&Token::RParen, &Token::LParen, line)?;
                Ok(Expr {
                    kind: ExprKind::Paren(Box::new(inner)),
                    line,
                })
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    fn suffixed_expr(&mut self) -> ParseResult<Expr> {
        let entry = self.depth;
        let mut expr = self.primary_expr()?;
        loop {
            let line = self.line();
            if matches!(
                self.peek(),
                Some(Token::Dot | Token::LBracket | Token::Colon | Token::LParen | Token::LBrace | Token::Str(_))
            ) {
                self.enter_level()?;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.name()?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(Expr {
                                kind: ExprKind::Str(name),
                                line,
                            }),
                        },
                        line,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            obj: Box::new(expr),
                            key: Box::new(key),
                        },
                        line,
                    };
                }
                Some(Token::Colon) => {
                    self.pos += 1;
                    let name = self.name()?;
                    let args = self.call_args()?;
                    expr = Expr {
                        kind: ExprKind::Method {
                            obj: Box::new(expr),
                            name,
                            args,
                        },
                        line,
                    };
                }
                Some(Token::LParen | Token::LBrace | Token::Str(_)) => {
                    let args = self.call_args()?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        line,
                    };
                }
                _ => {
                    self.depth = entry;
                    return Ok(expr);
                }
            }
        }
    }

    fn call_args(&mut self) -> ParseResult<Vec<Expr>> {
        let line = self.line();
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(vec![Expr {
                    kind: ExprKind::Str(s),
                    line,
                }])
            }
            Some(Token::LBrace) => Ok(vec![self.table()?]),
            Some(Token::LParen) => {
                self.pos += 1;
                if self.accept(&Token::RParen) {
                    return Ok(Vec::new());
                }
                let args = self.expr_list()?;
                self.expect_match(&Token::RParen, &Token::LParen, line)?;
                Ok(args)
            }
            _ => Err(self.error_near("function arguments expected")),
        }
    }

    fn table(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Name(_)), Some(Token::Assign)) => {
                    let name = self.name()?;
                    self.pos += 1;
                    Field::Named(name, self.expr()?)
                }
                (Some(Token::LBracket), _) => {
                    self.pos += 1;
                    let key = self.expr()?;
                    self.expect(&Token::RBracket)?;
                    self.expect(&Token::Assign)?;
                    Field::Keyed(key, self.expr()?)
                }
                _ => Field::Positional(self.expr()?),
            };
            fields.push(field);
            if !self.accept(&Token::Comma) && !self.accept(&Token::Semi) {
                break;
            }
        }
        self.expect_match(&Token::RBrace, &Token::LBrace, line)?;
        Ok(Expr {
            kind: ExprKind::Table(fields),
            line,
        })
    }
}
