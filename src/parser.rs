use crate::ast::*;
use crate::error::TemplateError;
use crate::lexer::{tokenize, Keyword, Span, Token};
use crate::value::Value;
use std::rc::Rc;

/// Parses template source into a statement list. Invalid templates fail
/// here, at registration time, never during a render.
pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, TemplateError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let (stmts, _) = parser.parse_until(&[])?;
    Ok(stmts)
}

struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(t, _)| t)
    }

    fn next_token(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, s)| *s)
            .unwrap_or(Span { line: 1, col: 1 })
    }

    fn err_here(&self, msg: impl std::fmt::Display) -> TemplateError {
        let span = self.span();
        TemplateError::syntax(format!("{}:{}: {}", span.line, span.col, msg))
    }

    fn describe(token: Option<&Token>) -> String {
        match token {
            Some(Token::TemplateData(_)) => "template text".to_string(),
            Some(t) => t.text(),
            None => "end of template".to_string(),
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        self.eat(&Token::Keyword(kw))
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(s)) if s == name => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), TemplateError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.err_here(format!(
                "Expected {}, got {}",
                token.text(),
                Self::describe(self.peek())
            )))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), TemplateError> {
        self.expect(&Token::Keyword(kw))
    }

    fn expect_ident(&mut self) -> Result<String, TemplateError> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let name = s.clone();
                self.pos += 1;
                Ok(name)
            }
            other => Err(self.err_here(format!(
                "Expected identifier, got {}",
                Self::describe(other)
            ))),
        }
    }

    // Statement layer ----------------------------------------------------

    /// Parses statements until one of `terminators` opens a `{% %}` tag.
    /// The terminating keyword is consumed, the rest of its tag is left
    /// for the caller.
    fn parse_until(
        &mut self,
        terminators: &[Keyword],
    ) -> Result<(Vec<Stmt>, Option<Keyword>), TemplateError> {
        let mut stmts = Vec::new();
        loop {
            match self.next_token() {
                None => {
                    if terminators.is_empty() {
                        return Ok((stmts, None));
                    }
                    let expected: Vec<&str> =
                        terminators.iter().map(|k| k.as_str()).collect();
                    return Err(self.err_here(format!(
                        "Unexpected end of template, expected {}",
                        expected.join(" or ")
                    )));
                }
                Some((Token::TemplateData(text), _)) => stmts.push(Stmt::Text(text)),
                Some((Token::VariableStart, _)) => {
                    let expr = self.parse_expr()?;
                    self.expect(&Token::VariableEnd)?;
                    stmts.push(Stmt::Emit(expr));
                }
                Some((Token::BlockStart, _)) => {
                    if let Some(Token::Keyword(kw)) = self.peek() {
                        let kw = *kw;
                        if terminators.contains(&kw) {
                            self.pos += 1;
                            return Ok((stmts, Some(kw)));
                        }
                    }
                    stmts.push(self.parse_statement()?);
                }
                Some((other, span)) => {
                    return Err(TemplateError::syntax(format!(
                        "{}:{}: Unexpected {}",
                        span.line,
                        span.col,
                        Self::describe(Some(&other))
                    )));
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, TemplateError> {
        match self.next_token() {
            Some((Token::Keyword(Keyword::If), _)) => self.parse_if(),
            Some((Token::Keyword(Keyword::For), _)) => self.parse_for(),
            Some((Token::Keyword(Keyword::Set), _)) => self.parse_set(),
            Some((Token::Keyword(Keyword::With), _)) => self.parse_with(),
            Some((Token::Keyword(Keyword::Macro), _)) => self.parse_macro(),
            Some((Token::Keyword(Keyword::Call), _)) => self.parse_call_block(),
            Some((Token::Keyword(Keyword::Block), _)) => self.parse_block(),
            Some((Token::Keyword(Keyword::Extends), _)) => self.parse_extends(),
            Some((Token::Keyword(Keyword::Include), _)) => self.parse_include(),
            Some((Token::Keyword(Keyword::Filter), _)) => self.parse_filter_block(),
            Some((Token::Keyword(Keyword::Import), _)) => self.parse_import(),
            Some((Token::Keyword(Keyword::From), _)) => self.parse_from_import(),
            Some((Token::Keyword(Keyword::Raw), _)) => self.parse_raw(),
            Some((Token::Keyword(Keyword::Autoescape), _)) => self.parse_autoescape(),
            Some((Token::Ident(name), span)) => Err(TemplateError::syntax(format!(
                "{}:{}: Unknown block statement: {}",
                span.line, span.col, name
            ))),
            other => Err(self.err_here(format!(
                "Unknown block statement: {}",
                Self::describe(other.as_ref().map(|(t, _)| t))
            ))),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, TemplateError> {
        let cond = self.parse_expr()?;
        self.expect(&Token::BlockEnd)?;
        let (body, end) =
            self.parse_until(&[Keyword::Elif, Keyword::Else, Keyword::Endif])?;
        let else_body = match end {
            Some(Keyword::Elif) => vec![self.parse_if()?],
            Some(Keyword::Else) => {
                self.expect(&Token::BlockEnd)?;
                let (else_body, _) = self.parse_until(&[Keyword::Endif])?;
                self.expect(&Token::BlockEnd)?;
                else_body
            }
            _ => {
                self.expect(&Token::BlockEnd)?;
                Vec::new()
            }
        };
        Ok(Stmt::If {
            cond,
            body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, TemplateError> {
        let mut targets = vec![self.expect_ident()?];
        while self.eat(&Token::Comma) {
            targets.push(self.expect_ident()?);
        }
        self.expect_keyword(Keyword::In)?;
        // The iterator expression must not swallow a trailing `if`; that
        // belongs to the loop's filter clause.
        let iter = self.parse_expr_no_cond()?;
        let cond = if self.eat_keyword(Keyword::If) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let recursive = self.eat_ident("recursive");
        self.expect(&Token::BlockEnd)?;
        let (body, end) = self.parse_until(&[Keyword::Else, Keyword::Endfor])?;
        let else_body = if end == Some(Keyword::Else) {
            self.expect(&Token::BlockEnd)?;
            let (else_body, _) = self.parse_until(&[Keyword::Endfor])?;
            else_body
        } else {
            Vec::new()
        };
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::For(Rc::new(ForLoop {
            targets,
            iter,
            cond,
            recursive,
            body,
            else_body,
        })))
    }

    fn parse_set(&mut self) -> Result<Stmt, TemplateError> {
        let name = self.expect_ident()?;
        let attr = if self.eat(&Token::Dot) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(&Token::Assign)?;
        let value = self.parse_expr()?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Set { name, attr, value })
    }

    fn parse_with(&mut self) -> Result<Stmt, TemplateError> {
        let mut bindings = Vec::new();
        while self.peek() != Some(&Token::BlockEnd) {
            let name = self.expect_ident()?;
            self.expect(&Token::Assign)?;
            bindings.push((name, self.parse_expr()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endwith])?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::With { bindings, body })
    }

    fn parse_macro(&mut self) -> Result<Stmt, TemplateError> {
        let name = self.expect_ident()?;
        self.expect(&Token::ParenOpen)?;
        let mut params = Vec::new();
        while !self.eat(&Token::ParenClose) {
            let name = self.expect_ident()?;
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(MacroParam { name, default });
            if !self.eat(&Token::Comma) {
                self.expect(&Token::ParenClose)?;
                break;
            }
        }
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endmacro])?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Macro(Rc::new(MacroDecl { name, params, body })))
    }

    fn parse_call_block(&mut self) -> Result<Stmt, TemplateError> {
        let mut params = Vec::new();
        if self.eat(&Token::ParenOpen) {
            while !self.eat(&Token::ParenClose) {
                params.push(self.expect_ident()?);
                if !self.eat(&Token::Comma) {
                    self.expect(&Token::ParenClose)?;
                    break;
                }
            }
        }
        let call = self.parse_expr()?;
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endcall])?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::CallBlock(Rc::new(CallBlock { params, call, body })))
    }

    fn parse_block(&mut self) -> Result<Stmt, TemplateError> {
        let name = self.expect_ident()?;
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endblock])?;
        // `{% endblock name %}` is tolerated.
        if let Some(Token::Ident(_)) = self.peek() {
            self.pos += 1;
        }
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Block {
            name,
            body: Rc::new(body),
        })
    }

    fn parse_extends(&mut self) -> Result<Stmt, TemplateError> {
        let target = self.parse_expr()?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Extends(target))
    }

    fn parse_include(&mut self) -> Result<Stmt, TemplateError> {
        let target = self.parse_expr()?;
        let ignore_missing = if self.eat_ident("ignore") {
            match self.eat_ident("missing") {
                true => true,
                false => {
                    return Err(self.err_here(format!(
                        "Expected missing, got {}",
                        Self::describe(self.peek())
                    )))
                }
            }
        } else {
            false
        };
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Include {
            target,
            ignore_missing,
        })
    }

    fn parse_filter_block(&mut self) -> Result<Stmt, TemplateError> {
        let name = self.expect_ident()?;
        let args = if self.peek() == Some(&Token::ParenOpen) {
            self.parse_call_args()?
        } else {
            CallArgs::default()
        };
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endfilter])?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::FilterBlock { name, args, body })
    }

    fn parse_import(&mut self) -> Result<Stmt, TemplateError> {
        let target = self.parse_expr()?;
        if !self.eat_ident("as") {
            return Err(self.err_here(format!(
                "Expected as, got {}",
                Self::describe(self.peek())
            )));
        }
        let alias = self.expect_ident()?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Import { target, alias })
    }

    fn parse_from_import(&mut self) -> Result<Stmt, TemplateError> {
        let target = self.parse_expr()?;
        self.expect_keyword(Keyword::Import)?;
        let mut names = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let alias = if self.eat_ident("as") {
                Some(self.expect_ident()?)
            } else {
                None
            };
            names.push((name, alias));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::FromImport { target, names })
    }

    /// The lexer has already tokenized the raw content; stitch the token
    /// text back together until `{% endraw %}`.
    fn parse_raw(&mut self) -> Result<Stmt, TemplateError> {
        self.expect(&Token::BlockEnd)?;
        let mut content = String::new();
        loop {
            match self.next_token() {
                None => {
                    return Err(self.err_here("Unexpected end of template, expected endraw"))
                }
                Some((Token::BlockStart, _)) => {
                    if self.eat_keyword(Keyword::Endraw) {
                        self.expect(&Token::BlockEnd)?;
                        return Ok(Stmt::Text(content));
                    }
                    content.push_str("{%");
                }
                Some((token, _)) => content.push_str(&token.text()),
            }
        }
    }

    fn parse_autoescape(&mut self) -> Result<Stmt, TemplateError> {
        let enabled = self.parse_expr()?;
        self.expect(&Token::BlockEnd)?;
        let (body, _) = self.parse_until(&[Keyword::Endautoescape])?;
        self.expect(&Token::BlockEnd)?;
        Ok(Stmt::Autoescape { enabled, body })
    }

    // Expression layer ---------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, TemplateError> {
        let value = self.parse_or()?;
        if self.eat_keyword(Keyword::If) {
            let cond = self.parse_or()?;
            let alternative = if self.eat_keyword(Keyword::Else) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            return Ok(Expr::Cond {
                value: Box::new(value),
                cond: Box::new(cond),
                alternative,
            });
        }
        Ok(value)
    }

    /// Expression without the conditional production, for `for` iterators.
    fn parse_expr_no_cond(&mut self) -> Result<Expr, TemplateError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_keyword(Keyword::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, TemplateError> {
        let left = self.parse_concat()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinaryOp::Eq),
            Some(Token::Ne) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Keyword(Keyword::In)) => Some(BinaryOp::In),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let right = self.parse_concat()?;
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        if self.peek() == Some(&Token::Keyword(Keyword::Not)) {
            // Comparisons are non-associative, so a `not` here can only
            // introduce `not in`.
            self.pos += 1;
            self.expect_keyword(Keyword::In)?;
            let right = self.parse_concat()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(Expr::Binary {
                    op: BinaryOp::In,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            });
        }
        if self.eat_keyword(Keyword::Is) {
            let negated = self.eat_keyword(Keyword::Not);
            let name = self.parse_test_name()?;
            let args = if self.peek() == Some(&Token::ParenOpen) {
                self.parse_call_args()?.args
            } else if self.at_bare_test_arg() {
                // `x is divisibleby 3` style single argument.
                vec![self.parse_concat()?]
            } else {
                Vec::new()
            };
            return Ok(Expr::Test {
                name,
                base: Box::new(left),
                args,
                negated,
            });
        }
        Ok(left)
    }

    /// Whether the next token can begin a bare (unparenthesized) test
    /// argument.
    fn at_bare_test_arg(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Int(_))
                | Some(Token::Float(_))
                | Some(Token::Str(_))
                | Some(Token::Ident(_))
                | Some(Token::Keyword(Keyword::True))
                | Some(Token::Keyword(Keyword::False))
                | Some(Token::Keyword(Keyword::None))
                | Some(Token::BracketOpen)
                | Some(Token::BraceOpen)
        )
    }

    fn parse_test_name(&mut self) -> Result<String, TemplateError> {
        let name = match self.peek() {
            Some(Token::Ident(s)) => s.clone(),
            Some(Token::Keyword(Keyword::None)) => "none".to_string(),
            Some(Token::Keyword(Keyword::True)) => "true".to_string(),
            Some(Token::Keyword(Keyword::False)) => "false".to_string(),
            Some(Token::Keyword(Keyword::In)) => "in".to_string(),
            Some(Token::Eq) => "==".to_string(),
            Some(Token::Ne) => "!=".to_string(),
            Some(Token::Lt) => "<".to_string(),
            Some(Token::Le) => "<=".to_string(),
            Some(Token::Gt) => ">".to_string(),
            Some(Token::Ge) => ">=".to_string(),
            other => {
                return Err(self.err_here(format!(
                    "Expected test name, got {}",
                    Self::describe(other)
                )))
            }
        };
        self.pos += 1;
        Ok(name)
    }

    fn parse_concat(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_add()?;
        while self.eat(&Token::Tilde) {
            let right = self.parse_add()?;
            left = Expr::Binary {
                op: BinaryOp::Concat,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.peek() {
                Some(Token::Mul) => BinaryOp::Mul,
                Some(Token::Div) => BinaryOp::Div,
                Some(Token::FloorDiv) => BinaryOp::FloorDiv,
                Some(Token::Rem) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_pow()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_pow(&mut self) -> Result<Expr, TemplateError> {
        let left = self.parse_unary()?;
        if self.eat(&Token::Pow) {
            let right = self.parse_pow()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat(&Token::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        if self.eat(&Token::Plus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Pos,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                // `pair.0` is tuple style indexing, `pair.name` is member
                // access.
                if let Some(Token::Int(n)) = self.peek() {
                    let n = *n;
                    self.pos += 1;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(Expr::Const(Value::Int(n))),
                    };
                } else {
                    let name = self.expect_ident()?;
                    expr = Expr::Member {
                        base: Box::new(expr),
                        name,
                    };
                }
            } else if self.eat(&Token::BracketOpen) {
                expr = self.parse_index_or_slice(expr)?;
            } else if self.peek() == Some(&Token::ParenOpen) {
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else if self.eat(&Token::Pipe) {
                let name = self.expect_ident()?;
                let args = if self.peek() == Some(&Token::ParenOpen) {
                    self.parse_call_args()?
                } else {
                    CallArgs::default()
                };
                expr = Expr::Filter {
                    name,
                    base: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_index_or_slice(&mut self, base: Expr) -> Result<Expr, TemplateError> {
        let mut start = None;
        if self.peek() != Some(&Token::Colon) {
            let index = self.parse_expr()?;
            if self.eat(&Token::BracketClose) {
                return Ok(Expr::Index {
                    base: Box::new(base),
                    index: Box::new(index),
                });
            }
            start = Some(Box::new(index));
        }
        self.expect(&Token::Colon)?;
        let stop = match self.peek() {
            Some(Token::Colon) | Some(Token::BracketClose) => None,
            _ => Some(Box::new(self.parse_expr()?)),
        };
        let step = if self.eat(&Token::Colon) {
            match self.peek() {
                Some(Token::BracketClose) => None,
                _ => Some(Box::new(self.parse_expr()?)),
            }
        } else {
            None
        };
        self.expect(&Token::BracketClose)?;
        Ok(Expr::Slice {
            base: Box::new(base),
            start,
            stop,
            step,
        })
    }

    fn parse_call_args(&mut self) -> Result<CallArgs, TemplateError> {
        self.expect(&Token::ParenOpen)?;
        let mut out = CallArgs::default();
        loop {
            if self.eat(&Token::ParenClose) {
                return Ok(out);
            }
            let is_kwarg = matches!(self.peek(), Some(Token::Ident(_)))
                && self.peek2() == Some(&Token::Assign);
            if is_kwarg {
                let name = self.expect_ident()?;
                self.expect(&Token::Assign)?;
                out.kwargs.push((name, self.parse_expr()?));
            } else {
                out.args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::ParenClose)?;
                return Ok(out);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
        match self.next_token() {
            Some((Token::Int(n), _)) => Ok(Expr::Const(Value::Int(n))),
            Some((Token::Float(f), _)) => Ok(Expr::Const(Value::Float(f))),
            Some((Token::Str(s), _)) => Ok(Expr::Const(Value::string(s))),
            Some((Token::Keyword(Keyword::True), _)) => Ok(Expr::Const(Value::Bool(true))),
            Some((Token::Keyword(Keyword::False), _)) => Ok(Expr::Const(Value::Bool(false))),
            Some((Token::Keyword(Keyword::None), _)) => Ok(Expr::Const(Value::None)),
            Some((Token::Ident(name), _)) => Ok(Expr::Ident(name)),
            Some((Token::ParenOpen, _)) => {
                if self.eat(&Token::ParenClose) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::Comma) {
                    // Trailing comma turns a grouping into a tuple.
                    let mut items = vec![first];
                    while self.peek() != Some(&Token::ParenClose) {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::ParenClose)?;
                    return Ok(Expr::List(items));
                }
                self.expect(&Token::ParenClose)?;
                Ok(first)
            }
            Some((Token::BracketOpen, _)) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Token::BracketClose) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::BracketClose)?;
                Ok(Expr::List(items))
            }
            Some((Token::BraceOpen, _)) => {
                let mut pairs = Vec::new();
                while self.peek() != Some(&Token::BraceClose) {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon)?;
                    pairs.push((key, self.parse_expr()?));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::BraceClose)?;
                Ok(Expr::MapLit(pairs))
            }
            other => Err(self.err_here(format!(
                "Expected expression, got {}",
                Self::describe(other.as_ref().map(|(t, _)| t))
            ))),
        }
    }
}

#[cfg(test)]
fn parse_expr_text(source: &str) -> Expr {
    match parse(&format!("{{{{ {} }}}}", source)).unwrap().remove(0) {
        Stmt::Emit(expr) => expr,
        other => panic!("Expected an emit statement, got {:?}", other),
    }
}

#[test]
fn precedence_add_mul() {
    assert_eq!(
        parse_expr_text("1 + 2 * 3"),
        Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Const(Value::Int(1))),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(Expr::Const(Value::Int(2))),
                right: Box::new(Expr::Const(Value::Int(3))),
            }),
        }
    );
}

#[test]
fn power_is_right_associative() {
    assert_eq!(
        parse_expr_text("2 ** 3 ** 2"),
        Expr::Binary {
            op: BinaryOp::Pow,
            left: Box::new(Expr::Const(Value::Int(2))),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(Expr::Const(Value::Int(3))),
                right: Box::new(Expr::Const(Value::Int(2))),
            }),
        }
    );
}

#[test]
fn filters_chain_left_to_right() {
    let expr = parse_expr_text("'x'|upper|reverse");
    match expr {
        Expr::Filter { name, base, .. } => {
            assert_eq!(name, "reverse");
            assert!(matches!(*base, Expr::Filter { .. }));
        }
        other => panic!("Expected filter, got {:?}", other),
    }
}

#[test]
fn test_expression_with_args() {
    let expr = parse_expr_text("x is divisibleby(3)");
    match expr {
        Expr::Test {
            name,
            args,
            negated,
            ..
        } => {
            assert_eq!(name, "divisibleby");
            assert_eq!(args, vec![Expr::Const(Value::Int(3))]);
            assert!(!negated);
        }
        other => panic!("Expected test, got {:?}", other),
    }
}

#[test]
fn for_iterator_does_not_take_the_if() {
    let stmts = parse("{% for x in xs if x %}{{ x }}{% endfor %}").unwrap();
    match &stmts[0] {
        Stmt::For(f) => {
            assert_eq!(f.iter, Expr::Ident("xs".to_string()));
            assert_eq!(f.cond, Some(Expr::Ident("x".to_string())));
        }
        other => panic!("Expected for, got {:?}", other),
    }
}

#[test]
fn elif_chains_become_nested_ifs() {
    let stmts =
        parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}").unwrap();
    match &stmts[0] {
        Stmt::If { else_body, .. } => match &else_body[0] {
            Stmt::If { else_body, .. } => {
                assert_eq!(else_body[0], Stmt::Text("3".to_string()));
            }
            other => panic!("Expected nested if, got {:?}", other),
        },
        other => panic!("Expected if, got {:?}", other),
    }
}

#[test]
fn raw_blocks_swallow_tokens() {
    let stmts = parse("{% raw %}{{ x }}{% endraw %}").unwrap();
    assert_eq!(stmts, vec![Stmt::Text("{{x}}".to_string())]);
}

#[test]
fn unknown_statement_is_a_syntax_error() {
    match parse("{% flub %}") {
        Err(TemplateError::Syntax(msg)) => {
            assert!(msg.contains("Unknown block statement: flub"))
        }
        other => panic!("Expected a syntax error, got {:?}", other),
    }
}

#[test]
fn missing_end_tag_is_reported() {
    assert!(parse("{% if a %}x").is_err());
    assert!(parse("{{ a").is_err());
}

#[test]
fn conditional_expression_is_right_associative() {
    let expr = parse_expr_text("1 if a else 2 if b else 3");
    match expr {
        Expr::Cond { alternative, .. } => {
            assert!(matches!(alternative.as_deref(), Some(Expr::Cond { .. })));
        }
        other => panic!("Expected conditional, got {:?}", other),
    }
}

#[test]
fn not_in_wraps_a_membership_check() {
    let expr = parse_expr_text("x not in xs");
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => assert!(matches!(
            *expr,
            Expr::Binary {
                op: BinaryOp::In,
                ..
            }
        )),
        other => panic!("Expected negated membership, got {:?}", other),
    }
}

#[test]
fn is_not_negates_the_test() {
    match parse_expr_text("x is not none") {
        Expr::Test { name, negated, .. } => {
            assert_eq!(name, "none");
            assert!(negated);
        }
        other => panic!("Expected test, got {:?}", other),
    }
}

#[test]
fn bare_test_argument() {
    match parse_expr_text("x is divisibleby 3") {
        Expr::Test { name, args, .. } => {
            assert_eq!(name, "divisibleby");
            assert_eq!(args, vec![Expr::Const(Value::Int(3))]);
        }
        other => panic!("Expected test, got {:?}", other),
    }
}

#[test]
fn call_arguments_split_into_positional_and_keyword() {
    match parse_expr_text("f(1, x, k=2, l='s')") {
        Expr::Call { args, .. } => {
            assert_eq!(args.args.len(), 2);
            assert_eq!(args.kwargs.len(), 2);
            assert_eq!(args.kwargs[0].0, "k");
            assert_eq!(args.kwargs[1].0, "l");
        }
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn slices_allow_omitted_bounds() {
    match parse_expr_text("xs[::2]") {
        Expr::Slice {
            start, stop, step, ..
        } => {
            assert!(start.is_none());
            assert!(stop.is_none());
            assert_eq!(step.as_deref(), Some(&Expr::Const(Value::Int(2))));
        }
        other => panic!("Expected slice, got {:?}", other),
    }
    assert!(matches!(parse_expr_text("xs[1]"), Expr::Index { .. }));
    assert!(matches!(parse_expr_text("xs.0"), Expr::Index { .. }));
}

#[test]
fn dict_and_tuple_literals() {
    match parse_expr_text("{'a': 1, 'b': 2}") {
        Expr::MapLit(pairs) => assert_eq!(pairs.len(), 2),
        other => panic!("Expected map literal, got {:?}", other),
    }
    match parse_expr_text("(1, 2)") {
        Expr::List(items) => assert_eq!(items.len(), 2),
        other => panic!("Expected tuple, got {:?}", other),
    }
    assert_eq!(parse_expr_text("(1)"), Expr::Const(Value::Int(1)));
}

#[test]
fn set_statement_shapes() {
    match &parse("{% set a = 1 %}").unwrap()[0] {
        Stmt::Set { name, attr, .. } => {
            assert_eq!(name, "a");
            assert!(attr.is_none());
        }
        other => panic!("Expected set, got {:?}", other),
    }
    match &parse("{% set ns.count = 1 %}").unwrap()[0] {
        Stmt::Set { name, attr, .. } => {
            assert_eq!(name, "ns");
            assert_eq!(attr.as_deref(), Some("count"));
        }
        other => panic!("Expected set, got {:?}", other),
    }
}

#[test]
fn macro_signature_with_defaults() {
    match &parse("{% macro m(a, b='x') %}{% endmacro %}").unwrap()[0] {
        Stmt::Macro(decl) => {
            assert_eq!(decl.name, "m");
            assert_eq!(decl.params.len(), 2);
            assert!(decl.params[0].default.is_none());
            assert!(decl.params[1].default.is_some());
        }
        other => panic!("Expected macro, got {:?}", other),
    }
}

#[test]
fn call_block_with_params() {
    match &parse("{% call(a, b) m(1) %}x{% endcall %}").unwrap()[0] {
        Stmt::CallBlock(cb) => {
            assert_eq!(cb.params, vec!["a".to_string(), "b".to_string()]);
            assert!(matches!(cb.call, Expr::Call { .. }));
        }
        other => panic!("Expected call block, got {:?}", other),
    }
}

#[test]
fn include_and_import_forms() {
    match &parse("{% include name ignore missing %}").unwrap()[0] {
        Stmt::Include { ignore_missing, .. } => assert!(*ignore_missing),
        other => panic!("Expected include, got {:?}", other),
    }
    match &parse("{% import 'a' as b %}").unwrap()[0] {
        Stmt::Import { alias, .. } => assert_eq!(alias, "b"),
        other => panic!("Expected import, got {:?}", other),
    }
    match &parse("{% from 'a' import x, y as z %}").unwrap()[0] {
        Stmt::FromImport { names, .. } => {
            assert_eq!(names[0], ("x".to_string(), None));
            assert_eq!(names[1], ("y".to_string(), Some("z".to_string())));
        }
        other => panic!("Expected from import, got {:?}", other),
    }
}

#[test]
fn for_with_recursive_marker_and_tuple_target() {
    match &parse("{% for k, v in xs recursive %}{% endfor %}").unwrap()[0] {
        Stmt::For(f) => {
            assert_eq!(f.targets, vec!["k".to_string(), "v".to_string()]);
            assert!(f.recursive);
        }
        other => panic!("Expected for, got {:?}", other),
    }
}

#[test]
fn errors_carry_positions() {
    match parse("{{ 1 + }}") {
        Err(TemplateError::Syntax(msg)) => assert!(msg.starts_with("1:")),
        other => panic!("Expected syntax error, got {:?}", other),
    }
}
