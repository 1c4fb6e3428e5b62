use crate::ast::*;
use crate::lexer::{IntLit, Token};

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse a lexed token stream into a program.
pub fn parse(tokens: Vec<(Token, std::ops::Range<usize>)>) -> Result<Program> {
    let tokens = tokens
        .into_iter()
        .map(|(t, r)| (t, Span { start: r.start, end: r.end }))
        .collect();
    let mut parser = Parser::new(tokens);
    let body = parser.parse_program()?;
    Ok(Program { body, source: None })
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| self.prev_span())
    }

    /// Span of the previously consumed token.
    fn prev_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].1
        } else {
            Span::UNKNOWN
        }
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("TQ-P003", format!("expected {:?}, got {:?}", expected, tok))),
            None => Err(self.error("TQ-P004", format!("expected {:?}, got EOF", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error("TQ-P005", format!("expected identifier, got {:?}", tok))),
            None => Err(self.error("TQ-P006", "expected identifier, got EOF".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn spanned<T>(&self, node: T, start: Span) -> Spanned<T> {
        Spanned::new(node, start.merge(self.prev_span()))
    }

    /// Tokens that close a sequence. None of them can start a sentence.
    fn at_seq_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::End)
                | Some(Token::Else)
                | Some(Token::ElseIf)
                | Some(Token::Catch)
                | Some(Token::Finally)
                | Some(Token::Of)
                | Some(Token::Handle)
        )
    }

    // ---- Top-level parsing ----

    pub fn parse_program(&mut self) -> Result<Seq> {
        let body = self.parse_seq()?;
        match self.peek() {
            None => Ok(body),
            Some(tok) => Err(self.error("TQ-P008", format!("unexpected {:?} at top level", tok))),
        }
    }

    fn parse_seq(&mut self) -> Result<Seq> {
        let mut seq = Vec::new();
        while !self.at_seq_end() {
            seq.push(self.parse_sntc()?);
        }
        Ok(seq)
    }

    fn parse_sntc(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        if self.peek() == Some(&Token::Var) {
            return self.parse_var();
        }
        let left = self.parse_expr()?;
        if self.eat(&Token::Assign) {
            let right = self.parse_expr()?;
            let node = SntcOrExpr::Unify { left: Box::new(left), right: Box::new(right) };
            return Ok(self.spanned(node, start));
        }
        if self.eat(&Token::ColonEq) {
            let value = self.parse_expr()?;
            let node = SntcOrExpr::SetCell { cell: Box::new(left), value: Box::new(value) };
            return Ok(self.spanned(node, start));
        }
        Ok(left)
    }

    /// `var a = 1, b`
    fn parse_var(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Var)?;
        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.eat(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            decls.push(VarDecl { name, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(self.spanned(SntcOrExpr::Var(decls), start))
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = self.spanned(binop(BinOp::Or, left, right), start);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let mut left = self.parse_rel()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_rel()?;
            left = self.spanned(binop(BinOp::And, left, right), start);
        }
        Ok(left)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let left = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Equals,
            Some(Token::NotEq) => BinOp::NotEquals,
            Some(Token::Less) => BinOp::LessThan,
            Some(Token::LessEq) => BinOp::LessOrEqual,
            Some(Token::Greater) => BinOp::GreaterThan,
            Some(Token::GreaterEq) => BinOp::GreaterOrEqual,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_sum()?;
        Ok(self.spanned(binop(op, left, right), start))
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let mut left = self.parse_prod()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Subtract,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_prod()?;
            left = self.spanned(binop(op, left, right), start);
        }
    }

    fn parse_prod(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Multiply,
                Some(Token::Slash) => BinOp::Divide,
                Some(Token::Percent) => BinOp::Modulo,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.spanned(binop(op, left, right), start);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                // Fold negative numeric literals so `-1` stays a literal
                let node = match operand.node {
                    SntcOrExpr::Lit(lit) if negate_literal(&lit).is_some() => {
                        SntcOrExpr::Lit(negate_literal(&lit).unwrap_or(lit))
                    }
                    other => SntcOrExpr::UnaryOp {
                        op: UnaryOp::Negate,
                        operand: Box::new(Spanned::new(other, operand.span)),
                    },
                };
                Ok(self.spanned(node, start))
            }
            Some(Token::Bang) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.spanned(
                    SntcOrExpr::UnaryOp { op: UnaryOp::Not, operand: Box::new(operand) },
                    start,
                ))
            }
            Some(Token::At) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.spanned(SntcOrExpr::CellGet(Box::new(operand)), start))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name_span = self.peek_span();
                    let name = self.expect_name()?;
                    if self.peek() == Some(&Token::LParen) {
                        let args = self.parse_args()?;
                        expr = self.spanned(
                            SntcOrExpr::SelectApply { rec: Box::new(expr), name, args },
                            start,
                        );
                    } else {
                        let feature = Spanned::new(SntcOrExpr::Lit(Literal::Str(name)), name_span);
                        expr = self.spanned(
                            SntcOrExpr::Select { rec: Box::new(expr), feature: Box::new(feature) },
                            start,
                        );
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let feature = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = self.spanned(
                        SntcOrExpr::Select { rec: Box::new(expr), feature: Box::new(feature) },
                        start,
                    );
                }
                Some(Token::LParen) => {
                    let args = self.parse_args()?;
                    expr = self.spanned(SntcOrExpr::Apply { proc: Box::new(expr), args }, start);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Field names after `.`; `ask` and `tell` are keywords elsewhere.
    fn expect_name(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Ask) => {
                self.advance();
                Ok("ask".to_string())
            }
            Some(Token::Tell) => {
                self.advance();
                Ok("tell".to_string())
            }
            _ => self.expect_ident(),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            if !args.is_empty() {
                self.expect(&Token::Comma)?;
            }
            args.push(self.parse_expr()?);
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_literal(&mut self) -> Option<Literal> {
        let lit = match self.peek()? {
            Token::Int(IntLit::Int32(n)) => Literal::Int32(*n),
            Token::Int(IntLit::Int64(n)) => Literal::Int64(*n),
            Token::Long(n) => Literal::Int64(*n),
            Token::Float(f) => Literal::Flt64(*f),
            Token::Float32(f) => Literal::Flt32(*f),
            Token::Decimal(d) => Literal::Dec128(*d),
            Token::Char(c) => Literal::Char(*c),
            Token::Str(s) => Literal::Str(s.clone()),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            Token::Eof => Literal::Eof,
            _ => return None,
        };
        self.advance();
        Some(lit)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        if let Some(lit) = self.parse_literal() {
            let expr = self.spanned(SntcOrExpr::Lit(lit), start);
            return self.parse_labeled(expr, start);
        }
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                let expr = self.spanned(SntcOrExpr::Ident(name), start);
                self.parse_labeled(expr, start)
            }
            Some(Token::LBrace) => self.parse_rec(None, start),
            Some(Token::LBracket) => self.parse_tuple(None, start),
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Begin) => {
                self.advance();
                let body = self.parse_seq()?;
                self.expect(&Token::End)?;
                Ok(self.spanned(SntcOrExpr::Begin(body), start))
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::Case) => self.parse_case(),
            Some(Token::While) => self.parse_while(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Try) => self.parse_try(),
            Some(Token::Func) => self.parse_func(true),
            Some(Token::Proc) => self.parse_func(false),
            Some(Token::Actor) => self.parse_actor(),
            Some(Token::Return) => {
                self.advance();
                let value = if self.at_seq_end() {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                Ok(self.spanned(SntcOrExpr::Return(value), start))
            }
            Some(Token::Break) => {
                self.advance();
                Ok(self.spanned(SntcOrExpr::Break, start))
            }
            Some(Token::Continue) => {
                self.advance();
                Ok(self.spanned(SntcOrExpr::Continue, start))
            }
            Some(Token::Skip) => {
                self.advance();
                Ok(self.spanned(SntcOrExpr::Skip, start))
            }
            Some(Token::Throw) => {
                self.advance();
                let value = self.parse_expr()?;
                Ok(self.spanned(SntcOrExpr::Throw(Box::new(value)), start))
            }
            Some(tok) => Err(self.error("TQ-P001", format!("expected expression, got {:?}", tok))),
            None => Err(self.error("TQ-P002", "expected expression, got EOF".into())),
        }
    }

    /// `label#{...}` / `label#[...]` after a literal or identifier label.
    fn parse_labeled(&mut self, label: Expr, start: Span) -> Result<Expr> {
        if !self.eat(&Token::Hash) {
            return Ok(label);
        }
        match self.peek() {
            Some(Token::LBrace) => self.parse_rec(Some(label), start),
            Some(Token::LBracket) => self.parse_tuple(Some(label), start),
            Some(tok) => Err(self.error("TQ-P003", format!("expected '{{' or '[' after '#', got {:?}", tok))),
            None => Err(self.error("TQ-P004", "expected '{' or '[' after '#', got EOF".into())),
        }
    }

    fn parse_rec(&mut self, label: Option<Expr>, start: Span) -> Result<Expr> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if !fields.is_empty() {
                self.expect(&Token::Comma)?;
            }
            let feature = self.parse_expr()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expr()?;
            fields.push((feature, value));
        }
        self.expect(&Token::RBrace)?;
        Ok(self.spanned(SntcOrExpr::Rec { label: label.map(Box::new), fields }, start))
    }

    fn parse_tuple(&mut self, label: Option<Expr>, start: Span) -> Result<Expr> {
        self.expect(&Token::LBracket)?;
        let mut values = Vec::new();
        while self.peek() != Some(&Token::RBracket) {
            if !values.is_empty() {
                self.expect(&Token::Comma)?;
            }
            values.push(self.parse_expr()?);
        }
        self.expect(&Token::RBracket)?;
        Ok(self.spanned(SntcOrExpr::Tuple { label: label.map(Box::new), values }, start))
    }

    // ---- Control flow ----

    /// `if c then a elseif d then b else e end`
    fn parse_if(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::If)?;
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(&Token::Then)?;
        branches.push((cond, self.parse_seq()?));
        while self.eat(&Token::ElseIf) {
            let cond = self.parse_expr()?;
            self.expect(&Token::Then)?;
            branches.push((cond, self.parse_seq()?));
        }
        let otherwise = if self.eat(&Token::Else) { Some(self.parse_seq()?) } else { None };
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::If { branches, otherwise }, start))
    }

    /// `case x of p1 then a of p2 when g then b else c end`
    fn parse_case(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Case)?;
        let arg = self.parse_expr()?;
        let mut clauses = Vec::new();
        while self.eat(&Token::Of) {
            let pat = self.parse_pat()?;
            let guard = if self.eat(&Token::When) { Some(self.parse_expr()?) } else { None };
            self.expect(&Token::Then)?;
            let body = self.parse_seq()?;
            clauses.push(CaseClause { pat, guard, body });
        }
        if clauses.is_empty() {
            return Err(self.error("TQ-P009", "case requires at least one 'of' clause".into()));
        }
        let otherwise = if self.eat(&Token::Else) { Some(self.parse_seq()?) } else { None };
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::Case { arg: Box::new(arg), clauses, otherwise }, start))
    }

    fn parse_while(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::While)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::Do)?;
        let body = self.parse_seq()?;
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::While { cond: Box::new(cond), body }, start))
    }

    fn parse_for(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::For)?;
        let name = self.expect_ident()?;
        self.expect(&Token::In)?;
        let iter = self.parse_expr()?;
        self.expect(&Token::Do)?;
        let body = self.parse_seq()?;
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::For { name, iter: Box::new(iter), body }, start))
    }

    /// `try body catch p then a finally f end`
    fn parse_try(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Try)?;
        let body = self.parse_seq()?;
        let mut catches = Vec::new();
        while self.eat(&Token::Catch) {
            let pat = self.parse_pat()?;
            let guard = if self.eat(&Token::When) { Some(self.parse_expr()?) } else { None };
            self.expect(&Token::Then)?;
            let body = self.parse_seq()?;
            catches.push(CaseClause { pat, guard, body });
        }
        let finally = if self.eat(&Token::Finally) { Some(self.parse_seq()?) } else { None };
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::Try { body, catches, finally }, start))
    }

    fn parse_params(&mut self) -> Result<Vec<String>> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            if !params.is_empty() {
                self.expect(&Token::Comma)?;
            }
            params.push(self.expect_ident()?);
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    /// `func name(a, b) in body end` (or `proc`)
    fn parse_func(&mut self, is_func: bool) -> Result<Expr> {
        let start = self.peek_span();
        self.advance();
        let name = match self.peek() {
            Some(Token::Ident(_)) => Some(self.expect_ident()?),
            _ => None,
        };
        let params = self.parse_params()?;
        self.expect(&Token::In)?;
        let body = self.parse_seq()?;
        self.expect(&Token::End)?;
        let node = if is_func {
            SntcOrExpr::Func { name, params, body }
        } else {
            SntcOrExpr::Proc { name, params, body }
        };
        Ok(self.spanned(node, start))
    }

    /// `actor Name(params) in sentences and handlers end`
    fn parse_actor(&mut self) -> Result<Expr> {
        let start = self.expect(&Token::Actor)?;
        let name = self.expect_ident()?;
        let params = self.parse_params()?;
        self.expect(&Token::In)?;
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Some(Token::End) => break,
                Some(Token::Handle) => body.push(self.parse_handler()?),
                None => return Err(self.error("TQ-P004", "expected End, got EOF".into())),
                _ => body.push(ActorItem::Sntc(self.parse_sntc()?)),
            }
        }
        self.expect(&Token::End)?;
        Ok(self.spanned(SntcOrExpr::Actor { name, params, body }, start))
    }

    /// `handle ask p when g in body end`
    fn parse_handler(&mut self) -> Result<ActorItem> {
        self.expect(&Token::Handle)?;
        let kind = match self.peek() {
            Some(Token::Ask) => HandlerKind::Ask,
            Some(Token::Tell) => HandlerKind::Tell,
            Some(tok) => {
                return Err(self.error("TQ-P003", format!("expected 'ask' or 'tell', got {:?}", tok)));
            }
            None => return Err(self.error("TQ-P004", "expected 'ask' or 'tell', got EOF".into())),
        };
        self.advance();
        let pat = self.parse_pat()?;
        let guard = if self.eat(&Token::When) { Some(self.parse_expr()?) } else { None };
        self.expect(&Token::In)?;
        let body = self.parse_seq()?;
        self.expect(&Token::End)?;
        Ok(ActorItem::Handler { kind, clause: CaseClause { pat, guard, body } })
    }

    // ---- Patterns ----

    pub fn parse_pat(&mut self) -> Result<Spanned<Pat>> {
        let start = self.peek_span();
        if self.eat(&Token::Minus) {
            let lit = self.parse_literal().and_then(|l| negate_literal(&l));
            return match lit {
                Some(lit) => Ok(self.spanned(Pat::Lit(lit), start)),
                None => Err(self.error("TQ-P007", "expected a number after '-' in pattern".into())),
            };
        }
        if let Some(lit) = self.parse_literal() {
            let pat = self.spanned(Pat::Lit(lit), start);
            return self.parse_labeled_pat(pat, start);
        }
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                let pat = self.spanned(Pat::Ident(name), start);
                self.parse_labeled_pat(pat, start)
            }
            Some(Token::Tilde) => {
                self.advance();
                let name = self.expect_ident()?;
                let pat = self.spanned(Pat::Escaped(name), start);
                self.parse_labeled_pat(pat, start)
            }
            Some(Token::Wildcard) => {
                self.advance();
                Ok(self.spanned(Pat::Wildcard, start))
            }
            Some(Token::LBrace) => self.parse_rec_pat(None, start),
            Some(Token::LBracket) => self.parse_tuple_pat(None, start),
            Some(tok) => Err(self.error("TQ-P007", format!("expected pattern, got {:?}", tok))),
            None => Err(self.error("TQ-P007", "expected pattern, got EOF".into())),
        }
    }

    fn parse_labeled_pat(&mut self, label: Spanned<Pat>, start: Span) -> Result<Spanned<Pat>> {
        if !self.eat(&Token::Hash) {
            return Ok(label);
        }
        match self.peek() {
            Some(Token::LBrace) => self.parse_rec_pat(Some(label), start),
            Some(Token::LBracket) => self.parse_tuple_pat(Some(label), start),
            Some(tok) => Err(self.error("TQ-P003", format!("expected '{{' or '[' after '#', got {:?}", tok))),
            None => Err(self.error("TQ-P004", "expected '{' or '[' after '#', got EOF".into())),
        }
    }

    /// Consumes `...}` or `}` at the end of a record or tuple pattern.
    fn parse_pat_close(&mut self, close: &Token) -> Result<bool> {
        let partial = self.eat(&Token::Ellipsis);
        self.expect(close)?;
        Ok(partial)
    }

    fn parse_rec_pat(&mut self, label: Option<Spanned<Pat>>, start: Span) -> Result<Spanned<Pat>> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        let partial = loop {
            if matches!(self.peek(), Some(Token::RBrace) | Some(Token::Ellipsis)) {
                break self.parse_pat_close(&Token::RBrace)?;
            }
            if !fields.is_empty() {
                self.expect(&Token::Comma)?;
                if matches!(self.peek(), Some(Token::Ellipsis)) {
                    break self.parse_pat_close(&Token::RBrace)?;
                }
            }
            let feature = self.parse_pat()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_pat()?;
            fields.push((feature, value));
        };
        Ok(self.spanned(Pat::Rec { label: label.map(Box::new), fields, partial }, start))
    }

    fn parse_tuple_pat(&mut self, label: Option<Spanned<Pat>>, start: Span) -> Result<Spanned<Pat>> {
        self.expect(&Token::LBracket)?;
        let mut values = Vec::new();
        let partial = loop {
            if matches!(self.peek(), Some(Token::RBracket) | Some(Token::Ellipsis)) {
                break self.parse_pat_close(&Token::RBracket)?;
            }
            if !values.is_empty() {
                self.expect(&Token::Comma)?;
                if matches!(self.peek(), Some(Token::Ellipsis)) {
                    break self.parse_pat_close(&Token::RBracket)?;
                }
            }
            values.push(self.parse_pat()?);
        };
        Ok(self.spanned(Pat::Tuple { label: label.map(Box::new), values, partial }, start))
    }
}

fn binop(op: BinOp, left: Expr, right: Expr) -> SntcOrExpr {
    SntcOrExpr::BinOp { op, left: Box::new(left), right: Box::new(right) }
}

fn negate_literal(lit: &Literal) -> Option<Literal> {
    match lit {
        Literal::Int32(n) => Some(match n.checked_neg() {
            Some(m) => Literal::Int32(m),
            None => Literal::Int64(-(*n as i64)),
        }),
        Literal::Int64(n) => n.checked_neg().map(Literal::Int64),
        Literal::Flt32(f) => Some(Literal::Flt32(-f)),
        Literal::Flt64(f) => Some(Literal::Flt64(-f)),
        Literal::Dec128(d) => Some(Literal::Dec128(-*d)),
        _ => None,
    }
}
