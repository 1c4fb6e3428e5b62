//! Generator: lowers the surface AST into kernel statements.
//!
//! Every expression is compiled against a [`Target`], the identifier that
//! receives its value. Compound operands get fresh `$v<n>` temporaries
//! wrapped in a `local`; literals and identifiers are used in place.
//! Structured control flow becomes procs plus `$jump_throw`/`$jump_catch`.

use std::sync::Arc;

use crate::ast::{self, ActorItem, BinOp, CaseClause, Expr, HandlerKind, Literal, SntcOrExpr, Span, UnaryOp};
use crate::kernel::{Arg, BinPrim, Ident, Lit, Pat, ProcDef, Stmt};

pub mod pattern;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("A pattern feature must be a literal or an escaped identifier")]
    InvalidPatternFeature { span: Span },

    #[error("A pattern label must be a literal or an escaped identifier")]
    InvalidPatternLabel { span: Span },

    #[error("'break' used outside of a loop")]
    BreakOutsideLoop { span: Span },

    #[error("'continue' used outside of a loop")]
    ContinueOutsideLoop { span: Span },

    #[error("'return' used outside of a function")]
    ReturnOutsideFunc { span: Span },

    #[error("a proc cannot return a value")]
    ReturnValueInProc { span: Span },
}

impl GenError {
    pub fn code(&self) -> &'static str {
        match self {
            GenError::InvalidPatternFeature { .. } => "TQ-G001",
            GenError::InvalidPatternLabel { .. } => "TQ-G002",
            GenError::BreakOutsideLoop { .. } => "TQ-G003",
            GenError::ContinueOutsideLoop { .. } => "TQ-G004",
            GenError::ReturnOutsideFunc { .. } => "TQ-G005",
            GenError::ReturnValueInProc { .. } => "TQ-G006",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            GenError::InvalidPatternFeature { span }
            | GenError::InvalidPatternLabel { span }
            | GenError::BreakOutsideLoop { span }
            | GenError::ContinueOutsideLoop { span }
            | GenError::ReturnOutsideFunc { span }
            | GenError::ReturnValueInProc { span } => *span,
        }
    }
}

type Result<T> = std::result::Result<T, GenError>;

/// Fresh-name counter shared by temporaries, anonymous pattern slots and
/// jump labels, so every generated name in a unit is distinct.
#[derive(Debug, Default)]
pub struct Names {
    next: u32,
}

impl Names {
    /// `$v<n>`
    pub fn fresh(&mut self) -> Ident {
        let n = self.bump();
        Ident::new(&format!("$v{n}"))
    }

    /// `$a<n>`
    pub fn anon(&mut self) -> Ident {
        let n = self.bump();
        Ident::new(&format!("$a{n}"))
    }

    pub fn label(&mut self) -> u32 {
        self.bump()
    }

    fn bump(&mut self) -> u32 {
        let n = self.next;
        self.next += 1;
        n
    }
}

/// Where a compiled expression delivers its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Ident(Ident),
    Discard,
}

/// Lexical context consulted by `return`, `break` and `continue`.
#[derive(Debug)]
enum JumpFrame {
    Func { label: Option<u32>, result: bool, alias: Option<Ident> },
    /// Actor initializer: no jumps may cross it.
    Barrier,
    Loop { brk: Option<u32>, cont: Option<u32> },
    Finally(Ident),
    /// A generated proc whose own `$r` hides the function result.
    Shadow,
}

/// What runs when no alternative of a case matches.
enum Fallback<'a> {
    Skip,
    Seq(&'a [Expr]),
    Rethrow(Ident),
    NotHandled(&'static str),
}

/// Temporaries and setup statements gathered for one primitive.
#[derive(Default)]
struct Emit {
    locals: Vec<Ident>,
    pre: Vec<Stmt>,
}

impl Emit {
    fn finish(mut self, last: Stmt) -> Stmt {
        self.pre.push(last);
        Stmt::local(self.locals, Stmt::seq(self.pre))
    }
}

/// Compile a whole program; its final value goes to `target`.
pub fn generate(program: &ast::Program, target: &Target) -> Result<Stmt> {
    Generator::new().compile_seq(&program.body, target)
}

pub(crate) fn lower_literal(lit: &Literal) -> Lit {
    match lit {
        Literal::Bool(b) => Lit::Bool(*b),
        Literal::Int32(n) => Lit::Int32(*n),
        Literal::Int64(n) => Lit::Int64(*n),
        Literal::Flt32(f) => Lit::Flt32(*f),
        Literal::Flt64(f) => Lit::Flt64(*f),
        Literal::Dec128(d) => Lit::Dec128(*d),
        Literal::Char(c) => Lit::Char(*c),
        Literal::Str(s) => Lit::str(s),
        Literal::Null => Lit::Null,
        Literal::Eof => Lit::Eof,
    }
}

/// The strict primitive for an operator; `None` for the short-circuit
/// operators, which compile to `if` trees.
fn prim_of(op: BinOp) -> Option<BinPrim> {
    Some(match op {
        BinOp::Add => BinPrim::Add,
        BinOp::Subtract => BinPrim::Sub,
        BinOp::Multiply => BinPrim::Mult,
        BinOp::Divide => BinPrim::Div,
        BinOp::Modulo => BinPrim::Mod,
        BinOp::Equals => BinPrim::Eq,
        BinOp::NotEquals => BinPrim::Ne,
        BinOp::GreaterThan => BinPrim::Gt,
        BinOp::LessThan => BinPrim::Lt,
        BinOp::GreaterOrEqual => BinPrim::Ge,
        BinOp::LessOrEqual => BinPrim::Le,
        BinOp::And | BinOp::Or => return None,
    })
}

/// Names a sequence introduces: `var` declarations and named
/// `func`/`proc`/`actor` sentences.
fn declared_names(seq: &[Expr]) -> Vec<Ident> {
    let mut names: Vec<Ident> = Vec::new();
    let mut add = |name: &str| {
        let ident = Ident::new(name);
        if !names.contains(&ident) {
            names.push(ident);
        }
    };
    for expr in seq {
        match &expr.node {
            SntcOrExpr::Var(decls) => decls.iter().for_each(|d| add(&d.name)),
            SntcOrExpr::Func { name: Some(name), .. }
            | SntcOrExpr::Proc { name: Some(name), .. }
            | SntcOrExpr::Actor { name, .. } => add(name),
            _ => {}
        }
    }
    names
}

fn call(proc: &Ident, target: &Target) -> Stmt {
    let args = match target {
        Target::Ident(t) => vec![Arg::Ident(t.clone())],
        Target::Discard => Vec::new(),
    };
    Stmt::apply(proc.clone(), args)
}

/// Appends the return label catch and the shadowed-result alias, if used.
fn close_func(body: Stmt, frame: Option<JumpFrame>) -> Stmt {
    let Some(JumpFrame::Func { label, alias, .. }) = frame else {
        return body;
    };
    let body = match label {
        Some(label) => Stmt::seq(vec![body, Stmt::JumpCatch(label)]),
        None => body,
    };
    match alias {
        Some(alias) => Stmt::local(
            vec![alias.clone()],
            Stmt::seq(vec![Stmt::bind(Ident::result(), alias), body]),
        ),
        None => body,
    }
}

pub struct Generator {
    names: Names,
    frames: Vec<JumpFrame>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    pub fn new() -> Self {
        Generator { names: Names::default(), frames: Vec::new() }
    }

    /// Compile a sequence inside one `local` for everything it declares.
    pub fn compile_seq(&mut self, seq: &[Expr], target: &Target) -> Result<Stmt> {
        let declared = declared_names(seq);
        let body = self.compile_sntcs(seq, target)?;
        Ok(Stmt::local(declared, body))
    }

    /// Only the last sentence delivers to `target`.
    fn compile_sntcs(&mut self, seq: &[Expr], target: &Target) -> Result<Stmt> {
        let mut stmts = Vec::with_capacity(seq.len());
        for (i, expr) in seq.iter().enumerate() {
            if i + 1 == seq.len() {
                stmts.push(self.compile(expr, target)?);
            } else {
                stmts.push(self.compile(expr, &Target::Discard)?);
            }
        }
        Ok(Stmt::seq(stmts))
    }

    pub fn compile(&mut self, expr: &Expr, target: &Target) -> Result<Stmt> {
        match &expr.node {
            SntcOrExpr::Lit(lit) => Ok(match target {
                Target::Ident(t) => Stmt::bind(lower_literal(lit), t.clone()),
                Target::Discard => Stmt::Skip,
            }),

            SntcOrExpr::Ident(name) => Ok(match target {
                Target::Ident(t) => Stmt::bind(Ident::new(name), t.clone()),
                Target::Discard => Stmt::Skip,
            }),

            SntcOrExpr::Rec { label, fields } => {
                let mut emit = Emit::default();
                let label = match label {
                    Some(label) => Some(self.operand(label, &mut emit)?),
                    None => None,
                };
                let mut args = Vec::with_capacity(fields.len());
                for (feature, value) in fields {
                    let feature = self.operand(feature, &mut emit)?;
                    let value = self.operand(value, &mut emit)?;
                    args.push((feature, value));
                }
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::CreateRec { label, fields: args, target }))
            }

            SntcOrExpr::Tuple { label, values } => {
                let mut emit = Emit::default();
                let label = match label {
                    Some(label) => Some(self.operand(label, &mut emit)?),
                    None => None,
                };
                let values = self.operands(values, &mut emit)?;
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::CreateTuple { label, values, target }))
            }

            SntcOrExpr::BinOp { op, left, right } => match prim_of(*op) {
                Some(op) => {
                    let mut emit = Emit::default();
                    let left = self.operand(left, &mut emit)?;
                    let right = self.operand(right, &mut emit)?;
                    let target = self.target(target, &mut emit);
                    Ok(emit.finish(Stmt::BinOp { op, left, right, target }))
                }
                None => self.compile_and_or(*op == BinOp::And, left, right, target),
            },

            SntcOrExpr::UnaryOp { op: UnaryOp::Not, operand } => {
                let mut emit = Emit::default();
                let cond = self.operand(operand, &mut emit)?;
                let stmt = match target {
                    Target::Ident(t) => Stmt::if_else(
                        cond,
                        Stmt::bind(Lit::Bool(false), t.clone()),
                        Stmt::bind(Lit::Bool(true), t.clone()),
                    ),
                    Target::Discard => Stmt::Skip,
                };
                Ok(emit.finish(stmt))
            }
            SntcOrExpr::UnaryOp { op: UnaryOp::Negate, operand } => {
                let mut emit = Emit::default();
                let arg = self.operand(operand, &mut emit)?;
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::Negate { arg, target }))
            }

            SntcOrExpr::CellGet(cell) => {
                let mut emit = Emit::default();
                let cell = self.operand(cell, &mut emit)?;
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::Get { cell, target }))
            }

            SntcOrExpr::Select { rec, feature } => {
                let mut emit = Emit::default();
                let rec = self.operand(rec, &mut emit)?;
                let feature = self.operand(feature, &mut emit)?;
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::Select { rec, feature, target }))
            }

            SntcOrExpr::Apply { proc, args } => {
                let mut emit = Emit::default();
                let proc = self.operand(proc, &mut emit)?;
                let mut args = self.operands(args, &mut emit)?;
                if let Target::Ident(t) = target {
                    args.push(Arg::Ident(t.clone()));
                }
                Ok(emit.finish(Stmt::Apply { proc, args }))
            }

            SntcOrExpr::SelectApply { rec, name, args } => {
                self.compile_select_apply(rec, name, args, target)
            }

            SntcOrExpr::Var(decls) => {
                let mut stmts = Vec::new();
                for decl in decls {
                    if let Some(value) = &decl.value {
                        stmts.push(self.compile(value, &Target::Ident(Ident::new(&decl.name)))?);
                    }
                }
                Ok(Stmt::seq(stmts))
            }

            SntcOrExpr::Unify { left, right } => match (&left.node, &right.node) {
                (SntcOrExpr::Ident(name), _) => self.compile(right, &Target::Ident(Ident::new(name))),
                (_, SntcOrExpr::Ident(name)) => self.compile(left, &Target::Ident(Ident::new(name))),
                _ => {
                    let temp = self.names.fresh();
                    let left = self.compile(left, &Target::Ident(temp.clone()))?;
                    let right = self.compile(right, &Target::Ident(temp.clone()))?;
                    Ok(Stmt::local(vec![temp], Stmt::seq(vec![left, right])))
                }
            },

            SntcOrExpr::SetCell { cell, value } => {
                let mut emit = Emit::default();
                let cell = self.operand(cell, &mut emit)?;
                let value = self.operand(value, &mut emit)?;
                Ok(emit.finish(Stmt::Set { cell, value }))
            }

            SntcOrExpr::Func { name, params, body } => {
                self.compile_func(name.as_deref(), params, body, true, target)
            }
            SntcOrExpr::Proc { name, params, body } => {
                self.compile_func(name.as_deref(), params, body, false, target)
            }

            SntcOrExpr::Begin(seq) => self.compile_seq(seq, target),

            SntcOrExpr::If { branches, otherwise } => {
                self.compile_if(branches, otherwise.as_deref(), target)
            }

            SntcOrExpr::Case { arg, clauses, otherwise } => {
                let mut emit = Emit::default();
                let arg = self.operand(arg, &mut emit)?;
                let fallback = match otherwise {
                    Some(seq) => Fallback::Seq(seq),
                    None => Fallback::Skip,
                };
                let stmt = self.compile_alts(&arg, clauses, &fallback, target)?;
                Ok(emit.finish(stmt))
            }

            SntcOrExpr::While { cond, body } => self.compile_while(cond, body),
            SntcOrExpr::For { name, iter, body } => self.compile_for(name, iter, body),

            SntcOrExpr::Try { body, catches, finally } => {
                self.compile_try(body, catches, finally.as_deref(), target)
            }

            SntcOrExpr::Throw(value) => {
                let mut emit = Emit::default();
                let value = self.operand(value, &mut emit)?;
                Ok(emit.finish(Stmt::Throw(value)))
            }

            SntcOrExpr::Return(value) => self.compile_return(value.as_deref(), expr.span),
            SntcOrExpr::Break => self.compile_loop_jump(true, expr.span),
            SntcOrExpr::Continue => self.compile_loop_jump(false, expr.span),
            SntcOrExpr::Skip => Ok(Stmt::Skip),

            SntcOrExpr::Actor { name, params, body } => self.compile_actor(name, params, body, target),
        }
    }

    // ---- Operands ----

    fn operand(&mut self, expr: &Expr, emit: &mut Emit) -> Result<Arg> {
        match &expr.node {
            SntcOrExpr::Lit(lit) => Ok(Arg::Lit(lower_literal(lit))),
            SntcOrExpr::Ident(name) => Ok(Arg::Ident(Ident::new(name))),
            _ => {
                let temp = self.names.fresh();
                emit.locals.push(temp.clone());
                emit.pre.push(self.compile(expr, &Target::Ident(temp.clone()))?);
                Ok(Arg::Ident(temp))
            }
        }
    }

    fn operands(&mut self, exprs: &[Expr], emit: &mut Emit) -> Result<Vec<Arg>> {
        exprs.iter().map(|e| self.operand(e, emit)).collect()
    }

    /// The target identifier, or a fresh temporary when the value is discarded.
    fn target(&mut self, target: &Target, emit: &mut Emit) -> Ident {
        match target {
            Target::Ident(t) => t.clone(),
            Target::Discard => {
                let temp = self.names.fresh();
                emit.locals.push(temp.clone());
                temp
            }
        }
    }

    // ---- Expressions ----

    fn compile_and_or(&mut self, is_and: bool, left: &Expr, right: &Expr, target: &Target) -> Result<Stmt> {
        let mut emit = Emit::default();
        let cond = self.operand(left, &mut emit)?;
        let rhs = self.compile(right, target)?;
        let short = match target {
            Target::Ident(t) => Stmt::bind(Lit::Bool(!is_and), t.clone()),
            Target::Discard => Stmt::Skip,
        };
        let stmt = if is_and {
            Stmt::if_else(cond, rhs, short)
        } else {
            Stmt::if_else(cond, short, rhs)
        };
        Ok(emit.finish(stmt))
    }

    /// `a.b.f(x)` becomes `$select_apply(a, ['b', 'f'], x)`.
    fn compile_select_apply(&mut self, rec: &Expr, name: &str, args: &[Expr], target: &Target) -> Result<Stmt> {
        let mut path = vec![Arg::Lit(Lit::str(name))];
        let mut base = rec;
        while let SntcOrExpr::Select { rec: inner, feature } = &base.node {
            match &feature.node {
                SntcOrExpr::Lit(lit) => {
                    path.insert(0, Arg::Lit(lower_literal(lit)));
                    base = inner;
                }
                _ => break,
            }
        }
        let mut emit = Emit::default();
        let rec = self.operand(base, &mut emit)?;
        let mut args = self.operands(args, &mut emit)?;
        if let Target::Ident(t) = target {
            args.push(Arg::Ident(t.clone()));
        }
        Ok(emit.finish(Stmt::SelectApply { rec, path, args }))
    }

    fn compile_func(
        &mut self,
        name: Option<&str>,
        params: &[String],
        body: &[Expr],
        is_func: bool,
        target: &Target,
    ) -> Result<Stmt> {
        let mut formals: Vec<Ident> = params.iter().map(|p| Ident::new(p)).collect();
        let body_target = if is_func {
            formals.push(Ident::result());
            Target::Ident(Ident::result())
        } else {
            Target::Discard
        };

        self.frames.push(JumpFrame::Func { label: None, result: is_func, alias: None });
        let body = self.compile_seq(body, &body_target);
        let frame = self.frames.pop();
        let body = close_func(body?, frame);

        match name {
            Some(name) => {
                let name = Ident::new(name);
                let create = Stmt::create_proc(formals, body, name.clone());
                Ok(match target {
                    Target::Ident(t) => Stmt::seq(vec![create, Stmt::bind(name, t.clone())]),
                    Target::Discard => create,
                })
            }
            None => {
                let mut emit = Emit::default();
                let target = self.target(target, &mut emit);
                Ok(emit.finish(Stmt::create_proc(formals, body, target)))
            }
        }
    }

    // ---- Control flow ----

    fn compile_if(&mut self, branches: &[(Expr, Vec<Expr>)], otherwise: Option<&[Expr]>, target: &Target) -> Result<Stmt> {
        let Some(((cond, body), rest)) = branches.split_first() else {
            return match otherwise {
                Some(seq) => self.compile_seq(seq, target),
                None => Ok(Stmt::Skip),
            };
        };
        let mut emit = Emit::default();
        let cond = self.operand(cond, &mut emit)?;
        let then = self.compile_seq(body, target)?;
        let otherwise = self.compile_if(rest, otherwise, target)?;
        Ok(emit.finish(Stmt::if_else(cond, then, otherwise)))
    }

    /// The case algorithm shared by `case`, `catch` clauses and actor
    /// handlers. Each alternative that can fail in more than one place calls
    /// a fresh proc holding the remaining alternatives.
    fn compile_alts(&mut self, arg: &Arg, clauses: &[CaseClause], fallback: &Fallback<'_>, target: &Target) -> Result<Stmt> {
        let Some((clause, rest)) = clauses.split_first() else {
            return self.compile_fallback(fallback, target);
        };

        let compiled = pattern::compile(&clause.pat, &mut self.names)?;
        let single_failure = compiled.children.is_empty() && clause.guard.is_none();
        let nothing_left = rest.is_empty() && matches!(fallback, Fallback::Skip);
        let next = if rest.is_empty() && (single_failure || nothing_left) {
            None
        } else {
            Some(self.names.fresh())
        };

        let mut guard_emit = Emit::default();
        let guard = match &clause.guard {
            Some(guard) => Some(self.operand(guard, &mut guard_emit)?),
            None => None,
        };

        let body = self.compile_seq(&clause.body, target)?;

        let fail = match &next {
            Some(next) => call(next, target),
            None if nothing_left => Stmt::Skip,
            None => self.compile_fallback(fallback, target)?,
        };

        let mut then = match guard {
            Some(guard) => guard_emit.finish(Stmt::if_else(guard, body, fail.clone())),
            None => body,
        };
        for child in compiled.children.iter().rev() {
            then = Stmt::Case {
                arg: Arg::Ident(child.arg.clone()),
                pat: Pat::Rec(child.pat.clone()),
                then: Arc::new(then),
                otherwise: Arc::new(fail.clone()),
            };
        }
        let case = Stmt::Case {
            arg: arg.clone(),
            pat: compiled.root,
            then: Arc::new(then),
            otherwise: Arc::new(fail),
        };

        let Some(next) = next else {
            return Ok(case);
        };

        let (params, inner_target) = match target {
            Target::Ident(_) => (vec![Ident::result()], Target::Ident(Ident::result())),
            Target::Discard => (Vec::new(), Target::Discard),
        };
        let shadows = !params.is_empty();
        if shadows {
            self.frames.push(JumpFrame::Shadow);
        }
        let else_body = self.compile_alts(arg, rest, fallback, &inner_target);
        if shadows {
            self.frames.pop();
        }
        let create = Stmt::create_proc(params, else_body?, next.clone());
        Ok(Stmt::local(vec![next], Stmt::seq(vec![create, case])))
    }

    fn compile_fallback(&mut self, fallback: &Fallback<'_>, target: &Target) -> Result<Stmt> {
        match fallback {
            Fallback::Skip => Ok(Stmt::Skip),
            Fallback::Seq(seq) => self.compile_seq(seq, target),
            Fallback::Rethrow(catch) => Ok(Stmt::Throw(Arg::Ident(catch.clone()))),
            Fallback::NotHandled(name) => {
                let error = self.names.fresh();
                let create = Stmt::CreateRec {
                    label: Some(Arg::Lit(Lit::str("error"))),
                    fields: vec![
                        (Arg::Lit(Lit::str("message")), Arg::Ident(Ident::message())),
                        (Arg::Lit(Lit::str("name")), Arg::Lit(Lit::str(name))),
                    ],
                    target: error.clone(),
                };
                Ok(Stmt::local(
                    vec![error.clone()],
                    Stmt::seq(vec![create, Stmt::Throw(Arg::Ident(error))]),
                ))
            }
        }
    }

    /// Pops a loop frame and returns its `(break, continue)` labels.
    fn pop_loop(&mut self) -> (Option<u32>, Option<u32>) {
        match self.frames.pop() {
            Some(JumpFrame::Loop { brk, cont }) => (brk, cont),
            _ => (None, None),
        }
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Expr]) -> Result<Stmt> {
        let guard = Ident::new("$guard");
        let repeat = Ident::new("$while");

        self.frames.push(JumpFrame::Shadow);
        let cond = self.compile(cond, &Target::Ident(Ident::result()));
        self.frames.pop();
        let cond = cond?;

        let test = self.names.fresh();
        self.frames.push(JumpFrame::Loop { brk: None, cont: None });
        let body = self.compile_seq(body, &Target::Discard);
        let (brk, cont) = self.pop_loop();
        let body = body?;

        let mut iteration = vec![body];
        if let Some(cont) = cont {
            iteration.push(Stmt::JumpCatch(cont));
        }
        iteration.push(Stmt::apply(repeat.clone(), Vec::new()));

        let mut loop_body = vec![Stmt::local(
            vec![test.clone()],
            Stmt::seq(vec![
                Stmt::apply(guard.clone(), vec![Arg::Ident(test.clone())]),
                Stmt::if_else(test, Stmt::seq(iteration), Stmt::Skip),
            ]),
        )];
        if let Some(brk) = brk {
            loop_body.push(Stmt::JumpCatch(brk));
        }

        Ok(Stmt::local(
            vec![guard.clone(), repeat.clone()],
            Stmt::seq(vec![
                Stmt::create_proc(vec![Ident::result()], cond, guard),
                Stmt::create_proc(Vec::new(), Stmt::seq(loop_body), repeat.clone()),
                Stmt::apply(repeat, Vec::new()),
            ]),
        ))
    }

    /// The iterator plays the guard role: each call yields a value or `eof`.
    fn compile_for(&mut self, name: &str, iter: &Expr, body: &[Expr]) -> Result<Stmt> {
        let iterator = Ident::new("$iter");
        let repeat = Ident::new("$for");
        let var = Ident::new(name);

        let iter = self.compile(iter, &Target::Ident(iterator.clone()))?;

        self.frames.push(JumpFrame::Loop { brk: None, cont: None });
        let body = self.compile_seq(body, &Target::Discard);
        let (brk, cont) = self.pop_loop();
        let body = body?;

        let mut iteration = vec![body];
        if let Some(cont) = cont {
            iteration.push(Stmt::JumpCatch(cont));
        }
        iteration.push(Stmt::apply(repeat.clone(), Vec::new()));

        let step = Stmt::Case {
            arg: Arg::Ident(var.clone()),
            pat: Pat::Lit(Lit::Eof),
            then: Arc::new(Stmt::Skip),
            otherwise: Arc::new(Stmt::seq(iteration)),
        };
        let mut loop_body = vec![Stmt::local(
            vec![var.clone()],
            Stmt::seq(vec![Stmt::apply(iterator.clone(), vec![Arg::Ident(var)]), step]),
        )];
        if let Some(brk) = brk {
            loop_body.push(Stmt::JumpCatch(brk));
        }

        Ok(Stmt::local(
            vec![iterator, repeat.clone()],
            Stmt::seq(vec![
                iter,
                Stmt::create_proc(Vec::new(), Stmt::seq(loop_body), repeat.clone()),
                Stmt::apply(repeat, Vec::new()),
            ]),
        ))
    }

    fn compile_try(
        &mut self,
        body: &[Expr],
        catches: &[CaseClause],
        finally: Option<&[Expr]>,
        target: &Target,
    ) -> Result<Stmt> {
        let fin = finally.map(|_| self.names.fresh());
        if let Some(fin) = &fin {
            self.frames.push(JumpFrame::Finally(fin.clone()));
        }
        let stmt = self.compile_try_catch(body, catches, fin.clone(), target);
        if fin.is_some() {
            self.frames.pop();
        }
        let stmt = stmt?;

        match (fin, finally) {
            (Some(fin), Some(finally)) => {
                let finally = self.compile_seq(finally, &Target::Discard)?;
                Ok(Stmt::local(
                    vec![fin.clone()],
                    Stmt::seq(vec![
                        Stmt::create_proc(Vec::new(), finally, fin.clone()),
                        stmt,
                        Stmt::apply(fin, Vec::new()),
                    ]),
                ))
            }
            _ => Ok(stmt),
        }
    }

    fn compile_try_catch(
        &mut self,
        body: &[Expr],
        catches: &[CaseClause],
        finally: Option<Ident>,
        target: &Target,
    ) -> Result<Stmt> {
        let body = self.compile_seq(body, target)?;
        let catch = self.names.fresh();
        let handler = match finally {
            Some(finally) if catches.is_empty() => Stmt::seq(vec![
                Stmt::apply(finally, Vec::new()),
                Stmt::Throw(Arg::Ident(catch.clone())),
            ]),
            Some(finally) => {
                // a throw leaving a catch body, or an unmatched value, runs finally first
                let fallback = Fallback::Rethrow(catch.clone());
                let handler = self.compile_alts(&Arg::Ident(catch.clone()), catches, &fallback, target)?;
                let escaped = self.names.fresh();
                Stmt::Try {
                    body: Arc::new(handler),
                    catch: escaped.clone(),
                    handler: Arc::new(Stmt::seq(vec![
                        Stmt::apply(finally, Vec::new()),
                        Stmt::Throw(Arg::Ident(escaped)),
                    ])),
                }
            }
            None => {
                let fallback = Fallback::Rethrow(catch.clone());
                self.compile_alts(&Arg::Ident(catch.clone()), catches, &fallback, target)?
            }
        };
        Ok(Stmt::Try { body: Arc::new(body), catch, handler: Arc::new(handler) })
    }

    // ---- Jumps ----

    fn compile_return(&mut self, value: Option<&Expr>, span: Span) -> Result<Stmt> {
        let mut finals = Vec::new();
        let mut shadowed = false;
        let mut func = None;
        for (i, frame) in self.frames.iter().enumerate().rev() {
            match frame {
                JumpFrame::Finally(fin) => finals.push(fin.clone()),
                JumpFrame::Shadow => shadowed = true,
                JumpFrame::Loop { .. } => {}
                JumpFrame::Barrier => break,
                JumpFrame::Func { .. } => {
                    func = Some(i);
                    break;
                }
            }
        }
        let Some(index) = func else {
            return Err(GenError::ReturnOutsideFunc { span });
        };

        let mut stmts = Vec::new();
        if let Some(value) = value {
            let dest = match &mut self.frames[index] {
                JumpFrame::Func { result: false, .. } => return Err(GenError::ReturnValueInProc { span }),
                JumpFrame::Func { alias, .. } if shadowed => {
                    alias.get_or_insert_with(|| self.names.fresh()).clone()
                }
                _ => Ident::result(),
            };
            stmts.push(self.compile(value, &Target::Ident(dest))?);
        }

        let label = match &mut self.frames[index] {
            JumpFrame::Func { label, .. } => *label.get_or_insert_with(|| self.names.label()),
            _ => return Err(GenError::ReturnOutsideFunc { span }),
        };
        stmts.extend(finals.into_iter().map(|fin| Stmt::apply(fin, Vec::new())));
        stmts.push(Stmt::JumpThrow(label));
        Ok(Stmt::seq(stmts))
    }

    fn compile_loop_jump(&mut self, is_break: bool, span: Span) -> Result<Stmt> {
        let mut finals = Vec::new();
        for frame in self.frames.iter_mut().rev() {
            match frame {
                JumpFrame::Finally(fin) => finals.push(fin.clone()),
                JumpFrame::Shadow => {}
                JumpFrame::Func { .. } | JumpFrame::Barrier => break,
                JumpFrame::Loop { brk, cont } => {
                    let slot = if is_break { brk } else { cont };
                    let label = *slot.get_or_insert_with(|| self.names.label());
                    let mut stmts: Vec<Stmt> =
                        finals.into_iter().map(|fin| Stmt::apply(fin, Vec::new())).collect();
                    stmts.push(Stmt::JumpThrow(label));
                    return Ok(Stmt::seq(stmts));
                }
            }
        }
        Err(if is_break {
            GenError::BreakOutsideLoop { span }
        } else {
            GenError::ContinueOutsideLoop { span }
        })
    }

    // ---- Actors ----

    /// An actor becomes a configurator proc `(params..., $r)` that runs the
    /// initializer and binds `$r` to `'handlers'#[ask, tell]`.
    fn compile_actor(&mut self, name: &str, params: &[String], body: &[ActorItem], target: &Target) -> Result<Stmt> {
        let mut formals: Vec<Ident> = params.iter().map(|p| Ident::new(p)).collect();
        formals.push(Ident::result());

        let ask = self.names.fresh();
        let tell = self.names.fresh();

        let mut init: Vec<Expr> = Vec::new();
        let mut asks: Vec<CaseClause> = Vec::new();
        let mut tells: Vec<CaseClause> = Vec::new();
        for item in body {
            match item {
                ActorItem::Sntc(expr) => init.push(expr.clone()),
                ActorItem::Handler { kind: HandlerKind::Ask, clause } => asks.push(clause.clone()),
                ActorItem::Handler { kind: HandlerKind::Tell, clause } => tells.push(clause.clone()),
            }
        }

        let mut declared = declared_names(&init);
        declared.push(ask.clone());
        declared.push(tell.clone());

        self.frames.push(JumpFrame::Barrier);
        let init = self.compile_sntcs(&init, &Target::Discard);
        self.frames.pop();
        let init = init?;

        let ask_body = self.compile_handler(&asks, true)?;
        let tell_body = self.compile_handler(&tells, false)?;

        let cfg_body = Stmt::local(
            declared,
            Stmt::seq(vec![
                init,
                Stmt::create_proc(vec![Ident::message(), Ident::result()], ask_body, ask.clone()),
                Stmt::create_proc(vec![Ident::message()], tell_body, tell.clone()),
                Stmt::CreateTuple {
                    label: Some(Arg::Lit(Lit::str("handlers"))),
                    values: vec![Arg::Ident(ask), Arg::Ident(tell)],
                    target: Ident::result(),
                },
            ]),
        );

        let name = Ident::new(name);
        let create = Stmt::CreateActorCfgtr {
            def: Arc::new(ProcDef::new(formals, cfg_body)),
            target: name.clone(),
        };
        Ok(match target {
            Target::Ident(t) => Stmt::seq(vec![create, Stmt::bind(name, t.clone())]),
            Target::Discard => create,
        })
    }

    fn compile_handler(&mut self, clauses: &[CaseClause], is_ask: bool) -> Result<Stmt> {
        let (target, fallback) = if is_ask {
            (Target::Ident(Ident::result()), Fallback::NotHandled("AskNotHandledError"))
        } else {
            (Target::Discard, Fallback::NotHandled("TellNotHandledError"))
        };
        self.frames.push(JumpFrame::Func { label: None, result: is_ask, alias: None });
        let body = self.compile_alts(&Arg::Ident(Ident::message()), clauses, &fallback, &target);
        let frame = self.frames.pop();
        Ok(close_func(body?, frame))
    }
}
