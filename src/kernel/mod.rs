//! Kernel IR: the small uniform statement language every surface construct
//! is lowered into, and which the machine executes.

use std::sync::Arc;

use rust_decimal::Decimal;

pub mod fmt;

/// A kernel identifier. Names starting with `$` are system generated.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(Arc<str>);

impl Ident {
    pub fn new(name: &str) -> Self {
        Ident(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_system(&self) -> bool {
        self.0.starts_with('$')
    }

    /// Result parameter of generated procs.
    pub fn result() -> Self {
        Ident::new("$r")
    }

    /// Incoming actor message.
    pub fn message() -> Self {
        Ident::new("$m")
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ident({})", self.0)
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Ident::new(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Flt32(f32),
    Flt64(f64),
    Dec128(Decimal),
    Char(char),
    Str(Arc<str>),
    Null,
    Eof,
}

impl Lit {
    pub fn str(s: &str) -> Self {
        Lit::Str(Arc::from(s))
    }

    /// Floats and decimals cannot be record features.
    pub fn is_feature(&self) -> bool {
        !matches!(self, Lit::Flt32(_) | Lit::Flt64(_) | Lit::Dec128(_))
    }
}

/// An operand: an identifier or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Ident(Ident),
    Lit(Lit),
}

impl From<Ident> for Arg {
    fn from(ident: Ident) -> Self {
        Arg::Ident(ident)
    }
}

impl From<Lit> for Arg {
    fn from(lit: Lit) -> Self {
        Arg::Lit(lit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinPrim {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinPrim {
    pub fn name(self) -> &'static str {
        match self {
            BinPrim::Add => "$add",
            BinPrim::Sub => "$sub",
            BinPrim::Mult => "$mult",
            BinPrim::Div => "$div",
            BinPrim::Mod => "$mod",
            BinPrim::Lt => "$lt",
            BinPrim::Gt => "$gt",
            BinPrim::Le => "$le",
            BinPrim::Ge => "$ge",
            BinPrim::Eq => "$eq",
            BinPrim::Ne => "$ne",
        }
    }
}

/// Record features and labels in patterns: exact literals or pinned identifiers.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatPat {
    Lit(Lit),
    Escaped(Ident),
}

/// A field value in a record pattern. Nested records are hoisted into
/// child patterns, so leaves are all that remain.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafPat {
    Lit(Lit),
    Ident(Ident),
    Escaped(Ident),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecPat {
    pub label: Option<FeatPat>,
    pub fields: Vec<(FeatPat, LeafPat)>,
    /// `...`: extra fields in the value are allowed
    pub partial: bool,
}

impl RecPat {
    pub fn captures(&self) -> impl Iterator<Item = &Ident> {
        self.fields.iter().filter_map(|(_, leaf)| match leaf {
            LeafPat::Ident(ident) => Some(ident),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    Lit(Lit),
    Ident(Ident),
    Escaped(Ident),
    Rec(RecPat),
}

impl Pat {
    /// Identifiers the pattern binds in the `then` branch.
    pub fn captures(&self) -> Vec<Ident> {
        match self {
            Pat::Ident(ident) => vec![ident.clone()],
            Pat::Rec(rec) => rec.captures().cloned().collect(),
            Pat::Lit(_) | Pat::Escaped(_) => Vec::new(),
        }
    }

    /// Identifiers the pattern reads from the enclosing scope.
    fn pinned(&self) -> Vec<&Ident> {
        let mut out = Vec::new();
        match self {
            Pat::Escaped(ident) => out.push(ident),
            Pat::Rec(rec) => {
                if let Some(FeatPat::Escaped(ident)) = &rec.label {
                    out.push(ident);
                }
                for (feature, leaf) in &rec.fields {
                    if let FeatPat::Escaped(ident) = feature {
                        out.push(ident);
                    }
                    if let LeafPat::Escaped(ident) = leaf {
                        out.push(ident);
                    }
                }
            }
            Pat::Lit(_) | Pat::Ident(_) => {}
        }
        out
    }
}

/// A proc definition: formal parameters, body and the identifiers the body
/// reads from its defining scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDef {
    pub params: Vec<Ident>,
    pub body: Arc<Stmt>,
    pub free: Vec<Ident>,
}

impl ProcDef {
    pub fn new(params: Vec<Ident>, body: Stmt) -> Self {
        let mut scope = Scope { bound: params.clone(), free: Vec::new() };
        body.walk_free(&mut scope);
        ProcDef { params, body: Arc::new(body), free: scope.free }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Local {
        idents: Vec<Ident>,
        body: Arc<Stmt>,
    },
    Seq(Vec<Arc<Stmt>>),
    Skip,
    /// `$bind(a, t)`: unify
    Bind {
        arg: Arg,
        target: Ident,
    },
    BinOp {
        op: BinPrim,
        left: Arg,
        right: Arg,
        target: Ident,
    },
    Negate {
        arg: Arg,
        target: Ident,
    },
    /// `$get(c, t)`
    Get {
        cell: Arg,
        target: Ident,
    },
    /// `$set(c, v)`
    Set {
        cell: Arg,
        value: Arg,
    },
    Select {
        rec: Arg,
        feature: Arg,
        target: Ident,
    },
    /// `$select_apply(r, ['a', 'b'], args...)`; a value-context target is
    /// already the last argument.
    SelectApply {
        rec: Arg,
        path: Vec<Arg>,
        args: Vec<Arg>,
    },
    CreateRec {
        label: Option<Arg>,
        fields: Vec<(Arg, Arg)>,
        target: Ident,
    },
    CreateTuple {
        label: Option<Arg>,
        values: Vec<Arg>,
        target: Ident,
    },
    CreateProc {
        def: Arc<ProcDef>,
        target: Ident,
    },
    CreateActorCfgtr {
        def: Arc<ProcDef>,
        target: Ident,
    },
    Apply {
        proc: Arg,
        args: Vec<Arg>,
    },
    If {
        cond: Arg,
        then: Arc<Stmt>,
        otherwise: Arc<Stmt>,
    },
    Case {
        arg: Arg,
        pat: Pat,
        then: Arc<Stmt>,
        otherwise: Arc<Stmt>,
    },
    Try {
        body: Arc<Stmt>,
        catch: Ident,
        handler: Arc<Stmt>,
    },
    Throw(Arg),
    JumpThrow(u32),
    JumpCatch(u32),
}

impl Stmt {
    /// Builds a sequence, flattening nested sequences and dropping `skip`.
    pub fn seq(stmts: Vec<Stmt>) -> Stmt {
        let mut out: Vec<Arc<Stmt>> = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Skip => {}
                Stmt::Seq(inner) => out.extend(inner),
                other => out.push(Arc::new(other)),
            }
        }
        match out.len() {
            0 => Stmt::Skip,
            1 => match Arc::try_unwrap(out.remove(0)) {
                Ok(stmt) => stmt,
                Err(shared) => Stmt::Seq(vec![shared]),
            },
            _ => Stmt::Seq(out),
        }
    }

    /// `local idents in body end`; no wrapper when `idents` is empty.
    pub fn local(idents: Vec<Ident>, body: Stmt) -> Stmt {
        if idents.is_empty() {
            body
        } else {
            Stmt::Local { idents, body: Arc::new(body) }
        }
    }

    pub fn bind(arg: impl Into<Arg>, target: Ident) -> Stmt {
        Stmt::Bind { arg: arg.into(), target }
    }

    pub fn apply(proc: impl Into<Arg>, args: Vec<Arg>) -> Stmt {
        Stmt::Apply { proc: proc.into(), args }
    }

    pub fn create_proc(params: Vec<Ident>, body: Stmt, target: Ident) -> Stmt {
        Stmt::CreateProc { def: Arc::new(ProcDef::new(params, body)), target }
    }

    pub fn if_else(cond: impl Into<Arg>, then: Stmt, otherwise: Stmt) -> Stmt {
        Stmt::If { cond: cond.into(), then: Arc::new(then), otherwise: Arc::new(otherwise) }
    }

    /// Identifiers this statement reads but does not declare.
    pub fn free_idents(&self) -> Vec<Ident> {
        let mut scope = Scope { bound: Vec::new(), free: Vec::new() };
        self.walk_free(&mut scope);
        scope.free
    }

    fn walk_free(&self, scope: &mut Scope) {
        match self {
            Stmt::Local { idents, body } => {
                let mark = scope.bound.len();
                scope.bound.extend(idents.iter().cloned());
                body.walk_free(scope);
                scope.bound.truncate(mark);
            }
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    stmt.walk_free(scope);
                }
            }
            Stmt::Skip | Stmt::JumpThrow(_) | Stmt::JumpCatch(_) => {}
            Stmt::Bind { arg, target } | Stmt::Negate { arg, target } => {
                scope.arg(arg);
                scope.use_ident(target);
            }
            Stmt::BinOp { left, right, target, .. } => {
                scope.arg(left);
                scope.arg(right);
                scope.use_ident(target);
            }
            Stmt::Get { cell, target } => {
                scope.arg(cell);
                scope.use_ident(target);
            }
            Stmt::Set { cell, value } => {
                scope.arg(cell);
                scope.arg(value);
            }
            Stmt::Select { rec, feature, target } => {
                scope.arg(rec);
                scope.arg(feature);
                scope.use_ident(target);
            }
            Stmt::SelectApply { rec, path, args } => {
                scope.arg(rec);
                path.iter().chain(args).for_each(|a| scope.arg(a));
            }
            Stmt::CreateRec { label, fields, target } => {
                if let Some(label) = label {
                    scope.arg(label);
                }
                for (feature, value) in fields {
                    scope.arg(feature);
                    scope.arg(value);
                }
                scope.use_ident(target);
            }
            Stmt::CreateTuple { label, values, target } => {
                if let Some(label) = label {
                    scope.arg(label);
                }
                values.iter().for_each(|a| scope.arg(a));
                scope.use_ident(target);
            }
            Stmt::CreateProc { def, target } | Stmt::CreateActorCfgtr { def, target } => {
                for ident in &def.free {
                    scope.use_ident(ident);
                }
                scope.use_ident(target);
            }
            Stmt::Apply { proc, args } => {
                scope.arg(proc);
                args.iter().for_each(|a| scope.arg(a));
            }
            Stmt::If { cond, then, otherwise } => {
                scope.arg(cond);
                then.walk_free(scope);
                otherwise.walk_free(scope);
            }
            Stmt::Case { arg, pat, then, otherwise } => {
                scope.arg(arg);
                for ident in pat.pinned() {
                    scope.use_ident(ident);
                }
                let mark = scope.bound.len();
                scope.bound.extend(pat.captures());
                then.walk_free(scope);
                scope.bound.truncate(mark);
                otherwise.walk_free(scope);
            }
            Stmt::Try { body, catch, handler } => {
                body.walk_free(scope);
                let mark = scope.bound.len();
                scope.bound.push(catch.clone());
                handler.walk_free(scope);
                scope.bound.truncate(mark);
            }
            Stmt::Throw(arg) => scope.arg(arg),
        }
    }
}

struct Scope {
    bound: Vec<Ident>,
    free: Vec<Ident>,
}

impl Scope {
    fn use_ident(&mut self, ident: &Ident) {
        if !self.bound.contains(ident) && !self.free.contains(ident) {
            self.free.push(ident.clone());
        }
    }

    fn arg(&mut self, arg: &Arg) {
        if let Arg::Ident(ident) = arg {
            self.use_ident(ident);
        }
    }
}

impl std::fmt::Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&fmt::format(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Ident {
        Ident::new(name)
    }

    #[test]
    fn seq_flattens_and_drops_skip() {
        let stmt = Stmt::seq(vec![
            Stmt::Skip,
            Stmt::seq(vec![Stmt::bind(Lit::Int32(1), id("a")), Stmt::bind(Lit::Int32(2), id("b"))]),
            Stmt::JumpCatch(3),
        ]);
        match stmt {
            Stmt::Seq(stmts) => assert_eq!(stmts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn seq_of_one_is_the_statement() {
        let stmt = Stmt::seq(vec![Stmt::Skip, Stmt::Throw(Arg::Ident(id("x")))]);
        assert_eq!(stmt, Stmt::Throw(Arg::Ident(id("x"))));
        assert_eq!(Stmt::seq(vec![]), Stmt::Skip);
    }

    #[test]
    fn proc_free_excludes_params_and_locals() {
        let body = Stmt::local(
            vec![id("t")],
            Stmt::seq(vec![
                Stmt::BinOp { op: BinPrim::Add, left: id("n").into(), right: id("k").into(), target: id("t") },
                Stmt::apply(id("f"), vec![id("t").into(), id("$r").into()]),
            ]),
        );
        let def = ProcDef::new(vec![id("n"), id("$r")], body);
        assert_eq!(def.free, vec![id("k"), id("f")]);
    }

    #[test]
    fn case_captures_scope_only_then_branch() {
        let pat = Pat::Rec(RecPat {
            label: Some(FeatPat::Escaped(id("tag"))),
            fields: vec![(FeatPat::Lit(Lit::Int32(0)), LeafPat::Ident(id("x")))],
            partial: false,
        });
        let stmt = Stmt::Case {
            arg: id("a").into(),
            pat,
            then: Arc::new(Stmt::bind(id("x"), id("y"))),
            otherwise: Arc::new(Stmt::bind(id("x"), id("y"))),
        };
        assert_eq!(stmt.free_idents(), vec![id("a"), id("tag"), id("y"), id("x")]);
    }

    #[test]
    fn nested_proc_contributes_its_free_idents() {
        let inner = Stmt::create_proc(vec![], Stmt::apply(id("g"), vec![id("z").into()]), id("p"));
        let outer = ProcDef::new(vec![id("z")], Stmt::local(vec![id("p")], inner));
        assert_eq!(outer.free, vec![id("g")]);
    }

    #[test]
    fn float_literals_are_not_features() {
        assert!(Lit::Int32(1).is_feature());
        assert!(Lit::str("a").is_feature());
        assert!(!Lit::Flt64(1.0).is_feature());
        assert!(!Lit::Dec128(Decimal::ONE).is_feature());
    }

    #[test]
    fn system_idents() {
        assert!(Ident::result().is_system());
        assert!(!id("x").is_system());
    }
}
