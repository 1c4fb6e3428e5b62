use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Wraps a node with its source span. Transparent to serde (serializes as inner node only).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Spanned { node, span }
    }

    pub fn unknown(node: T) -> Self {
        Spanned { node, span: Span::UNKNOWN }
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.node
    }
}

impl<T: Serialize> Serialize for Spanned<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.node.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Spanned<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(|node| Spanned { node, span: Span::UNKNOWN })
    }
}

// ---- Core AST types ----

/// A sentence or expression with its span.
pub type Expr = Spanned<SntcOrExpr>;

/// A sequence of sentences; the last one supplies the value.
pub type Seq = Vec<Expr>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Flt32(f32),
    Flt64(f64),
    Dec128(Decimal),
    Char(char),
    Str(String),
    Null,
    Eof,
}

/// Sentences and expressions share one grammar level: every sentence may
/// appear where a value is expected and produce nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SntcOrExpr {
    Lit(Literal),

    /// Variable reference
    Ident(String),

    /// `label#{feature: value, ...}` or `{...}`
    Rec {
        label: Option<Box<Expr>>,
        fields: Vec<(Expr, Expr)>,
    },

    /// `label#[a, b]` or `[a, b]`
    Tuple {
        label: Option<Box<Expr>>,
        values: Vec<Expr>,
    },

    /// Infix binary op: `a + b`, `a && b`
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `-e` or `!e`
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `@cell`
    CellGet(Box<Expr>),

    /// `rec.name` or `rec[feature]`
    Select {
        rec: Box<Expr>,
        feature: Box<Expr>,
    },

    /// `f(a, b)`
    Apply {
        proc: Box<Expr>,
        args: Vec<Expr>,
    },

    /// `rec.name(a, b)`
    SelectApply {
        rec: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },

    /// `var a = 1, b`
    Var(Vec<VarDecl>),

    /// `left = right`
    Unify {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `cell := value`
    SetCell {
        cell: Box<Expr>,
        value: Box<Expr>,
    },

    /// `func name(params) in body end`; anonymous when `name` is `None`
    Func {
        name: Option<String>,
        params: Vec<String>,
        body: Seq,
    },

    /// `proc name(params) in body end`
    Proc {
        name: Option<String>,
        params: Vec<String>,
        body: Seq,
    },

    /// `begin body end`
    Begin(Seq),

    If {
        branches: Vec<(Expr, Seq)>,
        otherwise: Option<Seq>,
    },

    Case {
        arg: Box<Expr>,
        clauses: Vec<CaseClause>,
        otherwise: Option<Seq>,
    },

    While {
        cond: Box<Expr>,
        body: Seq,
    },

    /// `for name in iter do body end`
    For {
        name: String,
        iter: Box<Expr>,
        body: Seq,
    },

    Try {
        body: Seq,
        catches: Vec<CaseClause>,
        finally: Option<Seq>,
    },

    Throw(Box<Expr>),
    Return(Option<Box<Expr>>),
    Break,
    Continue,
    Skip,

    Actor {
        name: String,
        params: Vec<String>,
        body: Vec<ActorItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub value: Option<Expr>,
}

/// One `of pat [when guard] then body` alternative; also used for
/// `catch` clauses and actor handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseClause {
    pub pat: Spanned<Pat>,
    pub guard: Option<Expr>,
    pub body: Seq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerKind {
    Ask,
    Tell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActorItem {
    Sntc(Expr),
    Handler { kind: HandlerKind, clause: CaseClause },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pat {
    Lit(Literal),
    /// Capturing identifier
    Ident(String),
    /// `~x` matches the current value of `x`
    Escaped(String),
    /// `_`
    Wildcard,
    /// `label#{feature: pat, ...}`
    Rec {
        label: Option<Box<Spanned<Pat>>>,
        fields: Vec<(Spanned<Pat>, Spanned<Pat>)>,
        partial: bool,
    },
    /// `label#[pat, ...]`
    Tuple {
        label: Option<Box<Spanned<Pat>>>,
        values: Vec<Spanned<Pat>>,
        partial: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// A complete program is a sequence of sentences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Seq,
    #[serde(skip)]
    pub source: Option<String>,
}
