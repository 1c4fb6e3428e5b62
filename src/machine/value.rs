//! Runtime values.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::actor::ActorRef;
use crate::kernel::{Ident, Lit, ProcDef};

use super::{Interrupt, Machine};

/// Index of a dataflow variable in its machine's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub(crate) u32);

/// Record features and labels. The derived order is the language's
/// feature order: Bool < Int32 < Int64 < Char < Str < Null < Eof < Token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Char(char),
    Str(Arc<str>),
    Null,
    Eof,
    Token(u64),
}

impl Feature {
    pub fn from_lit(lit: &Lit) -> Option<Feature> {
        Some(match lit {
            Lit::Bool(b) => Feature::Bool(*b),
            Lit::Int32(n) => Feature::Int32(*n),
            Lit::Int64(n) => Feature::Int64(*n),
            Lit::Char(c) => Feature::Char(*c),
            Lit::Str(s) => Feature::Str(s.clone()),
            Lit::Null => Feature::Null,
            Lit::Eof => Feature::Eof,
            Lit::Flt32(_) | Lit::Flt64(_) | Lit::Dec128(_) => return None,
        })
    }

    /// `None` for values that cannot serve as features. Expects a resolved value.
    pub fn from_value(value: &Value) -> Option<Feature> {
        Some(match value {
            Value::Bool(b) => Feature::Bool(*b),
            Value::Int32(n) => Feature::Int32(*n),
            Value::Int64(n) => Feature::Int64(*n),
            Value::Char(c) => Feature::Char(*c),
            Value::Str(s) => Feature::Str(s.clone()),
            Value::Null => Feature::Null,
            Value::Eof => Feature::Eof,
            Value::Token(t) => Feature::Token(*t),
            _ => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Feature::Bool(b) => Value::Bool(*b),
            Feature::Int32(n) => Value::Int32(*n),
            Feature::Int64(n) => Value::Int64(*n),
            Feature::Char(c) => Value::Char(*c),
            Feature::Str(s) => Value::Str(s.clone()),
            Feature::Null => Value::Null,
            Feature::Eof => Value::Eof,
            Feature::Token(t) => Value::Token(*t),
        }
    }

    pub fn str(s: &str) -> Feature {
        Feature::Str(Arc::from(s))
    }
}

/// A record with fields kept sorted by feature.
#[derive(Debug, Clone)]
pub struct Rec {
    pub label: Option<Feature>,
    fields: Vec<(Feature, Value)>,
}

impl Rec {
    /// Sorts the fields; a repeated feature is returned as the error.
    pub fn new(label: Option<Feature>, mut fields: Vec<(Feature, Value)>) -> Result<Rec, Feature> {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = fields.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(pair[0].0.clone());
        }
        Ok(Rec { label, fields })
    }

    pub fn from_map(label: Option<Feature>, fields: std::collections::BTreeMap<Feature, Value>) -> Rec {
        Rec { label, fields: fields.into_iter().collect() }
    }

    pub fn tuple(label: Option<Feature>, values: Vec<Value>) -> Rec {
        let fields = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Feature::Int32(i as i32), v))
            .collect();
        Rec { label, fields }
    }

    pub fn get(&self, feature: &Feature) -> Option<&Value> {
        self.fields
            .binary_search_by(|(f, _)| f.cmp(feature))
            .ok()
            .map(|i| &self.fields[i].1)
    }

    pub fn fields(&self) -> &[(Feature, Value)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Features are exactly Int32 `0..n`.
    pub fn is_tuple(&self) -> bool {
        self.fields
            .iter()
            .enumerate()
            .all(|(i, (f, _))| *f == Feature::Int32(i as i32))
    }

    /// Same label and features with new values, in field order.
    pub(crate) fn with_values(&self, values: Vec<Value>) -> Rec {
        let fields = self.fields.iter().map(|(f, _)| f.clone()).zip(values).collect();
        Rec { label: self.label.clone(), fields }
    }

    /// `self` with every field of `from` added or overriding.
    pub fn assign(&self, from: &Rec) -> Rec {
        let mut fields = self.fields.clone();
        for (feature, value) in &from.fields {
            match fields.binary_search_by(|(f, _)| f.cmp(feature)) {
                Ok(i) => fields[i].1 = value.clone(),
                Err(i) => fields.insert(i, (feature.clone(), value.clone())),
            }
        }
        Rec { label: self.label.clone(), fields }
    }
}

pub type NativeFn = dyn Fn(&mut Machine, &[VarId]) -> Result<(), Interrupt> + Send + Sync;

pub enum Proc {
    Closure { def: Arc<ProcDef>, env: Vec<(Ident, VarId)> },
    Native { name: &'static str, arity: usize, func: Arc<NativeFn> },
}

impl Proc {
    pub fn arity(&self) -> usize {
        match self {
            Proc::Closure { def, .. } => def.params.len(),
            Proc::Native { arity, .. } => *arity,
        }
    }

    pub fn native(
        name: &'static str,
        arity: usize,
        func: impl Fn(&mut Machine, &[VarId]) -> Result<(), Interrupt> + Send + Sync + 'static,
    ) -> Proc {
        Proc::Native { name, arity, func: Arc::new(func) }
    }
}

impl std::fmt::Debug for Proc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proc::Closure { def, env } => f
                .debug_struct("Closure")
                .field("params", &def.params)
                .field("env", env)
                .finish(),
            Proc::Native { name, arity, .. } => f
                .debug_struct("Native")
                .field("name", name)
                .field("arity", arity)
                .finish(),
        }
    }
}

/// A configurator together with the arguments it will be invoked with.
#[derive(Debug)]
pub struct ActorCfg {
    pub cfgtr: Arc<Proc>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
pub enum Value {
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
    Token(u64),
    Rec(Arc<Rec>),
    Proc(Arc<Proc>),
    ActorCfgtr(Arc<Proc>),
    ActorCfg(Arc<ActorCfg>),
    ActorRef(ActorRef),
    Cell(CellId),
    /// A reference to a store variable; resolve before inspecting.
    Var(VarId),
}

impl Value {
    pub fn from_lit(lit: &Lit) -> Value {
        match lit {
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Int32(n) => Value::Int32(*n),
            Lit::Int64(n) => Value::Int64(*n),
            Lit::Flt32(f) => Value::Flt32(*f),
            Lit::Flt64(f) => Value::Flt64(*f),
            Lit::Dec128(d) => Value::Dec128(*d),
            Lit::Char(c) => Value::Char(*c),
            Lit::Str(s) => Value::Str(s.clone()),
            Lit::Null => Value::Null,
            Lit::Eof => Value::Eof,
        }
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    /// `'error'#{'message': message, 'name': name}`
    pub fn error(name: &str, message: impl Into<String>) -> Value {
        let message: String = message.into();
        Value::Rec(Arc::new(Rec {
            label: Some(Feature::str("error")),
            fields: vec![
                (Feature::str("message"), Value::str(&message)),
                (Feature::str("name"), Value::str(name)),
            ],
        }))
    }

    /// The `name` field of an error record.
    pub fn error_name(&self) -> Option<&str> {
        let Value::Rec(rec) = self else { return None };
        if rec.label != Some(Feature::str("error")) {
            return None;
        }
        match rec.get(&Feature::str("name")) {
            Some(Value::Str(name)) => Some(name),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Flt32(_) => "Flt32",
            Value::Flt64(_) => "Flt64",
            Value::Dec128(_) => "Dec128",
            Value::Char(_) => "Char",
            Value::Str(_) => "Str",
            Value::Null => "Null",
            Value::Eof => "Eof",
            Value::Token(_) => "Token",
            Value::Rec(_) => "Rec",
            Value::Proc(_) => "Proc",
            Value::ActorCfgtr(_) => "ActorCfgtr",
            Value::ActorCfg(_) => "ActorCfg",
            Value::ActorRef(_) => "ActorRef",
            Value::Cell(_) => "Cell",
            Value::Var(_) => "Var",
        }
    }
}
