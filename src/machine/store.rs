//! Variable store: an arena of single-assignment slots joined by
//! union-find links, plus the mutable cells.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::kernel::fmt::quote_str;

use super::value::{ActorCfg, CellId, Feature, Proc, Rec, Value, VarId};

#[derive(Debug, Clone)]
enum Slot {
    Unbound,
    Link(VarId),
    Bound(Value),
}

#[derive(Debug, thiserror::Error)]
#[error("cannot unify {left} with {right}")]
pub struct Mismatch {
    pub left: String,
    pub right: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotPortable {
    #[error("an unbound variable cannot leave its actor")]
    Unbound,
    #[error("a cell cannot leave its actor")]
    Cell,
}

#[derive(Debug, Default)]
pub struct Store {
    slots: Vec<Slot>,
    cells: Vec<Value>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn new_var(&mut self) -> VarId {
        let id = VarId(self.slots.len() as u32);
        self.slots.push(Slot::Unbound);
        id
    }

    /// A variable holding `value`; a `Var` is returned as its root.
    pub fn bound(&mut self, value: Value) -> VarId {
        match value {
            Value::Var(id) => self.root(id),
            value => {
                let id = VarId(self.slots.len() as u32);
                self.slots.push(Slot::Bound(value));
                id
            }
        }
    }

    pub fn root(&self, mut id: VarId) -> VarId {
        while let Slot::Link(next) = &self.slots[id.0 as usize] {
            id = *next;
        }
        id
    }

    /// The bound value behind `value`, or `Var(root)` when unbound.
    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::Var(id) => {
                let root = self.root(*id);
                match &self.slots[root.0 as usize] {
                    Slot::Bound(value) => value.clone(),
                    _ => Value::Var(root),
                }
            }
            other => other.clone(),
        }
    }

    pub fn is_bound(&self, id: VarId) -> bool {
        matches!(self.slots[self.root(id).0 as usize], Slot::Bound(_))
    }

    pub fn new_cell(&mut self, value: Value) -> CellId {
        let id = CellId(self.cells.len() as u32);
        self.cells.push(value);
        id
    }

    pub fn cell(&self, id: CellId) -> Value {
        self.cells[id.0 as usize].clone()
    }

    pub fn set_cell(&mut self, id: CellId, value: Value) {
        self.cells[id.0 as usize] = value;
    }

    /// Unifies two values. Pairs of records already visited are skipped,
    /// so cyclic structures terminate.
    pub fn unify(&mut self, left: &Value, right: &Value) -> Result<(), Mismatch> {
        let mut work = vec![(left.clone(), right.clone())];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        while let Some((a, b)) = work.pop() {
            let a = self.resolve(&a);
            let b = self.resolve(&b);
            match (&a, &b) {
                (Value::Var(x), Value::Var(y)) => {
                    if x != y {
                        self.slots[x.0 as usize] = Slot::Link(*y);
                    }
                }
                (Value::Var(x), value) | (value, Value::Var(x)) => {
                    self.slots[x.0 as usize] = Slot::Bound(value.clone());
                }
                (Value::Rec(r), Value::Rec(s)) => {
                    if Arc::ptr_eq(r, s) || !seen.insert((Arc::as_ptr(r) as usize, Arc::as_ptr(s) as usize)) {
                        continue;
                    }
                    if r.label != s.label || r.len() != s.len() {
                        return Err(self.mismatch(&a, &b));
                    }
                    for ((fa, va), (fb, vb)) in r.fields().iter().zip(s.fields()) {
                        if fa != fb {
                            return Err(self.mismatch(&a, &b));
                        }
                        work.push((va.clone(), vb.clone()));
                    }
                }
                _ => {
                    if !same_atom(&a, &b) {
                        return Err(self.mismatch(&a, &b));
                    }
                }
            }
        }
        Ok(())
    }

    fn mismatch(&self, a: &Value, b: &Value) -> Mismatch {
        Mismatch { left: self.format(a), right: self.format(b) }
    }

    /// Structural equality. `Err(var)` when the answer depends on an
    /// unbound variable and no mismatch was found elsewhere.
    pub fn equals(&self, left: &Value, right: &Value) -> Result<bool, VarId> {
        let mut work = vec![(left.clone(), right.clone())];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut undetermined = None;
        while let Some((a, b)) = work.pop() {
            let a = self.resolve(&a);
            let b = self.resolve(&b);
            match (&a, &b) {
                (Value::Var(x), Value::Var(y)) if x == y => {}
                (Value::Var(x), _) | (_, Value::Var(x)) => {
                    undetermined.get_or_insert(*x);
                }
                (Value::Rec(r), Value::Rec(s)) => {
                    if Arc::ptr_eq(r, s) || !seen.insert((Arc::as_ptr(r) as usize, Arc::as_ptr(s) as usize)) {
                        continue;
                    }
                    if r.label != s.label || r.len() != s.len() {
                        return Ok(false);
                    }
                    for ((fa, va), (fb, vb)) in r.fields().iter().zip(s.fields()) {
                        if fa != fb {
                            return Ok(false);
                        }
                        work.push((va.clone(), vb.clone()));
                    }
                }
                _ => {
                    if !same_atom(&a, &b) {
                        return Ok(false);
                    }
                }
            }
        }
        match undetermined {
            Some(var) => Err(var),
            None => Ok(true),
        }
    }

    /// `left` entails `right`: every field of `left` exists in `right` with
    /// an entailing value. Unbound parts of `left` entail anything; an
    /// unbound part of `right` facing a determined `left` is undetermined.
    pub fn entails(&self, left: &Value, right: &Value) -> Result<bool, VarId> {
        let mut work = vec![(left.clone(), right.clone())];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut undetermined = None;
        while let Some((a, b)) = work.pop() {
            let a = self.resolve(&a);
            let b = self.resolve(&b);
            match (&a, &b) {
                (Value::Var(_), _) => {}
                (_, Value::Var(y)) => {
                    undetermined.get_or_insert(*y);
                }
                (Value::Rec(r), Value::Rec(s)) => {
                    if Arc::ptr_eq(r, s) || !seen.insert((Arc::as_ptr(r) as usize, Arc::as_ptr(s) as usize)) {
                        continue;
                    }
                    if r.label != s.label {
                        return Ok(false);
                    }
                    for (feature, value) in r.fields() {
                        match s.get(feature) {
                            Some(other) => work.push((value.clone(), other.clone())),
                            None => return Ok(false),
                        }
                    }
                }
                _ => {
                    if !same_atom(&a, &b) {
                        return Ok(false);
                    }
                }
            }
        }
        match undetermined {
            Some(var) => Err(var),
            None => Ok(true),
        }
    }

    /// Renders a value; unbound variables print as `_` and a record that
    /// contains itself prints `<<circular>>` at the point of recursion.
    pub fn format(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write(&mut out, value, &mut Vec::new());
        out
    }

    fn write(&self, out: &mut String, value: &Value, path: &mut Vec<*const Rec>) {
        match self.resolve(value) {
            Value::Var(_) => out.push('_'),
            Value::Rec(rec) => {
                let ptr = Arc::as_ptr(&rec);
                if path.contains(&ptr) {
                    out.push_str("<<circular>>");
                    return;
                }
                path.push(ptr);
                self.write_rec(out, &rec, path);
                path.pop();
            }
            other => out.push_str(&format_atom(&other)),
        }
    }

    fn write_rec(&self, out: &mut String, rec: &Rec, path: &mut Vec<*const Rec>) {
        if let Some(label) = &rec.label {
            out.push_str(&format_feature(label));
            out.push('#');
        }
        if rec.is_tuple() && !rec.is_empty() {
            out.push('[');
            for (i, (_, value)) in rec.fields().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.write(out, value, path);
            }
            out.push(']');
        } else {
            out.push('{');
            for (i, (feature, value)) in rec.fields().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format_feature(feature));
                out.push_str(": ");
                self.write(out, value, path);
            }
            out.push('}');
        }
    }

    /// Deep-copies everything reachable from `value` into a private store.
    pub fn export(&self, value: &Value) -> Result<Portable, NotPortable> {
        let mut store = Store::new();
        let value = self.copy(value, &mut store, &mut HashMap::new())?;
        Ok(Portable { store, value })
    }

    /// Copies a snapshot made by [`Store::export`] into this store.
    pub fn import(&mut self, portable: &Portable) -> Result<Value, NotPortable> {
        portable.store.copy(&portable.value, self, &mut HashMap::new())
    }

    fn copy(&self, value: &Value, out: &mut Store, memo: &mut HashMap<VarId, VarId>) -> Result<Value, NotPortable> {
        match value {
            Value::Var(id) => {
                let root = self.root(*id);
                if let Some(copied) = memo.get(&root) {
                    return Ok(Value::Var(*copied));
                }
                let Slot::Bound(bound) = &self.slots[root.0 as usize] else {
                    return Err(NotPortable::Unbound);
                };
                let target = out.new_var();
                memo.insert(root, target);
                let copied = self.copy(bound, out, memo)?;
                out.slots[target.0 as usize] = Slot::Bound(copied);
                Ok(Value::Var(target))
            }
            Value::Rec(rec) => {
                let mut values = Vec::with_capacity(rec.len());
                for (_, value) in rec.fields() {
                    values.push(self.copy(value, out, memo)?);
                }
                Ok(Value::Rec(Arc::new(rec.with_values(values))))
            }
            Value::Proc(proc) => Ok(Value::Proc(self.copy_proc(proc, out, memo)?)),
            Value::ActorCfgtr(proc) => Ok(Value::ActorCfgtr(self.copy_proc(proc, out, memo)?)),
            Value::ActorCfg(cfg) => {
                let cfgtr = self.copy_proc(&cfg.cfgtr, out, memo)?;
                let args = cfg
                    .args
                    .iter()
                    .map(|arg| self.copy(arg, out, memo))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::ActorCfg(Arc::new(ActorCfg { cfgtr, args })))
            }
            Value::Cell(_) => Err(NotPortable::Cell),
            other => Ok(other.clone()),
        }
    }

    fn copy_proc(&self, proc: &Arc<Proc>, out: &mut Store, memo: &mut HashMap<VarId, VarId>) -> Result<Arc<Proc>, NotPortable> {
        match proc.as_ref() {
            Proc::Closure { def, env } => {
                let mut captured = Vec::with_capacity(env.len());
                for (ident, var) in env {
                    let copied = self.copy(&Value::Var(*var), out, memo)?;
                    captured.push((ident.clone(), out.bound(copied)));
                }
                Ok(Arc::new(Proc::Closure { def: def.clone(), env: captured }))
            }
            Proc::Native { .. } => Ok(proc.clone()),
        }
    }
}

/// A value detached from any machine, safe to move between actors.
#[derive(Debug)]
pub struct Portable {
    store: Store,
    value: Value,
}

impl Portable {
    /// A snapshot of a value that holds no variables.
    pub fn atom(value: Value) -> Portable {
        Portable { store: Store::new(), value }
    }

    /// Renders the snapshot the way its own store would.
    pub fn format(&self) -> String {
        self.store.format(&self.value)
    }

    pub fn error_name(&self) -> Option<String> {
        self.store.resolve(&self.value).error_name().map(str::to_string)
    }
}

/// Equality of non-record, non-variable values. Int32 never equals Int64.
fn same_atom(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int32(x), Value::Int32(y)) => x == y,
        (Value::Int64(x), Value::Int64(y)) => x == y,
        (Value::Flt32(x), Value::Flt32(y)) => x == y,
        (Value::Flt64(x), Value::Flt64(y)) => x == y,
        (Value::Dec128(x), Value::Dec128(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Null, Value::Null) | (Value::Eof, Value::Eof) => true,
        (Value::Token(x), Value::Token(y)) => x == y,
        (Value::Proc(x), Value::Proc(y)) | (Value::ActorCfgtr(x), Value::ActorCfgtr(y)) => Arc::ptr_eq(x, y),
        (Value::ActorCfg(x), Value::ActorCfg(y)) => Arc::ptr_eq(x, y),
        (Value::ActorRef(x), Value::ActorRef(y)) => x == y,
        (Value::Cell(x), Value::Cell(y)) => x == y,
        _ => false,
    }
}

pub fn format_feature(feature: &Feature) -> String {
    format_atom(&feature.to_value())
}

fn format_atom(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Int64(n) => format!("{n}L"),
        Value::Flt32(f) => format!("{f:?}f"),
        Value::Flt64(f) => format!("{f:?}"),
        Value::Dec128(d) => format!("{d}m"),
        Value::Char(c) => match c {
            '\n' => "&\\n".to_string(),
            '\t' => "&\\t".to_string(),
            '\r' => "&\\r".to_string(),
            c => format!("&{c}"),
        },
        Value::Str(s) => quote_str(s),
        Value::Null => "null".to_string(),
        Value::Eof => "eof".to_string(),
        Value::Token(t) => format!("<<token {t}>>"),
        Value::Proc(_) => "<<proc>>".to_string(),
        Value::ActorCfgtr(_) => "<<actor_cfgtr>>".to_string(),
        Value::ActorCfg(_) => "<<actor_cfg>>".to_string(),
        Value::ActorRef(actor) => format!("<<actor {}>>", actor.id()),
        Value::Cell(_) => "<<cell>>".to_string(),
        Value::Var(_) => "_".to_string(),
        Value::Rec(_) => "<<rec>>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(values: Vec<Value>) -> Value {
        Value::Rec(Arc::new(Rec::tuple(None, values)))
    }

    #[test]
    fn bind_through_alias() {
        let mut store = Store::new();
        let a = store.new_var();
        let b = store.new_var();
        store.unify(&Value::Var(a), &Value::Var(b)).unwrap();
        store.unify(&Value::Var(b), &Value::Int32(3)).unwrap();
        assert!(matches!(store.resolve(&Value::Var(a)), Value::Int32(3)));
        assert_eq!(store.root(a), store.root(b));
    }

    #[test]
    fn rebinding_requires_equal_value() {
        let mut store = Store::new();
        let a = store.bound(Value::Int32(1));
        assert!(store.unify(&Value::Var(a), &Value::Int32(1)).is_ok());
        let err = store.unify(&Value::Var(a), &Value::Int32(2)).unwrap_err();
        assert_eq!(err.to_string(), "cannot unify 1 with 2");
        assert!(store.unify(&Value::Var(a), &Value::Int64(1)).is_err());
    }

    #[test]
    fn unify_records_binds_fields() {
        let mut store = Store::new();
        let x = store.new_var();
        let left = tuple(vec![Value::Var(x), Value::Int32(2)]);
        let right = tuple(vec![Value::str("a"), Value::Int32(2)]);
        store.unify(&left, &right).unwrap();
        assert_eq!(store.format(&Value::Var(x)), "'a'");
    }

    #[test]
    fn cyclic_unify_and_format_terminate() {
        // var a = [x]; var b = [a]; a = b
        let mut store = Store::new();
        let x = store.new_var();
        let a = store.bound(tuple(vec![Value::Var(x)]));
        let b = store.bound(tuple(vec![Value::Var(a)]));
        store.unify(&Value::Var(a), &Value::Var(b)).unwrap();
        assert_eq!(store.format(&Value::Var(x)), "[<<circular>>]");
        assert_eq!(store.equals(&Value::Var(a), &Value::Var(x)), Ok(true));
        // unifying the cycle with itself again terminates
        store.unify(&Value::Var(x), &Value::Var(a)).unwrap();
    }

    #[test]
    fn equals_suspends_only_when_undecided() {
        let mut store = Store::new();
        let x = store.new_var();
        let left = tuple(vec![Value::Var(x), Value::Int32(1)]);
        let same = tuple(vec![Value::Int32(0), Value::Int32(1)]);
        let differs = tuple(vec![Value::Int32(0), Value::Int32(2)]);
        assert_eq!(store.equals(&left, &same), Err(store.root(x)));
        assert_eq!(store.equals(&left, &differs), Ok(false));
        assert_eq!(store.equals(&Value::Int32(1), &Value::Int64(1)), Ok(false));
    }

    #[test]
    fn entailment() {
        let mut store = Store::new();
        let x = store.new_var();
        let pin = Value::Rec(Arc::new(
            Rec::new(None, vec![(Feature::str("a"), Value::Int32(1))]).unwrap(),
        ));
        let wider = Value::Rec(Arc::new(
            Rec::new(
                None,
                vec![(Feature::str("a"), Value::Int32(1)), (Feature::str("b"), Value::Int32(2))],
            )
            .unwrap(),
        ));
        assert_eq!(store.entails(&pin, &wider), Ok(true));
        assert_eq!(store.entails(&wider, &pin), Ok(false));
        assert_eq!(store.entails(&Value::Var(x), &Value::Int32(5)), Ok(true));
        assert_eq!(store.entails(&Value::Int32(5), &Value::Var(x)), Err(x));
    }

    #[test]
    fn format_values() {
        let mut store = Store::new();
        let rec = Value::Rec(Arc::new(
            Rec::new(
                Some(Feature::str("p")),
                vec![(Feature::str("n"), Value::Int64(5)), (Feature::Int32(0), Value::Char('c'))],
            )
            .unwrap(),
        ));
        assert_eq!(store.format(&rec), "'p'#{0: &c, 'n': 5L}");
        let empty = Value::Rec(Arc::new(Rec::tuple(Some(Feature::str("e")), vec![])));
        assert_eq!(store.format(&empty), "'e'#{}");
        let unbound = store.new_var();
        assert_eq!(store.format(&tuple(vec![Value::Var(unbound), Value::Flt64(2.0)])), "[_, 2.0]");
    }

    #[test]
    fn export_and_import_preserve_cycles() {
        let mut store = Store::new();
        let x = store.new_var();
        let a = store.bound(tuple(vec![Value::Var(x)]));
        store.unify(&Value::Var(x), &Value::Var(a)).unwrap();
        let portable = store.export(&Value::Var(a)).unwrap();

        let mut other = Store::new();
        other.new_var();
        let value = other.import(&portable).unwrap();
        let text = other.format(&value);
        assert!(text.starts_with('[') && text.contains("<<circular>>"), "{text}");
    }

    #[test]
    fn unbound_and_cells_are_not_portable() {
        let mut store = Store::new();
        let x = store.new_var();
        assert!(matches!(store.export(&tuple(vec![Value::Var(x)])), Err(NotPortable::Unbound)));
        let cell = store.new_cell(Value::Null);
        assert!(matches!(store.export(&Value::Cell(cell)), Err(NotPortable::Cell)));
    }
}
