//! Natives bound in every machine's root environment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::kernel::Ident;

use super::value::{Feature, Proc, Rec, Value, VarId};
use super::{Env, Interrupt, Machine, Store};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Binds the builtins into fresh store variables and returns their environment.
pub fn install(store: &mut Store) -> Env {
    let cell = module("Cell", vec![("new", Proc::native("new", 2, cell_new))]);
    let rec = module(
        "Rec",
        vec![
            ("assign", Proc::native("assign", 3, rec_assign)),
            ("size", Proc::native("size", 2, rec_size)),
        ],
    );
    let token = module("Token", vec![("new", Proc::native("new", 1, token_new))]);

    let entries = vec![
        ("Cell", cell),
        ("Rec", rec),
        ("Token", token),
        ("range", proc_value(Proc::native("range", 3, range))),
        ("spawn", proc_value(Proc::native("spawn", 2, spawn))),
        ("assert_bound", proc_value(Proc::native("assert_bound", 1, assert_bound))),
    ];
    let bindings = entries
        .into_iter()
        .map(|(name, value)| (Ident::new(name), store.bound(value)))
        .collect();
    Env::default().extend(bindings)
}

fn proc_value(proc: Proc) -> Value {
    Value::Proc(Arc::new(proc))
}

fn module(label: &str, procs: Vec<(&str, Proc)>) -> Value {
    let fields: BTreeMap<Feature, Value> = procs
        .into_iter()
        .map(|(name, proc)| (Feature::str(name), proc_value(proc)))
        .collect();
    Value::Rec(Arc::new(Rec::from_map(Some(Feature::str(label)), fields)))
}

fn type_error(what: &str, got: &Value) -> Interrupt {
    Interrupt::error("TypeError", format!("expected {what}, got {}", got.type_name()))
}

fn rec_arg(machine: &Machine, var: VarId) -> Result<Arc<Rec>, Interrupt> {
    match machine.determined(&Value::Var(var))? {
        Value::Rec(rec) => Ok(rec),
        other => Err(type_error("a Rec", &other)),
    }
}

fn cell_new(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let cell = machine.store_mut().new_cell(Value::Var(args[0]));
    machine.bind(args[1], Value::Cell(cell))
}

/// `Rec.assign(from, to)`: `to` with every field of `from`.
fn rec_assign(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let from = rec_arg(machine, args[0])?;
    let to = rec_arg(machine, args[1])?;
    machine.bind(args[2], Value::Rec(Arc::new(to.assign(&from))))
}

fn rec_size(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let rec = rec_arg(machine, args[0])?;
    let size = i32::try_from(rec.len())
        .map_err(|_| Interrupt::error("ArithmeticError", "record size exceeds Int32"))?;
    machine.bind(args[1], Value::Int32(size))
}

fn token_new(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    machine.bind(args[0], Value::Token(token))
}

/// `range(from, to)`: an iterator proc yielding `from..to`, then `eof`.
fn range(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let from = machine.determined(&Value::Var(args[0]))?;
    let to = machine.determined(&Value::Var(args[1]))?;
    let (from, to, wide) = match (&from, &to) {
        (Value::Int32(a), Value::Int32(b)) => (i64::from(*a), i64::from(*b), false),
        (Value::Int32(a), Value::Int64(b)) => (i64::from(*a), *b, true),
        (Value::Int64(a), Value::Int32(b)) => (*a, i64::from(*b), true),
        (Value::Int64(a), Value::Int64(b)) => (*a, *b, true),
        (Value::Int32(_) | Value::Int64(_), other) | (other, _) => {
            return Err(type_error("an integer range bound", other));
        }
    };
    let next = Arc::new(AtomicI64::new(from));
    let iter = Proc::native("range_iter", 1, move |machine, args| {
        let n = next.fetch_add(1, Ordering::Relaxed);
        let value = if n >= to {
            next.store(to, Ordering::Relaxed);
            Value::Eof
        } else if wide {
            Value::Int64(n)
        } else {
            // bounds were both Int32
            Value::Int32(n as i32)
        };
        machine.bind(args[0], value)
    });
    machine.bind(args[2], proc_value(iter))
}

fn spawn(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    let cfg = machine.determined(&Value::Var(args[0]))?;
    if !matches!(cfg, Value::ActorCfg(_)) {
        return Err(type_error("an ActorCfg", &cfg));
    }
    let actor = machine.spawn(&cfg)?;
    machine.bind(args[1], Value::ActorRef(actor))
}

fn assert_bound(machine: &mut Machine, args: &[VarId]) -> Result<(), Interrupt> {
    if machine.store().is_bound(args[0]) {
        Ok(())
    } else {
        Err(Interrupt::error("NotBoundError", "variable is not bound"))
    }
}
