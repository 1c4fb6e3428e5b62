//! Kernel machine: runs kernel statements against a dataflow store.
//!
//! The machine keeps a stack of `(statement, environment)` frames plus
//! catch markers. A statement whose operands are not yet bound suspends:
//! the frame goes back on the stack and [`Machine::run`] returns
//! [`Outcome::Suspend`] so the host can bind the variable and resume.

pub mod builtins;
pub mod ops;
pub mod store;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

use crate::actor::{ActorRef, Envelope, HaltReport};
use crate::kernel::{Arg, BinPrim, FeatPat, Ident, LeafPat, Pat, ProcDef, RecPat, Stmt};

pub use store::{Portable, Store};
pub use value::{ActorCfg, CellId, Feature, Proc, Rec, Value, VarId};

/// Root variable receiving a program's final value.
pub const RESULT: &str = "$result";

/// Persistent lexical environment; extending shares the parent frames.
#[derive(Debug, Clone, Default)]
pub struct Env(Option<Arc<EnvFrame>>);

#[derive(Debug)]
struct EnvFrame {
    bindings: Vec<(Ident, VarId)>,
    parent: Env,
}

impl Env {
    pub fn extend(&self, bindings: Vec<(Ident, VarId)>) -> Env {
        if bindings.is_empty() {
            return self.clone();
        }
        Env(Some(Arc::new(EnvFrame { bindings, parent: self.clone() })))
    }

    pub fn get(&self, ident: &Ident) -> Option<VarId> {
        let mut env = self;
        while let Some(frame) = &env.0 {
            if let Some((_, var)) = frame.bindings.iter().rev().find(|(name, _)| name == ident) {
                return Some(*var);
            }
            env = &frame.parent;
        }
        None
    }
}

/// Why a statement stopped short.
#[derive(Debug)]
pub enum Interrupt {
    Suspend(VarId),
    Throw(Value),
}

impl Interrupt {
    pub fn error(name: &str, message: impl Into<String>) -> Interrupt {
        Interrupt::Throw(Value::error(name, message))
    }
}

#[derive(Debug)]
pub enum Outcome {
    Done,
    /// Waiting on the variable; the stack is intact.
    Suspend(VarId),
    /// An uncaught throw; the stack is empty.
    Halt(Value),
}

/// Work the host must carry out on the machine's behalf.
#[derive(Debug)]
pub enum Effect {
    Spawn {
        actor: ActorRef,
        mailbox: UnboundedReceiver<Envelope>,
        cfg: Portable,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Suspended,
    Halted,
}

/// Final report of a program run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub status: Status,
    /// The program value, or the uncaught value when halted.
    pub value: String,
    /// `name` of the uncaught error record.
    pub error: Option<String>,
    /// Actors that halted along the way.
    pub halts: Vec<HaltReport>,
}

#[derive(Debug)]
enum Frame {
    Stmt(Arc<Stmt>, Env),
    Catch { ident: Ident, handler: Arc<Stmt>, env: Env },
}

pub struct Machine {
    store: Store,
    stack: Vec<Frame>,
    root: Env,
    steps: u64,
    max_steps: u64,
    self_ref: Option<ActorRef>,
    effects: Vec<Effect>,
    pending: HashMap<u64, VarId>,
    next_request: u64,
}

impl Machine {
    /// `max_steps` of 0 means unlimited.
    pub fn new(max_steps: u64) -> Machine {
        let mut store = Store::new();
        let root = builtins::install(&mut store);
        Machine {
            store,
            stack: Vec::new(),
            root,
            steps: 0,
            max_steps,
            self_ref: None,
            effects: Vec::new(),
            pending: HashMap::new(),
            next_request: 0,
        }
    }

    /// Attaches the machine to a mailbox so it may spawn, ask and tell.
    pub fn with_self_ref(mut self, actor: ActorRef) -> Machine {
        self.self_ref = Some(actor);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn root_env(&self) -> &Env {
        &self.root
    }

    /// Adds an unbound variable to the root environment.
    pub fn declare(&mut self, name: &str) -> VarId {
        let var = self.store.new_var();
        self.root = self.root.extend(vec![(Ident::new(name), var)]);
        var
    }

    pub fn format(&self, value: &Value) -> String {
        self.store.format(value)
    }

    pub fn push(&mut self, stmt: Arc<Stmt>, env: Env) {
        // a loop re-entering its own body would stack identical catches
        if let Stmt::JumpCatch(label) = stmt.as_ref() {
            if let Some(Frame::Stmt(top, _)) = self.stack.last() {
                if matches!(top.as_ref(), Stmt::JumpCatch(other) if other == label) {
                    return;
                }
            }
        }
        self.stack.push(Frame::Stmt(stmt, env));
    }

    /// Schedules `proc(args...)` on an otherwise empty environment.
    pub fn push_apply(&mut self, proc: Value, args: Vec<VarId>) {
        let proc_var = self.store.bound(proc);
        let mut bindings = vec![(Ident::new("$proc"), proc_var)];
        let mut arg_idents = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let ident = Ident::new(&format!("$arg{i}"));
            arg_idents.push(Arg::Ident(ident.clone()));
            bindings.push((ident, arg));
        }
        let stmt = Stmt::apply(Ident::new("$proc"), arg_idents);
        self.push(Arc::new(stmt), Env::default().extend(bindings));
    }

    pub fn is_idle(&self) -> bool {
        self.stack.is_empty()
    }

    /// Drops a stuck computation and any replies it was waiting for.
    pub fn abandon(&mut self) {
        self.stack.clear();
        self.pending.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Binds the result variable of an outstanding `ask`. A response that
    /// cannot be read or does not unify with the result variable is thrown
    /// into the waiting computation.
    pub fn respond(&mut self, request_id: u64, response: &Portable) {
        let Some(var) = self.pending.remove(&request_id) else {
            warn!(request_id, "response for unknown request");
            return;
        };
        let failure = match self.store.import(response) {
            Ok(value) => match self.store.unify(&Value::Var(var), &value) {
                Ok(()) => return,
                Err(err) => Value::error("UnificationError", err.to_string()),
            },
            Err(err) => Value::error("NotPortableError", err.to_string()),
        };
        debug!(request_id, "response rejected");
        let failure = self.store.bound(failure);
        let ident = Ident::new("$failure");
        let env = Env::default().extend(vec![(ident.clone(), failure)]);
        self.push(Arc::new(Stmt::Throw(Arg::Ident(ident))), env);
    }

    pub fn run(&mut self) -> Outcome {
        self.steps = 0;
        while let Some(frame) = self.stack.pop() {
            let Frame::Stmt(stmt, env) = frame else {
                // try body finished normally
                continue;
            };
            if self.max_steps > 0 && self.steps >= self.max_steps {
                self.stack.clear();
                return Outcome::Halt(Value::error(
                    "StepLimitError",
                    format!("exceeded {} steps", self.max_steps),
                ));
            }
            self.steps += 1;
            trace!(step = self.steps, depth = self.stack.len(), "exec");
            match self.exec(&stmt, &env) {
                Ok(()) => {}
                Err(Interrupt::Suspend(var)) => {
                    self.stack.push(Frame::Stmt(stmt, env));
                    return Outcome::Suspend(self.store.root(var));
                }
                Err(Interrupt::Throw(value)) => {
                    if let Some(value) = self.unwind(value) {
                        return Outcome::Halt(value);
                    }
                }
            }
        }
        Outcome::Done
    }

    fn unwind(&mut self, value: Value) -> Option<Value> {
        while let Some(frame) = self.stack.pop() {
            if let Frame::Catch { ident, handler, env } = frame {
                let var = self.store.bound(value);
                self.push(handler, env.extend(vec![(ident, var)]));
                return None;
            }
        }
        debug!(value = %self.store.format(&value), "uncaught throw");
        Some(value)
    }

    fn exec(&mut self, stmt: &Arc<Stmt>, env: &Env) -> Result<(), Interrupt> {
        match stmt.as_ref() {
            Stmt::Local { idents, body } => {
                let bindings = idents.iter().map(|i| (i.clone(), self.store.new_var())).collect();
                let env = env.extend(bindings);
                self.push(body.clone(), env);
            }
            Stmt::Seq(stmts) => {
                for stmt in stmts.iter().rev() {
                    self.push(stmt.clone(), env.clone());
                }
            }
            Stmt::Skip | Stmt::JumpCatch(_) => {}
            Stmt::Bind { arg, target } => {
                let value = self.arg(arg, env)?;
                let target = self.var(target, env)?;
                self.bind(target, value)?;
            }
            Stmt::BinOp { op, left, right, target } => {
                let left = self.arg(left, env)?;
                let right = self.arg(right, env)?;
                let target = self.var(target, env)?;
                let result = match op {
                    BinPrim::Eq | BinPrim::Ne => {
                        let equal = self.store.equals(&left, &right).map_err(Interrupt::Suspend)?;
                        Value::Bool(equal == (*op == BinPrim::Eq))
                    }
                    BinPrim::Lt | BinPrim::Gt | BinPrim::Le | BinPrim::Ge => {
                        let left = self.determined(&left)?;
                        let right = self.determined(&right)?;
                        Value::Bool(ops::compare(*op, &left, &right).map_err(Interrupt::Throw)?)
                    }
                    BinPrim::Add | BinPrim::Sub | BinPrim::Mult | BinPrim::Div | BinPrim::Mod => {
                        let left = self.determined(&left)?;
                        let right = self.determined(&right)?;
                        ops::arith(*op, &left, &right).map_err(Interrupt::Throw)?
                    }
                };
                self.bind(target, result)?;
            }
            Stmt::Negate { arg, target } => {
                let value = self.determined(&self.arg(arg, env)?)?;
                let target = self.var(target, env)?;
                self.bind(target, ops::negate(&value).map_err(Interrupt::Throw)?)?;
            }
            Stmt::Get { cell, target } => {
                let cell = self.cell(cell, env)?;
                let target = self.var(target, env)?;
                let value = self.store.cell(cell);
                self.bind(target, value)?;
            }
            Stmt::Set { cell, value } => {
                let cell = self.cell(cell, env)?;
                let value = self.arg(value, env)?;
                self.store.set_cell(cell, value);
            }
            Stmt::Select { rec, feature, target } => {
                let rec = self.determined(&self.arg(rec, env)?)?;
                let feature = self.feature(feature, env)?;
                let target = self.var(target, env)?;
                let field = self.select(&rec, &feature)?;
                self.bind(target, field)?;
            }
            Stmt::SelectApply { rec, path, args } => self.select_apply(rec, path, args, env)?,
            Stmt::CreateRec { label, fields, target } => {
                let label = match label {
                    Some(label) => Some(self.feature(label, env)?),
                    None => None,
                };
                let mut pairs = Vec::with_capacity(fields.len());
                for (feature, value) in fields {
                    pairs.push((self.feature(feature, env)?, self.arg(value, env)?));
                }
                let target = self.var(target, env)?;
                let rec = Rec::new(label, pairs).map_err(|feature| {
                    Interrupt::error(
                        "TypeError",
                        format!("duplicate feature {}", store::format_feature(&feature)),
                    )
                })?;
                self.bind(target, Value::Rec(Arc::new(rec)))?;
            }
            Stmt::CreateTuple { label, values, target } => {
                let label = match label {
                    Some(label) => Some(self.feature(label, env)?),
                    None => None,
                };
                let values = values.iter().map(|v| self.arg(v, env)).collect::<Result<Vec<_>, _>>()?;
                let target = self.var(target, env)?;
                self.bind(target, Value::Rec(Arc::new(Rec::tuple(label, values))))?;
            }
            Stmt::CreateProc { def, target } => {
                let proc = self.closure(def, env)?;
                let target = self.var(target, env)?;
                self.bind(target, Value::Proc(Arc::new(proc)))?;
            }
            Stmt::CreateActorCfgtr { def, target } => {
                let proc = self.closure(def, env)?;
                let target = self.var(target, env)?;
                self.bind(target, Value::ActorCfgtr(Arc::new(proc)))?;
            }
            Stmt::Apply { proc, args } => {
                let proc = self.determined(&self.arg(proc, env)?)?;
                let args = match &proc {
                    Value::Proc(p) => without_result_target(args, p.arity()),
                    _ => &args[..],
                };
                let args = self.arg_vars(args, env)?;
                self.apply(proc, args)?;
            }
            Stmt::If { cond, then, otherwise } => match self.determined(&self.arg(cond, env)?)? {
                Value::Bool(true) => self.push(then.clone(), env.clone()),
                Value::Bool(false) => self.push(otherwise.clone(), env.clone()),
                other => {
                    return Err(Interrupt::error(
                        "TypeError",
                        format!("an if condition must be a Bool, got {}", other.type_name()),
                    ));
                }
            },
            Stmt::Case { arg, pat, then, otherwise } => {
                let value = self.arg(arg, env)?;
                match self.match_pat(&value, pat, env)? {
                    Some(captures) => self.push(then.clone(), env.extend(captures)),
                    None => self.push(otherwise.clone(), env.clone()),
                }
            }
            Stmt::Try { body, catch, handler } => {
                self.stack.push(Frame::Catch { ident: catch.clone(), handler: handler.clone(), env: env.clone() });
                self.push(body.clone(), env.clone());
            }
            Stmt::Throw(arg) => return Err(Interrupt::Throw(self.arg(arg, env)?)),
            Stmt::JumpThrow(label) => self.jump(*label)?,
        }
        Ok(())
    }

    /// Pops frames, catch markers included, up to `$jump_catch(label)`.
    fn jump(&mut self, label: u32) -> Result<(), Interrupt> {
        while let Some(frame) = self.stack.pop() {
            if let Frame::Stmt(stmt, _) = &frame {
                if matches!(stmt.as_ref(), Stmt::JumpCatch(other) if *other == label) {
                    return Ok(());
                }
            }
        }
        Err(Interrupt::error("JumpError", format!("no $jump_catch({label}) is active")))
    }

    // ---- Operand access ----

    fn arg(&self, arg: &Arg, env: &Env) -> Result<Value, Interrupt> {
        match arg {
            Arg::Lit(lit) => Ok(Value::from_lit(lit)),
            Arg::Ident(ident) => self.var(ident, env).map(Value::Var),
        }
    }

    fn var(&self, ident: &Ident, env: &Env) -> Result<VarId, Interrupt> {
        env.get(ident).ok_or_else(|| {
            Interrupt::error("IdentNotFoundError", format!("identifier '{ident}' is not declared"))
        })
    }

    fn arg_vars(&mut self, args: &[Arg], env: &Env) -> Result<Vec<VarId>, Interrupt> {
        let mut vars = Vec::with_capacity(args.len());
        for arg in args {
            vars.push(match arg {
                Arg::Lit(lit) => self.store.bound(Value::from_lit(lit)),
                Arg::Ident(ident) => self.var(ident, env)?,
            });
        }
        Ok(vars)
    }

    /// The bound value, or a suspension on the unbound variable.
    pub(crate) fn determined(&self, value: &Value) -> Result<Value, Interrupt> {
        match self.store.resolve(value) {
            Value::Var(var) => Err(Interrupt::Suspend(var)),
            value => Ok(value),
        }
    }

    pub(crate) fn bind(&mut self, var: VarId, value: Value) -> Result<(), Interrupt> {
        self.store
            .unify(&Value::Var(var), &value)
            .map_err(|err| Interrupt::error("UnificationError", err.to_string()))
    }

    fn feature(&self, arg: &Arg, env: &Env) -> Result<Feature, Interrupt> {
        let value = self.determined(&self.arg(arg, env)?)?;
        Feature::from_value(&value).ok_or_else(|| {
            Interrupt::error(
                "TypeError",
                format!("{} cannot be a record feature", value.type_name()),
            )
        })
    }

    fn cell(&self, arg: &Arg, env: &Env) -> Result<CellId, Interrupt> {
        match self.determined(&self.arg(arg, env)?)? {
            Value::Cell(cell) => Ok(cell),
            other => Err(Interrupt::error(
                "TypeError",
                format!("expected a Cell, got {}", other.type_name()),
            )),
        }
    }

    fn select(&self, target: &Value, feature: &Feature) -> Result<Value, Interrupt> {
        match target {
            Value::Rec(rec) => rec.get(feature).cloned().ok_or_else(|| {
                Interrupt::error(
                    "FeatureNotFoundError",
                    format!(
                        "feature {} not found in {}",
                        store::format_feature(feature),
                        self.store.format(target)
                    ),
                )
            }),
            other => Err(Interrupt::error(
                "TypeError",
                format!("cannot select {} from {}", store::format_feature(feature), other.type_name()),
            )),
        }
    }

    pub(crate) fn export(&self, value: &Value) -> Result<Portable, Interrupt> {
        self.store
            .export(value)
            .map_err(|err| Interrupt::error("NotPortableError", err.to_string()))
    }

    // ---- Procs ----

    fn closure(&self, def: &Arc<ProcDef>, env: &Env) -> Result<Proc, Interrupt> {
        let mut captured = Vec::with_capacity(def.free.len());
        for ident in &def.free {
            captured.push((ident.clone(), self.var(ident, env)?));
        }
        Ok(Proc::Closure { def: def.clone(), env: captured })
    }

    pub(crate) fn apply(&mut self, proc: Value, args: Vec<VarId>) -> Result<(), Interrupt> {
        let proc = match proc {
            Value::Proc(proc) => proc,
            other => {
                return Err(Interrupt::error(
                    "NotProcError",
                    format!("{} is not a proc", self.store.format(&other)),
                ));
            }
        };
        if proc.arity() != args.len() {
            return Err(Interrupt::error(
                "ArityError",
                format!("expected {} arguments, got {}", proc.arity(), args.len()),
            ));
        }
        match proc.as_ref() {
            Proc::Closure { def, env } => {
                let mut bindings = env.clone();
                bindings.extend(def.params.iter().cloned().zip(args));
                self.push(def.body.clone(), Env::default().extend(bindings));
                Ok(())
            }
            Proc::Native { func, .. } => {
                let func = func.clone();
                func(self, &args)
            }
        }
    }

    fn select_apply(&mut self, rec: &Arg, path: &[Arg], args: &[Arg], env: &Env) -> Result<(), Interrupt> {
        let mut target = self.determined(&self.arg(rec, env)?)?;
        let path = path.iter().map(|f| self.feature(f, env)).collect::<Result<Vec<_>, _>>()?;
        let Some((method, prefix)) = path.split_last() else {
            return Err(Interrupt::error("TypeError", "$select_apply needs a feature path"));
        };
        for feature in prefix {
            target = self.determined(&self.select(&target, feature)?)?;
        }
        match target {
            Value::Rec(_) => {
                let proc = self.determined(&self.select(&target, method)?)?;
                let args = match &proc {
                    Value::Proc(p) => without_result_target(args, p.arity()),
                    _ => &args[..],
                };
                let args = self.arg_vars(args, env)?;
                self.apply(proc, args)
            }
            Value::ActorRef(actor) => {
                let takes = if *method == Feature::str("tell") { 1 } else { 2 };
                let args = without_result_target(args, takes);
                let args = self.arg_vars(args, env)?;
                self.send(&actor, method, args)
            }
            Value::ActorCfgtr(cfgtr) if *method == Feature::str("cfg") => {
                let args = self.arg_vars(args, env)?;
                self.configure(cfgtr, args)
            }
            other => Err(Interrupt::error(
                "TypeError",
                format!("cannot apply {} on {}", store::format_feature(method), other.type_name()),
            )),
        }
    }

    /// `cfgtr.cfg(args...[, target])`
    fn configure(&mut self, cfgtr: Arc<Proc>, mut args: Vec<VarId>) -> Result<(), Interrupt> {
        let params = cfgtr.arity().saturating_sub(1);
        let target = if args.len() == params + 1 {
            args.pop()
        } else if args.len() == params {
            None
        } else {
            return Err(Interrupt::error(
                "ArityError",
                format!("cfg expected {params} arguments, got {}", args.len()),
            ));
        };
        let cfg = ActorCfg { cfgtr, args: args.into_iter().map(Value::Var).collect() };
        if let Some(target) = target {
            self.bind(target, Value::ActorCfg(Arc::new(cfg)))?;
        }
        Ok(())
    }

    fn send(&mut self, actor: &ActorRef, method: &Feature, args: Vec<VarId>) -> Result<(), Interrupt> {
        let Some(me) = self.self_ref.clone() else {
            return Err(Interrupt::error("TypeError", "messaging an actor needs the actor runtime"));
        };
        let is_ask = match method {
            Feature::Str(name) if &**name == "ask" => true,
            Feature::Str(name) if &**name == "tell" => false,
            other => {
                return Err(Interrupt::error(
                    "FeatureNotFoundError",
                    format!("actors answer 'ask' and 'tell', not {}", store::format_feature(other)),
                ));
            }
        };
        let expected = if is_ask { 1..=2 } else { 1..=1 };
        if !expected.contains(&args.len()) {
            return Err(Interrupt::error(
                "ArityError",
                format!("{} takes {} arguments, got {}", store::format_feature(method), expected.end(), args.len()),
            ));
        }
        let message = self.determined(&Value::Var(args[0]))?;
        let message = self.export(&message)?;

        let envelope = if is_ask {
            let request_id = self.next_request;
            self.next_request += 1;
            let result = match args.get(1) {
                Some(var) => *var,
                None => self.store.new_var(),
            };
            self.pending.insert(request_id, result);
            Envelope::request(message, request_id, me)
        } else {
            Envelope::notify(message)
        };
        actor.send(envelope).map_err(|_| {
            Interrupt::error("ActorStoppedError", format!("actor {} has stopped", actor.id()))
        })
    }

    /// Starts an actor from a configuration; needs the actor runtime.
    pub(crate) fn spawn(&mut self, cfg: &Value) -> Result<ActorRef, Interrupt> {
        if self.self_ref.is_none() {
            return Err(Interrupt::error("TypeError", "spawn needs the actor runtime"));
        }
        let cfg = self.export(cfg)?;
        let (actor, mailbox) = ActorRef::channel();
        debug!(actor = actor.id(), "spawn requested");
        self.effects.push(Effect::Spawn { actor: actor.clone(), mailbox, cfg });
        Ok(actor)
    }

    // ---- Pattern matching ----

    /// `Some(captures)` on a match. Suspends only when no field already
    /// rules the match out.
    fn match_pat(&mut self, value: &Value, pat: &Pat, env: &Env) -> Result<Option<Vec<(Ident, VarId)>>, Interrupt> {
        match pat {
            Pat::Ident(ident) => Ok(Some(vec![(ident.clone(), self.store.bound(value.clone()))])),
            Pat::Lit(lit) => {
                let value = self.determined(value)?;
                let equal = self.store.equals(&value, &Value::from_lit(lit)).map_err(Interrupt::Suspend)?;
                Ok(equal.then(Vec::new))
            }
            Pat::Escaped(ident) => {
                let pinned = Value::Var(self.var(ident, env)?);
                let entailed = self.store.entails(&pinned, value).map_err(Interrupt::Suspend)?;
                Ok(entailed.then(Vec::new))
            }
            Pat::Rec(pat) => self.match_rec(value, pat, env),
        }
    }

    fn match_rec(&mut self, value: &Value, pat: &RecPat, env: &Env) -> Result<Option<Vec<(Ident, VarId)>>, Interrupt> {
        let Value::Rec(rec) = self.determined(value)? else {
            return Ok(None);
        };
        let label = match &pat.label {
            Some(label) => Some(self.feat_pat(label, env)?),
            None => None,
        };
        if rec.label != label {
            return Ok(None);
        }
        if !pat.partial && rec.len() != pat.fields.len() {
            return Ok(None);
        }

        let mut captures: Vec<(Ident, VarId)> = Vec::new();
        let mut undetermined = None;
        for (feature, leaf) in &pat.fields {
            let feature = self.feat_pat(feature, env)?;
            let Some(field) = rec.get(&feature) else {
                return Ok(None);
            };
            let verdict = match leaf {
                LeafPat::Ident(ident) => {
                    let var = self.store.bound(field.clone());
                    match captures.iter().find(|(name, _)| name == ident) {
                        Some((_, first)) => self.store.equals(&Value::Var(*first), &Value::Var(var)),
                        None => {
                            captures.push((ident.clone(), var));
                            Ok(true)
                        }
                    }
                }
                LeafPat::Lit(lit) => self.store.equals(field, &Value::from_lit(lit)),
                LeafPat::Escaped(ident) => {
                    let pinned = Value::Var(self.var(ident, env)?);
                    self.store.entails(&pinned, field)
                }
            };
            match verdict {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(var) => {
                    undetermined.get_or_insert(var);
                }
            }
        }
        match undetermined {
            Some(var) => Err(Interrupt::Suspend(var)),
            None => Ok(Some(captures)),
        }
    }

    fn feat_pat(&self, pat: &FeatPat, env: &Env) -> Result<Feature, Interrupt> {
        match pat {
            FeatPat::Lit(lit) => Feature::from_lit(lit)
                .ok_or_else(|| Interrupt::error("TypeError", "a pattern feature must be a feature literal")),
            FeatPat::Escaped(ident) => self.feature(&Arg::Ident(ident.clone()), env),
        }
    }
}

/// A program's final sentence always delivers to [`RESULT`]. When it calls
/// something that takes no result argument, the target is dropped and the
/// program ends without a value.
fn without_result_target(args: &[Arg], takes: usize) -> &[Arg] {
    match args.split_last() {
        Some((Arg::Ident(last), rest)) if last.as_str() == RESULT && rest.len() == takes => rest,
        _ => args,
    }
}

/// Runs a compiled program to completion on a fresh machine, without the
/// actor runtime. The program's value is read from [`RESULT`].
pub fn evaluate(stmt: Stmt, max_steps: u64) -> Evaluation {
    let mut machine = Machine::new(max_steps);
    let result = machine.declare(RESULT);
    let env = machine.root_env().clone();
    machine.push(Arc::new(stmt), env);
    let (status, value, error) = match machine.run() {
        Outcome::Done => (Status::Done, machine.format(&Value::Var(result)), None),
        Outcome::Suspend(var) => {
            debug!(?var, "program suspended with no one to bind the variable");
            (Status::Suspended, machine.format(&Value::Var(result)), None)
        }
        Outcome::Halt(value) => {
            let error = machine.store().resolve(&value).error_name().map(str::to_string);
            (Status::Halted, machine.format(&value), error)
        }
    };
    Evaluation { status, value, error, halts: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{generate, Target};
    use crate::{lexer, parser};

    fn eval(source: &str) -> Evaluation {
        let program = parser::parse(lexer::lex(source).unwrap()).unwrap();
        let stmt = generate(&program, &Target::Ident(Ident::new(RESULT))).unwrap();
        evaluate(stmt, 100_000)
    }

    fn value(source: &str) -> String {
        let evaluation = eval(source);
        assert_eq!(evaluation.status, Status::Done, "{}", evaluation.value);
        evaluation.value
    }

    fn halted(source: &str) -> String {
        let evaluation = eval(source);
        assert_eq!(evaluation.status, Status::Halted, "{}", evaluation.value);
        evaluation.value
    }

    #[test]
    fn arithmetic() {
        assert_eq!(value("2 + 3 * 5"), "17");
        assert_eq!(value("7 / 2"), "3");
        assert_eq!(value("7 % 4"), "3");
        assert_eq!(value("1 + 2L"), "3L");
        assert_eq!(value("1.5m + 1m"), "2.5m");
        assert_eq!(value("'ab' + 'c'"), "'abc'");
        assert_eq!(value("-(3)"), "-3");
    }

    #[test]
    fn int32_never_equals_int64() {
        assert_eq!(value("1 == 1L"), "false");
        assert_eq!(value("1 + 1 == 2"), "true");
        assert_eq!(value("1 + 1L == 2L"), "true");
        assert_eq!(value("1 != 1L"), "true");
    }

    #[test]
    fn recursion() {
        let source = "
            func fact(n) in
                if n < 2 then 1 else n * fact(n - 1) end
            end
            fact(10)";
        assert_eq!(value(source), "3628800");
    }

    #[test]
    fn records_and_select() {
        assert_eq!(value("var r = 'p'#{'x': 1, 'y': 2} r.y"), "2");
        assert_eq!(value("var t = [10, 20, 30] t[1]"), "20");
        assert_eq!(value("'p'#{'x': 1}"), "'p'#{'x': 1}");
        let err = halted("var r = {'x': 1} r.z");
        assert!(err.starts_with("'error'#{"), "{err}");
        assert!(err.contains("'name': 'FeatureNotFoundError'"), "{err}");
    }

    #[test]
    fn cyclic_value_prints_circular() {
        assert_eq!(
            value("var x var a = [x] var b = [a] a = b x"),
            "[<<circular>>]"
        );
    }

    #[test]
    fn short_circuit() {
        assert_eq!(value("true && false"), "false");
        assert_eq!(value("false || true"), "true");
        assert_eq!(value("!false"), "true");
        // the right side is never evaluated
        assert_eq!(value("false && 1 / 0 == 1"), "false");
    }

    #[test]
    fn for_loop_break_counts_three() {
        let source = "
            var count = Cell.new(0)
            for i in range(0, 5) do
                count := @count + 1
                if i == 2 then break end
            end
            @count";
        assert_eq!(value(source), "3");
    }

    #[test]
    fn for_loop_continue_adds_ten() {
        let source = "
            var count = Cell.new(0)
            for i in range(0, 5) do
                count := @count + 1
                if i == 1 then
                    count := @count + 10
                    continue
                end
                if i == 2 then break end
            end
            @count";
        assert_eq!(value(source), "13");
    }

    #[test]
    fn while_loop() {
        let source = "
            var i = Cell.new(0)
            var sum = Cell.new(0)
            while @i < 5 do
                sum := @sum + @i
                i := @i + 1
            end
            @sum";
        assert_eq!(value(source), "10");
    }

    #[test]
    fn long_loops_keep_the_stack_flat() {
        let source = "
            var n = Cell.new(0)
            while @n < 2000 do
                if @n == 5000 then break end
                n := @n + 1
            end
            @n";
        assert_eq!(value(source), "2000");
    }

    #[test]
    fn return_from_nested_loops() {
        let source = "
            func find(limit) in
                for i in range(0, limit) do
                    for j in range(0, limit) do
                        if i * j == 6 then return [i, j] end
                    end
                end
                null
            end
            find(10)";
        assert_eq!(value(source), "[1, 6]");
    }

    #[test]
    fn return_through_case_alternatives() {
        let source = "
            func classify(x) in
                var y = case x of 1 then 'one' of 2 then return 'early' else 'many' end
                y + '!'
            end
            var results = [classify(1), classify(2), classify(3)]
            results";
        assert_eq!(value(source), "['one!', 'early', 'many!']");
    }

    #[test]
    fn case_patterns() {
        let source = "
            func describe(v) in
                case v
                of 'point'#{'x': x, 'y': 0} then 'on axis'
                of 'point'#{'x': x, 'y': y} when x == y then 'diagonal'
                of [a, [b, c]] then a + b + c
                of {'k': _, ...} then 'has k'
                else 'other'
                end
            end
            var results = [describe('point'#{'x': 3, 'y': 0}), describe('point'#{'x': 2, 'y': 2}),
                describe([1, [2, 3]]), describe({'k': 1, 'j': 2}), describe(5)]
            results";
        assert_eq!(value(source), "['on axis', 'diagonal', 6, 'has k', 'other']");
    }

    #[test]
    fn escaped_pattern_pins_value() {
        let source = "
            var want = 3
            case [3, 4] of [~want, other] then other else 0 end";
        assert_eq!(value(source), "4");
    }

    #[test]
    fn finally_runs_once_on_each_path() {
        let source = "
            var runs = Cell.new(0)
            proc attempt(x) in
                try
                    if x > 0 then throw 'boom' end
                catch 'boom' then
                    skip
                finally
                    runs := @runs + 1
                end
            end
            attempt(0)
            attempt(1)
            try
                try throw 'other' catch 'boom' then skip finally runs := @runs + 1 end
            catch 'other' then
                skip
            end
            @runs";
        assert_eq!(value(source), "3");
    }

    #[test]
    fn finally_runs_when_catch_body_throws() {
        let source = "
            var runs = Cell.new(0)
            var caught = try
                try throw 'a' catch 'a' then throw 'b' finally runs := @runs + 1 end
            catch 'b' then
                'b'
            end
            var result = [caught, @runs]
            result";
        assert_eq!(value(source), "['b', 1]");
    }

    #[test]
    fn uncaught_throw_halts() {
        assert_eq!(halted("throw 'bad'"), "'bad'");
        let err = halted("1 / 0");
        assert!(err.contains("ArithmeticError"), "{err}");
    }

    #[test]
    fn runtime_errors_are_catchable_records() {
        let source = "
            try 1 + 'a'
            catch 'error'#{'name': name, ...} then name
            end";
        assert_eq!(value(source), "'TypeError'");
    }

    #[test]
    fn apply_errors() {
        assert!(halted("func f(x) in x end f(1, 2, 3)").contains("ArityError"));
        assert!(halted("var x = 5 x(1)").contains("NotProcError"));
    }

    #[test]
    fn unification_failure_throws() {
        assert!(halted("var x = 1 x = 2").contains("UnificationError"));
    }

    #[test]
    fn unbound_operand_suspends() {
        let evaluation = eval("var x x + 1");
        assert_eq!(evaluation.status, Status::Suspended);
        assert_eq!(evaluation.value, "_");
    }

    #[test]
    fn rec_assign() {
        assert_eq!(
            value("Rec.assign({'a': 1, 'b': 4, 'c': 5}, {'a': 1, 'b': 2})"),
            "{'a': 1, 'b': 4, 'c': 5}"
        );
        assert_eq!(value("Rec.size({'a': 1, 'b': 2})"), "2");
    }

    #[test]
    fn assert_bound_and_tokens() {
        assert!(halted("var x assert_bound(x)").contains("NotBoundError"));
        assert_eq!(value("var x = 1 assert_bound(x)"), "_");
        assert_eq!(value("var a = Token.new() var b = Token.new() a == b"), "false");
    }

    #[test]
    fn program_may_end_in_a_proc_call() {
        let evaluation = eval("proc p() in skip end p()");
        assert_eq!(evaluation.status, Status::Done);
        assert_eq!(evaluation.value, "_");

        let source = "
            var c = Cell.new(0)
            var ops = {'bump': proc (n) in c := @c + n end}
            ops.bump(2)";
        assert_eq!(eval(source).status, Status::Done);
        assert!(halted("proc p() in skip end p(1, 2)").contains("ArityError"));
    }

    #[test]
    fn spawn_requires_runtime() {
        let source = "actor A() in skip end spawn(A.cfg())";
        assert!(halted(source).contains("TypeError"));
    }

    #[test]
    fn step_limit_halts() {
        let program = parser::parse(lexer::lex("while true do skip end").unwrap()).unwrap();
        let stmt = generate(&program, &Target::Ident(Ident::new(RESULT))).unwrap();
        let evaluation = evaluate(stmt, 500);
        assert_eq!(evaluation.status, Status::Halted);
        assert!(evaluation.value.contains("StepLimitError"));
    }

    #[test]
    fn closures_capture_their_scope() {
        let source = "
            func adder(n) in func (x) in x + n end end
            var add5 = adder(5)
            add5(10)";
        assert_eq!(value(source), "15");
    }
}
