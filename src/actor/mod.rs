//! Actor runtime.
//!
//! Every actor is one tokio task owning one [`Machine`] and one unbounded
//! mailbox. Messages cross actors only as [`Portable`] snapshots. A turn
//! handles one envelope to completion; while a turn waits for an `ask`
//! response, other envelopes are deferred until the turn ends.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::kernel::Stmt;
use crate::machine::{Effect, Evaluation, Feature, Machine, Outcome, Portable, Status, Value, VarId, RESULT};

static NEXT_ACTOR: AtomicU64 = AtomicU64::new(0);

/// Address of an actor's mailbox.
#[derive(Debug, Clone)]
pub struct ActorRef {
    id: u64,
    tx: UnboundedSender<Envelope>,
}

#[derive(Debug, thiserror::Error)]
#[error("actor {0} has stopped")]
pub struct Stopped(pub u64);

impl ActorRef {
    /// A fresh address together with the mailbox it delivers to.
    pub fn channel() -> (ActorRef, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_ACTOR.fetch_add(1, Ordering::Relaxed);
        (ActorRef { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, envelope: Envelope) -> Result<(), Stopped> {
        self.tx.send(envelope).map_err(|_| Stopped(self.id))
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Stop,
}

#[derive(Debug)]
pub enum Message {
    Control(Control),
    Data(Portable),
}

/// A message plus its routing: a notify has neither field, a request has
/// both, a response carries only the request id.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub request_id: Option<u64>,
    pub requester: Option<ActorRef>,
}

impl Envelope {
    pub fn notify(message: Portable) -> Envelope {
        Envelope { message: Message::Data(message), request_id: None, requester: None }
    }

    pub fn request(message: Portable, request_id: u64, requester: ActorRef) -> Envelope {
        Envelope { message: Message::Data(message), request_id: Some(request_id), requester: Some(requester) }
    }

    pub fn response(message: Portable, request_id: u64) -> Envelope {
        Envelope { message: Message::Data(message), request_id: Some(request_id), requester: None }
    }

    pub fn control(control: Control) -> Envelope {
        Envelope { message: Message::Control(control), request_id: None, requester: None }
    }

    pub fn is_control(&self) -> bool {
        matches!(self.message, Message::Control(_))
    }

    pub fn is_notify(&self) -> bool {
        !self.is_control() && self.request_id.is_none()
    }

    pub fn is_request(&self) -> bool {
        !self.is_control() && self.requester.is_some()
    }

    pub fn is_response(&self) -> bool {
        !self.is_control() && self.request_id.is_some() && self.requester.is_none()
    }
}

/// An actor that stopped on an uncaught throw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltReport {
    pub actor: u64,
    /// `name` of the thrown error record, if it was one.
    pub name: Option<String>,
    pub message: String,
}

struct System {
    max_steps: u64,
    actors: Mutex<Vec<(ActorRef, JoinHandle<()>)>>,
    halts: Mutex<Vec<HaltReport>>,
}

impl System {
    fn new(max_steps: u64) -> Arc<System> {
        Arc::new(System { max_steps, actors: Mutex::new(Vec::new()), halts: Mutex::new(Vec::new()) })
    }

    fn start(self: &Arc<Self>, effect: Effect) {
        let Effect::Spawn { actor, mailbox, cfg } = effect;
        debug!(actor = actor.id(), "starting actor");
        let task = tokio::spawn(run_actor(Arc::clone(self), actor.clone(), mailbox, cfg));
        self.actors.lock().push((actor, task));
    }

    fn halted(&self, report: HaltReport) {
        error!(actor = report.actor, name = ?report.name, message = %report.message, "actor halted");
        self.halts.lock().push(report);
    }

    /// Stops every actor once its queued messages are handled. Actors
    /// spawned during the drain are stopped in a later round.
    async fn shutdown(&self) {
        loop {
            let actors = std::mem::take(&mut *self.actors.lock());
            if actors.is_empty() {
                break;
            }
            for (actor, _) in &actors {
                if actor.send(Envelope::control(Control::Stop)).is_err() {
                    debug!(actor = actor.id(), "already stopped");
                }
            }
            for (actor, task) in actors {
                if let Err(err) = task.await {
                    error!(actor = actor.id(), %err, "actor task failed");
                }
            }
        }
    }
}

/// How a computation driven to rest ended.
enum Turn {
    Done,
    /// Blocked on a variable nothing will bind.
    Suspended(VarId),
    Halted(Value),
    /// A stop arrived while waiting on a response.
    Stopped,
}

/// Runs the machine until it rests, carrying out its effects and feeding it
/// `ask` responses. A turn is not over while any of its asks is unanswered.
/// Other envelopes that arrive meanwhile are deferred.
async fn drive(
    machine: &mut Machine,
    mailbox: &mut UnboundedReceiver<Envelope>,
    deferred: &mut VecDeque<Envelope>,
    system: &Arc<System>,
) -> Turn {
    loop {
        let outcome = machine.run();
        for effect in machine.take_effects() {
            system.start(effect);
        }
        match outcome {
            Outcome::Done if !machine.has_pending() => return Turn::Done,
            Outcome::Done => debug!("waiting on outstanding asks"),
            Outcome::Halt(value) => return Turn::Halted(value),
            Outcome::Suspend(var) if !machine.has_pending() => return Turn::Suspended(var),
            Outcome::Suspend(_) => {}
        }
        loop {
            let Some(envelope) = mailbox.recv().await else {
                return Turn::Stopped;
            };
            if envelope.is_control() {
                return Turn::Stopped;
            }
            if let (true, Some(request_id), Message::Data(response)) =
                (envelope.is_response(), envelope.request_id, &envelope.message)
            {
                debug!(request_id, "response received");
                machine.respond(request_id, response);
                break;
            }
            deferred.push_back(envelope);
        }
    }
}

/// Runs a compiled program as the root actor. Returns once the program is
/// at rest and every spawned actor has drained its mailbox and stopped.
pub async fn run_program(stmt: Stmt, max_steps: u64) -> Evaluation {
    let system = System::new(max_steps);
    let (me, mut mailbox) = ActorRef::channel();
    let mut machine = Machine::new(max_steps).with_self_ref(me);
    let result = machine.declare(RESULT);
    let env = machine.root_env().clone();
    machine.push(Arc::new(stmt), env);

    let mut deferred = VecDeque::new();
    let turn = drive(&mut machine, &mut mailbox, &mut deferred, &system).await;
    let (status, value, error) = match turn {
        Turn::Done => (Status::Done, machine.format(&Value::Var(result)), None),
        Turn::Suspended(_) | Turn::Stopped => (Status::Suspended, machine.format(&Value::Var(result)), None),
        Turn::Halted(value) => {
            let error = machine.store().resolve(&value).error_name().map(str::to_string);
            (Status::Halted, machine.format(&value), error)
        }
    };
    if !deferred.is_empty() {
        warn!(count = deferred.len(), "root discarded unexpected messages");
    }
    system.shutdown().await;
    let halts = std::mem::take(&mut *system.halts.lock());
    Evaluation { status, value, error, halts }
}

struct Handlers {
    ask: Value,
    tell: Value,
}

fn error_portable(name: &str, message: impl Into<String>) -> Portable {
    Portable::atom(Value::error(name, message))
}

/// Snapshot of a reply; unbound or unportable values become error records.
fn reply(machine: &Machine, value: &Value) -> Portable {
    match machine.store().resolve(value) {
        Value::Var(_) => error_portable("NotBoundError", "the ask handler left its result unbound"),
        value => machine
            .store()
            .export(&value)
            .unwrap_or_else(|err| error_portable("NotPortableError", err.to_string())),
    }
}

fn halt_report(actor: u64, machine: &Machine, value: &Value) -> HaltReport {
    let value = machine.store().resolve(value);
    HaltReport { actor, name: value.error_name().map(str::to_string), message: machine.format(&value) }
}

/// Applies the configurator and returns the handler pair it builds.
async fn configure(
    machine: &mut Machine,
    mailbox: &mut UnboundedReceiver<Envelope>,
    deferred: &mut VecDeque<Envelope>,
    system: &Arc<System>,
    id: u64,
    cfg: &Portable,
) -> Result<Handlers, HaltReport> {
    let failed = |message: String| HaltReport { actor: id, name: Some("TypeError".to_string()), message };
    let cfg = machine.store_mut().import(cfg).map_err(|err| failed(err.to_string()))?;
    let Value::ActorCfg(cfg) = machine.store().resolve(&cfg) else {
        return Err(failed("spawn expects an actor configuration".to_string()));
    };
    let mut args: Vec<VarId> = cfg.args.iter().map(|arg| machine.store_mut().bound(arg.clone())).collect();
    let result = machine.store_mut().new_var();
    args.push(result);
    machine.push_apply(Value::Proc(cfg.cfgtr.clone()), args);

    match drive(machine, mailbox, deferred, system).await {
        Turn::Done => {}
        Turn::Halted(value) => return Err(halt_report(id, machine, &value)),
        Turn::Suspended(_) | Turn::Stopped => {
            return Err(HaltReport {
                actor: id,
                name: Some("NotBoundError".to_string()),
                message: "actor configuration did not complete".to_string(),
            });
        }
    }

    let handlers = match machine.store().resolve(&Value::Var(result)) {
        Value::Rec(rec) if rec.label == Some(Feature::str("handlers")) => rec,
        other => return Err(failed(format!("configurator produced {}", machine.format(&other)))),
    };
    let handler = |index: i32| {
        handlers
            .get(&Feature::Int32(index))
            .map(|value| machine.store().resolve(value))
            .ok_or_else(|| failed("configurator produced an incomplete handler pair".to_string()))
    };
    Ok(Handlers { ask: handler(0)?, tell: handler(1)? })
}

async fn run_actor(system: Arc<System>, me: ActorRef, mut mailbox: UnboundedReceiver<Envelope>, cfg: Portable) {
    let id = me.id();
    let mut machine = Machine::new(system.max_steps).with_self_ref(me);
    let mut deferred = VecDeque::new();

    let handlers = match configure(&mut machine, &mut mailbox, &mut deferred, &system, id, &cfg).await {
        Ok(handlers) => handlers,
        Err(report) => {
            system.halted(report);
            refuse_remaining(id, mailbox, deferred);
            return;
        }
    };
    debug!(actor = id, "actor configured");

    loop {
        let envelope = match deferred.pop_front() {
            Some(envelope) => envelope,
            None => match mailbox.recv().await {
                Some(envelope) => envelope,
                None => break,
            },
        };
        let Envelope { message, request_id, requester } = envelope;
        let message = match message {
            Message::Control(Control::Stop) => {
                debug!(actor = id, "stop received");
                break;
            }
            Message::Data(message) => message,
        };
        if let (Some(request_id), None) = (request_id, &requester) {
            // response to an ask whose turn already ended
            machine.respond(request_id, &message);
            continue;
        }
        let message = match machine.store_mut().import(&message) {
            Ok(value) => machine.store_mut().bound(value),
            Err(err) => {
                warn!(actor = id, %err, "dropping unreadable message");
                continue;
            }
        };

        match (requester, request_id) {
            (Some(requester), Some(request_id)) => {
                debug!(actor = id, request_id, "ask turn");
                let result = machine.store_mut().new_var();
                machine.push_apply(handlers.ask.clone(), vec![message, result]);
                let (response, stop) = match drive(&mut machine, &mut mailbox, &mut deferred, &system).await {
                    Turn::Done => (reply(&machine, &Value::Var(result)), false),
                    Turn::Halted(value) => (reply(&machine, &value), false),
                    Turn::Suspended(_) => {
                        machine.abandon();
                        (error_portable("NotBoundError", "the ask handler is waiting on an unbound variable"), false)
                    }
                    Turn::Stopped => {
                        machine.abandon();
                        (error_portable("ActorStoppedError", format!("actor {id} stopped")), true)
                    }
                };
                if requester.send(Envelope::response(response, request_id)).is_err() {
                    warn!(actor = id, requester = requester.id(), "requester is gone");
                }
                if stop {
                    break;
                }
            }
            _ => {
                debug!(actor = id, "tell turn");
                machine.push_apply(handlers.tell.clone(), vec![message]);
                match drive(&mut machine, &mut mailbox, &mut deferred, &system).await {
                    Turn::Done => {}
                    Turn::Suspended(var) => {
                        warn!(actor = id, ?var, "tell handler abandoned on an unbound variable");
                        machine.abandon();
                    }
                    Turn::Halted(value) => {
                        system.halted(halt_report(id, &machine, &value));
                        break;
                    }
                    Turn::Stopped => {
                        machine.abandon();
                        break;
                    }
                }
            }
        }
    }
    refuse_remaining(id, mailbox, deferred);
    debug!(actor = id, "actor stopped");
}

/// Answers every request still queued with `ActorStoppedError`.
fn refuse_remaining(id: u64, mut mailbox: UnboundedReceiver<Envelope>, deferred: VecDeque<Envelope>) {
    mailbox.close();
    let mut queued: Vec<Envelope> = deferred.into();
    while let Ok(envelope) = mailbox.try_recv() {
        queued.push(envelope);
    }
    for envelope in queued {
        if let (Some(requester), Some(request_id)) = (envelope.requester, envelope.request_id) {
            let response = error_portable("ActorStoppedError", format!("actor {id} stopped"));
            if requester.send(Envelope::response(response, request_id)).is_err() {
                debug!(actor = id, "requester is gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{generate, Target};
    use crate::kernel::Ident;
    use crate::{lexer, parser};

    async fn run(source: &str) -> Evaluation {
        let program = parser::parse(lexer::lex(source).unwrap()).unwrap();
        let stmt = generate(&program, &Target::Ident(Ident::new(RESULT))).unwrap();
        run_program(stmt, 1_000_000).await
    }

    #[test]
    fn envelope_kinds() {
        let (me, _rx) = ActorRef::channel();
        let notify = Envelope::notify(Portable::atom(Value::Null));
        assert!(notify.is_notify() && !notify.is_request() && !notify.is_response());
        let request = Envelope::request(Portable::atom(Value::Null), 7, me);
        assert!(request.is_request() && !request.is_notify() && !request.is_response());
        let response = Envelope::response(Portable::atom(Value::Null), 7);
        assert!(response.is_response() && !response.is_request());
        let stop = Envelope::control(Control::Stop);
        assert!(stop.is_control() && !stop.is_notify());
    }

    #[test]
    fn send_after_close_fails() {
        let (actor, rx) = ActorRef::channel();
        drop(rx);
        assert!(actor.send(Envelope::control(Control::Stop)).is_err());
    }

    #[tokio::test]
    async fn ask_gets_a_response() {
        let evaluation = run("
            actor Echo() in
                handle ask 'ping' in 'pong' end
            end
            var e = spawn(Echo.cfg())
            e.ask('ping')")
        .await;
        assert_eq!(evaluation.status, Status::Done);
        assert_eq!(evaluation.value, "'pong'");
    }

    #[tokio::test]
    async fn ask_result_is_awaited_before_the_program_ends() {
        let evaluation = run("
            actor Echo() in
                handle ask 'ping' in 'pong' end
            end
            var e = spawn(Echo.cfg())
            var r = e.ask('ping')
            r")
        .await;
        assert_eq!(evaluation.status, Status::Done);
        assert_eq!(evaluation.value, "'pong'");
    }

    #[tokio::test]
    async fn handler_forwards_an_ask() {
        let evaluation = run("
            actor Doubler() in
                handle ask n in n * 2 end
            end
            actor Front(d) in
                handle ask n in d.ask(n) end
            end
            var front = spawn(Front.cfg(spawn(Doubler.cfg())))
            front.ask(20) + 0")
        .await;
        assert_eq!(evaluation.status, Status::Done);
        assert_eq!(evaluation.value, "40");
    }

    #[tokio::test]
    async fn response_that_does_not_unify_throws() {
        let evaluation = run("
            actor Echo() in
                handle ask 'ping' in 'pong' end
            end
            var e = spawn(Echo.cfg())
            var r = 5
            e.ask('ping', r)
            'after'")
        .await;
        assert_eq!(evaluation.status, Status::Halted);
        assert_eq!(evaluation.error.as_deref(), Some("UnificationError"));
    }

    #[tokio::test]
    async fn program_may_end_in_a_tell() {
        let evaluation = run("
            actor Sink() in
                handle tell _ in skip end
            end
            var s = spawn(Sink.cfg())
            s.tell('hello')")
        .await;
        assert_eq!(evaluation.status, Status::Done);
        assert!(evaluation.halts.is_empty());
    }

    #[tokio::test]
    async fn unmatched_ask_responds_with_error() {
        let evaluation = run("
            actor Echo() in
                handle ask 'ping' in 'pong' end
            end
            var e = spawn(Echo.cfg())
            var answer = e.ask('other')
            answer")
        .await;
        assert_eq!(evaluation.status, Status::Done);
        assert_eq!(evaluation.value, "'error'#{'message': 'other', 'name': 'AskNotHandledError'}");
        assert!(evaluation.halts.is_empty());
    }

    #[tokio::test]
    async fn unmatched_tell_halts_the_actor() {
        let evaluation = run("
            actor Echo() in
                handle ask 'ping' in 'pong' end
            end
            var e = spawn(Echo.cfg())
            e.tell('other')
            'sent'")
        .await;
        assert_eq!(evaluation.value, "'sent'");
        assert_eq!(evaluation.halts.len(), 1);
        assert_eq!(evaluation.halts[0].name.as_deref(), Some("TellNotHandledError"));
    }

    #[tokio::test]
    async fn tells_are_handled_in_order() {
        let evaluation = run("
            actor Counter(start) in
                var count = Cell.new(start)
                handle tell 'inc' in count := @count + 1 end
                handle ask 'get' in @count end
            end
            var c = spawn(Counter.cfg(5))
            c.tell('inc')
            c.tell('inc')
            c.ask('get')")
        .await;
        assert_eq!(evaluation.value, "7");
    }

    #[tokio::test]
    async fn handler_asks_another_actor() {
        let evaluation = run("
            actor Doubler() in
                handle ask n in n * 2 end
            end
            actor Front(d) in
                handle ask n in d.ask(n) + 1 end
            end
            var front = spawn(Front.cfg(spawn(Doubler.cfg())))
            front.ask(20)")
        .await;
        assert_eq!(evaluation.value, "41");
    }

    #[tokio::test]
    async fn records_cross_actors_by_copy() {
        let evaluation = run("
            actor Swap() in
                handle ask [a, b] in [b, a] end
            end
            var s = spawn(Swap.cfg())
            s.ask([1, 'two'])")
        .await;
        assert_eq!(evaluation.value, "['two', 1]");
    }

    #[tokio::test]
    async fn cells_cannot_be_sent() {
        let evaluation = run("
            actor Echo() in
                handle ask x in x end
            end
            var e = spawn(Echo.cfg())
            e.ask(Cell.new(1))")
        .await;
        assert_eq!(evaluation.status, Status::Halted);
        assert!(evaluation.value.contains("NotPortableError"), "{}", evaluation.value);
    }

    #[tokio::test]
    async fn root_halt_is_reported() {
        let evaluation = run("throw 'oops'").await;
        assert_eq!(evaluation.status, Status::Halted);
        assert_eq!(evaluation.value, "'oops'");
    }
}
