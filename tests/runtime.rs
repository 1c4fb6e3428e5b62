use torqlang::config::Config;
use torqlang::machine::Status;

fn value(source: &str) -> String {
    let evaluation = torqlang::evaluate(source).expect("compiles");
    assert_eq!(evaluation.status, Status::Done, "error: {:?}", evaluation.error);
    evaluation.value
}

async fn run(source: &str) -> torqlang::machine::Evaluation {
    torqlang::run(source, &Config::default()).await.expect("compiles")
}

// --- Sequential programs ---

#[test]
fn closures_capture_their_environment() {
    let source = "
        func adder(n) in
            func (x) in x + n end
        end
        var add5 = adder(5)
        add5(10)";
    assert_eq!(value(source), "15");
}

#[test]
fn for_loop_accumulates_in_a_cell() {
    let source = "
        var total = Cell.new(0)
        for i in range(1, 5) do
            total := @total + i
        end
        @total";
    assert_eq!(value(source), "10");
}

#[test]
fn case_destructures_records() {
    let source = "
        var p = 'point'#{'x': 3, 'y': 4}
        case p
            of 'point'#{'x': x, 'y': y} then x * x + y * y
            else 0
        end";
    assert_eq!(value(source), "25");
}

#[test]
fn catch_matches_on_error_name() {
    let source = "
        try
            1 / 0
        catch 'error'#{'name': 'ArithmeticError', ...} then
            'caught'
        end";
    assert_eq!(value(source), "'caught'");
}

#[test]
fn unbound_result_suspends() {
    let evaluation = torqlang::evaluate("var x x + 1").expect("compiles");
    assert_eq!(evaluation.status, Status::Suspended);
}

#[test]
fn program_ending_in_a_proc_call_has_no_value() {
    let evaluation = torqlang::evaluate("proc p() in skip end p()").expect("compiles");
    assert_eq!(evaluation.status, Status::Done);
    assert_eq!(evaluation.value, "_");
}

#[test]
fn assert_bound_as_final_sentence() {
    let evaluation = torqlang::evaluate("var x assert_bound(x)").expect("compiles");
    assert_eq!(evaluation.status, Status::Halted);
    assert_eq!(evaluation.error.as_deref(), Some("NotBoundError"));
}

#[test]
fn compile_errors_surface_before_running() {
    let err = torqlang::evaluate("return 1").unwrap_err();
    assert_eq!(err.code(), "TQ-G005");
}

// --- Actors ---

#[tokio::test]
async fn actor_keeps_state_between_messages() {
    let evaluation = run("
        actor Account(balance) in
            var funds = Cell.new(balance)
            handle tell 'deposit'#{'amount': n} in funds := @funds + n end
            handle ask 'balance' in @funds end
        end
        var a = spawn(Account.cfg(100))
        a.tell('deposit'#{'amount': 25})
        a.tell('deposit'#{'amount': 5})
        a.ask('balance')")
    .await;
    assert_eq!(evaluation.status, Status::Done);
    assert_eq!(evaluation.value, "130");
    assert!(evaluation.halts.is_empty());
}

#[tokio::test]
async fn many_actors_answer_independently() {
    let evaluation = run("
        actor Square() in
            handle ask n in n * n end
        end
        var a = spawn(Square.cfg())
        var b = spawn(Square.cfg())
        a.ask(3) + b.ask(4)")
    .await;
    assert_eq!(evaluation.value, "25");
}

#[tokio::test]
async fn handler_throw_reaches_the_requester() {
    let evaluation = run("
        actor Divider() in
            handle ask n in 10 / n end
        end
        var d = spawn(Divider.cfg())
        d.ask(0)")
    .await;
    assert!(evaluation.value.contains("ArithmeticError"), "{}", evaluation.value);
}

#[tokio::test]
async fn answers_arrive_through_a_chain_of_actors() {
    let evaluation = run("
        actor Store() in
            handle ask 'get' in 'value' end
        end
        actor Cache(store) in
            handle ask key in store.ask(key) end
        end
        actor Front(cache) in
            handle ask key in
                var answer = cache.ask(key)
                answer
            end
        end
        var front = spawn(Front.cfg(spawn(Cache.cfg(spawn(Store.cfg())))))
        var got = front.ask('get')
        got")
    .await;
    assert_eq!(evaluation.status, Status::Done);
    assert_eq!(evaluation.value, "'value'");
}

#[tokio::test]
async fn step_limit_comes_from_config() {
    let mut config = Config::default();
    config.machine.max_steps = 100;
    let evaluation = torqlang::run("while true do skip end", &config).await.unwrap();
    assert_eq!(evaluation.status, Status::Halted);
    assert_eq!(evaluation.error.as_deref(), Some("StepLimitError"));
}
