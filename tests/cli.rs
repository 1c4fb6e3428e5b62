use std::io::Write;
use std::process::{Command, Output};

fn torq() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_torq"));
    cmd.env_remove("TORQ_LOG").env_remove("TORQ_MAX_STEPS");
    cmd
}

fn run(args: &[&str]) -> Output {
    torq().args(args).output().expect("failed to run torq")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

// --- Running ---

#[test]
fn inline_code_prints_value() {
    let out = run(&["var x = 6 x * 7"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "42");
}

#[test]
fn file_input_runs() {
    let mut file = tempfile::Builder::new().suffix(".torq").tempfile().unwrap();
    writeln!(
        file,
        "func fact(n) in\n    if n < 2 then 1 else n * fact(n - 1) end\nend\nfact(5)"
    )
    .unwrap();
    let out = run(&[file.path().to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "120");
}

#[test]
fn actors_run_on_the_runtime() {
    let source = "
        actor Echo() in
            handle ask 'ping' in 'pong' end
        end
        var e = spawn(Echo.cfg())
        e.ask('ping')";
    let out = run(&[source]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "'pong'");
}

#[test]
fn uncaught_throw_exits_nonzero() {
    let out = run(&["1 / 0"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[TQ-R004]"), "stderr: {err}");
    assert!(err.contains("ArithmeticError"), "stderr: {err}");
}

#[test]
fn assert_bound_failure_is_reported() {
    let out = run(&["var x assert_bound(x)"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[TQ-R001]"), "stderr: {}", stderr(&out));
}

#[test]
fn actor_halt_is_a_warning() {
    let source = "
        actor Quiet() in skip end
        var q = spawn(Quiet.cfg())
        q.tell('hello')
        'done'";
    let out = run(&[source]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "'done'");
    assert!(stderr(&out).contains("warning[TQ-R003]"), "stderr: {}", stderr(&out));
}

// --- Emit ---

#[test]
fn emit_kernel() {
    let out = run(&["x = 2 + 3 * 5", "--emit", "kernel"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let kernel = stdout(&out);
    assert!(kernel.contains("$mult(3, 5, $v0)"), "{kernel}");
    assert!(kernel.contains("$add(2, $v0, x)"), "{kernel}");
}

#[test]
fn emit_ast_is_json() {
    let out = run(&["var y = f(1)", "--emit", "ast"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let ast: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("AST JSON");
    assert!(ast["body"].is_array());
}

// --- Diagnostics ---

#[test]
fn parse_error_renders_location() {
    let out = run(&["if x then"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("error[TQ-P004]"), "stderr: {err}");
    assert!(err.contains("-->"), "stderr: {err}");
}

#[test]
fn json_diagnostics() {
    let out = run(&["--json", "break"]);
    assert!(!out.status.success());
    let line = stderr(&out);
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("one JSON diagnostic");
    assert_eq!(v["code"], "TQ-G003");
    assert_eq!(v["severity"], "error");
    assert_eq!(v["labels"][0]["line"], 1);
}

#[test]
fn explain_known_and_unknown_codes() {
    let out = run(&["--explain", "TQ-G005"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("return outside a function"));

    let out = run(&["--explain", "TQ-NOPE"]);
    assert!(!out.status.success());
}

// --- Config ---

#[test]
fn config_file_sets_step_limit() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[machine]\nmax_steps = 100").unwrap();
    let out = run(&["--config", file.path().to_str().unwrap(), "while true do skip end"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("StepLimitError"), "stderr: {}", stderr(&out));
}

#[test]
fn env_overrides_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[machine]\nmax_steps = 1000000").unwrap();
    let out = torq()
        .env("TORQ_MAX_STEPS", "50")
        .args(["--config", file.path().to_str().unwrap(), "while true do skip end"])
        .output()
        .expect("failed to run torq");
    assert!(!out.status.success());
    assert!(stderr(&out).contains("TQ-R012"), "stderr: {}", stderr(&out));
}

#[test]
fn bad_config_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[machine]\nmax_steps = 'many'").unwrap();
    let out = run(&["--config", file.path().to_str().unwrap(), "1"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("TQ-C002"), "stderr: {}", stderr(&out));
}
