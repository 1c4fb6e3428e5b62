use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use torqlang::config::Config;
use torqlang::diagnostic::{ansi::AnsiRenderer, json, registry, Diagnostic};
use torqlang::machine::Status;

#[derive(Parser, Debug)]
#[command(name = "torq", version, about = "Compile and run torqlang programs")]
struct Cli {
    /// Source file, or inline code when no such file exists
    #[arg(required_unless_present = "explain")]
    input: Option<String>,

    /// Print an intermediate form instead of running
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Report diagnostics as one-line JSON
    #[arg(long)]
    json: bool,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter, overriding TORQ_LOG and the config file
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// Explain an error code, e.g. TQ-G003
    #[arg(long, value_name = "CODE", conflicts_with_all = ["input", "emit"])]
    explain: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Emit {
    Ast,
    Kernel,
}

struct Reporter {
    json: bool,
    source: Option<String>,
}

impl Reporter {
    fn report(&self, d: Diagnostic) {
        let d = match &self.source {
            Some(source) => d.with_source(source.clone()),
            None => d,
        };
        if self.json {
            eprintln!("{}", json::render(&d));
        } else {
            let renderer = AnsiRenderer { use_color: std::io::stderr().is_terminal() };
            eprint!("{}", renderer.render(&d));
        }
    }
}

fn init_logging(log: &torqlang::config::LogConfig) {
    let filter = EnvFilter::try_new(&log.filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<Config, torqlang::config::ConfigError> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mut config = config.with_env()?;
    if let Some(filter) = &cli.log {
        config.log.filter = filter.clone();
    }
    Ok(config)
}

fn read_input(input: &str) -> std::io::Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        std::fs::read_to_string(path)
    } else {
        Ok(input.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut reporter = Reporter { json: cli.json, source: None };

    if let Some(code) = &cli.explain {
        return match registry::lookup(code) {
            Some(entry) => {
                print!("{}", entry.long);
                ExitCode::SUCCESS
            }
            None => {
                reporter.report(Diagnostic::error(format!("unknown error code '{code}'")));
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            reporter.report(Diagnostic::from(&e));
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log);

    let Some(input) = cli.input.as_deref() else {
        return ExitCode::FAILURE;
    };
    let source = match read_input(input) {
        Ok(source) => source,
        Err(e) => {
            reporter.report(Diagnostic::error(format!("cannot read {input}: {e}")));
            return ExitCode::FAILURE;
        }
    };
    reporter.source = Some(source.clone());

    match cli.emit {
        Some(Emit::Ast) => match torqlang::parse(&source) {
            Ok(program) => match serde_json::to_string_pretty(&program) {
                Ok(json) => {
                    println!("{json}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    reporter.report(Diagnostic::error(format!("cannot serialize the AST: {e}")));
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                reporter.report(Diagnostic::from(&e));
                ExitCode::FAILURE
            }
        },
        Some(Emit::Kernel) => match torqlang::compile(&source) {
            Ok(stmt) => {
                println!("{stmt}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                reporter.report(Diagnostic::from(&e));
                ExitCode::FAILURE
            }
        },
        None => match torqlang::run(&source, &config).await {
            Ok(evaluation) => {
                for halt in &evaluation.halts {
                    if evaluation.status != Status::Halted {
                        reporter.report(Diagnostic::actor_halt(halt));
                    }
                }
                match evaluation.status {
                    Status::Done => {
                        println!("{}", evaluation.value);
                        ExitCode::SUCCESS
                    }
                    Status::Suspended => {
                        println!("{}", evaluation.value);
                        reporter.report(Diagnostic::warning(
                            "program suspended on a variable that nothing will bind",
                        ));
                        ExitCode::SUCCESS
                    }
                    Status::Halted => {
                        reporter.report(Diagnostic::halt(&evaluation));
                        ExitCode::FAILURE
                    }
                }
            }
            Err(e) => {
                reporter.report(Diagnostic::from(&e));
                ExitCode::FAILURE
            }
        },
    }
}
