//! torqlang: an actor language lowered to a small dataflow kernel.
//!
//! Source goes through [`lexer`], [`parser`] and [`generator`] to become a
//! kernel [`kernel::Stmt`], which a [`machine::Machine`] executes. Programs
//! that spawn actors run on the tokio runtime in [`actor`].

pub mod actor;
pub mod ast;
pub mod config;
pub mod diagnostic;
pub mod generator;
pub mod kernel;
pub mod lexer;
pub mod machine;
pub mod parser;

use config::Config;
use generator::Target;
use kernel::{Ident, Stmt};
use machine::Evaluation;

/// Anything that stops source from becoming a kernel program.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Gen(#[from] generator::GenError),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Lex(e) => e.code(),
            Error::Parse(e) => e.code,
            Error::Gen(e) => e.code(),
        }
    }
}

pub fn parse(source: &str) -> Result<ast::Program, Error> {
    let tokens = lexer::lex(source)?;
    let mut program = parser::parse(tokens)?;
    program.source = Some(source.to_string());
    Ok(program)
}

/// Compiles a program whose final value is bound to [`machine::RESULT`].
pub fn compile(source: &str) -> Result<Stmt, Error> {
    let program = parse(source)?;
    let stmt = generator::generate(&program, &Target::Ident(Ident::new(machine::RESULT)))?;
    tracing::debug!(bytes = source.len(), "compiled");
    Ok(stmt)
}

/// Runs a program synchronously without the actor runtime and without a
/// step limit.
pub fn evaluate(source: &str) -> Result<Evaluation, Error> {
    Ok(machine::evaluate(compile(source)?, 0))
}

/// Runs a program on the actor runtime.
pub async fn run(source: &str, config: &Config) -> Result<Evaluation, Error> {
    let stmt = compile(source)?;
    Ok(actor::run_program(stmt, config.machine.max_steps).await)
}
