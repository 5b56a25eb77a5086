pub mod ast;
pub mod cli;
pub mod codec;
pub mod diag;
pub mod interp;
pub mod lexer;
pub mod observability;
pub mod parser;
pub mod server;
pub mod span;
pub mod task_pool;
pub mod token;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ast::{ApiDecl, Program};
use crate::diag::Diag;
use crate::interp::{Evaluator, ExecError, Output};
use crate::lexer::Lexer;
use crate::parser::{ParseError, Parser};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Parses a whole program. Lexer warnings come back next to the program.
pub fn parse_source(src: &str) -> Result<(Program, Vec<Diag>), ParseError> {
    parse_with(Lexer::new(src))
}

pub fn parse_file(path: &Path) -> Result<(Program, Vec<Diag>), LoadError> {
    let lexer = Lexer::from_path(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_with(lexer)?)
}

fn parse_with(lexer: Lexer) -> Result<(Program, Vec<Diag>), ParseError> {
    let mut parser = Parser::new(lexer);
    let program = parser.parse_program()?;
    Ok((program, parser.take_diags()))
}

/// Runs every api once, in declaration order, without binding sockets.
/// `inspect` sees each evaluator after its api finished.
pub fn eval_program<F>(program: &Program, mut inspect: F) -> Result<String, ExecError>
where
    F: FnMut(&ApiDecl, &Evaluator),
{
    let mut output = String::new();
    for api in &program.apis {
        let mut evaluator = Evaluator::new(Output::Buffer);
        let outcome = evaluator.run_api(api)?;
        output.push_str(&outcome.output);
        inspect(api, &evaluator);
    }
    Ok(output)
}

/// Evaluation-only mode: the printed text, or the rendered error.
pub fn eval_source(src: &str) -> String {
    let program = match parse_source(src) {
        Ok((program, _)) => program,
        Err(err) => return err.to_string(),
    };
    match eval_program(&program, |_, _| {}) {
        Ok(output) => output,
        Err(err) => format!("execution error: {err}"),
    }
}
