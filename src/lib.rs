//! `mython` library crate.
//!
//! An interpreter for a small indentation-structured object language:
//! - frontend: `lexer` + `parser` produce the executable tree (`ast`)
//! - object model: `runtime` (values, classes, instances, comparisons)
//! - execution: `interpreter` walks the tree against a `runtime::Context`

pub mod ast;
pub mod fixtures;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod token;

use std::io::Write;

use thiserror::Error;

use crate::interpreter::Flow;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::runtime::{Closure, RuntimeError, SimpleContext};

/// Any failure the pipeline can surface to the driver.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Runs a mython program end to end: lex, parse, execute. Whatever the
/// program prints is written to `output`.
pub fn run(source: &str, output: &mut dyn Write) -> Result<(), Error> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse(tokens)?;
    let mut globals = Closure::new();
    let mut context = SimpleContext::new(output);
    match program.execute(&mut globals, &mut context) {
        Ok(_) => Ok(()),
        Err(Flow::Return(_)) => Err(RuntimeError::ReturnOutsideMethod.into()),
        Err(Flow::Error(error)) => Err(error.into()),
    }
}
