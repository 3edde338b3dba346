//! Koala assembler: source text to resolved Koala VM bytecode.
//!
//! The pipeline is lexer, then parser (with flattening), then the two-pass
//! translator. [`assemble`] runs all three.

pub mod lexer;
pub mod parser;
pub mod translator;
pub mod cli;

pub use lexer::{LexError, Lexer, Mnemonic, Token, TokenKind};
pub use parser::{flatten, CodeBlock, FlatBlock, ParseError, Parser};
pub use translator::{emit, layout, translate, Layout, TranslateError};
pub use cli::{Cli, CliError, CliHandler, ExitCode};

use koala_vm::ProgramData;
use thiserror::Error;

/// Block label execution starts from unless another is chosen
pub const DEFAULT_ENTRY: &str = "_start";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("{}", join_lines(.0))]
    Lex(Vec<LexError>),

    #[error("Parsing failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Translation failed: {0}")]
    Translate(#[from] TranslateError),
}

fn join_lines(errors: &[LexError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

/// Lex a whole source, failing with every unrecognised character at once
pub fn tokenize(source: &str) -> Result<Vec<Token>, AssembleError> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    if !lexer.is_success() {
        return Err(AssembleError::Lex(lexer.take_errors()));
    }
    Ok(tokens)
}

/// Parse and translate an already lexed token stream
pub fn assemble_tokens(tokens: Vec<Token>, entry: &str) -> Result<ProgramData, AssembleError> {
    let blocks = Parser::new(tokens).parse()?;
    Ok(translate(&blocks, entry)?)
}

/// Assemble source text into a program whose `blocks[0]` is `entry`
pub fn assemble(source: &str, entry: &str) -> Result<ProgramData, AssembleError> {
    assemble_tokens(tokenize(source)?, entry)
}
