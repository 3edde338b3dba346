use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context};
use clap::Parser;
use koala_vm::bytecode::{self, disasm};
use thiserror::Error;
use tracing::info;
use crate::{assemble_tokens, tokenize, AssembleError, DEFAULT_ENTRY, VERSION};

/// Process exit status of the assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    IncompleteOption = 1,
    FileNotFound = 2,
    StreamOpenFailed = 3,
    LexerFailed = 4,
    TranslationFailed = 5,
    ParsingFailed = 6,
    RuntimeFailed = 7,
    WriteFailed = 8,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Error, Debug)]
#[error("{error:#}")]
pub struct CliError {
    pub code: ExitCode,
    pub error: anyhow::Error,
}

trait WithExitCode<T> {
    fn exit_code(self, code: ExitCode) -> Result<T, CliError>;
}

impl<T, E: Into<anyhow::Error>> WithExitCode<T> for Result<T, E> {
    fn exit_code(self, code: ExitCode) -> Result<T, CliError> {
        self.map_err(|e| CliError { code, error: e.into() })
    }
}

#[derive(Parser, Debug)]
#[command(name = "koala-asm", disable_version_flag = true)]
#[command(about = "Assemble Koala block-structured assembly into Koala VM bytecode")]
pub struct Cli {
    /// Source file to assemble
    #[arg(short = 'p', long = "path", num_args = 0..=1, value_name = "PATH")]
    pub path: Option<Option<PathBuf>>,

    /// Label of the entry block
    #[arg(short = 's', long = "symbol", num_args = 0..=1, value_name = "SYMBOL")]
    pub symbol: Option<Option<String>>,

    /// Output file (defaults to the source path with a .kbc extension)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Execute the program after writing it
    #[arg(long)]
    pub run: bool,

    /// Print a disassembly listing
    #[arg(long)]
    pub disasm: bool,

    /// Print the resolved program as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the token stream and stop
    #[arg(long)]
    pub tokens: bool,

    /// Print assembler and VM versions
    #[arg(long)]
    pub version: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runs one assembler invocation
#[derive(Default)]
pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, cli: Cli) -> Result<(), CliError> {
        if cli.version {
            println!("koala-asm {}", VERSION);
            println!("koala-vm {}", koala_vm::VERSION);
            return Ok(());
        }

        let path = match cli.path {
            Some(Some(path)) => path,
            Some(None) => {
                return Err(anyhow!("missing file path after -p")).exit_code(ExitCode::IncompleteOption);
            }
            None => {
                return Err(anyhow!("no source file given, use -p <path>")).exit_code(ExitCode::FileNotFound);
            }
        };
        let entry = match cli.symbol {
            None => DEFAULT_ENTRY.to_string(),
            Some(Some(symbol)) => symbol,
            Some(None) => {
                return Err(anyhow!("missing entry label after -s")).exit_code(ExitCode::IncompleteOption);
            }
        };

        if !path.exists() {
            return Err(anyhow!("file {} not found", path.display())).exit_code(ExitCode::FileNotFound);
        }
        let source = fs::read_to_string(&path)
            .with_context(|| format!("failed to open {}", path.display()))
            .exit_code(ExitCode::StreamOpenFailed)?;

        let tokens = tokenize(&source).map_err(stage_error)?;
        if cli.tokens {
            for token in &tokens {
                println!("{}:{}\t{}", token.line, token.column, token.kind);
            }
            return Ok(());
        }

        let program = assemble_tokens(tokens, &entry).map_err(stage_error)?;
        info!(
            entry = %entry,
            blocks = program.blocks.len(),
            constants = program.constants.len(),
            code = program.code.len(),
            "assembled {}",
            path.display()
        );

        if cli.json {
            let json = serde_json::to_string_pretty(&program).exit_code(ExitCode::WriteFailed)?;
            println!("{}", json);
        }
        if cli.disasm {
            print!("{}", disasm::disassemble(&program));
        }

        let output = cli.output.unwrap_or_else(|| default_output(&path));
        bytecode::save(&program, &output)
            .with_context(|| format!("failed to write {}", output.display()))
            .exit_code(ExitCode::WriteFailed)?;

        if cli.run {
            match koala_vm::run(program).exit_code(ExitCode::RuntimeFailed)? {
                Some(value) => println!("{}", value),
                None => println!("<none>"),
            }
        }

        Ok(())
    }
}

fn stage_error(error: AssembleError) -> CliError {
    let code = match &error {
        AssembleError::Lex(_) => ExitCode::LexerFailed,
        AssembleError::Parse(_) => ExitCode::ParsingFailed,
        AssembleError::Translate(_) => ExitCode::TranslationFailed,
    };
    CliError { code, error: error.into() }
}

/// `prog.ka` becomes `prog.kbc`
pub fn default_output(path: &Path) -> PathBuf {
    path.with_extension("kbc")
}
