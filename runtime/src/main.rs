use std::path::PathBuf;
use std::process;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use koala_vm::bytecode::{self, disasm};
use koala_vm::runtime::RuntimeConfig;
use koala_vm::vm::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_STACK_CAPACITY};
use koala_vm::{Runtime, VERSION};

#[derive(Parser, Debug)]
#[command(name = "koala-vm", version = VERSION)]
#[command(about = "Run a Koala bytecode (.kbc) file")]
struct Cli {
    /// Bytecode file to execute
    file: PathBuf,

    /// Trace every executed instruction
    #[arg(long)]
    trace: bool,

    /// Operand stack capacity
    #[arg(long, default_value_t = DEFAULT_STACK_CAPACITY)]
    stack_capacity: usize,

    /// Maximum nesting of CALL
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Print a disassembly listing instead of running
    #[arg(long)]
    disasm: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8, trace: bool) {
    let level = match verbose {
        _ if trace => "trace",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.trace);

    if cli.disasm {
        match bytecode::load(&cli.file) {
            Ok(program) => print!("{}", disasm::disassemble(&program)),
            Err(e) => {
                error!("Failed to load {}: {}", cli.file.display(), e);
                process::exit(1);
            }
        }
        return;
    }

    let config = RuntimeConfig::default()
        .with_debug_mode(cli.verbose > 0)
        .with_trace_execution(cli.trace)
        .with_stack_capacity(cli.stack_capacity)
        .with_max_call_depth(cli.max_call_depth);

    let runtime = match Runtime::with_config(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    match runtime.execute_file(&cli.file) {
        Ok(Some(value)) => println!("{}", value),
        Ok(None) => println!("<none>"),
        Err(e) => {
            error!("Execution failed: {}", e);
            process::exit(1);
        }
    }
}
