// Lox VM CLI - Command Line Interface
// Usage: loxvm <FILE.loxc> [OPTIONS]

use clap::Parser;
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use lox_vm::binary;
use lox_vm::compiler::disassemble_chunk;
use lox_vm::vm::{AllocPolicy, Vm, VmConfig};
use lox_vm::VmError;

/// Lox VM - runs compiled Lox bytecode
#[derive(Parser)]
#[command(name = "loxvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs compiled Lox bytecode (.loxc)", long_about = None)]
struct Cli {
    /// Bytecode file to run
    file: PathBuf,

    /// Debug options: asm, trace, heap (comma-separated)
    #[arg(short = 'd', long = "debug", value_delimiter = ',')]
    debug: Option<Vec<String>>,

    /// Print the disassembly without running
    #[arg(long = "disassemble")]
    disassemble: bool,
}

#[derive(Default, Clone)]
struct DebugFlags {
    asm: bool,
    trace: bool,
    heap: bool,
}

impl DebugFlags {
    fn from_options(opts: &Option<Vec<String>>) -> Self {
        let mut flags = Self::default();
        if let Some(opts) = opts {
            for opt in opts {
                match opt.as_str() {
                    "asm" => flags.asm = true,
                    "trace" => flags.trace = true,
                    "heap" => flags.heap = true,
                    _ => eprintln!("{} Unknown debug option: {}", "!".yellow(), opt),
                }
            }
        }
        flags
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Error reading file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Error loading '{path}': {source}")]
    Load {
        path: String,
        source: lox_vm::BinaryError,
    },
    #[error("{0}")]
    Runtime(String),
}

impl CliError {
    /// sysexits-style status codes
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Load { .. } => 65,
            CliError::Runtime(_) => 70,
            CliError::Io { .. } => 74,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let debug = DebugFlags::from_options(&cli.debug);
    init_tracing(&debug);

    if let Err(e) = handle_run(&cli.file, &debug, cli.disassemble) {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(debug: &DebugFlags) {
    let filter = if debug.trace {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn handle_run(path: &PathBuf, debug: &DebugFlags, disassemble_only: bool) -> Result<(), CliError> {
    let display = path.display().to_string();
    let data = fs::read(path).map_err(|source| CliError::Io {
        path: display.clone(),
        source,
    })?;

    let config = VmConfig {
        alloc_policy: AllocPolicy::Abort,
        heap_stats: debug.heap,
    };
    let mut vm = Vm::with_config(std::io::stdout(), config);

    let function = binary::deserialize(&data, vm.heap_mut()).map_err(|source| CliError::Load {
        path: display.clone(),
        source,
    })?;

    if debug.asm || disassemble_only {
        let heap = vm.heap();
        if let Some(f) = heap.function(function) {
            println!("{}", "-- Disassembly --".cyan());
            print!("{}", disassemble_chunk(&f.chunk, heap, &display));
            println!();
        }
        if disassemble_only {
            return Ok(());
        }
    }

    match vm.run(function) {
        Ok(_) => Ok(()),
        Err(VmError::Runtime(err)) => Err(CliError::Runtime(err.format().trim_end().to_string())),
        Err(err) => Err(CliError::Runtime(err.to_string())),
    }
}
