//! Ember - CLI
//!
//! Thin command-line wrapper over the Ember host: compile scripts into
//! bytecode artifacts and run source or bytecode files.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use ember_core::bytecode::disasm::listing;
use ember_core::{compile_to_writer, BytecodeLoader, Host, Value};

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(about = "Ember embedded scripting host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script into a bytecode artifact
    Compile {
        /// Script source file
        input: PathBuf,

        /// Artifact to write
        output: PathBuf,

        /// Print a disassembly of the compiled artifact
        #[arg(long)]
        list: bool,
    },

    /// Load a script or bytecode file and run it
    Run {
        /// Source or bytecode file
        file: PathBuf,

        /// Qualified name of a function to call after loading
        #[arg(long)]
        call: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Chunk name used in diagnostics: the file name without directories
fn chunk_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn compile(input: &Path, output: &Path, list: bool) -> Result<(), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {e}", input.display()))?;
    let name = chunk_name(input);

    let mut artifact = Vec::new();
    compile_to_writer(&name, &source, &mut artifact).map_err(|e| e.to_string())?;
    fs::write(output, &artifact).map_err(|e| format!("failed to write {}: {e}", output.display()))?;
    info!("Compiled {} ({} bytes) to {}", input.display(), artifact.len(), output.display());

    if list {
        let proto = BytecodeLoader::load(&artifact).map_err(|e| e.to_string())?;
        let text = listing(&proto).map_err(|e| e.to_string())?;
        let mut out = BufWriter::new(io::stdout().lock());
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn run(file: &Path, call: Option<&str>) -> Result<(), String> {
    let code = fs::read(file).map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let mut host = Host::new();
    host.load(&chunk_name(file), &code).map_err(|e| e.to_string())?;
    debug!("Loaded {}", file.display());

    let Some(name) = call else {
        return Ok(());
    };
    let count = host.call(name, 0).map_err(|e| e.to_string())?;
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        let value = host.pop::<Value>().map_err(|e| e.to_string())?;
        results.push(value.to_string());
    }
    results.reverse();
    if !results.is_empty() {
        println!("{}", results.join("\t"));
    }
    Ok(())
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Compile { input, output, list } => compile(input, output, *list),
        Command::Run { file, call } => run(file, call.as_deref()),
    };

    if let Err(message) = result {
        error!("{message}");
        process::exit(1);
    }
}
