//! Sigil compiler CLI (§6).
//!
//! `sigilc build <source> -o <output>` runs the whole pipeline through to an
//! assembled object file; `sigilc completions <shell>` emits shell completion
//! scripts. Structured the way the teacher's `main.rs` is: a clap-derive
//! `Cli`/`Commands` pair, one `run_*` function per subcommand, errors printed
//! to stderr and mapped to a process exit code rather than unwound.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use sigilc::{ast::CallingConvention, compile_file_with_config, CompileError, CompilerConfig};

#[derive(Parser)]
#[command(name = "sigilc", about = "Whole-program compiler for the Sigil language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Sigil source file to an object file.
    Build {
        /// Path to the `.sg` source file.
        source: PathBuf,
        /// Path to write the assembled object file to.
        #[arg(short, long, default_value = "out.obj")]
        output: PathBuf,
        /// Keep the intermediate `.asm` file next to the output.
        #[arg(long)]
        keep_asm: bool,
        /// Calling convention / object format to target.
        #[arg(long, value_enum, default_value_t = Target::Win64)]
        target: Target,
        /// Path to the `nasm` binary, if not on `PATH`.
        #[arg(long)]
        assembler: Option<PathBuf>,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Target {
    Win64,
    Sysv,
}

impl From<Target> for CallingConvention {
    fn from(target: Target) -> Self {
        match target {
            Target::Win64 => CallingConvention::Win64,
            Target::Sysv => CallingConvention::SysV,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Build {
            source,
            output,
            keep_asm,
            target,
            assembler,
        } => run_build(source, output, keep_asm, target, assembler),
        Commands::Completions { shell } => {
            run_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

/// Runs the `build` subcommand: §6's CLI surface over [`compile_file_with_config`].
fn run_build(
    source: PathBuf,
    output: PathBuf,
    keep_asm: bool,
    target: Target,
    assembler: Option<PathBuf>,
) -> Result<(), String> {
    let mut config = CompilerConfig::new()
        .with_calling_convention(target.into())
        .with_keep_asm(keep_asm);
    if let Some(assembler) = assembler {
        config = config.with_assembler_path(assembler);
    }

    match compile_file_with_config(&source, &output, &config) {
        Ok(()) => Ok(()),
        Err(CompileError::Parse { diagnostics }) => {
            Err(format!("compilation failed ({} parse error(s))", diagnostics.len()))
        }
        Err(CompileError::Analyze { diagnostics }) => Err(format!(
            "compilation failed ({} semantic error(s))",
            diagnostics.len()
        )),
        Err(err) => Err(err.to_string()),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
