//! Sigil compiler library (§1, §2).
//!
//! Drives the pipeline text → tokens → AST → annotated AST → NASM text, then
//! (via [`platform`]) hands the assembly to an external assembler. Mirrors
//! the teacher's `lib.rs`: module declarations and re-exports up top, a pair
//! of `compile_*` entry points that own the phase sequencing, one error type
//! unifying every phase's failure mode.

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod platform;
pub mod token;

use std::fmt;
use std::fs;
use std::path::Path;

pub use ast::{CallingConvention, Program};
pub use config::CompilerConfig;
pub use diagnostics::Diagnostic;

/// Unifies every fallible step of the pipeline (§7 "reported via
/// `CompileError` variants, not `Diagnostic`s" for the non-source-attributable
/// cases; the source-attributable phases carry their diagnostics alongside).
#[derive(Debug)]
pub enum CompileError {
    /// Parsing failed; `diagnostics` holds at least one entry.
    Parse { diagnostics: Vec<Diagnostic> },
    /// Semantic analysis failed.
    Analyze { diagnostics: Vec<Diagnostic> },
    /// Code generation produced no usable NASM text (an internal-invariant
    /// violation; a well-typed program should never reach this).
    CodeGen(codegen::CodeGenError),
    /// Reading the source file or invoking the assembler failed.
    Platform(platform::PlatformError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse { diagnostics } => {
                write!(f, "parsing failed with {} diagnostic(s)", diagnostics.len())
            }
            CompileError::Analyze { diagnostics } => {
                write!(f, "semantic analysis failed with {} diagnostic(s)", diagnostics.len())
            }
            CompileError::CodeGen(e) => write!(f, "code generation failed: {}", e),
            CompileError::Platform(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<codegen::CodeGenError> for CompileError {
    fn from(e: codegen::CodeGenError) -> Self {
        CompileError::CodeGen(e)
    }
}

impl From<platform::PlatformError> for CompileError {
    fn from(e: platform::PlatformError) -> Self {
        CompileError::Platform(e)
    }
}

/// Runs lex → parse → analyze → generate over `source`, returning the
/// emitted NASM text. Does not touch the filesystem or invoke an assembler;
/// see [`compile_file_with_config`] for the full driver.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    tracing::debug!("parsing {} byte(s) of source", source.len());
    let (mut program, parse_diagnostics, parse_ok) = parser::parse(source);
    if !parse_ok {
        diagnostics::print_diagnostics(source, &parse_diagnostics);
        return Err(CompileError::Parse {
            diagnostics: parse_diagnostics,
        });
    }
    tracing::info!(functions = program.functions.len(), "parse succeeded");

    tracing::debug!("running semantic analysis");
    let (analyze_diagnostics, analyze_ok) = analyzer::analyze(&mut program);
    if !analyze_ok {
        diagnostics::print_diagnostics(source, &analyze_diagnostics);
        return Err(CompileError::Analyze {
            diagnostics: analyze_diagnostics,
        });
    }
    tracing::info!("semantic analysis succeeded");

    tracing::debug!(convention = ?config.calling_convention, "generating NASM text");
    let asm = codegen::generate(&program, config.calling_convention)?;
    tracing::info!(bytes = asm.len(), "code generation succeeded");
    Ok(asm)
}

/// Compiles the file at `source_path` and produces an object file at
/// `output_path`, via the platform shim's `nasm` invocation. The full
/// driver analogous to the teacher's `compile_file_with_config`: read
/// source, run the library pipeline, hand the result to [`platform::assemble`].
pub fn compile_file_with_config(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    let source = fs::read_to_string(source_path).map_err(platform::PlatformError::from)?;
    let asm = compile_source(&source, config)?;
    tracing::debug!(path = %output_path.display(), "invoking assembler");
    platform::assemble(&asm, output_path, config)?;
    tracing::info!(path = %output_path.display(), "wrote object file");
    Ok(())
}
