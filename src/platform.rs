//! Platform shim: filesystem and assembler invocation (§4.8)
//!
//! Peripheral to the compiler proper — no compiler logic lives here, only
//! `std::fs` and `std::process::Command` plumbing, mirroring how the
//! teacher keeps its own subprocess invocation (clang, in its case) out of
//! the codegen and type-checking modules and confined to one call site.

use std::fmt;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::config::CompilerConfig;

#[derive(Debug)]
pub enum PlatformError {
    Io(std::io::Error),
    AssemblerFailed { status: Option<i32>, stderr: String },
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Io(e) => write!(f, "{}", e),
            PlatformError::AssemblerFailed { status, stderr } => {
                write!(f, "assembler failed (status {:?}): {}", status, stderr)
            }
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<std::io::Error> for PlatformError {
    fn from(e: std::io::Error) -> Self {
        PlatformError::Io(e)
    }
}

/// Writes `asm` next to `output_path` (same stem, `.asm` extension),
/// creating the parent directory if it doesn't exist, then invokes the
/// configured assembler to produce `output_path`. Removes the `.asm` file
/// afterward unless `config.keep_asm` is set.
pub fn assemble(asm: &str, output_path: &Path, config: &CompilerConfig) -> Result<(), PlatformError> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let asm_path = output_path.with_extension("asm");
    fs::write(&asm_path, asm)?;

    let format = config.calling_convention.nasm_format();
    let result = Command::new(config.assembler())
        .arg("-f")
        .arg(format)
        .arg("-o")
        .arg(output_path)
        .arg(&asm_path)
        .output();

    let cleanup = || {
        if !config.keep_asm {
            let _ = fs::remove_file(&asm_path);
        }
    };

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            cleanup();
            return Err(PlatformError::Io(e));
        }
    };

    if !output.status.success() {
        cleanup();
        return Err(PlatformError::AssemblerFailed {
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    cleanup();
    Ok(())
}
