//! Compiler configuration (§4.7)
//!
//! `CompilerConfig` collects everything about a compilation run that isn't
//! part of the language itself: which calling convention to target, whether
//! to keep the intermediate `.asm` file, and where to find the assembler.
//! Builder-style, mirroring the teacher's `CompilerConfig` extension point.

use std::path::PathBuf;

use serde::Deserialize;

use crate::ast::CallingConvention;

/// On-disk representation loaded via `toml`, kept separate from
/// [`CompilerConfig`] because `CallingConvention` has no serde impl of its
/// own (it's an AST-facing enum, not wire format) and `assembler_path`
/// deserializes as a plain string.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    target: Option<String>,
    keep_asm: Option<bool>,
    assembler_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub calling_convention: CallingConvention,
    pub keep_asm: bool,
    pub assembler_path: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            calling_convention: CallingConvention::Win64,
            keep_asm: false,
            assembler_path: None,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_calling_convention(mut self, calling_convention: CallingConvention) -> Self {
        self.calling_convention = calling_convention;
        self
    }

    pub fn with_keep_asm(mut self, keep_asm: bool) -> Self {
        self.keep_asm = keep_asm;
        self
    }

    pub fn with_assembler_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.assembler_path = Some(path.into());
        self
    }

    /// Loads overrides from a TOML file, layering them onto `self`. Fields
    /// absent from the file leave the current value untouched.
    pub fn merge_toml_file(mut self, contents: &str) -> Result<Self, toml::de::Error> {
        let raw: RawConfig = toml::from_str(contents)?;
        if let Some(target) = raw.target {
            self.calling_convention = match target.as_str() {
                "sysv" => CallingConvention::SysV,
                _ => CallingConvention::Win64,
            };
        }
        if let Some(keep_asm) = raw.keep_asm {
            self.keep_asm = keep_asm;
        }
        if let Some(assembler_path) = raw.assembler_path {
            self.assembler_path = Some(assembler_path);
        }
        Ok(self)
    }

    /// Path to the assembler binary to invoke, falling back to a bare
    /// `nasm` that's resolved via `PATH`.
    pub fn assembler(&self) -> PathBuf {
        self.assembler_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("nasm"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_win64_and_does_not_keep_asm() {
        let config = CompilerConfig::new();
        assert_eq!(config.calling_convention, CallingConvention::Win64);
        assert!(!config.keep_asm);
        assert_eq!(config.assembler(), PathBuf::from("nasm"));
    }

    #[test]
    fn builder_methods_compose() {
        let config = CompilerConfig::new()
            .with_calling_convention(CallingConvention::SysV)
            .with_keep_asm(true)
            .with_assembler_path("/opt/nasm/bin/nasm");
        assert_eq!(config.calling_convention, CallingConvention::SysV);
        assert!(config.keep_asm);
        assert_eq!(config.assembler(), PathBuf::from("/opt/nasm/bin/nasm"));
    }

    #[test]
    fn toml_overrides_only_the_fields_it_names() {
        let config = CompilerConfig::new()
            .with_keep_asm(true)
            .merge_toml_file("target = \"sysv\"\n")
            .unwrap();
        assert_eq!(config.calling_convention, CallingConvention::SysV);
        assert!(config.keep_asm, "keep_asm absent from the file should be left alone");
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let result = CompilerConfig::new().merge_toml_file("target = [unterminated");
        assert!(result.is_err());
    }
}
