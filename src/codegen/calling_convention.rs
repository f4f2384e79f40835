//! Per-convention differences in preamble, argument passing, and process exit.
//!
//! Isolating these in one place is what makes the generator convention-
//! agnostic (§9 "make call-lowering pluggable by convention"): `expr.rs` and
//! `statements.rs` never special-case `Win64` vs `SysV` directly, they only
//! call through these methods.

use crate::ast::CallingConvention;

impl CallingConvention {
    /// Registers argument values are passed in, in order. Beyond this many
    /// arguments, values go on the stack.
    pub(super) fn argument_registers(self) -> &'static [&'static str] {
        match self {
            CallingConvention::Win64 => &["rcx", "rdx", "r8", "r9"],
            CallingConvention::SysV => &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
        }
    }

    /// Bytes to reserve below `rsp` before a `call`, beyond whatever is
    /// needed to hold stack-passed arguments. Windows x64 always reserves a
    /// 32-byte shadow space for the callee to spill its register arguments
    /// into, even when none are used; System V has no such requirement.
    pub(super) fn shadow_space_bytes(self) -> i32 {
        match self {
            CallingConvention::Win64 => 32,
            CallingConvention::SysV => 0,
        }
    }

    /// Byte offset from `rsp` (after the pre-call `sub rsp, N`) where the
    /// `i`th stack-passed argument (0-indexed among the overflow args) is
    /// stored.
    pub(super) fn stack_argument_offset(self, shadow_space: i32, overflow_index: usize) -> i32 {
        shadow_space + (overflow_index as i32) * 8
    }

    /// The assembly lines preceding `segment .text`: which runtime symbol
    /// the generated entry point calls to terminate the process.
    pub(super) fn extern_declaration(self) -> &'static str {
        match self {
            CallingConvention::Win64 => "extern ExitProcess",
            CallingConvention::SysV => "extern exit",
        }
    }

    /// Lowers `call main; <exit with rax as the status code>` for the
    /// synthetic `__main` entry point (§4.5 "Entry point").
    pub(super) fn emit_entry_exit(self, out: &mut String) {
        use std::fmt::Write;
        match self {
            CallingConvention::Win64 => {
                let _ = writeln!(out, "    pop rcx");
                let _ = writeln!(out, "    call ExitProcess");
            }
            CallingConvention::SysV => {
                let _ = writeln!(out, "    pop rax");
                let _ = writeln!(out, "    mov rdi, rax");
                let _ = writeln!(out, "    call exit");
            }
        }
    }

    /// The `nasm` object format flag for this convention's target, used by
    /// the platform shim to invoke the assembler (§4.8).
    pub fn nasm_format(self) -> &'static str {
        match self {
            CallingConvention::Win64 => "win64",
            CallingConvention::SysV => "elf64",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win64_reserves_32_byte_shadow_space() {
        assert_eq!(CallingConvention::Win64.shadow_space_bytes(), 32);
    }

    #[test]
    fn sysv_has_no_shadow_space() {
        assert_eq!(CallingConvention::SysV.shadow_space_bytes(), 0);
    }

    #[test]
    fn win64_uses_four_register_arguments() {
        assert_eq!(
            CallingConvention::Win64.argument_registers(),
            &["rcx", "rdx", "r8", "r9"]
        );
    }

    #[test]
    fn nasm_format_matches_object_file_convention() {
        assert_eq!(CallingConvention::Win64.nasm_format(), "win64");
        assert_eq!(CallingConvention::SysV.nasm_format(), "elf64");
    }
}
