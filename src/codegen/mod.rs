//! NASM code generation (§4.5)
//!
//! Lowers an analyzed [`Program`] to a single UTF-8 text buffer of
//! NASM-syntax x86-64 assembly, stack-machine style: every lowered
//! expression leaves one value pushed, every statement that consumes one
//! pops it back off. Split into submodules by concern, the way the
//! surrounding analyzer/parser modules are each a single file but this one
//! outgrows that (`calling_convention.rs` holds everything that differs
//! between Win64 and SysV, `expr.rs`/`statements.rs` the two lowering
//! passes, `state.rs` the generator's own state, `error.rs` its error type).

mod calling_convention;
mod error;
mod expr;
mod state;
mod statements;

pub use error::CodeGenError;
pub use state::CodeGen;

use std::fmt::Write as _;

use crate::ast::{CallingConvention, ExpressionKind, Function, Program};

/// Lowers the whole program to NASM text (§4.5).
pub fn generate(program: &Program, calling_convention: CallingConvention) -> Result<String, CodeGenError> {
    let mut codegen = CodeGen::new(calling_convention);
    codegen.string_literals = collect_string_literals(program);
    codegen.emit_preamble();
    for index in 0..program.functions.len() {
        codegen.emit_function(program, index)?;
    }
    codegen.emit_entry_point();
    Ok(codegen.into_output())
}

/// Assigns each `StringLiteral` node a stable `.data` label, in arena order.
/// Handle `0` is the reserved error sentinel and is never a `StringLiteral`.
fn collect_string_literals(program: &Program) -> Vec<(crate::ast::ExprHandle, String, String)> {
    let mut literals = Vec::new();
    for (index, expression) in program.expressions.iter().enumerate() {
        if let ExpressionKind::StringLiteral(text) = &expression.kind {
            let label = format!("str{}", literals.len());
            literals.push((index as crate::ast::ExprHandle, label, text.clone()));
        }
    }
    literals
}

impl CodeGen {
    fn into_output(self) -> String {
        self.output
    }

    /// §4.5 "Preamble": the fixed header, a `.data` section holding every
    /// string literal in the program (§9), and whichever `extern` line the
    /// active convention needs for process termination.
    fn emit_preamble(&mut self) {
        let _ = writeln!(self.output, "bits 64");
        let _ = writeln!(self.output, "default rel");
        if !self.string_literals.is_empty() {
            let _ = writeln!(self.output, "segment .data");
            for (_, label, text) in &self.string_literals.clone() {
                let _ = writeln!(self.output, "{}: db {}, 0", label, nasm_byte_string(text));
            }
        }
        let _ = writeln!(self.output, "segment .text");
        let _ = writeln!(self.output, "global __main");
        let _ = writeln!(self.output, "{}", self.calling_convention.extern_declaration());
    }

    /// §4.5 "Function prologue": label, frame setup, and copying the first
    /// register-passed parameters down into their stack slots so the rest
    /// of the function can address every local and parameter uniformly via
    /// `[rbp±offset]`.
    fn emit_function(&mut self, program: &Program, index: usize) -> Result<(), CodeGenError> {
        let function: &Function = &program.functions[index];
        let _ = writeln!(self.output, "{}:", function.name);
        let _ = writeln!(self.output, "    push rbp");
        let _ = writeln!(self.output, "    mov rbp, rsp");
        if function.stack_size > 0 {
            let _ = writeln!(self.output, "    sub rsp, {}", function.stack_size);
        }

        let registers = self.calling_convention.argument_registers();
        for i in 0..function.parameter_count.min(registers.len()) {
            let _ = writeln!(
                self.output,
                "    mov QWORD [rbp+{}], {}",
                16 + i * 8,
                registers[i]
            );
        }

        let body: Vec<_> = program
            .siblings(
                function.body_first_statement,
                function.body_first_statement + function.body_statement_count,
            )
            .collect();
        for stmt_index in body {
            self.lower_statement(program, stmt_index)?;
        }

        // A control path that falls off the end of the function without an
        // explicit `return` is undefined at the source-language level
        // (DESIGN.md Open Question decisions); rather than fall through
        // into whatever follows in the text segment, every function body
        // is terminated with a safe implicit `return 0`.
        let _ = writeln!(self.output, "    xor eax, eax");
        let _ = writeln!(self.output, "    leave");
        let _ = writeln!(self.output, "    ret");
        Ok(())
    }

    /// §4.5 "Entry point": a synthetic `__main` label with no frame of its
    /// own that calls the source program's `main` and forwards its return
    /// value as the process exit code.
    fn emit_entry_point(&mut self) {
        let _ = writeln!(self.output, "__main:");
        let _ = writeln!(self.output, "    call main");
        let _ = writeln!(self.output, "    push rax");
        self.calling_convention.emit_entry_exit(&mut self.output);
    }
}

/// Renders a Sigil string literal's text as a NASM `db` operand. Strings
/// have no escapes (§4.1), so the lexer never admits a `"` inside one; a
/// plain quoted literal is always well-formed.
fn nasm_byte_string(text: &str) -> String {
    format!("\"{}\"", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::parser::parse;

    fn compile(src: &str, convention: CallingConvention) -> String {
        let (mut program, parse_diags, parse_ok) = parse(src);
        assert!(parse_ok, "parse failed: {:?}", parse_diags);
        let (diags, ok) = analyze(&mut program);
        assert!(ok, "analysis failed: {:?}", diags);
        generate(&program, convention).expect("codegen should succeed on an analyzed program")
    }

    #[test]
    fn preamble_declares_the_conventions_exit_symbol() {
        let asm = compile("fn main :: () -> (i32) { return 0; }", CallingConvention::Win64);
        assert!(asm.contains("extern ExitProcess"));
        assert!(asm.contains("global __main"));

        let asm = compile("fn main :: () -> (i32) { return 0; }", CallingConvention::SysV);
        assert!(asm.contains("extern exit"));
    }

    #[test]
    fn function_prologue_reserves_its_stack_frame() {
        let asm = compile(
            "fn main :: () -> (i32) { x: i32 = 1; return x; }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("main:"));
        assert!(asm.contains("push rbp"));
        assert!(asm.contains("mov rbp, rsp"));
        assert!(asm.contains("sub rsp, 16"));
    }

    #[test]
    fn parameters_are_copied_from_registers_into_their_stack_slots() {
        let asm = compile(
            "fn add :: (a: i32, b: i32) -> (i32) { return a + b; }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("mov QWORD [rbp+16], rcx"));
        assert!(asm.contains("mov QWORD [rbp+24], rdx"));
    }

    #[test]
    fn return_lowers_to_leave_and_ret() {
        let asm = compile("fn main :: () -> (i32) { return 42; }", CallingConvention::Win64);
        assert!(asm.contains("leave"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn entry_point_forwards_mains_return_value_as_exit_code() {
        let asm = compile("fn main :: () -> (i32) { return 7; }", CallingConvention::Win64);
        assert!(asm.contains("__main:"));
        assert!(asm.contains("call main"));
        assert!(asm.contains("call ExitProcess"));
    }

    #[test]
    fn branch_emits_a_comparison_and_two_labels() {
        let asm = compile(
            "fn main :: () -> (i32) { if (1 < 2) { return 1; } else { return 2; } }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("cmp rax, 0"));
        assert!(asm.contains("je .L"));
        assert!(asm.contains("jmp .L"));
    }

    #[test]
    fn loop_jumps_to_its_condition_before_the_first_body_execution() {
        let asm = compile(
            "fn main :: () -> (i32) { i := 0; while (i < 3) { i = i + 1; } return i; }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("jmp .L"));
        assert!(asm.contains("jne .L"));
    }

    #[test]
    fn function_call_reserves_shadow_space_before_call() {
        let asm = compile(
            "fn add :: (a: i32, b: i32) -> (i32) { return a + b; } \
             fn main :: () -> (i32) { return add(1, 2); }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("sub rsp, 32"));
        assert!(asm.contains("call add"));
    }

    #[test]
    fn short_circuit_and_skips_the_right_operand_label() {
        let asm = compile(
            "fn main :: () -> (i32) { return (1 < 2) && (3 < 4); }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("je .L"));
    }

    #[test]
    fn division_emits_cqo_before_idiv() {
        let asm = compile("fn main :: () -> (i32) { return 10 / 2; }", CallingConvention::Win64);
        assert!(asm.contains("cqo"));
        assert!(asm.contains("idiv rbx"));
    }

    #[test]
    fn string_literal_is_placed_in_a_data_section_and_addressed_by_label() {
        let asm = compile(
            "fn main :: () -> (i32) { greeting := \"hi\"; return 0; }",
            CallingConvention::Win64,
        );
        assert!(asm.contains("segment .data"));
        assert!(asm.contains("str0: db \"hi\", 0"));
        assert!(asm.contains("lea rax, [str0]"));
    }
}
