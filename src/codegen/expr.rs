//! Expression lowering: stack-machine NASM emission (§4.5).
//!
//! Every lowered expression leaves exactly one value pushed on the runtime
//! stack; every consumer pops exactly what it pushed. This symmetry is the
//! whole of the calling discipline here — there is no register allocator,
//! values only ever live in `rax`/`rbx` transiently between a pop and the
//! next push.

use std::fmt::Write as _;

use super::error::CodeGenError;
use super::state::CodeGen;
use crate::ast::{BinaryOp, ExprHandle, ExpressionKind, Program, UnaryOp, ERROR_EXPR};
use crate::token::NumericValue;

fn frame_operand(offset_from_frame_pointer: i32) -> String {
    if offset_from_frame_pointer >= 0 {
        format!("[rbp+{}]", offset_from_frame_pointer)
    } else {
        format!("[rbp{}]", offset_from_frame_pointer)
    }
}

impl CodeGen {
    pub(super) fn lower_expr(
        &mut self,
        program: &Program,
        handle: ExprHandle,
    ) -> Result<(), CodeGenError> {
        if handle == ERROR_EXPR {
            return Err(CodeGenError::Internal(
                "encountered the error sentinel expression during codegen".into(),
            ));
        }

        match &program.expr(handle).kind {
            ExpressionKind::NumericLiteral(lit) => self.lower_numeric_literal(lit),
            ExpressionKind::StringLiteral(_) => self.lower_string_literal(handle)?,
            ExpressionKind::Identifier {
                offset_from_frame_pointer,
                ..
            } => {
                let _ = writeln!(
                    self.output,
                    "    push QWORD {}",
                    frame_operand(*offset_from_frame_pointer)
                );
            }
            ExpressionKind::Unary { op, rhs } => self.lower_unary(program, *op, *rhs)?,
            ExpressionKind::Binary { op, lhs, rhs } => {
                self.lower_binary(program, *op, *lhs, *rhs)?
            }
            ExpressionKind::Assignment { lhs, rhs } => self.lower_assignment(program, *lhs, *rhs)?,
            ExpressionKind::FunctionCall {
                first_argument_handle,
                function_index,
                ..
            } => self.lower_call(program, *first_argument_handle, *function_index)?,
            ExpressionKind::Error => {
                return Err(CodeGenError::Internal(
                    "encountered an Error expression node during codegen".into(),
                ));
            }
        }
        Ok(())
    }

    fn lower_numeric_literal(&mut self, lit: &crate::token::NumericLiteral) {
        let imm: i64 = match lit.value {
            NumericValue::B32(b) => b as i64,
            NumericValue::I32(v) => v as i64,
            NumericValue::U32(v) => v as i64,
            // Floats carry no integer arithmetic in this stack machine; the
            // bit pattern is pushed verbatim so a value round-trips through
            // a declaration and back out unchanged.
            NumericValue::F32(v) => v.to_bits() as i64,
        };
        let _ = writeln!(self.output, "    mov rax, {}", imm);
        let _ = writeln!(self.output, "    push rax");
    }

    /// Pushes the address of the literal's `.data` label (§9 "string
    /// literals are wired to a read-only data section"), addressed
    /// RIP-relative per the `default rel` preamble directive.
    fn lower_string_literal(&mut self, handle: ExprHandle) -> Result<(), CodeGenError> {
        let label = self
            .label_for_string(handle)
            .ok_or_else(|| {
                CodeGenError::Internal("string literal has no assigned data label".into())
            })?
            .to_string();
        let _ = writeln!(self.output, "    lea rax, [{}]", label);
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }

    fn lower_unary(
        &mut self,
        program: &Program,
        op: UnaryOp,
        rhs: ExprHandle,
    ) -> Result<(), CodeGenError> {
        self.lower_expr(program, rhs)?;
        let _ = writeln!(self.output, "    pop rax");
        match op {
            UnaryOp::Neg => {
                let _ = writeln!(self.output, "    neg rax");
            }
            UnaryOp::BitNot => {
                let _ = writeln!(self.output, "    not rax");
            }
            UnaryOp::LogicalNot => {
                let _ = writeln!(self.output, "    cmp rax, 0");
                let _ = writeln!(self.output, "    sete al");
                let _ = writeln!(self.output, "    movzx eax, al");
            }
        }
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }

    fn lower_binary(
        &mut self,
        program: &Program,
        op: BinaryOp,
        lhs: ExprHandle,
        rhs: ExprHandle,
    ) -> Result<(), CodeGenError> {
        if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) {
            return self.lower_short_circuit(program, op, lhs, rhs);
        }

        self.lower_expr(program, lhs)?;
        self.lower_expr(program, rhs)?;
        let _ = writeln!(self.output, "    pop rbx");
        let _ = writeln!(self.output, "    pop rax");

        match op {
            BinaryOp::BitOr => {
                let _ = writeln!(self.output, "    or rax, rbx");
            }
            BinaryOp::BitXor => {
                let _ = writeln!(self.output, "    xor rax, rbx");
            }
            BinaryOp::BitAnd => {
                let _ = writeln!(self.output, "    and rax, rbx");
            }
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let set = match op {
                    BinaryOp::Eq => "sete",
                    BinaryOp::Ne => "setne",
                    BinaryOp::Lt => "setl",
                    BinaryOp::Gt => "setg",
                    BinaryOp::Le => "setle",
                    BinaryOp::Ge => "setge",
                    _ => unreachable!(),
                };
                let _ = writeln!(self.output, "    cmp rax, rbx");
                let _ = writeln!(self.output, "    {} al", set);
                let _ = writeln!(self.output, "    movzx eax, al");
            }
            BinaryOp::Shl => {
                let _ = writeln!(self.output, "    shlx rax, rax, rbx");
            }
            BinaryOp::Shr => {
                let _ = writeln!(self.output, "    shrx rax, rax, rbx");
            }
            BinaryOp::Add => {
                let _ = writeln!(self.output, "    add rax, rbx");
            }
            BinaryOp::Sub => {
                let _ = writeln!(self.output, "    sub rax, rbx");
            }
            BinaryOp::Mul => {
                let _ = writeln!(self.output, "    imul rax, rbx");
            }
            BinaryOp::Div => {
                let _ = writeln!(self.output, "    cqo");
                let _ = writeln!(self.output, "    idiv rbx");
            }
            BinaryOp::Mod => {
                let _ = writeln!(self.output, "    cqo");
                let _ = writeln!(self.output, "    idiv rbx");
                let _ = writeln!(self.output, "    mov rax, rdx");
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => unreachable!("handled above"),
        }
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }

    /// `&&`/`||` skip evaluating their right operand once the left one has
    /// already decided the result (§4.5, §9 redesign).
    fn lower_short_circuit(
        &mut self,
        program: &Program,
        op: BinaryOp,
        lhs: ExprHandle,
        rhs: ExprHandle,
    ) -> Result<(), CodeGenError> {
        let short_circuit_label = self.new_label();
        let end_label = self.new_label();

        self.lower_expr(program, lhs)?;
        let _ = writeln!(self.output, "    pop rax");
        let _ = writeln!(self.output, "    cmp rax, 0");
        match op {
            BinaryOp::LogicalAnd => {
                let _ = writeln!(self.output, "    je {}", short_circuit_label);
            }
            BinaryOp::LogicalOr => {
                let _ = writeln!(self.output, "    jne {}", short_circuit_label);
            }
            _ => unreachable!("only called for && and ||"),
        }

        self.lower_expr(program, rhs)?;
        let _ = writeln!(self.output, "    pop rax");
        let _ = writeln!(self.output, "    cmp rax, 0");
        match op {
            BinaryOp::LogicalAnd => {
                let _ = writeln!(self.output, "    je {}", short_circuit_label);
                let _ = writeln!(self.output, "    mov rax, 1");
            }
            BinaryOp::LogicalOr => {
                let _ = writeln!(self.output, "    jne {}", short_circuit_label);
                let _ = writeln!(self.output, "    mov rax, 0");
            }
            _ => unreachable!(),
        }
        let _ = writeln!(self.output, "    jmp {}", end_label);
        let _ = writeln!(self.output, "{}:", short_circuit_label);
        match op {
            BinaryOp::LogicalAnd => {
                let _ = writeln!(self.output, "    mov rax, 0");
            }
            BinaryOp::LogicalOr => {
                let _ = writeln!(self.output, "    mov rax, 1");
            }
            _ => unreachable!(),
        }
        let _ = writeln!(self.output, "{}:", end_label);
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }

    fn lower_assignment(
        &mut self,
        program: &Program,
        lhs: ExprHandle,
        rhs: ExprHandle,
    ) -> Result<(), CodeGenError> {
        let ExpressionKind::Identifier {
            offset_from_frame_pointer,
            ..
        } = program.expr(lhs).kind
        else {
            return Err(CodeGenError::Internal(
                "assignment target resolved to a non-identifier; analyzer should have rejected this".into(),
            ));
        };
        self.lower_expr(program, rhs)?;
        let _ = writeln!(self.output, "    pop rax");
        let _ = writeln!(
            self.output,
            "    mov {}, rax",
            frame_operand(offset_from_frame_pointer)
        );
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }

    fn lower_call(
        &mut self,
        program: &Program,
        first_argument_handle: ExprHandle,
        function_index: i32,
    ) -> Result<(), CodeGenError> {
        if function_index < 0 {
            return Err(CodeGenError::Internal(
                "call site has an unresolved function_index; analyzer should have rejected this".into(),
            ));
        }
        let target = &program.functions[function_index as usize];

        let mut arguments = Vec::new();
        let mut cursor = first_argument_handle;
        while cursor != ERROR_EXPR {
            arguments.push(cursor);
            cursor = program.expr(cursor).next_handle;
        }
        let argument_count = arguments.len();
        for &argument in &arguments {
            self.lower_expr(program, argument)?;
        }
        // Each lowered argument left one value pushed, in order, so
        // argument `i` currently sits at `[rsp + (argument_count-1-i)*8]`.

        let convention = self.calling_convention;
        let registers = convention.argument_registers();
        let register_count = registers.len();
        let overflow_count = argument_count.saturating_sub(register_count);

        let shadow_space = convention.shadow_space_bytes();
        let stack_needed = shadow_space + (overflow_count as i32) * 8;
        let reserved = round_up_16(stack_needed);

        if reserved > 0 {
            let _ = writeln!(self.output, "    sub rsp, {}", reserved);
        }
        // Pushed argument values now live at `[rsp + reserved + (n-1-i)*8]`;
        // copy each into its final home before `call` (§9's fix for the
        // shadow-space placement bug — these offsets are computed *after*
        // `sub rsp`, never before it).
        for (i, &register) in registers.iter().enumerate().take(argument_count) {
            let source = reserved + ((argument_count - 1 - i) as i32) * 8;
            let _ = writeln!(self.output, "    mov {}, [rsp+{}]", register, source);
        }
        for i in register_count..argument_count {
            let overflow_index = i - register_count;
            let dest = convention.stack_argument_offset(shadow_space, overflow_index);
            let source = reserved + ((argument_count - 1 - i) as i32) * 8;
            let _ = writeln!(self.output, "    mov rax, [rsp+{}]", source);
            let _ = writeln!(self.output, "    mov [rsp+{}], rax", dest);
        }

        let _ = writeln!(self.output, "    call {}", target.name);
        let cleanup = reserved + (argument_count as i32) * 8;
        if cleanup > 0 {
            let _ = writeln!(self.output, "    add rsp, {}", cleanup);
        }
        let _ = writeln!(self.output, "    push rax");
        Ok(())
    }
}

fn round_up_16(bytes: i32) -> i32 {
    if bytes <= 0 {
        0
    } else {
        (bytes + 15) / 16 * 16
    }
}
