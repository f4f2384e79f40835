//! Statement lowering (§4.5 "Statements").

use std::fmt::Write as _;

use super::error::CodeGenError;
use super::state::CodeGen;
use crate::ast::{ExpressionKind, Program, StatementKind, StmtIndex};

fn frame_operand(offset_from_frame_pointer: i32) -> String {
    if offset_from_frame_pointer >= 0 {
        format!("[rbp+{}]", offset_from_frame_pointer)
    } else {
        format!("[rbp{}]", offset_from_frame_pointer)
    }
}

impl CodeGen {
    pub(super) fn lower_statement(
        &mut self,
        program: &Program,
        stmt_index: StmtIndex,
    ) -> Result<(), CodeGenError> {
        match program.statements[stmt_index].kind.clone() {
            StatementKind::Simple { expression_handle } => {
                self.lower_expr(program, expression_handle)?;
                let _ = writeln!(self.output, "    add rsp, 8");
            }
            StatementKind::Declaration { .. } => {
                // No code: the slot exists only as a stack offset (§4.5).
            }
            StatementKind::DeclarationAssignment {
                lhs_handle,
                rhs_handle,
                ..
            } => {
                let ExpressionKind::Identifier {
                    offset_from_frame_pointer,
                    ..
                } = program.expr(lhs_handle).kind
                else {
                    return Err(CodeGenError::Internal(
                        "declaration lhs is always an Identifier expression".into(),
                    ));
                };
                self.lower_expr(program, rhs_handle)?;
                let _ = writeln!(self.output, "    pop rax");
                let _ = writeln!(
                    self.output,
                    "    mov {}, rax",
                    frame_operand(offset_from_frame_pointer)
                );
            }
            StatementKind::Return { rhs_handle } => {
                self.lower_expr(program, rhs_handle)?;
                let _ = writeln!(self.output, "    pop rax");
                let _ = writeln!(self.output, "    leave");
                let _ = writeln!(self.output, "    ret");
            }
            StatementKind::Block { .. } => {
                let children: Vec<StmtIndex> = program.children(stmt_index).collect();
                for child in children {
                    self.lower_statement(program, child)?;
                }
            }
            StatementKind::Branch {
                condition_handle,
                then_count,
                else_count,
            } => {
                let else_label = self.new_label();
                let end_label = self.new_label();

                self.lower_expr(program, condition_handle)?;
                let _ = writeln!(self.output, "    pop rax");
                let _ = writeln!(self.output, "    cmp rax, 0");
                let _ = writeln!(self.output, "    je {}", else_label);

                let then_start = stmt_index + 1;
                let then: Vec<StmtIndex> =
                    program.siblings(then_start, then_start + then_count).collect();
                for s in then {
                    self.lower_statement(program, s)?;
                }
                if else_count > 0 {
                    let _ = writeln!(self.output, "    jmp {}", end_label);
                }
                let _ = writeln!(self.output, "{}:", else_label);

                let else_start = then_start + then_count;
                let else_stmts: Vec<StmtIndex> =
                    program.siblings(else_start, else_start + else_count).collect();
                for s in else_stmts {
                    self.lower_statement(program, s)?;
                }
                if else_count > 0 {
                    let _ = writeln!(self.output, "{}:", end_label);
                }
            }
            StatementKind::Loop {
                condition_handle,
                then_count,
            } => {
                let body_label = self.new_label();
                let cond_label = self.new_label();

                let _ = writeln!(self.output, "    jmp {}", cond_label);
                let _ = writeln!(self.output, "{}:", body_label);

                let body_start = stmt_index + 1;
                let body: Vec<StmtIndex> =
                    program.siblings(body_start, body_start + then_count).collect();
                for s in body {
                    self.lower_statement(program, s)?;
                }

                let _ = writeln!(self.output, "{}:", cond_label);
                self.lower_expr(program, condition_handle)?;
                let _ = writeln!(self.output, "    pop rax");
                let _ = writeln!(self.output, "    cmp rax, 0");
                let _ = writeln!(self.output, "    jne {}", body_label);
            }
            StatementKind::Error => {
                return Err(CodeGenError::Internal(
                    "encountered an Error statement node during codegen".into(),
                ));
            }
        }
        Ok(())
    }
}
