//! Semantic analyzer for Sigil (§4.4)
//!
//! Walks the parsed AST to resolve identifiers against a scope stack,
//! assign stack-frame offsets to locals, resolve call overloads by arity,
//! and compute each function's total stack-frame size. Results are written
//! back onto the nodes the parser created (offsets, function indices,
//! resolved declaration types, stack sizes) — the one place in the pipeline
//! where a later phase mutates an earlier phase's output (§2).

use crate::ast::{
    BinaryOp, DataType, ExprHandle, ExpressionKind, Program, StatementKind, StmtIndex, UnaryOp,
    ERROR_EXPR,
};
use crate::diagnostics::Diagnostic;
use crate::token::SourceLocation;

#[derive(Debug, Clone)]
struct LocalVariable {
    name: String,
    offset_from_frame_pointer: i32,
    data_type: DataType,
}

struct Analyzer<'a> {
    program: &'a mut Program,
    diagnostics: Vec<Diagnostic>,
    had_error: bool,
    locals: Vec<LocalVariable>,
    current_offset: i32,
    max_offset: i32,
}

/// Analyzes every function in `program`. Returns the accumulated
/// diagnostics and whether analysis succeeded overall; a failure on one
/// function does not stop the others from being analyzed (§7 "Fatal for
/// that function").
pub fn analyze(program: &mut Program) -> (Vec<Diagnostic>, bool) {
    let mut analyzer = Analyzer {
        program,
        diagnostics: Vec::new(),
        had_error: false,
        locals: Vec::new(),
        current_offset: 0,
        max_offset: 0,
    };
    let function_count = analyzer.program.functions.len();
    for index in 0..function_count {
        analyzer.analyze_function(index);
    }
    let had_error = analyzer.had_error;
    (analyzer.diagnostics, !had_error)
}

/// Rounds a stack-frame cursor up to the next multiple of 16 bytes, so
/// every function's frame keeps `rsp` aligned at `call` sites.
fn round_up_16(bytes: i32) -> i32 {
    if bytes <= 0 {
        0
    } else {
        (bytes + 15) / 16 * 16
    }
}

impl<'a> Analyzer<'a> {
    fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.had_error = true;
        self.diagnostics.push(Diagnostic::error(location, message));
    }

    fn analyze_function(&mut self, index: usize) {
        self.locals.clear();
        self.current_offset = 0;
        self.max_offset = 0;

        let (first_parameter, parameter_count, body_first_statement, body_statement_count) = {
            let f = &self.program.functions[index];
            (
                f.first_parameter,
                f.parameter_count,
                f.body_first_statement,
                f.body_statement_count,
            )
        };

        for p in 0..parameter_count {
            let param = self.program.parameters[first_parameter + p].clone();
            // Parameter i: +16 + i*8, reserving the return address and
            // saved frame pointer (§4.4 "Stack-frame layout").
            let offset_from_frame_pointer = 16 + (p as i32) * 8;
            self.locals.push(LocalVariable {
                name: param.name,
                offset_from_frame_pointer,
                data_type: param.data_type,
            });
        }

        let block_start = self.locals.len();
        let body: Vec<StmtIndex> = self
            .program
            .siblings(body_first_statement, body_first_statement + body_statement_count)
            .collect();
        for stmt_index in body {
            self.analyze_statement(stmt_index, block_start);
        }
        self.locals.truncate(block_start);

        self.program.functions[index].stack_size = round_up_16(self.max_offset);
    }

    fn lookup(&self, name: &str) -> Option<LocalVariable> {
        self.locals.iter().rev().find(|l| l.name == name).cloned()
    }

    fn declare_local(
        &mut self,
        stmt_index: StmtIndex,
        lhs_handle: ExprHandle,
        data_type: DataType,
        block_start: usize,
    ) {
        let location = self.program.statements[stmt_index].source_location;
        let name = match &self.program.expr(lhs_handle).kind {
            ExpressionKind::Identifier { name, .. } => name.clone(),
            _ => unreachable!("declaration lhs is always an Identifier expression"),
        };

        if self.locals[block_start..].iter().any(|l| l.name == name) {
            self.error(location, format!("Redeclaration of '{}'", name));
            return;
        }

        self.current_offset += 8;
        let offset_from_frame_pointer = -self.current_offset;
        self.max_offset = self.max_offset.max(self.current_offset);

        if let ExpressionKind::Identifier {
            offset_from_frame_pointer: slot,
            ..
        } = &mut self.program.expr_mut(lhs_handle).kind
        {
            *slot = offset_from_frame_pointer;
        }
        self.program.expr_mut(lhs_handle).result_data_type = data_type;

        self.locals.push(LocalVariable {
            name,
            offset_from_frame_pointer,
            data_type,
        });
    }

    fn analyze_statement(&mut self, stmt_index: StmtIndex, block_start: usize) {
        match self.program.statements[stmt_index].kind.clone() {
            StatementKind::Simple { expression_handle } => {
                self.analyze_expr(expression_handle);
            }
            StatementKind::Declaration {
                lhs_handle,
                data_type,
            } => {
                self.declare_local(stmt_index, lhs_handle, data_type, block_start);
            }
            StatementKind::DeclarationAssignment {
                lhs_handle,
                rhs_handle,
                data_type,
            } => {
                let rhs_type = self.analyze_expr(rhs_handle);
                let resolved_type = if data_type == DataType::Unknown {
                    rhs_type
                } else {
                    data_type
                };
                self.declare_local(stmt_index, lhs_handle, resolved_type, block_start);
            }
            StatementKind::Return { rhs_handle } => {
                self.analyze_expr(rhs_handle);
            }
            StatementKind::Block { .. } => {
                self.analyze_scope(self.program.children(stmt_index).collect());
            }
            StatementKind::Branch {
                condition_handle,
                then_count,
                else_count,
            } => {
                self.analyze_expr(condition_handle);
                let then_start = stmt_index + 1;
                let then: Vec<StmtIndex> =
                    self.program.siblings(then_start, then_start + then_count).collect();
                self.analyze_scope(then);
                let else_start = then_start + then_count;
                let else_: Vec<StmtIndex> =
                    self.program.siblings(else_start, else_start + else_count).collect();
                self.analyze_scope(else_);
            }
            StatementKind::Loop {
                condition_handle,
                then_count,
            } => {
                self.analyze_expr(condition_handle);
                let body_start = stmt_index + 1;
                let body: Vec<StmtIndex> =
                    self.program.siblings(body_start, body_start + then_count).collect();
                self.analyze_scope(body);
            }
            StatementKind::Error => {}
        }
    }

    /// Runs a fresh block scope over `stmts`: locals declared inside are
    /// invisible afterward, and the stack-offset cursor is restored to its
    /// value at entry so sibling scopes can reuse the same slots (§4.4
    /// "On block exit the cursor is reset ... the max value is not reset").
    fn analyze_scope(&mut self, stmts: Vec<StmtIndex>) {
        let locals_mark = self.locals.len();
        let offset_mark = self.current_offset;
        for stmt_index in stmts {
            self.analyze_statement(stmt_index, locals_mark);
        }
        self.locals.truncate(locals_mark);
        self.current_offset = offset_mark;
    }

    fn analyze_expr(&mut self, handle: ExprHandle) -> DataType {
        if handle == ERROR_EXPR {
            return DataType::Unknown;
        }
        let location = self.program.expr(handle).source_location;
        let result = match self.program.expr(handle).kind.clone() {
            ExpressionKind::NumericLiteral(lit) => match lit.ty {
                crate::token::NumericType::B32 => DataType::B32,
                crate::token::NumericType::I32 => DataType::I32,
                crate::token::NumericType::U32 => DataType::U32,
                crate::token::NumericType::F32 => DataType::F32,
                crate::token::NumericType::Unknown => DataType::Unknown,
            },
            ExpressionKind::StringLiteral(_) => DataType::Unknown,
            ExpressionKind::Identifier { name, .. } => match self.lookup(&name) {
                Some(local) => {
                    if let ExpressionKind::Identifier {
                        offset_from_frame_pointer,
                        ..
                    } = &mut self.program.expr_mut(handle).kind
                    {
                        *offset_from_frame_pointer = local.offset_from_frame_pointer;
                    }
                    local.data_type
                }
                None => {
                    self.error(location, format!("Undeclared identifier '{}'", name));
                    DataType::Unknown
                }
            },
            ExpressionKind::Unary { op, rhs } => {
                let rhs_type = self.analyze_expr(rhs);
                match op {
                    UnaryOp::Neg => DataType::I32.min(rhs_type),
                    UnaryOp::BitNot => {
                        if rhs_type != DataType::Unknown && !rhs_type.is_integral() {
                            self.error(location, "'~' requires an integral operand");
                        }
                        rhs_type
                    }
                    UnaryOp::LogicalNot => DataType::B32,
                }
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs_type = self.analyze_expr(lhs);
                let rhs_type = self.analyze_expr(rhs);
                self.binary_result_type(location, op, lhs_type, rhs_type)
            }
            ExpressionKind::Assignment { lhs, rhs } => {
                if !matches!(self.program.expr(lhs).kind, ExpressionKind::Identifier { .. }) {
                    self.error(location, "Assignment target must be an identifier");
                }
                let lhs_type = self.analyze_expr(lhs);
                self.analyze_expr(rhs);
                lhs_type
            }
            ExpressionKind::FunctionCall {
                function_name,
                first_argument_handle,
                ..
            } => self.analyze_call(handle, location, function_name, first_argument_handle),
            ExpressionKind::Error => DataType::Unknown,
        };
        self.program.expr_mut(handle).result_data_type = result;
        result
    }

    fn binary_result_type(
        &mut self,
        location: SourceLocation,
        op: BinaryOp,
        lhs_type: DataType,
        rhs_type: DataType,
    ) -> DataType {
        use BinaryOp::*;
        match op {
            Eq | Ne | Lt | Gt | Le | Ge => DataType::B32,
            LogicalAnd | LogicalOr => {
                let both_known = lhs_type != DataType::Unknown && rhs_type != DataType::Unknown;
                if both_known && (!lhs_type.converts_to_b32() || !rhs_type.converts_to_b32()) {
                    self.error(location, "'&&'/'||' require operands convertible to b32");
                }
                if lhs_type == DataType::Unknown || rhs_type == DataType::Unknown {
                    DataType::Unknown
                } else {
                    DataType::B32
                }
            }
            BitAnd | BitOr | BitXor => {
                let both_known = lhs_type != DataType::Unknown && rhs_type != DataType::Unknown;
                if both_known && (!lhs_type.converts_to_b32() || !rhs_type.converts_to_b32()) {
                    self.error(location, "operator requires operands convertible to b32");
                }
                lhs_type.max(rhs_type)
            }
            Shl | Shr | Mod => {
                let both_known = lhs_type != DataType::Unknown && rhs_type != DataType::Unknown;
                if both_known && (!lhs_type.is_integral() || !rhs_type.is_integral()) {
                    self.error(location, "operator requires integral operands");
                }
                lhs_type.max(rhs_type)
            }
            Add | Sub | Mul | Div => lhs_type.max(rhs_type),
        }
    }

    fn analyze_call(
        &mut self,
        handle: ExprHandle,
        location: SourceLocation,
        function_name: String,
        first_argument_handle: ExprHandle,
    ) -> DataType {
        let mut argument_count = 0usize;
        let mut cursor = first_argument_handle;
        while cursor != ERROR_EXPR {
            self.analyze_expr(cursor);
            cursor = self.program.expr(cursor).next_handle;
            argument_count += 1;
        }

        let candidates: Vec<usize> = self
            .program
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name == function_name && f.parameter_count == argument_count)
            .map(|(i, _)| i)
            .collect();

        match candidates.as_slice() {
            [] => {
                self.error(
                    location,
                    format!(
                        "No matching function '{}' with {} argument(s)",
                        function_name, argument_count
                    ),
                );
                DataType::Unknown
            }
            [only] => {
                let resolved_index = *only;
                if let ExpressionKind::FunctionCall { function_index, .. } =
                    &mut self.program.expr_mut(handle).kind
                {
                    *function_index = resolved_index as i32;
                }
                self.program.functions[resolved_index].return_type
            }
            _ => {
                self.error(
                    location,
                    format!(
                        "Ambiguous call to '{}': {} functions match {} argument(s)",
                        function_name,
                        candidates.len(),
                        argument_count
                    ),
                );
                DataType::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> (Program, Vec<Diagnostic>, bool) {
        let (mut program, parse_diags, parse_ok) = parse(src);
        assert!(parse_ok, "parse failed: {:?}", parse_diags);
        let (diags, ok) = analyze(&mut program);
        (program, diags, ok)
    }

    #[test]
    fn undeclared_identifier_is_reported() {
        let (_, diags, ok) = analyze_src("fn main :: () -> (i32) { x; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("Undeclared identifier 'x'")));
    }

    #[test]
    fn redeclaration_in_same_block_is_an_error() {
        let (_, diags, ok) =
            analyze_src("fn main :: () -> (i32) { x: i32 = 1; x: i32 = 2; return x; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("Redeclaration")));
    }

    #[test]
    fn shadowing_an_outer_scope_name_is_allowed() {
        let (_, _, ok) = analyze_src(
            "fn main :: () -> (i32) { x: i32 = 1; { x: i32 = 2; } return x; }",
        );
        assert!(ok);
    }

    #[test]
    fn two_sequential_locals_get_8_byte_spaced_offsets() {
        let (program, _, ok) = analyze_src(
            "fn main :: () -> (i32) { x: i32 = 40; y: i32 = 2; return x + y; }",
        );
        assert!(ok);
        assert_eq!(program.functions[0].stack_size, 16);
    }

    #[test]
    fn parameters_receive_positive_offsets_above_the_frame_pointer() {
        let (program, _, ok) = analyze_src("fn add :: (a: i32, b: i32) -> (i32) { return a + b; }");
        assert!(ok);
        let f = &program.functions[0];
        let body = f.body_first_statement;
        let StatementKind::Return { rhs_handle } = program.statements[body].kind else {
            panic!("expected return")
        };
        let ExpressionKind::Binary { lhs, rhs, .. } = &program.expr(rhs_handle).kind else {
            panic!("expected binary")
        };
        let ExpressionKind::Identifier {
            offset_from_frame_pointer: a_offset,
            ..
        } = program.expr(*lhs).kind
        else {
            panic!("expected identifier")
        };
        let ExpressionKind::Identifier {
            offset_from_frame_pointer: b_offset,
            ..
        } = program.expr(*rhs).kind
        else {
            panic!("expected identifier")
        };
        assert_eq!(a_offset, 16);
        assert_eq!(b_offset, 24);
    }

    #[test]
    fn call_resolves_by_matching_arity() {
        let (program, _, ok) = analyze_src(
            "fn add :: (a: i32, b: i32) -> (i32) { return a + b; } \
             fn main :: () -> (i32) { return add(3, 4); }",
        );
        assert!(ok);
        let main = &program.functions[1];
        let StatementKind::Return { rhs_handle } =
            program.statements[main.body_first_statement].kind
        else {
            panic!("expected return")
        };
        let ExpressionKind::FunctionCall { function_index, .. } = program.expr(rhs_handle).kind
        else {
            panic!("expected call")
        };
        assert_eq!(function_index, 0);
    }

    #[test]
    fn call_with_no_matching_arity_is_an_error() {
        let (_, diags, ok) = analyze_src(
            "fn add :: (a: i32, b: i32) -> (i32) { return a + b; } \
             fn main :: () -> (i32) { return add(3); }",
        );
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("No matching function")));
    }

    #[test]
    fn ambiguous_overload_by_arity_is_an_error() {
        let (_, diags, ok) = analyze_src(
            "fn f :: (a: i32) -> (i32) { return a; } \
             fn f :: (b: i32) -> (i32) { return b; } \
             fn main :: () -> (i32) { return f(1); }",
        );
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("Ambiguous call")));
    }

    #[test]
    fn inferred_declaration_takes_the_initializer_type() {
        let (program, _, ok) = analyze_src("fn main :: () -> (i32) { x := true; return 0; }");
        assert!(ok);
        let StatementKind::DeclarationAssignment { data_type, .. } =
            program.statements[program.functions[0].body_first_statement].kind
        else {
            panic!("expected decl-assign")
        };
        assert_eq!(data_type, DataType::B32);
    }

    #[test]
    fn bitwise_not_on_a_float_is_rejected() {
        let (_, diags, ok) = analyze_src("fn main :: () -> (i32) { x := 1.5; y := ~x; return 0; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("integral")));
    }

    #[test]
    fn bitwise_not_on_a_b32_is_rejected() {
        let (_, diags, ok) = analyze_src("fn main :: () -> (i32) { x := true; y := ~x; return 0; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("integral")));
    }

    #[test]
    fn bitwise_or_allows_b32_operands() {
        let (_, _, ok) =
            analyze_src("fn main :: () -> (i32) { x := true; y := false; z := x | y; return 0; }");
        assert!(ok);
    }

    #[test]
    fn shift_on_a_b32_is_rejected() {
        let (_, diags, ok) = analyze_src("fn main :: () -> (i32) { x := true; y := x << 1; return 0; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("integral")));
    }

    #[test]
    fn modulo_on_a_b32_is_rejected() {
        let (_, diags, ok) = analyze_src("fn main :: () -> (i32) { x := true; y := x % 2; return 0; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("integral")));
    }

    #[test]
    fn logical_and_on_a_float_operand_is_rejected() {
        let (_, diags, ok) =
            analyze_src("fn main :: () -> (i32) { x := 1.5; y := x && true; return 0; }");
        assert!(!ok);
        assert!(diags.iter().any(|d| d.message.contains("b32")));
    }

    #[test]
    fn logical_and_on_b32_and_integral_operands_is_allowed() {
        let (_, _, ok) =
            analyze_src("fn main :: () -> (i32) { x := true; y := 1; z := x && y; return 0; }");
        assert!(ok);
    }

    #[test]
    fn nested_block_reuses_stack_slot_after_exit() {
        let (program, _, ok) = analyze_src(
            "fn main :: () -> (i32) { { a: i32 = 1; } { b: i32 = 2; } return 0; }",
        );
        assert!(ok);
        // Both `a` and `b` occupy the same reused slot since their blocks
        // do not overlap, so stack_size stays at one 8-byte slot rounded to 16.
        assert_eq!(program.functions[0].stack_size, 16);
    }

    #[test]
    fn recursive_call_is_permitted() {
        let (_, _, ok) = analyze_src(
            "fn fact :: (n: i32) -> (i32) { return fact(n); } \
             fn main :: () -> (i32) { return fact(5); }",
        );
        assert!(ok);
    }
}
