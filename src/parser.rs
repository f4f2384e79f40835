//! Recursive-descent / precedence-climbing parser for Sigil (§4.3)
//!
//! Builds a [`Program`] from a token stream. Expressions use precedence
//! climbing off the tables in this module; statements and function
//! declarations are ordinary recursive descent. Every `expect`/`consume`
//! failure is diagnosed and triggers panic-mode recovery: tokens are
//! discarded up to the next `;` or EOF, which is then consumed if present,
//! and parsing resumes at the next statement (§4.3 "Error recovery").

use crate::ast::{
    BinaryOp, CallingConvention, DataType, ExprHandle, Expression, ExpressionKind, Function,
    Parameter, Program, Statement, StatementKind, StmtIndex, UnaryOp, ERROR_EXPR,
};
use crate::diagnostics::Diagnostic;
use crate::lexer::{lex, TokenStream};
use crate::token::{SourceLocation, Token, TokenKind};

/// `(token, precedence, operator)` rows for binary operators, ordered by the
/// ten precedence levels in §4.3. All are left-associative; a `const` array
/// kept in source order rather than a hash map, per §9.
const BINARY_OPS: &[(TokenKind, u8, BinaryOp)] = &[
    (TokenKind::PipePipe, 1, BinaryOp::LogicalOr),
    (TokenKind::AmpAmp, 2, BinaryOp::LogicalAnd),
    (TokenKind::Pipe, 3, BinaryOp::BitOr),
    (TokenKind::Caret, 4, BinaryOp::BitXor),
    (TokenKind::Amp, 5, BinaryOp::BitAnd),
    (TokenKind::EqualEqual, 6, BinaryOp::Eq),
    (TokenKind::BangEqual, 6, BinaryOp::Ne),
    (TokenKind::Less, 7, BinaryOp::Lt),
    (TokenKind::Greater, 7, BinaryOp::Gt),
    (TokenKind::LessEqual, 7, BinaryOp::Le),
    (TokenKind::GreaterEqual, 7, BinaryOp::Ge),
    (TokenKind::LessLess, 8, BinaryOp::Shl),
    (TokenKind::GreaterGreater, 8, BinaryOp::Shr),
    (TokenKind::Plus, 9, BinaryOp::Add),
    (TokenKind::Minus, 9, BinaryOp::Sub),
    (TokenKind::Star, 10, BinaryOp::Mul),
    (TokenKind::Slash, 10, BinaryOp::Div),
    (TokenKind::Percent, 10, BinaryOp::Mod),
];

/// Assignment-level (precedence 0, right-associative) tokens. `None` means
/// plain `=`; `Some(op)` is a compound assignment, desugared at parse time
/// into `lhs = (lhs op rhs)` (§4.3 "Compound assignment").
const ASSIGN_OPS: &[(TokenKind, Option<BinaryOp>)] = &[
    (TokenKind::Equal, None),
    (TokenKind::PlusEqual, Some(BinaryOp::Add)),
    (TokenKind::MinusEqual, Some(BinaryOp::Sub)),
    (TokenKind::StarEqual, Some(BinaryOp::Mul)),
    (TokenKind::SlashEqual, Some(BinaryOp::Div)),
    (TokenKind::PercentEqual, Some(BinaryOp::Mod)),
    (TokenKind::AmpEqual, Some(BinaryOp::BitAnd)),
    (TokenKind::PipeEqual, Some(BinaryOp::BitOr)),
    (TokenKind::CaretEqual, Some(BinaryOp::BitXor)),
    (TokenKind::LessLessEqual, Some(BinaryOp::Shl)),
    (TokenKind::GreaterGreaterEqual, Some(BinaryOp::Shr)),
];

fn binary_op_info(kind: TokenKind) -> Option<(u8, BinaryOp)> {
    BINARY_OPS
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, prec, op)| (*prec, *op))
}

fn assign_op_info(kind: TokenKind) -> Option<Option<BinaryOp>> {
    ASSIGN_OPS.iter().find(|(k, _)| *k == kind).map(|(_, op)| *op)
}

/// A parse failure signal. The actual diagnostic has already been recorded
/// on `Parser` by the time this is returned; the unit payload just lets
/// callers use `?` to unwind to the nearest recovery point.
type PResult<T> = Result<T, ()>;

pub struct Parser {
    tokens: TokenStream,
    pos: usize,
    program: Program,
    diagnostics: Vec<Diagnostic>,
    had_error: bool,
}

/// Parses `source` end to end. Returns the (possibly partially built)
/// program, the accumulated diagnostics, and whether parsing succeeded.
/// Per §7, the returned `bool` is the single source of truth for whether
/// later phases may run on this `Program`.
pub fn parse(source: &str) -> (Program, Vec<Diagnostic>, bool) {
    let mut parser = Parser {
        tokens: lex(source),
        pos: 0,
        program: Program::new(),
        diagnostics: Vec::new(),
        had_error: false,
    };
    let success = parser.parse_program();
    (parser.program, parser.diagnostics, success)
}

impl Parser {
    fn parse_program(&mut self) -> bool {
        while !self.at_eof() {
            if self.parse_function().is_err() {
                self.synchronize();
            }
        }
        !self.had_error
    }

    // ---- token stream helpers -------------------------------------------------

    fn current(&self) -> Token {
        self.tokens.tokens[self.pos]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .tokens
            .get(self.pos + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at_eof(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            self.error_here(&format!(
                "Expected {} but found '{:?}'",
                what,
                self.current_kind()
            ));
            Err(())
        }
    }

    fn identifier_text(&self, token: &Token) -> String {
        self.tokens.identifier_text(token).to_string()
    }

    fn error_here(&mut self, message: &str) {
        self.had_error = true;
        self.diagnostics
            .push(Diagnostic::error(self.current().source_location, message));
    }

    /// Panic-mode recovery (§4.3): discard tokens until `;` or EOF, consuming
    /// the `;` if present.
    fn synchronize(&mut self) {
        loop {
            if self.check(TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if self.at_eof() {
                return;
            }
            self.advance();
        }
    }

    // ---- expressions ------------------------------------------------------

    fn push_expr(&mut self, loc: SourceLocation, kind: ExpressionKind) -> ExprHandle {
        self.program.push_expression(Expression {
            kind,
            source_location: loc,
            result_data_type: DataType::Unknown,
            next_handle: ERROR_EXPR,
        })
    }

    fn parse_expression(&mut self, min_prec: u8) -> PResult<ExprHandle> {
        let mut lhs = self.parse_unary()?;

        loop {
            let kind = self.current_kind();

            if min_prec == 0 {
                if let Some(compound) = assign_op_info(kind) {
                    let loc = self.current().source_location;
                    self.advance();
                    let rhs = self.parse_expression(0)?;
                    let rhs = match compound {
                        Some(op) => self.push_expr(
                            loc,
                            ExpressionKind::Binary { op, lhs, rhs },
                        ),
                        None => rhs,
                    };
                    lhs = self.push_expr(loc, ExpressionKind::Assignment { lhs, rhs });
                    continue;
                }
            }

            if let Some((prec, op)) = binary_op_info(kind) {
                if prec < min_prec {
                    break;
                }
                let loc = self.current().source_location;
                self.advance();
                let rhs = self.parse_expression(prec + 1)?;
                lhs = self.push_expr(loc, ExpressionKind::Binary { op, lhs, rhs });
                continue;
            }

            break;
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<ExprHandle> {
        let loc = self.current().source_location;
        let op = match self.current_kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::LogicalNot),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.parse_unary()?;
                Ok(self.push_expr(loc, ExpressionKind::Unary { op, rhs }))
            }
            None => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> PResult<ExprHandle> {
        let loc = self.current().source_location;
        match self.current_kind() {
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::NumericLiteral => {
                let token = self.advance();
                let literal = self.tokens.numeric_literal(&token);
                Ok(self.push_expr(loc, ExpressionKind::NumericLiteral(literal)))
            }
            TokenKind::StringLiteral => {
                let token = self.advance();
                let text = self.identifier_text(&token);
                Ok(self.push_expr(loc, ExpressionKind::StringLiteral(text)))
            }
            TokenKind::Identifier => {
                let token = self.advance();
                let name = self.identifier_text(&token);
                if self.check(TokenKind::OpenParen) {
                    self.parse_call(loc, name)
                } else {
                    Ok(self.push_expr(
                        loc,
                        ExpressionKind::Identifier {
                            name,
                            offset_from_frame_pointer: 0,
                        },
                    ))
                }
            }
            _ => {
                self.error_here("Expected an expression");
                Err(())
            }
        }
    }

    fn parse_call(&mut self, loc: SourceLocation, function_name: String) -> PResult<ExprHandle> {
        self.expect(TokenKind::OpenParen, "'('")?;
        let mut first_argument_handle = ERROR_EXPR;
        let mut last_argument_handle: Option<ExprHandle> = None;

        if !self.check(TokenKind::CloseParen) {
            loop {
                let arg = self.parse_expression(0)?;
                if first_argument_handle == ERROR_EXPR {
                    first_argument_handle = arg;
                } else if let Some(prev) = last_argument_handle {
                    self.program.expr_mut(prev).next_handle = arg;
                }
                last_argument_handle = Some(arg);

                if self.match_kind(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }

        self.expect(TokenKind::CloseParen, "')'")?;
        Ok(self.push_expr(
            loc,
            ExpressionKind::FunctionCall {
                function_name,
                first_argument_handle,
                function_index: -1,
            },
        ))
    }

    // ---- statements ---------------------------------------------------------

    fn parse_statement_recovering(&mut self) {
        if self.parse_statement().is_err() {
            self.synchronize();
        }
    }

    fn parse_statement(&mut self) -> PResult<StmtIndex> {
        match self.current_kind() {
            TokenKind::OpenBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Identifier
                if matches!(self.peek_next_kind(), TokenKind::Colon | TokenKind::ColonEqual) =>
            {
                self.parse_declaration()
            }
            _ => self.parse_simple(),
        }
    }

    fn parse_block(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        self.expect(TokenKind::OpenBrace, "'{'")?;
        let index = self.program.push_statement(Statement {
            kind: StatementKind::Block { statement_count: 0 },
            source_location: loc,
        });

        let start = self.program.statements.len();
        while !self.check(TokenKind::CloseBrace) && !self.at_eof() {
            self.parse_statement_recovering();
        }
        let count = self.program.statements.len() - start;
        self.expect(TokenKind::CloseBrace, "'}'")?;

        if let StatementKind::Block { statement_count } = &mut self.program.statements[index].kind
        {
            *statement_count = count;
        }
        Ok(index)
    }

    fn parse_if(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::OpenParen, "'('")?;
        let condition_handle = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen, "')'")?;

        let index = self.program.push_statement(Statement {
            kind: StatementKind::Branch {
                condition_handle,
                then_count: 0,
                else_count: 0,
            },
            source_location: loc,
        });

        let then_start = self.program.statements.len();
        self.parse_statement_recovering();
        let then_count = self.program.statements.len() - then_start;

        let mut else_count = 0;
        if self.match_kind(TokenKind::Else) {
            let else_start = self.program.statements.len();
            self.parse_statement_recovering();
            else_count = self.program.statements.len() - else_start;
        }

        if let StatementKind::Branch {
            then_count: tc,
            else_count: ec,
            ..
        } = &mut self.program.statements[index].kind
        {
            *tc = then_count;
            *ec = else_count;
        }
        Ok(index)
    }

    fn parse_while(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::OpenParen, "'('")?;
        let condition_handle = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen, "')'")?;

        let index = self.program.push_statement(Statement {
            kind: StatementKind::Loop {
                condition_handle,
                then_count: 0,
            },
            source_location: loc,
        });

        let body_start = self.program.statements.len();
        self.parse_statement_recovering();
        let then_count = self.program.statements.len() - body_start;

        if let StatementKind::Loop { then_count: tc, .. } = &mut self.program.statements[index].kind
        {
            *tc = then_count;
        }
        Ok(index)
    }

    fn parse_return(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        self.expect(TokenKind::Return, "'return'")?;
        let rhs_handle = self.parse_expression(0)?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(self.program.push_statement(Statement {
            kind: StatementKind::Return { rhs_handle },
            source_location: loc,
        }))
    }

    fn parse_simple(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        let expression_handle = self.parse_expression(0)?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(self.program.push_statement(Statement {
            kind: StatementKind::Simple { expression_handle },
            source_location: loc,
        }))
    }

    fn parse_declaration(&mut self) -> PResult<StmtIndex> {
        let loc = self.current().source_location;
        let name_token = self.expect(TokenKind::Identifier, "an identifier")?;
        let name = self.identifier_text(&name_token);
        let lhs_handle = self.push_expr(
            loc,
            ExpressionKind::Identifier {
                name,
                offset_from_frame_pointer: 0,
            },
        );

        if self.match_kind(TokenKind::ColonEqual) {
            let rhs_handle = self.parse_expression(0)?;
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(self.program.push_statement(Statement {
                kind: StatementKind::DeclarationAssignment {
                    lhs_handle,
                    rhs_handle,
                    data_type: DataType::Unknown,
                },
                source_location: loc,
            }));
        }

        self.expect(TokenKind::Colon, "':' or ':='")?;
        let data_type = self.parse_type()?;

        if self.match_kind(TokenKind::Equal) {
            let rhs_handle = self.parse_expression(0)?;
            self.expect(TokenKind::Semicolon, "';'")?;
            Ok(self.program.push_statement(Statement {
                kind: StatementKind::DeclarationAssignment {
                    lhs_handle,
                    rhs_handle,
                    data_type,
                },
                source_location: loc,
            }))
        } else {
            self.expect(TokenKind::Semicolon, "';'")?;
            Ok(self.program.push_statement(Statement {
                kind: StatementKind::Declaration {
                    lhs_handle,
                    data_type,
                },
                source_location: loc,
            }))
        }
    }

    fn parse_type(&mut self) -> PResult<DataType> {
        let data_type = match self.current_kind() {
            TokenKind::B32 => DataType::B32,
            TokenKind::U32 => DataType::U32,
            TokenKind::I32 => DataType::I32,
            TokenKind::F32 => DataType::F32,
            _ => {
                self.error_here("Expected a type name");
                return Err(());
            }
        };
        self.advance();
        Ok(data_type)
    }

    // ---- function declarations ---------------------------------------------

    fn parse_function(&mut self) -> PResult<()> {
        let loc = self.current().source_location;
        self.expect(TokenKind::Fn, "'fn'")?;
        let name_token = self.expect(TokenKind::Identifier, "a function name")?;
        let name = self.identifier_text(&name_token);
        self.expect(TokenKind::ColonColon, "'::'")?;
        self.expect(TokenKind::OpenParen, "'('")?;

        let first_parameter = self.program.parameters.len();
        if !self.check(TokenKind::CloseParen) {
            loop {
                let param_name_token = self.expect(TokenKind::Identifier, "a parameter name")?;
                let param_name = self.identifier_text(&param_name_token);
                self.expect(TokenKind::Colon, "':'")?;
                let data_type = self.parse_type()?;
                self.program.parameters.push(Parameter {
                    name: param_name,
                    data_type,
                });
                if self.match_kind(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')'")?;
        let parameter_count = self.program.parameters.len() - first_parameter;

        self.expect(TokenKind::Arrow, "'->'")?;
        self.expect(TokenKind::OpenParen, "'('")?;
        let mut return_type = DataType::I32;
        if !self.check(TokenKind::CloseParen) {
            return_type = self.parse_type()?;
            while self.match_kind(TokenKind::Comma) {
                // Only the first return type is significant (§4.3); the
                // rest are parsed so the source remains well-formed but
                // otherwise discarded.
                self.parse_type()?;
            }
        }
        self.expect(TokenKind::CloseParen, "')'")?;

        let block_index = self.parse_block()?;
        let (body_first_statement, body_statement_count) =
            match self.program.statements[block_index].kind {
                StatementKind::Block { statement_count } => (block_index + 1, statement_count),
                _ => unreachable!("parse_block always produces a Block statement"),
            };

        self.program.functions.push(Function {
            name,
            source_location: loc,
            calling_convention: CallingConvention::Win64,
            body_first_statement,
            body_statement_count,
            first_parameter,
            parameter_count,
            return_type,
            stack_size: 0,
        });
        Ok(())
    }
}
