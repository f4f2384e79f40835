//! Code generator state.
//!
//! `CodeGen` carries the output buffer and the label counter as explicit
//! struct fields rather than thread-locals or module statics (§9 "make the
//! label counter explicit state on a generator context"), so two generator
//! runs — as happen back to back in the convention-parameterized unit tests
//! below — never share counters.

use crate::ast::{CallingConvention, ExprHandle};

pub struct CodeGen {
    pub(super) output: String,
    pub(super) calling_convention: CallingConvention,
    pub(super) label_counter: usize,
    /// `(expression handle, data-section label, literal text)` for every
    /// `StringLiteral` node in the program, assigned once up front so the
    /// data section can be emitted before any function body that references
    /// one (§9 "string literals are wired to a read-only data section").
    pub(super) string_literals: Vec<(ExprHandle, String, String)>,
}

impl CodeGen {
    pub fn new(calling_convention: CallingConvention) -> Self {
        CodeGen {
            output: String::new(),
            calling_convention,
            label_counter: 0,
            string_literals: Vec::new(),
        }
    }

    /// Allocates a fresh, unique label, shared across every function in the
    /// emitted text (§4.5 "A monotonically-increasing counter ... shared
    /// across all functions").
    pub(super) fn new_label(&mut self) -> String {
        self.label_counter += 1;
        format!(".L{}", self.label_counter)
    }

    pub(super) fn label_for_string(&self, handle: ExprHandle) -> Option<&str> {
        self.string_literals
            .iter()
            .find(|(h, _, _)| *h == handle)
            .map(|(_, label, _)| label.as_str())
    }
}
