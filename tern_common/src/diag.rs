use crate::span::*;
use std::fmt;

/// One reported problem: a message anchored to the source location it was
/// raised at. Checking continues past these; they are collected on the
/// owning program and sorted before being handed back to the caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl Spanned for Diagnostic {
    fn span(&self) -> &Span {
        &self.span
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.message)
    }
}

/// Accumulated diagnostics for one program. `failed` latches permanently
/// once anything is recorded.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    failed: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.entries.push(Diagnostic::new(message, span));
        self.failed = true;
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.entries.push(diag);
        self.failed = true;
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        for diag in diags {
            self.push(diag);
        }
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The accumulated list in source order.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.span.cmp(&b.span));
        sorted
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}
