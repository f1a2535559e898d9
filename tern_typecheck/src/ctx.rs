use tern_ast::{abi::PROLOGUE_SIZE, module::SymbolScope, ty::TypeDecl};
use tern_common::{diag::Diagnostic, span::Span};

/// A local variable currently in scope. The stack of these is searched
/// innermost-first, so shadowing resolves to the nearest declaration.
#[derive(Debug, Clone)]
pub struct LocalSlot {
    pub name: String,
    pub ty: TypeDecl,
    pub stack_top: u32,
}

/// Snapshot of the enclosing function's signature: what a body needs to
/// resolve argument references and validate returns.
#[derive(Debug, Clone)]
pub struct FuncFrame {
    pub args: Vec<(String, TypeDecl)>,
    pub result: TypeDecl,
}

impl FuncFrame {
    /// The frame used when checking a global variable's initializer,
    /// which has no arguments and returns nothing.
    pub fn global_init(span: Span) -> Self {
        Self {
            args: Vec::new(),
            result: TypeDecl::new(tern_ast::ty::BaseType::Void, span),
        }
    }
}

/// Everything one `check_expr` walk carries: the symbol scope for
/// lookups, the enclosing function frame, the growing local scope, the
/// stack cursor with its high-water mark, the loop nesting depth (break
/// needs it non-empty), and the diagnostic sink. Diagnostics collected
/// here are merged into the program after the walk.
pub struct InferCtx<'a> {
    pub scope: SymbolScope<'a>,
    pub frame: FuncFrame,
    pub locals: Vec<LocalSlot>,
    pub stack_top: u32,
    pub total_stack_size: u32,
    pub loop_depth: usize,
    pub errors: Vec<Diagnostic>,
}

impl<'a> InferCtx<'a> {
    pub fn new(scope: SymbolScope<'a>, frame: FuncFrame) -> Self {
        Self {
            scope,
            frame,
            locals: Vec::new(),
            stack_top: PROLOGUE_SIZE,
            total_stack_size: PROLOGUE_SIZE,
            loop_depth: 0,
            errors: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::new(message, span));
    }

    /// Raise the frame's high-water mark to the current cursor.
    pub fn update_stack_size(&mut self) {
        self.total_stack_size = self.total_stack_size.max(self.stack_top);
    }
}
