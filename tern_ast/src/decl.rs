use crate::{expr::Expr, ty::*};
use std::collections::HashSet;
use tern_common::span::*;

/// One structure field. Offsets are assigned by the checker's layout pass:
/// the running sum of the sizes of all preceding fields, with no padding.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeDecl,
    pub offset: u32,
    pub span: Span,
}

/// A named field list. Size is the sum of field sizes.
#[derive(Debug, Clone)]
pub struct Structure {
    pub name: String,
    pub fields: Vec<Field>,
    pub span: Span,
}

impl Structure {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            span,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: TypeDecl, span: Span) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            offset: 0,
            span,
        });
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn size_of(&self, scope: &impl StructResolve) -> u32 {
        self.fields.iter().map(|field| field.ty.size_of(scope)).sum()
    }
}

/// A symbol usage edge recorded by the usage analyzer: functions are
/// identified by mangled name, globals by plain name. Edge sets are
/// rebuilt from scratch on every analyzer run.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum SymbolRef {
    Function(String),
    Global(String),
}

/// A named, typed slot: a function argument, a let/for local, or a
/// module global. Exactly one of those owners holds it. The resolution
/// metadata (`stack_top` for locals, `global_index` for globals) is
/// filled in by the checker.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: TypeDecl,
    pub init: Option<Box<Expr>>,
    pub span: Span,

    pub stack_top: u32,
    pub global_index: Option<u32>,

    pub used: bool,
    pub uses: HashSet<SymbolRef>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: TypeDecl, span: Span) -> Self {
        Self {
            name: name.into(),
            ty,
            init: None,
            span,
            stack_top: 0,
            global_index: None,
            used: false,
            uses: HashSet::new(),
        }
    }

    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(Box::new(init));
        self
    }
}

/// A function declaration. Built-in functions carry no body; the runtime
/// dispatches them by mangled identity. The mangled name is filled in
/// when the function is added to a module and is the uniqueness key for
/// overloads.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub mangled: String,
    pub args: Vec<Variable>,
    pub result: TypeDecl,
    pub body: Option<Box<Expr>>,
    pub built_in: bool,
    pub exported: bool,
    pub init: bool,
    pub span: Span,

    pub total_stack_size: u32,
    pub index: Option<u32>,

    pub used: bool,
    pub uses: HashSet<SymbolRef>,
}

impl Function {
    pub fn new(name: impl Into<String>, result: TypeDecl, span: Span) -> Self {
        Self {
            name: name.into(),
            mangled: String::new(),
            args: Vec::new(),
            result,
            body: None,
            built_in: false,
            exported: false,
            init: false,
            span,
            total_stack_size: 0,
            index: None,
            used: false,
            uses: HashSet::new(),
        }
    }

    /// An opaque, pre-typed callable registered by the built-in module.
    pub fn built_in(name: impl Into<String>, args: Vec<Variable>, result: TypeDecl) -> Self {
        let span = result.span.clone();
        let mut f = Self::new(name, result, span);
        f.args = args;
        f.built_in = true;
        f
    }

    pub fn with_arg(mut self, name: impl Into<String>, ty: TypeDecl) -> Self {
        let span = ty.span.clone();
        self.args.push(Variable::new(name, ty, span));
        self
    }

    pub fn with_body(mut self, body: Expr) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    pub fn mangled_name(&self, scope: &impl StructResolve) -> String {
        let mut out = self.name.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.ty.mangled_name(scope));
        }
        out
    }

    pub fn find_argument(&self, name: &str) -> Option<(usize, &Variable)> {
        self.args
            .iter()
            .enumerate()
            .find(|(_, arg)| arg.name == name)
    }
}
