use crate::{decl::Variable, op::Operator, ty::*};
use std::fmt;
use tern_common::span::*;

/// A literal constant. The front-end stores the value; the checker
/// attaches the matching base type.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
}

impl ConstValue {
    pub fn base_type(&self) -> BaseType {
        match self {
            ConstValue::Bool(_) => BaseType::Bool,
            ConstValue::Int(_) => BaseType::Int,
            ConstValue::UInt(_) => BaseType::UInt,
            ConstValue::Int64(_) => BaseType::Int64,
            ConstValue::UInt64(_) => BaseType::UInt64,
            ConstValue::Float(_) => BaseType::Float,
            ConstValue::Double(_) => BaseType::Double,
            ConstValue::String(_) => BaseType::String,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstValue::Bool(v) => write!(f, "{}", v),
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::UInt(v) => write!(f, "{}u", v),
            ConstValue::Int64(v) => write!(f, "{}l", v),
            ConstValue::UInt64(v) => write!(f, "{}ul", v),
            ConstValue::Float(v) => write!(f, "{}f", v),
            ConstValue::Double(v) => write!(f, "{}d", v),
            ConstValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// Where a variable reference landed after resolution.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum VarPlace {
    Local { stack_top: u32, is_ref: bool },
    Argument { index: u32 },
    Global { index: u32 },
}

#[derive(Debug, Clone)]
pub struct ExprConst {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub value: ConstValue,
}

#[derive(Debug, Clone)]
pub struct ExprVar {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub name: String,
    pub place: Option<VarPlace>,
}

#[derive(Debug, Clone)]
pub struct ExprField {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub base: Box<Expr>,
    pub field: String,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ExprAt {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub base: Box<Expr>,
    pub index: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprOp1 {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub op: Operator,
    pub sub: Box<Expr>,
    /// mangled name of the resolved built-in
    pub func: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExprOp2 {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub op: Operator,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub func: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExprOp3 {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub op: Operator,
    pub cond: Box<Expr>,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub func: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExprCopy {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// Loads the value out of a reference. Spliced in automatically wherever
/// a reference-typed expression meets a value-expecting context.
#[derive(Debug, Clone)]
pub struct ExprRef2Value {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub sub: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprPtr2Ref {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub sub: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprBlock {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub list: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprIf {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub cond: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct ExprWhile {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub cond: Box<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprForeach {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub head: Box<Expr>,
    pub iter: Box<Expr>,
    pub body: Box<Expr>,
}

/// Multi-source counted iteration: up to three sources walked in
/// lockstep, one iterator variable per source.
#[derive(Debug, Clone)]
pub struct ExprFor {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub iterators: Vec<String>,
    pub sources: Vec<Expr>,
    pub iterator_vars: Vec<Variable>,
    pub filter: Option<Box<Expr>>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprLet {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub vars: Vec<Variable>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprCall {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub name: String,
    pub args: Vec<Expr>,
    /// mangled name of the resolved callee
    pub func: Option<String>,
    /// base of the temporary argument region reserved in the caller frame
    pub stack_top: u32,
}

#[derive(Debug, Clone)]
pub struct ExprReturn {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub sub: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct ExprBreak {
    pub span: Span,
    pub ty: Option<TypeDecl>,
}

#[derive(Debug, Clone)]
pub struct ExprNew {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub new_ty: TypeDecl,
}

#[derive(Debug, Clone)]
pub struct ExprSizeOf {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub sub: Option<Box<Expr>>,
    pub of_ty: Option<TypeDecl>,
}

#[derive(Debug, Clone)]
pub struct ExprArrayPush {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprAssert {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprDebug {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct ExprTryCatch {
    pub span: Span,
    pub ty: Option<TypeDecl>,
    pub try_block: Box<Expr>,
    pub catch_block: Box<Expr>,
}

/// The closed set of expression node kinds. Every node owns its children,
/// knows how to check itself and how to emit its execution fragment; the
/// checker attaches `ty` in place (left `None` if checking the node
/// failed) and the lowering pass reads the finished tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Const(ExprConst),
    Var(ExprVar),
    Field(ExprField),
    At(ExprAt),
    Op1(ExprOp1),
    Op2(ExprOp2),
    Op3(ExprOp3),
    Copy(ExprCopy),
    Ref2Value(ExprRef2Value),
    Ptr2Ref(ExprPtr2Ref),
    Block(ExprBlock),
    If(ExprIf),
    While(ExprWhile),
    Foreach(ExprForeach),
    For(ExprFor),
    Let(ExprLet),
    Call(ExprCall),
    Return(ExprReturn),
    Break(ExprBreak),
    New(ExprNew),
    SizeOf(ExprSizeOf),
    ArrayPush(ExprArrayPush),
    Assert(ExprAssert),
    Debug(ExprDebug),
    TryCatch(ExprTryCatch),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Const(x) => &x.span,
            Expr::Var(x) => &x.span,
            Expr::Field(x) => &x.span,
            Expr::At(x) => &x.span,
            Expr::Op1(x) => &x.span,
            Expr::Op2(x) => &x.span,
            Expr::Op3(x) => &x.span,
            Expr::Copy(x) => &x.span,
            Expr::Ref2Value(x) => &x.span,
            Expr::Ptr2Ref(x) => &x.span,
            Expr::Block(x) => &x.span,
            Expr::If(x) => &x.span,
            Expr::While(x) => &x.span,
            Expr::Foreach(x) => &x.span,
            Expr::For(x) => &x.span,
            Expr::Let(x) => &x.span,
            Expr::Call(x) => &x.span,
            Expr::Return(x) => &x.span,
            Expr::Break(x) => &x.span,
            Expr::New(x) => &x.span,
            Expr::SizeOf(x) => &x.span,
            Expr::ArrayPush(x) => &x.span,
            Expr::Assert(x) => &x.span,
            Expr::Debug(x) => &x.span,
            Expr::TryCatch(x) => &x.span,
        }
    }

    /// The resolved type, present only after this node checked
    /// successfully.
    pub fn ty(&self) -> Option<&TypeDecl> {
        match self {
            Expr::Const(x) => x.ty.as_ref(),
            Expr::Var(x) => x.ty.as_ref(),
            Expr::Field(x) => x.ty.as_ref(),
            Expr::At(x) => x.ty.as_ref(),
            Expr::Op1(x) => x.ty.as_ref(),
            Expr::Op2(x) => x.ty.as_ref(),
            Expr::Op3(x) => x.ty.as_ref(),
            Expr::Copy(x) => x.ty.as_ref(),
            Expr::Ref2Value(x) => x.ty.as_ref(),
            Expr::Ptr2Ref(x) => x.ty.as_ref(),
            Expr::Block(x) => x.ty.as_ref(),
            Expr::If(x) => x.ty.as_ref(),
            Expr::While(x) => x.ty.as_ref(),
            Expr::Foreach(x) => x.ty.as_ref(),
            Expr::For(x) => x.ty.as_ref(),
            Expr::Let(x) => x.ty.as_ref(),
            Expr::Call(x) => x.ty.as_ref(),
            Expr::Return(x) => x.ty.as_ref(),
            Expr::Break(x) => x.ty.as_ref(),
            Expr::New(x) => x.ty.as_ref(),
            Expr::SizeOf(x) => x.ty.as_ref(),
            Expr::ArrayPush(x) => x.ty.as_ref(),
            Expr::Assert(x) => x.ty.as_ref(),
            Expr::Debug(x) => x.ty.as_ref(),
            Expr::TryCatch(x) => x.ty.as_ref(),
        }
    }

    pub fn is_string_constant(&self) -> bool {
        match self {
            Expr::Const(c) => matches!(c.value, ConstValue::String(_)),
            _ => false,
        }
    }

    // construction helpers for the front-end (and tests)

    pub fn constant(value: ConstValue, span: Span) -> Expr {
        Expr::Const(ExprConst {
            span,
            ty: None,
            value,
        })
    }

    pub fn int(value: i32, span: Span) -> Expr {
        Expr::constant(ConstValue::Int(value), span)
    }

    pub fn var(name: impl Into<String>, span: Span) -> Expr {
        Expr::Var(ExprVar {
            span,
            ty: None,
            name: name.into(),
            place: None,
        })
    }

    pub fn field(base: Expr, field: impl Into<String>, span: Span) -> Expr {
        Expr::Field(ExprField {
            span,
            ty: None,
            base: Box::new(base),
            field: field.into(),
            offset: None,
        })
    }

    pub fn at(base: Expr, index: Expr, span: Span) -> Expr {
        Expr::At(ExprAt {
            span,
            ty: None,
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn op1(op: Operator, sub: Expr, span: Span) -> Expr {
        Expr::Op1(ExprOp1 {
            span,
            ty: None,
            op,
            sub: Box::new(sub),
            func: None,
        })
    }

    pub fn op2(op: Operator, left: Expr, right: Expr, span: Span) -> Expr {
        Expr::Op2(ExprOp2 {
            span,
            ty: None,
            op,
            left: Box::new(left),
            right: Box::new(right),
            func: None,
        })
    }

    pub fn op3(op: Operator, cond: Expr, left: Expr, right: Expr, span: Span) -> Expr {
        Expr::Op3(ExprOp3 {
            span,
            ty: None,
            op,
            cond: Box::new(cond),
            left: Box::new(left),
            right: Box::new(right),
            func: None,
        })
    }

    pub fn copy(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::Copy(ExprCopy {
            span,
            ty: None,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn block(list: Vec<Expr>, span: Span) -> Expr {
        Expr::Block(ExprBlock {
            span,
            ty: None,
            list,
        })
    }

    pub fn if_then(cond: Expr, if_true: Expr, if_false: Option<Expr>, span: Span) -> Expr {
        Expr::If(ExprIf {
            span,
            ty: None,
            cond: Box::new(cond),
            if_true: Box::new(if_true),
            if_false: if_false.map(Box::new),
        })
    }

    pub fn while_loop(cond: Expr, body: Expr, span: Span) -> Expr {
        Expr::While(ExprWhile {
            span,
            ty: None,
            cond: Box::new(cond),
            body: Box::new(body),
        })
    }

    pub fn foreach(head: Expr, iter: Expr, body: Expr, span: Span) -> Expr {
        Expr::Foreach(ExprForeach {
            span,
            ty: None,
            head: Box::new(head),
            iter: Box::new(iter),
            body: Box::new(body),
        })
    }

    pub fn for_loop(
        iterators: Vec<String>,
        sources: Vec<Expr>,
        filter: Option<Expr>,
        body: Expr,
        span: Span,
    ) -> Expr {
        Expr::For(ExprFor {
            span,
            ty: None,
            iterators,
            sources,
            iterator_vars: Vec::new(),
            filter: filter.map(Box::new),
            body: Box::new(body),
        })
    }

    pub fn let_in(vars: Vec<Variable>, body: Expr, span: Span) -> Expr {
        Expr::Let(ExprLet {
            span,
            ty: None,
            vars,
            body: Box::new(body),
        })
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>, span: Span) -> Expr {
        Expr::Call(ExprCall {
            span,
            ty: None,
            name: name.into(),
            args,
            func: None,
            stack_top: 0,
        })
    }

    pub fn ret(sub: Option<Expr>, span: Span) -> Expr {
        Expr::Return(ExprReturn {
            span,
            ty: None,
            sub: sub.map(Box::new),
        })
    }

    pub fn brk(span: Span) -> Expr {
        Expr::Break(ExprBreak { span, ty: None })
    }

    pub fn new_struct(new_ty: TypeDecl, span: Span) -> Expr {
        Expr::New(ExprNew {
            span,
            ty: None,
            new_ty,
        })
    }

    pub fn size_of_expr(sub: Expr, span: Span) -> Expr {
        Expr::SizeOf(ExprSizeOf {
            span,
            ty: None,
            sub: Some(Box::new(sub)),
            of_ty: None,
        })
    }

    pub fn size_of_type(of_ty: TypeDecl, span: Span) -> Expr {
        Expr::SizeOf(ExprSizeOf {
            span,
            ty: None,
            sub: None,
            of_ty: Some(of_ty),
        })
    }

    pub fn try_catch(try_block: Expr, catch_block: Expr, span: Span) -> Expr {
        Expr::TryCatch(ExprTryCatch {
            span,
            ty: None,
            try_block: Box::new(try_block),
            catch_block: Box::new(catch_block),
        })
    }
}

/// Insert a load if `expr` is a typed reference; a no-op for value-typed
/// (or still-unchecked) expressions, so applying it twice never stacks
/// loads.
pub fn auto_dereference(expr: Box<Expr>) -> Box<Expr> {
    let is_ref = match expr.ty() {
        Some(ty) => ty.is_ref(),
        None => false,
    };
    if !is_ref {
        return expr;
    }

    let mut ty = expr.ty().cloned().unwrap();
    ty.is_ref = false;
    let span = expr.span().clone();

    Box::new(Expr::Ref2Value(ExprRef2Value {
        span,
        ty: Some(ty),
        sub: expr,
    }))
}
