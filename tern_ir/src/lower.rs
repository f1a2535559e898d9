use crate::{debug_info::*, node::*};
use tern_ast::{decl::Variable, expr::*, module::SymbolScope, ty::*};
use tern_common::bug;

/// State threaded through one program's lowering: the symbol scope for
/// callee and structure resolution, plus the debug-descriptor builder
/// with its per-program structure memo.
pub struct LowerCtx<'a> {
    pub scope: SymbolScope<'a>,
    pub debug: DebugInfoBuilder,
}

impl<'a> LowerCtx<'a> {
    pub fn new(scope: SymbolScope<'a>) -> Self {
        Self {
            scope,
            debug: DebugInfoBuilder::new(),
        }
    }
}

fn node_ty<'e>(expr: &'e Expr) -> &'e TypeDecl {
    match expr.ty() {
        Some(ty) => ty,
        None => bug!("expression reached lowering without a checked type"),
    }
}

/// The base kinds generic value operations dispatch over. Structure and
/// table operands have no value representation here and fault rather
/// than miscompile.
fn value_kind(ty: &TypeDecl, what: &str) -> BaseType {
    match ty.base {
        BaseType::Bool
        | BaseType::Int
        | BaseType::Int2
        | BaseType::Int3
        | BaseType::Int4
        | BaseType::UInt
        | BaseType::UInt2
        | BaseType::UInt3
        | BaseType::UInt4
        | BaseType::Int64
        | BaseType::UInt64
        | BaseType::Float
        | BaseType::Float2
        | BaseType::Float3
        | BaseType::Float4
        | BaseType::Double
        | BaseType::String
        | BaseType::Pointer
        | BaseType::Array => ty.base,

        other => bug!("unsupported value kind {} for {}", other, what),
    }
}

fn string_const_message(args: &[Expr], index: usize) -> String {
    match args.get(index) {
        Some(Expr::Const(c)) => match &c.value {
            ConstValue::String(s) => s.clone(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// The init fragment for one variable: copy the initializer into the
/// destination slot. Shared between local lets and global initializers.
pub fn lower_var_init(var: &Variable, dest: ExecNode, ctx: &mut LowerCtx) -> ExecNode {
    let init = match &var.init {
        Some(init) => init,
        None => bug!("variable {} has no initializer to lower", var.name),
    };
    let kind = value_kind(&var.ty, "initial value");
    ExecNode::CopyValue {
        kind,
        left: Box::new(dest),
        right: Box::new(lower_expr(init, ctx)),
    }
}

fn lower_for<const N: usize>(x: &ExprFor, ctx: &mut LowerCtx) -> ForLoop<N> {
    let lowered: Vec<ExecNode> = x
        .sources
        .iter()
        .map(|src| lower_expr(src, ctx))
        .collect();
    let sources: [ExecNode; N] = match lowered.try_into() {
        Ok(sources) => sources,
        Err(_) => bug!("for loop source count does not match its node shape"),
    };

    let strides = std::array::from_fn(|i| node_ty(&x.sources[i]).stride_of(&ctx.scope));
    let sizes = std::array::from_fn(|i| x.iterator_vars[i].ty.size_of(&ctx.scope));
    let stack_tops = std::array::from_fn(|i| x.iterator_vars[i].stack_top);

    let count = x
        .sources
        .iter()
        .find_map(|src| node_ty(src).dims.first().copied());
    let count = match count {
        Some(count) => count,
        None => bug!("for loop has no fixed-size source"),
    };

    ForLoop {
        sources,
        strides,
        sizes,
        stack_tops,
        count,
        filter: x
            .filter
            .as_ref()
            .map(|filter| Box::new(lower_expr(filter, ctx))),
        body: Box::new(lower_expr(&x.body, ctx)),
    }
}

/// Emit the execution fragment for one checked expression.
pub fn lower_expr(expr: &Expr, ctx: &mut LowerCtx) -> ExecNode {
    match expr {
        Expr::Const(x) => ExecNode::Const(x.value.clone()),

        Expr::Var(x) => match &x.place {
            Some(VarPlace::Local { stack_top, is_ref }) => {
                if *is_ref {
                    ExecNode::GetLocalRef {
                        stack_top: *stack_top,
                    }
                } else {
                    ExecNode::GetLocal {
                        stack_top: *stack_top,
                    }
                }
            }
            Some(VarPlace::Argument { index }) => ExecNode::GetArgument { index: *index },
            Some(VarPlace::Global { index }) => ExecNode::GetGlobal { index: *index },
            None => bug!("variable {} reached lowering unresolved", x.name),
        },

        Expr::Field(x) => {
            let offset = match x.offset {
                Some(offset) => offset,
                None => bug!("field {} reached lowering unresolved", x.field),
            };
            let base = Box::new(lower_expr(&x.base, ctx));
            if node_ty(&x.base).base == BaseType::Structure {
                ExecNode::Field { base, offset }
            } else {
                ExecNode::PtrField { base, offset }
            }
        }

        Expr::At(x) => {
            let base_ty = node_ty(&x.base);
            let base = Box::new(lower_expr(&x.base, ctx));
            let index = Box::new(lower_expr(&x.index, ctx));
            if base_ty.is_good_array_type() {
                let stride = base_ty.first.as_ref().unwrap().size_of(&ctx.scope);
                ExecNode::ArrayAt {
                    base,
                    index,
                    stride,
                }
            } else {
                ExecNode::At {
                    base,
                    index,
                    stride: base_ty.stride_of(&ctx.scope),
                    range: *base_ty.dims.last().unwrap(),
                }
            }
        }

        Expr::Op1(x) => ExecNode::Op1 {
            func: match &x.func {
                Some(func) => func.clone(),
                None => bug!("operator {} reached lowering unresolved", x.op),
            },
            x: Box::new(lower_expr(&x.sub, ctx)),
        },

        Expr::Op2(x) => ExecNode::Op2 {
            func: match &x.func {
                Some(func) => func.clone(),
                None => bug!("operator {} reached lowering unresolved", x.op),
            },
            left: Box::new(lower_expr(&x.left, ctx)),
            right: Box::new(lower_expr(&x.right, ctx)),
        },

        Expr::Op3(x) => ExecNode::Select {
            kind: value_kind(node_ty(expr), "cond operator"),
            cond: Box::new(lower_expr(&x.cond, ctx)),
            if_true: Box::new(lower_expr(&x.left, ctx)),
            if_false: Box::new(lower_expr(&x.right, ctx)),
        },

        Expr::Copy(x) => ExecNode::CopyRef {
            left: Box::new(lower_expr(&x.left, ctx)),
            right: Box::new(lower_expr(&x.right, ctx)),
            size: node_ty(&x.left).size_of(&ctx.scope),
        },

        Expr::Ref2Value(x) => ExecNode::Ref2Value {
            kind: value_kind(node_ty(expr), "dereference"),
            sub: Box::new(lower_expr(&x.sub, ctx)),
        },

        Expr::Ptr2Ref(x) => ExecNode::Ptr2Ref {
            sub: Box::new(lower_expr(&x.sub, ctx)),
        },

        // a single-statement block is that statement
        Expr::Block(x) => {
            if x.list.len() == 1 {
                lower_expr(&x.list[0], ctx)
            } else {
                ExecNode::Block {
                    list: x.list.iter().map(|sub| lower_expr(sub, ctx)).collect(),
                }
            }
        }

        Expr::If(x) => ExecNode::If {
            cond: Box::new(lower_expr(&x.cond, ctx)),
            if_true: Box::new(lower_expr(&x.if_true, ctx)),
            if_false: x
                .if_false
                .as_ref()
                .map(|if_false| Box::new(lower_expr(if_false, ctx))),
        },

        Expr::While(x) => ExecNode::While {
            cond: Box::new(lower_expr(&x.cond, ctx)),
            body: Box::new(lower_expr(&x.body, ctx)),
        },

        Expr::Foreach(x) => {
            let head_ty = node_ty(&x.head);
            let iter_size = node_ty(&x.iter).size_of(&ctx.scope);
            ExecNode::Foreach {
                count: *head_ty.dims.first().unwrap(),
                head: Box::new(lower_expr(&x.head, ctx)),
                iter: Box::new(lower_expr(&x.iter, ctx)),
                body: Box::new(lower_expr(&x.body, ctx)),
                stride: iter_size,
                size: iter_size,
            }
        }

        Expr::For(x) => match x.sources.len() {
            1 => ExecNode::For1(Box::new(lower_for(x, ctx))),
            2 => ExecNode::For2(Box::new(lower_for(x, ctx))),
            3 => ExecNode::For3(Box::new(lower_for(x, ctx))),
            n => bug!("for loop over {} sources cannot be lowered", n),
        },

        Expr::Let(x) => {
            let inits = x
                .vars
                .iter()
                .map(|var| {
                    if var.init.is_some() {
                        lower_var_init(
                            var,
                            ExecNode::GetLocal {
                                stack_top: var.stack_top,
                            },
                            ctx,
                        )
                    } else {
                        ExecNode::InitLocal {
                            stack_top: var.stack_top,
                            size: var.ty.size_of(&ctx.scope),
                        }
                    }
                })
                .collect();
            ExecNode::Let {
                inits,
                body: Box::new(lower_expr(&x.body, ctx)),
            }
        }

        Expr::Call(x) => {
            let mangled = match &x.func {
                Some(func) => func,
                None => bug!("call to {} reached lowering unresolved", x.name),
            };
            let callee = match ctx.scope.find_function(mangled) {
                Some(callee) => callee,
                None => bug!("call target {} is not in scope", mangled),
            };
            let target = if callee.built_in {
                CallTarget::Builtin(mangled.clone())
            } else {
                match callee.index {
                    Some(index) => CallTarget::Function(index),
                    None => bug!("call target {} has no resolution index", mangled),
                }
            };
            ExecNode::Call {
                target,
                stack_top: x.stack_top,
                args: x.args.iter().map(|arg| lower_expr(arg, ctx)).collect(),
            }
        }

        Expr::Return(x) => ExecNode::Return {
            sub: x.sub.as_ref().map(|sub| Box::new(lower_expr(sub, ctx))),
        },

        Expr::Break(_) => ExecNode::Break,

        Expr::New(x) => ExecNode::New {
            bytes: x.new_ty.size_of(&ctx.scope),
        },

        Expr::SizeOf(x) => {
            let of_ty = match &x.of_ty {
                Some(of_ty) => of_ty,
                None => bug!("sizeof reached lowering without a subject type"),
            };
            let bytes = of_ty.size_of(&ctx.scope);
            ExecNode::Const(ConstValue::Int(cast::i32(bytes).unwrap()))
        }

        Expr::ArrayPush(x) => {
            let element_size = node_ty(&x.args[0])
                .first
                .as_ref()
                .unwrap()
                .size_of(&ctx.scope);
            let value_ty = node_ty(&x.args[1]).clone();
            let array = Box::new(lower_expr(&x.args[0], ctx));
            let value = Box::new(lower_expr(&x.args[1], ctx));
            let at = x.args.get(2).map(|at| Box::new(lower_expr(at, ctx)));

            if value_ty.is_ref() {
                ExecNode::ArrayPushRef {
                    array,
                    value,
                    at,
                    size: element_size,
                }
            } else {
                ExecNode::ArrayPushValue {
                    kind: value_kind(&value_ty, "array push"),
                    array,
                    value,
                    at,
                }
            }
        }

        Expr::Assert(x) => ExecNode::Assert {
            cond: Box::new(lower_expr(&x.args[0], ctx)),
            message: string_const_message(&x.args, 1),
        },

        Expr::Debug(x) => {
            let info = ctx.debug.type_info(node_ty(&x.args[0]), &ctx.scope);
            ExecNode::Debug {
                sub: Box::new(lower_expr(&x.args[0], ctx)),
                info: Box::new(info),
                message: string_const_message(&x.args, 1),
            }
        }

        Expr::TryCatch(x) => ExecNode::TryCatch {
            try_block: Box::new(lower_expr(&x.try_block, ctx)),
            catch_block: Box::new(lower_expr(&x.catch_block, ctx)),
        },
    }
}
