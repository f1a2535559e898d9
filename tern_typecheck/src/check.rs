use crate::ctx::*;
use tern_ast::{abi::*, expr::*, op::Operator, ty::*};
use tern_common::span::Span;

/// Check one expression in place: attach its resolved type on success,
/// record a diagnostic and leave the type empty on failure. Checking
/// never stops at the first error; parents of a failed node skip the
/// checks that depend on its type.
pub fn check_expr(expr: &mut Expr, ctx: &mut InferCtx) {
    match expr {
        Expr::Const(x) => check_const(x),
        Expr::Var(x) => check_var(x, ctx),
        Expr::Field(x) => check_field(x, ctx),
        Expr::At(x) => check_at(x, ctx),
        Expr::Op1(x) => check_op1(x, ctx),
        Expr::Op2(x) => check_op2(x, ctx),
        Expr::Op3(x) => check_op3(x, ctx),
        Expr::Copy(x) => check_copy(x, ctx),
        Expr::Ref2Value(x) => check_ref2value(x, ctx),
        Expr::Ptr2Ref(x) => check_ptr2ref(x, ctx),
        Expr::Block(x) => check_block(x, ctx),
        Expr::If(x) => check_if(x, ctx),
        Expr::While(x) => check_while(x, ctx),
        Expr::Foreach(x) => check_foreach(x, ctx),
        Expr::For(x) => check_for(x, ctx),
        Expr::Let(x) => check_let(x, ctx),
        Expr::Call(x) => check_call(x, ctx),
        Expr::Return(x) => check_return(x, ctx),
        Expr::Break(x) => check_break(x, ctx),
        Expr::New(x) => check_new(x, ctx),
        Expr::SizeOf(x) => check_size_of(x, ctx),
        Expr::ArrayPush(x) => check_array_push(x, ctx),
        Expr::Assert(x) => check_assert(x, ctx),
        Expr::Debug(x) => check_debug(x, ctx),
        Expr::TryCatch(x) => check_try_catch(x, ctx),
    }
}

fn placeholder() -> Expr {
    Expr::Break(ExprBreak {
        span: Span::zero(""),
        ty: None,
    })
}

/// Splice an auto-dereference around the expression in `slot` if it is a
/// typed reference.
fn deref_slot(slot: &mut Box<Expr>) {
    let expr = std::mem::replace(slot, Box::new(placeholder()));
    *slot = auto_dereference(expr);
}

fn deref_elem(args: &mut [Expr], index: usize) {
    let expr = std::mem::replace(&mut args[index], placeholder());
    args[index] = *auto_dereference(Box::new(expr));
}

fn describe_opt(ty: Option<&TypeDecl>, ctx: &InferCtx) -> String {
    match ty {
        Some(ty) => ty.describe(&ctx.scope),
        None => "???".to_string(),
    }
}

/// Resolve an operator spelling against the supplied operand types.
/// Exactly one candidate is required and it must be a built-in; returns
/// its mangled name, declared result type, and per-parameter refness.
fn bind_operator(
    op: Operator,
    types: &[Option<TypeDecl>],
    span: &Span,
    ctx: &mut InferCtx,
) -> Option<(String, TypeDecl, Vec<bool>)> {
    let found = ctx.scope.find_matching_functions(op.spelling(), types);
    match found.len() {
        0 => {
            let described: Vec<String> = types
                .iter()
                .map(|ty| describe_opt(ty.as_ref(), ctx))
                .collect();
            ctx.error(
                format!(
                    "no matching function '{}' with arguments ({})",
                    op,
                    described.join(", ")
                ),
                span.clone(),
            );
            None
        }
        1 => {
            let f = found[0];
            if !f.built_in {
                ctx.error(
                    "operator must point to built-in function every time",
                    span.clone(),
                );
                None
            } else {
                let param_refs = f.args.iter().map(|arg| arg.ty.is_ref()).collect();
                Some((f.mangled.clone(), f.result.clone(), param_refs))
            }
        }
        _ => {
            ctx.error("too many matching functions", span.clone());
            None
        }
    }
}

fn check_const(x: &mut ExprConst) {
    x.ty = Some(TypeDecl::new(x.value.base_type(), x.span.clone()));
}

fn check_var(x: &mut ExprVar, ctx: &mut InferCtx) {
    // local scope, innermost declaration first
    for slot in ctx.locals.iter().rev() {
        if slot.name == x.name {
            let mut ty = slot.ty.clone();
            let is_ref = ty.is_ref;
            ty.is_ref = true;
            x.place = Some(VarPlace::Local {
                stack_top: slot.stack_top,
                is_ref,
            });
            x.ty = Some(ty);
            return;
        }
    }

    // function argument; arguments keep their declared refness
    for (index, (name, ty)) in ctx.frame.args.iter().enumerate() {
        if *name == x.name {
            x.place = Some(VarPlace::Argument {
                index: index as u32,
            });
            x.ty = Some(ty.clone());
            return;
        }
    }

    // module global
    match ctx.scope.find_variable(&x.name) {
        Some(var) => {
            let mut ty = var.ty.clone();
            ty.is_ref = true;
            x.place = Some(VarPlace::Global {
                index: var.global_index.unwrap_or(0),
            });
            x.ty = Some(ty);
        }
        None => {
            ctx.error(
                format!("can't locate variable {}", x.name),
                x.span.clone(),
            );
        }
    }
}

fn check_field(x: &mut ExprField, ctx: &mut InferCtx) {
    check_expr(&mut x.base, ctx);
    if x.base.ty().is_none() {
        return;
    }

    if x.base.ty().unwrap().base == BaseType::Pointer {
        deref_slot(&mut x.base);
    }

    let base_ty = x.base.ty().unwrap().clone();
    if base_ty.base != BaseType::Structure && base_ty.base != BaseType::Pointer {
        ctx.error("expecting structure or pointer", x.span.clone());
        return;
    }
    if base_ty.is_array() {
        ctx.error("can't get field of array", x.span.clone());
        return;
    }

    let id = match base_ty.structure {
        Some(id) => id,
        None => {
            ctx.error("expecting structure or pointer", x.span.clone());
            return;
        }
    };

    let field = ctx.scope.structure(id).find_field(&x.field).cloned();
    match field {
        None => {
            ctx.error(format!("field {} not found", x.field), x.span.clone());
        }
        Some(field) => {
            let mut ty = field.ty;
            ty.is_ref = true;
            x.offset = Some(field.offset);
            x.ty = Some(ty);
        }
    }
}

fn check_at(x: &mut ExprAt, ctx: &mut InferCtx) {
    check_expr(&mut x.base, ctx);
    if x.base.ty().is_none() {
        return;
    }

    check_expr(&mut x.index, ctx);
    if x.index.ty().is_none() {
        return;
    }
    deref_slot(&mut x.index);
    if !x.index.ty().unwrap().is_index() {
        ctx.error("index is int or uint", x.index.span().clone());
        return;
    }

    let base_ty = x.base.ty().unwrap().clone();
    if base_ty.is_good_array_type() {
        let mut ty = (*base_ty.first.unwrap()).clone();
        ty.is_ref = true;
        x.ty = Some(ty);
    } else if !base_ty.is_ref() {
        ctx.error("can only index ref", x.base.span().clone());
    } else if base_ty.dims.is_empty() {
        ctx.error("can only index arrays", x.base.span().clone());
    } else {
        let mut ty = base_ty;
        ty.is_ref = true;
        ty.dims.pop();
        x.ty = Some(ty);
    }
}

fn check_op1(x: &mut ExprOp1, ctx: &mut InferCtx) {
    check_expr(&mut x.sub, ctx);
    if x.sub.ty().is_none() {
        return;
    }

    let types = [x.sub.ty().cloned()];
    if let Some((mangled, result, param_refs)) = bind_operator(x.op, &types, &x.span, ctx) {
        x.func = Some(mangled);
        if !param_refs[0] {
            deref_slot(&mut x.sub);
        }
        x.ty = Some(result);
    }
}

fn check_op2(x: &mut ExprOp2, ctx: &mut InferCtx) {
    check_expr(&mut x.left, ctx);
    check_expr(&mut x.right, ctx);
    if x.left.ty().is_none() || x.right.ty().is_none() {
        return;
    }

    let left_ty = x.left.ty().unwrap();
    let right_ty = x.right.ty().unwrap();
    if left_ty.is_pointer()
        && right_ty.is_pointer()
        && !left_ty.is_same_type(right_ty, false)
    {
        ctx.error(
            "operations on incompatible pointers are prohibited",
            x.span.clone(),
        );
    }

    let types = [x.left.ty().cloned(), x.right.ty().cloned()];
    if let Some((mangled, result, param_refs)) = bind_operator(x.op, &types, &x.span, ctx) {
        x.func = Some(mangled);
        if !param_refs[0] {
            deref_slot(&mut x.left);
        }
        if !param_refs[1] {
            deref_slot(&mut x.right);
        }
        x.ty = Some(result);
    }
}

fn check_op3(x: &mut ExprOp3, ctx: &mut InferCtx) {
    check_expr(&mut x.cond, ctx);
    if x.cond.ty().is_none() {
        return;
    }
    if !x.cond.ty().unwrap().is_simple(BaseType::Bool) {
        ctx.error("cond operator condition must be boolean", x.span.clone());
        return;
    }

    check_expr(&mut x.left, ctx);
    check_expr(&mut x.right, ctx);
    if x.left.ty().is_none() || x.right.ty().is_none() {
        return;
    }

    let types = [
        x.cond.ty().cloned(),
        x.left.ty().cloned(),
        x.right.ty().cloned(),
    ];
    if let Some((mangled, result, param_refs)) = bind_operator(x.op, &types, &x.span, ctx) {
        x.func = Some(mangled);
        if !param_refs[0] {
            deref_slot(&mut x.cond);
        }
        if !param_refs[1] {
            deref_slot(&mut x.left);
        }
        if !param_refs[2] {
            deref_slot(&mut x.right);
        }
        x.ty = Some(result);
    }
}

fn check_copy(x: &mut ExprCopy, ctx: &mut InferCtx) {
    check_expr(&mut x.left, ctx);
    check_expr(&mut x.right, ctx);
    if x.left.ty().is_none() || x.right.ty().is_none() {
        return;
    }

    let left_ty = x.left.ty().unwrap().clone();
    let right_ty = x.right.ty().unwrap();

    let mut ok = true;
    if !left_ty.is_same_type(right_ty, true) {
        ctx.error("can only copy same type", x.span.clone());
        ok = false;
    } else if !left_ty.is_ref() {
        ctx.error("can only copy to reference", x.span.clone());
        ok = false;
    }
    if left_ty.is_good_array_type() {
        ctx.error("can't copy arrays yet", x.span.clone());
        ok = false;
    }

    if ok {
        x.ty = Some(left_ty);
    }
}

fn check_ref2value(x: &mut ExprRef2Value, ctx: &mut InferCtx) {
    check_expr(&mut x.sub, ctx);
    let sub_ty = match x.sub.ty() {
        Some(ty) => ty,
        None => return,
    };

    if !sub_ty.is_ref() {
        ctx.error("can only dereference ref", x.span.clone());
    } else if !sub_ty.is_simple_type() {
        ctx.error("can only dereference a simple type", x.span.clone());
    } else {
        let mut ty = sub_ty.clone();
        ty.is_ref = false;
        x.ty = Some(ty);
    }
}

fn check_ptr2ref(x: &mut ExprPtr2Ref, ctx: &mut InferCtx) {
    check_expr(&mut x.sub, ctx);
    deref_slot(&mut x.sub);
    let sub_ty = match x.sub.ty() {
        Some(ty) => ty,
        None => return,
    };

    if !sub_ty.is_pointer() {
        ctx.error("can only dereference pointer", x.span.clone());
    } else {
        let mut ty = sub_ty.clone();
        ty.base = BaseType::Structure;
        ty.is_ref = true;
        x.ty = Some(ty);
    }
}

fn check_block(x: &mut ExprBlock, ctx: &mut InferCtx) {
    for sub in &mut x.list {
        check_expr(sub, ctx);
    }
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn check_if(x: &mut ExprIf, ctx: &mut InferCtx) {
    check_expr(&mut x.cond, ctx);
    if x.cond.ty().is_none() {
        return;
    }
    if !x.cond.ty().unwrap().is_simple(BaseType::Bool) {
        ctx.error("if-then-else condition must be boolean", x.span.clone());
        return;
    }

    check_expr(&mut x.if_true, ctx);
    if let Some(if_false) = &mut x.if_false {
        check_expr(if_false, ctx);
    }
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn check_while(x: &mut ExprWhile, ctx: &mut InferCtx) {
    check_expr(&mut x.cond, ctx);
    if x.cond.ty().is_none() {
        return;
    }
    if !x.cond.ty().unwrap().is_simple(BaseType::Bool) {
        ctx.error("while loop condition must be boolean", x.span.clone());
        return;
    }

    ctx.loop_depth += 1;
    check_expr(&mut x.body, ctx);
    ctx.loop_depth -= 1;
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn check_foreach(x: &mut ExprForeach, ctx: &mut InferCtx) {
    check_expr(&mut x.head, ctx);
    check_expr(&mut x.iter, ctx);
    let (head_ty, iter_ty) = match (x.head.ty(), x.iter.ty()) {
        (Some(head), Some(iter)) => (head, iter),
        _ => return,
    };

    if head_ty.dims.len() != 1 {
        ctx.error("can only iterate through a 1-d array", x.span.clone());
    } else if !head_ty.is_iterator_type(iter_ty) {
        ctx.error("iterator type does not match", x.span.clone());
    } else {
        ctx.loop_depth += 1;
        check_expr(&mut x.body, ctx);
        ctx.loop_depth -= 1;
        x.ty = Some(TypeDecl::no_value(x.span.clone()));
    }
}

fn check_for(x: &mut ExprFor, ctx: &mut InferCtx) {
    if x.iterators.is_empty() {
        ctx.error("for needs at least one iterator", x.span.clone());
        return;
    }
    if x.iterators.len() != x.sources.len() {
        ctx.error(
            "for needs as many iterators as there are sources",
            x.span.clone(),
        );
        return;
    }
    if x.sources.len() > 3 {
        ctx.error("too many sources for now", x.span.clone());
        return;
    }

    let saved_stack = ctx.stack_top;
    let saved_locals = ctx.locals.len();
    x.iterator_vars.clear();

    for src in &mut x.sources {
        check_expr(src, ctx);
    }
    if x.sources.iter().any(|src| src.ty().is_none()) {
        return;
    }

    // every fixed-size source must agree on its first dimension
    let size = x
        .sources
        .iter()
        .find_map(|src| src.ty().unwrap().dims.first().copied());
    let size = match size {
        Some(size) => size,
        None => {
            ctx.error("for sources must have a fixed iteration size", x.span.clone());
            return;
        }
    };
    for src in &x.sources {
        if let Some(dim) = src.ty().unwrap().dims.first() {
            if *dim != size {
                ctx.error("iteration size has to match", x.span.clone());
            }
        }
    }

    for (index, src) in x.sources.iter().enumerate() {
        let src_ty = src.ty().unwrap();
        let mut var = tern_ast::decl::Variable::new(
            x.iterators[index].clone(),
            TypeDecl::no_value(x.span.clone()),
            x.span.clone(),
        );
        if !src_ty.dims.is_empty() {
            let mut ty = src_ty.clone();
            ty.is_ref = true;
            ty.dims.pop();
            var.ty = ty;
        } else if src_ty.is_good_array_type() {
            let mut ty = (**src_ty.first.as_ref().unwrap()).clone();
            ty.is_ref = true;
            var.ty = ty;
        } else {
            ctx.error(
                format!("unsupported iteration type for {}", var.name),
                x.span.clone(),
            );
            return;
        }

        var.stack_top = ctx.stack_top;
        ctx.stack_top += align_stack(var.ty.size_of(&ctx.scope));
        ctx.locals.push(LocalSlot {
            name: var.name.clone(),
            ty: var.ty.clone(),
            stack_top: var.stack_top,
        });
        x.iterator_vars.push(var);
    }

    if let Some(filter) = &mut x.filter {
        check_expr(filter, ctx);
        if let Some(filter_ty) = filter.ty() {
            if !filter_ty.is_simple(BaseType::Bool) {
                ctx.error("for filter must be boolean", filter.span().clone());
            }
        }
    }

    ctx.loop_depth += 1;
    check_expr(&mut x.body, ctx);
    ctx.loop_depth -= 1;

    ctx.update_stack_size();
    ctx.stack_top = saved_stack;
    ctx.locals.truncate(saved_locals);
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn check_let(x: &mut ExprLet, ctx: &mut InferCtx) {
    let saved_stack = ctx.stack_top;
    let saved_locals = ctx.locals.len();

    for var in &mut x.vars {
        if var.ty.is_ref {
            ctx.error("local variable can't be reference", var.span.clone());
        }

        var.stack_top = ctx.stack_top;
        ctx.stack_top += align_stack(var.ty.size_of(&ctx.scope));
        ctx.locals.push(LocalSlot {
            name: var.name.clone(),
            ty: var.ty.clone(),
            stack_top: var.stack_top,
        });

        if let Some(init) = &mut var.init {
            check_expr(init, ctx);
            if let Some(init_ty) = init.ty() {
                if !var.ty.is_same_type(init_ty, false) {
                    ctx.error("variable initialization type mismatch", var.span.clone());
                } else if var.ty.base == BaseType::Structure {
                    ctx.error("can't initialize structures", var.span.clone());
                } else {
                    deref_slot(init);
                }
            }
        }
    }

    check_expr(&mut x.body, ctx);

    ctx.update_stack_size();
    ctx.stack_top = saved_stack;
    ctx.locals.truncate(saved_locals);
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn describe_call(name: &str, args: &[Expr], ctx: &InferCtx) -> String {
    let mut out = format!("({}", name);
    for arg in args {
        out.push(' ');
        out.push_str(&describe_opt(arg.ty(), ctx));
    }
    out.push(')');
    out
}

fn check_call(x: &mut ExprCall, ctx: &mut InferCtx) {
    for arg in &mut x.args {
        check_expr(arg, ctx);
    }

    // reserve one call slot per supplied argument while the callee is
    // resolved; released below, the node keeps the region's base
    x.stack_top = ctx.stack_top;
    let supplied = cast::u32(x.args.len()).unwrap();
    ctx.stack_top += supplied * CALL_SLOT_SIZE;
    ctx.update_stack_size();

    let types: Vec<Option<TypeDecl>> = x.args.iter().map(|arg| arg.ty().cloned()).collect();
    let found = ctx.scope.find_matching_functions(&x.name, &types);
    match found.len() {
        0 => {
            let desc = describe_call(&x.name, &x.args, ctx);
            ctx.error(format!("no matching function {}", desc), x.span.clone());
        }
        1 => {
            let f = found[0];
            x.func = Some(f.mangled.clone());
            x.ty = Some(f.result.clone());

            // fill omitted trailing arguments from the callee's defaults
            let defaults: Vec<Box<Expr>> = f.args[x.args.len()..]
                .iter()
                .map(|arg| arg.init.clone().unwrap())
                .collect();
            let param_refs: Vec<bool> = f.args.iter().map(|arg| arg.ty.is_ref()).collect();

            for default in defaults {
                let mut filled = *default;
                if filled.ty().is_none() {
                    check_expr(&mut filled, ctx);
                }
                x.args.push(filled);
            }

            for (index, is_ref) in param_refs.iter().enumerate() {
                if !is_ref {
                    deref_elem(&mut x.args, index);
                }
            }
        }
        _ => {
            let desc = describe_call(&x.name, &x.args, ctx);
            ctx.error(
                format!("too many matching functions {}", desc),
                x.span.clone(),
            );
        }
    }

    ctx.stack_top = x.stack_top;
}

fn check_return(x: &mut ExprReturn, ctx: &mut InferCtx) {
    if let Some(sub) = &mut x.sub {
        check_expr(sub, ctx);
        if sub.ty().is_none() {
            return;
        }
        deref_slot(sub);
    }

    if ctx.frame.result.is_void() {
        if x.sub.is_some() {
            ctx.error("void function has no return", x.span.clone());
        }
    } else {
        match &x.sub {
            None => ctx.error("must return value", x.span.clone()),
            Some(sub) => {
                let result = ctx.frame.result.clone();
                if !result.is_same_type(sub.ty().unwrap(), true) {
                    ctx.error("incompatible return type", x.span.clone());
                } else {
                    let mut ty = result;
                    ty.is_ref = true;
                    x.ty = Some(ty);
                }
            }
        }
    }
}

fn check_break(x: &mut ExprBreak, ctx: &mut InferCtx) {
    if ctx.loop_depth == 0 {
        ctx.error("break without loop", x.span.clone());
    }
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}

fn check_new(x: &mut ExprNew, ctx: &mut InferCtx) {
    if x.new_ty.base != BaseType::Structure {
        ctx.error("can only new structures", x.new_ty.span.clone());
    } else if x.new_ty.is_ref {
        ctx.error("can't new a ref", x.new_ty.span.clone());
    } else if !x.new_ty.dims.is_empty() {
        ctx.error("can only new single object", x.new_ty.span.clone());
    } else {
        let mut ty = TypeDecl::new(BaseType::Pointer, x.span.clone());
        ty.structure = x.new_ty.structure;
        x.ty = Some(ty);
    }
}

fn check_size_of(x: &mut ExprSizeOf, ctx: &mut InferCtx) {
    if let Some(sub) = &mut x.sub {
        check_expr(sub, ctx);
        if let Some(ty) = sub.ty() {
            x.of_ty = Some(ty.clone());
        }
    }
    x.ty = Some(TypeDecl::new(BaseType::Int, x.span.clone()));
}

fn check_array_push(x: &mut ExprArrayPush, ctx: &mut InferCtx) {
    if x.args.len() != 2 && x.args.len() != 3 {
        ctx.error("push(array,value) or push(array,value,at)", x.span.clone());
        return;
    }
    for arg in &mut x.args {
        check_expr(arg, ctx);
    }

    let (array_ty, value_ty) = match (x.args[0].ty(), x.args[1].ty()) {
        (Some(array_ty), Some(value_ty)) => (array_ty, value_ty),
        _ => return,
    };
    if !array_ty.is_good_array_type() {
        ctx.error(
            "push first argument must be fully qualified array",
            x.span.clone(),
        );
        return;
    }
    if !array_ty.first.as_ref().unwrap().is_same_type(value_ty, false) {
        ctx.error("can't push value of different type", x.span.clone());
    }
    if x.args.len() == 3 {
        match x.args[2].ty() {
            Some(at_ty) if at_ty.is_index() => {}
            Some(_) => ctx.error("push at must be an index", x.span.clone()),
            None => return,
        }
    }
    x.ty = Some(TypeDecl::new(BaseType::Void, x.span.clone()));
}

fn check_assert(x: &mut ExprAssert, ctx: &mut InferCtx) {
    if x.args.is_empty() || x.args.len() > 2 {
        ctx.error("assert(expr) or assert(expr,string)", x.span.clone());
        return;
    }
    for arg in &mut x.args {
        check_expr(arg, ctx);
    }
    for index in 0..x.args.len() {
        deref_elem(&mut x.args, index);
    }

    if x.args[0].ty().is_none() {
        return;
    }
    if !x.args[0].ty().unwrap().is_simple(BaseType::Bool) {
        ctx.error("assert condition must be boolean", x.span.clone());
    }
    if x.args.len() == 2 && !x.args[1].is_string_constant() {
        ctx.error("assert comment must be string constant", x.span.clone());
    }
    x.ty = Some(TypeDecl::new(BaseType::Void, x.span.clone()));
}

fn check_debug(x: &mut ExprDebug, ctx: &mut InferCtx) {
    if x.args.is_empty() || x.args.len() > 2 {
        ctx.error("debug(expr) or debug(expr,string)", x.span.clone());
        return;
    }
    for arg in &mut x.args {
        check_expr(arg, ctx);
    }

    if x.args[0].ty().is_none() {
        return;
    }
    if x.args.len() == 2 && !x.args[1].is_string_constant() {
        ctx.error("debug comment must be string constant", x.span.clone());
    }
    x.ty = x.args[0].ty().cloned();
}

fn check_try_catch(x: &mut ExprTryCatch, ctx: &mut InferCtx) {
    check_expr(&mut x.try_block, ctx);
    check_expr(&mut x.catch_block, ctx);
    x.ty = Some(TypeDecl::no_value(x.span.clone()));
}
