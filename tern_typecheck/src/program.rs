use crate::{check::check_expr, ctx::*};
use tern_ast::{decl::Function, expr::auto_dereference, module::Program, ty::BaseType};

fn frame_of(f: &Function) -> FuncFrame {
    FuncFrame {
        args: f
            .args
            .iter()
            .map(|arg| (arg.name.clone(), arg.ty.clone()))
            .collect(),
        result: f.result.clone(),
    }
}

/// Check a whole program in place, in the fixed pass order: structure
/// field offsets, global slot indices and initializers, then every
/// non-built-in function (resolution index, defaulted arguments, body).
/// Diagnostics accumulate; nothing stops at the first error.
pub fn infer_types(program: &mut Program) {
    layout_structures(program);
    index_globals(program);
    check_global_inits(program);
    check_functions(program);
}

/// Field offsets are the running sum of the sizes of all preceding
/// fields. No alignment padding.
fn layout_structures(program: &mut Program) {
    for index in 0..program.this_module.structs.len() {
        let sizes: Vec<u32> = {
            let scope = program.scope();
            scope.this_module.structs[index]
                .fields
                .iter()
                .map(|field| field.ty.size_of(&scope))
                .collect()
        };

        let mut offset = 0;
        for (field, size) in program.this_module.structs[index]
            .fields
            .iter_mut()
            .zip(sizes)
        {
            field.offset = offset;
            offset += size;
        }
    }
}

/// Dense zero-based storage slots, in declaration order.
fn index_globals(program: &mut Program) {
    let mut next = 0;
    for (_, var) in program.this_module.globals.iter_mut() {
        var.global_index = Some(next);
        next += 1;
    }
}

fn check_global_inits(program: &mut Program) {
    let names: Vec<String> = program.this_module.globals.keys().cloned().collect();
    for name in names {
        let (init, declared, span) = {
            let var = program.this_module.globals.get_mut(&name).unwrap();
            (var.init.take(), var.ty.clone(), var.span.clone())
        };

        let Some(mut boxed) = init else { continue };

        let mut ctx = InferCtx::new(program.scope(), FuncFrame::global_init(span.clone()));
        check_expr(&mut boxed, &mut ctx);
        let errors = std::mem::take(&mut ctx.errors);
        drop(ctx);
        program.diags.extend(errors);

        let mut matched = false;
        if let Some(init_ty) = boxed.ty() {
            if !declared.is_same_type(init_ty, false) {
                program.error("variable initialization type mismatch", span.clone());
            } else if declared.base == BaseType::Structure {
                program.error("can't initialize structures", span.clone());
            } else {
                matched = true;
            }
        }
        if matched {
            boxed = auto_dereference(boxed);
        }

        program.this_module.globals.get_mut(&name).unwrap().init = Some(boxed);
    }
}

fn check_functions(program: &mut Program) {
    let keys: Vec<String> = program.this_module.functions.keys().cloned().collect();
    let mut total: u32 = 0;

    for key in keys {
        if program.this_module.functions[&key].built_in {
            continue;
        }
        let index = total;
        total += 1;

        // defaulted argument initializers check against the declared
        // argument type, reference flag included
        let arg_count = program.this_module.functions[&key].args.len();
        for ai in 0..arg_count {
            let (init, declared) = {
                let f = program.this_module.functions.get_mut(&key).unwrap();
                (f.args[ai].init.take(), f.args[ai].ty.clone())
            };
            let Some(mut boxed) = init else { continue };

            let frame = frame_of(&program.this_module.functions[&key]);
            let mut ctx = InferCtx::new(program.scope(), frame);
            check_expr(&mut boxed, &mut ctx);
            let errors = std::mem::take(&mut ctx.errors);
            drop(ctx);
            program.diags.extend(errors);

            if let Some(init_ty) = boxed.ty() {
                if !declared.is_same_type(init_ty, true) {
                    let at = boxed.span().clone();
                    program.error("function argument default value type mismatch", at);
                }
            }

            program.this_module.functions.get_mut(&key).unwrap().args[ai].init = Some(boxed);
        }

        let mut body = program.this_module.functions.get_mut(&key).unwrap().body.take();
        let frame = frame_of(&program.this_module.functions[&key]);
        let mut ctx = InferCtx::new(program.scope(), frame);
        if let Some(b) = body.as_mut() {
            check_expr(b, &mut ctx);
        }
        let errors = std::mem::take(&mut ctx.errors);
        let total_stack_size = ctx.total_stack_size;
        drop(ctx);
        program.diags.extend(errors);

        let f = program.this_module.functions.get_mut(&key).unwrap();
        f.body = body;
        f.total_stack_size = total_stack_size;
        f.index = Some(index);
    }

    program.total_functions = total;
}
