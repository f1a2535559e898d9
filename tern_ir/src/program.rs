use crate::{debug_info::*, lower::*, node::*};
use tern_ast::{decl::Function, module::Program};
use tern_common::bug;

/// One entry in the runtime's global-variable table.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    pub name: String,
    pub size: u32,
    pub index: u32,
    pub init: Option<ExecNode>,
    pub debug: VarInfo,
}

/// One entry in the runtime's function table, addressed by resolution
/// index.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub name: String,
    pub code: ExecNode,
    pub stack_size: u32,
    pub debug: FuncInfo,
}

/// Everything the runtime consumes for one program: dense global and
/// function tables plus their debug descriptors.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub globals: Vec<GlobalEntry>,
    pub functions: Vec<FunctionEntry>,
}

fn lower_function(f: &Function, ctx: &mut LowerCtx) -> ExecNode {
    if f.built_in {
        bug!("built-in function {} cannot be lowered", f.name);
    }
    match &f.body {
        Some(body) => lower_expr(body, ctx),
        None => bug!("function {} has no body to lower", f.name),
    }
}

/// Lower a fully checked program. Checking must have succeeded: lowering
/// assumes every node carries its resolved type and faults otherwise.
pub fn lower_program(program: &Program) -> CompiledProgram {
    if program.failed() {
        bug!("failed programs are never lowered");
    }

    let mut ctx = LowerCtx::new(program.scope());

    let mut globals = Vec::with_capacity(program.this_module.globals.len());
    for (name, var) in program.this_module.globals.iter() {
        let index = match var.global_index {
            Some(index) => index,
            None => bug!("global {} has no storage slot", name),
        };
        let init = var.init.as_ref().map(|_| {
            lower_var_init(var, ExecNode::GetGlobal { index }, &mut ctx)
        });
        let scope = ctx.scope;
        globals.push(GlobalEntry {
            name: name.clone(),
            size: var.ty.size_of(&scope),
            index,
            init,
            debug: ctx.debug.var_info(var, &scope),
        });
    }

    let mut functions: Vec<Option<FunctionEntry>> =
        std::iter::repeat_with(|| None)
            .take(program.total_functions as usize)
            .collect();
    for (mangled, f) in program.this_module.functions.iter() {
        let index = match f.index {
            Some(index) => index as usize,
            None => bug!("function {} has no resolution index", mangled),
        };
        let code = lower_function(f, &mut ctx);
        let scope = ctx.scope;
        functions[index] = Some(FunctionEntry {
            name: f.name.clone(),
            code,
            stack_size: f.total_stack_size,
            debug: ctx.debug.func_info(f, &scope),
        });
    }

    let functions = functions
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Some(entry) => entry,
            None => bug!("function table slot {} was never filled", index),
        })
        .collect();

    CompiledProgram { globals, functions }
}
