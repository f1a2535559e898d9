//! Whole-program reachability over the function and global-variable
//! graph. Edge sets are rebuilt from the checked tree on every run; a
//! mark pass walks them from the root set and an optional sweep rewrites
//! the module's symbol tables to the marked survivors.

use crate::{decl::*, expr::*, module::*};
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

fn record_callee(
    func: &Option<String>,
    scope: &SymbolScope,
    builtin_deps: bool,
    sink: &mut HashSet<SymbolRef>,
) {
    if let Some(mangled) = func {
        let is_builtin = scope
            .find_function(mangled)
            .map(|f| f.built_in)
            .unwrap_or(false);
        if builtin_deps || !is_builtin {
            sink.insert(SymbolRef::Function(mangled.clone()));
        }
    }
}

fn collect_uses(
    expr: &Expr,
    scope: &SymbolScope,
    builtin_deps: bool,
    sink: &mut HashSet<SymbolRef>,
) {
    match expr {
        Expr::Const(_) | Expr::Break(_) | Expr::New(_) => {}

        Expr::Var(var) => {
            if let Some(VarPlace::Global { .. }) = var.place {
                sink.insert(SymbolRef::Global(var.name.clone()));
            }
        }

        Expr::Field(x) => collect_uses(&x.base, scope, builtin_deps, sink),

        Expr::At(x) => {
            collect_uses(&x.base, scope, builtin_deps, sink);
            collect_uses(&x.index, scope, builtin_deps, sink);
        }

        Expr::Op1(x) => {
            record_callee(&x.func, scope, builtin_deps, sink);
            collect_uses(&x.sub, scope, builtin_deps, sink);
        }

        Expr::Op2(x) => {
            record_callee(&x.func, scope, builtin_deps, sink);
            collect_uses(&x.left, scope, builtin_deps, sink);
            collect_uses(&x.right, scope, builtin_deps, sink);
        }

        Expr::Op3(x) => {
            record_callee(&x.func, scope, builtin_deps, sink);
            collect_uses(&x.cond, scope, builtin_deps, sink);
            collect_uses(&x.left, scope, builtin_deps, sink);
            collect_uses(&x.right, scope, builtin_deps, sink);
        }

        Expr::Copy(x) => {
            collect_uses(&x.left, scope, builtin_deps, sink);
            collect_uses(&x.right, scope, builtin_deps, sink);
        }

        Expr::Ref2Value(x) => collect_uses(&x.sub, scope, builtin_deps, sink),
        Expr::Ptr2Ref(x) => collect_uses(&x.sub, scope, builtin_deps, sink),

        Expr::Block(x) => {
            for sub in &x.list {
                collect_uses(sub, scope, builtin_deps, sink);
            }
        }

        Expr::If(x) => {
            collect_uses(&x.cond, scope, builtin_deps, sink);
            collect_uses(&x.if_true, scope, builtin_deps, sink);
            if let Some(if_false) = &x.if_false {
                collect_uses(if_false, scope, builtin_deps, sink);
            }
        }

        Expr::While(x) => {
            collect_uses(&x.cond, scope, builtin_deps, sink);
            collect_uses(&x.body, scope, builtin_deps, sink);
        }

        Expr::Foreach(x) => {
            collect_uses(&x.head, scope, builtin_deps, sink);
            collect_uses(&x.iter, scope, builtin_deps, sink);
            collect_uses(&x.body, scope, builtin_deps, sink);
        }

        Expr::For(x) => {
            for src in &x.sources {
                collect_uses(src, scope, builtin_deps, sink);
            }
            if let Some(filter) = &x.filter {
                collect_uses(filter, scope, builtin_deps, sink);
            }
            collect_uses(&x.body, scope, builtin_deps, sink);
        }

        Expr::Let(x) => {
            for var in &x.vars {
                if let Some(init) = &var.init {
                    collect_uses(init, scope, builtin_deps, sink);
                }
            }
            collect_uses(&x.body, scope, builtin_deps, sink);
        }

        Expr::Call(x) => {
            record_callee(&x.func, scope, builtin_deps, sink);
            for arg in &x.args {
                collect_uses(arg, scope, builtin_deps, sink);
            }
        }

        Expr::Return(x) => {
            if let Some(sub) = &x.sub {
                collect_uses(sub, scope, builtin_deps, sink);
            }
        }

        Expr::SizeOf(x) => {
            if let Some(sub) = &x.sub {
                collect_uses(sub, scope, builtin_deps, sink);
            }
        }

        Expr::ArrayPush(x) => {
            for arg in &x.args {
                collect_uses(arg, scope, builtin_deps, sink);
            }
        }

        Expr::Assert(x) => {
            for arg in &x.args {
                collect_uses(arg, scope, builtin_deps, sink);
            }
        }

        Expr::Debug(x) => {
            for arg in &x.args {
                collect_uses(arg, scope, builtin_deps, sink);
            }
        }

        Expr::TryCatch(x) => {
            collect_uses(&x.try_block, scope, builtin_deps, sink);
            collect_uses(&x.catch_block, scope, builtin_deps, sink);
        }
    }
}

impl Program {
    /// Rebuild every function's and global's edge set from its body or
    /// initializer and reset the marks.
    fn rebuild_use_edges(&mut self, builtin_deps: bool) {
        let mut function_edges = Vec::new();
        let mut global_edges = Vec::new();

        {
            let scope = self.scope();
            for (key, f) in scope.this_module.functions.iter() {
                let mut sink = HashSet::new();
                if let Some(body) = &f.body {
                    collect_uses(body, &scope, builtin_deps, &mut sink);
                }
                for arg in &f.args {
                    if let Some(init) = &arg.init {
                        collect_uses(init, &scope, builtin_deps, &mut sink);
                    }
                }
                function_edges.push((key.clone(), sink));
            }

            for (name, var) in scope.this_module.globals.iter() {
                let mut sink = HashSet::new();
                if let Some(init) = &var.init {
                    collect_uses(init, &scope, builtin_deps, &mut sink);
                }
                global_edges.push((name.clone(), sink));
            }
        }

        for (key, sink) in function_edges {
            let f = self.this_module.functions.get_mut(&key).unwrap();
            f.used = false;
            f.uses = sink;
        }
        for (name, sink) in global_edges {
            let var = self.this_module.globals.get_mut(&name).unwrap();
            var.used = false;
            var.uses = sink;
        }
    }

    fn propagate(&mut self, roots: Vec<SymbolRef>) {
        let mut work = roots;
        while let Some(sym) = work.pop() {
            let uses: Vec<SymbolRef> = match sym {
                SymbolRef::Function(key) => {
                    match self.this_module.functions.get_mut(&key) {
                        // built-in and foreign targets are never marked
                        None => continue,
                        Some(f) => {
                            if f.built_in || f.used {
                                continue;
                            }
                            f.used = true;
                            f.uses.iter().cloned().collect()
                        }
                    }
                }
                SymbolRef::Global(name) => match self.this_module.globals.get_mut(&name) {
                    None => continue,
                    Some(var) => {
                        if var.used {
                            continue;
                        }
                        var.used = true;
                        var.uses.iter().cloned().collect()
                    }
                },
            };
            work.extend(uses);
        }
    }

    fn roots(&self, force_all: bool) -> Vec<SymbolRef> {
        let mut roots = Vec::new();
        for (key, f) in self.this_module.functions.iter() {
            if force_all || f.exported || f.init {
                roots.push(SymbolRef::Function(key.clone()));
            }
        }
        if force_all {
            for name in self.this_module.globals.keys() {
                roots.push(SymbolRef::Global(name.clone()));
            }
        }
        roots
    }

    /// Mark every function and global reachable from the exported/init
    /// roots, without removing anything. `builtin_deps` additionally
    /// records edges to built-in callees (marks never cross into them).
    pub fn mark_symbol_use(&mut self, builtin_deps: bool) {
        self.rebuild_use_edges(builtin_deps);
        let roots = self.roots(false);
        self.propagate(roots);
    }

    /// Mark and sweep: rewrite the module's symbol tables to the marked
    /// survivors. Global declaration order is preserved; the plain-name
    /// overload index is rebuilt; surviving functions keep their relative
    /// order and are re-assigned dense resolution indices. In force-all
    /// mode every declared symbol is a root and nothing is removed.
    pub fn remove_unused_symbols(&mut self, force_all: bool) {
        self.rebuild_use_edges(false);
        let roots = self.roots(force_all);
        self.propagate(roots);

        let functions = std::mem::replace(&mut self.this_module.functions, LinkedHashMap::new());
        self.this_module.functions_by_name.clear();
        let mut next_index = 0;
        for (key, mut f) in functions {
            if !f.used {
                continue;
            }
            if f.index.is_some() {
                f.index = Some(next_index);
                next_index += 1;
            }
            self.this_module
                .functions_by_name
                .entry(f.name.clone())
                .or_insert_with(Vec::new)
                .push(key.clone());
            self.this_module.functions.insert(key, f);
        }
        self.total_functions = next_index;

        let globals = std::mem::replace(&mut self.this_module.globals, LinkedHashMap::new());
        let mut next_global = 0;
        for (name, mut var) in globals {
            if !var.used {
                continue;
            }
            if var.global_index.is_some() {
                var.global_index = Some(next_global);
                next_global += 1;
            }
            self.this_module.globals.insert(name, var);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{decl::*, expr::*, module::*, ty::*};
    use tern_common::span::Span;

    fn span() -> Span {
        Span::zero("test")
    }

    fn void() -> TypeDecl {
        TypeDecl::new(BaseType::Void, span())
    }

    fn int() -> TypeDecl {
        TypeDecl::new(BaseType::Int, span())
    }

    /// a call node as the checker leaves it: callee already bound
    fn resolved_call(mangled: &str) -> Expr {
        Expr::Call(ExprCall {
            span: span(),
            ty: Some(void()),
            name: mangled.to_string(),
            args: Vec::new(),
            func: Some(mangled.to_string()),
            stack_top: 0,
        })
    }

    fn resolved_global_ref(name: &str) -> Expr {
        Expr::Var(ExprVar {
            span: span(),
            ty: Some(int().as_ref()),
            name: name.to_string(),
            place: Some(VarPlace::Global { index: 0 }),
        })
    }

    fn program_with_f_g() -> Program {
        let mut program = Program::new(ModuleLibrary::new());

        let g = Function::new("g", void(), span()).with_body(Expr::block(Vec::new(), span()));
        program.add_function(g);

        let f = Function::new("f", void(), span()).with_body(resolved_call("g"));
        program.add_function(f);

        program
            .this_module
            .add_variable(Variable::new("x", int(), span()));

        program
    }

    #[test]
    fn unreachable_functions_and_globals_are_removed() {
        let mut program = program_with_f_g();
        program.remove_unused_symbols(false);

        assert!(program.this_module.find_function("f").is_none());
        assert!(program.this_module.find_function("g").is_none());
        assert!(program.this_module.find_variable("x").is_none());
    }

    #[test]
    fn exported_roots_keep_their_callees_but_not_unrelated_globals() {
        let mut program = program_with_f_g();
        program
            .this_module
            .functions
            .get_mut("f")
            .unwrap()
            .exported = true;

        program.remove_unused_symbols(false);

        assert!(program.this_module.find_function("f").is_some());
        assert!(program.this_module.find_function("g").is_some());
        assert!(program.this_module.find_variable("x").is_none());
    }

    #[test]
    fn force_all_retains_everything() {
        let mut program = program_with_f_g();
        program.remove_unused_symbols(true);

        assert!(program.this_module.find_function("f").is_some());
        assert!(program.this_module.find_function("g").is_some());
        assert!(program.this_module.find_variable("x").is_some());
    }

    #[test]
    fn global_to_global_edges_propagate() {
        let mut program = Program::new(ModuleLibrary::new());

        program
            .this_module
            .add_variable(Variable::new("a", int(), span()));
        program.this_module.add_variable(
            Variable::new("b", int(), span()).with_init(resolved_global_ref("a")),
        );

        // an exported function reads b; b's initializer reads a
        let f = Function::new("f", void(), span())
            .with_body(resolved_global_ref("b"))
            .exported();
        program.add_function(f);

        program.remove_unused_symbols(false);

        assert!(program.this_module.find_variable("a").is_some());
        assert!(program.this_module.find_variable("b").is_some());
    }

    #[test]
    fn edges_are_rebuilt_not_accumulated() {
        let mut program = program_with_f_g();
        program
            .this_module
            .functions
            .get_mut("f")
            .unwrap()
            .exported = true;

        program.mark_symbol_use(false);
        let first: Vec<_> = program.this_module.functions["f"].uses.iter().cloned().collect();

        // rewire f to call nothing; a second run must not remember g
        program.this_module.functions.get_mut("f").unwrap().body =
            Some(Box::new(Expr::block(Vec::new(), span())));
        program.mark_symbol_use(false);

        assert_eq!(1, first.len());
        assert!(program.this_module.functions["f"].uses.is_empty());
        assert!(!program.this_module.functions["g"].used);
    }

    #[test]
    fn marks_are_cycle_safe() {
        let mut program = Program::new(ModuleLibrary::new());

        let ping = Function::new("ping", void(), span())
            .with_body(resolved_call("pong"))
            .exported();
        let pong = Function::new("pong", void(), span()).with_body(resolved_call("ping"));
        program.add_function(ping);
        program.add_function(pong);

        program.remove_unused_symbols(false);

        assert!(program.this_module.find_function("ping").is_some());
        assert!(program.this_module.find_function("pong").is_some());
    }

    #[test]
    fn sweep_reindexes_surviving_functions_densely() {
        let mut program = program_with_f_g();

        // simulate the checker's dense index assignment in declaration order
        let mut idx = 0;
        for (_, f) in program.this_module.functions.iter_mut() {
            f.index = Some(idx);
            idx += 1;
        }
        program.total_functions = idx;

        // only f is a root and f calls g; both survive, keeping dense ids
        program
            .this_module
            .functions
            .get_mut("f")
            .unwrap()
            .exported = true;
        program.remove_unused_symbols(false);

        let g = program.this_module.find_function("g").unwrap();
        let f = program.this_module.find_function("f").unwrap();
        assert_eq!(Some(0), g.index);
        assert_eq!(Some(1), f.index);
        assert_eq!(2, program.total_functions);
    }
}
