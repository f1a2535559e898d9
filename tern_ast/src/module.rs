use crate::{decl::*, expr::*, ty::*};
use linked_hash_map::LinkedHashMap;
use std::{collections::HashMap, rc::Rc};
use tern_common::{bug, diag::Diagnostics, span::*};

/// A namespace of declarations. Structures live in an arena addressed by
/// `StructId`; globals and functions keep declaration order. Functions are
/// keyed by mangled name (the overload uniqueness key), with a plain-name
/// index on the side for overload search.
#[derive(Debug, Clone)]
pub struct Module {
    /// registration slot in the owning library; the user module sits one
    /// past the last library module
    pub slot: u32,
    pub structs: Vec<Structure>,
    struct_names: HashMap<String, u32>,
    pub globals: LinkedHashMap<String, Variable>,
    pub functions: LinkedHashMap<String, Function>,
    pub functions_by_name: HashMap<String, Vec<String>>,
}

impl Module {
    pub fn new(slot: u32) -> Self {
        Self {
            slot,
            structs: Vec::new(),
            struct_names: HashMap::new(),
            globals: LinkedHashMap::new(),
            functions: LinkedHashMap::new(),
            functions_by_name: HashMap::new(),
        }
    }

    pub fn add_structure(&mut self, st: Structure) -> Option<StructId> {
        if self.struct_names.contains_key(&st.name) {
            return None;
        }
        let index = self.structs.len() as u32;
        self.struct_names.insert(st.name.clone(), index);
        self.structs.push(st);
        Some(StructId {
            module: self.slot,
            index,
        })
    }

    pub fn add_variable(&mut self, var: Variable) -> bool {
        if self.globals.contains_key(&var.name) {
            return false;
        }
        self.globals.insert(var.name.clone(), var);
        true
    }

    /// Insert a function under its mangled identity. Fails on a mangled
    /// name already declared in this module (same name and argument
    /// types); plain-name collisions are just overloads.
    pub fn add_function(&mut self, mut f: Function) -> bool {
        let mangled = {
            let scope: &Module = &*self;
            f.mangled_name(scope)
        };
        if self.functions.contains_key(&mangled) {
            return false;
        }
        f.mangled = mangled.clone();
        self.functions_by_name
            .entry(f.name.clone())
            .or_insert_with(Vec::new)
            .push(mangled.clone());
        self.functions.insert(mangled, f);
        true
    }

    pub fn find_structure(&self, name: &str) -> Option<StructId> {
        self.struct_names.get(name).map(|index| StructId {
            module: self.slot,
            index: *index,
        })
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.globals.get(name)
    }

    pub fn find_function(&self, mangled: &str) -> Option<&Function> {
        self.functions.get(mangled)
    }

    pub fn functions_named<'m>(&'m self, name: &str) -> impl Iterator<Item = &'m Function> {
        self.functions_by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |mangled| &self.functions[mangled])
    }
}

impl StructResolve for Module {
    fn structure(&self, id: StructId) -> &Structure {
        if id.module != self.slot {
            bug!("structure handle {} resolved against module {}", id, self.slot);
        }
        &self.structs[id.index as usize]
    }
}

/// An ordered list of shared modules, built-ins first. Lookup is
/// first-match in registration order. The library never mutates a module
/// it holds; the built-in module in particular is a shared singleton
/// reused across programs.
#[derive(Debug, Clone, Default)]
pub struct ModuleLibrary {
    modules: Vec<Rc<Module>>,
}

impl ModuleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Rc<Module>) {
        if module.slot as usize != self.modules.len() {
            bug!(
                "module registered at slot {} but declared slot {}",
                self.modules.len(),
                module.slot
            );
        }
        self.modules.push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().map(|m| &**m)
    }
}

/// A read-only view over every module visible to one program: the library
/// modules in registration order, then the program's own module. All
/// name lookup and overload search used by checking and lowering goes
/// through this.
#[derive(Copy, Clone)]
pub struct SymbolScope<'a> {
    pub library: &'a ModuleLibrary,
    pub this_module: &'a Module,
}

impl<'a> SymbolScope<'a> {
    fn modules(self) -> impl Iterator<Item = &'a Module> {
        self.library
            .modules
            .iter()
            .map(|m| &**m)
            .chain(std::iter::once(self.this_module))
    }

    pub fn find_structure(self, name: &str) -> Option<StructId> {
        self.modules().find_map(|m| m.find_structure(name))
    }

    pub fn find_variable(self, name: &str) -> Option<&'a Variable> {
        self.modules().find_map(|m| m.find_variable(name))
    }

    pub fn find_function(self, mangled: &str) -> Option<&'a Function> {
        self.modules().find_map(|m| m.find_function(mangled))
    }

    /// A structure type referencing the named declaration, for the
    /// front-end to attach while building declarations.
    pub fn make_structure_type(self, name: &str, span: Span) -> Option<TypeDecl> {
        self.find_structure(name)
            .map(|id| TypeDecl::structure(id, span))
    }

    /// All functions registered under `name` (in any module) that could
    /// accept the supplied argument types: enough parameters, every
    /// supplied argument reference-compatible and structurally the same
    /// type (an unresolved argument type is compatible with anything),
    /// and a default initializer on every parameter past the supplied
    /// ones. The caller decides what zero or multiple candidates mean.
    pub fn find_matching_functions(
        self,
        name: &str,
        arg_types: &[Option<TypeDecl>],
    ) -> Vec<&'a Function> {
        let mut result = Vec::new();

        for module in self.modules() {
            for f in module.functions_named(name) {
                if f.args.len() < arg_types.len() {
                    continue;
                }

                let types_compatible = arg_types.iter().zip(&f.args).all(|(passed, arg)| {
                    match passed {
                        None => true,
                        Some(passed) => {
                            !(arg.ty.is_ref() && !passed.is_ref())
                                && arg.ty.is_same_type(passed, false)
                        }
                    }
                });

                let tail_compatible = f.args[arg_types.len()..]
                    .iter()
                    .all(|arg| arg.init.is_some());

                if types_compatible && tail_compatible {
                    result.push(f);
                }
            }
        }

        result
    }
}

impl StructResolve for SymbolScope<'_> {
    fn structure(&self, id: StructId) -> &Structure {
        let module = id.module as usize;
        if module < self.library.modules.len() {
            &self.library.modules[module].structs[id.index as usize]
        } else if id.module == self.this_module.slot {
            &self.this_module.structs[id.index as usize]
        } else {
            bug!("structure handle {} out of scope", id);
        }
    }
}

/// One program being compiled: its own module of declarations, the
/// library of built-in modules it resolves against, and the diagnostics
/// accumulated so far. A failed program keeps collecting diagnostics and
/// is never lowered.
#[derive(Debug, Clone)]
pub struct Program {
    pub this_module: Module,
    pub library: ModuleLibrary,
    pub diags: Diagnostics,
    pub total_functions: u32,
}

impl Program {
    pub fn new(library: ModuleLibrary) -> Self {
        let this_module = Module::new(library.len() as u32);
        Self {
            this_module,
            library,
            diags: Diagnostics::new(),
            total_functions: 0,
        }
    }

    pub fn scope(&self) -> SymbolScope {
        SymbolScope {
            library: &self.library,
            this_module: &self.this_module,
        }
    }

    pub fn failed(&self) -> bool {
        self.diags.failed()
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diags.error(message, span);
    }

    pub fn add_structure(&mut self, st: Structure) -> Option<StructId> {
        let name = st.name.clone();
        let span = st.span.clone();
        match self.this_module.add_structure(st) {
            Some(id) => Some(id),
            None => {
                self.error(format!("structure {} is already declared", name), span);
                None
            }
        }
    }

    pub fn add_variable(&mut self, var: Variable) -> bool {
        let name = var.name.clone();
        let span = var.span.clone();
        if self.this_module.add_variable(var) {
            true
        } else {
            self.error(format!("global {} is already declared", name), span);
            false
        }
    }

    pub fn add_function(&mut self, f: Function) -> bool {
        let name = f.name.clone();
        let span = f.span.clone();

        // library modules registered ahead of this one can't be shadowed
        // under the same mangled key
        let mangled = f.mangled_name(&self.this_module);
        if self
            .library
            .modules()
            .any(|m| m.find_function(&mangled).is_some())
        {
            self.error(
                format!("function {} shadows a built-in declaration", name),
                span,
            );
            return false;
        }

        if self.this_module.add_function(f) {
            true
        } else {
            self.error(
                format!("function {} is already declared with these arguments", name),
                span,
            );
            false
        }
    }

    pub fn find_structure(&self, name: &str) -> Option<StructId> {
        self.scope().find_structure(name)
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.scope().find_variable(name)
    }

    pub fn find_function(&self, mangled: &str) -> Option<&Function> {
        self.scope().find_function(mangled)
    }

    pub fn make_structure_type(&self, name: &str, span: Span) -> Option<TypeDecl> {
        self.scope().make_structure_type(name, span)
    }

    /// Build the node for a call-shaped source form. The intrinsic forms
    /// get their dedicated node kinds; everything else is an ordinary
    /// call resolved later by overload search.
    pub fn make_call(&self, name: &str, args: Vec<Expr>, span: Span) -> Expr {
        match name {
            "push" => Expr::ArrayPush(ExprArrayPush {
                span,
                ty: None,
                args,
            }),
            "assert" => Expr::Assert(ExprAssert {
                span,
                ty: None,
                args,
            }),
            "debug" => Expr::Debug(ExprDebug {
                span,
                ty: None,
                args,
            }),
            _ => Expr::call(name, args, span),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn span() -> Span {
        Span::zero("test")
    }

    fn int() -> TypeDecl {
        TypeDecl::new(BaseType::Int, span())
    }

    fn float() -> TypeDecl {
        TypeDecl::new(BaseType::Float, span())
    }

    fn add_fn(arg_ty: TypeDecl) -> Function {
        Function::built_in(
            "add",
            vec![
                Variable::new("x", arg_ty.clone(), span()),
                Variable::new("y", arg_ty, span()),
            ],
            int(),
        )
    }

    #[test]
    fn mangled_names_distinguish_overloads() {
        let mut module = Module::new(0);
        assert!(module.add_function(add_fn(int())));
        assert!(module.add_function(add_fn(float())));
        // same argument types again: rejected
        assert!(!module.add_function(add_fn(int())));

        assert_eq!(2, module.functions_named("add").count());
        assert!(module.find_function("add int int").is_some());
        assert!(module.find_function("add float float").is_some());
    }

    #[test]
    fn library_lookup_is_first_match_in_registration_order() {
        let mut builtin = Module::new(0);
        builtin.add_variable(Variable::new("shared", int(), span()));

        let mut library = ModuleLibrary::new();
        library.register(Rc::new(builtin));

        let mut program = Program::new(library);
        program
            .this_module
            .add_variable(Variable::new("mine", float(), span()));

        // builtin module wins for its own names; user names resolve after
        let shared = program.find_variable("shared").unwrap();
        assert_eq!(BaseType::Int, shared.ty.base);
        let mine = program.find_variable("mine").unwrap();
        assert_eq!(BaseType::Float, mine.ty.base);
        assert!(program.find_variable("missing").is_none());
    }

    #[test]
    fn matching_rejects_wrong_types_and_accepts_defaults() {
        let mut module = Module::new(0);
        module.add_function(add_fn(int()));
        module.add_function(add_fn(float()));

        let with_default = Function::built_in(
            "inc",
            vec![
                Variable::new("x", int(), span()),
                Variable::new("by", int(), span()).with_init(Expr::int(1, span())),
            ],
            int(),
        );
        module.add_function(with_default);

        let mut library = ModuleLibrary::new();
        library.register(Rc::new(module));
        let program = Program::new(library);
        let scope = program.scope();

        // unique match on exact types
        let ints = scope.find_matching_functions("add", &[Some(int()), Some(int())]);
        assert_eq!(1, ints.len());
        assert_eq!("add int int", ints[0].mangled);

        // no candidate mixes int and float
        let mixed = scope.find_matching_functions("add", &[Some(int()), Some(float())]);
        assert!(mixed.is_empty());

        // trailing defaulted parameter may be omitted
        let inc = scope.find_matching_functions("inc", &[Some(int())]);
        assert_eq!(1, inc.len());

        // unresolved argument types are compatible with anything
        let best_effort = scope.find_matching_functions("add", &[None, None]);
        assert_eq!(2, best_effort.len());
    }

    #[test]
    fn reference_parameters_require_reference_arguments() {
        let mut module = Module::new(0);
        let f = Function::built_in(
            "bump",
            vec![Variable::new("x", int().as_ref(), span())],
            TypeDecl::new(BaseType::Void, span()),
        );
        module.add_function(f);

        let mut library = ModuleLibrary::new();
        library.register(Rc::new(module));
        let program = Program::new(library);
        let scope = program.scope();

        assert!(scope
            .find_matching_functions("bump", &[Some(int())])
            .is_empty());
        assert_eq!(
            1,
            scope
                .find_matching_functions("bump", &[Some(int().as_ref())])
                .len()
        );
    }

    #[test]
    fn duplicate_declarations_are_recorded_as_errors() {
        let mut program = Program::new(ModuleLibrary::new());
        assert!(program.add_structure(Structure::new("point", span())).is_some());
        assert!(program.add_structure(Structure::new("point", span())).is_none());
        assert!(program.failed());
    }

    #[test]
    fn user_functions_cannot_shadow_builtins_under_the_same_key() {
        let mut builtin = Module::new(0);
        builtin.add_function(add_fn(int()));

        let mut library = ModuleLibrary::new();
        library.register(Rc::new(builtin));
        let mut program = Program::new(library);

        // same name, same argument types: rejected at declaration time
        let mut shadow = Function::new("add", int(), span());
        shadow = shadow.with_arg("x", int()).with_arg("y", int());
        assert!(!program.add_function(shadow));
        assert!(program.failed());

        // a different overload of the same plain name is fine
        let mut other = Function::new("add", int(), span());
        other = other.with_arg("x", float()).with_arg("y", float());
        other.body = Some(Box::new(Expr::ret(
            Some(Expr::var("x", span())),
            span(),
        )));
        assert!(program.add_function(other));
    }

    #[test]
    fn make_call_maps_intrinsic_names() {
        let program = Program::new(ModuleLibrary::new());
        assert!(matches!(
            program.make_call("push", Vec::new(), span()),
            Expr::ArrayPush(_)
        ));
        assert!(matches!(
            program.make_call("assert", Vec::new(), span()),
            Expr::Assert(_)
        ));
        assert!(matches!(
            program.make_call("debug", Vec::new(), span()),
            Expr::Debug(_)
        ));
        assert!(matches!(
            program.make_call("shuffle", Vec::new(), span()),
            Expr::Call(_)
        ));
    }
}
