//! Introspection descriptors shipped alongside the executable tree.
//! Structure descriptors are memoized by name so a structure's shape is
//! serialized once however many types mention it.

use linked_hash_map::LinkedHashMap;
use std::rc::Rc;
use tern_ast::{decl::*, module::SymbolScope, ty::*};

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub base: BaseType,
    pub dims: Vec<u32>,
    pub is_ref: bool,
    pub structure: Option<Rc<StructInfo>>,
    pub first: Option<Box<TypeInfo>>,
    pub second: Option<Box<TypeInfo>>,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<VarInfo>,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub info: TypeInfo,
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub name: String,
    pub stack_size: u32,
    pub args: Vec<VarInfo>,
}

#[derive(Default)]
pub struct DebugInfoBuilder {
    memo: LinkedHashMap<String, Rc<StructInfo>>,
    building: std::collections::HashSet<String>,
}

impl DebugInfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_info(&mut self, ty: &TypeDecl, scope: &SymbolScope) -> TypeInfo {
        let structure = match (ty.base, ty.structure) {
            (BaseType::Structure, Some(id)) | (BaseType::Pointer, Some(id)) => {
                Some(self.struct_info(id, scope))
            }
            _ => None,
        };

        TypeInfo {
            base: ty.base,
            dims: ty.dims.iter().copied().collect(),
            is_ref: ty.is_ref,
            structure,
            first: ty
                .first
                .as_ref()
                .map(|first| Box::new(self.type_info(first, scope))),
            second: ty
                .second
                .as_ref()
                .map(|second| Box::new(self.type_info(second, scope))),
        }
    }

    pub fn struct_info(&mut self, id: StructId, scope: &SymbolScope) -> Rc<StructInfo> {
        let st = scope.structure(id);
        if let Some(memoized) = self.memo.get(&st.name) {
            return memoized.clone();
        }

        let name = st.name.clone();
        // a structure that points back at itself gets a name-only stub at
        // the recursive mention
        if !self.building.insert(name.clone()) {
            return Rc::new(StructInfo {
                name,
                fields: Vec::new(),
            });
        }

        let fields: Vec<Field> = st.fields.clone();
        let fields = fields
            .iter()
            .map(|field| VarInfo {
                name: field.name.clone(),
                info: self.type_info(&field.ty, scope),
            })
            .collect();

        self.building.remove(&name);
        let info = Rc::new(StructInfo {
            name: name.clone(),
            fields,
        });
        self.memo.insert(name, info.clone());
        info
    }

    pub fn var_info(&mut self, var: &Variable, scope: &SymbolScope) -> VarInfo {
        VarInfo {
            name: var.name.clone(),
            info: self.type_info(&var.ty, scope),
        }
    }

    pub fn func_info(&mut self, f: &Function, scope: &SymbolScope) -> FuncInfo {
        FuncInfo {
            name: f.name.clone(),
            stack_size: f.total_stack_size,
            args: f
                .args
                .iter()
                .map(|arg| self.var_info(arg, scope))
                .collect(),
        }
    }
}
