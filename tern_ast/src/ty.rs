use crate::decl::Structure;
use smallvec::SmallVec;
use std::fmt;
use tern_common::span::*;

/// Base kind of a type descriptor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BaseType {
    /// no value at all: the type of statements and unchecked nodes
    None,
    /// inference placeholder, replaced before checking completes
    Auto,
    Void,
    Bool,
    Int,
    UInt,
    Int64,
    UInt64,
    Float,
    Float2,
    Float3,
    Float4,
    Int2,
    Int3,
    Int4,
    UInt2,
    UInt3,
    UInt4,
    Double,
    String,
    Pointer,
    Structure,
    Array,
    Table,
    Block,
    Range,
    URange,
}

impl BaseType {
    pub fn name(self) -> &'static str {
        match self {
            BaseType::None => "none",
            BaseType::Auto => "auto",
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::UInt => "uint",
            BaseType::Int64 => "int64",
            BaseType::UInt64 => "uint64",
            BaseType::Float => "float",
            BaseType::Float2 => "float2",
            BaseType::Float3 => "float3",
            BaseType::Float4 => "float4",
            BaseType::Int2 => "int2",
            BaseType::Int3 => "int3",
            BaseType::Int4 => "int4",
            BaseType::UInt2 => "uint2",
            BaseType::UInt3 => "uint3",
            BaseType::UInt4 => "uint4",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Pointer => "pointer",
            BaseType::Structure => "structure",
            BaseType::Array => "array",
            BaseType::Table => "table",
            BaseType::Block => "block",
            BaseType::Range => "range",
            BaseType::URange => "urange",
        }
    }

    /// Byte size of a value of this base kind. Structures are sized through
    /// their declaration, not here.
    pub fn size(self) -> u32 {
        match self {
            BaseType::None | BaseType::Auto | BaseType::Void => 0,
            BaseType::Bool => 1,
            BaseType::Int | BaseType::UInt | BaseType::Float => 4,
            BaseType::Int64 | BaseType::UInt64 | BaseType::Double => 8,
            BaseType::Float2 | BaseType::Int2 | BaseType::UInt2 => 8,
            BaseType::Float3 | BaseType::Int3 | BaseType::UInt3 => 12,
            BaseType::Float4 | BaseType::Int4 | BaseType::UInt4 => 16,
            BaseType::String | BaseType::Pointer | BaseType::Block => 8,
            BaseType::Range | BaseType::URange => 8,
            BaseType::Array => 24,
            BaseType::Table => 32,
            BaseType::Structure => 0,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stable handle to a structure declaration: the declaring module's
/// registration slot plus the index into that module's structure arena.
/// Handle equality is structure identity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StructId {
    pub module: u32,
    pub index: u32,
}

impl fmt::Display for StructId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.index)
    }
}

/// Resolves structure handles for type queries that need a declaration's
/// name or layout (sizes, strides, mangled names).
pub trait StructResolve {
    fn structure(&self, id: StructId) -> &Structure;
}

/// The shape of a type: base kind, fixed dimensions, reference/const
/// flags, owned sub-types, and the structure handle for structure and
/// pointer-to-structure kinds. Descriptors are value-cloned whenever they
/// are attached to a new node; no type state is shared between nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub base: BaseType,
    pub dims: SmallVec<[u32; 4]>,
    pub is_ref: bool,
    pub is_const: bool,
    pub first: Option<Box<TypeDecl>>,
    pub second: Option<Box<TypeDecl>>,
    pub structure: Option<StructId>,
    pub span: Span,
}

impl TypeDecl {
    pub fn new(base: BaseType, span: Span) -> Self {
        Self {
            base,
            dims: SmallVec::new(),
            is_ref: false,
            is_const: false,
            first: None,
            second: None,
            structure: None,
            span,
        }
    }

    /// The type of statements and other no-value expressions.
    pub fn no_value(span: Span) -> Self {
        Self::new(BaseType::None, span)
    }

    pub fn structure(id: StructId, span: Span) -> Self {
        let mut ty = Self::new(BaseType::Structure, span);
        ty.structure = Some(id);
        ty
    }

    pub fn pointer_to(id: StructId, span: Span) -> Self {
        let mut ty = Self::new(BaseType::Pointer, span);
        ty.structure = Some(id);
        ty
    }

    pub fn array_of(element: TypeDecl, span: Span) -> Self {
        let mut ty = Self::new(BaseType::Array, span);
        ty.first = Some(Box::new(element));
        ty
    }

    pub fn with_dim(mut self, dim: u32) -> Self {
        self.dims.push(dim);
        self
    }

    pub fn as_ref(mut self) -> Self {
        self.is_ref = true;
        self
    }

    /// Structural equality. Structure and pointer kinds compare their
    /// handles only when both sides know one; array elements likewise.
    /// The reference flag participates only if `ref_matters`.
    pub fn is_same_type(&self, other: &TypeDecl, ref_matters: bool) -> bool {
        if self.base != other.base {
            return false;
        }
        if self.base == BaseType::Structure && self.structure != other.structure {
            return false;
        }
        if self.base == BaseType::Pointer {
            if let (Some(a), Some(b)) = (self.structure, other.structure) {
                if a != b {
                    return false;
                }
            }
        }
        if self.base == BaseType::Array {
            if let (Some(a), Some(b)) = (&self.first, &other.first) {
                if !a.is_same_type(b, true) {
                    return false;
                }
            }
        }
        if self.dims != other.dims {
            return false;
        }
        if ref_matters && self.is_ref != other.is_ref {
            return false;
        }
        true
    }

    /// The contract between a source being iterated and its iterator
    /// variable: matching base kind and structure, no dimensions left on
    /// the iterator, and the iterator must be a reference.
    pub fn is_iterator_type(&self, iter: &TypeDecl) -> bool {
        if self.base != iter.base {
            return false;
        }
        if self.base == BaseType::Structure && self.structure != iter.structure {
            return false;
        }
        if !iter.dims.is_empty() {
            return false;
        }
        iter.is_ref()
    }

    /// A fully-specified dynamic array: array base kind, no fixed
    /// dimensions, element type known.
    pub fn is_good_array_type(&self) -> bool {
        self.base == BaseType::Array && self.dims.is_empty() && self.first.is_some()
    }

    pub fn is_void(&self) -> bool {
        self.base == BaseType::Void && self.dims.is_empty()
    }

    pub fn is_pointer(&self) -> bool {
        self.base == BaseType::Pointer && self.dims.is_empty()
    }

    /// A plain single value: anything that is not a structure, pointer,
    /// void or unresolved, and carries no dimensions.
    pub fn is_simple_type(&self) -> bool {
        match self.base {
            BaseType::None | BaseType::Auto | BaseType::Void | BaseType::Structure
            | BaseType::Pointer => false,
            _ => self.dims.is_empty(),
        }
    }

    pub fn is_simple(&self, base: BaseType) -> bool {
        self.base == base && self.is_simple_type()
    }

    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    /// Whether this type denotes a mutable location rather than a copied
    /// value: explicitly marked references, structures, arrays, tables,
    /// and anything with fixed dimensions.
    pub fn is_ref(&self) -> bool {
        self.is_ref
            || self.base == BaseType::Structure
            || self.base == BaseType::Array
            || self.base == BaseType::Table
            || !self.dims.is_empty()
    }

    /// The only legal subscript types.
    pub fn is_index(&self) -> bool {
        (self.base == BaseType::Int || self.base == BaseType::UInt) && self.dims.is_empty()
    }

    pub fn base_size_of(&self, scope: &impl StructResolve) -> u32 {
        match self.base {
            BaseType::Structure => match self.structure {
                Some(id) => scope.structure(id).size_of(scope),
                None => 0,
            },
            base => base.size(),
        }
    }

    /// Total byte size: base size times the product of every dimension.
    pub fn size_of(&self, scope: &impl StructResolve) -> u32 {
        let count: u32 = self.dims.iter().product();
        self.base_size_of(scope) * count
    }

    /// Element step for subscripting: every dimension except the last.
    pub fn stride_of(&self, scope: &impl StructResolve) -> u32 {
        let mut count = 1;
        if self.dims.len() > 1 {
            for dim in &self.dims[..self.dims.len() - 1] {
                count *= dim;
            }
        }
        self.base_size_of(scope) * count
    }

    /// Canonical overload-table key for this type.
    pub fn mangled_name(&self, scope: &impl StructResolve) -> String {
        let mut out = String::new();
        match self.base {
            BaseType::Array => {
                out.push_str("#array");
                if let Some(element) = &self.first {
                    out.push('#');
                    out.push_str(&element.mangled_name(scope));
                }
            }
            BaseType::Pointer => {
                if let Some(id) = self.structure {
                    out.push_str(&scope.structure(id).name);
                }
                out.push_str("#ptr");
            }
            BaseType::Structure => match self.structure {
                Some(id) => out.push_str(&scope.structure(id).name),
                None => out.push_str("structure"),
            },
            base => out.push_str(base.name()),
        }
        if self.is_ref {
            out.push_str("#ref");
        }
        for dim in &self.dims {
            out.push('#');
            out.push_str(&dim.to_string());
        }
        out
    }

    /// Human-readable rendering for diagnostics.
    pub fn describe(&self, scope: &impl StructResolve) -> String {
        let mut out = String::new();
        match self.base {
            BaseType::Array => {
                match &self.first {
                    Some(element) => {
                        out.push_str("array (");
                        out.push_str(&element.describe(scope));
                        out.push(')');
                    }
                    None => out.push_str("array"),
                }
            }
            BaseType::Structure | BaseType::Pointer => {
                match self.structure {
                    Some(id) => out.push_str(&scope.structure(id).name),
                    None => out.push_str("unspecified"),
                }
                if self.base == BaseType::Pointer {
                    out.push_str(" *");
                }
            }
            base => out.push_str(base.name()),
        }
        for dim in &self.dims {
            out.push(' ');
            out.push_str(&dim.to_string());
        }
        if self.is_ref {
            out.push_str(" &");
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decl::{Field, Structure};

    struct OneStruct(Structure);

    impl StructResolve for OneStruct {
        fn structure(&self, id: StructId) -> &Structure {
            assert_eq!(0, id.index);
            &self.0
        }
    }

    fn span() -> Span {
        Span::zero("test")
    }

    fn int() -> TypeDecl {
        TypeDecl::new(BaseType::Int, span())
    }

    fn float() -> TypeDecl {
        TypeDecl::new(BaseType::Float, span())
    }

    #[test]
    fn same_type_is_reflexive_and_symmetric() {
        let types = [
            int(),
            float(),
            int().with_dim(4),
            TypeDecl::array_of(int(), span()),
            TypeDecl::array_of(float(), span()),
            int().as_ref(),
            TypeDecl::new(BaseType::String, span()),
        ];

        for a in &types {
            assert!(a.is_same_type(a, true), "{:?} != itself", a.base);
            for b in &types {
                assert_eq!(
                    a.is_same_type(b, true),
                    b.is_same_type(a, true),
                    "asymmetric for {:?} vs {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn array_of_int_is_not_array_of_float() {
        let ints = TypeDecl::array_of(int(), span());
        let floats = TypeDecl::array_of(float(), span());
        assert!(!ints.is_same_type(&floats, false));
    }

    #[test]
    fn fixed_array_is_not_dynamic_array() {
        let fixed = int().with_dim(4);
        let dynamic = TypeDecl::array_of(int(), span());
        assert!(!fixed.is_same_type(&dynamic, false));
    }

    #[test]
    fn ref_flag_only_matters_when_asked() {
        let by_val = int();
        let by_ref = int().as_ref();
        assert!(by_val.is_same_type(&by_ref, false));
        assert!(!by_val.is_same_type(&by_ref, true));
    }

    #[test]
    fn ref_query_covers_implicit_reference_kinds() {
        assert!(int().as_ref().is_ref());
        assert!(int().with_dim(3).is_ref());
        assert!(TypeDecl::array_of(int(), span()).is_ref());
        assert!(TypeDecl::new(BaseType::Table, span()).is_ref());
        assert!(!int().is_ref());
        assert!(!float().is_ref());
    }

    #[test]
    fn only_int_and_uint_scalars_index() {
        assert!(int().is_index());
        assert!(TypeDecl::new(BaseType::UInt, span()).is_index());
        assert!(!float().is_index());
        assert!(!int().with_dim(2).is_index());
    }

    #[test]
    fn iterator_type_contract() {
        let source = int().with_dim(8).as_ref();
        let iter_ok = int().as_ref();
        let iter_not_ref = int();
        let iter_dims = int().with_dim(8).as_ref();

        assert!(source.is_iterator_type(&iter_ok));
        assert!(!source.is_iterator_type(&iter_not_ref));
        assert!(!source.is_iterator_type(&iter_dims));
    }

    #[test]
    fn size_and_stride() {
        let scope = OneStruct(Structure {
            name: "point".to_string(),
            fields: vec![
                Field {
                    name: "x".to_string(),
                    ty: int(),
                    offset: 0,
                    span: span(),
                },
                Field {
                    name: "y".to_string(),
                    ty: int(),
                    offset: 0,
                    span: span(),
                },
            ],
            span: span(),
        });

        let mut grid = int();
        grid.dims.push(3);
        grid.dims.push(5);
        assert_eq!(4 * 3 * 5, grid.size_of(&scope));
        assert_eq!(4 * 3, grid.stride_of(&scope));

        let st = TypeDecl::structure(StructId { module: 0, index: 0 }, span());
        assert_eq!(8, st.size_of(&scope));
    }

    #[test]
    fn mangled_names() {
        let scope = OneStruct(Structure {
            name: "point".to_string(),
            fields: Vec::new(),
            span: span(),
        });

        assert_eq!("int", int().mangled_name(&scope));
        assert_eq!("int#ref", int().as_ref().mangled_name(&scope));
        assert_eq!("int#4", int().with_dim(4).mangled_name(&scope));
        assert_eq!(
            "#array#float",
            TypeDecl::array_of(float(), span()).mangled_name(&scope)
        );

        let id = StructId { module: 0, index: 0 };
        assert_eq!("point", TypeDecl::structure(id, span()).mangled_name(&scope));
        assert_eq!(
            "point#ptr",
            TypeDecl::pointer_to(id, span()).mangled_name(&scope)
        );
    }
}
