pub mod abi;
pub mod decl;
pub mod expr;
pub mod module;
pub mod op;
pub mod ty;
pub mod usage;

pub use self::{abi::*, decl::*, expr::*, module::*, op::*, ty::*};
