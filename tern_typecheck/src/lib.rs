mod check;
mod ctx;
mod program;


pub use self::{check::check_expr, ctx::*, program::infer_types};
