mod debug_info;
mod lower;
mod node;
mod program;

#[cfg(test)]
mod test;

pub use self::{debug_info::*, lower::*, node::*, program::*};
