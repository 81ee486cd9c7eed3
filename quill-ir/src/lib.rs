pub mod ir;
pub mod types;

pub use ir::*;
pub use types::*;
