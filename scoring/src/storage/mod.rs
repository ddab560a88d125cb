pub mod common;
pub mod in_memory;
pub mod prod_common;

pub use common::*;
pub use in_memory::*;
pub use prod_common::*;
