pub use count::*;
pub use visitor::*;

mod count;
mod visitor;
