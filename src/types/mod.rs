pub mod margin;
pub mod market;
pub mod position;

pub use margin::*;
pub use market::*;
pub use position::*;
