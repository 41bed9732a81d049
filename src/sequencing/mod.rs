pub mod clocks;
pub mod lookahead;

pub use clocks::*;
pub use lookahead::*;
