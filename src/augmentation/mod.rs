pub mod base;
pub mod jitter;
pub mod noise;

pub use base::*;
pub use jitter::*;
pub use noise::*;
