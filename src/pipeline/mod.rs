pub mod builder;
pub mod engine;
pub mod traits;
pub mod types;

pub use builder::*;
pub use engine::*;
pub use traits::*;
pub use types::*;
