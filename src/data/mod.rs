pub mod angles;
pub mod loader;
pub mod phantom;
pub mod writer;

pub use angles::*;
pub use loader::*;
pub use phantom::*;
pub use writer::*;
