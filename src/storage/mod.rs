pub mod disk;
mod heap_file;
pub mod page;

pub use heap_file::*;
