mod buffer_pool;
mod frame_header;
mod lru_k_replacer;
mod page_guard;

pub use buffer_pool::*;
pub use frame_header::*;
pub use lru_k_replacer::*;
pub use page_guard::*;
