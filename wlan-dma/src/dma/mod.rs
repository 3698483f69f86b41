//! DMA memory views: descriptor arenas, packet buffers, slot ownership.

pub mod buffer;
pub mod ownership;
pub mod pool;

pub use buffer::BufferPool;
pub use ownership::{RxOwnership, TxOwnership};
pub use pool::{DescRef, DescriptorPool};
