pub mod pool;
pub mod store;

pub use pool::ReadPoolConfig;
pub use store::{StoreConfig, SynchronousMode};
