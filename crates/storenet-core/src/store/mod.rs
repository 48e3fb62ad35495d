// # Store Implementations
//
// Implementations of the ProvisioningStore trait for different persistence
// strategies. Both share the row logic in `tables`.

pub mod file;
pub mod memory;
mod tables;

pub use file::{FileStore, FileStoreFactory};
pub use memory::{MemoryStore, MemoryStoreFactory};
