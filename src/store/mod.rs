//! Store module
//!
//! Local content storage: values, storage backends and the store itself.

pub mod backend;
pub mod content;
pub mod value;

pub use backend::{MemoryBackend, StorageBackend};
pub use content::ContentStore;
pub use value::StoredValue;
