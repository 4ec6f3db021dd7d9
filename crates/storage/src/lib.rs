pub mod changelog;
pub mod error;
pub mod memory;
pub mod schema;
pub mod table;
pub mod traits;

pub use changelog::{ChangeEvent, ChangeLog};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use schema::{TableMetadata, TableSchema};
pub use table::{Table, World};
pub use traits::*;
