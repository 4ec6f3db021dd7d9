pub mod abi;
pub mod codec;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod mutation;
pub mod schema_type;
pub mod store_event;

pub use error::{CoreError, DecodeError};
pub use field_value::{Field, FieldValue};
pub use ids::*;
pub use mutation::MudMutation;
pub use schema_type::{SchemaType, StaticType};
pub use store_event::{EventKind, LogRecord, StoreEvent};
