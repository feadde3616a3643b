pub mod error;
pub mod record;
pub mod types;

pub use error::{RegistryError, Result};
pub use record::{RecordHandle, RecordView, TransactionRecord, TransactionRecordBuilder};
pub use types::{CellRole, ItemFlags, SessionId};
