// ============================================================================
// pipetable Library
// ============================================================================
//
// Live registry of captured network transactions ("pipes") with a
// row/column projection for table views and structural-change
// notifications that keep displayed row indices consistent.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod projection;
pub mod registry;

// Re-export main types for convenience
pub use crate::config::RegistryConfig;
pub use crate::core::{
    CellRole, ItemFlags, RecordHandle, RecordView, RegistryError, Result, SessionId,
    TransactionRecord, TransactionRecordBuilder,
};
pub use crate::projection::{Column, RowSource, TableProjection};
pub use crate::registry::{
    ChangeKind, ChangeListener, ListenerId, RegistryChange, RegistrySnapshot, TransactionRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
