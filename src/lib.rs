pub mod backup;
pub mod batch;
pub mod db;
pub mod entry;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod policy;
pub mod recap;
pub mod status;
pub mod store;

pub use batch::{BatchState, SessionBatch, SessionKey};
pub use entry::{validate, EntryInput, RecordKey, ValidEntry};
pub use error::{AggregationError, BatchError, StoreError, ValidationError};
pub use policy::{AttachmentPolicy, AttendancePolicy};
pub use recap::{summarize, summarize_class, AggregationRow, ClassRecap, DateRange, StatusTotals};
pub use status::{unknown_token_count, AttendanceStatus, EntryField, Locale};
pub use store::{AttendanceRecord, AttendanceStore, MemoryStore, RecordFilter, Records, SqliteStore};
