//! Document records and the low-level record store.

pub mod record_index;

pub use record_index::{DocumentRecord, RecordId, RecordIndex};
