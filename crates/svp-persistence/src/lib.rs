//! Snapshot persistence.
//!
//! Accepted tick snapshots are appended to daily JSON Lines files
//! (`snapshots_YYYY-MM-DD.jsonl`) for later analysis.

pub mod config;
pub mod error;
pub mod record;
pub mod writer;

pub use config::PersistenceConfig;
pub use error::{PersistenceError, PersistenceResult};
pub use record::{SnapshotRecord, MULTI_EXCHANGE};
pub use writer::JsonLinesWriter;
