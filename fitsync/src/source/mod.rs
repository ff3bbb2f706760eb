//! Record store gateway for the legacy club database
//!
//! Reads client rows that still need to be pushed to BioStar and writes back
//! the export flag once a client is done. The ODBC implementation lives in
//! [`odbc`]; the orchestrator only sees the [`RecordStore`] trait.

use thiserror::Error;

pub mod odbc;
pub mod queries;

pub use odbc::OdbcRecordStore;
pub use queries::SourceSchema;

/// Record store errors
#[derive(Debug, Error)]
pub enum SourceError {
    /// The driver could not establish (or lost) the database session
    #[error("Source connection error: {0}")]
    Connection(String),

    /// Malformed SQL or driver rejection
    #[error("Source query error: {0}")]
    Query(String),
}

/// Where a client's photo comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoReference {
    /// Image bytes stored in the row
    Inline(Vec<u8>),
    /// File name stem (the client code) or an absolute path
    FileToken(String),
    /// Nothing to look up
    Missing,
}

/// A client row as read from the legacy database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Key used to mark the row synced (client code, untrimmed)
    pub source_id: String,
    /// Client code, e.g. `AGAH000010`
    pub raw_code: String,
    pub given_name: String,
    pub family_name: String,
    pub department: String,
    pub email: String,
    pub phone: String,
    pub photo: PhotoReference,
    pub synced: bool,
}

/// Access to pending client records
///
/// Errors are surfaced as-is; retrying is the caller's decision.
pub trait RecordStore {
    /// Up to `limit` records whose synced flag is false or NULL, ordered by code
    fn fetch_unsynced_batch(&mut self, limit: u32) -> Result<Vec<SourceRecord>, SourceError>;

    /// Number of records still pending
    fn fetch_count(&mut self) -> Result<u64, SourceError>;

    /// Set the synced flag of one record
    ///
    /// Returns `false` when no row was updated (already synced or gone).
    fn mark_synced(&mut self, source_id: &str) -> Result<bool, SourceError>;

    /// Release the underlying connection
    fn close(&mut self) {}
}

impl<T: RecordStore + ?Sized> RecordStore for &mut T {
    fn fetch_unsynced_batch(&mut self, limit: u32) -> Result<Vec<SourceRecord>, SourceError> {
        (**self).fetch_unsynced_batch(limit)
    }

    fn fetch_count(&mut self) -> Result<u64, SourceError> {
        (**self).fetch_count()
    }

    fn mark_synced(&mut self, source_id: &str) -> Result<bool, SourceError> {
        (**self).mark_synced(source_id)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
