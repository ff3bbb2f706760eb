//! fitsync - Opera Fitness to BioStar 2 client sync
//!
//! Reads pending clients from the club database over ODBC, pushes them as
//! BioStar users (with their face photo when one is usable) and marks them
//! exported.

pub mod biostar;
pub mod mapper;
pub mod photo;
pub mod source;
pub mod sync;

pub use sync::{SyncError, SyncOrchestrator, SyncStats};
