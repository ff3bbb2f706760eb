//! Sync orchestration
//!
//! One run = one session, one batch. Records are processed sequentially and
//! each record's failure only affects its own counters. Logout and source
//! close happen on every exit path once the run got that far, and the
//! summary is always logged.

use crate::biostar::{Credentials, DirectoryService, RemoteError, RemoteUser, Session};
use crate::mapper::{self, CanonicalClient};
use crate::photo::PhotoResolver;
use crate::source::{PhotoReference, RecordStore, SourceError, SourceRecord};
use fitsync_common::config::SyncConfig;
use fitsync_common::logging::log_section;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Failures that stop a run before or while fetching its batch
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records fetched in the batch
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Records still pending after the run, when the count query worked
    pub remaining: Option<u64>,
}

impl SyncStats {
    pub fn log_summary(&self) {
        log_section("SYNC SUMMARY");
        info!("Total processed: {}", self.total);
        info!("Success: {}", self.success);
        info!("Failed: {}", self.failed);
        info!("Skipped: {}", self.skipped);
        match self.remaining {
            Some(remaining) => info!("Remaining unsynced: {}", remaining),
            None => info!("Remaining unsynced: unknown"),
        }
    }
}

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Synced,
    Failed,
    Skipped,
}

/// Why a record is not sent at all
fn skip_reason(client: &CanonicalClient) -> Option<&'static str> {
    if client.numeric_id.is_empty() {
        Some("no numeric id in client code")
    } else if client.name.is_empty() {
        Some("empty name")
    } else {
        None
    }
}

/// Runs one sync pass from a [`RecordStore`] to a [`DirectoryService`]
pub struct SyncOrchestrator<S, D> {
    store: S,
    directory: D,
    photos: PhotoResolver,
    credentials: Credentials,
    config: SyncConfig,
}

impl<S: RecordStore, D: DirectoryService> SyncOrchestrator<S, D> {
    pub fn new(
        store: S,
        directory: D,
        photos: PhotoResolver,
        credentials: Credentials,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            directory,
            photos,
            credentials,
            config,
        }
    }

    /// Run one batch
    ///
    /// Returns the stats when the batch was processed, even if some records
    /// failed. Errors only for authentication or batch fetch failures.
    pub fn run(&mut self) -> Result<SyncStats, SyncError> {
        log_section("BIOSTAR SYNC STARTED");
        let mut stats = SyncStats::default();

        match self.store.fetch_count() {
            Ok(count) => info!("Unsynced records pending: {}", count),
            Err(e) => warn!("Could not count pending records: {}", e),
        }

        let result = self.run_session(&mut stats);

        stats.remaining = match self.store.fetch_count() {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Could not count remaining records: {}", e);
                None
            }
        };
        self.store.close();

        if let Err(e) = &result {
            error!("Sync aborted: {}", e);
        }
        stats.log_summary();
        result.map(|_| stats)
    }

    fn run_session(&mut self, stats: &mut SyncStats) -> Result<(), SyncError> {
        let mut session = self.directory.authenticate(&self.credentials)?;

        let result = self.process_batch(&session, stats);

        self.directory.logout(&mut session);
        result
    }

    fn process_batch(&mut self, session: &Session, stats: &mut SyncStats) -> Result<(), SyncError> {
        let records = self.store.fetch_unsynced_batch(self.config.batch_size)?;
        if records.is_empty() {
            info!("No unsynced records found");
            return Ok(());
        }

        info!("Processing {} records", records.len());
        for (index, record) in records.iter().enumerate() {
            stats.total += 1;
            info!(
                "[{}/{}] Processing client {}",
                index + 1,
                records.len(),
                record.raw_code
            );

            match self.process_record(session, record) {
                RecordOutcome::Synced => stats.success += 1,
                RecordOutcome::Failed => stats.failed += 1,
                RecordOutcome::Skipped => stats.skipped += 1,
            }
        }
        Ok(())
    }

    /// Push one record; never aborts the batch
    pub fn process_record(&mut self, session: &Session, record: &SourceRecord) -> RecordOutcome {
        let client = mapper::normalize(record);
        if let Some(reason) = skip_reason(&client) {
            warn!(code = %record.raw_code, "Skipping client: {}", reason);
            return RecordOutcome::Skipped;
        }

        let photo = self.photos.resolve(record);

        let user = match self.create_or_update(session, &client) {
            Ok(user) => user,
            Err(e) => {
                error!(code = %record.raw_code, "Failed to create/update user: {}", e);
                return RecordOutcome::Failed;
            }
        };

        let face_attached = match &photo {
            Some(bytes) => match self.directory.attach_face(session, &user.remote_id, bytes) {
                Ok(kind) => {
                    debug!(user_id = %user.remote_id, ?kind, "Face credential stored");
                    true
                }
                Err(e) => {
                    warn!(user_id = %user.remote_id, "Face not attached: {}", e);
                    false
                }
            },
            None => false,
        };

        if self.config.require_face && !face_attached {
            warn!(
                code = %record.raw_code,
                "Face credential required but missing, leaving record pending"
            );
            return RecordOutcome::Failed;
        }

        match self.store.mark_synced(&record.source_id) {
            Ok(true) => {
                info!(code = %record.raw_code, user_id = %user.remote_id, "Client synced");
                RecordOutcome::Synced
            }
            Ok(false) => {
                warn!(code = %record.raw_code, "Client pushed but no row was marked synced");
                RecordOutcome::Failed
            }
            Err(e) => {
                error!(code = %record.raw_code, "Failed to mark client synced: {}", e);
                RecordOutcome::Failed
            }
        }
    }

    fn create_or_update(
        &self,
        session: &Session,
        client: &CanonicalClient,
    ) -> Result<RemoteUser, RemoteError> {
        let attempts = self.config.user_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.directory.create_or_update_user(session, client) {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        user_id = %client.numeric_id,
                        attempt,
                        attempts,
                        "Transient error, retrying: {}",
                        e
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// A pending record as it would be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub code: String,
    pub client: CanonicalClient,
    pub has_photo: bool,
    pub skip_reason: Option<&'static str>,
}

/// Map the next batch without touching the remote directory or the flags
pub fn preview<S: RecordStore>(
    store: &mut S,
    photos: &PhotoResolver,
    limit: u32,
) -> Result<Vec<PreviewEntry>, SourceError> {
    let records = store.fetch_unsynced_batch(limit)?;

    Ok(records
        .iter()
        .map(|record| {
            let client = mapper::normalize(record);
            let has_photo = match &record.photo {
                PhotoReference::Missing => false,
                _ => photos.try_resolve(record).ok().flatten().is_some(),
            };
            PreviewEntry {
                code: record.raw_code.clone(),
                skip_reason: skip_reason(&client),
                client,
                has_photo,
            }
        })
        .collect())
}
