//! BioStar 2 directory client
//!
//! Login hands back a [`Session`]; every later call takes that session
//! explicitly. A session that has been logged out (or was never issued)
//! makes calls fail with [`RemoteError::AuthRequired`] before anything is
//! sent.

use crate::mapper::CanonicalClient;
use chrono::{DateTime, Utc};
use fitsync_common::config::{FaceEncodingKind, RemoteConfig};
use std::fmt;
use thiserror::Error;

pub mod client;
pub mod payload;

pub use client::BioStarClient;

/// BioStar client errors
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body was not the JSON we expected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP status >= 400, or a failure code inside a 2xx body
    #[error("BioStar API error {status}: {body}")]
    RemoteApi { status: u16, body: String },

    #[error("Not authenticated: a valid session is required")]
    AuthRequired,

    /// Login answered without a usable session header
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid remote configuration: {0}")]
    InvalidConfig(String),
}

impl RemoteError {
    /// Failures worth retrying at the orchestrator level
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// Operator login for the BioStar API
#[derive(Clone)]
pub struct Credentials {
    pub login_id: String,
    pub password: String,
}

impl Credentials {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            login_id: config.login_id.clone(),
            password: config.password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated BioStar session
///
/// Lives for one sync run and must be passed to [`DirectoryService::logout`]
/// on every exit path. There is no way to copy a session, so logging out
/// leaves no usable token behind:
///
/// ```compile_fail
/// let session = fitsync::biostar::Session::new("token");
/// let copy = session.clone();
/// ```
pub struct Session {
    token: Option<String>,
    issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            issued_at: Utc::now(),
        }
    }

    /// Session token, or `AuthRequired` once the session has been invalidated
    pub fn token(&self) -> Result<&str, RemoteError> {
        self.token.as_deref().ok_or(RemoteError::AuthRequired)
    }

    pub fn is_active(&self) -> bool {
        self.token.is_some()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Drop the token; the session is unusable afterwards
    pub fn invalidate(&mut self) -> Option<String> {
        self.token.take()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.is_active())
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// How the user ended up in BioStar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Created,
    /// The id already existed and the user was updated in place
    Updated,
}

/// User as written to BioStar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    /// BioStar `user_id`, equal to the client's numeric id
    pub remote_id: String,
    pub name: String,
    pub group_id: Option<u32>,
    pub disabled: bool,
    pub start_datetime: String,
    pub expiry_datetime: String,
    pub outcome: UserOutcome,
}

/// Remote directory operations the sync relies on
pub trait DirectoryService {
    /// Log in and return a fresh session
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, RemoteError>;

    /// Create the user, or update it when its id is already taken
    fn create_or_update_user(
        &self,
        session: &Session,
        client: &CanonicalClient,
    ) -> Result<RemoteUser, RemoteError>;

    /// Upload a face image; returns the encoding that was accepted
    fn attach_face(
        &self,
        session: &Session,
        remote_id: &str,
        photo: &[u8],
    ) -> Result<FaceEncodingKind, RemoteError>;

    /// Best-effort logout. Never fails; always invalidates `session`.
    fn logout(&self, session: &mut Session);
}

impl<T: DirectoryService + ?Sized> DirectoryService for &T {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, RemoteError> {
        (**self).authenticate(credentials)
    }

    fn create_or_update_user(
        &self,
        session: &Session,
        client: &CanonicalClient,
    ) -> Result<RemoteUser, RemoteError> {
        (**self).create_or_update_user(session, client)
    }

    fn attach_face(
        &self,
        session: &Session,
        remote_id: &str,
        photo: &[u8],
    ) -> Result<FaceEncodingKind, RemoteError> {
        (**self).attach_face(session, remote_id, photo)
    }

    fn logout(&self, session: &mut Session) {
        (**self).logout(session)
    }
}
