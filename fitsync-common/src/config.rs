//! Configuration loading and config file resolution
//!
//! The configuration is a single TOML file with one table per component:
//!
//! ```toml
//! [source]
//! connection_string = "Driver={HFSQL};Server=127.0.0.1;Port=4900;Database=GOLDENGYM"
//!
//! [remote]
//! base_url = "https://biostar.local/api"
//! login_id = "admin"
//! password = "secret"
//!
//! [photos]
//! base_path = "C:/tmp"
//! ```
//!
//! Everything except the connection string and remote credentials has a
//! built-in default.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FITSYNC_CONFIG";
/// Overrides `source.password`
pub const SOURCE_PASSWORD_ENV_VAR: &str = "FITSYNC_SOURCE_PASSWORD";
/// Overrides `remote.password`
pub const REMOTE_PASSWORD_ENV_VAR: &str = "FITSYNC_REMOTE_PASSWORD";
/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "fitsync.toml";

static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Complete application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Legacy database (ODBC) settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// ODBC connection string or DSN (`DSN=Opera_Fitness_DSN`)
    pub connection_string: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_clients_table")]
    pub clients_table: String,

    #[serde(default = "default_photos_table")]
    pub photos_table: String,

    /// Row cap syntax understood by the driver
    #[serde(default)]
    pub limit_style: LimitStyle,

    /// Where client rows and the export flag live
    #[serde(default)]
    pub layout: SourceLayout,

    #[serde(default)]
    pub columns: ColumnConfig,
}

/// Row cap syntax: `SELECT TOP n` (HFSQL, SQL Server) or trailing `LIMIT n`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStyle {
    #[default]
    Top,
    Limit,
}

/// Table layout of the club database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayout {
    /// Clients joined with Photos on the code; the export flag is on Photos
    #[default]
    Joined,
    /// Clients only; the export flag and photo columns are on Clients
    SingleTable,
}

/// Column names of the Clients / Photos tables
///
/// Defaults match the Opera Fitness schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnConfig {
    /// Client code, shared key of both tables (e.g. `AGAH000010`)
    #[serde(default = "default_code_column")]
    pub code: String,
    #[serde(default = "default_first_name_column")]
    pub first_name: String,
    #[serde(default = "default_last_name_column")]
    pub last_name: String,
    #[serde(default = "default_department_column")]
    pub department: String,
    #[serde(default = "default_email_column")]
    pub email: String,
    #[serde(default = "default_phone_column")]
    pub phone: String,
    /// Export flag (0/NULL = pending, 1 = synced), on Photos for the joined
    /// layout and on Clients for the single-table one
    #[serde(default = "default_synced_column")]
    pub synced: String,
    /// Photo blob column, on the table that holds the export flag. When
    /// unset, photos are read from `photos.base_path`.
    #[serde(default)]
    pub photo: Option<String>,
    /// Column holding the photo file name stem or an absolute path. Takes
    /// the place of the client code when looking up photo files.
    #[serde(default)]
    pub photo_path: Option<String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            code: default_code_column(),
            first_name: default_first_name_column(),
            last_name: default_last_name_column(),
            department: default_department_column(),
            email: default_email_column(),
            phone: default_phone_column(),
            synced: default_synced_column(),
            photo: None,
            photo_path: None,
        }
    }
}

/// Face credential payload conventions understood by BioStar 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceEncodingKind {
    /// `PUT /users/{id}` with `credentials.visualFaces[].template_ex_picture`
    VisualFace,
    /// `PUT /users/{id}` with `credentials.faces[].raw_image`
    RawFace,
    /// `POST /users/{id}/credentials/faces` with `FaceCredential.raw_image`
    FaceEndpoint,
}

/// BioStar 2 REST API settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// API root, e.g. `https://biostar.local/api`
    pub base_url: String,
    pub login_id: String,
    pub password: String,

    /// Response/request header carrying the session token
    #[serde(default = "default_session_header")]
    pub session_header: String,

    /// Set to false for self-signed BioStar certificates
    #[serde(default = "default_true")]
    pub ssl_verify: bool,

    /// Request timeout; transport default when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub user_group_id: Option<u32>,

    #[serde(default)]
    pub access_groups: Vec<u32>,

    #[serde(default = "default_start_datetime")]
    pub start_datetime: String,

    #[serde(default = "default_expiry_datetime")]
    pub expiry_datetime: String,

    /// Face upload conventions, tried in order
    #[serde(default = "default_face_encodings")]
    pub face_encodings: Vec<FaceEncodingKind>,

    /// `Response.code` returned when the user id is already taken
    #[serde(default = "default_already_exists_code")]
    pub already_exists_code: String,

    /// Send the client's club as the BioStar `department` field
    #[serde(default)]
    pub send_department: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_id: String::new(),
            password: String::new(),
            session_header: default_session_header(),
            ssl_verify: true,
            timeout_secs: None,
            user_group_id: None,
            access_groups: Vec::new(),
            start_datetime: default_start_datetime(),
            expiry_datetime: default_expiry_datetime(),
            face_encodings: default_face_encodings(),
            already_exists_code: default_already_exists_code(),
            send_department: false,
        }
    }
}

/// Photo lookup and validation settings
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Extension appended to the client code to build the file name
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    #[serde(default = "default_allowed_formats")]
    pub allowed_formats: Vec<String>,

    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Minimum width and height in pixels
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            file_extension: default_file_extension(),
            allowed_formats: default_allowed_formats(),
            max_size_mb: default_max_size_mb(),
            min_dimension: default_min_dimension(),
        }
    }
}

impl PhotoConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Sync run settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Records processed per run
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Only mark a record synced when its face upload succeeded
    #[serde(default)]
    pub require_face: bool,

    /// Attempts for the user create/update step (transport errors only)
    #[serde(default = "default_user_attempts")]
    pub user_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            require_face: false,
            user_attempts: default_user_attempts(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files (stdout only if not specified)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_clients_table() -> String {
    "Clients".to_string()
}

fn default_photos_table() -> String {
    "Photos".to_string()
}

fn default_code_column() -> String {
    "code".to_string()
}

fn default_first_name_column() -> String {
    "prenom".to_string()
}

fn default_last_name_column() -> String {
    "nom".to_string()
}

fn default_department_column() -> String {
    "club".to_string()
}

fn default_email_column() -> String {
    "email".to_string()
}

fn default_phone_column() -> String {
    "tel2".to_string()
}

fn default_synced_column() -> String {
    "exporte".to_string()
}

fn default_session_header() -> String {
    "bs-session-id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_start_datetime() -> String {
    "2001-01-01T00:00:00.00Z".to_string()
}

fn default_expiry_datetime() -> String {
    "2030-12-31T23:59:00.00Z".to_string()
}

fn default_face_encodings() -> Vec<FaceEncodingKind> {
    vec![
        FaceEncodingKind::VisualFace,
        FaceEncodingKind::RawFace,
        FaceEncodingKind::FaceEndpoint,
    ]
}

fn default_already_exists_code() -> String {
    "202".to_string()
}

fn default_base_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_extension() -> String {
    "jpeg".to_string()
}

fn default_allowed_formats() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

fn default_max_size_mb() -> u64 {
    5
}

fn default_min_dimension() -> u32 {
    100
}

fn default_batch_size() -> u32 {
    10
}

fn default_user_attempts() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace secrets with values from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(SOURCE_PASSWORD_ENV_VAR) {
            self.source.password = Some(password);
        }
        if let Ok(password) = std::env::var(REMOTE_PASSWORD_ENV_VAR) {
            self.remote.password = password;
        }
    }

    /// Check values that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.source.connection_string.trim().is_empty() {
            return Err(Error::Config("source.connection_string is empty".to_string()));
        }

        let columns = &self.source.columns;
        let mut identifiers = vec![
            ("source.clients_table", self.source.clients_table.as_str()),
            ("source.photos_table", self.source.photos_table.as_str()),
            ("source.columns.code", columns.code.as_str()),
            ("source.columns.first_name", columns.first_name.as_str()),
            ("source.columns.last_name", columns.last_name.as_str()),
            ("source.columns.department", columns.department.as_str()),
            ("source.columns.email", columns.email.as_str()),
            ("source.columns.phone", columns.phone.as_str()),
            ("source.columns.synced", columns.synced.as_str()),
        ];
        if let Some(photo) = &columns.photo {
            identifiers.push(("source.columns.photo", photo.as_str()));
        }
        if let Some(photo_path) = &columns.photo_path {
            identifiers.push(("source.columns.photo_path", photo_path.as_str()));
        }
        for (key, value) in identifiers {
            if !is_sql_identifier(value) {
                return Err(Error::Config(format!(
                    "{} must be a plain SQL identifier, got {:?}",
                    key, value
                )));
            }
        }

        let base_url = self.remote.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "remote.base_url must be an http(s) URL, got {:?}",
                self.remote.base_url
            )));
        }
        if self.remote.login_id.trim().is_empty() {
            return Err(Error::Config("remote.login_id is empty".to_string()));
        }
        if self.remote.session_header.trim().is_empty() {
            return Err(Error::Config("remote.session_header is empty".to_string()));
        }
        if self.remote.face_encodings.is_empty() {
            return Err(Error::Config(
                "remote.face_encodings must list at least one encoding".to_string(),
            ));
        }

        if self.photos.allowed_formats.is_empty() {
            return Err(Error::Config("photos.allowed_formats is empty".to_string()));
        }
        let extension = self.photos.file_extension.trim_start_matches('.');
        if !self
            .photos
            .allowed_formats
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(extension))
        {
            return Err(Error::Config(format!(
                "photos.file_extension {:?} is not in photos.allowed_formats {:?}",
                self.photos.file_extension, self.photos.allowed_formats
            )));
        }
        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be at least 1".to_string()));
        }
        if self.sync.user_attempts == 0 {
            return Err(Error::Config("sync.user_attempts must be at least 1".to_string()));
        }

        Ok(())
    }
}

impl SourceConfig {
    /// Connection string with `UID`/`PWD` appended when credentials are configured
    pub fn odbc_connection_string(&self) -> String {
        let mut conn = self.connection_string.trim().trim_end_matches(';').to_string();
        if let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) {
            conn.push_str(&format!(";UID={}", user));
        }
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            conn.push_str(&format!(";PWD={}", password));
        }
        conn
    }
}

/// True when `name` can be spliced into SQL as a table or column name
pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

/// Config file resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `FITSYNC_CONFIG` environment variable
/// 3. `fitsync.toml` in the working directory
/// 4. `<user config dir>/fitsync/config.toml`
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Working directory
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    // Priority 4: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("fitsync").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(Error::Config(format!(
            "No config file found (tried --config, {}, ./{}, {})",
            CONFIG_ENV_VAR,
            LOCAL_CONFIG_FILE,
            path.display()
        ))),
        None => Err(Error::Config(
            "Could not determine config directory".to_string(),
        )),
    }
}
