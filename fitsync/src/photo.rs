//! Photo resolution and validation
//!
//! A record's photo is either an inline blob or a file named after the client
//! code under `photos.base_path`. Either way the bytes must decode as a raster
//! image of at least `photos.min_dimension` pixels on each side. Encoding for
//! transport happens in the BioStar client, not here.

use crate::source::{PhotoReference, SourceRecord};
use fitsync_common::config::PhotoConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

static WINDOWS_ABSOLUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z]:[\\/]|\\\\)").expect("path pattern is valid"));

/// Photo validation errors
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Image file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Image {origin} is {size} bytes, limit is {limit}")]
    SizeExceeded { origin: String, size: u64, limit: u64 },

    #[error("Unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    #[error("Image {origin} is not a decodable raster image: {reason}")]
    NotAnImage { origin: String, reason: String },

    #[error("Image dimensions too small: {width}x{height} (minimum {min}x{min})")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("Failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Loads and validates client photos
#[derive(Debug, Clone)]
pub struct PhotoResolver {
    base_path: PathBuf,
    file_extension: String,
    allowed_formats: Vec<String>,
    max_size_bytes: u64,
    min_dimension: u32,
}

fn is_absolute_token(token: &str) -> bool {
    Path::new(token).is_absolute() || token.starts_with('/') || WINDOWS_ABSOLUTE.is_match(token)
}

impl PhotoResolver {
    pub fn new(config: &PhotoConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            file_extension: config.file_extension.trim_start_matches('.').to_string(),
            allowed_formats: config
                .allowed_formats
                .iter()
                .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_size_bytes: config.max_size_bytes(),
            min_dimension: config.min_dimension,
        }
    }

    /// Photo bytes for `record`, or `None` (with a warning) when there is no
    /// usable photo. Never fails the record.
    pub fn resolve(&self, record: &SourceRecord) -> Option<Vec<u8>> {
        match self.try_resolve(record) {
            Ok(Some(bytes)) => Some(bytes),
            Ok(None) => {
                warn!(code = %record.raw_code, "No photo available for client");
                None
            }
            Err(e) => {
                warn!(code = %record.raw_code, "Photo rejected: {}", e);
                None
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but reports why a photo was rejected
    pub fn try_resolve(&self, record: &SourceRecord) -> Result<Option<Vec<u8>>, PhotoError> {
        match &record.photo {
            PhotoReference::Missing => Ok(None),
            PhotoReference::Inline(bytes) => {
                self.check_size("inline blob", bytes.len() as u64)?;
                self.validate_image("inline blob", bytes)?;
                Ok(Some(bytes.clone()))
            }
            PhotoReference::FileToken(token) => {
                let path = self.photo_path(token);
                self.load_file(&path).map(Some)
            }
        }
    }

    /// File path for a photo token: absolute tokens are used as-is, anything
    /// else becomes `<base_path>/<token>.<extension>`
    pub fn photo_path(&self, token: &str) -> PathBuf {
        let token = token.trim();
        if is_absolute_token(token) {
            let path = PathBuf::from(token);
            if path.extension().is_some() {
                return path;
            }
            return PathBuf::from(format!("{}.{}", token, self.file_extension));
        }
        self.base_path
            .join(format!("{}.{}", token, self.file_extension))
    }

    fn check_size(&self, origin: &str, size: u64) -> Result<(), PhotoError> {
        if size > self.max_size_bytes {
            return Err(PhotoError::SizeExceeded {
                origin: origin.to_string(),
                size,
                limit: self.max_size_bytes,
            });
        }
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<Vec<u8>, PhotoError> {
        debug!(path = %path.display(), "Looking for photo file");

        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(PhotoError::NotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PhotoError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(PhotoError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let origin = path.display().to_string();
        self.check_size(&origin, metadata.len())?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.allowed_formats.contains(&extension) {
            return Err(PhotoError::UnsupportedFormat(extension));
        }

        let bytes = std::fs::read(path).map_err(|source| PhotoError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.validate_image(&origin, &bytes)?;

        info!(path = %origin, bytes = bytes.len(), "Photo loaded");
        Ok(bytes)
    }

    /// Decode `bytes` and enforce the minimum dimensions
    ///
    /// Returns the image size on success.
    pub fn validate_image(&self, origin: &str, bytes: &[u8]) -> Result<(u32, u32), PhotoError> {
        let not_an_image = |reason: String| PhotoError::NotAnImage {
            origin: origin.to_string(),
            reason,
        };

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| not_an_image(e.to_string()))?;
        if reader.format().is_none() {
            return Err(not_an_image("unrecognized format".to_string()));
        }
        let decoded = reader.decode().map_err(|e| not_an_image(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        if width < self.min_dimension || height < self.min_dimension {
            return Err(PhotoError::TooSmall {
                width,
                height,
                min: self.min_dimension,
            });
        }

        debug!(origin, width, height, "Photo validated");
        Ok((width, height))
    }
}
