//! Field mapping from source rows to canonical clients
//!
//! Pure: no I/O, never filters. Records that end up with an empty id or
//! name are the orchestrator's to skip.

use crate::source::SourceRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// The client code holds no usable numeric id
    #[error("Could not extract numeric ID from code {code:?}")]
    ExtractionFailure { code: String },
}

/// Client record in the shape BioStar needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalClient {
    /// BioStar `user_id`; empty when extraction failed
    pub numeric_id: String,
    pub name: String,
    pub department: String,
    pub email: String,
    pub phone: String,
}

/// Numeric id embedded in a client code: first digit run, leading zeros stripped
///
/// `"AGAH000010"` → `"10"`. A code without digits, or whose first digit run
/// is all zeros, is an extraction failure.
pub fn extract_numeric_id(code: &str) -> Result<String, MappingError> {
    let digits = DIGIT_RUN
        .find(code)
        .map(|m| m.as_str().trim_start_matches('0'))
        .unwrap_or_default();

    if digits.is_empty() {
        return Err(MappingError::ExtractionFailure {
            code: code.to_string(),
        });
    }
    Ok(digits.to_string())
}

/// `trim(given + " " + family)`; either part may be empty
pub fn display_name(given: &str, family: &str) -> String {
    format!("{} {}", given.trim(), family.trim()).trim().to_string()
}

/// Map a source record to a canonical client
pub fn normalize(record: &SourceRecord) -> CanonicalClient {
    let numeric_id = match extract_numeric_id(&record.raw_code) {
        Ok(id) => id,
        Err(e) => {
            warn!("{}", e);
            String::new()
        }
    };

    CanonicalClient {
        numeric_id,
        name: display_name(&record.given_name, &record.family_name),
        department: record.department.trim().to_string(),
        email: record.email.trim().to_string(),
        phone: record.phone.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PhotoReference;

    fn record(code: &str, given: &str, family: &str) -> SourceRecord {
        SourceRecord {
            source_id: code.to_string(),
            raw_code: code.to_string(),
            given_name: given.to_string(),
            family_name: family.to_string(),
            department: " Golden Gym ".to_string(),
            email: "".to_string(),
            phone: "0600000000".to_string(),
            photo: PhotoReference::Missing,
            synced: false,
        }
    }

    #[test]
    fn test_extract_numeric_id_strips_leading_zeros() {
        assert_eq!(extract_numeric_id("AGAH000010").unwrap(), "10");
        assert_eq!(extract_numeric_id("WELF000440").unwrap(), "440");
        assert_eq!(extract_numeric_id("12345").unwrap(), "12345");
    }

    #[test]
    fn test_extract_numeric_id_uses_first_run_only() {
        assert_eq!(extract_numeric_id("AB0012CD99").unwrap(), "12");
    }

    #[test]
    fn test_extract_numeric_id_failures() {
        assert_eq!(
            extract_numeric_id("NODIGITS"),
            Err(MappingError::ExtractionFailure {
                code: "NODIGITS".to_string()
            })
        );
        assert!(extract_numeric_id("ABCD000000").is_err());
        assert!(extract_numeric_id("").is_err());
    }

    #[test]
    fn test_display_name_trims_outer_whitespace_only() {
        assert_eq!(display_name("Aziz", "Benbouhagga"), "Aziz Benbouhagga");
        assert_eq!(display_name(" Aziz ", ""), "Aziz");
        assert_eq!(display_name("", " Benbouhagga"), "Benbouhagga");
        assert_eq!(display_name("Jean  Luc", "Picard"), "Jean  Luc Picard");
        assert_eq!(display_name("", ""), "");
    }

    #[test]
    fn test_normalize() {
        let client = normalize(&record("AGAH000010", "Amine", "Alaoui"));
        assert_eq!(
            client,
            CanonicalClient {
                numeric_id: "10".to_string(),
                name: "Amine Alaoui".to_string(),
                department: "Golden Gym".to_string(),
                email: "".to_string(),
                phone: "0600000000".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_does_not_filter() {
        let client = normalize(&record("NOCODE", "", ""));
        assert!(client.numeric_id.is_empty());
        assert!(client.name.is_empty());
    }
}
