//! ODBC-backed record store (HFSQL / Opera Fitness)

use super::queries::{
    SourceSchema, COL_CODE, COL_DEPARTMENT, COL_EMAIL, COL_FIRST_NAME, COL_LAST_NAME, COL_PHONE,
    COL_SYNCED,
};
use super::{PhotoReference, RecordStore, SourceError, SourceRecord};
use fitsync_common::config::SourceConfig;
use odbc_api::{Connection, ConnectionOptions, Cursor, CursorRow, Environment, IntoParameter};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

static ODBC_ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

fn environment() -> Result<&'static Environment, SourceError> {
    ODBC_ENVIRONMENT
        .get_or_try_init(Environment::new)
        .map_err(|e| SourceError::Connection(format!("ODBC environment unavailable: {}", e)))
}

fn query_error(e: odbc_api::Error) -> SourceError {
    SourceError::Query(e.to_string())
}

/// Column values of one selected row, before interpretation
#[derive(Debug, Default, Clone)]
pub struct RawRow {
    pub code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub synced: Option<String>,
    pub photo: Option<Vec<u8>>,
    pub photo_path: Option<String>,
}

impl RawRow {
    /// NULL text becomes an empty string. Photo lookup order: non-empty
    /// blob, then the photo path column, then the code-named file.
    pub fn into_record(self) -> SourceRecord {
        let source_id = self.code.unwrap_or_default();
        let raw_code = source_id.trim().to_string();
        let photo_path = self
            .photo_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let photo = match (self.photo, photo_path) {
            (Some(bytes), _) if !bytes.is_empty() => PhotoReference::Inline(bytes),
            (_, Some(path)) => PhotoReference::FileToken(path),
            _ if !raw_code.is_empty() => PhotoReference::FileToken(raw_code.clone()),
            _ => PhotoReference::Missing,
        };

        SourceRecord {
            source_id,
            raw_code,
            given_name: self.first_name.unwrap_or_default(),
            family_name: self.last_name.unwrap_or_default(),
            department: self.department.unwrap_or_default().trim().to_string(),
            email: self.email.unwrap_or_default().trim().to_string(),
            phone: self.phone.unwrap_or_default().trim().to_string(),
            photo,
            synced: parse_flag(self.synced.as_deref()),
        }
    }
}

/// Interpret the export flag column (NULL, 0 → false)
pub fn parse_flag(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(v) => match v.parse::<f64>() {
            Ok(n) => n != 0.0,
            Err(_) => v.eq_ignore_ascii_case("true"),
        },
    }
}

fn read_text(
    row: &mut CursorRow<'_>,
    col: u16,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, SourceError> {
    buf.clear();
    let not_null = row.get_text(col, buf).map_err(query_error)?;
    Ok(not_null.then(|| String::from_utf8_lossy(buf).into_owned()))
}

fn read_binary(
    row: &mut CursorRow<'_>,
    col: u16,
    buf: &mut Vec<u8>,
) -> Result<Option<Vec<u8>>, SourceError> {
    buf.clear();
    let not_null = row.get_binary(col, buf).map_err(query_error)?;
    Ok(not_null.then(|| buf.clone()))
}

/// Record store over a single ODBC connection
pub struct OdbcRecordStore {
    connection: Option<Connection<'static>>,
    schema: SourceSchema,
}

impl OdbcRecordStore {
    /// Open the ODBC session described by `config`
    pub fn connect(config: &SourceConfig) -> Result<Self, SourceError> {
        let env = environment()?;
        info!("Connecting to source database...");

        let connection = env
            .connect_with_connection_string(
                &config.odbc_connection_string(),
                ConnectionOptions::default(),
            )
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        info!("Connected to source database");
        Ok(Self {
            connection: Some(connection),
            schema: SourceSchema::from_config(config),
        })
    }

    fn connection(&self) -> Result<&Connection<'static>, SourceError> {
        self.connection
            .as_ref()
            .ok_or_else(|| SourceError::Connection("connection already closed".to_string()))
    }

    /// Run the probe query; fails if the Clients table cannot be read
    pub fn probe(&self) -> Result<(), SourceError> {
        let sql = self.schema.probe();
        debug!(sql = %sql, "Probing source database");
        self.connection()?.execute(&sql, ()).map_err(query_error)?;
        Ok(())
    }
}

impl RecordStore for OdbcRecordStore {
    fn fetch_unsynced_batch(&mut self, limit: u32) -> Result<Vec<SourceRecord>, SourceError> {
        let sql = self.schema.select_unsynced(limit);
        let photo_column = self.schema.photo_column();
        let photo_path_column = self.schema.photo_path_column();
        debug!(sql = %sql, "Fetching unsynced records");

        let mut cursor = match self.connection()?.execute(&sql, ()).map_err(query_error)? {
            Some(cursor) => cursor,
            None => {
                return Err(SourceError::Query(
                    "SELECT produced no result set".to_string(),
                ))
            }
        };

        let mut records = Vec::new();
        let mut text = Vec::new();
        let mut blob = Vec::new();
        while let Some(mut row) = cursor.next_row().map_err(query_error)? {
            let raw = RawRow {
                code: read_text(&mut row, COL_CODE, &mut text)?,
                first_name: read_text(&mut row, COL_FIRST_NAME, &mut text)?,
                last_name: read_text(&mut row, COL_LAST_NAME, &mut text)?,
                department: read_text(&mut row, COL_DEPARTMENT, &mut text)?,
                email: read_text(&mut row, COL_EMAIL, &mut text)?,
                phone: read_text(&mut row, COL_PHONE, &mut text)?,
                synced: read_text(&mut row, COL_SYNCED, &mut text)?,
                photo: match photo_column {
                    Some(col) => read_binary(&mut row, col, &mut blob)?,
                    None => None,
                },
                photo_path: match photo_path_column {
                    Some(col) => read_text(&mut row, col, &mut text)?,
                    None => None,
                },
            };
            records.push(raw.into_record());
        }

        info!(count = records.len(), limit, "Fetched unsynced records");
        Ok(records)
    }

    fn fetch_count(&mut self) -> Result<u64, SourceError> {
        let sql = self.schema.count_unsynced();
        let mut cursor = match self.connection()?.execute(&sql, ()).map_err(query_error)? {
            Some(cursor) => cursor,
            None => return Err(SourceError::Query("COUNT produced no result set".to_string())),
        };

        let mut text = Vec::new();
        let count = match cursor.next_row().map_err(query_error)? {
            Some(mut row) => read_text(&mut row, 1, &mut text)?,
            None => None,
        };

        match count {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|e| SourceError::Query(format!("Invalid count {:?}: {}", value, e))),
            None => Ok(0),
        }
    }

    fn mark_synced(&mut self, source_id: &str) -> Result<bool, SourceError> {
        let sql = self.schema.mark_synced();
        let param = source_id.into_parameter();

        let mut statement = self.connection()?.preallocate().map_err(query_error)?;
        statement.execute(&sql, &param).map_err(query_error)?;
        let affected = statement.row_count().map_err(query_error)?.unwrap_or(0);

        if affected > 0 {
            info!(code = %source_id.trim(), "Marked record as synced");
            Ok(true)
        } else {
            warn!(code = %source_id.trim(), "No pending row updated when marking synced");
            Ok(false)
        }
    }

    fn close(&mut self) {
        if self.connection.take().is_some() {
            info!("Source connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag(None));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(Some(" 0.0 ")));
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("TRUE")));
        assert!(!parse_flag(Some("no")));
    }

    #[test]
    fn test_raw_row_defaults_nulls_to_empty() {
        let record = RawRow {
            code: Some("AGAH000010 ".to_string()),
            first_name: Some("Amine".to_string()),
            ..Default::default()
        }
        .into_record();

        assert_eq!(record.source_id, "AGAH000010 ");
        assert_eq!(record.raw_code, "AGAH000010");
        assert_eq!(record.family_name, "");
        assert_eq!(record.email, "");
        assert!(!record.synced);
        assert_eq!(
            record.photo,
            PhotoReference::FileToken("AGAH000010".to_string())
        );
    }

    #[test]
    fn test_raw_row_prefers_inline_blob() {
        let record = RawRow {
            code: Some("WELF000440".to_string()),
            photo: Some(vec![0xFF, 0xD8, 0xFF]),
            synced: Some("0".to_string()),
            ..Default::default()
        }
        .into_record();

        assert_eq!(record.photo, PhotoReference::Inline(vec![0xFF, 0xD8, 0xFF]));
    }

    #[test]
    fn test_raw_row_empty_blob_and_code_is_missing_photo() {
        let record = RawRow {
            photo: Some(Vec::new()),
            ..Default::default()
        }
        .into_record();

        assert_eq!(record.photo, PhotoReference::Missing);
    }

    #[test]
    fn test_raw_row_photo_path_becomes_file_token() {
        let record = RawRow {
            code: Some("WELF000440".to_string()),
            photo_path: Some(" C:/photos/clients/440.jpg ".to_string()),
            ..Default::default()
        }
        .into_record();

        assert_eq!(
            record.photo,
            PhotoReference::FileToken("C:/photos/clients/440.jpg".to_string())
        );
    }

    #[test]
    fn test_raw_row_blank_photo_path_falls_back_to_code() {
        let record = RawRow {
            code: Some("WELF000440".to_string()),
            photo_path: Some("   ".to_string()),
            ..Default::default()
        }
        .into_record();

        assert_eq!(
            record.photo,
            PhotoReference::FileToken("WELF000440".to_string())
        );
    }
}
