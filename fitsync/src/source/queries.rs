//! SQL text for the club database layouts
//!
//! Table and column names come from configuration and are validated as plain
//! identifiers before they get here. Values (client codes) are always bound
//! as parameters.
//!
//! Two layouts are supported: Clients joined with Photos (export flag and
//! photo columns on Photos), and a single Clients table carrying everything.

use fitsync_common::config::{ColumnConfig, LimitStyle, SourceConfig, SourceLayout};

/// 1-based positions of the fixed selected columns
pub const COL_CODE: u16 = 1;
pub const COL_FIRST_NAME: u16 = 2;
pub const COL_LAST_NAME: u16 = 3;
pub const COL_DEPARTMENT: u16 = 4;
pub const COL_EMAIL: u16 = 5;
pub const COL_PHONE: u16 = 6;
pub const COL_SYNCED: u16 = 7;

/// Table layout of the source database
#[derive(Debug, Clone)]
pub struct SourceSchema {
    pub clients_table: String,
    pub photos_table: String,
    pub columns: ColumnConfig,
    pub limit_style: LimitStyle,
    pub layout: SourceLayout,
}

impl SourceSchema {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            clients_table: config.clients_table.clone(),
            photos_table: config.photos_table.clone(),
            columns: config.columns.clone(),
            limit_style: config.limit_style,
            layout: config.layout,
        }
    }

    /// Table holding the export flag and the photo columns
    pub fn flag_table(&self) -> &str {
        match self.layout {
            SourceLayout::Joined => &self.photos_table,
            SourceLayout::SingleTable => &self.clients_table,
        }
    }

    fn flag_alias(&self) -> &'static str {
        match self.layout {
            SourceLayout::Joined => "p.",
            SourceLayout::SingleTable => "c.",
        }
    }

    /// Position of the photo blob column, when selected
    pub fn photo_column(&self) -> Option<u16> {
        self.columns.photo.as_ref().map(|_| COL_SYNCED + 1)
    }

    /// Position of the photo path column, when selected
    pub fn photo_path_column(&self) -> Option<u16> {
        let after = self.photo_column().unwrap_or(COL_SYNCED);
        self.columns.photo_path.as_ref().map(|_| after + 1)
    }

    fn from_clause(&self) -> String {
        match self.layout {
            SourceLayout::Joined => format!(
                "{clients} c INNER JOIN {photos} p ON c.{code} = p.{code}",
                clients = self.clients_table,
                photos = self.photos_table,
                code = self.columns.code,
            ),
            SourceLayout::SingleTable => format!("{} c", self.clients_table),
        }
    }

    fn pending_predicate(&self, alias: &str) -> String {
        format!(
            "({a}{flag} = 0 OR {a}{flag} IS NULL)",
            a = alias,
            flag = self.columns.synced
        )
    }

    /// Pending records, ordered by code, capped at `limit`
    pub fn select_unsynced(&self, limit: u32) -> String {
        let c = &self.columns;
        let f = self.flag_alias();
        let mut projection = format!(
            "c.{}, c.{}, c.{}, c.{}, c.{}, c.{}, {}{}",
            c.code, c.first_name, c.last_name, c.department, c.email, c.phone, f, c.synced
        );
        if let Some(photo) = &c.photo {
            projection.push_str(&format!(", {}{}", f, photo));
        }
        if let Some(photo_path) = &c.photo_path {
            projection.push_str(&format!(", {}{}", f, photo_path));
        }

        let top = match self.limit_style {
            LimitStyle::Top => format!("TOP {} ", limit),
            LimitStyle::Limit => String::new(),
        };
        let tail = match self.limit_style {
            LimitStyle::Top => String::new(),
            LimitStyle::Limit => format!(" LIMIT {}", limit),
        };

        format!(
            "SELECT {top}{projection} FROM {tables} WHERE {pending} ORDER BY c.{code}{tail}",
            top = top,
            projection = projection,
            tables = self.from_clause(),
            pending = self.pending_predicate(f),
            code = c.code,
            tail = tail,
        )
    }

    pub fn count_unsynced(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            self.from_clause(),
            self.pending_predicate(self.flag_alias())
        )
    }

    /// Conditional single-row update; one `?` parameter (the client code)
    pub fn mark_synced(&self) -> String {
        format!(
            "UPDATE {table} SET {flag} = 1 WHERE {code} = ? AND {pending}",
            table = self.flag_table(),
            flag = self.columns.synced,
            code = self.columns.code,
            pending = self.pending_predicate(""),
        )
    }

    /// Cheap query proving the connection and the Clients table are usable
    ///
    /// HFSQL rejects `SELECT 1`, so this reads one real row.
    pub fn probe(&self) -> String {
        match self.limit_style {
            LimitStyle::Top => format!("SELECT TOP 1 * FROM {}", self.clients_table),
            LimitStyle::Limit => format!("SELECT * FROM {} LIMIT 1", self.clients_table),
        }
    }
}
