//! SQLite-backed [`RecordStore`].
//!
//! One table per document type, keyed by the hashed identifier. The primary
//! key is the uniqueness backstop for concurrent registrations of the same
//! identifier.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use ekyc_core::{
    ConfigError, DocumentDetails, DocumentType, Embedding, FieldValue, IdentityKey, IdentityRecord,
    RecordStore, StoreError, TableNames,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum SqliteStoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid table configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Column holding the document-specific field.
fn detail_column(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Pan => "father_name",
        DocumentType::Aadhar => "gender",
    }
}

pub struct SqliteRecordStore {
    conn: Connection,
    tables: TableNames,
}

impl SqliteRecordStore {
    /// Open or create the database at `path` and ensure both tables exist.
    pub fn open(path: impl AsRef<Path>, tables: TableNames) -> Result<Self, SqliteStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::with_connection(Connection::open(path)?, tables)?;
        tracing::info!(path = %path.display(), "record store opened");
        Ok(store)
    }

    pub fn open_in_memory(tables: TableNames) -> Result<Self, SqliteStoreError> {
        Self::with_connection(Connection::open_in_memory()?, tables)
    }

    fn with_connection(conn: Connection, tables: TableNames) -> Result<Self, SqliteStoreError> {
        tables.validate()?;
        for doc_type in [DocumentType::Pan, DocumentType::Aadhar] {
            let table = tables.for_document(doc_type);
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT,
                    {detail} TEXT,
                    dob TEXT,
                    id_type TEXT NOT NULL,
                    embedding TEXT,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                );",
                detail = detail_column(doc_type),
            ))?;
            tracing::debug!(table, "table ready");
        }
        Ok(Self { conn, tables })
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        self.document_type(table)?;
        let rows: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(rows.max(0) as usize)
    }

    fn document_type(&self, table: &str) -> Result<DocumentType, StoreError> {
        self.tables
            .document_for(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

/// Columns as stored, before validation.
struct StoredRow {
    id: String,
    name: Option<String>,
    detail: Option<String>,
    dob: Option<String>,
    id_type: String,
    embedding: Option<String>,
    created_at: String,
}

impl StoredRow {
    fn into_record(self, doc_type: DocumentType) -> Result<IdentityRecord, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            key: self.id.clone(),
            message,
        };

        if self.id_type != doc_type.as_str() {
            return Err(corrupt(format!(
                "id_type {} in {doc_type} table",
                self.id_type
            )));
        }

        let dob = self
            .dob
            .as_deref()
            .map(|s| NaiveDate::parse_from_str(s, DATE_FORMAT))
            .transpose()
            .map_err(|e| corrupt(format!("dob: {e}")))?;

        let embedding = self
            .embedding
            .as_deref()
            .map(serde_json::from_str::<Embedding>)
            .transpose()
            .map_err(|e| corrupt(format!("embedding: {e}")))?;

        let created_at = NaiveDateTime::parse_from_str(&self.created_at, TIMESTAMP_FORMAT)
            .map_err(|e| corrupt(format!("created_at: {e}")))?;

        let detail = FieldValue::from(self.detail);
        let details = match doc_type {
            DocumentType::Pan => DocumentDetails::Pan { father_name: detail },
            DocumentType::Aadhar => DocumentDetails::Aadhar { gender: detail },
        };

        Ok(IdentityRecord {
            id: IdentityKey::from_hex(self.id),
            name: FieldValue::from(self.name),
            dob,
            embedding,
            details,
            created_at: Some(created_at),
        })
    }
}

fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Unavailable(Box::new(err))
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, table: &str, key: &IdentityKey) -> Result<Option<IdentityRecord>, StoreError> {
        let doc_type = self.document_type(table)?;
        let sql = format!(
            "SELECT id, name, {detail}, dob, id_type, embedding, created_at
             FROM {table} WHERE id = ?1",
            detail = detail_column(doc_type),
        );

        let row = self
            .conn
            .query_row(&sql, params![key.as_str()], |row| {
                Ok(StoredRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    detail: row.get(2)?,
                    dob: row.get(3)?,
                    id_type: row.get(4)?,
                    embedding: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .optional()
            .map_err(unavailable)?;

        tracing::debug!(table, key = %key, found = row.is_some(), "record lookup");
        row.map(|r| r.into_record(doc_type)).transpose()
    }

    fn insert(&mut self, table: &str, record: &IdentityRecord) -> Result<(), StoreError> {
        let doc_type = self.document_type(table)?;
        if record.id_type() != doc_type {
            return Err(StoreError::WrongTable {
                table: table.to_string(),
                doc_type: record.id_type(),
            });
        }

        let detail = match &record.details {
            DocumentDetails::Pan { father_name } => father_name.as_deref(),
            DocumentDetails::Aadhar { gender } => gender.as_deref(),
        };
        let embedding = record
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(unavailable)?;
        let dob = record.dob.map(|d| d.format(DATE_FORMAT).to_string());

        let sql = format!(
            "INSERT INTO {table} (id, name, {detail_col}, dob, id_type, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            detail_col = detail_column(doc_type),
        );
        let result = self.conn.execute(
            &sql,
            params![
                record.id.as_str(),
                record.name.as_deref(),
                detail,
                dob,
                doc_type.as_str(),
                embedding,
            ],
        );

        match result {
            Ok(_) => {
                tracing::info!(table, key = %record.id, "record inserted");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                tracing::warn!(table, key = %record.id, "insert rejected by primary key");
                Err(StoreError::UniquenessViolation(record.id.clone()))
            }
            Err(err) => {
                tracing::error!(table, error = %err, "insert failed");
                Err(unavailable(err))
            }
        }
    }
}
