//! Record store seam and the duplicate guard built on it.

use thiserror::Error;

use crate::config::TableNames;
use crate::identity::IdentityKey;
use crate::types::{DocumentType, DuplicateCheckResult, IdentityRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("record {0} already exists")]
    UniquenessViolation(IdentityKey),
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("{doc_type} record cannot be stored in table '{table}'")]
    WrongTable { table: String, doc_type: DocumentType },
    #[error("stored record {key} is invalid: {message}")]
    Corrupt { key: String, message: String },
}

/// Key-addressable record storage, one table per document type.
///
/// `insert` must enforce primary-key uniqueness itself and report a clash as
/// [`StoreError::UniquenessViolation`]; the duplicate check before it is not
/// atomic with the insert.
pub trait RecordStore {
    fn get(&self, table: &str, key: &IdentityKey) -> Result<Option<IdentityRecord>, StoreError>;
    fn insert(&mut self, table: &str, record: &IdentityRecord) -> Result<(), StoreError>;
}

/// Exact-key duplicate detection. No fuzzy or embedding-based matching.
pub struct DuplicateGuard<'a> {
    tables: &'a TableNames,
}

impl<'a> DuplicateGuard<'a> {
    pub fn new(tables: &'a TableNames) -> Self {
        Self { tables }
    }

    pub fn check<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        key: &IdentityKey,
        doc_type: DocumentType,
    ) -> Result<DuplicateCheckResult, StoreError> {
        let table = self.tables.for_document(doc_type);
        let result = DuplicateCheckResult::from(store.get(table, key)?);

        if result.exists {
            tracing::info!(table, key = %key, "duplicate record found");
        } else {
            tracing::debug!(table, key = %key, "no duplicate found");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, MemoryStore};

    #[test]
    fn test_check_reports_existing_record() {
        let tables = TableNames::default();
        let mut store = MemoryStore::default();
        let existing = record("ABCDE1234F", DocumentType::Pan);
        store.insert("users", &existing).unwrap();

        let result = DuplicateGuard::new(&tables)
            .check(&store, &existing.id, DocumentType::Pan)
            .unwrap();
        assert!(result.exists);
        assert_eq!(result.existing_record.as_ref(), Some(&existing));
    }

    #[test]
    fn test_check_uses_table_of_document_type() {
        let tables = TableNames::default();
        let mut store = MemoryStore::default();
        let pan = record("123456789012", DocumentType::Pan);
        store.insert("users", &pan).unwrap();

        // Same key, other document type: not a duplicate.
        let result = DuplicateGuard::new(&tables)
            .check(&store, &pan.id, DocumentType::Aadhar)
            .unwrap();
        assert!(!result.exists);
        assert!(result.existing_record.is_none());
        assert_eq!(store.gets.get(), 1);
    }

    #[test]
    fn test_check_propagates_store_failure() {
        let tables = TableNames::default();
        let store = MemoryStore::unavailable();
        let key = record("X", DocumentType::Pan).id;
        let err = DuplicateGuard::new(&tables)
            .check(&store, &key, DocumentType::Pan)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
