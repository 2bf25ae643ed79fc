//! Catalog — registry of tables, indexes and sequences.
//!
//! The persisted form lives in the `__docql_catalog` system table, one row
//! per object carrying its `CREATE` statement. Each transaction works on its
//! own copy of the in-memory view; a writable commit publishes it.
//!
//! ```text
//! __docql_catalog   name, type, sql, store_name, owner, docid_sequence_name
//! __docql_sequence  name, seq (lease of every sequence)
//! ```

pub mod ddl;
pub mod info;
pub mod sequence;
pub(crate) mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use info::{FieldConstraint, IndexInfo, Owner, SequenceInfo, TableConstraint, TableInfo};
pub use sequence::Sequence;

use crate::encoding::varint::uvarint;
use crate::error::{DocqlError, DocqlResult};
use crate::value::{Path, ValueType};

pub const INTERNAL_PREFIX: &str = "__docql_";
pub const CATALOG_TABLE: &str = "__docql_catalog";
pub const SEQUENCE_TABLE: &str = "__docql_sequence";
/// Sequence generating store names.
pub const STORE_SEQUENCE: &str = "__docql_store_seq";

pub(crate) const CATALOG_STORE: &[u8] = b"__docql_catalog";
pub(crate) const SEQUENCE_STORE: &[u8] = b"__docql_sequence";

/// Kind discriminator stored in the `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    Index,
    Sequence,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::Index => "index",
            ObjectKind::Sequence => "sequence",
        }
    }
}

/// In-memory catalog view.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<TableInfo>>,
    indexes: BTreeMap<String, Arc<IndexInfo>>,
    sequences: BTreeMap<String, Sequence>,
}

impl Catalog {
    /// Empty catalog holding only the two system tables.
    pub fn with_system_tables() -> Self {
        let mut catalog = Catalog::default();
        catalog.put_table(catalog_table_info());
        catalog.put_table(sequence_table_info());
        catalog
    }

    // ════════════════════════════════════════
    // Lookups
    // ════════════════════════════════════════

    pub fn get_table(&self, name: &str) -> DocqlResult<Arc<TableInfo>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| DocqlError::TableNotFound(name.to_string()))
    }

    pub fn get_index(&self, name: &str) -> DocqlResult<Arc<IndexInfo>> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| DocqlError::IndexNotFound(name.to_string()))
    }

    pub fn get_sequence(&self, name: &str) -> DocqlResult<&Sequence> {
        self.sequences
            .get(name)
            .ok_or_else(|| DocqlError::SequenceNotFound(name.to_string()))
    }

    pub fn get_sequence_mut(&mut self, name: &str) -> DocqlResult<&mut Sequence> {
        self.sequences
            .get_mut(name)
            .ok_or_else(|| DocqlError::SequenceNotFound(name.to_string()))
    }

    /// Indexes of `table` in creation order.
    pub fn table_indexes(&self, table: &str) -> Vec<Arc<IndexInfo>> {
        let mut out: Vec<_> = self
            .indexes
            .values()
            .filter(|i| i.table_name == table)
            .cloned()
            .collect();
        out.sort_by_key(|i| store_ordinal(&i.store_name));
        out
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub fn list_sequences(&self) -> Vec<String> {
        self.sequences.keys().cloned().collect()
    }

    /// Kind of the object named `name`, if any.
    pub fn kind_of(&self, name: &str) -> Option<ObjectKind> {
        if self.tables.contains_key(name) {
            Some(ObjectKind::Table)
        } else if self.indexes.contains_key(name) {
            Some(ObjectKind::Index)
        } else if self.sequences.contains_key(name) {
            Some(ObjectKind::Sequence)
        } else {
            None
        }
    }

    /// Fails when `name` is taken; the error names the kind being created
    /// when the clash is with an object of the same kind.
    pub fn ensure_free(&self, name: &str, creating: ObjectKind) -> DocqlResult<()> {
        match self.kind_of(name) {
            None => Ok(()),
            Some(k) if k == creating => Err(match k {
                ObjectKind::Table => DocqlError::TableAlreadyExists(name.to_string()),
                ObjectKind::Index => DocqlError::IndexAlreadyExists(name.to_string()),
                ObjectKind::Sequence => DocqlError::SequenceAlreadyExists(name.to_string()),
            }),
            Some(_) => Err(DocqlError::AlreadyExists(name.to_string())),
        }
    }

    // ════════════════════════════════════════
    // In-memory mutations (persistence lives in `ddl`)
    // ════════════════════════════════════════

    pub(crate) fn put_table(&mut self, info: TableInfo) {
        self.tables.insert(info.name.clone(), Arc::new(info));
    }

    pub(crate) fn remove_table(&mut self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.remove(name)
    }

    pub(crate) fn put_index(&mut self, info: IndexInfo) {
        self.indexes.insert(info.name.clone(), Arc::new(info));
    }

    pub(crate) fn remove_index(&mut self, name: &str) -> Option<Arc<IndexInfo>> {
        self.indexes.remove(name)
    }

    pub(crate) fn put_sequence(&mut self, seq: Sequence) {
        self.sequences.insert(seq.info.name.clone(), seq);
    }

    pub(crate) fn remove_sequence(&mut self, name: &str) -> Option<Sequence> {
        self.sequences.remove(name)
    }

    /// First free name among `base`, `base1`, `base2`...
    pub fn free_name(&self, base: &str) -> String {
        if self.kind_of(base).is_none() {
            return base.to_string();
        }
        (1u64..)
            .map(|i| format!("{base}{i}"))
            .find(|n| self.kind_of(n).is_none())
            .unwrap_or_else(|| base.to_string())
    }
}

/// Creation ordinal encoded in a generated store name (`t` + uvarint).
pub(crate) fn store_ordinal(store_name: &[u8]) -> u64 {
    match store_name.split_first() {
        Some((b't', rest)) => uvarint(rest).map(|(n, _)| n).unwrap_or(u64::MAX),
        _ => u64::MAX,
    }
}

fn text_field(name: &str, not_null: bool) -> FieldConstraint {
    FieldConstraint {
        not_null,
        ..FieldConstraint::typed(Path::field(name), ValueType::Text)
    }
}

pub(crate) fn catalog_table_info() -> TableInfo {
    TableInfo {
        name: CATALOG_TABLE.to_string(),
        store_name: CATALOG_STORE.to_vec(),
        read_only: true,
        fields: vec![
            text_field("name", true),
            text_field("type", true),
            text_field("sql", false),
            FieldConstraint::typed(Path::field("store_name"), ValueType::Blob),
            FieldConstraint::typed(Path::field("owner"), ValueType::Document),
            text_field("docid_sequence_name", false),
        ],
        primary_key: Some(vec![Path::field("name")]),
        ..TableInfo::default()
    }
}

pub(crate) fn sequence_table_info() -> TableInfo {
    TableInfo {
        name: SEQUENCE_TABLE.to_string(),
        store_name: SEQUENCE_STORE.to_vec(),
        read_only: true,
        fields: vec![
            text_field("name", true),
            FieldConstraint::typed(Path::field("seq"), ValueType::Integer),
        ],
        primary_key: Some(vec![Path::field("name")]),
        ..TableInfo::default()
    }
}

pub(crate) fn store_sequence_info() -> SequenceInfo {
    SequenceInfo {
        cache: 16,
        ..SequenceInfo::new(STORE_SEQUENCE)
    }
}
