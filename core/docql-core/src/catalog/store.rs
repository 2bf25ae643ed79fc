//! Catalog persistence.
//!
//! Rows of `__docql_catalog` are written straight to the system store; the
//! in-memory view is rebuilt by re-parsing each row's `sql` text.

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::{
    CATALOG_STORE, Catalog, IndexInfo, ObjectKind, Owner, SEQUENCE_STORE, Sequence, SequenceInfo,
    TableInfo,
};
use crate::encoding::{decode_document, encode_document, encode_values};
use crate::error::{DocqlError, DocqlResult};
use crate::sql::parser::{parse_path, parse_statement};
use crate::sql::planner::Statement;
use crate::storage::{IteratorOptions, Store, StorageTransaction};
use crate::value::{Document, Value};

/// Catalog and sequence rows are keyed by their `name` primary key.
pub(crate) fn row_key(name: &str) -> Vec<u8> {
    encode_values(&[Value::Text(name.to_string())])
}

fn owner_document(owner: &Owner) -> Document {
    let mut doc = Document::new().with("table_name", owner.table_name.as_str());
    if !owner.paths.is_empty() {
        let paths = owner
            .paths
            .iter()
            .map(|p| Value::Text(p.to_string()))
            .collect::<Vec<_>>();
        doc.set("paths", Value::Array(paths));
    }
    doc
}

fn owner_from(value: Option<&Value>) -> DocqlResult<Option<Owner>> {
    let Some(Value::Document(doc)) = value else {
        return Ok(None);
    };
    let table_name = match doc.get("table_name") {
        Some(Value::Text(s)) => s.clone(),
        _ => return Err(DocqlError::encoding("catalog owner without table_name")),
    };
    let mut paths = Vec::new();
    if let Some(Value::Array(items)) = doc.get("paths") {
        for item in items {
            match item {
                Value::Text(s) => paths.push(parse_path(s)?),
                other => {
                    return Err(DocqlError::type_mismatch("text", other.value_type()));
                }
            }
        }
    }
    Ok(Some(Owner { table_name, paths }))
}

fn write_row(kv: &dyn StorageTransaction, name: &str, row: Document) -> DocqlResult<()> {
    let store = kv.get_store(CATALOG_STORE)?;
    store.put(&row_key(name), &encode_document(&row))
}

fn base_row(kind: ObjectKind, name: &str, sql: String) -> Document {
    Document::new()
        .with("name", name)
        .with("type", kind.as_str())
        .with("sql", sql)
}

pub(crate) fn put_table(kv: &dyn StorageTransaction, info: &TableInfo) -> DocqlResult<()> {
    let mut row = base_row(ObjectKind::Table, &info.name, info.to_string());
    row.set("store_name", Value::Blob(info.store_name.clone()));
    if let Some(seq) = &info.docid_sequence {
        row.set("docid_sequence_name", Value::Text(seq.clone()));
    }
    write_row(kv, &info.name, row)
}

pub(crate) fn put_index(kv: &dyn StorageTransaction, info: &IndexInfo) -> DocqlResult<()> {
    let mut row = base_row(ObjectKind::Index, &info.name, info.to_string());
    row.set("store_name", Value::Blob(info.store_name.clone()));
    if let Some(owner) = &info.owner {
        row.set("owner", Value::Document(owner_document(owner)));
    }
    write_row(kv, &info.name, row)
}

pub(crate) fn put_sequence(kv: &dyn StorageTransaction, info: &SequenceInfo) -> DocqlResult<()> {
    let mut row = base_row(ObjectKind::Sequence, &info.name, info.to_string());
    if let Some(owner) = &info.owner {
        row.set("owner", Value::Document(owner_document(owner)));
    }
    write_row(kv, &info.name, row)
}

pub(crate) fn delete_row(kv: &dyn StorageTransaction, name: &str) -> DocqlResult<()> {
    kv.get_store(CATALOG_STORE)?.delete(&row_key(name))
}

/// Persists the lease of a sequence in `__docql_sequence`.
pub(crate) fn put_lease(kv: &dyn StorageTransaction, name: &str, lease: i64) -> DocqlResult<()> {
    let row = Document::new()
        .with("name", name)
        .with("seq", Value::Integer(lease));
    kv.get_store(SEQUENCE_STORE)?
        .put(&row_key(name), &encode_document(&row))
}

pub(crate) fn delete_lease(kv: &dyn StorageTransaction, name: &str) -> DocqlResult<()> {
    match kv.get_store(SEQUENCE_STORE)?.delete(&row_key(name)) {
        Err(DocqlError::KeyNotFound) => Ok(()),
        other => other,
    }
}

fn read_all(store: &dyn Store) -> DocqlResult<Vec<Document>> {
    let mut it = store.iterator(IteratorOptions::default());
    it.seek(&[]);
    let mut rows = Vec::new();
    while it.valid() {
        if let Some(v) = it.value() {
            rows.push(decode_document(v)?);
        }
        it.next();
    }
    it.close()?;
    Ok(rows)
}

fn text(row: &Document, field: &str) -> DocqlResult<String> {
    match row.get(field) {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(DocqlError::encoding(format!("catalog row without {field}"))),
    }
}

fn blob(row: &Document, field: &str) -> DocqlResult<Vec<u8>> {
    match row.get(field) {
        Some(Value::Blob(b)) => Ok(b.clone()),
        _ => Err(DocqlError::encoding(format!("catalog row without {field}"))),
    }
}

/// Rebuilds the in-memory catalog from the system stores.
pub(crate) fn load(kv: &dyn StorageTransaction) -> DocqlResult<Catalog> {
    let mut catalog = Catalog::with_system_tables();

    let mut leases = HashMap::new();
    for row in read_all(kv.get_store(SEQUENCE_STORE)?.as_ref())? {
        if let Some(Value::Integer(seq)) = row.get("seq") {
            leases.insert(text(&row, "name")?, *seq);
        }
    }

    let rows = read_all(kv.get_store(CATALOG_STORE)?.as_ref())?;
    let mut indexes = Vec::new();
    let mut sequences = Vec::new();
    for row in rows {
        let sql = text(&row, "sql")?;
        match (text(&row, "type")?.as_str(), parse_statement(&sql)?) {
            ("table", Statement::CreateTable { mut info, .. }) => {
                info.store_name = blob(&row, "store_name")?;
                info.docid_sequence = match row.get("docid_sequence_name") {
                    Some(Value::Text(s)) => Some(s.clone()),
                    _ => None,
                };
                catalog.put_table(info);
            }
            ("index", Statement::CreateIndex { mut info, .. }) => {
                info.store_name = blob(&row, "store_name")?;
                info.owner = owner_from(row.get("owner"))?;
                indexes.push(info);
            }
            ("sequence", Statement::CreateSequence { mut info, .. }) => {
                info.owner = owner_from(row.get("owner"))?;
                sequences.push(info);
            }
            (kind, _) => {
                return Err(DocqlError::encoding(format!(
                    "catalog row '{kind}' does not match its sql: {sql}"
                )));
            }
        }
    }

    // index types follow the declared types of the table
    for mut info in indexes {
        let table = catalog.get_table(&info.table_name)?;
        info.types = info.paths.iter().map(|p| table.field_type(p)).collect();
        catalog.put_index(info);
    }
    for info in sequences {
        let lease = leases.get(&info.name).copied();
        catalog.put_sequence(Sequence::resume(info, lease));
    }

    debug!(
        tables = catalog.list_tables().len(),
        indexes = catalog.list_indexes().len(),
        sequences = catalog.list_sequences().len(),
        "catalog loaded"
    );
    Ok(catalog)
}
