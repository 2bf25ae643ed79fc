//! DDL — schema changes inside a transaction.
//!
//! Every operation validates against the transaction's catalog, creates or
//! drops the backing stores, writes the catalog rows and finally updates
//! the in-memory view. All of it happens in the same storage transaction,
//! so a rollback undoes stores and rows together.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::catalog::{
    INTERNAL_PREFIX, IndexInfo, ObjectKind, Owner, STORE_SEQUENCE, Sequence, SequenceInfo,
    TableConstraint, TableInfo, FieldConstraint, store,
};
use crate::encoding::varint::put_uvarint;
use crate::engine::transaction::Transaction;
use crate::error::{DocqlError, DocqlResult};

/// Docid sequences reserve this many values per lease.
const DOCID_CACHE: u64 = 64;

fn ensure_not_reserved(name: &str) -> DocqlResult<()> {
    if name.starts_with(INTERNAL_PREFIX) {
        return Err(DocqlError::invalid(
            format!("names starting with {INTERNAL_PREFIX} are reserved"),
            name.to_string(),
        ));
    }
    Ok(())
}

impl Transaction {
    /// Store name for a new table or index: `t` + uvarint ordinal.
    fn allocate_store(&self) -> DocqlResult<Vec<u8>> {
        let n = self.next_sequence_value(STORE_SEQUENCE)?;
        let mut name = vec![b't'];
        put_uvarint(&mut name, n as u64);
        Ok(name)
    }

    fn ensure_mutable_table(&self, name: &str) -> DocqlResult<Arc<TableInfo>> {
        let info = self.catalog().get_table(name)?;
        if info.read_only {
            return Err(DocqlError::ReadOnlyTable(info.name.clone()));
        }
        Ok(info)
    }

    /// 테이블 생성
    #[instrument(skip(self, info), fields(table = %info.name))]
    pub fn create_table(&self, mut info: TableInfo) -> DocqlResult<()> {
        self.ensure_writable()?;
        ensure_not_reserved(&info.name)?;
        self.catalog().ensure_free(&info.name, ObjectKind::Table)?;

        info.store_name = self.allocate_store()?;
        if info.primary_key.is_none() {
            let name = self.catalog().free_name(&format!("{}_seq", info.name));
            let seq = SequenceInfo {
                cache: DOCID_CACHE,
                owner: Some(Owner {
                    table_name: info.name.clone(),
                    paths: Vec::new(),
                }),
                ..SequenceInfo::new(name.clone())
            };
            self.put_sequence(seq)?;
            info.docid_sequence = Some(name);
        }

        self.kv().create_store(&info.store_name)?;
        store::put_table(self.kv(), &info)?;
        let unique = info.unique.clone();
        let name = info.name.clone();
        self.catalog_mut().put_table(info);

        for paths in unique {
            self.create_owned_index(&name, paths)?;
        }
        info!(table = %name, "table created");
        Ok(())
    }

    fn create_owned_index(&self, table: &str, paths: Vec<crate::value::Path>) -> DocqlResult<()> {
        let info = IndexInfo {
            name: String::new(),
            table_name: table.to_string(),
            owner: Some(Owner {
                table_name: table.to_string(),
                paths: paths.clone(),
            }),
            paths,
            unique: true,
            ..IndexInfo::default()
        };
        self.create_index(info).map(|_| ())
    }

    /// 인덱스 생성 — builds the index over existing rows. Returns the
    /// index name, generated when `info.name` is empty.
    #[instrument(skip(self, info), fields(index = %info.name, table = %info.table_name))]
    pub fn create_index(&self, mut info: IndexInfo) -> DocqlResult<String> {
        self.ensure_writable()?;
        let table = self.ensure_mutable_table(&info.table_name)?;
        if info.name.is_empty() {
            let base = IndexInfo::generated_name(&info.table_name, &info.paths);
            info.name = self.catalog().free_name(&base);
        } else {
            ensure_not_reserved(&info.name)?;
            self.catalog().ensure_free(&info.name, ObjectKind::Index)?;
        }
        info.types = info.paths.iter().map(|p| table.field_type(p)).collect();
        info.store_name = self.allocate_store()?;

        self.kv().create_store(&info.store_name)?;
        store::put_index(self.kv(), &info)?;
        let name = info.name.clone();
        self.catalog_mut().put_index(info);

        let built = self.index(&name)?.rebuild(&self.table(&table.name)?)?;
        info!(index = %name, entries = built, "index created");
        Ok(name)
    }

    fn put_sequence(&self, info: SequenceInfo) -> DocqlResult<()> {
        store::put_sequence(self.kv(), &info)?;
        self.catalog_mut().put_sequence(Sequence::new(info));
        Ok(())
    }

    /// 시퀀스 생성
    #[instrument(skip(self, info), fields(sequence = %info.name))]
    pub fn create_sequence(&self, info: SequenceInfo) -> DocqlResult<()> {
        self.ensure_writable()?;
        ensure_not_reserved(&info.name)?;
        self.catalog().ensure_free(&info.name, ObjectKind::Sequence)?;
        let name = info.name.clone();
        self.put_sequence(info)?;
        info!(sequence = %name, "sequence created");
        Ok(())
    }

    /// Drops a table with its indexes and docid sequence.
    #[instrument(skip(self))]
    pub fn drop_table(&self, name: &str) -> DocqlResult<()> {
        self.ensure_writable()?;
        let info = self.ensure_mutable_table(name)?;

        for idx in self.catalog().table_indexes(name) {
            self.remove_index(&idx)?;
        }
        if let Some(seq) = &info.docid_sequence {
            self.remove_sequence(seq)?;
        }
        self.kv().drop_store(&info.store_name)?;
        store::delete_row(self.kv(), name)?;
        self.catalog_mut().remove_table(name);
        info!(table = %name, "table dropped");
        Ok(())
    }

    fn remove_index(&self, info: &IndexInfo) -> DocqlResult<()> {
        self.kv().drop_store(&info.store_name)?;
        store::delete_row(self.kv(), &info.name)?;
        self.catalog_mut().remove_index(&info.name);
        Ok(())
    }

    fn remove_sequence(&self, name: &str) -> DocqlResult<()> {
        store::delete_row(self.kv(), name)?;
        store::delete_lease(self.kv(), name)?;
        self.catalog_mut().remove_sequence(name);
        Ok(())
    }

    /// Drops an index created by `CREATE INDEX`. Indexes backing a UNIQUE
    /// constraint go away with their table only.
    #[instrument(skip(self))]
    pub fn drop_index(&self, name: &str) -> DocqlResult<()> {
        self.ensure_writable()?;
        let info = self.catalog().get_index(name)?;
        self.ensure_mutable_table(&info.table_name)?;
        if info.owner.is_some() {
            return Err(DocqlError::invalid(
                "cannot drop an index backing a constraint",
                name.to_string(),
            ));
        }
        self.remove_index(&info)?;
        info!(index = %name, "index dropped");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn drop_sequence(&self, name: &str) -> DocqlResult<()> {
        self.ensure_writable()?;
        ensure_not_reserved(name)?;
        let owner = self.catalog().get_sequence(name)?.info.owner.clone();
        if let Some(owner) = owner {
            return Err(DocqlError::invalid(
                format!("sequence is owned by table {}", owner.table_name),
                name.to_string(),
            ));
        }
        self.remove_sequence(name)?;
        info!(sequence = %name, "sequence dropped");
        Ok(())
    }

    /// `ALTER TABLE t RENAME TO u`; owned indexes and sequences follow.
    #[instrument(skip(self))]
    pub fn rename_table(&self, old: &str, new: &str) -> DocqlResult<()> {
        self.ensure_writable()?;
        let info = self.ensure_mutable_table(old)?;
        if old == new {
            return Err(DocqlError::AlreadyExists(new.to_string()));
        }
        ensure_not_reserved(new)?;
        self.catalog().ensure_free(new, ObjectKind::Table)?;

        let mut renamed = (*info).clone();
        renamed.name = new.to_string();
        store::delete_row(self.kv(), old)?;
        store::put_table(self.kv(), &renamed)?;

        let indexes = self.catalog().table_indexes(old);
        for idx in indexes {
            let mut idx = (*idx).clone();
            idx.table_name = new.to_string();
            if let Some(owner) = &mut idx.owner {
                owner.table_name = new.to_string();
            }
            store::put_index(self.kv(), &idx)?;
            self.catalog_mut().put_index(idx);
        }

        if let Some(seq_name) = &renamed.docid_sequence {
            let mut catalog = self.catalog_mut();
            let seq = catalog.get_sequence_mut(seq_name)?;
            if let Some(owner) = &mut seq.info.owner {
                owner.table_name = new.to_string();
            }
            store::put_sequence(self.kv(), &seq.info)?;
        }

        let mut catalog = self.catalog_mut();
        catalog.remove_table(old);
        catalog.put_table(renamed);
        info!(from = %old, to = %new, "table renamed");
        Ok(())
    }

    /// `ALTER TABLE t ADD FIELD ...`. Existing rows are revalidated against
    /// the new definition and rewritten.
    #[instrument(skip(self, field, constraints), fields(field = %field.path))]
    pub fn add_field(
        &self,
        table: &str,
        field: FieldConstraint,
        constraints: Vec<TableConstraint>,
    ) -> DocqlResult<()> {
        self.ensure_writable()?;
        let info = self.ensure_mutable_table(table)?;
        let mut altered = (*info).clone();
        let mut unique = Vec::new();
        altered.add_field(field)?;
        for c in constraints {
            match c {
                TableConstraint::PrimaryKey(_) => {
                    return Err(DocqlError::invalid(
                        "cannot add a PRIMARY KEY to an existing table",
                        table.to_string(),
                    ));
                }
                TableConstraint::Unique(paths) => {
                    if !altered.unique.contains(&paths) {
                        unique.push(paths.clone());
                    }
                    altered.apply_constraint(TableConstraint::Unique(paths))?;
                }
                other => altered.apply_constraint(other)?,
            }
        }

        store::put_table(self.kv(), &altered)?;
        self.catalog_mut().put_table(altered);

        let handle = self.table(table)?;
        let mut rows = Vec::new();
        let mut cursor = handle.cursor(false)?;
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
        }
        let count = rows.len();
        for (key, doc) in rows {
            handle.replace(&key, doc)?;
        }
        debug!(table = %table, rows = count, "rows revalidated");

        for paths in unique {
            self.create_owned_index(table, paths)?;
        }
        Ok(())
    }

    /// Rebuilds indexes: all of them, those of a table, or one index.
    #[instrument(skip(self))]
    pub fn reindex(&self, target: Option<&str>) -> DocqlResult<()> {
        self.ensure_writable()?;
        let names: Vec<String> = {
            let catalog = self.catalog();
            match target {
                None => catalog.list_indexes(),
                Some(name) => match catalog.kind_of(name) {
                    Some(ObjectKind::Table) => catalog
                        .table_indexes(name)
                        .iter()
                        .map(|i| i.name.clone())
                        .collect(),
                    Some(ObjectKind::Index) => vec![name.to_string()],
                    _ => return Err(DocqlError::IndexNotFound(name.to_string())),
                },
            }
        };
        for name in names {
            let index = self.index(&name)?;
            let table = self.table(&index.info.table_name)?;
            let entries = index.rebuild(&table)?;
            debug!(index = %name, entries, "index rebuilt");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::database::Database;
    use crate::error::DocqlError;
    use crate::sql::parser::parse_statement;
    use crate::sql::planner::Statement;

    fn table_info(sql: &str) -> crate::catalog::TableInfo {
        match parse_statement(sql).unwrap() {
            Statement::CreateTable { info, .. } => info,
            _ => panic!("not CREATE TABLE"),
        }
    }

    #[test]
    fn unique_fields_create_owned_indexes() {
        let db = Database::open_in_memory().unwrap();
        let tx = db.begin(true).unwrap();
        tx.create_table(table_info("CREATE TABLE t (a INT UNIQUE, b TEXT)"))
            .unwrap();
        let indexes = tx.catalog().table_indexes("t");
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "t_a_idx");
        assert!(indexes[0].unique && indexes[0].owner.is_some());
        assert!(tx.catalog().get_sequence("t_seq").is_ok());

        assert!(tx.drop_index("t_a_idx").is_err());
        tx.drop_table("t").unwrap();
        assert!(tx.catalog().list_indexes().is_empty());
        assert!(tx.catalog().get_sequence("t_seq").is_err());
        tx.rollback().unwrap();
    }

    #[test]
    fn reserved_and_taken_names() {
        let db = Database::open_in_memory().unwrap();
        let tx = db.begin(true).unwrap();
        assert!(tx.create_table(table_info("CREATE TABLE __docql_x")).is_err());
        tx.create_table(table_info("CREATE TABLE t")).unwrap();
        assert!(matches!(
            tx.create_table(table_info("CREATE TABLE t")),
            Err(DocqlError::TableAlreadyExists(_))
        ));
        assert!(matches!(
            tx.rename_table("t", "t"),
            Err(DocqlError::AlreadyExists(_))
        ));
        tx.rename_table("t", "u").unwrap();
        assert!(tx.catalog().get_table("u").is_ok());
        let seq = tx.catalog().get_sequence("t_seq").unwrap().info.owner.clone();
        assert_eq!(seq.unwrap().table_name, "u");
        tx.rollback().unwrap();
    }

    #[test]
    fn system_tables_are_read_only() {
        let db = Database::open_in_memory().unwrap();
        let tx = db.begin(true).unwrap();
        assert!(matches!(
            tx.drop_table("__docql_catalog"),
            Err(DocqlError::ReadOnlyTable(_))
        ));
        tx.rollback().unwrap();
    }
}
