//! Schema objects: tables, indexes and sequences.
//!
//! `Display` renders each object as the `CREATE` statement stored in the
//! catalog; parsing that text back yields an equal object.

use std::fmt;

use crate::error::{DocqlError, DocqlResult};
use crate::sql::planner::Expr;
use crate::value::path::write_ident;
use crate::value::{Document, Path, PathFragment, Value, ValueType};

/// Constraint on one field path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub path: Path,
    pub ty: Option<ValueType>,
    pub not_null: bool,
    pub default: Option<Expr>,
    /// Added implicitly for the parent of a typed nested path.
    pub inferred: bool,
}

impl FieldConstraint {
    pub fn new(path: Path) -> Self {
        FieldConstraint {
            path,
            ty: None,
            not_null: false,
            default: None,
            inferred: false,
        }
    }

    pub fn typed(path: Path, ty: ValueType) -> Self {
        FieldConstraint {
            ty: Some(ty),
            ..FieldConstraint::new(path)
        }
    }
}

impl fmt::Display for FieldConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(ty) = self.ty {
            write!(f, " {}", ty.sql_name())?;
        }
        if self.not_null {
            f.write_str(" NOT NULL")?;
        }
        match &self.default {
            Some(e @ Expr::Literal(_)) => write!(f, " DEFAULT {e}")?,
            Some(e) => write!(f, " DEFAULT ({e})")?,
            None => {}
        }
        Ok(())
    }
}

/// Table-level constraint as written in `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey(Vec<Path>),
    Unique(Vec<Path>),
    Check(Expr),
}

fn write_paths(f: &mut fmt::Formatter<'_>, paths: &[Path]) -> fmt::Result {
    f.write_str("(")?;
    for (i, p) in paths.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{p}")?;
    }
    f.write_str(")")
}

impl fmt::Display for TableConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableConstraint::PrimaryKey(paths) => {
                f.write_str("PRIMARY KEY ")?;
                write_paths(f, paths)
            }
            TableConstraint::Unique(paths) => {
                f.write_str("UNIQUE ")?;
                write_paths(f, paths)
            }
            TableConstraint::Check(e) => write!(f, "CHECK ({e})"),
        }
    }
}

/// Owner of an object created implicitly: a `UNIQUE` index or a docid
/// sequence belongs to its table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Owner {
    pub table_name: String,
    pub paths: Vec<Path>,
}

/// 테이블 정의
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableInfo {
    pub name: String,
    pub store_name: Vec<u8>,
    pub read_only: bool,
    pub fields: Vec<FieldConstraint>,
    pub primary_key: Option<Vec<Path>>,
    pub unique: Vec<Vec<Path>>,
    pub checks: Vec<Expr>,
    pub docid_sequence: Option<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        TableInfo {
            name: name.into(),
            ..TableInfo::default()
        }
    }

    pub fn field(&self, path: &Path) -> Option<&FieldConstraint> {
        self.fields.iter().find(|f| &f.path == path)
    }

    /// Declared type of `path`, if any.
    pub fn field_type(&self, path: &Path) -> Option<ValueType> {
        self.field(path).and_then(|f| f.ty)
    }

    /// Adds a field constraint plus the inferred constraints on its parents.
    pub fn add_field(&mut self, fc: FieldConstraint) -> DocqlResult<()> {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.path == fc.path) {
            if !existing.inferred {
                return Err(DocqlError::AlreadyExists(format!(
                    "field {} of table {}",
                    fc.path, self.name
                )));
            }
            if existing.ty.is_some() && fc.ty.is_some() && existing.ty != fc.ty {
                return Err(DocqlError::type_mismatch(
                    existing.ty.map_or("any", |t| t.sql_name()),
                    fc.ty.map_or("any", |t| t.sql_name()),
                ));
            }
            *existing = fc;
            return Ok(());
        }

        let mut parents = Vec::new();
        let fragments = fc.path.fragments();
        for i in 1..fragments.len() {
            let ty = match fragments[i] {
                PathFragment::Field(_) => ValueType::Document,
                PathFragment::Index(_) => ValueType::Array,
            };
            parents.push((Path::new(fragments[..i].iter().cloned()), ty));
        }
        for (path, ty) in parents {
            match self.fields.iter().find(|f| f.path == path) {
                Some(f) if f.ty.is_some_and(|t| t != ty) => {
                    return Err(DocqlError::type_mismatch(ty, f.ty.map_or("any", |t| t.sql_name())));
                }
                Some(_) => {}
                None => self.fields.push(FieldConstraint {
                    inferred: true,
                    ..FieldConstraint::typed(path, ty)
                }),
            }
        }
        self.fields.push(fc);
        Ok(())
    }

    /// Declared types of the primary key paths.
    pub fn pk_types(&self) -> Vec<Option<ValueType>> {
        self.primary_key
            .iter()
            .flatten()
            .map(|p| self.field_type(p))
            .collect()
    }

    /// Primary key values of `doc`, converted to their declared types.
    pub fn pk_values(&self, doc: &Document) -> DocqlResult<Option<Vec<Value>>> {
        let Some(paths) = &self.primary_key else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(paths.len());
        for p in paths {
            let v = match doc.get_path(p) {
                Some(v) if !v.is_null() => v.clone(),
                _ => {
                    return Err(DocqlError::NotNullViolation {
                        path: p.to_string(),
                    });
                }
            };
            values.push(match self.field_type(p) {
                Some(ty) => v.convert_to(ty)?,
                None => v,
            });
        }
        Ok(Some(values))
    }

    fn is_pk_path(&self, path: &Path) -> bool {
        self.primary_key.iter().flatten().any(|p| p == path)
    }

    /// Applies defaults, type conversions and NOT NULL checks. `default`
    /// evaluates DEFAULT expressions.
    pub fn validate(
        &self,
        mut doc: Document,
        default: &mut dyn FnMut(&Expr) -> DocqlResult<Value>,
    ) -> DocqlResult<Document> {
        for fc in &self.fields {
            let current = doc.get_path(&fc.path).cloned();
            match current {
                None | Some(Value::Null) => {
                    if let Some(expr) = &fc.default {
                        let mut v = default(expr)?;
                        if let Some(ty) = fc.ty {
                            v = v.convert_to(ty)?;
                        }
                        // defaults never create missing parents
                        let parent_missing = fc
                            .path
                            .parent()
                            .is_some_and(|parent| doc.get_path(&parent).is_none());
                        if parent_missing {
                            continue;
                        }
                        doc.set_path(&fc.path, v)?;
                    } else if fc.not_null || self.is_pk_path(&fc.path) {
                        return Err(DocqlError::NotNullViolation {
                            path: fc.path.to_string(),
                        });
                    }
                }
                Some(v) => {
                    if let Some(ty) = fc.ty {
                        let converted = v.convert_to(ty).map_err(|_| {
                            DocqlError::type_mismatch(
                                format!("{} for field {}", ty.sql_name(), fc.path),
                                v.value_type().sql_name(),
                            )
                        })?;
                        if converted.value_type() != v.value_type() {
                            doc.set_path(&fc.path, converted)?;
                        }
                    }
                }
            }
        }
        for p in self.primary_key.iter().flatten() {
            if doc.get_path(p).is_none_or(Value::is_null) {
                return Err(DocqlError::NotNullViolation {
                    path: p.to_string(),
                });
            }
        }
        Ok(doc)
    }

    /// Constraints rendered after the field list.
    pub fn table_constraints(&self) -> Vec<TableConstraint> {
        let mut out = Vec::new();
        if let Some(pk) = &self.primary_key {
            out.push(TableConstraint::PrimaryKey(pk.clone()));
        }
        for u in &self.unique {
            out.push(TableConstraint::Unique(u.clone()));
        }
        for c in &self.checks {
            out.push(TableConstraint::Check(c.clone()));
        }
        out
    }

    pub fn apply_constraint(&mut self, c: TableConstraint) -> DocqlResult<()> {
        match c {
            TableConstraint::PrimaryKey(paths) => {
                if self.primary_key.is_some() {
                    return Err(DocqlError::invalid(
                        "multiple primary keys are not allowed",
                        self.name.clone(),
                    ));
                }
                self.primary_key = Some(paths);
            }
            TableConstraint::Unique(paths) => {
                if !self.unique.contains(&paths) {
                    self.unique.push(paths);
                }
            }
            TableConstraint::Check(e) => self.checks.push(e),
        }
        Ok(())
    }
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CREATE TABLE ")?;
        write_ident(f, &self.name)?;
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter(|fc| !fc.inferred)
            .map(|fc| fc.to_string())
            .chain(self.table_constraints().iter().map(|c| c.to_string()))
            .collect();
        if !fields.is_empty() {
            write!(f, " ({})", fields.join(", "))?;
        }
        Ok(())
    }
}

/// 인덱스 정의
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexInfo {
    pub name: String,
    pub table_name: String,
    pub paths: Vec<Path>,
    pub unique: bool,
    /// Declared type of each path on the owning table.
    pub types: Vec<Option<ValueType>>,
    pub store_name: Vec<u8>,
    pub owner: Option<Owner>,
}

impl IndexInfo {
    /// Values indexed for `doc`; missing paths index as `NULL`.
    pub fn values_of(&self, doc: &Document) -> DocqlResult<Vec<Value>> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let v = doc.get_path(p).cloned().unwrap_or(Value::Null);
                match self.types.get(i).copied().flatten() {
                    Some(ty) if !v.is_null() => v.convert_to(ty),
                    _ => Ok(v),
                }
            })
            .collect()
    }

    /// Name generated for `CREATE INDEX ON t(a, b)`: `t_a_b_idx`.
    pub fn generated_name(table: &str, paths: &[Path]) -> String {
        let mut name = table.to_string();
        for p in paths {
            for frag in p.fragments() {
                name.push('_');
                match frag {
                    PathFragment::Field(s) => name.push_str(s),
                    PathFragment::Index(i) => name.push_str(&i.to_string()),
                }
            }
        }
        name.push_str("_idx");
        name
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.unique {
            "CREATE UNIQUE INDEX "
        } else {
            "CREATE INDEX "
        })?;
        write_ident(f, &self.name)?;
        f.write_str(" ON ")?;
        write_ident(f, &self.table_name)?;
        f.write_str(" ")?;
        write_paths(f, &self.paths)
    }
}

/// 시퀀스 정의
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    pub name: String,
    pub increment: i64,
    pub min: i64,
    pub max: i64,
    pub start: i64,
    pub cache: u64,
    pub cycle: bool,
    pub owner: Option<Owner>,
}

impl SequenceInfo {
    /// Ascending sequence with default bounds.
    pub fn new(name: impl Into<String>) -> Self {
        SequenceInfo {
            name: name.into(),
            increment: 1,
            min: 1,
            max: i64::MAX,
            start: 1,
            cache: 1,
            cycle: false,
            owner: None,
        }
    }

    /// Fills bounds and start left unspecified in `CREATE SEQUENCE`.
    pub fn with_defaults(
        name: impl Into<String>,
        increment: i64,
        min: Option<i64>,
        max: Option<i64>,
        start: Option<i64>,
    ) -> DocqlResult<Self> {
        let name = name.into();
        if increment == 0 {
            return Err(DocqlError::invalid("INCREMENT must not be zero", name));
        }
        let asc = increment > 0;
        let min = min.unwrap_or(if asc { 1 } else { i64::MIN });
        let max = max.unwrap_or(if asc { i64::MAX } else { -1 });
        if min > max {
            return Err(DocqlError::invalid(
                format!("MINVALUE ({min}) must be less than MAXVALUE ({max})"),
                name,
            ));
        }
        let start = start.unwrap_or(if asc { min } else { max });
        if start < min || start > max {
            return Err(DocqlError::invalid(
                format!("START value ({start}) must be between {min} and {max}"),
                name,
            ));
        }
        Ok(SequenceInfo {
            increment,
            min,
            max,
            start,
            ..SequenceInfo::new(name)
        })
    }
}

impl fmt::Display for SequenceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CREATE SEQUENCE ")?;
        write_ident(f, &self.name)?;
        write!(
            f,
            " INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} CACHE {}",
            self.increment, self.min, self.max, self.start, self.cache
        )?;
        if self.cycle {
            f.write_str(" CYCLE")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse_simple(s).unwrap()
    }

    fn no_default(_: &Expr) -> DocqlResult<Value> {
        Ok(Value::Null)
    }

    #[test]
    fn nested_field_infers_parent() {
        let mut info = TableInfo::new("t");
        info.add_field(FieldConstraint::typed(p("a.b"), ValueType::Integer))
            .unwrap();
        assert_eq!(info.field_type(&p("a")), Some(ValueType::Document));
        assert!(info.field(&p("a")).unwrap().inferred);
        assert_eq!(info.to_string(), "CREATE TABLE t (a.b INTEGER)");

        // an explicit declaration replaces the inferred one
        info.add_field(FieldConstraint::typed(p("a"), ValueType::Document))
            .unwrap();
        assert!(info.add_field(FieldConstraint::new(p("a"))).is_err());
    }

    #[test]
    fn validate_converts_and_defaults() {
        let mut info = TableInfo::new("t");
        info.add_field(FieldConstraint::typed(p("d"), ValueType::Double))
            .unwrap();
        info.add_field(FieldConstraint {
            default: Some(Expr::literal(7)),
            ..FieldConstraint::typed(p("n"), ValueType::Integer)
        })
        .unwrap();

        let doc = Document::new().with("d", 1);
        let out = info
            .validate(doc, &mut |e: &Expr| match e {
                Expr::Literal(v) => Ok(v.clone()),
                _ => Ok(Value::Null),
            })
            .unwrap();
        assert_eq!(out.get("d"), Some(&Value::Double(1.0)));
        assert_eq!(out.get("n"), Some(&Value::Integer(7)));
    }

    #[test]
    fn validate_rejects_bad_types_and_nulls() {
        let mut info = TableInfo::new("t");
        info.add_field(FieldConstraint {
            not_null: true,
            ..FieldConstraint::typed(p("a"), ValueType::Integer)
        })
        .unwrap();
        let err = info
            .validate(Document::new().with("a", "x"), &mut no_default)
            .unwrap_err();
        assert!(matches!(err, DocqlError::TypeMismatch { .. }));
        let err = info.validate(Document::new(), &mut no_default).unwrap_err();
        assert!(matches!(err, DocqlError::NotNullViolation { .. }));
    }

    #[test]
    fn renders_constraints() {
        let mut info = TableInfo::new("t");
        info.add_field(FieldConstraint::typed(p("k"), ValueType::Integer))
            .unwrap();
        info.primary_key = Some(vec![p("k")]);
        info.unique.push(vec![p("b")]);
        assert_eq!(
            info.to_string(),
            "CREATE TABLE t (k INTEGER, PRIMARY KEY (k), UNIQUE (b))"
        );
    }

    #[test]
    fn index_names_and_values() {
        assert_eq!(
            IndexInfo::generated_name("t", &[p("a"), p("b.c")]),
            "t_a_b_c_idx"
        );
        let idx = IndexInfo {
            name: "i".into(),
            table_name: "t".into(),
            paths: vec![p("a"), p("z")],
            types: vec![Some(ValueType::Double), None],
            ..IndexInfo::default()
        };
        let values = idx.values_of(&Document::new().with("a", 2)).unwrap();
        assert_eq!(values, vec![Value::Double(2.0), Value::Null]);
        assert_eq!(idx.to_string(), "CREATE INDEX i ON t (a, z)");
    }

    #[test]
    fn sequence_defaults() {
        let desc = SequenceInfo::with_defaults("s", -2, None, None, None).unwrap();
        assert_eq!((desc.min, desc.max, desc.start), (i64::MIN, -1, -1));
        assert!(SequenceInfo::with_defaults("s", 0, None, None, None).is_err());
        assert!(SequenceInfo::with_defaults("s", 1, Some(5), Some(1), None).is_err());
        assert_eq!(
            SequenceInfo::new("s").to_string(),
            "CREATE SEQUENCE s INCREMENT BY 1 MINVALUE 1 MAXVALUE 9223372036854775807 START WITH 1 CACHE 1"
        );
    }
}
