//! Query plans as linear operator pipelines.
//!
//! A [`Stream`] is the plan the planner emits and the optimizer rewrites;
//! the executor turns each [`StreamOp`] into a physical operator. Its
//! `Display` is the EXPLAIN output:
//!
//! ```text
//! seqScan(test) | filter(c > 10) | project(a + 1)
//! indexScan(test_a_idx, [10, -1, true]) | project(a + 1)
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::encoding::encode_seek_prefix;
use crate::sql::planner::{Expr, Function, OnConflict, Projected};
use crate::value::{Path, Value};

/// 값 범위 — key range over a primary key or an index
///
/// `eq` fixes the leading components; `min`/`max` bound the next one.
/// A range with no bounds is an exact match on `eq`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Range {
    pub eq: Vec<Value>,
    pub min: Option<Value>,
    pub max: Option<Value>,
    /// Excludes both bounds.
    pub exclusive: bool,
}

impl Range {
    pub fn exact(values: Vec<Value>) -> Self {
        Range {
            eq: values,
            ..Range::default()
        }
    }

    pub fn is_exact(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Number of key components the range inspects.
    pub fn width(&self) -> usize {
        self.eq.len() + usize::from(!self.is_exact())
    }

    fn with_bound(&self, bound: &Option<Value>) -> Vec<Value> {
        let mut values = self.eq.clone();
        if let Some(b) = bound {
            values.push(b.clone());
        }
        values
    }

    /// Seek position of an ascending or descending scan. Descending
    /// cursors must seek past every key having the pivot as a prefix.
    pub fn seek_pivot(&self, reverse: bool) -> Vec<u8> {
        if reverse {
            encode_seek_prefix(&self.with_bound(&self.max))
        } else {
            encode_seek_prefix(&self.with_bound(&self.min))
        }
    }

    /// Whether the leading key components `values` fall inside the range.
    pub fn contains(&self, values: &[Value]) -> bool {
        if values.len() < self.width() {
            return false;
        }
        let eq_ok = self
            .eq
            .iter()
            .zip(values)
            .all(|(want, got)| got.sql_cmp(want) == Some(Ordering::Equal));
        if !eq_ok {
            return false;
        }
        let Some(v) = values.get(self.eq.len()) else {
            return true;
        };
        let above_min = match &self.min {
            None => true,
            Some(min) => match v.sql_cmp(min) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => !self.exclusive,
                _ => false,
            },
        };
        let below_max = match &self.max {
            None => true,
            Some(max) => match v.sql_cmp(max) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => !self.exclusive,
                _ => false,
            },
        };
        above_min && below_max
    }

    /// Whether a scan has moved past every key the range can match.
    /// Only the first component is consulted.
    pub fn is_past(&self, values: &[Value], reverse: bool) -> bool {
        let Some(first) = values.first() else {
            return false;
        };
        let bound = match self.eq.first() {
            Some(v) => Some(v),
            None if reverse => self.min.as_ref(),
            None => self.max.as_ref(),
        };
        let Some(bound) = bound else {
            return false;
        };
        let numerically_equal = first.sql_cmp(bound) == Some(Ordering::Equal);
        match first.cmp(bound) {
            Ordering::Greater if !reverse => !numerically_equal,
            Ordering::Less if reverse => !numerically_equal,
            _ => false,
        }
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    match values {
        [single] => write!(f, "{single}"),
        many => write!(f, "{}", Value::Array(many.to_vec())),
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write_values(f, &self.eq);
        }
        let side = |f: &mut fmt::Formatter<'_>, bound: &Option<Value>| match bound {
            None if self.eq.is_empty() => f.write_str("-1"),
            _ => write_values(f, &self.with_bound(bound)),
        };
        f.write_str("[")?;
        side(f, &self.min)?;
        f.write_str(", ")?;
        side(f, &self.max)?;
        if self.exclusive {
            f.write_str(", true")?;
        }
        f.write_str("]")
    }
}

/// 스트림 연산자
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOp {
    SeqScan {
        table: String,
        reverse: bool,
    },
    PkScan {
        table: String,
        ranges: Vec<Range>,
        reverse: bool,
    },
    IndexScan {
        index: String,
        ranges: Vec<Range>,
        reverse: bool,
    },
    /// Rows built from document expressions (`INSERT ... VALUES`).
    Docs(Vec<Expr>),
    /// Rows of every branch without duplicates, in document order.
    Union(Vec<Stream>),
    /// Rows of every branch, one branch after the other.
    Concat(Vec<Stream>),
    Distinct,
    Filter(Expr),
    Project(Vec<Projected>),
    Rename(Vec<String>),
    Set(Path, Expr),
    Unset(Path),
    GroupBy(Expr),
    HashAggregate(Vec<Function>),
    Sort(Expr),
    SortReverse(Expr),
    Skip(Expr),
    Take(Expr),
    TableInsert {
        table: String,
        on_conflict: Option<OnConflict>,
    },
    TableReplace(String),
    TableDelete(String),
}

impl StreamOp {
    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            StreamOp::SeqScan { .. } | StreamOp::PkScan { .. } | StreamOp::IndexScan { .. }
        )
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn scan_name(base: &str, reverse: bool) -> String {
    if reverse {
        format!("{base}Reverse")
    } else {
        base.to_string()
    }
}

impl fmt::Display for StreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOp::SeqScan { table, reverse } => {
                write!(f, "{}({table})", scan_name("seqScan", *reverse))
            }
            StreamOp::PkScan {
                table,
                ranges,
                reverse,
            } => {
                write!(f, "{}({table}, ", scan_name("pkScan", *reverse))?;
                join(f, ranges)?;
                f.write_str(")")
            }
            StreamOp::IndexScan {
                index,
                ranges,
                reverse,
            } => {
                write!(f, "{}({index}, ", scan_name("indexScan", *reverse))?;
                join(f, ranges)?;
                f.write_str(")")
            }
            StreamOp::Docs(exprs) => {
                f.write_str("docs(")?;
                join(f, exprs)?;
                f.write_str(")")
            }
            StreamOp::Union(branches) => {
                f.write_str("union(")?;
                join(f, branches)?;
                f.write_str(")")
            }
            StreamOp::Concat(branches) => {
                f.write_str("concat(")?;
                join(f, branches)?;
                f.write_str(")")
            }
            StreamOp::Distinct => f.write_str("distinct()"),
            StreamOp::Filter(e) => write!(f, "filter({e})"),
            StreamOp::Project(items) => {
                f.write_str("project(")?;
                join(f, items)?;
                f.write_str(")")
            }
            StreamOp::Rename(names) => write!(f, "rename({})", names.join(", ")),
            StreamOp::Set(path, e) => write!(f, "set({path}, {e})"),
            StreamOp::Unset(path) => write!(f, "unset({path})"),
            StreamOp::GroupBy(e) => write!(f, "groupBy({e})"),
            StreamOp::HashAggregate(fns) => {
                f.write_str("hashAggregate(")?;
                join(f, fns)?;
                f.write_str(")")
            }
            StreamOp::Sort(e) => write!(f, "sort({e})"),
            StreamOp::SortReverse(e) => write!(f, "sortReverse({e})"),
            StreamOp::Skip(e) => write!(f, "skip({e})"),
            StreamOp::Take(e) => write!(f, "take({e})"),
            StreamOp::TableInsert {
                table,
                on_conflict: None,
            } => write!(f, "tableInsert({table})"),
            StreamOp::TableInsert {
                table,
                on_conflict: Some(c),
            } => write!(f, "tableInsert({table}, {c})"),
            StreamOp::TableReplace(table) => write!(f, "tableReplace({table})"),
            StreamOp::TableDelete(table) => write!(f, "tableDelete({table})"),
        }
    }
}

/// 쿼리 스트림 — a pipeline of operators, source first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    pub ops: Vec<StreamOp>,
}

impl Stream {
    pub fn new(ops: Vec<StreamOp>) -> Self {
        Stream { ops }
    }

    pub fn push(&mut self, op: StreamOp) {
        self.ops.push(op);
    }

    /// Table read by the leading scan, if any.
    pub fn scanned_table(&self) -> Option<&str> {
        match self.ops.first()? {
            StreamOp::SeqScan { table, .. } | StreamOp::PkScan { table, .. } => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
