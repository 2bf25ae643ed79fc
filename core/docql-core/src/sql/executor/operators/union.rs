//! Union and Concat Operators — UNION / UNION ALL

use std::collections::BTreeMap;
use std::collections::btree_map::{Entry, IntoValues};

use crate::error::DocqlResult;
use crate::sql::executor::operators::distinct::row_identity;
use crate::sql::executor::operators::{PhysicalOperator, Row};

/// UNION 연산자
///
/// Drains every branch on the first call and returns each distinct
/// document once, ordered by value. The first row seen keeps its key.
pub struct UnionOperator {
    branches: Vec<Box<dyn PhysicalOperator>>,
    output: Option<IntoValues<Vec<u8>, Row>>,
}

impl UnionOperator {
    pub fn new(branches: Vec<Box<dyn PhysicalOperator>>) -> Self {
        Self {
            branches,
            output: None,
        }
    }

    fn merge(&mut self) -> DocqlResult<BTreeMap<Vec<u8>, Row>> {
        let mut rows = BTreeMap::new();
        for mut branch in self.branches.drain(..) {
            while let Some(row) = branch.next()? {
                if let Entry::Vacant(slot) = rows.entry(row_identity(&row)) {
                    slot.insert(row);
                }
            }
        }
        Ok(rows)
    }
}

impl PhysicalOperator for UnionOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        if self.output.is_none() {
            let rows = self.merge()?;
            self.output = Some(rows.into_values());
        }
        Ok(self.output.as_mut().and_then(Iterator::next))
    }
}

/// UNION ALL 연산자 — branches one after the other
pub struct ConcatOperator {
    branches: std::vec::IntoIter<Box<dyn PhysicalOperator>>,
    current: Option<Box<dyn PhysicalOperator>>,
}

impl ConcatOperator {
    pub fn new(branches: Vec<Box<dyn PhysicalOperator>>) -> Self {
        let mut branches = branches.into_iter();
        let current = branches.next();
        Self { branches, current }
    }
}

impl PhysicalOperator for ConcatOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        while let Some(current) = self.current.as_mut() {
            if let Some(row) = current.next()? {
                return Ok(Some(row));
            }
            self.current = self.branches.next();
        }
        Ok(None)
    }
}
