//! Distinct Operator — SELECT DISTINCT

use ahash::AHashSet;

use crate::encoding::encode_key;
use crate::error::DocqlResult;
use crate::sql::executor::operators::{PhysicalOperator, Row};
use crate::value::Value;

/// Drops rows equal to one already returned. Documents compare by value:
/// field order is ignored and `1` equals `1.0`.
pub struct DistinctOperator {
    input: Box<dyn PhysicalOperator>,
    seen: AHashSet<Vec<u8>>,
}

impl DistinctOperator {
    pub fn new(input: Box<dyn PhysicalOperator>) -> Self {
        Self {
            input,
            seen: AHashSet::new(),
        }
    }
}

/// Identity of a row's document.
pub(crate) fn row_identity(row: &Row) -> Vec<u8> {
    encode_key(&[Value::Document(row.doc.clone())])
}

impl PhysicalOperator for DistinctOperator {
    fn next(&mut self) -> DocqlResult<Option<Row>> {
        while let Some(row) = self.input.next()? {
            if self.seen.insert(row_identity(&row)) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}
