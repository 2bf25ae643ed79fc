//! Document — 필드 이름에서 값으로의 매핑
//!
//! Fields keep their insertion order for output, but equality and ordering
//! ignore it: two documents with the same fields compare equal.

use std::fmt;

use crate::error::{DocqlError, DocqlResult};
use crate::value::path::write_ident;
use crate::value::{Path, PathFragment, Value};

#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Document {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the field in place or appends it.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Document::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Fields sorted by name, the canonical order used for comparison and keys.
    pub(crate) fn sorted_fields(&self) -> Vec<(&str, &Value)> {
        let mut fields: Vec<_> = self.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        fields
    }

    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let (first, rest) = path.fragments().split_first()?;
        match first {
            PathFragment::Field(name) => self.get(name)?.get_path(rest),
            PathFragment::Index(_) => None,
        }
    }

    /// Sets the value at `path`, creating intermediate documents for missing
    /// fields. Array indexes must already exist.
    pub fn set_path(&mut self, path: &Path, value: Value) -> DocqlResult<()> {
        let fragments = path.fragments();
        let Some((PathFragment::Field(name), rest)) = fragments.split_first() else {
            return Err(DocqlError::invalid("path must start with a field", path.to_string()));
        };
        if rest.is_empty() {
            self.set(name.clone(), value);
            return Ok(());
        }
        if self.get(name).is_none() {
            self.set(name.clone(), Value::Document(Document::new()));
        }
        let slot = self
            .get_mut(name)
            .ok_or_else(|| DocqlError::invalid("field vanished", path.to_string()))?;
        set_in_value(slot, rest, value, path)
    }

    /// Removes the value at `path`; returns whether something was removed.
    pub fn delete_path(&mut self, path: &Path) -> bool {
        let fragments = path.fragments();
        let Some((PathFragment::Field(name), rest)) = fragments.split_first() else {
            return false;
        };
        if rest.is_empty() {
            return self.remove(name).is_some();
        }
        match self.get_mut(name) {
            Some(v) => delete_in_value(v, rest),
            None => false,
        }
    }
}

fn set_in_value(
    target: &mut Value,
    fragments: &[PathFragment],
    value: Value,
    full: &Path,
) -> DocqlResult<()> {
    let Some((first, rest)) = fragments.split_first() else {
        *target = value;
        return Ok(());
    };
    match (target, first) {
        (Value::Document(doc), PathFragment::Field(name)) => {
            if rest.is_empty() {
                doc.set(name.clone(), value);
                return Ok(());
            }
            if doc.get(name).is_none() {
                doc.set(name.clone(), Value::Document(Document::new()));
            }
            let child = doc
                .get_mut(name)
                .ok_or_else(|| DocqlError::invalid("field vanished", full.to_string()))?;
            set_in_value(child, rest, value, full)
        }
        (Value::Array(items), PathFragment::Index(i)) => {
            let len = items.len();
            let child = items.get_mut(*i).ok_or_else(|| {
                DocqlError::invalid(format!("index {i} out of range (len {len})"), full.to_string())
            })?;
            set_in_value(child, rest, value, full)
        }
        (other, _) => Err(DocqlError::invalid(
            format!("cannot set path through a {} value", other.value_type()),
            full.to_string(),
        )),
    }
}

fn delete_in_value(target: &mut Value, fragments: &[PathFragment]) -> bool {
    let Some((first, rest)) = fragments.split_first() else {
        return false;
    };
    match (target, first) {
        (Value::Document(doc), PathFragment::Field(name)) => {
            if rest.is_empty() {
                doc.remove(name).is_some()
            } else {
                doc.get_mut(name).is_some_and(|v| delete_in_value(v, rest))
            }
        }
        (Value::Array(items), PathFragment::Index(i)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    items.remove(*i);
                    true
                } else {
                    false
                }
            } else {
                items.get_mut(*i).is_some_and(|v| delete_in_value(v, rest))
            }
        }
        _ => false,
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.set(name, value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// `{a: 1, b: 'x'}` — the document literal syntax.
impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_ident(f, name)?;
            write!(f, ": {value}")?;
        }
        f.write_str("}")
    }
}
