//! Field paths (`a.b[0]`) addressing values nested inside documents.

use std::fmt;

use smallvec::SmallVec;

use crate::error::{DocqlError, DocqlResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathFragment {
    Field(String),
    Index(usize),
}

/// A path from the root of a document to a nested value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Path(SmallVec<[PathFragment; 2]>);

/// Words that must be backquoted when rendered as identifiers.
const RESERVED: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CAST", "CHECK",
    "COMMIT", "CONFLICT", "CREATE", "DEFAULT", "DELETE", "DESC", "DO", "DROP", "EXISTS",
    "EXPLAIN", "FALSE", "FIELD", "FOR", "FROM", "GROUP", "IF", "IN", "INDEX", "INSERT", "INTO",
    "IS", "KEY", "LIKE", "LIMIT", "NEXT", "NOT", "NOTHING", "NULL", "OFFSET", "ON", "OR",
    "ORDER", "PRIMARY", "REINDEX", "RENAME", "REPLACE", "RETURNING", "ROLLBACK", "SELECT",
    "SEQUENCE", "SET", "TABLE", "TO", "TRUE", "UNIQUE", "UNSET", "UPDATE", "VALUE", "VALUES",
    "WHERE",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Writes `name` as an identifier, backquoting it when needed.
pub(crate) fn write_ident(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !is_reserved(name)
        }
        _ => false,
    };
    if plain {
        f.write_str(name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}

impl Path {
    pub fn new(fragments: impl IntoIterator<Item = PathFragment>) -> Self {
        Path(fragments.into_iter().collect())
    }

    /// Single top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        let mut v = SmallVec::new();
        v.push(PathFragment::Field(name.into()));
        Path(v)
    }

    pub fn fragments(&self) -> &[PathFragment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, fragment: PathFragment) {
        self.0.push(fragment);
    }

    /// Path without its last fragment, `None` for a top-level path.
    pub fn parent(&self) -> Option<Path> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Path(self.0[..self.0.len() - 1].iter().cloned().collect()))
    }

    pub fn last(&self) -> Option<&PathFragment> {
        self.0.last()
    }

    /// Name of the first fragment when it is a field.
    pub fn first_field(&self) -> Option<&str> {
        match self.0.first() {
            Some(PathFragment::Field(name)) => Some(name),
            _ => None,
        }
    }

    /// Whether `self` is `other` or one of its descendants.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// Parses the unquoted `a.b[0]` form used in tests and system code.
    /// SQL text goes through the statement parser instead.
    pub fn parse_simple(s: &str) -> DocqlResult<Path> {
        let mut path = Path::default();
        for (i, part) in s.split('.').enumerate() {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() && !(i == 0 && !rest.is_empty()) {
                return Err(DocqlError::invalid("invalid path", s));
            }
            if !name.is_empty() {
                path.push(PathFragment::Field(name.to_string()));
            }
            while let Some(stripped) = rest.strip_prefix('[') {
                let end = stripped
                    .find(']')
                    .ok_or_else(|| DocqlError::invalid("unterminated index in path", s))?;
                let idx = stripped[..end]
                    .parse::<usize>()
                    .map_err(|_| DocqlError::invalid("invalid index in path", s))?;
                path.push(PathFragment::Index(idx));
                rest = &stripped[end + 1..];
            }
            if !rest.is_empty() {
                return Err(DocqlError::invalid("invalid path", s));
            }
        }
        Ok(path)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fragment) in self.0.iter().enumerate() {
            match fragment {
                PathFragment::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write_ident(f, name)?;
                }
                PathFragment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}
