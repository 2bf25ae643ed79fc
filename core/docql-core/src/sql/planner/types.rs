//! SQL 구문 트리 — 표현식과 문장
//!
//! Every node renders back to SQL through `Display`; the rendering is what
//! EXPLAIN prints and what the catalog stores for DEFAULT and CHECK clauses.

use std::fmt;

use crate::catalog::{FieldConstraint, IndexInfo, SequenceInfo, TableConstraint, TableInfo};
use crate::value::path::write_ident;
use crate::value::{Path, Value, ValueType};

/// Placeholder reference; positional indexes start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamRef {
    Positional(usize),
    Named(String),
}

/// 표현식
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Path),
    Param(ParamRef),
    /// `{a: 1, b: x + 1}`
    Document(Vec<(String, Expr)>),
    /// `[1, 2]`
    Array(Vec<Expr>),
    /// `(1, 2)`, the right side of `IN`.
    List(Vec<Expr>),
    Paren(Box<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        to: ValueType,
    },
    Function(Function),
    NextValueFor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// 이항 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Is,
    IsNot,
    In,
    NotIn,
    Like,
    NotLike,
    Lt,
    Lte,
    Gt,
    Gte,
    BitOr,
    BitXor,
    BitAnd,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Is
            | BinaryOp::IsNot
            | BinaryOp::In
            | BinaryOp::NotIn
            | BinaryOp::Like
            | BinaryOp::NotLike => 3,
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => 4,
            BinaryOp::BitOr => 5,
            BinaryOp::BitXor => 6,
            BinaryOp::BitAnd => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 9,
            BinaryOp::Concat => 10,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::Lt
                | BinaryOp::Lte
                | BinaryOp::Gt
                | BinaryOp::Gte
        )
    }

    /// `a < 1` is `1 > a`.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Lte => BinaryOp::Gte,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Gte => BinaryOp::Lte,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "!=",
            BinaryOp::Is => "IS",
            BinaryOp::IsNot => "IS NOT",
            BinaryOp::In => "IN",
            BinaryOp::NotIn => "NOT IN",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// 내장 함수와 집계 함수
#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    /// Primary key of the current row.
    Pk,
    TypeOf(Box<Expr>),
    Len(Box<Expr>),
    /// `None` is `COUNT(*)`.
    Count(Option<Box<Expr>>),
    Min(Box<Expr>),
    Max(Box<Expr>),
    Sum(Box<Expr>),
    Avg(Box<Expr>),
}

impl Function {
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::Count(_)
                | Function::Min(_)
                | Function::Max(_)
                | Function::Sum(_)
                | Function::Avg(_)
        )
    }

    pub fn argument(&self) -> Option<&Expr> {
        match self {
            Function::Pk | Function::Count(None) => None,
            Function::TypeOf(e)
            | Function::Len(e)
            | Function::Count(Some(e))
            | Function::Min(e)
            | Function::Max(e)
            | Function::Sum(e)
            | Function::Avg(e) => Some(e),
        }
    }
}

impl Expr {
    pub fn path(path: Path) -> Expr {
        Expr::Path(path)
    }

    pub fn literal(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Strips redundant parentheses.
    pub fn unwrap_paren(&self) -> &Expr {
        match self {
            Expr::Paren(e) => e.unwrap_paren(),
            e => e,
        }
    }

    /// Visits every node, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Path(_) | Expr::Param(_) | Expr::NextValueFor(_) => {}
            Expr::Document(fields) => fields.iter().for_each(|(_, e)| e.walk(f)),
            Expr::Array(items) | Expr::List(items) => items.iter().for_each(|e| e.walk(f)),
            Expr::Paren(e) | Expr::Unary { expr: e, .. } | Expr::Cast { expr: e, .. } => e.walk(f),
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::Between { expr, low, high, .. } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            Expr::Function(func) => {
                if let Some(arg) = func.argument() {
                    arg.walk(f);
                }
            }
        }
    }

    /// Rebuilds the tree top-down. Where `f` returns a replacement the
    /// node's children are not visited.
    pub fn map(&self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        let mut go = |e: &Expr| Box::new(e.map(f));
        match self {
            Expr::Literal(_) | Expr::Path(_) | Expr::Param(_) | Expr::NextValueFor(_) => self.clone(),
            Expr::Document(fields) => Expr::Document(
                fields
                    .iter()
                    .map(|(name, e)| (name.clone(), *go(e)))
                    .collect(),
            ),
            Expr::Array(items) => Expr::Array(items.iter().map(|e| *go(e)).collect()),
            Expr::List(items) => Expr::List(items.iter().map(|e| *go(e)).collect()),
            Expr::Paren(e) => Expr::Paren(go(e)),
            Expr::Unary { op, expr } => Expr::Unary {
                op: *op,
                expr: go(expr),
            },
            Expr::Cast { expr, to } => Expr::Cast {
                expr: go(expr),
                to: *to,
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: go(left),
                right: go(right),
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: go(expr),
                low: go(low),
                high: go(high),
                negated: *negated,
            },
            Expr::Function(func) => Expr::Function(match func {
                Function::Pk => Function::Pk,
                Function::Count(None) => Function::Count(None),
                Function::TypeOf(e) => Function::TypeOf(go(e)),
                Function::Len(e) => Function::Len(go(e)),
                Function::Count(Some(e)) => Function::Count(Some(go(e))),
                Function::Min(e) => Function::Min(go(e)),
                Function::Max(e) => Function::Max(go(e)),
                Function::Sum(e) => Function::Sum(go(e)),
                Function::Avg(e) => Function::Avg(go(e)),
            }),
        }
    }

    pub fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= pred(e));
        found
    }

    pub fn contains_aggregate(&self) -> bool {
        self.any(&|e| matches!(e, Expr::Function(f) if f.is_aggregate()))
    }

    /// True when the expression reads nothing from the current row.
    pub fn is_constant(&self) -> bool {
        !self.any(&|e| {
            matches!(e, Expr::Path(_) | Expr::NextValueFor(_))
                || matches!(e, Expr::Function(f) if f.is_aggregate() || *f == Function::Pk)
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Between { .. } => BinaryOp::Lt.precedence(),
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => 2,
            _ => u8::MAX,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamRef::Positional(_) => f.write_str("?"),
            ParamRef::Named(name) => write!(f, "${name}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Path(p) => write!(f, "{p}"),
            Expr::Param(p) => write!(f, "{p}"),
            Expr::Document(fields) => {
                f.write_str("{")?;
                for (i, (name, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_ident(f, name)?;
                    write!(f, ": {e}")?;
                }
                f.write_str("}")
            }
            Expr::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::List(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Expr::Paren(e) => write!(f, "({e})"),
            Expr::Unary { op: UnaryOp::Neg, expr } => {
                f.write_str("-")?;
                expr.write_operand(f, u8::MAX)
            }
            Expr::Unary { op: UnaryOp::Not, expr } => {
                f.write_str("NOT ")?;
                expr.write_operand(f, 3)
            }
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                left.write_operand(f, p)?;
                write!(f, " {} ", op.symbol())?;
                right.write_operand(f, p + 1)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let p = self.precedence() + 1;
                expr.write_operand(f, p)?;
                f.write_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " })?;
                low.write_operand(f, p)?;
                f.write_str(" AND ")?;
                high.write_operand(f, p)
            }
            Expr::Cast { expr, to } => write!(f, "CAST({expr} AS {})", to.sql_name()),
            Expr::Function(func) => write!(f, "{func}"),
            Expr::NextValueFor(name) => {
                f.write_str("NEXT VALUE FOR ")?;
                write_ident(f, name)
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Pk => f.write_str("pk()"),
            Function::TypeOf(e) => write!(f, "typeof({e})"),
            Function::Len(e) => write!(f, "len({e})"),
            Function::Count(None) => f.write_str("COUNT(*)"),
            Function::Count(Some(e)) => write!(f, "COUNT({e})"),
            Function::Min(e) => write!(f, "MIN({e})"),
            Function::Max(e) => write!(f, "MAX({e})"),
            Function::Sum(e) => write!(f, "SUM({e})"),
            Function::Avg(e) => write!(f, "AVG({e})"),
        }
    }
}

// ════════════════════════════════════════
// Statements
// ════════════════════════════════════════

/// One projected item of a SELECT or RETURNING clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

impl Projected {
    /// Output field name.
    pub fn name(&self) -> String {
        match self {
            Projected::Wildcard => "*".to_string(),
            Projected::Expr {
                alias: Some(alias), ..
            } => alias.clone(),
            Projected::Expr { expr, .. } => expr.to_string(),
        }
    }
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projected::Wildcard => f.write_str("*"),
            Projected::Expr { expr, alias: None } => write!(f, "{expr}"),
            Projected::Expr {
                expr,
                alias: Some(alias),
            } => {
                write!(f, "{expr} AS ")?;
                write_ident(f, alias)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

/// `UNION` removes duplicate rows, `UNION ALL` keeps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    Union,
    UnionAll,
}

/// A SELECT statement. With `compound` set, `order_by`, `limit` and
/// `offset` apply to the combined rows and the compound cores carry none.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStmt {
    pub distinct: bool,
    pub projection: Vec<Projected>,
    pub from: Option<String>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub compound: Vec<(CompoundOp, SelectStmt)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    DoNothing,
    DoReplace,
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnConflict::DoNothing => f.write_str("DO NOTHING"),
            OnConflict::DoReplace => f.write_str("DO REPLACE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// Each expression yields one document.
    Values(Vec<Expr>),
    Select(Box<SelectStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    /// Explicit field list of `INSERT INTO t (a, b) ...`.
    pub fields: Vec<String>,
    pub source: InsertSource,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<Projected>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(Vec<(Path, Expr)>),
    Unset(Vec<Path>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub action: UpdateAction,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterTable {
    RenameTo(String),
    AddField {
        field: FieldConstraint,
        constraints: Vec<TableConstraint>,
    },
}

/// 파싱된 SQL 문장
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable {
        info: TableInfo,
        if_not_exists: bool,
    },
    CreateIndex {
        info: IndexInfo,
        if_not_exists: bool,
    },
    CreateSequence {
        info: SequenceInfo,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    DropIndex {
        name: String,
        if_exists: bool,
    },
    DropSequence {
        name: String,
        if_exists: bool,
    },
    AlterTable {
        table: String,
        action: AlterTable,
    },
    /// `None` reindexes everything.
    Reindex(Option<String>),
    Begin {
        writable: bool,
    },
    Commit,
    Rollback,
    Explain(Box<Statement>),
}

impl Statement {
    /// Whether the statement can run in a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        match self {
            Statement::Select(s) => !s.has_side_effects(),
            Statement::Explain(_) => true,
            _ => false,
        }
    }

    /// Statements that run eagerly and return no rows.
    pub fn produces_rows(&self) -> bool {
        match self {
            Statement::Select(_) | Statement::Explain(_) => true,
            Statement::Insert(i) => !i.returning.is_empty(),
            _ => false,
        }
    }
}

impl SelectStmt {
    /// `NEXT VALUE FOR` writes the sequence lease.
    fn has_side_effects(&self) -> bool {
        let mut found = false;
        let mut check = |e: &Expr| found |= e.any(&|e| matches!(e, Expr::NextValueFor(_)));
        for p in &self.projection {
            if let Projected::Expr { expr, .. } = p {
                check(expr);
            }
        }
        for e in [&self.where_clause, &self.limit, &self.offset].into_iter().flatten() {
            check(e);
        }
        found || self.compound.iter().any(|(_, core)| core.has_side_effects())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Expr {
        Expr::Path(Path::parse_simple(s).unwrap())
    }

    #[test]
    fn renders_with_minimal_parentheses() {
        let e = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, path("a"), Expr::literal(1)),
            Expr::literal(2),
        );
        assert_eq!(e.to_string(), "(a + 1) * 2");

        let e = Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Gt, path("a"), Expr::literal(10)),
            Expr::binary(BinaryOp::Eq, path("b.c"), Expr::literal("x")),
        );
        assert_eq!(e.to_string(), "a > 10 AND b.c = 'x'");
    }

    #[test]
    fn constant_detection() {
        assert!(Expr::binary(BinaryOp::Add, Expr::literal(1), Expr::literal(2)).is_constant());
        assert!(Expr::Param(ParamRef::Positional(1)).is_constant());
        assert!(!path("a").is_constant());
        assert!(!Expr::Function(Function::Pk).is_constant());
    }

    #[test]
    fn aggregate_names() {
        let count = Expr::Function(Function::Count(None));
        assert!(count.contains_aggregate());
        let p = Projected::Expr {
            expr: count,
            alias: None,
        };
        assert_eq!(p.name(), "COUNT(*)");
    }
}
