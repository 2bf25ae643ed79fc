//! Expression evaluation over one document.
//!
//! Three-valued logic: comparisons involving `NULL` yield `NULL`, `AND`
//! and `OR` follow SQL truth tables, and a filter keeps a row only when its
//! predicate is truthy. Arithmetic never raises: overflow, division by zero
//! and non-numeric operands all evaluate to `NULL`.

use std::cmp::Ordering;

use crate::encoding::decode_values;
use crate::engine::query::Param;
use crate::engine::transaction::Transaction;
use crate::error::{DocqlError, DocqlResult};
use crate::sql::planner::{BinaryOp, Expr, Function, ParamRef, UnaryOp};
use crate::value::{Document, Value};

/// Evaluation context: bound parameters, the running transaction, and the
/// current row.
#[derive(Clone, Copy, Default)]
pub struct Env<'a> {
    params: &'a [Param],
    tx: Option<&'a Transaction>,
    doc: Option<&'a Document>,
    key: Option<&'a [u8]>,
}

impl<'a> Env<'a> {
    pub fn new(params: &'a [Param]) -> Self {
        Env {
            params,
            ..Env::default()
        }
    }

    pub fn with_tx(tx: &'a Transaction) -> Self {
        Env {
            tx: Some(tx),
            ..Env::default()
        }
    }

    pub fn tx(mut self, tx: Option<&'a Transaction>) -> Self {
        self.tx = tx;
        self
    }

    pub fn on_doc(mut self, doc: &'a Document) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn on_row(mut self, key: Option<&'a [u8]>, doc: &'a Document) -> Self {
        self.key = key;
        self.doc = Some(doc);
        self
    }

    pub fn params(&self) -> &'a [Param] {
        self.params
    }

    pub fn param(&self, r: &ParamRef) -> DocqlResult<Value> {
        let found = match r {
            ParamRef::Positional(n) => self.params.get(n.wrapping_sub(1)).map(Param::value),
            ParamRef::Named(name) => self.params.iter().find_map(|p| match p {
                Param::Named(n, v) if n == name => Some(v),
                _ => None,
            }),
        };
        found
            .cloned()
            .ok_or_else(|| {
                DocqlError::ParamNotFound(match r {
                    ParamRef::Positional(n) => format!("?{n}"),
                    ParamRef::Named(name) => format!("${name}"),
                })
            })
    }
}

/// 표현식 평가
pub fn eval(expr: &Expr, env: &Env<'_>) -> DocqlResult<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(path) => match env.doc {
            Some(doc) => Ok(doc.get_path(path).cloned().unwrap_or(Value::Null)),
            None => Err(DocqlError::invalid(
                format!("field {path} referenced without a table"),
                "eval",
            )),
        },
        Expr::Param(r) => env.param(r),
        Expr::Document(fields) => {
            let mut doc = Document::with_capacity(fields.len());
            for (name, e) in fields {
                doc.set(name.clone(), eval(e, env)?);
            }
            Ok(Value::Document(doc))
        }
        Expr::Array(items) | Expr::List(items) => Ok(Value::Array(
            items
                .iter()
                .map(|e| eval(e, env))
                .collect::<DocqlResult<_>>()?,
        )),
        Expr::Paren(e) => eval(e, env),
        Expr::Unary { op, expr } => {
            let v = eval(expr, env)?;
            Ok(match (op, v) {
                (_, Value::Null) => Value::Null,
                (UnaryOp::Not, v) => Value::Bool(!v.is_truthy()),
                (UnaryOp::Neg, Value::Integer(i)) => i.checked_neg().map_or(Value::Null, Value::Integer),
                (UnaryOp::Neg, Value::Double(d)) => Value::Double(-d),
                (UnaryOp::Neg, _) => Value::Null,
            })
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, env),
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = eval(expr, env)?;
            let lo = compare(BinaryOp::Gte, &v, &eval(low, env)?);
            let hi = compare(BinaryOp::Lte, &v, &eval(high, env)?);
            let r = and(lo, hi);
            Ok(if *negated { not(r) } else { r })
        }
        Expr::Cast { expr, to } => eval(expr, env)?.cast_as(*to),
        Expr::Function(f) => eval_function(f, env),
        Expr::NextValueFor(name) => match env.tx {
            Some(tx) => Ok(Value::Integer(tx.next_sequence_value(name)?)),
            None => Err(DocqlError::invalid(
                "NEXT VALUE FOR requires a transaction",
                name.clone(),
            )),
        },
    }
}

/// Evaluates `expr` as a filter predicate.
pub fn eval_predicate(expr: &Expr, env: &Env<'_>) -> DocqlResult<bool> {
    Ok(eval(expr, env)?.is_truthy())
}

fn eval_function(f: &Function, env: &Env<'_>) -> DocqlResult<Value> {
    match f {
        Function::Pk => match env.key {
            None => Ok(Value::Null),
            Some(key) => {
                let mut values = decode_values(key)?;
                Ok(if values.len() == 1 {
                    values.remove(0)
                } else {
                    Value::Array(values)
                })
            }
        },
        Function::TypeOf(e) => Ok(Value::Text(eval(e, env)?.value_type().to_string())),
        Function::Len(e) => Ok(match eval(e, env)? {
            Value::Text(s) => Value::Integer(s.chars().count() as i64),
            Value::Blob(b) => Value::Integer(b.len() as i64),
            Value::Array(items) => Value::Integer(items.len() as i64),
            Value::Document(doc) => Value::Integer(doc.len() as i64),
            _ => Value::Null,
        }),
        aggregate => Err(DocqlError::invalid(
            format!("aggregate {aggregate} is not allowed here"),
            "eval",
        )),
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Env<'_>) -> DocqlResult<Value> {
    match op {
        BinaryOp::And => {
            let l = eval(left, env)?;
            if !l.is_null() && !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(and(l, eval(right, env)?))
        }
        BinaryOp::Or => {
            let l = eval(left, env)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(or(l, eval(right, env)?))
        }
        BinaryOp::In | BinaryOp::NotIn => {
            let v = eval(left, env)?;
            let candidates = match right.unwrap_paren() {
                Expr::List(items) => items
                    .iter()
                    .map(|e| eval(e, env))
                    .collect::<DocqlResult<Vec<_>>>()?,
                e => match eval(e, env)? {
                    Value::Array(items) => items,
                    other => vec![other],
                },
            };
            let r = contains(&v, &candidates);
            Ok(if op == BinaryOp::NotIn { not(r) } else { r })
        }
        _ => {
            let l = eval(left, env)?;
            let r = eval(right, env)?;
            Ok(binary(op, &l, &r))
        }
    }
}

/// Applies a non short-circuiting binary operator to evaluated operands.
pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::And => and(l.clone(), r.clone()),
        BinaryOp::Or => or(l.clone(), r.clone()),
        BinaryOp::Eq
        | BinaryOp::Neq
        | BinaryOp::Lt
        | BinaryOp::Lte
        | BinaryOp::Gt
        | BinaryOp::Gte => compare(op, l, r),
        BinaryOp::Is => Value::Bool(is_same(l, r)),
        BinaryOp::IsNot => Value::Bool(!is_same(l, r)),
        BinaryOp::In => contains(l, std::slice::from_ref(r)),
        BinaryOp::NotIn => not(contains(l, std::slice::from_ref(r))),
        BinaryOp::Like | BinaryOp::NotLike => match (l, r) {
            (Value::Text(s), Value::Text(p)) => {
                let m = like(s, p);
                Value::Bool(if op == BinaryOp::Like { m } else { !m })
            }
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            _ => Value::Bool(false),
        },
        BinaryOp::Concat => match (l, r) {
            (Value::Text(a), Value::Text(b)) => Value::Text(format!("{a}{b}")),
            _ => Value::Null,
        },
        BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd => match (l, r) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(match op {
                BinaryOp::BitOr => a | b,
                BinaryOp::BitXor => a ^ b,
                _ => a & b,
            }),
            _ => Value::Null,
        },
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, l, r)
        }
    }
}

/// SQL comparison; incompatible types compare as `false`.
pub fn compare(op: BinaryOp, l: &Value, r: &Value) -> Value {
    if l.is_null() || r.is_null() {
        return Value::Null;
    }
    let Some(ord) = l.sql_cmp(r) else {
        return Value::Bool(false);
    };
    Value::Bool(match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Neq => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Lte => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Gte => ord != Ordering::Less,
        _ => false,
    })
}

/// Null-safe equality of `IS`.
fn is_same(l: &Value, r: &Value) -> bool {
    match (l.is_null(), r.is_null()) {
        (true, true) => true,
        (false, false) => l.sql_eq(r) == Some(true),
        _ => false,
    }
}

fn contains(v: &Value, candidates: &[Value]) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for c in candidates {
        match v.sql_eq(c) {
            Some(true) => return Value::Bool(true),
            None => saw_null = true,
            Some(false) => {}
        }
    }
    if saw_null { Value::Null } else { Value::Bool(false) }
}

fn and(l: Value, r: Value) -> Value {
    let falsy = |v: &Value| !v.is_null() && !v.is_truthy();
    if falsy(&l) || falsy(&r) {
        Value::Bool(false)
    } else if l.is_null() || r.is_null() {
        Value::Null
    } else {
        Value::Bool(true)
    }
}

fn or(l: Value, r: Value) -> Value {
    if l.is_truthy() || r.is_truthy() {
        Value::Bool(true)
    } else if l.is_null() || r.is_null() {
        Value::Null
    } else {
        Value::Bool(false)
    }
}

fn not(v: Value) -> Value {
    if v.is_null() {
        Value::Null
    } else {
        Value::Bool(!v.is_truthy())
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            let (a, b) = (*a, *b);
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            out.map_or(Value::Null, Value::Integer)
        }
        (Value::Integer(_) | Value::Double(_), Value::Integer(_) | Value::Double(_)) => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Value::Null;
            };
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
                return Value::Null;
            }
            Value::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })
        }
        _ => Value::Null,
    }
}

/// `LIKE` matching: `%` spans any run of characters, `_` exactly one.
fn like(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut i, mut j) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while i < s.len() {
        if j < p.len() && (p[j] == '_' || p[j] == s[i]) {
            i += 1;
            j += 1;
        } else if j < p.len() && p[j] == '%' {
            backtrack = Some((j, i));
            j += 1;
        } else if let Some((pj, si)) = backtrack {
            j = pj + 1;
            i = si + 1;
            backtrack = Some((pj, si + 1));
        } else {
            return false;
        }
    }
    p[j..].iter().all(|c| *c == '%')
}
