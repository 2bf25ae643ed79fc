//! Value ordering.
//!
//! Two orders are defined:
//!
//! - the *total* order (`Ord`), identical to the byte order of the key
//!   encoding. Numbers compare by numeric value across integer and double;
//!   when an integer and a double are numerically equal the double sorts
//!   first.
//! - the *SQL* order ([`Value::sql_cmp`]) used by comparison operators, where
//!   `NULL` and values of unrelated types are incomparable and `2 = 2.0`.

use std::cmp::Ordering;

use crate::value::{Document, Value};

/// Monotonic `u64` image of a double: unsigned order equals numeric order.
/// `-0.0` folds into `0.0` and every NaN into one NaN sorting above `+inf`.
pub(crate) fn double_key(d: f64) -> u64 {
    let d = if d == 0.0 {
        0.0
    } else if d.is_nan() {
        f64::NAN
    } else {
        d
    };
    let bits = d.to_bits();
    if bits >> 63 == 1 { !bits } else { bits | (1 << 63) }
}

pub(crate) fn double_from_key(key: u64) -> f64 {
    let bits = if key >> 63 == 1 { key & !(1 << 63) } else { !key };
    f64::from_bits(bits)
}

/// Numeric comparison of an integer against a double.
pub(crate) fn cmp_int_double(i: i64, d: f64) -> Ordering {
    if d.is_nan() {
        return Ordering::Less;
    }
    // 2^63 is exactly representable
    if d >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    if d < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    let t = d.trunc() as i64;
    match i.cmp(&t) {
        Ordering::Equal => {
            let fract = d.fract();
            if fract > 0.0 {
                Ordering::Less
            } else if fract < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

fn cmp_doubles(a: f64, b: f64) -> Ordering {
    double_key(a).cmp(&double_key(b))
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Integer(_) | Value::Double(_) => 2,
        Value::Text(_) => 3,
        Value::Blob(_) => 4,
        Value::Array(_) => 5,
        Value::Document(_) => 6,
    }
}

/// Numeric order ignoring representation; `equal_tiebreak` separates
/// `2.0` from `2` for the total order.
fn cmp_numbers(a: &Value, b: &Value, equal_tiebreak: bool) -> Ordering {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => cmp_doubles(*x, *y),
        (Value::Integer(x), Value::Double(y)) => {
            let ord = cmp_int_double(*x, *y);
            if ord == Ordering::Equal && equal_tiebreak {
                Ordering::Greater
            } else {
                ord
            }
        }
        (Value::Double(x), Value::Integer(y)) => {
            let ord = cmp_int_double(*y, *x).reverse();
            if ord == Ordering::Equal && equal_tiebreak {
                Ordering::Less
            } else {
                ord
            }
        }
        _ => Ordering::Equal,
    }
}

fn cmp_values(a: &Value, b: &Value, strict: bool) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => cmp_arrays(x, y, strict),
        (Value::Document(x), Value::Document(y)) => cmp_documents(x, y, strict),
        _ => cmp_numbers(a, b, strict),
    }
}

fn cmp_arrays(x: &[Value], y: &[Value], strict: bool) -> Ordering {
    for (a, b) in x.iter().zip(y) {
        let ord = cmp_values(a, b, strict);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    x.len().cmp(&y.len())
}

fn cmp_documents(x: &Document, y: &Document, strict: bool) -> Ordering {
    let xs = x.sorted_fields();
    let ys = y.sorted_fields();
    for ((xn, xv), (yn, yv)) in xs.iter().zip(&ys) {
        let ord = xn.as_bytes().cmp(yn.as_bytes());
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = cmp_values(xv, yv, strict);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    xs.len().cmp(&ys.len())
}

impl Value {
    /// Comparison used by SQL operators.
    ///
    /// Returns `None` when either side is `NULL` or the two values belong
    /// to different type families.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if type_rank(self) != type_rank(other) {
            return None;
        }
        Some(cmp_values(self, other, false))
    }

    /// SQL equality; `None` for `NULL` operands.
    pub fn sql_eq(&self, other: &Value) -> Option<bool> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sql_cmp(other) == Some(Ordering::Equal))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_values(self, other, true)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        cmp_documents(self, other, true) == Ordering::Equal
    }
}

impl Eq for Document {}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_documents(self, other, true)
    }
}

/// Integers hash through their double image so `2` and `2.0` share a bucket.
impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        type_rank(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(i) => double_key(*i as f64).hash(state),
            Value::Double(d) => double_key(*d).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Blob(b) => b.hash(state),
            Value::Array(items) => {
                for item in items {
                    item.hash(state);
                }
            }
            Value::Document(doc) => {
                for (name, value) in doc.sorted_fields() {
                    name.hash(state);
                    value.hash(state);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_type_rank() {
        let ordered = vec![
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Integer(-5),
            Value::Double(1.5),
            Value::Integer(2),
            Value::Text("a".into()),
            Value::Blob(vec![0]),
            Value::Array(vec![]),
            Value::Document(Document::new()),
        ];
        for w in ordered.windows(2) {
            assert!(w[0] < w[1], "{:?} < {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn integer_double_overlap() {
        assert!(Value::Double(2.0) < Value::Integer(2));
        assert_eq!(Value::Integer(2).sql_cmp(&Value::Double(2.0)), Some(Ordering::Equal));
        assert!(Value::Integer(3) > Value::Double(2.5));
        assert!(Value::Integer(i64::MAX) < Value::Double(1e19));
    }

    #[test]
    fn sql_cmp_incomparable() {
        assert_eq!(Value::Integer(1).sql_cmp(&Value::Text("1".into())), None);
        assert_eq!(Value::Null.sql_eq(&Value::Null), None);
        assert_eq!(Value::Bool(true).sql_eq(&Value::Bool(true)), Some(true));
    }

    #[test]
    fn double_key_roundtrip_and_order() {
        let values = [f64::NEG_INFINITY, -1e10, -1.0, 0.0, 1e-300, 1.0, 1e10, f64::INFINITY];
        for w in values.windows(2) {
            assert!(double_key(w[0]) < double_key(w[1]));
        }
        for v in values {
            assert_eq!(double_from_key(double_key(v)), v);
        }
        assert_eq!(double_key(-0.0), double_key(0.0));
        assert!(double_key(f64::NAN) > double_key(f64::INFINITY));
    }

    #[test]
    fn cmp_int_double_edges() {
        assert_eq!(cmp_int_double(1, 1.5), Ordering::Less);
        assert_eq!(cmp_int_double(-1, -1.5), Ordering::Greater);
        assert_eq!(cmp_int_double(i64::MIN, -9.3e18), Ordering::Greater);
        assert_eq!(cmp_int_double(0, f64::NAN), Ordering::Less);
    }
}
