//! Type conversions: explicit `CAST(x AS type)` and the stricter coercion
//! applied when a value is stored under a typed field constraint.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{DocqlError, DocqlResult};
use crate::value::{Value, ValueType};

impl Value {
    /// `CAST` semantics. `NULL` casts to `NULL` for every target.
    pub fn cast_as(&self, target: ValueType) -> DocqlResult<Value> {
        if self.value_type() == target || self.is_null() {
            return Ok(self.clone());
        }
        let fail = || DocqlError::type_mismatch(target, self.value_type());
        let v = match target {
            ValueType::Null => Value::Null,
            ValueType::Bool => match self {
                Value::Integer(i) => Value::Bool(*i != 0),
                Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => return Err(fail()),
                },
                _ => return Err(fail()),
            },
            ValueType::Integer => match self {
                Value::Bool(b) => Value::Integer(*b as i64),
                Value::Double(d) => Value::Integer(double_to_integer(*d).ok_or_else(fail)?),
                Value::Text(s) => {
                    let s = s.trim();
                    match s.parse::<i64>() {
                        Ok(i) => Value::Integer(i),
                        Err(_) => {
                            let d = s.parse::<f64>().map_err(|_| fail())?;
                            Value::Integer(double_to_integer(d).ok_or_else(fail)?)
                        }
                    }
                }
                _ => return Err(fail()),
            },
            ValueType::Double => match self {
                Value::Integer(i) => Value::Double(*i as f64),
                Value::Text(s) => Value::Double(s.trim().parse::<f64>().map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            ValueType::Text => match self {
                Value::Bool(b) => Value::Text(b.to_string()),
                Value::Integer(i) => Value::Text(i.to_string()),
                Value::Double(d) => Value::Text(Value::Double(*d).to_string()),
                Value::Blob(b) => Value::Text(STANDARD.encode(b)),
                Value::Array(_) | Value::Document(_) => Value::Text(self.to_json().to_string()),
                _ => return Err(fail()),
            },
            ValueType::Blob => match self {
                Value::Text(s) => Value::Blob(STANDARD.decode(s).map_err(|_| fail())?),
                _ => return Err(fail()),
            },
            ValueType::Array => match self {
                Value::Text(s) => match Value::from_json_str(s).map_err(|_| fail())? {
                    v @ Value::Array(_) => v,
                    _ => return Err(fail()),
                },
                _ => return Err(fail()),
            },
            ValueType::Document => match self {
                Value::Text(s) => match Value::from_json_str(s).map_err(|_| fail())? {
                    v @ Value::Document(_) => v,
                    _ => return Err(fail()),
                },
                _ => return Err(fail()),
            },
        };
        Ok(v)
    }

    /// Coercion for typed fields and typed index keys: only lossless
    /// numeric conversions are performed, everything else must already match.
    pub fn convert_to(&self, target: ValueType) -> DocqlResult<Value> {
        match (self, target) {
            (v, t) if v.value_type() == t => Ok(v.clone()),
            (Value::Null, _) => Ok(Value::Null),
            (Value::Integer(i), ValueType::Double) => Ok(Value::Double(*i as f64)),
            (Value::Double(d), ValueType::Integer) if d.fract() == 0.0 => double_to_integer(*d)
                .map(Value::Integer)
                .ok_or_else(|| DocqlError::type_mismatch(target, self.value_type())),
            _ => Err(DocqlError::type_mismatch(target, self.value_type())),
        }
    }
}

fn double_to_integer(d: f64) -> Option<i64> {
    if !d.is_finite() || d >= 9_223_372_036_854_775_808.0 || d < -9_223_372_036_854_775_808.0 {
        return None;
    }
    Some(d.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cast_numbers() {
        assert_eq!(Value::Double(3.9).cast_as(ValueType::Integer).unwrap(), Value::Integer(3));
        assert_eq!(Value::Integer(3).cast_as(ValueType::Double).unwrap(), Value::Double(3.0));
        assert_eq!(Value::from("42").cast_as(ValueType::Integer).unwrap(), Value::Integer(42));
        assert_eq!(Value::from("4.5").cast_as(ValueType::Integer).unwrap(), Value::Integer(4));
        assert!(Value::Double(f64::INFINITY).cast_as(ValueType::Integer).is_err());
        assert!(Value::from("abc").cast_as(ValueType::Double).is_err());
    }

    #[test]
    fn cast_text_and_containers() {
        assert_eq!(Value::Bool(true).cast_as(ValueType::Text).unwrap(), Value::from("true"));
        assert_eq!(Value::Double(2.0).cast_as(ValueType::Text).unwrap(), Value::from("2.0"));
        let arr = Value::from("[1, 2.5]").cast_as(ValueType::Array).unwrap();
        assert_eq!(arr, Value::Array(vec![Value::Integer(1), Value::Double(2.5)]));
        let blob = Value::from("AQI=").cast_as(ValueType::Blob).unwrap();
        assert_eq!(blob, Value::Blob(vec![1, 2]));
        assert_eq!(Value::Null.cast_as(ValueType::Integer).unwrap(), Value::Null);
    }

    #[test]
    fn convert_is_strict() {
        assert_eq!(Value::Double(2.0).convert_to(ValueType::Integer).unwrap(), Value::Integer(2));
        assert!(Value::Double(2.5).convert_to(ValueType::Integer).is_err());
        assert!(Value::from("2").convert_to(ValueType::Integer).is_err());
        assert_eq!(Value::Integer(2).convert_to(ValueType::Double).unwrap(), Value::Double(2.0));
    }
}
