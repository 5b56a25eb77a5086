use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glue_rt::json as rt_json;

use crate::ast::BinaryOp;
use crate::codec;

use super::ExecError;

/// Runtime value. Composites are immutable once built and shared by reference count,
/// so copying a variable aliases the same allocation.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Composite(Arc<Composite>),
}

#[derive(Clone, Debug)]
pub enum Composite {
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Composite(Arc::new(Composite::Array(items)))
    }

    pub fn object(fields: BTreeMap<String, Value>) -> Self {
        Value::Composite(Arc::new(Composite::Object(fields)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::Composite(composite) => match composite.as_ref() {
                Composite::Array(_) => "array",
                Composite::Object(_) => "object",
            },
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Composite(composite) => match composite.as_ref() {
                Composite::Array(items) => Some(items),
                Composite::Object(_) => None,
            },
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Composite(composite) => match composite.as_ref() {
                Composite::Object(fields) => Some(fields),
                Composite::Array(_) => None,
            },
            _ => None,
        }
    }

    /// Text written by `print`.
    pub fn to_string_value(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{v:.6}"),
            Value::String(v) => v.clone(),
            Value::Bool(v) => v.to_string(),
            Value::Composite(_) => rt_json::encode(&codec::value_to_json(self)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

/// Scalars compare by value, ints and floats numerically. Composites compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Composite(a), Value::Composite(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> ExecError {
    ExecError::TypeMismatch(format!(
        "cannot apply `{}` to {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

pub fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arith(op, left, right),
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            compare(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(op, left, right)),
        },
    }
}

pub fn eval_not(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Bool(v) => Ok(Value::Bool(!v)),
        other => Err(ExecError::TypeMismatch(format!(
            "cannot apply `!` to {}",
            other.type_name()
        ))),
    }
}

fn arith(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                _ => {
                    if b == 0 {
                        return Err(ExecError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
            };
            Ok(Value::Int(value))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        _ => {
            let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) else {
                return Err(mismatch(op, left, right));
            };
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(ExecError::DivisionByZero);
                    }
                    a / b
                }
            };
            Ok(Value::Float(value))
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(mismatch(op, left, right)),
        },
    };
    // NaN compares false on every relational operator
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, a: Value, b: Value) -> Result<Value, ExecError> {
        eval_binary(op, &a, &b)
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        for (a, b) in [(7, 2), (-7, 2), (7, -2), (-7, -2), (0, 5), (i64::MIN, -1)] {
            let got = bin(BinaryOp::Div, Value::Int(a), Value::Int(b)).unwrap();
            assert_eq!(got, Value::Int(a.wrapping_div(b)), "{a} / {b}");
        }
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            bin(BinaryOp::Div, Value::Int(1), Value::Int(0)),
            Err(ExecError::DivisionByZero)
        ));
        assert!(matches!(
            bin(BinaryOp::Div, Value::Float(1.0), Value::Int(0)),
            Err(ExecError::DivisionByZero)
        ));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let got = bin(BinaryOp::Add, Value::Int(1), Value::Float(0.5)).unwrap();
        assert!(matches!(got, Value::Float(v) if v == 1.5));
        let got = bin(BinaryOp::Mul, Value::Int(3), Value::Int(4)).unwrap();
        assert!(matches!(got, Value::Int(12)));
    }

    #[test]
    fn string_concatenation_only_for_plus() {
        let got = bin(
            BinaryOp::Add,
            Value::String("ab".into()),
            Value::String("cd".into()),
        )
        .unwrap();
        assert_eq!(got, Value::String("abcd".into()));
        let err = bin(
            BinaryOp::Sub,
            Value::String("a".into()),
            Value::String("b".into()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("string and string"));
        assert!(bin(BinaryOp::Add, Value::String("a".into()), Value::Int(1)).is_err());
    }

    #[test]
    fn composites_compare_by_identity() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = Value::array(vec![Value::Int(1)]);
        let alias = a.clone();
        assert_eq!(bin(BinaryOp::Eq, a.clone(), alias).unwrap(), Value::Bool(true));
        assert_eq!(bin(BinaryOp::Eq, a.clone(), b.clone()).unwrap(), Value::Bool(false));
        assert_eq!(bin(BinaryOp::NotEq, a, b).unwrap(), Value::Bool(true));
    }

    #[test]
    fn relational_operators() {
        assert_eq!(
            bin(BinaryOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            bin(
                BinaryOp::GtEq,
                Value::String("b".into()),
                Value::String("a".into())
            )
            .unwrap(),
            Value::Bool(true)
        );
        assert!(bin(BinaryOp::Lt, Value::Bool(true), Value::Int(1)).is_err());
    }

    #[test]
    fn logical_operators_require_booleans() {
        assert_eq!(
            bin(BinaryOp::And, Value::Bool(true), Value::Bool(false)).unwrap(),
            Value::Bool(false)
        );
        assert!(bin(BinaryOp::Or, Value::Int(1), Value::Bool(true)).is_err());
        assert!(eval_not(&Value::Int(0)).is_err());
        assert_eq!(eval_not(&Value::Bool(false)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Float(3.5).to_string_value(), "3.500000");
        assert_eq!(Value::Int(-4).to_string_value(), "-4");
        assert_eq!(Value::Bool(true).to_string_value(), "true");
        let mut fields = BTreeMap::new();
        fields.insert("k".to_string(), Value::array(vec![Value::Int(1), Value::String("x".into())]));
        assert_eq!(Value::object(fields).to_string_value(), r#"{"k":[1,"x"]}"#);
    }
}
