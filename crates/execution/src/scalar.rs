//! Row-level values used by grouping, joining and sorting.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow_schema::DataType;
use fdq_common::{FdqError, Result};

/// One cell. Floats are stored as bits so values can be hashed and compared for
/// equality the way group keys need; build them with [`ScalarValue::float`] so
/// `-0.0` and every NaN share one representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Int64(i64),
    Float64Bits(u64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl ScalarValue {
    pub fn float(v: f64) -> Self {
        let v = if v.is_nan() {
            f64::NAN
        } else if v == 0.0 {
            0.0
        } else {
            v
        };
        Self::Float64Bits(v.to_bits())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64Bits(v) => Some(f64::from_bits(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Boolean(_) => 0,
            Self::Int64(_) | Self::Float64Bits(_) => 1,
            Self::Utf8(_) => 2,
            Self::Null => 3,
        }
    }
}

/// Natural ascending order with NULL after every non-null value.
pub fn cmp_natural(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    use ScalarValue::*;
    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Greater,
        (_, Null) => Ordering::Less,
        (Int64(x), Int64(y)) => x.cmp(y),
        (Utf8(x), Utf8(y)) => x.cmp(y),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.total_cmp(&fy),
            _ => x.type_rank().cmp(&y.type_rank()),
        },
    }
}

/// Order for one sort key: direction applies to non-null values, NULL stays last.
pub fn cmp_directed(a: &ScalarValue, b: &ScalarValue, descending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (false, false) if descending => cmp_natural(b, a),
        _ => cmp_natural(a, b),
    }
}

pub fn cmp_keys(a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = cmp_natural(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Byte encoding of a composite key; distinct keys never collide.
pub fn encode_group_key(values: &[ScalarValue]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 16);
    for value in values {
        match value {
            ScalarValue::Null => out.push(0),
            ScalarValue::Int64(v) => {
                out.push(1);
                out.extend_from_slice(&v.to_le_bytes());
            }
            ScalarValue::Float64Bits(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_le_bytes());
            }
            ScalarValue::Boolean(v) => {
                out.push(3);
                out.push(u8::from(*v));
            }
            ScalarValue::Utf8(s) => {
                out.push(4);
                let len = s.len() as u32;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
        out.push(0xff);
    }
    out
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, what: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| FdqError::Execution(format!("expected {what}")))
}

pub fn scalar_from_array(array: &ArrayRef, row: usize) -> Result<ScalarValue> {
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    match array.data_type() {
        DataType::Int64 => Ok(ScalarValue::Int64(
            downcast::<Int64Array>(array, "Int64Array")?.value(row),
        )),
        DataType::Float64 => Ok(ScalarValue::float(
            downcast::<Float64Array>(array, "Float64Array")?.value(row),
        )),
        DataType::Utf8 => Ok(ScalarValue::Utf8(
            downcast::<StringArray>(array, "StringArray")?
                .value(row)
                .to_string(),
        )),
        DataType::Boolean => Ok(ScalarValue::Boolean(
            downcast::<BooleanArray>(array, "BooleanArray")?.value(row),
        )),
        DataType::Null => Ok(ScalarValue::Null),
        other => Err(FdqError::Unsupported(format!(
            "scalar type not supported: {other:?}"
        ))),
    }
}

pub fn scalars_to_array(values: &[ScalarValue], dt: &DataType) -> Result<ArrayRef> {
    let mismatch = |dt: &DataType| {
        FdqError::Execution(format!("type mismatch while building {dt:?} array"))
    };
    match dt {
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Int64(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch(dt)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Float64Bits(x) => b.append_value(f64::from_bits(*x)),
                    ScalarValue::Int64(x) => b.append_value(*x as f64),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch(dt)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Utf8 => {
            let mut b = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v {
                    ScalarValue::Utf8(x) => b.append_value(x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch(dt)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Boolean(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch(dt)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Null => Ok(arrow::array::new_null_array(&DataType::Null, values.len())),
        other => Err(FdqError::Unsupported(format!(
            "output type not supported: {other:?}"
        ))),
    }
}

/// Every value of `array` as scalars.
pub fn column_scalars(array: &ArrayRef) -> Result<Vec<ScalarValue>> {
    (0..array.len())
        .map(|row| scalar_from_array(array, row))
        .collect()
}

/// Round half away from zero to `decimals` places.
pub fn round_to(v: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (v * factor).round() / factor
}
