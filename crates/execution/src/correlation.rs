//! Pearson correlation matrix over numeric columns.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use fdq_common::{FdqError, Result};

use crate::expressions::is_numeric;
use crate::scalar::round_to;

const CORRELATION_DECIMALS: u32 = 4;

fn float_column(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| FdqError::Planning(format!("correlation column not found: {name}")))?;
    if !is_numeric(col.data_type()) {
        return Err(FdqError::Planning(format!(
            "correlation column {name} is {}, expected a numeric type",
            col.data_type()
        )));
    }
    let casted = cast(col, &DataType::Float64)
        .map_err(|e| FdqError::Execution(format!("correlation cast failed: {e}")))?;
    casted
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| FdqError::Execution("expected Float64Array".to_string()))
}

/// Coefficient over rows where both inputs are non-null. `None` with fewer
/// than two such rows or when either side has zero variance.
pub fn pearson(x: &Float64Array, y: &Float64Array) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(a, b)| Some((a?, b?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Square matrix: one row per column, a leading `column` label and one
/// Float64 column per input column.
pub fn correlation_matrix(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch> {
    let values = columns
        .iter()
        .map(|c| float_column(batch, c))
        .collect::<Result<Vec<_>>>()?;

    let mut fields = vec![Field::new("column", DataType::Utf8, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from_iter_values(columns.iter()))];
    for (j, name) in columns.iter().enumerate() {
        fields.push(Field::new(name.as_str(), DataType::Float64, true));
        let col: Float64Array = values
            .iter()
            .map(|row| pearson(row, &values[j]).map(|r| round_to(r, CORRELATION_DECIMALS)))
            .collect();
        arrays.push(Arc::new(col));
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| FdqError::Execution(format!("correlation output failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Float64, true),
            Field::new("b", DataType::Float64, true),
            Field::new("flat", DataType::Float64, true),
            Field::new("label", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(1.0), Some(2.0), Some(3.0), None])),
                Arc::new(Float64Array::from(vec![Some(2.0), Some(4.0), Some(6.0), Some(1.0)])),
                Arc::new(Float64Array::from(vec![Some(5.0), Some(5.0), Some(5.0), Some(5.0)])),
                Arc::new(StringArray::from(vec!["x", "y", "z", "w"])),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn perfectly_linear_columns_correlate() {
        let cols = vec!["a".to_string(), "b".to_string(), "flat".to_string()];
        let out = correlation_matrix(&batch(), &cols).expect("matrix");
        assert_eq!(out.num_rows(), 3);
        let b = out.column(2).as_any().downcast_ref::<Float64Array>().expect("b");
        assert_eq!(b.value(0), 1.0);
        assert_eq!(b.value(1), 1.0);
        assert!(b.is_null(2));
    }

    #[test]
    fn non_numeric_column_is_rejected() {
        let cols = vec!["a".to_string(), "label".to_string()];
        assert!(matches!(
            correlation_matrix(&batch(), &cols),
            Err(FdqError::Planning(_))
        ));
        let cols = vec!["missing".to_string()];
        assert!(matches!(
            correlation_matrix(&batch(), &cols),
            Err(FdqError::Planning(_))
        ));
    }
}
