//! Left outer hash join on a single equi-key.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::record_batch::RecordBatch;
use arrow_schema::{Field, Schema};
use fdq_common::{FdqError, Result};
use tracing::debug;

use crate::scalar::{encode_group_key, scalar_from_array};

/// Every left row appears at least once, in input order; right columns are
/// NULL where no right row matches. NULL keys never match. The right key
/// column is dropped from the output.
pub fn hash_join_left(
    left: &RecordBatch,
    right: &RecordBatch,
    left_key: &str,
    right_key: &str,
) -> Result<RecordBatch> {
    let left_schema = left.schema();
    let right_schema = right.schema();
    let lk = left_schema
        .index_of(left_key)
        .map_err(|_| FdqError::Planning(format!("unknown join key: {left_key}")))?;
    let rk = right_schema
        .index_of(right_key)
        .map_err(|_| FdqError::Planning(format!("unknown join key: {right_key}")))?;

    // Build on the right side: dimension tables are the small side.
    let mut build: HashMap<Vec<u8>, Vec<u32>> = HashMap::new();
    let right_keys = right.column(rk);
    for row in 0..right.num_rows() {
        let key = scalar_from_array(right_keys, row)?;
        if key.is_null() {
            continue;
        }
        build
            .entry(encode_group_key(&[key]))
            .or_default()
            .push(row as u32);
    }

    let mut left_idx = Vec::with_capacity(left.num_rows());
    let mut right_idx: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
    let left_keys = left.column(lk);
    for row in 0..left.num_rows() {
        let key = scalar_from_array(left_keys, row)?;
        let matches = if key.is_null() {
            None
        } else {
            build.get(&encode_group_key(&[key]))
        };
        match matches {
            Some(rows) => {
                for r in rows {
                    left_idx.push(row as u32);
                    right_idx.push(Some(*r));
                }
            }
            None => {
                left_idx.push(row as u32);
                right_idx.push(None);
            }
        }
    }
    let unmatched = right_idx.iter().filter(|r| r.is_none()).count();
    debug!(
        left_key,
        left_rows = left.num_rows(),
        right_rows = right.num_rows(),
        out_rows = left_idx.len(),
        unmatched,
        "left hash join finished"
    );

    let left_take = UInt32Array::from(left_idx);
    let right_take = UInt32Array::from(right_idx);
    let mut fields: Vec<Field> = left_schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut columns = Vec::with_capacity(left.num_columns() + right.num_columns());
    for col in left.columns() {
        columns.push(take_column(col, &left_take)?);
    }
    for (idx, field) in right_schema.fields().iter().enumerate() {
        if idx == rk {
            continue;
        }
        if fields.iter().any(|f| f.name() == field.name()) {
            return Err(FdqError::Planning(format!(
                "join output would repeat column {}",
                field.name()
            )));
        }
        fields.push(field.as_ref().clone().with_nullable(true));
        columns.push(take_column(right.column(idx), &right_take)?);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| FdqError::Execution(format!("join output failed: {e}")))
}

fn take_column(col: &ArrayRef, idx: &UInt32Array) -> Result<ArrayRef> {
    take(col.as_ref(), idx, None).map_err(|e| FdqError::Execution(format!("take failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use arrow_schema::DataType;

    fn batch(cols: Vec<(&str, Vec<Option<&str>>)>) -> RecordBatch {
        let fields = cols
            .iter()
            .map(|(n, _)| Field::new(*n, DataType::Utf8, true))
            .collect::<Vec<_>>();
        let arrays = cols
            .into_iter()
            .map(|(_, v)| Arc::new(StringArray::from(v)) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("batch")
    }

    #[test]
    fn unmatched_and_null_keys_keep_left_rows() {
        let orders = batch(vec![
            ("order_id", vec![Some("O1"), Some("O2"), Some("O3")]),
            ("restaurant_id", vec![Some("R1"), Some("R9"), None]),
        ]);
        let restaurants = batch(vec![
            ("restaurant_id", vec![Some("R1")]),
            ("restaurant_name", vec![Some("Spice Hub")]),
        ]);
        let out = hash_join_left(&orders, &restaurants, "restaurant_id", "restaurant_id")
            .expect("join");
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.num_columns(), 3);
        let name = out
            .column_by_name("restaurant_name")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .expect("name");
        assert_eq!(name.value(0), "Spice Hub");
        assert!(name.is_null(1));
        assert!(name.is_null(2));
    }

    #[test]
    fn colliding_columns_are_rejected() {
        let left = batch(vec![("k", vec![Some("a")]), ("city", vec![Some("x")])]);
        let right = batch(vec![("k", vec![Some("a")]), ("city", vec![Some("y")])]);
        assert!(matches!(
            hash_join_left(&left, &right, "k", "k"),
            Err(FdqError::Planning(_))
        ));
    }
}
