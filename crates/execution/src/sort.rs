//! Stable multi-key sort and row limit.

use std::cmp::Ordering;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::record_batch::RecordBatch;
use fdq_common::{FdqError, Result};
use fdq_planner::SortExpr;

use crate::context::TaskContext;
use crate::expressions::compile_expr;
use crate::scalar::{cmp_directed, column_scalars};

/// Sort rows by `keys`. Rows that compare equal keep their input order, and
/// NULL sorts last in either direction.
pub fn sort_batch(batch: &RecordBatch, keys: &[SortExpr], ctx: &TaskContext) -> Result<RecordBatch> {
    if keys.is_empty() || batch.num_rows() < 2 {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let mut key_values = Vec::with_capacity(keys.len());
    for key in keys {
        let arr: ArrayRef = compile_expr(&key.expr, &schema, ctx)?.evaluate(batch)?;
        key_values.push((column_scalars(&arr)?, key.descending));
    }

    let mut order: Vec<u32> = (0..batch.num_rows() as u32).collect();
    order.sort_by(|&a, &b| {
        for (values, descending) in &key_values {
            let ord = cmp_directed(&values[a as usize], &values[b as usize], *descending);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    take_record_batch(batch, &UInt32Array::from(order))
        .map_err(|e| FdqError::Execution(format!("sort take failed: {e}")))
}

pub fn limit_batch(batch: &RecordBatch, n: usize) -> RecordBatch {
    batch.slice(0, n.min(batch.num_rows()))
}
