//! Generic plan executor: every report, view and rollup runs through here.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::cast::cast;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use fdq_common::{FdqError, Result};
use fdq_planner::{view_plan, LogicalPlan};
use fdq_storage::Snapshot;
use tracing::debug;

use crate::aggregate::run_hash_aggregate;
use crate::context::TaskContext;
use crate::correlation::correlation_matrix;
use crate::expressions::compile_expr;
use crate::join::hash_join_left;
use crate::segment::rfm_segment;
use crate::sort::{limit_batch, sort_batch};

/// Run `plan` against `snapshot` and return the whole result as one batch.
pub fn execute_plan(plan: &LogicalPlan, snapshot: &Snapshot, ctx: &TaskContext) -> Result<RecordBatch> {
    let out = match plan {
        LogicalPlan::Scan { table } => snapshot.table(table)?.concat()?,
        LogicalPlan::View { name } => execute_plan(&view_plan(name)?, snapshot, ctx)?,
        LogicalPlan::Join {
            left,
            right,
            left_key,
            right_key,
        } => {
            let l = execute_plan(left, snapshot, ctx)?;
            let r = execute_plan(right, snapshot, ctx)?;
            hash_join_left(&l, &r, left_key, right_key)?
        }
        LogicalPlan::Filter { predicate, input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            let mask = compile_expr(predicate, &batch.schema(), ctx)?.evaluate(&batch)?;
            let mask = predicate_mask(&mask)?;
            filter_record_batch(&batch, &mask)
                .map_err(|e| FdqError::Execution(format!("filter failed: {e}")))?
        }
        LogicalPlan::Projection { exprs, input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            project(&batch, exprs, ctx)?
        }
        LogicalPlan::Aggregate {
            group_exprs,
            aggr_exprs,
            input,
        } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            run_hash_aggregate(&batch, group_exprs, aggr_exprs, ctx)?
        }
        LogicalPlan::Sort { keys, input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            sort_batch(&batch, keys, ctx)?
        }
        LogicalPlan::Limit { n, input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            limit_batch(&batch, n.unwrap_or(ctx.config.default_top_n))
        }
        LogicalPlan::RfmSegment { input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            rfm_segment(&batch, ctx)?
        }
        LogicalPlan::Correlation { columns, input } => {
            let batch = execute_plan(input, snapshot, ctx)?;
            correlation_matrix(&batch, columns)?
        }
    };
    debug!(node = node_name(plan), rows = out.num_rows(), "plan node executed");
    Ok(out)
}

fn node_name(plan: &LogicalPlan) -> &'static str {
    match plan {
        LogicalPlan::Scan { .. } => "scan",
        LogicalPlan::View { .. } => "view",
        LogicalPlan::Join { .. } => "join",
        LogicalPlan::Filter { .. } => "filter",
        LogicalPlan::Projection { .. } => "projection",
        LogicalPlan::Aggregate { .. } => "aggregate",
        LogicalPlan::Sort { .. } => "sort",
        LogicalPlan::Limit { .. } => "limit",
        LogicalPlan::RfmSegment { .. } => "rfm_segment",
        LogicalPlan::Correlation { .. } => "correlation",
    }
}

/// NULL predicate results drop the row.
fn predicate_mask(values: &ArrayRef) -> Result<BooleanArray> {
    if values.data_type() != &DataType::Boolean {
        return Err(FdqError::Planning(format!(
            "filter predicate must be boolean, got {}",
            values.data_type()
        )));
    }
    let mask = values
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| FdqError::Execution("expected BooleanArray".to_string()))?;
    Ok(mask.iter().map(|v| Some(v.unwrap_or(false))).collect())
}

fn project(batch: &RecordBatch, exprs: &[(fdq_planner::Expr, String)], ctx: &TaskContext) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(exprs.len());
    let mut columns = Vec::with_capacity(exprs.len());
    for (expr, name) in exprs {
        let compiled = compile_expr(expr, &schema, ctx)?;
        let mut values = compiled.evaluate(batch)?;
        let mut dt = compiled.data_type();
        if dt == DataType::Null {
            dt = DataType::Utf8;
            values = cast(&values, &dt)
                .map_err(|e| FdqError::Execution(format!("projection cast failed: {e}")))?;
        }
        fields.push(Field::new(name.as_str(), dt, true));
        columns.push(values);
    }
    let out_schema = Arc::new(Schema::new(fields));
    if columns.is_empty() {
        return Ok(RecordBatch::new_empty(out_schema));
    }
    RecordBatch::try_new(out_schema, columns)
        .map_err(|e| FdqError::Execution(format!("projection output failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use fdq_planner::expr::{asc, col, is_cancelled, lit_f64, mul};
    use fdq_planner::AggExpr;
    use fdq_storage::model::{orders_to_batch, Order, OrderStatus};
    use fdq_storage::schema::{orders_schema, ORDERS};
    use fdq_storage::MemTable;

    fn snapshot() -> Snapshot {
        let mut cancelled = Order::new("O3", "C2", 30.0);
        cancelled.order_status = Some(OrderStatus::Cancelled);
        let batch = orders_to_batch(&[
            Order::new("O1", "C1", 100.0),
            Order::new("O2", "C1", 50.0),
            cancelled,
        ])
        .expect("orders");
        let mut snap = Snapshot::new();
        snap.register(ORDERS, MemTable::new(orders_schema(), vec![batch]));
        snap
    }

    #[test]
    fn filter_then_aggregate_then_sort() {
        let plan = LogicalPlan::scan(ORDERS)
            .filter(fdq_planner::expr::not(is_cancelled()))
            .aggregate(
                vec![(col("customer_id"), "customer_id")],
                vec![(AggExpr::Sum(col("order_value")), "total")],
            )
            .sort(vec![asc("customer_id")]);
        let out = execute_plan(&plan, &snapshot(), &TaskContext::default()).expect("run");
        assert_eq!(out.num_rows(), 1);
        let total = out.column(1).as_any().downcast_ref::<Float64Array>().expect("total");
        assert_eq!(total.value(0), 150.0);
    }

    #[test]
    fn limit_without_n_uses_default_top_n() {
        let plan = LogicalPlan::scan(ORDERS).limit(None);
        let ctx = TaskContext::new(fdq_common::EngineConfig {
            default_top_n: 2,
            ..fdq_common::EngineConfig::default()
        });
        assert_eq!(execute_plan(&plan, &snapshot(), &ctx).expect("run").num_rows(), 2);
    }

    #[test]
    fn projection_names_columns() {
        let plan = LogicalPlan::scan(ORDERS).project(vec![
            (col("order_id"), "id"),
            (mul(col("order_value"), lit_f64(2.0)), "doubled"),
        ]);
        let out = execute_plan(&plan, &snapshot(), &TaskContext::default()).expect("run");
        assert_eq!(out.schema().field(0).name(), "id");
        let ids = out.column(0).as_any().downcast_ref::<StringArray>().expect("ids");
        assert_eq!(ids.value(2), "O3");
        let doubled = out.column(1).as_any().downcast_ref::<Float64Array>().expect("doubled");
        assert_eq!(doubled.value(0), 200.0);
    }

    #[test]
    fn global_count_over_empty_filter_is_one_row() {
        let plan = LogicalPlan::scan(ORDERS)
            .filter(fdq_planner::expr::eq(col("customer_id"), fdq_planner::expr::lit_str("none")))
            .aggregate(vec![], vec![(AggExpr::CountAll, "n")]);
        let out = execute_plan(&plan, &snapshot(), &TaskContext::default()).expect("run");
        let n = out.column(0).as_any().downcast_ref::<Int64Array>().expect("n");
        assert_eq!(n.value(0), 0);
    }

    #[test]
    fn unknown_table_is_a_planning_error() {
        let plan = LogicalPlan::scan("nope");
        assert!(matches!(
            execute_plan(&plan, &snapshot(), &TaskContext::default()),
            Err(FdqError::Planning(_))
        ));
    }
}
