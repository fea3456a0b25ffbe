//! Recency / frequency / monetary customer segmentation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use chrono::NaiveDate;
use fdq_common::{FdqError, Result};
use tracing::debug;

use crate::context::TaskContext;
use crate::derive::parse_date;
use crate::scalar::{round_to, scalar_from_array, ScalarValue};

#[derive(Debug, Clone, Default)]
struct CustomerStats {
    last_order: Option<NaiveDate>,
    frequency: i64,
    monetary: f64,
}

/// Segment rule applied to the three 1..=4 scores.
pub fn segment_for(r: i64, f: i64, m: i64) -> &'static str {
    if r >= 3 && f >= 3 && m >= 3 {
        "Champions"
    } else if r >= 3 && f >= 2 {
        "Loyal Customers"
    } else if r >= 3 {
        "Potential Loyalists"
    } else if f >= 3 {
        "At Risk"
    } else {
        "Lost"
    }
}

/// Quartile scores for items already ordered worst-first: the first quarter
/// scores 1, the last quarter 4.
fn quartile_scores(order: &[usize]) -> Vec<i64> {
    let n = order.len();
    let mut scores = vec![0; n];
    for (rank, &item) in order.iter().enumerate() {
        scores[item] = (rank * 4 / n) as i64 + 1;
    }
    scores
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| FdqError::Planning(format!("rfm segmentation needs column {name}")))
}

/// One row per known customer, ordered by `customer_id`. Recency is measured
/// in days back from the latest order date in the input; orders without a
/// customer are skipped.
pub fn rfm_segment(orders: &RecordBatch, ctx: &TaskContext) -> Result<RecordBatch> {
    let ids = column(orders, "customer_id")?;
    let dates = column(orders, "order_date")?;
    let amounts = column(orders, "final_amount")?;

    let mut stats: BTreeMap<String, CustomerStats> = BTreeMap::new();
    let mut reference: Option<NaiveDate> = None;
    for row in 0..orders.num_rows() {
        let ScalarValue::Utf8(id) = scalar_from_array(ids, row)? else {
            continue;
        };
        let date = scalar_from_array(dates, row)?
            .as_str()
            .and_then(parse_date);
        let amount = scalar_from_array(amounts, row)?.as_f64().unwrap_or(0.0);
        let entry = stats.entry(id).or_default();
        entry.frequency += 1;
        entry.monetary += amount;
        if let Some(d) = date {
            entry.last_order = entry.last_order.max(Some(d));
            reference = reference.max(Some(d));
        }
    }

    let customers: Vec<(String, CustomerStats)> = stats.into_iter().collect();
    let recency: Vec<Option<i64>> = customers
        .iter()
        .map(|(_, s)| match (reference, s.last_order) {
            (Some(r), Some(d)) => Some((r - d).num_days()),
            _ => None,
        })
        .collect();

    let n = customers.len();
    // Ties resolve by position, and positions follow customer_id.
    let mut by_recency: Vec<usize> = (0..n).collect();
    by_recency.sort_by(|&a, &b| match (recency[a], recency[b]) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.cmp(&x),
    });
    let mut by_frequency: Vec<usize> = (0..n).collect();
    by_frequency.sort_by_key(|&i| customers[i].1.frequency);
    let mut by_monetary: Vec<usize> = (0..n).collect();
    by_monetary.sort_by(|&a, &b| customers[a].1.monetary.total_cmp(&customers[b].1.monetary));

    let r = quartile_scores(&by_recency);
    let f = quartile_scores(&by_frequency);
    let m = quartile_scores(&by_monetary);
    let segments: Vec<&str> = (0..n).map(|i| segment_for(r[i], f[i], m[i])).collect();
    debug!(customers = n, ?reference, "rfm segmentation finished");

    let money = ctx.config.money_decimals;
    let schema = Arc::new(Schema::new(vec![
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("recency_days", DataType::Int64, true),
        Field::new("frequency", DataType::Int64, false),
        Field::new("monetary", DataType::Float64, false),
        Field::new("r_score", DataType::Int64, false),
        Field::new("f_score", DataType::Int64, false),
        Field::new("m_score", DataType::Int64, false),
        Field::new("rfm_score", DataType::Utf8, false),
        Field::new("segment", DataType::Utf8, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(customers.iter().map(|(id, _)| id))),
        Arc::new(Int64Array::from(recency)),
        Arc::new(Int64Array::from_iter_values(customers.iter().map(|(_, s)| s.frequency))),
        Arc::new(Float64Array::from_iter_values(
            customers.iter().map(|(_, s)| round_to(s.monetary, money)),
        )),
        Arc::new(Int64Array::from(r.clone())),
        Arc::new(Int64Array::from(f.clone())),
        Arc::new(Int64Array::from(m.clone())),
        Arc::new(StringArray::from_iter_values(
            (0..n).map(|i| format!("{}{}{}", r[i], f[i], m[i])),
        )),
        Arc::new(StringArray::from(segments)),
    ];
    RecordBatch::try_new(schema, columns)
        .map_err(|e| FdqError::Execution(format!("rfm output failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use fdq_storage::model::{orders_to_batch, Order};

    fn order(id: &str, customer: &str, date: &str, amount: f64) -> Order {
        let mut o = Order::new(id, customer, amount);
        o.order_date = Some(date.to_string());
        o.final_amount = Some(amount);
        o
    }

    #[test]
    fn segment_rules_are_checked_in_order() {
        assert_eq!(segment_for(4, 4, 4), "Champions");
        assert_eq!(segment_for(3, 2, 1), "Loyal Customers");
        assert_eq!(segment_for(4, 1, 4), "Potential Loyalists");
        assert_eq!(segment_for(1, 4, 4), "At Risk");
        assert_eq!(segment_for(2, 2, 2), "Lost");
    }

    #[test]
    fn scores_customers_by_rank_quartile() {
        let batch = orders_to_batch(&[
            order("O1", "C1", "2024-05-30", 500.0),
            order("O2", "C1", "2024-05-31", 700.0),
            order("O3", "C1", "2024-05-29", 100.0),
            order("O4", "C2", "2024-05-01", 50.0),
            order("O5", "C3", "2024-05-20", 300.0),
            order("O6", "C3", "2024-05-21", 200.0),
            order("O7", "C4", "2024-01-01", 20.0),
        ])
        .expect("batch");
        let out = rfm_segment(&batch, &TaskContext::default()).expect("rfm");
        assert_eq!(out.num_rows(), 4);

        let recency = out.column(1).as_any().downcast_ref::<Int64Array>().expect("recency");
        assert_eq!(recency.value(0), 0);
        assert_eq!(recency.value(1), 30);

        let segment = out.column(8).as_any().downcast_ref::<StringArray>().expect("segment");
        assert_eq!(segment.value(0), "Champions");
        assert_eq!(segment.value(3), "Lost");

        let rfm = out.column(7).as_any().downcast_ref::<StringArray>().expect("rfm");
        assert_eq!(rfm.value(0), "444");
        assert!(!rfm.is_null(3));
    }
}
