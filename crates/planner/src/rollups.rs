//! Rollup definitions: materialized aggregates recomputed in full from `orders`.

use fdq_common::{FdqError, Result};
use fdq_storage::schema::{
    rollup_tables, CITY_PERFORMANCE, DAILY_SUMMARY, ORDERS, ORDER_ANALYTICS,
    RESTAURANT_PERFORMANCE,
};

use crate::expr::*;
use crate::logical_plan::{AggExpr, LogicalPlan, ScalarFunc};
use crate::views::{daily_aggregates, ORDER_DETAILS};

pub fn rollup_names() -> [&'static str; 4] {
    rollup_tables()
}

pub fn rollup_plan(name: &str) -> Result<LogicalPlan> {
    match name {
        ORDER_ANALYTICS => Ok(order_analytics()),
        DAILY_SUMMARY => Ok(daily_summary()),
        RESTAURANT_PERFORMANCE => Ok(restaurant_performance()),
        CITY_PERFORMANCE => Ok(city_performance()),
        other => Err(FdqError::Planning(format!("unknown rollup: {other}"))),
    }
}

/// One row per order with its derived categorizations.
fn order_analytics() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS).project(vec![
        (col("order_id"), "order_id"),
        (col("order_date"), "order_date"),
        (func(ScalarFunc::Hour, col("order_time")), "order_hour"),
        (col("order_day_type"), "order_day_type"),
        (col("peak_hour"), "peak_hour"),
        (col("age_group"), "age_group"),
        (
            func(ScalarFunc::DistanceBucket, col("distance_km")),
            "distance_bucket",
        ),
        (col("delivery_performance"), "delivery_performance"),
        (col("high_value_order"), "high_value_order"),
        (col("is_delayed"), "is_delayed"),
        (col("profit_margin_percent"), "profit_margin_percent"),
    ])
}

fn daily_summary() -> LogicalPlan {
    let mut aggs = daily_aggregates();
    aggs.insert(4, (AggExpr::Sum(col("final_amount")), "total_final_amount"));
    LogicalPlan::scan(ORDERS).aggregate(vec![(col("order_date"), "order_date")], aggs)
}

fn restaurant_performance() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(
        vec![
            (col("restaurant_id"), "restaurant_id"),
            (func(ScalarFunc::Year, col("order_date")), "year"),
            (func(ScalarFunc::Month, col("order_date")), "month"),
        ],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::CountIf(is_cancelled()), "cancelled_orders"),
            (AggExpr::Sum(col("order_value")), "total_revenue"),
            (AggExpr::Avg(col("restaurant_rating")), "avg_rating"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
        ],
    )
}

/// Keyed by (city, year, month); `year_month` rides along so monthly reports can
/// regroup without re-deriving it.
fn city_performance() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(
        vec![
            (col("city"), "city"),
            (func(ScalarFunc::Year, col("order_date")), "year"),
            (func(ScalarFunc::Month, col("order_date")), "month"),
            (func(ScalarFunc::YearMonth, col("order_date")), "year_month"),
        ],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::CountIf(is_cancelled()), "cancelled_orders"),
            (AggExpr::Sum(col("order_value")), "total_revenue"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
            (AggExpr::Avg(col("distance_km")), "avg_distance_km"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
        ],
    )
}
