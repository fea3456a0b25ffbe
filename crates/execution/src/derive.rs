//! Derived order and customer features.
//!
//! The pure functions back the scalar functions of the expression layer;
//! [`enrich_orders`] and [`enrich_customers`] use them to fill derived columns
//! that arrive NULL.

use arrow::array::ArrayRef;
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, is_not_null};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use fdq_common::{FdqError, Result};
use fdq_planner::expr::{col, div, func, gt, gt_eq, lit_f64, mul, sub};
use fdq_planner::{Expr, ScalarFunc};
use fdq_storage::schema::order_cols;
use tracing::debug;

use crate::context::TaskContext;
use crate::expressions::compile_expr;

pub const WEEKEND: &str = "Weekend";
pub const WEEKDAY: &str = "Weekday";

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Hour of `HH:MM[:SS]`.
pub fn parse_hour(s: &str) -> Option<u32> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
        .map(|t| t.hour())
}

pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn day_type(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => WEEKEND,
        _ => WEEKDAY,
    }
}

pub fn year_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn age_group(age: f64) -> &'static str {
    if age < 25.0 {
        "Youth"
    } else if age < 40.0 {
        "Adult"
    } else {
        "Senior"
    }
}

pub fn distance_bucket(km: f64) -> &'static str {
    if km < 2.0 {
        "0-2 km"
    } else if km < 5.0 {
        "2-5 km"
    } else if km < 10.0 {
        "5-10 km"
    } else {
        "10+ km"
    }
}

/// `Fast` up to 30 minutes, `On-Time` up to the delayed threshold, then `Delayed`.
pub fn delivery_performance(minutes: f64, delayed_threshold_min: f64) -> &'static str {
    if minutes <= 30.0 {
        "Fast"
    } else if minutes <= delayed_threshold_min {
        "On-Time"
    } else {
        "Delayed"
    }
}

pub fn delivery_speed(minutes: f64) -> &'static str {
    if minutes < 30.0 {
        "Fast"
    } else if minutes <= 60.0 {
        "Normal"
    } else {
        "Slow"
    }
}

/// Replace NULLs of `column` with the value of `derived` in the same row.
fn fill_column(batch: &RecordBatch, column: &str, derived: &Expr, ctx: &TaskContext) -> Result<RecordBatch> {
    let Ok(idx) = batch.schema().index_of(column) else {
        return Ok(batch.clone());
    };
    let original = batch.column(idx).clone();
    if original.null_count() == 0 {
        return Ok(batch.clone());
    }
    let target = original.data_type().clone();
    let computed = compile_expr(derived, &batch.schema(), ctx)?.evaluate(batch)?;
    let computed = cast(&computed, &target)
        .map_err(|e| FdqError::Execution(format!("derive {column} failed: {e}")))?;
    let keep = is_not_null(&original)
        .map_err(|e| FdqError::Execution(format!("derive {column} failed: {e}")))?;
    let filled: ArrayRef = zip(&keep, &original, &computed)
        .map_err(|e| FdqError::Execution(format!("derive {column} failed: {e}")))?;
    debug!(
        column,
        filled = original.null_count() - filled.null_count(),
        "derived column values"
    );
    let mut columns = batch.columns().to_vec();
    columns[idx] = filled;
    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| FdqError::Execution(format!("derive {column} failed: {e}")))
}

/// Fill NULL derived order columns from the raw fields they are computed from.
pub fn enrich_orders(batch: &RecordBatch, ctx: &TaskContext) -> Result<RecordBatch> {
    use order_cols::*;
    let cfg = &ctx.config;
    let derivations = [
        (ORDER_DAY, func(ScalarFunc::WeekdayName, col(ORDER_DATE))),
        (ORDER_DAY_TYPE, func(ScalarFunc::DayType, col(ORDER_DATE))),
        (FINAL_AMOUNT, sub(col(ORDER_VALUE), col(DISCOUNT_APPLIED))),
        (
            PROFIT_MARGIN_PERCENT,
            func(
                ScalarFunc::Round(2),
                div(mul(col(PROFIT_MARGIN), lit_f64(100.0)), col(ORDER_VALUE)),
            ),
        ),
        (
            DELIVERY_PERFORMANCE,
            func(ScalarFunc::DeliveryPerformance, col(DELIVERY_TIME_MIN)),
        ),
        (PEAK_HOUR, func(ScalarFunc::IsPeakHour, col(ORDER_TIME))),
        (
            IS_DELAYED,
            gt(col(DELIVERY_TIME_MIN), lit_f64(cfg.delayed_threshold_min)),
        ),
        (
            HIGH_VALUE_ORDER,
            gt_eq(col(ORDER_VALUE), lit_f64(cfg.high_value_threshold)),
        ),
    ];
    let mut out = batch.clone();
    for (column, expr) in &derivations {
        out = fill_column(&out, column, expr, ctx)?;
    }
    Ok(out)
}

pub fn enrich_customers(batch: &RecordBatch, ctx: &TaskContext) -> Result<RecordBatch> {
    fill_column(
        batch,
        "age_group",
        &func(ScalarFunc::AgeGroup, col("customer_age")),
        ctx,
    )
}
