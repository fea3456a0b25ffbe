//! The five named read-models over the fact and dimension tables.
//!
//! Views are plain plans: they are expanded on every access and never cached.

use fdq_common::{FdqError, Result};
use fdq_storage::schema::{CUSTOMERS, DELIVERY_PARTNERS, ORDERS, RESTAURANTS};

use crate::expr::*;
use crate::logical_plan::{AggExpr, Expr, LogicalPlan, Param};

pub const ORDER_DETAILS: &str = "order_details";
pub const DAILY_KPIS: &str = "daily_kpis";
pub const RESTAURANT_SUMMARY: &str = "restaurant_summary";
pub const CITY_SUMMARY: &str = "city_summary";
pub const CUSTOMER_SEGMENTATION: &str = "customer_segmentation";

pub const VIEW_NAMES: [&str; 5] = [
    ORDER_DETAILS,
    DAILY_KPIS,
    RESTAURANT_SUMMARY,
    CITY_SUMMARY,
    CUSTOMER_SEGMENTATION,
];

pub fn is_view(name: &str) -> bool {
    VIEW_NAMES.contains(&name)
}

pub fn view_plan(name: &str) -> Result<LogicalPlan> {
    match name {
        ORDER_DETAILS => Ok(order_details()),
        DAILY_KPIS => Ok(daily_kpis()),
        RESTAURANT_SUMMARY => Ok(restaurant_summary()),
        CITY_SUMMARY => Ok(city_summary()),
        CUSTOMER_SEGMENTATION => Ok(customer_segmentation()),
        other => Err(FdqError::Planning(format!("unknown view: {other}"))),
    }
}

/// Orders left-joined to every dimension; unmatched keys leave NULL dimension columns.
fn order_details() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .join(LogicalPlan::scan(CUSTOMERS), "customer_id", "customer_id")
        .join(LogicalPlan::scan(RESTAURANTS), "restaurant_id", "restaurant_id")
        .join(
            LogicalPlan::scan(DELIVERY_PARTNERS),
            "delivery_partner_id",
            "delivery_partner_id",
        )
}

/// Per-day order counts and delivery/revenue KPIs, shared with the `daily_summary` rollup.
pub(crate) fn daily_aggregates() -> Vec<(AggExpr, &'static str)> {
    vec![
        (AggExpr::CountAll, "total_orders"),
        (AggExpr::CountIf(is_delivered()), "delivered_orders"),
        (AggExpr::CountIf(is_cancelled()), "cancelled_orders"),
        (AggExpr::Sum(col("order_value")), "total_revenue"),
        (AggExpr::Avg(col("order_value")), "avg_order_value"),
        (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
        (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
    ]
}

fn daily_kpis() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(vec![(col("order_date"), "order_date")], daily_aggregates())
}

fn restaurant_summary() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS).aggregate(
        vec![
            (col("restaurant_id"), "restaurant_id"),
            (col("restaurant_name"), "restaurant_name"),
            (col("cuisine_type"), "cuisine_type"),
        ],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::Sum(col("order_value")), "total_revenue"),
            (AggExpr::Avg(col("restaurant_rating")), "avg_rating"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
        ],
    )
}

fn city_summary() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(
        vec![(col("city"), "city")],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::Sum(col("order_value")), "total_revenue"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
            (AggExpr::Avg(col("distance_km")), "avg_distance_km"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
        ],
    )
}

fn spend_tier() -> Expr {
    Expr::Case {
        when_then: vec![
            (
                gt_eq(col("total_spent"), param(Param::HighSpenderThreshold)),
                lit_str("High"),
            ),
            (
                gt_eq(col("total_spent"), param(Param::MediumSpenderThreshold)),
                lit_str("Medium"),
            ),
        ],
        otherwise: Some(Box::new(lit_str("Low"))),
    }
}

fn customer_segmentation() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(
            vec![
                (col("customer_id"), "customer_id"),
                (col("age_group"), "age_group"),
                (col("customer_gender"), "customer_gender"),
            ],
            vec![
                (AggExpr::CountAll, "total_orders"),
                (AggExpr::Sum(col("order_value")), "total_spent"),
                (AggExpr::Avg(col("order_value")), "avg_order_value"),
            ],
        )
        .project(vec![
            (col("customer_id"), "customer_id"),
            (col("age_group"), "age_group"),
            (col("customer_gender"), "customer_gender"),
            (col("total_orders"), "total_orders"),
            (col("total_spent"), "total_spent"),
            (col("avg_order_value"), "avg_order_value"),
            (spend_tier(), "spend_tier"),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_view_name_resolves() {
        for name in VIEW_NAMES {
            assert!(view_plan(name).is_ok(), "view {name}");
        }
        assert!(matches!(view_plan("nope"), Err(FdqError::Planning(_))));
    }

    #[test]
    fn summaries_compose_order_details() {
        let plan = view_plan(RESTAURANT_SUMMARY).expect("plan");
        assert_eq!(plan.sources(), vec![ORDER_DETAILS.to_string()]);
        let details = view_plan(ORDER_DETAILS).expect("plan");
        assert_eq!(
            details.sources(),
            vec![ORDERS, CUSTOMERS, RESTAURANTS, DELIVERY_PARTNERS]
        );
    }
}
