//! The report catalog.
//!
//! Every report is a [`ReportSpec`]: a name plus a [`LogicalPlan`] the generic
//! executor runs. Reports that can be answered from a rollup also carry a
//! `rollup_plan` producing the same rows.

use std::fmt;

use fdq_common::{FdqError, Result};
use fdq_storage::schema::{CITY_PERFORMANCE, ORDERS};
use serde::{Deserialize, Serialize};

use crate::expr::*;
use crate::logical_plan::{AggExpr, Expr, LogicalPlan, Param, ScalarFunc};
use crate::views::ORDER_DETAILS;

/// Numeric order columns fed to the correlation report.
pub const CORRELATION_COLUMNS: [&str; 6] = [
    "order_value",
    "delivery_time_min",
    "distance_km",
    "delivery_rating",
    "restaurant_rating",
    "profit_margin_percent",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Customer,
    Revenue,
    Delivery,
    Restaurant,
    Operations,
    Advanced,
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Customer => "customer",
            Self::Revenue => "revenue",
            Self::Delivery => "delivery",
            Self::Restaurant => "restaurant",
            Self::Operations => "operations",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSpec {
    pub name: String,
    pub title: String,
    pub category: ReportCategory,
    pub plan: LogicalPlan,
    /// Equivalent plan over a rollup table, used when the rollup is fresh.
    pub rollup_plan: Option<LogicalPlan>,
}

impl ReportSpec {
    fn new(name: &str, title: &str, category: ReportCategory, plan: LogicalPlan) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            category,
            plan,
            rollup_plan: None,
        }
    }

    fn with_rollup(mut self, plan: LogicalPlan) -> Self {
        self.rollup_plan = Some(plan);
        self
    }

    /// Rollup table the `rollup_plan` reads, if any.
    pub fn rollup_source(&self) -> Option<String> {
        self.rollup_plan
            .as_ref()
            .and_then(|p| p.sources().into_iter().next())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportCatalog {
    reports: Vec<ReportSpec>,
}

impl ReportCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog, in listing order.
    pub fn builtin() -> Self {
        use ReportCategory::*;
        let reports = vec![
            ReportSpec::new("top_spenders", "Top customers by total spend", Customer, top_spenders()),
            ReportSpec::new(
                "age_group_order_value",
                "Average order value by age group",
                Customer,
                details_avg("age_group", "order_value", "avg_order_value"),
            ),
            ReportSpec::new(
                "day_pattern",
                "Orders by day of week",
                Operations,
                count_by(LogicalPlan::scan(ORDERS), "order_day", "total_orders"),
            ),
            ReportSpec::new("monthly_revenue", "Revenue by month", Revenue, monthly_revenue())
                .with_rollup(monthly_revenue_from_rollup()),
            ReportSpec::new(
                "discount_impact",
                "Average profit margin by discount",
                Revenue,
                orders_avg("discount_applied", "profit_margin", "avg_profit_margin"),
            ),
            ReportSpec::new("city_revenue", "Revenue by city", Revenue, city_revenue())
                .with_rollup(city_revenue_from_rollup()),
            ReportSpec::new("cuisine_revenue", "Revenue by cuisine", Revenue, cuisine_revenue()),
            ReportSpec::new(
                "delivery_time_by_city",
                "Average delivery time by city",
                Delivery,
                orders_avg("city", "delivery_time_min", "avg_delivery_time"),
            ),
            ReportSpec::new(
                "rating_vs_delivery_time",
                "Average delivery time by restaurant rating",
                Delivery,
                orders_avg("restaurant_rating", "delivery_time_min", "avg_delivery_time"),
            ),
            ReportSpec::new(
                "top_rated_restaurants",
                "Top restaurants by average rating",
                Restaurant,
                top_rated_restaurants(),
            ),
            ReportSpec::new(
                "restaurant_cancellation_rate",
                "Cancellation rate per restaurant",
                Restaurant,
                restaurant_cancellations(),
            ),
            ReportSpec::new(
                "cuisine_performance",
                "Revenue, rating and volume by cuisine",
                Restaurant,
                cuisine_performance(),
            ),
            ReportSpec::new(
                "peak_hour_demand",
                "Orders inside vs outside peak hours",
                Operations,
                count_by(LogicalPlan::scan(ORDERS), "peak_hour", "total_orders"),
            ),
            ReportSpec::new(
                "payment_mode_share",
                "Payment mode usage",
                Operations,
                share_by(LogicalPlan::scan(ORDERS), col("payment_mode"), "payment_mode", "usage_count"),
            ),
            ReportSpec::new(
                "cancellation_reasons",
                "Share of cancellations by reason",
                Operations,
                share_by(
                    LogicalPlan::scan(ORDERS).filter(is_cancelled()),
                    col("cancellation_reason"),
                    "cancellation_reason",
                    "total_cancellations",
                ),
            ),
            ReportSpec::new("day_type_demand", "Weekday vs weekend demand", Operations, day_type_demand()),
            ReportSpec::new(
                "distance_vs_delivery_time",
                "Average delivery time by distance",
                Delivery,
                distance_vs_delivery_time(),
            ),
            ReportSpec::new(
                "delivery_speed_share",
                "Orders by delivery speed",
                Delivery,
                delivery_speed_share(),
            ),
            ReportSpec::new(
                "order_status_share",
                "Orders by status",
                Operations,
                share_by(LogicalPlan::scan(ORDERS), col("order_status"), "order_status", "total_orders"),
            ),
            ReportSpec::new(
                "city_order_volume",
                "Orders by city",
                Operations,
                count_by(LogicalPlan::scan(ORDERS), "city", "total_orders")
                    .sort(vec![desc("total_orders")])
                    .limit(None),
            ),
            ReportSpec::new(
                "cuisine_order_volume",
                "Orders by cuisine",
                Restaurant,
                count_by(LogicalPlan::view(ORDER_DETAILS), "cuisine_type", "total_orders")
                    .sort(vec![desc("total_orders")]),
            ),
            ReportSpec::new(
                "gender_distribution",
                "Orders by customer gender",
                Customer,
                share_by(
                    LogicalPlan::view(ORDER_DETAILS),
                    col("customer_gender"),
                    "customer_gender",
                    "total_orders",
                ),
            ),
            ReportSpec::new(
                "top_restaurants_by_orders",
                "Top restaurants by order volume",
                Restaurant,
                top_restaurants_by_orders(),
            ),
            ReportSpec::new(
                "highest_cancellation_restaurants",
                "Restaurants with the highest cancellation rate",
                Restaurant,
                highest_cancellation_restaurants(),
            ),
            ReportSpec::new(
                "city_profit_margin",
                "Average profit margin by city",
                Revenue,
                orders_avg("city", "profit_margin_percent", "avg_profit_margin_percent")
                    .sort(vec![desc("avg_profit_margin_percent")])
                    .limit(None),
            ),
            ReportSpec::new("executive_kpis", "Headline KPIs", Advanced, executive_kpis()),
            ReportSpec::new(
                "customer_rfm_segments",
                "Customer recency, frequency and monetary segments",
                Advanced,
                LogicalPlan::RfmSegment {
                    input: Box::new(LogicalPlan::scan(ORDERS)),
                },
            ),
            ReportSpec::new(
                "rfm_segment_summary",
                "Customers per RFM segment",
                Advanced,
                rfm_segment_summary(),
            ),
            ReportSpec::new(
                "numeric_correlation",
                "Pearson correlation between order metrics",
                Advanced,
                LogicalPlan::Correlation {
                    columns: CORRELATION_COLUMNS.iter().map(|c| c.to_string()).collect(),
                    input: Box::new(LogicalPlan::scan(ORDERS)),
                },
            ),
        ];
        Self { reports }
    }

    pub fn register(&mut self, report: ReportSpec) -> Result<()> {
        if self.reports.iter().any(|r| r.name == report.name) {
            return Err(FdqError::Planning(format!(
                "report already registered: {}",
                report.name
            )));
        }
        self.reports.push(report);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ReportSpec> {
        self.reports
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| FdqError::Planning(format!("unknown report: {name}")))
    }

    pub fn reports(&self) -> &[ReportSpec] {
        &self.reports
    }

    pub fn names(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.name.as_str()).collect()
    }
}

fn count_by(input: LogicalPlan, key: &str, count_name: &str) -> LogicalPlan {
    input.aggregate(vec![(col(key), key)], vec![(AggExpr::CountAll, count_name)])
}

/// Count per key with its share of all input rows, most frequent first.
fn share_by(input: LogicalPlan, key: Expr, key_name: &str, count_name: &str) -> LogicalPlan {
    input
        .aggregate(
            vec![(key, key_name)],
            vec![
                (AggExpr::CountAll, count_name),
                (AggExpr::ShareOfTotal, "share_percent"),
            ],
        )
        .sort(vec![desc(count_name)])
}

fn orders_avg(key: &str, value: &str, out: &str) -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(vec![(col(key), key)], vec![(AggExpr::Avg(col(value)), out)])
}

fn details_avg(key: &str, value: &str, out: &str) -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(vec![(col(key), key)], vec![(AggExpr::Avg(col(value)), out)])
}

fn top_spenders() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .aggregate(
            vec![(col("customer_id"), "customer_id")],
            vec![(AggExpr::Sum(col("order_value")), "total_spent")],
        )
        .project(vec![
            (col("customer_id"), "customer_id"),
            (round_money(col("total_spent")), "total_spent"),
        ])
        .sort(vec![desc("total_spent")])
        .limit(None)
}

fn monthly_revenue() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .aggregate(
            vec![(func(ScalarFunc::YearMonth, col("order_date")), "month")],
            vec![(AggExpr::Sum(col("order_value")), "total_revenue")],
        )
        .project(vec![
            (col("month"), "month"),
            (round_money(col("total_revenue")), "total_revenue"),
        ])
}

fn monthly_revenue_from_rollup() -> LogicalPlan {
    LogicalPlan::scan(CITY_PERFORMANCE)
        .aggregate(
            vec![(col("year_month"), "month")],
            vec![(AggExpr::Sum(col("total_revenue")), "total_revenue")],
        )
        .project(vec![
            (col("month"), "month"),
            (round_money(col("total_revenue")), "total_revenue"),
        ])
}

fn city_revenue() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .aggregate(
            vec![(col("city"), "city")],
            vec![(AggExpr::Sum(col("order_value")), "revenue")],
        )
        .project(vec![
            (col("city"), "city"),
            (round_money(col("revenue")), "revenue"),
        ])
        .sort(vec![desc("revenue")])
}

fn city_revenue_from_rollup() -> LogicalPlan {
    LogicalPlan::scan(CITY_PERFORMANCE)
        .aggregate(
            vec![(col("city"), "city")],
            vec![(AggExpr::Sum(col("total_revenue")), "revenue")],
        )
        .project(vec![
            (col("city"), "city"),
            (round_money(col("revenue")), "revenue"),
        ])
        .sort(vec![desc("revenue")])
}

fn cuisine_revenue() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(
            vec![(col("cuisine_type"), "cuisine_type")],
            vec![(AggExpr::Sum(col("order_value")), "revenue")],
        )
        .project(vec![
            (col("cuisine_type"), "cuisine_type"),
            (round_money(col("revenue")), "revenue"),
        ])
        .sort(vec![desc("revenue")])
}

fn restaurant_keys() -> Vec<(Expr, &'static str)> {
    vec![
        (col("restaurant_id"), "restaurant_id"),
        (col("restaurant_name"), "restaurant_name"),
    ]
}

fn top_rated_restaurants() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(
            restaurant_keys(),
            vec![
                (AggExpr::Avg(col("delivery_rating")), "avg_rating"),
                (AggExpr::CountAll, "total_orders"),
            ],
        )
        .sort(vec![desc("avg_rating")])
        .limit(None)
}

fn restaurant_cancellations() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS).aggregate(
        restaurant_keys(),
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::CountIf(is_cancelled()), "cancelled_orders"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
        ],
    )
}

fn highest_cancellation_restaurants() -> LogicalPlan {
    restaurant_cancellations()
        .filter(gt_eq(col("total_orders"), param(Param::MinOrdersForRate)))
        .sort(vec![desc("cancellation_rate")])
        .limit(None)
}

fn cuisine_performance() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(
            vec![(col("cuisine_type"), "cuisine_type")],
            vec![
                (AggExpr::Sum(col("order_value")), "total_revenue"),
                (AggExpr::Avg(col("restaurant_rating")), "avg_rating"),
                (AggExpr::CountAll, "total_orders"),
                (AggExpr::Avg(col("order_value")), "avg_order_value"),
            ],
        )
        .project(vec![
            (col("cuisine_type"), "cuisine_type"),
            (round_money(col("total_revenue")), "total_revenue"),
            (col("avg_rating"), "avg_rating"),
            (col("total_orders"), "total_orders"),
            (round_money(col("avg_order_value")), "avg_order_value"),
        ])
}

fn day_type_demand() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(
        vec![(col("order_day_type"), "order_day_type")],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::Avg(col("order_value")), "avg_order_value"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
        ],
    )
}

/// Buckets are ordered by the shortest distance they contain.
fn distance_vs_delivery_time() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .aggregate(
            vec![(func(ScalarFunc::DistanceBucket, col("distance_km")), "distance_bucket")],
            vec![
                (AggExpr::CountAll, "total_orders"),
                (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
                (AggExpr::Min(col("distance_km")), "min_distance_km"),
            ],
        )
        .sort(vec![asc("min_distance_km")])
}

fn delivery_speed_share() -> LogicalPlan {
    LogicalPlan::scan(ORDERS)
        .aggregate(
            vec![(func(ScalarFunc::DeliverySpeed, col("delivery_time_min")), "delivery_speed")],
            vec![
                (AggExpr::CountAll, "total_orders"),
                (AggExpr::ShareOfTotal, "share_percent"),
                (AggExpr::Min(col("delivery_time_min")), "fastest_min"),
            ],
        )
        .sort(vec![asc("fastest_min")])
}

fn top_restaurants_by_orders() -> LogicalPlan {
    LogicalPlan::view(ORDER_DETAILS)
        .aggregate(
            restaurant_keys(),
            vec![
                (AggExpr::CountAll, "total_orders"),
                (AggExpr::Avg(col("restaurant_rating")), "avg_rating"),
                (AggExpr::Sum(col("final_amount")), "revenue"),
            ],
        )
        .sort(vec![desc("total_orders")])
        .limit(None)
}

fn executive_kpis() -> LogicalPlan {
    LogicalPlan::scan(ORDERS).aggregate(
        vec![],
        vec![
            (AggExpr::CountAll, "total_orders"),
            (AggExpr::Sum(col("final_amount")), "total_revenue"),
            (AggExpr::Avg(col("order_value")), "avg_order_value"),
            (AggExpr::Percent(is_cancelled()), "cancellation_rate"),
            (AggExpr::Avg(col("delivery_time_min")), "avg_delivery_time"),
            (AggExpr::Avg(col("delivery_rating")), "avg_delivery_rating"),
            (AggExpr::Avg(col("profit_margin_percent")), "avg_profit_margin_percent"),
        ],
    )
}

fn rfm_segment_summary() -> LogicalPlan {
    LogicalPlan::RfmSegment {
        input: Box::new(LogicalPlan::scan(ORDERS)),
    }
    .aggregate(
        vec![(col("segment"), "segment")],
        vec![
            (AggExpr::CountAll, "customers"),
            (AggExpr::Avg(col("recency_days")), "avg_recency_days"),
            (AggExpr::Avg(col("frequency")), "avg_frequency"),
            (AggExpr::Sum(col("monetary")), "total_monetary"),
        ],
    )
    .sort(vec![desc("customers")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const CORE_REPORTS: [&str; 15] = [
        "top_spenders",
        "age_group_order_value",
        "day_pattern",
        "monthly_revenue",
        "discount_impact",
        "city_revenue",
        "cuisine_revenue",
        "delivery_time_by_city",
        "rating_vs_delivery_time",
        "top_rated_restaurants",
        "restaurant_cancellation_rate",
        "cuisine_performance",
        "peak_hour_demand",
        "payment_mode_share",
        "cancellation_reasons",
    ];

    #[test]
    fn builtin_catalog_contains_core_reports_once() {
        let catalog = ReportCatalog::builtin();
        for name in CORE_REPORTS {
            assert!(catalog.get(name).is_ok(), "missing report {name}");
        }
        let unique: HashSet<_> = catalog.names().into_iter().collect();
        assert_eq!(unique.len(), catalog.reports().len());
    }

    #[test]
    fn rollup_backed_reports_read_city_performance() {
        let catalog = ReportCatalog::builtin();
        let with_rollup: Vec<_> = catalog
            .reports()
            .iter()
            .filter(|r| r.rollup_plan.is_some())
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(with_rollup, vec!["monthly_revenue", "city_revenue"]);
        for name in with_rollup {
            let spec = catalog.get(name).expect("report");
            assert_eq!(spec.rollup_source().as_deref(), Some(CITY_PERFORMANCE));
        }
    }

    #[test]
    fn duplicate_and_unknown_names_are_planning_errors() {
        let mut catalog = ReportCatalog::builtin();
        let dup = catalog.get("day_pattern").expect("report").clone();
        assert!(matches!(catalog.register(dup), Err(FdqError::Planning(_))));
        assert!(matches!(catalog.get("nope"), Err(FdqError::Planning(_))));
    }

    #[test]
    fn cancellation_reasons_filters_before_grouping() {
        let catalog = ReportCatalog::builtin();
        let plan = &catalog.get("cancellation_reasons").expect("report").plan;
        let LogicalPlan::Sort { input, .. } = plan else {
            panic!("expected sort on top");
        };
        let LogicalPlan::Aggregate { input, .. } = input.as_ref() else {
            panic!("expected aggregate under sort");
        };
        assert!(matches!(input.as_ref(), LogicalPlan::Filter { .. }));
    }
}
