//! Canonical Arrow schemas for the fact, dimension, and rollup tables.
//!
//! Column names are lower snake case. Loaders match source headers
//! case-insensitively against these names.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

pub const ORDERS: &str = "orders";
pub const CUSTOMERS: &str = "customers";
pub const RESTAURANTS: &str = "restaurants";
pub const DELIVERY_PARTNERS: &str = "delivery_partners";
pub const ORDER_ANALYTICS: &str = "order_analytics";
pub const DAILY_SUMMARY: &str = "daily_summary";
pub const RESTAURANT_PERFORMANCE: &str = "restaurant_performance";
pub const CITY_PERFORMANCE: &str = "city_performance";

/// Column names of the `orders` fact table.
pub mod order_cols {
    pub const ORDER_ID: &str = "order_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const RESTAURANT_ID: &str = "restaurant_id";
    pub const DELIVERY_PARTNER_ID: &str = "delivery_partner_id";
    pub const ORDER_DATE: &str = "order_date";
    pub const ORDER_TIME: &str = "order_time";
    pub const ORDER_DAY: &str = "order_day";
    pub const ORDER_DAY_TYPE: &str = "order_day_type";
    pub const CITY: &str = "city";
    pub const AREA: &str = "area";
    pub const DISTANCE_KM: &str = "distance_km";
    pub const ORDER_VALUE: &str = "order_value";
    pub const DISCOUNT_APPLIED: &str = "discount_applied";
    pub const FINAL_AMOUNT: &str = "final_amount";
    pub const PROFIT_MARGIN: &str = "profit_margin";
    pub const PROFIT_MARGIN_PERCENT: &str = "profit_margin_percent";
    pub const DELIVERY_TIME_MIN: &str = "delivery_time_min";
    pub const DELIVERY_PERFORMANCE: &str = "delivery_performance";
    pub const DELIVERY_RATING: &str = "delivery_rating";
    pub const RESTAURANT_RATING: &str = "restaurant_rating";
    pub const ORDER_STATUS: &str = "order_status";
    pub const CANCELLATION_REASON: &str = "cancellation_reason";
    pub const PAYMENT_MODE: &str = "payment_mode";
    pub const PEAK_HOUR: &str = "peak_hour";
    pub const IS_DELAYED: &str = "is_delayed";
    pub const HIGH_VALUE_ORDER: &str = "high_value_order";
}

/// Foreign key from the orders table to a dimension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
    pub references: &'static str,
}

pub const ORDER_FOREIGN_KEYS: [ForeignKey; 3] = [
    ForeignKey {
        column: order_cols::CUSTOMER_ID,
        table: CUSTOMERS,
        references: "customer_id",
    },
    ForeignKey {
        column: order_cols::RESTAURANT_ID,
        table: RESTAURANTS,
        references: "restaurant_id",
    },
    ForeignKey {
        column: order_cols::DELIVERY_PARTNER_ID,
        table: DELIVERY_PARTNERS,
        references: "delivery_partner_id",
    },
];

pub fn orders_schema() -> SchemaRef {
    use order_cols::*;
    Arc::new(Schema::new(vec![
        Field::new(ORDER_ID, DataType::Utf8, false),
        Field::new(CUSTOMER_ID, DataType::Utf8, true),
        Field::new(RESTAURANT_ID, DataType::Utf8, true),
        Field::new(DELIVERY_PARTNER_ID, DataType::Utf8, true),
        Field::new(ORDER_DATE, DataType::Utf8, true),
        Field::new(ORDER_TIME, DataType::Utf8, true),
        Field::new(ORDER_DAY, DataType::Utf8, true),
        Field::new(ORDER_DAY_TYPE, DataType::Utf8, true),
        Field::new(CITY, DataType::Utf8, true),
        Field::new(AREA, DataType::Utf8, true),
        Field::new(DISTANCE_KM, DataType::Float64, true),
        Field::new(ORDER_VALUE, DataType::Float64, true),
        Field::new(DISCOUNT_APPLIED, DataType::Float64, true),
        Field::new(FINAL_AMOUNT, DataType::Float64, true),
        Field::new(PROFIT_MARGIN, DataType::Float64, true),
        Field::new(PROFIT_MARGIN_PERCENT, DataType::Float64, true),
        Field::new(DELIVERY_TIME_MIN, DataType::Float64, true),
        Field::new(DELIVERY_PERFORMANCE, DataType::Utf8, true),
        Field::new(DELIVERY_RATING, DataType::Float64, true),
        Field::new(RESTAURANT_RATING, DataType::Float64, true),
        Field::new(ORDER_STATUS, DataType::Utf8, true),
        Field::new(CANCELLATION_REASON, DataType::Utf8, true),
        Field::new(PAYMENT_MODE, DataType::Utf8, true),
        Field::new(PEAK_HOUR, DataType::Boolean, true),
        Field::new(IS_DELAYED, DataType::Boolean, true),
        Field::new(HIGH_VALUE_ORDER, DataType::Boolean, true),
    ]))
}

pub fn customers_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("customer_name", DataType::Utf8, true),
        Field::new("customer_age", DataType::Int64, true),
        Field::new("customer_gender", DataType::Utf8, true),
        Field::new("age_group", DataType::Utf8, true),
        Field::new("customer_city", DataType::Utf8, true),
    ]))
}

pub fn restaurants_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("restaurant_id", DataType::Utf8, false),
        Field::new("restaurant_name", DataType::Utf8, true),
        Field::new("cuisine_type", DataType::Utf8, true),
        Field::new("restaurant_avg_rating", DataType::Float64, true),
        Field::new("restaurant_city", DataType::Utf8, true),
    ]))
}

pub fn delivery_partners_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("delivery_partner_id", DataType::Utf8, false),
        Field::new("partner_name", DataType::Utf8, true),
        Field::new("partner_avg_rating", DataType::Float64, true),
        Field::new("total_deliveries", DataType::Int64, true),
    ]))
}

/// Schema for a table known to the engine, if `name` is one of the eight canonical tables.
pub fn canonical_schema(name: &str) -> Option<SchemaRef> {
    match name {
        ORDERS => Some(orders_schema()),
        CUSTOMERS => Some(customers_schema()),
        RESTAURANTS => Some(restaurants_schema()),
        DELIVERY_PARTNERS => Some(delivery_partners_schema()),
        _ => None,
    }
}

/// Source headers that map onto a prefixed canonical dimension column without an
/// explicit `alias.` option. Keys are lowercase.
pub fn default_aliases(table: &str) -> &'static [(&'static str, &'static str)] {
    match table {
        CUSTOMERS => &[("city", "customer_city")],
        RESTAURANTS => &[
            ("city", "restaurant_city"),
            ("avg_rating", "restaurant_avg_rating"),
        ],
        DELIVERY_PARTNERS => &[("avg_rating", "partner_avg_rating")],
        _ => &[],
    }
}

pub fn is_rollup_table(name: &str) -> bool {
    matches!(
        name,
        ORDER_ANALYTICS | DAILY_SUMMARY | RESTAURANT_PERFORMANCE | CITY_PERFORMANCE
    )
}

pub fn rollup_tables() -> [&'static str; 4] {
    [
        ORDER_ANALYTICS,
        DAILY_SUMMARY,
        RESTAURANT_PERFORMANCE,
        CITY_PERFORMANCE,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn dimension_columns_do_not_collide_with_order_columns() {
        let orders: HashSet<String> = orders_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        for schema in [
            customers_schema(),
            restaurants_schema(),
            delivery_partners_schema(),
        ] {
            for f in schema.fields().iter().skip(1) {
                assert!(
                    !orders.contains(f.name()),
                    "column {} would be ambiguous after join",
                    f.name()
                );
            }
        }
    }

    #[test]
    fn foreign_keys_name_existing_columns() {
        let orders = orders_schema();
        for fk in ORDER_FOREIGN_KEYS {
            assert!(orders.index_of(fk.column).is_ok());
            let dim = canonical_schema(fk.table).expect("dimension schema");
            assert!(dim.index_of(fk.references).is_ok());
        }
    }
}
