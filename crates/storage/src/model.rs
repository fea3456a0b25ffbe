//! Typed row models for the fact and dimension tables and their Arrow encoders.
//!
//! These are a convenience for programmatic loading and fixtures; the engine itself
//! only sees record batches in the canonical schemas from [`crate::schema`].

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use fdq_common::{CustomerId, DeliveryPartnerId, FdqError, OrderId, RestaurantId, Result};
use serde::{Deserialize, Serialize};

use crate::schema::{
    customers_schema, delivery_partners_schema, orders_schema, restaurants_schema,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Case-insensitive parse; source data mixes `Cancelled` and `cancelled`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delivered" => Some(Self::Delivered),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One row of the `orders` fact table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub restaurant_id: Option<RestaurantId>,
    pub delivery_partner_id: Option<DeliveryPartnerId>,
    pub order_date: Option<String>,
    pub order_time: Option<String>,
    pub order_day: Option<String>,
    pub order_day_type: Option<String>,
    pub city: Option<String>,
    pub area: Option<String>,
    pub distance_km: Option<f64>,
    pub order_value: Option<f64>,
    pub discount_applied: Option<f64>,
    pub final_amount: Option<f64>,
    pub profit_margin: Option<f64>,
    pub profit_margin_percent: Option<f64>,
    pub delivery_time_min: Option<f64>,
    pub delivery_performance: Option<String>,
    pub delivery_rating: Option<f64>,
    pub restaurant_rating: Option<f64>,
    pub order_status: Option<OrderStatus>,
    pub cancellation_reason: Option<String>,
    pub payment_mode: Option<String>,
    pub peak_hour: Option<bool>,
    pub is_delayed: Option<bool>,
    pub high_value_order: Option<bool>,
}

impl Order {
    /// A delivered order with only the keys and value set; everything else is NULL.
    pub fn new(order_id: impl Into<String>, customer_id: impl Into<String>, order_value: f64) -> Self {
        Self {
            order_id: OrderId::new(order_id),
            customer_id: Some(CustomerId::new(customer_id)),
            restaurant_id: None,
            delivery_partner_id: None,
            order_date: None,
            order_time: None,
            order_day: None,
            order_day_type: None,
            city: None,
            area: None,
            distance_km: None,
            order_value: Some(order_value),
            discount_applied: None,
            final_amount: None,
            profit_margin: None,
            profit_margin_percent: None,
            delivery_time_min: None,
            delivery_performance: None,
            delivery_rating: None,
            restaurant_rating: None,
            order_status: Some(OrderStatus::Delivered),
            cancellation_reason: None,
            payment_mode: None,
            peak_hour: None,
            is_delayed: None,
            high_value_order: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: CustomerId,
    pub customer_name: Option<String>,
    pub customer_age: Option<i64>,
    pub customer_gender: Option<String>,
    pub age_group: Option<String>,
    pub customer_city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub restaurant_id: RestaurantId,
    pub restaurant_name: Option<String>,
    pub cuisine_type: Option<String>,
    pub restaurant_avg_rating: Option<f64>,
    pub restaurant_city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryPartner {
    pub delivery_partner_id: DeliveryPartnerId,
    pub partner_name: Option<String>,
    pub partner_avg_rating: Option<f64>,
    pub total_deliveries: Option<i64>,
}

fn utf8<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    let mut b = StringBuilder::new();
    for v in values {
        b.append_option(v);
    }
    Arc::new(b.finish())
}

fn f64s(values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
    let mut b = Float64Builder::new();
    for v in values {
        b.append_option(v);
    }
    Arc::new(b.finish())
}

fn i64s(values: impl Iterator<Item = Option<i64>>) -> ArrayRef {
    let mut b = Int64Builder::new();
    for v in values {
        b.append_option(v);
    }
    Arc::new(b.finish())
}

fn bools(values: impl Iterator<Item = Option<bool>>) -> ArrayRef {
    let mut b = BooleanBuilder::new();
    for v in values {
        b.append_option(v);
    }
    Arc::new(b.finish())
}

fn build(schema: arrow_schema::SchemaRef, cols: Vec<ArrayRef>, table: &str) -> Result<RecordBatch> {
    RecordBatch::try_new(schema, cols)
        .map_err(|e| FdqError::Execution(format!("{table} batch build failed: {e}")))
}

pub fn orders_to_batch(rows: &[Order]) -> Result<RecordBatch> {
    let cols = vec![
        utf8(rows.iter().map(|r| Some(r.order_id.as_str()))),
        utf8(rows.iter().map(|r| r.customer_id.as_ref().map(|v| v.as_str()))),
        utf8(rows.iter().map(|r| r.restaurant_id.as_ref().map(|v| v.as_str()))),
        utf8(rows.iter().map(|r| r.delivery_partner_id.as_ref().map(|v| v.as_str()))),
        utf8(rows.iter().map(|r| r.order_date.as_deref())),
        utf8(rows.iter().map(|r| r.order_time.as_deref())),
        utf8(rows.iter().map(|r| r.order_day.as_deref())),
        utf8(rows.iter().map(|r| r.order_day_type.as_deref())),
        utf8(rows.iter().map(|r| r.city.as_deref())),
        utf8(rows.iter().map(|r| r.area.as_deref())),
        f64s(rows.iter().map(|r| r.distance_km)),
        f64s(rows.iter().map(|r| r.order_value)),
        f64s(rows.iter().map(|r| r.discount_applied)),
        f64s(rows.iter().map(|r| r.final_amount)),
        f64s(rows.iter().map(|r| r.profit_margin)),
        f64s(rows.iter().map(|r| r.profit_margin_percent)),
        f64s(rows.iter().map(|r| r.delivery_time_min)),
        utf8(rows.iter().map(|r| r.delivery_performance.as_deref())),
        f64s(rows.iter().map(|r| r.delivery_rating)),
        f64s(rows.iter().map(|r| r.restaurant_rating)),
        utf8(rows.iter().map(|r| r.order_status.map(|s| s.as_str()))),
        utf8(rows.iter().map(|r| r.cancellation_reason.as_deref())),
        utf8(rows.iter().map(|r| r.payment_mode.as_deref())),
        bools(rows.iter().map(|r| r.peak_hour)),
        bools(rows.iter().map(|r| r.is_delayed)),
        bools(rows.iter().map(|r| r.high_value_order)),
    ];
    build(orders_schema(), cols, "orders")
}

pub fn customers_to_batch(rows: &[Customer]) -> Result<RecordBatch> {
    let cols = vec![
        utf8(rows.iter().map(|r| Some(r.customer_id.as_str()))),
        utf8(rows.iter().map(|r| r.customer_name.as_deref())),
        i64s(rows.iter().map(|r| r.customer_age)),
        utf8(rows.iter().map(|r| r.customer_gender.as_deref())),
        utf8(rows.iter().map(|r| r.age_group.as_deref())),
        utf8(rows.iter().map(|r| r.customer_city.as_deref())),
    ];
    build(customers_schema(), cols, "customers")
}

pub fn restaurants_to_batch(rows: &[Restaurant]) -> Result<RecordBatch> {
    let cols = vec![
        utf8(rows.iter().map(|r| Some(r.restaurant_id.as_str()))),
        utf8(rows.iter().map(|r| r.restaurant_name.as_deref())),
        utf8(rows.iter().map(|r| r.cuisine_type.as_deref())),
        f64s(rows.iter().map(|r| r.restaurant_avg_rating)),
        utf8(rows.iter().map(|r| r.restaurant_city.as_deref())),
    ];
    build(restaurants_schema(), cols, "restaurants")
}

pub fn delivery_partners_to_batch(rows: &[DeliveryPartner]) -> Result<RecordBatch> {
    let cols = vec![
        utf8(rows.iter().map(|r| Some(r.delivery_partner_id.as_str()))),
        utf8(rows.iter().map(|r| r.partner_name.as_deref())),
        f64s(rows.iter().map(|r| r.partner_avg_rating)),
        i64s(rows.iter().map(|r| r.total_deliveries)),
    ];
    build(delivery_partners_schema(), cols, "delivery_partners")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(OrderStatus::parse("cancelled"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse(" Delivered "), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::parse("pending"), None);
    }

    #[test]
    fn orders_encode_nulls_for_missing_fields() {
        let batch = orders_to_batch(&[Order::new("O1", "C1", 100.0)]).expect("batch");
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), orders_schema().fields().len());
        let city = batch
            .column_by_name("city")
            .expect("city")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert!(city.is_null(0));
        let status = batch
            .column_by_name("order_status")
            .expect("status")
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("utf8");
        assert_eq!(status.value(0), "Delivered");
    }
}
