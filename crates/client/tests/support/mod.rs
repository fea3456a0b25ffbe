#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use arrow::array::{Array, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use fdq_client::Engine;
use fdq_common::{CustomerId, EngineConfig, RestaurantId};
use fdq_storage::model::{Customer, Order, OrderStatus, Restaurant};

pub fn order(
    id: &str,
    customer: &str,
    restaurant: &str,
    date: &str,
    value: f64,
    status: OrderStatus,
) -> Order {
    let mut o = Order::new(id, customer, value);
    o.restaurant_id = Some(RestaurantId::new(restaurant));
    o.order_date = Some(date.to_string());
    o.order_time = Some("13:10".to_string());
    o.discount_applied = Some(0.0);
    o.order_status = Some(status);
    if status == OrderStatus::Cancelled {
        o.cancellation_reason = Some("Late delivery".to_string());
    }
    o
}

pub fn delivered(id: &str, customer: &str, restaurant: &str, date: &str, value: f64) -> Order {
    order(id, customer, restaurant, date, value, OrderStatus::Delivered)
}

pub fn cancelled(id: &str, customer: &str, restaurant: &str, date: &str, value: f64) -> Order {
    order(id, customer, restaurant, date, value, OrderStatus::Cancelled)
}

pub fn customer(id: &str, age: i64, gender: &str) -> Customer {
    Customer {
        customer_id: CustomerId::new(id),
        customer_name: Some(format!("Customer {id}")),
        customer_age: Some(age),
        customer_gender: Some(gender.to_string()),
        age_group: None,
        customer_city: Some("Pune".to_string()),
    }
}

pub fn restaurant(id: &str, name: &str, cuisine: &str) -> Restaurant {
    Restaurant {
        restaurant_id: RestaurantId::new(id),
        restaurant_name: Some(name.to_string()),
        cuisine_type: Some(cuisine.to_string()),
        restaurant_avg_rating: Some(4.2),
        restaurant_city: Some("Pune".to_string()),
    }
}

/// Three cities, two months, two restaurants, one cancellation per city.
pub fn sample_orders() -> Vec<Order> {
    let mut orders = vec![
        delivered("O1", "C1", "R1", "2024-01-05", 450.0),
        delivered("O2", "C2", "R2", "2024-01-06", 220.5),
        cancelled("O3", "C3", "R1", "2024-01-20", 310.0),
        delivered("O4", "C1", "R2", "2024-02-03", 180.25),
        cancelled("O5", "C2", "R2", "2024-02-10", 99.99),
        delivered("O6", "C3", "R1", "2024-02-11", 640.0),
        cancelled("O7", "C1", "R1", "2024-02-14", 75.0),
    ];
    let cities = ["Pune", "Mumbai", "Pune", "Delhi", "Mumbai", "Delhi", "Delhi"];
    for (o, city) in orders.iter_mut().zip(cities) {
        o.city = Some(city.to_string());
        o.delivery_time_min = Some(35.0);
        o.payment_mode = Some(if o.order_value.unwrap_or(0.0) > 200.0 { "UPI" } else { "Cash" }.to_string());
    }
    orders
}

pub fn engine_with(config: EngineConfig, orders: &[Order]) -> Engine {
    let engine = Engine::new(config).expect("engine");
    engine
        .register_customers(&[
            customer("C1", 22, "F"),
            customer("C2", 31, "M"),
            customer("C3", 58, "F"),
        ])
        .expect("customers");
    engine
        .register_restaurants(&[
            restaurant("R1", "Spice Hub", "Indian"),
            restaurant("R2", "Dragon Bowl", "Chinese"),
        ])
        .expect("restaurants");
    engine.register_orders(orders).expect("orders");
    engine
}

pub fn sample_engine() -> Engine {
    engine_with(EngineConfig::default(), &sample_orders())
}

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}_{}_{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn strings(batch: &RecordBatch, column: &str) -> Vec<Option<String>> {
    let col = batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    let arr = col
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap_or_else(|| panic!("{column} is not Utf8"));
    (0..arr.len())
        .map(|i| (!arr.is_null(i)).then(|| arr.value(i).to_string()))
        .collect()
}

pub fn floats(batch: &RecordBatch, column: &str) -> Vec<Option<f64>> {
    let col = batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    let arr = col
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap_or_else(|| panic!("{column} is not Float64"));
    (0..arr.len())
        .map(|i| (!arr.is_null(i)).then(|| arr.value(i)))
        .collect()
}

pub fn ints(batch: &RecordBatch, column: &str) -> Vec<Option<i64>> {
    let col = batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("missing column {column}"));
    let arr = col
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap_or_else(|| panic!("{column} is not Int64"));
    (0..arr.len())
        .map(|i| (!arr.is_null(i)).then(|| arr.value(i)))
        .collect()
}

pub fn sum_ints(batch: &RecordBatch, column: &str) -> i64 {
    ints(batch, column).into_iter().flatten().sum()
}
