//! Order filters that narrow a snapshot before reports run.

use std::collections::HashSet;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use fdq_common::{FdqError, Result};
use fdq_storage::schema::{is_rollup_table, order_cols, ORDERS, RESTAURANTS};
use fdq_storage::{MemTable, Snapshot};
use tracing::debug;

use crate::derive::parse_date;
use crate::scalar::scalar_from_array;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    /// Inclusive lower bound on `order_date`.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on `order_date`.
    pub date_to: Option<NaiveDate>,
    pub city: Option<String>,
    pub status: Option<String>,
    /// Matches orders whose restaurant serves any of these cuisines.
    pub cuisines: Vec<String>,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_from(mut self, date: NaiveDate) -> Self {
        self.date_from = Some(date);
        self
    }

    pub fn with_date_to(mut self, date: NaiveDate) -> Self {
        self.date_to = Some(date);
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisines.push(cuisine.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.city.is_none()
            && self.status.is_none()
            && self.cuisines.is_empty()
    }

    /// Copy of `snapshot` whose orders table holds only matching rows.
    /// Rollup tables are left out so they get recomputed from the filtered
    /// orders instead of being read stale.
    pub fn apply(&self, snapshot: &Snapshot) -> Result<Snapshot> {
        if self.is_empty() {
            return Ok(snapshot.clone());
        }
        let restaurants = if self.cuisines.is_empty() {
            None
        } else {
            Some(self.restaurant_ids(snapshot)?)
        };

        let mut out = Snapshot::new();
        for name in snapshot.table_names() {
            if is_rollup_table(&name) || name == ORDERS {
                continue;
            }
            out.register(name.clone(), snapshot.table(&name)?.as_ref().clone());
        }

        let orders = snapshot.table(ORDERS)?;
        let mut batches = Vec::with_capacity(orders.batches().len());
        let (mut rows_in, mut rows_out) = (0, 0);
        for batch in orders.batches() {
            let mask = self.mask(batch, restaurants.as_ref())?;
            let kept = filter_record_batch(batch, &mask)
                .map_err(|e| FdqError::Execution(format!("order filter failed: {e}")))?;
            rows_in += batch.num_rows();
            rows_out += kept.num_rows();
            batches.push(kept);
        }
        debug!(rows_in, rows_out, filter = ?self, "orders filtered");
        out.register(ORDERS, MemTable::new(orders.schema(), batches));
        Ok(out)
    }

    fn restaurant_ids(&self, snapshot: &Snapshot) -> Result<HashSet<String>> {
        let wanted: HashSet<String> = self.cuisines.iter().map(|c| c.to_lowercase()).collect();
        let table = snapshot.table(RESTAURANTS)?;
        let mut ids = HashSet::new();
        for batch in table.batches() {
            let id = column(batch, "restaurant_id")?;
            let cuisine = column(batch, "cuisine_type")?;
            for row in 0..batch.num_rows() {
                let c = scalar_from_array(cuisine, row)?;
                if !c.as_str().is_some_and(|c| wanted.contains(&c.to_lowercase())) {
                    continue;
                }
                if let Some(id) = scalar_from_array(id, row)?.as_str() {
                    ids.insert(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    fn mask(&self, batch: &RecordBatch, restaurants: Option<&HashSet<String>>) -> Result<BooleanArray> {
        let dates = column(batch, order_cols::ORDER_DATE)?;
        let cities = column(batch, order_cols::CITY)?;
        let statuses = column(batch, order_cols::ORDER_STATUS)?;
        let restaurant_ids = column(batch, order_cols::RESTAURANT_ID)?;
        let mut keep = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let mut ok = true;
            if self.date_from.is_some() || self.date_to.is_some() {
                let date = scalar_from_array(dates, row)?.as_str().and_then(parse_date);
                ok &= date.is_some_and(|d| {
                    self.date_from.map_or(true, |from| d >= from)
                        && self.date_to.map_or(true, |to| d <= to)
                });
            }
            if let Some(city) = &self.city {
                ok &= equals_ignore_case(&scalar_from_array(cities, row)?, city);
            }
            if let Some(status) = &self.status {
                ok &= equals_ignore_case(&scalar_from_array(statuses, row)?, status);
            }
            if let Some(ids) = restaurants {
                ok &= scalar_from_array(restaurant_ids, row)?
                    .as_str()
                    .is_some_and(|id| ids.contains(id));
            }
            keep.push(ok);
        }
        Ok(BooleanArray::from(keep))
    }
}

fn equals_ignore_case(value: &crate::scalar::ScalarValue, wanted: &str) -> bool {
    value
        .as_str()
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(wanted.trim()))
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| FdqError::Planning(format!("order filter needs column {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdq_common::RestaurantId;
    use fdq_storage::model::{orders_to_batch, restaurants_to_batch, Order, OrderStatus, Restaurant};
    use fdq_storage::schema::{orders_schema, CITY_PERFORMANCE};

    fn order(id: &str, date: &str, city: &str, restaurant: &str, status: OrderStatus) -> Order {
        let mut o = Order::new(id, "C1", 100.0);
        o.order_date = Some(date.to_string());
        o.city = Some(city.to_string());
        o.restaurant_id = Some(RestaurantId::new(restaurant));
        o.order_status = Some(status);
        o
    }

    fn snapshot() -> Snapshot {
        let orders = orders_to_batch(&[
            order("O1", "2024-01-05", "Pune", "R1", OrderStatus::Delivered),
            order("O2", "2024-01-31", "Mumbai", "R2", OrderStatus::Cancelled),
            order("O3", "2024-02-01", "pune", "R2", OrderStatus::Delivered),
        ])
        .expect("orders");
        let restaurants = restaurants_to_batch(&[
            Restaurant {
                restaurant_id: RestaurantId::new("R1"),
                restaurant_name: Some("Spice Hub".to_string()),
                cuisine_type: Some("Indian".to_string()),
                restaurant_avg_rating: None,
                restaurant_city: None,
            },
            Restaurant {
                restaurant_id: RestaurantId::new("R2"),
                restaurant_name: Some("Dragon Bowl".to_string()),
                cuisine_type: Some("Chinese".to_string()),
                restaurant_avg_rating: None,
                restaurant_city: None,
            },
        ])
        .expect("restaurants");
        let mut snap = Snapshot::new();
        snap.register(ORDERS, MemTable::new(orders_schema(), vec![orders]));
        snap.register(RESTAURANTS, MemTable::try_from_batches(vec![restaurants]).expect("mem"));
        let generation = snap.orders_generation();
        snap.register_rollup(CITY_PERFORMANCE, MemTable::empty(orders_schema()), generation);
        snap
    }

    fn rows(filter: OrderFilter) -> usize {
        filter
            .apply(&snapshot())
            .expect("apply")
            .table(ORDERS)
            .expect("orders")
            .num_rows()
    }

    #[test]
    fn date_range_is_inclusive() {
        let jan = OrderFilter::new()
            .with_date_from(NaiveDate::from_ymd_opt(2024, 1, 5).expect("date"))
            .with_date_to(NaiveDate::from_ymd_opt(2024, 1, 31).expect("date"));
        assert_eq!(rows(jan), 2);
    }

    #[test]
    fn city_and_status_ignore_case() {
        assert_eq!(rows(OrderFilter::new().with_city("PUNE")), 2);
        assert_eq!(rows(OrderFilter::new().with_status("cancelled")), 1);
    }

    #[test]
    fn cuisines_resolve_through_restaurants() {
        assert_eq!(rows(OrderFilter::new().with_cuisine("chinese")), 2);
        assert_eq!(rows(OrderFilter::new().with_cuisine("Thai")), 0);
    }

    #[test]
    fn filtered_snapshot_drops_rollups() {
        let filtered = OrderFilter::new().with_city("Pune").apply(&snapshot()).expect("apply");
        assert!(!filtered.contains(CITY_PERFORMANCE));
        assert!(filtered.contains(RESTAURANTS));
    }
}
