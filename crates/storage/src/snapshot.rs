//! In-memory table snapshot read by every report.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use fdq_common::{FdqError, Result};
use tracing::warn;

use crate::schema::{ForeignKey, ORDERS, ORDER_FOREIGN_KEYS};

/// A fully materialized table.
#[derive(Debug, Clone)]
pub struct MemTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn try_from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        let first = batches.first().ok_or_else(|| {
            FdqError::Execution("cannot infer table schema from zero batches".to_string())
        })?;
        let schema = first.schema();
        for b in &batches {
            if b.schema().fields() != schema.fields() {
                return Err(FdqError::Execution(
                    "all batches of a table must share one schema".to_string(),
                ));
            }
        }
        Ok(Self::new(schema, batches))
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Single batch holding every row (empty batch for an empty table).
    pub fn concat(&self) -> Result<RecordBatch> {
        if self.batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        concat_batches(&self.schema, &self.batches)
            .map_err(|e| FdqError::Execution(format!("table concat failed: {e}")))
    }
}

/// Outcome of checking one foreign key of the orders table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCheck {
    pub foreign_key: ForeignKey,
    pub dimension_present: bool,
    /// Order rows whose non-null key has no dimension row.
    pub orphan_rows: usize,
    pub null_keys: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tables: BTreeMap<String, Arc<MemTable>>,
    orders_generation: u64,
    rollup_generations: BTreeMap<String, u64>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a table. Replacing `orders` invalidates every rollup.
    pub fn register(&mut self, name: impl Into<String>, table: MemTable) {
        let name = name.into();
        if name == ORDERS {
            self.orders_generation += 1;
        }
        self.rollup_generations.remove(&name);
        self.tables.insert(name, Arc::new(table));
    }

    /// Register a rollup computed from orders at `generation`.
    pub fn register_rollup(&mut self, name: impl Into<String>, table: MemTable, generation: u64) {
        let name = name.into();
        self.rollup_generations.insert(name.clone(), generation);
        self.tables.insert(name, Arc::new(table));
    }

    pub fn table(&self, name: &str) -> Result<Arc<MemTable>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| FdqError::Planning(format!("table not registered: {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn orders_generation(&self) -> u64 {
        self.orders_generation
    }

    /// True when `name` is a registered rollup computed from the current orders.
    pub fn is_rollup_fresh(&self, name: &str) -> bool {
        self.contains(name)
            && self.rollup_generations.get(name).copied() == Some(self.orders_generation)
    }

    /// Count order rows whose foreign keys point at missing dimension rows.
    pub fn check_references(&self) -> Result<Vec<ReferenceCheck>> {
        let orders = self.table(ORDERS)?;
        let mut out = Vec::with_capacity(ORDER_FOREIGN_KEYS.len());
        for fk in ORDER_FOREIGN_KEYS {
            let keys = match self.tables.get(fk.table) {
                Some(dim) => Some(string_set(dim, fk.references)?),
                None => None,
            };
            let mut orphan_rows = 0;
            let mut null_keys = 0;
            for batch in orders.batches() {
                let col = string_column(batch, fk.column)?;
                for row in 0..col.len() {
                    if col.is_null(row) {
                        null_keys += 1;
                    } else if !keys.as_ref().is_some_and(|k| k.contains(col.value(row))) {
                        orphan_rows += 1;
                    }
                }
            }
            if orphan_rows > 0 {
                warn!(
                    column = fk.column,
                    dimension = fk.table,
                    orphan_rows,
                    "orders reference missing dimension rows"
                );
            }
            out.push(ReferenceCheck {
                foreign_key: fk,
                dimension_present: keys.is_some(),
                orphan_rows,
                null_keys,
            });
        }
        Ok(out)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| FdqError::Planning(format!("unknown column: {name}")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| FdqError::Execution(format!("column {name} is not Utf8")))
}

fn string_set(table: &MemTable, column: &str) -> Result<HashSet<String>> {
    let mut set = HashSet::new();
    for batch in table.batches() {
        let col = string_column(batch, column)?;
        for row in 0..col.len() {
            if col.is_valid(row) {
                set.insert(col.value(row).to_string());
            }
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{customers_to_batch, orders_to_batch, Customer, Order};
    use crate::schema::{orders_schema, CUSTOMERS, DAILY_SUMMARY};
    use fdq_common::CustomerId;

    fn orders() -> MemTable {
        let mut o3 = Order::new("O3", "C1", 5.0);
        o3.customer_id = None;
        let batch = orders_to_batch(&[
            Order::new("O1", "C1", 10.0),
            Order::new("O2", "C9", 20.0),
            o3,
        ])
        .expect("orders");
        MemTable::new(orders_schema(), vec![batch])
    }

    #[test]
    fn replacing_orders_makes_rollups_stale() {
        let mut snap = Snapshot::new();
        snap.register(ORDERS, orders());
        let generation = snap.orders_generation();
        snap.register_rollup(DAILY_SUMMARY, MemTable::empty(orders_schema()), generation);
        assert!(snap.is_rollup_fresh(DAILY_SUMMARY));

        snap.register(ORDERS, orders());
        assert!(!snap.is_rollup_fresh(DAILY_SUMMARY));
        assert!(snap.contains(DAILY_SUMMARY));
    }

    #[test]
    fn reports_orphan_and_null_references() {
        let mut snap = Snapshot::new();
        snap.register(ORDERS, orders());
        let customers = customers_to_batch(&[Customer {
            customer_id: CustomerId::from("C1"),
            customer_name: None,
            customer_age: Some(30),
            customer_gender: None,
            age_group: None,
            customer_city: None,
        }])
        .expect("customers");
        snap.register(CUSTOMERS, MemTable::try_from_batches(vec![customers]).expect("mem"));

        let checks = snap.check_references().expect("checks");
        let customer = &checks[0];
        assert!(customer.dimension_present);
        assert_eq!(customer.orphan_rows, 1);
        assert_eq!(customer.null_keys, 1);

        let restaurant = &checks[1];
        assert!(!restaurant.dimension_present);
        assert_eq!(restaurant.orphan_rows, 0);
        assert_eq!(restaurant.null_keys, 3);
    }
}
