use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use fdq_common::{EngineConfig, FdqError, Result};
use fdq_execution::{enrich_customers, enrich_orders, execute_plan, OrderFilter};
use fdq_planner::{explain_logical, is_view, rollup_names, rollup_plan, view_plan, LogicalPlan, ReportSpec};
use fdq_storage::model::{
    customers_to_batch, delivery_partners_to_batch, orders_to_batch, restaurants_to_batch, Customer,
    DeliveryPartner, Order, Restaurant,
};
use fdq_storage::schema::{is_rollup_table, CUSTOMERS, DELIVERY_PARTNERS, ORDERS, RESTAURANTS};
use fdq_storage::{provider_for, Catalog, MemTable, ReferenceCheck, Snapshot};
use tracing::{debug, info, warn};

use crate::session::{Session, SharedSession};

/// Which plan produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Raw,
    Rollup,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Rollup => "rollup",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub name: String,
    pub source: PlanSource,
    pub batch: RecordBatch,
}

impl ReportOutput {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

#[derive(Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config)?);
        Ok(Self { session })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.config
    }

    /// Load every table of a JSON catalog file.
    pub fn load_catalog_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let catalog = Catalog::load_from_json(path)?;
        self.load_catalog(&catalog)
    }

    pub fn load_catalog(&self, catalog: &Catalog) -> Result<()> {
        let batch_size_rows = self.session.ctx.batch_size_rows();
        for def in catalog.tables() {
            let provider = provider_for(&def, batch_size_rows)?;
            let table = provider.scan(&def, fdq_storage::schema::canonical_schema(&def.name))?;
            self.register_with_format(&def.name, table, provider.format())?;
        }
        Ok(())
    }

    /// Register or replace a table. Orders and customers get their NULL
    /// derived columns filled; replacing orders makes every rollup stale.
    pub fn register_table(&self, name: impl Into<String>, table: MemTable) -> Result<()> {
        self.register_with_format(&name.into(), table, "memory")
    }

    pub fn register_batches(&self, name: impl Into<String>, batches: Vec<RecordBatch>) -> Result<()> {
        self.register_table(name, MemTable::try_from_batches(batches)?)
    }

    pub fn register_orders(&self, rows: &[Order]) -> Result<()> {
        self.register_batches(ORDERS, vec![orders_to_batch(rows)?])
    }

    pub fn register_customers(&self, rows: &[Customer]) -> Result<()> {
        self.register_batches(CUSTOMERS, vec![customers_to_batch(rows)?])
    }

    pub fn register_restaurants(&self, rows: &[Restaurant]) -> Result<()> {
        self.register_batches(RESTAURANTS, vec![restaurants_to_batch(rows)?])
    }

    pub fn register_delivery_partners(&self, rows: &[DeliveryPartner]) -> Result<()> {
        self.register_batches(DELIVERY_PARTNERS, vec![delivery_partners_to_batch(rows)?])
    }

    fn register_with_format(&self, name: &str, table: MemTable, format: &str) -> Result<()> {
        if is_rollup_table(name) {
            return Err(FdqError::Planning(format!(
                "{name} is a rollup; use refresh_rollups to compute it"
            )));
        }
        let ctx = &self.session.ctx;
        let table = match name {
            ORDERS => enrich_table(&table, |b| enrich_orders(b, ctx))?,
            CUSTOMERS => enrich_table(&table, |b| enrich_customers(b, ctx))?,
            _ => table,
        };
        let rows = table.num_rows();
        let generation = self.session.update_snapshot(|snap| {
            snap.register(name, table);
            Ok(snap.orders_generation())
        })?;
        self.session.metrics.record_table_load(name, format, rows as u64);
        info!(table = name, format, rows, orders_generation = generation, "table registered");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.session.snapshot()
    }

    pub fn reports(&self) -> &[ReportSpec] {
        self.session.reports.reports()
    }

    pub fn report(&self, name: &str) -> Result<ReportOutput> {
        self.report_filtered(name, &OrderFilter::default())
    }

    /// Run a catalog report over the orders matching `filter`.
    ///
    /// With `use_rollups`, a report with a rollup plan reads its rollup when
    /// it is fresh. A filtered run recomputes that rollup from the filtered
    /// orders first.
    pub fn report_filtered(&self, name: &str, filter: &OrderFilter) -> Result<ReportOutput> {
        let spec = self.session.reports.get(name).map_err(|e| {
            self.session.metrics.inc_report_errors(name);
            e
        })?;
        let base = self.session.snapshot()?;
        let (snapshot, plan, source) = self.choose_plan(spec, &base, filter)?;
        self.run(name, &plan, &snapshot, source)
    }

    fn choose_plan(
        &self,
        spec: &ReportSpec,
        base: &Arc<Snapshot>,
        filter: &OrderFilter,
    ) -> Result<(Arc<Snapshot>, LogicalPlan, PlanSource)> {
        let rollup = match (&spec.rollup_plan, spec.rollup_source()) {
            (Some(plan), Some(table)) if self.session.config.use_rollups => Some((plan, table)),
            _ => None,
        };
        if filter.is_empty() {
            return Ok(match rollup {
                Some((plan, table)) if base.is_rollup_fresh(&table) => {
                    (Arc::clone(base), plan.clone(), PlanSource::Rollup)
                }
                Some((_, table)) => {
                    debug!(report = %spec.name, rollup = %table, "rollup missing or stale, reading orders");
                    (Arc::clone(base), spec.plan.clone(), PlanSource::Raw)
                }
                None => (Arc::clone(base), spec.plan.clone(), PlanSource::Raw),
            });
        }
        let mut filtered = filter.apply(base)?;
        match rollup {
            Some((plan, table)) => {
                let computed = execute_plan(&rollup_plan(&table)?, &filtered, &self.session.ctx)?;
                let generation = filtered.orders_generation();
                filtered.register_rollup(table, MemTable::new(computed.schema(), vec![computed]), generation);
                Ok((Arc::new(filtered), plan.clone(), PlanSource::Rollup))
            }
            None => Ok((Arc::new(filtered), spec.plan.clone(), PlanSource::Raw)),
        }
    }

    pub fn view(&self, name: &str) -> Result<ReportOutput> {
        self.view_filtered(name, &OrderFilter::default())
    }

    pub fn view_filtered(&self, name: &str, filter: &OrderFilter) -> Result<ReportOutput> {
        let plan = view_plan(name)?;
        let base = self.session.snapshot()?;
        let snapshot = Arc::new(filter.apply(&base)?);
        self.run(name, &plan, &snapshot, PlanSource::Raw)
    }

    /// The stored rollup when it is fresh, otherwise a one-off recomputation
    /// that is not stored.
    pub fn rollup(&self, name: &str) -> Result<ReportOutput> {
        let plan = rollup_plan(name)?;
        let snapshot = self.session.snapshot()?;
        if snapshot.is_rollup_fresh(name) {
            let batch = snapshot.table(name)?.concat()?;
            return Ok(ReportOutput {
                name: name.to_string(),
                source: PlanSource::Rollup,
                batch,
            });
        }
        self.run(name, &plan, &snapshot, PlanSource::Raw)
    }

    /// Recompute all rollups from the current orders and register them.
    /// Results are discarded if orders were replaced while computing.
    pub fn refresh_rollups(&self) -> Result<()> {
        let snapshot = self.session.snapshot()?;
        let generation = snapshot.orders_generation();
        let mut computed = Vec::with_capacity(rollup_names().len());
        for name in rollup_names() {
            let started = Instant::now();
            let batch = execute_plan(&rollup_plan(name)?, &snapshot, &self.session.ctx)?;
            self.session.metrics.inc_rollup_refresh(name);
            debug!(
                rollup = name,
                rows = batch.num_rows(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "rollup computed"
            );
            computed.push((name, batch));
        }
        self.session.update_snapshot(|snap| {
            if snap.orders_generation() != generation {
                warn!(
                    computed_at = generation,
                    current = snap.orders_generation(),
                    "orders replaced during rollup refresh, discarding results"
                );
                return Ok(());
            }
            for (name, batch) in computed {
                snap.register_rollup(name, MemTable::new(batch.schema(), vec![batch]), generation);
            }
            Ok(())
        })?;
        info!(orders_generation = generation, "rollups refreshed");
        Ok(())
    }

    /// Indented plan tree of a report, view or rollup.
    pub fn explain(&self, name: &str) -> Result<String> {
        if let Ok(spec) = self.session.reports.get(name) {
            let mut out = explain_logical(&spec.plan);
            if let Some(rollup) = &spec.rollup_plan {
                out.push_str("-- with use_rollups --\n");
                out.push_str(&explain_logical(rollup));
            }
            return Ok(out);
        }
        if is_view(name) {
            return Ok(explain_logical(&view_plan(name)?));
        }
        if is_rollup_table(name) {
            return Ok(explain_logical(&rollup_plan(name)?));
        }
        Err(FdqError::Planning(format!("unknown report, view or rollup: {name}")))
    }

    pub fn check_references(&self) -> Result<Vec<ReferenceCheck>> {
        self.session.snapshot()?.check_references()
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.metrics.render_prometheus()
    }

    fn run(
        &self,
        name: &str,
        plan: &LogicalPlan,
        snapshot: &Snapshot,
        source: PlanSource,
    ) -> Result<ReportOutput> {
        let started = Instant::now();
        let rows_in = snapshot.table(ORDERS).map(|t| t.num_rows()).unwrap_or(0);
        let batch = match execute_plan(plan, snapshot, &self.session.ctx) {
            Ok(batch) => batch,
            Err(e) => {
                self.session.metrics.inc_report_errors(name);
                warn!(report = name, error = %e, "report failed");
                return Err(e);
            }
        };
        let secs = started.elapsed().as_secs_f64();
        let source_label = source.to_string();
        self.session.metrics.record_report(
            name,
            &source_label,
            rows_in as u64,
            batch.num_rows() as u64,
            secs,
        );
        info!(
            report = name,
            source = %source,
            rows_in,
            rows_out = batch.num_rows(),
            elapsed_ms = (secs * 1000.0) as u64,
            "report finished"
        );
        Ok(ReportOutput {
            name: name.to_string(),
            source,
            batch,
        })
    }
}

fn enrich_table(table: &MemTable, f: impl Fn(&RecordBatch) -> Result<RecordBatch>) -> Result<MemTable> {
    let batches = table
        .batches()
        .iter()
        .map(f)
        .collect::<Result<Vec<_>>>()?;
    Ok(MemTable::new(table.schema(), batches))
}
