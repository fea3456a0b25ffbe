use std::sync::Arc;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    report_runs: CounterVec,
    report_errors: CounterVec,
    report_rows_in: CounterVec,
    report_rows_out: CounterVec,
    report_time_seconds: HistogramVec,
    table_rows_loaded: CounterVec,
    rollup_refreshes: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// Record one successful report/view/rollup execution.
    ///
    /// `source` is `raw` or `rollup` depending on which plan served the request.
    pub fn record_report(&self, report: &str, source: &str, rows_in: u64, rows_out: u64, secs: f64) {
        let labels = [report, source];
        self.inner.report_runs.with_label_values(&labels).inc();
        self.inner
            .report_rows_in
            .with_label_values(&labels)
            .inc_by(rows_in as f64);
        self.inner
            .report_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .report_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn inc_report_errors(&self, report: &str) {
        self.inner.report_errors.with_label_values(&[report]).inc();
    }

    pub fn record_table_load(&self, table: &str, format: &str, rows: u64) {
        self.inner
            .table_rows_loaded
            .with_label_values(&[table, format])
            .inc_by(rows as f64);
    }

    pub fn inc_rollup_refresh(&self, rollup: &str) {
        self.inner
            .rollup_refreshes
            .with_label_values(&[rollup])
            .inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let report_runs = counter_vec(
            &registry,
            "fdq_report_runs_total",
            "Report executions",
            &["report", "source"],
        );
        let report_errors = counter_vec(
            &registry,
            "fdq_report_errors_total",
            "Failed report executions",
            &["report"],
        );
        let report_rows_in = counter_vec(
            &registry,
            "fdq_report_rows_in_total",
            "Snapshot rows scanned per report",
            &["report", "source"],
        );
        let report_rows_out = counter_vec(
            &registry,
            "fdq_report_rows_out_total",
            "Result rows produced per report",
            &["report", "source"],
        );
        let report_time_seconds = histogram_vec(
            &registry,
            "fdq_report_time_seconds",
            "Time spent executing each report",
            &["report", "source"],
        );
        let table_rows_loaded = counter_vec(
            &registry,
            "fdq_table_rows_loaded_total",
            "Rows registered into the snapshot",
            &["table", "format"],
        );
        let rollup_refreshes = counter_vec(
            &registry,
            "fdq_rollup_refreshes_total",
            "Rollup recomputations",
            &["rollup"],
        );

        Self {
            registry,
            report_runs,
            report_errors,
            report_rows_in,
            report_rows_out,
            report_time_seconds,
            table_rows_loaded,
            rollup_refreshes,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_report("top_spenders", "raw", 120, 10, 0.01);
        let text = m.render_prometheus();
        assert!(text.contains("fdq_report_rows_out_total"));
        assert!(text.contains("top_spenders"));
    }

    #[test]
    fn renders_all_metric_families() {
        let m = MetricsRegistry::new();
        m.record_report("city_revenue", "rollup", 4, 2, 0.002);
        m.inc_report_errors("nope");
        m.record_table_load("orders", "csv", 100);
        m.inc_rollup_refresh("daily_summary");
        let text = m.render_prometheus();

        assert!(text.contains("fdq_report_runs_total"));
        assert!(text.contains("fdq_report_errors_total"));
        assert!(text.contains("fdq_report_rows_in_total"));
        assert!(text.contains("fdq_report_time_seconds"));
        assert!(text.contains("fdq_table_rows_loaded_total"));
        assert!(text.contains("fdq_rollup_refreshes_total"));
    }
}
