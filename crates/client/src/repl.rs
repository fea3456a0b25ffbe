use std::io::Write;

use arrow::util::pretty::pretty_format_batches;
use fdq_common::{FdqError, Result};
use fdq_execution::OrderFilter;

use crate::Engine;

/// One CLI/REPL action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Report(String),
    View(String),
    Rollup(String),
    Explain(String),
    Kpis,
    Refresh,
    Metrics,
    Check,
}

impl Command {
    /// Parse `words` such as `["report", "top_spenders"]`.
    pub fn parse(words: &[&str]) -> Result<Self> {
        let named = |kind: &str| -> Result<String> {
            words
                .get(1)
                .map(|s| s.to_string())
                .ok_or_else(|| FdqError::InvalidConfig(format!("{kind} needs a name")))
        };
        match words.first().copied() {
            Some("list") => Ok(Self::List),
            Some("report") => Ok(Self::Report(named("report")?)),
            Some("view") => Ok(Self::View(named("view")?)),
            Some("rollup") => Ok(Self::Rollup(named("rollup")?)),
            Some("explain") => Ok(Self::Explain(named("explain")?)),
            Some("kpis") => Ok(Self::Kpis),
            Some("refresh") => Ok(Self::Refresh),
            Some("metrics") => Ok(Self::Metrics),
            Some("check") => Ok(Self::Check),
            Some(other) => Err(FdqError::InvalidConfig(format!("unknown command: {other}"))),
            None => Err(FdqError::InvalidConfig("empty command".to_string())),
        }
    }
}

/// Run `cmd` and render its output as text.
pub fn run_command(engine: &Engine, cmd: &Command, filter: &OrderFilter) -> Result<String> {
    match cmd {
        Command::List => {
            let mut out = String::new();
            for r in engine.reports() {
                out.push_str(&format!("{:<34} {:<11} {}\n", r.name, r.category, r.title));
            }
            Ok(out)
        }
        Command::Report(name) => {
            let output = engine.report_filtered(name, filter)?;
            render(&output.batch)
        }
        Command::Kpis => render(&engine.report_filtered("executive_kpis", filter)?.batch),
        Command::View(name) => render(&engine.view_filtered(name, filter)?.batch),
        Command::Rollup(name) => render(&engine.rollup(name)?.batch),
        Command::Explain(name) => engine.explain(name),
        Command::Refresh => {
            engine.refresh_rollups()?;
            Ok("rollups refreshed\n".to_string())
        }
        Command::Metrics => Ok(engine.prometheus_metrics()),
        Command::Check => {
            let mut out = String::new();
            for c in engine.check_references()? {
                out.push_str(&format!(
                    "{} -> {}: dimension_present={} orphan_rows={} null_keys={}\n",
                    c.foreign_key.column,
                    c.foreign_key.table,
                    c.dimension_present,
                    c.orphan_rows,
                    c.null_keys
                ));
            }
            Ok(out)
        }
    }
}

fn render(batch: &arrow::record_batch::RecordBatch) -> Result<String> {
    if batch.num_rows() == 0 {
        return Ok("OK: 0 rows\n".to_string());
    }
    let rendered = pretty_format_batches(std::slice::from_ref(batch))
        .map_err(|e| FdqError::Execution(format!("render failed: {e}")))?;
    Ok(format!("{rendered}\n"))
}

pub fn run_repl(engine: &Engine, filter: &OrderFilter) -> std::result::Result<(), Box<dyn std::error::Error>> {
    eprintln!("FDQ REPL (type \\q to quit, `list` for reports)");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("fdq> ");
        std::io::stdout().flush()?;
        line.clear();
        // Ctrl+D => EOF => exit
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let raw = line.trim().trim_end_matches(';');
        if raw.is_empty() {
            continue;
        }
        if raw == "\\q" || raw.eq_ignore_ascii_case("quit") || raw.eq_ignore_ascii_case("exit") {
            break;
        }
        let words: Vec<&str> = raw.split_whitespace().collect();
        match Command::parse(&words).and_then(|cmd| run_command(engine, &cmd, filter)) {
            Ok(text) => print!("{text}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_commands() {
        assert_eq!(
            Command::parse(&["report", "top_spenders"]).expect("parse"),
            Command::Report("top_spenders".to_string())
        );
        assert_eq!(Command::parse(&["kpis"]).expect("parse"), Command::Kpis);
        assert!(Command::parse(&["view"]).is_err());
        assert!(Command::parse(&["drop"]).is_err());
    }

    #[test]
    fn empty_report_renders_zero_rows() {
        let engine = Engine::new(fdq_common::EngineConfig::default()).expect("engine");
        let text = run_command(
            &engine,
            &Command::Report("cancellation_reasons".to_string()),
            &OrderFilter::default(),
        )
        .expect("run");
        assert_eq!(text, "OK: 0 rows\n");
    }
}
