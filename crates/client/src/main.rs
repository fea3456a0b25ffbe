use chrono::NaiveDate;
use fdq_client::repl::{run_command, run_repl, Command};
use fdq_client::{Engine, OrderFilter};
use fdq_common::EngineConfig;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let opts = parse_opts(&args)?;
    let mut config = match &opts.config {
        Some(path) => EngineConfig::load_from_json(path)?,
        None => EngineConfig::default(),
    };
    if let Some(n) = opts.top_n {
        config.default_top_n = n;
    }
    config.use_rollups |= opts.use_rollups;

    let engine = Engine::new(config)?;
    if let Some(catalog_path) = &opts.catalog {
        engine.load_catalog_file(catalog_path)?;
    }
    if engine.config().use_rollups {
        engine.refresh_rollups()?;
    }

    if opts.words.first().map(String::as_str) == Some("repl") {
        run_repl(&engine, &opts.filter)?;
    } else {
        let words: Vec<&str> = opts.words.iter().map(String::as_str).collect();
        let cmd = Command::parse(&words)?;
        print!("{}", run_command(&engine, &cmd, &opts.filter)?);
    }

    if opts.metrics {
        print!("{}", engine.prometheus_metrics());
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOpts {
    words: Vec<String>,
    catalog: Option<String>,
    config: Option<String>,
    filter: OrderFilter,
    top_n: Option<usize>,
    use_rollups: bool,
    metrics: bool,
}

fn parse_opts(args: &[String]) -> Result<CliOpts, Box<dyn std::error::Error>> {
    let mut opts = CliOpts::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String, Box<dyn std::error::Error>> {
            i += 1;
            Ok(args
                .get(i)
                .cloned()
                .ok_or_else(|| format!("missing value for {flag}"))?)
        };
        match flag {
            "--catalog" => opts.catalog = Some(value()?),
            "--config" => opts.config = Some(value()?),
            "--from" => opts.filter.date_from = Some(parse_date(&value()?)?),
            "--to" => opts.filter.date_to = Some(parse_date(&value()?)?),
            "--city" => opts.filter.city = Some(value()?),
            "--status" => opts.filter.status = Some(value()?),
            "--cuisine" => opts.filter.cuisines.push(value()?),
            "--top" => opts.top_n = Some(value()?.parse()?),
            "--use-rollups" => opts.use_rollups = true,
            "--metrics" => opts.metrics = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}").into());
            }
            word => opts.words.push(word.to_string()),
        }
        i += 1;
    }
    Ok(opts)
}

fn parse_date(s: &str) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date {s:?} (expected YYYY-MM-DD): {e}").into())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  fdq [OPTIONS] list");
    eprintln!("  fdq [OPTIONS] report <name>");
    eprintln!("  fdq [OPTIONS] view <name>");
    eprintln!("  fdq [OPTIONS] rollup <name>");
    eprintln!("  fdq [OPTIONS] explain <name>");
    eprintln!("  fdq [OPTIONS] kpis | check | repl");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --catalog PATH   JSON table catalog");
    eprintln!("  --config PATH    JSON engine config");
    eprintln!("  --from DATE --to DATE --city X --status S --cuisine C (repeatable)");
    eprintln!("  --top N          row limit for top-N reports");
    eprintln!("  --use-rollups    answer reports from fresh rollups");
    eprintln!("  --metrics        print Prometheus metrics after the command");
}
