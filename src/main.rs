use anyhow::Context;
use clap::Parser;
use patsim::{Patsim, PatsimConfig};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Patient similarity over FHIR records
#[derive(Parser, Debug)]
#[command(name = "patsim")]
#[command(about = "Pairwise patient similarity over FHIR records", long_about = None)]
struct Args {
    /// Feature and ontology configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// FHIR Bundle file; may be repeated
    #[arg(short, long)]
    bundle: Vec<PathBuf>,

    /// JSON array of resources; may be repeated
    #[arg(short, long)]
    resources: Vec<PathBuf>,

    /// Print the raw per-patient feature table instead of similarity matrices
    #[arg(long)]
    features_only: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut out, value)?;
    } else {
        serde_json::to_writer(&mut out, value)?;
    }
    writeln!(out)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting patsim v{}", env!("CARGO_PKG_VERSION"));

    let config = PatsimConfig::from_file(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    info!(
        "Config loaded: {} features, {} ontologies",
        config.features.len(),
        config.ontologies.len()
    );
    let mut patsim = Patsim::from_config(config)?;

    for path in &args.bundle {
        let added = patsim
            .add_bundle(&read_json(path)?)
            .with_context(|| format!("ingesting bundle {}", path.display()))?;
        info!("Ingested {} resources from {:?}", added, path);
    }
    for path in &args.resources {
        let resources = match read_json(path)? {
            Value::Array(resources) => resources,
            _ => anyhow::bail!("{} must contain a JSON array of resources", path.display()),
        };
        let added = patsim
            .add_resources(resources)
            .with_context(|| format!("ingesting resources {}", path.display()))?;
        info!("Ingested {} resources from {:?}", added, path);
    }
    info!("Patients: {}", patsim.store().patient_count());

    if args.features_only {
        write_json(&patsim.feature_table(), args.pretty)?;
    } else {
        write_json(&patsim.compute_similarities()?, args.pretty)?;
    }
    Ok(())
}
