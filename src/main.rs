use anyhow::{bail, Context, Result};
use aqpipe::{
    config::PipelineConfig,
    fetch::{self, push},
    pipeline::{latest_drift_report, TrainingPipeline},
};
use clap::{Parser, Subcommand};
use std::{fs, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides `source.uri` from the config file.
const SOURCE_URI_ENV: &str = "AQPIPE_SOURCE_URI";

#[derive(Parser, Debug)]
#[command(author, version, about = "Air-quality training data pipeline")]
struct Args {
    /// Pipeline configuration (YAML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest, validate and transform one run
    Run {
        /// Fix the train/test split seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load a CSV export into the file-backed record store
    Push {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the newest drift report
    Report,
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let mut cfg = match path {
        Some(p) => PipelineConfig::load(p).with_context(|| format!("loading config {}", p.display()))?,
        None => PipelineConfig::default(),
    };
    if let Ok(uri) = std::env::var(SOURCE_URI_ENV) {
        info!(uri = %uri, "source uri overridden from environment");
        cfg.source.uri = uri;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();
    let mut cfg = load_config(args.config.as_ref())?;

    match args.command {
        Command::Run { seed } => {
            if seed.is_some() {
                cfg.ingestion.seed = seed;
            }
            cfg.validate()?;
            let source = fetch::open_source(&cfg.source)?;
            match TrainingPipeline::new(cfg, source).run() {
                Ok(outcome) => {
                    println!("{}", outcome.ingestion);
                    println!("{}", outcome.validation);
                    println!("{}", outcome.transformation);
                    info!(run_dir = %outcome.run_dir.display(), "done");
                }
                Err(failure) => {
                    if let Some(last) = &failure.last_artifact {
                        println!("{}", last);
                    }
                    error!(error = %failure, "run failed");
                    return Err(failure.into());
                }
            }
        }
        Command::Push { csv } => {
            let uri = cfg.source.uri.trim();
            if uri.starts_with("http://") || uri.starts_with("https://") {
                bail!("push writes to a file-backed store; `{}` is remote", uri);
            }
            let root = uri.strip_prefix("file://").unwrap_or(uri);
            let documents = push::csv_to_documents(&csv)
                .with_context(|| format!("reading {}", csv.display()))?;
            let n = push::insert_documents(root, &cfg.source.database, &cfg.source.collection, &documents)?;
            println!("{}", n);
        }
        Command::Report => match latest_drift_report(&cfg)? {
            Some(path) => {
                info!(path = %path.display(), "latest drift report");
                print!("{}", fs::read_to_string(&path)?);
            }
            None => bail!("no drift report under {}", cfg.artifact_dir.display()),
        },
    }
    Ok(())
}
