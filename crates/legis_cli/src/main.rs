use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use legis_cli::server::{self, AppState};
use legis_core::config::Config;
use legis_core::db::Store;
use legis_core::fetch::{Fetcher, LocalFetcher, RsyncFetcher, SourceKind};
use legis_core::ingest::{self, Ingestor};
use legis_core::legislators::read_legislators;
use legis_core::query;
use legis_core::report::{FanoutSink, TracingSink};
use run_reports::VaultSink;
use schemars::schema_for;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "legis")]
#[command(about = "Legislative feed ingestion and query service", long_about = None)]
struct Cli {
    /// Path to legis.toml
    #[arg(long, global = true, env = "LEGIS_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides the config file)
    #[arg(long, global = true, env = "LEGIS_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export JSON Schemas for the stored document types
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Manage the legislator collection
    Legislators {
        #[command(subcommand)]
        command: LegislatorCommands,
    },
    /// Sync and ingest one session of bills or roll calls
    Ingest {
        kind: Kind,

        /// Session number (default: the current session)
        #[arg(long)]
        session: Option<u32>,

        /// Use files already under the data directory instead of syncing
        #[arg(long)]
        offline: bool,
    },
    /// Run one query and print the response body
    Query {
        /// e.g. bills.json
        resource: String,

        /// key=value parameters
        params: Vec<String>,
    },
    /// Serve the query API over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum LegislatorCommands {
    /// Upsert legislators from a JSON or YAML list
    Import { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Bills,
    Rolls,
}

impl From<Kind> for SourceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Bills => SourceKind::Bills,
            Kind::Rolls => SourceKind::Rolls,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("legis_core=info,legis_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }

    match cli.command {
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        },
        Commands::Legislators { command } => match command {
            LegislatorCommands::Import { file } => legislators_import(&config, file),
        },
        Commands::Ingest {
            kind,
            session,
            offline,
        } => run_ingest(&config, kind.into(), session, offline || config.offline),
        Commands::Query { resource, params } => run_query(&config, &resource, &params),
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(server::serve(&bind, AppState::new(config.database.clone())))
        }
    }
}

fn schema_export(out_dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&out_dir)?;

    let bill_schema = schema_for!(legis_core::schema::Bill);
    fs::write(out_dir.join("Bill.schema.json"), serde_json::to_string_pretty(&bill_schema)?)?;

    let roll_schema = schema_for!(legis_core::schema::Roll);
    fs::write(out_dir.join("Roll.schema.json"), serde_json::to_string_pretty(&roll_schema)?)?;

    let legislator_schema = schema_for!(legis_core::schema::Legislator);
    fs::write(
        out_dir.join("Legislator.schema.json"),
        serde_json::to_string_pretty(&legislator_schema)?,
    )?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn legislators_import(config: &Config, file: PathBuf) -> Result<()> {
    let legislators = read_legislators(&file)?;
    let store = Store::open(&config.database)
        .with_context(|| format!("opening {}", config.database.display()))?;

    let mut rejected = 0;
    for legislator in &legislators {
        if let Err(err) = store.upsert(legislator) {
            match err {
                legis_core::error::StoreError::Invalid(errors) => {
                    rejected += 1;
                    warn!(bioguide_id = %legislator.bioguide_id, ?errors, "skipping invalid legislator");
                }
                other => return Err(other).context("saving legislators"),
            }
        }
    }

    info!(imported = legislators.len() - rejected, rejected, "legislator import finished");
    println!(
        "Imported {} legislators from {}",
        legislators.len() - rejected,
        file.display()
    );
    Ok(())
}

fn run_ingest(config: &Config, kind: SourceKind, session: Option<u32>, offline: bool) -> Result<()> {
    let session = session.unwrap_or_else(ingest::current_session);
    let store = Store::open(&config.database)
        .with_context(|| format!("opening {}", config.database.display()))?;

    let fetcher: Box<dyn Fetcher> = if offline {
        Box::new(LocalFetcher {
            data_dir: config.data_dir.clone(),
        })
    } else {
        Box::new(RsyncFetcher {
            remote: config.rsync_remote.clone(),
            data_dir: config.data_dir.clone(),
            timeout_secs: config.rsync_timeout_secs,
        })
    };
    let sink = FanoutSink::new(vec![
        Box::new(TracingSink),
        Box::new(VaultSink::new(config.report_dir.clone())),
    ]);

    let summary = Ingestor::new(&store, fetcher.as_ref(), &sink)
        .with_lock_dir(config.data_dir.clone())
        .run(kind, session);

    println!(
        "{} {}: {} saved, {} failed, {} missing legislator ids",
        kind.label(),
        session,
        summary.count,
        summary.failed.len(),
        summary.missing_ids.len()
    );
    if let Some(reason) = summary.aborted {
        bail!("ingestion of {} for session {session} stopped: {reason}", kind.label());
    }
    Ok(())
}

fn run_query(config: &Config, resource: &str, raw_params: &[String]) -> Result<()> {
    let params = raw_params
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| anyhow!("expected key=value, got {pair:?}"))
        })
        .collect::<Result<HashMap<String, String>>>()?;

    let store = Store::open_read_only(&config.database)
        .with_context(|| format!("opening {}", config.database.display()))?;
    let response = query::handle(&store, resource, &params)?;
    if response.body.is_empty() {
        bail!("{resource}: not found ({})", response.status);
    }
    println!("{}", response.body);
    Ok(())
}
