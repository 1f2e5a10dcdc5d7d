//! krx-collector CLI
//!
//! Commands:
//! - `init` — create the database and run migrations
//! - `register` — register an instrument in the registry
//! - `import` — import daily bars from per-code CSV files
//! - `validate` — run the data quality checks and print/save the report
//! - `status` — show registry and collection progress
//! - `deactivate` — remove an instrument from the active set
//! - `drop-table` — drop an instrument's bar table

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use krx_collector::{
    Config, CsvBarSource, DailyBarCollector, DataQualityValidator, Database, ReportBuilder,
};

#[derive(Parser)]
#[command(
    name = "krx-collector",
    about = "KRX daily bar collector and data quality validator"
)]
struct Cli {
    /// Database file path. Defaults to KRX_DB_PATH or ./data/stock_data.db.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and run migrations.
    Init,
    /// Register an instrument.
    Register {
        /// Instrument code (e.g., 005930).
        code: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        /// Market segment (e.g., KOSPI, KOSDAQ).
        #[arg(long)]
        market: Option<String>,
    },
    /// Import daily bars from per-code CSV files.
    Import {
        /// Directory containing <code>.csv files.
        #[arg(long, default_value = "data/csv")]
        dir: PathBuf,

        /// Instrument codes to import. Defaults to all active instruments.
        codes: Vec<String>,

        /// Import even when the stored data is already fresh.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Run the data quality checks.
    Validate {
        /// Single instrument code. Defaults to all active instruments.
        code: Option<String>,

        /// Write the report to the reports directory as well.
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Show registry and collection progress.
    Status,
    /// Deactivate an instrument (kept in the registry, excluded from runs).
    Deactivate {
        /// Instrument code.
        code: String,
    },
    /// Drop an instrument's bar table (the registry row is kept).
    DropTable {
        /// Instrument code.
        code: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "krx_collector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    config.ensure_data_dir()?;

    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Init => {
            // Migrations already ran on open
            println!("Database ready at {}", config.db_path.display());
        }
        Commands::Register { code, name, market } => {
            db.register_instrument(&code, name.as_deref(), market.as_deref())?;
            println!("Registered {}", code);
        }
        Commands::Import { dir, codes, force } => {
            let source = CsvBarSource::new(dir);
            let collector = DailyBarCollector::new(&db, &source);

            let summary = if codes.is_empty() {
                collector.collect_all_active(force)?
            } else {
                collector.collect_many(&codes, force)
            };

            println!(
                "Imported {} bars ({} ok, {} failed, {} skipped)",
                summary.total_saved,
                summary.success.len(),
                summary.failed.len(),
                summary.skipped.len()
            );
            if !summary.failed.is_empty() {
                bail!("failed instruments: {}", summary.failed.join(", "));
            }
        }
        Commands::Validate { code, save } => {
            let validator = DataQualityValidator::new(&db);

            let results = match code {
                Some(code) => {
                    let mut map = BTreeMap::new();
                    map.insert(code.clone(), validator.validate(&code));
                    map
                }
                None => validator.validate_all(),
            };

            let names: BTreeMap<String, String> = db
                .list_active_instruments()?
                .into_iter()
                .filter_map(|instrument| instrument.name.map(|name| (instrument.code, name)))
                .collect();

            let builder = ReportBuilder::new().with_names(names);
            println!("{}", builder.build(&results));

            if save {
                let path = builder.write_to_dir(&results, &config.reports_dir)?;
                println!("Report saved to {}", path.display());
            }
        }
        Commands::Status => {
            let status = db.collection_status()?;
            let tables = db.list_bar_tables()?;

            println!("Active instruments: {}", status.total_instruments);
            println!("Tables created:     {}", status.created_tables);
            println!("Bar tables on disk: {}", tables.len());
            println!("Total bar records:  {}", status.total_records);
            println!("Completion:         {:.1}%", status.completion_rate);

            for instrument in db.list_active_instruments()? {
                println!(
                    "  {} {} [{}] {} rows ({} ~ {})",
                    instrument.code,
                    instrument.name.as_deref().unwrap_or("unknown"),
                    instrument.market.as_deref().unwrap_or("-"),
                    instrument.data_count,
                    instrument.first_date.as_deref().unwrap_or("-"),
                    instrument.latest_date.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Deactivate { code } => {
            if db.deactivate_instrument(&code)? {
                println!("Deactivated {}", code);
            } else {
                bail!("instrument {} is not registered", code);
            }
        }
        Commands::DropTable { code } => {
            db.drop_bar_table(&code)?;
            println!("Dropped bar table for {}", code);
        }
    }

    Ok(())
}
