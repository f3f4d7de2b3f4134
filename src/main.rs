mod aggregate;
mod config;
mod export;
mod heuristics;
mod ledger_db;
mod pipeline;
mod reconcile;
mod resolver;
mod roster;
mod source;

use chrono::Datelike;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use ledger_db::{LedgerStore, SqliteLedger};
use pipeline::{CategoryReport, PersistOutcome, RunReport};
use reconcile::{LedgerRow, Month, Period, ReconcilePolicy, format_cents};
use resolver::{NameResolver, Resolution};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Monthly sales commission from parts and services reports",
    long_about = None
)]
struct Cli {
    /// Path to the TOML config holding the rate and the roster.
    #[arg(long, global = true, default_value = ".config/commission.toml")]
    config: PathBuf,

    /// Enable debug logging (every skipped line is reported).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract both reports, reconcile, and store the month's rows.
    Process {
        /// Parts sales report (.pdf or .txt).
        #[arg(long)]
        parts: PathBuf,
        /// Services sales report (.pdf or .txt).
        #[arg(long)]
        services: PathBuf,
        #[arg(long)]
        year: Option<i32>,
        /// Month number or Portuguese name.
        #[arg(long)]
        month: Option<Month>,
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long)]
        xlsx: Option<PathBuf>,
        /// Compute and print only; leave the ledger untouched.
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print stored ledger rows.
    Show {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<Month>,
        #[arg(long)]
        json: bool,
    },
    /// Write stored ledger rows to a file.
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<Month>,
    },
    /// List roster identities and their lookup keys.
    Roster,
    /// Run one name through the resolver.
    Resolve { text: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Csv,
    Xlsx,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Process {
            parts,
            services,
            year,
            month,
            csv,
            xlsx,
            dry_run,
            json,
        } => {
            let roster = Arc::new(cfg.roster()?);
            let period = period_or_now(year, month);
            let policy = ReconcilePolicy {
                rate: cfg.commission_rate,
                fill_roster: cfg.fill_roster,
            };
            info!(
                period = %period,
                roster = %roster.version(),
                rate = policy.rate,
                fill_roster = policy.fill_roster,
                "Starting run"
            );

            let report = pipeline::process(
                source::open_source(&parts)?,
                source::open_source(&services)?,
                roster,
                period,
                policy,
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            deliver(&report, &cfg, csv.as_deref(), xlsx.as_deref(), dry_run)?;
        }

        Commands::Show { year, month, json } => {
            let store = SqliteLedger::new(&cfg.db_path)?;
            let rows = read_rows(&store, year, month)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_rows(&rows);
            }
        }

        Commands::Export {
            out,
            format,
            year,
            month,
        } => {
            let store = SqliteLedger::new(&cfg.db_path)?;
            let rows = read_rows(&store, year, month)?;
            match format {
                ExportFormat::Csv => {
                    export::save_csv(&out, &rows)?;
                    let back = export::read_csv_amounts(std::fs::File::open(&out)?)?;
                    let intact = back.len() == rows.len()
                        && back.iter().zip(&rows).all(|(amounts, row)| amounts.matches(row));
                    if !intact {
                        warn!(
                            path = %out.display(),
                            "Exported CSV does not read back to the stored figures"
                        );
                    }
                }
                ExportFormat::Xlsx => export::save_xlsx(&out, &rows)?,
            }
        }

        Commands::Roster => {
            let roster = cfg.roster()?;
            println!("label        {}", roster.label().unwrap_or("-"));
            println!("version      {}", roster.version());
            println!("fingerprint  {}", roster.fingerprint());
            println!();
            for identity in roster.identities() {
                println!("{}", identity.name());
                for key in identity.keys() {
                    println!("    {key}");
                }
            }

            let shared: Vec<&str> = roster
                .lookup_keys()
                .into_iter()
                .filter(|(_, target)| target.is_none())
                .map(|(key, _)| key)
                .collect();
            if !shared.is_empty() {
                println!();
                println!("ambiguous keys: {}", shared.join(", "));
            }
        }

        Commands::Resolve { text } => {
            let resolver = NameResolver::new(Arc::new(cfg.roster()?));
            println!("normalized  {:?}", roster::normalize(&text));
            match resolver.resolve(&text) {
                Resolution::Resolved(identity) => println!("resolved    {}", identity.name()),
                Resolution::Ambiguous => println!("ambiguous   (more than one roster match)"),
                Resolution::Unresolved => println!("unresolved"),
            }
        }
    }

    Ok(())
}

/// Store the run, then write the requested export files. A bad export path
/// never keeps the rows out of the ledger.
fn deliver(
    report: &RunReport,
    cfg: &Config,
    csv: Option<&Path>,
    xlsx: Option<&Path>,
    dry_run: bool,
) -> Result<Option<PersistOutcome>, Box<dyn std::error::Error>> {
    let outcome = if dry_run {
        info!("Dry run; ledger untouched");
        None
    } else {
        let outcome = store_run(report, cfg)?;
        match &outcome {
            PersistOutcome::Stored { rows, run_id } => {
                info!(rows, run_id = ?run_id, db = %cfg.db_path, "Ledger updated");
            }
            PersistOutcome::Fallback { path, error } => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Ledger not updated; rows saved locally"
                );
            }
        }
        Some(outcome)
    };

    if let Some(path) = csv {
        export::save_csv(path, &report.rows)?;
    }
    if let Some(path) = xlsx {
        export::save_xlsx(path, &report.rows)?;
    }
    Ok(outcome)
}

fn store_run(report: &RunReport, cfg: &Config) -> Result<PersistOutcome, export::ExportError> {
    let fallback_dir = Path::new(&cfg.fallback_dir);
    match SqliteLedger::new(&cfg.db_path) {
        Ok(store) => {
            let outcome = pipeline::persist(report, &store, fallback_dir)?;
            if let Ok((rows, runs)) = store.counts() {
                info!(rows, runs, "Ledger size");
            }
            Ok(outcome)
        }
        Err(e) => pipeline::fallback(report, fallback_dir, e),
    }
}

/// Fill a missing year or month from today's date.
fn period_or_now(year: Option<i32>, month: Option<Month>) -> Period {
    let today = chrono::Local::now().date_naive();
    let current = Month::from_number(today.month()).unwrap_or(Month::Janeiro);
    Period::new(year.unwrap_or(today.year()), month.unwrap_or(current))
}

fn read_rows(
    store: &dyn LedgerStore,
    year: Option<i32>,
    month: Option<Month>,
) -> Result<Vec<LedgerRow>, ledger_db::StoreError> {
    if year.is_none() && month.is_none() {
        store.read_all()
    } else {
        store.read_period(period_or_now(year, month))
    }
}

fn print_report(report: &RunReport) {
    println!("Período {}  (roster {})", report.period, report.roster_version);
    for category in [&report.parts, &report.services] {
        print_category(category);
    }
    println!();
    print_rows(&report.rows);
}

fn print_category(report: &CategoryReport) {
    let s = &report.stats;
    println!(
        "  {:<9} {} página(s), {} linha(s): {} lidas, {} ignoradas \
         (sem padrão {}, fora do roster {}, ambíguas {}, valor inválido {}), total R$ {}",
        report.category.label(),
        report.pages,
        s.lines,
        s.resolved,
        s.skipped(),
        s.no_match,
        s.unresolved,
        s.ambiguous,
        s.amount_invalid,
        format_cents(report.total_cents),
    );
}

fn print_rows(rows: &[LedgerRow]) {
    println!(
        "{:<10} {:<32} {:>14} {:>14} {:>14} {:>12}",
        "Período", "Consultor", "Peças", "Serviços", "Total", "Comissão"
    );
    for row in rows {
        println!(
            "{:<10} {:<32} {:>14} {:>14} {:>14} {:>12}",
            row.period().to_string(),
            row.consultant(),
            format_cents(row.parts_cents()),
            format_cents(row.services_cents()),
            format_cents(row.total_cents()),
            format_cents(row.commission_cents()),
        );
    }
}
