//! formmerge CLI
//!
//! Command-line tool for reconciling overlapping source forms into merged output tables.

use clap::{Parser, Subcommand};
use formmerge_core::{
    scan_directory, Catalog, Diagnostic, DiagnosticSink, ErrorLog, ExportFormat, ReconcileOptions, RunConfig,
    SourceIndex,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "formmerge")]
#[command(about = "Reconcile overlapping data-entry forms", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the source forms into output tables
    Run {
        /// Source index file (name|form_id|file_path per line)
        #[arg(short, long, conflicts_with = "source_dir")]
        index: Option<PathBuf>,

        /// Directories to scan for form CSVs instead of an index
        #[arg(short, long)]
        source_dir: Vec<PathBuf>,

        /// Mapping table (CSV)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output spec table (CSV)
        #[arg(long)]
        spec: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Diagnostic log path
        #[arg(long, default_value = formmerge_core::config::DEFAULT_LOG)]
        log: PathBuf,

        /// Output format (csv or json)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Compare dates by absolute distance
        #[arg(long)]
        symmetric_dates: bool,
    },

    /// Run a job file
    RunJob {
        /// Path to job file (JSON)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Validate the mapping and output spec tables
    Check {
        /// Mapping table (CSV)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output spec table (CSV)
        #[arg(long)]
        spec: PathBuf,

        /// Print the validated catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the forms an index or directory scan resolves to
    Scan {
        /// Source index file
        #[arg(short, long, conflicts_with = "root")]
        index: Option<PathBuf>,

        /// Root directories to scan
        #[arg(short, long)]
        root: Vec<PathBuf>,

        /// Print the resolved index as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a job file template
    CreateJob {
        /// Output path for the job file
        #[arg(short, long)]
        output: PathBuf,

        /// Source directories to include (an index path is used otherwise)
        #[arg(short, long)]
        root: Vec<PathBuf>,

        /// Output directory for exports
        #[arg(long)]
        export_dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formmerge=info,formmerge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> formmerge_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            index,
            source_dir,
            mapping,
            spec,
            output,
            log,
            format,
            symmetric_dates,
        } => {
            let job = RunConfig {
                index,
                source_dirs: source_dir,
                mapping,
                output_spec: spec,
                output_dir: output,
                log_path: log,
                format,
                options: ReconcileOptions {
                    symmetric_date_window: symmetric_dates,
                },
            };
            cmd_run(&job)
        }
        Commands::RunJob { job } => cmd_run(&RunConfig::load(&job)?),
        Commands::Check { mapping, spec, json } => cmd_check(&mapping, &spec, json),
        Commands::Scan { index, root, json } => cmd_scan(index.as_deref(), &root, json),
        Commands::CreateJob { output, root, export_dir } => cmd_create_job(&output, root, export_dir),
    }
}

fn cmd_run(job: &RunConfig) -> formmerge_core::Result<()> {
    let mut log = ErrorLog::create(&job.log_path)?;

    let report = match job.execute(&mut log) {
        Ok(report) => report,
        Err(e) => {
            log.report(Diagnostic::from(&e));
            if let Err(flush_err) = log.flush() {
                error!("{}", flush_err);
            }
            eprintln!("Error: {}", e);
            println!("Run aborted with {} error(s), see {}", log.error_count(), log.path().display());
            std::process::exit(1);
        }
    };

    println!("Run complete:");
    println!("  {} output table(s)", report.stats.tables);
    println!(
        "  {} column(s) reconciled, {} skipped",
        report.stats.columns_reconciled, report.stats.columns_skipped
    );
    println!("  {} discrepancies", report.stats.discrepancies);
    println!("  {} error(s) logged to {}", report.error_count, log.path().display());
    println!();
    println!("Files written to {}:", job.output_dir.display());
    for path in &report.files_written {
        println!("  - {}", path.display());
    }

    Ok(())
}

fn cmd_check(mapping: &Path, spec: &Path, json: bool) -> formmerge_core::Result<()> {
    let catalog = Catalog::load(mapping, spec)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("Mapping and output spec are valid");
    println!("{} mappings", catalog.mappings().len());
    println!();

    for table in catalog.output_tables() {
        let keys = catalog.key_columns(table);
        println!("{} (key: {})", table, keys.join(", "));
        for spec in catalog.columns_of(table) {
            if spec.is_key {
                continue;
            }
            let forms: Vec<String> = catalog
                .mappings_for_column(table, &spec.output_column)
                .iter()
                .map(|m| format!("{}[{}]", m.input_form, m.form_precedence))
                .collect();
            println!("  {}. {} <- {}", spec.display_order, spec.output_column, forms.join(", "));
        }
    }

    Ok(())
}

fn cmd_scan(index: Option<&Path>, roots: &[PathBuf], json: bool) -> formmerge_core::Result<()> {
    let index = match index {
        Some(path) => SourceIndex::load(path)?,
        None => scan_directory(roots)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    println!("Forms ({}):", index.entries.len());
    for entry in &index.entries {
        println!("  {} ({}): {}", entry.form_id, entry.name, entry.path.display());
    }

    Ok(())
}

fn cmd_create_job(output: &Path, roots: Vec<PathBuf>, export_dir: PathBuf) -> formmerge_core::Result<()> {
    let job = RunConfig::template(roots, export_dir);

    job.save(output)?;
    info!("created job file {}", output.display());
    println!("Created job file: {}", output.display());
    println!();
    println!("Edit the file to point at your mapping and forms, then run:");
    println!("  formmerge run-job --job {}", output.display());

    Ok(())
}
