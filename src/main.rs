use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use link_compliance::batch::BatchOrchestrator;
use link_compliance::check::label::DICTIONARY;
use link_compliance::check::{Classify, HttpProbe, LinkClassifier, Taxonomy, TimeoutPolicy};
use link_compliance::export;
use link_compliance::extract::extract;
use link_compliance::ingest::{self, Delimiter};
use link_compliance::progress::BarProgress;
use link_compliance::report::{self, RunSummary};
use link_compliance::row::RowProcessor;
use link_compliance::settings::Settings;

const DEFAULT_OUTPUT: &str = "resultados_incumplimiento.xlsx";

#[derive(Parser)]
#[command(name = "link_compliance", about = "Transparency link compliance checker")]
struct Cli {
    /// Settings file (TOML). Defaults to ./link_compliance.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every link in a CSV file and export the non-compliant rows
    Check {
        input: PathBuf,
        /// Report file: `.xlsx` writes a spreadsheet, anything else delimited text
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
        /// Also write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Delimiter::Auto)]
        delimiter: Delimiter,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(short, long)]
        workers: Option<usize>,
        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, value_enum)]
        taxonomy: Option<Taxonomy>,
        #[arg(long, value_enum)]
        timeout_policy: Option<TimeoutPolicy>,
    },
    /// Classify a single URL
    Url {
        url: String,
        #[arg(long, value_enum)]
        taxonomy: Option<Taxonomy>,
    },
    /// Explain every possible result
    Dictionary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            input,
            output,
            summary,
            delimiter,
            chunk_size,
            workers,
            timeout,
            taxonomy,
            timeout_policy,
        } => {
            let mut settings = load_settings(cli.config.as_deref())?;
            if let Some(n) = chunk_size {
                settings.chunk_size = n;
            }
            if let Some(n) = workers {
                settings.workers = n;
            }
            if let Some(t) = taxonomy {
                settings.taxonomy = t;
            }
            if let Some(p) = timeout_policy {
                settings.timeout_policy = p;
            }
            settings.timeout_secs = timeout.or(settings.timeout_secs);
            settings.validate().context("invalid command line options")?;

            run_check(&settings, &input, &output, summary.as_deref(), delimiter).await
        }
        Commands::Url { url, taxonomy } => {
            let mut settings = load_settings(cli.config.as_deref())?;
            if let Some(t) = taxonomy {
                settings.taxonomy = t;
            }
            let Some(candidate) = extract(Some(&url)) else {
                bail!("no http(s) URL found in {:?}", url);
            };
            let classifier = build_classifier(&settings)?;
            let label = classifier.classify(&candidate).await;
            println!("{}", candidate);
            println!("  {} ({})", label.phrase(settings.taxonomy), label);
            Ok(())
        }
        Commands::Dictionary => {
            for entry in DICTIONARY {
                println!("{}", entry.phrase);
                println!("  {}", entry.plain);
                println!("  {}", entry.technical);
                println!("  {}\n", entry.code);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = Settings::load(path).context("loading settings")?;
    info!(?settings, "settings loaded");
    Ok(settings)
}

fn build_classifier(settings: &Settings) -> anyhow::Result<LinkClassifier> {
    let probe = HttpProbe::new(&settings.probe_config(), settings.portals())
        .context("building HTTP client")?;
    Ok(LinkClassifier::new(probe, settings.policy()))
}

async fn run_check(
    settings: &Settings,
    input: &Path,
    output: &Path,
    summary_path: Option<&Path>,
    delimiter: Delimiter,
) -> anyhow::Result<()> {
    let ingested = ingest::read_path(input, delimiter)
        .with_context(|| format!("reading {}", input.display()))?;
    let table = ingested.table;

    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    println!("File:    {}", name);
    println!("Rows:    {}", table.len());
    println!("Columns: {}", table.schema().len());
    if table.is_empty() {
        println!("Nothing to check.");
        return Ok(());
    }

    let classifier = build_classifier(settings)?;
    let orchestrator = BatchOrchestrator::new(RowProcessor::new(classifier), settings.batch());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing with completed blocks");
                cancel.cancel();
            }
        });
    }

    let started_at = chrono::Utc::now();
    let bar = BarProgress::new(table.len());
    let outcome = orchestrator.run(&table, &bar, &cancel).await;
    bar.finish();
    let finished_at = chrono::Utc::now();

    let summary = RunSummary::from_outcome(&outcome, settings.taxonomy, started_at, finished_at);
    let body = report::assemble_blocking(outcome.annotated, Arc::clone(table.schema()), settings.taxonomy)
        .await
        .context("rendering report")?;

    println!(
        "\nChecked {}/{} rows: {} without link, {} operational, {} non-compliant.",
        summary.processed_rows,
        summary.total_rows,
        summary.rows_without_link,
        summary.compliant_rows,
        summary.non_compliant_rows,
    );
    for (label, n) in &summary.by_label {
        println!("  {:<32} {:>6}", label, n);
    }
    if summary.cancelled {
        println!("Run cancelled: only completed blocks are reported.");
    }

    if summary.all_compliant() {
        println!("All links are operational and functional.");
    } else {
        let n = export::write_report_path(&body, ingested.delimiter, output)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Wrote {} non-compliant rows to {}", n, output.display());
    }

    if let Some(path) = summary_path {
        export::write_summary_path(&summary, path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Summary written to {}", path.display());
    }

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
