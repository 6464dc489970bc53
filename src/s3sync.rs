use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use seaweed_sync::config::{Config, parse_bucket};
use seaweed_sync::s3::{ObjectStore, S3Client, StoreError};
use seaweed_sync::sync::{
    ClearReport, ObjectLister, SyncEngine, SyncError, SyncOptions, SyncReport, format_size,
};

/// Exit code for a bulk run that finished with per-item failures
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "s3sync",
    version = env!("CARGO_PKG_VERSION"),
    author = "Tyr Chen <tyr.chen@gmail.com>",
    about = "Bucket, object and directory transfers for SeaweedFS and other S3-compatible stores",
    long_about = "Create buckets, move single objects, and upload or download whole directory trees \
                  against any S3-compatible endpoint. Directory transfers run on a bounded pool of \
                  concurrent workers; individual failures are reported at the end without stopping the run.",
    after_help = "Examples:\n  \
                  s3sync create-bucket test-bucket1\n  \
                  s3sync put test-bucket1 tpc-ds.zip ./tpc-ds.zip\n  \
                  s3sync upload-dir test-bucket1 ./dataset           # keys under dataset/\n  \
                  s3sync download-dir test-bucket1 dataset ./restore\n  \
                  s3sync clear-bucket test-bucket1\n\n\
                  Configuration (.env):\n  \
                  S3_ENDPOINT=http://127.0.0.1:8333\n  \
                  AWS_ACCESS_KEY_ID=admin\n  \
                  AWS_SECRET_ACCESS_KEY=secret\n  \
                  AWS_REGION=us-east-1\n  \
                  S3_FORCE_PATH_STYLE=true\n  \
                  SYNC_CONCURRENCY=4"
)]
struct Cli {
    /// S3 endpoint URL (overrides S3_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Region sent with signed requests (overrides AWS_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Maximum number of concurrent transfers (overrides SYNC_CONCURRENCY)
    #[arg(long, short = 'c', global = true)]
    concurrency: Option<usize>,

    /// Keys per listing request, 1-1000 (overrides S3_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<i32>,

    /// Print bulk operation reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a bucket
    CreateBucket {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
    },
    /// List all buckets
    ListBuckets,
    /// List objects in a bucket
    ListObjects {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        /// Only list keys under this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Upload one file
    Put {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        key: String,
        file: PathBuf,
    },
    /// Download one object
    Get {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        key: String,
        file: PathBuf,
    },
    /// Delete one object
    Delete {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        key: String,
    },
    /// Upload a directory tree recursively
    UploadDir {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        dir: PathBuf,
        /// Key prefix (defaults to the directory's own name; "" for none)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Download every object under a prefix into a directory
    DownloadDir {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
        prefix: String,
        dir: PathBuf,
    },
    /// Delete every object in a bucket
    ClearBucket {
        #[arg(value_parser = parse_bucket)]
        bucket: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file early to get LOG_LEVEL
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return Ok(if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    let config = load_config(&cli)?;
    info!("s3sync v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn ObjectStore> = Arc::new(S3Client::new(&config).await);
    let start = Instant::now();

    let result = run(&cli, &config, Arc::clone(&store)).await;
    drop(store);

    match result {
        Ok(code) => {
            status(
                cli.json,
                style(format!("Time taken: {:.2}s", start.elapsed().as_secs_f64())).dim(),
            );
            Ok(code)
        }
        Err(e) => {
            eprintln!("{} {}", style("✗").red(), error_message(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;

    if let Some(endpoint) = &cli.endpoint {
        Config::validate_endpoint(endpoint)?;
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(region) = &cli.region {
        Config::validate_region(region)?;
        config.region = region.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        Config::validate_concurrency(concurrency)?;
        config.concurrency = concurrency;
    }
    if let Some(page_size) = cli.page_size {
        Config::validate_page_size(page_size)?;
        config.page_size = page_size;
    }

    Ok(config)
}

async fn run(cli: &Cli, config: &Config, store: Arc<dyn ObjectStore>) -> Result<ExitCode> {
    match &cli.command {
        Command::CreateBucket { bucket } => {
            store.create_bucket(bucket).await?;
            println!("{} Created bucket: {}", style("✓").green(), bucket);
        }
        Command::ListBuckets => {
            for bucket in store.list_buckets().await? {
                println!("{}", bucket);
            }
        }
        Command::ListObjects { bucket, prefix } => {
            let mut lister = ObjectLister::new(store, bucket, prefix, config.page_size);
            let mut count = 0;
            while let Some(keys) = lister.next_page().await? {
                for key in keys {
                    count += 1;
                    println!("{}: {}", count, key);
                }
            }
            println!(
                "{}",
                style(format!("Number of objects in bucket: {}", count)).bold()
            );
        }
        Command::Put { bucket, key, file } => {
            let bytes = store.put_object(bucket, key, file).await?;
            println!(
                "{} Uploaded {} to s3://{}/{} ({})",
                style("✓").green(),
                file.display(),
                bucket,
                key,
                format_size(bytes)
            );
        }
        Command::Get { bucket, key, file } => {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let bytes = store.get_object(bucket, key, file).await?;
            println!(
                "{} Downloaded s3://{}/{} to {} ({})",
                style("✓").green(),
                bucket,
                key,
                file.display(),
                format_size(bytes)
            );
        }
        Command::Delete { bucket, key } => {
            store.delete_object(bucket, key).await?;
            println!("{} Deleted s3://{}/{}", style("✓").green(), bucket, key);
        }
        Command::UploadDir {
            bucket,
            dir,
            prefix,
        } => {
            let prefix = match prefix {
                Some(prefix) => prefix.clone(),
                None => default_prefix(dir)?,
            };
            status(
                cli.json,
                style(format!(
                    "⚡ Uploading {} to s3://{}/{} with {} workers...",
                    dir.display(),
                    bucket,
                    prefix,
                    config.concurrency
                ))
                .cyan(),
            );

            let pb = progress_bar(cli.json);
            let report = engine(config, store, &pb)
                .upload_directory(bucket, dir, &prefix)
                .await?;
            pb.finish_and_clear();
            return Ok(print_sync_report(&report, cli.json));
        }
        Command::DownloadDir {
            bucket,
            prefix,
            dir,
        } => {
            status(
                cli.json,
                style(format!(
                    "⚡ Downloading s3://{}/{} to {} with {} workers...",
                    bucket,
                    prefix,
                    dir.display(),
                    config.concurrency
                ))
                .cyan(),
            );

            let pb = progress_bar(cli.json);
            let report = engine(config, store, &pb)
                .download_directory(bucket, prefix, dir)
                .await?;
            pb.finish_and_clear();
            return Ok(print_sync_report(&report, cli.json));
        }
        Command::ClearBucket { bucket } => {
            let pb = progress_bar(cli.json);
            let report = engine(config, store, &pb).clear_bucket(bucket).await?;
            pb.finish_and_clear();
            return Ok(print_clear_report(bucket, &report, cli.json));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Store failures carry remediation hints, even when wrapped by the engine
fn error_message(e: &anyhow::Error) -> String {
    let store_err = e
        .downcast_ref::<StoreError>()
        .or_else(|| e.downcast_ref::<SyncError>().and_then(SyncError::store_error));
    match store_err {
        Some(store_err) => store_err.user_message(),
        None => format!("{:#}", e),
    }
}

/// Status lines move to stderr under `--json` so stdout is only the report
fn status_term(json: bool) -> Term {
    if json {
        Term::stderr()
    } else {
        Term::stdout()
    }
}

fn status(json: bool, line: impl std::fmt::Display) {
    let _ = status_term(json).write_line(&line.to_string());
}

fn engine(config: &Config, store: Arc<dyn ObjectStore>, pb: &ProgressBar) -> SyncEngine {
    SyncEngine::new(store, SyncOptions::from(config)).with_progress(pb.clone())
}

/// The directory's own name, so `upload-dir b ./photos` lands under `photos/`
fn default_prefix(dir: &Path) -> Result<String> {
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("Directory {} does not exist", dir.display()))?;
    Ok(canonical
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default())
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_sync_report(report: &SyncReport, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("{} Failed to serialize report: {}", style("✗").red(), e),
        }
    } else {
        for (item, reason) in report.failures() {
            println!(
                "{} {} - {}",
                style("✗").red(),
                style(item).red(),
                style(reason).red()
            );
        }

        println!("\n{}", style("═".repeat(70)).dim());
        println!(
            "{}",
            style(format!(
                "Summary: {} succeeded, {} failed",
                report.succeeded(),
                report.failed()
            ))
            .bold()
        );
        if report.markers_skipped > 0 {
            println!(
                "{}",
                style(format!(
                    "{} directory marker(s) skipped",
                    report.markers_skipped
                ))
                .dim()
            );
        }

        let total_bytes = report.bytes_transferred();
        let secs = report.elapsed.as_secs_f64();
        println!(
            "{}",
            style(format!(
                "Total transferred: {} ({} bytes)",
                format_size(total_bytes),
                total_bytes
            ))
            .dim()
        );
        if secs > 0.0 {
            println!(
                "{}",
                style(format!(
                    "Average speed: {:.2} MB/s",
                    total_bytes as f64 / secs / 1024.0 / 1024.0
                ))
                .dim()
            );
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL_FAILURE)
    }
}

fn print_clear_report(bucket: &str, report: &ClearReport, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("{} Failed to serialize report: {}", style("✗").red(), e),
        }
    } else {
        for failure in &report.failures {
            println!(
                "{} {} - {}",
                style("✗").red(),
                style(&failure.item).red(),
                style(&failure.reason).red()
            );
        }
        println!(
            "{}",
            style(format!(
                "Summary: {} deleted, {} failed",
                report.deleted,
                report.failures.len()
            ))
            .bold()
        );
        if report.is_success() {
            println!("{} Bucket {} is now empty.", style("✓").green(), bucket);
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL_FAILURE)
    }
}
