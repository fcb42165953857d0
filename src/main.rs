use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use time::macros::format_description;

use post_metadata_aggregator::config::{list_format, RunConfig};
use post_metadata_aggregator::{
    AggregateOptions, AggregateReport, Aggregator, DownloadOptions, Downloader, JsonlPostSource,
};

#[derive(Parser)]
#[command(name = "Post Metadata Aggregator")]
#[command(about = "Saves per-post metadata sidecars for a profile and aggregates them into a single CSV file.")]
#[command(version = "1.0.0")]
struct Cli {
    #[arg(short, long, global = true, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate metadata sidecars in a directory into one CSV file
    Aggregate(AggregateArgs),
    /// Save posts from a profile dump as media, comments and metadata sidecars
    Download(DownloadArgs),
    /// Run the aggregation tasks listed in a YAML run configuration
    Run {
        #[arg(long, help = "Path to the run configuration YAML file", required = true)]
        run_config: PathBuf,
    },
}

#[derive(Args)]
struct AggregateArgs {
    #[arg(short, long, help = "Directory containing metadata sidecar files", required = true)]
    input: PathBuf,
    #[arg(short, long, default_value = "metadata.csv", help = "Output CSV file")]
    output: PathBuf,
    #[arg(long, default_value = "custom_metadata", help = "File name prefix of sidecar files")]
    prefix: String,
    #[arg(long, default_value = "json", help = "File extension of sidecar files")]
    extension: String,
    #[arg(long, help = "Only scan the input directory itself, not its *_UTC subdirectories")]
    no_profile_dirs: bool,
    #[arg(long, help = "Join list values with this separator instead of writing JSON arrays")]
    list_separator: Option<String>,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long, help = "Profile dump with one JSON post per line (.jsonl or .jsonl.gz)", required = true)]
    posts: PathBuf,
    #[arg(long, help = "Profile username, used to name post directories", required = true)]
    profile: String,
    #[arg(short, long, default_value = ".", help = "Directory in which post directories are created")]
    target: PathBuf,
    #[arg(long, help = "Maximum number of posts to save (all if omitted)")]
    limit: Option<usize>,
    #[arg(long, help = "Save the most liked posts first")]
    sort_by_likes: bool,
    #[arg(long, requires = "sort_by_likes", help = "With --sort-by-likes, take the least liked posts instead")]
    ascending: bool,
    #[arg(long, help = "Do not write <shortcode>_comments.json files")]
    no_comments: bool,
    #[arg(long, help = "Do not write custom_metadata_<shortcode>.json sidecars")]
    no_custom_metadata: bool,
    #[arg(long, help = "Aggregate the target directory into this CSV file afterwards")]
    aggregate: Option<PathBuf>,
}

impl AggregateArgs {
    fn options(&self) -> AggregateOptions {
        AggregateOptions::default()
            .with_prefix(self.prefix.as_str())
            .with_extension(self.extension.as_str())
            .include_profile_dirs(!self.no_profile_dirs)
            .with_list_format(list_format(self.list_separator.as_deref()))
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

fn get_current_timestamp_str() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn progress_bar() -> ProgressBar {
    let progress_bar = ProgressBar::new(0);
    match ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        Ok(style) => progress_bar.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("Invalid progress bar template, using default: {}", e),
    }
    progress_bar
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    Ok(())
}

fn run_aggregation(input: &Path, output: &Path, options: AggregateOptions) -> Result<AggregateReport> {
    ensure_parent_dir(output)?;
    info!("Aggregating sidecars from {} into {}", input.display(), output.display());
    Aggregator::new(options)
        .with_progress(progress_bar())
        .aggregate(input, output)
        .with_context(|| format!("Failed to aggregate metadata from {}", input.display()))
}

fn log_report(report: &AggregateReport) {
    info!("Output file: {}", report.output_path.display());
    info!("Records parsed: {}", report.records_parsed);
    info!("Rows written: {}", report.rows_written);
    info!("Columns ({}): {}", report.columns.len(), report.columns.join(", "));
    if !report.skipped.is_empty() {
        warn!("Files skipped: {}", report.skipped.len());
        for skipped in report.skipped.iter().take(10) {
            warn!("  - {}: {}", skipped.path.display(), skipped.reason);
        }
        if report.skipped.len() > 10 {
            warn!("  ... (and {} more)", report.skipped.len() - 10);
        }
    }
}

/// Returns whether every file was aggregated.
fn cmd_aggregate(args: &AggregateArgs) -> Result<bool> {
    let report = run_aggregation(&args.input, &args.output, args.options())?;
    log_report(&report);
    Ok(report.skipped.is_empty())
}

fn cmd_download(args: &DownloadArgs) -> Result<bool> {
    fs::create_dir_all(&args.target)
        .with_context(|| format!("Failed to create target directory: {}", args.target.display()))?;
    let source = JsonlPostSource::new(&args.posts, args.profile.as_str());
    let options = DownloadOptions {
        target: args.target.clone(),
        download_comments: !args.no_comments,
        save_custom_metadata: !args.no_custom_metadata,
    };
    let downloader = Downloader::new(source, options);

    let result = if args.sort_by_likes {
        downloader.download_posts_sorted_by_likes(args.limit, !args.ascending)
    } else {
        downloader.download_posts(args.limit)
    };
    let report = result.with_context(|| format!("Failed to save posts from {}", args.posts.display()))?;

    info!("Posts saved: {}", report.posts);
    info!("Metadata sidecars written: {}", report.sidecars.len());
    info!("Media files copied: {}", report.media_files);
    if !report.missing_media.is_empty() {
        warn!("Media files not found: {}", report.missing_media.len());
    }

    match &args.aggregate {
        Some(output) => {
            let report = run_aggregation(&args.target, output, AggregateOptions::default())?;
            log_report(&report);
            Ok(report.skipped.is_empty())
        }
        None => Ok(true),
    }
}

fn cmd_run(run_config_path: &Path) -> Result<bool> {
    info!("Loading run configuration from: {}", run_config_path.display());
    let run_config_file = File::open(run_config_path)
        .with_context(|| format!("Failed to open run configuration file: {}", run_config_path.display()))?;
    let run_config: RunConfig = serde_yaml::from_reader(run_config_file)
        .with_context(|| format!("Failed to parse run configuration YAML from {}", run_config_path.display()))?;
    info!(
        "Run config loaded ({}): {} tasks.",
        run_config.description.as_deref().unwrap_or("No description"),
        run_config.tasks.len()
    );

    let mut clean = true;
    for (i, task) in run_config.tasks.iter().enumerate() {
        info!("Processing Task {} ({})", i + 1, task.description.as_deref().unwrap_or("No description"));
        match run_aggregation(&task.input_dir, &task.output, task.options()) {
            Ok(report) => {
                log_report(&report);
                clean &= report.skipped.is_empty();
            }
            Err(e) => {
                error!("Task {} failed: {:#}", i + 1, e);
                clean = false;
            }
        }
    }
    Ok(clean)
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => { eprintln!("Invalid log level '{}', defaulting to INFO.", cli.log_level); LevelFilter::Info }
    };
    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    info!("Starting Post Metadata Aggregator");
    info!("Run Timestamp: {}", get_current_timestamp_str());

    let clean = match &cli.command {
        Command::Aggregate(args) => cmd_aggregate(args)?,
        Command::Download(args) => cmd_download(args)?,
        Command::Run { run_config } => cmd_run(run_config)?,
    };

    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("-------------------------------------------------------");

    if !clean {
        std::process::exit(1);
    }

    Ok(())
}
