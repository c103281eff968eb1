//! Command implementations for the labgram CLI
//!
//! Expands input patterns, extracts files concurrently on blocking tasks,
//! reports per-file results in input order and runs schema migrations.

use crate::cli::args::{Args, CalibKind, Commands, ExtractArgs, InputFormat, OutputFormat, UpdateArgs};
use crate::config::{ExtractorConfig, FileType};
use crate::constants::{PROGRESS_CHARS, PROGRESS_TEMPLATE};
use crate::extractors::{Extractor, extractor_for};
use crate::schema_update::{calib_3to4, schema_from_preset, update_schema};
use crate::tree::DataTree;
use anyhow::{Context, anyhow, bail};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Extraction statistics for reporting
#[derive(Debug, Clone, Default)]
pub struct ExtractionStats {
    /// Number of files extracted successfully
    pub files_extracted: usize,
    /// Number of files that failed
    pub files_failed: usize,
    /// Rows over all extracted datasets
    pub rows: usize,
    /// Total extraction time
    pub elapsed: Duration,
}

/// Outcome of one input file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub file_type: FileType,
    pub result: anyhow::Result<DataTree>,
}

/// Main command runner
pub async fn run(args: Args) -> anyhow::Result<()> {
    setup_logging(&args)?;
    debug!("Command line arguments: {:?}", args);

    match args.command {
        Some(Commands::Extract(extract)) => {
            let stats = run_extract(&extract, args.quiet).await?;
            if stats.files_failed > 0 {
                bail!(
                    "{} of {} files failed to extract",
                    stats.files_failed,
                    stats.files_failed + stats.files_extracted
                );
            }
            Ok(())
        }
        Some(Commands::Update(update)) => run_update(&update),
        None => Ok(()),
    }
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(args: &Args) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("labgram={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Extract every input and print the report
pub async fn run_extract(args: &ExtractArgs, quiet: bool) -> anyhow::Result<ExtractionStats> {
    let start_time = Instant::now();
    args.validate()?;

    let config = args.load_config()?;
    debug!("Loaded configuration: {:?}", config);

    let files = expand_inputs(&args.inputs)?;
    let jobs: Vec<(PathBuf, FileType)> = files
        .into_iter()
        .map(|path| {
            let file_type = resolve_file_type(&path, args.format)?;
            Ok((path, file_type))
        })
        .collect::<anyhow::Result<_>>()?;
    info!("Extracting {} files with {} jobs", jobs.len(), config.jobs);

    let extractors = build_extractors(&jobs, &config)?;

    let progress_bar = if !quiet && jobs.len() > 1 {
        let pb = ProgressBar::new(jobs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)?
                .progress_chars(PROGRESS_CHARS),
        );
        Some(pb)
    } else {
        None
    };

    let outcomes = extract_all(jobs, &extractors, config.jobs, progress_bar.as_ref()).await;

    if let Some(pb) = &progress_bar {
        pb.finish_and_clear();
    }

    let mut stats = ExtractionStats::default();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(tree) => {
                stats.files_extracted += 1;
                stats.rows += tree_rows(tree);
            }
            Err(e) => {
                error!("Failed to extract {}: {:#}", outcome.path.display(), e);
                stats.files_failed += 1;
            }
        }
    }
    stats.elapsed = start_time.elapsed();

    match args.output_format {
        OutputFormat::Human => print_human_report(&outcomes, &stats, args.metadata),
        OutputFormat::Json => print_json_report(&outcomes)?,
    }

    Ok(stats)
}

/// Expand glob patterns, keeping the order of first appearance
pub fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let literal = Path::new(pattern);
        let matches: Vec<PathBuf> = if literal.is_file() {
            vec![literal.to_path_buf()]
        } else {
            let mut found = Vec::new();
            for entry in glob::glob(pattern).with_context(|| format!("Invalid pattern '{}'", pattern))? {
                match entry {
                    Ok(path) if path.is_file() => found.push(path),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable path: {}", e),
                }
            }
            found
        };

        if matches.is_empty() {
            warn!("No files match '{}'", pattern);
        }
        for path in matches {
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        bail!("No input files found");
    }
    Ok(files)
}

/// File type from the explicit format or the file extension
pub fn resolve_file_type(path: &Path, format: Option<InputFormat>) -> anyhow::Result<FileType> {
    if let Some(format) = format {
        return Ok(format.file_type());
    }
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if is_zip {
        bail!(
            "Cannot infer the member format of archive {}; pass --format zip-mpt or zip-csv",
            path.display()
        );
    }
    FileType::from_path(path)
        .ok_or_else(|| anyhow!("Cannot infer the format of {}; pass --format", path.display()))
}

/// One extractor per file type in use, built up front so configuration
/// errors surface before any file is read
fn build_extractors(
    jobs: &[(PathBuf, FileType)],
    config: &ExtractorConfig,
) -> anyhow::Result<HashMap<FileType, Arc<dyn Extractor>>> {
    let mut extractors: HashMap<FileType, Arc<dyn Extractor>> = HashMap::new();
    for (_, file_type) in jobs {
        if !extractors.contains_key(file_type) {
            let extractor = extractor_for(*file_type, config)
                .with_context(|| format!("Cannot set up the {} extractor", file_type.name()))?;
            extractors.insert(*file_type, Arc::from(extractor));
        }
    }
    Ok(extractors)
}

/// Extract files on blocking tasks, at most `concurrency` at a time.
///
/// Results come back in input order.
pub async fn extract_all(
    jobs: Vec<(PathBuf, FileType)>,
    extractors: &HashMap<FileType, Arc<dyn Extractor>>,
    concurrency: usize,
    progress: Option<&ProgressBar>,
) -> Vec<FileOutcome> {
    stream::iter(jobs.into_iter().map(|(path, file_type)| {
        let extractor = extractors.get(&file_type).cloned();
        async move {
            let result = match extractor {
                Some(extractor) => {
                    let task_path = path.clone();
                    match tokio::task::spawn_blocking(move || extractor.extract(&task_path)).await {
                        Ok(result) => result.map_err(anyhow::Error::from),
                        Err(e) => Err(anyhow!("Extraction task failed: {}", e)),
                    }
                }
                None => Err(anyhow!("No extractor for {}", file_type.name())),
            };
            if let Some(pb) = progress {
                pb.inc(1);
                pb.set_message(file_name(&path));
            }
            FileOutcome {
                path,
                file_type,
                result,
            }
        }
    }))
    .buffered(concurrency.max(1))
    .collect()
    .await
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn tree_rows(tree: &DataTree) -> usize {
    tree.dataset.as_ref().map_or(0, |ds| ds.len())
        + tree.children.values().map(tree_rows).sum::<usize>()
}

fn print_human_report(outcomes: &[FileOutcome], stats: &ExtractionStats, metadata: bool) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(tree) => {
                println!(
                    "{} {} [{}]",
                    "✓".green().bold(),
                    outcome.path.display(),
                    outcome.file_type.name()
                );
                print_tree(tree, "/", metadata);
            }
            Err(e) => println!("{} {}: {:#}", "✗".red().bold(), outcome.path.display(), e),
        }
    }

    println!();
    println!(
        "{} {} extracted, {} failed, {} rows in {}",
        "Summary:".bold(),
        stats.files_extracted.to_string().green(),
        if stats.files_failed > 0 {
            stats.files_failed.to_string().red()
        } else {
            stats.files_failed.to_string().normal()
        },
        stats.rows,
        HumanDuration(stats.elapsed)
    );
}

fn print_tree(tree: &DataTree, path: &str, metadata: bool) {
    if let Some(ds) = &tree.dataset {
        let variables: Vec<String> = ds
            .variables()
            .iter()
            .map(|v| match &v.unit {
                Some(unit) => format!("{} [{}]", v.name, unit),
                None => v.name.clone(),
            })
            .collect();
        let fulldate = match ds.fulldate() {
            Some(true) => "full dates",
            Some(false) => "partial dates",
            None => "dated",
        };
        println!(
            "    {} {} rows, {}: {}",
            path.cyan(),
            ds.len(),
            fulldate,
            variables.join(", ")
        );
        if metadata && !ds.attrs().metadata.is_empty() {
            match serde_json::to_string_pretty(&ds.attrs().metadata) {
                Ok(text) => println!("{}", text.dimmed()),
                Err(e) => warn!("Cannot render metadata of {}: {}", path, e),
            }
        }
    }
    for (name, child) in &tree.children {
        let child_path = if path == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", path, name)
        };
        print_tree(child, &child_path, metadata);
    }
}

fn print_json_report(outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let report: Vec<Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(tree) => json!({
                "file": outcome.path,
                "format": outcome.file_type.name(),
                "tree": tree.summary(),
            }),
            Err(e) => json!({
                "file": outcome.path,
                "format": outcome.file_type.name(),
                "error": format!("{:#}", e),
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Migrate a schema, preset or calibration document
pub fn run_update(args: &UpdateArgs) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Cannot read {}", args.input.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", args.input.display()))?;

    let updated = migrate(document, args.calib, args.preset.as_deref())?;
    let rendered = serde_json::to_string_pretty(&updated)?;

    match &args.output {
        Some(output) => {
            fs::write(output, rendered + "\n")
                .with_context(|| format!("Cannot write {}", output.display()))?;
            info!("Wrote {}", output.display());
            println!(
                "{} {} -> {}",
                "✓".green().bold(),
                args.input.display(),
                output.display()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Pick the migration for a document
pub fn migrate(document: Value, calib: Option<CalibKind>, preset: Option<&Path>) -> anyhow::Result<Value> {
    let updated = match (calib, preset) {
        (Some(kind), _) => calib_3to4(&document, kind.as_str())?,
        (None, Some(folder)) => schema_from_preset(document, folder)?,
        (None, None) => update_schema(document)?,
    };
    Ok(updated)
}
