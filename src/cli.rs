//! CLI parsing and orchestration. Parses args, merges the config file, resolves the series, runs
//! the pipeline and prints a summary. Maps errors to exit codes.

use crate::catalog::{pick_candidate, CatalogResolver};
use crate::config::{self, Config};
use crate::model::{ArtifactFormat, SeriesCandidate};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, VolumeReport};
use crate::selection::{parse_selection, SelectionError};
use crate::source::{open_source, resolve_series, PoliteClient, RetryPolicy, Site, SourceError};
use crate::upload::LocalDirGateway;
use clap::Parser;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SITE: Site = Site::MangaReader;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_MS: u64 = 0;
const DEFAULT_RETRY_COUNT: u32 = 3;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Selection(#[from] SelectionError),

    #[error("{0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    #[error("{failed} of {total} volume(s) failed")]
    VolumesFailed { failed: usize, total: usize },
}

impl CliRunError {
    /// 1: invalid input or configuration. 2: source or network failure. 3: volume build or upload failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Selection(_) => 1,
            CliRunError::Source(e) => source_exit_code(e),
            CliRunError::Pipeline(e) => match e {
                PipelineError::Config { .. } | PipelineError::Bundle(_) => 1,
                PipelineError::Source(e) => source_exit_code(e),
                PipelineError::Pool(_)
                | PipelineError::Fetch(_)
                | PipelineError::Artifact(_)
                | PipelineError::Upload(_) => 3,
            },
            CliRunError::VolumesFailed { .. } => 3,
        }
    }
}

fn source_exit_code(e: &SourceError) -> i32 {
    match e {
        SourceError::UnsupportedSource { .. }
        | SourceError::InvalidUrl { .. }
        | SourceError::UnrecognizedHost { .. } => 1,
        _ => 2,
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangascrape")]
#[command(about = "Download manga chapters and assemble them into PDF or CBZ volumes")]
#[command(
    after_help = "Config file keys (output_dir, upload_root, source, format, chapters_per_volume, workers, user_agent, request_delay_ms, timeout_secs, retry_count, retry_backoff_secs, comic_info) are read from ./mangascrape.toml or ~/.config/mangascrape/config.toml. CLI flags override config."
)]
pub struct Args {
    /// Series slug or URL (e.g. dragon-ball, https://manganelo.tv/manga/manga-aa951409).
    #[arg(required_unless_present = "search", conflicts_with = "search")]
    pub series: Option<String>,

    /// Search the site and pick a series from the results.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Site for slugs and searches (mangakakalot, manganelo, mangareader). Overrides URL detection.
    #[arg(long, value_parser = parse_site)]
    pub site: Option<Site>,

    /// Chapters to fetch, e.g. "1-10 15 20.5". Default: all.
    #[arg(short, long, default_value = "")]
    pub chapters: String,

    /// Output format: pdf or cbz (overrides config; default pdf).
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<ArtifactFormat>,

    /// Chapters bundled into one output file (overrides config). Default: the site's own volumes
    /// when it publishes them, else 1.
    #[arg(long, allow_negative_numbers = true)]
    pub chapters_per_volume: Option<i64>,

    /// Ignore the site's volume numbers and bundle by chapter count.
    #[arg(long)]
    pub no_native_volumes: bool,

    /// Series name used in file names (default: the site's title).
    #[arg(long)]
    pub name: Option<String>,

    /// Output directory; files go to {output}/{series}/ (overrides config; default .).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Worker threads for downloads and conversion (overrides config; default 4).
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Minimum delay between requests in milliseconds (overrides config; default 0).
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Copy finished volumes into this directory as {series}/{file} (overrides config upload_root).
    #[arg(long)]
    pub upload_to: Option<PathBuf>,

    /// Delete the local file after a successful upload.
    #[arg(long)]
    pub delete_local: bool,

    /// Skip volumes whose output file already exists.
    #[arg(long)]
    pub skip_existing: bool,

    /// Pick the Nth search result (1-based) instead of asking.
    #[arg(long)]
    pub pick: Option<usize>,

    /// Resolve the series and print the planned volumes and paths without downloading.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (warnings and errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and verbose error chain.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_site(s: &str) -> Result<Site, String> {
    s.parse::<Site>().map_err(|e| e.to_string())
}

fn parse_format(s: &str) -> Result<ArtifactFormat, String> {
    s.parse::<ArtifactFormat>()
}

/// Args merged over the config file over defaults.
#[derive(Debug)]
struct Settings {
    default_site: Site,
    pipeline: PipelineConfig,
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
    upload_root: Option<PathBuf>,
}

impl Settings {
    fn resolve(args: &Args, config: Option<&Config>) -> Result<Self, CliRunError> {
        let default_site = match config.and_then(|c| c.source.as_deref()) {
            Some(s) => s
                .parse::<Site>()
                .map_err(|e| CliRunError::InvalidInput(format!("Invalid config source: {}", e)))?,
            None => DEFAULT_SITE,
        };
        let format = match (args.format, config.and_then(|c| c.format.as_deref())) {
            (Some(f), _) => f,
            (None, Some(s)) => s
                .parse::<ArtifactFormat>()
                .map_err(|e| CliRunError::InvalidInput(format!("Invalid config format: {}", e)))?,
            (None, None) => ArtifactFormat::Pdf,
        };
        let retry_count = config.and_then(|c| c.retry_count);
        let retry_backoff = config.and_then(|c| c.retry_backoff_secs.clone());
        let retry = if retry_count.is_some() || retry_backoff.is_some() {
            RetryPolicy::new(
                retry_count.unwrap_or(DEFAULT_RETRY_COUNT),
                retry_backoff.unwrap_or_else(|| vec![1, 2]),
            )
        } else {
            RetryPolicy::default()
        };
        let upload_root = args
            .upload_to
            .clone()
            .or_else(|| config.and_then(|c| c.upload_root.clone()));
        if args.delete_local && upload_root.is_none() {
            return Err(CliRunError::InvalidInput(
                "--delete-local needs an upload destination (--upload-to or upload_root in config)."
                    .to_string(),
            ));
        }
        let defaults = PipelineConfig::default();

        Ok(Settings {
            default_site,
            pipeline: PipelineConfig {
                output_dir: args
                    .output
                    .clone()
                    .or_else(|| config.and_then(|c| c.output_dir.clone()))
                    .unwrap_or(defaults.output_dir),
                format,
                chapters_per_volume: args
                    .chapters_per_volume
                    .or_else(|| config.and_then(|c| c.chapters_per_volume)),
                native_volumes: !args.no_native_volumes,
                series_name: args.name.clone(),
                workers: args
                    .workers
                    .or_else(|| config.and_then(|c| c.workers))
                    .unwrap_or(defaults.workers)
                    .max(1),
                retry,
                comic_info: config
                    .and_then(|c| c.comic_info)
                    .unwrap_or(defaults.comic_info),
                delete_after_upload: args.delete_local,
            },
            user_agent: args
                .user_agent
                .clone()
                .or_else(|| config.and_then(|c| c.user_agent.clone())),
            delay_ms: args
                .delay_ms
                .or_else(|| config.and_then(|c| c.request_delay_ms))
                .unwrap_or(DEFAULT_DELAY_MS),
            timeout_secs: args
                .timeout
                .or_else(|| config.and_then(|c| c.timeout_secs))
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            upload_root,
        })
    }
}

/// List candidates on `out` and read a 1-based choice from `input` until one is valid.
fn prompt_choice(
    candidates: &[SeriesCandidate],
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<usize, CliRunError> {
    let io = |e: std::io::Error| CliRunError::InvalidInput(format!("Cannot read choice: {}", e));
    for (i, c) in candidates.iter().enumerate() {
        writeln!(
            out,
            "{:>3}. {} [{}] ({} chapters, {:?})",
            i + 1,
            c.title,
            c.slug,
            c.chapter_count,
            c.kind
        )
        .map_err(io)?;
    }
    loop {
        write!(out, "Pick a series (1-{}, q to quit): ", candidates.len()).map_err(io)?;
        out.flush().map_err(io)?;
        let mut line = String::new();
        if input.read_line(&mut line).map_err(io)? == 0 || line.trim().eq_ignore_ascii_case("q") {
            return Err(CliRunError::InvalidInput("No series picked.".to_string()));
        }
        let picked = line
            .trim()
            .parse::<usize>()
            .map_err(|_| SelectionError::InvalidChoice {
                choice: 0,
                count: candidates.len(),
            })
            .and_then(|n| pick_candidate(candidates, n).map(|_| n));
        match picked {
            Ok(n) => return Ok(n),
            Err(e) => writeln!(out, "{}", e).map_err(io)?,
        }
    }
}

fn progress_bar() -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(0);
    bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    bar.set_message("Fetching pages");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn print_summary(reports: &[VolumeReport]) {
    for report in reports {
        match (&report.artifact, &report.error) {
            (Some(artifact), None) => match &report.uploaded {
                Some(dest) => eprintln!("Wrote {} (uploaded to {})", artifact.path.display(), dest),
                None => eprintln!("Wrote {}", artifact.path.display()),
            },
            (_, Some(e)) => eprintln!("Failed {}: {}", report.name, e),
            (None, None) => {}
        }
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = Settings::resolve(args, config.as_ref())?;

    let mut builder = PoliteClient::builder()
        .delay_ms(settings.delay_ms)
        .timeout_secs(settings.timeout_secs);
    if let Some(ua) = &settings.user_agent {
        builder = builder.user_agent(ua.clone());
    }
    let client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let (site, series) = match (&args.series, &args.search) {
        (Some(series), _) => resolve_series(series, args.site, settings.default_site)?,
        (None, Some(query)) => (args.site.unwrap_or(settings.default_site), query.clone()),
        (None, None) => {
            return Err(CliRunError::InvalidInput(
                "Give a series slug or URL, or --search <QUERY>.".to_string(),
            ))
        }
    };
    let source = open_source(site, &client, settings.pipeline.retry.clone());
    let resolver = CatalogResolver::new(source.as_ref());

    let slug = if args.search.is_some() {
        let candidates = resolver.resolve_by_query(&series)?;
        let choice = match args.pick {
            Some(n) => n,
            None if std::io::stdin().is_terminal() => {
                prompt_choice(&candidates, &mut std::io::stdin().lock(), &mut std::io::stderr())?
            }
            None => {
                return Err(CliRunError::InvalidInput(
                    "stdin is not a terminal; use --pick <N> to choose a search result.".to_string(),
                ))
            }
        };
        pick_candidate(&candidates, choice)?.slug.clone()
    } else {
        series
    };

    let catalog = resolver.resolve_by_name(&slug)?;
    let outcome = parse_selection(&args.chapters, &catalog);
    for warning in &outcome.warnings {
        log::warn!("{}", warning);
    }
    if outcome.selection.is_empty(&catalog) {
        return Err(CliRunError::InvalidInput(format!(
            "No chapters selected from '{}' ({} chapters available).",
            catalog.title,
            catalog.chapters.len()
        )));
    }

    let bar = if args.quiet { None } else { Some(progress_bar()) };
    let progress_cb = |done: usize, total: usize| {
        if let Some(bar) = &bar {
            if done == 1 {
                bar.inc_length(total as u64);
            }
            bar.inc(1);
        }
    };
    let gateway = settings.upload_root.as_ref().map(LocalDirGateway::new);

    let mut pipeline = Pipeline::new(source.as_ref(), &client, settings.pipeline.clone());
    if let Some(gateway) = &gateway {
        pipeline = pipeline.with_uploader(gateway);
    }
    if bar.is_some() {
        pipeline = pipeline.with_progress(&progress_cb);
    }

    let planned = pipeline.planned_paths(&catalog, &outcome.selection)?;
    if args.dry_run {
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        eprintln!("Series: {} ({} chapters)", catalog.title, catalog.chapters.len());
        for (plan, path) in &planned {
            let exists = if path.exists() { " (exists)" } else { "" };
            eprintln!(
                "{}: {} chapter(s) -> {}{}",
                plan.name,
                plan.chapters.len(),
                path.display(),
                exists
            );
        }
        return Ok(());
    }

    let total = planned.len();
    let plans: Vec<_> = planned
        .into_iter()
        .filter_map(|(plan, path)| {
            if args.skip_existing && path.exists() {
                log::info!("skipping '{}': {} exists", plan.name, path.display());
                None
            } else {
                Some(plan)
            }
        })
        .collect();
    if plans.is_empty() {
        if let Some(bar) = &bar {
            bar.finish_and_clear();
        }
        if !args.quiet {
            eprintln!("All {} volume(s) already exist.", total);
        }
        return Ok(());
    }

    let reports = pipeline.run_plans(&catalog, plans)?;
    if let Some(bar) = &bar {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }
    if !args.quiet {
        print_summary(&reports);
    }

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        return Err(CliRunError::VolumesFailed {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactError;
    use crate::bundle::BundleError;
    use crate::model::SeriesKind;
    use std::io::Cursor;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mangascrape"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn candidates() -> Vec<SeriesCandidate> {
        ["Dragon Ball", "Dragon Ball Super"]
            .iter()
            .map(|t| SeriesCandidate {
                title: t.to_string(),
                slug: t.to_lowercase().replace(' ', "-"),
                chapter_count: 10,
                kind: SeriesKind::Manga,
                source: Site::MangaReader,
            })
            .collect()
    }

    #[test]
    fn series_or_search_is_required_but_not_both() {
        assert!(Args::try_parse_from(["mangascrape"]).is_err());
        assert!(Args::try_parse_from(["mangascrape", "db", "--search", "dragon"]).is_err());
        assert_eq!(args(&["--search", "dragon"]).search.as_deref(), Some("dragon"));
        assert_eq!(args(&["dragon-ball"]).series.as_deref(), Some("dragon-ball"));
    }

    #[test]
    fn flags_parse() {
        let a = args(&[
            "https://manganelo.tv/manga/manga-aa1",
            "--site",
            "nelo",
            "-c",
            "1-3 7",
            "--format",
            "cbz",
            "--chapters-per-volume",
            "5",
            "-j",
            "8",
            "-v",
        ]);
        assert_eq!(a.site, Some(Site::Manganelo));
        assert_eq!(a.chapters, "1-3 7");
        assert_eq!(a.format, Some(ArtifactFormat::ComicArchive));
        assert_eq!(a.chapters_per_volume, Some(5));
        assert_eq!(a.workers, Some(8));
        assert!(a.verbose);
        assert!(Args::try_parse_from(["mangascrape", "x", "--site", "mangafast"]).is_err());
        assert!(Args::try_parse_from(["mangascrape", "x", "--format", "epub"]).is_err());
    }

    #[test]
    fn negative_bundle_size_reaches_bundler() {
        let a = args(&["db", "--chapters-per-volume", "-2"]);
        assert_eq!(a.chapters_per_volume, Some(-2));
    }

    #[test]
    fn native_volumes_can_be_turned_off() -> Result<(), CliRunError> {
        let s = Settings::resolve(&args(&["db", "--no-native-volumes"]), None)?;
        assert!(!s.pipeline.native_volumes);
        assert_eq!(s.pipeline.chapters_per_volume, None);
        Ok(())
    }

    #[test]
    fn settings_defaults_without_config() -> Result<(), CliRunError> {
        let s = Settings::resolve(&args(&["db"]), None)?;
        assert_eq!(s.default_site, Site::MangaReader);
        assert_eq!(s.pipeline.format, ArtifactFormat::Pdf);
        assert_eq!(s.pipeline.chapters_per_volume, None);
        assert!(s.pipeline.native_volumes);
        assert_eq!(s.pipeline.workers, 4);
        assert_eq!(s.pipeline.output_dir, PathBuf::from("."));
        assert_eq!(s.pipeline.retry, RetryPolicy::default());
        assert!(s.pipeline.comic_info);
        assert_eq!(s.timeout_secs, 30);
        assert_eq!(s.delay_ms, 0);
        assert!(s.upload_root.is_none());
        Ok(())
    }

    #[test]
    fn args_override_config() -> Result<(), CliRunError> {
        let config: Config = toml::from_str(
            r#"
            output_dir = "from-config"
            source = "manganelo"
            format = "cbz"
            chapters_per_volume = 10
            workers = 2
            request_delay_ms = 500
            retry_count = 5
            comic_info = false
            upload_root = "/mnt/remote"
        "#,
        )
        .unwrap();
        let s = Settings::resolve(
            &args(&["db", "-o", "from-args", "--format", "pdf", "-j", "6"]),
            Some(&config),
        )?;
        assert_eq!(s.default_site, Site::Manganelo);
        assert_eq!(s.pipeline.output_dir, PathBuf::from("from-args"));
        assert_eq!(s.pipeline.format, ArtifactFormat::Pdf);
        assert_eq!(s.pipeline.chapters_per_volume, Some(10));
        assert_eq!(s.pipeline.workers, 6);
        assert_eq!(s.pipeline.retry.attempts(), 5);
        assert!(!s.pipeline.comic_info);
        assert_eq!(s.delay_ms, 500);
        assert_eq!(s.upload_root, Some(PathBuf::from("/mnt/remote")));
        Ok(())
    }

    #[test]
    fn bad_config_values_are_invalid_input() {
        let config: Config = toml::from_str("source = \"mangafast\"").unwrap();
        let err = Settings::resolve(&args(&["db"]), Some(&config)).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let config: Config = toml::from_str("format = \"epub\"").unwrap();
        assert!(Settings::resolve(&args(&["db"]), Some(&config)).is_err());
    }

    #[test]
    fn delete_local_requires_upload_destination() {
        assert!(Settings::resolve(&args(&["db", "--delete-local"]), None).is_err());
        assert!(
            Settings::resolve(&args(&["db", "--delete-local", "--upload-to", "/tmp/x"]), None)
                .is_ok()
        );
    }

    #[test]
    fn prompt_retries_until_valid_choice() -> Result<(), CliRunError> {
        let mut input = Cursor::new("abc\n7\n2\n");
        let mut out = Vec::new();
        let choice = prompt_choice(&candidates(), &mut input, &mut out)?;
        assert_eq!(choice, 2);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("  1. Dragon Ball [dragon-ball] (10 chapters, Manga)"));
        assert!(shown.contains("Invalid choice 7"));
        Ok(())
    }

    #[test]
    fn prompt_eof_or_quit_is_invalid_input() {
        for text in ["", "q\n"] {
            let mut input = Cursor::new(text);
            let result = prompt_choice(&candidates(), &mut input, &mut Vec::new());
            assert!(matches!(result, Err(CliRunError::InvalidInput(_))));
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Selection(SelectionError::InvalidChoice { choice: 9, count: 2 }).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Source(SourceError::UnrecognizedHost { host: "x".into() }).exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Source(SourceError::NotFound {
                site: Site::MangaReader,
                what: "series 'x'".into()
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Pipeline(PipelineError::Bundle(BundleError::InvalidConfiguration {
                reason: "x".into()
            }))
            .exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Pipeline(PipelineError::Artifact(ArtifactError::EmptyVolume {
                volume: "v".into()
            }))
            .exit_code(),
            3
        );
        assert_eq!(
            CliRunError::VolumesFailed { failed: 1, total: 2 }.exit_code(),
            3
        );
    }
}
