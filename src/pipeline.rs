//! End-to-end run: catalog + selection -> volume plans -> fetched chapters -> artifacts -> upload.
//!
//! One worker pool per run carries page fetches, chapter fetches and volume builds. A volume that
//! fails is reported and skipped; its siblings carry on.

use crate::artifact::{ArtifactBuilder, ArtifactError};
use crate::bundle::{file_stem, BundleError, VolumeBundler, VolumePlan};
use crate::fetch::{worker_pool, ChapterFetcher, FetchError, Progress, DEFAULT_WORKERS};
use crate::model::{Artifact, ArtifactFormat, Catalog, FetchedChapter, Ordinal, Volume};
use crate::selection::VolumeSelection;
use crate::source::{Fetch, RetryPolicy, SourceAdapter, SourceError};
use crate::upload::{destination_for, UploadError, UploadGateway};
use rayon::prelude::*;
use rayon::ThreadPoolBuildError;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_CHAPTERS_PER_VOLUME: i64 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] ThreadPoolBuildError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Everything a run needs to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub format: ArtifactFormat,
    /// Chapters per volume; must be at least 1. `None` uses native volumes when the site has
    /// them and one chapter per volume otherwise. An explicit count always wins.
    pub chapters_per_volume: Option<i64>,
    /// Prefer the site's own volumes when no explicit count is set.
    pub native_volumes: bool,
    /// Series name override for file names; defaults to the catalog title.
    pub series_name: Option<String>,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub comic_info: bool,
    /// Remove the local artifact after a successful upload.
    pub delete_after_upload: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            format: ArtifactFormat::Pdf,
            chapters_per_volume: None,
            native_volumes: true,
            series_name: None,
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            comic_info: true,
            delete_after_upload: false,
        }
    }
}

/// Outcome for one planned volume.
#[derive(Debug)]
pub struct VolumeReport {
    pub name: String,
    pub chapters: Vec<Ordinal>,
    pub artifact: Option<Artifact>,
    /// Upload destination, when the artifact was uploaded.
    pub uploaded: Option<String>,
    pub error: Option<PipelineError>,
}

impl VolumeReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Pipeline<'a> {
    source: &'a dyn SourceAdapter,
    client: &'a dyn Fetch,
    config: PipelineConfig,
    uploader: Option<&'a dyn UploadGateway>,
    progress: Option<Progress<'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(source: &'a dyn SourceAdapter, client: &'a dyn Fetch, config: PipelineConfig) -> Self {
        Self {
            source,
            client,
            config,
            uploader: None,
            progress: None,
        }
    }

    pub fn with_uploader(mut self, uploader: &'a dyn UploadGateway) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn builder(&self) -> Result<ArtifactBuilder, PipelineError> {
        if self.config.output_dir.as_os_str().is_empty() {
            return Err(PipelineError::Config {
                reason: "output directory is empty".to_string(),
            });
        }
        Ok(ArtifactBuilder::new(&self.config.output_dir).comic_info(self.config.comic_info))
    }

    /// Bundler for this catalog: an explicit chapter count if set, else native volumes when the
    /// site has them, else one chapter per volume.
    pub fn bundler(&self, catalog: &Catalog) -> Result<VolumeBundler, PipelineError> {
        let series = self
            .config
            .series_name
            .as_deref()
            .unwrap_or(&catalog.title);
        if let Some(per_volume) = self.config.chapters_per_volume {
            return Ok(VolumeBundler::new(series, per_volume)?);
        }
        if self.config.native_volumes && self.source.native_volumes() && catalog.native_volumes {
            log::debug!("[{}] '{}': using native volumes", self.source.site(), catalog.title);
            return Ok(VolumeBundler::native(series)?);
        }
        Ok(VolumeBundler::new(series, DEFAULT_CHAPTERS_PER_VOLUME)?)
    }

    /// Volumes the selection would produce, in order. Nothing is downloaded.
    pub fn plan(
        &self,
        catalog: &Catalog,
        selection: &VolumeSelection,
    ) -> Result<Vec<VolumePlan>, PipelineError> {
        let chapters: Vec<_> = selection.chapters(catalog).into_iter().cloned().collect();
        Ok(self.bundler(catalog)?.plan(&chapters))
    }

    /// Planned volumes with the artifact path each would be written to.
    pub fn planned_paths(
        &self,
        catalog: &Catalog,
        selection: &VolumeSelection,
    ) -> Result<Vec<(VolumePlan, PathBuf)>, PipelineError> {
        let bundler = self.bundler(catalog)?;
        let builder = self.builder()?;
        let chapters: Vec<_> = selection.chapters(catalog).into_iter().cloned().collect();
        Ok(bundler
            .plan(&chapters)
            .into_iter()
            .map(|plan| {
                let path = builder.output_path(bundler.series(), &plan.file_stem, self.config.format);
                (plan, path)
            })
            .collect())
    }

    /// Plan and run every selected volume.
    pub fn run(
        &self,
        catalog: &Catalog,
        selection: &VolumeSelection,
    ) -> Result<Vec<VolumeReport>, PipelineError> {
        let plans = self.plan(catalog, selection)?;
        self.run_plans(catalog, plans)
    }

    /// Run already-planned volumes (e.g. after the caller dropped ones that exist on disk).
    pub fn run_plans(
        &self,
        catalog: &Catalog,
        plans: Vec<VolumePlan>,
    ) -> Result<Vec<VolumeReport>, PipelineError> {
        if plans.is_empty() {
            log::warn!("nothing selected for '{}'", catalog.title);
            return Ok(Vec::new());
        }
        let bundler = self.bundler(catalog)?;
        let builder = self.builder()?;
        let pool = worker_pool(self.config.workers)?;
        let mut fetcher = ChapterFetcher::new(self.source, self.client, self.config.retry.clone(), &pool);
        if let Some(progress) = self.progress {
            fetcher = fetcher.with_progress(progress);
        }

        log::info!(
            "[{}] {} volume(s) of '{}' with {} worker(s)",
            self.source.site(),
            plans.len(),
            bundler.series(),
            self.config.workers.max(1)
        );
        let reports: Vec<VolumeReport> = pool.install(|| {
            plans
                .par_iter()
                .map(|plan| self.run_volume(plan, bundler.series(), &fetcher, &builder))
                .collect()
        });
        Ok(reports)
    }

    fn run_volume(
        &self,
        plan: &VolumePlan,
        series: &str,
        fetcher: &ChapterFetcher<'_>,
        builder: &ArtifactBuilder,
    ) -> VolumeReport {
        let mut report = VolumeReport {
            name: plan.name.clone(),
            chapters: plan.ordinals(),
            artifact: None,
            uploaded: None,
            error: None,
        };
        let artifact = match self.build_volume(plan, series, fetcher, builder) {
            Ok(artifact) => artifact,
            Err(e) => {
                log::warn!("volume '{}' failed: {}", plan.name, e);
                report.error = Some(e);
                return report;
            }
        };

        if let Some(uploader) = self.uploader {
            let destination = destination_for(&file_stem(series), &artifact.path);
            match uploader.upload(&artifact.path, &destination) {
                Ok(()) => {
                    if self.config.delete_after_upload {
                        if let Err(e) = std::fs::remove_file(&artifact.path) {
                            log::warn!("could not remove {}: {}", artifact.path.display(), e);
                        }
                    }
                    report.uploaded = Some(destination);
                }
                Err(e) => {
                    log::warn!("volume '{}' upload failed: {}", plan.name, e);
                    report.error = Some(e.into());
                }
            }
        }
        report.artifact = Some(artifact);
        report
    }

    fn build_volume(
        &self,
        plan: &VolumePlan,
        series: &str,
        fetcher: &ChapterFetcher<'_>,
        builder: &ArtifactBuilder,
    ) -> Result<Artifact, PipelineError> {
        let chapters = fetcher
            .fetch_many(&plan.chapters)
            .into_iter()
            .collect::<Result<Vec<FetchedChapter>, FetchError>>()?;
        let volume = Volume {
            series: series.to_string(),
            name: plan.name.clone(),
            file_stem: plan.file_stem.clone(),
            chapters,
        };
        Ok(builder.build(&volume, self.config.format)?)
    }
}
