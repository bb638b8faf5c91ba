//! mangascrape: CLI that downloads manga chapters from Mangakakalot, Manganelo and MangaReader and
//! assembles them into PDF or CBZ volumes.

pub mod artifact;
pub mod bundle;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod selection;
pub mod source;
pub mod upload;

#[cfg(test)]
mod testing;

// Re-exports for CLI and consumers.
pub use artifact::{list_archive_entries, ArtifactBuilder, ArtifactError};
pub use bundle::{BundleError, VolumeBundler, VolumePlan};
pub use catalog::{pick_candidate, CatalogResolver};
pub use fetch::{ChapterFetcher, FetchError};
pub use model::{
    Artifact, ArtifactFormat, Catalog, Chapter, Ordinal, PageImage, PageLocator, SeriesCandidate,
    SeriesKind, Volume,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, VolumeReport};
pub use selection::{parse_selection, SelectionError, SelectionOutcome, VolumeSelection};
pub use source::{
    open_source, resolve_series, Fetch, HttpError, PoliteClient, PoliteClientBuilder, RetryPolicy,
    Site, SourceAdapter, SourceError,
};
pub use upload::{LocalDirGateway, UploadError, UploadGateway};
