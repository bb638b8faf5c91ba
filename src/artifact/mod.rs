//! Volume -> output file. Every page is decoded before anything touches the disk; the file is
//! written next to its final path with a `.part` suffix and renamed once complete.

mod cbz;
mod pdf;

pub use cbz::list_archive_entries;

use crate::bundle::file_stem;
use crate::model::{Artifact, ArtifactFormat, Ordinal, PageImage, Volume};
use image::ImageFormat;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Volume '{volume}' has no pages")]
    EmptyVolume { volume: String },

    #[error("Cannot convert '{volume}': chapter {chapter}, page {page}: {reason}")]
    Conversion {
        volume: String,
        chapter: Ordinal,
        page: u32,
        reason: String,
    },

    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Failed to write comic archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// What decoding a page told us; the writers work from the original bytes plus this.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Writes volumes under `output_dir`. Holds no mutable state; share it between threads freely.
#[derive(Debug, Clone)]
pub struct ArtifactBuilder {
    output_dir: PathBuf,
    comic_info: bool,
}

impl ArtifactBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            comic_info: true,
        }
    }

    /// Whether comic archives carry a ComicInfo.xml entry. Default on.
    pub fn comic_info(mut self, enabled: bool) -> Self {
        self.comic_info = enabled;
        self
    }

    /// `{output_dir}/{series}/{file_stem}.{ext}`
    pub fn output_path(&self, series: &str, stem: &str, format: ArtifactFormat) -> PathBuf {
        self.output_dir
            .join(file_stem(series))
            .join(format!("{}.{}", stem, format.extension()))
    }

    pub fn build(&self, volume: &Volume, format: ArtifactFormat) -> Result<Artifact, ArtifactError> {
        if volume.page_count() == 0 {
            return Err(ArtifactError::EmptyVolume {
                volume: volume.name.clone(),
            });
        }
        let infos = validate_pages(volume)?;

        let path = self.output_path(&volume.series, &volume.file_stem, format);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ArtifactError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        let part = part_path(&path);
        let written = match format {
            ArtifactFormat::Pdf => pdf::write(&part, volume, &infos),
            ArtifactFormat::ComicArchive => cbz::write(&part, volume, &infos, self.comic_info),
        };
        if let Err(e) = written {
            let _ = std::fs::remove_file(&part);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&part, &path) {
            let _ = std::fs::remove_file(&part);
            return Err(ArtifactError::Io { path, source: e });
        }

        log::info!("wrote {} ({} pages)", path.display(), infos.len());
        Ok(Artifact {
            path,
            format,
            volume_name: volume.name.clone(),
            chapters: volume.chapters.iter().map(|c| c.chapter.ordinal).collect(),
            page_count: infos.len(),
        })
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Decode every page in reading order. The first page that does not decode fails the volume.
fn validate_pages(volume: &Volume) -> Result<Vec<PageInfo>, ArtifactError> {
    volume
        .pages()
        .map(|(chapter, page)| {
            decode_info(page).map_err(|reason| ArtifactError::Conversion {
                volume: volume.name.clone(),
                chapter: chapter.chapter.ordinal,
                page: page.number,
                reason,
            })
        })
        .collect()
}

fn decode_info(page: &PageImage) -> Result<PageInfo, String> {
    let format = image::guess_format(&page.bytes).map_err(|e| e.to_string())?;
    let decoded = image::load_from_memory_with_format(&page.bytes, format).map_err(|e| e.to_string())?;
    Ok(PageInfo {
        format,
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// File extension used for a page inside an archive.
pub(crate) fn page_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        other => other.extensions_str().first().copied().unwrap_or("img"),
    }
}
