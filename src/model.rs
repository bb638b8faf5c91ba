//! Data model shared by the adapters, the selector, the fetcher, the bundler and the artifact builder.
//!
//! Chapter ordinals are the single ordering authority for chapters; page numbers are the single
//! ordering authority for pages inside a chapter.

use crate::source::Site;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;

/// Chapter number as published by a site. Non-negative, possibly fractional (e.g. `10.5`).
#[derive(Debug, Clone, Copy)]
pub struct Ordinal(f64);

impl Ordinal {
    /// Build from a float. Rejects NaN, infinities and negatives.
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            // -0.0 and 0.0 must hash identically
            Some(Ordinal(value + 0.0))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Integer value when the ordinal has no fractional part.
    pub fn as_integer(self) -> Option<u32> {
        if self.0.fract() == 0.0 && self.0 <= u32::MAX as f64 {
            Some(self.0 as u32)
        } else {
            None
        }
    }
}

impl From<u32> for Ordinal {
    fn from(n: u32) -> Self {
        Ordinal(n as f64)
    }
}

/// Error returned when text is not a plain decimal chapter number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOrdinalError(pub String);

impl fmt::Display for ParseOrdinalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a chapter number", self.0)
    }
}

impl std::error::Error for ParseOrdinalError {}

impl FromStr for Ordinal {
    type Err = ParseOrdinalError;

    /// Accepts ASCII digits with at most one `.` (`"7"`, `"10.5"`). Rejects signs, exponents,
    /// `inf`/`nan` and empty strings, which `f64::from_str` would otherwise take.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseOrdinalError(s.to_string());
        let digits_ok = !s.is_empty()
            && s.chars().all(|c| c.is_ascii_digit() || c == '.')
            && s.chars().filter(|c| *c == '.').count() <= 1
            && s.chars().any(|c| c.is_ascii_digit());
        if !digits_ok {
            return Err(err());
        }
        s.parse::<f64>()
            .ok()
            .and_then(Ordinal::new)
            .ok_or_else(err)
    }
}

impl PartialEq for Ordinal {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Ordinal {}

impl PartialOrd for Ordinal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordinal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Ordinal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_integer() {
            Some(n) => write!(f, "{}", n),
            None => write!(f, "{}", self.0),
        }
    }
}

impl Serialize for Ordinal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(n) => serializer.serialize_u32(n),
            None => serializer.serialize_f64(self.0),
        }
    }
}

/// Publication type shown by some sites next to a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Manga,
    Manhwa,
    Manhua,
    Unknown,
}

impl SeriesKind {
    /// Map a site label ("Manhwa", "korean manhwa", ...) to a kind; unrecognized labels map to Unknown.
    pub fn from_label(label: &str) -> Self {
        let l = label.to_lowercase();
        if l.contains("manhwa") {
            SeriesKind::Manhwa
        } else if l.contains("manhua") {
            SeriesKind::Manhua
        } else if l.contains("manga") {
            SeriesKind::Manga
        } else {
            SeriesKind::Unknown
        }
    }
}

/// One search hit. Lives only while the caller picks a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesCandidate {
    pub title: String,
    /// Site-specific series identifier passed back to `catalog`.
    pub slug: String,
    /// Integer part of the latest chapter number shown in the result (0 when the site shows none).
    pub chapter_count: u32,
    pub kind: SeriesKind,
    pub source: Site,
}

/// One chapter in a series catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
    pub ordinal: Ordinal,
    pub title: Option<String>,
    /// Site-specific reference (chapter page URL).
    pub locator: String,
    /// Native volume number, when the site groups chapters into volumes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
}

/// Ordered chapter list for one series.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub slug: String,
    pub title: String,
    /// Sorted by ordinal, no duplicate ordinals.
    pub chapters: Vec<Chapter>,
    /// True when the adapter exposes native volume numbers on the chapters.
    pub native_volumes: bool,
}

impl Catalog {
    /// Sort chapters by ordinal (stable, so site order breaks ties) and drop duplicate ordinals,
    /// keeping the first one the site listed.
    pub fn new(
        slug: impl Into<String>,
        title: impl Into<String>,
        mut chapters: Vec<Chapter>,
        native_volumes: bool,
    ) -> Self {
        let slug = slug.into();
        chapters.sort_by(|a, b| a.ordinal.cmp(&b.ordinal));
        let before = chapters.len();
        chapters.dedup_by(|later, earlier| later.ordinal == earlier.ordinal);
        if chapters.len() != before {
            log::warn!(
                "[{}] catalog lists {} duplicate chapter number(s); keeping the first of each",
                slug,
                before - chapters.len()
            );
        }
        Catalog {
            slug,
            title: title.into(),
            chapters,
            native_volumes,
        }
    }

    pub fn ordinals(&self) -> impl Iterator<Item = Ordinal> + '_ {
        self.chapters.iter().map(|c| c.ordinal)
    }

    pub fn contains(&self, ordinal: Ordinal) -> bool {
        self.chapters
            .binary_search_by(|c| c.ordinal.cmp(&ordinal))
            .is_ok()
    }

    pub fn get(&self, ordinal: Ordinal) -> Option<&Chapter> {
        self.chapters
            .binary_search_by(|c| c.ordinal.cmp(&ordinal))
            .ok()
            .map(|i| &self.chapters[i])
    }
}

/// Where one page image lives; not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocator {
    /// 1-based position in the site's reading order.
    pub number: u32,
    pub url: String,
}

/// A downloaded page image.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    pub number: u32,
    pub bytes: Vec<u8>,
    pub source_url: String,
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("number", &self.number)
            .field("bytes", &self.bytes.len())
            .field("source_url", &self.source_url)
            .finish()
    }
}

/// A chapter with every page downloaded, pages sorted by number.
#[derive(Debug, Clone)]
pub struct FetchedChapter {
    pub chapter: Chapter,
    pub pages: Vec<PageImage>,
}

/// Output grouping of consecutive chapters; the unit of artifact production.
#[derive(Debug, Clone)]
pub struct Volume {
    /// Series name the volume belongs to (override or catalog title).
    pub series: String,
    /// Display name, e.g. `"Dragon Ball vol1 ch1-3"`.
    pub name: String,
    /// Filesystem-safe form of `name`.
    pub file_stem: String,
    pub chapters: Vec<FetchedChapter>,
}

impl Volume {
    pub fn page_count(&self) -> usize {
        self.chapters.iter().map(|c| c.pages.len()).sum()
    }

    /// Pages in reading order: chapter order, then page number.
    pub fn pages(&self) -> impl Iterator<Item = (&FetchedChapter, &PageImage)> {
        self.chapters
            .iter()
            .flat_map(|c| c.pages.iter().map(move |p| (c, p)))
    }
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    ComicArchive,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::ComicArchive => "cbz",
        }
    }
}

impl FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ArtifactFormat::Pdf),
            "cbz" | "zip" | "comic" => Ok(ArtifactFormat::ComicArchive),
            _ => Err(format!("Invalid format: '{}'. Use pdf or cbz.", s)),
        }
    }
}

/// A finished output file for one volume.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: ArtifactFormat,
    pub volume_name: String,
    pub chapters: Vec<Ordinal>,
    pub page_count: usize,
}
