//! Site adapters. Site selection, the adapter trait, the shared client, and the adapters.

mod client;
mod error;

pub mod mangakakalot;
pub mod mangareader;

pub use client::{Fetch, PoliteClient, PoliteClientBuilder, RetryPolicy};
pub use error::{HttpError, SourceError};

use crate::model::{Catalog, Chapter, Ordinal, PageLocator, SeriesCandidate, SeriesKind};
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Supported hosting site. Chosen by configuration or detected from a series URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Mangakakalot,
    Manganelo,
    MangaReader,
}

impl Site {
    pub fn base_url(self) -> &'static str {
        match self {
            Site::Mangakakalot => "https://mangakakalot.com",
            Site::Manganelo => "https://manganelo.tv",
            Site::MangaReader => "http://mangareader.net",
        }
    }

    fn host_marker(self) -> &'static str {
        match self {
            Site::Mangakakalot => "mangakakalot.com",
            Site::Manganelo => "manganelo.tv",
            Site::MangaReader => "mangareader.net",
        }
    }

    /// Detect the site from a series URL host.
    pub fn detect(url_input: &str) -> Result<Site, SourceError> {
        let url = parse_url(url_input)?;
        let host = url.host_str().ok_or_else(|| SourceError::InvalidUrl {
            input: url_input.to_string(),
            reason: "URL has no host".to_string(),
        })?;
        [Site::Mangakakalot, Site::Manganelo, Site::MangaReader]
            .into_iter()
            .find(|site| host.contains(site.host_marker()))
            .ok_or_else(|| SourceError::UnrecognizedHost {
                host: host.to_string(),
            })
    }

    /// Series slug from a series URL on this site.
    pub fn slug_from_url(self, url_input: &str) -> Result<String, SourceError> {
        let url = parse_url(url_input)?;
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let slug = match self {
            Site::Mangakakalot => segments.last().copied(),
            Site::Manganelo => segments
                .last()
                .map(|s| s.strip_prefix("manga-").unwrap_or(s)),
            Site::MangaReader => segments.first().copied(),
        };
        slug.filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| SourceError::InvalidUrl {
                input: url_input.to_string(),
                reason: "URL has no series path".to_string(),
            })
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Site::Mangakakalot => "mangakakalot",
            Site::Manganelo => "manganelo",
            Site::MangaReader => "mangareader",
        };
        f.write_str(name)
    }
}

impl FromStr for Site {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mangakakalot" | "kakalot" => Ok(Site::Mangakakalot),
            "manganelo" | "nelo" => Ok(Site::Manganelo),
            "mangareader" | "mr" => Ok(Site::MangaReader),
            _ => Err(SourceError::UnsupportedSource {
                name: s.to_string(),
            }),
        }
    }
}

fn parse_url(input: &str) -> Result<Url, SourceError> {
    Url::parse(input).map_err(|e| SourceError::InvalidUrl {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve what the user typed (a series URL or a bare slug) into a site and slug.
///
/// An explicit `override_site` wins over URL detection; a bare slug uses `override_site`, falling
/// back to `default_site`.
pub fn resolve_series(
    input: &str,
    override_site: Option<Site>,
    default_site: Site,
) -> Result<(Site, String), SourceError> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        let site = match override_site {
            Some(site) => site,
            None => Site::detect(input)?,
        };
        let slug = site.slug_from_url(input)?;
        return Ok((site, slug));
    }
    Ok((override_site.unwrap_or(default_site), input.to_string()))
}

/// Per-site driver: search, list chapters, list page images of a chapter.
///
/// Results keep the site's order. A page that does not have the expected structure fails with
/// [SourceError::SourceUnavailable]; it never turns into an empty result.
pub trait SourceAdapter: Send + Sync {
    fn site(&self) -> Site;

    fn search(&self, query: &str) -> Result<Vec<SeriesCandidate>, SourceError>;

    fn catalog(&self, slug: &str) -> Result<Catalog, SourceError>;

    fn pages(&self, chapter: &Chapter) -> Result<Vec<PageLocator>, SourceError>;

    /// Whether this site publishes real volume groupings on its chapters.
    fn native_volumes(&self) -> bool {
        false
    }
}

/// Build the adapter for a site over a shared client.
pub fn open_source<'a>(
    site: Site,
    client: &'a dyn Fetch,
    retry: RetryPolicy,
) -> Box<dyn SourceAdapter + 'a> {
    match site {
        Site::Mangakakalot => Box::new(mangakakalot::KakalotSource::new(
            &mangakakalot::MANGAKAKALOT,
            client,
            retry,
        )),
        Site::Manganelo => Box::new(mangakakalot::KakalotSource::new(
            &mangakakalot::MANGANELO,
            client,
            retry,
        )),
        Site::MangaReader => Box::new(mangareader::MangaReaderSource::new(client, retry)),
    }
}

/// Parse a CSS selector or return an error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, SourceError> {
    Selector::parse(sel).map_err(|e| SourceError::InvalidSelector {
        selector: sel.to_string(),
        reason: e.to_string(),
    })
}

/// GET an HTML page with retries. HTTP 404 becomes NotFound for `what`.
pub(crate) fn fetch_html(
    client: &dyn Fetch,
    retry: &RetryPolicy,
    site: Site,
    url: &str,
    what: &str,
) -> Result<String, SourceError> {
    log::debug!("[{}] GET {}", site, url);
    retry
        .run(|| client.get_text(url))
        .map_err(|e| match e.status() {
            Some(404) => SourceError::NotFound {
                site,
                what: what.to_string(),
            },
            _ => SourceError::Http(e),
        })
}

/// Resolve an href (absolute, root-relative, or protocol-relative) against the site base.
pub(crate) fn absolute_url(site: Site, href: &str) -> Result<String, SourceError> {
    let href = href.trim();
    if let Some(rest) = href.strip_prefix("//") {
        return Ok(format!("https://{}", rest));
    }
    let base = parse_url(site.base_url())?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| SourceError::SourceUnavailable {
            site,
            url: href.to_string(),
            reason: format!("bad link: {}", e),
        })
}

/// Last non-empty path segment of a URL or path, without a file extension.
pub(crate) fn last_segment(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let seg = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path);
    match seg.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphabetic()) => {
            stem
        }
        _ => seg,
    }
}

/// Chapter number after the last `sep` in a link's last segment (`chapter_12.5` -> 12.5).
pub(crate) fn number_after(href: &str, sep: char) -> Option<Ordinal> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let seg = path.trim_end_matches('/').rsplit('/').next()?;
    seg.rsplit(sep).next()?.parse().ok()
}

/// Kind of a search hit from the text around it; these sites mostly host manga, so silence means manga.
pub(crate) fn kind_from_text(text: &str) -> SeriesKind {
    match SeriesKind::from_label(text) {
        SeriesKind::Unknown => SeriesKind::Manga,
        kind => kind,
    }
}

/// Trimmed text of the first match of `sel`, if any and non-empty.
pub(crate) fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(|e| e.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Series title from the page heading, then the `<title>` element, then the slug.
pub(crate) fn series_title(doc: &Html, heading: &str, slug: &str) -> Result<String, SourceError> {
    let heading_sel = parse_selector(heading)?;
    let title_sel = parse_selector("title")?;
    Ok(first_text(doc, &heading_sel)
        .or_else(|| first_text(doc, &title_sel))
        .unwrap_or_else(|| slug.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_detection_by_host() -> Result<(), SourceError> {
        assert_eq!(
            Site::detect("https://mangakakalot.com/manga/dragon_ball")?,
            Site::Mangakakalot
        );
        assert_eq!(
            Site::detect("https://manganelo.tv/manga/manga-aa951409")?,
            Site::Manganelo
        );
        assert_eq!(
            Site::detect("http://www.mangareader.net/dragon-ball")?,
            Site::MangaReader
        );
        Ok(())
    }

    #[test]
    fn site_detection_unrecognized_host_errors() -> Result<(), String> {
        let result = Site::detect("https://example.com/foo");
        match &result {
            Err(SourceError::UnrecognizedHost { host }) if host == "example.com" => Ok(()),
            _ => Err(format!("expected UnrecognizedHost, got {:?}", result)),
        }
    }

    #[test]
    fn site_from_str_rejects_unknown_values() {
        assert_eq!("MangaReader".parse::<Site>().unwrap(), Site::MangaReader);
        assert_eq!("nelo".parse::<Site>().unwrap(), Site::Manganelo);
        assert!(matches!(
            "mangafast".parse::<Site>(),
            Err(SourceError::UnsupportedSource { name }) if name == "mangafast"
        ));
    }

    #[test]
    fn slug_from_url_per_site() -> Result<(), SourceError> {
        assert_eq!(
            Site::Mangakakalot.slug_from_url("https://mangakakalot.com/manga/dragon_ball/")?,
            "dragon_ball"
        );
        assert_eq!(
            Site::Manganelo.slug_from_url("https://manganelo.tv/manga/manga-aa951409")?,
            "aa951409"
        );
        assert_eq!(
            Site::MangaReader.slug_from_url("http://mangareader.net/dragon-ball/12")?,
            "dragon-ball"
        );
        Ok(())
    }

    #[test]
    fn resolve_series_accepts_slug_or_url() -> Result<(), SourceError> {
        assert_eq!(
            resolve_series("dragon-ball", None, Site::MangaReader)?,
            (Site::MangaReader, "dragon-ball".to_string())
        );
        assert_eq!(
            resolve_series("naruto", Some(Site::Mangakakalot), Site::MangaReader)?,
            (Site::Mangakakalot, "naruto".to_string())
        );
        assert_eq!(
            resolve_series("https://manganelo.tv/manga/manga-xy1", None, Site::MangaReader)?,
            (Site::Manganelo, "xy1".to_string())
        );
        Ok(())
    }

    #[test]
    fn link_helpers() {
        assert_eq!(last_segment("https://mangakakalot.com/manga/read_db2.html"), "read_db2");
        assert_eq!(last_segment("/manga/one_piece/"), "one_piece");
        assert_eq!(
            number_after("https://mangakakalot.com/chapter/db/chapter_12.5", '_')
                .map(|o| o.to_string()),
            Some("12.5".to_string())
        );
        assert_eq!(
            number_after("/chapter/manga-aa1/chapter-7", '-').map(|o| o.to_string()),
            Some("7".to_string())
        );
        assert!(number_after("/chapter/manga-aa1/extra", '-').is_none());
    }

    #[test]
    fn absolute_url_handles_relative_forms() -> Result<(), SourceError> {
        assert_eq!(
            absolute_url(Site::MangaReader, "/dragon-ball/1")?,
            "http://mangareader.net/dragon-ball/1"
        );
        assert_eq!(
            absolute_url(Site::MangaReader, "//i1.mangareader.net/a.jpg")?,
            "https://i1.mangareader.net/a.jpg"
        );
        assert_eq!(
            absolute_url(Site::Manganelo, "https://cdn.example/x.png")?,
            "https://cdn.example/x.png"
        );
        Ok(())
    }
}
