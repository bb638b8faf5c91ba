//! MangaReader adapter. Search via the query-string search page, catalog from `#chapterlist`,
//! page images from the `document["mj"]` JSON blob the chapter page embeds in a script.

use crate::model::{Catalog, Chapter, Ordinal, PageLocator, SeriesCandidate};
use crate::source::{
    absolute_url, fetch_html, kind_from_text, parse_selector, series_title, Fetch, RetryPolicy,
    Site, SourceAdapter, SourceError,
};
use reqwest::Url;
use scraper::Html;
use serde::Deserialize;

const SITE: Site = Site::MangaReader;
const PAGE_DATA_NEEDLE: &str = "document[\"mj\"]";
const NOT_RELEASED_MARKER: &str = "not released yet";
/// Genre filter with every genre unset.
const ANY_GENRE: &str = "0000000000000000000000000000000000000";

pub struct MangaReaderSource<'a> {
    client: &'a dyn Fetch,
    retry: RetryPolicy,
}

impl<'a> MangaReaderSource<'a> {
    pub fn new(client: &'a dyn Fetch, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

fn unavailable(url: &str, reason: impl Into<String>) -> SourceError {
    SourceError::SourceUnavailable {
        site: SITE,
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn search_url(query: &str) -> Result<String, SourceError> {
    let mut url = Url::parse(&format!("{}/search/", SITE.base_url())).map_err(|e| {
        SourceError::InvalidUrl {
            input: SITE.base_url().to_string(),
            reason: e.to_string(),
        }
    })?;
    url.query_pairs_mut()
        .append_pair("w", query.trim())
        .append_pair("rd", "0")
        .append_pair("status", "0")
        .append_pair("order", "0")
        .append_pair("genre", ANY_GENRE)
        .append_pair("p", "0");
    Ok(url.to_string())
}

fn parse_search(html: &str, url: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
    let doc = Html::parse_document(html);
    let container_sel = parse_selector("#ares")?;
    let item_sel = parse_selector("div.d54")?;
    let name_sel = parse_selector("div.d57")?;
    let link_sel = parse_selector("div.d57 a[href]")?;
    let chapters_sel = parse_selector("div.d58")?;

    let items: Vec<_> = doc.select(&item_sel).collect();
    if items.is_empty() {
        if doc.select(&container_sel).next().is_some() {
            return Ok(Vec::new());
        }
        return Err(unavailable(url, "search results container not found"));
    }

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let href = item
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| unavailable(url, "search result without a series link"))?;
        let slug = href
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        if slug.is_empty() {
            return Err(unavailable(url, format!("bad series link {}", href)));
        }
        let title = item
            .select(&name_sel)
            .next()
            .map(|n| n.text().collect::<String>().replace('\n', "").trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slug.clone());
        let chapter_count = item
            .select(&chapters_sel)
            .next()
            .map(|c| {
                c.text()
                    .collect::<String>()
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0);
        candidates.push(SeriesCandidate {
            title,
            slug,
            chapter_count,
            kind: kind_from_text(&item.text().collect::<String>()),
            source: SITE,
        });
    }
    Ok(candidates)
}

fn parse_catalog(html: &str, slug: &str, url: &str) -> Result<Catalog, SourceError> {
    let doc = Html::parse_document(html);
    let container_sel = parse_selector("div#chapterlist")?;
    if doc.select(&container_sel).next().is_none() {
        return Err(unavailable(url, "chapter list not found"));
    }
    let link_sel = parse_selector("div#chapterlist a[href]")?;

    let mut chapters = Vec::new();
    let mut skipped = 0usize;
    for link in doc.select(&link_sel) {
        let href = link.value().attr("href").unwrap_or_default();
        let number = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        let Ok(ordinal) = number.parse::<Ordinal>() else {
            log::warn!("[{}] {}: no chapter number in link {}", SITE, slug, href);
            skipped += 1;
            continue;
        };
        let volume = link
            .value()
            .attr("data-volume")
            .and_then(|v| v.trim().parse::<u32>().ok());
        let title = Some(link.text().collect::<String>().trim().to_string()).filter(|s| !s.is_empty());
        chapters.push(Chapter {
            ordinal,
            title,
            locator: absolute_url(SITE, href)?,
            volume,
        });
    }
    if chapters.is_empty() && skipped > 0 {
        return Err(unavailable(url, "no readable chapter links"));
    }

    let native_volumes = chapters.iter().any(|c| c.volume.is_some());
    let title = series_title(&doc, "h1", slug)?;
    Ok(Catalog::new(slug, title, chapters, native_volumes))
}

#[derive(Debug, Deserialize)]
struct PageData {
    im: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    p: PageNumber,
    u: String,
}

/// The site emits page numbers both as numbers and as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageNumber {
    Int(u32),
    Text(String),
}

impl PageNumber {
    fn get(&self) -> Option<u32> {
        match self {
            PageNumber::Int(n) => Some(*n),
            PageNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn parse_pages(html: &str, url: &str, what: &str) -> Result<Vec<PageLocator>, SourceError> {
    if html.contains(NOT_RELEASED_MARKER) {
        return Err(SourceError::NotFound {
            site: SITE,
            what: what.to_string(),
        });
    }
    let start = html
        .find(PAGE_DATA_NEEDLE)
        .ok_or_else(|| unavailable(url, "page data script not found"))?;
    let blob = extract_json_block(&html[start + PAGE_DATA_NEEDLE.len()..], '{', '}')
        .ok_or_else(|| unavailable(url, "could not extract page data object"))?;
    let data: PageData =
        serde_json::from_str(blob).map_err(|e| unavailable(url, format!("page data: {}", e)))?;

    let mut pages = Vec::with_capacity(data.im.len());
    for entry in data.im {
        let number = entry
            .p
            .get()
            .ok_or_else(|| unavailable(url, format!("bad page number {:?}", entry.p)))?;
        pages.push(PageLocator {
            number,
            url: absolute_url(SITE, &entry.u)?,
        });
    }
    pages.sort_by_key(|p| p.number);
    Ok(pages)
}

/// Find the matching `close` for the first `open` in s, skipping content inside JSON strings.
fn extract_json_block(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (byte_offset, c) in s[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&s[start..start + byte_offset + c.len_utf8()]);
            }
        } else if c == '"' {
            in_string = true;
        }
    }
    None
}

impl SourceAdapter for MangaReaderSource<'_> {
    fn site(&self) -> Site {
        SITE
    }

    fn search(&self, query: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
        let url = search_url(query)?;
        let html = fetch_html(
            self.client,
            &self.retry,
            SITE,
            &url,
            &format!("search '{}'", query),
        )?;
        parse_search(&html, &url)
    }

    fn catalog(&self, slug: &str) -> Result<Catalog, SourceError> {
        let url = format!("{}/{}", SITE.base_url(), slug);
        let html = fetch_html(
            self.client,
            &self.retry,
            SITE,
            &url,
            &format!("series '{}'", slug),
        )?;
        parse_catalog(&html, slug, &url)
    }

    fn pages(&self, chapter: &Chapter) -> Result<Vec<PageLocator>, SourceError> {
        let what = format!("chapter {}", chapter.ordinal);
        let html = fetch_html(self.client, &self.retry, SITE, &chapter.locator, &what)?;
        parse_pages(&html, &chapter.locator, &what)
    }

    fn native_volumes(&self) -> bool {
        true
    }
}
