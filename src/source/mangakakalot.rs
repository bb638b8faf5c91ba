//! Mangakakalot and Manganelo adapter. Both sites serve the same markup family and differ only in
//! URL shapes, a few class names and the chapter-number separator, captured by [Layout].
//!
//! Search: results page; catalog: series page chapter list; pages: `<img>` tags in the chapter
//! reader container.

use crate::model::{Catalog, Chapter, PageLocator, SeriesCandidate};
use crate::source::{
    absolute_url, fetch_html, kind_from_text, last_segment, number_after, parse_selector,
    series_title, Fetch, RetryPolicy, Site, SourceAdapter, SourceError,
};
use reqwest::Url;
use scraper::Html;

/// Marker both sites render (with HTTP 200) for missing chapters and series.
const NOT_FOUND_MARKER: &str = "404 NOT FOUND";
const READER_CONTAINER: &str = "div.container-chapter-reader";
const READER_IMAGES: &str = "div.container-chapter-reader img";

/// Per-site URL shapes and selectors.
#[derive(Debug)]
pub struct Layout {
    pub site: Site,
    /// Path segments before the search term.
    search_prefix: &'static [&'static str],
    search_term: fn(&str) -> String,
    results_container: &'static str,
    result_item: &'static str,
    latest_chapter: &'static str,
    /// Prefix between `/manga/` and the slug in series URLs.
    slug_prefix: &'static str,
    number_separator: char,
    title_heading: &'static str,
    chapter_list_container: &'static str,
    chapter_link: &'static str,
    /// Image URL attributes in preference order (lazy-loading sites put the real URL in data-src).
    image_attrs: &'static [&'static str],
}

fn kakalot_search_term(query: &str) -> String {
    query.trim().replace(' ', "_")
}

fn nelo_search_term(query: &str) -> String {
    query.trim().to_string()
}

pub const MANGAKAKALOT: Layout = Layout {
    site: Site::Mangakakalot,
    search_prefix: &["search", "story"],
    search_term: kakalot_search_term,
    results_container: "div.panel_story_list",
    result_item: "div.story_item",
    latest_chapter: "em.story_chapter a",
    slug_prefix: "",
    number_separator: '_',
    title_heading: "ul.manga-info-text h1",
    chapter_list_container: "div.chapter-list",
    chapter_link: "div.chapter-list div.row a, li.a-h a",
    image_attrs: &["src", "data-src"],
};

pub const MANGANELO: Layout = Layout {
    site: Site::Manganelo,
    search_prefix: &["search"],
    search_term: nelo_search_term,
    results_container: "div.panel-search-story",
    result_item: "div.search-story-item",
    latest_chapter: "a.item-chapter",
    slug_prefix: "manga-",
    number_separator: '-',
    title_heading: "div.story-info-right h1",
    chapter_list_container: "ul.row-content-chapter",
    chapter_link: "li.a-h a",
    image_attrs: &["data-src", "src"],
};

/// Adapter for one Kakalot-family site. Holds a reference to the shared client.
pub struct KakalotSource<'a> {
    layout: &'static Layout,
    client: &'a dyn Fetch,
    retry: RetryPolicy,
}

impl<'a> KakalotSource<'a> {
    pub fn new(layout: &'static Layout, client: &'a dyn Fetch, retry: RetryPolicy) -> Self {
        Self {
            layout,
            client,
            retry,
        }
    }

    fn catalog_url(&self, slug: &str) -> String {
        format!(
            "{}/manga/{}{}",
            self.layout.site.base_url(),
            self.layout.slug_prefix,
            slug
        )
    }
}

fn unavailable(layout: &Layout, url: &str, reason: impl Into<String>) -> SourceError {
    SourceError::SourceUnavailable {
        site: layout.site,
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Search URL with the term as one percent-encoded path segment.
fn search_url(layout: &Layout, query: &str) -> Result<String, SourceError> {
    let base = layout.site.base_url();
    let invalid = |reason: String| SourceError::InvalidUrl {
        input: base.to_string(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("base URL cannot carry a path".to_string()))?
        .clear()
        .extend(layout.search_prefix)
        .push(&(layout.search_term)(query));
    Ok(url.to_string())
}

/// Parse a search results page. An empty results container is a legitimate "no hits"; a page
/// without the container is not.
fn parse_search(layout: &Layout, html: &str, url: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
    let doc = Html::parse_document(html);
    let container_sel = parse_selector(layout.results_container)?;
    let item_sel = parse_selector(layout.result_item)?;
    let img_sel = parse_selector("img[alt]")?;
    let heading_sel = parse_selector("h3")?;
    let link_sel = parse_selector("a[href]")?;
    let latest_sel = parse_selector(layout.latest_chapter)?;

    let items: Vec<_> = doc.select(&item_sel).collect();
    if items.is_empty() {
        if doc.select(&container_sel).next().is_some() {
            return Ok(Vec::new());
        }
        return Err(unavailable(layout, url, "search results container not found"));
    }

    let mut candidates = Vec::with_capacity(items.len());
    for item in items {
        let href = item
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| unavailable(layout, url, "search result without a series link"))?;
        let slug = last_segment(href);
        let slug = slug.strip_prefix(layout.slug_prefix).unwrap_or(slug).to_string();
        let title = item
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                item.select(&heading_sel)
                    .next()
                    .map(|h| h.text().collect::<String>().trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| slug.clone());
        let chapter_count = item
            .select(&latest_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|h| number_after(h, layout.number_separator))
            .map(|o| o.value().floor() as u32)
            .unwrap_or(0);
        let kind = kind_from_text(&item.text().collect::<String>());
        candidates.push(SeriesCandidate {
            title,
            slug,
            chapter_count,
            kind,
            source: layout.site,
        });
    }
    Ok(candidates)
}

/// Parse a series page into a catalog. Links whose number cannot be read are skipped with a
/// warning; if every link is unreadable the page is treated as unexpected.
fn parse_catalog(layout: &Layout, html: &str, slug: &str, url: &str) -> Result<Catalog, SourceError> {
    if html.contains(NOT_FOUND_MARKER) {
        return Err(SourceError::NotFound {
            site: layout.site,
            what: format!("series '{}'", slug),
        });
    }
    let doc = Html::parse_document(html);
    let container_sel = parse_selector(layout.chapter_list_container)?;
    let link_sel = parse_selector(layout.chapter_link)?;

    let mut chapters = Vec::new();
    let mut skipped = 0usize;
    for link in doc.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            skipped += 1;
            continue;
        };
        let Some(ordinal) = number_after(href, layout.number_separator) else {
            log::warn!("[{}] {}: no chapter number in link {}", layout.site, slug, href);
            skipped += 1;
            continue;
        };
        let title = Some(link.text().collect::<String>().trim().to_string()).filter(|s| !s.is_empty());
        chapters.push(Chapter {
            ordinal,
            title,
            locator: absolute_url(layout.site, href)?,
            volume: None,
        });
    }

    if chapters.is_empty() && (skipped > 0 || doc.select(&container_sel).next().is_none()) {
        return Err(unavailable(layout, url, "chapter list not found or unreadable"));
    }

    let title = series_title(&doc, layout.title_heading, slug)?;
    Ok(Catalog::new(slug, title, chapters, false))
}

/// Parse a chapter reader page into page locators, numbered 1.. in document order.
fn parse_pages(layout: &Layout, html: &str, url: &str, what: &str) -> Result<Vec<PageLocator>, SourceError> {
    if html.contains(NOT_FOUND_MARKER) {
        return Err(SourceError::NotFound {
            site: layout.site,
            what: what.to_string(),
        });
    }
    let doc = Html::parse_document(html);
    let container_sel = parse_selector(READER_CONTAINER)?;
    if doc.select(&container_sel).next().is_none() {
        return Err(unavailable(layout, url, "chapter reader container not found"));
    }
    let img_sel = parse_selector(READER_IMAGES)?;
    let mut pages = Vec::new();
    for img in doc.select(&img_sel) {
        let src = layout
            .image_attrs
            .iter()
            .find_map(|attr| img.value().attr(attr))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(src) = src {
            pages.push(PageLocator {
                number: pages.len() as u32 + 1,
                url: absolute_url(layout.site, src)?,
            });
        }
    }
    if pages.is_empty() {
        return Err(unavailable(layout, url, "no page images in reader"));
    }
    Ok(pages)
}

impl SourceAdapter for KakalotSource<'_> {
    fn site(&self) -> Site {
        self.layout.site
    }

    fn search(&self, query: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
        let url = search_url(self.layout, query)?;
        let html = fetch_html(
            self.client,
            &self.retry,
            self.layout.site,
            &url,
            &format!("search '{}'", query),
        )?;
        parse_search(self.layout, &html, &url)
    }

    fn catalog(&self, slug: &str) -> Result<Catalog, SourceError> {
        let url = self.catalog_url(slug);
        let html = fetch_html(
            self.client,
            &self.retry,
            self.layout.site,
            &url,
            &format!("series '{}'", slug),
        )?;
        parse_catalog(self.layout, &html, slug, &url)
    }

    fn pages(&self, chapter: &Chapter) -> Result<Vec<PageLocator>, SourceError> {
        let what = format!("chapter {}", chapter.ordinal);
        let html = fetch_html(
            self.client,
            &self.retry,
            self.layout.site,
            &chapter.locator,
            &what,
        )?;
        parse_pages(self.layout, &html, &chapter.locator, &what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ordinal, SeriesKind};
    use crate::testing::{FakeFetch, Reply};

    const KAKALOT_SEARCH: &str = r#"<html><body><div class="panel_story_list">
<div class="story_item"><a href="https://mangakakalot.com/manga/read_dragon_ball_manga_online_for_free2"><img src="c.jpg" alt="Dragon Ball"/></a>
<div class="story_item_right"><em class="story_chapter"><a href="https://mangakakalot.com/chapter/read_dragon_ball_manga_online_for_free2/chapter_520.5">Chapter 520.5</a></em></div></div>
<div class="story_item"><a href="https://mangakakalot.com/manga/dragon_ball_super"><img src="d.jpg" alt="Dragon Ball Super"/></a>
<div class="story_item_right"><span>Manhwa</span><em class="story_chapter"><a href="https://mangakakalot.com/chapter/dragon_ball_super/chapter_55">Chapter 55</a></em></div></div>
</div></body></html>"#;

    const NELO_SERIES: &str = r#"<html><head><title>Bardock | Manganelo</title></head><body>
<div class="story-info-right"><h1>Dragon Ball: Episode of Bardock</h1></div>
<ul class="row-content-chapter">
<li class="a-h"><a href="https://manganelo.tv/chapter/manga-aa1/chapter-3">Chapter 3</a></li>
<li class="a-h"><a href="https://manganelo.tv/chapter/manga-aa1/chapter-2.5">Chapter 2.5</a></li>
<li class="a-h"><a href="https://manganelo.tv/chapter/manga-aa1/chapter-1">Chapter 1</a></li>
</ul></body></html>"#;

    const READER: &str = r#"<html><body><div class="container-chapter-reader">
<img data-src="https://cdn.example/1.jpg" src="placeholder.gif"/>
<img data-src="https://cdn.example/2.jpg"/>
<img src="https://cdn.example/3.jpg"/>
</div></body></html>"#;

    #[test]
    fn kakalot_search_extracts_candidates_in_site_order() -> Result<(), SourceError> {
        let results = parse_search(&MANGAKAKALOT, KAKALOT_SEARCH, "u")?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Dragon Ball");
        assert_eq!(results[0].slug, "read_dragon_ball_manga_online_for_free2");
        assert_eq!(results[0].chapter_count, 520);
        assert_eq!(results[0].kind, SeriesKind::Manga);
        assert_eq!(results[1].slug, "dragon_ball_super");
        assert_eq!(results[1].chapter_count, 55);
        assert_eq!(results[1].kind, SeriesKind::Manhwa);
        Ok(())
    }

    #[test]
    fn empty_results_container_is_zero_hits_not_an_error() -> Result<(), SourceError> {
        let html = r#"<html><body><div class="panel_story_list"></div></body></html>"#;
        assert!(parse_search(&MANGAKAKALOT, html, "u")?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_results_container_is_source_unavailable() {
        let html = "<html><body><p>Just a moment...</p></body></html>";
        assert!(matches!(
            parse_search(&MANGAKAKALOT, html, "u"),
            Err(SourceError::SourceUnavailable { site: Site::Mangakakalot, .. })
        ));
    }

    #[test]
    fn nelo_catalog_sorted_by_ordinal_with_fractional_chapters() -> Result<(), SourceError> {
        let catalog = parse_catalog(&MANGANELO, NELO_SERIES, "aa1", "u")?;
        assert_eq!(catalog.title, "Dragon Ball: Episode of Bardock");
        let ords: Vec<String> = catalog.ordinals().map(|o| o.to_string()).collect();
        assert_eq!(ords, ["1", "2.5", "3"]);
        assert_eq!(
            catalog.chapters[0].locator,
            "https://manganelo.tv/chapter/manga-aa1/chapter-1"
        );
        assert_eq!(catalog.chapters[0].title.as_deref(), Some("Chapter 1"));
        Ok(())
    }

    #[test]
    fn catalog_without_chapter_list_is_source_unavailable() {
        let html = "<html><body><h1>Maintenance</h1></body></html>";
        assert!(matches!(
            parse_catalog(&MANGANELO, html, "aa1", "u"),
            Err(SourceError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn catalog_not_found_marker() {
        let html = "<html><body><p>404 NOT FOUND</p></body></html>";
        assert!(matches!(
            parse_catalog(&MANGAKAKALOT, html, "nope", "u"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn reader_images_prefer_layout_attribute_order() -> Result<(), SourceError> {
        let nelo = parse_pages(&MANGANELO, READER, "u", "chapter 1")?;
        let urls: Vec<&str> = nelo.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://cdn.example/1.jpg",
                "https://cdn.example/2.jpg",
                "https://cdn.example/3.jpg"
            ]
        );
        assert_eq!(nelo.iter().map(|p| p.number).collect::<Vec<_>>(), [1, 2, 3]);

        let kakalot = parse_pages(&MANGAKAKALOT, READER, "u", "chapter 1")?;
        assert_eq!(kakalot[0].url, "https://mangakakalot.com/placeholder.gif");
        Ok(())
    }

    #[test]
    fn reader_without_container_is_source_unavailable() {
        assert!(matches!(
            parse_pages(&MANGAKAKALOT, "<html></html>", "u", "chapter 1"),
            Err(SourceError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn reader_without_images_is_source_unavailable() {
        let html = r#"<div class="container-chapter-reader"><img alt="ad"/><img src="  "/></div>"#;
        for layout in [&MANGAKAKALOT, &MANGANELO] {
            assert!(matches!(
                parse_pages(layout, html, "u", "chapter 1"),
                Err(SourceError::SourceUnavailable { reason, .. }) if reason == "no page images in reader"
            ));
        }
    }

    #[test]
    fn adapter_fetches_through_client_and_maps_404() -> Result<(), SourceError> {
        let fake = FakeFetch::new()
            .html("https://manganelo.tv/manga/manga-aa1", NELO_SERIES)
            .with(
                "https://manganelo.tv/manga/manga-gone",
                Reply::Status(404),
            );
        let source = KakalotSource::new(&MANGANELO, &fake, RetryPolicy::immediate(2));
        let catalog = source.catalog("aa1")?;
        assert_eq!(catalog.chapters.len(), 3);
        assert!(catalog.contains(Ordinal::from(3)));
        assert!(matches!(
            source.catalog("gone"),
            Err(SourceError::NotFound { site: Site::Manganelo, .. })
        ));
        Ok(())
    }

    #[test]
    fn search_url_shapes() -> Result<(), SourceError> {
        assert_eq!(
            search_url(&MANGAKAKALOT, "dragon ball")?,
            "https://mangakakalot.com/search/story/dragon_ball"
        );
        assert_eq!(
            search_url(&MANGANELO, " dragon ball ")?,
            "https://manganelo.tv/search/dragon%20ball"
        );
        Ok(())
    }

    #[test]
    fn search_term_is_one_encoded_segment() -> Result<(), SourceError> {
        let url = search_url(&MANGANELO, "fate/zero? #1 100%")?;
        assert_eq!(url, "https://manganelo.tv/search/fate%2Fzero%3F%20%231%20100%25");
        let parsed = Url::parse(&url).unwrap();
        assert!(parsed.query().is_none());
        assert!(parsed.fragment().is_none());
        assert_eq!(parsed.path_segments().unwrap().count(), 2);

        let fetch = FakeFetch::new().html(&url, "<div class=\"panel-search-story\"></div>");
        let source = KakalotSource::new(&MANGANELO, &fetch, RetryPolicy::immediate(1));
        assert!(source.search("fate/zero? #1 100%")?.is_empty());
        assert_eq!(fetch.calls(&url), 1);
        Ok(())
    }
}
