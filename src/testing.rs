//! In-memory stand-ins for the network and the sites, shared by unit tests.

use crate::model::{Catalog, Chapter, Ordinal, PageLocator, SeriesCandidate, SeriesKind};
use crate::source::{Fetch, HttpError, Site, SourceAdapter, SourceError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

pub(crate) enum Reply {
    Body(Vec<u8>),
    Status(u16),
    /// Fail with `status` for the first `failures` calls, then serve `body`.
    Flaky {
        failures: u32,
        status: u16,
        body: Vec<u8>,
    },
    /// Serve `body` after sleeping, to shuffle completion order under concurrency.
    Slow { delay_ms: u64, body: Vec<u8> },
}

/// URL -> reply map. Unknown URLs answer 404. Counts calls per URL.
#[derive(Default)]
pub(crate) struct FakeFetch {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub(crate) fn html(self, url: &str, html: &str) -> Self {
        self.with(url, Reply::Body(html.as_bytes().to_vec()))
    }

    pub(crate) fn calls(&self, url: &str) -> u32 {
        self.calls
            .lock()
            .map(|c| c.get(url).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Fetch for FakeFetch {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        let status = |code: u16| HttpError::Status {
            status: code,
            url: url.to_string(),
        };
        match self.replies.get(url) {
            None => Err(status(404)),
            Some(Reply::Body(body)) => Ok(body.clone()),
            Some(Reply::Status(code)) => Err(status(*code)),
            Some(Reply::Flaky {
                failures,
                status: code,
                body,
            }) => {
                if n <= *failures {
                    Err(status(*code))
                } else {
                    Ok(body.clone())
                }
            }
            Some(Reply::Slow { delay_ms, body }) => {
                std::thread::sleep(Duration::from_millis(*delay_ms));
                Ok(body.clone())
            }
        }
    }
}

/// Solid-colour PNG of the given size; `shade` varies the colour so pages differ.
pub(crate) fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    encode(width, height, shade, ImageFormat::Png)
}

pub(crate) fn jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    encode(width, height, shade, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, shade: u8, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([shade, 255 - shade, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub(crate) fn chapter(n: &str) -> Chapter {
    Chapter {
        ordinal: n.parse::<Ordinal>().unwrap(),
        title: Some(format!("Chapter {}", n)),
        locator: format!("https://fake.test/ch/{}", n),
        volume: None,
    }
}

pub(crate) fn page_url(chapter: &str, page: u32) -> String {
    format!("https://img.fake.test/{}/{}.png", chapter, page)
}

/// Fixed catalog; each chapter lists `pages_per_chapter` page URLs under `page_url`.
pub(crate) struct FakeSource {
    pub(crate) catalog: Catalog,
    pub(crate) candidates: Vec<SeriesCandidate>,
    pub(crate) pages_per_chapter: u32,
    /// Chapters whose page listing fails as SourceUnavailable.
    pub(crate) broken: Vec<String>,
    /// Whether the site reports native volumes.
    pub(crate) native: bool,
}

impl FakeSource {
    pub(crate) fn new(title: &str, chapters: &[&str], pages_per_chapter: u32) -> Self {
        Self {
            catalog: Catalog::new(
                "fake-series",
                title,
                chapters.iter().map(|c| chapter(c)).collect(),
                false,
            ),
            candidates: vec![SeriesCandidate {
                title: title.to_string(),
                slug: "fake-series".to_string(),
                chapter_count: chapters.len() as u32,
                kind: SeriesKind::Manga,
                source: Site::Mangakakalot,
            }],
            pages_per_chapter,
            broken: Vec::new(),
            native: false,
        }
    }

    /// A FakeFetch serving a PNG for every page of every chapter.
    pub(crate) fn images(&self) -> FakeFetch {
        let mut fetch = FakeFetch::new();
        for ch in &self.catalog.chapters {
            for p in 1..=self.pages_per_chapter {
                fetch = fetch.with(
                    &page_url(&ch.ordinal.to_string(), p),
                    Reply::Body(png(8, 12, (p * 20) as u8)),
                );
            }
        }
        fetch
    }
}

impl SourceAdapter for FakeSource {
    fn site(&self) -> Site {
        Site::Mangakakalot
    }

    fn search(&self, _query: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
        Ok(self.candidates.clone())
    }

    fn catalog(&self, slug: &str) -> Result<Catalog, SourceError> {
        if slug == self.catalog.slug {
            Ok(self.catalog.clone())
        } else {
            Err(SourceError::NotFound {
                site: Site::Mangakakalot,
                what: format!("series '{}'", slug),
            })
        }
    }

    fn pages(&self, chapter: &Chapter) -> Result<Vec<PageLocator>, SourceError> {
        let name = chapter.ordinal.to_string();
        if self.broken.contains(&name) {
            return Err(SourceError::SourceUnavailable {
                site: Site::Mangakakalot,
                url: chapter.locator.clone(),
                reason: "reader container not found".to_string(),
            });
        }
        Ok((1..=self.pages_per_chapter)
            .map(|number| PageLocator {
                number,
                url: page_url(&name, number),
            })
            .collect())
    }

    fn native_volumes(&self) -> bool {
        self.native
    }
}
