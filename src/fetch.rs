//! Download every page of a chapter on a bounded worker pool, retrying transient failures.
//! A chapter is returned complete or not at all.

use crate::model::{Chapter, FetchedChapter, Ordinal, PageImage, PageLocator};
use crate::source::{Fetch, RetryPolicy, SourceAdapter, SourceError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Chapter {chapter} is incomplete: page {page} ({url}): {reason}")]
    ChapterIncomplete {
        chapter: Ordinal,
        page: u32,
        url: String,
        reason: String,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Called after each page with (pages finished in this chapter, pages in this chapter).
pub type Progress<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Build the shared worker pool; `workers` is clamped to at least 1.
pub fn worker_pool(workers: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("mangascrape-worker-{}", i))
        .build()
}

pub struct ChapterFetcher<'a> {
    source: &'a dyn SourceAdapter,
    client: &'a dyn Fetch,
    retry: RetryPolicy,
    pool: &'a ThreadPool,
    progress: Option<Progress<'a>>,
}

impl<'a> ChapterFetcher<'a> {
    pub fn new(
        source: &'a dyn SourceAdapter,
        client: &'a dyn Fetch,
        retry: RetryPolicy,
        pool: &'a ThreadPool,
    ) -> Self {
        Self {
            source,
            client,
            retry,
            pool,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Fetch all pages of `chapter`, sorted by page number.
    pub fn fetch(&self, chapter: &Chapter) -> Result<FetchedChapter, FetchError> {
        let locators = self.source.pages(chapter)?;
        if locators.is_empty() {
            return Err(FetchError::ChapterIncomplete {
                chapter: chapter.ordinal,
                page: 0,
                url: chapter.locator.clone(),
                reason: "site lists no pages for this chapter".to_string(),
            });
        }

        let total = locators.len();
        let done = AtomicUsize::new(0);
        let results: Vec<Result<PageImage, FetchError>> = self.pool.install(|| {
            locators
                .par_iter()
                .map(|locator| {
                    let page = self.fetch_page(chapter.ordinal, locator);
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(progress) = self.progress {
                        progress(finished, total);
                    }
                    page
                })
                .collect()
        });

        let mut pages = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        pages.sort_by_key(|p| p.number);
        log::debug!(
            "[{}] chapter {}: {} page(s)",
            self.source.site(),
            chapter.ordinal,
            pages.len()
        );
        Ok(FetchedChapter {
            chapter: chapter.clone(),
            pages,
        })
    }

    /// Fetch independent chapters on the same pool. Results line up with `chapters`.
    pub fn fetch_many(&self, chapters: &[Chapter]) -> Vec<Result<FetchedChapter, FetchError>> {
        self.pool
            .install(|| chapters.par_iter().map(|c| self.fetch(c)).collect())
    }

    fn fetch_page(&self, chapter: Ordinal, locator: &PageLocator) -> Result<PageImage, FetchError> {
        let incomplete = |reason: String| FetchError::ChapterIncomplete {
            chapter,
            page: locator.number,
            url: locator.url.clone(),
            reason,
        };
        let bytes = self
            .retry
            .run(|| self.client.get(&locator.url))
            .map_err(|e| incomplete(e.to_string()))?;
        if bytes.is_empty() {
            return Err(incomplete("empty response body".to_string()));
        }
        if let Err(e) = image::guess_format(&bytes) {
            return Err(incomplete(format!("response is not an image: {}", e)));
        }
        Ok(PageImage {
            number: locator.number,
            bytes,
            source_url: locator.url.clone(),
        })
    }
}
