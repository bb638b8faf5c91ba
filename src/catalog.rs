//! Turns what the user typed into a series catalog: search query -> candidates, name -> catalog.

use crate::model::{Catalog, SeriesCandidate};
use crate::selection::SelectionError;
use crate::source::{SourceAdapter, SourceError};

pub struct CatalogResolver<'s> {
    source: &'s dyn SourceAdapter,
}

impl<'s> CatalogResolver<'s> {
    pub fn new(source: &'s dyn SourceAdapter) -> Self {
        Self { source }
    }

    /// Search candidates in the site's ranking. No hits is NotFound.
    pub fn resolve_by_query(&self, text: &str) -> Result<Vec<SeriesCandidate>, SourceError> {
        let candidates = self.source.search(text)?;
        if candidates.is_empty() {
            return Err(SourceError::NotFound {
                site: self.source.site(),
                what: format!("search '{}'", text.trim()),
            });
        }
        log::info!(
            "[{}] {} result(s) for '{}'",
            self.source.site(),
            candidates.len(),
            text.trim()
        );
        Ok(candidates)
    }

    /// Catalog for a series slug. A series with no chapters is NotFound.
    pub fn resolve_by_name(&self, name: &str) -> Result<Catalog, SourceError> {
        let catalog = self.source.catalog(name)?;
        if catalog.chapters.is_empty() {
            return Err(SourceError::NotFound {
                site: self.source.site(),
                what: format!("chapters of '{}'", name),
            });
        }
        log::info!(
            "[{}] '{}': {} chapter(s)",
            self.source.site(),
            catalog.title,
            catalog.chapters.len()
        );
        Ok(catalog)
    }
}

/// Pick a candidate by its 1-based position in the list shown to the user.
pub fn pick_candidate(
    candidates: &[SeriesCandidate],
    choice: usize,
) -> Result<&SeriesCandidate, SelectionError> {
    choice
        .checked_sub(1)
        .and_then(|i| candidates.get(i))
        .ok_or(SelectionError::InvalidChoice {
            choice,
            count: candidates.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;

    #[test]
    fn query_keeps_ranking_and_empty_is_not_found() -> Result<(), SourceError> {
        let mut source = FakeSource::new("Dragon Ball", &["1", "2"], 1);
        let second = SeriesCandidate {
            title: "Dragon Ball Super".to_string(),
            ..source.candidates[0].clone()
        };
        source.candidates.push(second);
        let found = CatalogResolver::new(&source).resolve_by_query("dragon")?;
        assert_eq!(found[1].title, "Dragon Ball Super");

        source.candidates.clear();
        assert!(matches!(
            CatalogResolver::new(&source).resolve_by_query("zzz"),
            Err(SourceError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn name_resolves_catalog_or_not_found() -> Result<(), SourceError> {
        let source = FakeSource::new("Dragon Ball", &["2", "1"], 1);
        let resolver = CatalogResolver::new(&source);
        let catalog = resolver.resolve_by_name("fake-series")?;
        assert_eq!(catalog.chapters.len(), 2);
        assert!(matches!(
            resolver.resolve_by_name("other"),
            Err(SourceError::NotFound { .. })
        ));

        let empty = FakeSource::new("Empty", &[], 1);
        assert!(matches!(
            CatalogResolver::new(&empty).resolve_by_name("fake-series"),
            Err(SourceError::NotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn pick_candidate_is_one_based() {
        let source = FakeSource::new("Dragon Ball", &["1"], 1);
        let candidates = &source.candidates;
        assert_eq!(pick_candidate(candidates, 1).unwrap().title, "Dragon Ball");
        assert_eq!(
            pick_candidate(candidates, 0),
            Err(SelectionError::InvalidChoice {
                choice: 0,
                count: 1
            })
        );
        assert!(pick_candidate(candidates, 2).is_err());
    }
}
