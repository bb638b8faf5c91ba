//! Chapter selection expressions: `"3-7 23 10.5"`, `"all"`, or empty for everything.

use crate::model::{Catalog, Chapter, Ordinal};
use std::collections::BTreeSet;
use thiserror::Error;

/// Widest `lo-hi` range accepted in one token.
const MAX_RANGE_SPAN: u32 = 100_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectionError {
    #[error("Invalid selection '{token}': {reason}")]
    InvalidSelection { token: String, reason: String },

    #[error("Invalid range '{token}': {lo} is greater than {hi}")]
    InvalidRange { token: String, lo: u32, hi: u32 },

    #[error("Chapter {ordinal} is not in the catalog")]
    NotInCatalog { ordinal: Ordinal },

    #[error("Invalid choice {choice}: pick a number between 1 and {count}")]
    InvalidChoice { choice: usize, count: usize },
}

/// Which chapters of a catalog to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSelection {
    All,
    /// Ascending, deduplicated; every ordinal exists in the catalog it was parsed against.
    Chapters(BTreeSet<Ordinal>),
}

impl VolumeSelection {
    /// Selected chapters in ascending ordinal order.
    pub fn chapters<'c>(&self, catalog: &'c Catalog) -> Vec<&'c Chapter> {
        match self {
            VolumeSelection::All => catalog.chapters.iter().collect(),
            VolumeSelection::Chapters(set) => set.iter().filter_map(|o| catalog.get(*o)).collect(),
        }
    }

    pub fn is_empty(&self, catalog: &Catalog) -> bool {
        match self {
            VolumeSelection::All => catalog.chapters.is_empty(),
            VolumeSelection::Chapters(set) => set.is_empty(),
        }
    }
}

/// Parsed selection plus the per-token problems. Problems never stop other tokens from selecting.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub selection: VolumeSelection,
    pub warnings: Vec<SelectionError>,
}

/// Parse a whitespace-separated selection expression against a catalog.
///
/// Tokens are either a closed integer range `lo-hi` or a single, possibly fractional, chapter
/// number. An empty expression or `all` selects the whole catalog.
pub fn parse_selection(expr: &str, catalog: &Catalog) -> SelectionOutcome {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.is_empty() || (tokens.len() == 1 && tokens[0].eq_ignore_ascii_case("all")) {
        return SelectionOutcome {
            selection: VolumeSelection::All,
            warnings: Vec::new(),
        };
    }

    let mut selected = BTreeSet::new();
    let mut warnings = Vec::new();
    for token in tokens {
        if token.contains('-') {
            select_range(token, catalog, &mut selected, &mut warnings);
        } else {
            match token.parse::<Ordinal>() {
                Ok(ordinal) if catalog.contains(ordinal) => {
                    selected.insert(ordinal);
                }
                Ok(ordinal) => warnings.push(SelectionError::NotInCatalog { ordinal }),
                Err(e) => warnings.push(SelectionError::InvalidSelection {
                    token: token.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
    }
    SelectionOutcome {
        selection: VolumeSelection::Chapters(selected),
        warnings,
    }
}

fn select_range(
    token: &str,
    catalog: &Catalog,
    selected: &mut BTreeSet<Ordinal>,
    warnings: &mut Vec<SelectionError>,
) {
    let invalid = |reason: &str| SelectionError::InvalidSelection {
        token: token.to_string(),
        reason: reason.to_string(),
    };
    let Some((lo, hi)) = token.split_once('-') else {
        return;
    };
    let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) else {
        warnings.push(invalid("range bounds must be whole chapter numbers"));
        return;
    };
    if lo > hi {
        warnings.push(SelectionError::InvalidRange {
            token: token.to_string(),
            lo,
            hi,
        });
        return;
    }
    if hi - lo >= MAX_RANGE_SPAN {
        warnings.push(invalid("range is too wide"));
        return;
    }
    for n in lo..=hi {
        let ordinal = Ordinal::from(n);
        if catalog.contains(ordinal) {
            selected.insert(ordinal);
        } else {
            warnings.push(SelectionError::NotInCatalog { ordinal });
        }
    }
}
