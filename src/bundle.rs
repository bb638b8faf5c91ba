//! Group consecutive chapters into volumes and give each a deterministic name.

use crate::model::{Chapter, FetchedChapter, Ordinal, Volume};
use thiserror::Error;

/// Characters that are not allowed in file names on common filesystems.
const PATH_HOSTILE: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BundleError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Fixed(usize),
    Native,
}

/// A planned volume: which chapters, under what name. Nothing downloaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumePlan {
    /// 1-based group index, or the native volume number.
    pub number: u32,
    pub name: String,
    pub file_stem: String,
    pub chapters: Vec<Chapter>,
}

impl VolumePlan {
    pub fn ordinals(&self) -> Vec<Ordinal> {
        self.chapters.iter().map(|c| c.ordinal).collect()
    }
}

#[derive(Debug, Clone)]
pub struct VolumeBundler {
    series: String,
    grouping: Grouping,
}

impl VolumeBundler {
    /// Fixed-size bundles of `bundle_size` chapters; the last one may be short.
    pub fn new(series: &str, bundle_size: i64) -> Result<Self, BundleError> {
        if bundle_size <= 0 {
            return Err(BundleError::InvalidConfiguration {
                reason: format!("chapters per volume must be at least 1, got {}", bundle_size),
            });
        }
        let size = usize::try_from(bundle_size).map_err(|_| BundleError::InvalidConfiguration {
            reason: format!("chapters per volume is too large: {}", bundle_size),
        })?;
        Ok(Self {
            series: series_name(series)?,
            grouping: Grouping::Fixed(size),
        })
    }

    /// Group by the site's own volume numbers. Chapters without one stand alone.
    pub fn native(series: &str) -> Result<Self, BundleError> {
        Ok(Self {
            series: series_name(series)?,
            grouping: Grouping::Native,
        })
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn plan(&self, chapters: &[Chapter]) -> Vec<VolumePlan> {
        self.group(chapters.to_vec(), |c| c)
            .into_iter()
            .map(|(number, chapters)| {
                let ordinals: Vec<Ordinal> = chapters.iter().map(|c| c.ordinal).collect();
                let name = volume_name(&self.series, number, &ordinals);
                VolumePlan {
                    number,
                    file_stem: file_stem(&name),
                    name,
                    chapters,
                }
            })
            .collect()
    }

    /// Same grouping as [VolumeBundler::plan], over downloaded chapters.
    pub fn bundle(&self, fetched: Vec<FetchedChapter>) -> Vec<Volume> {
        self.group(fetched, |f| &f.chapter)
            .into_iter()
            .map(|(number, chapters)| {
                let ordinals: Vec<Ordinal> = chapters.iter().map(|c| c.chapter.ordinal).collect();
                let name = volume_name(&self.series, number, &ordinals);
                Volume {
                    series: self.series.clone(),
                    file_stem: file_stem(&name),
                    name,
                    chapters,
                }
            })
            .collect()
    }

    fn group<T>(&self, mut items: Vec<T>, chapter: impl Fn(&T) -> &Chapter) -> Vec<(u32, Vec<T>)> {
        items.sort_by(|a, b| chapter(a).ordinal.cmp(&chapter(b).ordinal));
        let mut groups: Vec<(u32, Vec<T>)> = Vec::new();
        let mut current: Option<u32> = None;
        for item in items {
            let volume = chapter(&item).volume;
            let (joins_last, number) = match self.grouping {
                Grouping::Fixed(size) => (
                    groups.last().is_some_and(|(_, g)| g.len() < size),
                    groups.len() as u32 + 1,
                ),
                Grouping::Native => (
                    volume.is_some() && volume == current,
                    volume.unwrap_or(0),
                ),
            };
            current = volume;
            match groups.last_mut() {
                Some((_, group)) if joins_last => group.push(item),
                _ => groups.push((number, vec![item])),
            }
        }
        groups
    }
}

/// Series name as used in volume names: `:` removed, surrounding whitespace trimmed.
fn series_name(series: &str) -> Result<String, BundleError> {
    let cleaned = series.replace(':', "").trim().to_string();
    if cleaned.is_empty() {
        return Err(BundleError::InvalidConfiguration {
            reason: "series name is empty".to_string(),
        });
    }
    Ok(cleaned)
}

/// `"{series} ch{a}"` for one chapter, `"{series} vol{k} ch{a}-{b}"` for more.
pub fn volume_name(series: &str, number: u32, ordinals: &[Ordinal]) -> String {
    match ordinals {
        [] => format!("{} vol{}", series, number),
        [only] => format!("{} ch{}", series, only),
        [first, .., last] => format!("{} vol{} ch{}-{}", series, number, first, last),
    }
}

/// Name with path-hostile and control characters removed.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .filter(|c| !PATH_HOSTILE.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::chapter;

    fn chapters(names: &[&str]) -> Vec<Chapter> {
        names.iter().map(|n| chapter(n)).collect()
    }

    fn names(plans: &[VolumePlan]) -> Vec<&str> {
        plans.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn bundle_size_three_over_six_chapters() -> Result<(), BundleError> {
        let bundler = VolumeBundler::new("Dragon Ball", 3)?;
        let plans = bundler.plan(&chapters(&["4", "1", "2", "3", "5", "6"]));
        assert_eq!(
            names(&plans),
            ["Dragon Ball vol1 ch1-3", "Dragon Ball vol2 ch4-6"]
        );
        assert_eq!(plans[1].ordinals(), vec![Ordinal::from(4), Ordinal::from(5), Ordinal::from(6)]);
        Ok(())
    }

    #[test]
    fn last_bundle_may_be_short_and_single_chapters_drop_volume() -> Result<(), BundleError> {
        let plans = VolumeBundler::new("DB", 2)?.plan(&chapters(&["1", "2", "2.5"]));
        assert_eq!(names(&plans), ["DB vol1 ch1-2", "DB ch2.5"]);

        let singles = VolumeBundler::new("DB", 1)?.plan(&chapters(&["9", "10"]));
        assert_eq!(names(&singles), ["DB ch9", "DB ch10"]);
        Ok(())
    }

    #[test]
    fn non_positive_bundle_size_is_rejected() {
        for size in [0, -3] {
            assert!(matches!(
                VolumeBundler::new("DB", size),
                Err(BundleError::InvalidConfiguration { .. })
            ));
        }
        assert!(VolumeBundler::new("  :  ", 1).is_err());
    }

    #[test]
    fn native_grouping_uses_site_volume_numbers() -> Result<(), BundleError> {
        let mut list = chapters(&["1", "2", "3", "4"]);
        list[0].volume = Some(1);
        list[1].volume = Some(1);
        list[2].volume = Some(2);
        let plans = VolumeBundler::native("DB")?.plan(&list);
        assert_eq!(names(&plans), ["DB vol1 ch1-2", "DB ch3", "DB ch4"]);
        assert_eq!(plans[1].number, 2);
        Ok(())
    }

    #[test]
    fn series_colon_removed_and_stem_sanitized() -> Result<(), BundleError> {
        let plans = VolumeBundler::new("Re:Zero / Side? \"A\"", 2)?.plan(&chapters(&["1", "2"]));
        assert_eq!(plans[0].name, "ReZero / Side? \"A\" vol1 ch1-2");
        assert_eq!(plans[0].file_stem, "ReZero  Side A vol1 ch1-2");
        Ok(())
    }

    #[test]
    fn bundle_matches_plan() -> Result<(), BundleError> {
        let bundler = VolumeBundler::new("DB", 2)?;
        let list = chapters(&["1", "2", "3"]);
        let fetched: Vec<FetchedChapter> = list
            .iter()
            .rev()
            .map(|c| FetchedChapter {
                chapter: c.clone(),
                pages: Vec::new(),
            })
            .collect();
        let volumes = bundler.bundle(fetched);
        let plans = bundler.plan(&list);
        assert_eq!(volumes.len(), plans.len());
        for (volume, plan) in volumes.iter().zip(&plans) {
            assert_eq!(volume.name, plan.name);
            assert_eq!(volume.file_stem, plan.file_stem);
            assert_eq!(volume.series, "DB");
        }
        assert_eq!(volumes[0].chapters[0].chapter.ordinal, Ordinal::from(1));
        Ok(())
    }
}
