use std::collections::BTreeSet;

use imgdb_types::{split_tags, ImageRecord};
use serde::{Deserialize, Serialize};

/// In-memory filter over catalog rows.
///
/// Each prompt filter is a comma-separated tag list. A row matches an include
/// filter when any filter tag equals one of the row's tags; an exclude filter
/// rejects such rows. All set filters must pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
    pub include_prompt: Option<String>,
    pub include_negative_prompt: Option<String>,
    pub exclude_prompt: Option<String>,
    pub exclude_negative_prompt: Option<String>,
    pub labeled: Option<bool>,
}

impl CatalogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_prompt(mut self, tags: impl Into<String>) -> Self {
        self.include_prompt = Some(tags.into());
        self
    }

    pub fn include_negative_prompt(mut self, tags: impl Into<String>) -> Self {
        self.include_negative_prompt = Some(tags.into());
        self
    }

    pub fn exclude_prompt(mut self, tags: impl Into<String>) -> Self {
        self.exclude_prompt = Some(tags.into());
        self
    }

    pub fn exclude_negative_prompt(mut self, tags: impl Into<String>) -> Self {
        self.exclude_negative_prompt = Some(tags.into());
        self
    }

    pub fn labeled(mut self, labeled: bool) -> Self {
        self.labeled = Some(labeled);
        self
    }

    pub fn matches(&self, record: &ImageRecord) -> bool {
        let prompt = &record.prompt;
        let negative = &record.negative_prompt;
        passes(&self.include_prompt, prompt, true)
            && passes(&self.include_negative_prompt, negative, true)
            && passes(&self.exclude_prompt, prompt, false)
            && passes(&self.exclude_negative_prompt, negative, false)
            && self.labeled.map_or(true, |l| record.labeled == l)
    }

    /// Matching rows, in catalog order.
    pub fn apply<'a>(&self, records: &'a [ImageRecord]) -> Vec<&'a ImageRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// An empty filter string is treated as unset.
fn passes(filter: &Option<String>, prompt: &str, include: bool) -> bool {
    match filter.as_deref().filter(|f| !f.trim().is_empty()) {
        None => true,
        Some(filter) => {
            let hit = split_tags(filter).any(|wanted| split_tags(prompt).any(|tag| tag == wanted));
            hit == include
        }
    }
}

/// Distinct prompt tags across the catalog.
pub fn collect_tags(records: &[ImageRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.prompt_tags())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::{GenerationParams, Identity};

    fn record(n: u8, prompt: &str, negative: &str, labeled: bool) -> ImageRecord {
        let mut r = ImageRecord::new(
            Identity::from_parts([n; 16], [n; 32]),
            GenerationParams::new(n as i64, prompt, negative, 8, 8, 1, 1.0),
        );
        r.labeled = labeled;
        r
    }

    fn catalog() -> Vec<ImageRecord> {
        vec![
            record(1, "cat, orange", "blurry", false),
            record(2, "dog", "blurry, lowres", true),
            record(3, "cat, black", "", true),
        ]
    }

    fn seeds(rows: Vec<&ImageRecord>) -> Vec<i64> {
        rows.iter().map(|r| r.seed).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(seeds(CatalogFilter::new().apply(&catalog())), vec![1, 2, 3]);
    }

    #[test]
    fn include_prompt_matches_any_tag() {
        let rows = catalog();
        let f = CatalogFilter::new().include_prompt("orange,dog");
        assert_eq!(seeds(f.apply(&rows)), vec![1, 2]);
    }

    #[test]
    fn include_matches_whole_tags_only() {
        let rows = catalog();
        let f = CatalogFilter::new().include_prompt("ca");
        assert!(f.apply(&rows).is_empty());
    }

    #[test]
    fn exclude_prompt_rejects_any_tag() {
        let rows = catalog();
        let f = CatalogFilter::new().exclude_prompt("cat");
        assert_eq!(seeds(f.apply(&rows)), vec![2]);
    }

    #[test]
    fn negative_prompt_filters() {
        let rows = catalog();
        let f = CatalogFilter::new().include_negative_prompt("lowres");
        assert_eq!(seeds(f.apply(&rows)), vec![2]);
        let f = CatalogFilter::new().exclude_negative_prompt("blurry");
        assert_eq!(seeds(f.apply(&rows)), vec![3]);
    }

    #[test]
    fn labeled_flag_and_combination() {
        let rows = catalog();
        let f = CatalogFilter::new().labeled(true);
        assert_eq!(seeds(f.apply(&rows)), vec![2, 3]);
        let f = CatalogFilter::new().labeled(true).include_prompt("cat");
        assert_eq!(seeds(f.apply(&rows)), vec![3]);
    }

    #[test]
    fn blank_filter_is_unset() {
        let rows = catalog();
        let f = CatalogFilter::new().include_prompt("  ");
        assert_eq!(f.apply(&rows).len(), 3);
    }

    #[test]
    fn tags_are_distinct_and_sorted() {
        let tags: Vec<String> = collect_tags(&catalog()).into_iter().collect();
        assert_eq!(tags, vec!["black", "cat", "dog", "orange"]);
    }
}
