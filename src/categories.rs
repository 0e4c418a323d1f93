//! Two-level category catalog and the per-user selector over it.
//!
//! The catalog is static; a [`CategorySelector`] only tracks which leaf the
//! user last picked and knows nothing about chat sessions.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CategoryError {
    #[error("unknown main category: {0}")]
    UnknownMain(String),
    #[error("category catalog is empty")]
    EmptyCatalog,
    #[error("main category {0} has no sub-categories")]
    EmptyMain(&'static str),
}

/// A main category and its ordered, non-empty sub-categories.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Category {
    pub name: &'static str,
    pub subcategories: &'static [&'static str],
}

pub static CATEGORIES: &[Category] = &[
    Category {
        name: "정통운세",
        subcategories: &["월간 종합운세", "평생운세", "2026년 신토정비결", "2026 부자되기"],
    },
    Category {
        name: "생활운세",
        subcategories: &["오늘의 운세", "주간 종합운세", "프리미엄 로또운세"],
    },
    Category {
        name: "애정/궁합",
        subcategories: &["내사랑 반쪽찾기", "내 운명의 배우자", "프리미엄 궁합"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub main: String,
    pub sub: String,
}

impl Selection {
    pub fn new(main: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            sub: sub.into(),
        }
    }
}

/// Read-only view over a category table.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    categories: &'static [Category],
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            categories: CATEGORIES,
        }
    }
}

impl Catalog {
    /// Rejects tables with no categories or with a category that has no sub-categories.
    pub fn new(categories: &'static [Category]) -> Result<Self, CategoryError> {
        if categories.is_empty() {
            return Err(CategoryError::EmptyCatalog);
        }
        if let Some(empty) = categories.iter().find(|c| c.subcategories.is_empty()) {
            return Err(CategoryError::EmptyMain(empty.name));
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &'static [Category] {
        self.categories
    }

    pub fn main_names(&self) -> impl Iterator<Item = &'static str> {
        self.categories.iter().map(|c| c.name)
    }

    pub fn find(&self, main: &str) -> Option<&'static Category> {
        self.categories.iter().find(|c| c.name == main)
    }

    pub fn subcategories(&self, main: &str) -> Option<&'static [&'static str]> {
        self.find(main).map(|c| c.subcategories)
    }

    pub fn default_selection(&self) -> Selection {
        let first = &self.categories[0];
        Selection::new(first.name, first.subcategories[0])
    }
}

/// Tracks the user's latest choice, always within the catalog.
#[derive(Debug, Clone)]
pub struct CategorySelector {
    catalog: Catalog,
    current: Selection,
}

impl CategorySelector {
    pub fn new(catalog: Catalog) -> Self {
        let current = catalog.default_selection();
        Self { catalog, current }
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    pub fn current_selection(&self) -> Selection {
        self.current.clone()
    }

    /// Sub-categories offered for the currently selected main category.
    pub fn current_subcategories(&self) -> &'static [&'static str] {
        self.catalog
            .subcategories(&self.current.main)
            .unwrap_or(&[])
    }

    /// Moves the selection. An unknown main category is rejected; a missing or
    /// unknown sub-category falls back to the first one under `main`.
    pub fn select(&mut self, main: &str, sub: Option<&str>) -> Result<Selection, CategoryError> {
        let category = self
            .catalog
            .find(main)
            .ok_or_else(|| CategoryError::UnknownMain(main.to_string()))?;

        let sub = sub
            .and_then(|wanted| category.subcategories.iter().find(|s| **s == wanted))
            .copied()
            .unwrap_or(category.subcategories[0]);

        self.current = Selection::new(category.name, sub);
        Ok(self.current.clone())
    }
}

impl Default for CategorySelector {
    fn default() -> Self {
        Self::new(Catalog::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selection_is_first_leaf() {
        let selector = CategorySelector::default();
        assert_eq!(selector.current_selection(), Selection::new("정통운세", "월간 종합운세"));
    }

    #[test]
    fn test_select_known_pair() {
        let mut selector = CategorySelector::default();
        let selection = selector.select("생활운세", Some("오늘의 운세")).unwrap();
        assert_eq!(selection, Selection::new("생활운세", "오늘의 운세"));
        assert_eq!(selector.current_selection(), selection);
        assert_eq!(selector.current_subcategories().len(), 3);
    }

    #[test]
    fn test_select_main_only_falls_back_to_first_sub() {
        let mut selector = CategorySelector::default();
        let selection = selector.select("애정/궁합", None).unwrap();
        assert_eq!(selection.sub, "내사랑 반쪽찾기");
    }

    #[test]
    fn test_select_sub_from_other_main_falls_back() {
        let mut selector = CategorySelector::default();
        let selection = selector.select("생활운세", Some("평생운세")).unwrap();
        assert_eq!(selection, Selection::new("생활운세", "오늘의 운세"));
    }

    #[test]
    fn test_unknown_main_keeps_previous_selection() {
        let mut selector = CategorySelector::default();
        selector.select("생활운세", Some("주간 종합운세")).unwrap();
        let err = selector.select("타로", None).unwrap_err();
        assert_eq!(err, CategoryError::UnknownMain("타로".to_string()));
        assert_eq!(selector.current_selection(), Selection::new("생활운세", "주간 종합운세"));
    }

    #[test]
    fn test_catalog_rejects_empty_tables() {
        assert_eq!(Catalog::new(&[]).unwrap_err(), CategoryError::EmptyCatalog);

        static HOLLOW: &[Category] = &[
            Category {
                name: "정통운세",
                subcategories: &["평생운세"],
            },
            Category {
                name: "타로",
                subcategories: &[],
            },
        ];
        assert_eq!(Catalog::new(HOLLOW).unwrap_err(), CategoryError::EmptyMain("타로"));
    }

    #[test]
    fn test_builtin_table_passes_validation() {
        let catalog = Catalog::new(CATEGORIES).unwrap();
        assert_eq!(catalog.default_selection(), Catalog::default().default_selection());
    }

    #[test]
    fn test_catalog_labels_are_unique_within_scope() {
        let catalog = Catalog::default();
        let mains: Vec<_> = catalog.main_names().collect();
        let mut deduped = mains.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(mains.len(), deduped.len());
        for category in catalog.categories() {
            let mut subs = category.subcategories.to_vec();
            subs.sort();
            subs.dedup();
            assert_eq!(subs.len(), category.subcategories.len());
        }
    }
}
