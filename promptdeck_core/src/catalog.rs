use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub chapter: String,
    pub prompt: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog JSON is invalid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("duplicate prompt id {0} in catalog")]
    DuplicateId(u32),
}

/// Ordered, immutable collection of prompt templates.
#[derive(Debug, Clone)]
pub struct Catalog {
    prompts: Vec<PromptRecord>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let prompts: Vec<PromptRecord> = serde_json::from_str(raw)?;
        Self::new(prompts)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn new(prompts: Vec<PromptRecord>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for p in &prompts {
            if !seen.insert(p.id) {
                return Err(CatalogError::DuplicateId(p.id));
            }
        }
        Ok(Self { prompts })
    }

    pub fn prompts(&self) -> &[PromptRecord] {
        &self.prompts
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&PromptRecord> {
        self.prompts.iter().find(|p| p.id == id)
    }

    pub fn position(&self, id: u32) -> Option<usize> {
        self.prompts.iter().position(|p| p.id == id)
    }

    pub fn find_by_title(&self, title: &str) -> Option<&PromptRecord> {
        self.prompts.iter().find(|p| p.title == title)
    }

    /// Lenient title lookup for model-produced text: case-insensitive,
    /// either side may contain the other. A fragment shorter than
    /// `MIN_FRAGMENT_CHARS` only matches a title exactly.
    pub fn fuzzy_find_title(&self, title: &str) -> Option<&PromptRecord> {
        let needle = normalize_title(title);
        if needle.is_empty() {
            return None;
        }
        let long_enough = needle.chars().count() >= MIN_FRAGMENT_CHARS;
        self.prompts.iter().find(|p| {
            let candidate = normalize_title(&p.title);
            candidate == needle
                || (long_enough && candidate.contains(&needle))
                || needle.contains(&candidate)
        })
    }
}

const MIN_FRAGMENT_CHARS: usize = 4;

fn normalize_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads_in_order_with_unique_ids() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.len(), 15);
        let ids: Vec<u32> = catalog.prompts().iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>());
        assert_eq!(
            catalog.get(2).map(|p| p.title.as_str()),
            Some("Improve Class Slides")
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"[
            {"id": 1, "title": "A", "prompt": "a"},
            {"id": 1, "title": "B", "prompt": "b"}
        ]"#;
        assert!(matches!(
            Catalog::from_json(raw),
            Err(CatalogError::DuplicateId(1))
        ));
    }

    #[test]
    fn fuzzy_title_matches_partial_and_decorated_names() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(
            catalog.fuzzy_find_title("**create diagnostic quiz**").map(|p| p.id),
            Some(6)
        );
        assert_eq!(
            catalog
                .fuzzy_find_title("Student Reflection Coach for teams")
                .map(|p| p.id),
            Some(13)
        );
        assert!(catalog.fuzzy_find_title("Knitting Patterns").is_none());
        assert!(catalog.fuzzy_find_title("  ").is_none());
    }

    #[test]
    fn fuzzy_title_ignores_tiny_fragments() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.fuzzy_find_title("a").is_none());
        assert!(catalog.fuzzy_find_title("\"Quiz\"").is_some());
        assert!(catalog.fuzzy_find_title("of").is_none());
    }

    #[test]
    fn exact_title_lookup_is_case_sensitive() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.find_by_title("Design Class Plan").is_some());
        assert!(catalog.find_by_title("design class plan").is_none());
    }
}
