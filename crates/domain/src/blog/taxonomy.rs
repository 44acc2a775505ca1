use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{BlogCategoryId, TagId};
use serde::{Deserialize, Serialize};

use super::{BlogError, validated_text};
use crate::slug::Slug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogCategoryDetails {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogCategory {
    pub id: BlogCategoryId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl BlogCategory {
    pub fn create(details: BlogCategoryDetails, now: DateTime<Utc>) -> Result<Self, BlogError> {
        let name = validated_text("name", &details.name, 2, 100)?;
        let slug = Slug::explicit_or_derived(details.slug.as_deref(), &name)?;
        Ok(Self {
            id: BlogCategoryId::new(),
            name,
            slug,
            description: details.description.trim().to_string(),
            is_deleted: false,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub slug: Slug,
}

impl Tag {
    pub fn new(name: &str) -> Result<Self, BlogError> {
        let name = name.trim();
        let slug =
            Slug::from_title(name).map_err(|_| BlogError::InvalidTagName(name.to_string()))?;
        Ok(Self {
            id: TagId::new(),
            name: name.to_string(),
            slug,
        })
    }
}

/// Trims tag names, drops blanks and collapses names that share a slug.
/// Returns `(slug, name)` pairs sorted by slug; the first spelling wins.
pub fn normalize_tag_names(names: &[String]) -> Result<Vec<(Slug, String)>, BlogError> {
    let mut by_slug: BTreeMap<Slug, String> = BTreeMap::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name.chars().count() > 50 {
            return Err(BlogError::InvalidTagName(name.to_string()));
        }
        let slug =
            Slug::from_title(name).map_err(|_| BlogError::InvalidTagName(name.to_string()))?;
        by_slug.entry(slug).or_insert_with(|| name.to_string());
    }
    Ok(by_slug.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_deduplicated_by_slug() {
        let names = vec![
            "Rust".to_string(),
            " rust ".to_string(),
            String::new(),
            "Web Dev".to_string(),
        ];
        let tags = normalize_tag_names(&names).unwrap();
        let slugs: Vec<&str> = tags.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(slugs, vec!["rust", "web-dev"]);
        assert_eq!(tags[0].1, "Rust");
    }

    #[test]
    fn unsluggable_tag_is_rejected() {
        let names = vec!["!!!".to_string()];
        assert_eq!(
            normalize_tag_names(&names),
            Err(BlogError::InvalidTagName("!!!".to_string()))
        );
    }

    #[test]
    fn category_slug_is_derived() {
        let category = BlogCategory::create(
            BlogCategoryDetails {
                name: "Release Notes".to_string(),
                ..BlogCategoryDetails::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(category.slug.as_str(), "release-notes");
    }
}
