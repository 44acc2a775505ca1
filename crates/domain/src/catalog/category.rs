//! Hierarchical catalog categories.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::CategoryId;
use serde::{Deserialize, Serialize};

use super::{CatalogError, validated_text};
use crate::seo::SeoMetadata;
use crate::slug::Slug;

/// Editable fields of a category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryDetails {
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub seo: SeoMetadata,
}

/// A catalog category. Categories form a forest through `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub sort_order: i32,
    pub seo: SeoMetadata,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn create(details: CategoryDetails, now: DateTime<Utc>) -> Result<Self, CatalogError> {
        let name = validated_text("name", &details.name, 2, 100)?;
        let slug = Slug::explicit_or_derived(details.slug.as_deref(), &name)?;

        Ok(Self {
            id: CategoryId::new(),
            parent_id: details.parent_id,
            name,
            slug,
            description: details.description.trim().to_string(),
            sort_order: details.sort_order,
            seo: details.seo.normalized()?,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies new details. Returns the previous slug if it changed.
    ///
    /// `new_parent_lineage` is the new parent followed by all of its
    /// ancestors; it is used to reject cycles.
    pub fn update(
        &mut self,
        details: CategoryDetails,
        new_parent_lineage: &[CategoryId],
        now: DateTime<Utc>,
    ) -> Result<Option<Slug>, CatalogError> {
        if details.parent_id == Some(self.id) || new_parent_lineage.contains(&self.id) {
            return Err(CatalogError::CategoryCycle(self.id));
        }

        let name = validated_text("name", &details.name, 2, 100)?;
        let slug = Slug::explicit_or_derived(details.slug.as_deref(), &name)?;
        let seo = details.seo.normalized()?;

        let previous = (slug != self.slug).then(|| self.slug.clone());

        self.parent_id = details.parent_id;
        self.name = name;
        self.slug = slug;
        self.description = details.description.trim().to_string();
        self.sort_order = details.sort_order;
        self.seo = seo;
        self.updated_at = now;

        Ok(previous)
    }

    /// Marks the category deleted. Callers report whether it still has live
    /// children or courses.
    pub fn soft_delete(&mut self, in_use: bool, now: DateTime<Utc>) -> Result<(), CatalogError> {
        if in_use {
            return Err(CatalogError::CategoryInUse(self.id));
        }
        self.is_deleted = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn path(&self) -> String {
        format!("/categories/{}", self.slug)
    }
}

/// A category with its children, for tree rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryNode>,
}

/// Builds the category forest. Deleted categories are skipped together with
/// their subtrees, and orphans (whose parent is missing) become roots.
pub fn build_tree(categories: Vec<Category>) -> Vec<CategoryNode> {
    let known: std::collections::HashSet<CategoryId> = categories.iter().map(|c| c.id).collect();

    // Children of a deleted category stay keyed under it and are never reached.
    let mut by_parent: HashMap<Option<CategoryId>, Vec<Category>> = HashMap::new();
    for category in categories.into_iter().filter(|c| !c.is_deleted) {
        let parent = category.parent_id.filter(|p| known.contains(p));
        by_parent.entry(parent).or_default().push(category);
    }

    fn attach(
        parent: Option<CategoryId>,
        by_parent: &mut HashMap<Option<CategoryId>, Vec<Category>>,
    ) -> Vec<CategoryNode> {
        let mut children = by_parent.remove(&parent).unwrap_or_default();
        children.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        children
            .into_iter()
            .map(|category| {
                let children = attach(Some(category.id), by_parent);
                CategoryNode { category, children }
            })
            .collect()
    }

    attach(None, &mut by_parent)
}

/// Returns `root` and every live descendant of it.
pub fn descendant_ids(categories: &[Category], root: CategoryId) -> Vec<CategoryId> {
    let mut result = vec![root];
    let mut frontier = vec![root];

    while let Some(current) = frontier.pop() {
        for child in categories
            .iter()
            .filter(|c| !c.is_deleted && c.parent_id == Some(current))
        {
            if !result.contains(&child.id) {
                result.push(child.id);
                frontier.push(child.id);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, parent: Option<CategoryId>, sort_order: i32) -> Category {
        Category::create(
            CategoryDetails {
                parent_id: parent,
                name: name.to_string(),
                sort_order,
                ..CategoryDetails::default()
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_derives_slug() {
        let c = category("Web Development", None, 0);
        assert_eq!(c.slug.as_str(), "web-development");
        assert_eq!(c.path(), "/categories/web-development");
    }

    #[test]
    fn name_length_is_validated() {
        let result = Category::create(
            CategoryDetails {
                name: "x".to_string(),
                ..CategoryDetails::default()
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(CatalogError::InvalidLength { .. })));
    }

    #[test]
    fn update_reports_previous_slug() {
        let mut c = category("Programming", None, 0);
        let previous = c
            .update(
                CategoryDetails {
                    name: "Software Engineering".to_string(),
                    ..CategoryDetails::default()
                },
                &[],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(previous.unwrap().as_str(), "programming");
        assert_eq!(c.slug.as_str(), "software-engineering");
    }

    #[test]
    fn update_rejects_cycles() {
        let mut root = category("Root", None, 0);
        let child = category("Child", Some(root.id), 0);
        let result = root.update(
            CategoryDetails {
                parent_id: Some(child.id),
                name: "Root".to_string(),
                ..CategoryDetails::default()
            },
            &[child.id, root.id],
            Utc::now(),
        );
        assert_eq!(result, Err(CatalogError::CategoryCycle(root.id)));
    }

    #[test]
    fn delete_in_use_is_rejected() {
        let mut c = category("Design", None, 0);
        assert!(c.soft_delete(true, Utc::now()).is_err());
        c.soft_delete(false, Utc::now()).unwrap();
        assert!(c.is_deleted);
    }

    #[test]
    fn tree_is_nested_and_ordered() {
        let root = category("Root", None, 0);
        let b = category("Bravo", Some(root.id), 1);
        let a = category("Alpha", Some(root.id), 1);
        let first = category("Zulu", Some(root.id), 0);
        let grandchild = category("Leaf", Some(a.id), 0);

        let tree = build_tree(vec![
            b.clone(),
            grandchild.clone(),
            root.clone(),
            a.clone(),
            first.clone(),
        ]);

        assert_eq!(tree.len(), 1);
        let names: Vec<&str> = tree[0]
            .children
            .iter()
            .map(|n| n.category.name.as_str())
            .collect();
        assert_eq!(names, vec!["Zulu", "Alpha", "Bravo"]);
        assert_eq!(tree[0].children[1].children[0].category.id, grandchild.id);
    }

    #[test]
    fn deleted_subtrees_are_hidden() {
        let root = category("Root", None, 0);
        let mut hidden = category("Hidden", Some(root.id), 0);
        hidden.is_deleted = true;

        let tree = build_tree(vec![root, hidden]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn descendants_include_root_and_grandchildren() {
        let root = category("Root", None, 0);
        let child = category("Child", Some(root.id), 0);
        let grandchild = category("Grandchild", Some(child.id), 0);
        let other = category("Other", None, 0);

        let all = vec![root.clone(), child.clone(), grandchild.clone(), other.clone()];
        let ids = descendant_ids(&all, root.id);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&grandchild.id));
        assert!(!ids.contains(&other.id));
    }
}
