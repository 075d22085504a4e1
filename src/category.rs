//! Hierarchical categories notes can be filed under.
//!
//! Categories form a forest through `parent_id`. Removing a category takes
//! its whole subtree with it; notes filed anywhere in that subtree become
//! uncategorised (see `NoteStore::uncategorize`).
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{NutsError, Result};

/// Colour used when none is given
pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    /// `None` for a top-level category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// The user-supplied fields of a category, for create and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub color: String,
    pub parent_id: Option<i64>,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            parent_id: None,
        }
    }

    pub fn parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

impl From<&Category> for CategoryDraft {
    fn from(category: &Category) -> Self {
        Self {
            name: category.name.clone(),
            color: category.color.clone(),
            parent_id: category.parent_id,
        }
    }
}

/// A category with its subcategories, both levels sorted by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: Category,
    pub subcategories: Vec<CategoryNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryPreset {
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

const fn preset(
    name: &'static str,
    color: &'static str,
    description: &'static str,
) -> CategoryPreset {
    CategoryPreset {
        name,
        color,
        description,
    }
}

pub static CATEGORY_PRESETS: [CategoryPreset; 6] = [
    preset(
        "Projects",
        "#8B5CF6",
        "Creative projects and long-term planning",
    ),
    preset("Ideas", "#EC4899", "Brainstorming and creative inspiration"),
    preset("Research", "#06B6D4", "Research notes and data collection"),
    preset("Important", "#EF4444", "Urgent and critical information"),
    preset("Draft", "#F97316", "Work-in-progress and unfinished thoughts"),
    preset("Archive", "#6B7280", "Completed or stored items"),
];

/// Case-insensitive preset lookup
pub fn find_preset(name: &str) -> Option<&'static CategoryPreset> {
    let wanted = name.trim().to_lowercase();
    CATEGORY_PRESETS
        .iter()
        .find(|preset| preset.name.to_lowercase() == wanted)
}

fn invalid(message: impl Into<String>) -> NutsError {
    NutsError::InvalidCategory {
        message: message.into(),
    }
}

fn validate_color(color: &str) -> Result<()> {
    let hex = color
        .strip_prefix('#')
        .filter(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()));
    match hex {
        Some(_) => Ok(()),
        None => Err(invalid(format!(
            "colour must be in hex format (#RRGGBB), got '{}'",
            color
        ))),
    }
}

/// All categories, flat, with the hierarchy queries on top.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    categories: Vec<Category>,
    next_id: i64,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps categories loaded from a backend. Ids continue after the largest one.
    pub fn from_categories(categories: Vec<Category>) -> Self {
        let next_id = categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        debug!("Loaded {} categories", categories.len());
        Self {
            categories,
            next_id,
        }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    fn require(&self, id: i64) -> Result<&Category> {
        self.get(id).ok_or(NutsError::CategoryNotFound { id })
    }

    /// Every category, sorted by name
    pub fn all(&self) -> Vec<&Category> {
        let mut all: Vec<&Category> = self.categories.iter().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Direct subcategories of `id`, sorted by name
    pub fn children(&self, id: i64) -> Vec<&Category> {
        let mut children: Vec<&Category> = self
            .categories
            .iter()
            .filter(|c| c.parent_id == Some(id))
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// `id` followed by all of its descendants, breadth first.
    /// Empty when `id` is unknown.
    pub fn subtree_ids(&self, id: i64) -> Vec<i64> {
        if self.get(id).is_none() {
            return Vec::new();
        }
        let mut ids = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            // a corrupt file could hold a cycle
            if ids.contains(&current) {
                continue;
            }
            ids.push(current);
            queue.extend(self.children(current).iter().map(|c| c.id));
        }
        ids
    }

    /// Names from the root down to `id`, joined with " / "
    pub fn path_label(&self, id: i64) -> Option<String> {
        let mut names = Vec::new();
        let mut current = self.get(id);
        while let Some(category) = current {
            if names.len() > self.categories.len() {
                break;
            }
            names.push(category.name.as_str());
            current = category.parent_id.and_then(|parent| self.get(parent));
        }
        if names.is_empty() {
            return None;
        }
        names.reverse();
        Some(names.join(" / "))
    }

    /// Top-level categories with their subtrees.
    ///
    /// A category whose parent is missing is shown at the top level.
    pub fn hierarchy(&self) -> Vec<CategoryNode> {
        let mut roots: Vec<&Category> = self
            .categories
            .iter()
            .filter(|c| c.parent_id.is_none_or(|parent| self.get(parent).is_none()))
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name));

        let mut seen = Vec::new();
        roots
            .into_iter()
            .map(|root| self.node(root, &mut seen))
            .collect()
    }

    fn node(&self, category: &Category, seen: &mut Vec<i64>) -> CategoryNode {
        seen.push(category.id);
        let subcategories = self
            .children(category.id)
            .into_iter()
            .filter(|child| !seen.contains(&child.id))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|child| self.node(child, seen))
            .collect();
        CategoryNode {
            category: category.clone(),
            subcategories,
        }
    }

    /// Checks name, colour, parent and sibling uniqueness. `id` is the
    /// category being updated, if any.
    fn validate(&self, draft: &CategoryDraft, id: Option<i64>) -> Result<CategoryDraft> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(invalid("category name cannot be empty"));
        }
        validate_color(&draft.color)?;

        if let Some(parent_id) = draft.parent_id {
            self.require(parent_id)?;
            if let Some(id) = id {
                if self.subtree_ids(id).contains(&parent_id) {
                    return Err(invalid(
                        "a category cannot be moved under itself or its subcategories",
                    ));
                }
            }
        }

        let taken = self.categories.iter().any(|c| {
            Some(c.id) != id && c.parent_id == draft.parent_id && c.name == name
        });
        if taken {
            return Err(invalid(format!(
                "a category named '{}' already exists there",
                name
            )));
        }

        Ok(CategoryDraft {
            name: name.to_string(),
            color: draft.color.clone(),
            parent_id: draft.parent_id,
        })
    }

    pub fn create(&mut self, draft: CategoryDraft) -> Result<Category> {
        let draft = self.validate(&draft, None)?;
        let category = Category {
            id: self.next_id.max(1),
            name: draft.name,
            color: draft.color,
            parent_id: draft.parent_id,
            created_at: Utc::now(),
        };
        self.next_id = category.id + 1;
        self.categories.push(category.clone());
        info!("Created category {} '{}'", category.id, category.name);
        Ok(category)
    }

    pub fn create_from_preset(&mut self, preset_name: &str) -> Result<Category> {
        let preset = find_preset(preset_name)
            .ok_or_else(|| invalid(format!("no preset named '{}'", preset_name)))?;
        self.create(CategoryDraft::new(preset.name, preset.color))
    }

    /// Replaces name, colour and parent; `created_at` is kept
    pub fn update(&mut self, id: i64, draft: CategoryDraft) -> Result<Category> {
        self.require(id)?;
        let draft = self.validate(&draft, Some(id))?;
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(NutsError::CategoryNotFound { id })?;
        category.name = draft.name;
        category.color = draft.color;
        category.parent_id = draft.parent_id;
        debug!("Updated category {}", id);
        Ok(category.clone())
    }

    /// Removes `id` and its subcategories, returning everything removed
    pub fn remove(&mut self, id: i64) -> Result<Vec<Category>> {
        self.require(id)?;
        let ids = self.subtree_ids(id);
        let (removed, kept): (Vec<Category>, Vec<Category>) = self
            .categories
            .drain(..)
            .partition(|c| ids.contains(&c.id));
        self.categories = kept;
        if removed.len() > 1 {
            warn!(
                "Removing category {} also removed {} subcategories",
                id,
                removed.len() - 1
            );
        }
        info!("Removed category {}", id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn draft(name: &str) -> CategoryDraft {
        CategoryDraft::new(name, "#112233")
    }

    fn sample() -> (CategoryTree, i64, i64, i64) {
        let mut tree = CategoryTree::new();
        let work = tree.create(draft("Work")).unwrap().id;
        let rust = tree.create(draft("Rust").parent(Some(work))).unwrap().id;
        let async_ = tree.create(draft("Async").parent(Some(rust))).unwrap().id;
        tree.create(draft("Home")).unwrap();
        (tree, work, rust, async_)
    }

    #[test]
    fn hierarchy_nests_and_sorts_by_name() {
        let (mut tree, work, _, _) = sample();
        tree.create(draft("Admin").parent(Some(work))).unwrap();

        let roots = tree.hierarchy();
        let names: Vec<&str> = roots.iter().map(|n| n.category.name.as_str()).collect();
        assert_eq!(names, vec!["Home", "Work"]);

        let work_node = &roots[1];
        let children: Vec<&str> = work_node
            .subcategories
            .iter()
            .map(|n| n.category.name.as_str())
            .collect();
        assert_eq!(children, vec!["Admin", "Rust"]);
        assert_eq!(work_node.subcategories[1].subcategories[0].category.name, "Async");
    }

    #[test]
    fn subtree_and_path() {
        let (tree, work, rust, async_) = sample();
        assert_eq!(tree.subtree_ids(work), vec![work, rust, async_]);
        assert_eq!(tree.subtree_ids(async_), vec![async_]);
        assert!(tree.subtree_ids(999).is_empty());
        assert_eq!(tree.path_label(async_).unwrap(), "Work / Rust / Async");
        assert_eq!(tree.path_label(999), None);
    }

    #[test]
    fn remove_takes_the_subtree() {
        let (mut tree, work, rust, async_) = sample();
        let removed: Vec<i64> = tree.remove(rust).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&rust) && removed.contains(&async_));
        assert_eq!(tree.len(), 2);
        assert!(tree.children(work).is_empty());
        assert!(matches!(
            tree.remove(rust),
            Err(NutsError::CategoryNotFound { .. })
        ));
    }

    #[test]
    fn validation_rejects_bad_input() {
        let (mut tree, work, rust, async_) = sample();
        assert!(matches!(
            tree.create(draft("   ")),
            Err(NutsError::InvalidCategory { .. })
        ));
        for color in ["112233", "#12345", "#12345g", "#1122334"] {
            assert!(tree.create(CategoryDraft::new("X", color)).is_err());
        }
        assert!(matches!(
            tree.create(draft("Orphan").parent(Some(999))),
            Err(NutsError::CategoryNotFound { id: 999 })
        ));
        // same name is fine under a different parent only
        assert!(tree.create(draft("Work")).is_err());
        assert!(tree.create(draft("Work").parent(Some(work))).is_ok());
        // no cycles
        assert!(tree.update(work, draft("Work").parent(Some(async_))).is_err());
        assert!(tree.update(rust, draft("Rust").parent(Some(rust))).is_err());
    }

    #[test]
    fn update_moves_and_keeps_creation_time() {
        let (mut tree, _, rust, _) = sample();
        let before = tree.get(rust).unwrap().clone();
        let updated = tree
            .update(rust, CategoryDraft::new(" Rustlang ", "#abcdef"))
            .unwrap();
        assert_eq!(updated.name, "Rustlang");
        assert_eq!(updated.parent_id, None);
        assert_eq!(updated.created_at, before.created_at);
        assert_eq!(tree.hierarchy().len(), 3);
    }

    #[test]
    fn ids_continue_after_loaded_ones() {
        let (tree, _, _, _) = sample();
        let mut loaded = CategoryTree::from_categories(tree.all().into_iter().cloned().collect());
        assert_eq!(loaded.create(draft("New")).unwrap().id, 5);
    }

    #[test]
    fn presets() {
        let mut tree = CategoryTree::new();
        assert_eq!(find_preset("ideas").unwrap().color, "#EC4899");
        let archive = tree.create_from_preset("Archive").unwrap();
        assert_eq!(archive.color, DEFAULT_CATEGORY_COLOR);
        assert!(tree.create_from_preset("Archive").is_err());
        assert!(tree.create_from_preset("Nope").is_err());
    }

    #[test]
    fn orphans_show_at_the_top_level() {
        let now = Utc::now();
        let tree = CategoryTree::from_categories(vec![Category {
            id: 7,
            name: "Lost".into(),
            color: "#000000".into(),
            parent_id: Some(3),
            created_at: now,
        }]);
        assert_eq!(tree.hierarchy()[0].category.id, 7);
    }
}
