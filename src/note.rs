//! Core data structures for the extranuts application.
//!
//! This module contains the `Note` type held by the note store and the
//! `NotePatch` used to edit one.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{SelectorId, Titled};

/// Title given to notes created without one
pub const UNTITLED_NOTE: &str = "Untitled Note";

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier for the note
    pub id: String,
    /// Note title
    pub title: String,
    /// Note content in Markdown format, may contain `[[wiki links]]`
    pub content: String,
    /// Category the note is filed under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    /// Selector the note is assigned to; absent when unassigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_id: Option<SelectorId>,
    /// Whether the note is pinned to the top of lists
    #[serde(default)]
    pub is_pinned: bool,
    /// Tags for organization
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the note was created
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new note with the given title and content
    pub fn new(title: String, content: String, tags: Vec<String>) -> Self {
        let now = Utc::now();
        let title = if title.trim().is_empty() {
            UNTITLED_NOTE.to_string()
        } else {
            title
        };

        Note {
            id: Uuid::new_v4().to_string(),
            title,
            content,
            category_id: None,
            selector_id: None,
            is_pinned: false,
            tags,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the note as modified now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Applies every field set in `patch`, bumping `updated_at`
    pub fn apply(&mut self, patch: NotePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(is_pinned) = patch.is_pinned {
            self.is_pinned = is_pinned;
        }
        self.touch();
    }
}

impl Titled for Note {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// A partial update to a note. `None` leaves the field untouched.
///
/// Selector assignment is not part of a patch; use `NoteStore::assign_selector`.
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the category
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

impl NotePatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Files the note under a category; `None` removes it from any
    pub fn category(mut self, category_id: Option<i64>) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn pinned(mut self, is_pinned: bool) -> Self {
        self.is_pinned = Some(is_pinned);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category_id.is_none()
            && self.tags.is_none()
            && self.is_pinned.is_none()
    }
}
