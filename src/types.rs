//! Shared types for the extranuts application.
//!
//! The crate-wide `Result` alias, the minimal note view the wiki-link engine
//! works on, and the CLI subcommands.
use std::path::PathBuf;

use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::{NutsError, SelectorId, DEFAULT_CATEGORY_COLOR};

/// A specialized Result type for extranuts operations.
pub type Result<T> = std::result::Result<T, NutsError>;

/// Anything with an id and a title can be linked to and completed.
pub trait Titled {
    fn id(&self) -> &str;
    fn title(&self) -> &str;
}

/// The `{id, title}` pair the wiki-link engine resolves against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRef {
    pub id: String,
    pub title: String,
}

impl NoteRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

impl Titled for NoteRef {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Available subcommands for the extranuts application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    New {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: String,

        /// Content of the note, can contain [[wiki links]]
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Selector (1-100) to assign the note to
        #[clap(short, long)]
        selector: Option<SelectorId>,

        /// Category ID to file the note under
        #[clap(long)]
        category: Option<i64>,
    },

    /// List notes with optional filtering
    List {
        /// Only notes assigned to this selector
        #[clap(short, long)]
        selector: Option<SelectorId>,

        /// Only notes filed under this category or its subcategories
        #[clap(long)]
        category: Option<i64>,

        /// Only pinned notes
        #[clap(short, long)]
        pinned: bool,

        /// Substring filter over title, content and tags
        #[clap(short, long)]
        filter: Option<String>,

        /// Limit the number of notes returned
        #[clap(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Show a note by ID
    Show {
        /// ID of the note to show
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Edit an existing note
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Path to a file containing the new note content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Category ID to file the note under
        #[clap(long, conflicts_with = "no_category")]
        category: Option<i64>,

        /// Remove the note from its category
        #[clap(long)]
        no_category: bool,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Toggle the pin state of a note
    Pin {
        /// ID of the note
        id: String,
    },

    /// Fuzzy search notes by title and content
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// List the wiki links of a note and whether their targets exist
    Links {
        /// ID of the note
        id: String,

        /// Print the content with links substituted
        #[clap(short, long)]
        render: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Follow a wiki link from a note to its target
    Follow {
        /// ID of the note holding the link
        id: String,

        /// Link target title
        title: String,
    },

    /// Suggest note titles for a partial link target
    Complete {
        /// What has been typed after [[
        input: String,

        /// Maximum number of suggestions (defaults to the configured limit)
        #[clap(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Report the wiki link under a cursor position and suggest targets
    Cursor {
        /// ID of the note being edited
        id: String,

        /// Byte offset of the cursor in the note content
        position: usize,
    },

    /// Show a group of selectors with their colours and note counts
    Selectors {
        /// Group to show (0-9), defaults to the first
        #[clap(short, long, default_value_t = 0)]
        group: i64,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Activate a selector and list the notes assigned to it
    Select {
        /// Selector number (1-100)
        id: SelectorId,
    },

    /// Assign a note to a selector, or clear its assignment
    Assign {
        /// ID of the note
        note_id: String,

        /// Selector number (1-100)
        #[clap(required_unless_present = "clear")]
        selector: Option<SelectorId>,

        /// Remove the note's selector assignment
        #[clap(long, conflicts_with = "selector")]
        clear: bool,
    },

    /// Rename a selector
    Rename {
        /// Selector number (1-100)
        id: SelectorId,

        /// New name; an empty string clears it
        name: String,
    },

    /// Manage note categories (lists the tree by default)
    Categories {
        #[clap(subcommand)]
        action: Option<CategoryCommand>,
    },
}

/// Category subcommands
#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// Show the category tree with note counts
    List {
        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Create a category
    Add {
        /// Category name, unique among its siblings
        name: String,

        /// Colour as #RRGGBB
        #[clap(long, default_value = DEFAULT_CATEGORY_COLOR)]
        color: String,

        /// ID of the parent category
        #[clap(short, long)]
        parent: Option<i64>,
    },

    /// Change the name, colour or parent of a category
    Update {
        /// ID of the category
        id: i64,

        /// New name
        #[clap(long)]
        name: Option<String>,

        /// New colour as #RRGGBB
        #[clap(long)]
        color: Option<String>,

        /// ID of the new parent category
        #[clap(short, long, conflicts_with = "root")]
        parent: Option<i64>,

        /// Move the category to the top level
        #[clap(long)]
        root: bool,
    },

    /// Delete a category and its subcategories; their notes become uncategorised
    Remove {
        /// ID of the category
        id: i64,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// List the built-in presets
    Presets,

    /// Create a category from a preset
    Preset {
        /// Preset name, e.g. Ideas
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_ref_is_titled() {
        let note = NoteRef::new("1", "Foo");
        assert_eq!(Titled::id(&note), "1");
        assert_eq!(note.title(), "Foo");
    }
}
