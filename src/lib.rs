//! Extranuts note-taking library
//!
//! Notes link to each other with `[[Title]]` / `[[Title|text]]` wiki links
//! and can be tagged with one of 100 colour-coded selectors, shown ten at a
//! time. Notes can also be filed in a hierarchy of categories. A
//! [`NoteStore`] holds the collection in memory and hands every
//! change to a [`SyncScheduler`], which pushes it to a [`NoteBackend`].

mod category;
mod cli;
mod config;
mod errors;
mod helper;
mod note;
mod palette;
mod registry;
mod selector;
mod storage;
mod store;
mod sync_scheduler;
mod types;
mod wikilink;

// Re-export key components
pub use category::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use note::*;
pub use palette::*;
pub use registry::*;
pub use selector::*;
pub use storage::*;
pub use store::*;
pub use sync_scheduler::*;
pub use types::*;
pub use wikilink::*;
