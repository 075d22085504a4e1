//! Persistence boundary.
//!
//! The note store never talks to disk directly; the sync scheduler pushes
//! its changes through a `NoteBackend`. `JsonFileBackend` keeps one JSON file
//! per note and a `selectors.json` with the custom selector names.
//! `MemoryBackend` keeps everything in process.
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{load_note_from_file, Category, NutsError, Note, Result, SelectorId};

const SELECTORS_FILE: &str = "selectors.json";
const CATEGORIES_FILE: &str = "categories.json";

/// Where notes and selector names end up.
pub trait NoteBackend: Send + Sync {
    fn load_notes(&self) -> Result<Vec<Note>>;

    /// Creates or replaces a note
    fn save_note(&self, note: &Note) -> Result<()>;

    /// Deleting a note the backend never saw is not an error
    fn delete_note(&self, note_id: &str) -> Result<()>;

    /// Custom names; unnamed selectors are simply absent
    fn load_selector_names(&self) -> Result<HashMap<SelectorId, String>>;

    fn save_selector_name(&self, id: SelectorId, name: &str) -> Result<()>;

    fn load_categories(&self) -> Result<Vec<Category>>;

    /// Creates or replaces a category
    fn save_category(&self, category: &Category) -> Result<()>;

    /// Deleting an unknown category is not an error
    fn delete_category(&self, id: i64) -> Result<()>;
}

/// One persisted selector name
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SelectorRecord {
    id: SelectorId,
    name: String,
    updated_at: DateTime<Utc>,
}

/// Notes as `notes/<first two chars of id>/<id>.json`, selector names in
/// `selectors.json`, categories in `categories.json`.
pub struct JsonFileBackend {
    root: PathBuf,
    /// Serializes read-modify-write of the selector file
    selectors_lock: Mutex<()>,
    /// Serializes read-modify-write of the category file
    categories_lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Opens (creating if needed) a backend rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let notes_dir = root.join("notes");
        if !notes_dir.exists() {
            debug!("Creating notes directory: {}", notes_dir.display());
            fs::create_dir_all(&notes_dir).map_err(|e| {
                error!("Failed to create notes directory: {}", e);
                NutsError::DirectoryError {
                    path: notes_dir.clone(),
                }
            })?;
        }

        info!("Opened JSON backend at {}", root.display());
        Ok(Self {
            root,
            selectors_lock: Mutex::new(()),
            categories_lock: Mutex::new(()),
        })
    }

    fn notes_dir(&self) -> PathBuf {
        self.root.join("notes")
    }

    /// Helper method to get the file path for a note
    fn note_path(&self, note_id: &str) -> PathBuf {
        let id_prefix = note_id.get(..2).unwrap_or(note_id);

        self.notes_dir()
            .join(id_prefix)
            .join(format!("{}.json", note_id))
    }

    fn selectors_path(&self) -> PathBuf {
        self.root.join(SELECTORS_FILE)
    }

    fn read_selector_records(&self) -> Result<Vec<SelectorRecord>> {
        let path = self.selectors_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn categories_path(&self) -> PathBuf {
        self.root.join(CATEGORIES_FILE)
    }

    /// Runs `change` on the category file under the lock and writes it back
    fn modify_categories<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Category>),
    {
        let _guard = self
            .categories_lock
            .lock()
            .map_err(|_| NutsError::LockAcquisitionFailed {
                message: "Failed to acquire lock on categories".to_string(),
            })?;

        let mut categories = self.load_categories()?;
        change(&mut categories);
        categories.sort_by_key(|category| category.id);

        let json = serde_json::to_string_pretty(&categories)?;
        write_atomically(&self.categories_path(), json.as_bytes())
    }
}

/// Writes `contents` next to `path` and renames it into place.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    if !dir.exists() {
        debug!("Creating parent directory: {}", dir.display());
        fs::create_dir_all(dir)?;
    }

    let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
        error!("Failed to create temporary file: {}", e);
        NutsError::Io(e)
    })?;

    trace!("Writing to temporary file");
    temp_file.write_all(contents)?;
    temp_file.flush()?;

    temp_file.persist(path).map_err(|e| {
        error!("Failed to persist file {}: {}", path.display(), e.error);
        NutsError::Io(e.error)
    })?;
    Ok(())
}

impl NoteBackend for JsonFileBackend {
    fn load_notes(&self) -> Result<Vec<Note>> {
        let notes_dir = self.notes_dir();
        if !notes_dir.exists() {
            return Ok(Vec::new());
        }

        let mut notes = Vec::new();
        let mut failures = 0;

        for entry in WalkDir::new(&notes_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                match load_note_from_file(path) {
                    Ok(note) => notes.push(note),
                    Err(e) => {
                        warn!("Failed to load note from {}: {}", path.display(), e);
                        failures += 1;
                    }
                }
            }
        }

        if failures > 0 {
            error!("Encountered {} errors while loading notes", failures);
        }

        // newest first, like a freshly built list
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        info!("Loaded {} notes from {}", notes.len(), notes_dir.display());
        Ok(notes)
    }

    fn save_note(&self, note: &Note) -> Result<()> {
        let file_path = self.note_path(&note.id);
        debug!("Saving note {} to {}", note.id, file_path.display());

        let json = serde_json::to_string_pretty(note)?;
        write_atomically(&file_path, json.as_bytes())?;

        trace!("Note saved: {}", note.id);
        Ok(())
    }

    fn delete_note(&self, note_id: &str) -> Result<()> {
        let file_path = self.note_path(note_id);
        if !file_path.exists() {
            debug!("No file to delete for note {}", note_id);
            return Ok(());
        }

        fs::remove_file(&file_path)?;

        // drop the prefix directory once it is empty
        if let Some(parent) = file_path.parent() {
            if fs::read_dir(parent).is_ok_and(|mut entries| entries.next().is_none()) {
                if let Err(e) = fs::remove_dir(parent) {
                    warn!("Failed to remove empty directory {}: {}", parent.display(), e);
                }
            }
        }

        debug!("Deleted note file {}", file_path.display());
        Ok(())
    }

    fn load_selector_names(&self) -> Result<HashMap<SelectorId, String>> {
        let records = self.read_selector_records()?;
        Ok(records
            .into_iter()
            .filter(|record| !record.name.is_empty())
            .map(|record| (record.id, record.name))
            .collect())
    }

    fn save_selector_name(&self, id: SelectorId, name: &str) -> Result<()> {
        let _guard = self
            .selectors_lock
            .lock()
            .map_err(|_| NutsError::LockAcquisitionFailed {
                message: "Failed to acquire lock on selector names".to_string(),
            })?;

        let mut records = self.read_selector_records()?;
        let now = Utc::now();
        match records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.name = name.to_string();
                record.updated_at = now;
            }
            None => records.push(SelectorRecord {
                id,
                name: name.to_string(),
                updated_at: now,
            }),
        }
        records.sort_by_key(|record| record.id);

        let json = serde_json::to_string_pretty(&records)?;
        write_atomically(&self.selectors_path(), json.as_bytes())?;
        debug!("Saved name of selector {}", id);
        Ok(())
    }

    fn load_categories(&self) -> Result<Vec<Category>> {
        let path = self.categories_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save_category(&self, category: &Category) -> Result<()> {
        self.modify_categories(|categories| {
            match categories.iter_mut().find(|c| c.id == category.id) {
                Some(existing) => *existing = category.clone(),
                None => categories.push(category.clone()),
            }
        })?;
        debug!("Saved category {}", category.id);
        Ok(())
    }

    fn delete_category(&self, id: i64) -> Result<()> {
        self.modify_categories(|categories| categories.retain(|c| c.id != id))?;
        debug!("Deleted category {}", id);
        Ok(())
    }
}

/// Keeps everything in memory; nothing survives the process.
#[derive(Default)]
pub struct MemoryBackend {
    notes: Mutex<HashMap<String, Note>>,
    selector_names: Mutex<HashMap<SelectorId, String>>,
    categories: Mutex<HashMap<i64, Category>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<Note>) -> Self {
        let backend = Self::default();
        if let Ok(mut map) = backend.notes.lock() {
            map.extend(notes.into_iter().map(|n| (n.id.clone(), n)));
        }
        backend
    }

    pub fn note(&self, note_id: &str) -> Option<Note> {
        self.notes.lock().ok()?.get(note_id).cloned()
    }

    pub fn note_count(&self) -> usize {
        self.notes.lock().map(|map| map.len()).unwrap_or(0)
    }
}

fn poisoned(what: &str) -> NutsError {
    NutsError::LockAcquisitionFailed {
        message: format!("Failed to acquire lock on {}", what),
    }
}

impl NoteBackend for MemoryBackend {
    fn load_notes(&self) -> Result<Vec<Note>> {
        let map = self.notes.lock().map_err(|_| poisoned("notes"))?;
        let mut notes: Vec<Note> = map.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    fn save_note(&self, note: &Note) -> Result<()> {
        self.notes
            .lock()
            .map_err(|_| poisoned("notes"))?
            .insert(note.id.clone(), note.clone());
        Ok(())
    }

    fn delete_note(&self, note_id: &str) -> Result<()> {
        self.notes
            .lock()
            .map_err(|_| poisoned("notes"))?
            .remove(note_id);
        Ok(())
    }

    fn load_selector_names(&self) -> Result<HashMap<SelectorId, String>> {
        Ok(self
            .selector_names
            .lock()
            .map_err(|_| poisoned("selector names"))?
            .clone())
    }

    fn save_selector_name(&self, id: SelectorId, name: &str) -> Result<()> {
        let mut names = self
            .selector_names
            .lock()
            .map_err(|_| poisoned("selector names"))?;
        if name.is_empty() {
            names.remove(&id);
        } else {
            names.insert(id, name.to_string());
        }
        Ok(())
    }

    fn load_categories(&self) -> Result<Vec<Category>> {
        let map = self.categories.lock().map_err(|_| poisoned("categories"))?;
        let mut categories: Vec<Category> = map.values().cloned().collect();
        categories.sort_by_key(|category| category.id);
        Ok(categories)
    }

    fn save_category(&self, category: &Category) -> Result<()> {
        self.categories
            .lock()
            .map_err(|_| poisoned("categories"))?
            .insert(category.id, category.clone());
        Ok(())
    }

    fn delete_category(&self, id: i64) -> Result<()> {
        self.categories
            .lock()
            .map_err(|_| poisoned("categories"))?
            .remove(&id);
        Ok(())
    }
}
