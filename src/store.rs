//! The note collection.
//!
//! `NoteStore` is the single source of truth for notes. All mutation goes
//! through its methods, which update local state first and then queue the
//! change for the backend (if a `SyncHandle` is attached). Every mutation
//! recomputes the per-selector article counts once and pushes them to
//! watchers; readers never trigger a recount.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace};
use tokio::sync::{broadcast, watch};

use crate::{
    ArticleCounts, Note, NotePatch, NoteRef, NutsError, Result, SelectorId, SyncHandle, SyncOp,
};

/// Capacity of the change-event channel; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 256;

/// What changed in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The whole collection was replaced
    Loaded { count: usize },
    Created { id: String },
    Updated { id: String },
    Deleted { id: String },
}

struct StoreInner {
    /// Newest first
    notes: Vec<Note>,
    counts: ArticleCounts,
    sync: Option<SyncHandle>,
}

/// Handle to the shared note collection. Clones share the same state.
#[derive(Clone)]
pub struct NoteStore {
    inner: Arc<Mutex<StoreInner>>,
    events: broadcast::Sender<StoreEvent>,
    counts_tx: Arc<watch::Sender<ArticleCounts>>,
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteStore {
    /// An empty store with no backend attached
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (counts_tx, _) = watch::channel(ArticleCounts::default());

        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                notes: Vec::new(),
                counts: ArticleCounts::default(),
                sync: None,
            })),
            events,
            counts_tx: Arc::new(counts_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends future changes to the sync scheduler behind `handle`
    pub fn attach_sync(&self, handle: SyncHandle) {
        self.lock().sync = Some(handle);
        debug!("Sync attached to note store");
    }

    pub fn detach_sync(&self) {
        self.lock().sync = None;
    }

    /// Change events, pushed after every mutation
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Article counts, pushed only when they actually change
    pub fn watch_counts(&self) -> watch::Receiver<ArticleCounts> {
        self.counts_tx.subscribe()
    }

    /// Recounts, publishes and queues after a mutation. Called with the lock held.
    fn commit(&self, inner: &mut StoreInner, event: StoreEvent, op: Option<SyncOp>) {
        inner.counts = ArticleCounts::tally(&inner.notes);
        let counts = inner.counts.clone();
        self.counts_tx.send_if_modified(|current| {
            if *current == counts {
                false
            } else {
                *current = counts;
                true
            }
        });

        if let (Some(sync), Some(op)) = (&inner.sync, op) {
            sync.enqueue(op);
        }

        trace!("Store event: {:?}", event);
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn position(inner: &StoreInner, note_id: &str) -> Result<usize> {
        inner
            .notes
            .iter()
            .position(|note| note.id == note_id)
            .ok_or_else(|| NutsError::NoteNotFound {
                id: note_id.to_string(),
            })
    }

    /// Replaces the whole collection, e.g. with what the backend holds.
    ///
    /// Nothing is queued for sync: the notes came from the backend.
    pub fn load(&self, notes: Vec<Note>) {
        let mut inner = self.lock();
        inner.notes = notes;
        let count = inner.notes.len();
        self.commit(&mut inner, StoreEvent::Loaded { count }, None);
        info!("Loaded {} notes into the store", count);
    }

    /// Creates a note at the top of the list
    pub fn create_note(&self, title: &str, content: &str, tags: Vec<String>) -> Note {
        let note = Note::new(title.to_string(), content.to_string(), tags);
        self.insert_note(note.clone());
        note
    }

    /// Adds an already built note at the top of the list.
    ///
    /// A note with the same id is replaced in place.
    pub fn insert_note(&self, note: Note) {
        let mut inner = self.lock();
        let id = note.id.clone();
        let event = match inner.notes.iter().position(|n| n.id == id) {
            Some(index) => {
                inner.notes[index] = note.clone();
                StoreEvent::Updated { id: id.clone() }
            }
            None => {
                inner.notes.insert(0, note.clone());
                StoreEvent::Created { id: id.clone() }
            }
        };
        self.commit(&mut inner, event, Some(SyncOp::SaveNote(note)));
        debug!("Stored note {}", id);
    }

    /// Applies `patch` and returns the updated note
    pub fn update_note(&self, note_id: &str, patch: NotePatch) -> Result<Note> {
        let mut inner = self.lock();
        let index = Self::position(&inner, note_id)?;
        inner.notes[index].apply(patch);
        let note = inner.notes[index].clone();
        self.commit(
            &mut inner,
            StoreEvent::Updated {
                id: note_id.to_string(),
            },
            Some(SyncOp::SaveNote(note.clone())),
        );
        debug!("Updated note {}", note_id);
        Ok(note)
    }

    /// Removes a note and returns it
    pub fn delete_note(&self, note_id: &str) -> Result<Note> {
        let mut inner = self.lock();
        let index = Self::position(&inner, note_id)?;
        let note = inner.notes.remove(index);
        self.commit(
            &mut inner,
            StoreEvent::Deleted {
                id: note_id.to_string(),
            },
            Some(SyncOp::DeleteNote(note_id.to_string())),
        );
        info!("Deleted note {}", note_id);
        Ok(note)
    }

    /// Flips the pin state and returns the new one
    pub fn toggle_pin(&self, note_id: &str) -> Result<bool> {
        let is_pinned = {
            let inner = self.lock();
            let index = Self::position(&inner, note_id)?;
            inner.notes[index].is_pinned
        };
        let note = self.update_note(note_id, NotePatch::default().pinned(!is_pinned))?;
        Ok(note.is_pinned)
    }

    /// Points a note at a selector, replacing any previous assignment.
    /// `None` removes the assignment.
    pub fn assign_selector(&self, note_id: &str, selector: Option<SelectorId>) -> Result<Note> {
        let mut inner = self.lock();
        let index = Self::position(&inner, note_id)?;
        let note = &mut inner.notes[index];
        note.selector_id = selector;
        note.touch();
        let note = note.clone();
        self.commit(
            &mut inner,
            StoreEvent::Updated {
                id: note_id.to_string(),
            },
            Some(SyncOp::SaveNote(note.clone())),
        );
        debug!("Note {} assigned to selector {:?}", note_id, selector);
        Ok(note)
    }

    /// Drops the category of every note filed under one of `category_ids`,
    /// returning the notes that changed
    pub fn uncategorize(&self, category_ids: &[i64]) -> Vec<Note> {
        let mut inner = self.lock();
        let mut changed = Vec::new();
        for index in 0..inner.notes.len() {
            let note = &mut inner.notes[index];
            if !note.category_id.is_some_and(|id| category_ids.contains(&id)) {
                continue;
            }
            note.category_id = None;
            note.touch();
            let note = note.clone();
            self.commit(
                &mut inner,
                StoreEvent::Updated {
                    id: note.id.clone(),
                },
                Some(SyncOp::SaveNote(note.clone())),
            );
            changed.push(note);
        }
        if !changed.is_empty() {
            info!("Removed {} notes from deleted categories", changed.len());
        }
        changed
    }

    pub fn get_note(&self, note_id: &str) -> Option<Note> {
        self.lock()
            .notes
            .iter()
            .find(|note| note.id == note_id)
            .cloned()
    }

    /// Copy of every note, newest first
    pub fn snapshot(&self) -> Vec<Note> {
        self.lock().notes.clone()
    }

    /// `{id, title}` of every note, in list order
    pub fn note_refs(&self) -> Vec<NoteRef> {
        self.lock()
            .notes
            .iter()
            .map(|note| NoteRef::new(note.id.clone(), note.title.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().notes.is_empty()
    }

    pub fn pinned_notes(&self) -> Vec<Note> {
        self.lock()
            .notes
            .iter()
            .filter(|note| note.is_pinned)
            .cloned()
            .collect()
    }

    pub fn notes_for_selector(&self, id: SelectorId) -> Vec<Note> {
        self.lock()
            .notes
            .iter()
            .filter(|note| note.selector_id == Some(id))
            .cloned()
            .collect()
    }

    /// Notes filed under any of `category_ids`
    pub fn notes_in_categories(&self, category_ids: &[i64]) -> Vec<Note> {
        self.lock()
            .notes
            .iter()
            .filter(|note| note.category_id.is_some_and(|id| category_ids.contains(&id)))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring match over title, content and tags.
    /// An empty query matches everything.
    pub fn filter_notes(&self, query: &str) -> Vec<Note> {
        let query = query.to_lowercase();
        let inner = self.lock();
        if query.is_empty() {
            return inner.notes.clone();
        }

        inner
            .notes
            .iter()
            .filter(|note| {
                note.title.to_lowercase().contains(&query)
                    || note.content.to_lowercase().contains(&query)
                    || note.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// Searches notes by title and content using fuzzy matching
    /// Returns a Vec of Notes sorted by relevance score
    pub fn search_notes(&self, query: &str) -> Vec<Note> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let notes = self.snapshot();
        debug!("Searching through {} notes for '{}'", notes.len(), query);

        let mut scored: Vec<(i64, Note)> = notes
            .into_iter()
            .filter_map(|note| {
                // title matches are weighted more heavily
                let title_score = matcher.fuzzy_match(&note.title, query).unwrap_or(0);
                let content_score = matcher.fuzzy_match(&note.content, query).unwrap_or(0);
                let score = title_score * 2 + content_score;
                (score > 0).then_some((score, note))
            })
            .collect();

        // stable sort keeps list order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, note)| note).collect()
    }

    /// Current per-selector counts; no recomputation happens here
    pub fn article_counts(&self) -> ArticleCounts {
        self.lock().counts.clone()
    }

    /// Notes assigned to selector `raw_id`; 0 for unknown ids
    pub fn article_count_for_selector(&self, raw_id: i64) -> usize {
        self.lock().counts.get(raw_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{MemoryBackend, NoteBackend, SyncScheduler};

    fn sid(n: i64) -> SelectorId {
        SelectorId::new(n).unwrap()
    }

    #[test]
    fn create_prepends() {
        let store = NoteStore::new();
        let first = store.create_note("First", "", vec![]);
        let second = store.create_note("Second", "", vec![]);
        let ids: Vec<String> = store.snapshot().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn assignment_counts_follow_reassignment() {
        let store = NoteStore::new();
        let a = store.create_note("A", "", vec![]);
        let b = store.create_note("B", "", vec![]);

        store.assign_selector(&a.id, Some(sid(5))).unwrap();
        store.assign_selector(&b.id, Some(sid(5))).unwrap();
        assert_eq!(store.article_count_for_selector(5), 2);

        store.assign_selector(&a.id, Some(sid(7))).unwrap();
        assert_eq!(store.article_count_for_selector(5), 1);
        assert_eq!(store.article_count_for_selector(7), 1);

        store.assign_selector(&b.id, None).unwrap();
        assert_eq!(store.article_count_for_selector(5), 0);
        assert_eq!(store.get_note(&b.id).unwrap().selector_id, None);
    }

    #[test]
    fn counts_cover_every_selector_and_unknown_ids() {
        let store = NoteStore::new();
        let counts = store.article_counts();
        assert_eq!(counts.iter().count(), 100);
        assert!(counts.iter().all(|(_, count)| count == 0));
        assert_eq!(store.article_count_for_selector(0), 0);
        assert_eq!(store.article_count_for_selector(1000), 0);
    }

    #[test]
    fn deleting_a_note_updates_counts() {
        let store = NoteStore::new();
        let a = store.create_note("A", "", vec![]);
        store.assign_selector(&a.id, Some(sid(9))).unwrap();
        store.delete_note(&a.id).unwrap();
        assert_eq!(store.article_count_for_selector(9), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn reading_counts_is_idempotent() {
        let store = NoteStore::new();
        let a = store.create_note("A", "", vec![]);
        store.assign_selector(&a.id, Some(sid(3))).unwrap();
        let first = store.article_counts();
        let second = store.article_counts();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_ids_fail() {
        let store = NoteStore::new();
        assert!(matches!(
            store.update_note("nope", NotePatch::default().title("x")),
            Err(NutsError::NoteNotFound { .. })
        ));
        assert!(store.delete_note("nope").is_err());
        assert!(store.toggle_pin("nope").is_err());
        assert!(store.assign_selector("nope", Some(sid(1))).is_err());
    }

    #[test]
    fn uncategorize_clears_only_matching_notes() {
        let store = NoteStore::new();
        let a = store.create_note("A", "", vec![]);
        let b = store.create_note("B", "", vec![]);
        let c = store.create_note("C", "", vec![]);
        store.update_note(&a.id, NotePatch::default().category(Some(1))).unwrap();
        store.update_note(&b.id, NotePatch::default().category(Some(2))).unwrap();
        store.update_note(&c.id, NotePatch::default().category(Some(3))).unwrap();
        assert_eq!(store.notes_in_categories(&[1, 2]).len(), 2);

        let mut events = store.subscribe();
        let changed = store.uncategorize(&[1, 2]);
        let mut ids: Vec<String> = changed.into_iter().map(|n| n.id).collect();
        ids.sort();
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        assert_eq!(store.get_note(&a.id).unwrap().category_id, None);
        assert_eq!(store.get_note(&c.id).unwrap().category_id, Some(3));
        assert!(store.notes_in_categories(&[1, 2]).is_empty());
        assert!(matches!(events.try_recv(), Ok(StoreEvent::Updated { .. })));
        assert!(store.uncategorize(&[1, 2]).is_empty());
    }

    #[test]
    fn toggle_pin_flips() {
        let store = NoteStore::new();
        let a = store.create_note("A", "", vec![]);
        assert!(store.toggle_pin(&a.id).unwrap());
        assert_eq!(store.pinned_notes().len(), 1);
        assert!(!store.toggle_pin(&a.id).unwrap());
        assert!(store.pinned_notes().is_empty());
    }

    #[test]
    fn filter_matches_title_content_and_tags() {
        let store = NoteStore::new();
        store.create_note("Groceries", "milk", vec![]);
        store.create_note("Work", "call Bob", vec!["urgent".into()]);
        assert_eq!(store.filter_notes("MILK").len(), 1);
        assert_eq!(store.filter_notes("urg")[0].title, "Work");
        assert_eq!(store.filter_notes("").len(), 2);
        assert!(store.filter_notes("zebra").is_empty());
    }

    #[test]
    fn fuzzy_search_ranks_title_hits_first() {
        let store = NoteStore::new();
        store.create_note("Misc", "the rust book is here", vec![]);
        store.create_note("Rust", "notes", vec![]);
        let results = store.search_notes("rust");
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn note_refs_follow_list_order() {
        let store = NoteStore::new();
        store.create_note("A", "", vec![]);
        store.create_note("B", "", vec![]);
        let titles: Vec<String> = store.note_refs().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn insert_existing_id_replaces() {
        let store = NoteStore::new();
        let mut a = store.create_note("A", "", vec![]);
        a.title = "A2".into();
        store.insert_note(a.clone());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_note(&a.id).unwrap().title, "A2");
    }

    #[test]
    fn subscribers_see_every_mutation() {
        let store = NoteStore::new();
        let mut events = store.subscribe();

        let a = store.create_note("A", "", vec![]);
        store.update_note(&a.id, NotePatch::default().content("x")).unwrap();
        store.delete_note(&a.id).unwrap();
        store.load(vec![]);

        assert_eq!(events.try_recv().unwrap(), StoreEvent::Created { id: a.id.clone() });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Updated { id: a.id.clone() });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Deleted { id: a.id });
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Loaded { count: 0 });
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn count_watchers_only_wake_on_change() {
        let store = NoteStore::new();
        let mut counts = store.watch_counts();

        let a = store.create_note("A", "", vec![]);
        store.update_note(&a.id, NotePatch::default().title("B")).unwrap();
        assert!(!counts.has_changed().unwrap());

        store.assign_selector(&a.id, Some(sid(42))).unwrap();
        assert!(counts.has_changed().unwrap());
        assert_eq!(counts.borrow_and_update().get(42), 1);
    }

    #[test]
    fn load_replaces_and_recounts() {
        let store = NoteStore::new();
        store.create_note("old", "", vec![]);
        let mut fresh = Note::new("fresh".into(), String::new(), vec![]);
        fresh.selector_id = Some(sid(100));
        store.load(vec![fresh]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.article_count_for_selector(100), 1);
    }

    #[tokio::test]
    async fn mutations_reach_the_backend_after_local_state() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let store = NoteStore::new();
        store.attach_sync(scheduler.start());

        let a = store.create_note("A", "draft", vec![]);
        let b = store.create_note("B", "", vec![]);
        store.update_note(&a.id, NotePatch::default().content("final")).unwrap();
        store.assign_selector(&a.id, Some(sid(5))).unwrap();
        store.delete_note(&b.id).unwrap();

        // local state is already there before any sync happened
        assert_eq!(store.get_note(&a.id).unwrap().content, "final");
        assert_eq!(backend.note_count(), 0);

        scheduler.flush_now().await.unwrap();
        let synced = backend.note(&a.id).unwrap();
        assert_eq!(synced.content, "final");
        assert_eq!(synced.selector_id, Some(sid(5)));
        assert!(backend.note(&b.id).is_none());
        assert_eq!(backend.load_notes().unwrap().len(), 1);

        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn load_is_not_synced_back() {
        let backend = Arc::new(MemoryBackend::new());
        let mut scheduler = SyncScheduler::new(backend.clone(), Duration::from_secs(3600));
        let store = NoteStore::new();
        store.attach_sync(scheduler.start());

        store.load(vec![Note::new("x".into(), String::new(), vec![])]);
        let report = scheduler.flush_now().await.unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(backend.note_count(), 0);
        scheduler.stop().await.unwrap();
    }
}
