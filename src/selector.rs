//! The fixed pool of 100 selectors and the per-selector article counts.
//!
//! Selectors are numbered 1 to 100 and split into 10 groups of 10. Their
//! identity never changes; only the name is user data. A selector never
//! stores which notes point at it: `ArticleCounts` is always rebuilt from
//! the notes.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{palette, NutsError, Note, Result, Rgb};

/// Number of selectors that always exist
pub const SELECTOR_COUNT: usize = 100;

/// Number of selectors shown per group
pub const SELECTORS_PER_GROUP: usize = 10;

/// Number of groups the pool is split into
pub const GROUP_COUNT: usize = SELECTOR_COUNT / SELECTORS_PER_GROUP;

/// Identifier of a selector, always in `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SelectorId(u8);

impl SelectorId {
    /// Validates `value` as a selector id.
    pub fn new(value: i64) -> Result<Self> {
        if (1..=SELECTOR_COUNT as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(NutsError::InvalidSelector { value })
        }
    }

    /// Every selector id in ascending order.
    pub fn all() -> impl Iterator<Item = SelectorId> {
        (1..=SELECTOR_COUNT as u8).map(SelectorId)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Group the selector belongs to, `floor((id-1)/10)`
    pub fn group_index(self) -> usize {
        (self.0 as usize - 1) / SELECTORS_PER_GROUP
    }

    /// Position inside its group, `(id-1) % 10`
    pub fn position_in_group(self) -> usize {
        (self.0 as usize - 1) % SELECTORS_PER_GROUP
    }

    /// Zero-based slot in a dense per-selector array
    pub(crate) fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<i64> for SelectorId {
    type Error = NutsError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SelectorId> for i64 {
    fn from(id: SelectorId) -> Self {
        id.0 as i64
    }
}

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SelectorId {
    type Err = NutsError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s.trim().parse().map_err(|_| NutsError::InvalidFormat {
            message: format!("'{}' is not a selector number", s),
        })?;
        Self::new(value)
    }
}

/// A tagging slot. The colour is derived from the id and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub id: SelectorId,
    pub name: String,
    pub color: Rgb,
}

impl Selector {
    /// A selector with an empty name and its derived colour
    pub fn new(id: SelectorId) -> Self {
        Self {
            id,
            name: String::new(),
            color: palette::selector_color(id),
        }
    }

    pub fn group_index(&self) -> usize {
        self.id.group_index()
    }

    /// The name, or `#<id>` when the selector was never named
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

/// Everything a selector badge needs to render, in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorView {
    pub id: SelectorId,
    pub name: String,
    pub color: String,
    /// Group accent for hover
    pub hover_color: String,
    /// Group accent for the active selector
    pub active_color: String,
    pub group_index: usize,
    pub is_active: bool,
    pub article_count: usize,
}

/// Number of notes assigned to each selector.
///
/// Every selector has an entry, zero included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCounts {
    counts: [usize; SELECTOR_COUNT],
}

impl Default for ArticleCounts {
    fn default() -> Self {
        Self {
            counts: [0; SELECTOR_COUNT],
        }
    }
}

impl ArticleCounts {
    /// Counts the notes per selector in a single pass.
    pub fn tally<'a, I>(notes: I) -> Self
    where
        I: IntoIterator<Item = &'a Note>,
    {
        let mut tally = Self::default();
        for id in notes.into_iter().filter_map(|note| note.selector_id) {
            tally.counts[id.index()] += 1;
        }
        tally
    }

    /// Count for a raw selector number; 0 for anything outside 1..=100.
    pub fn get(&self, raw_id: i64) -> usize {
        SelectorId::new(raw_id)
            .map(|id| self.counts[id.index()])
            .unwrap_or(0)
    }

    pub fn for_selector(&self, id: SelectorId) -> usize {
        self.counts[id.index()]
    }

    /// `(id, count)` for every selector, ascending by id
    pub fn iter(&self) -> impl Iterator<Item = (SelectorId, usize)> + '_ {
        SelectorId::all().map(move |id| (id, self.counts[id.index()]))
    }

    /// Number of notes assigned to any selector
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
