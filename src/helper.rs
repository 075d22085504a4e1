use std::{fs, path::Path};

use log::{debug, error, trace};

use crate::{Note, NutsError, Result};

/// Helper method to load a single note from file
pub fn load_note_from_file(path: &Path) -> Result<Note> {
    debug!("Loading note from file: {}", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        error!("Failed to open note file {}: {}", path.display(), e);
        NutsError::Io(e)
    })?;

    let note: Note = serde_json::from_str(&content)?;

    if note.id.is_empty() {
        let error_msg = format!("Note from {} has an empty ID", path.display());
        error!("{}", error_msg);
        return Err(NutsError::InvalidFormat { message: error_msg });
    }

    trace!("Successfully loaded note: {}", note.id);
    Ok(note)
}

// Helper method for parsing tags
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// First non-empty line of `content`, cut to at most `max_chars` characters
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();

    if first_line.chars().count() <= max_chars {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
