use std::{
    fs::{read_to_string, OpenOptions},
    io::{stdin, stdout, Write},
    path::Path,
    process::Command,
    sync::Arc,
};

use console::style;
use log::{debug, info};
use shell_words::split;
use tempfile::Builder;

use crate::{
    autocomplete_matches, content_preview, find_wiki_link_at_cursor, parse_tags,
    parse_wiki_links, render_with_wiki_links, resolve_wiki_link, CategoryCommand,
    CategoryDraft, CategoryNode, CategoryTree, Commands, Config, CursorLink, Note, NoteBackend,
    NotePatch, NoteStore, NutsError, Result, SelectorId, SelectorRegistry, SyncOp,
    SyncScheduler, CATEGORY_PRESETS,
};

/// CLI Application handler - processes CLI commands against the note store
pub struct App {
    /// The note collection
    store: NoteStore,

    /// Selector names and navigation state
    registry: SelectorRegistry,

    /// Category hierarchy
    categories: CategoryTree,

    /// Pushes store changes to the backend
    scheduler: SyncScheduler,

    /// Application configuration
    config: Config,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Loads notes and selector names from `backend` and starts syncing.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(config: Config, backend: Arc<dyn NoteBackend>, verbose: bool) -> Result<Self> {
        let store = NoteStore::new();
        store.load(backend.load_notes()?);

        let mut registry = SelectorRegistry::new();
        registry.apply_names(&backend.load_selector_names()?);
        let categories = CategoryTree::from_categories(backend.load_categories()?);

        let mut scheduler = SyncScheduler::new(backend, config.sync_interval());
        store.attach_sync(scheduler.start());

        Ok(Self {
            store,
            registry,
            categories,
            scheduler,
            config,
            verbose,
        })
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn registry(&self) -> &SelectorRegistry {
        &self.registry
    }

    pub fn categories(&self) -> &CategoryTree {
        &self.categories
    }

    /// Stops syncing after pushing everything still pending
    pub async fn shutdown(&mut self) -> Result<()> {
        self.store.detach_sync();
        self.scheduler.stop().await?;
        let status = self.scheduler.status();
        if self.verbose {
            println!(
                "{}",
                style(format!(
                    "synced {} change(s), {} failed",
                    status.synced, status.failed
                ))
                .dim()
            );
        }
        Ok(())
    }

    /// Run the CLI application with the given command
    pub async fn run(&mut self, command: Commands) -> Result<()> {
        debug!("Running command {:?}", command);
        match command {
            Commands::New {
                title,
                content,
                file,
                edit,
                tags,
                selector,
                category,
            } => {
                self.require_category(category)?;
                let note = self.create_note(title, content, file.as_deref(), edit, tags)?;
                let note = self.place_note(note, selector, category)?;
                println!("Note created with ID: {}", note.id);
                self.report_missing_links(&note);
            }

            Commands::List {
                selector,
                category,
                pinned,
                filter,
                limit,
                json,
            } => self.list_notes(selector, category, pinned, filter, limit, json)?,

            Commands::Show { id, json } => self.show_note(&id, json)?,

            Commands::Edit {
                id,
                title,
                content,
                file,
                edit,
                category,
                no_category,
            } => {
                self.require_category(category)?;
                let category = if no_category { Some(None) } else { category.map(Some) };
                self.edit_note(&id, title, content, file.as_deref(), edit, category)?
            }

            Commands::Delete { id, force } => self.delete_note(&id, force)?,

            Commands::Pin { id } => {
                let pinned = self.store.toggle_pin(&id)?;
                println!("Note {} {}", id, if pinned { "pinned" } else { "unpinned" });
            }

            Commands::Search { query, limit } => self.search(&query, limit)?,

            Commands::Links { id, render, json } => self.show_links(&id, render, json)?,

            Commands::Follow { id, title } => self.follow_link(&id, &title)?,

            Commands::Complete { input, limit } => {
                let limit = limit.unwrap_or(self.config.autocomplete_limit);
                self.complete(&input, limit);
            }

            Commands::Cursor { id, position } => self.cursor(&id, position)?,

            Commands::Selectors { group, json } => self.show_selectors(group, json)?,

            Commands::Select { id } => self.select(id),

            Commands::Assign {
                note_id,
                selector,
                clear,
            } => {
                let selector = if clear { None } else { selector };
                let note = self.store.assign_selector(&note_id, selector)?;
                match note.selector_id {
                    Some(id) => println!(
                        "Note '{}' assigned to selector {}",
                        note.title,
                        self.registry.selector(id).label()
                    ),
                    None => println!("Note '{}' no longer has a selector", note.title),
                }
            }

            Commands::Rename { id, name } => self.rename_selector(id, &name),

            Commands::Categories { action } => {
                self.run_category_command(action.unwrap_or(CategoryCommand::List { json: false }))?
            }
        }

        Ok(())
    }

    fn note(&self, id: &str) -> Result<Note> {
        self.store
            .get_note(id)
            .ok_or_else(|| NutsError::NoteNotFound { id: id.to_string() })
    }

    fn create_note(
        &self,
        title: String,
        content: Option<String>,
        file: Option<&Path>,
        edit: bool,
        tags: Option<String>,
    ) -> Result<Note> {
        let note_content = match (content, file) {
            (Some(c), _) => c,
            (_, Some(file_path)) => self.read_content_from_file(file_path)?,
            (None, None) if edit => self.open_editor(&title, "")?,
            (None, None) => String::new(),
        };

        Ok(self
            .store
            .create_note(&title, &note_content, parse_tags(tags)))
    }

    /// Files a fresh note under its category and selector, if given
    fn place_note(
        &self,
        mut note: Note,
        selector: Option<SelectorId>,
        category: Option<i64>,
    ) -> Result<Note> {
        if category.is_some() {
            note = self
                .store
                .update_note(&note.id, NotePatch::default().category(category))?;
        }
        if selector.is_some() {
            note = self.store.assign_selector(&note.id, selector)?;
        }
        Ok(note)
    }

    /// Fails unless `category` is `None` or a known category
    fn require_category(&self, category: Option<i64>) -> Result<()> {
        match category {
            Some(id) if self.categories.get(id).is_none() => {
                Err(NutsError::CategoryNotFound { id })
            }
            _ => Ok(()),
        }
    }

    fn edit_note(
        &self,
        id: &str,
        title: Option<String>,
        content: Option<String>,
        file: Option<&Path>,
        edit: bool,
        category: Option<Option<i64>>,
    ) -> Result<()> {
        let sources = [content.is_some(), file.is_some(), edit];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(NutsError::ApplicationError {
                message: "Use only one of --content, --file and --edit".to_string(),
            });
        }

        let note = self.note(id)?;
        let mut patch = NotePatch::default();
        if let Some(new_title) = title {
            patch = patch.title(new_title);
        }
        if let Some(category_id) = category {
            patch = patch.category(category_id);
        }

        if let Some(new_content) = content {
            patch = patch.content(new_content);
        } else if let Some(file_path) = file {
            patch = patch.content(self.read_content_from_file(file_path)?);
            println!("Content updated from file: {}", file_path.display());
        } else if edit {
            let title = patch.title.as_deref().unwrap_or(&note.title).to_string();
            patch = patch.content(self.open_editor(&title, &note.content)?);
            println!("Content updated from editor");
        }

        if patch.is_empty() {
            println!("Nothing to change");
            return Ok(());
        }

        let note = self.store.update_note(id, patch)?;
        println!("Note {} updated successfully", note.id);
        self.report_missing_links(&note);
        Ok(())
    }

    /// Warns about links in `note` whose target does not exist yet
    fn report_missing_links(&self, note: &Note) {
        let refs = self.store.note_refs();
        let parsed = parse_wiki_links(&note.content, &refs);
        let missing: Vec<&str> = parsed
            .links
            .iter()
            .filter(|link| !link.exists)
            .map(|link| link.note_title.as_str())
            .collect();
        if !missing.is_empty() {
            println!(
                "{} {}",
                style("Links to missing notes:").yellow(),
                missing.join(", ")
            );
        }
    }

    fn delete_note(&self, id: &str, force: bool) -> Result<()> {
        let note = self.note(id)?;

        if !force {
            println!("You are about to delete the following note:");
            println!("ID:     {}", note.id);
            println!("Title:  {}", note.title);
            println!("Created: {}", note.created_at.format("%Y-%m-%d %H:%M:%S"));
            let preview = content_preview(&note.content, 80);
            if !preview.is_empty() {
                println!("\nContent preview:\n{}", preview);
            }

            println!("\nThis action cannot be undone!");
            if !confirm("Are you sure you want to delete this note?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.store.delete_note(id)?;
        println!(
            "Note '{}' ({}) has been permanently deleted.",
            note.title, note.id
        );
        Ok(())
    }

    fn list_notes(
        &self,
        selector: Option<SelectorId>,
        category: Option<i64>,
        pinned: bool,
        filter: Option<String>,
        limit: usize,
        json: bool,
    ) -> Result<()> {
        let mut notes = match filter {
            Some(query) => self.store.filter_notes(&query),
            None => self.store.snapshot(),
        };
        if let Some(id) = selector {
            notes.retain(|note| note.selector_id == Some(id));
        }
        if let Some(id) = category {
            self.require_category(Some(id))?;
            let ids = self.categories.subtree_ids(id);
            notes.retain(|note| note.category_id.is_some_and(|c| ids.contains(&c)));
        }
        if pinned {
            notes.retain(|note| note.is_pinned);
        }
        // pinned notes float to the top, list order otherwise
        notes.sort_by_key(|note| !note.is_pinned);
        notes.truncate(limit);

        if json {
            println!("{}", serde_json::to_string_pretty(&notes)?);
        } else {
            self.display_notes_text(&notes);
        }
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[Note]) {
        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return;
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, note) in notes.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let pin = if note.is_pinned { " [pinned]" } else { "" };
            println!(
                "ID: {} | Updated: {}{}",
                note.id,
                note.updated_at.format("%Y-%m-%d %H:%M"),
                pin
            );
            println!("Title: {}", style(&note.title).bold());

            if let Some(id) = note.selector_id {
                let selector = self.registry.selector(id);
                println!(
                    "Selector: {} {}",
                    style(selector.label()).magenta(),
                    style(selector.color).dim()
                );
            }

            if let Some(label) = note.category_id.and_then(|id| self.categories.path_label(id)) {
                println!("Category: {}", style(label).yellow());
            }

            if !note.tags.is_empty() {
                let tags = note
                    .tags
                    .iter()
                    .map(|tag| format!("#{}", tag))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("Tags: {}", style(tags).cyan());
            }

            let preview = content_preview(&note.content, 100);
            if !preview.is_empty() {
                println!("\n{}", preview);
            }
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
    }

    fn show_note(&self, id: &str, json: bool) -> Result<()> {
        let note = self.note(id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&note)?);
            return Ok(());
        }

        println!("{}", style(&note.title).bold().underlined());
        println!(
            "ID: {} | Created: {} | Updated: {}",
            note.id,
            note.created_at.format("%Y-%m-%d %H:%M"),
            note.updated_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(id) = note.selector_id {
            println!("Selector: {}", self.registry.selector(id).label());
        }
        if let Some(label) = note.category_id.and_then(|id| self.categories.path_label(id)) {
            println!("Category: {}", label);
        }
        if !note.tags.is_empty() {
            println!("Tags: {}", style(note.tags.join(", ")).cyan());
        }
        println!("\n{}", note.content);
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<()> {
        let mut results = self.store.search_notes(query);
        if limit > 0 {
            results.truncate(limit);
        }

        if results.is_empty() {
            println!("No notes found matching query: \"{}\"", query);
        } else {
            self.display_notes_text(&results);
        }
        Ok(())
    }

    fn show_links(&self, id: &str, render: bool, json: bool) -> Result<()> {
        let note = self.note(id)?;
        let refs = self.store.note_refs();

        if render {
            println!("{}", render_with_wiki_links(&note.content, &refs));
            return Ok(());
        }

        let parsed = parse_wiki_links(&note.content, &refs);
        if json {
            println!("{}", serde_json::to_string_pretty(&parsed.links)?);
            return Ok(());
        }

        if parsed.links.is_empty() {
            println!("'{}' has no wiki links", note.title);
            return Ok(());
        }

        for link in &parsed.links {
            let marker = if link.exists {
                style("exists ").green()
            } else {
                style("missing").red()
            };
            let alias = link
                .display_text
                .as_ref()
                .map(|alias| format!(" as '{}'", alias))
                .unwrap_or_default();
            println!(
                "{} {}{} ({}..{})",
                marker, link.note_title, alias, link.start_index, link.end_index
            );
        }
        Ok(())
    }

    fn follow_link(&self, id: &str, title: &str) -> Result<()> {
        let note = self.note(id)?;
        let notes = self.store.snapshot();
        let parsed = parse_wiki_links(&note.content, &notes);

        let wanted = title.trim().to_lowercase();
        let link = parsed
            .links
            .iter()
            .find(|link| link.note_title.to_lowercase() == wanted)
            .ok_or_else(|| NutsError::ApplicationError {
                message: format!("'{}' has no link to '{}'", note.title, title),
            })?;

        match resolve_wiki_link(&link.note_title, &notes) {
            Some(target) => {
                println!("{} -> {}", link.label(), target.id);
                println!("{}", style(&target.title).bold());
                let preview = content_preview(&target.content, 100);
                if !preview.is_empty() {
                    println!("{}", preview);
                }
            }
            None => println!(
                "'{}' does not exist yet; create it with: extranuts new --title \"{}\"",
                link.note_title, link.note_title
            ),
        }
        Ok(())
    }

    fn complete(&self, input: &str, limit: usize) {
        let refs = self.store.note_refs();
        let matches = autocomplete_matches(input, &refs, limit);
        if matches.is_empty() {
            println!("No matching notes");
        }
        for note in matches {
            println!("{}  {}", note.title, style(&note.id).dim());
        }
    }

    fn cursor(&self, id: &str, position: usize) -> Result<()> {
        let note = self.note(id)?;
        let found = find_wiki_link_at_cursor(&note.content, position);

        let typed = match &found {
            CursorLink::Outside => {
                println!("Cursor is not inside a wiki link");
                return Ok(());
            }
            CursorLink::Complete {
                link_text,
                start_pos,
                end_pos,
            } => {
                println!("Inside link [[{}]] at {}..{}", link_text, start_pos, end_pos);
                // suggestions are for the target, not the alias
                link_text.split('|').next().unwrap_or_default()
            }
            CursorLink::Incomplete {
                link_text,
                start_pos,
                end_pos,
            } => {
                println!(
                    "Typing link [[{} at {}..{}",
                    link_text, start_pos, end_pos
                );
                link_text.as_str()
            }
        };

        let refs = self.store.note_refs();
        for suggestion in autocomplete_matches(typed, &refs, self.config.autocomplete_limit) {
            println!("  {}", suggestion.title);
        }
        Ok(())
    }

    fn show_selectors(&mut self, group: i64, json: bool) -> Result<()> {
        self.registry.navigate_to_group(group);
        let current = self.registry.current_group();
        let views = self
            .registry
            .views(&self.store.article_counts(), current);

        if json {
            println!("{}", serde_json::to_string_pretty(&views)?);
            return Ok(());
        }

        println!(
            "Group {}/{}",
            current + 1,
            self.registry.total_groups()
        );
        for view in views {
            let name = if view.name.is_empty() {
                style("(unnamed)".to_string()).dim()
            } else {
                style(view.name.clone()).bold()
            };
            println!(
                "{:>3}  {}  {}  {} note{}",
                view.id.get(),
                view.color,
                name,
                view.article_count,
                if view.article_count == 1 { "" } else { "s" }
            );
        }
        Ok(())
    }

    fn select(&mut self, id: SelectorId) {
        self.registry.set_active_selector(id);
        let notes = self.store.notes_for_selector(id);
        let active = self.registry.selector(id);
        println!(
            "Selector {} (group {}/{}) has {} note{}",
            style(active.label()).bold(),
            self.registry.current_group() + 1,
            self.registry.total_groups(),
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        for note in notes {
            println!("  {}  {}", note.id, note.title);
        }
    }

    fn rename_selector(&mut self, id: SelectorId, name: &str) {
        let previous = self.registry.rename_selector(id, name);
        let name = self.registry.selector(id).name.clone();
        self.enqueue(SyncOp::RenameSelector {
            id,
            name: name.clone(),
        });
        info!("Selector {} renamed", id);
        if name.is_empty() {
            println!("Selector {} name cleared (was '{}')", id, previous);
        } else {
            println!("Selector {} is now '{}'", id, name);
        }
    }

    fn run_category_command(&mut self, command: CategoryCommand) -> Result<()> {
        match command {
            CategoryCommand::List { json } => self.show_categories(json)?,

            CategoryCommand::Add {
                name,
                color,
                parent,
            } => {
                let category = self
                    .categories
                    .create(CategoryDraft::new(name, color).parent(parent))?;
                self.enqueue(SyncOp::SaveCategory(category.clone()));
                println!("Category created with ID: {}", category.id);
            }

            CategoryCommand::Update {
                id,
                name,
                color,
                parent,
                root,
            } => {
                let current = self
                    .categories
                    .get(id)
                    .ok_or(NutsError::CategoryNotFound { id })?;
                let mut draft = CategoryDraft::from(current);
                if let Some(name) = name {
                    draft.name = name;
                }
                if let Some(color) = color {
                    draft.color = color;
                }
                if root {
                    draft.parent_id = None;
                } else if parent.is_some() {
                    draft.parent_id = parent;
                }

                let category = self.categories.update(id, draft)?;
                self.enqueue(SyncOp::SaveCategory(category.clone()));
                println!("Category {} updated", category.id);
            }

            CategoryCommand::Remove { id, force } => self.remove_category(id, force)?,

            CategoryCommand::Presets => {
                for preset in CATEGORY_PRESETS.iter() {
                    println!(
                        "{:<10} {}  {}",
                        style(preset.name).bold(),
                        preset.color,
                        style(preset.description).dim()
                    );
                }
            }

            CategoryCommand::Preset { name } => {
                let category = self.categories.create_from_preset(&name)?;
                self.enqueue(SyncOp::SaveCategory(category.clone()));
                println!(
                    "Category '{}' created with ID: {}",
                    category.name, category.id
                );
            }
        }
        Ok(())
    }

    fn show_categories(&self, json: bool) -> Result<()> {
        let tree = self.categories.hierarchy();
        if json {
            println!("{}", serde_json::to_string_pretty(&tree)?);
            return Ok(());
        }
        if tree.is_empty() {
            println!("No categories yet. Try `extranuts categories presets`.");
            return Ok(());
        }

        let notes = self.store.snapshot();
        fn print_node(node: &CategoryNode, depth: usize, notes: &[Note]) {
            let count = notes
                .iter()
                .filter(|note| note.category_id == Some(node.category.id))
                .count();
            println!(
                "{}{:>3}  {}  {} ({})",
                "  ".repeat(depth),
                node.category.id,
                style(&node.category.color).dim(),
                style(&node.category.name).bold(),
                count
            );
            for child in &node.subcategories {
                print_node(child, depth + 1, notes);
            }
        }
        for node in &tree {
            print_node(node, 0, &notes);
        }
        Ok(())
    }

    /// Removes a category with its subtree and uncategorises their notes
    fn remove_category(&mut self, id: i64, force: bool) -> Result<()> {
        let ids = self.categories.subtree_ids(id);
        if ids.is_empty() {
            return Err(NutsError::CategoryNotFound { id });
        }

        if !force {
            let affected = self.store.notes_in_categories(&ids).len();
            println!(
                "This removes {} categor{} and uncategorises {} note{}.",
                ids.len(),
                if ids.len() == 1 { "y" } else { "ies" },
                affected,
                if affected == 1 { "" } else { "s" }
            );
            if !confirm("Are you sure you want to remove this category?")? {
                println!("Removal cancelled.");
                return Ok(());
            }
        }

        let removed = self.categories.remove(id)?;
        let removed_ids: Vec<i64> = removed.iter().map(|c| c.id).collect();
        let cleared = self.store.uncategorize(&removed_ids);
        for category_id in removed_ids {
            self.enqueue(SyncOp::DeleteCategory(category_id));
        }
        println!(
            "Removed {} categor{}; {} note{} uncategorised.",
            removed.len(),
            if removed.len() == 1 { "y" } else { "ies" },
            cleared.len(),
            if cleared.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    /// Queues a change the note store does not track itself
    fn enqueue(&self, op: SyncOp) {
        if let Some(handle) = self.scheduler.handle() {
            handle.enqueue(op);
        }
    }

    // Helper function for reading content from file
    fn read_content_from_file(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(NutsError::FileNotFound {
                file_path: path.display().to_string(),
            });
        }
        read_to_string(path).map_err(NutsError::Io)
    }

    /// Opens the editor on a temporary markdown file and returns what was saved
    fn open_editor(&self, title: &str, existing_content: &str) -> Result<String> {
        let temp_file = Builder::new().suffix(".md").tempfile()?;
        let temp_path = temp_file.path().to_path_buf();

        {
            let mut file = OpenOptions::new().write(true).open(&temp_path)?;
            writeln!(file, "<!-- {} -->", title)?;
            writeln!(
                file,
                "<!-- Link other notes with [[Title]] or [[Title|text]]. Comment lines are dropped. -->"
            )?;
            write!(file, "{}", existing_content)?;
        }

        let editor_cmd = self.config.get_editor_command();
        info!("Opening editor to write note content. Save and exit when done...");
        self.launch_editor(&editor_cmd, &temp_path)?;

        let content = read_to_string(&temp_path)?;
        Ok(process_editor_content(&content))
    }

    fn launch_editor(&self, editor_cmd: &str, file_path: &Path) -> Result<()> {
        let args = split(editor_cmd).map_err(|e| NutsError::EditorError {
            message: format!("Failed to parse editor command: {}", e),
        })?;

        let (program, rest) = args.split_first().ok_or_else(|| NutsError::EditorError {
            message: "Empty editor command".to_string(),
        })?;

        let status = Command::new(program).args(rest).arg(file_path).status()?;
        if !status.success() {
            return Err(NutsError::EditorError {
                message: "Editor exited with non-zero status".to_string(),
            });
        }
        Ok(())
    }
}

/// Asks a yes/no question on stdin; anything but y/yes is a no
fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N]: ", question);
    stdout().flush()?;

    let mut input = String::new();
    stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

/// Drops the `<!-- -->` comment lines the editor template adds
fn process_editor_content(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let line = line.trim();
            !(line.starts_with("<!--") && line.ends_with("-->"))
        })
        .collect::<Vec<&str>>()
        .join("\n")
}
