//! Application state container.
//!
//! All mutations go through [`Store`]. Operations are synchronous and total:
//! unknown ids are ignored, deletes sweep the references they would leave
//! dangling, and the current selection is reconciled against the visible
//! note list after every call.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, SubsecRound, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::id::generate_id;
use crate::models::{
    AppData, FilterPatch, FilterState, Folder, Note, NoteDraft, NotePatch, NoteType, Project,
    Settings, SettingsPatch, Tag, Timestamp, UNTITLED,
};
use crate::view::{self, GroupedNotes};

/// Source of "now" for createdAt/updatedAt.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock at millisecond resolution.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(3)
    }
}

pub type SharedStore = Arc<Mutex<Store>>;

pub struct Store {
    data: AppData,
    current_note_id: Option<String>,
    filter: FilterState,
    clock: Box<dyn Clock>,
    /// Bumped on every change to a persisted collection.
    revision: u64,
    changes: watch::Sender<u64>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        let data = AppData::initial_at(clock.now());
        Self {
            data,
            current_note_id: None,
            filter: FilterState::default(),
            clock,
            revision: 0,
            changes: watch::Sender::new(0),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ---- Reads ----

    pub fn notes(&self) -> &[Note] {
        &self.data.notes
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.data.notes.iter().find(|n| n.id == id)
    }

    pub fn projects(&self) -> &[Project] {
        &self.data.projects
    }

    pub fn types(&self) -> &[NoteType] {
        &self.data.types
    }

    pub fn tags(&self) -> &[Tag] {
        &self.data.tags
    }

    pub fn folders(&self) -> &[Folder] {
        &self.data.folders
    }

    pub fn settings(&self) -> &Settings {
        &self.data.settings
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn current_note_id(&self) -> Option<&str> {
        self.current_note_id.as_deref()
    }

    pub fn current_note(&self) -> Option<&Note> {
        self.current_note_id.as_deref().and_then(|id| self.note(id))
    }

    /// Filtered notes, pinned first then most recently updated.
    pub fn visible_notes(&self) -> Vec<&Note> {
        view::visible_notes(&self.data.notes, &self.filter)
    }

    pub fn grouped_notes(&self) -> GroupedNotes<'_> {
        let visible = self.visible_notes();
        view::group_by_folder(&visible, &self.data.folders, &self.filter)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Change feed for the persisted collections. The receiver yields the
    /// latest revision; intermediate values may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // ---- Notes ----

    /// Create a note, put it at the top of the collection and select it.
    pub fn create_note(&mut self, draft: NoteDraft) -> String {
        let now = self.clock.now();
        let title = draft.title.filter(|t| !t.is_empty()).unwrap_or_else(|| UNTITLED.to_string());

        let note = Note {
            id: generate_id(),
            title,
            content: draft.content.unwrap_or_default(),
            project_id: self.known_project(draft.project_id),
            type_id: self.known_type(draft.type_id),
            tag_ids: self.normalize_tag_ids(draft.tag_ids),
            folder_id: self.known_folder(draft.folder_id),
            is_pinned: false,
            created_at: now,
            updated_at: now,
        };
        let id = note.id.clone();
        debug!(note_id = %id, "note created");

        self.data.notes.insert(0, note);
        self.current_note_id = Some(id.clone());
        self.commit(true);
        id
    }

    /// Merge `patch` into the note and refresh its updatedAt.
    pub fn update_note(&mut self, id: &str, patch: NotePatch) {
        let Some(index) = self.note_index(id) else {
            return;
        };

        let project_id = patch.project_id.map(|p| self.known_project(p));
        let type_id = patch.type_id.map(|t| self.known_type(t));
        let folder_id = patch.folder_id.map(|f| self.known_folder(f));
        let tag_ids = patch.tag_ids.map(|t| self.normalize_tag_ids(t));
        let stamp = self.stamp_after(self.data.notes[index].updated_at);

        let note = &mut self.data.notes[index];
        if let Some(title) = patch.title {
            note.title = title;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        if let Some(project_id) = project_id {
            note.project_id = project_id;
        }
        if let Some(type_id) = type_id {
            note.type_id = type_id;
        }
        if let Some(folder_id) = folder_id {
            note.folder_id = folder_id;
        }
        if let Some(tag_ids) = tag_ids {
            note.tag_ids = tag_ids;
        }
        if let Some(is_pinned) = patch.is_pinned {
            note.is_pinned = is_pinned;
        }
        note.updated_at = stamp;

        self.commit(true);
    }

    pub fn delete_note(&mut self, id: &str) {
        let before = self.data.notes.len();
        self.data.notes.retain(|n| n.id != id);
        if self.data.notes.len() == before {
            return;
        }
        if self.current_note_id.as_deref() == Some(id) {
            self.current_note_id = None;
        }
        debug!(note_id = %id, "note deleted");
        self.commit(true);
    }

    /// Select a note for the editor. Falls back to the first visible note
    /// when `id` is not in the current list.
    pub fn select_note(&mut self, id: Option<&str>) {
        self.current_note_id = id.map(str::to_string);
        self.commit(false);
    }

    /// Flip isPinned. Leaves updatedAt alone.
    pub fn toggle_pin_note(&mut self, id: &str) {
        let Some(index) = self.note_index(id) else {
            return;
        };
        let note = &mut self.data.notes[index];
        note.is_pinned = !note.is_pinned;
        self.commit(true);
    }

    /// Add or remove a tag on a note. Adding a grouped tag drops the note's
    /// other tags from that group.
    pub fn toggle_note_tag(&mut self, note_id: &str, tag_id: &str) {
        let Some(index) = self.note_index(note_id) else {
            return;
        };
        if self.tag(tag_id).is_none() {
            return;
        }

        let mut tag_ids = self.data.notes[index].tag_ids.clone();
        if tag_ids.iter().any(|t| t == tag_id) {
            tag_ids.retain(|t| t != tag_id);
        } else {
            tag_ids.push(tag_id.to_string());
        }

        self.update_note(
            note_id,
            NotePatch {
                tag_ids: Some(tag_ids),
                ..Default::default()
            },
        );
    }

    // ---- Projects ----

    pub fn create_project(&mut self, name: &str, color: &str) -> String {
        let project = Project {
            id: generate_id(),
            name: name.to_string(),
            color: color.to_string(),
            created_at: self.clock.now(),
        };
        let id = project.id.clone();
        self.data.projects.push(project);
        self.commit(true);
        id
    }

    pub fn update_project(&mut self, id: &str, name: &str, color: &str) {
        let Some(project) = self.data.projects.iter_mut().find(|p| p.id == id) else {
            return;
        };
        project.name = name.to_string();
        project.color = color.to_string();
        self.commit(true);
    }

    /// Remove a project; notes and folders that referenced it become
    /// unassigned.
    pub fn delete_project(&mut self, id: &str) {
        let before = self.data.projects.len();
        self.data.projects.retain(|p| p.id != id);
        if self.data.projects.len() == before {
            return;
        }

        let mut swept = 0;
        for note in self.data.notes.iter_mut().filter(|n| n.project_id.as_deref() == Some(id)) {
            note.project_id = None;
            swept += 1;
        }
        for folder in self.data.folders.iter_mut().filter(|f| f.project_id.as_deref() == Some(id)) {
            folder.project_id = None;
        }
        if self.filter.project_id.as_deref() == Some(id) {
            self.filter.project_id = None;
        }
        debug!(project_id = %id, notes = swept, "project deleted");
        self.commit(true);
    }

    // ---- Types ----

    pub fn create_type(&mut self, name: &str, icon: &str) -> String {
        let note_type = NoteType {
            id: generate_id(),
            name: name.to_string(),
            icon: icon.to_string(),
            created_at: self.clock.now(),
        };
        let id = note_type.id.clone();
        self.data.types.push(note_type);
        self.commit(true);
        id
    }

    pub fn update_type(&mut self, id: &str, name: &str, icon: &str) {
        let Some(note_type) = self.data.types.iter_mut().find(|t| t.id == id) else {
            return;
        };
        note_type.name = name.to_string();
        note_type.icon = icon.to_string();
        self.commit(true);
    }

    pub fn delete_type(&mut self, id: &str) {
        let before = self.data.types.len();
        self.data.types.retain(|t| t.id != id);
        if self.data.types.len() == before {
            return;
        }

        for note in self.data.notes.iter_mut().filter(|n| n.type_id.as_deref() == Some(id)) {
            note.type_id = None;
        }
        for folder in self.data.folders.iter_mut().filter(|f| f.type_id.as_deref() == Some(id)) {
            folder.type_id = None;
        }
        if self.filter.type_id.as_deref() == Some(id) {
            self.filter.type_id = None;
        }
        debug!(type_id = %id, "type deleted");
        self.commit(true);
    }

    // ---- Tags ----

    pub fn create_tag(&mut self, name: &str, group: Option<&str>) -> String {
        let tag = Tag {
            id: generate_id(),
            name: name.to_string(),
            group: group.map(str::to_string),
            created_at: self.clock.now(),
        };
        let id = tag.id.clone();
        self.data.tags.push(tag);
        self.commit(true);
        id
    }

    /// Rename and regroup a tag. Notes carrying it lose any other tag that
    /// now shares its group.
    pub fn update_tag(&mut self, id: &str, name: &str, group: Option<&str>) {
        let Some(tag) = self.data.tags.iter_mut().find(|t| t.id == id) else {
            return;
        };
        tag.name = name.to_string();
        tag.group = group.map(str::to_string);

        if let Some(group) = group {
            let siblings: HashSet<String> = self
                .data
                .tags
                .iter()
                .filter(|t| t.id != id && t.group.as_deref() == Some(group))
                .map(|t| t.id.clone())
                .collect();
            if !siblings.is_empty() {
                for note in self.data.notes.iter_mut().filter(|n| n.has_tag(id)) {
                    note.tag_ids.retain(|t| !siblings.contains(t));
                }
            }
        }
        self.commit(true);
    }

    /// Remove a tag from the collection and from every note.
    pub fn delete_tag(&mut self, id: &str) {
        let before = self.data.tags.len();
        self.data.tags.retain(|t| t.id != id);
        if self.data.tags.len() == before {
            return;
        }

        for note in self.data.notes.iter_mut() {
            note.tag_ids.retain(|t| t != id);
        }
        self.filter.tag_ids.retain(|t| t != id);
        debug!(tag_id = %id, "tag deleted");
        self.commit(true);
    }

    // ---- Folders ----

    pub fn create_folder(
        &mut self,
        name: &str,
        project_id: Option<&str>,
        type_id: Option<&str>,
    ) -> String {
        let folder = Folder {
            id: generate_id(),
            name: name.to_string(),
            project_id: self.known_project(project_id.map(str::to_string)),
            type_id: self.known_type(type_id.map(str::to_string)),
            created_at: self.clock.now(),
        };
        let id = folder.id.clone();
        self.data.folders.push(folder);
        self.commit(true);
        id
    }

    pub fn update_folder(&mut self, id: &str, name: &str) {
        let Some(folder) = self.data.folders.iter_mut().find(|f| f.id == id) else {
            return;
        };
        folder.name = name.to_string();
        self.commit(true);
    }

    /// Remove a folder; its notes move to the top level.
    pub fn delete_folder(&mut self, id: &str) {
        let before = self.data.folders.len();
        self.data.folders.retain(|f| f.id != id);
        if self.data.folders.len() == before {
            return;
        }

        for note in self.data.notes.iter_mut().filter(|n| n.folder_id.as_deref() == Some(id)) {
            note.folder_id = None;
        }
        debug!(folder_id = %id, "folder deleted");
        self.commit(true);
    }

    // ---- Filter ----

    pub fn set_filter(&mut self, patch: FilterPatch) {
        if let Some(project_id) = patch.project_id {
            self.filter.project_id = project_id;
        }
        if let Some(type_id) = patch.type_id {
            self.filter.type_id = type_id;
        }
        if let Some(tag_ids) = patch.tag_ids {
            self.filter.tag_ids = tag_ids;
        }
        if let Some(search_query) = patch.search_query {
            self.filter.search_query = search_query;
        }
        self.commit(false);
    }

    pub fn reset_filter(&mut self) {
        self.filter = FilterState::default();
        self.commit(false);
    }

    // ---- Settings ----

    pub fn toggle_theme(&mut self) {
        self.data.settings.theme = self.data.settings.theme.toggled();
        self.commit(true);
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        let settings = &mut self.data.settings;
        if let Some(theme) = patch.theme {
            settings.theme = theme;
        }
        if let Some(code_theme) = patch.code_theme {
            settings.code_theme = code_theme;
        }
        if let Some(auto_save) = patch.auto_save {
            settings.auto_save = auto_save;
        }
        if let Some(interval) = patch.auto_save_interval {
            settings.auto_save_interval = interval;
        }
        self.commit(true);
    }

    // ---- Whole-dataset operations ----

    /// Replace every persisted collection. Selection and filter are kept and
    /// reconciled against the new notes.
    pub fn load_data(&mut self, data: AppData) {
        // Folder projectId/typeId are already defaulted to null by the
        // document parser for older exports.
        debug!(
            notes = data.notes.len(),
            folders = data.folders.len(),
            tags = data.tags.len(),
            "loading data"
        );
        self.data = data;
        self.repair_references();
        self.commit(true);
    }

    /// Snapshot of everything that is persisted.
    pub fn export_data(&self) -> AppData {
        self.data.clone()
    }

    /// Back to the seed dataset with no selection and no filter.
    pub fn reset_data(&mut self) {
        self.data = AppData::initial_at(self.clock.now());
        self.current_note_id = None;
        self.filter = FilterState::default();
        self.commit(true);
    }

    // ---- Internals ----

    fn commit(&mut self, persisted: bool) {
        self.reconcile_selection();
        if persisted {
            self.revision += 1;
            self.changes.send_replace(self.revision);
        }
    }

    fn reconcile_selection(&mut self) {
        let visible = view::visible_notes(&self.data.notes, &self.filter);
        let selection = view::reconcile_selection(self.current_note_id.as_deref(), &visible);
        self.current_note_id = selection;
    }

    /// Strictly after `previous`, even if the clock has not moved.
    fn stamp_after(&self, previous: Timestamp) -> Timestamp {
        let now = self.clock.now();
        if now > previous {
            now
        } else {
            previous + Duration::milliseconds(1)
        }
    }

    fn note_index(&self, id: &str) -> Option<usize> {
        self.data.notes.iter().position(|n| n.id == id)
    }

    fn tag(&self, id: &str) -> Option<&Tag> {
        self.data.tags.iter().find(|t| t.id == id)
    }

    /// Bring loaded data in line with what the write paths guarantee:
    /// no dangling references and at most one tag per group on a note.
    fn repair_references(&mut self) {
        let mut folders = std::mem::take(&mut self.data.folders);
        for folder in &mut folders {
            folder.project_id = self.known_project(folder.project_id.take());
            folder.type_id = self.known_type(folder.type_id.take());
        }
        self.data.folders = folders;

        let mut notes = std::mem::take(&mut self.data.notes);
        let mut repaired = 0;
        for note in &mut notes {
            let before = note.clone();
            note.project_id = self.known_project(note.project_id.take());
            note.type_id = self.known_type(note.type_id.take());
            note.folder_id = self.known_folder(note.folder_id.take());
            note.tag_ids = self.normalize_tag_ids(std::mem::take(&mut note.tag_ids));
            if *note != before {
                repaired += 1;
            }
        }
        self.data.notes = notes;

        if repaired > 0 {
            warn!(notes = repaired, "repaired references in loaded data");
        }
    }

    fn known_project(&self, id: Option<String>) -> Option<String> {
        id.filter(|id| self.data.projects.iter().any(|p| &p.id == id))
    }

    fn known_type(&self, id: Option<String>) -> Option<String> {
        id.filter(|id| self.data.types.iter().any(|t| &t.id == id))
    }

    fn known_folder(&self, id: Option<String>) -> Option<String> {
        id.filter(|id| self.data.folders.iter().any(|f| &f.id == id))
    }

    /// Drop unknown and duplicate ids and keep at most one tag per group.
    /// Later ids win over earlier ones from the same group.
    fn normalize_tag_ids(&self, ids: Vec<String>) -> Vec<String> {
        let mut seen_ids = HashSet::new();
        let mut seen_groups = HashSet::new();
        let mut kept = Vec::with_capacity(ids.len());

        for id in ids.into_iter().rev() {
            let Some(tag) = self.tag(&id) else {
                continue;
            };
            if seen_ids.contains(&id) {
                continue;
            }
            if let Some(group) = &tag.group {
                if !seen_groups.insert(group.clone()) {
                    continue;
                }
            }
            seen_ids.insert(id.clone());
            kept.push(id);
        }

        kept.reverse();
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to.
    struct ManualClock(Arc<AtomicI64>);

    impl Clock for ManualClock {
        fn now(&self) -> Timestamp {
            Utc.timestamp_millis_opt(self.0.load(Ordering::SeqCst)).unwrap()
        }
    }

    fn store_with_clock() -> (Store, Arc<AtomicI64>) {
        let millis = Arc::new(AtomicI64::new(1_700_000_000_000));
        let store = Store::with_clock(Box::new(ManualClock(Arc::clone(&millis))));
        (store, millis)
    }

    fn titled(title: &str) -> NoteDraft {
        NoteDraft {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    /// Every reference in the store points at something that exists and no
    /// note holds two tags of one group.
    fn assert_consistent(store: &Store) {
        let projects: HashSet<&str> = store.projects().iter().map(|p| p.id.as_str()).collect();
        let types: HashSet<&str> = store.types().iter().map(|t| t.id.as_str()).collect();
        let folders: HashSet<&str> = store.folders().iter().map(|f| f.id.as_str()).collect();

        for note in store.notes() {
            if let Some(p) = &note.project_id {
                assert!(projects.contains(p.as_str()), "dangling project on {}", note.id);
            }
            if let Some(t) = &note.type_id {
                assert!(types.contains(t.as_str()), "dangling type on {}", note.id);
            }
            if let Some(f) = &note.folder_id {
                assert!(folders.contains(f.as_str()), "dangling folder on {}", note.id);
            }
            let mut groups = HashSet::new();
            for tag_id in &note.tag_ids {
                let tag = store.tag(tag_id).expect("dangling tag");
                if let Some(group) = &tag.group {
                    assert!(groups.insert(group.clone()), "group clash on {}", note.id);
                }
            }
        }
        for folder in store.folders() {
            if let Some(p) = &folder.project_id {
                assert!(projects.contains(p.as_str()));
            }
            if let Some(t) = &folder.type_id {
                assert!(types.contains(t.as_str()));
            }
        }
    }

    #[test]
    fn test_new_store_has_seed_data() {
        let store = Store::new();
        assert_eq!(store.projects().len(), 2);
        assert_eq!(store.types().len(), 4);
        assert_eq!(store.tags().len(), 2);
        assert!(store.notes().is_empty());
        assert_eq!(store.current_note_id(), None);
    }

    #[test]
    fn test_create_note_defaults_and_selection() {
        let (mut store, _) = store_with_clock();
        let first = store.create_note(NoteDraft::default());
        let second = store.create_note(NoteDraft {
            title: Some(String::new()),
            content: Some("body".into()),
            ..Default::default()
        });

        let note = store.note(&first).unwrap();
        assert_eq!(note.title, UNTITLED);
        assert_eq!(note.content, "");
        assert!(!note.is_pinned);
        assert_eq!(note.created_at, note.updated_at);

        assert_eq!(store.note(&second).unwrap().title, UNTITLED);
        assert_eq!(store.notes()[0].id, second);
        assert_eq!(store.current_note_id(), Some(second.as_str()));
    }

    #[test]
    fn test_create_note_drops_unknown_references() {
        let mut store = Store::new();
        let project = store.projects()[0].id.clone();
        let id = store.create_note(NoteDraft {
            project_id: Some(project.clone()),
            type_id: Some("missing".into()),
            folder_id: Some("missing".into()),
            tag_ids: vec!["missing".into()],
            ..Default::default()
        });
        let note = store.note(&id).unwrap();
        assert_eq!(note.project_id, Some(project));
        assert_eq!(note.type_id, None);
        assert_eq!(note.folder_id, None);
        assert!(note.tag_ids.is_empty());
    }

    #[test]
    fn test_update_note_advances_updated_at() {
        let (mut store, millis) = store_with_clock();
        let id = store.create_note(titled("a"));
        let created = store.note(&id).unwrap().updated_at;

        // Clock has not moved: still strictly later.
        store.update_note(
            &id,
            NotePatch {
                content: Some("x".into()),
                ..Default::default()
            },
        );
        let first = store.note(&id).unwrap().updated_at;
        assert!(first > created);

        millis.fetch_add(5_000, Ordering::SeqCst);
        store.update_note(
            &id,
            NotePatch {
                title: Some("b".into()),
                ..Default::default()
            },
        );
        let note = store.note(&id).unwrap();
        assert_eq!(note.title, "b");
        assert_eq!(note.content, "x");
        assert!(note.updated_at > first);
        assert_eq!(note.created_at, created);
    }

    #[test]
    fn test_update_unknown_note_is_noop() {
        let mut store = Store::new();
        let revision = store.revision();
        store.update_note("nope", NotePatch::default());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_toggle_pin_keeps_updated_at() {
        let (mut store, millis) = store_with_clock();
        let id = store.create_note(titled("a"));
        let before = store.note(&id).unwrap().updated_at;

        millis.fetch_add(60_000, Ordering::SeqCst);
        store.toggle_pin_note(&id);

        let note = store.note(&id).unwrap();
        assert!(note.is_pinned);
        assert_eq!(note.updated_at, before);

        store.toggle_pin_note(&id);
        assert!(!store.note(&id).unwrap().is_pinned);
    }

    #[test]
    fn test_delete_selected_note_moves_selection() {
        let (mut store, millis) = store_with_clock();
        let a = store.create_note(titled("a"));
        millis.fetch_add(1_000, Ordering::SeqCst);
        let b = store.create_note(titled("b"));
        assert_eq!(store.current_note_id(), Some(b.as_str()));

        store.delete_note(&b);
        assert_eq!(store.current_note_id(), Some(a.as_str()));

        store.delete_note(&a);
        assert_eq!(store.current_note_id(), None);
    }

    #[test]
    fn test_selection_follows_filter() {
        let mut store = Store::new();
        let project = store.projects()[0].id.clone();
        let in_project = store.create_note(NoteDraft {
            project_id: Some(project.clone()),
            ..Default::default()
        });
        let outside = store.create_note(titled("other"));
        assert_eq!(store.current_note_id(), Some(outside.as_str()));

        store.set_filter(FilterPatch {
            project_id: Some(Some(project)),
            ..Default::default()
        });
        assert_eq!(store.current_note_id(), Some(in_project.as_str()));

        store.set_filter(FilterPatch {
            search_query: Some("zzz".into()),
            ..Default::default()
        });
        assert_eq!(store.current_note_id(), None);

        store.reset_filter();
        assert_eq!(store.filter(), &FilterState::default());
        assert!(store.current_note_id().is_some());
    }

    #[test]
    fn test_select_note() {
        let mut store = Store::new();
        let a = store.create_note(titled("a"));
        let b = store.create_note(titled("b"));
        store.select_note(Some(&a));
        assert_eq!(store.current_note_id(), Some(a.as_str()));
        assert_eq!(store.current_note().unwrap().title, "a");

        // Unknown ids fall back to the head of the list.
        store.select_note(Some("missing"));
        assert_eq!(store.current_note_id(), Some(b.as_str()));
    }

    #[test]
    fn test_delete_project_sweeps_notes_and_folders() {
        let mut store = Store::new();
        let project = store.create_project("Garden", "#00FF00");
        let folder = store.create_folder("Beds", Some(&project), None);
        let note = store.create_note(NoteDraft {
            project_id: Some(project.clone()),
            folder_id: Some(folder.clone()),
            ..Default::default()
        });
        store.set_filter(FilterPatch {
            project_id: Some(Some(project.clone())),
            ..Default::default()
        });

        store.delete_project(&project);

        assert!(store.projects().iter().all(|p| p.id != project));
        assert_eq!(store.note(&note).unwrap().project_id, None);
        assert_eq!(store.note(&note).unwrap().folder_id, Some(folder.clone()));
        assert_eq!(store.folders()[0].project_id, None);
        assert_eq!(store.filter().project_id, None);
        assert_consistent(&store);
    }

    #[test]
    fn test_delete_type_sweeps_notes_and_folders() {
        let mut store = Store::new();
        let note_type = store.types()[1].id.clone();
        store.create_folder("Specs", None, Some(&note_type));
        let note = store.create_note(NoteDraft {
            type_id: Some(note_type.clone()),
            ..Default::default()
        });

        store.delete_type(&note_type);

        assert_eq!(store.types().len(), 3);
        assert_eq!(store.note(&note).unwrap().type_id, None);
        assert_eq!(store.folders()[0].type_id, None);
        assert_consistent(&store);
    }

    #[test]
    fn test_delete_tag_sweeps_notes() {
        let mut store = Store::new();
        let a = store.create_tag("a", None);
        let b = store.create_tag("b", None);
        let note = store.create_note(NoteDraft {
            tag_ids: vec![a.clone(), b.clone()],
            ..Default::default()
        });
        store.set_filter(FilterPatch {
            tag_ids: Some(vec![a.clone()]),
            ..Default::default()
        });

        store.delete_tag(&a);

        assert_eq!(store.note(&note).unwrap().tag_ids, vec![b]);
        assert!(store.filter().tag_ids.is_empty());
        assert_consistent(&store);
    }

    #[test]
    fn test_delete_folder_moves_notes_to_top_level() {
        let mut store = Store::new();
        let folder = store.create_folder("Inbox", None, None);
        let note = store.create_note(NoteDraft {
            folder_id: Some(folder.clone()),
            ..Default::default()
        });
        assert_eq!(store.grouped_notes().folders[0].notes.len(), 1);

        store.delete_folder(&folder);

        assert!(store.folders().is_empty());
        assert_eq!(store.note(&note).unwrap().folder_id, None);
        assert_eq!(store.grouped_notes().loose.len(), 1);
    }

    #[test]
    fn test_update_entities() {
        let mut store = Store::new();
        let project = store.create_project("A", "#000");
        store.update_project(&project, "B", "#fff");
        let note_type = store.create_type("Log", "Book");
        store.update_type(&note_type, "Journal", "Pen");
        let folder = store.create_folder("Old", None, None);
        store.update_folder(&folder, "New");

        let p = store.projects().iter().find(|p| p.id == project).unwrap();
        assert_eq!((p.name.as_str(), p.color.as_str()), ("B", "#fff"));
        let t = store.types().iter().find(|t| t.id == note_type).unwrap();
        assert_eq!((t.name.as_str(), t.icon.as_str()), ("Journal", "Pen"));
        assert_eq!(store.folders()[0].name, "New");
    }

    #[test]
    fn test_tag_group_exclusive_on_create_and_update() {
        let mut store = Store::new();
        let low = store.create_tag("low", Some("priority"));
        let high = store.create_tag("high", Some("priority"));
        let misc = store.create_tag("misc", None);

        let note = store.create_note(NoteDraft {
            tag_ids: vec![low.clone(), misc.clone(), high.clone()],
            ..Default::default()
        });
        assert_eq!(store.note(&note).unwrap().tag_ids, vec![misc.clone(), high.clone()]);

        store.update_note(
            &note,
            NotePatch {
                tag_ids: Some(vec![high.clone(), low.clone(), low.clone()]),
                ..Default::default()
            },
        );
        assert_eq!(store.note(&note).unwrap().tag_ids, vec![low]);
        assert_consistent(&store);
    }

    #[test]
    fn test_toggle_note_tag_deselects_group_siblings() {
        let mut store = Store::new();
        let todo = store.create_tag("todo", Some("status"));
        let done = store.create_tag("done", Some("status"));
        let note = store.create_note(titled("task"));

        store.toggle_note_tag(&note, &todo);
        assert_eq!(store.note(&note).unwrap().tag_ids, vec![todo.clone()]);

        store.toggle_note_tag(&note, &done);
        assert_eq!(store.note(&note).unwrap().tag_ids, vec![done.clone()]);

        store.toggle_note_tag(&note, &done);
        assert!(store.note(&note).unwrap().tag_ids.is_empty());
    }

    #[test]
    fn test_update_tag_into_group_resolves_clashes() {
        let mut store = Store::new();
        let red = store.create_tag("red", Some("color"));
        let blue = store.create_tag("blue", None);
        let note = store.create_note(NoteDraft {
            tag_ids: vec![red.clone(), blue.clone()],
            ..Default::default()
        });

        store.update_tag(&blue, "blue", Some("color"));

        assert_eq!(store.note(&note).unwrap().tag_ids, vec![blue.clone()]);
        let tag = store.tags().iter().find(|t| t.id == blue).unwrap();
        assert_eq!(tag.group.as_deref(), Some("color"));
        assert_consistent(&store);
    }

    #[test]
    fn test_settings() {
        let mut store = Store::new();
        store.toggle_theme();
        assert_eq!(store.settings().theme, Theme::Dark);
        store.update_settings(SettingsPatch {
            code_theme: Some("monokai".into()),
            auto_save_interval: Some(500),
            ..Default::default()
        });
        let settings = store.settings();
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.code_theme, "monokai");
        assert_eq!(settings.auto_save_interval, 500);
        assert!(settings.auto_save);
    }

    #[test]
    fn test_export_load_round_trip() {
        let mut store = Store::new();
        let tag = store.create_tag("x", Some("g"));
        let folder = store.create_folder("f", None, None);
        store.create_note(NoteDraft {
            title: Some("hello".into()),
            content: Some("world".into()),
            tag_ids: vec![tag],
            folder_id: Some(folder),
            ..Default::default()
        });
        store.toggle_theme();
        let exported = store.export_data();

        let mut fresh = Store::new();
        fresh.load_data(exported.clone());
        assert_eq!(fresh.export_data(), exported);

        let json = exported.to_json_pretty().unwrap();
        let mut reparsed = Store::new();
        reparsed.load_data(AppData::from_json(&json).unwrap());
        assert_eq!(reparsed.export_data(), exported);
    }

    #[test]
    fn test_load_data_reconciles_selection() {
        let mut source = Store::new();
        let id = source.create_note(titled("only"));
        let data = source.export_data();

        let mut store = Store::new();
        store.load_data(data);
        assert_eq!(store.current_note_id(), Some(id.as_str()));
    }

    #[test]
    fn test_load_data_resolves_group_clash() {
        let mut source = Store::new();
        let red = source.create_tag("red", Some("g"));
        let blue = source.create_tag("blue", Some("g"));
        let free = source.create_tag("free", None);
        let note = source.create_note(titled("clash"));

        let mut data = source.export_data();
        data.notes[0].tag_ids = vec![red.clone(), free.clone(), blue.clone(), red.clone()];

        let mut store = Store::new();
        store.load_data(data);
        assert_eq!(store.note(&note).unwrap().tag_ids, vec![free, red]);
        assert_consistent(&store);
    }

    #[test]
    fn test_load_data_drops_dangling_references() {
        let mut source = Store::new();
        let folder = source.create_folder("f", None, None);
        let note = source.create_note(NoteDraft {
            folder_id: Some(folder.clone()),
            ..Default::default()
        });

        let mut data = source.export_data();
        data.notes[0].project_id = Some("gone-project".into());
        data.notes[0].type_id = Some("gone-type".into());
        data.notes[0].tag_ids = vec!["gone-tag".into()];
        data.folders[0].project_id = Some("gone-project".into());

        let mut store = Store::new();
        store.load_data(data);
        let loaded = store.note(&note).unwrap();
        assert_eq!(loaded.project_id, None);
        assert_eq!(loaded.type_id, None);
        assert!(loaded.tag_ids.is_empty());
        assert_eq!(loaded.folder_id.as_deref(), Some(folder.as_str()));
        assert_eq!(store.folders()[0].project_id, None);
        assert_consistent(&store);
    }

    #[test]
    fn test_reset_data() {
        let mut store = Store::new();
        store.create_note(titled("a"));
        store.create_folder("f", None, None);
        store.set_filter(FilterPatch {
            search_query: Some("a".into()),
            ..Default::default()
        });

        store.reset_data();

        assert!(store.notes().is_empty());
        assert!(store.folders().is_empty());
        assert_eq!(store.projects().len(), 2);
        assert_eq!(store.types().len(), 4);
        assert_eq!(store.tags().len(), 2);
        assert_eq!(store.current_note_id(), None);
        assert_eq!(store.filter(), &FilterState::default());
    }

    #[test]
    fn test_change_feed_only_for_persisted_state() {
        let mut store = Store::new();
        let rx = store.subscribe();
        let start = *rx.borrow();

        store.set_filter(FilterPatch {
            search_query: Some("q".into()),
            ..Default::default()
        });
        store.select_note(None);
        assert_eq!(*rx.borrow(), start);

        store.create_note(NoteDraft::default());
        assert_eq!(*rx.borrow(), start + 1);
        store.create_folder("f", None, None);
        store.toggle_theme();
        assert_eq!(*rx.borrow(), start + 3);
    }

    #[test]
    fn test_random_operation_sequence_stays_consistent() {
        let mut store = Store::new();
        let mut notes = Vec::new();
        for i in 0..30 {
            let project = store.create_project(&format!("p{}", i), "#111");
            let folder = store.create_folder(&format!("f{}", i), Some(&project), None);
            let tag = store.create_tag(&format!("t{}", i), Some(if i % 2 == 0 { "even" } else { "odd" }));
            let note = store.create_note(NoteDraft {
                project_id: Some(project.clone()),
                folder_id: Some(folder.clone()),
                tag_ids: store.tags().iter().map(|t| t.id.clone()).collect(),
                ..Default::default()
            });
            notes.push(note.clone());
            store.toggle_note_tag(&note, &tag);

            match i % 4 {
                0 => store.delete_project(&project),
                1 => store.delete_folder(&folder),
                2 => store.delete_tag(&tag),
                _ => store.delete_note(&notes[i / 2]),
            }
            assert_consistent(&store);
        }
    }
}
