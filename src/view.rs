//! Derived note lists.
//!
//! Everything here is a pure function of the store's collections and the
//! active filter; nothing is cached.

use std::collections::HashMap;

use crate::models::{FilterState, Folder, Note};

/// Apply the filter pipeline: project, type, tags (AND), then search text.
pub fn filter_notes<'a>(notes: &'a [Note], filter: &FilterState) -> Vec<&'a Note> {
    let query = filter.search_query.to_lowercase();

    notes
        .iter()
        .filter(|note| match &filter.project_id {
            Some(id) => note.project_id.as_ref() == Some(id),
            None => true,
        })
        .filter(|note| match &filter.type_id {
            Some(id) => note.type_id.as_ref() == Some(id),
            None => true,
        })
        .filter(|note| filter.tag_ids.iter().all(|tag_id| note.has_tag(tag_id)))
        .filter(|note| {
            query.is_empty()
                || note.title.to_lowercase().contains(&query)
                || note.content.to_lowercase().contains(&query)
        })
        .collect()
}

/// Pinned notes first, then most recently updated. Stable for equal keys.
pub fn sort_notes(notes: &mut [&Note]) {
    notes.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
}

/// The note list as the UI shows it.
pub fn visible_notes<'a>(notes: &'a [Note], filter: &FilterState) -> Vec<&'a Note> {
    let mut result = filter_notes(notes, filter);
    sort_notes(&mut result);
    result
}

/// Keep the current selection if it is still visible, otherwise fall back
/// to the first visible note (or nothing).
pub fn reconcile_selection(current: Option<&str>, visible: &[&Note]) -> Option<String> {
    match current {
        Some(id) if visible.iter().any(|note| note.id == id) => Some(id.to_string()),
        _ => visible.first().map(|note| note.id.clone()),
    }
}

// ---- Folder grouping ----

#[derive(Debug)]
pub struct FolderGroup<'a> {
    pub folder: &'a Folder,
    pub notes: Vec<&'a Note>,
}

#[derive(Debug, Default)]
pub struct GroupedNotes<'a> {
    /// Folders in creation order, each with its visible notes.
    pub folders: Vec<FolderGroup<'a>>,
    /// Notes shown at the top level.
    pub loose: Vec<&'a Note>,
}

/// Whether a folder belongs under the active project/type filter.
pub fn folder_matches(folder: &Folder, filter: &FilterState) -> bool {
    let project_ok = match &filter.project_id {
        Some(id) => folder.project_id.as_ref() == Some(id),
        None => true,
    };
    let type_ok = match &filter.type_id {
        Some(id) => folder.type_id.as_ref() == Some(id),
        None => true,
    };
    project_ok && type_ok
}

/// Partition an already filtered and sorted list into folder buckets.
///
/// Notes whose folder is hidden by the filter are listed at the top level
/// so that no visible note disappears from the list.
pub fn group_by_folder<'a>(
    visible: &[&'a Note],
    folders: &'a [Folder],
    filter: &FilterState,
) -> GroupedNotes<'a> {
    let mut groups: Vec<FolderGroup<'a>> = folders
        .iter()
        .filter(|folder| folder_matches(folder, filter))
        .map(|folder| FolderGroup {
            folder,
            notes: Vec::new(),
        })
        .collect();

    let index: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .map(|(i, group)| (group.folder.id.as_str(), i))
        .collect();

    let mut loose = Vec::new();
    for &note in visible {
        match note.folder_id.as_deref().and_then(|id| index.get(id)) {
            Some(&i) => groups[i].notes.push(note),
            None => loose.push(note),
        }
    }

    GroupedNotes {
        folders: groups,
        loose,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn note(id: &str, tags: &[&str], pinned: bool, updated_secs: i64) -> Note {
        let ts = Utc.timestamp_opt(1_700_000_000 + updated_secs, 0).unwrap();
        Note {
            id: id.to_string(),
            title: format!("Title {}", id),
            content: String::new(),
            project_id: None,
            type_id: None,
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            folder_id: None,
            is_pinned: pinned,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn folder(id: &str, project: Option<&str>) -> Folder {
        Folder {
            id: id.to_string(),
            name: id.to_uppercase(),
            project_id: project.map(str::to_string),
            type_id: None,
            created_at: Utc::now(),
        }
    }

    fn ids(notes: &[&Note]) -> Vec<String> {
        notes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_tag_filter_is_and() {
        let notes = vec![note("n1", &["a"], false, 1), note("n2", &["a", "b"], false, 2), note("n3", &["b"], false, 3)];
        let filter = FilterState {
            tag_ids: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert_eq!(ids(&filter_notes(&notes, &filter)), vec!["n2"]);
    }

    #[test]
    fn test_project_and_type_filter() {
        let mut a = note("a", &[], false, 1);
        a.project_id = Some("p1".into());
        a.type_id = Some("t1".into());
        let mut b = note("b", &[], false, 2);
        b.project_id = Some("p1".into());
        let mut c = note("c", &[], false, 3);
        c.type_id = Some("t1".into());
        let notes = vec![a, b, c];

        let by_project = FilterState {
            project_id: Some("p1".into()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_notes(&notes, &by_project)), vec!["a", "b"]);

        let by_type = FilterState {
            type_id: Some("t1".into()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_notes(&notes, &by_type)), vec!["a", "c"]);

        let both = FilterState {
            project_id: Some("p1".into()),
            type_id: Some("t1".into()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_notes(&notes, &both)), vec!["a"]);
    }

    #[test]
    fn test_search_is_case_insensitive_over_title_and_content() {
        let mut a = note("a", &[], false, 1);
        a.title = "Shopping LIST".into();
        let mut b = note("b", &[], false, 2);
        b.content = "remember the list".into();
        let c = note("c", &[], false, 3);
        let notes = vec![a, b, c];

        let filter = FilterState {
            search_query: "List".into(),
            ..Default::default()
        };
        assert_eq!(ids(&filter_notes(&notes, &filter)), vec!["a", "b"]);

        let empty = FilterState::default();
        assert_eq!(filter_notes(&notes, &empty).len(), 3);
    }

    #[test]
    fn test_sort_pinned_first_then_recent() {
        let notes = vec![
            note("t1", &[], false, 1),
            note("t2", &[], true, 2),
            note("t3", &[], true, 3),
            note("t4", &[], false, 4),
        ];
        let visible = visible_notes(&notes, &FilterState::default());
        assert_eq!(ids(&visible), vec!["t3", "t2", "t4", "t1"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let notes = vec![note("x", &[], false, 5), note("y", &[], false, 5), note("z", &[], false, 5)];
        let visible = visible_notes(&notes, &FilterState::default());
        assert_eq!(ids(&visible), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_reconcile_selection() {
        let notes = vec![note("a", &[], false, 2), note("b", &[], false, 1)];
        let visible: Vec<&Note> = notes.iter().collect();

        assert_eq!(reconcile_selection(Some("b"), &visible), Some("b".to_string()));
        assert_eq!(reconcile_selection(Some("gone"), &visible), Some("a".to_string()));
        assert_eq!(reconcile_selection(None, &visible), Some("a".to_string()));
        assert_eq!(reconcile_selection(Some("a"), &[]), None);
    }

    #[test]
    fn test_group_by_folder() {
        let folders = vec![folder("f1", Some("p1")), folder("f2", Some("p2")), folder("f3", None)];
        let mut a = note("a", &[], false, 3);
        a.folder_id = Some("f1".into());
        let mut b = note("b", &[], false, 2);
        b.folder_id = Some("f3".into());
        let c = note("c", &[], false, 1);
        let notes = vec![a, b, c];

        let filter = FilterState::default();
        let visible = visible_notes(&notes, &filter);
        let grouped = group_by_folder(&visible, &folders, &filter);

        let names: Vec<&str> = grouped.folders.iter().map(|g| g.folder.id.as_str()).collect();
        assert_eq!(names, vec!["f1", "f2", "f3"]);
        assert_eq!(ids(&grouped.folders[0].notes), vec!["a"]);
        assert!(grouped.folders[1].notes.is_empty());
        assert_eq!(ids(&grouped.folders[2].notes), vec!["b"]);
        assert_eq!(ids(&grouped.loose), vec!["c"]);
    }

    #[test]
    fn test_group_by_folder_scoped_to_project() {
        let folders = vec![folder("f1", Some("p1")), folder("f2", Some("p2"))];
        let mut a = note("a", &[], false, 2);
        a.project_id = Some("p1".into());
        a.folder_id = Some("f1".into());
        let mut b = note("b", &[], false, 1);
        b.project_id = Some("p1".into());
        b.folder_id = Some("f2".into());
        let notes = vec![a, b];

        let filter = FilterState {
            project_id: Some("p1".into()),
            ..Default::default()
        };
        let visible = visible_notes(&notes, &filter);
        let grouped = group_by_folder(&visible, &folders, &filter);

        assert_eq!(grouped.folders.len(), 1);
        assert_eq!(grouped.folders[0].folder.id, "f1");
        assert_eq!(ids(&grouped.loose), vec!["b"]);
    }
}
