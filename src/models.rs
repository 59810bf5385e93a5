use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::id::generate_id;

pub type Timestamp = DateTime<Utc>;

/// ISO 8601 with exactly three fractional digits and a `Z` suffix,
/// e.g. `2024-01-01T00:00:00.000Z`.
fn serialize_timestamp<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Title given to notes created without one.
pub const UNTITLED: &str = "Untitled";

// ---- Entities ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Display colour, e.g. "#3B82F6"
    pub color: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteType {
    pub id: String,
    pub name: String,
    /// Symbolic icon name ("CheckSquare", "FileText", ...)
    pub icon: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    /// Tags sharing a group are mutually exclusive on a single note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    // Older documents predate these two fields.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    /// Markdown body
    pub content: String,
    pub project_id: Option<String>,
    pub type_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: Timestamp,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated_at: Timestamp,
}

impl Note {
    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tag_ids.iter().any(|t| t == tag_id)
    }
}

// ---- Settings ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_code_theme")]
    pub code_theme: String,
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Editor autosave interval in milliseconds
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
}

fn default_code_theme() -> String {
    "github".to_string()
}

fn default_true() -> bool {
    true
}

fn default_auto_save_interval() -> u64 {
    3000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            code_theme: default_code_theme(),
            auto_save: true,
            auto_save_interval: default_auto_save_interval(),
        }
    }
}

// ---- Aggregate ----

/// Everything that is persisted, exported, imported or backed up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppData {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub types: Vec<NoteType>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub settings: Settings,
}

impl AppData {
    /// The dataset a fresh installation starts from.
    pub fn initial() -> Self {
        Self::initial_at(Utc::now())
    }

    pub fn initial_at(now: Timestamp) -> Self {
        let project = |name: &str, color: &str| Project {
            id: generate_id(),
            name: name.to_string(),
            color: color.to_string(),
            created_at: now,
        };
        let note_type = |name: &str, icon: &str| NoteType {
            id: generate_id(),
            name: name.to_string(),
            icon: icon.to_string(),
            created_at: now,
        };
        let tag = |name: &str| Tag {
            id: generate_id(),
            name: name.to_string(),
            group: None,
            created_at: now,
        };

        Self {
            projects: vec![project("Personal", "#3B82F6"), project("Work", "#10B981")],
            types: vec![
                note_type("Todo", "CheckSquare"),
                note_type("Note", "FileText"),
                note_type("Idea", "Lightbulb"),
                note_type("Meeting", "Users"),
            ],
            tags: vec![tag("Urgent"), tag("Important")],
            folders: Vec::new(),
            notes: Vec::new(),
            settings: Settings::default(),
        }
    }

    /// Parse a persisted document. Fields added in later schema versions
    /// default to empty/null so older exports keep loading.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Serialize with 2-space indentation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---- Transient UI state ----

/// Active note-list filter. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub project_id: Option<String>,
    pub type_id: Option<String>,
    /// AND semantics: a note must carry every one of these.
    pub tag_ids: Vec<String>,
    pub search_query: String,
}

// ---- Partial updates ----

/// Fields for a new note; anything left out takes the default.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub project_id: Option<String>,
    pub type_id: Option<String>,
    pub tag_ids: Vec<String>,
    pub folder_id: Option<String>,
}

/// Changes to an existing note. `None` leaves a field untouched; for the
/// nullable references `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub project_id: Option<Option<String>>,
    pub type_id: Option<Option<String>>,
    pub tag_ids: Option<Vec<String>>,
    pub folder_id: Option<Option<String>>,
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub project_id: Option<Option<String>>,
    pub type_id: Option<Option<String>>,
    pub tag_ids: Option<Vec<String>>,
    pub search_query: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub code_theme: Option<String>,
    pub auto_save: Option<bool>,
    pub auto_save_interval: Option<u64>,
}
