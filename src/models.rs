use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModFolder {
    pub path: PathBuf,
    /// Display name with any disabled prefix removed.
    pub name: String,
    pub folder_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub thumbnail: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub is_safe: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_safe: Option<bool>,
    #[serde(default)]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfoUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_safe: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl ModInfoUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.version.is_none()
            && self.description.is_none()
            && self.is_safe.is_none()
            && self.is_favorite.is_none()
    }

    pub fn apply_to(&self, info: &mut ModInfo) {
        if let Some(title) = &self.title {
            info.title = title.clone();
        }
        if let Some(author) = &self.author {
            info.author = author.clone();
        }
        if let Some(version) = &self.version {
            info.version = version.clone();
        }
        if let Some(description) = &self.description {
            info.description = description.clone();
        }
        if let Some(is_safe) = self.is_safe {
            info.is_safe = Some(is_safe);
        }
        if let Some(is_favorite) = self.is_favorite {
            info.is_favorite = is_favorite;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IniFileEntry {
    pub filename: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IniParseMode {
    Structured,
    RawFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IniDocument {
    pub file_name: String,
    pub mode: IniParseMode,
    pub raw_lines: Vec<String>,
    #[serde(default)]
    pub variables: Vec<IniVariable>,
    #[serde(default)]
    pub key_bindings: Vec<KeyBindSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IniVariable {
    pub name: String,
    pub value: String,
    pub line_idx: usize,
    #[serde(default)]
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindSection {
    pub section_name: String,
    pub section_line: usize,
    pub entries: Vec<KeyBindEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindEntry {
    pub key: String,
    pub value: String,
    pub line_idx: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdate {
    pub line_idx: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomProposal {
    pub object_name: String,
    pub path: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub hash: String,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DupScanGroup {
    pub group_id: String,
    pub confidence: f32,
    pub members: Vec<DupMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DupMember {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DupAction {
    Disable,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DupResolution {
    pub group_id: String,
    pub keep: PathBuf,
    pub action: DupAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinStatus {
    pub valid: bool,
    #[serde(default)]
    pub attempts_remaining: u32,
    #[serde(default)]
    pub locked_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchEvent {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Removed { path: PathBuf },
    Renamed { from: PathBuf, to: PathBuf },
    Error { message: String },
}

fn default_true() -> bool {
    true
}
