use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const FALLBACK_VERSION: &str = "1.0.0";
pub const UNKNOWN_DATE: &str = "Unknown date";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: String,
    pub date: String,
    #[serde(default)]
    pub sections: IndexMap<String, Vec<String>>,
}

impl Release {
    pub fn new(version: impl Into<String>, date: Option<&str>) -> Self {
        Self {
            version: version.into(),
            date: date.unwrap_or(UNKNOWN_DATE).to_string(),
            sections: IndexMap::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub releases: Vec<Release>,
}

impl Changelog {
    pub fn latest_release(&self) -> Option<&Release> {
        self.releases.first()
    }

    pub fn latest_version(&self) -> &str {
        self.latest_release()
            .map(|release| release.version.as_str())
            .unwrap_or(FALLBACK_VERSION)
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    pub version: String,
    pub build_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    CheckUpdate,
    UpdateAvailable { version: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub app: String,
    pub backend: String,
    pub has_update: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub current_version: String,
    pub last_seen_version: Option<String>,
    pub changelog_disabled: bool,
    pub build_time: Option<String>,
    pub show_dialog: bool,
    pub should_show_changelog: bool,
    pub reload_required: bool,
    pub latest_release: Option<Release>,
}
