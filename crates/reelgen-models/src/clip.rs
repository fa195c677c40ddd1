//! Catalog clip metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Category tag reserved for hook clips.
pub const DEFAULT_HOOK_CATEGORY: &str = "hooks";

/// Catalog clip identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reusable source clip registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoClip {
    pub id: ClipId,
    pub name: String,
    pub category: String,
    /// Storage locator, e.g. `/uploads/1738341933460-6.mp4`
    pub locator: String,
    /// Runtime as recorded at upload time, e.g. `"12.40s"`
    pub duration: String,
    pub created_at: DateTime<Utc>,
}

impl VideoClip {
    /// Resolve the locator against the media root.
    ///
    /// Locators are rooted at the media directory, so the leading slash is
    /// stripped before joining.
    pub fn resolve(&self, media_root: &Path) -> PathBuf {
        media_root.join(self.locator.trim_start_matches('/'))
    }
}
