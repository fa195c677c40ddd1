//! Clip catalog repository.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use reelgen_models::{ClipId, VideoClip};

use crate::error::{StoreError, StoreResult};

/// Read access to the clip catalog.
#[async_trait]
pub trait ClipCatalog: Send + Sync {
    /// Clips tagged `category`, most recent first.
    async fn list_by_category(&self, category: &str) -> StoreResult<Vec<VideoClip>>;
}

/// One entry of a catalog manifest file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub name: String,
    pub category: String,
    /// Locator relative to the media root, e.g. `/uploads/6.mp4`
    #[serde(alias = "url")]
    pub locator: String,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// In-memory clip catalog.
#[derive(Debug, Default)]
pub struct InMemoryClipCatalog {
    clips: RwLock<Vec<VideoClip>>,
}

impl InMemoryClipCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip; later registrations sort as more recent on ties.
    pub async fn add(
        &self,
        name: impl Into<String>,
        category: impl Into<String>,
        locator: impl Into<String>,
        duration: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> VideoClip {
        let mut clips = self.clips.write().await;
        let id = ClipId(clips.iter().map(|c| c.id.0).max().unwrap_or(0) + 1);
        let clip = VideoClip {
            id,
            name: name.into(),
            category: category.into(),
            locator: locator.into(),
            duration: duration.into(),
            created_at,
        };
        clips.push(clip.clone());
        clip
    }

    /// Load a JSON array of [`ManifestEntry`] values.
    pub async fn from_manifest(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let entries: Vec<ManifestEntry> = serde_json::from_slice(&raw)?;

        let catalog = Self::new();
        for entry in entries {
            if entry.category.trim().is_empty() || entry.locator.trim().is_empty() {
                return Err(StoreError::InvalidManifest(format!(
                    "entry {:?} needs a category and a locator",
                    entry.name
                )));
            }
            let duration = match entry.duration {
                Some(serde_json::Value::Number(n)) => {
                    format!("{:.2}s", n.as_f64().unwrap_or(0.0))
                }
                Some(serde_json::Value::String(s)) => s,
                _ => String::new(),
            };
            catalog
                .add(
                    entry.name,
                    entry.category.trim(),
                    entry.locator,
                    duration,
                    entry.created_at.unwrap_or_else(Utc::now),
                )
                .await;
        }

        info!(
            path = %path.display(),
            clips = catalog.len().await,
            "Loaded clip catalog manifest"
        );
        Ok(catalog)
    }

    pub async fn len(&self) -> usize {
        self.clips.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clips.read().await.is_empty()
    }
}

#[async_trait]
impl ClipCatalog for InMemoryClipCatalog {
    async fn list_by_category(&self, category: &str) -> StoreResult<Vec<VideoClip>> {
        let clips = self.clips.read().await;
        let mut matching: Vec<VideoClip> = clips
            .iter()
            .filter(|c| c.category == category)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching)
    }
}
