//! Clip selection: the hook plus enough main clips to fill the target length.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use reelgen_models::{ClipId, VideoClip};
use reelgen_store::ClipCatalog;

use crate::error::{PipelineError, PipelineResult};

/// A catalog clip whose backing file was confirmed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedClip {
    pub clip: VideoClip,
    /// Resolved absolute or media-root-relative path
    pub path: PathBuf,
}

/// Ordered clip set: optional hook, then the main clips in play order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClipSet {
    pub hook: Option<SelectedClip>,
    pub mains: Vec<SelectedClip>,
}

/// Main clips needed to cover `total_length`.
///
/// With a hook the fixed `hook_duration` is subtracted first, regardless of
/// how long the hook clip actually runs.
pub fn required_main_count(total_length: f64, clip_duration: f64, hook_duration: Option<f64>) -> usize {
    let remaining = match hook_duration {
        Some(hook) => total_length - hook,
        None => total_length,
    };
    if clip_duration <= 0.0 || remaining <= 0.0 {
        return 1;
    }
    // Tolerate float noise such as 1.1 / 0.1 = 11.000000000000002
    let segments = (remaining / clip_duration - 1e-9).ceil();
    (segments as usize).max(1)
}

/// Uniformly sample exactly `required` distinct clips from `pool`.
pub fn sample_clips<R: Rng + ?Sized>(
    mut pool: Vec<SelectedClip>,
    required: usize,
    rng: &mut R,
) -> PipelineResult<Vec<SelectedClip>> {
    if pool.len() < required {
        return Err(PipelineError::InsufficientClips {
            required,
            available: pool.len(),
        });
    }
    pool.shuffle(rng);
    pool.truncate(required);
    Ok(pool)
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Reads the catalog and filters it down to clips that exist on disk.
pub struct ClipSelector {
    catalog: Arc<dyn ClipCatalog>,
    media_root: PathBuf,
    hook_category: String,
}

impl ClipSelector {
    pub fn new(
        catalog: Arc<dyn ClipCatalog>,
        media_root: impl Into<PathBuf>,
        hook_category: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            media_root: media_root.into(),
            hook_category: hook_category.into(),
        }
    }

    /// Clips of `category`, most recent first, whose files are present.
    async fn present_clips(&self, category: &str) -> PipelineResult<Vec<SelectedClip>> {
        let entries = self.catalog.list_by_category(category).await?;
        debug!(category, entries = entries.len(), "Catalog lookup");

        let mut present = Vec::with_capacity(entries.len());
        for clip in entries {
            let path = clip.resolve(&self.media_root);
            if file_exists(&path).await {
                present.push(SelectedClip { clip, path });
            } else {
                warn!(category, clip = %clip.name, path = %path.display(), "Clip file missing, skipping");
            }
        }
        Ok(present)
    }

    /// The most recent hook clip whose file exists.
    ///
    /// There is no fallback: a request that asked for a hook fails when
    /// none resolves instead of producing a hookless video.
    pub async fn resolve_hook(&self) -> PipelineResult<SelectedClip> {
        let hook = self
            .present_clips(&self.hook_category)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::HookResolutionFailure {
                category: self.hook_category.clone(),
            })?;

        info!(hook = %hook.clip.name, path = %hook.path.display(), "Selected hook clip");
        Ok(hook)
    }

    /// Every present clip across `categories`.
    ///
    /// Fails with `NoClipsAvailable` as soon as one category has none.
    pub async fn valid_pool(&self, categories: &[String]) -> PipelineResult<Vec<SelectedClip>> {
        let mut seen: HashSet<ClipId> = HashSet::new();
        let mut pool = Vec::new();

        for category in categories {
            let present = self.present_clips(category).await?;
            if present.is_empty() {
                return Err(PipelineError::NoClipsAvailable {
                    category: category.clone(),
                });
            }
            pool.extend(present.into_iter().filter(|c| seen.insert(c.clip.id)));
        }

        info!(categories = ?categories, pool = pool.len(), "Collected main clip pool");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use reelgen_store::InMemoryClipCatalog;
    use tempfile::TempDir;

    /// Catalog rooted in a temp dir; `present` clips get a file on disk.
    async fn catalog_with(
        dir: &TempDir,
        clips: &[(&str, &str, bool)],
    ) -> Arc<InMemoryClipCatalog> {
        let catalog = InMemoryClipCatalog::new();
        tokio::fs::create_dir_all(dir.path().join("uploads"))
            .await
            .unwrap();
        let now = Utc::now();
        for (i, (name, category, present)) in clips.iter().enumerate() {
            let locator = format!("/uploads/{name}");
            if *present {
                tokio::fs::write(dir.path().join("uploads").join(name), b"mp4")
                    .await
                    .unwrap();
            }
            catalog
                .add(*name, *category, locator, "5.00s", now + Duration::seconds(i as i64))
                .await;
        }
        Arc::new(catalog)
    }

    fn selector(dir: &TempDir, catalog: Arc<InMemoryClipCatalog>) -> ClipSelector {
        ClipSelector::new(catalog, dir.path(), "hooks")
    }

    fn pool_of(n: usize) -> Vec<SelectedClip> {
        (0..n)
            .map(|i| SelectedClip {
                clip: VideoClip {
                    id: ClipId(i as u64 + 1),
                    name: format!("{i}.mp4"),
                    category: "gym".into(),
                    locator: format!("/uploads/{i}.mp4"),
                    duration: "5.00s".into(),
                    created_at: Utc::now(),
                },
                path: PathBuf::from(format!("/m/uploads/{i}.mp4")),
            })
            .collect()
    }

    #[test]
    fn test_required_count_with_hook() {
        assert_eq!(required_main_count(65.0, 5.0, Some(4.0)), 13);
        assert_eq!(required_main_count(64.0, 5.0, Some(4.0)), 12);
        assert_eq!(required_main_count(65.0, 5.0, None), 13);
        assert_eq!(required_main_count(60.0, 5.0, None), 12);
        assert_eq!(required_main_count(61.0, 5.0, None), 13);
    }

    #[test]
    fn test_required_count_tolerates_float_noise() {
        assert_eq!(required_main_count(1.1, 0.1, None), 11);
        assert_eq!(required_main_count(0.3, 0.1, None), 3);
    }

    #[test]
    fn test_sample_exact_count_without_duplicates() {
        let mut rng = StdRng::seed_from_u64(7);
        for pool_size in [13, 14, 40] {
            let picked = sample_clips(pool_of(pool_size), 13, &mut rng).unwrap();
            assert_eq!(picked.len(), 13);
            let ids: HashSet<ClipId> = picked.iter().map(|c| c.clip.id).collect();
            assert_eq!(ids.len(), 13);
        }
    }

    #[test]
    fn test_sample_pool_boundary() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = sample_clips(pool_of(5), 6, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientClips {
                required: 6,
                available: 5
            }
        ));

        let picked = sample_clips(pool_of(5), 5, &mut rng).unwrap();
        assert_eq!(picked.len(), 5);
    }

    #[tokio::test]
    async fn test_pool_skips_missing_files() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(
            &dir,
            &[
                ("a.mp4", "gym", true),
                ("b.mp4", "gym", false),
                ("c.mp4", "cars", true),
                ("d.mp4", "cars", true),
            ],
        )
        .await;

        let pool = selector(&dir, catalog)
            .valid_pool(&["gym".to_string(), "cars".to_string()])
            .await
            .unwrap();
        let names: Vec<&str> = pool.iter().map(|c| c.clip.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "d.mp4", "c.mp4"]);
        assert!(pool.iter().all(|c| c.path.is_file()));
    }

    #[tokio::test]
    async fn test_category_without_present_clips_fails() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(
            &dir,
            &[("a.mp4", "gym", true), ("b.mp4", "money", false)],
        )
        .await;

        let err = selector(&dir, catalog)
            .valid_pool(&["gym".to_string(), "money".to_string()])
            .await
            .unwrap_err();
        match err {
            PipelineError::NoClipsAvailable { category } => assert_eq!(category, "money"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_hook_is_most_recent_present() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(
            &dir,
            &[
                ("old-hook.mp4", "hooks", true),
                ("mid-hook.mp4", "hooks", true),
                ("new-hook.mp4", "hooks", false),
            ],
        )
        .await;

        let hook = selector(&dir, catalog).resolve_hook().await.unwrap();
        assert_eq!(hook.clip.name, "mid-hook.mp4");
    }

    #[tokio::test]
    async fn test_no_present_hook_is_fatal() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog_with(&dir, &[("gone.mp4", "hooks", false)]).await;

        let err = selector(&dir, catalog).resolve_hook().await.unwrap_err();
        assert!(matches!(err, PipelineError::HookResolutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_selection_with_exact_pool() {
        let dir = TempDir::new().unwrap();
        let clips: Vec<(String, &str, bool)> =
            (0..13).map(|i| (format!("{i}.mp4"), "gym", true)).collect();
        let refs: Vec<(&str, &str, bool)> =
            clips.iter().map(|(n, c, p)| (n.as_str(), *c, *p)).collect();
        let catalog = catalog_with(&dir, &refs).await;

        let pool = selector(&dir, catalog)
            .valid_pool(&["gym".to_string()])
            .await
            .unwrap();
        let required = required_main_count(65.0, 5.0, Some(4.0));
        let mut rng = StdRng::seed_from_u64(42);
        let picked = sample_clips(pool.clone(), required, &mut rng).unwrap();
        assert_eq!(picked.len(), 13);

        let err = sample_clips(pool, required + 1, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientClips {
                required: 14,
                available: 13
            }
        ));
    }
}
