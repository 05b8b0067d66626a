//! Session image cache.
//!
//! Holds the full-resolution pixels of every image source a scene uses.
//! The cache is filled once while a session loads and frozen afterwards;
//! exports read from it so images are rebuilt from their original pixels
//! instead of upscaling what the edit canvas shows.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use tokio::task::JoinSet;
use vellum_common::error::{VellumError, VellumResult};
use vellum_scene_model::element::Bitmap;

/// Canonical identifier of an image source.
///
/// URLs are kept verbatim. Filesystem paths are resolved against the scene
/// directory and lexically normalized, so `./sources/a.png` and
/// `sources/../sources/a.png` name the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
    pub fn canonical(raw: &str, base_dir: &Path) -> Self {
        let raw = raw.trim();
        if is_url(raw) {
            return Self(raw.to_string());
        }
        let path = Path::new(raw);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };
        Self(normalize_path(&joined).to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        is_url(&self.0)
    }

    /// Filesystem location of the source, `None` for URLs.
    pub fn path(&self) -> Option<PathBuf> {
        (!self.is_url()).then(|| PathBuf::from(&self.0))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_url(raw: &str) -> bool {
    raw.contains("://")
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Append-only map from source to full-resolution pixels.
#[derive(Debug)]
pub struct ImageCache {
    base_dir: PathBuf,
    entries: HashMap<SourceId, Bitmap>,
    frozen: bool,
}

impl ImageCache {
    /// Empty cache resolving relative sources against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: HashMap::new(),
            frozen: false,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Canonical id of a source reference as written in a scene.
    pub fn source_id(&self, raw: &str) -> SourceId {
        SourceId::canonical(raw, &self.base_dir)
    }

    /// Add decoded pixels for a source.
    ///
    /// Returns `false` when the source is already cached; the first entry
    /// is kept. Fails once the cache is frozen.
    pub fn insert(&mut self, id: SourceId, bitmap: Bitmap) -> VellumResult<bool> {
        if self.frozen {
            return Err(VellumError::scene(format!(
                "image cache is frozen, cannot add {id}"
            )));
        }
        if self.entries.contains_key(&id) {
            tracing::debug!(source = %id, "Image already cached, keeping first entry");
            return Ok(false);
        }
        self.entries.insert(id, bitmap);
        Ok(true)
    }

    /// Stop accepting new entries.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &SourceId) -> Option<&Bitmap> {
        self.entries.get(id)
    }

    /// Full-resolution pixels for a source reference as written in a scene.
    pub fn lookup(&self, raw: &str) -> VellumResult<&Bitmap> {
        let id = self.source_id(raw);
        self.entries
            .get(&id)
            .ok_or_else(|| VellumError::cache_miss(id.as_str()))
    }

    /// Decode every source concurrently and fill a new cache with them.
    ///
    /// All decodes finish before this returns; if any of them fails the
    /// whole load fails and nothing is cached. The returned cache is frozen.
    pub async fn load<'a>(
        base_dir: impl Into<PathBuf>,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> VellumResult<Self> {
        let mut cache = Self::new(base_dir);
        let mut tasks = JoinSet::new();

        for raw in sources {
            let id = cache.source_id(raw);
            let Some(path) = id.path() else {
                return Err(VellumError::render(format!(
                    "remote image sources are not supported: {id}"
                )));
            };
            tasks.spawn_blocking(move || decode_image(&path).map(|bitmap| (id, bitmap)));
        }

        let pending = tasks.len();
        let started = std::time::Instant::now();
        let mut decoded = Vec::with_capacity(pending);
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| VellumError::Other(anyhow::anyhow!("image decode task failed: {e}")))?;
            decoded.push(result?);
        }

        for (id, bitmap) in decoded {
            cache.insert(id, bitmap)?;
        }
        cache.freeze();

        tracing::info!(
            images = cache.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image cache loaded"
        );
        Ok(cache)
    }
}

fn decode_image(path: &Path) -> VellumResult<Bitmap> {
    if !path.exists() {
        return Err(VellumError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let image = image::open(path)
        .map_err(|e| VellumError::render(format!("failed to decode {}: {e}", path.display())))?;
    let rgba = image.to_rgba8();
    tracing::debug!(
        path = %path.display(),
        width = rgba.width(),
        height = rgba.height(),
        "Decoded image"
    );
    Ok(Bitmap::new(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(color: [u8; 4]) -> Bitmap {
        Bitmap::new(RgbaImage::from_pixel(4, 3, Rgba(color)))
    }

    #[test]
    fn test_canonical_ids_normalize_paths() {
        let base = Path::new("/scenes/poster");
        let a = SourceId::canonical("./sources/photo.jpg", base);
        let b = SourceId::canonical(" sources/tmp/../photo.jpg ", base);
        let c = SourceId::canonical("sources/photo.jpg", base);
        assert_eq!(a.as_str(), "/scenes/poster/sources/photo.jpg");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_ne!(a, SourceId::canonical("other/photo.jpg", base));
    }

    #[test]
    fn test_urls_are_kept_verbatim() {
        let id = SourceId::canonical("https://cdn.example.com/a.png", Path::new("/x"));
        assert!(id.is_url());
        assert!(id.path().is_none());
        assert_eq!(id.as_str(), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_lookup_is_exact_not_suffix() {
        let base = Path::new("/scenes/s");
        let mut cache = ImageCache::new(base);
        cache
            .insert(SourceId::canonical("sources/big/photo.jpg", base), solid([255, 0, 0, 255]))
            .unwrap();

        assert!(cache.lookup("sources/big/photo.jpg").is_ok());
        let err = cache.lookup("photo.jpg").unwrap_err();
        assert!(matches!(err, VellumError::ImageCacheMiss { .. }));
    }

    #[test]
    fn test_cache_is_append_only_then_frozen() {
        let base = Path::new("/s");
        let mut cache = ImageCache::new(base);
        let id = SourceId::canonical("a.png", base);

        assert!(cache.insert(id.clone(), solid([1, 2, 3, 255])).unwrap());
        assert!(!cache.insert(id.clone(), solid([9, 9, 9, 255])).unwrap());
        assert_eq!(cache.get(&id).unwrap().image().get_pixel(0, 0).0, [1, 2, 3, 255]);

        cache.freeze();
        assert!(cache
            .insert(SourceId::canonical("b.png", base), solid([0, 0, 0, 255]))
            .is_err());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_load_decodes_all_sources() {
        let dir = std::env::temp_dir().join("vellum_test_cache_load");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("sources")).unwrap();
        RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255]))
            .save(dir.join("sources/a.png"))
            .unwrap();
        RgbaImage::from_pixel(2, 2, Rgba([40, 50, 60, 255]))
            .save(dir.join("sources/b.png"))
            .unwrap();

        let cache = ImageCache::load(&dir, ["sources/a.png", "./sources/b.png"])
            .await
            .unwrap();
        assert!(cache.is_frozen());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("sources/a.png").unwrap().width(), 8);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_load_fails_when_any_source_is_missing() {
        let dir = std::env::temp_dir().join("vellum_test_cache_missing");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::new(1, 1).save(dir.join("present.png")).unwrap();

        let err = ImageCache::load(&dir, ["present.png", "absent.png"])
            .await
            .unwrap_err();
        assert!(matches!(err, VellumError::FileNotFound { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
