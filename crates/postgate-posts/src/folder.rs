//! Read-only view of a post folder on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

/// Required metadata file; its presence makes a directory a post folder.
pub const META_FILE: &str = "meta.json";
/// Optional caption source.
pub const DESCRIPTION_FILE: &str = "description.txt";
/// Marker written once a folder has been presented for approval.
pub const LOCK_FILE: &str = ".lock";

/// Post metadata: arbitrary keys mapped to scalars or lists.
pub type Meta = Map<String, Value>;

/// Case-insensitive image extension allow-list.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    extensions: Vec<String>,
}

impl ImageFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(["jpg", "jpeg", "png", "webp"])
    }
}

/// A directory holding one publishable post.
#[derive(Debug, Clone)]
pub struct PostFolder {
    pub path: PathBuf,
    pub name: String,
    /// Image files, sorted case-insensitively by name.
    pub images: Vec<PathBuf>,
    pub description: Option<String>,
    pub meta: Meta,
}

impl PostFolder {
    /// Read a post folder. Only a failure to list the directory is an error;
    /// missing or malformed optional files degrade to empty values.
    pub fn load(path: &Path, images: &ImageFilter) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            name: folder_name(path),
            images: collect_images(path, images)?,
            description: read_description(path),
            meta: read_meta(&path.join(META_FILE)),
        })
    }

    /// Caption text: the description, or the folder name when there is none.
    pub fn caption(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Final path component as a string.
pub fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn is_post_folder(path: &Path) -> bool {
    path.is_dir() && path.join(META_FILE).is_file()
}

pub fn is_locked(path: &Path) -> bool {
    path.join(LOCK_FILE).exists()
}

/// Mark a folder as presented, recording the token it was presented with.
pub fn write_lock(path: &Path, token: &str) -> io::Result<()> {
    fs::write(path.join(LOCK_FILE), token)
}

/// Remove the presented marker so a later scan picks the folder up again.
pub fn clear_lock(path: &Path) -> io::Result<()> {
    match fs::remove_file(path.join(LOCK_FILE)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Image files directly inside `path`, sorted case-insensitively by name.
pub fn collect_images(path: &Path, filter: &ImageFilter) -> io::Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && filter.matches(p))
        .collect();
    images.sort_by_cached_key(|p| folder_name(p).to_lowercase());
    Ok(images)
}

/// Trimmed `description.txt`; invalid UTF-8 is replaced. Empty reads as absent.
pub fn read_description(path: &Path) -> Option<String> {
    let bytes = fs::read(path.join(DESCRIPTION_FILE)).ok()?;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Parse `meta.json`. Anything but a JSON object reads as empty metadata.
pub fn read_meta(meta_path: &Path) -> Meta {
    let raw = match fs::read(meta_path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %meta_path.display(), "Failed to read metadata: {e}");
            return Meta::new();
        }
    };
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(meta)) => meta,
        Ok(_) => {
            warn!(path = %meta_path.display(), "Metadata is not a JSON object, ignoring");
            Meta::new()
        }
        Err(e) => {
            warn!(path = %meta_path.display(), "Failed to parse metadata: {e}");
            Meta::new()
        }
    }
}

/// Whether `path` resolves to a location inside `root`.
pub fn is_under_root(path: &Path, root: &Path) -> bool {
    match (path.canonicalize(), root.canonicalize()) {
        (Ok(path), Ok(root)) => path.starts_with(root),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_post(root: &Path, name: &str, meta: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(META_FILE), meta).unwrap();
        dir
    }

    #[test]
    fn test_image_filter_case_insensitive() {
        let filter = ImageFilter::new([".JPG", "png"]);
        assert!(filter.matches(Path::new("a/photo.jpg")));
        assert!(filter.matches(Path::new("a/photo.PNG")));
        assert!(!filter.matches(Path::new("a/notes.txt")));
        assert!(!filter.matches(Path::new("a/noext")));
    }

    #[test]
    fn test_load_collects_sorted_images() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "post", r#"{"title": "Cats"}"#);
        for name in ["b.PNG", "A.jpg", "c.jpeg", "notes.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::write(dir.join(DESCRIPTION_FILE), "  Hello cats \n").unwrap();

        let post = PostFolder::load(&dir, &ImageFilter::default()).unwrap();
        let names: Vec<_> = post.images.iter().map(|p| folder_name(p)).collect();
        assert_eq!(names, vec!["A.jpg", "b.PNG", "c.jpeg"]);
        assert_eq!(post.description.as_deref(), Some("Hello cats"));
        assert_eq!(post.meta["title"], "Cats");
        assert_eq!(post.caption(), "Hello cats");
    }

    #[test]
    fn test_caption_falls_back_to_name() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "My Post", "{}");
        fs::write(dir.join(DESCRIPTION_FILE), "   ").unwrap();
        let post = PostFolder::load(&dir, &ImageFilter::default()).unwrap();
        assert!(post.description.is_none());
        assert_eq!(post.caption(), "My Post");
    }

    #[test]
    fn test_bad_meta_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let broken = make_post(root.path(), "broken", "{ nope");
        let list = make_post(root.path(), "list", "[1, 2]");
        assert!(read_meta(&broken.join(META_FILE)).is_empty());
        assert!(read_meta(&list.join(META_FILE)).is_empty());
        assert!(is_post_folder(&broken));
    }

    #[test]
    fn test_post_folder_requires_meta() {
        let root = tempfile::tempdir().unwrap();
        let plain = root.path().join("plain");
        fs::create_dir(&plain).unwrap();
        assert!(!is_post_folder(&plain));
        fs::write(root.path().join("file.txt"), "x").unwrap();
        assert!(!is_post_folder(&root.path().join("file.txt")));
    }

    #[test]
    fn test_lock_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let dir = make_post(root.path(), "post", "{}");
        assert!(!is_locked(&dir));
        write_lock(&dir, "0123456789ab").unwrap();
        assert!(is_locked(&dir));
        assert_eq!(
            fs::read_to_string(dir.join(LOCK_FILE)).unwrap(),
            "0123456789ab"
        );
        clear_lock(&dir).unwrap();
        assert!(!is_locked(&dir));
        clear_lock(&dir).unwrap();
    }

    #[test]
    fn test_is_under_root() {
        let root = tempfile::tempdir().unwrap();
        let inside = make_post(root.path(), "inside", "{}");
        let other = tempfile::tempdir().unwrap();
        assert!(is_under_root(&inside, root.path()));
        assert!(!is_under_root(other.path(), root.path()));
        assert!(!is_under_root(&root.path().join("missing"), root.path()));
    }
}
