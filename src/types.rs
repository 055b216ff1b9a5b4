use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "heic"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "webm", "m4v"];

impl MediaKind {
    /// Classify from a declared `Content-Type` value; parameters are ignored.
    pub fn from_content_type(ct: &str) -> Self {
        let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if essence.starts_with("image/") { MediaKind::Image }
        else if essence.starts_with("video/") { MediaKind::Video }
        else { MediaKind::Unknown }
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTS.contains(&ext.as_str()) { MediaKind::Image }
        else if VIDEO_EXTS.contains(&ext.as_str()) { MediaKind::Video }
        else { MediaKind::Unknown }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension().and_then(|e| e.to_str()).map(Self::from_extension).unwrap_or(MediaKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }
}

/// A media file written to local storage. The caller owns `path` once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedFile {
    pub url: String,
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Which albums of a partition to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumChoice {
    All,
    Named(String),
}

/// Collection title -> media URLs in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collections {
    map: BTreeMap<String, Vec<String>>,
}

impl Collections {
    pub fn new() -> Self { Self::default() }

    /// Appends to any URLs already held under `title`.
    pub fn append(&mut self, title: String, urls: Vec<String>) {
        self.map.entry(title).or_default().extend(urls);
    }

    pub fn get(&self, title: &str) -> Option<&[String]> { self.map.get(title).map(Vec::as_slice) }
    pub fn titles(&self) -> impl Iterator<Item = &str> { self.map.keys().map(String::as_str) }
    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    /// Titles that are not spotlights, sorted case-insensitively.
    pub fn highlights(&self) -> Vec<String> { self.partition(false) }

    /// Titles mentioning "spotlight", sorted case-insensitively.
    pub fn spotlights(&self) -> Vec<String> { self.partition(true) }

    /// URLs for a choice within one partition. Unknown or out-of-partition names yield nothing.
    pub fn select(&self, spotlight: bool, choice: &AlbumChoice) -> Vec<String> {
        let titles = self.partition(spotlight);
        match choice {
            AlbumChoice::All => titles.iter().flat_map(|t| self.map[t].iter().cloned()).collect(),
            AlbumChoice::Named(name) if titles.contains(name) => self.map[name].clone(),
            AlbumChoice::Named(_) => Vec::new(),
        }
    }

    fn partition(&self, spotlight: bool) -> Vec<String> {
        let mut titles: Vec<String> = self
            .map
            .keys()
            .filter(|k| is_spotlight(k) == spotlight)
            .cloned()
            .collect();
        titles.sort_by_key(|t| t.to_lowercase());
        titles
    }
}

fn is_spotlight(title: &str) -> bool {
    title.to_lowercase().contains("spotlight")
}
