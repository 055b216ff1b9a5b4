//! Bounded concurrent media retrieval.
//!
//! At most `concurrency` downloads are in flight. Output names are planned up
//! front from the whole batch so two distinct URLs never land on the same file,
//! whatever order the downloads finish in.

use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::types::{MediaKind, RetrievedFile};

const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_NAME: &str = "file";

#[derive(Clone)]
pub struct Retriever {
    client: reqwest::Client,
    concurrency: usize,
}

struct Job {
    index: usize,
    url: String,
    name: String,
}

impl Retriever {
    pub fn new(client: reqwest::Client, concurrency: usize) -> Self {
        Self { client, concurrency: concurrency.max(1) }
    }

    pub fn concurrency(&self) -> usize { self.concurrency }

    /// Download every URL into `dest`. Failed items are logged and left out; the
    /// rest come back in the order of `urls`.
    pub async fn retrieve_all(&self, urls: &[String], dest: &Path) -> Vec<RetrievedFile> {
        if urls.is_empty() { return Vec::new(); }
        if let Err(e) = tokio::fs::create_dir_all(dest).await {
            error!(dest = %dest.display(), error = %e, "cannot create download directory");
            return Vec::new();
        }

        let jobs: Vec<Job> = plan_names(urls)
            .into_iter()
            .zip(urls)
            .enumerate()
            .map(|(index, (name, url))| Job { index, url: url.clone(), name })
            .collect();

        let mut done: Vec<(usize, RetrievedFile)> = stream::iter(jobs)
            .map(|job| self.retrieve_one(job, dest))
            .buffer_unordered(self.concurrency)
            .filter_map(|r| async move { r })
            .collect()
            .await;
        done.sort_by_key(|(i, _)| *i);

        info!(requested = urls.len(), retrieved = done.len(), dest = %dest.display(), "batch finished");
        done.into_iter().map(|(_, f)| f).collect()
    }

    async fn retrieve_one(&self, job: Job, dest: &Path) -> Option<(usize, RetrievedFile)> {
        let resp = match self.client.get(&job.url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %job.url, error = %e, "media request failed");
                return None;
            }
        };
        let status = resp.status();
        if !status.is_success() {
            warn!(url = %job.url, status = status.as_u16(), "media download failed");
            return None;
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let file_name = with_media_extension(&job.name, &content_type);
        let path = dest.join(&file_name);

        if let Err(e) = write_body(resp, &path).await {
            error!(url = %job.url, path = %path.display(), error = %format!("{e:#}"), "writing media failed");
            return None;
        }

        let kind = match MediaKind::from_content_type(&content_type) {
            MediaKind::Unknown => MediaKind::from_path(&path),
            k => k,
        };
        debug!(url = %job.url, path = %path.display(), kind = kind.as_str(), "saved");
        Some((job.index, RetrievedFile { url: job.url, path, kind }))
    }
}

/// Stream the body to `path`. A file this call created is removed again if the body fails.
async fn write_body(resp: reqwest::Response, path: &Path) -> Result<()> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let written = copy_body(resp, file).await;
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove partial file");
        }
    }
    written
}

async fn copy_body(resp: reqwest::Response, mut file: tokio::fs::File) -> Result<()> {
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("error reading response body")?;
        file.write_all(&chunk).await.context("error writing chunk")?;
    }
    file.flush().await.context("failed to flush")?;
    Ok(())
}

/// Percent-decoded last path segment of `url`, stripped of characters that are
/// unsafe in file names.
pub fn filename_from_url(url: &str) -> String {
    let raw_path = match url::Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    let last = raw_path.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode(last).map(|c| c.into_owned()).unwrap_or_else(|_| last.to_string());
    sanitize_filename(&decoded)
}

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !UNSAFE_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Extension for a declared content type; `None` for anything that is not image or video.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    let (top, sub) = essence.split_once('/')?;
    match (top, sub) {
        ("image", "png") => Some("png"),
        ("image", "webp") => Some("webp"),
        ("image", "gif") => Some("gif"),
        ("image", _) => Some("jpg"),
        ("video", "webm") => Some("webm"),
        ("video", "quicktime") => Some("mov"),
        ("video", _) => Some("mp4"),
        _ => None,
    }
}

fn media_extension(name: &str) -> Option<&str> {
    let ext = Path::new(name).extension()?.to_str()?;
    (MediaKind::from_extension(ext) != MediaKind::Unknown).then_some(ext)
}

/// `name` as-is when it already has a media extension, else with one derived from the content type.
pub fn with_media_extension(name: &str, content_type: &str) -> String {
    if media_extension(name).is_some() { return name.to_string(); }
    match extension_for_content_type(content_type) {
        Some(ext) => format!("{name}.{ext}"),
        None => name.to_string(),
    }
}

fn split_media_extension(name: &str) -> (&str, Option<&str>) {
    match media_extension(name) {
        Some(ext) => (&name[..name.len() - ext.len() - 1], Some(ext)),
        None => (name, None),
    }
}

fn short_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

/// Output base names for a batch, one per URL.
///
/// Names are compared case-insensitively with any media extension removed, so
/// `a`, `A.jpg` and `a.JPG` count as the same file. Every member of a clashing
/// group gets a `-<hash of url>` suffix before its extension; a URL repeated in
/// the batch additionally gets `-<n>` for its n-th occurrence.
pub fn plan_names(urls: &[String]) -> Vec<String> {
    let bases: Vec<String> = urls.iter().map(|u| filename_from_url(u)).collect();
    let key = |name: &str| split_media_extension(name).0.to_lowercase();

    let mut groups: HashMap<String, usize> = HashMap::new();
    for b in &bases {
        *groups.entry(key(b)).or_default() += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    urls.iter()
        .zip(bases.iter())
        .map(|(url, base)| {
            if groups[&key(base)] < 2 { return base.clone(); }
            let n = seen.entry(url.as_str()).or_default();
            *n += 1;
            let (stem, ext) = split_media_extension(base);
            let mut name = format!("{stem}-{}", short_hash(url));
            if *n > 1 { name.push_str(&format!("-{n}")); }
            if let Some(ext) = ext { name.push('.'); name.push_str(ext); }
            name
        })
        .collect()
}
