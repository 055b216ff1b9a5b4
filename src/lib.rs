pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod retrieve;
pub mod types;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::FetchError;
    pub use crate::types::{AlbumChoice, Collections, MediaKind, RetrievedFile};
    pub use crate::{Outcome, Selection, Storyfetch};
}

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::FetchError;
use crate::retrieve::Retriever;
use crate::types::{AlbumChoice, Collections, RetrievedFile};

/// What the caller wants downloaded for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Stories,
    Highlights(AlbumChoice),
    Spotlights(AlbumChoice),
}

impl Selection {
    /// Purpose tag used in temp directory and archive names.
    pub fn purpose(&self) -> String {
        match self {
            Selection::Stories => "stories".to_string(),
            Selection::Highlights(choice) => format!("highlights_{}", slugify(choice_label(choice))),
            Selection::Spotlights(choice) => format!("spotlights_{}", slugify(choice_label(choice))),
        }
    }
}

fn choice_label(choice: &AlbumChoice) -> &str {
    match choice {
        AlbumChoice::All => "All",
        AlbumChoice::Named(name) => name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No document: missing profile or unreadable page.
    NoProfile,
    /// The document had nothing for this selection.
    NothingSelected,
    Downloaded { files: Vec<RetrievedFile>, archive: Option<PathBuf> },
}

/// Async library entry point. Owns the configuration and one shared HTTP client.
#[derive(Clone)]
pub struct Storyfetch {
    config: Config,
    client: reqwest::Client,
    retriever: Retriever,
}

impl Storyfetch {
    pub fn new(config: Config) -> Result<Self> {
        // Media bodies may stream for a long time; only idle gaps are bounded here.
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .context("failed to build http client")?;
        let retriever = Retriever::new(client.clone(), config.concurrency);
        Ok(Self { config, client, retriever })
    }

    /// Configuration from file and `STORYFETCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn config(&self) -> &Config { &self.config }

    /// Profile page state, or `None` when there is nothing to show. Failures are logged.
    pub async fn fetch_profile(&self, handle: &str) -> Option<Value> {
        document::fetch(&self.client, &self.config.base_url, handle, self.config.request_timeout()).await
    }

    /// Like [`Storyfetch::fetch_profile`] but keeps the failure kind.
    pub async fn try_fetch_profile(&self, handle: &str) -> std::result::Result<Value, FetchError> {
        document::try_fetch(&self.client, &self.config.base_url, handle, self.config.request_timeout()).await
    }

    /// Every titled collection on the profile.
    pub async fn collections(&self, handle: &str) -> Option<Collections> {
        self.fetch_profile(handle).await.map(|doc| extract::extract(&doc))
    }

    pub async fn retrieve_all(&self, urls: &[String], dest: &Path) -> Vec<RetrievedFile> {
        self.retriever.retrieve_all(urls, dest).await
    }

    pub async fn build_archive(&self, files: &[PathBuf], subject: &str, kind: &str) -> Result<Option<PathBuf>> {
        let files = files.to_vec();
        let subject = subject.to_string();
        let kind = kind.to_string();
        let temp_root = self.config.temp_root.clone();
        tokio::task::spawn_blocking(move || archive::build_archive(&files, &subject, &kind, temp_root.as_deref()))
            .await
            .context("archive task panicked")?
    }

    /// Fetch, select, download and optionally zip one selection for `handle`.
    pub async fn download(&self, handle: &str, selection: &Selection, offer_archive: bool) -> Result<Outcome> {
        let Some(doc) = self.fetch_profile(handle).await else { return Ok(Outcome::NoProfile) };
        let urls = select_urls(&doc, selection);
        if urls.is_empty() {
            info!(handle, purpose = %selection.purpose(), "nothing to download");
            return Ok(Outcome::NothingSelected);
        }

        let purpose = selection.purpose();
        let dest = self.fresh_dir(handle, &purpose).await?;
        info!(handle, %purpose, count = urls.len(), dest = %dest.display(), "downloading");
        let files = self.retrieve_all(&urls, &dest).await;

        let archive = if offer_archive {
            let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
            self.build_archive(&paths, handle, &purpose).await?
        } else {
            None
        };
        Ok(Outcome::Downloaded { files, archive })
    }

    async fn fresh_dir(&self, handle: &str, purpose: &str) -> Result<PathBuf> {
        let prefix = format!("storyfetch_{}_{}_", retrieve::sanitize_filename(handle), purpose);
        let temp_root = self.config.temp_root.clone();
        tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix(&prefix);
            let dir = match &temp_root {
                Some(root) => {
                    std::fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
                    builder.tempdir_in(root)
                }
                None => builder.tempdir(),
            }
            .context("failed to create download directory")?;
            Ok(dir.keep())
        })
        .await
        .context("temp dir task panicked")?
    }
}

/// URLs a selection refers to within one profile document.
pub fn select_urls(doc: &Value, selection: &Selection) -> Vec<String> {
    match selection {
        Selection::Stories => extract::extract_primary_story(doc),
        Selection::Highlights(choice) => extract::extract(doc).select(false, choice),
        Selection::Spotlights(choice) => extract::extract(doc).select(true, choice),
    }
}

// --- helpers ---

/// Lowercase, word characters and dashes only, separators collapsed to `-`.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    let mut out = String::with_capacity(kept.len());
    let mut last_sep = false;
    for ch in kept.chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            if !last_sep { out.push('-'); last_sep = true; }
        } else {
            out.push(ch);
            last_sep = false;
        }
    }
    if out.is_empty() { extract::UNKNOWN_TITLE.to_string() } else { out }
}
