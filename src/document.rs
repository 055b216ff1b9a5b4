//! Profile page fetcher.
//!
//! The profile page ships its application state as JSON inside a single
//! `<script id="__NEXT_DATA__">` element. We pull that out and hand back the
//! untyped `serde_json::Value` tree.

use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::FetchError;

const STATE_SELECTOR: &str = "script#__NEXT_DATA__";

pub fn profile_url(base_url: &str, handle: &str) -> String {
    format!("{}{}", base_url, handle)
}

/// Fetch and parse, keeping the failure kind. `timeout` bounds the whole page request.
pub async fn try_fetch(client: &reqwest::Client, base_url: &str, handle: &str, timeout: Duration) -> Result<Value, FetchError> {
    let url = profile_url(base_url, handle);
    debug!(%url, "fetching profile page");
    let resp = client.get(&url).timeout(timeout).send().await?;
    let status = resp.status();
    if status == StatusCode::NOT_FOUND { return Err(FetchError::NotFound); }
    if !status.is_success() { return Err(FetchError::Status(status.as_u16())); }
    let body = resp.text().await?;
    parse_embedded_state(&body)
}

/// Fetch a profile document; every failure kind comes back as `None` after being logged.
pub async fn fetch(client: &reqwest::Client, base_url: &str, handle: &str, timeout: Duration) -> Option<Value> {
    match try_fetch(client, base_url, handle, timeout).await {
        Ok(doc) => Some(doc),
        Err(FetchError::NotFound) => {
            info!(handle, "profile not found");
            None
        }
        Err(e) if e.is_parse_failure() => {
            warn!(handle, error = %e, "could not read embedded page state; page layout may have changed");
            None
        }
        Err(e) => {
            error!(handle, error = %e, "profile fetch failed");
            None
        }
    }
}

/// Locate the embedded state element in `html` and parse its text as JSON.
pub fn parse_embedded_state(html: &str) -> Result<Value, FetchError> {
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse(STATE_SELECTOR) else { return Err(FetchError::MissingPayload) };
    let text: String = document
        .select(&sel)
        .next()
        .map(|el| el.text().collect())
        .ok_or(FetchError::MissingPayload)?;
    if text.trim().is_empty() { return Err(FetchError::MissingPayload); }
    Ok(serde_json::from_str(&text)?)
}
