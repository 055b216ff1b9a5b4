//! Collection discovery over the untyped page-state tree.
//!
//! Any object carrying a `snapList` array is a collection. Its title comes from
//! the first non-blank candidate in [`TITLE_RESOLVERS`], then the key the object
//! was found under, then [`UNKNOWN_TITLE`].

use serde_json::{Map, Value};

use crate::types::Collections;

pub const MEDIA_LIST_KEY: &str = "snapList";
pub const UNKNOWN_TITLE: &str = "unknown";
const PAGE_PROPS: &str = "/props/pageProps";
const PRIMARY_STORY: &str = "/props/pageProps/story/snapList";

type TitleResolver = fn(&Map<String, Value>) -> Option<&str>;

/// Title candidates in priority order.
pub const TITLE_RESOLVERS: &[(&str, TitleResolver)] = &[
    ("storyTitle.value", story_title),
    ("title", plain_title),
    ("displayName", display_name),
];

fn story_title(node: &Map<String, Value>) -> Option<&str> {
    non_blank(node.get("storyTitle").and_then(|t| t.get("value")))
}

fn plain_title(node: &Map<String, Value>) -> Option<&str> {
    non_blank(node.get("title"))
}

fn display_name(node: &Map<String, Value>) -> Option<&str> {
    non_blank(node.get("displayName"))
}

fn non_blank(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Title for a collection node found under `parent_key`.
pub fn resolve_title(node: &Map<String, Value>, parent_key: Option<&str>) -> String {
    TITLE_RESOLVERS
        .iter()
        .find_map(|(_, resolve)| resolve(node))
        .or(parent_key.filter(|k| !k.trim().is_empty()))
        .unwrap_or(UNKNOWN_TITLE)
        .to_string()
}

/// `snapUrls.mediaUrl` of one list entry, if present and non-empty.
pub fn media_url(entry: &Value) -> Option<&str> {
    non_blank(entry.get("snapUrls").and_then(|u| u.get("mediaUrl")))
}

fn media_urls(entries: &[Value]) -> Vec<String> {
    entries.iter().filter_map(media_url).map(str::to_string).collect()
}

/// Walk the page properties and group every collection's URLs by title.
pub fn extract(doc: &Value) -> Collections {
    let mut out = Collections::new();
    if let Some(root) = doc.pointer(PAGE_PROPS) {
        let mut path = Vec::new();
        walk(root, &mut path, &mut out);
    }
    out
}

/// URLs of the top-level story only, skipping the general walk.
pub fn extract_primary_story(doc: &Value) -> Vec<String> {
    doc.pointer(PRIMARY_STORY)
        .and_then(Value::as_array)
        .map(|entries| media_urls(entries))
        .unwrap_or_default()
}

fn walk<'a>(value: &'a Value, path: &mut Vec<&'a str>, out: &mut Collections) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if key == MEDIA_LIST_KEY {
                    if let Value::Array(entries) = val {
                        let urls = media_urls(entries);
                        if !urls.is_empty() {
                            out.append(resolve_title(map, path.last().copied()), urls);
                        }
                        continue;
                    }
                }
                path.push(key);
                walk(val, path, out);
                path.pop();
            }
        }
        // arrays keep the enclosing key for the title fallback
        Value::Array(items) => {
            for item in items {
                walk(item, path, out);
            }
        }
        _ => {}
    }
}
