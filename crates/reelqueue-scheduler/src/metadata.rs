//! Deterministic shaping of item metadata before publication.

use reelqueue_store::{Item, MediaKind};

use crate::publish::UploadMetadata;

/// Titles at or above this many characters never get the shorts suffix.
const SHORTS_TITLE_LIMIT: usize = 90;

/// `#tag` with any leading `#` and all whitespace removed. `None` if empty.
pub fn hashtag(tag: &str) -> Option<String> {
    let body: String = tag
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    (!body.is_empty()).then(|| format!("#{body}"))
}

pub fn hashtag_line(tags: &[String]) -> String {
    tags.iter()
        .filter_map(|t| hashtag(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn mentions_shorts(s: &str) -> bool {
    s.to_lowercase().contains("#shorts")
}

pub fn shape_description(description: &str, tags: &[String], kind: MediaKind) -> String {
    let mut hashtags = hashtag_line(tags);
    if kind == MediaKind::Short && !mentions_shorts(description) && !mentions_shorts(&hashtags) {
        hashtags = format!("#shorts {hashtags}");
    }
    format!("{description}\n\n{hashtags}").trim().to_string()
}

pub fn shape_title(title: &str, kind: MediaKind) -> String {
    if kind == MediaKind::Short
        && !mentions_shorts(title)
        && title.chars().count() < SHORTS_TITLE_LIMIT
    {
        format!("{title} #Shorts")
    } else {
        title.to_string()
    }
}

pub fn shape(item: &Item) -> UploadMetadata {
    UploadMetadata {
        title: shape_title(&item.title, item.kind),
        description: shape_description(&item.description, &item.tags, item.kind),
        tags: item
            .tags
            .iter()
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    }
}
