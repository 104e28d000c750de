use crate::error::{NovelLoaderError, Result};
use crate::models::{ChapterLink, ChapterLinkSet};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRecord {
    sequence_index: Option<u32>,
    title: String,
    url: String,
}

/// Reads the ordered chapter list produced by catalog discovery.
pub fn load_chapter_links<P: AsRef<Path>>(path: P) -> Result<ChapterLinkSet> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let links = parse_chapter_links(&content)?;
    info!("Loaded {} chapter link(s) from {:?}", links.len(), path.as_ref());
    Ok(links)
}

/// Parses a JSON array of `{ "title", "url", "sequenceIndex"? }`.
///
/// Missing indices are taken from the 1-based position in the array.
/// Duplicate URLs keep their first occurrence.
pub fn parse_chapter_links(json: &str) -> Result<ChapterLinkSet> {
    let records: Vec<LinkRecord> = serde_json::from_str(json)?;
    let mut set = ChapterLinkSet::new();

    for (position, record) in records.into_iter().enumerate() {
        let title = record.title.trim();
        let url = record.url.trim();
        if title.is_empty() || url.is_empty() {
            return Err(NovelLoaderError::invalid_links(format!(
                "entry {} is missing a title or url",
                position + 1
            )));
        }
        Url::parse(url).map_err(|e| {
            NovelLoaderError::invalid_links(format!(
                "entry {} has a bad url '{}': {}",
                position + 1,
                url,
                e
            ))
        })?;

        let index = record.sequence_index.unwrap_or(position as u32 + 1);
        if index == 0 {
            return Err(NovelLoaderError::invalid_links(format!(
                "entry {} has sequence index 0",
                position + 1
            )));
        }

        if !set.insert(ChapterLink::new(index, title, url)) {
            debug!("Dropping duplicate chapter link: {}", url);
        }
    }

    if set.is_empty() {
        return Err(NovelLoaderError::invalid_links("no chapter links"));
    }
    Ok(set)
}
