use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One entry of the work's table of contents. Identity is `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterLink {
    pub sequence_index: u32,
    pub title: String,
    pub url: String,
}

impl ChapterLink {
    pub fn new(sequence_index: u32, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            sequence_index,
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Insertion-ordered set of chapter links, deduplicated by URL.
#[derive(Debug, Clone, Default)]
pub struct ChapterLinkSet {
    links: Vec<ChapterLink>,
    seen: HashSet<String>,
}

impl ChapterLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a link with the same URL was already present.
    pub fn insert(&mut self, link: ChapterLink) -> bool {
        if !self.seen.insert(link.url.clone()) {
            return false;
        }
        self.links.push(link);
        true
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn as_slice(&self) -> &[ChapterLink] {
        &self.links
    }

    pub fn into_vec(self) -> Vec<ChapterLink> {
        self.links
    }
}

impl FromIterator<ChapterLink> for ChapterLinkSet {
    fn from_iter<I: IntoIterator<Item = ChapterLink>>(iter: I) -> Self {
        let mut set = Self::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Success,
    ExhaustedRetries,
    Empty,
}

/// Result of driving one in-chapter page to a terminal state.
#[derive(Debug, Clone)]
pub struct PageFetchOutcome {
    pub page_number: u32,
    pub status: PageStatus,
    pub text: Option<String>,
    pub raw_content: Option<String>,
    pub images: Vec<ImageReference>,
}

impl PageFetchOutcome {
    pub fn success(
        page_number: u32,
        text: String,
        raw_content: String,
        images: Vec<ImageReference>,
    ) -> Self {
        Self {
            page_number,
            status: PageStatus::Success,
            text: Some(text),
            raw_content: Some(raw_content),
            images,
        }
    }

    pub fn exhausted(page_number: u32) -> Self {
        Self {
            page_number,
            status: PageStatus::ExhaustedRetries,
            text: None,
            raw_content: None,
            images: Vec::new(),
        }
    }

    pub fn empty(page_number: u32) -> Self {
        Self {
            page_number,
            status: PageStatus::Empty,
            text: None,
            raw_content: None,
            images: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PageStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub source_location: String,
    pub resolved_location: String,
    pub ordinal: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterStatus {
    Complete,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChapterAcquisitionResult {
    pub link: ChapterLink,
    /// `None` whenever `status` is `Failed`.
    pub body: Option<String>,
    pub page_count: u32,
    pub images_captured: u32,
    pub status: ChapterStatus,
}

impl ChapterAcquisitionResult {
    pub fn complete(
        link: ChapterLink,
        body: String,
        page_count: u32,
        images_captured: u32,
    ) -> Self {
        Self {
            link,
            body: Some(body),
            page_count,
            images_captured,
            status: ChapterStatus::Complete,
        }
    }

    pub fn failed(link: ChapterLink, page_count: u32, images_captured: u32) -> Self {
        Self {
            link,
            body: None,
            page_count,
            images_captured,
            status: ChapterStatus::Failed,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ChapterStatus::Complete
    }
}

/// Reloads allowed for a single page. Every bad-signature cause draws from
/// the same pool.
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    max_reloads: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(max_reloads: u32) -> Self {
        Self { max_reloads, used: 0 }
    }

    /// Takes one reload from the budget. Returns `false` once exhausted.
    pub fn consume(&mut self) -> bool {
        if self.used >= self.max_reloads {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max_reloads(&self) -> u32 {
        self.max_reloads
    }
}

/// Per-chapter image state: which locations were already attempted and the
/// next ordinal to hand out. Dropped when the chapter finishes.
#[derive(Debug, Clone)]
pub struct ChapterImages {
    pub name_prefix: String,
    seen: HashSet<String>,
    next_ordinal: u32,
}

impl ChapterImages {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            seen: HashSet::new(),
            next_ordinal: 1,
        }
    }

    /// Records `resolved` as attempted. Returns `false` if it was seen before.
    pub fn mark_seen(&mut self, resolved: &str) -> bool {
        self.seen.insert(resolved.to_string())
    }

    pub fn next_ordinal(&self) -> u32 {
        self.next_ordinal
    }

    pub fn advance_ordinal(&mut self) {
        self.next_ordinal += 1;
    }

    pub fn captured(&self) -> u32 {
        self.next_ordinal - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_set_keeps_first_occurrence() {
        let set: ChapterLinkSet = vec![
            ChapterLink::new(1, "One", "https://example.com/1.html"),
            ChapterLink::new(2, "Two", "https://example.com/2.html"),
            ChapterLink::new(3, "One again", "https://example.com/1.html"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].title, "One");
        assert_eq!(set.as_slice()[1].title, "Two");
    }

    #[test]
    fn retry_budget_is_bounded() {
        let mut budget = RetryBudget::new(3);
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn zero_budget_never_reloads() {
        let mut budget = RetryBudget::new(0);
        assert!(!budget.consume());
    }

    #[test]
    fn chapter_images_tracks_ordinals_and_seen() {
        let mut images = ChapterImages::new("001_Prologue");
        assert!(images.mark_seen("https://img.example.com/a.jpg"));
        assert!(!images.mark_seen("https://img.example.com/a.jpg"));
        assert_eq!(images.next_ordinal(), 1);
        images.advance_ordinal();
        assert_eq!(images.next_ordinal(), 2);
        assert_eq!(images.captured(), 1);
    }

    #[test]
    fn link_json_uses_camel_case() {
        let link: ChapterLink = serde_json::from_str(
            r#"{"sequenceIndex": 4, "title": "第4章", "url": "https://example.com/4.html"}"#,
        )
        .unwrap();
        assert_eq!(link.sequence_index, 4);
    }
}
