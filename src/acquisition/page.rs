//! Single-page acquisition state machine.
//!
//! ```text
//! NAVIGATING -> DISMISS_OVERLAY -> CLASSIFY -> EXTRACT | RELOAD | GIVE_UP
//!                     ^                           |
//!                     +---------------------------+
//! ```
//!
//! Bad signatures and extraction errors draw from one [`RetryBudget`]; a
//! page that classifies as good but has no content gives up at once.

use crate::acquisition::images::ImageCapture;
use crate::error::Result;
use crate::models::{ChapterImages, PageFetchOutcome, RetryBudget};
use crate::overlay::OverlayDismisser;
use crate::traits::{BrowserPage, Classification, SignatureClassifier};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Where the state machine starts for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry<'a> {
    /// First page of a chapter: navigate to the location
    Navigate(&'a str),
    /// The browser is already on the page (after a "next" click)
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Navigating,
    DismissOverlay,
    Classify,
    Extract,
    Reload,
    GiveUp,
}

/// Text and markup read from the content region.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub text: String,
    pub raw_content: String,
}

pub struct PageAcquirer<'a> {
    pub classifier: &'a dyn SignatureClassifier,
    pub dismisser: &'a OverlayDismisser,
    pub images: &'a ImageCapture,
    pub content_selector: &'a str,
    pub max_reloads: u32,
}

impl<'a> PageAcquirer<'a> {
    /// Drives one page to a terminal state.
    pub async fn acquire(
        &self,
        page: &mut dyn BrowserPage,
        page_number: u32,
        entry: PageEntry<'_>,
        chapter_images: &mut ChapterImages,
    ) -> PageFetchOutcome {
        let mut budget = RetryBudget::new(self.max_reloads);
        let location = match entry {
            PageEntry::Navigate(url) => Some(url.to_string()),
            PageEntry::Current => page.current_url().await.ok(),
        };
        let mut state = match entry {
            PageEntry::Navigate(_) => State::Navigating,
            PageEntry::Current => State::DismissOverlay,
        };

        loop {
            state = match state {
                State::Navigating | State::Reload => {
                    let Some(target) = location.as_deref() else {
                        warn!("[PAGE] Page {} has no known location to load", page_number);
                        return PageFetchOutcome::exhausted(page_number);
                    };
                    if state == State::Reload {
                        info!(
                            "[PAGE] Reloading page {} ({}/{}): {}",
                            page_number,
                            budget.used(),
                            budget.max_reloads(),
                            target
                        );
                    }
                    match page.navigate(target).await {
                        Ok(()) => State::DismissOverlay,
                        Err(e) => {
                            warn!("[PAGE] Loading page {} failed: {}", page_number, e);
                            self.after_bad_attempt(&mut budget)
                        }
                    }
                }
                State::DismissOverlay => {
                    self.dismisser.attempt_dismiss(page).await;
                    State::Classify
                }
                State::Classify => match self.classify(page).await {
                    Ok(Classification::Good) => State::Extract,
                    Ok(bad) => {
                        warn!("[PAGE] Page {} rendered {:?}", page_number, bad);
                        self.after_bad_attempt(&mut budget)
                    }
                    Err(e) => {
                        warn!(
                            "[PAGE] Could not read page {} for classification: {}",
                            page_number, e
                        );
                        self.after_bad_attempt(&mut budget)
                    }
                },
                State::Extract => match self.extract(page).await {
                    Ok(Some(extracted)) => {
                        let location = location.as_deref();
                        return self
                            .finish(page, page_number, extracted, location, chapter_images)
                            .await;
                    }
                    Ok(None) => {
                        warn!("[PAGE] Page {} has no content, giving up", page_number);
                        return PageFetchOutcome::empty(page_number);
                    }
                    Err(e) => {
                        warn!("[PAGE] Extraction of page {} failed: {}", page_number, e);
                        self.after_bad_attempt(&mut budget)
                    }
                },
                State::GiveUp => {
                    warn!(
                        "[PAGE] Page {} still unusable after {} reloads",
                        page_number,
                        budget.used()
                    );
                    return PageFetchOutcome::exhausted(page_number);
                }
            };
        }
    }

    fn after_bad_attempt(&self, budget: &mut RetryBudget) -> State {
        if budget.consume() {
            State::Reload
        } else {
            State::GiveUp
        }
    }

    async fn classify(&self, page: &mut dyn BrowserPage) -> Result<Classification> {
        let text = page.page_text().await?;
        let html = page.page_html().await?;
        Ok(self.classifier.classify(&text, &html))
    }

    /// `Ok(None)` when the region is missing or holds neither text nor images.
    async fn extract(&self, page: &mut dyn BrowserPage) -> Result<Option<Extracted>> {
        let Some(text) = page.element_text(self.content_selector).await? else {
            return Ok(None);
        };
        let raw_content = page
            .element_html(self.content_selector)
            .await?
            .unwrap_or_default();

        let text = normalize_text(&text);
        if text.is_empty() && !contains_image(&raw_content) {
            return Ok(None);
        }
        Ok(Some(Extracted { text, raw_content }))
    }

    async fn finish(
        &self,
        page: &mut dyn BrowserPage,
        page_number: u32,
        extracted: Extracted,
        location: Option<&str>,
        chapter_images: &mut ChapterImages,
    ) -> PageFetchOutcome {
        let base = match page.current_url().await {
            Ok(url) if !url.is_empty() => Some(url),
            _ => location.map(str::to_string),
        };

        let images = match base {
            Some(base) => {
                self.images
                    .capture(&extracted.raw_content, &base, chapter_images)
                    .await
            }
            None => {
                debug!("[PAGE] No base location for page {}, skipping images", page_number);
                Vec::new()
            }
        };

        info!(
            "[PAGE] Extracted page {} ({} chars, {} images)",
            page_number,
            extracted.text.chars().count(),
            images.len()
        );
        PageFetchOutcome::success(page_number, extracted.text, extracted.raw_content, images)
    }
}

/// Trims every line and collapses runs of blank lines to one.
pub fn normalize_text(text: &str) -> String {
    let trimmed: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = trimmed.join("\n");
    BLANK_RUNS.replace_all(joined.trim(), "\n\n").into_owned()
}

fn contains_image(raw_content: &str) -> bool {
    raw_content.to_ascii_lowercase().contains("<img")
}
