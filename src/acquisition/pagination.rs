use crate::acquisition::page::{PageAcquirer, PageEntry};
use crate::acquisition::stitcher::stitch;
use crate::error::{NovelLoaderError, Result};
use crate::models::{ChapterAcquisitionResult, ChapterImages, ChapterLink};
use crate::traits::{BrowserPage, ElementRef, Locator, NextPageFinder};
use crate::utils::random_delay;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finds the "next page" link by its visible text.
#[derive(Debug, Clone)]
pub struct LinkTextNextPage {
    texts: Vec<String>,
}

impl LinkTextNextPage {
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }
}

#[async_trait::async_trait]
impl NextPageFinder for LinkTextNextPage {
    async fn find_next_page_control(
        &self,
        page: &mut dyn BrowserPage,
    ) -> Result<Option<ElementRef>> {
        for text in &self.texts {
            if let Some(element) = page.locate(&Locator::Text(text.clone())).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct WalkSettings {
    pub max_pages: u32,
    pub settle_timeout: Duration,
    pub page_delay_ms: (u64, u64),
}

/// Walks every in-chapter page. Any page that does not succeed fails the
/// whole chapter; a truncated chapter is never returned as complete.
pub struct PaginationWalker<'a> {
    pub acquirer: PageAcquirer<'a>,
    pub next_page: &'a dyn NextPageFinder,
    pub settings: WalkSettings,
}

impl<'a> PaginationWalker<'a> {
    pub async fn walk(
        &self,
        page: &mut dyn BrowserPage,
        link: &ChapterLink,
        image_prefix: &str,
    ) -> ChapterAcquisitionResult {
        let mut chapter_images = ChapterImages::new(image_prefix);
        let mut texts: Vec<String> = Vec::new();
        let mut page_number = 1u32;
        let mut entry = PageEntry::Navigate(&link.url);

        loop {
            debug!("[WALKER] {} page {}", link.title, page_number);
            let outcome = self
                .acquirer
                .acquire(page, page_number, entry, &mut chapter_images)
                .await;

            if !outcome.is_success() {
                warn!(
                    "[WALKER] {} failed on page {} ({:?})",
                    link.title, page_number, outcome.status
                );
                return failed(link, page_number, &chapter_images);
            }
            texts.push(outcome.text.unwrap_or_default());

            let control = match self.next_page.find_next_page_control(page).await {
                Ok(control) => control,
                Err(e) => {
                    // Without a readable page we cannot tell whether more pages exist.
                    warn!("[WALKER] Next-page lookup failed on page {}: {}", page_number, e);
                    return failed(link, page_number, &chapter_images);
                }
            };
            let Some(control) = control else {
                break;
            };

            if page_number >= self.settings.max_pages {
                warn!(
                    "[WALKER] {} exceeds {} pages, giving up",
                    link.title, self.settings.max_pages
                );
                return failed(link, page_number, &chapter_images);
            }

            if let Err(e) = self.advance(page, &control).await {
                warn!("[WALKER] Could not advance past page {}: {}", page_number, e);
                return failed(link, page_number, &chapter_images);
            }

            page_number += 1;
            entry = PageEntry::Current;
        }

        let body = stitch(&texts);
        info!(
            "[WALKER] {} complete: {} page(s), {} image(s)",
            link.title,
            page_number,
            chapter_images.captured()
        );
        ChapterAcquisitionResult::complete(
            link.clone(),
            body,
            page_number,
            chapter_images.captured(),
        )
    }

    async fn advance(&self, page: &mut dyn BrowserPage, control: &ElementRef) -> Result<()> {
        let before = page.current_url().await?;
        page.click(control).await?;
        if let Err(e) = page.wait_for_settled(self.settings.settle_timeout).await {
            debug!("[WALKER] Page did not settle after next click: {}", e);
        }
        random_delay(self.settings.page_delay_ms.0, self.settings.page_delay_ms.1).await;

        let after = page.current_url().await?;
        if after == before {
            return Err(NovelLoaderError::scraping(format!(
                "next-page control did not leave {}",
                before
            )));
        }
        Ok(())
    }
}

fn failed(
    link: &ChapterLink,
    page_number: u32,
    images: &ChapterImages,
) -> ChapterAcquisitionResult {
    ChapterAcquisitionResult::failed(link.clone(), page_number, images.captured())
}
