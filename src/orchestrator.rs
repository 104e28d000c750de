//! Run-level driver: walks the chapter list, skips what is already on disk,
//! persists complete chapters and keeps going past failed ones.

use crate::acquisition::{
    ImageCapture, LinkTextNextPage, PageAcquirer, PaginationWalker, WalkSettings,
};
use crate::config::Config;
use crate::detector::LiteralSignatureClassifier;
use crate::error::Result;
use crate::models::{ChapterAcquisitionResult, ChapterLink};
use crate::overlay::OverlayDismisser;
use crate::storage::{chapter_identity, render_chapter, StorageManager};
use crate::traits::{BrowserPage, NextPageFinder, SignatureClassifier};
use crate::utils::{random_delay, HttpClient};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Run cancellation, honoured between chapters only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub images: u32,
    pub failed_titles: Vec<String>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            completed: 0,
            failed: 0,
            skipped: 0,
            images: 0,
            failed_titles: Vec::new(),
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    fn merge(&mut self, other: RunSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.images += other.images;
        self.failed_titles.extend(other.failed_titles);
        self.cancelled |= other.cancelled;
    }

    /// Chapters that went through the browser.
    pub fn attempted(&self) -> usize {
        self.completed + self.failed
    }
}

enum ChapterOutcome {
    Skipped,
    Completed { images: u32 },
    Failed,
}

pub struct Orchestrator {
    config: Config,
    storage: StorageManager,
    classifier: Box<dyn SignatureClassifier>,
    dismisser: OverlayDismisser,
    images: ImageCapture,
    next_page: Box<dyn NextPageFinder>,
    cancel: CancelFlag,
}

impl Orchestrator {
    pub fn new(config: &Config, cancel: CancelFlag) -> Result<Self> {
        let storage = StorageManager::new(&config.storage);
        let http_client = HttpClient::new(
            &config.site.image_user_agent,
            Duration::from_secs(config.acquisition.image_timeout_secs),
        )?;
        let images = ImageCapture::new(
            http_client,
            storage.images_dir(),
            &config.site,
            &config.acquisition,
        );

        Ok(Self {
            config: config.clone(),
            storage,
            classifier: Box::new(LiteralSignatureClassifier::from_site(&config.site)),
            dismisser: OverlayDismisser::from_site(&config.site),
            images,
            next_page: Box::new(LinkTextNextPage::new(config.site.next_page_texts.clone())),
            cancel,
        })
    }

    pub fn with_classifier(mut self, classifier: Box<dyn SignatureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_next_page_finder(mut self, finder: Box<dyn NextPageFinder>) -> Self {
        self.next_page = finder;
        self
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Runs every chapter sequentially on one browser page.
    pub async fn run(
        &self,
        links: &[ChapterLink],
        page: &mut dyn BrowserPage,
    ) -> Result<RunSummary> {
        self.prepare().await?;
        let progress = progress_bar(links.len());
        let mut summary = RunSummary::started();
        summary.merge(self.run_worker(0, links, page, &progress).await);
        progress.finish_and_clear();
        summary.finished_at = Utc::now();
        log_summary(&summary);
        Ok(summary)
    }

    /// Splits the chapter list into one contiguous partition per page and
    /// runs the partitions concurrently.
    pub async fn run_partitioned<P: BrowserPage>(
        &self,
        links: &[ChapterLink],
        pages: &mut [P],
    ) -> Result<RunSummary> {
        self.prepare().await?;
        let progress = progress_bar(links.len());
        let mut summary = RunSummary::started();

        if !pages.is_empty() && !links.is_empty() {
            let chunk = links.len().div_ceil(pages.len());
            let pb = &progress;
            let workers = links
                .chunks(chunk)
                .zip(pages.iter_mut())
                .enumerate()
                .map(move |(id, (partition, page))| self.run_worker(id, partition, page, pb));

            for worker_summary in join_all(workers).await {
                summary.merge(worker_summary);
            }
        }

        progress.finish_and_clear();
        summary.finished_at = Utc::now();
        log_summary(&summary);
        Ok(summary)
    }

    async fn prepare(&self) -> Result<()> {
        self.storage.ensure_dirs().await?;
        self.storage.clear_stale_claims().await?;
        Ok(())
    }

    async fn run_worker(
        &self,
        worker: usize,
        links: &[ChapterLink],
        page: &mut dyn BrowserPage,
        progress: &ProgressBar,
    ) -> RunSummary {
        let mut summary = RunSummary::started();

        for (index, link) in links.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("[ORCHESTRATOR] Worker {} stopping: run cancelled", worker);
                summary.cancelled = true;
                break;
            }

            progress.set_message(link.title.clone());
            let outcome = self.acquire_chapter(link, page).await;
            progress.inc(1);

            let attempted = match outcome {
                ChapterOutcome::Skipped => {
                    summary.skipped += 1;
                    false
                }
                ChapterOutcome::Completed { images } => {
                    summary.completed += 1;
                    summary.images += images;
                    true
                }
                ChapterOutcome::Failed => {
                    summary.failed += 1;
                    summary.failed_titles.push(link.title.clone());
                    true
                }
            };

            if attempted && index + 1 < links.len() {
                let acq = &self.config.acquisition;
                random_delay(
                    acq.chapter_delay_min_ms,
                    acq.chapter_delay_min_ms + acq.chapter_delay_jitter_ms,
                )
                .await;
            }
        }

        summary.finished_at = Utc::now();
        summary
    }

    async fn acquire_chapter(
        &self,
        link: &ChapterLink,
        page: &mut dyn BrowserPage,
    ) -> ChapterOutcome {
        let identity = chapter_identity(link);

        if self.storage.chapter_exists(&identity).await {
            info!("[ORCHESTRATOR] Skipping {} (already downloaded)", identity);
            return ChapterOutcome::Skipped;
        }

        let claim = match self.storage.claim(&identity).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                info!("[ORCHESTRATOR] Skipping {} (claimed elsewhere)", identity);
                return ChapterOutcome::Skipped;
            }
            Err(e) => {
                error!("[ORCHESTRATOR] Cannot claim {}: {}", identity, e);
                return ChapterOutcome::Failed;
            }
        };

        // Images under this prefix can only be leftovers of an interrupted run.
        self.discard_images(&identity).await;

        info!(
            "[ORCHESTRATOR] Downloading chapter {}: {}",
            link.sequence_index, link.title
        );
        let result = self.walker().walk(page, link, &identity).await;

        match persistable(&result) {
            Some(body) => match claim.commit(&render_chapter(&link.title, body)).await {
                Ok(path) => {
                    info!(
                        "[ORCHESTRATOR] Saved {:?} ({} page(s), {} image(s))",
                        path, result.page_count, result.images_captured
                    );
                    ChapterOutcome::Completed {
                        images: result.images_captured,
                    }
                }
                Err(e) => {
                    error!("[ORCHESTRATOR] Failed to write {}: {}", identity, e);
                    if !self.storage.chapter_exists(&identity).await {
                        self.discard_images(&identity).await;
                    }
                    ChapterOutcome::Failed
                }
            },
            None => {
                warn!("[ORCHESTRATOR] Chapter failed, not saved: {}", link.title);
                if let Err(e) = claim.release().await {
                    warn!("[ORCHESTRATOR] Failed to release claim for {}: {}", identity, e);
                }
                self.discard_images(&identity).await;
                ChapterOutcome::Failed
            }
        }
    }

    fn walker(&self) -> PaginationWalker<'_> {
        let acq = &self.config.acquisition;
        PaginationWalker {
            acquirer: PageAcquirer {
                classifier: self.classifier.as_ref(),
                dismisser: &self.dismisser,
                images: &self.images,
                content_selector: &self.config.site.content_selector,
                max_reloads: acq.max_reloads,
            },
            next_page: self.next_page.as_ref(),
            settings: WalkSettings {
                max_pages: acq.max_pages_per_chapter,
                settle_timeout: Duration::from_millis(self.config.browser.settle_timeout_ms),
                page_delay_ms: acq.page_delay_ms,
            },
        }
    }

    async fn discard_images(&self, identity: &str) {
        match self.storage.remove_chapter_images(identity).await {
            Ok(0) => {}
            Ok(n) => info!(
                "[ORCHESTRATOR] Removed {} leftover image(s) of chapter {}",
                n, identity
            ),
            Err(e) => warn!("[ORCHESTRATOR] Could not clean images of {}: {}", identity, e),
        }
    }
}

fn persistable(result: &ChapterAcquisitionResult) -> Option<&str> {
    if result.is_complete() {
        result.body.as_deref()
    } else {
        None
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn log_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    info!("📊 Run finished in {}s:", elapsed.num_seconds());
    info!("   ✅ Completed: {}", summary.completed);
    info!("   ⏭️ Skipped: {}", summary.skipped);
    info!("   ❌ Failed: {}", summary.failed);
    info!("   🖼️ Images: {}", summary.images);
    for title in &summary.failed_titles {
        warn!("   retry next run: {}", title);
    }
    if summary.cancelled {
        warn!("Run was cancelled before all chapters were processed");
    }
}
