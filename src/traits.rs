use crate::error::Result;
use std::time::Duration;

/// How to find an element on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Visible element whose trimmed text equals the given string
    Text(String),
    /// CSS selector
    Css(String),
}

/// Opaque handle to an element located on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    /// CSS selector that re-selects exactly this element
    pub selector: String,
}

impl ElementRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// A live, stateful browser page. One instance is reused sequentially for
/// every page of every chapter handled by a worker.
#[async_trait::async_trait]
pub trait BrowserPage: Send {
    /// Navigate to a location and wait for the load to finish
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait until navigation triggered by a click has settled
    async fn wait_for_settled(&mut self, timeout: Duration) -> Result<()>;

    /// Locate the first visible element matching `locator`
    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>>;

    /// Visible text of the first element matching `selector`, `None` if absent
    async fn element_text(&mut self, selector: &str) -> Result<Option<String>>;

    /// Inner HTML of the first element matching `selector`, `None` if absent
    async fn element_html(&mut self, selector: &str) -> Result<Option<String>>;

    /// Visible text of the whole document
    async fn page_text(&mut self) -> Result<String>;

    /// Serialized HTML of the whole document
    async fn page_html(&mut self) -> Result<String>;

    async fn click(&mut self, element: &ElementRef) -> Result<()>;

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    async fn current_url(&mut self) -> Result<String>;
}

/// Page-state verdict produced by a [`SignatureClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Good,
    MobileWarning,
    LoadFailure,
}

impl Classification {
    pub fn is_good(self) -> bool {
        self == Classification::Good
    }
}

/// Decides whether a rendered page is usable content or a known bad state.
pub trait SignatureClassifier: Send + Sync {
    fn classify(&self, page_text: &str, page_html: &str) -> Classification;
}

/// Finds the control that advances to the next in-chapter page.
#[async_trait::async_trait]
pub trait NextPageFinder: Send + Sync {
    async fn find_next_page_control(
        &self,
        page: &mut dyn BrowserPage,
    ) -> Result<Option<ElementRef>>;
}
