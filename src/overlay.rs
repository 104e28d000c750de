use crate::config::SiteConfig;
use crate::traits::{BrowserPage, Locator};
use tracing::debug;

/// Clears ad overlays and popups before the page is measured.
///
/// Best effort only: nothing found, or a click that fails, is normal.
#[derive(Debug, Clone, Default)]
pub struct OverlayDismisser {
    probes: Vec<Locator>,
}

impl OverlayDismisser {
    pub fn new(probes: Vec<Locator>) -> Self {
        Self { probes }
    }

    pub fn from_site(config: &SiteConfig) -> Self {
        let probes = config
            .overlay_close_texts
            .iter()
            .map(|t| Locator::Text(t.clone()))
            .chain(config.overlay_close_selectors.iter().map(|s| Locator::Css(s.clone())))
            .collect();
        Self::new(probes)
    }

    /// Clicks the first visible match of every probe.
    pub async fn attempt_dismiss(&self, page: &mut dyn BrowserPage) {
        for probe in &self.probes {
            match page.locate(probe).await {
                Ok(Some(element)) => {
                    if let Err(e) = page.click(&element).await {
                        debug!("[OVERLAY] Click on {:?} failed: {}", probe, e);
                    } else {
                        debug!("[OVERLAY] Dismissed overlay via {:?}", probe);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("[OVERLAY] Probe {:?} failed: {}", probe, e),
            }
        }
    }
}
