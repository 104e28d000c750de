//! Scripted in-memory stand-in for a browser page.

#![allow(dead_code)]

use novelloader::config::{Config, StorageConfig};
use novelloader::orchestrator::CancelFlag;
use novelloader::traits::{BrowserPage, ElementRef, Locator};
use novelloader::{NovelLoaderError, Result};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

pub const MOBILE_WARNING: &str = "請使用手機瀏覽器閱讀";
pub const LOAD_FAILURE: &str = "內容加載失敗";
pub const NEXT_TEXT: &str = "下一頁";
pub const CLOSE_TEXT: &str = "關閉";

/// What the page shows after one load.
#[derive(Debug, Clone)]
pub enum Render {
    MobileWarning,
    LoadFailure,
    /// Classification works but reading the content region times out
    ExtractTimeout,
    Content { text: String, html: String },
}

impl Render {
    pub fn text(text: &str) -> Self {
        Render::Content {
            text: text.to_string(),
            html: format!("<p>{}</p>", text),
        }
    }

    pub fn with_html(text: &str, html: &str) -> Self {
        Render::Content {
            text: text.to_string(),
            html: html.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedPage {
    /// Consumed one per load; `steady` is shown once empty
    pub renders: VecDeque<Render>,
    pub steady: Render,
    pub next: Option<String>,
    pub overlay: bool,
}

impl ScriptedPage {
    pub fn steady(render: Render) -> Self {
        Self {
            renders: VecDeque::new(),
            steady: render,
            next: None,
            overlay: false,
        }
    }

    pub fn sequence(first: Vec<Render>, then: Render) -> Self {
        Self {
            renders: first.into(),
            steady: then,
            next: None,
            overlay: false,
        }
    }

    pub fn next(mut self, url: &str) -> Self {
        self.next = Some(url.to_string());
        self
    }

    pub fn with_overlay(mut self) -> Self {
        self.overlay = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pages: HashMap<String, ScriptedPage>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: ScriptedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }
}

pub struct FakeBrowser {
    site: FakeSite,
    current: Option<String>,
    render: Option<Render>,
    overlay_open: bool,
    cancel_on: Option<(String, CancelFlag)>,
    /// Every load in order: navigations and arrivals via "next" clicks
    pub loads: Vec<String>,
    pub navigations: Vec<String>,
    pub clicks: Vec<String>,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            current: None,
            render: None,
            overlay_open: false,
            cancel_on: None,
            loads: Vec::new(),
            navigations: Vec::new(),
            clicks: Vec::new(),
        }
    }

    /// Raises `flag` the moment `url` is loaded, as a Ctrl-C mid-chapter would.
    pub fn cancel_when_loading(mut self, url: &str, flag: CancelFlag) -> Self {
        self.cancel_on = Some((url.to_string(), flag));
        self
    }

    pub fn loads_of(&self, url: &str) -> usize {
        self.loads.iter().filter(|u| u.as_str() == url).count()
    }

    fn load(&mut self, url: &str) -> Result<()> {
        let page = self.site.pages.get_mut(url).ok_or_else(|| {
            NovelLoaderError::browser(format!("net::ERR_NAME_NOT_RESOLVED {}", url))
        })?;
        let render = page.renders.pop_front().unwrap_or_else(|| page.steady.clone());
        self.overlay_open = page.overlay;
        self.current = Some(url.to_string());
        self.render = Some(render);
        self.loads.push(url.to_string());
        if let Some((trigger, flag)) = &self.cancel_on {
            if trigger == url {
                flag.cancel();
            }
        }
        Ok(())
    }

    fn current_page(&self) -> Option<&ScriptedPage> {
        self.current.as_ref().and_then(|u| self.site.pages.get(u))
    }

    fn content_html(&self) -> Option<String> {
        match &self.render {
            Some(Render::Content { html, .. }) => Some(html.clone()),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl BrowserPage for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        self.load(url)
    }

    async fn wait_for_settled(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>> {
        match locator {
            Locator::Text(t) if t == CLOSE_TEXT && self.overlay_open => {
                Ok(Some(ElementRef::new("#overlay-close")))
            }
            Locator::Text(t) if t == NEXT_TEXT => {
                let has_next = matches!(self.render, Some(Render::Content { .. }))
                    && self.current_page().and_then(|p| p.next.as_ref()).is_some();
                Ok(has_next.then(|| ElementRef::new("#next")))
            }
            _ => Ok(None),
        }
    }

    async fn element_text(&mut self, selector: &str) -> Result<Option<String>> {
        assert_eq!(selector, "#content");
        match &self.render {
            Some(Render::Content { text, .. }) => Ok(Some(text.clone())),
            Some(Render::ExtractTimeout) => Err(NovelLoaderError::timeout("script after 10s")),
            _ => Ok(None),
        }
    }

    async fn element_html(&mut self, _selector: &str) -> Result<Option<String>> {
        Ok(self.content_html())
    }

    async fn page_text(&mut self) -> Result<String> {
        Ok(match &self.render {
            Some(Render::MobileWarning) => format!("{}，謝謝", MOBILE_WARNING),
            Some(Render::LoadFailure) => format!("{}，請刷新", LOAD_FAILURE),
            Some(Render::Content { text, .. }) => text.clone(),
            Some(Render::ExtractTimeout) => "loading".to_string(),
            None => String::new(),
        })
    }

    async fn page_html(&mut self) -> Result<String> {
        let inner = self.content_html().unwrap_or_default();
        Ok(format!("<html><body><div id=\"content\">{}</div></body></html>", inner))
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        self.clicks.push(element.selector.clone());
        match element.selector.as_str() {
            "#overlay-close" => {
                self.overlay_open = false;
                Ok(())
            }
            "#next" => {
                let next = self
                    .current_page()
                    .and_then(|p| p.next.clone())
                    .ok_or_else(|| NovelLoaderError::browser("no next link"))?;
                self.load(&next)
            }
            other => Err(NovelLoaderError::browser(format!("unknown element {}", other))),
        }
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone().unwrap_or_else(|| "about:blank".to_string()))
    }
}

/// Configuration with every delay off and storage under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage = StorageConfig {
        output_dir: dir.join("chapters").to_string_lossy().to_string(),
        images_dir: dir.join("images").to_string_lossy().to_string(),
    };
    config.acquisition.page_delay_ms = (0, 0);
    config.acquisition.chapter_delay_min_ms = 0;
    config.acquisition.chapter_delay_jitter_ms = 0;
    config.acquisition.image_delay_ms = (0, 0);
    config.acquisition.image_timeout_secs = 5;
    config.site.mobile_warning_signatures = vec![MOBILE_WARNING.to_string()];
    config.site.load_failure_signatures = vec![LOAD_FAILURE.to_string()];
    config.site.next_page_texts = vec![NEXT_TEXT.to_string()];
    config.site.overlay_close_texts = vec![CLOSE_TEXT.to_string()];
    config
}
