//! Chromium-backed [`BrowserPage`] using chromiumoxide.

use crate::config::BrowserConfig;
use crate::error::{NovelLoaderError, Result};
use crate::traits::{BrowserPage, ElementRef, Locator};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const REF_ATTRIBUTE: &str = "data-novelloader-ref";

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&str>) -> Option<PathBuf> {
    // 1. Explicit configuration
    if let Some(p) = configured {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. NOVELLOADER_CHROMIUM env
    if let Ok(p) = std::env::var("NOVELLOADER_CHROMIUM") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// One browser process with a single page, driven sequentially.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
    script_timeout: Duration,
    next_ref: u64,
}

impl ChromiumSession {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = CdpBrowserConfig::builder()
            .window_size(config.window_width, config.window_height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = find_chromium(config.executable.as_deref()) {
            debug!("[BROWSER] Using Chromium at {:?}", path);
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(|e| {
            NovelLoaderError::browser(format!("failed to build browser config: {e}"))
        })?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| NovelLoaderError::browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("[BROWSER] Handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| NovelLoaderError::browser(format!("failed to open page: {e}")))?;

        if let Some(user_agent) = &config.user_agent {
            page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| NovelLoaderError::browser(format!("failed to set user agent: {e}")))?;
        }

        info!("[BROWSER] Chromium session ready");
        Ok(Self {
            browser,
            page,
            handler,
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            script_timeout: Duration::from_millis(config.script_timeout_ms),
            next_ref: 0,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        let _ = self.page.close().await;
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map_err(|e| NovelLoaderError::browser(format!("failed to close Chromium: {e}")))?;
        Ok(())
    }

    async fn timed<T, E, F>(&self, what: &str, limit: Duration, fut: F) -> Result<T>
    where
        E: std::fmt::Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(NovelLoaderError::browser(format!("{what} failed: {e}"))),
            Err(_) => Err(NovelLoaderError::timeout(format!("{what} after {limit:?}"))),
        }
    }

    /// Runs `body` (a function body returning any JSON-serialisable value)
    /// and decodes its result.
    async fn eval_json<T: DeserializeOwned>(&self, body: &str) -> Result<T> {
        let script = format!("JSON.stringify((() => {{ {body} }})() ?? null)");
        let result = self
            .timed("script", self.script_timeout, self.page.evaluate(script))
            .await?;
        let json: String = result
            .into_value()
            .map_err(|e| NovelLoaderError::browser(format!("unexpected script result: {e}")))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait::async_trait]
impl BrowserPage for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("[BROWSER] Navigating to {}", url);
        self.timed("navigation", self.navigation_timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        })
        .await
    }

    async fn wait_for_settled(&mut self, timeout: Duration) -> Result<()> {
        self.timed("settle", timeout, self.page.wait_for_navigation())
            .await?;
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<ElementRef>> {
        self.next_ref += 1;
        let (text, css) = match locator {
            Locator::Text(t) => (serde_json::to_string(t)?, "null".to_string()),
            Locator::Css(c) => ("null".to_string(), serde_json::to_string(c)?),
        };
        let body = format!(
            r#"
            const want = {text};
            const css = {css};
            const visible = (el) => {{
                const r = el.getBoundingClientRect();
                const s = window.getComputedStyle(el);
                return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
            }};
            let found = null;
            try {{
                if (css !== null) {{
                    found = Array.from(document.querySelectorAll(css)).find(visible) || null;
                }} else {{
                    for (const group of ['a', 'button, [role=button]', 'span, div, i, p']) {{
                        found = Array.from(document.querySelectorAll(group))
                            .find((el) => el.textContent.trim() === want && visible(el)) || null;
                        if (found) break;
                    }}
                }}
            }} catch (e) {{
                return null;
            }}
            if (!found) return null;
            found.setAttribute('{attr}', '{id}');
            return '[{attr}="{id}"]';
            "#,
            attr = REF_ATTRIBUTE,
            id = self.next_ref,
        );

        let selector: Option<String> = self.eval_json(&body).await?;
        Ok(selector.map(ElementRef::new))
    }

    async fn element_text(&mut self, selector: &str) -> Result<Option<String>> {
        let sel = serde_json::to_string(selector)?;
        self.eval_json(&format!(
            "const el = document.querySelector({sel}); return el ? el.innerText : null;"
        ))
        .await
    }

    async fn element_html(&mut self, selector: &str) -> Result<Option<String>> {
        let sel = serde_json::to_string(selector)?;
        self.eval_json(&format!(
            "const el = document.querySelector({sel}); return el ? el.innerHTML : null;"
        ))
        .await
    }

    async fn page_text(&mut self) -> Result<String> {
        self.eval_json("return document.body ? document.body.innerText : '';")
            .await
    }

    async fn page_html(&mut self) -> Result<String> {
        self.eval_json("return document.documentElement.outerHTML;")
            .await
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        let native = self
            .timed("click", self.script_timeout, async {
                self.page.find_element(element.selector.as_str()).await?.click().await?;
                Ok::<(), chromiumoxide::error::CdpError>(())
            })
            .await;

        if let Err(e) = native {
            // Elements under a fixed overlay refuse pointer clicks; fall back to a DOM click.
            debug!("[BROWSER] Native click failed ({}), using DOM click", e);
            let sel = serde_json::to_string(&element.selector)?;
            let clicked: bool = self
                .eval_json(&format!(
                    "const el = document.querySelector({sel}); if (!el) return false; el.click(); return true;"
                ))
                .await?;
            if !clicked {
                return Err(NovelLoaderError::browser(format!(
                    "element {} disappeared before click",
                    element.selector
                )));
            }
        }
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .timed("script", self.script_timeout, self.page.evaluate(script))
            .await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .timed("url lookup", self.script_timeout, self.page.url())
            .await?;
        Ok(url.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_locate_and_read() {
        let config = BrowserConfig {
            user_agent: None,
            ..BrowserConfig::default()
        };
        let mut session = ChromiumSession::launch(&config)
            .await
            .expect("failed to launch Chromium");

        session
            .navigate("data:text/html,<div id='content'><p>Hello</p></div><a href='#2'>下一頁</a>")
            .await
            .expect("navigation failed");

        let text = session.element_text("#content").await.expect("read failed");
        assert_eq!(text.as_deref().map(str::trim), Some("Hello"));

        let next = session
            .locate(&Locator::Text("下一頁".to_string()))
            .await
            .expect("locate failed");
        assert!(next.is_some());

        let missing = session
            .locate(&Locator::Css(".does-not-exist".to_string()))
            .await
            .expect("locate failed");
        assert!(missing.is_none());

        let value = session.evaluate("1 + 2").await.expect("evaluate failed");
        assert_eq!(value, serde_json::json!(3));

        session.close().await.expect("close failed");
    }
}
