use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub browser: BrowserConfig,
    pub acquisition: AcquisitionConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: String,
    pub images_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable: Option<String>,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout_ms: u64,
    pub settle_timeout_ms: u64,
    pub script_timeout_ms: u64,
}

/// Retry budgets and politeness delays. Delay ranges are inclusive `[min, max]`
/// in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub max_reloads: u32,
    pub max_pages_per_chapter: u32,
    pub page_delay_ms: (u64, u64),
    pub chapter_delay_min_ms: u64,
    pub chapter_delay_jitter_ms: u64,
    pub image_delay_ms: (u64, u64),
    pub image_timeout_secs: u64,
    pub workers: usize,
}

/// Everything that is specific to the remote site's markup and failure UX.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    pub content_selector: String,
    pub mobile_warning_signatures: Vec<String>,
    pub load_failure_signatures: Vec<String>,
    pub next_page_texts: Vec<String>,
    pub overlay_close_texts: Vec<String>,
    pub overlay_close_selectors: Vec<String>,
    pub lazy_src_attributes: Vec<String>,
    pub placeholder_signatures: Vec<String>,
    pub image_user_agent: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: "./novel_chapters".to_string(),
            images_dir: "./novel_chapters/images".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            // The site serves its reader to phones; desktop agents get a warning page
            user_agent: Some("Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36".to_string()),
            window_width: 412,
            window_height: 915,
            navigation_timeout_ms: 30_000,
            settle_timeout_ms: 10_000,
            script_timeout_ms: 10_000,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_reloads: 3,
            max_pages_per_chapter: 200,
            page_delay_ms: (500, 1500),
            chapter_delay_min_ms: 1000,
            chapter_delay_jitter_ms: 2000,
            image_delay_ms: (200, 800),
            image_timeout_secs: 20,
            workers: 1,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tw.linovelib.com".to_string(),
            content_selector: "#content".to_string(),
            mobile_warning_signatures: vec![
                "請使用手機瀏覽器閱讀".to_string(),
                "请使用手机浏览器阅读".to_string(),
            ],
            load_failure_signatures: vec![
                "內容加載失敗".to_string(),
                "内容加载失败".to_string(),
            ],
            next_page_texts: vec!["下一頁".to_string(), "下一页".to_string()],
            overlay_close_texts: vec![
                "關閉".to_string(),
                "关闭".to_string(),
                "Close".to_string(),
                "×".to_string(),
            ],
            overlay_close_selectors: vec![
                "[aria-label='close']".to_string(),
                "[aria-label='Close']".to_string(),
                ".close-btn".to_string(),
                ".ad-close".to_string(),
            ],
            lazy_src_attributes: vec!["data-src".to_string(), "data-original".to_string()],
            placeholder_signatures: vec!["sloading.svg".to_string()],
            image_user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36".to_string(),
        }
    }
}
