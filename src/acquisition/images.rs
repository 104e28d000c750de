//! Incidental image capture.
//!
//! Every successfully extracted page is scanned for `<img>` elements. Real
//! images hide behind a lazy-load attribute while `src` points at a spinner,
//! so lazy attributes are preferred and the spinner is filtered out by name.

use crate::config::{AcquisitionConfig, SiteConfig};
use crate::error::Result;
use crate::models::{ChapterImages, ImageReference};
use crate::utils::{random_delay, HttpClient};
use futures::StreamExt;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_EXTENSION: &str = ".jpg";

/// An `<img>` location before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub source_location: String,
    pub resolved_location: String,
}

pub struct ImageCapture {
    http_client: HttpClient,
    images_dir: PathBuf,
    lazy_attributes: Vec<String>,
    placeholder_signatures: Vec<String>,
    delay_ms: (u64, u64),
}

impl ImageCapture {
    pub fn new(
        http_client: HttpClient,
        images_dir: impl Into<PathBuf>,
        site: &SiteConfig,
        acquisition: &AcquisitionConfig,
    ) -> Self {
        Self {
            http_client,
            images_dir: images_dir.into(),
            lazy_attributes: site.lazy_src_attributes.clone(),
            placeholder_signatures: site.placeholder_signatures.clone(),
            delay_ms: acquisition.image_delay_ms,
        }
    }

    /// Lists the distinct-per-page image locations in `raw_content`, resolved
    /// against `base_location`, with placeholders removed.
    pub fn candidates(&self, raw_content: &str, base_location: &str) -> Vec<ImageCandidate> {
        let base = match Url::parse(base_location) {
            Ok(base) => base,
            Err(e) => {
                warn!("[IMAGES] Cannot resolve images against '{}': {}", base_location, e);
                return Vec::new();
            }
        };

        let fragment = Html::parse_fragment(raw_content);
        let Ok(selector) = Selector::parse("img") else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for img in fragment.select(&selector) {
            let element = img.value();
            let chosen = self
                .lazy_attributes
                .iter()
                .filter_map(|attr| element.attr(attr))
                .chain(element.attr("src"))
                .map(str::trim)
                .find(|s| !s.is_empty());

            let Some(source) = chosen else {
                continue;
            };

            let resolved = match base.join(source) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                Ok(url) => {
                    debug!("[IMAGES] Skipping non-http image source: {}", url.scheme());
                    continue;
                }
                Err(e) => {
                    debug!("[IMAGES] Unresolvable image source '{}': {}", source, e);
                    continue;
                }
            };

            if self.is_placeholder(&resolved) {
                debug!("[IMAGES] Skipping placeholder: {}", resolved);
                continue;
            }

            out.push(ImageCandidate {
                source_location: source.to_string(),
                resolved_location: resolved.to_string(),
            });
        }
        out
    }

    fn is_placeholder(&self, url: &Url) -> bool {
        let file_name = url.path_segments().and_then(|mut s| s.next_back()).unwrap_or("");
        self.placeholder_signatures
            .iter()
            .any(|sig| !sig.is_empty() && file_name.contains(sig.as_str()))
    }

    /// Downloads every new image on the page. Failures are logged and skipped.
    pub async fn capture(
        &self,
        raw_content: &str,
        base_location: &str,
        chapter: &mut ChapterImages,
    ) -> Vec<ImageReference> {
        let mut saved = Vec::new();

        for candidate in self.candidates(raw_content, base_location) {
            if !chapter.mark_seen(&candidate.resolved_location) {
                debug!(
                    "[IMAGES] Already captured in this chapter: {}",
                    candidate.resolved_location
                );
                continue;
            }

            let ordinal = chapter.next_ordinal();
            let file_name = format!(
                "{}_{}{}",
                chapter.name_prefix,
                ordinal,
                extension_of(&candidate.resolved_location)
            );
            let path = self.images_dir.join(&file_name);

            random_delay(self.delay_ms.0, self.delay_ms.1).await;

            match self.download(&candidate.resolved_location, base_location, &path).await {
                Ok(bytes) => {
                    chapter.advance_ordinal();
                    info!("[IMAGES] Saved {} ({} bytes)", file_name, bytes);
                    saved.push(ImageReference {
                        source_location: candidate.source_location,
                        resolved_location: candidate.resolved_location,
                        ordinal,
                    });
                }
                Err(e) => {
                    warn!("[IMAGES] Failed to capture {}: {}", candidate.resolved_location, e);
                }
            }
        }

        saved
    }

    async fn download(&self, url: &str, referer: &str, path: &Path) -> Result<u64> {
        let response = self.http_client.get_image(url, referer).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let written = async {
            let mut file = tokio::fs::File::create(path).await?;
            let mut total = 0u64;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                total += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<u64, crate::error::NovelLoaderError>(total)
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        written
    }
}

/// File extension (with dot) of the URL's last path segment, `.jpg` if none.
pub fn extension_of(location: &str) -> String {
    let segment = Url::parse(location)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back()).map(str::to_string))
        .unwrap_or_default();

    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn capture_into(dir: &Path) -> ImageCapture {
        let acquisition = AcquisitionConfig {
            image_delay_ms: (0, 0),
            ..AcquisitionConfig::default()
        };
        ImageCapture::new(
            HttpClient::new("test-agent", Duration::from_secs(5)).unwrap(),
            dir,
            &SiteConfig::default(),
            &acquisition,
        )
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(extension_of("https://img.example.com/a/b.PNG"), ".png");
        assert_eq!(extension_of("https://img.example.com/a/b.webp?x=1"), ".webp");
        assert_eq!(extension_of("https://img.example.com/a/image"), ".jpg");
        assert_eq!(extension_of("https://img.example.com/"), ".jpg");
    }

    #[test]
    fn prefers_lazy_source_and_drops_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let capture = capture_into(dir.path());
        let html = r#"
            <p>text</p>
            <img src="/images/sloading.svg" data-src="/files/article/image/1.jpg">
            <img src="/images/sloading.svg">
            <img src="https://cdn.example.com/2.png">
            <img data-original="pics/3.gif" src="">
            <img src="data:image/gif;base64,R0lGOD">
        "#;

        let found = capture.candidates(html, "https://tw.linovelib.com/novel/4519/1.html");
        let resolved: Vec<_> = found.iter().map(|c| c.resolved_location.as_str()).collect();

        assert_eq!(
            resolved,
            vec![
                "https://tw.linovelib.com/files/article/image/1.jpg",
                "https://cdn.example.com/2.png",
                "https://tw.linovelib.com/novel/4519/pics/3.gif",
            ]
        );
        assert_eq!(found[0].source_location, "/files/article/image/1.jpg");
    }

    #[tokio::test]
    async fn duplicate_locations_download_once() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/pic/a.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("png-bytes")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let capture = capture_into(dir.path());
        let base = format!("{}/novel/1.html", server.url());
        let html = r#"<img data-src="/pic/a.png"><img src="../pic/a.png">"#;

        let mut chapter = ChapterImages::new("001_One");
        let saved = capture.capture(html, &base, &mut chapter).await;
        let again = capture.capture(html, &base, &mut chapter).await;

        assert_eq!(saved.len(), 1);
        assert!(again.is_empty());
        assert_eq!(saved[0].ordinal, 1);
        assert_eq!(chapter.next_ordinal(), 2);
        assert_eq!(std::fs::read(dir.path().join("001_One_1.png")).unwrap(), b"png-bytes");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn non_image_response_is_skipped_without_consuming_ordinal() {
        let mut server = mockito::Server::new_async().await;
        let _html = server
            .mock("GET", "/blocked.jpg")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>hotlink</html>")
            .create_async()
            .await;
        let _ok = server
            .mock("GET", "/ok.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("jpeg")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let capture = capture_into(dir.path());
        let base = format!("{}/novel/1.html", server.url());

        let mut chapter = ChapterImages::new("002_Two");
        let saved = capture
            .capture(r#"<img src="/blocked.jpg"><img src="/ok.jpg">"#, &base, &mut chapter)
            .await;

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].ordinal, 1);
        assert!(dir.path().join("002_Two_1.jpg").exists());
        assert!(!dir.path().join("002_Two_2.jpg").exists());
    }
}
