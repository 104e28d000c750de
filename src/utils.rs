use crate::error::{NovelLoaderError, Result};
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// GET an image, presenting `referer` as the page it is embedded in.
    ///
    /// Fails unless the status is a success and the declared content type is
    /// a raster `image/*` type.
    pub async fn get_image(&self, url: &str, referer: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, referer)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let media_type = content_type.to_ascii_lowercase();
        // SVG responses are stand-ins, never illustrations.
        if !media_type.starts_with("image/") || media_type.starts_with("image/svg") {
            return Err(NovelLoaderError::not_an_image(url, content_type));
        }

        Ok(response)
    }
}

/// Picks a duration uniformly from the inclusive millisecond range.
pub fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    let (lo, hi) = if min_ms <= max_ms { (min_ms, max_ms) } else { (max_ms, min_ms) };
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// Sleeps for a random duration in the inclusive millisecond range.
pub async fn random_delay(min_ms: u64, max_ms: u64) {
    let delay = jitter(min_ms, max_ms);
    if delay.is_zero() {
        return;
    }
    debug!("Waiting {:?}", delay);
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let d = jitter(100, 200);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn jitter_accepts_reversed_and_degenerate_ranges() {
        assert_eq!(jitter(50, 50), Duration::from_millis(50));
        let d = jitter(300, 100);
        assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn rejects_non_image_content_type() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/fake.jpg")
            .match_header("referer", "https://novel.example/1.html")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>blocked</html>")
            .create_async()
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5)).unwrap();
        let err = client
            .get_image(&format!("{}/fake.jpg", server.url()), "https://novel.example/1.html")
            .await
            .unwrap_err();

        assert!(matches!(err, NovelLoaderError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn rejects_svg_stand_in() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/illust.jpg")
            .with_status(200)
            .with_header("content-type", "image/svg+xml")
            .with_body("<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
            .create_async()
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5)).unwrap();
        let err = client
            .get_image(&format!("{}/illust.jpg", server.url()), "https://novel.example/3.html")
            .await
            .unwrap_err();

        assert!(matches!(err, NovelLoaderError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn accepts_image_with_referer() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/real.png")
            .match_header("referer", "https://novel.example/2.html")
            .match_header("user-agent", "test-agent")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0x89u8, b'P', b'N', b'G'])
            .create_async()
            .await;

        let client = HttpClient::new("test-agent", Duration::from_secs(5)).unwrap();
        let response = client
            .get_image(&format!("{}/real.png", server.url()), "https://novel.example/2.html")
            .await
            .unwrap();

        assert_eq!(response.bytes().await.unwrap().len(), 4);
        m.assert_async().await;
    }
}
