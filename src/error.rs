use thiserror::Error;

#[derive(Error, Debug)]
pub enum NovelLoaderError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Invalid chapter links: {0}")]
    InvalidLinks(String),

    #[error("Not an image: {url} returned content type '{content_type}'")]
    NotAnImage { url: String, content_type: String },
}

impl NovelLoaderError {
    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout(what.into())
    }

    pub fn scraping(msg: impl Into<String>) -> Self {
        Self::Scraping(msg.into())
    }

    pub fn invalid_links(msg: impl Into<String>) -> Self {
        Self::InvalidLinks(msg.into())
    }

    pub fn not_an_image(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::NotAnImage {
            url: url.into(),
            content_type: content_type.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NovelLoaderError>;
