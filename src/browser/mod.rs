//! Browser session backends for [`BrowserPage`](crate::traits::BrowserPage).

pub mod chromium;

pub use chromium::{find_chromium, ChromiumSession};
