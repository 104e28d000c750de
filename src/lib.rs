//! Resumable, polite acquisition of paginated web-novel chapters through a
//! real browser.
//!
//! The [`orchestrator::Orchestrator`] walks an ordered chapter list; each
//! chapter is paged through by [`acquisition::PaginationWalker`], which drives
//! every page through the reload/classify/extract state machine in
//! [`acquisition::page`].

pub mod acquisition;
pub mod browser;
pub mod config;
pub mod detector;
pub mod error;
pub mod links;
pub mod models;
pub mod orchestrator;
pub mod overlay;
pub mod storage;
pub mod traits;
pub mod utils;

pub use error::{NovelLoaderError, Result};
