pub mod images;
pub mod page;
pub mod pagination;
pub mod stitcher;

pub use images::ImageCapture;
pub use page::{PageAcquirer, PageEntry};
pub use pagination::{LinkTextNextPage, PaginationWalker, WalkSettings};
pub use stitcher::stitch;
