//! Service implementations for the case simulator API.

mod image_search;

pub use image_search::{BatchCallbacks, ImageSearchService};
