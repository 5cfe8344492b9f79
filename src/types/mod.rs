//! Type definitions for the case simulator API.

pub mod image_search;
