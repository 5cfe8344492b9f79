//! Streaming image search types.

use serde::{Deserialize, Serialize};

/// Default cap on the number of images the backend should return.
pub const DEFAULT_MAX_RESULTS: u32 = 30;

/// Default search depth.
pub const DEFAULT_SEARCH_DEPTH: &str = "advanced";

/// Request body that opens a streaming image search for a case's test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSearchParams {
    /// Case the test belongs to.
    pub case_id: String,
    /// Test category, e.g. `imaging` or `lab`.
    pub test_type: String,
    /// Test name, e.g. `Chest X-ray`.
    pub test_name: String,
    /// Maximum number of images across all batches.
    pub max_results: u32,
    /// Backend search depth.
    pub search_depth: String,
    /// Optional free-text query; empty lets the backend derive one.
    pub search_query: String,
}

impl ImageSearchParams {
    /// Creates params with default limits and an empty query.
    pub fn new(
        case_id: impl Into<String>,
        test_type: impl Into<String>,
        test_name: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            test_type: test_type.into(),
            test_name: test_name.into(),
            max_results: DEFAULT_MAX_RESULTS,
            search_depth: DEFAULT_SEARCH_DEPTH.to_string(),
            search_query: String::new(),
        }
    }

    /// Sets the result cap.
    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the search depth.
    pub fn search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Sets a free-text query.
    pub fn search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }
}

/// One image result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResult {
    /// Image URL.
    pub url: String,
    /// Caption or description.
    #[serde(default)]
    pub description: String,
}

/// One record of a streaming image search.
///
/// `batch_size` is the backend's declared count and is not checked against
/// `images.len()`. `batch_number` is not deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingImageBatch {
    /// Sequence number within the stream.
    pub batch_number: u32,
    /// Query the backend used for this batch.
    #[serde(default)]
    pub query_used: String,
    /// Results in this batch.
    #[serde(default)]
    pub images: Vec<ImageResult>,
    /// Declared number of images.
    #[serde(default)]
    pub batch_size: u32,
    /// True on the last batch of a successful stream.
    #[serde(default)]
    pub is_final: bool,
    /// Echo of the request's case id.
    #[serde(default)]
    pub case_id: String,
    /// Echo of the request's test name.
    #[serde(default)]
    pub test_name: String,
    /// Primary diagnosis of the case.
    #[serde(default)]
    pub primary_diagnosis: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_params_defaults_serialize() {
        let params = ImageSearchParams::new("case-7", "imaging", "Chest X-ray");
        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "case_id": "case-7",
                "test_type": "imaging",
                "test_name": "Chest X-ray",
                "max_results": 30,
                "search_depth": "advanced",
                "search_query": ""
            })
        );
    }

    #[test]
    fn test_params_overrides() {
        let params = ImageSearchParams::new("c", "lab", "CBC")
            .max_results(5)
            .search_depth("basic")
            .search_query("blood smear");

        assert_eq!(params.max_results, 5);
        assert_eq!(params.search_depth, "basic");
        assert_eq!(params.search_query, "blood smear");
    }

    #[test]
    fn test_batch_minimal_record() {
        let batch: StreamingImageBatch =
            serde_json::from_str(r#"{"batch_number":3,"images":[],"is_final":false}"#).unwrap();

        assert_eq!(batch.batch_number, 3);
        assert!(batch.images.is_empty());
        assert!(!batch.is_final);
        assert_eq!(batch.batch_size, 0);
    }

    #[test]
    fn test_batch_full_record_ignores_unknown_fields() {
        let batch: StreamingImageBatch = serde_json::from_str(
            r#"{
                "batch_number": 1,
                "query_used": "pneumonia chest xray",
                "images": [{"url": "https://img/1.png", "description": "PA view"}],
                "batch_size": 4,
                "is_final": true,
                "case_id": "case-7",
                "test_name": "Chest X-ray",
                "primary_diagnosis": "Community-acquired pneumonia",
                "elapsed_ms": 120
            }"#,
        )
        .unwrap();

        assert!(batch.is_final);
        assert_eq!(batch.images.len(), 1);
        // Declared size is preserved as-is.
        assert_eq!(batch.batch_size, 4);
        assert_eq!(batch.primary_diagnosis, "Community-acquired pneumonia");
    }

    #[test]
    fn test_batch_requires_batch_number() {
        assert!(serde_json::from_str::<StreamingImageBatch>(r#"{"images":[]}"#).is_err());
    }
}
