//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{Metadata, RemoveReason, Stats};

/// Response body for the SET operations (PUT /set, PUT /set/:key)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// Size of the stored value in bytes
    pub size: usize,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>, size: usize) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            size,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for GET /info/:key
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub key: String,
    /// Size of the stored value in bytes
    pub size: usize,
    pub entry_status: Option<RemoveReason>,
}

/// Response body for GET /metadata/:key
#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub key: String,
    pub request_count: u32,
}

impl MetadataResponse {
    pub fn new(key: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            key: key.into(),
            request_count: metadata.request_count,
        }
    }
}

/// Response body for POST /reset
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

impl ResetResponse {
    pub fn new() -> Self {
        Self {
            message: "Cache reset successfully".to_string(),
        }
    }
}

impl Default for ResetResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Cache counters
    #[serde(flatten)]
    pub stats: Stats,
    /// Current number of live entries
    pub len: usize,
    /// Allocated arena bytes
    pub capacity: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(stats: Stats, len: usize, capacity: usize) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            stats,
            len,
            capacity,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Reported once the cache has been closed
    pub fn closed() -> Self {
        Self {
            status: "closed".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    /// Last removal reason of the requested key, for not-found errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_status: Option<RemoveReason>,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            entry_status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_response_serialize() {
        let resp = SetResponse::new("my_key", 5);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["key"], "my_key");
        assert_eq!(json["size"], 5);
        assert!(json["message"].as_str().unwrap().contains("successfully"));
    }

    #[test]
    fn test_delete_response_serialize() {
        let resp = DeleteResponse::new("deleted_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("deleted_key"));
        assert!(json.contains("deleted"));
    }

    #[test]
    fn test_info_response_serialize() {
        let resp = InfoResponse {
            key: "k".to_string(),
            size: 3,
            entry_status: None,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["entry_status"].is_null());
    }

    #[test]
    fn test_stats_response_is_flat() {
        let stats = Stats {
            hits: 80,
            misses: 20,
            ..Stats::default()
        };
        let resp = StatsResponse::new(stats, 10, 4096);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["hits"], 80);
        assert_eq!(json["delete_hits"], 0);
        assert_eq!(json["len"], 10);
        assert_eq!(json["capacity"], 4096);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::new(Stats::default(), 0, 0);
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("Something went wrong"));
        assert!(!json.contains("entry_status"));

        let resp = ErrorResponse {
            entry_status: Some(RemoveReason::Expired),
            ..resp
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["entry_status"], "expired");
    }
}
