//! Crawl output and the per-axis snapshot slices

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::axis::Axis;

/// One fetched page: response metadata plus the serialized DOM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status, 0 when the request never produced a response
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
    pub fetch_ms: u64,
    #[serde(default)]
    pub title: Option<String>,
    /// `<html lang>` attribute if present
    #[serde(default)]
    pub lang: Option<String>,
    /// Raw serialized DOM; empty when the fetch failed
    pub html: String,
    /// Per-page fetch error; the crawl continues past non-root failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageSnapshot {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && (200..400).contains(&self.status)
    }
}

/// Ordered crawl result. The first element is the root page; no URL
/// appears twice (canonical-URL dedup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// Requested URL after redirect resolution
    pub base_url: String,
    pub pages: Vec<PageSnapshot>,
    /// True when the page cap or the crawl budget stopped the traversal
    pub truncated: bool,
}

impl CrawlOutcome {
    pub fn pages_crawled(&self) -> usize {
        self.pages.iter().filter(|p| p.is_ok()).count()
    }

    pub fn pages_failed(&self) -> usize {
        self.pages.iter().filter(|p| !p.is_ok()).count()
    }
}

/// Per-axis projection of the crawled site: only the elements the axis
/// prompt needs, as a plain JSON structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSlice {
    pub axis: Axis,
    pub data: serde_json::Value,
}

/// Base snapshot plus all twelve slices, ready for prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub base_url: String,
    pub pages_crawled: usize,
    pub pages_failed: usize,
    /// Axis-independent structural summary of the site
    pub base: serde_json::Value,
    pub slices: Vec<SnapshotSlice>,
}

impl SiteSnapshot {
    pub fn slice(&self, axis: Axis) -> Option<&SnapshotSlice> {
        self.slices.iter().find(|s| s.axis == axis)
    }
}
