pub mod bridge;
pub mod browser;
pub mod dom;
pub mod engine;
pub mod interceptor;
pub mod normalize;
pub mod registry;
pub mod resolver;
pub mod scanner;
pub mod snapshot;
pub mod watcher;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Bridge error: {0}")]
    Bridge(String),
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Extract error: {0}")]
    Extract(String),
}

/// Intrinsic size and duration of a video element as the page reports them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetrics {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub duration: f64,
}

impl VideoMetrics {
    pub fn new(width: u32, height: u32, duration: f64) -> Self {
        Self {
            width,
            height,
            duration,
        }
    }

    /// Duration in seconds, 0 when the element has no usable value (NaN before
    /// metadata loads, infinity for live streams).
    pub fn reported_duration(&self) -> f64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub url: String,
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    EmbeddedData,
    NetworkCapture,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionSet {
    pub sources: Vec<ResolvedSource>,
    pub duration: f64,
    pub strategy: Strategy,
}

impl ResolutionSet {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn payload(&self) -> VideoFoundPayload<'_> {
        VideoFoundPayload {
            sources: &self.sources,
            duration: self.duration,
        }
    }
}

/// Wire form handed to the host application.
#[derive(Debug, Serialize)]
pub struct VideoFoundPayload<'a> {
    pub sources: &'a [ResolvedSource],
    pub duration: f64,
}

/// Only plain web pages can be probed.
pub fn validate_url(url: &str) -> Result<Url, DiscoveryError> {
    let parsed = Url::parse(url).map_err(|e| DiscoveryError::InvalidUrl(format!("{}: {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DiscoveryError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                other, url
            )))
        }
    }

    if parsed.host_str().is_none() {
        return Err(DiscoveryError::InvalidUrl(format!("missing host in {}", url)));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_duration_hides_unusable_values() {
        assert_eq!(VideoMetrics::new(0, 0, f64::NAN).reported_duration(), 0.0);
        assert_eq!(VideoMetrics::new(0, 0, f64::INFINITY).reported_duration(), 0.0);
        assert_eq!(VideoMetrics::new(0, 0, 12.5).reported_duration(), 12.5);
    }

    #[test]
    fn validate_url_accepts_only_web_pages() {
        assert!(validate_url("https://example.com/watch").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(DiscoveryError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(DiscoveryError::InvalidUrl(_))
        ));
    }

    #[test]
    fn payload_serializes_sources_and_duration_only() {
        let set = ResolutionSet {
            sources: vec![ResolvedSource {
                url: "https://cdn.example/v.mp4".to_string(),
                label: "720p".to_string(),
            }],
            duration: 31.0,
            strategy: Strategy::NetworkCapture,
        };

        let value = serde_json::to_value(set.payload()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "sources": [{ "url": "https://cdn.example/v.mp4", "label": "720p" }],
                "duration": 31.0
            })
        );
    }
}
