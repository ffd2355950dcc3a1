use lazy_static::lazy_static;
use regex::Regex;

use super::bridge::HostBridge;
use super::dom::DomTree;
use super::normalize::Normalizer;
use super::registry::MediaRegistry;
use super::{DiscoveryError, ResolutionSet, ResolvedSource, Strategy};

lazy_static! {
    static ref VIDEO_URL_FIELD: Regex =
        Regex::new(r#""video_url"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("video_url pattern");
}

/// Quality label from intrinsic dimensions, bucketed on the short side.
pub fn resolution_label(width: u32, height: u32) -> Option<String> {
    if width == 0 || height == 0 {
        return None;
    }
    let short_side = width.min(height);
    let label = if short_side >= 1080 {
        "1080p".to_string()
    } else if short_side >= 720 {
        "720p".to_string()
    } else {
        format!("{}p", short_side)
    };
    Some(label)
}

/// Pulls a video URL out of a page's inline script data.
pub trait PageExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// First candidate in one script body, already unescaped.
    fn extract(&self, script: &str) -> Result<Option<String>, DiscoveryError>;
}

/// Matches a JSON string field such as `"video_url":"https:\/\/…"`.
#[derive(Clone, Debug)]
pub struct JsonFieldExtractor {
    key: String,
    pattern: Regex,
}

impl JsonFieldExtractor {
    pub fn new(key: &str) -> Result<Self, DiscoveryError> {
        let pattern = Regex::new(&format!(
            r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
            regex::escape(key)
        ))
        .map_err(|e| DiscoveryError::Extract(e.to_string()))?;

        Ok(Self {
            key: key.to_string(),
            pattern,
        })
    }

    pub fn video_url() -> Self {
        Self {
            key: "video_url".to_string(),
            pattern: VIDEO_URL_FIELD.clone(),
        }
    }
}

impl PageExtractor for JsonFieldExtractor {
    fn name(&self) -> &str {
        &self.key
    }

    fn extract(&self, script: &str) -> Result<Option<String>, DiscoveryError> {
        let Some(raw) = self.pattern.captures(script).and_then(|c| c.get(1)) else {
            return Ok(None);
        };
        if raw.as_str().is_empty() {
            return Ok(None);
        }
        unescape_json_string(raw.as_str()).map(Some)
    }
}

/// Decodes JSON escapes (`&`, `\/`, `\"`, …) in a captured string body.
fn unescape_json_string(raw: &str) -> Result<String, DiscoveryError> {
    serde_json::from_str::<String>(&format!("\"{}\"", raw))
        .map_err(|e| DiscoveryError::Extract(format!("bad escape in embedded url: {}", e)))
}

/// Picks the sources offered for one video.
pub struct SourceResolver {
    normalizer: Normalizer,
    registry: MediaRegistry,
    extractors: Vec<Box<dyn PageExtractor>>,
}

impl SourceResolver {
    pub fn new(normalizer: Normalizer, registry: MediaRegistry) -> Self {
        Self {
            normalizer,
            registry,
            extractors: vec![Box::new(JsonFieldExtractor::video_url())],
        }
    }

    pub fn with_extractors(mut self, extractors: Vec<Box<dyn PageExtractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Embedded page data first, captured network URLs second.
    pub fn resolve<D: DomTree>(&self, dom: &D, video: &D::Node) -> ResolutionSet {
        let metrics = dom.video_metrics(video);
        let label = resolution_label(metrics.width, metrics.height);

        match self.embedded_source(&dom.script_texts()) {
            Ok(Some(url)) => {
                return ResolutionSet {
                    sources: vec![ResolvedSource {
                        url,
                        label: label.unwrap_or_else(|| "HD".to_string()),
                    }],
                    duration: metrics.reported_duration(),
                    strategy: Strategy::EmbeddedData,
                };
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "embedded data unusable, using captured urls"),
        }

        let label = label.unwrap_or_else(|| "Video".to_string());
        let sources = self
            .registry
            .snapshot()
            .into_iter()
            .map(|url| ResolvedSource {
                url,
                label: label.clone(),
            })
            .collect();

        ResolutionSet {
            sources,
            duration: metrics.reported_duration(),
            strategy: Strategy::NetworkCapture,
        }
    }

    /// First script that yields a non-audio URL wins.
    fn embedded_source(&self, scripts: &[String]) -> Result<Option<String>, DiscoveryError> {
        for script in scripts {
            for extractor in &self.extractors {
                let Some(candidate) = extractor.extract(script)? else {
                    continue;
                };
                if let Some(clean) = self.normalizer.normalize(&candidate) {
                    tracing::trace!(extractor = extractor.name(), url = %clean, "embedded source");
                    return Ok(Some(clean));
                }
            }
        }
        Ok(None)
    }

    /// Resolves and hands the payload to the host. Nothing is sent when no
    /// source was found; bridge failures are logged, never raised.
    pub fn deliver<D: DomTree>(
        &self,
        dom: &D,
        video: &D::Node,
        bridge: &dyn HostBridge,
        handler: &str,
    ) -> Option<ResolutionSet> {
        let set = self.resolve(dom, video);
        if set.is_empty() {
            tracing::debug!(?video, "no sources for video");
            return None;
        }

        let payload = match serde_json::to_string(&set.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize sources");
                return None;
            }
        };

        tracing::debug!(strategy = ?set.strategy, sources = set.sources.len(), "delivering sources");
        if let Err(e) = bridge.call_handler(handler, &payload) {
            tracing::warn!(error = %e, handler, "host bridge call failed");
        }
        Some(set)
    }
}
