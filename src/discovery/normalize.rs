use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

/// Query parameters that identify pagination and track type on media CDNs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Byte-range parameters that split one resource into many requests.
    pub pagination_params: Vec<String>,
    /// Base64 format descriptor naming the track type.
    pub format_param: String,
    /// Substring of the decoded descriptor that marks an audio-only track.
    pub audio_marker: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            pagination_params: vec!["bytestart".to_string(), "byteend".to_string()],
            format_param: "efg".to_string(),
            audio_marker: "audio".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Canonical form of `raw`, or `None` when it names an audio-only track.
    ///
    /// Unparseable input comes back unchanged. Pagination and format
    /// parameters are dropped so every byte range of a resource collapses to
    /// one key.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let mut parsed = match Url::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::trace!(url = raw, error = %e, "keeping unparseable url as-is");
                return Some(raw.to_string());
            }
        };

        let mut kept: Vec<(String, String)> = Vec::new();

        for (key, value) in parsed.query_pairs() {
            if self.config.pagination_params.iter().any(|p| *p == key) {
                continue;
            } else if key == self.config.format_param.as_str() {
                if self.is_audio_descriptor(&value) {
                    tracing::trace!(url = raw, "excluding audio-only track");
                    return None;
                }
            } else {
                kept.push((key.into_owned(), value.into_owned()));
            }
        }

        // Re-encode every query so equivalent spellings share one key.
        if parsed.query().is_some() {
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed.query_pairs_mut().clear().extend_pairs(kept);
            }
        }

        Some(parsed.into())
    }

    fn is_audio_descriptor(&self, value: &str) -> bool {
        match decode_descriptor(value) {
            Some(text) => text.contains(self.config.audio_marker.as_str()),
            None => {
                // Undecodable descriptors never exclude a URL.
                tracing::debug!(descriptor = value, "format descriptor is not base64");
                false
            }
        }
    }
}

/// Normalizes with the default parameter names.
pub fn normalize(raw: &str) -> Option<String> {
    Normalizer::default().normalize(raw)
}

/// Decodes a descriptor the way a browser's `atob` would see it after query
/// decoding: `+` may have become a space, whitespace is insignificant and
/// padding is optional.
fn decode_descriptor(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(cleaned.as_bytes()).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b64(text: &str) -> String {
        STANDARD.encode(text)
    }

    #[test]
    fn byte_ranges_collapse_to_one_resource() {
        let first = normalize("https://cdn.example/video.mp4?bytestart=0&byteend=999");
        let second = normalize("https://cdn.example/video.mp4?bytestart=1000&byteend=1999");

        assert_eq!(first.as_deref(), Some("https://cdn.example/video.mp4"));
        assert_eq!(first, second);
    }

    #[test]
    fn unrelated_parameters_survive() {
        let url = "https://cdn.example/v.mp4?oh=abc&bytestart=0&byteend=10&oe=def";
        assert_eq!(
            normalize(url).as_deref(),
            Some("https://cdn.example/v.mp4?oh=abc&oe=def")
        );
    }

    #[test]
    fn format_descriptor_is_dropped_for_video_tracks() {
        let url = format!(
            "https://cdn.example/v.mp4?bytestart=0&byteend=99&efg={}",
            b64("video/mp4")
        );
        assert_eq!(normalize(&url).as_deref(), Some("https://cdn.example/v.mp4"));
    }

    #[test]
    fn audio_tracks_are_excluded() {
        let url = format!("https://cdn.example/a.mp4?efg={}&oh=1", b64("audio/mp4"));
        assert_eq!(normalize(&url), None);

        let json = b64(r#"{"vencode_tag":"dash_ln_heaac_vbr3_audio"}"#);
        let url = format!("https://cdn.example/a.mp4?bytestart=5&efg={}", json);
        assert_eq!(normalize(&url), None);
    }

    #[test]
    fn url_safe_and_unpadded_descriptors_are_decoded() {
        let encoded = URL_SAFE_NO_PAD.encode("xx audio ??>");
        assert_eq!(normalize(&format!("https://cdn.example/a?efg={}", encoded)), None);
    }

    #[test]
    fn plus_signs_in_descriptor_survive_query_decoding() {
        // STANDARD encoding of this text contains a '+'.
        let encoded = STANDARD.encode("audio>>>");
        assert!(encoded.contains('+'));
        assert_eq!(normalize(&format!("https://cdn.example/a?efg={}", encoded)), None);
    }

    #[test]
    fn undecodable_descriptor_fails_open() {
        assert_eq!(
            normalize("https://cdn.example/v.mp4?efg=%%%not-base64%%%&byteend=4").as_deref(),
            Some("https://cdn.example/v.mp4")
        );
    }

    #[test]
    fn unparseable_input_is_returned_unchanged() {
        assert_eq!(normalize("/relative/path?bytestart=0").as_deref(), Some("/relative/path?bytestart=0"));
        assert_eq!(normalize("").as_deref(), Some(""));
    }

    #[test]
    fn paged_and_unpaged_requests_share_one_spelling() {
        let paged = normalize("https://a.example/v?b=%20x&bytestart=1");
        let unpaged = normalize("https://a.example/v?b=%20x");

        assert_eq!(paged, unpaged);
        assert_eq!(unpaged.as_deref(), Some("https://a.example/v?b=+x"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "https://cdn.example/video.mp4?bytestart=0&byteend=999",
            "https://cdn.example/v.mp4?a=1+2&b=%20x&bytestart=3",
            "HTTPS://CDN.Example:443/path/../v.mp4?x=%41",
            "https://cdn.example/v.mp4?efg=%%%",
            "blob:https://cdn.example/1234-5678",
            "not a url at all",
            "https://cdn.example/v.mp4?",
        ];

        for sample in samples {
            let once = normalize(sample).expect("video url");
            assert_eq!(normalize(&once).as_deref(), Some(once.as_str()), "sample {}", sample);
        }
    }

    #[test]
    fn custom_parameter_names() {
        let normalizer = Normalizer::new(NormalizerConfig {
            pagination_params: vec!["range".to_string()],
            format_param: "fmt".to_string(),
            audio_marker: "sound".to_string(),
        });

        assert_eq!(
            normalizer.normalize("https://cdn.example/v?range=0-10&bytestart=0").as_deref(),
            Some("https://cdn.example/v?bytestart=0")
        );
        let excluded = format!("https://cdn.example/v?fmt={}", b64("sound/ogg"));
        assert_eq!(normalizer.normalize(&excluded), None);
    }
}
