pub mod config;
pub mod discovery;
pub mod logging;

pub use config::EngineConfig;
pub use discovery::bridge::{BridgeMessage, ChannelBridge, HostBridge, VIDEO_FOUND_HANDLER};
pub use discovery::browser::{BrowserProbe, ProbeReport};
pub use discovery::engine::MediaDiscoveryEngine;
pub use discovery::interceptor::{MediaInterceptor, NetworkObserver, ObservedFetch, ObservedOpener};
pub use discovery::normalize::{normalize, Normalizer, NormalizerConfig};
pub use discovery::registry::MediaRegistry;
pub use discovery::resolver::{resolution_label, JsonFieldExtractor, PageExtractor, SourceResolver};
pub use discovery::snapshot::PageDom;
pub use discovery::{DiscoveryError, ResolutionSet, ResolvedSource, Strategy, VideoMetrics};
