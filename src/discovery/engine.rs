use std::sync::Arc;

use super::bridge::HostBridge;
use super::dom::{DomTree, MutationSource, ObserveOptions, OverlayHandler};
use super::interceptor::MediaInterceptor;
use super::normalize::Normalizer;
use super::registry::MediaRegistry;
use super::resolver::{JsonFieldExtractor, PageExtractor, SourceResolver};
use super::scanner::{ScanReport, Scanner};
use super::watcher::MutationWatcher;
use super::ResolutionSet;
use crate::config::EngineConfig;

/// One page's worth of discovery state: a registry fed by the interceptor,
/// controls kept in place by the scanner and watcher, and a resolver wired
/// to the host bridge.
pub struct MediaDiscoveryEngine<D: DomTree> {
    dom: D,
    root: D::Node,
    config: EngineConfig,
    registry: MediaRegistry,
    interceptor: Arc<MediaInterceptor>,
    resolver: Arc<SourceResolver>,
    scanner: Arc<Scanner<D>>,
    bridge: Arc<dyn HostBridge>,
    watcher: Option<MutationWatcher>,
}

impl<D: DomTree> MediaDiscoveryEngine<D> {
    pub fn new(dom: D, root: D::Node, bridge: Arc<dyn HostBridge>, config: EngineConfig) -> Self {
        Self::with_extractors(dom, root, bridge, config, vec![Box::new(JsonFieldExtractor::video_url())])
    }

    /// Uses `extractors` for the embedded-data strategy instead of the
    /// default `video_url` field.
    pub fn with_extractors(
        dom: D,
        root: D::Node,
        bridge: Arc<dyn HostBridge>,
        config: EngineConfig,
        extractors: Vec<Box<dyn PageExtractor>>,
    ) -> Self {
        let normalizer = Normalizer::new(config.normalizer.clone());
        let registry = MediaRegistry::new();
        let interceptor = Arc::new(MediaInterceptor::new(normalizer.clone(), registry.clone()));
        let resolver = Arc::new(SourceResolver::new(normalizer, registry.clone()).with_extractors(extractors));

        let handler = {
            let resolver = resolver.clone();
            let bridge = bridge.clone();
            let handler_name = config.handler_name.clone();
            OverlayHandler::new(move |dom: &D, video: &D::Node| {
                resolver.deliver(dom, video, bridge.as_ref(), &handler_name);
            })
        };
        let scanner = Arc::new(Scanner::new(config.overlay.clone(), handler));

        Self {
            dom,
            root,
            config,
            registry,
            interceptor,
            resolver,
            scanner,
            bridge,
            watcher: None,
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &MediaRegistry {
        &self.registry
    }

    /// Observer to hang on the page's network layer.
    pub fn interceptor(&self) -> Arc<MediaInterceptor> {
        self.interceptor.clone()
    }

    pub fn scan(&self) -> ScanReport {
        self.scanner.scan(&self.dom, &self.root)
    }

    pub fn resolve(&self, video: &D::Node) -> ResolutionSet {
        self.resolver.resolve(&self.dom, video)
    }

    /// Same path as a user activating the video's control.
    pub fn activate(&self, video: &D::Node) -> Option<ResolutionSet> {
        self.resolver
            .deliver(&self.dom, video, self.bridge.as_ref(), &self.config.handler_name)
    }

    pub fn is_installed(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stops the mutation watcher, if running.
    pub fn uninstall(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.disconnect();
            tracing::debug!("mutation watcher disconnected");
        }
    }
}

impl<D: MutationSource> MediaDiscoveryEngine<D> {
    /// Scans once and keeps re-scanning after DOM changes settle. A previous
    /// watcher is disconnected first. Must be called within a tokio runtime.
    pub fn install(&mut self) -> ScanReport {
        self.uninstall();

        let report = self.scan();
        let mutations = self.dom.observe(&self.root, ObserveOptions::all());
        let dom = self.dom.clone();
        let root = self.root.clone();
        let scanner = self.scanner.clone();
        self.watcher = Some(MutationWatcher::spawn(
            mutations,
            self.config.quiet_period(),
            move || {
                scanner.scan(&dom, &root);
            },
        ));

        tracing::info!(
            videos = report.videos_seen,
            controls = report.overlays_attached,
            "video observer installed"
        );
        report
    }
}

impl<D: DomTree> Drop for MediaDiscoveryEngine<D> {
    fn drop(&mut self) {
        self.uninstall();
    }
}
