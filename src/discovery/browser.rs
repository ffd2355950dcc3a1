use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use super::bridge::{BridgeMessage, ChannelBridge};
use super::dom::DomTree;
use super::engine::MediaDiscoveryEngine;
use super::interceptor::NetworkObserver;
use super::scanner::ScanReport;
use super::snapshot::PageDom;
use super::{validate_url, DiscoveryError, VideoMetrics};
use crate::config::EngineConfig;

const VIDEO_METRICS_JS: &str = r#"
    Array.from(document.querySelectorAll('video')).map(function (v) {
        return {
            width: v.videoWidth || 0,
            height: v.videoHeight || 0,
            duration: isFinite(v.duration) ? v.duration : 0
        };
    })
"#;

#[derive(Clone, Debug, Serialize)]
pub struct ProbedVideo {
    pub metrics: VideoMetrics,
    /// Payload delivered for this video, parsed back into JSON.
    pub payload: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub title: String,
    /// Everything the network interceptor kept, in capture order.
    pub captured: Vec<String>,
    pub scan: ScanReport,
    pub videos: Vec<ProbedVideo>,
}

/// Drives a real Chromium page through the discovery engine.
pub struct BrowserProbe {
    headless: bool,
    settle: Duration,
    config: EngineConfig,
}

impl BrowserProbe {
    pub fn new(headless: bool, settle: Duration, config: EngineConfig) -> Self {
        Self {
            headless,
            settle,
            config,
        }
    }

    pub async fn probe(&self, url: &str) -> Result<ProbeReport, DiscoveryError> {
        let validated = validate_url(url)?;

        let mut builder = BrowserConfig::builder();

        if !self.headless {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let result = self.run(&browser, validated.as_str()).await;

        browser.close().await.ok();
        handler_task.abort();

        result
    }

    async fn run(&self, browser: &Browser, url: &str) -> Result<ProbeReport, DiscoveryError> {
        // Listen before navigating so the first requests are not missed.
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

        let (bridge, mut delivered) = ChannelBridge::new();
        let observer = Arc::new(LiveObserver::default());
        let listeners = attach_network_observer(&page, observer.clone()).await?;

        page.goto(url)
            .await
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

        tokio::time::sleep(self.settle).await;

        let title = page
            .evaluate("document.title")
            .await
            .ok()
            .and_then(|v| v.into_value::<String>().ok())
            .unwrap_or_default();

        let html = page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?
            .into_value::<String>()
            .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

        let metrics: Vec<VideoMetrics> = page
            .evaluate(VIDEO_METRICS_JS)
            .await
            .ok()
            .and_then(|v| v.into_value().ok())
            .unwrap_or_default();

        for task in listeners {
            task.abort();
        }
        page.close().await.ok();

        let page_url = url::Url::parse(url).ok();
        let dom = PageDom::from_html(&html, page_url.as_ref());
        let top_level = dom.videos(&dom.document());
        for (video, m) in top_level.iter().zip(metrics.iter()) {
            dom.set_video_metrics(*video, *m);
        }

        let engine = MediaDiscoveryEngine::new(dom.clone(), dom.body(), Arc::new(bridge), self.config.clone());
        for seen in observer.drain() {
            match seen {
                Seen::Request(url) => engine.interceptor().observe_request("GET", &url),
                Seen::Response(url) => engine.interceptor().observe_response(&url),
            }
        }

        let scan = engine.scan();
        let videos = activate_overlays(&dom, &mut delivered);

        tracing::info!(
            url,
            captured = engine.registry().len(),
            videos = videos.len(),
            "probe finished"
        );

        Ok(ProbeReport {
            url: url.to_string(),
            title,
            captured: engine.registry().snapshot(),
            scan,
            videos,
        })
    }
}

/// Activates every control in `dom`, pairing each video with the payload
/// its activation delivered through `delivered`.
pub fn activate_overlays(dom: &PageDom, delivered: &mut UnboundedReceiver<BridgeMessage>) -> Vec<ProbedVideo> {
    let mut videos = Vec::new();
    for overlay in dom.overlays() {
        let Some(video) = dom.overlay_target(overlay) else {
            continue;
        };
        dom.click(overlay);
        let payload = delivered
            .try_recv()
            .ok()
            .and_then(|message| serde_json::from_str(&message.payload).ok());
        videos.push(ProbedVideo {
            metrics: dom.video_metrics(&video),
            payload,
        });
    }
    videos
}

#[derive(Debug)]
enum Seen {
    Request(String),
    Response(String),
}

/// Buffers network observations while the page is still loading; the engine
/// is only built once the snapshot exists.
#[derive(Default)]
struct LiveObserver {
    seen: parking_lot::Mutex<Vec<Seen>>,
}

impl LiveObserver {
    fn drain(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock())
    }
}

impl NetworkObserver for LiveObserver {
    fn observe_request(&self, _method: &str, url: &str) {
        self.seen.lock().push(Seen::Request(url.to_string()));
    }

    fn observe_response(&self, url: &str) {
        self.seen.lock().push(Seen::Response(url.to_string()));
    }
}

/// Maps DevTools network events onto observer hooks: XHR requests are seen
/// when they are sent, fetch requests when their response arrives.
pub async fn attach_network_observer<O>(page: &Page, observer: Arc<O>) -> Result<Vec<JoinHandle<()>>, DiscoveryError>
where
    O: NetworkObserver + 'static,
{
    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| DiscoveryError::Browser(e.to_string()))?;
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| DiscoveryError::Browser(e.to_string()))?;

    let request_observer = observer.clone();
    let request_task = tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            if event.r#type == Some(ResourceType::Xhr) {
                request_observer.observe_request(&event.request.method, &event.request.url);
            }
        }
    });

    let response_task = tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if event.r#type == ResourceType::Fetch {
                observer.observe_response(&event.response.url);
            }
        }
    });

    Ok(vec![request_task, response_task])
}
