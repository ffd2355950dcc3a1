use async_trait::async_trait;
use std::sync::Arc;

use super::normalize::Normalizer;
use super::registry::MediaRegistry;

/// Hooks fired by a network layer as the page talks to the network.
pub trait NetworkObserver: Send + Sync {
    /// A request is being opened (XHR-style), before it completes.
    fn observe_request(&self, method: &str, url: &str);
    /// A fetch-style request completed and resolved to `url`.
    fn observe_response(&self, url: &str);
}

impl<T: NetworkObserver + ?Sized> NetworkObserver for Arc<T> {
    fn observe_request(&self, method: &str, url: &str) {
        (**self).observe_request(method, url)
    }

    fn observe_response(&self, url: &str) {
        (**self).observe_response(url)
    }
}

/// Feeds every observed URL through the normalizer into the registry.
#[derive(Clone, Debug)]
pub struct MediaInterceptor {
    normalizer: Normalizer,
    registry: MediaRegistry,
}

impl MediaInterceptor {
    pub fn new(normalizer: Normalizer, registry: MediaRegistry) -> Self {
        Self {
            normalizer,
            registry,
        }
    }

    pub fn registry(&self) -> &MediaRegistry {
        &self.registry
    }

    /// Returns `true` when the URL was new to the registry.
    pub fn record(&self, url: &str) -> bool {
        match self.normalizer.normalize(url) {
            Some(clean) => {
                let added = self.registry.insert(clean);
                if added {
                    tracing::trace!(url, "captured media candidate");
                }
                added
            }
            None => false,
        }
    }
}

impl NetworkObserver for MediaInterceptor {
    fn observe_request(&self, _method: &str, url: &str) {
        self.record(url);
    }

    fn observe_response(&self, url: &str) {
        self.record(url);
    }
}

/// Response types that know the URL they finally resolved to.
pub trait ResolvedUrl {
    fn resolved_url(&self) -> &str;
}

/// An asynchronous fetch-style client.
#[async_trait]
pub trait Fetch: Send + Sync {
    type Request: Send + 'static;
    type Response: ResolvedUrl + Send;
    type Error: Send;

    async fn fetch(&self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Wraps a fetch client and reports each successful response's URL.
/// Requests, responses and errors pass through untouched.
pub struct ObservedFetch<F, O> {
    inner: F,
    observer: O,
}

impl<F, O> ObservedFetch<F, O> {
    pub fn new(inner: F, observer: O) -> Self {
        Self { inner, observer }
    }
}

#[async_trait]
impl<F, O> Fetch for ObservedFetch<F, O>
where
    F: Fetch,
    O: NetworkObserver,
{
    type Request = F::Request;
    type Response = F::Response;
    type Error = F::Error;

    async fn fetch(&self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let result = self.inner.fetch(request).await;
        if let Ok(response) = &result {
            self.observer.observe_response(response.resolved_url());
        }
        result
    }
}

/// A synchronous XHR-style `open`.
pub trait RequestOpener {
    type Output;

    fn open(&self, method: &str, url: &str) -> Self::Output;
}

/// Wraps an opener and reports the target URL at call time.
pub struct ObservedOpener<X, O> {
    inner: X,
    observer: O,
}

impl<X, O> ObservedOpener<X, O> {
    pub fn new(inner: X, observer: O) -> Self {
        Self { inner, observer }
    }
}

impl<X, O> RequestOpener for ObservedOpener<X, O>
where
    X: RequestOpener,
    O: NetworkObserver,
{
    type Output = X::Output;

    fn open(&self, method: &str, url: &str) -> Self::Output {
        self.observer.observe_request(method, url);
        self.inner.open(method, url)
    }
}
