#![forbid(unsafe_code)]

//! Scripted in-process [`Transport`].
//!
//! Responses are registered per `(path, page)` where `page` is the value of
//! the `page` query parameter (`None` for the first request of a listing).
//! Unregistered routes answer `404` with a `detail` body.
//!
//! The server can be paused: requests then block inside [`Transport::send`]
//! until [`StubServer::resume`] is called or their cancel token fires. This
//! is how tests hold a paginator in the `Loading` state.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use baseapp_paging::{
    ApiConfig, CancelToken, Endpoint, JsonPageFetcher, PageFetcher, Response, Transport,
    TransportError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

const CANCEL_POLL: Duration = Duration::from_millis(2);

type RouteKey = (String, Option<u32>);

#[derive(Debug, Default)]
struct Routes {
    responses: HashMap<RouteKey, Response>,
    failures: HashMap<RouteKey, TransportError>,
}

#[derive(Debug, Default)]
struct Inner {
    routes: Mutex<Routes>,
    paused: Mutex<bool>,
    resumed: Condvar,
    log: Mutex<Vec<Url>>,
    arrived: Condvar,
}

/// Shared handle to a scripted server. Clones see the same routes and log.
#[derive(Debug, Clone, Default)]
pub struct StubServer {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn route_key(path: &str, page: Option<u32>) -> RouteKey {
    (path.trim_matches('/').to_string(), page)
}

impl StubServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `path`/`page` with `response`.
    pub fn route(&self, path: &str, page: Option<u32>, response: Response) -> &Self {
        let key = route_key(path, page);
        let mut routes = lock(&self.inner.routes);
        routes.failures.remove(&key);
        routes.responses.insert(key, response);
        self
    }

    /// Answer with `200` and `body` serialized as JSON.
    pub fn route_json(&self, path: &str, page: Option<u32>, body: &Value) -> &Self {
        self.route(path, page, Response::new(200, body.to_string()))
    }

    /// Fail requests for `path`/`page` at the transport level.
    pub fn fail(&self, path: &str, page: Option<u32>, error: TransportError) -> &Self {
        let key = route_key(path, page);
        let mut routes = lock(&self.inner.routes);
        routes.responses.remove(&key);
        routes.failures.insert(key, error);
        self
    }

    /// Hold every subsequent request until [`Self::resume`].
    pub fn pause(&self) {
        *lock(&self.inner.paused) = true;
    }

    pub fn resume(&self) {
        *lock(&self.inner.paused) = false;
        self.inner.resumed.notify_all();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *lock(&self.inner.paused)
    }

    /// Every URL requested so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Url> {
        lock(&self.inner.log).clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.inner.log).len()
    }

    /// Block until at least `count` requests have arrived.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = lock(&self.inner.log);
        while log.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            log = self
                .inner
                .arrived
                .wait_timeout(log, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// A JSON page fetcher talking to this server.
    #[must_use]
    pub fn fetcher<T>(&self) -> Arc<dyn PageFetcher<T>>
    where
        T: DeserializeOwned + 'static,
    {
        Arc::new(JsonPageFetcher::new(self.clone(), &ApiConfig::default()))
    }

    fn record(&self, url: &Url) {
        lock(&self.inner.log).push(url.clone());
        self.inner.arrived.notify_all();
    }

    fn hold_while_paused(&self, cancel: &CancelToken) -> Result<(), TransportError> {
        let mut paused = lock(&self.inner.paused);
        while *paused {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            paused = self
                .inner
                .resumed
                .wait_timeout(paused, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}

impl Transport for StubServer {
    fn send(
        &self,
        url: &Url,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Response, TransportError> {
        self.record(url);
        self.hold_while_paused(cancel)?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let page = endpoint.query_value("page").and_then(|p| p.parse().ok());
        let key = route_key(endpoint.path(), page);
        let routes = lock(&self.inner.routes);
        if let Some(error) = routes.failures.get(&key) {
            debug!(%url, error = %error, "stub transport failure");
            return Err(error.clone());
        }
        match routes.responses.get(&key) {
            Some(response) => {
                debug!(%url, status = response.status, "stub response");
                Ok(response.clone())
            }
            None => {
                debug!(%url, "stub route missing");
                Ok(Response::new(404, r#"{"detail": ["Not found."]}"#))
            }
        }
    }
}
