#![forbid(unsafe_code)]

//! The "fetch one page" seam.
//!
//! [`PageFetcher`] is what a paginator calls from its worker thread. Most
//! list screens use [`JsonPageFetcher`], which pairs a [`Transport`] (the HTTP
//! client, supplied by the application) with envelope decoding and API error
//! extraction.
//!
//! Calls are blocking; they already run off the UI thread. Implementations
//! should check the [`CancelToken`] where they can and return
//! [`FetchError::Cancelled`] when it fires.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::endpoint::Endpoint;
use crate::error::{ApiError, FetchError, TransportError};
use crate::page::Page;

/// Cooperative cancellation flag shared between a paginator and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client used by [`JsonPageFetcher`].
///
/// Timeouts and authorization headers are the transport's business.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        url: &Url,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Response, TransportError>;
}

impl<S: Transport> Transport for Arc<S> {
    fn send(
        &self,
        url: &Url,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Response, TransportError> {
        (**self).send(url, endpoint, cancel)
    }
}

/// Fetches and decodes one page of a listing.
pub trait PageFetcher<T>: Send + Sync + 'static {
    fn fetch(&self, endpoint: &Endpoint, cancel: &CancelToken) -> Result<Page<T>, FetchError>;
}

/// [`PageFetcher`] over a [`Transport`] speaking the JSON page envelope.
#[derive(Debug, Clone)]
pub struct JsonPageFetcher<S> {
    transport: S,
    base_url: Url,
}

impl<S: Transport> JsonPageFetcher<S> {
    #[must_use]
    pub fn new(transport: S, config: &ApiConfig) -> Self {
        Self {
            transport,
            base_url: config.base_url.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn transport(&self) -> &S {
        &self.transport
    }
}

impl<T, S> PageFetcher<T> for JsonPageFetcher<S>
where
    T: DeserializeOwned + 'static,
    S: Transport,
{
    fn fetch(&self, endpoint: &Endpoint, cancel: &CancelToken) -> Result<Page<T>, FetchError> {
        let url = endpoint
            .url(&self.base_url)
            .map_err(TransportError::InvalidUrl)?;
        debug!(method = endpoint.method().as_str(), %url, "page request");

        let response = self.transport.send(&url, endpoint, cancel)?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if !response.is_success() {
            return Err(ApiError::from_body(response.status, &response.body).into());
        }
        Ok(Page::decode(&response.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::PageCursor;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Row {
        id: u32,
    }

    struct Canned {
        response: Result<Response, TransportError>,
        seen: Mutex<Vec<String>>,
        cancel_during_send: bool,
    }

    impl Canned {
        fn new(response: Result<Response, TransportError>) -> Self {
            Self {
                response,
                seen: Mutex::new(Vec::new()),
                cancel_during_send: false,
            }
        }
    }

    impl Transport for Canned {
        fn send(
            &self,
            url: &Url,
            _endpoint: &Endpoint,
            cancel: &CancelToken,
        ) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(url.to_string());
            if self.cancel_during_send {
                cancel.cancel();
            }
            self.response.clone()
        }
    }

    fn fetch_rows(transport: Arc<Canned>) -> Result<Page<Row>, FetchError> {
        let fetcher = JsonPageFetcher::new(transport, &ApiConfig::default());
        fetcher.fetch(&Endpoint::get("rows").with_page(Some(2)), &CancelToken::new())
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn success_decodes_page_and_builds_url() {
        let transport = Arc::new(Canned::new(Ok(Response::new(
            200,
            r#"{"count": 1, "next": null, "previous": "https://x.test/rows?page=1", "results": [{"id": 5}]}"#,
        ))));
        let page = fetch_rows(Arc::clone(&transport)).unwrap();
        assert_eq!(page.cursor, PageCursor::new(1, None, Some(1)));
        assert_eq!(page.items, vec![Row { id: 5 }]);
        assert_eq!(
            transport.seen.lock().unwrap().as_slice(),
            ["https://api.baseapp.tsl.io/v1/rows?page=2"]
        );
    }

    #[test]
    fn error_status_extracts_api_message() {
        let transport = Arc::new(Canned::new(Ok(Response::new(
            403,
            r#"{"detail": ["You do not have permission."]}"#,
        ))));
        match fetch_rows(transport) {
            Err(FetchError::Api(err)) => {
                assert_eq!(err.status_code, 403);
                assert_eq!(err.description, "You do not have permission.");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn bad_body_is_decode_error() {
        let transport = Arc::new(Canned::new(Ok(Response::new(200, "{}"))));
        assert!(matches!(fetch_rows(transport), Err(FetchError::Decode(_))));
    }

    #[test]
    fn transport_cancel_maps_to_cancelled() {
        let transport = Arc::new(Canned::new(Err(TransportError::Cancelled)));
        assert!(matches!(fetch_rows(transport), Err(FetchError::Cancelled)));
    }

    #[test]
    fn cancel_during_send_discards_response() {
        let mut canned = Canned::new(Ok(Response::new(
            200,
            r#"{"count": 0, "next": null, "results": []}"#,
        )));
        canned.cancel_during_send = true;
        assert!(matches!(
            fetch_rows(Arc::new(canned)),
            Err(FetchError::Cancelled)
        ));
    }

    #[test]
    fn connection_failure_is_transport_error() {
        let transport = Arc::new(Canned::new(Err(TransportError::Connection(
            "refused".into(),
        ))));
        assert!(matches!(
            fetch_rows(transport),
            Err(FetchError::Transport(TransportError::Connection(_)))
        ));
    }
}
