#![forbid(unsafe_code)]

//! Cursor-based pagination for BaseApp list screens.
//!
//! # Overview
//!
//! List endpoints answer with a page envelope:
//!
//! ```json
//! { "count": 42, "next": "https://api/v1/users?page=3", "previous": null, "results": [] }
//! ```
//!
//! A [`Paginator`] turns repeated "load more" requests into a sequence of
//! such pages. It keeps the [`PageCursor`] between calls, rejects overlapping
//! requests, stops at the end of the listing, and on a reset fetch trims the
//! local cache down to what the fresh first page reports.
//!
//! # Pieces
//!
//! | Module | Role |
//! |--------|------|
//! | [`cursor`] | page token extraction and the cursor type |
//! | [`page`] | envelope decoding |
//! | [`endpoint`] | request descriptors |
//! | [`fetch`] | transport and fetcher seams, cancellation |
//! | [`cache`] | cache seam, clean policies, reconciliation |
//! | [`paginator`] | the engine |
//! | [`error`] | error types |
//! | [`config`] | API configuration |
//!
//! # Threading
//!
//! A paginator is owned by one thread. Fetches run on short-lived worker
//! threads and report back over a channel; nothing is applied until the
//! owner calls [`Paginator::process_completions`].

pub mod cache;
pub mod config;
pub mod cursor;
pub mod endpoint;
pub mod error;
pub mod fetch;
pub mod page;
pub mod paginator;

pub use cache::{CleanPolicy, Identified, LocalCache, MemoryCache, NoCache, reconcile};
pub use config::{ApiConfig, ConfigError};
pub use cursor::{PageCursor, page_token};
pub use endpoint::{Endpoint, Method};
pub use error::{
    ApiError, CacheError, FetchError, GENERIC_ERROR_DESCRIPTION, PaginationError, ReconcileError,
    TransportError,
};
pub use fetch::{CancelToken, JsonPageFetcher, PageFetcher, Response, Transport};
pub use page::Page;
pub use paginator::{EndpointBuilder, LoadingState, PageCallback, Paginator, Settled};
